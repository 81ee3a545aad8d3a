//! Kubernetes-backed cluster probes

use crate::checks::{DeploymentProbe, DeploymentStatus, PodProbe, PodStatus};
use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use tracing::debug;

/// Reads deployments and pods through the Kubernetes API
#[derive(Clone)]
pub struct KubeClusterProbe {
    client: Client,
}

impl KubeClusterProbe {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Probe using the ambient kubeconfig or in-cluster service account
    pub async fn try_default() -> Result<Self> {
        Ok(Self::new(Client::try_default().await?))
    }
}

fn deployment_status(deployment: &Deployment) -> DeploymentStatus {
    DeploymentStatus {
        uid: deployment.uid().unwrap_or_default(),
        generation: deployment.metadata.generation,
        desired_replicas: deployment
            .spec
            .as_ref()
            .and_then(|spec| spec.replicas)
            .unwrap_or(1),
        ready_replicas: deployment
            .status
            .as_ref()
            .and_then(|status| status.ready_replicas)
            .unwrap_or(0),
    }
}

fn pod_status(pod: &Pod) -> PodStatus {
    let status = pod.status.as_ref();
    let ready = status
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false);

    PodStatus {
        name: pod.name_any(),
        phase: status
            .and_then(|s| s.phase.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
        ready,
        terminating: pod.metadata.deletion_timestamp.is_some(),
    }
}

#[async_trait]
impl DeploymentProbe for KubeClusterProbe {
    async fn deployment(&self, namespace: &str, name: &str) -> Result<Option<DeploymentStatus>> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let found = deployments.get_opt(name).await?;
        debug!(namespace, deployment = name, found = found.is_some(), "Read deployment");
        Ok(found.as_ref().map(deployment_status))
    }
}

#[async_trait]
impl PodProbe for KubeClusterProbe {
    async fn pods(&self, namespace: &str, selector: &str) -> Result<Vec<PodStatus>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods.list(&ListParams::default().labels(selector)).await?;
        Ok(list.items.iter().map(pod_status).collect())
    }
}
