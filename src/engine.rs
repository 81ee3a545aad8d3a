//! Inference engine
//!
//! Wires request resolution, transport and validation together for single
//! calls, and fans out independent calls over a fixed-size worker pool.

use crate::error::{Error, Result};
use crate::registry::{inference_types, RequestTemplate};
use crate::request::{InferenceCall, RequestBuilder};
use crate::transport::{InvocationResult, Transport, TransportConfig, TransportFactory};
use crate::validation::{AuthExpectation, Expectation, ResponseValidator};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Builds, executes and validates inference calls
#[derive(Debug, Clone)]
pub struct InferenceEngine {
    builder: RequestBuilder,
    transport: Arc<dyn Transport>,
    validator: ResponseValidator,
}

/// Aggregate of a fan-out run
#[derive(Debug, Default)]
pub struct FanOutSummary {
    pub results: Vec<Result<InvocationResult>>,
}

impl FanOutSummary {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Invocations that completed with a successful status
    pub fn succeeded(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r, Ok(result) if result.success))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Error> {
        self.results.iter().filter_map(|r| r.as_ref().err())
    }
}

impl InferenceEngine {
    pub fn new(builder: RequestBuilder, transport: Arc<dyn Transport>) -> Self {
        Self {
            builder,
            transport,
            validator: ResponseValidator::default(),
        }
    }

    /// Engine whose transport is picked from the builder's protocol
    pub fn for_protocol(builder: RequestBuilder, config: &TransportConfig) -> Result<Self> {
        let transport = TransportFactory::create(builder.protocol(), config)?;
        Ok(Self::new(builder, transport))
    }

    pub fn with_validator(mut self, validator: ResponseValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn builder(&self) -> &RequestBuilder {
        &self.builder
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Template `call` resolves to
    pub fn template_for(&self, call: &InferenceCall) -> Result<&RequestTemplate> {
        self.builder.registry().lookup(
            &call.runtime,
            &call.inference_type,
            self.builder.protocol(),
        )
    }

    /// Build and execute `call` once, without validation
    pub async fn invoke(&self, call: &InferenceCall) -> Result<InvocationResult> {
        let request = self.builder.build(call)?;
        let result = self.transport.execute(&request).await?;
        debug!(
            runtime = %call.runtime,
            inference_type = %call.inference_type,
            success = result.success,
            "Inference invocation finished"
        );
        Ok(result)
    }

    /// Execute `call` and validate the response
    pub async fn verify(
        &self,
        call: &InferenceCall,
        expectation: &Expectation,
    ) -> Result<InvocationResult> {
        let template = self.template_for(call)?;
        let result = self.invoke(call).await?;
        self.validator
            .validate(&result, &template.response_field_map, expectation)?;
        Ok(result)
    }

    /// Execute the runtime's default query and check its declared output
    pub async fn verify_default(&self, call: &InferenceCall) -> Result<InvocationResult> {
        let default = self
            .builder
            .registry()
            .default_query(&call.runtime, &call.inference_type)?;
        let expectation = Expectation::from_default_query(default)
            .streaming(call.inference_type == inference_types::STREAMING);
        let call = call.clone().with_default_query();
        let result = self.verify(&call, &expectation).await?;
        info!(
            runtime = %call.runtime,
            inference_type = %call.inference_type,
            model = %call.model_name,
            "Default query verified"
        );
        Ok(result)
    }

    /// Execute `call` and require an authorization rejection
    ///
    /// The expected reason follows from whether `call` carries a token.
    pub async fn verify_unauthorized(&self, call: &InferenceCall) -> Result<InvocationResult> {
        let expectation =
            Expectation::auth_rejection(AuthExpectation::for_token(call.token.is_some()));
        self.verify(call, &expectation).await
    }

    /// Run `call` `n` times with at most `workers` in flight
    ///
    /// Results arrive in completion order. A failing invocation is logged and
    /// recorded; it never cancels the others.
    pub async fn fan_out(&self, call: &InferenceCall, n: usize, workers: usize) -> FanOutSummary {
        let workers = workers.max(1);
        info!(
            runtime = %call.runtime,
            inference_type = %call.inference_type,
            requests = n,
            workers,
            "Fanning out inference requests"
        );

        let results: Vec<Result<InvocationResult>> = stream::iter(0..n)
            .map(|index| async move {
                let outcome = self.invoke(call).await;
                if let Err(e) = &outcome {
                    warn!(index, error = %e, "Inference worker failed");
                }
                outcome
            })
            .buffer_unordered(workers)
            .collect()
            .await;

        let summary = FanOutSummary { results };
        info!(
            total = summary.total(),
            succeeded = summary.succeeded(),
            "Fan-out finished"
        );
        summary
    }
}
