//! Scripted transport
//!
//! Replays canned replies instead of talking to a cluster. Used by tests and
//! by dry runs of verification flows.

use crate::request::ResolvedRequest;
use crate::transport::{
    InvocationResult, StatsSnapshot, Transport, TransportError, TransportInfo, TransportStats,
    TransportType,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

type ReplyFn = dyn Fn(&ResolvedRequest, usize) -> Result<InvocationResult, TransportError>
    + Send
    + Sync;

enum Script {
    Sequence(Mutex<VecDeque<Result<InvocationResult, TransportError>>>),
    Always(InvocationResult),
    Function(Box<ReplyFn>),
}

/// Transport answering from a script
pub struct ScriptedTransport {
    script: Script,
    requests: Mutex<Vec<ResolvedRequest>>,
    stats: TransportStats,
}

impl fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedTransport")
            .field("calls", &self.call_count())
            .finish()
    }
}

impl ScriptedTransport {
    fn with_script(script: Script) -> Self {
        Self {
            script,
            requests: Mutex::new(Vec::new()),
            stats: TransportStats::default(),
        }
    }

    /// Replies in order; fails with [`TransportError::Exhausted`] afterwards
    pub fn sequence(replies: Vec<Result<InvocationResult, TransportError>>) -> Self {
        Self::with_script(Script::Sequence(Mutex::new(replies.into())))
    }

    /// Same reply to every request
    pub fn always(reply: InvocationResult) -> Self {
        Self::with_script(Script::Always(reply))
    }

    /// Reply computed from the request and its zero-based call index
    pub fn from_fn<F>(reply: F) -> Self
    where
        F: Fn(&ResolvedRequest, usize) -> Result<InvocationResult, TransportError>
            + Send
            + Sync
            + 'static,
    {
        Self::with_script(Script::Function(Box::new(reply)))
    }

    /// Requests seen so far, in call order
    pub fn requests(&self) -> Vec<ResolvedRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn reply(
        &self,
        request: &ResolvedRequest,
        index: usize,
    ) -> Result<InvocationResult, TransportError> {
        match &self.script {
            Script::Sequence(queue) => queue
                .lock()
                .ok()
                .and_then(|mut queue| queue.pop_front())
                .unwrap_or_else(|| Err(TransportError::Exhausted(request.target.clone()))),
            Script::Always(reply) => Ok(reply.clone()),
            Script::Function(reply) => reply(request, index),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(
        &self,
        request: &ResolvedRequest,
    ) -> Result<InvocationResult, TransportError> {
        let index = match self.requests.lock() {
            Ok(mut requests) => {
                requests.push(request.clone());
                requests.len() - 1
            }
            Err(_) => 0,
        };
        let reply = self.reply(request, index);
        match &reply {
            Ok(result) => self.stats.record_result(result),
            Err(_) => self.stats.record_error(),
        }
        reply
    }

    fn transport_info(&self) -> TransportInfo {
        TransportInfo {
            transport_type: TransportType::Scripted,
            description: "Scripted replies".to_string(),
        }
    }

    fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Protocol;

    fn request() -> ResolvedRequest {
        ResolvedRequest {
            protocol: Protocol::Http,
            target: "http://localhost/infer".to_string(),
            endpoint: "infer".to_string(),
            headers: Vec::new(),
            body: "{}".to_string(),
            port: None,
            token: None,
            insecure: false,
            plaintext: false,
        }
    }

    #[tokio::test]
    async fn test_sequence_then_exhausted() {
        let transport = ScriptedTransport::sequence(vec![
            Ok(InvocationResult::ok("one")),
            Ok(InvocationResult::failed("two")),
        ]);
        assert_eq!(transport.execute(&request()).await.unwrap().raw_output, "one");
        assert!(!transport.execute(&request()).await.unwrap().success);
        assert!(matches!(
            transport.execute(&request()).await,
            Err(TransportError::Exhausted(_))
        ));
        assert_eq!(transport.call_count(), 3);
        assert_eq!(transport.stats().failures, 2);
    }

    #[tokio::test]
    async fn test_from_fn_sees_call_index() {
        let transport = ScriptedTransport::from_fn(|_, index| {
            Ok(InvocationResult::ok(format!("call-{}", index)))
        });
        transport.execute(&request()).await.unwrap();
        let second = transport.execute(&request()).await.unwrap();
        assert_eq!(second.raw_output, "call-1");
        assert_eq!(transport.requests().len(), 2);
    }

    #[test]
    fn test_always_replies_without_a_runtime() {
        let transport = ScriptedTransport::always(InvocationResult::ok("same"));
        for _ in 0..3 {
            let reply = tokio_test::block_on(transport.execute(&request())).unwrap();
            assert_eq!(reply.raw_output, "same");
        }
        assert_eq!(transport.stats().requests, 3);
    }
}
