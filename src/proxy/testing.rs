// src/proxy/testing.rs
// Forwarders with scripted behaviour for unit tests.
use async_trait::async_trait;
use hyper::{Body, Request, Response};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::forward::{Forward, ForwardOutcome};
use super::ProxyError;

pub(crate) struct ScriptedForwarder {
    failures: usize,
    fatal: bool,
    calls: AtomicUsize,
}

impl ScriptedForwarder {
    pub(crate) fn always_ok() -> Self {
        Self::failing(0)
    }

    /// Fail the first `failures` calls, then answer 200.
    pub(crate) fn failing(failures: usize) -> Self {
        Self {
            failures,
            fatal: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn always_failing() -> Self {
        Self::failing(usize::MAX)
    }

    pub(crate) fn fatal() -> Self {
        Self {
            failures: usize::MAX,
            fatal: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Forward for ScriptedForwarder {
    async fn forward(&self, _req: Request<Body>) -> ForwardOutcome {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            let err = ProxyError::Backend("scripted failure".to_string());
            return if self.fatal {
                ForwardOutcome::Fatal(err)
            } else {
                ForwardOutcome::Recoverable(err)
            };
        }

        ForwardOutcome::Success(Response::new(Body::from("ok")))
    }
}
