//! Outbound notification seam.
//!
//! The engine describes what to send (a template key, a recipient, and JSON
//! parameters); delivery belongs to the embedding service. [`LogNotifier`]
//! is the local-dev sender. [`QueuedNotifier`] hands deliveries to the
//! [`crate::worker::WorkerPool`] so a slow mail provider never sits on the
//! request path; with it, delivery failures are logged by the pool instead
//! of surfacing to the caller, so pair it with a resend-capable flow.

use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

use crate::worker::{SubmitError, WorkerPool};

/// Template key for the registration / resend activation email.
pub const TEMPLATE_ACTIVATION: &str = "account_activation";
/// Template key for the password-reset email.
pub const TEMPLATE_PASSWORD_RESET: &str = "password_reset";

#[derive(Debug, Clone, thiserror::Error)]
#[error("notification delivery failed: {reason}")]
pub struct NotifyError {
    reason: String,
}

impl NotifyError {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

pub trait Notifier: Send + Sync {
    /// Deliver (or enqueue) one notification. Params hold template
    /// substitutions such as the activation URL; raw tokens reach this seam
    /// only inside those URLs.
    fn send(&self, template: &str, recipient: &str, params: &Value) -> Result<(), NotifyError>;
}

/// Local dev notifier that logs instead of sending.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, template: &str, recipient: &str, params: &Value) -> Result<(), NotifyError> {
        info!(
            template = %template,
            recipient = %recipient,
            params = %params,
            "notification send stub"
        );
        Ok(())
    }
}

/// Moves delivery onto the worker pool and reports success immediately.
pub struct QueuedNotifier {
    inner: Arc<dyn Notifier>,
    pool: WorkerPool,
}

impl QueuedNotifier {
    #[must_use]
    pub fn new(inner: Arc<dyn Notifier>, pool: WorkerPool) -> Self {
        Self { inner, pool }
    }
}

impl Notifier for QueuedNotifier {
    fn send(&self, template: &str, recipient: &str, params: &Value) -> Result<(), NotifyError> {
        let inner = Arc::clone(&self.inner);
        let template = template.to_string();
        let recipient = recipient.to_string();
        let params = params.clone();
        let queued = self.pool.submit(move || {
            if let Err(err) = inner.send(&template, &recipient, &params) {
                error!(template = %template, "queued notification failed: {err}");
            }
        });
        // Refuse rather than drop silently, and keep the two refusals
        // distinguishable: a full queue is backpressure, a closed queue is
        // a lifecycle bug in the embedding service.
        match queued {
            Ok(()) => Ok(()),
            Err(SubmitError::Full) => Err(NotifyError::new("notification queue is full")),
            Err(SubmitError::Closed) => Err(NotifyError::new("notification queue is closed")),
        }
    }
}
