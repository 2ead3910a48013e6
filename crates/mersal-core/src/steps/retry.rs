//! Incoming step: count delivery attempts per message id and forward a
//! message that exhausts its retry budget to a dead-letter address instead
//! of nacking it forever (spec §4.9, §9 scenario G).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use mersal_types::ERROR_DETAILS;

use crate::pipeline::{IncomingStepContext, Next, Step};
use crate::transport::Transport;

/// Wraps the rest of the incoming chain, counting failures per
/// `message_id` in-process. A message whose handlers keep failing is
/// forwarded to `dead_letter_address` once `max_attempts` is reached,
/// rather than left nacking indefinitely; the counter for that id is then
/// cleared.
///
/// Attempt counts live only in process memory: a worker restart resets
/// them. The source's at-least-once redelivery loop already tolerates
/// this (a message simply gets `max_attempts` more tries after a
/// restart), so this is a deliberate simplification, not a gap, for a
/// reference implementation (spec §10).
pub struct RetryStep {
    attempts: Mutex<HashMap<Uuid, u32>>,
    max_attempts: u32,
    dead_letter_address: String,
    transport: Arc<dyn Transport>,
}

impl RetryStep {
    /// Build the step with a dead-letter address messages are forwarded to
    /// once they exceed `max_attempts` failed deliveries.
    pub fn new(max_attempts: u32, dead_letter_address: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            attempts: Mutex::new(HashMap::new()),
            max_attempts,
            dead_letter_address: dead_letter_address.into(),
            transport,
        }
    }

    fn record_failure(&self, message_id: Uuid) -> u32 {
        let mut attempts = self.attempts.lock().expect("retry attempts mutex poisoned");
        let count = attempts.entry(message_id).or_insert(0);
        *count += 1;
        *count
    }

    fn clear(&self, message_id: Uuid) {
        self.attempts.lock().expect("retry attempts mutex poisoned").remove(&message_id);
    }
}

impl<App: Send + Sync + 'static> Step<App, IncomingStepContext<App>> for RetryStep {
    fn call<'a>(
        &'a self,
        ctx: &'a mut IncomingStepContext<App>,
        next: Next<'a, App, IncomingStepContext<App>>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let message_id = ctx.transport_message.headers.message_id();
            match next.call(ctx).await {
                Ok(()) => {
                    self.clear(message_id);
                    Ok(())
                }
                Err(err) => {
                    let attempt = self.record_failure(message_id);
                    if attempt < self.max_attempts {
                        tracing::warn!(%message_id, attempt, max = self.max_attempts, error = %err, "handler failed; will retry");
                        return Err(err);
                    }

                    tracing::error!(%message_id, attempt, error = %err, "message exhausted retries; forwarding to dead letter address");
                    let mut poisoned = ctx.transport_message.clone();
                    poisoned.headers.insert(ERROR_DETAILS, err.to_string());
                    self.transport.send(&self.dead_letter_address, poisoned).await?;
                    self.clear(message_id);
                    ctx.transaction_context.set_result(true, true).await?;
                    Ok(())
                }
            }
        })
    }
}
