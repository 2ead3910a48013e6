//! Polls a transport address and drives received messages through the
//! incoming pipeline with bounded parallelism (spec §4.5, §9 scenarios C/D).
//!
//! Grounded on the source's `AnyioWorker`: a semaphore gates how many
//! messages are in flight at once, and a message being processed finishes
//! even if the worker is asked to stop. `anyio` expresses the second part
//! with a shielded cancel scope; Tokio has no equivalent primitive, so this
//! spawns each processing message as its own task and `stop` joins every
//! handle instead of cancelling them (spec §10, design notes).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;

use crate::ambient::with_ambient_context;
use crate::context::TransactionContext;
use crate::pipeline::{IncomingStepContext, PipelineInvoker};
use crate::transport::Transport;

/// How often an empty queue is re-polled.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Configuration for one [`Worker`].
#[derive(Clone)]
pub struct WorkerConfig {
    /// The transport address this worker receives from.
    pub address: String,
    /// How many messages may be processed concurrently.
    pub max_parallelism: usize,
    /// How long to wait before re-polling an empty queue.
    pub poll_interval: Duration,
}

impl WorkerConfig {
    /// Build a config with the default poll interval.
    pub fn new(address: impl Into<String>, max_parallelism: usize) -> Self {
        Self {
            address: address.into(),
            max_parallelism,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Drives messages received on one address through an incoming pipeline.
pub struct Worker<App> {
    config: WorkerConfig,
    transport: Arc<dyn Transport>,
    pipeline: PipelineInvoker<App, IncomingStepContext<App>>,
    app: App,
}

/// A handle to a running worker's background loop.
pub struct WorkerHandle {
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    loop_handle: JoinHandle<()>,
}

impl WorkerHandle {
    /// Ask the worker to stop polling for new messages, then wait for every
    /// in-flight message to finish processing. Never cancels a message mid
    /// pipeline (spec §4.5, "a running handler always completes").
    pub async fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();
        let _ = self.loop_handle.await;
    }
}

impl<App> Worker<App>
where
    App: Clone + Send + Sync + 'static,
{
    /// Build a worker around a transport, a pipeline, and the application
    /// handle every message context is given.
    pub fn new(config: WorkerConfig, transport: Arc<dyn Transport>, pipeline: PipelineInvoker<App, IncomingStepContext<App>>, app: App) -> Self {
        Self {
            config,
            transport,
            pipeline,
            app,
        }
    }

    /// Start the worker's receive loop as a background task.
    pub fn start(self: Arc<Self>) -> WorkerHandle {
        let running = Arc::new(AtomicBool::new(true));
        let shutdown = Arc::new(Notify::new());
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallelism.max(1)));

        let worker = self.clone();
        let running_loop = running.clone();
        let shutdown_loop = shutdown.clone();

        let loop_handle = tokio::spawn(async move {
            let mut in_flight: Vec<JoinHandle<()>> = Vec::new();

            while running_loop.load(Ordering::SeqCst) {
                let permit = tokio::select! {
                    permit = semaphore.clone().acquire_owned() => permit.expect("semaphore never closed"),
                    _ = shutdown_loop.notified() => break,
                };

                let received = worker.transport.receive(&worker.config.address).await;
                let transport_message = match received {
                    Ok(Some(message)) => message,
                    Ok(None) => {
                        drop(permit);
                        tokio::select! {
                            _ = tokio::time::sleep(worker.config.poll_interval) => continue,
                            _ = shutdown_loop.notified() => break,
                        }
                    }
                    Err(err) => {
                        tracing::error!(address = %worker.config.address, error = %err, "transport receive failed");
                        drop(permit);
                        tokio::time::sleep(worker.config.poll_interval).await;
                        continue;
                    }
                };

                let worker = worker.clone();
                let task = tokio::spawn(async move {
                    let _permit = permit;
                    worker.process_one(transport_message).await;
                });
                in_flight.retain(|h| !h.is_finished());
                in_flight.push(task);
            }

            for task in in_flight {
                let _ = task.await;
            }
        });

        WorkerHandle {
            running,
            shutdown,
            loop_handle,
        }
    }

    async fn process_one(&self, transport_message: mersal_types::TransportMessage) {
        let transaction_context = Arc::new(TransactionContext::new());
        let mut ctx = IncomingStepContext::new(transport_message.clone(), transaction_context.clone(), self.app.clone());

        let invoke_result = with_ambient_context(transaction_context.clone(), async { self.pipeline.invoke(&mut ctx).await }).await;

        if let Err(err) = &invoke_result {
            tracing::warn!(error = %err, "incoming pipeline returned an error");
        }

        let (_, should_ack) = transaction_context.result().await;
        let complete_result = transaction_context.complete().await;
        transaction_context.close().await;

        let redeliver = complete_result.is_err() || !should_ack;
        if redeliver {
            if let Err(err) = self.transport.send(&self.config.address, transport_message).await {
                tracing::error!(error = %err, "failed to redeliver nacked message");
            }
        }
    }
}
