//! The ordered step chain and recursive invoker shared by the incoming and
//! outgoing pipelines (spec §4.4).

mod incoming;
mod outgoing;

pub use incoming::{IncomingStep, IncomingStepContext};
pub use outgoing::{Dispatch, OutgoingMessages, OutgoingStep, OutgoingStepContext};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A single step in a pipeline. `App` is the application handle type and
/// `Ctx` the step-context shape (`IncomingStepContext<App>` or
/// `OutgoingStepContext<App>`).
///
/// A step must call `next.call(ctx)` exactly once to continue the chain, or
/// return without calling it to deliberately short-circuit the remaining
/// steps.
pub trait Step<App, Ctx>: Send + Sync {
    /// Run this step, optionally delegating to the rest of the chain via
    /// `next`.
    fn call<'a>(
        &'a self,
        ctx: &'a mut Ctx,
        next: Next<'a, App, Ctx>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;
}

/// The remainder of the step chain, handed to the currently running step.
pub struct Next<'a, App, Ctx> {
    steps: &'a [Arc<dyn Step<App, Ctx>>],
    index: usize,
}

impl<'a, App, Ctx> Next<'a, App, Ctx>
where
    App: 'a,
    Ctx: 'a,
{
    /// Invoke the next step in the chain, or return `Ok(())` if this was
    /// the last step.
    pub fn call(self, ctx: &'a mut Ctx) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let Some(step) = self.steps.get(self.index) else {
                return Ok(());
            };
            let next = Next {
                steps: self.steps,
                index: self.index + 1,
            };
            step.call(ctx, next).await
        })
    }
}

/// An ordered, immutable list of steps, ready to drive messages through.
pub struct PipelineInvoker<App, Ctx> {
    steps: Arc<Vec<Arc<dyn Step<App, Ctx>>>>,
}

impl<App, Ctx> Clone for PipelineInvoker<App, Ctx> {
    fn clone(&self) -> Self {
        Self {
            steps: self.steps.clone(),
        }
    }
}

impl<App, Ctx> PipelineInvoker<App, Ctx> {
    /// Drive `ctx` through every step of the pipeline, starting from the
    /// first one.
    pub async fn invoke(&self, ctx: &mut Ctx) -> anyhow::Result<()> {
        let steps = self.steps.as_slice();
        let next = Next { steps, index: 0 };
        next.call(ctx).await
    }

    /// How many steps this pipeline has.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether this pipeline has no steps at all.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Builds an ordered [`PipelineInvoker`] one step at a time.
///
/// This is the systems-language replacement for the source's dynamic
/// decorator registration (spec §9, "Plugin/decorator graph"): the final
/// chain is composed explicitly at application-construction time rather
/// than rewritten at runtime.
pub struct Pipeline<App, Ctx> {
    steps: Vec<Arc<dyn Step<App, Ctx>>>,
}

impl<App, Ctx> Default for Pipeline<App, Ctx> {
    fn default() -> Self {
        Self { steps: Vec::new() }
    }
}

impl<App, Ctx> Pipeline<App, Ctx> {
    /// Start an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step to the end of the chain.
    pub fn step(mut self, step: impl Step<App, Ctx> + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Freeze the chain into an invoker.
    pub fn build(self) -> PipelineInvoker<App, Ctx> {
        PipelineInvoker {
            steps: Arc::new(self.steps),
        }
    }
}
