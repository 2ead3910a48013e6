//! The per-message transaction context: hooks, items, and the
//! commit/ack/rollback/nack/close lifecycle (spec §4.1).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex as SyncMutex;

use tokio::sync::Mutex;
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::{Error, Result};

/// The correlation identifier of the message currently being processed,
/// stashed in the transaction context's items bag by
/// `DeserializeIncomingMessageStep` so any message sent within the same
/// transaction can carry it onward (spec §4.4 outgoing step 2).
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

/// The future type a [`Hook`] returns.
pub type HookFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

/// An async callback registered against one of a transaction context's
/// commit/rollback/ack/nack/close phases.
///
/// Implemented for any `Fn(&TransactionContext) -> HookFuture` closure, so
/// callers normally register hooks with an `async move |ctx| { .. }`-shaped
/// closure rather than implementing this trait directly.
pub trait Hook: Send + Sync {
    /// Run this hook against the completing/closing context.
    fn call<'a>(&'a self, context: &'a TransactionContext) -> HookFuture<'a>;
}

impl<F> Hook for F
where
    F: for<'a> Fn(&'a TransactionContext) -> HookFuture<'a> + Send + Sync,
{
    fn call<'a>(&'a self, context: &'a TransactionContext) -> HookFuture<'a> {
        (self)(context)
    }
}

type BoxedHook = Box<dyn Hook>;

#[derive(Default)]
struct HookLists {
    on_commit: Vec<BoxedHook>,
    on_rollback: Vec<BoxedHook>,
    on_ack: Vec<BoxedHook>,
    on_nack: Vec<BoxedHook>,
    on_close: Vec<BoxedHook>,
}

struct Flags {
    should_commit: bool,
    should_ack: bool,
    completed: bool,
    closed: bool,
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            should_commit: false,
            should_ack: false,
            completed: false,
            closed: false,
        }
    }
}

/// Per-message unit of work.
///
/// Owns the hook lists that decide what happens once a message has been
/// handled, plus a keyed bag (`items`) that pipeline steps use to stash
/// per-message state (the deserialized message, saga data, a dedicated
/// serializer, ...). A `TransactionContext` belongs to exactly one
/// processing task at a time (spec §5) and must not be shared across tasks.
pub struct TransactionContext {
    hooks: Mutex<HookLists>,
    flags: Mutex<Flags>,
    items: SyncMutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl Default for TransactionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionContext {
    /// Create a fresh, open transaction context.
    pub fn new() -> Self {
        Self {
            hooks: Mutex::new(HookLists::default()),
            flags: Mutex::new(Flags::default()),
            items: SyncMutex::new(HashMap::new()),
        }
    }

    async fn push_hook(&self, pick: impl FnOnce(&mut HookLists) -> &mut Vec<BoxedHook>, hook: BoxedHook) -> Result<()> {
        let flags = self.flags.lock().await;
        if flags.closed {
            return Err(Error::InvalidState("cannot register a hook on a closed transaction context"));
        }
        drop(flags);
        let mut hooks = self.hooks.lock().await;
        pick(&mut hooks).push(hook);
        Ok(())
    }

    /// Register a callback to run if the message commits.
    pub async fn on_commit<H>(&self, hook: H) -> Result<()>
    where
        H: Hook + 'static,
    {
        self.push_hook(|h| &mut h.on_commit, Box::new(hook)).await
    }

    /// Register a callback to run if the message is rolled back.
    pub async fn on_rollback<H>(&self, hook: H) -> Result<()>
    where
        H: Hook + 'static,
    {
        self.push_hook(|h| &mut h.on_rollback, Box::new(hook)).await
    }

    /// Register a callback to run if the message acks.
    pub async fn on_ack<H>(&self, hook: H) -> Result<()>
    where
        H: Hook + 'static,
    {
        self.push_hook(|h| &mut h.on_ack, Box::new(hook)).await
    }

    /// Register a callback to run if the message nacks.
    pub async fn on_nack<H>(&self, hook: H) -> Result<()>
    where
        H: Hook + 'static,
    {
        self.push_hook(|h| &mut h.on_nack, Box::new(hook)).await
    }

    /// Register a callback that always runs when the context closes.
    pub async fn on_close<H>(&self, hook: H) -> Result<()>
    where
        H: Hook + 'static,
    {
        self.push_hook(|h| &mut h.on_close, Box::new(hook)).await
    }

    /// Set the commit/ack outcome. Last writer wins; only allowed before
    /// [`TransactionContext::complete`] has run.
    pub async fn set_result(&self, commit: bool, ack: bool) -> Result<()> {
        let mut flags = self.flags.lock().await;
        if flags.completed {
            return Err(Error::InvalidState("cannot set the result of an already-completed transaction context"));
        }
        flags.should_commit = commit;
        flags.should_ack = ack;
        Ok(())
    }

    /// Read the current commit/ack flags without completing the context.
    pub async fn result(&self) -> (bool, bool) {
        let flags = self.flags.lock().await;
        (flags.should_commit, flags.should_ack)
    }

    /// Run the commit-or-rollback and ack-or-nack hook phases exactly once.
    ///
    /// Reads `should_commit`/`should_ack` atomically, then: runs `on_commit`
    /// hooks (in order) if committing, else `on_rollback`; then runs
    /// `on_ack` hooks if acking, else `on_nack`. A failing commit hook
    /// aborts the remaining commit hooks, forces `should_ack` to false, runs
    /// `on_nack`, and returns the error. A failing ack/nack hook is logged
    /// and swallowed: the transaction's outcome is already decided by then.
    pub async fn complete(&self) -> Result<()> {
        let (should_commit, mut should_ack) = {
            let mut flags = self.flags.lock().await;
            if flags.completed {
                return Err(Error::InvalidState("transaction context already completed"));
            }
            flags.completed = true;
            (flags.should_commit, flags.should_ack)
        };

        let (commit_phase, rollback_phase, ack_phase, nack_phase) = {
            let mut hooks = self.hooks.lock().await;
            (
                std::mem::take(&mut hooks.on_commit),
                std::mem::take(&mut hooks.on_rollback),
                std::mem::take(&mut hooks.on_ack),
                std::mem::take(&mut hooks.on_nack),
            )
        };

        let commit_failure = if should_commit {
            Self::run_phase(&commit_phase, self).await.err()
        } else {
            Self::run_phase(&rollback_phase, self).await;
            None
        };

        if let Some(err) = commit_failure {
            should_ack = false;
            let mut flags = self.flags.lock().await;
            flags.should_ack = false;
            drop(flags);
            Self::run_phase_swallowing(&nack_phase, self).await;
            return Err(err);
        }

        if should_ack {
            Self::run_phase_swallowing(&ack_phase, self).await;
        } else {
            Self::run_phase_swallowing(&nack_phase, self).await;
        }

        Ok(())
    }

    /// Run `on_close` hooks exactly once. Each hook's failure is caught and
    /// logged individually; `close` itself never returns an error so
    /// callers can run it unconditionally on every exit path.
    pub async fn close(&self) {
        let already_closed = {
            let mut flags = self.flags.lock().await;
            let was_closed = flags.closed;
            flags.closed = true;
            was_closed
        };
        if already_closed {
            return;
        }

        let close_phase = {
            let mut hooks = self.hooks.lock().await;
            std::mem::take(&mut hooks.on_close)
        };
        Self::run_phase_swallowing(&close_phase, self).await;
    }

    async fn run_phase(phase: &[BoxedHook], ctx: &TransactionContext) -> anyhow::Result<()> {
        for hook in phase {
            hook.call(ctx).await?;
        }
        Ok(())
    }

    async fn run_phase_swallowing(phase: &[BoxedHook], ctx: &TransactionContext) {
        for hook in phase {
            if let Err(err) = hook.call(ctx).await {
                error!(error = %err, "transaction hook failed; swallowing");
            }
        }
    }

    /// Stash a value in the per-message items bag, keyed by its type.
    /// Overwrites any previous value of the same type.
    pub fn insert_item<T: Any + Send + Sync>(&self, value: T) {
        self.items.lock().expect("items mutex poisoned").insert(TypeId::of::<T>(), Box::new(value));
        debug!(type_name = std::any::type_name::<T>(), "stashed transaction item");
    }

    /// Clone a value out of the items bag by type.
    pub fn get_item<T: Any + Send + Sync + Clone>(&self) -> Option<T> {
        self.items
            .lock()
            .expect("items mutex poisoned")
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<T>())
            .cloned()
    }

    /// Remove and return a value from the items bag by type.
    pub fn take_item<T: Any + Send + Sync>(&self) -> Option<T> {
        self.items
            .lock()
            .expect("items mutex poisoned")
            .remove(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    /// Whether a value of type `T` is present in the items bag.
    pub fn has_item<T: Any + Send + Sync>(&self) -> bool {
        self.items.lock().expect("items mutex poisoned").contains_key(&TypeId::of::<T>())
    }
}

/// Build a boxed hook from an async closure, for ergonomic registration:
/// `ctx.on_commit(hook(|ctx| async move { .. })).await`.
pub fn hook<F, Fut>(f: F) -> impl Hook
where
    F: Fn(&TransactionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    move |ctx: &TransactionContext| -> HookFuture<'_> { Box::pin(f(ctx)) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn complete_runs_only_the_decided_branch() {
        let ctx = TransactionContext::new();
        let commit_calls = Arc::new(AtomicUsize::new(0));
        let rollback_calls = Arc::new(AtomicUsize::new(0));
        let ack_calls = Arc::new(AtomicUsize::new(0));
        let nack_calls = Arc::new(AtomicUsize::new(0));

        {
            let c = commit_calls.clone();
            ctx.on_commit(hook(move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }))
            .await
            .unwrap();
        }
        {
            let c = rollback_calls.clone();
            ctx.on_rollback(hook(move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }))
            .await
            .unwrap();
        }
        {
            let c = ack_calls.clone();
            ctx.on_ack(hook(move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }))
            .await
            .unwrap();
        }
        {
            let c = nack_calls.clone();
            ctx.on_nack(hook(move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }))
            .await
            .unwrap();
        }

        ctx.set_result(true, true).await.unwrap();
        ctx.complete().await.unwrap();

        assert_eq!(commit_calls.load(Ordering::SeqCst), 1);
        assert_eq!(rollback_calls.load(Ordering::SeqCst), 0);
        assert_eq!(ack_calls.load(Ordering::SeqCst), 1);
        assert_eq!(nack_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn last_set_result_wins() {
        let ctx = TransactionContext::new();
        ctx.set_result(true, true).await.unwrap();
        ctx.set_result(false, false).await.unwrap();
        assert_eq!(ctx.result().await, (false, false));
    }

    #[tokio::test]
    async fn failing_commit_hook_forces_nack_and_skips_remaining_commit_hooks() {
        let ctx = TransactionContext::new();
        let second_commit_ran = Arc::new(AtomicUsize::new(0));
        let nack_ran = Arc::new(AtomicUsize::new(0));

        ctx.on_commit(hook(|_| async { Err(anyhow::anyhow!("boom")) })).await.unwrap();
        {
            let c = second_commit_ran.clone();
            ctx.on_commit(hook(move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }))
            .await
            .unwrap();
        }
        {
            let c = nack_ran.clone();
            ctx.on_nack(hook(move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }))
            .await
            .unwrap();
        }

        ctx.set_result(true, true).await.unwrap();
        let result = ctx.complete().await;

        assert!(result.is_err());
        assert_eq!(second_commit_ran.load(Ordering::SeqCst), 0);
        assert_eq!(nack_ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ack_phase_failure_is_swallowed() {
        let ctx = TransactionContext::new();
        ctx.on_ack(hook(|_| async { Err(anyhow::anyhow!("ack hook exploded")) })).await.unwrap();
        ctx.set_result(true, true).await.unwrap();
        assert!(ctx.complete().await.is_ok());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_runs_in_order() {
        let ctx = TransactionContext::new();
        let order = Arc::new(SyncMutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            ctx.on_close(hook(move |_| {
                let order = order.clone();
                async move {
                    order.lock().unwrap().push(i);
                    Ok(())
                }
            }))
            .await
            .unwrap();
        }

        ctx.close().await;
        ctx.close().await;

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn registering_a_hook_after_close_fails() {
        let ctx = TransactionContext::new();
        ctx.close().await;
        let result = ctx.on_commit(hook(|_| async { Ok(()) })).await;
        assert!(matches!(result, Err(Error::InvalidState(_))));
    }

    #[tokio::test]
    async fn items_bag_round_trips_by_type() {
        let ctx = TransactionContext::new();
        #[derive(Clone, PartialEq, Debug)]
        struct Marker(u32);

        assert!(ctx.get_item::<Marker>().is_none());
        ctx.insert_item(Marker(7));
        assert_eq!(ctx.get_item::<Marker>(), Some(Marker(7)));
        assert_eq!(ctx.take_item::<Marker>(), Some(Marker(7)));
        assert!(ctx.get_item::<Marker>().is_none());
    }
}
