//! Task-local slot holding the currently active [`TransactionContext`]
//! (spec §4.2).
//!
//! Tasks, not threads, are the unit of migration under Tokio, so this uses
//! `tokio::task_local!` rather than a thread-local: a processing task's
//! ambient context must stay with it even if the runtime moves it to a
//! different worker thread between polls.

use std::sync::Arc;

use crate::context::TransactionContext;

tokio::task_local! {
    static CURRENT: Arc<TransactionContext>;
}

/// Run `f` with `ctx` installed as the ambient transaction context for the
/// duration of the future it returns. Restoration on every exit path
/// (including panics unwinding through it) is guaranteed by
/// `tokio::task_local`'s scoped `scope` future.
pub async fn with_ambient_context<F, T>(ctx: Arc<TransactionContext>, f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    CURRENT.scope(ctx, f).await
}

/// Look up the ambient transaction context, if one is installed for the
/// currently running task.
pub fn current() -> Option<Arc<TransactionContext>> {
    CURRENT.try_with(|ctx| ctx.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ambient_context_is_visible_inside_scope_and_absent_outside() {
        assert!(current().is_none());

        let ctx = Arc::new(TransactionContext::new());
        let ctx_for_scope = ctx.clone();
        with_ambient_context(ctx_for_scope, async {
            let seen = current().expect("ambient context should be set");
            assert!(Arc::ptr_eq(&seen, &ctx));
        })
        .await;

        assert!(current().is_none());
    }

    #[tokio::test]
    async fn parallel_tasks_see_independent_ambient_contexts() {
        let a = Arc::new(TransactionContext::new());
        let b = Arc::new(TransactionContext::new());

        let task_a = tokio::spawn(with_ambient_context(a.clone(), async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            current().map(|c| Arc::ptr_eq(&c, &a))
        }));
        let task_b = tokio::spawn(with_ambient_context(b.clone(), async move {
            current().map(|c| Arc::ptr_eq(&c, &b))
        }));

        assert_eq!(task_a.await.unwrap(), Some(true));
        assert_eq!(task_b.await.unwrap(), Some(true));
    }
}
