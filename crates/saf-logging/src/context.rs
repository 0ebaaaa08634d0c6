//! Router context injection for multi-router logging
//!
//! A process may run several forwarding engines side by side (one per
//! simulated router, say). [`RouterContextGuard`] records which router the
//! current thread is working for, and [`RouterContextLayer`](crate::layers::RouterContextLayer)
//! attaches that identity to every span opened while the guard is alive.

use std::cell::RefCell;

use uuid::Uuid;

/// Router context data stored in thread-local storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterContextData {
    /// Human-readable router name
    pub router: String,
    /// Unique id for this router instance
    pub instance_id: Uuid,
}

thread_local! {
    static ROUTER_CONTEXT: RefCell<Option<RouterContextData>> = const { RefCell::new(None) };
}

/// RAII guard for router context
///
/// Sets the router context for the current thread and restores the previous
/// one when dropped.
///
/// # Example
///
/// ```
/// use saf_logging::RouterContextGuard;
///
/// {
///     let _guard = RouterContextGuard::new("edge-1");
///     assert_eq!(RouterContextGuard::current_router().as_deref(), Some("edge-1"));
///     tracing::info!("Forwarding interest");
/// }
/// assert!(RouterContextGuard::current_router().is_none());
/// ```
pub struct RouterContextGuard {
    previous: Option<RouterContextData>,
}

impl RouterContextGuard {
    /// Set `router` as the context with a fresh instance id
    pub fn new(router: impl Into<String>) -> Self {
        Self::with_instance_id(router, Uuid::new_v4())
    }

    /// Set `router` as the context with a caller-chosen instance id
    pub fn with_instance_id(router: impl Into<String>, instance_id: Uuid) -> Self {
        let new_ctx = RouterContextData {
            router: router.into(),
            instance_id,
        };
        let previous = ROUTER_CONTEXT.with(|ctx| ctx.borrow_mut().replace(new_ctx));
        Self { previous }
    }

    pub fn current() -> Option<RouterContextData> {
        ROUTER_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    pub fn current_router() -> Option<String> {
        Self::current().map(|ctx| ctx.router)
    }

    pub fn current_instance_id() -> Option<Uuid> {
        Self::current().map(|ctx| ctx.instance_id)
    }
}

impl Drop for RouterContextGuard {
    fn drop(&mut self) {
        ROUTER_CONTEXT.with(|ctx| *ctx.borrow_mut() = self.previous.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_context_guard() {
        assert!(RouterContextGuard::current().is_none());

        {
            let _guard = RouterContextGuard::new("A");
            let ctx = RouterContextGuard::current().unwrap();
            assert_eq!(ctx.router, "A");
        }

        assert!(RouterContextGuard::current().is_none());
    }

    #[test]
    fn test_nested_contexts() {
        {
            let _guard_a = RouterContextGuard::new("A");
            assert_eq!(RouterContextGuard::current_router(), Some("A".to_string()));

            {
                let _guard_b = RouterContextGuard::new("B");
                assert_eq!(RouterContextGuard::current_router(), Some("B".to_string()));
            }

            // Restored after B's guard drops
            assert_eq!(RouterContextGuard::current_router(), Some("A".to_string()));
        }

        assert!(RouterContextGuard::current_router().is_none());
    }

    #[test]
    fn test_with_instance_id() {
        let instance_id = Uuid::new_v4();
        let _guard = RouterContextGuard::with_instance_id("X", instance_id);
        assert_eq!(RouterContextGuard::current_instance_id(), Some(instance_id));
    }
}
