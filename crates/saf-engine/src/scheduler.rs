//! Periodic engine maintenance
//!
//! The [`UpdateScheduler`] drives the two timers of a [`ForwardingEngine`]
//! from one tokio task: the table update every `update_interval` and the
//! limiter refill every `fill_interval`. Both run in the same task, so they
//! never overlap; a tick that comes due while another is running is
//! delayed rather than bunched up.
//!
//! The task runs inside an `update_scheduler` span attributed to the
//! engine's router.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{Instrument, debug, info_span};

use saf_core::RouterContext;

use crate::engine::ForwardingEngine;

/// Handle to a running update loop
pub struct UpdateScheduler {
    shutdown: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl UpdateScheduler {
    /// Start the update loop for `engine`
    ///
    /// Must be called within a tokio runtime. The intervals come from the
    /// engine's configuration.
    pub fn spawn<R>(engine: Arc<ForwardingEngine<R>>) -> Self
    where
        R: RouterContext + 'static,
    {
        let (shutdown, _) = broadcast::channel(1);
        let handle = Self::spawn_with_shutdown(engine, shutdown.subscribe());
        Self { shutdown, handle }
    }

    /// Start the update loop, stopping when `shutdown_rx` fires
    pub fn spawn_with_shutdown<R>(
        engine: Arc<ForwardingEngine<R>>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()>
    where
        R: RouterContext + 'static,
    {
        let update_every = engine.config().update_interval;
        let fill_every = engine.config().limiter.fill_interval;
        let span = {
            let _context = engine.router_context();
            info_span!("update_scheduler", router = %engine.router_name())
        };

        let task = async move {
            let mut update = interval(update_every);
            update.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut fill = interval(fill_every);
            fill.set_missed_tick_behavior(MissedTickBehavior::Delay);

            // Both intervals fire immediately; skip that first tick
            update.tick().await;
            fill.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!(router = %engine.router_name(), "Update scheduler shutting down");
                        break;
                    }
                    _ = update.tick() => {
                        engine.tick();
                    }
                    _ = fill.tick() => {
                        engine.refill_limiters();
                    }
                }
            }
        };
        tokio::spawn(task.instrument(span))
    }

    /// Signal the loop to stop and wait for it
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.await;
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
