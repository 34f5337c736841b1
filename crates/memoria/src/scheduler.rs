//! Background maintenance
//!
//! A single tokio task enforces retention on a fixed interval, independent of
//! request traffic: it prunes every known conversation, replays durable
//! writes queued during an outage, and runs the preference-confidence decay
//! pass. Each step takes the same per-conversation / per-user locks as
//! foreground operations, so maintenance never races an in-flight read.

use crate::preferences::PreferenceLearner;
use crate::store::MemoryStore;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::watch;

/// Handle to the periodic maintenance task
pub struct MaintenanceScheduler {
    shutdown: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
}

impl MaintenanceScheduler {
    /// Spawn the maintenance loop
    pub fn spawn(
        store: Arc<MemoryStore>,
        learner: Arc<PreferenceLearner>,
        interval: std::time::Duration,
    ) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // the first tick fires immediately; skip it so a fresh engine
            // doesn't prune before anything is stored
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        run_tick(&store, &learner).await;
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::debug!("maintenance scheduler stopped");
        });

        Self { shutdown, handle }
    }

    /// Stop the loop and wait for the in-flight tick to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

async fn run_tick(store: &Arc<MemoryStore>, learner: &Arc<PreferenceLearner>) {
    let conversations = store.conversation_ids();

    let prunes = conversations.iter().map(|cid| {
        let store = store.clone();
        let cid = cid.clone();
        async move {
            match store.prune(&cid).await {
                Ok(removed) => removed,
                Err(e) => {
                    tracing::warn!(conversation_id = %cid, error = %e, "prune failed");
                    0
                }
            }
        }
    });
    let pruned: usize = join_all(prunes).await.into_iter().sum();

    let replayed = store.replay_pending().await;
    let decayed = learner.decay_confidence().await;

    if pruned > 0 || replayed > 0 || decayed > 0 {
        tracing::debug!(pruned, replayed, decayed, "maintenance tick");
    }
}
