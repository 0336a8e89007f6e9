//! Single-writer committer
//!
//! Endorsement (running the contract) happens concurrently in the callers'
//! tasks; commits are funnelled through one actor so that read-set validation
//! and write application never interleave.
//!
//! ```text
//!   endorse (task A) ──┐
//!   endorse (task B) ──┼──► mpsc mailbox ──► CommitterActor ──► WorldState::commit
//!   endorse (task C) ──┘         (bounded)        (one task)      (validate + apply)
//! ```
//!
//! A read/write set whose reads went stale is rejected with a conflict; the
//! committer never retries it.

use crate::{
    metrics::Metrics,
    state::{ReadWriteSet, Version, WorldState},
    Error, Result,
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Message sent to the committer actor
#[derive(Debug)]
pub enum CommitMessage {
    /// Validate and apply a read/write set
    Commit {
        /// Set produced by endorsement
        rwset: ReadWriteSet,
        /// Version assigned, or the conflict
        response: oneshot::Sender<Result<Version>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that owns the commit path
pub struct CommitterActor {
    world: Arc<dyn WorldState>,
    mailbox: mpsc::Receiver<CommitMessage>,
    metrics: Metrics,
}

impl std::fmt::Debug for CommitterActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitterActor")
            .field("height", &self.world.height())
            .finish_non_exhaustive()
    }
}

impl CommitterActor {
    /// Create new actor
    pub fn new(
        world: Arc<dyn WorldState>,
        mailbox: mpsc::Receiver<CommitMessage>,
        metrics: Metrics,
    ) -> Self {
        Self {
            world,
            mailbox,
            metrics,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                CommitMessage::Commit { rwset, response } => {
                    let result = self.commit(&rwset);
                    let _ = response.send(result);
                }
                CommitMessage::Shutdown => break,
            }
        }
        tracing::debug!("Committer stopped");
    }

    fn commit(&self, rwset: &ReadWriteSet) -> Result<Version> {
        match self.world.commit(rwset) {
            Ok(version) => {
                self.metrics.record_commit("committed");
                Ok(version)
            }
            Err(e) => {
                let outcome = match e {
                    Error::ReadConflict { .. } => "conflict",
                    _ => "failed",
                };
                self.metrics.record_commit(outcome);
                tracing::warn!(tx_id = %rwset.tx_id, error = %e, "Commit aborted");
                Err(e)
            }
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Clone, Debug)]
pub struct CommitterHandle {
    sender: mpsc::Sender<CommitMessage>,
}

impl CommitterHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<CommitMessage>) -> Self {
        Self { sender }
    }

    /// Submit a read/write set for commit
    pub async fn commit(&self, rwset: ReadWriteSet) -> Result<Version> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(CommitMessage::Commit {
                rwset,
                response: tx,
            })
            .await
            .map_err(|_| Error::Concurrency("Committer mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(CommitMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Committer mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the committer actor
///
/// The join handle resolves once the actor has released the world state.
pub fn spawn_committer(
    world: Arc<dyn WorldState>,
    mailbox_capacity: usize,
    metrics: Metrics,
) -> (CommitterHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(mailbox_capacity); // Bounded channel for backpressure
    let actor = CommitterActor::new(world, rx, metrics);

    let task = tokio::spawn(async move {
        actor.run().await;
    });

    (CommitterHandle::new(tx), task)
}
