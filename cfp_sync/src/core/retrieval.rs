//! # Retrieval state machine
//!
//! Every fetch cycle owns one [`Retrieval`]. It starts `Idle`, moves to
//! `Running` when the request goes out and ends in `Succeeded` or `Failed`.
//! The commit and discard decisions of the loaders and the aggregator are
//! taken from these transitions, never from ad hoc flags.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{SyncError, SyncResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

impl RetrievalState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RetrievalState::Succeeded | RetrievalState::Failed)
    }

    pub fn can_transition_to(self, next: RetrievalState) -> bool {
        matches!(
            (self, next),
            (RetrievalState::Idle, RetrievalState::Running)
                | (RetrievalState::Running, RetrievalState::Succeeded)
                | (RetrievalState::Running, RetrievalState::Failed)
        )
    }
}

impl std::fmt::Display for RetrievalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RetrievalState::Idle => "idle",
            RetrievalState::Running => "running",
            RetrievalState::Succeeded => "succeeded",
            RetrievalState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// State of one fetch cycle, optionally mirrored to a watch channel that
/// presentation code can observe.
pub struct Retrieval {
    state: RetrievalState,
    publish: Option<Arc<watch::Sender<RetrievalState>>>,
}

impl Default for Retrieval {
    fn default() -> Self {
        Self::new()
    }
}

impl Retrieval {
    pub fn new() -> Self {
        Self {
            state: RetrievalState::Idle,
            publish: None,
        }
    }

    /// A cycle whose transitions are also published on `publish`.
    pub fn published(publish: Arc<watch::Sender<RetrievalState>>) -> Self {
        publish.send_replace(RetrievalState::Idle);
        Self {
            state: RetrievalState::Idle,
            publish: Some(publish),
        }
    }

    pub fn state(&self) -> RetrievalState {
        self.state
    }

    pub fn start(&mut self) -> SyncResult<()> {
        self.advance(RetrievalState::Running)
    }

    pub fn succeed(&mut self) -> SyncResult<()> {
        self.advance(RetrievalState::Succeeded)
    }

    pub fn fail(&mut self) -> SyncResult<()> {
        self.advance(RetrievalState::Failed)
    }

    fn advance(&mut self, next: RetrievalState) -> SyncResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(SyncError::IllegalTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        if let Some(publish) = &self.publish {
            publish.send_replace(next);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Retrieval, RetrievalState};
    use std::sync::Arc;
    use tokio::sync::watch;

    #[test]
    fn happy_path_transitions() {
        let mut retrieval = Retrieval::new();
        retrieval.start().unwrap();
        retrieval.succeed().unwrap();
        assert_eq!(retrieval.state(), RetrievalState::Succeeded);
        assert!(retrieval.state().is_terminal());
    }

    #[test]
    fn rejects_skipping_running_and_leaving_terminal_states() {
        let mut retrieval = Retrieval::new();
        assert!(retrieval.succeed().is_err());
        retrieval.start().unwrap();
        retrieval.fail().unwrap();
        assert!(retrieval.start().is_err());
        assert!(retrieval.succeed().is_err());
        assert_eq!(retrieval.state(), RetrievalState::Failed);
    }

    #[test]
    fn published_cycle_mirrors_transitions() {
        let (tx, rx) = watch::channel(RetrievalState::Succeeded);
        let mut retrieval = Retrieval::published(Arc::new(tx));
        assert_eq!(*rx.borrow(), RetrievalState::Idle);
        retrieval.start().unwrap();
        assert_eq!(*rx.borrow(), RetrievalState::Running);
        retrieval.fail().unwrap();
        assert_eq!(*rx.borrow(), RetrievalState::Failed);
    }
}
