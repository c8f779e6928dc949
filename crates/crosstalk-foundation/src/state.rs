use crate::error::WorkerError;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use std::sync::Arc;

/// Lifecycle of a worker process.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerState {
    Initializing,
    Running,
    Recovering { from_error: String },
    Draining,
    Stopped,
}

/// Validated state machine with a broadcast feed for observers.
pub struct StateManager {
    state: Arc<RwLock<WorkerState>>,
    state_tx: Sender<WorkerState>,
    state_rx: Receiver<WorkerState>,
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StateManager {
    pub fn new() -> Self {
        let (state_tx, state_rx) = crossbeam_channel::unbounded();
        Self {
            state: Arc::new(RwLock::new(WorkerState::Initializing)),
            state_tx,
            state_rx,
        }
    }

    pub fn transition(&self, next: WorkerState) -> Result<(), WorkerError> {
        let mut current = self.state.write();

        let valid = matches!(
            (&*current, &next),
            (WorkerState::Initializing, WorkerState::Running)
                | (WorkerState::Running, WorkerState::Recovering { .. })
                | (WorkerState::Running, WorkerState::Draining)
                | (WorkerState::Recovering { .. }, WorkerState::Running)
                | (WorkerState::Recovering { .. }, WorkerState::Draining)
                | (WorkerState::Draining, WorkerState::Stopped)
        );

        if !valid {
            return Err(WorkerError::Config(format!(
                "invalid state transition: {:?} -> {:?}",
                *current, next
            )));
        }

        tracing::info!("worker state: {:?} -> {:?}", *current, next);
        *current = next.clone();
        let _ = self.state_tx.send(next);
        Ok(())
    }

    pub fn current(&self) -> WorkerState {
        self.state.read().clone()
    }

    pub fn subscribe(&self) -> Receiver<WorkerState> {
        self.state_rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_lifecycle() {
        let mgr = StateManager::new();
        assert_eq!(mgr.current(), WorkerState::Initializing);
        mgr.transition(WorkerState::Running).unwrap();
        mgr.transition(WorkerState::Draining).unwrap();
        mgr.transition(WorkerState::Stopped).unwrap();
        assert_eq!(mgr.current(), WorkerState::Stopped);
    }

    #[test]
    fn recovery_loops_back_to_running() {
        let mgr = StateManager::new();
        mgr.transition(WorkerState::Running).unwrap();
        mgr.transition(WorkerState::Recovering {
            from_error: "stt reconnect".into(),
        })
        .unwrap();
        mgr.transition(WorkerState::Running).unwrap();
        assert_eq!(mgr.current(), WorkerState::Running);
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let mgr = StateManager::new();
        assert!(mgr.transition(WorkerState::Stopped).is_err());
        assert_eq!(mgr.current(), WorkerState::Initializing);
    }

    #[test]
    fn subscribers_observe_transitions() {
        let mgr = StateManager::new();
        let rx = mgr.subscribe();
        mgr.transition(WorkerState::Running).unwrap();
        assert_eq!(rx.try_recv().unwrap(), WorkerState::Running);
    }
}
