use std::fmt;

use hive_core::AlgorithmId;
use serde::{Deserialize, Serialize};

/// Lifecycle of one algorithm within one event slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionState {
    NotReady,
    Ready,
    Scheduled,
    Running,
    Done,
    Failed,
}

impl ExecutionState {
    pub const ALL: [ExecutionState; 6] = [
        Self::NotReady,
        Self::Ready,
        Self::Scheduled,
        Self::Running,
        Self::Done,
        Self::Failed,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// The only legal moves; nothing skips a state.
    pub fn can_transition_to(self, next: ExecutionState) -> bool {
        matches!(
            (self, next),
            (Self::NotReady, Self::Ready)
                | (Self::Ready, Self::Scheduled)
                | (Self::Scheduled, Self::Running)
                | (Self::Running, Self::Done)
                | (Self::Running, Self::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotReady => "NotReady",
            Self::Ready => "Ready",
            Self::Scheduled => "Scheduled",
            Self::Running => "Running",
            Self::Done => "Done",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{from} -> {to}")]
pub struct IllegalTransition {
    pub from: ExecutionState,
    pub to: ExecutionState,
}

/// Execution states of every algorithm for one event slot.
///
/// Nodes downstream of a failure are flagged as blocked: they keep their
/// `NotReady`/`Ready` state but will never be dispatched, and count as
/// finished for completion purposes.
#[derive(Debug, Clone)]
pub struct AlgsExecutionStates {
    states: Vec<ExecutionState>,
    blocked: Vec<bool>,
}

impl AlgsExecutionStates {
    pub fn new(size: usize) -> Self {
        Self {
            states: vec![ExecutionState::NotReady; size],
            blocked: vec![false; size],
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn get(&self, id: AlgorithmId) -> ExecutionState {
        self.states[id.index()]
    }

    pub fn is_blocked(&self, id: AlgorithmId) -> bool {
        self.blocked[id.index()]
    }

    /// Move a node to `next` if the transition is legal.
    pub fn update(&mut self, id: AlgorithmId, next: ExecutionState) -> Result<(), IllegalTransition> {
        let current = self.states[id.index()];
        if !current.can_transition_to(next) {
            return Err(IllegalTransition {
                from: current,
                to: next,
            });
        }
        self.states[id.index()] = next;
        Ok(())
    }

    /// Block a node that has not been handed to the resource pool yet.
    /// Returns whether the node is now blocked.
    pub fn block(&mut self, id: AlgorithmId) -> bool {
        match self.states[id.index()] {
            ExecutionState::NotReady | ExecutionState::Ready => {
                self.blocked[id.index()] = true;
                true
            }
            _ => false,
        }
    }

    /// Whether the node may be dispatched right now.
    pub fn is_dispatchable(&self, id: AlgorithmId) -> bool {
        self.states[id.index()] == ExecutionState::Ready && !self.blocked[id.index()]
    }

    /// Every node is `Done`, `Failed`, or blocked.
    pub fn is_complete(&self) -> bool {
        self.states
            .iter()
            .zip(&self.blocked)
            .all(|(s, &blocked)| s.is_terminal() || blocked)
    }

    /// Some unblocked node is `Ready`, `Scheduled` or `Running`.
    pub fn has_pending_work(&self) -> bool {
        self.states.iter().zip(&self.blocked).any(|(s, &blocked)| {
            !blocked
                && matches!(
                    s,
                    ExecutionState::Ready | ExecutionState::Scheduled | ExecutionState::Running
                )
        })
    }

    /// Not complete, yet nothing can make progress.
    pub fn is_stalled(&self) -> bool {
        !self.is_complete() && !self.has_pending_work()
    }

    /// Block every node that is neither terminal nor in flight.
    pub fn block_remaining(&mut self) -> usize {
        let mut count = 0;
        for i in 0..self.states.len() {
            if !self.blocked[i] && self.block(AlgorithmId(i)) {
                count += 1;
            }
        }
        count
    }

    pub fn count(&self, state: ExecutionState) -> usize {
        self.states.iter().filter(|&&s| s == state).count()
    }

    pub fn ids_in(&self, state: ExecutionState) -> Vec<AlgorithmId> {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, &s)| s == state)
            .map(|(i, _)| AlgorithmId(i))
            .collect()
    }

    pub fn blocked_ids(&self) -> Vec<AlgorithmId> {
        self.blocked
            .iter()
            .enumerate()
            .filter(|(_, &b)| b)
            .map(|(i, _)| AlgorithmId(i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::ExecutionState::*;

    #[test]
    fn legal_path_to_done() {
        let mut s = AlgsExecutionStates::new(1);
        let id = AlgorithmId(0);
        for next in [Ready, Scheduled, Running, Done] {
            s.update(id, next).unwrap();
        }
        assert_eq!(s.get(id), Done);
        assert!(s.is_complete());
    }

    #[test]
    fn no_state_is_skipped() {
        let mut s = AlgsExecutionStates::new(1);
        let id = AlgorithmId(0);
        assert_eq!(
            s.update(id, Scheduled),
            Err(IllegalTransition { from: NotReady, to: Scheduled })
        );
        s.update(id, Ready).unwrap();
        assert!(s.update(id, Running).is_err());
        s.update(id, Scheduled).unwrap();
        assert!(s.update(id, Done).is_err());
        s.update(id, Running).unwrap();
        s.update(id, Failed).unwrap();
        assert!(s.update(id, Done).is_err());
        assert!(s.update(id, Ready).is_err());
    }

    #[test]
    fn every_pair_checked() {
        let legal = [
            (NotReady, Ready),
            (Ready, Scheduled),
            (Scheduled, Running),
            (Running, Done),
            (Running, Failed),
        ];
        for from in ExecutionState::ALL {
            for to in ExecutionState::ALL {
                assert_eq!(from.can_transition_to(to), legal.contains(&(from, to)), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn blocking_only_before_dispatch() {
        let mut s = AlgsExecutionStates::new(3);
        s.update(AlgorithmId(1), Ready).unwrap();
        s.update(AlgorithmId(2), Ready).unwrap();
        s.update(AlgorithmId(2), Scheduled).unwrap();

        assert!(s.block(AlgorithmId(0)));
        assert!(s.block(AlgorithmId(1)));
        assert!(!s.block(AlgorithmId(2)));
        assert!(!s.is_dispatchable(AlgorithmId(1)));
        assert_eq!(s.blocked_ids(), vec![AlgorithmId(0), AlgorithmId(1)]);
    }

    #[test]
    fn complete_with_blocked_nodes() {
        let mut s = AlgsExecutionStates::new(2);
        let a = AlgorithmId(0);
        for next in [Ready, Scheduled, Running, Failed] {
            s.update(a, next).unwrap();
        }
        assert!(!s.is_complete());
        s.block(AlgorithmId(1));
        assert!(s.is_complete());
        assert!(!s.is_stalled());
    }

    #[test]
    fn stall_detected_when_nothing_can_move() {
        let mut s = AlgsExecutionStates::new(2);
        s.update(AlgorithmId(0), Ready).unwrap();
        assert!(s.has_pending_work());
        assert!(!s.is_stalled());

        // one node done, the other stuck in NotReady
        let mut t = AlgsExecutionStates::new(2);
        for next in [Ready, Scheduled, Running, Done] {
            t.update(AlgorithmId(0), next).unwrap();
        }
        assert!(t.is_stalled());
        assert_eq!(t.block_remaining(), 1);
        assert!(t.is_complete());
    }

    #[test]
    fn counts_by_state() {
        let mut s = AlgsExecutionStates::new(4);
        s.update(AlgorithmId(0), Ready).unwrap();
        s.update(AlgorithmId(3), Ready).unwrap();
        assert_eq!(s.count(Ready), 2);
        assert_eq!(s.count(NotReady), 2);
        assert_eq!(s.ids_in(Ready), vec![AlgorithmId(0), AlgorithmId(3)]);
    }
}
