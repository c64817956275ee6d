//! Latest-run-wins holder for discovery results.
//!
//! Runs are not cancelled when a new one starts. Instead every run takes a
//! [`RunTicket`] and its result is only applied if no newer run has begun
//! since, so a slow stale run can never overwrite fresher state.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use super::DiscoveryReport;

/// What the owner of the board should show.
#[derive(Debug, Clone, Default)]
pub enum BoardState {
    #[default]
    Idle,
    /// No wallet to discover for; prompt for one.
    NoWallet,
    Loading,
    Ready(DiscoveryReport),
    /// Discovery failed; the message is shown as-is.
    Failed(String),
}

/// Proof that a run was started at a given generation.
#[derive(Debug)]
pub struct RunTicket {
    generation: u64,
}

impl RunTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Default)]
pub struct ResultBoard {
    generation: AtomicU64,
    state: Mutex<BoardState>,
}

impl ResultBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut BoardState) -> R) -> R {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut *guard)
    }

    /// Start a run. Any earlier ticket becomes stale.
    pub fn begin(&self) -> RunTicket {
        self.with_state(|state| {
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *state = BoardState::Loading;
            RunTicket { generation }
        })
    }

    pub fn is_current(&self, ticket: &RunTicket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.generation
    }

    /// Replace the board state if `ticket` is still the latest run.
    ///
    /// Returns whether the state was applied.
    pub fn publish(&self, ticket: RunTicket, next: BoardState) -> bool {
        self.with_state(|state| {
            if self.generation.load(Ordering::SeqCst) != ticket.generation {
                return false;
            }
            *state = next;
            true
        })
    }

    pub fn snapshot(&self) -> BoardState {
        self.with_state(|state| state.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::DiscoverySource;
    use crate::identity::AgentCard;

    fn report(mint: &str) -> DiscoveryReport {
        DiscoveryReport {
            cards: vec![AgentCard::bare(mint)],
            source: DiscoverySource::Indexer { records: 1 },
        }
    }

    #[test]
    fn begin_marks_loading() {
        let board = ResultBoard::new();
        assert!(matches!(board.snapshot(), BoardState::Idle));
        let _ticket = board.begin();
        assert!(matches!(board.snapshot(), BoardState::Loading));
    }

    #[test]
    fn stale_ticket_is_rejected() {
        let board = ResultBoard::new();
        let first = board.begin();
        let second = board.begin();
        assert!(!board.is_current(&first));
        assert!(board.is_current(&second));

        assert!(board.publish(second, BoardState::Ready(report("fresh"))));
        assert!(!board.publish(first, BoardState::Ready(report("stale"))));

        match board.snapshot() {
            BoardState::Ready(r) => assert_eq!(r.cards[0].mint, "fresh"),
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn publish_replaces_whole_state() {
        let board = ResultBoard::new();
        let t = board.begin();
        assert!(board.publish(t, BoardState::Ready(report("a"))));
        let t = board.begin();
        assert!(board.publish(t, BoardState::Failed("boom".to_string())));
        assert!(matches!(board.snapshot(), BoardState::Failed(m) if m == "boom"));
    }
}
