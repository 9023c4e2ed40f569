//! Turn governor: whose turn it is, and how many AI turns remain.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Turn state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TurnState {
    /// Waiting for the human participant.
    HumanTurn,
    /// An AI window is open with `remaining` turns left.
    AiWindow { remaining: usize },
}

/// Finite-state controller for turn-taking.
///
/// ```text
/// HumanTurn --begin_human_input(n) / open_window(n)--> AiWindow(n)
/// AiWindow(n) --complete_one_ai_turn--> AiWindow(n-1) ... AiWindow(0) == HumanTurn
/// any --force_human_turn--> HumanTurn
/// ```
///
/// A window of size zero is legal and reads as the human's turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnGovernor {
    state: TurnState,
}

impl TurnGovernor {
    pub fn new() -> Self {
        Self {
            state: TurnState::HumanTurn,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Human input arrived; open an AI window of `budget` turns.
    pub fn begin_human_input(&mut self, budget: usize) {
        self.open(budget, "human_input");
    }

    /// Open a system-initiated AI window of `turns` turns.
    pub fn open_window(&mut self, turns: usize) {
        self.open(turns, "system");
    }

    fn open(&mut self, turns: usize, cause: &'static str) {
        self.state = if turns == 0 {
            TurnState::HumanTurn
        } else {
            TurnState::AiWindow { remaining: turns }
        };
        debug!(target: "tribunal::turn", turns, cause, "AI window opened");
    }

    /// One AI turn finished. Reaching zero hands the turn to the human.
    pub fn complete_one_ai_turn(&mut self) {
        if let TurnState::AiWindow { remaining } = self.state {
            let remaining = remaining.saturating_sub(1);
            self.state = if remaining == 0 {
                TurnState::HumanTurn
            } else {
                TurnState::AiWindow { remaining }
            };
        }
    }

    /// Hand the turn to the human regardless of the remaining budget.
    pub fn force_human_turn(&mut self) {
        if self.state != TurnState::HumanTurn {
            debug!(target: "tribunal::turn", state = ?self.state, "forcing human turn");
        }
        self.state = TurnState::HumanTurn;
    }

    pub fn is_human_turn(&self) -> bool {
        matches!(
            self.state,
            TurnState::HumanTurn | TurnState::AiWindow { remaining: 0 }
        )
    }

    pub fn has_ai_turn_available(&self) -> bool {
        !self.is_human_turn()
    }

    /// AI turns left in the current window.
    pub fn remaining(&self) -> usize {
        match self.state {
            TurnState::HumanTurn => 0,
            TurnState::AiWindow { remaining } => remaining,
        }
    }
}

impl Default for TurnGovernor {
    fn default() -> Self {
        Self::new()
    }
}
