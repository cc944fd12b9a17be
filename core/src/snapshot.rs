//! Snapshot read model: everything a client needs on (re)connect.
//!
//! Built from committed state only. Never includes team PINs.
//!
//! The engine rebuilds a `ReadView` after every write, while it still holds
//! the writer lock, and swaps it in whole. Readers clone the published
//! `Arc` and never touch the writer store.

use crate::{
    config::GameConfig,
    error::GameResult,
    ledger::LedgerStore,
    model::{FinancialRow, LeaderboardEntry, RmAllocationResult, Team},
    phase::GameState,
    settlement,
    types::{MonthId, QuarterId},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub state: GameState,
    pub teams: Vec<Team>,
    /// Current quarter's RM/TM results, empty until allocated.
    pub rm_allocations: Vec<RmAllocationResult>,
    /// Standings as of the current quarter.
    pub leaderboard: Vec<LeaderboardEntry>,
    /// Highest event sequence included; clients resume from here.
    pub last_event_seq: i64,
}

/// Committed game state as of one write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadView {
    pub snapshot: GameSnapshot,
    /// Every settled row, in calendar then team order.
    pub financial_rows: Vec<FinancialRow>,
}

impl ReadView {
    pub fn load<S: LedgerStore + ?Sized>(store: &S, config: &GameConfig) -> GameResult<Self> {
        let state = store
            .load_game_state()?
            .unwrap_or_else(|| GameState::initial(config));
        let teams = store.teams()?;
        let mut financial_rows = Vec::new();
        for q in 1..=config.max_quarters.max(state.current_quarter) {
            financial_rows.extend(store.financial_rows(q, None)?);
        }
        let snapshot = GameSnapshot {
            rm_allocations: store.rm_allocations(state.current_quarter)?,
            leaderboard: settlement::leaderboard(&teams, &financial_rows, state.current_quarter),
            last_event_seq: store.last_event_seq()?,
            teams,
            state,
        };
        Ok(Self { snapshot, financial_rows })
    }

    pub fn financial_rows(&self, quarter: QuarterId, month: Option<MonthId>) -> Vec<FinancialRow> {
        self.financial_rows
            .iter()
            .filter(|r| r.quarter_id == quarter && month.map_or(true, |m| r.month_id == m))
            .cloned()
            .collect()
    }

    pub fn leaderboard(&self, quarter: QuarterId) -> Vec<LeaderboardEntry> {
        settlement::leaderboard(&self.snapshot.teams, &self.financial_rows, quarter)
    }
}
