//! Game events: the producer side of the transport contract.
//!
//! RULE: The engine never pushes to clients. Every state-changing
//! operation returns the events it produced and appends them to the
//! event log; the transport layer fans them out.

use crate::{
    phase::Phase,
    types::{MonthId, Paise, QuarterId, TeamId, Volume},
};
use serde::{Deserialize, Serialize};

/// Variants are only ever appended, never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    // ── Flow ───────────────────────────────────────
    PhaseChanged {
        phase: Phase,
        quarter: QuarterId,
        month: MonthId,
    },
    GameReset,

    // ── Teams & bids ───────────────────────────────
    TeamRegistered {
        team_id: TeamId,
        name: String,
    },
    RmBidSubmitted {
        team_id: TeamId,
        quarter: QuarterId,
    },
    CustomerBidSubmitted {
        team_id: TeamId,
        quarter: QuarterId,
        month: MonthId,
        customer_id: String,
    },

    // ── Results ────────────────────────────────────
    RmAllocationCommitted {
        quarter: QuarterId,
        teams: usize,
        total_allocated: Volume,
        total_spot: Volume,
    },
    CustomerAllocationCommitted {
        quarter: QuarterId,
        month: MonthId,
        total_allocated: Volume,
    },
    FinancialsCommitted {
        quarter: QuarterId,
        month: MonthId,
        teams: usize,
        total_ebitda: Paise,
    },

    // ── Reconnects ─────────────────────────────────
    TeamRejoined {
        team_id: TeamId,
    },
}

impl GameEvent {
    /// Stable name for the event_type column in event_log.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::PhaseChanged { .. }                => "phase_changed",
            Self::GameReset                          => "game_reset",
            Self::TeamRegistered { .. }              => "team_registered",
            Self::RmBidSubmitted { .. }              => "rm_bid_submitted",
            Self::CustomerBidSubmitted { .. }        => "customer_bid_submitted",
            Self::RmAllocationCommitted { .. }       => "rm_allocation_committed",
            Self::CustomerAllocationCommitted { .. } => "customer_allocation_committed",
            Self::FinancialsCommitted { .. }         => "financials_committed",
            Self::TeamRejoined { .. }                => "team_rejoined",
        }
    }
}

/// Persisted form of an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub seq:        i64,
    pub event_type: String,
    pub payload:    String,
}

impl EventLogEntry {
    pub fn decode(&self) -> serde_json::Result<GameEvent> {
        serde_json::from_str(&self.payload)
    }
}
