use crate::{
    phase::Phase,
    types::{CustomerId, MonthId, Paise, QuarterId, TeamId, Volume},
};
use serde::{Deserialize, Serialize};

/// Facilitator commands. Authorization is the transport's concern;
/// the engine only checks that the game calendar allows them.
/// Variants are only ever appended, never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum AdminCommand {
    // ── Flow ──────────────────────────────────────
    /// Move one step towards `phase` (announce, open bidding, open auction...).
    SetPhase { phase: Phase },
    /// Allocate the current quarter's RM/TM and start month 1.
    ProcessRmAllocation,
    /// Clear the current month's auction, settle it and close the month.
    ProcessCustomerAllocation,
    /// Re-run settlement for an already closed month.
    RecalculateFinancials { quarter: QuarterId, month: MonthId },
    AdvanceMonth,
    EndGame,
    ResetGame,
}

/// Commands issued on behalf of a team.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum TeamCommand {
    RegisterTeam {
        name: String,
        pin:  String,
    },
    SubmitRmBid {
        team_id:         TeamId,
        bid_price_paise: Paise,
        bid_volume:      Volume,
        tm_bid_count:    i64,
    },
    SubmitCustomerBid {
        team_id:         TeamId,
        customer_id:     CustomerId,
        ask_price_paise: Paise,
        ask_volume:      Volume,
    },
}
