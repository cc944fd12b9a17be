//! Records flowing between the ledger, the engines and the transport.
//!
//! Input records (bids, teams) come from the ledger. Result records are
//! derived, immutable once returned, and keyed by quarter or month.

use crate::types::{CustomerId, MonthId, MonthKey, Paise, QuarterId, TeamId, Volume};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    #[serde(skip_serializing, default)]
    pub pin: String,
    pub base_tm_count: i64,
    pub working_capital_paise: Paise,
    pub cumulative_ebitda_paise: Paise,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RmBid {
    pub team_id: TeamId,
    pub quarter_id: QuarterId,
    pub bid_price_paise: Paise,
    pub bid_volume: Volume,
    pub tm_bid_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomerBid {
    pub team_id: TeamId,
    pub quarter_id: QuarterId,
    pub month_id: MonthId,
    pub customer_id: CustomerId,
    pub ask_price_paise: Paise,
    pub ask_volume: Volume,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RmAllocationResult {
    pub team_id: TeamId,
    pub quarter_id: QuarterId,
    pub bid_price_paise: Paise,
    pub bid_volume: Volume,
    pub rank: u32,
    /// Scheduled allocation factor in whole percent (0..=100).
    pub allocation_pct: u32,
    pub allocated_volume: Volume,
    /// True when the market supply ran out before the scheduled volume.
    pub supply_capped: bool,
    pub rm_spot_vol: Volume,
    pub rm_spot_price_paise: Paise,
    pub rm_spot_cost_paise: Paise,
    pub tm_bid_count: i64,
    pub tm_granted: i64,
    /// TMs auto-allotted at the penalty rate.
    pub tm_shortfall: i64,
}

impl RmAllocationResult {
    pub fn allocation_factor(&self) -> f64 {
        self.allocation_pct as f64 / 100.0
    }

    /// TMs the team operates this quarter, standard and penalty.
    pub fn tm_total(&self) -> i64 {
        self.tm_granted + self.tm_shortfall
    }

    pub fn standard_cost_paise(&self) -> Paise {
        self.allocated_volume * self.bid_price_paise
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CustomerAllocationResult {
    pub customer_id: CustomerId,
    pub quarter_id: QuarterId,
    pub month_id: MonthId,
    pub rank: u32,
    pub team_id: TeamId,
    pub bid_price_paise: Paise,
    pub requested_volume: Volume,
    pub allocated_volume: Volume,
}

impl CustomerAllocationResult {
    pub fn revenue_paise(&self) -> Paise {
        self.allocated_volume * self.bid_price_paise
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FinancialRow {
    pub team_id: TeamId,
    pub quarter_id: QuarterId,
    pub month_id: MonthId,
    pub sales_vol: Volume,
    pub revenue_paise: Paise,
    pub rm_cost_paise: Paise,
    pub rm_spot_vol: Volume,
    pub rm_spot_cost_paise: Paise,
    pub tm_cost_paise: Paise,
    pub prod_cost_paise: Paise,
    pub rm_liquidation_paise: Paise,
    pub ebitda_paise: Paise,
    pub cumulative_ebitda_paise: Paise,
    pub cash_inflow_paise: Paise,
    pub opening_balance_paise: Paise,
    pub interest_paise: Paise,
    pub closing_balance_paise: Paise,
    pub borrowed_paise: Paise,
    /// RM left over after this month's sales, before any liquidation.
    pub rm_closing_vol: Volume,
}

impl FinancialRow {
    pub fn month_key(&self) -> MonthKey {
        MonthKey::new(self.quarter_id, self.month_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub team_id: TeamId,
    pub team_name: String,
    pub total_game_ebitda_paise: Paise,
    pub quarter_ebitda_paise: Paise,
}
