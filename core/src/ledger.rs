//! Bid ledger: the persistence seam and the validated read view over it.
//!
//! RULE: Engines never read raw rows. They read through `BidLedgerReader`,
//! which drops malformed or foreign records and logs why.
//!
//! `LedgerStore` is the collaborator contract. Every `commit_*` method is a
//! single atomic unit: all derived rows for the key land together with the
//! event announcing them, or none of it does.

use crate::{
    config::GameConfig,
    error::GameResult,
    event::{EventLogEntry, GameEvent},
    model::{CustomerAllocationResult, CustomerBid, FinancialRow, RmAllocationResult, RmBid, Team},
    phase::GameState,
    types::{MonthId, MonthKey, Paise, QuarterId, TeamId},
};
use std::collections::{BTreeSet, HashSet};

pub trait LedgerStore: Send {
    // ── Reads ──────────────────────────────────────────────────
    fn teams(&self) -> GameResult<Vec<Team>>;
    fn rm_bids(&self, quarter: QuarterId) -> GameResult<Vec<RmBid>>;
    fn customer_bids(&self, key: MonthKey) -> GameResult<Vec<CustomerBid>>;
    fn rm_allocations(&self, quarter: QuarterId) -> GameResult<Vec<RmAllocationResult>>;
    fn customer_allocations(&self, key: MonthKey) -> GameResult<Vec<CustomerAllocationResult>>;
    fn financial_rows(
        &self,
        quarter: QuarterId,
        month: Option<MonthId>,
    ) -> GameResult<Vec<FinancialRow>>;
    /// Every row strictly earlier than `key`, in calendar then team order.
    fn financial_rows_before(&self, key: MonthKey) -> GameResult<Vec<FinancialRow>>;
    fn load_game_state(&self) -> GameResult<Option<GameState>>;
    fn events_since(&self, seq: i64) -> GameResult<Vec<EventLogEntry>>;
    /// Highest sequence number in the event log, 0 when empty.
    fn last_event_seq(&self) -> GameResult<i64>;

    // ── Team-side writes ───────────────────────────────────────
    fn insert_team(&self, name: &str, pin: &str, seed_capital: Paise) -> GameResult<TeamId>;
    fn upsert_rm_bid(&self, bid: &RmBid) -> GameResult<()>;
    fn upsert_customer_bid(&self, bid: &CustomerBid) -> GameResult<()>;

    // ── Atomic commits ─────────────────────────────────────────
    // Each returns the sequence number assigned to `event`.
    fn commit_rm_allocation(
        &self,
        quarter: QuarterId,
        results: &[RmAllocationResult],
        event: &GameEvent,
    ) -> GameResult<i64>;
    fn commit_customer_allocation(
        &self,
        key: MonthKey,
        results: &[CustomerAllocationResult],
        event: &GameEvent,
    ) -> GameResult<i64>;
    fn commit_financials(
        &self,
        key: MonthKey,
        rows: &[FinancialRow],
        event: &GameEvent,
    ) -> GameResult<i64>;
    fn save_game_state(&self, state: &GameState) -> GameResult<()>;
    fn append_event(&self, event: &GameEvent) -> GameResult<i64>;
    /// Wipe teams, bids and results. Game state is saved separately.
    fn reset_game(&self) -> GameResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedBid {
    pub team_id: TeamId,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ValidatedBids<T> {
    pub accepted: Vec<T>,
    pub rejected: Vec<RejectedBid>,
}

impl<T> ValidatedBids<T> {
    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }
}

// ── Single-record checks (also used on submission) ─────────────

pub fn check_rm_bid(bid: &RmBid, config: &GameConfig) -> Result<(), String> {
    if bid.bid_price_paise <= 0 {
        return Err(format!("bid price must be positive, got {}", bid.bid_price_paise));
    }
    if bid.bid_price_paise > config.rm.max_bid_price_paise {
        return Err(format!(
            "bid price {} exceeds the maximum {}",
            bid.bid_price_paise, config.rm.max_bid_price_paise
        ));
    }
    if bid.bid_volume <= 0 {
        return Err(format!("bid volume must be positive, got {}", bid.bid_volume));
    }
    if bid.bid_volume > config.rm.max_bid_volume_m3 {
        return Err(format!(
            "bid volume {} exceeds the maximum {}",
            bid.bid_volume, config.rm.max_bid_volume_m3
        ));
    }
    if bid.tm_bid_count < 0 {
        return Err(format!("TM count must not be negative, got {}", bid.tm_bid_count));
    }
    if bid.tm_bid_count > config.tm.max_bid_count {
        return Err(format!(
            "TM count {} exceeds the maximum {}",
            bid.tm_bid_count, config.tm.max_bid_count
        ));
    }
    Ok(())
}

pub fn check_customer_bid(bid: &CustomerBid, config: &GameConfig) -> Result<(), String> {
    if config.customer(&bid.customer_id).is_none() {
        return Err(format!("unknown customer '{}'", bid.customer_id));
    }
    if bid.ask_price_paise <= 0 {
        return Err(format!("ask price must be positive, got {}", bid.ask_price_paise));
    }
    if bid.ask_price_paise > config.max_ask_price_paise {
        return Err(format!(
            "ask price {} exceeds the maximum {}",
            bid.ask_price_paise, config.max_ask_price_paise
        ));
    }
    if bid.ask_volume <= 0 {
        return Err(format!("ask volume must be positive, got {}", bid.ask_volume));
    }
    Ok(())
}

// ── Set-level validation ───────────────────────────────────────

pub fn validate_rm_bids(
    bids: Vec<RmBid>,
    teams: &[Team],
    quarter: QuarterId,
    config: &GameConfig,
) -> ValidatedBids<RmBid> {
    let registered: BTreeSet<TeamId> = teams.iter().map(|t| t.id).collect();
    let mut seen = HashSet::new();
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();

    for bid in bids {
        let verdict = if bid.quarter_id != quarter {
            Err(format!("bid is for Q{}, not Q{quarter}", bid.quarter_id))
        } else if !registered.contains(&bid.team_id) {
            Err("team is not registered".to_string())
        } else if !seen.insert(bid.team_id) {
            Err("duplicate RM bid".to_string())
        } else {
            check_rm_bid(&bid, config)
        };
        match verdict {
            Ok(()) => accepted.push(bid),
            Err(reason) => {
                log::warn!("Q{quarter} RM bid from team {} dropped: {reason}", bid.team_id);
                rejected.push(RejectedBid { team_id: bid.team_id, reason });
            }
        }
    }

    ValidatedBids { accepted, rejected }
}

pub fn validate_customer_bids(
    bids: Vec<CustomerBid>,
    teams: &[Team],
    key: MonthKey,
    config: &GameConfig,
) -> ValidatedBids<CustomerBid> {
    let registered: BTreeSet<TeamId> = teams.iter().map(|t| t.id).collect();
    let mut seen = HashSet::new();
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();

    for bid in bids {
        let verdict = if MonthKey::new(bid.quarter_id, bid.month_id) != key {
            Err(format!("bid is for Q{}-M{}, not {key}", bid.quarter_id, bid.month_id))
        } else if !registered.contains(&bid.team_id) {
            Err("team is not registered".to_string())
        } else if !seen.insert((bid.team_id, bid.customer_id.clone())) {
            Err(format!("duplicate bid for customer '{}'", bid.customer_id))
        } else {
            check_customer_bid(&bid, config)
        };
        match verdict {
            Ok(()) => accepted.push(bid),
            Err(reason) => {
                log::warn!("{key} customer bid from team {} dropped: {reason}", bid.team_id);
                rejected.push(RejectedBid { team_id: bid.team_id, reason });
            }
        }
    }

    ValidatedBids { accepted, rejected }
}

/// Read-only, validated view over a ledger for one computation.
pub struct BidLedgerReader<'a, S: LedgerStore + ?Sized> {
    store:  &'a S,
    config: &'a GameConfig,
}

impl<'a, S: LedgerStore + ?Sized> BidLedgerReader<'a, S> {
    pub fn new(store: &'a S, config: &'a GameConfig) -> Self {
        Self { store, config }
    }

    pub fn teams(&self) -> GameResult<Vec<Team>> {
        self.store.teams()
    }

    pub fn rm_bids(&self, quarter: QuarterId, teams: &[Team]) -> GameResult<ValidatedBids<RmBid>> {
        Ok(validate_rm_bids(
            self.store.rm_bids(quarter)?,
            teams,
            quarter,
            self.config,
        ))
    }

    pub fn customer_bids(
        &self,
        key: MonthKey,
        teams: &[Team],
    ) -> GameResult<ValidatedBids<CustomerBid>> {
        Ok(validate_customer_bids(
            self.store.customer_bids(key)?,
            teams,
            key,
            self.config,
        ))
    }

    pub fn rm_allocations(&self, quarter: QuarterId) -> GameResult<Vec<RmAllocationResult>> {
        self.store.rm_allocations(quarter)
    }

    pub fn customer_allocations(&self, key: MonthKey) -> GameResult<Vec<CustomerAllocationResult>> {
        self.store.customer_allocations(key)
    }

    pub fn financial_rows_before(&self, key: MonthKey) -> GameResult<Vec<FinancialRow>> {
        self.store.financial_rows_before(key)
    }
}
