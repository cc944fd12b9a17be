//! RM/TM allocation engine: resolves quarterly scarcity.
//!
//! Pure: bids and market parameters in, one result per team out.
//! Running it twice on the same input yields the same output, and the
//! store replaces (never accumulates) prior results for the quarter.
//!
//! Ranking: price descending, team id ascending on ties.
//! Rank k is scheduled max(0, 100 - step*(k-1)) percent of its own volume,
//! further capped by whatever market supply is left. Anything short of the
//! bid volume is bought at spot: the bid price of the team ranked directly
//! ahead plus the penalty (rank 1 uses its own price).

use crate::{
    config::GameConfig,
    error::{GameError, GameResult},
    model::{RmAllocationResult, RmBid},
    types::{div_round_half_up, Paise, Volume},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RmMarket {
    pub supply_m3:        Volume,
    pub tm_fleet:         i64,
    pub factor_step_pct:  u32,
    pub spot_penalty_bps: u32,
}

impl RmMarket {
    pub fn from_config(config: &GameConfig, team_count: usize) -> Self {
        Self {
            supply_m3:        config.rm.supply_per_team_m3 * team_count as Volume,
            tm_fleet:         config.tm.fleet_per_team * team_count as i64,
            factor_step_pct:  config.rm.factor_step_pct,
            spot_penalty_bps: config.rm.spot_penalty_bps,
        }
    }
}

/// Scheduled allocation percent for a 1-based rank. Floors at 0.
pub fn allocation_pct(rank: u32, step_pct: u32) -> u32 {
    100u32.saturating_sub(step_pct.saturating_mul(rank.saturating_sub(1)))
}

/// Reference price plus penalty, rounded half-up to whole paise.
pub fn spot_price(reference_paise: Paise, penalty_bps: u32) -> GameResult<Paise> {
    let price = div_round_half_up(
        reference_paise as i128 * (10_000 + penalty_bps as i128),
        10_000,
    );
    Paise::try_from(price).map_err(|_| {
        GameError::invariant(format!(
            "spot price for reference {reference_paise} does not fit in paise"
        ))
    })
}

/// Sort bids into rank order. Stable and total, so equal input gives equal order.
pub fn rank_rm_bids(bids: &[RmBid]) -> Vec<&RmBid> {
    let mut ranked: Vec<&RmBid> = bids.iter().collect();
    ranked.sort_by(|a, b| {
        b.bid_price_paise
            .cmp(&a.bid_price_paise)
            .then(a.team_id.cmp(&b.team_id))
    });
    ranked
}

pub fn allocate_rm(bids: &[RmBid], market: &RmMarket) -> GameResult<Vec<RmAllocationResult>> {
    if bids.is_empty() {
        return Err(GameError::insufficient("no RM bids for the quarter"));
    }

    let mut remaining_supply = market.supply_m3.max(0);
    let mut remaining_fleet = market.tm_fleet.max(0);
    let mut previous_price: Option<Paise> = None;
    let mut results = Vec::with_capacity(bids.len());

    for (i, bid) in rank_rm_bids(bids).into_iter().enumerate() {
        let rank = i as u32 + 1;
        let pct = allocation_pct(rank, market.factor_step_pct);
        let scheduled = div_round_half_up(bid.bid_volume as i128 * pct as i128, 100) as Volume;
        let allocated = scheduled.min(remaining_supply);
        remaining_supply -= allocated;

        let rm_spot_vol = bid.bid_volume - allocated;
        let reference = previous_price.unwrap_or(bid.bid_price_paise);
        let rm_spot_price_paise = spot_price(reference, market.spot_penalty_bps)?;
        let rm_spot_cost_paise = rm_spot_vol
            .checked_mul(rm_spot_price_paise)
            .ok_or_else(|| {
                GameError::invariant(format!(
                    "spot cost overflow for team {}: {rm_spot_vol} x {rm_spot_price_paise}",
                    bid.team_id
                ))
            })?;

        let tm_granted = bid.tm_bid_count.min(remaining_fleet);
        remaining_fleet -= tm_granted;

        results.push(RmAllocationResult {
            team_id: bid.team_id,
            quarter_id: bid.quarter_id,
            bid_price_paise: bid.bid_price_paise,
            bid_volume: bid.bid_volume,
            rank,
            allocation_pct: pct,
            allocated_volume: allocated,
            supply_capped: allocated < scheduled,
            rm_spot_vol,
            rm_spot_price_paise,
            rm_spot_cost_paise,
            tm_bid_count: bid.tm_bid_count,
            tm_granted,
            tm_shortfall: bid.tm_bid_count - tm_granted,
        });

        previous_price = Some(bid.bid_price_paise);
    }

    verify_rm_allocation(&results, market)?;

    log::debug!(
        "RM allocation: {} teams, {} m3 of {} supply left, {} TMs of fleet left",
        results.len(),
        remaining_supply,
        market.supply_m3,
        remaining_fleet
    );
    Ok(results)
}

/// Check the allocation invariants. A failure here is a defect, not bad input.
pub fn verify_rm_allocation(results: &[RmAllocationResult], market: &RmMarket) -> GameResult<()> {
    let mut total_allocated: Volume = 0;
    let mut total_granted: i64 = 0;
    let mut last_pct = 100u32;

    for r in results {
        if r.allocated_volume < 0 || r.allocated_volume > r.bid_volume {
            return Err(GameError::invariant(format!(
                "team {} allocated {} against a bid of {}",
                r.team_id, r.allocated_volume, r.bid_volume
            )));
        }
        if r.rm_spot_vol != r.bid_volume - r.allocated_volume {
            return Err(GameError::invariant(format!(
                "team {} spot volume {} does not cover shortfall {}",
                r.team_id,
                r.rm_spot_vol,
                r.bid_volume - r.allocated_volume
            )));
        }
        if r.rank == 1 && r.allocation_pct != 100 {
            return Err(GameError::invariant("rank 1 must be scheduled 100%"));
        }
        if r.allocation_pct > last_pct {
            return Err(GameError::invariant(format!(
                "allocation factor rises at rank {}",
                r.rank
            )));
        }
        if r.tm_granted < 0 || r.tm_shortfall < 0 {
            return Err(GameError::invariant(format!(
                "team {} has a negative TM split",
                r.team_id
            )));
        }
        last_pct = r.allocation_pct;
        total_allocated += r.allocated_volume;
        total_granted += r.tm_granted;
    }

    if total_allocated > market.supply_m3.max(0) {
        return Err(GameError::invariant(format!(
            "allocated {total_allocated} m3 exceeds supply {}",
            market.supply_m3
        )));
    }
    if total_granted > market.tm_fleet.max(0) {
        return Err(GameError::invariant(format!(
            "granted {total_granted} TMs exceeds fleet {}",
            market.tm_fleet
        )));
    }
    Ok(())
}

/// Lowest bid price that actually won RM this quarter.
/// Unsold RM is liquidated at this price at quarter end.
pub fn lowest_winning_price(results: &[RmAllocationResult]) -> Option<Paise> {
    results
        .iter()
        .filter(|r| r.allocated_volume > 0)
        .map(|r| r.bid_price_paise)
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_floors_at_zero() {
        assert_eq!(allocation_pct(1, 10), 100);
        assert_eq!(allocation_pct(3, 10), 80);
        assert_eq!(allocation_pct(11, 10), 0);
        assert_eq!(allocation_pct(40, 10), 0);
    }

    #[test]
    fn penalty_rounds_half_up() {
        assert_eq!(spot_price(90, 1_000).unwrap(), 99);
        assert_eq!(spot_price(5, 1_000).unwrap(), 6); // 5.5 -> 6
    }

    #[test]
    fn spot_price_overflow_is_an_error_not_a_wrap() {
        assert!(matches!(
            spot_price(i64::MAX, 1_000),
            Err(GameError::ArithmeticInvariantViolation { .. })
        ));
    }
}
