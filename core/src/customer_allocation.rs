//! Customer auction allocation engine: monthly reverse auction.
//!
//! Customers are cleared one at a time in configured order. Within a
//! customer the lowest ask wins first (team id breaks ties) and each team
//! takes min(its ask, remaining demand, its remaining capacity). Demand a
//! capacity-bound team cannot take rolls to the next-ranked team of the
//! same customer. It never moves across customers.

use crate::{
    config::GameConfig,
    error::{GameError, GameResult},
    model::{CustomerAllocationResult, CustomerBid, RmAllocationResult},
    types::{CustomerId, MonthKey, Paise, TeamId, Volume},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDemand {
    pub customer_id: CustomerId,
    pub demand_m3:   Volume,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSales {
    pub sales_vol:     Volume,
    pub revenue_paise: Paise,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerAuctionOutcome {
    pub results: Vec<CustomerAllocationResult>,
    pub sales:   BTreeMap<TeamId, TeamSales>,
}

/// Fixed monthly demand per customer: its share of the whole market.
pub fn customer_demands(config: &GameConfig, team_count: usize) -> Vec<CustomerDemand> {
    let market = config.market_size(team_count);
    config
        .customers
        .iter()
        .map(|c| CustomerDemand {
            customer_id: c.customer_id.clone(),
            demand_m3:   market * c.share_bps as Volume / 10_000,
        })
        .collect()
}

/// Monthly delivery capacity per team from its quarter's TM count.
pub fn team_capacities(
    config: &GameConfig,
    rm_allocations: &[RmAllocationResult],
) -> BTreeMap<TeamId, Volume> {
    rm_allocations
        .iter()
        .map(|r| {
            let fleet_capacity = r.tm_total() * config.tm.throughput_m3_per_month;
            (r.team_id, fleet_capacity.min(config.team_capacity_cap_m3).max(0))
        })
        .collect()
}

pub fn allocate_customers(
    key: MonthKey,
    bids: &[CustomerBid],
    demands: &[CustomerDemand],
    capacities: &BTreeMap<TeamId, Volume>,
) -> GameResult<CustomerAuctionOutcome> {
    if bids.is_empty() {
        return Err(GameError::insufficient(format!("no customer bids for {key}")));
    }

    let mut remaining_capacity = capacities.clone();
    let mut results = Vec::with_capacity(bids.len());
    let mut sales: BTreeMap<TeamId, TeamSales> = BTreeMap::new();

    for demand in demands {
        let mut ranked: Vec<&CustomerBid> = bids
            .iter()
            .filter(|b| b.customer_id == demand.customer_id)
            .collect();
        ranked.sort_by(|a, b| {
            a.ask_price_paise
                .cmp(&b.ask_price_paise)
                .then(a.team_id.cmp(&b.team_id))
        });

        let mut remaining_demand = demand.demand_m3.max(0);
        for (i, bid) in ranked.into_iter().enumerate() {
            let capacity = remaining_capacity.entry(bid.team_id).or_insert(0);
            let allocated = bid.ask_volume.min(remaining_demand).min(*capacity).max(0);
            remaining_demand -= allocated;
            *capacity -= allocated;

            if allocated > 0 {
                let team_sales = sales.entry(bid.team_id).or_default();
                team_sales.sales_vol += allocated;
                team_sales.revenue_paise += allocated * bid.ask_price_paise;
            }

            results.push(CustomerAllocationResult {
                customer_id: demand.customer_id.clone(),
                quarter_id: key.quarter,
                month_id: key.month,
                rank: i as u32 + 1,
                team_id: bid.team_id,
                bid_price_paise: bid.ask_price_paise,
                requested_volume: bid.ask_volume,
                allocated_volume: allocated,
            });
        }

        log::debug!(
            "{key} {}: demand {} m3, {} m3 unserved",
            demand.customer_id,
            demand.demand_m3,
            remaining_demand
        );
    }

    let outcome = CustomerAuctionOutcome { results, sales };
    verify_customer_allocation(&outcome, demands, capacities)?;
    Ok(outcome)
}

pub fn verify_customer_allocation(
    outcome: &CustomerAuctionOutcome,
    demands: &[CustomerDemand],
    capacities: &BTreeMap<TeamId, Volume>,
) -> GameResult<()> {
    let mut per_customer: BTreeMap<&str, Volume> = BTreeMap::new();
    let mut per_team: BTreeMap<TeamId, Volume> = BTreeMap::new();

    for r in &outcome.results {
        if r.allocated_volume < 0 || r.allocated_volume > r.requested_volume {
            return Err(GameError::invariant(format!(
                "team {} got {} m3 from {} against a request of {}",
                r.team_id, r.allocated_volume, r.customer_id, r.requested_volume
            )));
        }
        *per_customer.entry(r.customer_id.as_str()).or_default() += r.allocated_volume;
        *per_team.entry(r.team_id).or_default() += r.allocated_volume;
    }

    for d in demands {
        let served = per_customer.get(d.customer_id.as_str()).copied().unwrap_or(0);
        if served > d.demand_m3.max(0) {
            return Err(GameError::invariant(format!(
                "customer {} served {served} m3 above demand {}",
                d.customer_id, d.demand_m3
            )));
        }
    }

    for (team_id, total) in &per_team {
        let cap = capacities.get(team_id).copied().unwrap_or(0);
        if *total > cap {
            return Err(GameError::invariant(format!(
                "team {team_id} allocated {total} m3 above capacity {cap}"
            )));
        }
        let recorded = outcome.sales.get(team_id).map(|s| s.sales_vol).unwrap_or(0);
        if recorded != *total {
            return Err(GameError::invariant(format!(
                "team {team_id} sales {recorded} disagree with allocations {total}"
            )));
        }
    }
    Ok(())
}
