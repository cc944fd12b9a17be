//! Customer auction allocation tests.

use proptest::prelude::*;
use rmc_core::{
    config::GameConfig,
    customer_allocation::{allocate_customers, customer_demands, team_capacities, CustomerDemand},
    error::GameError,
    model::{CustomerBid, RmAllocationResult},
    types::MonthKey,
};
use std::collections::BTreeMap;

const KEY: MonthKey = MonthKey { quarter: 1, month: 1 };

fn ask(team_id: i64, customer: &str, price: i64, volume: i64) -> CustomerBid {
    CustomerBid {
        team_id,
        quarter_id: 1,
        month_id: 1,
        customer_id: customer.to_string(),
        ask_price_paise: price,
        ask_volume: volume,
    }
}

fn demand(customer: &str, m3: i64) -> CustomerDemand {
    CustomerDemand { customer_id: customer.to_string(), demand_m3: m3 }
}

fn capacities(entries: &[(i64, i64)]) -> BTreeMap<i64, i64> {
    entries.iter().copied().collect()
}

fn allocated(results: &[rmc_core::model::CustomerAllocationResult], team_id: i64) -> i64 {
    results
        .iter()
        .filter(|r| r.team_id == team_id)
        .map(|r| r.allocated_volume)
        .sum()
}

/// 4000 m³ demand, asks A@50, B@45, C@60: B first, then A, then C.
#[test]
fn lowest_ask_is_served_first_until_demand_runs_out() {
    let (a, b, c) = (1, 2, 3);
    let bids = vec![
        ask(a, "laddu", 50, 2_000),
        ask(b, "laddu", 45, 1_500),
        ask(c, "laddu", 60, 3_000),
    ];
    let caps = capacities(&[(a, 50_000), (b, 50_000), (c, 50_000)]);
    let outcome = allocate_customers(KEY, &bids, &[demand("laddu", 4_000)], &caps).unwrap();

    let order: Vec<(i64, u32)> = outcome.results.iter().map(|r| (r.team_id, r.rank)).collect();
    assert_eq!(order, vec![(b, 1), (a, 2), (c, 3)]);
    assert_eq!(allocated(&outcome.results, b), 1_500);
    assert_eq!(allocated(&outcome.results, a), 2_000);
    assert_eq!(allocated(&outcome.results, c), 500);

    assert_eq!(outcome.sales[&b].revenue_paise, 1_500 * 45);
    assert_eq!(outcome.sales[&c].sales_vol, 500);
}

#[test]
fn capacity_bound_team_rolls_demand_to_next_rank() {
    let bids = vec![ask(1, "laddu", 45, 3_000), ask(2, "laddu", 50, 3_000)];
    let caps = capacities(&[(1, 1_000), (2, 50_000)]);
    let outcome = allocate_customers(KEY, &bids, &[demand("laddu", 4_000)], &caps).unwrap();

    assert_eq!(allocated(&outcome.results, 1), 1_000);
    assert_eq!(allocated(&outcome.results, 2), 3_000);
}

#[test]
fn capacity_is_shared_across_customers_in_config_order() {
    let bids = vec![ask(1, "laddu", 45, 1_000), ask(1, "shahi", 45, 1_000)];
    let caps = capacities(&[(1, 1_500)]);
    let demands = [demand("laddu", 5_000), demand("shahi", 5_000)];
    let outcome = allocate_customers(KEY, &bids, &demands, &caps).unwrap();

    let by_customer: BTreeMap<&str, i64> = outcome
        .results
        .iter()
        .map(|r| (r.customer_id.as_str(), r.allocated_volume))
        .collect();
    assert_eq!(by_customer["laddu"], 1_000);
    assert_eq!(by_customer["shahi"], 500);
    assert_eq!(outcome.sales[&1].sales_vol, 1_500);
}

#[test]
fn losing_bids_are_listed_with_zero() {
    let bids = vec![ask(1, "lemon", 45, 4_000), ask(2, "lemon", 50, 4_000)];
    let caps = capacities(&[(1, 50_000), (2, 50_000)]);
    let outcome = allocate_customers(KEY, &bids, &[demand("lemon", 4_000)], &caps).unwrap();

    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.results[1].allocated_volume, 0);
    assert!(!outcome.sales.contains_key(&2));
}

#[test]
fn team_without_tms_sells_nothing() {
    let bids = vec![ask(9, "jamoon", 45, 1_000)];
    let outcome = allocate_customers(KEY, &bids, &[demand("jamoon", 4_000)], &BTreeMap::new()).unwrap();
    assert_eq!(outcome.results[0].allocated_volume, 0);
}

#[test]
fn no_bids_is_insufficient_data() {
    assert!(matches!(
        allocate_customers(KEY, &[], &[demand("laddu", 1)], &BTreeMap::new()),
        Err(GameError::InsufficientData { .. })
    ));
}

#[test]
fn demand_is_the_customer_share_of_the_whole_market() {
    let demands = customer_demands(&GameConfig::default_test(), 4);
    let m3: Vec<i64> = demands.iter().map(|d| d.demand_m3).collect();
    assert_eq!(m3, vec![64_000, 48_000, 32_000, 16_000]);
}

#[test]
fn capacity_is_tm_throughput_capped_per_team() {
    let config = GameConfig::default_test();
    let alloc = |team_id, granted, shortfall| RmAllocationResult {
        team_id,
        quarter_id: 1,
        bid_price_paise: 100,
        bid_volume: 1,
        rank: 1,
        allocation_pct: 100,
        allocated_volume: 1,
        supply_capped: false,
        rm_spot_vol: 0,
        rm_spot_price_paise: 110,
        rm_spot_cost_paise: 0,
        tm_bid_count: granted + shortfall,
        tm_granted: granted,
        tm_shortfall: shortfall,
    };
    let caps = team_capacities(&config, &[alloc(1, 50, 10), alloc(2, 100, 0)]);
    assert_eq!(caps[&1], 60 * 540);
    assert_eq!(caps[&2], 50_000);
}

proptest! {
    #[test]
    fn allocations_never_exceed_demand_or_capacity(
        raw in prop::collection::vec((1i64..6, 0usize..3, 1i64..7_000, 1i64..20_000), 1..20),
        demand_m3 in 0i64..30_000,
        cap in 0i64..25_000,
    ) {
        let customers = ["laddu", "shahi", "lemon"];
        let mut seen = std::collections::HashSet::new();
        let bids: Vec<CustomerBid> = raw
            .into_iter()
            .filter(|(team, c, _, _)| seen.insert((*team, *c)))
            .map(|(team, c, price, vol)| ask(team, customers[c], price, vol))
            .collect();
        let demands: Vec<CustomerDemand> = customers.iter().map(|c| demand(c, demand_m3)).collect();
        let caps: BTreeMap<i64, i64> = (1..6).map(|t| (t, cap)).collect();

        let outcome = allocate_customers(KEY, &bids, &demands, &caps).unwrap();

        for c in customers {
            let served: i64 = outcome.results.iter()
                .filter(|r| r.customer_id == c)
                .map(|r| r.allocated_volume)
                .sum();
            prop_assert!(served <= demand_m3);
        }
        for t in 1..6 {
            prop_assert!(allocated(&outcome.results, t) <= cap);
        }
        for r in &outcome.results {
            prop_assert!(r.allocated_volume <= r.requested_volume);
        }
    }
}
