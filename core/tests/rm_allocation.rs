//! RM/TM allocation engine tests.

use proptest::prelude::*;
use rmc_core::{
    config::GameConfig,
    error::GameError,
    model::RmBid,
    rm_allocation::{allocate_rm, lowest_winning_price, RmMarket},
};

fn bid(team_id: i64, price: i64, volume: i64, tms: i64) -> RmBid {
    RmBid {
        team_id,
        quarter_id: 1,
        bid_price_paise: price,
        bid_volume: volume,
        tm_bid_count: tms,
    }
}

fn roomy_market() -> RmMarket {
    RmMarket {
        supply_m3: 100_000,
        tm_fleet: 1_000,
        factor_step_pct: 10,
        spot_penalty_bps: 1_000,
    }
}

/// Prices 100/90/80, volumes 10000/8000/6000, ample supply.
#[test]
fn third_rank_gets_eighty_percent_and_pays_spot_above_second() {
    let bids = vec![bid(3, 80, 6_000, 0), bid(1, 100, 10_000, 0), bid(2, 90, 8_000, 0)];
    let results = allocate_rm(&bids, &roomy_market()).unwrap();

    assert_eq!(results.iter().map(|r| r.team_id).collect::<Vec<_>>(), vec![1, 2, 3]);

    let first = &results[0];
    assert_eq!(first.allocation_pct, 100);
    assert_eq!(first.allocated_volume, 10_000);
    assert_eq!(first.rm_spot_vol, 0);
    assert_eq!(first.rm_spot_cost_paise, 0);

    let second = &results[1];
    assert_eq!(second.allocation_pct, 90);
    assert_eq!(second.allocated_volume, 7_200);
    assert_eq!(second.rm_spot_price_paise, 110);

    let third = &results[2];
    assert_eq!(third.rank, 3);
    assert_eq!(third.allocation_pct, 80);
    assert_eq!(third.allocated_volume, 4_800);
    assert_eq!(third.rm_spot_vol, 1_200);
    assert_eq!(third.rm_spot_price_paise, 99);
    assert_eq!(third.rm_spot_cost_paise, 1_200 * 99);
    assert!(!third.supply_capped);
}

#[test]
fn equal_prices_rank_by_team_id() {
    let bids = vec![bid(7, 100, 1_000, 0), bid(2, 100, 1_000, 0)];
    let results = allocate_rm(&bids, &roomy_market()).unwrap();
    assert_eq!(results[0].team_id, 2);
    assert_eq!(results[1].team_id, 7);
    assert_eq!(results[1].allocation_pct, 90);
}

#[test]
fn supply_runs_out_before_the_schedule() {
    let market = RmMarket { supply_m3: 12_000, ..roomy_market() };
    let bids = vec![bid(1, 100, 10_000, 0), bid(2, 90, 10_000, 0)];
    let results = allocate_rm(&bids, &market).unwrap();

    assert_eq!(results[0].allocated_volume, 10_000);
    assert_eq!(results[1].allocated_volume, 2_000);
    assert!(results[1].supply_capped);
    assert_eq!(results[1].rm_spot_vol, 8_000);
}

#[test]
fn tm_fleet_is_granted_in_rank_order_and_the_rest_is_penalty() {
    let market = RmMarket { tm_fleet: 100, ..roomy_market() };
    let bids = vec![bid(1, 100, 1_000, 70), bid(2, 90, 1_000, 50)];
    let results = allocate_rm(&bids, &market).unwrap();

    assert_eq!((results[0].tm_granted, results[0].tm_shortfall), (70, 0));
    assert_eq!((results[1].tm_granted, results[1].tm_shortfall), (30, 20));
    assert_eq!(results[1].tm_total(), 50);
}

#[test]
fn no_bids_is_insufficient_data() {
    assert!(matches!(
        allocate_rm(&[], &roomy_market()),
        Err(GameError::InsufficientData { .. })
    ));
}

#[test]
fn market_scales_with_team_count() {
    let market = RmMarket::from_config(&GameConfig::default_test(), 5);
    assert_eq!(market.supply_m3, 600_000);
    assert_eq!(market.tm_fleet, 400);
}

#[test]
fn liquidation_price_ignores_teams_that_won_nothing() {
    let market = RmMarket { factor_step_pct: 100, ..roomy_market() };
    let bids = vec![bid(1, 100, 1_000, 0), bid(2, 40, 1_000, 0)];
    let results = allocate_rm(&bids, &market).unwrap();
    assert_eq!(results[1].allocated_volume, 0);
    assert_eq!(lowest_winning_price(&results), Some(100));
}

fn bids_strategy() -> impl Strategy<Value = Vec<RmBid>> {
    prop::collection::vec((1i64..10_000, 1i64..50_000, 0i64..200), 1..12).prop_map(|raw| {
        raw.into_iter()
            .enumerate()
            .map(|(i, (price, volume, tms))| bid(i as i64 + 1, price, volume, tms))
            .collect()
    })
}

proptest! {
    #[test]
    fn allocations_respect_supply_and_bids(
        bids in bids_strategy(),
        supply in 0i64..300_000,
        fleet in 0i64..500,
        step in 0u32..40,
    ) {
        let market = RmMarket {
            supply_m3: supply,
            tm_fleet: fleet,
            factor_step_pct: step,
            spot_penalty_bps: 1_000,
        };
        let results = allocate_rm(&bids, &market).unwrap();

        prop_assert_eq!(results.len(), bids.len());
        let total: i64 = results.iter().map(|r| r.allocated_volume).sum();
        prop_assert!(total <= supply);
        let granted: i64 = results.iter().map(|r| r.tm_granted).sum();
        prop_assert!(granted <= fleet);

        for r in &results {
            prop_assert!(r.allocated_volume >= 0);
            prop_assert!(r.allocated_volume <= r.bid_volume);
            prop_assert_eq!(r.rm_spot_vol, r.bid_volume - r.allocated_volume);
        }
    }

    #[test]
    fn factors_start_at_one_and_never_rise(bids in bids_strategy(), step in 0u32..60) {
        let market = RmMarket { factor_step_pct: step, ..roomy_market() };
        let results = allocate_rm(&bids, &market).unwrap();

        prop_assert_eq!(results[0].allocation_pct, 100);
        for pair in results.windows(2) {
            prop_assert!(pair[1].allocation_pct <= pair[0].allocation_pct);
            prop_assert!(pair[1].allocation_factor() >= 0.0);
            prop_assert!(pair[1].bid_price_paise <= pair[0].bid_price_paise);
        }
    }
}
