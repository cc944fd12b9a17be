//! Financial settlement tests.

use rmc_core::{
    config::GameConfig,
    model::{CustomerAllocationResult, FinancialRow, RmAllocationResult, Team},
    settlement::{leaderboard, production_cost, roll_working_capital, settle_month, MonthContext},
    types::MonthKey,
};

fn team(id: i64) -> Team {
    Team {
        id,
        name: format!("Team {id}"),
        pin: "0000".into(),
        base_tm_count: 0,
        working_capital_paise: 0,
        cumulative_ebitda_paise: 0,
    }
}

fn rm(team_id: i64, price: i64, bid_volume: i64, allocated: i64, tms: i64) -> RmAllocationResult {
    let spot_price = price * 11 / 10;
    RmAllocationResult {
        team_id,
        quarter_id: 1,
        bid_price_paise: price,
        bid_volume,
        rank: 1,
        allocation_pct: 100,
        allocated_volume: allocated,
        supply_capped: false,
        rm_spot_vol: bid_volume - allocated,
        rm_spot_price_paise: spot_price,
        rm_spot_cost_paise: (bid_volume - allocated) * spot_price,
        tm_bid_count: tms,
        tm_granted: tms,
        tm_shortfall: 0,
    }
}

fn sale(team_id: i64, customer: &str, month: u32, price: i64, volume: i64) -> CustomerAllocationResult {
    CustomerAllocationResult {
        customer_id: customer.into(),
        quarter_id: 1,
        month_id: month,
        rank: 1,
        team_id,
        bid_price_paise: price,
        requested_volume: volume,
        allocated_volume: volume,
    }
}

/// A settled row carrying only the fields later months read.
fn settled(team_id: i64, month: u32, rm_closing_vol: i64, closing: i64, cumulative: i64) -> FinancialRow {
    FinancialRow {
        team_id,
        quarter_id: 1,
        month_id: month,
        sales_vol: 0,
        revenue_paise: 0,
        rm_cost_paise: 0,
        rm_spot_vol: 0,
        rm_spot_cost_paise: 0,
        tm_cost_paise: 0,
        prod_cost_paise: 0,
        rm_liquidation_paise: 0,
        ebitda_paise: cumulative,
        cumulative_ebitda_paise: cumulative,
        cash_inflow_paise: 0,
        opening_balance_paise: closing,
        interest_paise: 0,
        closing_balance_paise: closing,
        borrowed_paise: 0,
        rm_closing_vol,
    }
}

#[test]
fn first_month_ledger_adds_up() {
    let config = GameConfig::default_test();
    let teams = [team(1)];
    let rms = [rm(1, 200_000, 30_000, 30_000, 60)];
    let sales = [sale(1, "lemon", 1, 500_000, 30_000)];

    let rows = settle_month(&MonthContext {
        key: MonthKey::new(1, 1),
        config: &config,
        teams: &teams,
        rm_allocations: &rms,
        customer_allocations: &sales,
        earlier_allocations: &[],
        prior_rows: &[],
    })
    .unwrap();

    let r = &rows[0];
    assert_eq!(r.sales_vol, 30_000);
    assert_eq!(r.revenue_paise, 15_000_000_000);
    assert_eq!(r.rm_cost_paise, 2_000_000_000); // one third of the quarter's bill
    assert_eq!(r.tm_cost_paise, 60 * 18_000_000);
    assert_eq!(r.prod_cost_paise, 30_000 * 40_000);
    assert_eq!(r.rm_liquidation_paise, 0);
    assert_eq!(r.ebitda_paise, 10_720_000_000);
    assert_eq!(r.cumulative_ebitda_paise, r.ebitda_paise);
    assert_eq!(r.cash_inflow_paise, 15_000_000_000); // lemon pays immediately
    assert_eq!(r.opening_balance_paise, config.working_capital.seed_paise);
    assert_eq!(r.interest_paise, 0);
    assert_eq!(r.closing_balance_paise, config.working_capital.seed_paise + r.ebitda_paise);
    assert_eq!(r.rm_closing_vol, 0);
}

#[test]
fn production_tier_boundaries() {
    let config = GameConfig::default_test();
    assert_eq!(production_cost(&config, 30_000).unwrap(), 30_000 * 40_000);
    assert_eq!(production_cost(&config, 29_999).unwrap(), 29_999 * 50_000);
    assert_eq!(production_cost(&config, 20_000).unwrap(), 20_000 * 50_000);
    assert_eq!(production_cost(&config, 9_999).unwrap(), 9_999 * 70_000);
    assert_eq!(production_cost(&config, 0).unwrap(), 0);
}

#[test]
fn selling_beyond_rm_on_hand_buys_spot() {
    let config = GameConfig::default_test();
    let teams = [team(1)];
    let rms = [rm(1, 200_000, 1_000, 1_000, 10)];
    let sales = [sale(1, "lemon", 1, 500_000, 1_500)];

    let rows = settle_month(&MonthContext {
        key: MonthKey::new(1, 1),
        config: &config,
        teams: &teams,
        rm_allocations: &rms,
        customer_allocations: &sales,
        earlier_allocations: &[],
        prior_rows: &[],
    })
    .unwrap();

    let r = &rows[0];
    assert_eq!(r.rm_spot_vol, 500);
    assert_eq!(r.rm_spot_cost_paise, 500 * 220_000);
    assert_eq!(r.rm_closing_vol, 0);
    assert_eq!(r.rm_cost_paise, split_third(1_000 * 200_000, 0) + 500 * 220_000);
}

fn split_third(total: i64, index: i64) -> i64 {
    total / 3 + if index < total % 3 { 1 } else { 0 }
}

#[test]
fn leftover_rm_is_liquidated_at_lowest_winning_bid_on_quarter_end() {
    let config = GameConfig::default_test();
    let teams = [team(1), team(2)];
    let rms = [rm(1, 250_000, 3_000, 3_000, 5), rm(2, 200_000, 3_000, 2_000, 5)];
    let prior = [
        settled(1, 2, 500, 1_000_000, 10),
        settled(2, 2, 0, 1_000_000, 10),
    ];

    let rows = settle_month(&MonthContext {
        key: MonthKey::new(1, 3),
        config: &config,
        teams: &teams,
        rm_allocations: &rms,
        customer_allocations: &[],
        earlier_allocations: &[],
        prior_rows: &prior,
    })
    .unwrap();

    assert_eq!(rows[0].rm_liquidation_paise, 500 * 200_000);
    assert_eq!(rows[1].rm_liquidation_paise, 0);
    for r in &rows {
        assert_eq!(
            r.ebitda_paise,
            r.revenue_paise - r.rm_cost_paise - r.tm_cost_paise - r.prod_cost_paise
                + r.rm_liquidation_paise
        );
        assert_eq!(r.cumulative_ebitda_paise, 10 + r.ebitda_paise);
        assert_eq!(r.opening_balance_paise, 1_000_000);
    }
}

#[test]
fn rm_is_not_liquidated_mid_quarter() {
    let config = GameConfig::default_test();
    let teams = [team(1)];
    let rms = [rm(1, 200_000, 3_000, 3_000, 5)];
    let prior = [settled(1, 1, 2_000, 0, 0)];

    let rows = settle_month(&MonthContext {
        key: MonthKey::new(1, 2),
        config: &config,
        teams: &teams,
        rm_allocations: &rms,
        customer_allocations: &[],
        earlier_allocations: &[],
        prior_rows: &prior,
    })
    .unwrap();
    assert_eq!(rows[0].rm_liquidation_paise, 0);
    assert_eq!(rows[0].rm_closing_vol, 2_000);
}

#[test]
fn sixty_day_customer_pays_two_months_later() {
    let config = GameConfig::default_test();
    let teams = [team(1)];
    let rms = [rm(1, 200_000, 3_000, 3_000, 5)];
    let earlier = [sale(1, "laddu", 1, 400_000, 1_000), sale(1, "shahi", 1, 400_000, 1_000)];
    let prior = [settled(1, 1, 2_000, 0, 0), settled(1, 2, 2_000, 0, 0)];

    let rows = settle_month(&MonthContext {
        key: MonthKey::new(1, 3),
        config: &config,
        teams: &teams,
        rm_allocations: &rms,
        customer_allocations: &[],
        earlier_allocations: &earlier,
        prior_rows: &prior,
    })
    .unwrap();

    // Laddu's month-1 sale lands in month 3; Shahi's landed in month 2.
    assert_eq!(rows[0].cash_inflow_paise, 1_000 * 400_000);
    assert_eq!(rows[0].revenue_paise, 0);
}

#[test]
fn borrowing_interest_compounds_month_on_month() {
    let config = GameConfig::default_test();
    let first = roll_working_capital(&config, 1, 0, -1_000_000);
    assert_eq!(first.interest_paise, 20_000);
    assert_eq!(first.closing_paise, -1_020_000);

    let second = roll_working_capital(&config, 1, first.closing_paise, 0);
    assert_eq!(second.interest_paise, 20_400);
    assert_eq!(second.closing_paise, -1_040_400);
    assert_eq!(second.borrowed_paise, 1_040_400);
}

#[test]
fn settlement_is_a_pure_function_of_its_inputs() {
    let config = GameConfig::default_test();
    let teams = [team(1), team(2)];
    let rms = [rm(1, 210_000, 20_000, 18_000, 30), rm(2, 190_000, 20_000, 16_000, 30)];
    let sales = [sale(1, "laddu", 1, 450_000, 9_000), sale(2, "shahi", 1, 470_000, 7_000)];
    let ctx = MonthContext {
        key: MonthKey::new(1, 1),
        config: &config,
        teams: &teams,
        rm_allocations: &rms,
        customer_allocations: &sales,
        earlier_allocations: &[],
        prior_rows: &[],
    };
    assert_eq!(settle_month(&ctx).unwrap(), settle_month(&ctx).unwrap());
}

#[test]
fn leaderboard_sorts_by_total_then_team_id() {
    let teams = [team(1), team(2), team(3), team(4)];
    let mut rows = Vec::new();
    for (team_id, q1, q2) in [(1, 100, 50), (2, 200, -50), (3, 120, 30)] {
        let mut a = settled(team_id, 1, 0, 0, q1);
        a.ebitda_paise = q1;
        let mut b = settled(team_id, 1, 0, 0, q1 + q2);
        b.quarter_id = 2;
        b.ebitda_paise = q2;
        rows.push(a);
        rows.push(b);
    }

    let board = leaderboard(&teams, &rows, 2);
    let order: Vec<(u32, i64, i64)> = board
        .iter()
        .map(|e| (e.rank, e.team_id, e.total_game_ebitda_paise))
        .collect();
    // Teams 1, 2 and 3 all total 150; team 4 has no rows.
    assert_eq!(order, vec![(1, 1, 150), (2, 2, 150), (3, 3, 150), (4, 4, 0)]);
    assert_eq!(board[1].quarter_ebitda_paise, -50);

    let q1_only = leaderboard(&teams, &rows, 1);
    assert_eq!(q1_only[0].team_id, 2);
    assert_eq!(q1_only[0].total_game_ebitda_paise, 200);
}
