//! Financial settlement engine: monthly P&L rows and the leaderboard.
//!
//! This engine is REACTIVE and PURE. It reads the quarter's RM/TM
//! allocation, the month's customer allocation and the rows already
//! settled for earlier months, and produces one row per team. It never
//! touches the store; the engine commits the rows atomically.
//!
//! All arithmetic is integer paise. Rounding happens only where a rate is
//! applied (interest), half-up.
//!
//! Month flow per team:
//!   1. Revenue from the month's winning customer allocations.
//!   2. RM bill for the quarter paid in equal monthly installments.
//!   3. RM inventory: month 1 opens with the full bid volume, sales draw it
//!      down, any overdraw is bought at the team's spot price.
//!   4. TM rent: standard rate for granted TMs, penalty rate for the rest.
//!   5. Tiered production cost on the month's sales volume.
//!   6. Last month of the quarter: leftover RM sold at the lowest winning bid.
//!   7. Working capital: EBITDA in, interest on borrowing out, compounding.

use crate::{
    config::GameConfig,
    error::{GameError, GameResult},
    model::{CustomerAllocationResult, FinancialRow, LeaderboardEntry, RmAllocationResult, Team},
    rm_allocation::lowest_winning_price,
    types::{div_round_half_up, MonthKey, Paise, QuarterId, TeamId, Volume},
};
use std::collections::BTreeMap;

/// Everything a month's settlement depends on.
pub struct MonthContext<'a> {
    pub key: MonthKey,
    pub config: &'a GameConfig,
    pub teams: &'a [Team],
    /// Allocation results of `key.quarter`.
    pub rm_allocations: &'a [RmAllocationResult],
    /// Customer allocation results of `key`.
    pub customer_allocations: &'a [CustomerAllocationResult],
    /// Customer allocation results of earlier months still inside the
    /// longest payment term. Used for cash inflow only.
    pub earlier_allocations: &'a [CustomerAllocationResult],
    /// All rows settled strictly before `key`.
    pub prior_rows: &'a [FinancialRow],
}

/// Split `total` into `parts` near-equal integers; earlier parts take the remainder.
pub fn split_even(total: i64, parts: u32, index: u32) -> i64 {
    if parts == 0 {
        return 0;
    }
    let parts = parts as i64;
    let base = total.div_euclid(parts);
    let remainder = total.rem_euclid(parts);
    base + if (index as i64) < remainder { 1 } else { 0 }
}

fn mul(a: i64, b: i64, what: &str) -> GameResult<i64> {
    a.checked_mul(b)
        .ok_or_else(|| GameError::invariant(format!("overflow computing {what}: {a} x {b}")))
}

/// Production cost for a month: the whole volume at the tier it falls in.
pub fn production_cost(config: &GameConfig, sales_vol: Volume) -> GameResult<Paise> {
    mul(sales_vol, config.production_rate(sales_vol), "production cost")
}

/// Working-capital roll-forward for one month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapitalRoll {
    pub interest_paise: Paise,
    pub closing_paise:  Paise,
    pub borrowed_paise: Paise,
}

pub fn roll_working_capital(
    config: &GameConfig,
    team_id: TeamId,
    opening_paise: Paise,
    ebitda_paise: Paise,
) -> CapitalRoll {
    let wc = &config.working_capital;
    let before_interest = opening_paise + ebitda_paise;
    let borrowed = (-before_interest).max(0);
    if borrowed > wc.borrowing_ceiling_paise {
        log::warn!(
            "team {team_id} needs {borrowed} paise of borrowing, above the ceiling {}",
            wc.borrowing_ceiling_paise
        );
    }
    let interest_base = borrowed.min(wc.borrowing_ceiling_paise);
    let interest = div_round_half_up(
        interest_base as i128 * wc.monthly_interest_bps as i128,
        10_000,
    ) as Paise;
    let closing = before_interest - interest;
    CapitalRoll {
        interest_paise: interest,
        closing_paise:  closing,
        borrowed_paise: (-closing).max(0),
    }
}

pub fn settle_month(ctx: &MonthContext<'_>) -> GameResult<Vec<FinancialRow>> {
    let config = ctx.config;
    let months = config.months_per_quarter;
    let key = ctx.key;
    if key.month == 0 || key.month > months {
        return Err(GameError::invalid(format!("{key} is outside the quarter")));
    }
    if ctx.teams.is_empty() {
        return Err(GameError::insufficient("no registered teams"));
    }

    let global = key.global_index(months);
    let month_index = key.month - 1;
    let is_quarter_end = key.month == months;
    let liquidation_price = lowest_winning_price(ctx.rm_allocations).unwrap_or(0);

    // Latest earlier row per team: opening balance and cumulative EBITDA.
    let mut latest: BTreeMap<TeamId, &FinancialRow> = BTreeMap::new();
    for row in ctx.prior_rows {
        let slot = latest.entry(row.team_id).or_insert(row);
        if row.month_key() > slot.month_key() {
            *slot = row;
        }
    }
    let previous_key = MonthKey::from_global_index(global - 1, months);

    let mut teams: Vec<&Team> = ctx.teams.iter().collect();
    teams.sort_by_key(|t| t.id);

    let mut rows = Vec::with_capacity(teams.len());
    for team in teams {
        let rm = ctx.rm_allocations.iter().find(|r| r.team_id == team.id);
        let previous = latest.get(&team.id).copied();
        let previous_in_quarter =
            previous.filter(|p| Some(p.month_key()) == previous_key && key.month > 1);

        // ── Revenue ────────────────────────────────────────────
        let (sales_vol, revenue_paise) = ctx
            .customer_allocations
            .iter()
            .filter(|a| a.team_id == team.id)
            .try_fold((0 as Volume, 0 as Paise), |(vol, rev), a| {
                Ok::<_, GameError>((vol + a.allocated_volume, rev + mul(a.allocated_volume, a.bid_price_paise, "revenue")?))
            })?;

        // ── RM ─────────────────────────────────────────────────
        let (standard_installment, spot_vol_installment, spot_cost_installment, spot_price, bid_volume) =
            match rm {
                Some(r) => (
                    split_even(mul(r.allocated_volume, r.bid_price_paise, "RM cost")?, months, month_index),
                    split_even(r.rm_spot_vol, months, month_index),
                    split_even(r.rm_spot_cost_paise, months, month_index),
                    r.rm_spot_price_paise,
                    r.bid_volume,
                ),
                None => (0, 0, 0, 0, 0),
            };

        let opening_rm = if key.month == 1 {
            bid_volume
        } else {
            match previous_in_quarter {
                Some(p) => p.rm_closing_vol,
                None if rm.is_none() => 0,
                None => {
                    return Err(GameError::insufficient(format!(
                        "team {} has no settled row for the month before {key}",
                        team.id
                    )));
                }
            }
        };
        let topup_vol = (sales_vol - opening_rm).max(0);
        let rm_closing_vol = (opening_rm - sales_vol).max(0);
        let topup_cost = mul(topup_vol, spot_price, "RM top-up")?;
        if topup_vol > 0 {
            log::debug!("{key} team {}: bought {topup_vol} m3 RM at spot", team.id);
        }

        let rm_spot_vol = spot_vol_installment + topup_vol;
        let rm_spot_cost_paise = spot_cost_installment + topup_cost;
        let rm_cost_paise = standard_installment + rm_spot_cost_paise;

        // ── TM ─────────────────────────────────────────────────
        let tm_cost_paise = match rm {
            Some(r) => {
                mul(r.tm_granted, config.tm.monthly_cost_paise, "TM cost")?
                    + mul(r.tm_shortfall, config.tm.penalty_monthly_cost_paise, "TM penalty cost")?
            }
            None => 0,
        };

        // ── Production ─────────────────────────────────────────
        let prod_cost_paise = production_cost(config, sales_vol)?;

        // ── Quarter-end liquidation ────────────────────────────
        let rm_liquidation_paise = if is_quarter_end {
            mul(rm_closing_vol, liquidation_price, "RM liquidation")?
        } else {
            0
        };

        let ebitda_paise =
            revenue_paise - rm_cost_paise - tm_cost_paise - prod_cost_paise + rm_liquidation_paise;
        let cumulative_ebitda_paise =
            previous.map(|p| p.cumulative_ebitda_paise).unwrap_or(0) + ebitda_paise;

        // ── Cash & working capital ─────────────────────────────
        let cash_inflow_paise = cash_inflow(ctx, team.id, global)?;
        let opening_balance_paise = previous
            .map(|p| p.closing_balance_paise)
            .unwrap_or(config.working_capital.seed_paise);
        let roll = roll_working_capital(config, team.id, opening_balance_paise, ebitda_paise);

        rows.push(FinancialRow {
            team_id: team.id,
            quarter_id: key.quarter,
            month_id: key.month,
            sales_vol,
            revenue_paise,
            rm_cost_paise,
            rm_spot_vol,
            rm_spot_cost_paise,
            tm_cost_paise,
            prod_cost_paise,
            rm_liquidation_paise,
            ebitda_paise,
            cumulative_ebitda_paise,
            cash_inflow_paise,
            opening_balance_paise,
            interest_paise: roll.interest_paise,
            closing_balance_paise: roll.closing_paise,
            borrowed_paise: roll.borrowed_paise,
            rm_closing_vol,
        });
    }

    verify_rows(&rows)?;
    Ok(rows)
}

/// Revenue that lands as cash in month `global`, after each customer's terms.
fn cash_inflow(ctx: &MonthContext<'_>, team_id: TeamId, global: u32) -> GameResult<Paise> {
    let months = ctx.config.months_per_quarter;
    let mut total: Paise = 0;
    for a in ctx
        .customer_allocations
        .iter()
        .chain(ctx.earlier_allocations.iter())
        .filter(|a| a.team_id == team_id && a.allocated_volume > 0)
    {
        let delay = ctx
            .config
            .customer(&a.customer_id)
            .map(|c| c.payment_delay_months())
            .unwrap_or(0);
        let sold_in = MonthKey::new(a.quarter_id, a.month_id).global_index(months);
        if sold_in + delay == global {
            total += mul(a.allocated_volume, a.bid_price_paise, "cash inflow")?;
        }
    }
    Ok(total)
}

fn verify_rows(rows: &[FinancialRow]) -> GameResult<()> {
    for r in rows {
        let negative = [
            ("sales_vol", r.sales_vol),
            ("revenue", r.revenue_paise),
            ("rm_cost", r.rm_cost_paise),
            ("rm_spot_vol", r.rm_spot_vol),
            ("rm_spot_cost", r.rm_spot_cost_paise),
            ("tm_cost", r.tm_cost_paise),
            ("prod_cost", r.prod_cost_paise),
            ("rm_liquidation", r.rm_liquidation_paise),
            ("interest", r.interest_paise),
            ("rm_closing_vol", r.rm_closing_vol),
        ]
        .into_iter()
        .find(|(_, v)| *v < 0);
        if let Some((field, value)) = negative {
            return Err(GameError::invariant(format!(
                "team {} {}-M{}: {field} is negative ({value})",
                r.team_id, r.quarter_id, r.month_id
            )));
        }
        let expected = r.revenue_paise - r.rm_cost_paise - r.tm_cost_paise - r.prod_cost_paise
            + r.rm_liquidation_paise;
        if r.ebitda_paise != expected {
            return Err(GameError::invariant(format!(
                "team {} EBITDA {} does not match its components {expected}",
                r.team_id, r.ebitda_paise
            )));
        }
        if r.rm_spot_cost_paise > r.rm_cost_paise {
            return Err(GameError::invariant(format!(
                "team {} spot cost exceeds total RM cost",
                r.team_id
            )));
        }
    }
    Ok(())
}

/// Fold all rows up to and including `quarter` into a ranked leaderboard.
/// Teams with no rows yet appear with zero.
pub fn leaderboard(
    teams: &[Team],
    rows: &[FinancialRow],
    quarter: QuarterId,
) -> Vec<LeaderboardEntry> {
    let mut totals: BTreeMap<TeamId, (Paise, Paise)> =
        teams.iter().map(|t| (t.id, (0, 0))).collect();

    for row in rows.iter().filter(|r| r.quarter_id <= quarter) {
        if let Some((total, in_quarter)) = totals.get_mut(&row.team_id) {
            *total += row.ebitda_paise;
            if row.quarter_id == quarter {
                *in_quarter += row.ebitda_paise;
            }
        }
    }

    let mut entries: Vec<LeaderboardEntry> = teams
        .iter()
        .map(|t| {
            let (total, in_quarter) = totals.get(&t.id).copied().unwrap_or((0, 0));
            LeaderboardEntry {
                rank: 0,
                team_id: t.id,
                team_name: t.name.clone(),
                total_game_ebitda_paise: total,
                quarter_ebitda_paise: in_quarter,
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        b.total_game_ebitda_paise
            .cmp(&a.total_game_ebitda_paise)
            .then(a.team_id.cmp(&b.team_id))
    });
    for (i, e) in entries.iter_mut().enumerate() {
        e.rank = i as u32 + 1;
    }
    entries
}
