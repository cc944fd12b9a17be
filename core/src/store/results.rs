use super::{write_event, GameStore};
use crate::{
    error::GameResult,
    event::GameEvent,
    model::{CustomerAllocationResult, FinancialRow, RmAllocationResult},
    types::{MonthId, MonthKey, QuarterId},
};
use rusqlite::{params, Row};

const FINANCIAL_COLUMNS: &str = "team_id, quarter_id, month_id, sales_vol, revenue_paise,
    rm_cost_paise, rm_spot_vol, rm_spot_cost_paise, tm_cost_paise, prod_cost_paise,
    rm_liquidation_paise, ebitda_paise, cumulative_ebitda_paise, cash_inflow_paise,
    opening_balance_paise, interest_paise, closing_balance_paise, borrowed_paise, rm_closing_vol";

fn financial_from_row(row: &Row<'_>) -> rusqlite::Result<FinancialRow> {
    Ok(FinancialRow {
        team_id:                 row.get(0)?,
        quarter_id:              row.get(1)?,
        month_id:                row.get(2)?,
        sales_vol:               row.get(3)?,
        revenue_paise:           row.get(4)?,
        rm_cost_paise:           row.get(5)?,
        rm_spot_vol:             row.get(6)?,
        rm_spot_cost_paise:      row.get(7)?,
        tm_cost_paise:           row.get(8)?,
        prod_cost_paise:         row.get(9)?,
        rm_liquidation_paise:    row.get(10)?,
        ebitda_paise:            row.get(11)?,
        cumulative_ebitda_paise: row.get(12)?,
        cash_inflow_paise:       row.get(13)?,
        opening_balance_paise:   row.get(14)?,
        interest_paise:          row.get(15)?,
        closing_balance_paise:   row.get(16)?,
        borrowed_paise:          row.get(17)?,
        rm_closing_vol:          row.get(18)?,
    })
}

impl GameStore {
    // ── RM/TM allocation ───────────────────────────────────────

    pub fn replace_rm_allocation(
        &self,
        quarter: QuarterId,
        results: &[RmAllocationResult],
        event: &GameEvent,
    ) -> GameResult<i64> {
        let payload = serde_json::to_string(event)?;
        self.atomically(&format!("rm_allocation/Q{quarter}"), |tx| {
            tx.execute("DELETE FROM rm_allocation WHERE quarter_id = ?1", params![quarter])?;
            let mut insert = tx.prepare(
                "INSERT INTO rm_allocation (
                    quarter_id, team_id, bid_price_paise, bid_volume, rank, allocation_pct,
                    allocated_volume, supply_capped, rm_spot_vol, rm_spot_price_paise,
                    rm_spot_cost_paise, tm_bid_count, tm_granted, tm_shortfall
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            )?;
            let mut update_team =
                tx.prepare("UPDATE team SET base_tm_count = ?2 WHERE team_id = ?1")?;
            for r in results {
                insert.execute(params![
                    quarter,
                    r.team_id,
                    r.bid_price_paise,
                    r.bid_volume,
                    r.rank,
                    r.allocation_pct,
                    r.allocated_volume,
                    r.supply_capped,
                    r.rm_spot_vol,
                    r.rm_spot_price_paise,
                    r.rm_spot_cost_paise,
                    r.tm_bid_count,
                    r.tm_granted,
                    r.tm_shortfall,
                ])?;
                update_team.execute(params![r.team_id, r.tm_total()])?;
            }
            write_event(tx, event, &payload)
        })
    }

    pub fn rm_allocations_for_quarter(
        &self,
        quarter: QuarterId,
    ) -> GameResult<Vec<RmAllocationResult>> {
        let mut stmt = self.conn.prepare(
            "SELECT team_id, quarter_id, bid_price_paise, bid_volume, rank, allocation_pct,
                    allocated_volume, supply_capped, rm_spot_vol, rm_spot_price_paise,
                    rm_spot_cost_paise, tm_bid_count, tm_granted, tm_shortfall
             FROM rm_allocation WHERE quarter_id = ?1 ORDER BY rank ASC",
        )?;
        let rows = stmt.query_map(params![quarter], |row| {
            Ok(RmAllocationResult {
                team_id:             row.get(0)?,
                quarter_id:          row.get(1)?,
                bid_price_paise:     row.get(2)?,
                bid_volume:          row.get(3)?,
                rank:                row.get(4)?,
                allocation_pct:      row.get(5)?,
                allocated_volume:    row.get(6)?,
                supply_capped:       row.get(7)?,
                rm_spot_vol:         row.get(8)?,
                rm_spot_price_paise: row.get(9)?,
                rm_spot_cost_paise:  row.get(10)?,
                tm_bid_count:        row.get(11)?,
                tm_granted:          row.get(12)?,
                tm_shortfall:        row.get(13)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Customer allocation ────────────────────────────────────

    pub fn replace_customer_allocation(
        &self,
        key: MonthKey,
        results: &[CustomerAllocationResult],
        event: &GameEvent,
    ) -> GameResult<i64> {
        let payload = serde_json::to_string(event)?;
        self.atomically(&format!("customer_allocation/{key}"), |tx| {
            tx.execute(
                "DELETE FROM customer_allocation WHERE quarter_id = ?1 AND month_id = ?2",
                params![key.quarter, key.month],
            )?;
            let mut insert = tx.prepare(
                "INSERT INTO customer_allocation (
                    quarter_id, month_id, customer_id, team_id, rank,
                    bid_price_paise, requested_volume, allocated_volume
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for r in results {
                insert.execute(params![
                    key.quarter,
                    key.month,
                    r.customer_id,
                    r.team_id,
                    r.rank,
                    r.bid_price_paise,
                    r.requested_volume,
                    r.allocated_volume,
                ])?;
            }
            write_event(tx, event, &payload)
        })
    }

    pub fn customer_allocations_for_month(
        &self,
        key: MonthKey,
    ) -> GameResult<Vec<CustomerAllocationResult>> {
        let mut stmt = self.conn.prepare(
            "SELECT customer_id, quarter_id, month_id, rank, team_id,
                    bid_price_paise, requested_volume, allocated_volume
             FROM customer_allocation WHERE quarter_id = ?1 AND month_id = ?2
             ORDER BY customer_id ASC, rank ASC",
        )?;
        let rows = stmt.query_map(params![key.quarter, key.month], |row| {
            Ok(CustomerAllocationResult {
                customer_id:      row.get(0)?,
                quarter_id:       row.get(1)?,
                month_id:         row.get(2)?,
                rank:             row.get(3)?,
                team_id:          row.get(4)?,
                bid_price_paise:  row.get(5)?,
                requested_volume: row.get(6)?,
                allocated_volume: row.get(7)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Financials ─────────────────────────────────────────────

    /// Replace the month's rows, refresh each team's running totals from
    /// its latest settled row and log `event`, all in one transaction.
    pub fn replace_financials(
        &self,
        key: MonthKey,
        rows: &[FinancialRow],
        event: &GameEvent,
    ) -> GameResult<i64> {
        let payload = serde_json::to_string(event)?;
        self.atomically(&format!("financials/{key}"), |tx| {
            tx.execute(
                "DELETE FROM financial_row WHERE quarter_id = ?1 AND month_id = ?2",
                params![key.quarter, key.month],
            )?;
            let mut insert = tx.prepare(&format!(
                "INSERT INTO financial_row ({FINANCIAL_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                         ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)"
            ))?;
            for r in rows {
                insert.execute(params![
                    r.team_id,
                    r.quarter_id,
                    r.month_id,
                    r.sales_vol,
                    r.revenue_paise,
                    r.rm_cost_paise,
                    r.rm_spot_vol,
                    r.rm_spot_cost_paise,
                    r.tm_cost_paise,
                    r.prod_cost_paise,
                    r.rm_liquidation_paise,
                    r.ebitda_paise,
                    r.cumulative_ebitda_paise,
                    r.cash_inflow_paise,
                    r.opening_balance_paise,
                    r.interest_paise,
                    r.closing_balance_paise,
                    r.borrowed_paise,
                    r.rm_closing_vol,
                ])?;
            }
            tx.execute_batch(
                "UPDATE team SET
                    working_capital_paise = (
                        SELECT f.closing_balance_paise FROM financial_row f
                        WHERE f.team_id = team.team_id
                        ORDER BY f.quarter_id DESC, f.month_id DESC LIMIT 1),
                    cumulative_ebitda_paise = (
                        SELECT f.cumulative_ebitda_paise FROM financial_row f
                        WHERE f.team_id = team.team_id
                        ORDER BY f.quarter_id DESC, f.month_id DESC LIMIT 1)
                 WHERE team_id IN (SELECT team_id FROM financial_row);",
            )?;
            write_event(tx, event, &payload)
        })
    }

    pub fn financial_rows_for(
        &self,
        quarter: QuarterId,
        month: Option<MonthId>,
    ) -> GameResult<Vec<FinancialRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {FINANCIAL_COLUMNS} FROM financial_row
             WHERE quarter_id = ?1 AND (?2 IS NULL OR month_id = ?2)
             ORDER BY month_id ASC, team_id ASC"
        ))?;
        let rows = stmt.query_map(params![quarter, month], financial_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn financial_rows_earlier_than(&self, key: MonthKey) -> GameResult<Vec<FinancialRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {FINANCIAL_COLUMNS} FROM financial_row
             WHERE quarter_id < ?1 OR (quarter_id = ?1 AND month_id < ?2)
             ORDER BY quarter_id ASC, month_id ASC, team_id ASC"
        ))?;
        let rows = stmt.query_map(params![key.quarter, key.month], financial_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
