use super::GameStore;
use crate::{
    error::GameResult,
    model::{CustomerBid, RmBid},
    types::{MonthKey, QuarterId},
};
use rusqlite::params;

impl GameStore {
    // ── RM bids ────────────────────────────────────────────────

    /// Last write wins for a (team, quarter).
    pub fn put_rm_bid(&self, bid: &RmBid) -> GameResult<()> {
        self.conn.execute(
            "INSERT INTO rm_bid (team_id, quarter_id, bid_price_paise, bid_volume, tm_bid_count)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(team_id, quarter_id) DO UPDATE SET
                bid_price_paise = excluded.bid_price_paise,
                bid_volume = excluded.bid_volume,
                tm_bid_count = excluded.tm_bid_count",
            params![
                bid.team_id,
                bid.quarter_id,
                bid.bid_price_paise,
                bid.bid_volume,
                bid.tm_bid_count,
            ],
        )?;
        Ok(())
    }

    pub fn rm_bids_for_quarter(&self, quarter: QuarterId) -> GameResult<Vec<RmBid>> {
        let mut stmt = self.conn.prepare(
            "SELECT team_id, quarter_id, bid_price_paise, bid_volume, tm_bid_count
             FROM rm_bid WHERE quarter_id = ?1 ORDER BY team_id ASC",
        )?;
        let rows = stmt.query_map(params![quarter], |row| {
            Ok(RmBid {
                team_id:         row.get(0)?,
                quarter_id:      row.get(1)?,
                bid_price_paise: row.get(2)?,
                bid_volume:      row.get(3)?,
                tm_bid_count:    row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Customer bids ──────────────────────────────────────────

    pub fn put_customer_bid(&self, bid: &CustomerBid) -> GameResult<()> {
        self.conn.execute(
            "INSERT INTO customer_bid
                (team_id, quarter_id, month_id, customer_id, ask_price_paise, ask_volume)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(team_id, quarter_id, month_id, customer_id) DO UPDATE SET
                ask_price_paise = excluded.ask_price_paise,
                ask_volume = excluded.ask_volume",
            params![
                bid.team_id,
                bid.quarter_id,
                bid.month_id,
                bid.customer_id,
                bid.ask_price_paise,
                bid.ask_volume,
            ],
        )?;
        Ok(())
    }

    pub fn customer_bids_for_month(&self, key: MonthKey) -> GameResult<Vec<CustomerBid>> {
        let mut stmt = self.conn.prepare(
            "SELECT team_id, quarter_id, month_id, customer_id, ask_price_paise, ask_volume
             FROM customer_bid WHERE quarter_id = ?1 AND month_id = ?2
             ORDER BY customer_id ASC, team_id ASC",
        )?;
        let rows = stmt.query_map(params![key.quarter, key.month], |row| {
            Ok(CustomerBid {
                team_id:         row.get(0)?,
                quarter_id:      row.get(1)?,
                month_id:        row.get(2)?,
                customer_id:     row.get(3)?,
                ask_price_paise: row.get(4)?,
                ask_volume:      row.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
