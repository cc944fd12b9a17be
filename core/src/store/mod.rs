//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Engines read through `BidLedgerReader` and write through the
//! `LedgerStore` commit methods; they never execute SQL directly.
//!
//! Every `commit_*` runs inside one SQLite transaction. On any error the
//! transaction is dropped, which rolls it back, and the prior results for
//! the key stay exactly as they were.

use crate::{
    error::{GameError, GameResult},
    event::{EventLogEntry, GameEvent},
    ledger::LedgerStore,
    model::{CustomerAllocationResult, CustomerBid, FinancialRow, RmAllocationResult, RmBid, Team},
    phase::{GameState, Phase},
    types::{MonthId, MonthKey, Paise, QuarterId, TeamId},
};
use rusqlite::{params, Connection, OptionalExtension};

mod bids;
mod results;
mod team;

pub struct GameStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl GameStore {
    pub fn open(path: &str) -> GameResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> GameResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Reopen a new connection to the same database.
    /// Read-side callers use this to stay off the writer's connection.
    /// For in-memory databases, this returns a new in-memory database (isolated).
    pub fn reopen(&self) -> GameResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> GameResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_results.sql"))?;
        Ok(())
    }

    /// Run `f` inside a transaction and report failures against `key`.
    fn atomically<T, F>(&self, key: &str, f: F) -> GameResult<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> rusqlite::Result<T>,
    {
        let attempt = || -> rusqlite::Result<T> {
            let tx = self.conn.unchecked_transaction()?;
            let out = f(&tx)?;
            tx.commit()?;
            Ok(out)
        };
        attempt().map_err(|source| {
            log::error!("commit of {key} rolled back: {source}");
            GameError::PersistenceFailure {
                key: key.to_string(),
                source,
            }
        })
    }

    // ── Game state ─────────────────────────────────────────────

    pub fn game_state(&self) -> GameResult<Option<GameState>> {
        let row = self
            .conn
            .query_row(
                "SELECT phase, current_quarter, current_month, months_per_quarter, max_quarters
                 FROM game_state WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, u32>(3)?,
                        row.get::<_, u32>(4)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((phase, quarter, month, mpq, max_q)) => {
                let phase = Phase::parse(&phase).ok_or_else(|| {
                    GameError::invalid(format!("stored phase '{phase}' is not recognised"))
                })?;
                Ok(Some(GameState {
                    phase,
                    current_quarter: quarter,
                    current_month_within_quarter: month,
                    months_per_quarter: mpq,
                    max_quarters: max_q,
                }))
            }
        }
    }

    pub fn put_game_state(&self, state: &GameState) -> GameResult<()> {
        self.conn.execute(
            "INSERT INTO game_state
                (id, phase, current_quarter, current_month, months_per_quarter, max_quarters)
             VALUES (1, ?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                phase = excluded.phase,
                current_quarter = excluded.current_quarter,
                current_month = excluded.current_month,
                months_per_quarter = excluded.months_per_quarter,
                max_quarters = excluded.max_quarters",
            params![
                state.phase.as_str(),
                state.current_quarter,
                state.current_month_within_quarter,
                state.months_per_quarter,
                state.max_quarters,
            ],
        )?;
        Ok(())
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn insert_event(&self, event: &GameEvent) -> GameResult<i64> {
        let payload = serde_json::to_string(event)?;
        Ok(write_event(&self.conn, event, &payload)?)
    }

    pub fn max_event_seq(&self) -> GameResult<i64> {
        let seq: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(seq), 0) FROM event_log",
            [],
            |row| row.get(0),
        )?;
        Ok(seq)
    }

    pub fn events_after(&self, seq: i64) -> GameResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, event_type, payload FROM event_log
             WHERE seq > ?1 ORDER BY seq ASC",
        )?;
        let entries = stmt
            .query_map(params![seq], |row| {
                Ok(EventLogEntry {
                    seq:        row.get(0)?,
                    event_type: row.get(1)?,
                    payload:    row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // ── Reset ──────────────────────────────────────────────────

    pub fn wipe_game(&self) -> GameResult<()> {
        self.atomically("reset", |tx| {
            tx.execute_batch(
                "DELETE FROM financial_row;
                 DELETE FROM customer_allocation;
                 DELETE FROM rm_allocation;
                 DELETE FROM customer_bid;
                 DELETE FROM rm_bid;
                 DELETE FROM team;
                 DELETE FROM sqlite_sequence WHERE name = 'team';",
            )
        })
    }
}

/// Append one serialized event on `conn`, which may be an open transaction.
fn write_event(conn: &Connection, event: &GameEvent, payload: &str) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO event_log (event_type, payload) VALUES (?1, ?2)",
        params![event.type_name(), payload],
    )?;
    Ok(conn.last_insert_rowid())
}

impl LedgerStore for GameStore {
    fn teams(&self) -> GameResult<Vec<Team>> {
        self.all_teams()
    }

    fn rm_bids(&self, quarter: QuarterId) -> GameResult<Vec<RmBid>> {
        self.rm_bids_for_quarter(quarter)
    }

    fn customer_bids(&self, key: MonthKey) -> GameResult<Vec<CustomerBid>> {
        self.customer_bids_for_month(key)
    }

    fn rm_allocations(&self, quarter: QuarterId) -> GameResult<Vec<RmAllocationResult>> {
        self.rm_allocations_for_quarter(quarter)
    }

    fn customer_allocations(&self, key: MonthKey) -> GameResult<Vec<CustomerAllocationResult>> {
        self.customer_allocations_for_month(key)
    }

    fn financial_rows(
        &self,
        quarter: QuarterId,
        month: Option<MonthId>,
    ) -> GameResult<Vec<FinancialRow>> {
        self.financial_rows_for(quarter, month)
    }

    fn financial_rows_before(&self, key: MonthKey) -> GameResult<Vec<FinancialRow>> {
        self.financial_rows_earlier_than(key)
    }

    fn load_game_state(&self) -> GameResult<Option<GameState>> {
        self.game_state()
    }

    fn events_since(&self, seq: i64) -> GameResult<Vec<EventLogEntry>> {
        self.events_after(seq)
    }

    fn last_event_seq(&self) -> GameResult<i64> {
        self.max_event_seq()
    }

    fn insert_team(&self, name: &str, pin: &str, seed_capital: Paise) -> GameResult<TeamId> {
        self.create_team(name, pin, seed_capital)
    }

    fn upsert_rm_bid(&self, bid: &RmBid) -> GameResult<()> {
        self.put_rm_bid(bid)
    }

    fn upsert_customer_bid(&self, bid: &CustomerBid) -> GameResult<()> {
        self.put_customer_bid(bid)
    }

    fn commit_rm_allocation(
        &self,
        quarter: QuarterId,
        results: &[RmAllocationResult],
        event: &GameEvent,
    ) -> GameResult<i64> {
        self.replace_rm_allocation(quarter, results, event)
    }

    fn commit_customer_allocation(
        &self,
        key: MonthKey,
        results: &[CustomerAllocationResult],
        event: &GameEvent,
    ) -> GameResult<i64> {
        self.replace_customer_allocation(key, results, event)
    }

    fn commit_financials(
        &self,
        key: MonthKey,
        rows: &[FinancialRow],
        event: &GameEvent,
    ) -> GameResult<i64> {
        self.replace_financials(key, rows, event)
    }

    fn save_game_state(&self, state: &GameState) -> GameResult<()> {
        self.put_game_state(state)
    }

    fn append_event(&self, event: &GameEvent) -> GameResult<i64> {
        self.insert_event(event)
    }

    fn reset_game(&self) -> GameResult<()> {
        self.wipe_game()
    }
}
