use super::GameStore;
use crate::{
    error::{GameError, GameResult},
    model::Team,
    types::{Paise, TeamId},
};
use rusqlite::{params, OptionalExtension, Row};

fn team_from_row(row: &Row<'_>) -> rusqlite::Result<Team> {
    Ok(Team {
        id:                      row.get(0)?,
        name:                    row.get(1)?,
        pin:                     row.get(2)?,
        base_tm_count:           row.get(3)?,
        working_capital_paise:   row.get(4)?,
        cumulative_ebitda_paise: row.get(5)?,
    })
}

impl GameStore {
    // ── Team ───────────────────────────────────────────────────

    pub fn create_team(&self, name: &str, pin: &str, seed_capital: Paise) -> GameResult<TeamId> {
        let existing: Option<TeamId> = self
            .conn
            .query_row(
                "SELECT team_id FROM team WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(GameError::invalid(format!("team name '{name}' is taken")));
        }
        self.conn.execute(
            "INSERT INTO team (name, pin, base_tm_count, working_capital_paise, cumulative_ebitda_paise)
             VALUES (?1, ?2, 0, ?3, 0)",
            params![name, pin, seed_capital],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn all_teams(&self) -> GameResult<Vec<Team>> {
        let mut stmt = self.conn.prepare(
            "SELECT team_id, name, pin, base_tm_count, working_capital_paise, cumulative_ebitda_paise
             FROM team ORDER BY team_id ASC",
        )?;
        let rows = stmt.query_map([], team_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
