use crate::ReviewCursor;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during journal operations.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("invalid decision: {0}")]
    InvalidDecision(String),
}

pub type Result<T> = std::result::Result<T, JournalError>;

/// What the operator did with a reviewable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Retained,
    AcceptedAll,
}

impl Decision {
    fn as_str(self) -> &'static str {
        match self {
            Decision::Retained => "retained",
            Decision::AcceptedAll => "accepted_all",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "retained" => Ok(Decision::Retained),
            "accepted_all" => Ok(Decision::AcceptedAll),
            other => Err(JournalError::InvalidDecision(other.to_owned())),
        }
    }
}

/// Decision counts and last position for one map.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JournalSummary {
    pub retained: usize,
    pub accepted_all: bool,
    pub last_cursor: Option<ReviewCursor>,
}

/// One recorded decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionEntry {
    pub relation_id: i64,
    pub decision: Decision,
    pub decided_at: String,
}

/// SQLite-backed local journal of review sessions.
///
/// Keeps the operator's decisions and the last cursor per map so that a
/// session can be resumed where it stopped.
pub struct ReviewJournal {
    conn: Connection,
}

impl ReviewJournal {
    /// Open or create the journal at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS decisions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                map_id INTEGER NOT NULL,
                relation_id INTEGER NOT NULL,
                decision TEXT NOT NULL,
                decided_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE TABLE IF NOT EXISTS cursors (
                map_id INTEGER PRIMARY KEY,
                relation_id INTEGER NOT NULL,
                sort_order INTEGER NOT NULL,
                result_count INTEGER NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )?;
        Ok(Self { conn })
    }

    pub fn record_decision(
        &mut self,
        map_id: i64,
        relation_id: i64,
        decision: Decision,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO decisions (map_id, relation_id, decision) VALUES (?1, ?2, ?3)",
            params![map_id, relation_id, decision.as_str()],
        )?;
        Ok(())
    }

    /// Remember the cursor as the last position reached on its map.
    pub fn save_cursor(&mut self, cursor: &ReviewCursor) -> Result<()> {
        self.conn.execute(
            "INSERT INTO cursors (map_id, relation_id, sort_order, result_count, updated_at)
             VALUES (?1, ?2, ?3, ?4, datetime('now'))
             ON CONFLICT(map_id)
             DO UPDATE SET relation_id = ?2, sort_order = ?3, result_count = ?4,
                           updated_at = datetime('now')",
            params![
                cursor.map_id,
                cursor.relation_id,
                cursor.sort_order,
                cursor.result_count as i64
            ],
        )?;
        Ok(())
    }

    pub fn last_cursor(&self, map_id: i64) -> Result<Option<ReviewCursor>> {
        let cursor = self
            .conn
            .query_row(
                "SELECT relation_id, sort_order, result_count FROM cursors WHERE map_id = ?1",
                params![map_id],
                |row| {
                    let result_count: i64 = row.get(2)?;
                    Ok(ReviewCursor {
                        map_id,
                        relation_id: row.get(0)?,
                        sort_order: row.get(1)?,
                        result_count: result_count.max(0) as u64,
                    })
                },
            )
            .optional()?;
        Ok(cursor)
    }

    /// Decisions recorded for a map, oldest first.
    pub fn decisions(&self, map_id: i64) -> Result<Vec<DecisionEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT relation_id, decision, decided_at FROM decisions
             WHERE map_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![map_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get(2)?))
            })?
            .collect::<std::result::Result<Vec<(i64, String, String)>, _>>()?;

        rows.into_iter()
            .map(|(relation_id, decision, decided_at)| {
                Ok(DecisionEntry {
                    relation_id,
                    decision: Decision::parse(&decision)?,
                    decided_at,
                })
            })
            .collect()
    }

    pub fn summary(&self, map_id: i64) -> Result<JournalSummary> {
        let mut summary = JournalSummary {
            last_cursor: self.last_cursor(map_id)?,
            ..JournalSummary::default()
        };
        for entry in self.decisions(map_id)? {
            match entry.decision {
                Decision::Retained => summary.retained += 1,
                Decision::AcceptedAll => summary.accepted_all = true,
            }
        }
        Ok(summary)
    }

    /// Forget everything recorded for a map.
    pub fn reset(&mut self, map_id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM decisions WHERE map_id = ?1", params![map_id])?;
        self.conn
            .execute("DELETE FROM cursors WHERE map_id = ?1", params![map_id])?;
        Ok(())
    }
}
