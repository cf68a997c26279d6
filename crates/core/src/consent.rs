//! Consent responses stored in SQLite.
//!
//! The participant id is the table's primary key, so the database itself
//! enforces at most one consent record per participant. A second insert for
//! the same id fails with [`CoreError::DuplicateParticipant`].

use crate::{CoreError, CoreResult};
use chrono::{DateTime, SecondsFormat, Utc};
use consent_types::{ConsentDecision, ParticipantId};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS consent_responses (
    participant_id TEXT PRIMARY KEY NOT NULL,
    response       TEXT NOT NULL CHECK (response IN ('accept', 'more_info', 'decline')),
    submitted_at   TEXT NOT NULL,
    ip             TEXT,
    user_agent     TEXT
);
";

/// One participant's recorded decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConsentResponse {
    pub participant_id: ParticipantId,
    pub decision: ConsentDecision,
    pub submitted_at: DateTime<Utc>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl ConsentResponse {
    pub fn new(
        participant_id: ParticipantId,
        decision: ConsentDecision,
        ip: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        Self {
            participant_id,
            decision,
            submitted_at: Utc::now(),
            ip,
            user_agent,
        }
    }

    /// Timestamp in the form stored and returned to clients.
    pub fn timestamp(&self) -> String {
        self.submitted_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// SQLite-backed consent table.
pub struct ConsentStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl ConsentStore {
    /// Opens (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> CoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| CoreError::FileWrite {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        tracing::info!("consent database ready at {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> CoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Database file path; `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Inserts a response.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::DuplicateParticipant` if the participant already has
    /// a recorded response, whatever its decision.
    pub fn record(&self, response: &ConsentResponse) -> CoreResult<()> {
        let result = self.conn().execute(
            "INSERT INTO consent_responses (participant_id, response, submitted_at, ip, user_agent)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                response.participant_id.as_str(),
                response.decision.as_str(),
                response.timestamp(),
                response.ip,
                response.user_agent,
            ],
        );

        match result {
            Ok(_) => {
                tracing::info!(
                    "recorded consent response {} for participant {}",
                    response.decision,
                    response.participant_id
                );
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(CoreError::DuplicateParticipant(
                    response.participant_id.to_string(),
                ))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get(&self, participant_id: &ParticipantId) -> CoreResult<Option<ConsentResponse>> {
        let row = self
            .conn()
            .query_row(
                "SELECT participant_id, response, submitted_at, ip, user_agent
                 FROM consent_responses WHERE participant_id = ?1",
                [participant_id.as_str()],
                raw_row,
            )
            .optional()?;
        row.map(RawRow::into_response).transpose()
    }

    /// Every response, oldest first.
    pub fn list(&self) -> CoreResult<Vec<ConsentResponse>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT participant_id, response, submitted_at, ip, user_agent
             FROM consent_responses ORDER BY submitted_at, participant_id",
        )?;
        let rows = stmt
            .query_map([], raw_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawRow::into_response).collect()
    }

    pub fn count(&self) -> CoreResult<u64> {
        let n: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM consent_responses", [], |r| r.get(0))?;
        Ok(n.max(0) as u64)
    }

    /// Writes every response as CSV. Returns the number of data rows.
    pub fn export_csv<W: Write>(&self, writer: W) -> CoreResult<usize> {
        let responses = self.list()?;
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(["participant_id", "response", "submitted_at", "ip", "user_agent"])?;
        for r in &responses {
            let timestamp = r.timestamp();
            csv.write_record([
                r.participant_id.as_str(),
                r.decision.as_str(),
                timestamp.as_str(),
                r.ip.as_deref().unwrap_or(""),
                r.user_agent.as_deref().unwrap_or(""),
            ])?;
        }
        csv.flush().map_err(csv::Error::from)?;
        Ok(responses.len())
    }

    /// Writes a consistent copy of the database to `target`.
    ///
    /// Uses `VACUUM INTO`, so the copy reflects committed data only, even
    /// while requests are writing.
    pub fn snapshot_to(&self, target: &Path) -> CoreResult<()> {
        let target_str = target.to_str().ok_or_else(|| {
            CoreError::InvalidInput(format!("non UTF-8 path: {}", target.display()))
        })?;
        self.conn().execute("VACUUM INTO ?1", [target_str])?;
        Ok(())
    }
}

struct RawRow {
    participant_id: String,
    response: String,
    submitted_at: String,
    ip: Option<String>,
    user_agent: Option<String>,
}

fn raw_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        participant_id: row.get(0)?,
        response: row.get(1)?,
        submitted_at: row.get(2)?,
        ip: row.get(3)?,
        user_agent: row.get(4)?,
    })
}

impl RawRow {
    fn into_response(self) -> CoreResult<ConsentResponse> {
        let participant_id = ParticipantId::parse(&self.participant_id)
            .map_err(|e| CoreError::InvalidInput(format!("stored participant id: {e}")))?;
        let decision = self
            .response
            .parse::<ConsentDecision>()
            .map_err(|e| CoreError::InvalidInput(format!("stored response: {e}")))?;
        let submitted_at = DateTime::parse_from_rfc3339(&self.submitted_at)
            .map_err(|_| CoreError::InvalidTimestamp(self.submitted_at.clone()))?
            .with_timezone(&Utc);

        Ok(ConsentResponse {
            participant_id,
            decision,
            submitted_at,
            ip: self.ip,
            user_agent: self.user_agent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn response(id: &str, decision: ConsentDecision) -> ConsentResponse {
        ConsentResponse::new(
            ParticipantId::parse(id).unwrap(),
            decision,
            Some("203.0.113.7".into()),
            Some("test-agent/1.0".into()),
        )
    }

    #[test]
    fn second_submission_for_same_participant_conflicts() {
        let store = ConsentStore::open_in_memory().unwrap();
        store.record(&response("P-1", ConsentDecision::Accept)).unwrap();

        for decision in [
            ConsentDecision::Accept,
            ConsentDecision::MoreInfo,
            ConsentDecision::Decline,
        ] {
            let err = store.record(&response("P-1", decision)).unwrap_err();
            assert!(matches!(err, CoreError::DuplicateParticipant(ref id) if id == "P-1"));
        }
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(
            store
                .get(&ParticipantId::parse("P-1").unwrap())
                .unwrap()
                .unwrap()
                .decision,
            ConsentDecision::Accept
        );
    }

    #[test]
    fn get_and_list_round_trip_fields() {
        let store = ConsentStore::open_in_memory().unwrap();
        let original = response("P-2", ConsentDecision::MoreInfo);
        store.record(&original).unwrap();
        store.record(&response("P-3", ConsentDecision::Decline)).unwrap();

        let fetched = store.get(&original.participant_id).unwrap().unwrap();
        assert_eq!(fetched.decision, ConsentDecision::MoreInfo);
        assert_eq!(fetched.ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(fetched.timestamp(), original.timestamp());

        assert_eq!(store.list().unwrap().len(), 2);
        assert!(store
            .get(&ParticipantId::parse("P-404").unwrap())
            .unwrap()
            .is_none());
    }

    #[test]
    fn export_csv_writes_header_and_rows() {
        let store = ConsentStore::open_in_memory().unwrap();
        store.record(&response("P-4", ConsentDecision::Accept)).unwrap();

        let mut out = Vec::new();
        let rows = store.export_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(rows, 1);
        assert!(text.starts_with("participant_id,response,submitted_at,ip,user_agent\n"));
        assert!(text.contains("P-4,accept,"));
    }

    #[test]
    fn open_creates_parent_and_persists() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("consent.db");

        {
            let store = ConsentStore::open(&path).unwrap();
            store.record(&response("P-5", ConsentDecision::Accept)).unwrap();
        }

        let reopened = ConsentStore::open(&path).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
        assert_eq!(reopened.path(), Some(path.as_path()));
    }

    #[test]
    fn snapshot_is_a_readable_copy() {
        let temp = TempDir::new().unwrap();
        let store = ConsentStore::open(&temp.path().join("consent.db")).unwrap();
        store.record(&response("P-6", ConsentDecision::Decline)).unwrap();

        let copy = temp.path().join("copy.db");
        store.snapshot_to(&copy).unwrap();

        let restored = ConsentStore::open(&copy).unwrap();
        assert_eq!(restored.count().unwrap(), 1);
    }
}
