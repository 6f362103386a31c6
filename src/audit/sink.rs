//! `AuditSink`: persistence backend for append-only `AuditRecord`s.
//! `SqliteSink` is the production backend (teacher already depends on
//! `rusqlite` for its own `betterbot.db`); `MemorySink` backs tests.

use crate::error::AuditError;
use crate::types::AuditRecord;
use rusqlite::{params, Connection};
use std::sync::Mutex;

pub trait AuditSink: Send + Sync {
    fn append(&self, record: &AuditRecord) -> Result<(), AuditError>;
    fn range(&self, from_unix: i64, to_unix: i64) -> Result<Vec<AuditRecord>, AuditError>;
    fn latest_hash(&self) -> Result<[u8; 32], AuditError>;
}

pub struct SqliteSink {
    conn: Mutex<Connection>,
}

impl SqliteSink {
    pub fn open(path: &std::path::Path) -> Result<Self, AuditError> {
        let conn = Connection::open(path).map_err(|e| AuditError::SinkFailure(e.to_string()))?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self, AuditError> {
        let conn = Connection::open_in_memory().map_err(|e| AuditError::SinkFailure(e.to_string()))?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn init_schema(conn: &Connection) -> Result<(), AuditError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS audit_log (
                record_id TEXT PRIMARY KEY,
                wall_time_unix INTEGER NOT NULL,
                decision_fingerprint BLOB NOT NULL,
                prev_hash BLOB NOT NULL,
                outcome_tag TEXT NOT NULL,
                payload BLOB NOT NULL
            )",
            [],
        )
        .map_err(|e| AuditError::SinkFailure(e.to_string()))?;
        Ok(())
    }
}

impl AuditSink for SqliteSink {
    fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let payload = serde_json::to_vec(record).map_err(|e| AuditError::SinkFailure(e.to_string()))?;
        let conn = self.conn.lock().expect("audit sqlite connection poisoned");
        conn.execute(
            "INSERT INTO audit_log (record_id, wall_time_unix, decision_fingerprint, prev_hash, outcome_tag, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.record_id.to_string(),
                record.wall_time.timestamp(),
                record.decision_fingerprint.to_vec(),
                record.prev_hash.to_vec(),
                record.outcome_tag,
                payload,
            ],
        )
        .map_err(|e| AuditError::SinkFailure(e.to_string()))?;
        Ok(())
    }

    fn range(&self, from_unix: i64, to_unix: i64) -> Result<Vec<AuditRecord>, AuditError> {
        let conn = self.conn.lock().expect("audit sqlite connection poisoned");
        let mut stmt = conn
            .prepare("SELECT payload FROM audit_log WHERE wall_time_unix BETWEEN ?1 AND ?2 ORDER BY wall_time_unix ASC")
            .map_err(|e| AuditError::SinkFailure(e.to_string()))?;
        let rows = stmt
            .query_map(params![from_unix, to_unix], |row| {
                let payload: Vec<u8> = row.get(0)?;
                Ok(payload)
            })
            .map_err(|e| AuditError::SinkFailure(e.to_string()))?;
        let mut records = Vec::new();
        for row in rows {
            let payload = row.map_err(|e| AuditError::SinkFailure(e.to_string()))?;
            let record: AuditRecord =
                serde_json::from_slice(&payload).map_err(|e| AuditError::SinkFailure(e.to_string()))?;
            records.push(record);
        }
        Ok(records)
    }

    fn latest_hash(&self) -> Result<[u8; 32], AuditError> {
        let conn = self.conn.lock().expect("audit sqlite connection poisoned");
        let result: rusqlite::Result<Vec<u8>> = conn.query_row(
            "SELECT prev_hash FROM audit_log ORDER BY wall_time_unix DESC LIMIT 1",
            [],
            |row| row.get(0),
        );
        match result {
            Ok(bytes) => {
                let mut hash = [0u8; 32];
                hash.copy_from_slice(&bytes);
                Ok(hash)
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok([0u8; 32]),
            Err(e) => Err(AuditError::SinkFailure(e.to_string())),
        }
    }
}

/// In-memory sink for tests; never touches the filesystem.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditSink for MemorySink {
    fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.records.lock().expect("memory sink poisoned").push(record.clone());
        Ok(())
    }

    fn range(&self, from_unix: i64, to_unix: i64) -> Result<Vec<AuditRecord>, AuditError> {
        let records = self.records.lock().expect("memory sink poisoned");
        Ok(records
            .iter()
            .filter(|r| {
                let t = r.wall_time.timestamp();
                t >= from_unix && t <= to_unix
            })
            .cloned()
            .collect())
    }

    fn latest_hash(&self) -> Result<[u8; 32], AuditError> {
        let records = self.records.lock().expect("memory sink poisoned");
        Ok(records.last().map(|r| r.prev_hash).unwrap_or([0u8; 32]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Explanation, Recommendation, RiskFactors, RiskLevel, Verdict};
    use chrono::Utc;

    fn sample_record() -> AuditRecord {
        AuditRecord {
            record_id: uuid::Uuid::new_v4(),
            decision_fingerprint: [1u8; 32],
            verdict: Verdict {
                trust_score: 91.5,
                risk_level: RiskLevel::Low,
                recommendation: Recommendation::Approve,
                factors: RiskFactors::empty(),
                explanations: vec![Explanation {
                    factor: "volatility".into(),
                    weight: 0.3,
                    message: "within bounds".into(),
                }],
                evaluated_at: Utc::now(),
                deadline_hit: false,
                policy_version: 1,
                code_version: 7,
            },
            attestation_id: None,
            latency_ns: 1_200_000,
            outcome_tag: "approved".into(),
            wall_time: Utc::now(),
            prev_hash: [0u8; 32],
        }
    }

    #[test]
    fn sqlite_sink_round_trips_a_record() {
        let sink = SqliteSink::open_in_memory().unwrap();
        let record = sample_record();
        sink.append(&record).unwrap();
        let now = record.wall_time.timestamp();
        let found = sink.range(now - 10, now + 10).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].outcome_tag, "approved");
    }

    #[test]
    fn memory_sink_round_trips_a_record() {
        let sink = MemorySink::new();
        let record = sample_record();
        sink.append(&record).unwrap();
        let now = record.wall_time.timestamp();
        assert_eq!(sink.range(now - 10, now + 10).unwrap().len(), 1);
    }
}
