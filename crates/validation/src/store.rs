//! SQLite storage for validation requests
//!
//! Two tables: one row per request, one row per approver code slot.
//! The single-live-request-per-target invariant is a partial UNIQUE
//! index, so two concurrent creates race inside SQLite and exactly one
//! wins - there is no check-then-insert window. Every status and slot
//! write is a guarded UPDATE whose row count the workflow inspects.
//!
//! Transition methods are `pub(crate)`: only the workflow controller
//! mutates a request's status or code slots.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, TransactionBehavior};
use thiserror::Error;

use tontine_core::{ActionKind, Principal, Reason, ResourceKind, ResourceRef};
use tontine_otp::CodeSlot;

use crate::request::{ApproverSlot, RequestStatus, ValidationRequest};
use crate::resolver::ResourceSnapshot;

/// Errors from the request store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Request not found: {0}")]
    NotFound(String),

    /// The live-uniqueness index refused an insert
    #[error("A live request already exists for {action} on {resource_id}")]
    DuplicateLive {
        action: ActionKind,
        resource_id: String,
    },

    /// A stored row no longer parses; the invariant is broken
    #[error("Corrupt record for {id}: {detail}")]
    Corrupt { id: String, detail: String },
}

/// SQLite storage for validation requests and their code slots
pub struct ValidationStore {
    conn: Mutex<Connection>,
}

impl ValidationStore {
    /// Open (or create) a store at the given database path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS validation_requests (
                id TEXT PRIMARY KEY,
                action TEXT NOT NULL,
                resource_kind TEXT NOT NULL,
                resource_id TEXT NOT NULL,
                initiator_id TEXT NOT NULL,
                initiator_role TEXT NOT NULL,
                status TEXT NOT NULL,
                reason TEXT NOT NULL,
                snapshot_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                completed_at TEXT,
                rejected_at TEXT,
                rejection_reason TEXT,
                rejected_by TEXT,
                consumed_at TEXT
            )",
            [],
        )?;

        // The uniqueness invariant lives here, not in application code:
        // at most one non-terminal request per (action, resource).
        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_live_request_per_target
             ON validation_requests(action, resource_id)
             WHERE status IN ('pending', 'stage1_verified')",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_validation_requests_status
             ON validation_requests(status)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS code_slots (
                request_id TEXT NOT NULL,
                stage INTEGER NOT NULL,
                approver_id TEXT NOT NULL,
                approver_role TEXT NOT NULL,
                code_hash TEXT,
                salt TEXT,
                issued_at TEXT,
                expires_at TEXT,
                attempts INTEGER NOT NULL DEFAULT 0,
                verified INTEGER NOT NULL DEFAULT 0,
                verified_at TEXT,
                PRIMARY KEY (request_id, stage)
            )",
            [],
        )?;

        Ok(())
    }

    /// Insert a freshly created request and its slots in one transaction.
    ///
    /// Fails with [`StoreError::DuplicateLive`] when the partial unique
    /// index refuses the row.
    pub(crate) fn insert(&self, request: &ValidationRequest) -> Result<(), StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT INTO validation_requests
             (id, action, resource_kind, resource_id, initiator_id, initiator_role,
              status, reason, snapshot_json, created_at, expires_at,
              completed_at, rejected_at, rejection_reason, rejected_by, consumed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                request.id,
                request.action.to_string(),
                request.resource.kind.to_string(),
                request.resource.id,
                request.initiator.id,
                request.initiator.role.to_string(),
                request.status.as_str(),
                request.reason.as_str(),
                serde_json::to_string(&request.snapshot)?,
                request.created_at.to_rfc3339(),
                request.expires_at.to_rfc3339(),
                request.completed_at.map(|t| t.to_rfc3339()),
                request.rejected_at.map(|t| t.to_rfc3339()),
                request.rejection_reason.as_ref().map(|r| r.as_str()),
                request.rejected_by,
                request.consumed_at.map(|t| t.to_rfc3339()),
            ],
        )
        .map_err(|e| match e {
            // Only the partial unique index reports SQLITE_CONSTRAINT_UNIQUE;
            // an id collision trips the primary key (a different extended
            // code) and stays a database error.
            rusqlite::Error::SqliteFailure(f, _)
                if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                StoreError::DuplicateLive {
                    action: request.action,
                    resource_id: request.resource.id.clone(),
                }
            }
            other => StoreError::Database(other),
        })?;

        for (stage, slot) in request.approvers.iter().enumerate() {
            tx.execute(
                "INSERT INTO code_slots
                 (request_id, stage, approver_id, approver_role,
                  code_hash, salt, issued_at, expires_at, attempts, verified, verified_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    request.id,
                    stage as i64,
                    slot.approver.id,
                    slot.approver.role.to_string(),
                    slot.code.code_hash,
                    slot.code.salt,
                    slot.code.issued_at.map(|t| t.to_rfc3339()),
                    slot.code.expires_at.map(|t| t.to_rfc3339()),
                    slot.code.attempts,
                    slot.code.verified,
                    slot.code.verified_at.map(|t| t.to_rfc3339()),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Load one request with its full approval chain
    pub(crate) fn fetch(&self, id: &str) -> Result<ValidationRequest, StoreError> {
        let conn = self.lock();

        let mut stmt = conn.prepare(
            "SELECT action, resource_kind, resource_id, initiator_id, initiator_role,
                    status, reason, snapshot_json, created_at, expires_at,
                    completed_at, rejected_at, rejection_reason, rejected_by, consumed_at
             FROM validation_requests WHERE id = ?1",
        )?;

        let row = stmt
            .query_row(params![id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, String>(9)?,
                    row.get::<_, Option<String>>(10)?,
                    row.get::<_, Option<String>>(11)?,
                    row.get::<_, Option<String>>(12)?,
                    row.get::<_, Option<String>>(13)?,
                    row.get::<_, Option<String>>(14)?,
                ))
            })
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(id.to_string()),
                other => StoreError::Database(other),
            })?;

        let action: ActionKind = row.0.parse().map_err(|_| corrupt(id, "action"))?;
        let resource_kind: ResourceKind = row.1.parse().map_err(|_| corrupt(id, "resource_kind"))?;
        let initiator_role = row.4.parse().map_err(|_| corrupt(id, "initiator_role"))?;
        let status = RequestStatus::parse(&row.5).ok_or_else(|| corrupt(id, "status"))?;
        let reason = Reason::new(&row.6).map_err(|_| corrupt(id, "reason"))?;
        let snapshot: ResourceSnapshot = serde_json::from_str(&row.7)?;
        let rejection_reason = match row.12 {
            Some(text) => Some(Reason::new(text).map_err(|_| corrupt(id, "rejection_reason"))?),
            None => None,
        };

        let approvers = self.fetch_slots(&conn, id)?;
        if approvers.is_empty() {
            return Err(corrupt(id, "no code slots"));
        }

        Ok(ValidationRequest {
            id: id.to_string(),
            action,
            resource: ResourceRef {
                kind: resource_kind,
                id: row.2,
            },
            initiator: Principal {
                id: row.3,
                role: initiator_role,
            },
            approvers,
            status,
            reason,
            snapshot,
            created_at: parse_ts(id, &row.8)?,
            expires_at: parse_ts(id, &row.9)?,
            completed_at: parse_opt_ts(id, row.10)?,
            rejected_at: parse_opt_ts(id, row.11)?,
            rejection_reason,
            rejected_by: row.13,
            consumed_at: parse_opt_ts(id, row.14)?,
        })
    }

    fn fetch_slots(
        &self,
        conn: &Connection,
        request_id: &str,
    ) -> Result<Vec<ApproverSlot>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT approver_id, approver_role, code_hash, salt, issued_at, expires_at,
                    attempts, verified, verified_at
             FROM code_slots WHERE request_id = ?1 ORDER BY stage ASC",
        )?;

        let rows = stmt
            .query_map(params![request_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, u32>(6)?,
                    row.get::<_, bool>(7)?,
                    row.get::<_, Option<String>>(8)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut slots = Vec::with_capacity(rows.len());
        for row in rows {
            let role = row
                .1
                .parse()
                .map_err(|_| corrupt(request_id, "approver_role"))?;
            slots.push(ApproverSlot {
                approver: Principal { id: row.0, role },
                code: CodeSlot {
                    code_hash: row.2,
                    salt: row.3,
                    issued_at: parse_opt_ts(request_id, row.4)?,
                    expires_at: parse_opt_ts(request_id, row.5)?,
                    attempts: row.6,
                    verified: row.7,
                    verified_at: parse_opt_ts(request_id, row.8)?,
                },
            });
        }
        Ok(slots)
    }

    /// Persist one slot's state, guarded on the attempt counter.
    ///
    /// The guard (`attempts = expected AND verified = 0`) makes two
    /// concurrent verifications of the same slot mutually exclusive:
    /// the loser's UPDATE matches zero rows. Returns whether the guard
    /// matched.
    pub(crate) fn persist_slot(
        &self,
        request_id: &str,
        stage: usize,
        slot: &CodeSlot,
        expected_attempts: u32,
    ) -> Result<bool, StoreError> {
        let conn = self.lock();
        let rows = conn.execute(
            "UPDATE code_slots
             SET code_hash = ?1, salt = ?2, issued_at = ?3, expires_at = ?4,
                 attempts = ?5, verified = ?6, verified_at = ?7
             WHERE request_id = ?8 AND stage = ?9 AND attempts = ?10 AND verified = 0",
            params![
                slot.code_hash,
                slot.salt,
                slot.issued_at.map(|t| t.to_rfc3339()),
                slot.expires_at.map(|t| t.to_rfc3339()),
                slot.attempts,
                slot.verified,
                slot.verified_at.map(|t| t.to_rfc3339()),
                request_id,
                stage as i64,
                expected_attempts,
            ],
        )?;
        Ok(rows > 0)
    }

    /// pending -> stage1_verified. Returns whether the guard matched.
    pub(crate) fn mark_stage1(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.lock();
        let rows = conn.execute(
            "UPDATE validation_requests SET status = 'stage1_verified'
             WHERE id = ?1 AND status = 'pending'",
            params![id],
        )?;
        Ok(rows > 0)
    }

    /// non-terminal -> completed. Returns whether the guard matched.
    pub(crate) fn mark_completed(&self, id: &str, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let conn = self.lock();
        let rows = conn.execute(
            "UPDATE validation_requests SET status = 'completed', completed_at = ?1
             WHERE id = ?2 AND status IN ('pending', 'stage1_verified')",
            params![at.to_rfc3339(), id],
        )?;
        Ok(rows > 0)
    }

    /// non-terminal -> rejected. Returns whether the guard matched.
    pub(crate) fn mark_rejected(
        &self,
        id: &str,
        at: DateTime<Utc>,
        reason: &Reason,
        rejected_by: &str,
    ) -> Result<bool, StoreError> {
        let conn = self.lock();
        let rows = conn.execute(
            "UPDATE validation_requests
             SET status = 'rejected', rejected_at = ?1, rejection_reason = ?2, rejected_by = ?3
             WHERE id = ?4 AND status IN ('pending', 'stage1_verified')",
            params![at.to_rfc3339(), reason.as_str(), rejected_by, id],
        )?;
        Ok(rows > 0)
    }

    /// non-terminal -> expired. Returns whether the guard matched, so a
    /// repeated sweep never transitions the same request twice.
    pub(crate) fn mark_expired(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.lock();
        let rows = conn.execute(
            "UPDATE validation_requests SET status = 'expired'
             WHERE id = ?1 AND status IN ('pending', 'stage1_verified')",
            params![id],
        )?;
        Ok(rows > 0)
    }

    /// Atomically claim the single authorization of a completed request.
    ///
    /// The status check and the consumed mark are one UPDATE, so two
    /// concurrent executors cannot both succeed. Returns whether this
    /// caller won.
    pub(crate) fn mark_consumed(&self, id: &str, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let conn = self.lock();
        let rows = conn.execute(
            "UPDATE validation_requests SET consumed_at = ?1
             WHERE id = ?2 AND status = 'completed' AND consumed_at IS NULL",
            params![at.to_rfc3339(), id],
        )?;
        Ok(rows > 0)
    }

    /// All requests still awaiting verification, oldest first
    pub(crate) fn list_non_terminal(&self) -> Result<Vec<ValidationRequest>, StoreError> {
        let ids: Vec<String> = {
            let conn = self.lock();
            let mut stmt = conn.prepare(
                "SELECT id FROM validation_requests
                 WHERE status IN ('pending', 'stage1_verified')
                 ORDER BY created_at ASC",
            )?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };

        let mut requests = Vec::with_capacity(ids.len());
        for id in ids {
            requests.push(self.fetch(&id)?);
        }
        Ok(requests)
    }

    /// Count requests with the given status
    pub(crate) fn count_by_status(&self, status: RequestStatus) -> Result<usize, StoreError> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM validation_requests WHERE status = ?1",
            params![status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Delete terminal requests and their slots; returns how many
    /// requests were removed.
    ///
    /// The engine itself never calls this: garbage collection belongs
    /// to an external housekeeping driver (the CLI `purge` command).
    pub fn purge_terminal(&self) -> Result<usize, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "DELETE FROM code_slots WHERE request_id IN
             (SELECT id FROM validation_requests
              WHERE status IN ('completed', 'rejected', 'expired'))",
            [],
        )?;
        let rows = tx.execute(
            "DELETE FROM validation_requests
             WHERE status IN ('completed', 'rejected', 'expired')",
            [],
        )?;
        tx.commit()?;
        Ok(rows)
    }
}

fn corrupt(id: &str, detail: &str) -> StoreError {
    StoreError::Corrupt {
        id: id.to_string(),
        detail: detail.to_string(),
    }
}

fn parse_ts(id: &str, s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| corrupt(id, "timestamp"))
}

fn parse_opt_ts(id: &str, s: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    s.map(|s| parse_ts(id, &s)).transpose()
}
