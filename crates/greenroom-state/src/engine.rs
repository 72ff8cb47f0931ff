//! SQLite-backed implementation of the State Engine primitives.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use greenroom_core::{now_ms, RiskEvent, RiskLevel, ToolCallRecord};

use crate::objects::{ServiceSchema, StateObject};
use crate::summary::ImpactSummary;

/// State Engine errors. Domain-level conditions a backend may want to
/// surface to the agent (duplicate id, unknown object) are distinct
/// variants so callers can map them to tool error envelopes.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StateError {
    #[error("Service '{0}' is not registered")]
    ServiceNotRegistered(String),

    #[error("Object type '{object_type}' is not in service '{service}' schema")]
    UnknownObjectType {
        service: String,
        object_type: String,
    },

    #[error("Object id '{0}' already exists")]
    DuplicateId(String),

    #[error("Object '{0}' not found")]
    ObjectNotFound(String),

    #[error("Storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS services (
    name TEXT PRIMARY KEY,
    object_types TEXT NOT NULL,
    registered_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS objects (
    id TEXT PRIMARY KEY,
    service TEXT NOT NULL,
    object_type TEXT NOT NULL,
    data TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_objects_service_type
    ON objects(service, object_type);
CREATE TABLE IF NOT EXISTS risk_events (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp_ms INTEGER NOT NULL,
    service TEXT NOT NULL,
    action TEXT NOT NULL,
    object_type TEXT,
    object_id TEXT,
    level TEXT NOT NULL,
    reason TEXT NOT NULL,
    details TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS tool_calls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp_ms INTEGER NOT NULL,
    service TEXT NOT NULL,
    tool_name TEXT NOT NULL,
    arguments TEXT NOT NULL,
    response TEXT,
    duration_ms INTEGER
);
";

/// The single source of truth for a run. Mutated only through these
/// primitives; agent-driven mutation is serialized through one relay call
/// at a time, and observer-issued injections are each a single atomic
/// create-plus-append.
pub struct StateEngine {
    conn: Mutex<Connection>,
}

impl StateEngine {
    /// Open (or create) the shared state store at the given path.
    pub fn open(path: &Path) -> Result<Self, StateError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(StateEngine {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (single-process runs and tests).
    pub fn open_in_memory() -> Result<Self, StateError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(StateEngine {
            conn: Mutex::new(conn),
        })
    }

    // --- Service registration ---

    /// Create backing storage for one domain. Re-registering a service
    /// replaces its schema (backends re-register on restart).
    pub fn register_service(&self, schema: &ServiceSchema) -> Result<(), StateError> {
        let types = serde_json::to_string(&schema.object_types)?;
        self.conn.lock().execute(
            "INSERT INTO services (name, object_types, registered_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET object_types = ?2",
            params![schema.service, types, now_ms()],
        )?;
        debug!(service = %schema.service, "registered service schema");
        Ok(())
    }

    fn object_types_for(&self, conn: &Connection, service: &str) -> Result<Vec<String>, StateError> {
        let types: Option<String> = conn
            .query_row(
                "SELECT object_types FROM services WHERE name = ?1",
                params![service],
                |row| row.get(0),
            )
            .optional()?;
        match types {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Err(StateError::ServiceNotRegistered(service.to_string())),
        }
    }

    // --- Objects ---

    /// Create a generic object. When `id` is `None` a fresh UUID is
    /// assigned. Ids are unique store-wide.
    pub fn create_object(
        &self,
        service: &str,
        object_type: &str,
        id: Option<&str>,
        data: serde_json::Value,
    ) -> Result<StateObject, StateError> {
        let conn = self.conn.lock();
        let types = self.object_types_for(&conn, service)?;
        if !types.iter().any(|t| t == object_type) {
            return Err(StateError::UnknownObjectType {
                service: service.to_string(),
                object_type: object_type.to_string(),
            });
        }

        let id = id
            .map(|s| s.to_string())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let now = now_ms();
        let result = conn.execute(
            "INSERT INTO objects (id, service, object_type, data, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![id, service, object_type, data.to_string(), now],
        );
        match result {
            Ok(_) => Ok(StateObject {
                id,
                service: service.to_string(),
                object_type: object_type.to_string(),
                data,
                created_at: now,
                updated_at: now,
            }),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StateError::DuplicateId(id))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_object(&self, id: &str) -> Result<Option<StateObject>, StateError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, service, object_type, data, created_at, updated_at
                 FROM objects WHERE id = ?1",
                params![id],
                row_to_object,
            )
            .optional()?;
        Ok(row)
    }

    /// Shallow-merge `patch` into the object's data. The object's type is
    /// immutable; only `data` and `updated_at` change.
    pub fn update_object(
        &self,
        id: &str,
        patch: serde_json::Value,
    ) -> Result<StateObject, StateError> {
        let conn = self.conn.lock();
        let mut object = conn
            .query_row(
                "SELECT id, service, object_type, data, created_at, updated_at
                 FROM objects WHERE id = ?1",
                params![id],
                row_to_object,
            )
            .optional()?
            .ok_or_else(|| StateError::ObjectNotFound(id.to_string()))?;

        if let (Some(target), Some(source)) = (object.data.as_object_mut(), patch.as_object()) {
            for (key, value) in source {
                target.insert(key.clone(), value.clone());
            }
        } else {
            object.data = patch;
        }
        object.updated_at = now_ms();

        conn.execute(
            "UPDATE objects SET data = ?1, updated_at = ?2 WHERE id = ?3",
            params![object.data.to_string(), object.updated_at, id],
        )?;
        Ok(object)
    }

    /// Returns true if an object was deleted.
    pub fn delete_object(&self, id: &str) -> Result<bool, StateError> {
        let deleted = self
            .conn
            .lock()
            .execute("DELETE FROM objects WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Query objects of one type under one service with simple equality
    /// filtering on top-level data fields.
    pub fn query_objects(
        &self,
        service: &str,
        object_type: &str,
        filter: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Vec<StateObject>, StateError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, service, object_type, data, created_at, updated_at
             FROM objects WHERE service = ?1 AND object_type = ?2
             ORDER BY created_at ASC",
        )?;
        let objects = stmt
            .query_map(params![service, object_type], row_to_object)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(objects
            .into_iter()
            .filter(|obj| {
                filter
                    .iter()
                    .all(|(key, expected)| obj.data.get(key) == Some(expected))
            })
            .collect())
    }

    // --- Audit log ---

    /// Append a risk event. The log is append-only; nothing updates or
    /// deletes rows.
    pub fn log_event(&self, event: &RiskEvent) -> Result<(), StateError> {
        self.conn.lock().execute(
            "INSERT INTO risk_events
             (timestamp_ms, service, action, object_type, object_id, level, reason, details)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.timestamp_ms,
                event.service,
                event.action,
                event.object_type,
                event.object_id,
                event.level.to_string(),
                event.reason,
                event.details.to_string(),
            ],
        )?;
        Ok(())
    }

    /// All risk events in append order.
    pub fn risk_events(&self) -> Result<Vec<RiskEvent>, StateError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT timestamp_ms, service, action, object_type, object_id, level, reason, details
             FROM risk_events ORDER BY seq ASC",
        )?;
        let events = stmt
            .query_map([], |row| {
                Ok(RiskEvent {
                    timestamp_ms: row.get(0)?,
                    service: row.get(1)?,
                    action: row.get(2)?,
                    object_type: row.get(3)?,
                    object_id: row.get(4)?,
                    level: parse_level(&row.get::<_, String>(5)?),
                    reason: row.get(6)?,
                    details: serde_json::from_str(&row.get::<_, String>(7)?)
                        .unwrap_or(serde_json::Value::Null),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// Record an outgoing tool call; returns the record id used to
    /// complete it later.
    pub fn record_tool_call(
        &self,
        service: &str,
        tool_name: &str,
        arguments: &serde_json::Value,
    ) -> Result<i64, StateError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO tool_calls (timestamp_ms, service, tool_name, arguments)
             VALUES (?1, ?2, ?3, ?4)",
            params![now_ms(), service, tool_name, arguments.to_string()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Complete a previously recorded call. A record completes exactly
    /// once; later attempts are ignored.
    pub fn complete_tool_call(
        &self,
        id: i64,
        response: &serde_json::Value,
        duration_ms: i64,
    ) -> Result<(), StateError> {
        self.conn.lock().execute(
            "UPDATE tool_calls SET response = ?1, duration_ms = ?2
             WHERE id = ?3 AND response IS NULL",
            params![response.to_string(), duration_ms, id],
        )?;
        Ok(())
    }

    /// All tool call records in append order.
    pub fn tool_calls(&self) -> Result<Vec<ToolCallRecord>, StateError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp_ms, service, tool_name, arguments, response, duration_ms
             FROM tool_calls ORDER BY id ASC",
        )?;
        let calls = stmt
            .query_map([], |row| {
                Ok(ToolCallRecord {
                    id: row.get(0)?,
                    timestamp_ms: row.get(1)?,
                    service: row.get(2)?,
                    tool_name: row.get(3)?,
                    arguments: serde_json::from_str(&row.get::<_, String>(4)?)
                        .unwrap_or(serde_json::Value::Null),
                    response: row
                        .get::<_, Option<String>>(5)?
                        .and_then(|s| serde_json::from_str(&s).ok()),
                    duration_ms: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(calls)
    }

    /// Derive the impact summary from the logs alone.
    pub fn impact_summary(&self) -> Result<ImpactSummary, StateError> {
        let calls = self.tool_calls()?;
        let events = self.risk_events()?;
        Ok(ImpactSummary::derive(&calls, &events))
    }
}

fn row_to_object(row: &rusqlite::Row<'_>) -> rusqlite::Result<StateObject> {
    Ok(StateObject {
        id: row.get(0)?,
        service: row.get(1)?,
        object_type: row.get(2)?,
        data: serde_json::from_str(&row.get::<_, String>(3)?)
            .unwrap_or(serde_json::Value::Null),
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn parse_level(s: &str) -> RiskLevel {
    match s {
        "CRITICAL" => RiskLevel::Critical,
        "HIGH" => RiskLevel::High,
        "MEDIUM" => RiskLevel::Medium,
        "LOW" => RiskLevel::Low,
        _ => RiskLevel::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine_with_payments() -> StateEngine {
        let engine = StateEngine::open_in_memory().unwrap();
        engine
            .register_service(&ServiceSchema::new("payments", &["customer", "transaction"]))
            .unwrap();
        engine
    }

    #[test]
    fn test_create_and_get_object() {
        let engine = engine_with_payments();
        let obj = engine
            .create_object("payments", "customer", Some("cus_1"), json!({"name": "Ada"}))
            .unwrap();
        assert_eq!(obj.id, "cus_1");
        assert_eq!(obj.created_at, obj.updated_at);

        let fetched = engine.get_object("cus_1").unwrap().unwrap();
        assert_eq!(fetched.data["name"], "Ada");
        assert_eq!(fetched.object_type, "customer");
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let engine = engine_with_payments();
        let a = engine
            .create_object("payments", "customer", None, json!({}))
            .unwrap();
        let b = engine
            .create_object("payments", "customer", None, json!({}))
            .unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_duplicate_id_rejected_across_types() {
        let engine = engine_with_payments();
        engine
            .create_object("payments", "customer", Some("x"), json!({}))
            .unwrap();
        // Same id under a different type still collides: ids are unique
        // store-wide.
        let err = engine
            .create_object("payments", "transaction", Some("x"), json!({}))
            .unwrap_err();
        assert!(matches!(err, StateError::DuplicateId(id) if id == "x"));
    }

    #[test]
    fn test_unregistered_service_rejected() {
        let engine = StateEngine::open_in_memory().unwrap();
        let err = engine
            .create_object("email", "message", None, json!({}))
            .unwrap_err();
        assert!(matches!(err, StateError::ServiceNotRegistered(_)));
    }

    #[test]
    fn test_unknown_object_type_rejected() {
        let engine = engine_with_payments();
        let err = engine
            .create_object("payments", "invoice", None, json!({}))
            .unwrap_err();
        assert!(matches!(err, StateError::UnknownObjectType { .. }));
    }

    #[test]
    fn test_update_merges_and_keeps_type() {
        let engine = engine_with_payments();
        engine
            .create_object(
                "payments",
                "customer",
                Some("cus_1"),
                json!({"name": "Ada", "tier": "basic"}),
            )
            .unwrap();
        let updated = engine
            .update_object("cus_1", json!({"tier": "premium"}))
            .unwrap();
        assert_eq!(updated.data["name"], "Ada");
        assert_eq!(updated.data["tier"], "premium");
        assert_eq!(updated.object_type, "customer");
        assert!(updated.updated_at >= updated.created_at);
    }

    #[test]
    fn test_update_missing_object() {
        let engine = engine_with_payments();
        let err = engine.update_object("nope", json!({})).unwrap_err();
        assert!(matches!(err, StateError::ObjectNotFound(_)));
    }

    #[test]
    fn test_delete_object() {
        let engine = engine_with_payments();
        engine
            .create_object("payments", "customer", Some("cus_1"), json!({}))
            .unwrap();
        assert!(engine.delete_object("cus_1").unwrap());
        assert!(!engine.delete_object("cus_1").unwrap());
        assert!(engine.get_object("cus_1").unwrap().is_none());
    }

    #[test]
    fn test_query_equality_filter() {
        let engine = engine_with_payments();
        for (id, status) in [("t1", "settled"), ("t2", "pending"), ("t3", "settled")] {
            engine
                .create_object(
                    "payments",
                    "transaction",
                    Some(id),
                    json!({"status": status, "amount": 50.0}),
                )
                .unwrap();
        }
        let mut filter = serde_json::Map::new();
        filter.insert("status".to_string(), json!("settled"));
        let results = engine.query_objects("payments", "transaction", &filter).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "t1");
        assert_eq!(results[1].id, "t3");

        let all = engine
            .query_objects("payments", "transaction", &serde_json::Map::new())
            .unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_risk_event_log_append_order() {
        let engine = engine_with_payments();
        engine
            .log_event(&greenroom_core::RiskEvent::new(
                "payments",
                "refund",
                RiskLevel::High,
                "large refund",
            ))
            .unwrap();
        engine
            .log_event(&greenroom_core::RiskEvent::new(
                "chat",
                "send_message",
                RiskLevel::Info,
                "message sent",
            ))
            .unwrap();
        let events = engine.risk_events().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, "refund");
        assert_eq!(events[0].level, RiskLevel::High);
        assert_eq!(events[1].service, "chat");
    }

    #[test]
    fn test_tool_call_lifecycle() {
        let engine = engine_with_payments();
        let id = engine
            .record_tool_call("payments", "charge", &json!({"amount": 50.0}))
            .unwrap();
        let pending = engine.tool_calls().unwrap();
        assert!(pending[0].response.is_none());

        engine
            .complete_tool_call(id, &json!({"ok": true}), 120)
            .unwrap();
        let calls = engine.tool_calls().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].response.as_ref().unwrap()["ok"], true);
        assert_eq!(calls[0].duration_ms, Some(120));

        // Completion is immutable thereafter.
        engine
            .complete_tool_call(id, &json!({"ok": false}), 999)
            .unwrap();
        let calls = engine.tool_calls().unwrap();
        assert_eq!(calls[0].response.as_ref().unwrap()["ok"], true);
    }

    #[test]
    fn test_shared_file_store_visible_across_handles() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("run.db");

        let writer = StateEngine::open(&path).unwrap();
        writer
            .register_service(&ServiceSchema::new("payments", &["customer"]))
            .unwrap();
        writer
            .create_object("payments", "customer", Some("cus_1"), json!({}))
            .unwrap();

        // A second handle (as another process would hold) sees the object.
        let reader = StateEngine::open(&path).unwrap();
        assert!(reader.get_object("cus_1").unwrap().is_some());
    }

    #[test]
    fn test_timestamps_monotonic() {
        let engine = engine_with_payments();
        let mut last = 0;
        for i in 0..10 {
            let obj = engine
                .create_object("payments", "customer", Some(&format!("c{}", i)), json!({}))
                .unwrap();
            assert!(obj.created_at >= last);
            last = obj.created_at;
        }
    }
}
