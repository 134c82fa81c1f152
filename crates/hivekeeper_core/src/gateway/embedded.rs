//! SQLite-backed stand-in for the hosted store.
//!
//! # Responsibility
//! - Serve local-only mode when no backend is configured.
//! - Give services and the offline queue a deterministic backend in tests.
//!
//! # Invariants
//! - Rows are stored as JSON bodies keyed by `(table_name, row_id)`; the row
//!   id is the `id` column, generated as a UUID when absent.
//! - Select results keep insertion order unless the query orders them.
//! - While offline, every call fails with `GatewayError::Network` and no
//!   state changes.

use super::query::{Filter, Query};
use super::realtime::{Broadcaster, ChangeEvent, ChangeKind, Subscription};
use super::row::Row;
use super::{folder_prefix, require_filters, GatewayError, GatewayResult, RemoteGateway, Session};
use log::debug;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use uuid::Uuid;

const PUBLIC_URL_SCHEME: &str = "embedded://";

pub struct EmbeddedGateway<'conn> {
    conn: &'conn Connection,
    session: RefCell<Option<Session>>,
    online: Cell<bool>,
    broadcaster: Broadcaster,
}

struct StoredRow {
    seq: i64,
    row: Row,
}

impl<'conn> EmbeddedGateway<'conn> {
    /// Creates an online gateway without a session.
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            session: RefCell::new(None),
            online: Cell::new(true),
            broadcaster: Broadcaster::default(),
        }
    }

    pub fn with_session(self, session: Session) -> Self {
        self.set_session(Some(session));
        self
    }

    pub fn set_session(&self, session: Option<Session>) {
        *self.session.borrow_mut() = session;
    }

    /// Simulates losing or regaining connectivity.
    pub fn set_online(&self, online: bool) {
        debug!("event=gateway_connectivity module=gateway status=ok online={online}");
        self.online.set(online);
    }

    fn ensure_online(&self) -> GatewayResult<()> {
        if self.online.get() {
            Ok(())
        } else {
            Err(GatewayError::Network(
                "embedded backend is offline".to_string(),
            ))
        }
    }

    fn load_rows(&self, table: &str) -> GatewayResult<Vec<StoredRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, body FROM embedded_rows WHERE table_name = ?1 ORDER BY seq ASC;",
        )?;
        let mut rows = stmt.query([table])?;
        let mut stored = Vec::new();
        while let Some(row) = rows.next()? {
            let seq: i64 = row.get(0)?;
            let body: String = row.get(1)?;
            let parsed = match serde_json::from_str::<Value>(&body) {
                Ok(Value::Object(parsed)) => parsed,
                _ => {
                    return Err(GatewayError::InvalidResponse(format!(
                        "embedded row {seq} in `{table}` is not a JSON object"
                    )))
                }
            };
            stored.push(StoredRow { seq, row: parsed });
        }
        Ok(stored)
    }

    fn matching_rows(&self, table: &str, filters: &[Filter]) -> GatewayResult<Vec<StoredRow>> {
        Ok(self
            .load_rows(table)?
            .into_iter()
            .filter(|stored| filters.iter().all(|filter| filter.matches(&stored.row)))
            .collect())
    }

    fn publish(&self, table: &str, kind: ChangeKind, row: Row) {
        self.broadcaster.publish(&ChangeEvent {
            table: table.to_string(),
            kind,
            row,
        });
    }
}

impl RemoteGateway for EmbeddedGateway<'_> {
    fn session(&self) -> Option<Session> {
        self.session.borrow().clone()
    }

    fn select(&self, query: &Query) -> GatewayResult<Vec<Row>> {
        self.ensure_online()?;
        let rows = self
            .load_rows(&query.table)?
            .into_iter()
            .map(|stored| stored.row)
            .collect();
        Ok(query.apply(rows))
    }

    fn insert(&self, table: &str, mut row: Row) -> GatewayResult<Row> {
        self.ensure_online()?;
        let row_id = match row.get("id") {
            Some(Value::String(id)) if !id.trim().is_empty() => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            None | Some(Value::Null) => {
                let id = Uuid::new_v4().to_string();
                row.insert("id".to_string(), Value::String(id.clone()));
                id
            }
            Some(other) => {
                return Err(GatewayError::InvalidRequest(format!(
                    "unsupported id value `{other}` for `{table}`"
                )))
            }
        };

        let body = Value::Object(row.clone()).to_string();
        let inserted = self.conn.execute(
            "INSERT INTO embedded_rows (table_name, row_id, body) VALUES (?1, ?2, ?3);",
            params![table, row_id, body],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                return Err(GatewayError::Conflict(format!(
                    "duplicate id `{row_id}` in `{table}`"
                )));
            }
            Err(err) => return Err(err.into()),
        }

        self.publish(table, ChangeKind::Insert, row.clone());
        Ok(row)
    }

    fn update(&self, table: &str, filters: &[Filter], mut patch: Row) -> GatewayResult<Vec<Row>> {
        self.ensure_online()?;
        require_filters("update", filters)?;
        patch.remove("id");

        let targets = self.matching_rows(table, filters)?;
        let tx = self.conn.unchecked_transaction()?;
        let mut updated = Vec::with_capacity(targets.len());
        for StoredRow { seq, mut row } in targets {
            for (column, value) in &patch {
                row.insert(column.clone(), value.clone());
            }
            tx.execute(
                "UPDATE embedded_rows SET body = ?1 WHERE seq = ?2;",
                params![Value::Object(row.clone()).to_string(), seq],
            )?;
            updated.push(row);
        }
        tx.commit()?;

        for row in &updated {
            self.publish(table, ChangeKind::Update, row.clone());
        }
        Ok(updated)
    }

    fn delete(&self, table: &str, filters: &[Filter]) -> GatewayResult<u64> {
        self.ensure_online()?;
        require_filters("delete", filters)?;

        let targets = self.matching_rows(table, filters)?;
        let tx = self.conn.unchecked_transaction()?;
        for stored in &targets {
            tx.execute("DELETE FROM embedded_rows WHERE seq = ?1;", [stored.seq])?;
        }
        tx.commit()?;

        let removed = targets.len() as u64;
        for stored in targets {
            self.publish(table, ChangeKind::Delete, stored.row);
        }
        Ok(removed)
    }

    fn upload(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> GatewayResult<String> {
        self.ensure_online()?;
        self.conn.execute(
            "INSERT OR REPLACE INTO embedded_objects (bucket, path, content_type, bytes)
             VALUES (?1, ?2, ?3, ?4);",
            params![bucket, path, content_type, bytes],
        )?;
        Ok(self.public_url(bucket, path))
    }

    fn remove_object(&self, bucket: &str, path: &str) -> GatewayResult<()> {
        self.ensure_online()?;
        let removed = self.conn.execute(
            "DELETE FROM embedded_objects WHERE bucket = ?1 AND path = ?2;",
            params![bucket, path],
        )?;
        if removed == 0 {
            return Err(GatewayError::NotFound(format!("object {bucket}/{path}")));
        }
        Ok(())
    }

    fn remove_folder(&self, bucket: &str, folder: &str) -> GatewayResult<u64> {
        self.ensure_online()?;
        let prefix = folder_prefix(folder)?;
        let removed = self.conn.execute(
            "DELETE FROM embedded_objects
             WHERE bucket = ?1 AND substr(path, 1, length(?2)) = ?2;",
            params![bucket, prefix],
        )?;
        Ok(removed as u64)
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{PUBLIC_URL_SCHEME}{bucket}/{path}")
    }

    fn subscribe(&self, table: &str) -> GatewayResult<Subscription> {
        self.ensure_online()?;
        Ok(self.broadcaster.subscribe(table))
    }
}

impl EmbeddedGateway<'_> {
    /// Reads back an uploaded object as `(content_type, bytes)`.
    pub fn object(&self, bucket: &str, path: &str) -> GatewayResult<Option<(String, Vec<u8>)>> {
        let object = self
            .conn
            .query_row(
                "SELECT content_type, bytes FROM embedded_objects WHERE bucket = ?1 AND path = ?2;",
                params![bucket, path],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(object)
    }
}

#[cfg(test)]
mod tests {
    use super::EmbeddedGateway;
    use crate::db::open_db_in_memory;
    use crate::gateway::{ChangeKind, Filter, GatewayError, Query, RemoteGateway, Row};
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn insert_generates_missing_id_and_rejects_duplicates() {
        let conn = open_db_in_memory().unwrap();
        let gateway = EmbeddedGateway::new(&conn);

        let stored = gateway
            .insert("species", row(json!({"common_name": "Jataí"})))
            .unwrap();
        assert!(stored["id"].as_str().is_some_and(|id| !id.is_empty()));

        gateway
            .insert("hives", row(json!({"id": "h1", "name": "one"})))
            .unwrap();
        let err = gateway
            .insert("hives", row(json!({"id": "h1", "name": "again"})))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Conflict(_)));
    }

    #[test]
    fn update_merges_patch_and_keeps_id() {
        let conn = open_db_in_memory().unwrap();
        let gateway = EmbeddedGateway::new(&conn);
        gateway
            .insert("hives", row(json!({"id": "h1", "status": "active", "name": "a"})))
            .unwrap();

        let updated = gateway
            .update(
                "hives",
                &[Filter::eq("id", "h1")],
                row(json!({"id": "other", "status": "sold"})),
            )
            .unwrap();
        assert_eq!(updated.len(), 1);

        let loaded = gateway.select(&Query::table("hives")).unwrap();
        assert_eq!(loaded[0]["id"], "h1");
        assert_eq!(loaded[0]["status"], "sold");
        assert_eq!(loaded[0]["name"], "a");
    }

    #[test]
    fn delete_requires_filters_and_reports_count() {
        let conn = open_db_in_memory().unwrap();
        let gateway = EmbeddedGateway::new(&conn);
        for id in ["a1", "a2", "a3"] {
            gateway
                .insert("actions", row(json!({"id": id, "hive_id": "h1"})))
                .unwrap();
        }

        assert!(matches!(
            gateway.delete("actions", &[]),
            Err(GatewayError::InvalidRequest(_))
        ));
        let removed = gateway
            .delete("actions", &[Filter::is_in("id", ["a1", "a3"])])
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(gateway.select(&Query::table("actions")).unwrap().len(), 1);
    }

    #[test]
    fn offline_gateway_fails_with_network_error_without_changes() {
        let conn = open_db_in_memory().unwrap();
        let gateway = EmbeddedGateway::new(&conn);
        gateway.set_online(false);

        let err = gateway
            .insert("hives", row(json!({"id": "h1"})))
            .unwrap_err();
        assert!(err.is_network());

        gateway.set_online(true);
        assert!(gateway.select(&Query::table("hives")).unwrap().is_empty());
    }

    #[test]
    fn subscribers_receive_changes_for_their_table() {
        let conn = open_db_in_memory().unwrap();
        let gateway = EmbeddedGateway::new(&conn);
        let subscription = gateway.subscribe("hives").unwrap();

        gateway.insert("hives", row(json!({"id": "h1"}))).unwrap();
        gateway.insert("actions", row(json!({"id": "a1"}))).unwrap();
        gateway
            .update("hives", &[Filter::eq("id", "h1")], row(json!({"name": "x"})))
            .unwrap();
        gateway.delete("hives", &[Filter::eq("id", "h1")]).unwrap();

        let kinds = subscription
            .drain()
            .into_iter()
            .map(|event| event.kind)
            .collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete]
        );
    }

    #[test]
    fn upload_replaces_objects_and_remove_reports_missing() {
        let conn = open_db_in_memory().unwrap();
        let gateway = EmbeddedGateway::new(&conn);

        let url = gateway
            .upload("hive-photos", "u/h/1.jpg", "image/jpeg", &[1, 2])
            .unwrap();
        assert_eq!(url, "embedded://hive-photos/u/h/1.jpg");
        gateway
            .upload("hive-photos", "u/h/1.jpg", "image/jpeg", &[3])
            .unwrap();
        assert_eq!(
            gateway.object("hive-photos", "u/h/1.jpg").unwrap(),
            Some(("image/jpeg".to_string(), vec![3]))
        );

        gateway.remove_object("hive-photos", "u/h/1.jpg").unwrap();
        assert!(matches!(
            gateway.remove_object("hive-photos", "u/h/1.jpg"),
            Err(GatewayError::NotFound(_))
        ));
    }
}
