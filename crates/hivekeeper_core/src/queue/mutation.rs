use crate::gateway::{Filter, GatewayResult, RemoteGateway, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One write against the hosted store, replayable as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum PendingMutation {
    Insert {
        table: String,
        row: Row,
    },
    Update {
        table: String,
        filters: Vec<Filter>,
        patch: Row,
    },
    Delete {
        table: String,
        filters: Vec<Filter>,
    },
    /// Storage cleanup; `table_name` in the queue holds the bucket.
    RemoveFolder {
        bucket: String,
        folder: String,
    },
}

/// Result of applying a mutation remotely.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    Inserted(Row),
    Updated(Vec<Row>),
    Deleted(u64),
    Removed(u64),
}

impl PendingMutation {
    pub fn insert(table: &str, row: Row) -> Self {
        Self::Insert {
            table: table.to_string(),
            row,
        }
    }

    pub fn update(table: &str, filters: Vec<Filter>, patch: Row) -> Self {
        Self::Update {
            table: table.to_string(),
            filters,
            patch,
        }
    }

    pub fn delete(table: &str, filters: Vec<Filter>) -> Self {
        Self::Delete {
            table: table.to_string(),
            filters,
        }
    }

    pub fn remove_folder(bucket: &str, folder: &str) -> Self {
        Self::RemoveFolder {
            bucket: bucket.to_string(),
            folder: folder.to_string(),
        }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::RemoveFolder { .. } => "remove_folder",
        }
    }

    /// Target table, or the bucket for storage cleanups.
    pub fn table(&self) -> &str {
        match self {
            Self::Insert { table, .. } | Self::Update { table, .. } | Self::Delete { table, .. } => {
                table
            }
            Self::RemoveFolder { bucket, .. } => bucket,
        }
    }

    /// Value this mutation writes to `column` of row `id` in `table`, if any.
    ///
    /// Updates count only when they target the row by an `id` equality filter.
    pub fn written_value(&self, table: &str, id: &str, column: &str) -> Option<&Value> {
        match self {
            Self::Insert { table: target, row } if target == table => {
                let row_id = row.get("id").and_then(Value::as_str)?;
                (row_id == id).then(|| row.get(column)).flatten()
            }
            Self::Update {
                table: target,
                filters,
                patch,
            } if target == table => {
                let targets_row = filters.iter().any(|filter| {
                    matches!(
                        filter,
                        Filter::Eq { column: filter_column, value }
                            if filter_column == "id" && value.as_str() == Some(id)
                    )
                });
                targets_row.then(|| patch.get(column)).flatten()
            }
            _ => None,
        }
    }

    pub fn apply<G: RemoteGateway + ?Sized>(&self, gateway: &G) -> GatewayResult<MutationOutcome> {
        match self {
            Self::Insert { table, row } => gateway
                .insert(table, row.clone())
                .map(MutationOutcome::Inserted),
            Self::Update {
                table,
                filters,
                patch,
            } => gateway
                .update(table, filters, patch.clone())
                .map(MutationOutcome::Updated),
            Self::Delete { table, filters } => {
                gateway.delete(table, filters).map(MutationOutcome::Deleted)
            }
            Self::RemoveFolder { bucket, folder } => gateway
                .remove_folder(bucket, folder)
                .map(MutationOutcome::Removed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PendingMutation;
    use crate::gateway::{Filter, Row};
    use serde_json::{json, Value};

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn written_value_matches_inserted_row_and_id_targeted_update() {
        let insert = PendingMutation::insert("hives", row(json!({"id": "h1", "status": "active"})));
        let update = PendingMutation::update(
            "hives",
            vec![Filter::eq("id", "h1"), Filter::eq("user_id", "u1")],
            row(json!({"status": "sold"})),
        );
        let by_species = PendingMutation::update(
            "hives",
            vec![Filter::eq("species", "jatai")],
            row(json!({"status": "lost"})),
        );

        assert_eq!(insert.written_value("hives", "h1", "status"), Some(&json!("active")));
        assert_eq!(update.written_value("hives", "h1", "status"), Some(&json!("sold")));
        assert_eq!(update.written_value("hives", "h2", "status"), None);
        assert_eq!(update.written_value("actions", "h1", "status"), None);
        assert_eq!(update.written_value("hives", "h1", "name"), None);
        assert_eq!(by_species.written_value("hives", "h1", "status"), None);
    }

    #[test]
    fn remove_folder_serializes_with_its_own_operation_tag() {
        let mutation = PendingMutation::remove_folder("hive-photos", "u1/h1");
        assert_eq!(mutation.operation(), "remove_folder");
        assert_eq!(mutation.table(), "hive-photos");

        let payload = serde_json::to_value(&mutation).unwrap();
        assert_eq!(payload["operation"], "remove_folder");
        assert_eq!(
            serde_json::from_value::<PendingMutation>(payload).unwrap(),
            mutation
        );
    }
}
