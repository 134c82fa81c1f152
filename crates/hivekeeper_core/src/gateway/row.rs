use super::{GatewayError, GatewayResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// One record as exchanged with the store: column name to JSON value.
pub type Row = Map<String, Value>;

/// Serializes a record into a row; the value must serialize as an object.
pub fn to_row<T: Serialize>(value: &T) -> GatewayResult<Row> {
    match serde_json::to_value(value) {
        Ok(Value::Object(row)) => Ok(row),
        Ok(other) => Err(GatewayError::InvalidRequest(format!(
            "expected an object row, got `{other}`"
        ))),
        Err(err) => Err(GatewayError::InvalidRequest(err.to_string())),
    }
}

pub fn from_row<T: DeserializeOwned>(row: Row) -> GatewayResult<T> {
    serde_json::from_value(Value::Object(row))
        .map_err(|err| GatewayError::InvalidResponse(err.to_string()))
}

pub fn from_rows<T: DeserializeOwned>(rows: Vec<Row>) -> GatewayResult<Vec<T>> {
    rows.into_iter().map(from_row).collect()
}
