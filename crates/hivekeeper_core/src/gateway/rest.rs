//! Blocking HTTP client for the hosted backend's REST, storage and auth
//! endpoints.
//!
//! # Invariants
//! - Every request carries the project `apikey`; the bearer token is the
//!   session access token when signed in, otherwise the anon key.
//! - Transport failures (connect, timeout) map to `GatewayError::Network`.
//! - Realtime needs a websocket channel and is reported as unsupported.

use super::query::{Direction, Filter, Query};
use super::row::Row;
use super::{
    folder_prefix, require_filters, GatewayError, GatewayResult, RemoteGateway, Session,
    Subscription,
};
use crate::config::BackendConfig;
use crate::model::now_epoch_ms;
use log::{debug, warn};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::cell::RefCell;
use std::time::Duration;
use uuid::Uuid;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_ERROR_BODY_CHARS: usize = 200;
const MAX_LISTED_OBJECTS: u32 = 1_000;

pub struct RestGateway {
    base_url: String,
    anon_key: String,
    client: Client,
    session: RefCell<Option<Session>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    user: TokenUser,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    id: Uuid,
}

#[derive(Debug, Deserialize)]
struct ListedObject {
    name: String,
}

impl RestGateway {
    pub fn new(base_url: &str, anon_key: &str) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("hivekeeper/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| GatewayError::InvalidRequest(err.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            client,
            session: RefCell::new(None),
        })
    }

    pub fn from_config(config: &BackendConfig) -> GatewayResult<Self> {
        let gateway = Self::new(&config.url, &config.anon_key)?;
        if let (Some(access_token), Some(user_id)) = (&config.access_token, config.user_id) {
            gateway.set_session(Some(Session {
                user_id,
                access_token: access_token.clone(),
                expires_at_ms: None,
            }));
        }
        Ok(gateway)
    }

    pub fn set_session(&self, session: Option<Session>) {
        *self.session.borrow_mut() = session;
    }

    /// Signs in with email and password and keeps the returned session.
    pub fn sign_in_with_password(&self, email: &str, password: &str) -> GatewayResult<Session> {
        let request = self
            .client
            .post(format!("{}/auth/v1/token?grant_type=password", self.base_url))
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "email": email.trim(), "password": password }));
        let response = send(request)?;
        let token: TokenResponse = response
            .json()
            .map_err(|err| GatewayError::InvalidResponse(err.to_string()))?;

        let session = Session {
            user_id: token.user.id,
            access_token: token.access_token,
            expires_at_ms: token
                .expires_in
                .map(|seconds| now_epoch_ms().saturating_add(seconds.saturating_mul(1000))),
        };
        debug!(
            "event=auth_sign_in module=gateway status=ok user_id={}",
            session.user_id
        );
        self.set_session(Some(session.clone()));
        Ok(session)
    }

    /// Revokes the session remotely; the local session is dropped either way.
    pub fn sign_out(&self) -> GatewayResult<()> {
        let result = match self.session.borrow().as_ref() {
            Some(_) => {
                let request = self
                    .authorized(self.client.post(format!("{}/auth/v1/logout", self.base_url)));
                send(request).map(|_| ())
            }
            None => Ok(()),
        };
        self.set_session(None);
        if let Err(err) = &result {
            warn!("event=auth_sign_out module=gateway status=error error={err}");
        }
        result
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/{bucket}/{path}", self.base_url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        let bearer = self
            .session
            .borrow()
            .as_ref()
            .map(|session| session.access_token.clone())
            .unwrap_or_else(|| self.anon_key.clone());
        builder
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }
}

impl RemoteGateway for RestGateway {
    fn session(&self) -> Option<Session> {
        self.session.borrow().clone()
    }

    fn select(&self, query: &Query) -> GatewayResult<Vec<Row>> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(query_params(query));
        let request = self
            .authorized(self.client.get(self.rest_url(&query.table)))
            .query(&params);
        read_rows(send(request)?)
    }

    fn insert(&self, table: &str, row: Row) -> GatewayResult<Row> {
        let request = self
            .authorized(self.client.post(self.rest_url(table)))
            .header("Prefer", "return=representation")
            .json(&Value::Object(row));
        read_rows(send(request)?)?
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::InvalidResponse("insert returned no rows".to_string()))
    }

    fn update(&self, table: &str, filters: &[Filter], patch: Row) -> GatewayResult<Vec<Row>> {
        require_filters("update", filters)?;
        let params = filters.iter().map(filter_param).collect::<Vec<_>>();
        let request = self
            .authorized(self.client.patch(self.rest_url(table)))
            .query(&params)
            .header("Prefer", "return=representation")
            .json(&Value::Object(patch));
        read_rows(send(request)?)
    }

    fn delete(&self, table: &str, filters: &[Filter]) -> GatewayResult<u64> {
        require_filters("delete", filters)?;
        let params = filters.iter().map(filter_param).collect::<Vec<_>>();
        let request = self
            .authorized(self.client.delete(self.rest_url(table)))
            .query(&params)
            .header("Prefer", "return=representation");
        Ok(read_rows(send(request)?)?.len() as u64)
    }

    fn upload(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> GatewayResult<String> {
        let request = self
            .authorized(self.client.post(self.object_url(bucket, path)))
            .header("Content-Type", content_type)
            .header("x-upsert", "true")
            .body(bytes.to_vec());
        send(request)?;
        Ok(self.public_url(bucket, path))
    }

    fn remove_object(&self, bucket: &str, path: &str) -> GatewayResult<()> {
        let request = self.authorized(self.client.delete(self.object_url(bucket, path)));
        send(request).map(|_| ())
    }

    fn remove_folder(&self, bucket: &str, folder: &str) -> GatewayResult<u64> {
        let prefix = folder_prefix(folder)?;
        let list = self
            .authorized(
                self.client
                    .post(format!("{}/storage/v1/object/list/{bucket}", self.base_url)),
            )
            .json(&serde_json::json!({
                "prefix": prefix.trim_end_matches('/'),
                "limit": MAX_LISTED_OBJECTS,
                "offset": 0,
            }));
        let listed: Vec<ListedObject> = send(list)?
            .json()
            .map_err(|err| GatewayError::InvalidResponse(err.to_string()))?;
        if listed.is_empty() {
            return Ok(0);
        }

        let paths = listed
            .into_iter()
            .map(|object| format!("{prefix}{}", object.name))
            .collect::<Vec<_>>();
        let remove = self
            .authorized(
                self.client
                    .delete(format!("{}/storage/v1/object/{bucket}", self.base_url)),
            )
            .json(&serde_json::json!({ "prefixes": paths }));
        Ok(read_rows(send(remove)?)?.len() as u64)
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{bucket}/{path}", self.base_url)
    }

    fn subscribe(&self, _table: &str) -> GatewayResult<Subscription> {
        Err(GatewayError::Unsupported(
            "realtime subscriptions over the REST gateway",
        ))
    }
}

fn send(request: RequestBuilder) -> GatewayResult<Response> {
    let response = request.send().map_err(map_transport_error)?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    let message = body.chars().take(MAX_ERROR_BODY_CHARS).collect::<String>();
    debug!(
        "event=gateway_request module=gateway status=error http_status={}",
        status.as_u16()
    );
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Unauthorized(message),
        StatusCode::NOT_FOUND => GatewayError::NotFound(message),
        StatusCode::CONFLICT => GatewayError::Conflict(message),
        other => GatewayError::Remote {
            status: other.as_u16(),
            message,
        },
    })
}

fn map_transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_connect() || err.is_timeout() || err.is_request() {
        GatewayError::Network(err.to_string())
    } else if err.is_decode() || err.is_body() {
        GatewayError::InvalidResponse(err.to_string())
    } else {
        GatewayError::Network(err.to_string())
    }
}

fn read_rows(response: Response) -> GatewayResult<Vec<Row>> {
    let body: Value = response
        .json()
        .map_err(|err| GatewayError::InvalidResponse(err.to_string()))?;
    match body {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row),
                other => Err(GatewayError::InvalidResponse(format!(
                    "expected object rows, got `{other}`"
                ))),
            })
            .collect(),
        Value::Object(row) => Ok(vec![row]),
        Value::Null => Ok(Vec::new()),
        other => Err(GatewayError::InvalidResponse(format!(
            "expected a row array, got `{other}`"
        ))),
    }
}

/// Renders filters, ordering and limit as PostgREST query parameters.
pub(crate) fn query_params(query: &Query) -> Vec<(String, String)> {
    let mut params = query.filters.iter().map(filter_param).collect::<Vec<_>>();
    if !query.order.is_empty() {
        let order = query
            .order
            .iter()
            .map(|order| {
                let direction = match order.direction {
                    Direction::Asc => "asc",
                    Direction::Desc => "desc",
                };
                format!("{}.{direction}.nullslast", order.column)
            })
            .collect::<Vec<_>>()
            .join(",");
        params.push(("order".to_string(), order));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

fn filter_param(filter: &Filter) -> (String, String) {
    let expression = match filter {
        Filter::Eq { value, .. } => format!("eq.{}", render_value(value)),
        Filter::Neq { value, .. } => format!("neq.{}", render_value(value)),
        Filter::In { values, .. } => format!(
            "in.({})",
            values
                .iter()
                .map(render_list_item)
                .collect::<Vec<_>>()
                .join(",")
        ),
        Filter::Gte { value, .. } => format!("gte.{}", render_value(value)),
        Filter::Lte { value, .. } => format!("lte.{}", render_value(value)),
        Filter::IsNull { .. } => "is.null".to_string(),
    };
    (filter.column().to_string(), expression)
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn render_list_item(value: &Value) -> String {
    let rendered = render_value(value);
    if rendered.contains([',', '(', ')', '"']) {
        format!("\"{}\"", rendered.replace('"', "\\\""))
    } else {
        rendered
    }
}
