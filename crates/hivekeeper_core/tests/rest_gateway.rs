use hivekeeper_core::gateway::{Direction, Filter, Query, Row};
use hivekeeper_core::{GatewayError, RemoteGateway, RestGateway, Session};
use serde_json::{json, Value};
use tokio::runtime::{Builder, Runtime};
use uuid::Uuid;
use wiremock::matchers::{body_bytes, body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ANON_KEY: &str = "anon-key";

/// Mock backend; the server runs on its own thread, so the blocking client
/// can be driven from the test thread.
struct Backend {
    server: MockServer,
    runtime: Runtime,
}

impl Backend {
    fn start() -> Self {
        let runtime = Builder::new_current_thread().enable_all().build().unwrap();
        let server = runtime.block_on(MockServer::start());
        Self { server, runtime }
    }

    fn mount(&self, mock: Mock) {
        self.runtime.block_on(mock.mount(&self.server));
    }

    fn gateway(&self) -> RestGateway {
        RestGateway::new(&self.server.uri(), ANON_KEY).unwrap()
    }

    fn signed_in_gateway(&self) -> RestGateway {
        let gateway = self.gateway();
        gateway.set_session(Some(Session {
            user_id: Uuid::new_v4(),
            access_token: "user-token".to_string(),
            expires_at_ms: None,
        }));
        gateway
    }
}

fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap()
}

#[test]
fn http_statuses_map_to_gateway_errors() {
    let backend = Backend::start();
    let statuses = [("locked", 401), ("forbidden", 403), ("missing", 404), ("broken", 500)];
    for (table, status) in statuses {
        backend.mount(
            Mock::given(method("GET"))
                .and(path(format!("/rest/v1/{table}")))
                .respond_with(ResponseTemplate::new(status).set_body_string("backend says no")),
        );
    }
    backend.mount(
        Mock::given(method("POST"))
            .and(path("/rest/v1/hives"))
            .respond_with(ResponseTemplate::new(409).set_body_string("duplicate key")),
    );
    let gateway = backend.gateway();

    assert!(matches!(
        gateway.select(&Query::table("locked")),
        Err(GatewayError::Unauthorized(_))
    ));
    assert!(matches!(
        gateway.select(&Query::table("forbidden")),
        Err(GatewayError::Unauthorized(_))
    ));
    assert!(matches!(
        gateway.select(&Query::table("missing")),
        Err(GatewayError::NotFound(_))
    ));
    match gateway.select(&Query::table("broken")) {
        Err(GatewayError::Remote { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "backend says no");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    let conflict = gateway.insert("hives", row(json!({"id": "h1"}))).unwrap_err();
    assert!(!conflict.is_network());
    assert!(matches!(conflict, GatewayError::Conflict(message) if message == "duplicate key"));
}

#[test]
fn select_without_session_uses_anon_key_and_query_params() {
    let backend = Backend::start();
    backend.mount(
        Mock::given(method("GET"))
            .and(path("/rest/v1/hives"))
            .and(header("apikey", ANON_KEY))
            .and(header("authorization", "Bearer anon-key"))
            .and(query_param("select", "*"))
            .and(query_param("status", "eq.active"))
            .and(query_param("order", "created_at.desc.nullslast"))
            .and(query_param("limit", "5"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"id": "h1"}, {"id": "h2"}])),
            )
            .expect(1),
    );

    let rows = backend
        .gateway()
        .select(
            &Query::table("hives")
                .filter(Filter::eq("status", "active"))
                .order_by("created_at", Direction::Desc)
                .limit(5),
        )
        .unwrap();
    assert_eq!(
        rows.iter().map(|row| row["id"].clone()).collect::<Vec<_>>(),
        vec![json!("h1"), json!("h2")]
    );
}

#[test]
fn writes_send_session_bearer_and_return_representation() {
    let backend = Backend::start();
    backend.mount(
        Mock::given(method("POST"))
            .and(path("/rest/v1/hives"))
            .and(header("apikey", ANON_KEY))
            .and(header("authorization", "Bearer user-token"))
            .and(header("prefer", "return=representation"))
            .and(body_json(json!({"id": "h1", "name": "Jataí"})))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!([{"id": "h1", "name": "Jataí", "status": "active"}])),
            )
            .expect(1),
    );
    backend.mount(
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/hives"))
            .and(header("prefer", "return=representation"))
            .and(query_param("id", "eq.h1"))
            .and(body_json(json!({"status": "sold"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"id": "h1", "status": "sold"}])),
            )
            .expect(1),
    );
    backend.mount(
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/actions"))
            .and(header("authorization", "Bearer user-token"))
            .and(query_param("hive_id", "eq.h1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"id": "a1"}, {"id": "a2"}])),
            )
            .expect(1),
    );
    let gateway = backend.signed_in_gateway();

    let inserted = gateway
        .insert("hives", row(json!({"id": "h1", "name": "Jataí"})))
        .unwrap();
    assert_eq!(inserted["status"], "active");

    let updated = gateway
        .update(
            "hives",
            &[Filter::eq("id", "h1")],
            row(json!({"status": "sold"})),
        )
        .unwrap();
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0]["status"], "sold");

    let removed = gateway
        .delete("actions", &[Filter::eq("hive_id", "h1")])
        .unwrap();
    assert_eq!(removed, 2);
}

#[test]
fn sign_in_keeps_session_and_sign_out_drops_it() {
    let backend = Backend::start();
    let user_id = Uuid::new_v4();
    backend.mount(
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "password"))
            .and(header("apikey", ANON_KEY))
            .and(body_json(json!({"email": "keeper@example.com", "password": "secret"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "fresh-token",
                "token_type": "bearer",
                "expires_in": 3600,
                "user": {"id": user_id.to_string(), "email": "keeper@example.com"},
            })))
            .expect(1),
    );
    backend.mount(
        Mock::given(method("POST"))
            .and(path("/auth/v1/logout"))
            .and(header("authorization", "Bearer fresh-token"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1),
    );
    let gateway = backend.gateway();

    let session = gateway
        .sign_in_with_password("  keeper@example.com ", "secret")
        .unwrap();
    assert_eq!(session.user_id, user_id);
    assert_eq!(session.access_token, "fresh-token");
    assert!(session
        .expires_at_ms
        .is_some_and(|expires_at| !session.is_expired(expires_at - 60_000)));
    assert_eq!(gateway.session(), Some(session));

    gateway.sign_out().unwrap();
    assert!(gateway.session().is_none());
}

#[test]
fn rejected_sign_in_reports_remote_error_and_leaves_no_session() {
    let backend = Backend::start();
    backend.mount(
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})),
            ),
    );
    let gateway = backend.gateway();

    let err = gateway
        .sign_in_with_password("keeper@example.com", "wrong")
        .unwrap_err();
    assert!(matches!(err, GatewayError::Remote { status: 400, .. }));
    assert!(gateway.session().is_none());
}

#[test]
fn storage_upload_and_removal_use_object_paths() {
    let backend = Backend::start();
    let object_path = "/storage/v1/object/hive-photos/u1/h1/1_front.jpg";
    backend.mount(
        Mock::given(method("POST"))
            .and(path(object_path))
            .and(header("content-type", "image/jpeg"))
            .and(header("x-upsert", "true"))
            .and(header("authorization", "Bearer user-token"))
            .and(body_bytes(vec![0xFF, 0xD8, 0xFF]))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"Key": "hive-photos/u1/h1/1_front.jpg"})),
            )
            .expect(1),
    );
    backend.mount(
        Mock::given(method("DELETE"))
            .and(path(object_path))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "ok"})))
            .expect(1),
    );
    backend.mount(
        Mock::given(method("DELETE"))
            .and(path("/storage/v1/object/hive-photos/u1/h1/gone.jpg"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found")),
    );
    let gateway = backend.signed_in_gateway();

    let url = gateway
        .upload("hive-photos", "u1/h1/1_front.jpg", "image/jpeg", &[0xFF, 0xD8, 0xFF])
        .unwrap();
    assert_eq!(
        url,
        format!(
            "{}/storage/v1/object/public/hive-photos/u1/h1/1_front.jpg",
            backend.server.uri()
        )
    );

    gateway
        .remove_object("hive-photos", "u1/h1/1_front.jpg")
        .unwrap();
    assert!(matches!(
        gateway.remove_object("hive-photos", "u1/h1/gone.jpg"),
        Err(GatewayError::NotFound(_))
    ));
}

#[test]
fn remove_folder_lists_then_deletes_every_object() {
    let backend = Backend::start();
    backend.mount(
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/list/hive-photos"))
            .and(body_json(json!({"prefix": "u1/h1", "limit": 1000, "offset": 0})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"name": "1_front.jpg"}, {"name": "2_side.jpg"}])),
            )
            .expect(1),
    );
    backend.mount(
        Mock::given(method("DELETE"))
            .and(path("/storage/v1/object/hive-photos"))
            .and(body_json(json!({"prefixes": ["u1/h1/1_front.jpg", "u1/h1/2_side.jpg"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "u1/h1/1_front.jpg"},
                {"name": "u1/h1/2_side.jpg"},
            ])))
            .expect(1),
    );
    backend.mount(
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/list/avatars"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([]))),
    );
    let gateway = backend.signed_in_gateway();

    assert_eq!(gateway.remove_folder("hive-photos", "u1/h1/").unwrap(), 2);
    assert_eq!(gateway.remove_folder("avatars", "u1").unwrap(), 0);
    assert!(matches!(
        gateway.remove_folder("avatars", "/"),
        Err(GatewayError::InvalidRequest(_))
    ));
}
