//! REST-mode transport against a mock sidecar.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use bwkit_common::{Error, ObjectKind, Session, SharedSession, VaultObject};
use bwkit_transport::{ObjectQuery, RestClient, RestTransport, VaultTransport};

#[derive(Debug, Clone)]
struct Request {
    method: &'static str,
    path: String,
    query: HashMap<String, String>,
    body: Option<Value>,
}

#[derive(Clone, Default)]
struct Sidecar {
    requests: Arc<Mutex<Vec<Request>>>,
}

impl Sidecar {
    fn record(&self, request: Request) {
        self.requests.lock().unwrap().push(request);
    }

    fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }
}

async fn status() -> Json<Value> {
    Json(json!({"success": true, "data": {"object": "template", "template": {"status": "unlocked"}}}))
}

async fn list_objects(
    State(sidecar): State<Sidecar>,
    Path(kind): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    sidecar.record(Request {
        method: "GET",
        path: format!("/list/object/{}", kind),
        query,
        body: None,
    });
    Json(json!({
        "success": true,
        "data": {
            "object": "list",
            "data": [{"object": "organization", "id": "org-1", "name": "SOME ORG"}]
        }
    }))
}

async fn get_object(
    State(sidecar): State<Sidecar>,
    Path((kind, id)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    sidecar.record(Request {
        method: "GET",
        path: format!("/object/{}/{}", kind, id),
        query,
        body: None,
    });
    if id == "missing" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"success": false, "message": "Not found."})),
        )
            .into_response();
    }
    Json(json!({"success": true, "data": {"object": kind, "id": id, "name": "SOME ORG"}}))
        .into_response()
}

async fn edit_object(
    State(sidecar): State<Sidecar>,
    Path((kind, id)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    sidecar.record(Request {
        method: "POST",
        path: format!("/object/{}/{}", kind, id),
        query,
        body: Some(body.clone()),
    });
    let mut data = body;
    data["object"] = json!(kind);
    Json(json!({"success": true, "data": data}))
}

async fn spawn_sidecar() -> (Sidecar, RestClient) {
    let sidecar = Sidecar::default();
    let app = Router::new()
        .route("/status", get(status))
        .route("/list/object/{kind}", get(list_objects))
        .route("/object/{kind}/{id}", get(get_object).post(edit_object))
        .with_state(sidecar.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = RestClient::new("127.0.0.1", port, Some(Duration::from_secs(5))).unwrap();
    client.wait_until_ready(Duration::from_secs(5)).await.unwrap();
    (sidecar, client)
}

#[tokio::test]
async fn test_list_sends_query_parameters() {
    let (sidecar, client) = spawn_sidecar().await;
    let transport = RestTransport::new(client, Session::new().shared());

    let query = ObjectQuery::new()
        .organization("org-1")
        .search("Parent")
        .folder("f-1");
    let found = transport.list(ObjectKind::OrgCollection, &query).await.unwrap();
    assert_eq!(found.len(), 1);

    let request = sidecar.requests().pop().unwrap();
    assert_eq!(request.path, "/list/object/org-collections");
    assert_eq!(request.query.get("organizationId").map(String::as_str), Some("org-1"));
    assert_eq!(request.query.get("search").map(String::as_str), Some("Parent"));
    assert_eq!(request.query.get("folderId").map(String::as_str), Some("f-1"));
}

#[tokio::test]
async fn test_list_then_get_round_trip() {
    let (_sidecar, client) = spawn_sidecar().await;
    let transport = RestTransport::new(client, Session::new().shared());

    let orgs = transport
        .list(ObjectKind::Organization, &ObjectQuery::new())
        .await
        .unwrap();
    let id = orgs[0].id().unwrap().to_string();

    let org = transport.get(ObjectKind::Organization, &id, None).await.unwrap();
    assert_eq!(org.id(), Some(id.as_str()));
}

#[tokio::test]
async fn test_failure_envelope_is_transport_error() {
    let (_sidecar, client) = spawn_sidecar().await;
    let transport = RestTransport::new(client, Session::new().shared());

    let result = transport.get(ObjectKind::Item, "missing", None).await;
    assert!(matches!(result, Err(Error::Transport(msg)) if msg.contains("Not found.")));
}

#[tokio::test]
async fn test_edit_posts_structured_payload() {
    let (sidecar, client) = spawn_sidecar().await;
    let transport = RestTransport::new(client, Session::new().shared());

    let data = VaultObject::from_value(json!({
        "id": "c2",
        "name": "Parent/Child",
        "users": [{"id": "u1", "readOnly": true}],
        "groups": []
    }))
    .unwrap();
    let updated = transport
        .edit(ObjectKind::OrgCollection, "c2", Some("org-1"), &data)
        .await
        .unwrap();
    assert_eq!(updated.get_array("users").unwrap().len(), 1);

    let request = sidecar.requests().pop().unwrap();
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/object/org-collection/c2");
    assert_eq!(request.query.get("id").map(String::as_str), Some("c2"));
    assert_eq!(request.query.get("organizationId").map(String::as_str), Some("org-1"));
    assert_eq!(request.body.unwrap()["users"][0]["id"], "u1");
}

#[tokio::test]
async fn test_unreachable_sidecar() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = RestClient::new("127.0.0.1", port, None).unwrap();
    let ready = client.wait_until_ready(Duration::from_millis(600)).await;
    assert!(matches!(ready, Err(Error::Transport(_))));

    let transport = RestTransport::new(client, Session::new().shared());
    let result = transport.list(ObjectKind::Item, &ObjectQuery::new()).await;
    assert!(matches!(result, Err(Error::Transport(_))));
}

#[tokio::test]
async fn test_request_waits_for_session_transition() {
    let (sidecar, client) = spawn_sidecar().await;
    let session: SharedSession = Session::new().shared();
    let transport = Arc::new(RestTransport::new(client, Arc::clone(&session)));

    let transition = session.write().await;
    let pending = {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move {
            transport
                .list(ObjectKind::Organization, &ObjectQuery::new())
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!pending.is_finished());
    assert!(sidecar
        .requests()
        .iter()
        .all(|r| r.path != "/list/object/organizations"));

    drop(transition);
    let found = pending.await.unwrap().unwrap();
    assert_eq!(found.len(), 1);
}
