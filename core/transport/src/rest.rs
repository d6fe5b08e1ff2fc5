//! REST transport against the local `bw serve` sidecar.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use bwkit_common::{Error, ObjectKind, Result, SharedSession, VaultObject};

use crate::provider::{list_name, require_id, ObjectQuery, VaultTransport};

/// Default sidecar host.
pub const DEFAULT_HOST: &str = "localhost";
/// Default sidecar port.
pub const DEFAULT_PORT: u16 = 8087;

/// Delay between readiness probes.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Response envelope of the sidecar.
#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

/// Unwrap a sidecar response envelope.
///
/// Lists (`data.object == "list"`) yield `data.data`; recognized single
/// objects yield `data` itself.
///
/// # Errors
/// - Transport error if `success` is false
/// - Decode error if the envelope or its object tag is not recognized
pub fn unwrap_envelope(body: Value) -> Result<Value> {
    let envelope: Envelope = serde_json::from_value(body)
        .map_err(|e| Error::Decode(format!("Malformed sidecar envelope: {}", e)))?;

    if !envelope.success {
        return Err(Error::Transport(format!(
            "Sidecar reported failure: {}",
            envelope.message.as_deref().unwrap_or("no message")
        )));
    }

    let mut data = envelope
        .data
        .ok_or_else(|| Error::Decode("Sidecar envelope has no data".to_string()))?;

    let tag = data
        .get("object")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Decode("Sidecar data has no object tag".to_string()))?;

    if tag == "list" {
        return data
            .get_mut("data")
            .map(Value::take)
            .ok_or_else(|| Error::Decode("Sidecar list has no data".to_string()));
    }

    match tag.parse::<ObjectKind>() {
        Ok(kind) if kind.is_single_object() && kind.as_str() == tag => Ok(data),
        _ => Err(Error::Decode(format!("Unrecognized sidecar object '{}'", tag))),
    }
}

/// HTTP client for the sidecar.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: Client,
    base: Url,
}

impl RestClient {
    /// Create a client for `http://<host>:<port>`.
    ///
    /// # Errors
    /// - Configuration error if the address is not a valid URL
    pub fn new(host: &str, port: u16, timeout: Option<Duration>) -> Result<Self> {
        let base = Url::parse(&format!("http://{}:{}", host, port))
            .map_err(|e| Error::Configuration(format!("Invalid sidecar address: {}", e)))?;

        let mut builder = Client::builder().user_agent(concat!("bwkit/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http, base })
    }

    /// Base URL of the sidecar.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// `GET /status`, returning the envelope's data as-is.
    pub async fn status(&self) -> Result<Value> {
        let url = self.url(&["status"])?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Sidecar unreachable: {}", e)))?;
        let body = Self::body(response).await?;
        let envelope: Envelope = serde_json::from_value(body)
            .map_err(|e| Error::Decode(format!("Malformed sidecar envelope: {}", e)))?;
        if !envelope.success {
            return Err(Error::Transport("Sidecar status check failed".to_string()));
        }
        Ok(envelope.data.unwrap_or(Value::Null))
    }

    /// Poll `GET /status` until the sidecar answers or `timeout` elapses.
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        loop {
            match self.status().await {
                Ok(_) => {
                    debug!(elapsed = ?started.elapsed(), "Sidecar is ready");
                    return Ok(());
                }
                Err(e) if started.elapsed() >= timeout => {
                    return Err(Error::Transport(format!(
                        "Sidecar at {} not ready after {:?}: {}",
                        self.base, timeout, e
                    )));
                }
                Err(_) => tokio::time::sleep(READY_POLL_INTERVAL).await,
            }
        }
    }

    /// Read request against `segments` with `query`.
    pub async fn read(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Value> {
        let url = self.url(segments)?;
        debug!(url = %url, "Sidecar read");
        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Sidecar unreachable: {}", e)))?;
        unwrap_envelope(Self::body(response).await?)
    }

    /// Update request: the payload goes in the body as structured data.
    pub async fn update(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
        payload: &Value,
    ) -> Result<Value> {
        let url = self.url(segments)?;
        debug!(url = %url, "Sidecar update");
        let response = self
            .http
            .post(url)
            .query(query)
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Sidecar unreachable: {}", e)))?;
        unwrap_envelope(Self::body(response).await?)
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Configuration("Sidecar base URL cannot carry a path".to_string()))?
            .clear()
            .extend(segments);
        Ok(url)
    }

    /// Decode the body. Failure envelopes come with 4xx codes, so the body is
    /// parsed before the status is considered.
    async fn body(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Transport(format!("Failed to read sidecar response: {}", e)))?;
        match serde_json::from_str::<Value>(&text) {
            Ok(body) => Ok(body),
            Err(_) if !status.is_success() => Err(Error::Transport(format!(
                "Sidecar returned {}: {}",
                status,
                text.trim()
            ))),
            Err(e) => Err(Error::Decode(format!(
                "Sidecar returned {} with a non-JSON body: {}",
                status.as_u16(),
                e
            ))),
        }
    }
}

/// REST-mode transport.
///
/// The sidecar was started with the session token, so requests carry no
/// credentials of their own. Payloads are submitted as JSON without the
/// encode step. Like the process transport, each request holds the session
/// read lock, so logout cannot stop the sidecar underneath it.
pub struct RestTransport {
    client: RestClient,
    session: SharedSession,
}

impl RestTransport {
    /// Create a transport over a sidecar client.
    pub fn new(client: RestClient, session: SharedSession) -> Self {
        Self { client, session }
    }

    /// The underlying client.
    pub fn client(&self) -> &RestClient {
        &self.client
    }
}

fn push_param<'a>(query: &mut Vec<(&'static str, &'a str)>, name: &'static str, value: Option<&'a str>) {
    if let Some(value) = value {
        query.push((name, value));
    }
}

#[async_trait]
impl VaultTransport for RestTransport {
    fn name(&self) -> &str {
        "rest"
    }

    async fn list(&self, kind: ObjectKind, query: &ObjectQuery) -> Result<Vec<VaultObject>> {
        let name = list_name(kind)?;
        let mut params = Vec::new();
        push_param(&mut params, "organizationId", query.organization_id.as_deref());
        push_param(&mut params, "search", query.search.as_deref());
        push_param(&mut params, "folderId", query.folder_id.as_deref());

        let _session = self.session.read().await;
        let value = self.client.read(&["list", "object", name], &params).await?;
        VaultObject::list_from_value(value)
    }

    async fn get(
        &self,
        kind: ObjectKind,
        id: &str,
        organization_id: Option<&str>,
    ) -> Result<VaultObject> {
        require_id(kind, id)?;
        let mut params = Vec::new();
        push_param(&mut params, "organizationId", organization_id);

        let _session = self.session.read().await;
        let value = self
            .client
            .read(&["object", kind.as_str(), id], &params)
            .await?;
        VaultObject::from_value(value)
    }

    async fn edit(
        &self,
        kind: ObjectKind,
        id: &str,
        organization_id: Option<&str>,
        data: &VaultObject,
    ) -> Result<VaultObject> {
        require_id(kind, id)?;
        let mut params = vec![("id", id)];
        push_param(&mut params, "organizationId", organization_id);

        let payload = data.clone().into_value();
        let _session = self.session.read().await;
        let value = self
            .client
            .update(&["object", kind.as_str(), id], &params, &payload)
            .await?;
        VaultObject::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwrap_list_envelope() {
        let body = json!({
            "success": true,
            "data": {
                "object": "list",
                "data": [{"object": "organization", "id": "org-1", "name": "SOME ORG"}]
            }
        });
        let data = unwrap_envelope(body).unwrap();
        assert_eq!(data[0]["id"], "org-1");
    }

    #[test]
    fn test_unwrap_single_object_envelope() {
        let body = json!({
            "success": true,
            "data": {"object": "org-collection", "id": "c1", "name": "COLLB/COLD", "groups": []}
        });
        let data = unwrap_envelope(body).unwrap();
        assert_eq!(data["name"], "COLLB/COLD");
    }

    #[test]
    fn test_unwrap_failure_envelope() {
        let body = json!({"success": false, "message": "Not found."});
        let err = unwrap_envelope(body).unwrap_err();
        assert!(matches!(err, Error::Transport(msg) if msg.contains("Not found.")));
    }

    #[test]
    fn test_unwrap_unrecognized_object() {
        let body = json!({"success": true, "data": {"object": "org-member", "id": "m1"}});
        assert!(matches!(unwrap_envelope(body), Err(Error::Decode(_))));

        let body = json!({"success": true, "data": {"object": "org-collections"}});
        assert!(matches!(unwrap_envelope(body), Err(Error::Decode(_))));
    }

    #[test]
    fn test_url_building_escapes_segments() {
        let client = RestClient::new(DEFAULT_HOST, DEFAULT_PORT, None).unwrap();
        let url = client.url(&["object", "org-collection", "a b"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8087/object/org-collection/a%20b"
        );
    }
}
