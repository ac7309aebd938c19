// Stateless request/response gateway to the hub's HTTP API.
//
// Wraps `reqwest::Client` with bearer auth, URL construction, and a retry
// policy that only re-sends on transport failures. Status-code failures
// come back to the caller as `Error::Http` on the first attempt.

use chrono::Utc;
use reqwest::Method;
use secrecy::SecretString;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::model::{Entity, WireState};
use crate::retry::RetryPolicy;
use crate::transport::TransportConfig;

/// Marker the hub returns from `GET /api/` when it is up.
pub const RUNNING_MARKER: &str = "API running.";

/// Target selectors for a service call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Target {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entity_id: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub device_id: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub area_id: Vec<String>,
}

impl Target {
    pub fn entities<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entity_id: ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entity_id.is_empty() && self.device_id.is_empty() && self.area_id.is_empty()
    }
}

/// Body of a one-shot service call.
#[derive(Debug, Clone, Default)]
pub struct ServiceCall {
    pub data: Map<String, Value>,
    pub target: Target,
}

impl ServiceCall {
    /// Merge service data and target selectors into one flat JSON body.
    /// Target keys win over identically named data keys.
    pub fn body(&self) -> Value {
        let mut body = self.data.clone();
        if let Ok(Value::Object(target)) = serde_json::to_value(&self.target) {
            body.extend(target);
        }
        Value::Object(body)
    }
}

/// Retrying HTTP gateway to the hub.
pub struct RestGateway {
    http: reqwest::Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl RestGateway {
    /// Create a gateway from a `TransportConfig` and access token.
    ///
    /// `base_url` is the hub root, e.g. `http://hub.local:8123`.
    pub fn new(
        base_url: Url,
        token: &SecretString,
        transport: &TransportConfig,
        retry: RetryPolicy,
    ) -> Result<Self, Error> {
        let http = transport.build_client_with_token(token)?;
        Ok(Self::with_client(http, base_url, retry))
    }

    /// Create a gateway around a pre-built client. The client is expected to
    /// already carry whatever auth the hub needs.
    pub fn with_client(http: reqwest::Client, base_url: Url, retry: RetryPolicy) -> Self {
        Self {
            http,
            base_url,
            retry,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Build `{base}/api/{endpoint}`.
    pub(crate) fn api_url(&self, endpoint: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let endpoint = endpoint.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}/api/{endpoint}"))?)
    }

    // ── Generic request ──────────────────────────────────────────────

    /// Send a request, retrying transport failures per the gateway's policy.
    ///
    /// Returns the decoded JSON body (`Value::Null` for an empty body).
    pub async fn request(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<&Value>,
    ) -> Result<Value, Error> {
        let url = self.api_url(endpoint)?;
        self.request_url(&url, &method, body).await
    }

    async fn request_url(
        &self,
        url: &Url,
        method: &Method,
        body: Option<&Value>,
    ) -> Result<Value, Error> {
        self.retry
            .run(
                |attempt| self.send_once(url.clone(), method.clone(), body, attempt),
                Error::is_transient,
            )
            .await
    }

    async fn send_once(
        &self,
        url: Url,
        method: Method,
        body: Option<&Value>,
        attempt: u32,
    ) -> Result<Value, Error> {
        debug!(%method, %url, attempt, "gateway request");

        let mut builder = self.http.request(method, url);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        trace!(status = status.as_u16(), len = text.len(), "gateway response");

        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| Error::Codec {
            message: e.to_string(),
            frame: text,
        })
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// Connectivity probe: `GET /api/` must answer with the running marker.
    pub async fn ping(&self) -> Result<(), Error> {
        let body = self.request("", Method::GET, None).await?;
        match body.get("message").and_then(Value::as_str) {
            Some(RUNNING_MARKER) => Ok(()),
            _ => Err(Error::UnexpectedResponse(format!(
                "hub did not report \"{RUNNING_MARKER}\": {body}"
            ))),
        }
    }

    /// Full snapshot of every entity the hub knows about.
    pub async fn states(&self) -> Result<Vec<Entity>, Error> {
        let body = self.request("states", Method::GET, None).await?;
        decode_states(body)
    }

    /// Snapshot of one entity, or `None` if the hub does not know it.
    pub async fn state(&self, entity_id: &str) -> Result<Option<Entity>, Error> {
        let mut url = self.api_url("states")?;
        url.query_pairs_mut().append_pair("entity_id", entity_id);

        match self.request_url(&url, &Method::GET, None).await {
            Ok(body) => Ok(decode_states(body)?
                .into_iter()
                .find(|e| e.id == entity_id)),
            Err(Error::Http { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// One-shot control call: `POST /api/services/{domain}/{service}`.
    ///
    /// Returns whatever the hub answered with (usually the changed states).
    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        call: &ServiceCall,
    ) -> Result<Value, Error> {
        let body = call.body();
        self.request(
            &format!("services/{domain}/{service}"),
            Method::POST,
            Some(&body),
        )
        .await
    }
}

/// Decode a states payload: a list, or a single object for filtered queries.
fn decode_states(body: Value) -> Result<Vec<Entity>, Error> {
    let items = match body {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        single @ Value::Object(_) => vec![single],
        other => {
            return Err(Error::UnexpectedResponse(format!(
                "expected a list of states, got {other}"
            )));
        }
    };

    let now = Utc::now();
    items
        .into_iter()
        .map(|item| {
            let raw = item.to_string();
            let wire: WireState = serde_json::from_value(item).map_err(|e| Error::Codec {
                message: format!("bad state object: {e}"),
                frame: raw,
            })?;
            match wire.entity_id.clone() {
                Some(id) => Ok(wire.into_entity(&id, now)),
                None => Err(Error::UnexpectedResponse(
                    "state object without entity_id".into(),
                )),
            }
        })
        .collect()
}
