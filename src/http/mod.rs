pub mod envelope;
pub mod quota;

use crate::config::Config;
use crate::error::{decode_api_error, DispatchError};
use crate::ratelimit::RateTracker;
use crate::types::{BucketKey, RateQuota};
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

pub use envelope::{EmptyResponse, ResponseEnvelope, RestResponse};
pub use quota::{parse_quota, parse_quota_at, QuotaError};

pub fn build_client(cfg: &Config) -> reqwest::Result<Client> {
    let mut default_headers = HeaderMap::new();
    if let Ok(ua) = HeaderValue::from_str(&cfg.user_agent) {
        default_headers.insert(USER_AGENT, ua);
    }
    // Authorization is injected per request; credentials differ per call.
    Client::builder()
        .default_headers(default_headers)
        .timeout(cfg.timeout())
        .use_rustls_tls()
        .build()
}

/// Whether a send may be held back by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Throttle {
    /// Wait for the bucket's deadline before sending.
    #[default]
    Wait,
    /// Send right away and accept a possible server-side throttle.
    Immediate,
}

#[derive(Debug)]
enum Payload {
    Empty,
    Json(Vec<u8>),
    Unencodable(serde_json::Error),
}

/// Everything one dispatch needs. Built per call and consumed by
/// [`Dispatcher::send`].
#[derive(Debug)]
pub struct PendingExchange<'a> {
    method: Method,
    url: String,
    credential: &'a str,
    bucket: BucketKey,
    query: Vec<(String, String)>,
    payload: Payload,
    throttle: Throttle,
}

impl<'a> PendingExchange<'a> {
    pub fn new(method: Method, url: impl Into<String>, credential: &'a str, bucket: BucketKey) -> Self {
        Self {
            method,
            url: url.into(),
            credential,
            bucket,
            query: Vec::new(),
            payload: Payload::Empty,
            throttle: Throttle::default(),
        }
    }

    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    pub fn query_pairs<K: Into<String>, V: ToString>(
        mut self,
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.query
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.to_string())));
        self
    }

    /// Serializes `payload` as the JSON body. An encoding failure is reported
    /// by [`Dispatcher::send`] before anything goes on the wire.
    pub fn json<P: Serialize + ?Sized>(mut self, payload: &P) -> Self {
        self.payload = match serde_json::to_vec(payload) {
            Ok(bytes) => Payload::Json(bytes),
            Err(e) => Payload::Unencodable(e),
        };
        self
    }

    pub fn throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn bucket(&self) -> &BucketKey {
        &self.bucket
    }
}

fn target_url(raw: &str, query: &[(String, String)]) -> Result<Url, DispatchError> {
    let mut url = Url::parse(raw).map_err(|source| DispatchError::InvalidUrl {
        url: raw.to_string(),
        source,
    })?;
    // The exchange's query always wins, even when empty.
    if query.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(query);
    }
    Ok(url)
}

/// Performs single authenticated exchanges and normalizes their outcome into
/// a [`ResponseEnvelope`].
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: Client,
    tracker: Arc<RateTracker>,
}

impl Dispatcher {
    pub fn new(client: Client, tracker: Arc<RateTracker>) -> Self {
        Self { client, tracker }
    }

    pub fn tracker(&self) -> &Arc<RateTracker> {
        &self.tracker
    }

    /// Sends one request and fills `envelope` with whatever could be learned.
    ///
    /// On success the observed quota is returned. On failure the envelope
    /// still carries the quota (if the server was reached) and the decoded
    /// [`ApiError`](crate::error::ApiError) (if the server explained itself).
    /// Nothing is retried here.
    pub async fn send<E: ResponseEnvelope>(
        &self,
        exchange: PendingExchange<'_>,
        envelope: &mut E,
        cancel: &CancellationToken,
    ) -> Result<RateQuota, DispatchError> {
        let url = target_url(&exchange.url, &exchange.query)?;
        let PendingExchange {
            method,
            url: raw_url,
            credential,
            bucket,
            payload,
            throttle,
            ..
        } = exchange;
        let body = match payload {
            Payload::Empty => None,
            Payload::Json(bytes) => Some(bytes),
            Payload::Unencodable(e) => return Err(DispatchError::Encoding(e)),
        };
        let mut auth =
            HeaderValue::from_str(credential).map_err(|_| DispatchError::InvalidCredential)?;
        auth.set_sensitive(true);

        // Held until this response's quota is recorded, so same-key sends
        // queue on fresh deadlines.
        let permit = match throttle {
            Throttle::Wait => Some(self.tracker.acquire(&bucket, cancel).await?),
            Throttle::Immediate => {
                if let Some(left) = self.tracker.peek(&bucket) {
                    debug!("bucket {}: sending {:?} ahead of schedule", bucket, left);
                }
                None
            }
        };

        let mut request = self
            .client
            .request(method.clone(), url)
            .header(AUTHORIZATION, auth);
        if let Some(bytes) = body {
            request = request
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .header(CONTENT_LENGTH, bytes.len())
                .body(bytes);
        }

        debug!("{} {} (bucket {})", method, raw_url, bucket);
        let response = tokio::select! {
            res = request.send() => res,
            _ = cancel.cancelled() => return Err(DispatchError::Cancelled),
        };
        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!("{} {} error sending request: {}", method, raw_url, e);
                return Err(DispatchError::Transport(e));
            }
        };

        let status = response.status();
        let quota = match parse_quota(response.headers()) {
            Ok(q) => {
                envelope.set_quota(q);
                self.tracker.record_observation(&bucket, &q);
                Ok(q)
            }
            Err(e) => {
                warn!("{} {} error getting ratelimits: {}", method, raw_url, e);
                Err(e)
            }
        };
        drop(permit);

        let bytes = tokio::select! {
            res = response.bytes() => res?,
            _ = cancel.cancelled() => return Err(DispatchError::Cancelled),
        };

        if status != StatusCode::OK {
            return match decode_api_error(&bytes, status) {
                Ok(api) => {
                    envelope.set_error(api.clone());
                    Err(DispatchError::Api(api))
                }
                Err(source) => Err(DispatchError::UndecodableError { status, source }),
            };
        }

        if let Some(slot) = envelope.body_slot() {
            let value = serde_json::from_slice(&bytes).map_err(DispatchError::Decoding)?;
            *slot = Some(value);
        }

        quota.map_err(DispatchError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(p: &[(&str, &str)]) -> Vec<(String, String)> {
        p.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn empty_query_clears_existing_one() {
        let url = target_url("https://csfloat.com/api/v1/me?stale=1", &[]).unwrap();
        assert_eq!(url.as_str(), "https://csfloat.com/api/v1/me");
    }

    #[test]
    fn query_replaces_and_encodes() {
        let url = target_url(
            "https://csfloat.com/api/v1/listings?stale=1",
            &pairs(&[("market_hash_name", "AK-47 | Redline"), ("limit", "40")]),
        )
        .unwrap();
        assert_eq!(
            url.query(),
            Some("market_hash_name=AK-47+%7C+Redline&limit=40")
        );
    }

    #[test]
    fn bad_url_is_reported() {
        assert!(matches!(
            target_url("not a url", &[]),
            Err(DispatchError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn exchange_builder_collects_parts() {
        let ex = PendingExchange::new(Method::GET, "https://x/y", "k", BucketKey::new("b"))
            .query("a", 1)
            .query_pairs([("b", "2")])
            .throttle(Throttle::Immediate);
        assert_eq!(ex.query, pairs(&[("a", "1"), ("b", "2")]));
        assert_eq!(ex.throttle, Throttle::Immediate);
        assert_eq!(ex.bucket().as_str(), "b");
        assert!(matches!(ex.payload, Payload::Empty));
    }

    #[tokio::test]
    async fn invalid_credential_fails_before_sending() {
        let dispatcher = Dispatcher::new(Client::new(), Arc::new(RateTracker::new()));
        let ex = PendingExchange::new(
            Method::GET,
            "http://127.0.0.1:1/me",
            "line\nbreak",
            BucketKey::new("me"),
        );
        let mut env = EmptyResponse::default();
        let err = dispatcher
            .send(ex, &mut env, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidCredential));
    }

    #[tokio::test]
    async fn cancelled_token_aborts_before_sending() {
        let tracker = Arc::new(RateTracker::new());
        let bucket = BucketKey::new("me");
        tracker.record_observation(
            &bucket,
            &RateQuota::new(
                50,
                0,
                chrono::Utc::now() + chrono::TimeDelta::seconds(60),
                chrono::Utc::now(),
            ),
        );
        let dispatcher = Dispatcher::new(Client::new(), tracker);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ex = PendingExchange::new(Method::GET, "http://127.0.0.1:1/me", "k", bucket);
        let mut env = EmptyResponse::default();
        let err = dispatcher.send(ex, &mut env, &cancel).await.unwrap_err();
        assert!(matches!(err, DispatchError::Cancelled));
    }
}
