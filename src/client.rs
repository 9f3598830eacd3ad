//! Composition root and a handful of marketplace call sites.
//!
//! Entities (items, listings, users) stay opaque `serde_json::Value`s; only
//! the page envelopes around them are typed.

use crate::config::Config;
use crate::error::DispatchError;
use crate::http::{
    build_client, Dispatcher, EmptyResponse, PendingExchange, ResponseEnvelope, RestResponse,
    Throttle,
};
use crate::ratelimit::RateTracker;
use crate::types::BucketKey;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A failed call, handing the partially filled envelope back to the caller.
#[derive(Debug)]
pub struct Failure<E> {
    pub envelope: E,
    pub error: DispatchError,
}

impl<E> fmt::Display for Failure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<E: fmt::Debug> std::error::Error for Failure<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

pub type CallResult<E> = Result<E, Failure<E>>;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Page {
    pub data: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Stall {
    pub data: Vec<Value>,
    #[serde(default)]
    pub total_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingsQuery {
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
    pub def_index: Option<u32>,
    pub paint_index: Option<u32>,
    pub paint_seed: Vec<u32>,
    pub category: Option<u8>,
    pub min_float: Option<f64>,
    pub max_float: Option<f64>,
    pub sort_by: Option<String>,
    pub limit: Option<u32>,
}

impl ListingsQuery {
    fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut q = vec![
            ("type", "buy_now".to_string()),
            (
                "sort_by",
                self.sort_by
                    .clone()
                    .unwrap_or_else(|| "highest_discount".into()),
            ),
            ("limit", self.limit.unwrap_or(40).to_string()),
        ];
        let mut push = |name, value: Option<String>| {
            if let Some(v) = value {
                q.push((name, v));
            }
        };
        push("min_price", self.min_price.map(|v| v.to_string()));
        push("max_price", self.max_price.map(|v| v.to_string()));
        push("def_index", self.def_index.map(|v| v.to_string()));
        push("paint_index", self.paint_index.map(|v| v.to_string()));
        push("category", self.category.map(|v| v.to_string()));
        push("min_float", self.min_float.map(|v| v.to_string()));
        push("max_float", self.max_float.map(|v| v.to_string()));
        if !self.paint_seed.is_empty() {
            let seeds = self
                .paint_seed
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(",");
            push("paint_seed", Some(seeds));
        }
        q
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UpdateListing {
    pub max_offer_discount: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BuyRequest {
    pub contract_ids: Vec<String>,
    pub total_price: u64,
}

/// Marketplace client bound to one API key.
///
/// Clones share the dispatcher, the rate tracker and the cancellation token.
#[derive(Clone)]
pub struct Client {
    dispatcher: Dispatcher,
    api_url: String,
    api_key: String,
    throttle: Throttle,
    cancel: CancellationToken,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("api_url", &self.api_url)
            .field("throttle", &self.throttle)
            .finish_non_exhaustive()
    }
}

impl Client {
    pub fn new(cfg: &Config) -> reqwest::Result<Self> {
        let tracker = Arc::new(RateTracker::with_safety_margin(cfg.safety_margin()));
        Self::with_tracker(cfg, tracker)
    }

    /// Builds a client that shares `tracker` with other clients of the process.
    pub fn with_tracker(cfg: &Config, tracker: Arc<RateTracker>) -> reqwest::Result<Self> {
        let http = build_client(cfg)?;
        Ok(Self {
            dispatcher: Dispatcher::new(http, tracker),
            api_url: cfg.api_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            throttle: Throttle::Wait,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn tracker(&self) -> &Arc<RateTracker> {
        self.dispatcher.tracker()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Aborts pending waits and in-flight requests of this client and its clones.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Prepares an exchange against `path` (relative to the API origin),
    /// throttled under the `endpoint` bucket for this client's key.
    pub fn exchange(&self, method: Method, endpoint: &str, path: &str) -> PendingExchange<'_> {
        PendingExchange::new(
            method,
            format!("{}{}", self.api_url, path),
            &self.api_key,
            BucketKey::for_endpoint(endpoint, &self.api_key),
        )
        .throttle(self.throttle)
    }

    /// Dispatches `exchange` into a fresh envelope.
    pub async fn call<E: ResponseEnvelope + Default>(
        &self,
        exchange: PendingExchange<'_>,
    ) -> CallResult<E> {
        let mut envelope = E::default();
        match self
            .dispatcher
            .send(exchange, &mut envelope, &self.cancel)
            .await
        {
            Ok(_) => Ok(envelope),
            Err(error) => Err(Failure { envelope, error }),
        }
    }

    pub async fn me(&self) -> CallResult<RestResponse<Value>> {
        self.call(self.exchange(Method::GET, "me", "/me")).await
    }

    pub async fn listing(&self, listing_id: &str) -> CallResult<RestResponse<Value>> {
        let path = format!("/listings/{}", urlencoding::encode(listing_id));
        self.call(self.exchange(Method::GET, "listing", &path)).await
    }

    pub async fn listings(&self, query: &ListingsQuery) -> CallResult<RestResponse<Page>> {
        let exchange = self
            .exchange(Method::GET, "listings", "/listings")
            .query_pairs(query.pairs());
        self.call(exchange).await
    }

    pub async fn stall(&self, steam_id: &str) -> CallResult<RestResponse<Stall>> {
        let path = format!("/users/{}/stall", urlencoding::encode(steam_id));
        let exchange = self.exchange(Method::GET, "stall", &path).query("limit", 40);
        self.call(exchange).await
    }

    /// Tradable items of the key's Steam inventory, listed ones included.
    pub async fn inventory(&self) -> CallResult<RestResponse<Vec<Value>>> {
        let exchange = self
            .exchange(Method::GET, "inventory", "/me/inventory")
            .query("limit", 40);
        self.call(exchange).await
    }

    pub async fn unlist(&self, listing_id: &str) -> CallResult<EmptyResponse> {
        let path = format!("/listings/{}", urlencoding::encode(listing_id));
        self.call(self.exchange(Method::DELETE, "unlist", &path)).await
    }

    pub async fn update_listing(
        &self,
        listing_id: &str,
        update: &UpdateListing,
    ) -> CallResult<EmptyResponse> {
        let path = format!("/listings/{}", urlencoding::encode(listing_id));
        let exchange = self
            .exchange(Method::PATCH, "update_listing", &path)
            .json(update);
        self.call(exchange).await
    }

    pub async fn buy(&self, request: &BuyRequest) -> CallResult<EmptyResponse> {
        let exchange = self
            .exchange(Method::POST, "buy", "/listings/buy")
            .json(request);
        self.call(exchange).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listings_query_defaults() {
        let q = ListingsQuery::default().pairs();
        assert_eq!(
            q,
            vec![
                ("type", "buy_now".to_string()),
                ("sort_by", "highest_discount".to_string()),
                ("limit", "40".to_string()),
            ]
        );
    }

    #[test]
    fn listings_query_filters() {
        let q = ListingsQuery {
            max_price: Some(1500),
            def_index: Some(7),
            paint_seed: vec![661, 955],
            limit: Some(10),
            ..Default::default()
        }
        .pairs();
        assert!(q.contains(&("max_price", "1500".into())));
        assert!(q.contains(&("def_index", "7".into())));
        assert!(q.contains(&("paint_seed", "661,955".into())));
        assert!(q.contains(&("limit", "10".into())));
        assert!(!q.iter().any(|(k, _)| *k == "min_price"));
    }

    #[test]
    fn failure_displays_underlying_error() {
        let f = Failure {
            envelope: EmptyResponse::default(),
            error: DispatchError::Cancelled,
        };
        assert_eq!(f.to_string(), "request cancelled");
        assert!(std::error::Error::source(&f).is_some());
    }
}
