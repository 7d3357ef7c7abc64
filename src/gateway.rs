//! HTTP front end
//!
//! Requests carry the routing key in `?key=`. The peer owning the key keeps
//! a counter for it; any other peer proxies the request to the owner.
//!
//! - `GET /keys/increment?key=K`
//! - `GET /keys/decrement?key=K`
//! - `GET /keys/value?key=K`
//! - `GET /status`

use crate::common::{Error, HttpConfig, Result};
use crate::coordinator::{Coordinator, Owner};
use crate::transport::Transport;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CounterOp {
    Increment,
    Decrement,
    Value,
}

impl CounterOp {
    fn parse(action: &str) -> Option<Self> {
        match action {
            "increment" => Some(CounterOp::Increment),
            "decrement" => Some(CounterOp::Decrement),
            "value" => Some(CounterOp::Value),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct KeyQuery {
    pub key: String,
}

pub struct GatewayState<T> {
    coordinator: Coordinator<T>,
    counters: Arc<Mutex<HashMap<String, i64>>>,
    client: reqwest::Client,
    peer_port: u16,
}

impl<T> Clone for GatewayState<T> {
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
            counters: self.counters.clone(),
            client: self.client.clone(),
            peer_port: self.peer_port,
        }
    }
}

impl<T: Transport> GatewayState<T> {
    pub fn new(coordinator: Coordinator<T>, config: &HttpConfig) -> Self {
        Self {
            coordinator,
            counters: Arc::new(Mutex::new(HashMap::new())),
            client: reqwest::Client::new(),
            peer_port: config.peer_port,
        }
    }

    fn apply(&self, op: CounterOp, key: &str) -> i64 {
        let mut counters = self.counters.lock();
        let current = counters.entry(key.to_string()).or_insert(0);
        match op {
            CounterOp::Increment => *current += 1,
            CounterOp::Decrement => *current -= 1,
            CounterOp::Value => {}
        }
        *current
    }

    async fn proxy(&self, owner: SocketAddr, uri: &Uri) -> Result<Response> {
        let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        let url = format!("http://{}:{}{}", owner.ip(), self.peer_port, path);
        tracing::info!("Redirect: {}", url);

        let upstream = self.client.get(&url).send().await?;
        let status =
            StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let body = upstream.text().await?;
        Ok((status, body).into_response())
    }
}

pub fn create_router<T: Transport>(state: GatewayState<T>) -> Router {
    Router::new()
        .route("/keys/:action", get(keys::<T>))
        .route("/status", get(status::<T>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn error_response(err: Error) -> Response {
    if err.is_retryable() {
        tracing::warn!("Request deferred: {}", err);
        return (
            err.to_http_status(),
            [(header::RETRY_AFTER, "1")],
            err.to_string(),
        )
            .into_response();
    }
    tracing::error!("Request failed: {}", err);
    (err.to_http_status(), err.to_string()).into_response()
}

async fn keys<T: Transport>(
    State(state): State<GatewayState<T>>,
    Path(action): Path<String>,
    Query(query): Query<KeyQuery>,
    uri: Uri,
) -> Response {
    let Some(op) = CounterOp::parse(&action) else {
        return (StatusCode::NOT_FOUND, format!("NOT FOUND: {}", uri.path())).into_response();
    };

    let cancel = CancellationToken::new();
    match state.coordinator.check_key(&cancel, &query.key).await {
        Ok(Owner::Mine) => {
            let current = state.apply(op, &query.key);
            (
                StatusCode::OK,
                format!("CURRENT FOR [{}]: {}", query.key, current),
            )
                .into_response()
        }
        Ok(Owner::Peer(addr)) => match state.proxy(addr, &uri).await {
            Ok(response) => response,
            Err(e) => error_response(e),
        },
        Err(e) => error_response(e),
    }
}

async fn status<T: Transport>(State(state): State<GatewayState<T>>) -> impl IntoResponse {
    let coordinator = &state.coordinator;
    Json(json!({
        "identity": coordinator.key(),
        "state": coordinator.state().to_string(),
        "armed": coordinator.is_armed(),
        "peers": coordinator.peer_count(),
        "owned_keys": coordinator.owned_keys().len(),
        "version": crate::VERSION,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_op_parse() {
        assert_eq!(CounterOp::parse("increment"), Some(CounterOp::Increment));
        assert_eq!(CounterOp::parse("decrement"), Some(CounterOp::Decrement));
        assert_eq!(CounterOp::parse("value"), Some(CounterOp::Value));
        assert_eq!(CounterOp::parse("reset"), None);
    }

    #[test]
    fn test_counters() {
        let net = crate::transport::MemoryNetwork::new();
        let state = GatewayState::new(Coordinator::new(net.endpoint()), &HttpConfig::default());
        assert_eq!(state.apply(CounterOp::Increment, "a"), 1);
        assert_eq!(state.apply(CounterOp::Increment, "a"), 2);
        assert_eq!(state.apply(CounterOp::Decrement, "a"), 1);
        assert_eq!(state.apply(CounterOp::Value, "a"), 1);
        assert_eq!(state.apply(CounterOp::Value, "b"), 0);
    }

    #[test]
    fn test_retryable_errors_carry_retry_after() {
        let response = error_response(Error::NotReady);
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");

        let response = error_response(Error::KeyTooLong { len: 200, max: 128 });
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }
}
