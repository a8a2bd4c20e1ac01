//! HTTP surface of a node.
//!
//! | Route                  | Role   | Body                               |
//! |------------------------|--------|------------------------------------|
//! | `POST /v1/slice/push`  | peer   | raw slice or σ table               |
//! | `GET  /v1/slice/pull`  | peer   | raw slice                          |
//! | `POST /v1/ledger`      | ledger | JSON `{"method": .., "params": ..}`|
//! | `GET  /healthz`        | any    | `ok`                               |
//! | `GET  /metrics`        | any    | Prometheus text                    |
//!
//! Errors are returned as JSON [`ErrorBody`] with the status of their kind.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::crypto::aes::TAG_LEN;
use crate::error::{Error, ErrorBody, ErrorKind, Result};
use crate::ledger::rpc::{dispatch, LedgerCall};
use crate::ledger::{LedgerGateway, CONTRACT_MESSAGE_MAX_SIZE};
use crate::metrics;
use crate::peer::{PeerService, PullRequest, PushParams};
use crate::pipeline::DEFAULT_BLOCK_SIZE;

/// Upper bound of a pushed σ table.
pub const SIGMA_TABLE_MAX_SIZE: usize = 32 * 1024 * 1024;

/// Largest push body accepted for slices of `block_size` bytes.
pub fn push_limit(block_size: usize) -> usize {
    block_size.max(DEFAULT_BLOCK_SIZE) + TAG_LEN + SIGMA_TABLE_MAX_SIZE
}

/// Services exposed by this process. Absent roles answer 404.
#[derive(Clone)]
pub struct ServerState {
    pub peer: Option<Arc<PeerService>>,
    pub ledger: Option<Arc<dyn LedgerGateway>>,
    pub max_push_size: usize,
}

impl Default for ServerState {
    fn default() -> Self {
        Self {
            peer: None,
            ledger: None,
            max_push_size: push_limit(DEFAULT_BLOCK_SIZE),
        }
    }
}

/// Bind the listen address. Failing here is fatal for the process.
pub async fn bind(addr: &str) -> Result<TcpListener> {
    let parsed: SocketAddr = addr
        .parse()
        .map_err(|e| Error::config(format!("Invalid listen address {}: {}", addr, e)))?;
    TcpListener::bind(parsed)
        .await
        .map_err(|e| Error::with_source(ErrorKind::Config, format!("failed to bind {}", addr), e))
}

/// Serve on a bound listener until `shutdown` fires.
pub async fn serve_listener(
    listener: TcpListener,
    state: ServerState,
    shutdown: CancellationToken,
) -> Result<()> {
    info!("Server listening on {}", listener.local_addr()?);
    let state = Arc::new(state);
    loop {
        let (stream, peer_addr) = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Server shutting down");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok(a) => a,
                Err(e) => {
                    error!("Server accept error: {}", e);
                    continue;
                }
            },
        };
        let io = TokioIo::new(stream);
        let state = state.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let state = state.clone();
                async move { Ok::<_, Infallible>(route(&state, req).await) }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!(%peer_addr, "connection error: {}", e);
            }
        });
    }
}

async fn route(state: &ServerState, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let result = match (req.method(), req.uri().path()) {
        (&Method::GET, "/healthz") => Ok(text(StatusCode::OK, "ok")),
        (&Method::GET, "/metrics") => metrics::render().map(|(body, content_type)| {
            response(StatusCode::OK, &content_type, Bytes::from(body))
        }),
        (&Method::POST, "/v1/slice/push") => match &state.peer {
            Some(peer) => push(peer, req, state.max_push_size).await,
            None => Err(Error::not_found("this node does not store slices")),
        },
        (&Method::GET, "/v1/slice/pull") => match &state.peer {
            Some(peer) => pull(peer, req).await,
            None => Err(Error::not_found("this node does not store slices")),
        },
        (&Method::POST, "/v1/ledger") => match &state.ledger {
            Some(ledger) => ledger_call(ledger.as_ref(), req).await,
            None => Err(Error::not_found("this node does not serve a ledger")),
        },
        (_, path) => Err(Error::not_found(format!("no route for {}", path))),
    };
    result.unwrap_or_else(|e| error_response(&e))
}

async fn push(
    peer: &PeerService,
    req: Request<Incoming>,
    limit: usize,
) -> Result<Response<Full<Bytes>>> {
    let query = parse_query(req.uri().query())?;
    let params = PushParams {
        slice_id: required(&query, "slice_id")?,
        source_id: required(&query, "source_id")?,
        not_a_slice: query.get("not_a_slice").map(|v| v == "true").unwrap_or(false),
    };
    let body = Limited::new(req.into_body(), limit)
        .collect()
        .await
        .map_err(|e| Error::with_source(ErrorKind::Param, "push body too large or unreadable", e))?
        .to_bytes();
    peer.handle_push(&params, &body).await?;
    Ok(text(StatusCode::OK, "ok"))
}

async fn pull(peer: &PeerService, req: Request<Incoming>) -> Result<Response<Full<Bytes>>> {
    let query = parse_query(req.uri().query())?;
    let pull = PullRequest {
        slice_id: required(&query, "slice_id")?,
        file_id: required(&query, "file_id")?,
        timestamp: required(&query, "timestamp")?
            .parse()
            .map_err(|_| Error::param("timestamp must be an integer"))?,
        signature: hex::decode(required(&query, "signature")?)?,
    };
    let data = peer.handle_pull(&pull).await?;
    Ok(response(
        StatusCode::OK,
        "application/octet-stream",
        Bytes::from(data),
    ))
}

async fn ledger_call(
    ledger: &dyn LedgerGateway,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>> {
    let body = Limited::new(req.into_body(), CONTRACT_MESSAGE_MAX_SIZE as usize)
        .collect()
        .await
        .map_err(|e| Error::with_source(ErrorKind::Param, "ledger call too large or unreadable", e))?
        .to_bytes();
    let call: LedgerCall = serde_json::from_slice(&body)?;
    debug!(method = call.method(), "ledger call");
    let value = dispatch(ledger, call).await?;
    Ok(response(
        StatusCode::OK,
        "application/json",
        Bytes::from(serde_json::to_vec(&value)?),
    ))
}

fn parse_query(query: Option<&str>) -> Result<HashMap<String, String>> {
    let mut out = HashMap::new();
    for pair in query.unwrap_or_default().split('&').filter(|p| !p.is_empty()) {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        let v = urlencoding::decode(v)
            .map_err(|e| Error::with_source(ErrorKind::Param, "bad query encoding", e))?;
        out.insert(k.to_string(), v.into_owned());
    }
    Ok(out)
}

fn required(query: &HashMap<String, String>, key: &str) -> Result<String> {
    query
        .get(key)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| Error::param(format!("missing query parameter {}", key)))
}

fn response(status: StatusCode, content_type: &str, body: Bytes) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(body));
    *resp.status_mut() = status;
    if let Ok(v) = content_type.parse() {
        resp.headers_mut().insert(hyper::header::CONTENT_TYPE, v);
    }
    resp
}

fn text(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    response(status, "text/plain", Bytes::from_static(body.as_bytes()))
}

fn error_response(e: &Error) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(e.kind().http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = serde_json::to_vec(&ErrorBody::from(e)).unwrap_or_default();
    response(status, "application/json", Bytes::from(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query() {
        let q = parse_query(Some("slice_id=s%201&source_id=o&not_a_slice=true")).unwrap();
        assert_eq!(q["slice_id"], "s 1");
        assert_eq!(q["not_a_slice"], "true");
        assert_eq!(required(&q, "source_id").unwrap(), "o");
        assert!(required(&q, "file_id").unwrap_err().is(ErrorKind::Param));
        assert!(parse_query(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bind_rejects_taken_port_and_bad_address() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();
        let err = bind(&addr).await.unwrap_err();
        assert!(err.is(ErrorKind::Config), "{}", err);
        assert!(bind("not-an-address").await.unwrap_err().is(ErrorKind::Config));
        assert!(bind("127.0.0.1:0").await.is_ok());
    }

    #[test]
    fn test_push_limit_covers_block_and_tag() {
        assert_eq!(
            ServerState::default().max_push_size,
            DEFAULT_BLOCK_SIZE + TAG_LEN + SIGMA_TABLE_MAX_SIZE
        );
        assert_eq!(push_limit(1024), push_limit(DEFAULT_BLOCK_SIZE));
        assert_eq!(
            push_limit(64 * 1024 * 1024),
            64 * 1024 * 1024 + TAG_LEN + SIGMA_TABLE_MAX_SIZE
        );
    }

    #[test]
    fn test_error_response_status() {
        let resp = error_response(&Error::not_authorized("no"));
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let resp = error_response(&Error::expired("gone"));
        assert_eq!(resp.status(), StatusCode::GONE);
    }
}
