//! HTTP discovery shim.
//!
//! Automation clients bootstrap by fetching `/json/version` or `/json` to
//! learn where the protocol socket lives. Served verbatim, those documents
//! would point clients straight at the browser's own listener, bypassing the
//! relay. These handlers synthesize or rewrite the documents so every
//! advertised socket address points back at this proxy instead.

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use metrics::counter;
use serde_json::{Map, Value};
use tracing::{error, warn};
use url::Url;

use crate::error::DiscoveryError;
use crate::metrics::{DISCOVERY_REQUESTS_TOTAL, DISCOVERY_UPSTREAM_FAILURES_TOTAL};
use crate::server::ProxyState;

/// A single debuggable target as reported by the browser.
type Target = Map<String, Value>;

/// Keys within a target whose values embed the protocol socket address.
const REWRITTEN_KEYS: [&str; 2] = ["webSocketDebuggerUrl", "devtoolsFrontendUrl"];

/// `GET /json/version`: synthesized version document.
///
/// Only `webSocketDebuggerUrl` is populated, pointing at the host the client
/// used to reach us. Clients treat the other version fields as optional.
pub async fn version(State(state): State<ProxyState>, headers: HeaderMap) -> Response {
    counter!(DISCOVERY_REQUESTS_TOTAL, "endpoint" => "version").increment(1);
    if state.registry.current().is_none() {
        return service_unavailable();
    }
    let proxy_ws = format!("ws://{}", request_host(&headers));
    Json(serde_json::json!({ "webSocketDebuggerUrl": proxy_ws })).into_response()
}

/// `GET /json` and `/json/list`: proxied and rewritten target list.
pub async fn targets(State(state): State<ProxyState>, headers: HeaderMap) -> Response {
    counter!(DISCOVERY_REQUESTS_TOTAL, "endpoint" => "list").increment(1);
    let Some(endpoint) = state.registry.current() else {
        return service_unavailable();
    };
    let Some(upstream_host) = endpoint_host(&endpoint) else {
        error!(endpoint, "registered endpoint has no host");
        return (StatusCode::INTERNAL_SERVER_ERROR, "invalid upstream").into_response();
    };
    match fetch_and_rewrite(&state.http, &upstream_host, &request_host(&headers)).await {
        Ok(list) => Json(list).into_response(),
        Err(err) => {
            counter!(DISCOVERY_UPSTREAM_FAILURES_TOTAL).increment(1);
            error!(error = %err, upstream_host, "target discovery failed");
            (StatusCode::BAD_GATEWAY, err.to_string()).into_response()
        }
    }
}

fn service_unavailable() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, "upstream not ready").into_response()
}

/// The host the client addressed, taken from the Host header.
fn request_host(headers: &HeaderMap) -> String {
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost")
        .to_owned()
}

/// `host[:port]` of a registered endpoint address.
fn endpoint_host(endpoint: &str) -> Option<String> {
    let parsed = Url::parse(endpoint).ok()?;
    let authority = authority_of(&parsed);
    if authority.is_empty() {
        None
    } else {
        Some(authority)
    }
}

/// Fetch the browser's target list and point its socket URLs at the proxy.
async fn fetch_and_rewrite(
    http: &reqwest::Client,
    upstream_host: &str,
    proxy_host: &str,
) -> Result<Vec<Target>, DiscoveryError> {
    let url = format!("http://{upstream_host}/json");
    let resp = http
        .get(&url)
        .send()
        .await
        .map_err(|e| DiscoveryError::Fetch(e.to_string()))?;
    let status = resp.status();
    if !status.is_success() {
        warn!(status = status.as_u16(), url, "browser rejected target list fetch");
        return Err(DiscoveryError::UpstreamStatus {
            status: status.as_u16(),
        });
    }
    let mut list: Vec<Target> = resp
        .json()
        .await
        .map_err(|e| DiscoveryError::Decode(e.to_string()))?;

    for target in &mut list {
        for key in REWRITTEN_KEYS {
            if let Some(Value::String(raw)) = target.get(key) {
                let rewritten = rewrite_ws_url(raw, upstream_host, proxy_host);
                let _ = target.insert(key.to_owned(), Value::String(rewritten));
            }
        }
    }
    Ok(list)
}

/// Replace the browser's authority with the proxy's wherever a URL embeds
/// the protocol socket address.
///
/// Two shapes occur in practice: an absolute `ws://` URL whose authority is
/// the browser's, and a frontend URL carrying the socket address in a `ws=`
/// query parameter (scheme-less, so `host:port/path`). The frontend URL is
/// often a relative path, which `Url::parse` rejects; for those only the
/// query can embed the address, so it is rewritten on the raw string. A URL
/// matching both shapes gets both rewrites. Unrecognized values pass through
/// untouched, as do all other query parameters.
pub fn rewrite_ws_url(raw: &str, upstream_host: &str, proxy_host: &str) -> String {
    let Ok(mut parsed) = Url::parse(raw) else {
        return match raw.split_once('?') {
            Some((path, query)) if query_embeds_host(query, upstream_host) => {
                format!("{path}?{}", rewrite_ws_param(query, upstream_host, proxy_host))
            }
            _ => raw.to_owned(),
        };
    };

    let mut rewritten = false;
    if authority_of(&parsed) == upstream_host {
        if set_authority(&mut parsed, proxy_host).is_err() {
            return raw.to_owned();
        }
        rewritten = true;
    }
    if let Some(query) = parsed.query() {
        if query_embeds_host(query, upstream_host) {
            let replaced = rewrite_ws_param(query, upstream_host, proxy_host);
            parsed.set_query(Some(&replaced));
            rewritten = true;
        }
    }

    if rewritten {
        parsed.to_string()
    } else {
        raw.to_owned()
    }
}

/// Whether a raw query string carries a `ws=` value addressing `upstream_host`.
fn query_embeds_host(query: &str, upstream_host: &str) -> bool {
    query.split('&').any(|seg| {
        seg.strip_prefix("ws=")
            .is_some_and(|v| v.starts_with(upstream_host))
    })
}

/// Rewrite only the `ws=` segment of a raw query string, leaving every other
/// segment byte-for-byte intact.
fn rewrite_ws_param(query: &str, upstream_host: &str, proxy_host: &str) -> String {
    query
        .split('&')
        .map(|seg| {
            if let Some(value) = seg.strip_prefix("ws=") {
                if let Some(rest) = value.strip_prefix(upstream_host) {
                    return format!("ws={proxy_host}{rest}");
                }
            }
            seg.to_owned()
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn authority_of(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_owned(),
        _ => String::new(),
    }
}

fn set_authority(url: &mut Url, authority: &str) -> Result<(), ()> {
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u16>() {
            Ok(port) => (host, Some(port)),
            Err(_) => (authority, None),
        },
        None => (authority, None),
    };
    url.set_host(Some(host)).map_err(|_| ())?;
    url.set_port(port).map_err(|_| ())?;
    Ok(())
}
