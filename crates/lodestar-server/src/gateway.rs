use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{boxed, Body, HttpBody, StreamBody},
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use reqwest::Url;

use crate::error::ApiError;
use crate::RESERVED_PATHS;

/// One reverse-proxy rule, fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRoute {
    pub name: String,
    pub prefix: String,
    pub upstream: String,
    pub rewrite_prefix: String,
}

impl GatewayRoute {
    /// Validates one configured entry. `rewrite` defaults to `prefix`.
    pub fn new(
        name: impl Into<String>,
        upstream: &str,
        prefix: &str,
        rewrite: Option<&str>,
    ) -> Result<Self, String> {
        let prefix = normalize_prefix(prefix)?;
        let shadows = |path: &&str| prefix_matches(&prefix, path) || prefix_matches(path, &prefix);
        if prefix == "/" || RESERVED_PATHS.iter().any(shadows) {
            return Err(format!("prefix {prefix} would shadow the discovery API"));
        }

        let url = Url::parse(upstream).map_err(|e| format!("invalid upstream {upstream:?}: {e}"))?;
        if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
            return Err(format!("upstream {upstream:?} is not an http(s) URL"));
        }

        let rewrite_prefix = match rewrite.map(str::trim).filter(|r| !r.is_empty()) {
            Some(rewrite) => normalize_prefix(rewrite)?,
            None => prefix.clone(),
        };

        Ok(Self {
            name: name.into(),
            prefix,
            upstream: upstream.trim_end_matches('/').to_string(),
            rewrite_prefix,
        })
    }

    /// Upstream URL for `path` and `query`, or `None` when the path is outside this prefix.
    pub fn target(&self, path: &str, query: Option<&str>) -> Option<String> {
        if !prefix_matches(&self.prefix, path) {
            return None;
        }
        let rest = &path[self.prefix.len()..];
        let mut target = format!("{}{}", self.upstream, join_path(&self.rewrite_prefix, rest));
        if let Some(query) = query {
            target.push('?');
            target.push_str(query);
        }
        Some(target)
    }
}

fn normalize_prefix(raw: &str) -> Result<String, String> {
    let raw = raw.trim();
    if !raw.starts_with('/') {
        return Err(format!("prefix {raw:?} must start with '/'"));
    }
    let trimmed = raw.trim_end_matches('/');
    Ok(if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() })
}

/// Segment-aware: `/api/core` covers `/api/core` and `/api/core/...` but not `/api/corex`.
fn prefix_matches(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return path.starts_with('/');
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

fn join_path(base: &str, rest: &str) -> String {
    match (base, rest) {
        ("/", "") => "/".to_string(),
        ("/", rest) => rest.to_string(),
        (base, rest) => format!("{base}{rest}"),
    }
}

/// Reads `GATEWAY_SERVICES` and the per-service `SERVICE_<NAME>_*` variables.
///
/// A declared service with missing or invalid settings is skipped with a
/// warning; it never prevents the remaining routes from being installed.
pub fn routes_from_lookup<F>(lookup: &F) -> Vec<GatewayRoute>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(declared) = lookup("GATEWAY_SERVICES") else {
        return Vec::new();
    };

    let mut routes = Vec::new();
    for service in declared.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let name = service.to_uppercase();
        let upstream = lookup(&format!("SERVICE_{name}_UPSTREAM"));
        let prefix = lookup(&format!("SERVICE_{name}_PREFIX"));
        let rewrite = lookup(&format!("SERVICE_{name}_REWRITE"));

        let (Some(upstream), Some(prefix)) = (upstream, prefix) else {
            tracing::warn!(service, "missing gateway upstream or prefix, route skipped");
            continue;
        };

        match GatewayRoute::new(service, &upstream, &prefix, rewrite.as_deref()) {
            Ok(route) => {
                tracing::info!(
                    service,
                    prefix = %route.prefix,
                    upstream = %route.upstream,
                    rewrite = %route.rewrite_prefix,
                    "gateway route configured"
                );
                routes.push(route);
            }
            Err(reason) => tracing::warn!(service, %reason, "invalid gateway route, skipped"),
        }
    }
    routes
}

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Static reverse proxy over the configured routes.
pub struct Gateway {
    routes: Vec<GatewayRoute>,
    client: reqwest::Client,
}

impl Gateway {
    pub fn new(mut routes: Vec<GatewayRoute>, timeout: Duration) -> Result<Self, reqwest::Error> {
        // Longest prefix first so nested prefixes win over their parents.
        routes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { routes, client })
    }

    pub fn routes(&self) -> &[GatewayRoute] {
        &self.routes
    }

    /// First route covering `path`, with the rewritten upstream URL.
    pub fn resolve(&self, path: &str, query: Option<&str>) -> Option<(&GatewayRoute, String)> {
        self.routes
            .iter()
            .find_map(|route| route.target(path, query).map(|target| (route, target)))
    }

    async fn forward(&self, target: &str, req: Request<Body>) -> Result<Response, ApiError> {
        let (parts, body) = req.into_parts();
        let mut headers = parts.headers;
        headers.remove(header::HOST);
        strip_hop_by_hop(&mut headers);

        let mut request = self.client.request(parts.method, target).headers(headers);
        if !body.is_end_stream() {
            request = request.body(reqwest::Body::wrap_stream(body));
        }
        let upstream = request.send().await?;

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_hop_by_hop(&mut headers);

        let mut response = Response::new(boxed(StreamBody::new(upstream.bytes_stream())));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// Middleware that diverts requests under a configured prefix to the upstream
/// and lets everything else through to the discovery routes.
pub async fn proxy(
    State(gateway): State<Arc<Gateway>>,
    req: Request<Body>,
    next: Next<Body>,
) -> Response {
    let Some((route, target)) = gateway.resolve(req.uri().path(), req.uri().query()) else {
        return next.run(req).await;
    };

    tracing::debug!(route = %route.name, method = %req.method(), %target, "forwarding");
    let response = match gateway.forward(&target, req).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(route = %route.name, %target, error = %e, "upstream request failed");
            e.into_response()
        }
    };

    metrics::counter!(
        "lodestar_gateway_requests_total",
        "route" => route.name.clone(),
        "status" => response.status().as_u16().to_string()
    )
    .increment(1);
    response
}
