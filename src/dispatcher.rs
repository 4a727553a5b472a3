// Copyright (C) 2025 Matías Salinas (support@fenden.com)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Per-request orchestration on the edge listener: admin-vhost gating,
//! module-proxy path detection, vanity-import discovery, and finally the
//! proxy/redirect engine. Each stage falls through to the next on a miss;
//! a host absent from the projection entirely is a 502.

use crate::error::EdgeError;
use crate::gomod::ModuleCache;
use crate::projection::Projection;
use crate::vanity;
use hyper::{Body, Request, Response, StatusCode};
use std::net::IpAddr;
use std::sync::Arc;

pub fn host_from_request(req: &Request<Body>) -> String {
    req.headers()
        .get(http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(|h| h.split(':').next().unwrap_or(h).to_string())
        .unwrap_or_default()
}

/// True when `ip` should be let through an allow-gated endpoint: the
/// loopback addresses are always accepted regardless of configuration,
/// matching [`crate::config::Config::admin_allow_list`]'s guarantee.
pub fn ip_allowed(ip: IpAddr, allow_list: &[String]) -> bool {
    if ip.is_loopback() {
        return true;
    }
    if allow_list.is_empty() {
        return true;
    }
    allow_list.iter().any(|a| a == &ip.to_string())
}

pub fn is_module_proxy_path(path: &str) -> bool {
    path.contains(crate::gomod::FS_PATH_DELIMITER)
}

pub struct DispatchContext {
    pub projection: Arc<Projection>,
    pub module_cache: Arc<ModuleCache>,
    pub admin_host: String,
    pub admin_allow_list: Vec<String>,
    pub gomod_disabled: bool,
    pub scheme: &'static str,
}

/// Handles one edge-listener request end to end.
pub async fn dispatch(
    ctx: &DispatchContext,
    req: Request<Body>,
    peer_ip: IpAddr,
) -> Result<Response<Body>, EdgeError> {
    let host = host_from_request(&req);

    if host.eq_ignore_ascii_case(&ctx.admin_host) {
        if !ip_allowed(peer_ip, &ctx.admin_allow_list) {
            return Ok(Response::builder()
                .status(StatusCode::FORBIDDEN)
                .body(Body::empty())
                .unwrap());
        }
        return Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::from("admin surface is served on the admin listener"))
            .unwrap());
    }

    let path = req.uri().path().to_string();

    if is_module_proxy_path(&path) {
        return serve_module_proxy(ctx, &path).await;
    }

    if req.method() == hyper::Method::GET {
        if let Some(pkg) = ctx.projection.vanity_lookup(&host, &path) {
            let import_path = format!("{host}{}", pkg.path.trim_start_matches('@'));
            let html = vanity::render_discovery_html(&import_path, &pkg);
            return Ok(Response::builder()
                .status(StatusCode::OK)
                .header(http::header::CONTENT_TYPE, "text/html; charset=utf-8")
                .body(Body::from(html))
                .unwrap());
        }
    }

    let proxy_host = match ctx.projection.proxy_host(&host) {
        Some(h) => h,
        None => {
            return Ok(Response::builder()
                .status(StatusCode::BAD_GATEWAY)
                .body(Body::from("no virtual host configured"))
                .unwrap());
        }
    };

    let rule = crate::proxy::dispatch(&proxy_host, req.method(), req.uri(), req.headers());
    let Some(rule) = rule else {
        return Ok(Response::builder()
            .status(StatusCode::BAD_GATEWAY)
            .body(Body::from("no rule matched and no terminal rule configured"))
            .unwrap());
    };

    crate::proxy::execute(rule, req, ctx.scheme, &host).await
}

async fn serve_module_proxy(ctx: &DispatchContext, path: &str) -> Result<Response<Body>, EdgeError> {
    ctx.module_cache.check_availability(ctx.gomod_disabled)?;
    let req = crate::gomod::parse_request(path.trim_start_matches('/'))?;

    let cache = ctx.module_cache.clone();
    let (content_type, body) = tokio::task::spawn_blocking(move || cache.serve(&req))
        .await
        .map_err(|e| EdgeError::Internal(format!("module proxy task panicked: {e}")))??;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(http::header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap())
}
