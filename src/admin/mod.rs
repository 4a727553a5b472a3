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

//! Minimal JSON admin API exercising the configuration projection's
//! mutation surface. Every route returns the same success/failure
//! envelope and is gated by the admin listener's source-IP allow-list.

use crate::dispatcher::ip_allowed;
use crate::models::{ModuleSettings, ProxyRule, VanityPackage};
use crate::projection::Projection;
use axum::extract::{ConnectInfo, Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Clone)]
pub struct AdminState {
    pub projection: Arc<Projection>,
    pub allow_list: Vec<String>,
}

#[derive(Serialize)]
struct Success {
    message: &'static str,
}

fn ok() -> Response {
    Json(Success { message: "success" }).into_response()
}

fn forbidden() -> Response {
    (
        axum::http::StatusCode::FORBIDDEN,
        Json(Success { message: "failed" }),
    )
        .into_response()
}

fn gate(state: &AdminState, addr: SocketAddr) -> Result<(), Response> {
    if ip_allowed(addr.ip(), &state.allow_list) {
        Ok(())
    } else {
        Err(forbidden())
    }
}

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/api/hosts/:host/rules", post(add_rule))
        .route("/admin/api/hosts/:host/rules/:index", put(update_rule))
        .route("/admin/api/hosts/:host/rules/:index", delete(del_rule))
        .route("/admin/api/hosts/:host/vanities", post(add_vanity))
        .route("/admin/api/hosts/:host/vanities/:path", delete(del_vanity))
        .route("/admin/api/hosts/:host/import", post(import_host))
        .route("/admin/api/gomod/settings", put(save_gomod_settings))
        .route("/admin/api/gomod/stats", get(gomod_stats))
        .with_state(state)
}

async fn add_rule(
    State(state): State<AdminState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(host): Path<String>,
    Json(rule): Json<ProxyRule>,
) -> Response {
    if let Err(resp) = gate(&state, addr) {
        return resp;
    }
    match state.projection.add_rule(&host, rule) {
        Ok(()) => ok(),
        Err(e) => e.into_response(),
    }
}

async fn update_rule(
    State(state): State<AdminState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path((host, index)): Path<(String, usize)>,
    Json(rule): Json<ProxyRule>,
) -> Response {
    if let Err(resp) = gate(&state, addr) {
        return resp;
    }
    match state.projection.update_rule(&host, index, rule) {
        Ok(()) => ok(),
        Err(e) => e.into_response(),
    }
}

async fn del_rule(
    State(state): State<AdminState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path((host, index)): Path<(String, usize)>,
) -> Response {
    if let Err(resp) = gate(&state, addr) {
        return resp;
    }
    match state.projection.del_rule(&host, index) {
        Ok(()) => ok(),
        Err(e) => e.into_response(),
    }
}

async fn add_vanity(
    State(state): State<AdminState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(host): Path<String>,
    Json(package): Json<VanityPackage>,
) -> Response {
    if let Err(resp) = gate(&state, addr) {
        return resp;
    }
    match state.projection.add_package(&host, package) {
        Ok(()) => ok(),
        Err(e) => e.into_response(),
    }
}

async fn del_vanity(
    State(state): State<AdminState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path((host, path)): Path<(String, String)>,
) -> Response {
    if let Err(resp) = gate(&state, addr) {
        return resp;
    }
    let path = format!("/{path}");
    match state.projection.del_package(&host, &path) {
        Ok(()) => ok(),
        Err(e) => e.into_response(),
    }
}

#[derive(serde::Deserialize)]
struct ImportBody {
    rules: Vec<ProxyRule>,
}

async fn import_host(
    State(state): State<AdminState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(host): Path<String>,
    Json(body): Json<ImportBody>,
) -> Response {
    if let Err(resp) = gate(&state, addr) {
        return resp;
    }
    match state.projection.import_host(&host, body.rules) {
        Ok(()) => ok(),
        Err(e) => e.into_response(),
    }
}

async fn save_gomod_settings(
    State(state): State<AdminState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(settings): Json<ModuleSettings>,
) -> Response {
    if let Err(resp) = gate(&state, addr) {
        return resp;
    }
    match state.projection.save_module_settings(settings) {
        Ok(()) => ok(),
        Err(e) => e.into_response(),
    }
}

async fn gomod_stats(
    State(state): State<AdminState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    if let Err(resp) = gate(&state, addr) {
        return resp;
    }
    Json(state.projection.module_settings()).into_response()
}
