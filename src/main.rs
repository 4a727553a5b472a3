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

// ----------------------
//  Module declarations
// ----------------------
// These are internal modules for handling the proxy/redirect engine,
// the vanity-import radix tree, the module proxy cache, the persistent
// store, and the configuration projection built on top of it.
mod admin;
mod config;
mod dispatcher;
mod error;
mod gomod;
mod models;
mod projection;
mod proxy;
mod store;
mod vanity;

// ----------------------
// External dependencies
// ----------------------
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use axum::{Router, routing::get};
use hyper::{Body, Request, Server};
use std::{net::SocketAddr, process::exit, sync::Arc};

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

// ----------------------
// Internal dependencies
// ----------------------
use crate::config::{CONFIG, Config};
use crate::dispatcher::DispatchContext;
use crate::gomod::ModuleCache;
use crate::gomod::toolchain::ProcessToolchainRunner;
use crate::projection::Projection;
use crate::store::Store;
use metrics_exporter_prometheus::PrometheusBuilder;

/// ----------------------------
/// CLI ARGUMENT STRUCTURE
/// ----------------------------
/// Defines CLI arguments that can be passed to the binary, such as the
/// path to the configuration file. Defaults to "config.yaml" if not
/// provided. `generate securekeys` prints a fresh set of session and
/// anti-CSRF key material for pasting into the config file.
#[derive(Parser, Debug)]
#[command(
    name = "edgevanity",
    version = "0.1.0",
    author = "Matías Salinas Contreras <support@fenden.com>",
    about = "Edge server fronting vanity imports, a Go module proxy cache, and reverse-proxy virtual hosts"
)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "config.yaml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Key/secret generation helpers.
    Generate {
        #[command(subcommand)]
        kind: GenerateKind,
    },
}

#[derive(Subcommand, Debug)]
enum GenerateKind {
    /// Prints fresh session + anti-CSRF signing/encryption keys.
    Securekeys,
}

/// ----------------------------
/// LOGGING INITIALIZATION
/// ----------------------------
/// Initializes structured logging using the `LOG_LEVEL` environment
/// variable. Falls back to "info" if not set.
fn init_logging(admin_host: &str) {
    let filter = EnvFilter::try_new(std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("🚀 Logging initialized for admin host: {admin_host}");
}

fn print_securekeys() {
    println!("security:");
    println!("  session:");
    println!("    sign_key: {}", random_hex32());
    println!("    enc_key: {}", random_hex32());
    println!("  anti_csrf:");
    println!("    sign_key: {}", random_hex32());
    println!("    enc_key: {}", random_hex32());
}

/// A 32-byte hex string seeded from the system clock and process id.
/// Good enough for local scaffolding; operators should treat generated
/// keys as a starting point, not a vault secret.
fn random_hex32() -> String {
    use std::hash::{Hash, Hasher};
    use std::time::{SystemTime, UNIX_EPOCH};

    let seed_base = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
        ^ (std::process::id() as u128);

    let mut bytes = [0u8; 32];
    for (i, b) in bytes.iter_mut().enumerate() {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        (seed_base, i).hash(&mut hasher);
        *b = (hasher.finish() & 0xff) as u8;
    }
    hex::encode(bytes)
}

/// ---------------------------
/// APPLICATION ENTRY POINT
/// ---------------------------
#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() {
    // ------------------------------------------------------
    // 1. Parse CLI arguments (e.g., --config=config.prod.yaml)
    // ------------------------------------------------------
    let args = Args::parse();

    if let Some(Command::Generate {
        kind: GenerateKind::Securekeys,
    }) = args.command
    {
        print_securekeys();
        return;
    }

    // ------------------------------------------------------
    // 2. Load configuration from YAML file
    // ------------------------------------------------------
    let config = match Config::from_file(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("❌ Failed to load config from '{}': {e}", args.config);
            exit(1);
        }
    };

    // ------------------------------------------------------
    // 3. Initialize the logger and the Prometheus recorder
    // ------------------------------------------------------
    init_logging(&config.admin.host);
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("❌ Failed to install Prometheus recorder");

    // ------------------------------------------------------
    // 4. Set global CONFIG (OnceCell) for use across modules
    // ------------------------------------------------------
    let admin_allow_list = config.admin_allow_list();
    let admin_host = config.admin.host.clone();
    let gomod_disabled = config.admin.disable.gomod_repo;
    let server_header = (!config.server.header.is_empty()).then(|| config.server.header.clone());
    let edge_port = config.server.port;
    let admin_port = config.admin.port;
    let data_dir = config.admin.data_store.directory.clone();

    CONFIG.set(config).expect("❌ CONFIG was already initialized");

    // ------------------------------------------------------
    // 5. Open the persistent store and rebuild the in-memory
    //    configuration projection from it.
    // ------------------------------------------------------
    let store = match Store::open(&data_dir) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("❌ Failed to open persistent store at '{data_dir}': {e}");
            exit(1);
        }
    };

    let (projection, load_errors) = match Projection::load(store.clone(), server_header) {
        Ok(p) => p,
        Err(e) => {
            error!("❌ Failed to load configuration projection: {e}");
            exit(1);
        }
    };
    for (host, e) in load_errors {
        warn!("⚠️ Skipping host '{host}' with invalid configuration: {e}");
    }
    let projection = Arc::new(projection);

    let module_cache = Arc::new(ModuleCache::new(
        projection.module_settings(),
        Arc::new(ProcessToolchainRunner),
        store,
    ));

    // ------------------------------------------------------
    // 6. Build the edge dispatch context and Axum routers.
    // ------------------------------------------------------
    let dispatch_ctx = Arc::new(DispatchContext {
        projection: projection.clone(),
        module_cache,
        admin_host,
        admin_allow_list: admin_allow_list.clone(),
        gomod_disabled,
        scheme: "https",
    });

    let edge_router = Router::new()
        .route("/", get(edge_handler).post(edge_handler))
        .route("/*path", get(edge_handler).post(edge_handler).put(edge_handler).delete(edge_handler))
        .with_state(dispatch_ctx);

    let admin_state = admin::AdminState {
        projection,
        allow_list: admin_allow_list,
    };
    let admin_router = admin::router(admin_state)
        .route("/metrics", get(move || async move { handle.render() }));

    // ------------------------------------------------------
    // 7. Bind both listeners and serve concurrently.
    // ------------------------------------------------------
    let edge_addr = SocketAddr::from(([0, 0, 0, 0], edge_port));
    let admin_addr = SocketAddr::from(([0, 0, 0, 0], admin_port));

    info!("🚀 Edge listening at http://{}", edge_addr);
    info!(
        "🛠 Admin API listening at http://{} | Metrics at http://{}/metrics",
        admin_addr, admin_addr
    );

    let edge_server = Server::bind(&edge_addr)
        .serve(edge_router.into_make_service_with_connect_info::<SocketAddr>());
    let admin_server = Server::bind(&admin_addr)
        .serve(admin_router.into_make_service_with_connect_info::<SocketAddr>());

    let (edge_result, admin_result) = tokio::join!(edge_server, admin_server);

    if let Err(e) = edge_result {
        error!("❌ Edge server exited with error: {}", e);
    }
    if let Err(e) = admin_result {
        error!("❌ Admin server exited with error: {}", e);
    }
}

async fn edge_handler(
    State(ctx): State<Arc<DispatchContext>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request<Body>,
) -> impl IntoResponse {
    match dispatcher::dispatch(&ctx, req, addr.ip()).await {
        Ok(resp) => resp.into_response(),
        Err(e) => e.into_response(),
    }
}
