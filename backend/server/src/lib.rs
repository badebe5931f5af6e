//! Documentation of a multi-tenant points leaderboard.
//!
//! # General Infrastructure
//! - Accounts register, then add the people they want to track ("tracked users")
//! - Any account can claim points for a tracked user, each claim is a random 1 to 10 award
//! - Every claim lands in a ledger and on the claiming account's history
//! - History is read back newest first, joined with each tracked user's current total
//!
//!
//!
//! # Routes
//!
//! | Method | Path | Auth | Success |
//! |---|---|---|---|
//! | POST | `/api/users/register` | no | 200 + session |
//! | POST | `/api/users/login` | no | 200 + session |
//! | POST | `/api/users/logout` | yes | 200, cookie cleared |
//! | POST | `/api/users/add` | yes | 201 tracked user |
//! | GET | `/api/users/all` | yes | 200 tracked users, most points first |
//! | GET | `/api/users/history` | yes | 200 claim history |
//! | POST | `/api/claims/claim-points?to=<id>` | yes | 201 claim |
//!
//! Every body is `{ success, data?, message? }`.
//!
//!
//!
//! # Notes
//!
//! ## Consistency
//! A claim writes three things: ledger entry, tracked user total, account history. Anything
//! that can fail is checked first, then the three go out as one block (see [`store`]). A
//! failed claim leaves nothing behind.
//!
//! ## Live join
//! History rows show the tracked user's total as of the read, not as of the claim. Two rows
//! for the same tracked user always show the same number.
//!
//! ## Open to everyone
//! Claims do not check that the tracked user belongs to the caller. The leaderboard is
//! global in that sense and that is kept as is.
//!
//!
//!
//! # Setup
//!
//! Run against Redis.
//! ```sh
//! REDIS_URL=redis://localhost:6379 SESSION_SECRET=change-me cargo run
//! ```
//!
//! Run without Redis.
//! ```sh
//! STORE=memory SESSION_SECRET=change-me COOKIE_SECURE=false cargo run
//! ```
//!
//! Log levels come from `RUST_LOG`.
//! ```sh
//! RUST_LOG=server=debug,tower_http=info cargo run
//! ```
use std::{sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    Router,
    http::{
        HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod claims;
pub mod config;
pub mod database;
pub mod error;
pub mod history;
pub mod models;
pub mod registry;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils;

use routes::{
    add_user_handler, all_users_handler, claim_points_handler, history_handler, login_handler,
    logout_handler, register_handler,
};
use state::State;

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = State::new().await?;

    info!("Starting server...");

    let address = format!("0.0.0.0:{}", state.config.port);
    let app = app(state);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server stopped unexpectedly")?;

    info!("Server shutting down...");

    Ok(())
}

pub fn app(state: Arc<State>) -> Router {
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    if let Some(origin) = &state.config.cors_origin {
        match HeaderValue::from_str(origin) {
            Ok(origin) => cors = cors.allow_origin(origin).allow_credentials(true),
            Err(e) => warn!("Ignoring CORS_ORIGIN {origin:?}: {e}"),
        }
    }

    let users = Router::new()
        .route("/register", post(register_handler))
        .route("/login", post(login_handler))
        .route("/logout", post(logout_handler))
        .route("/add", post(add_user_handler))
        .route("/all", get(all_users_handler))
        .route("/history", get(history_handler));

    let claims = Router::new().route("/claim-points", post(claim_points_handler));

    Router::new()
        .nest("/api/users", users)
        .nest("/api/claims", claims)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
