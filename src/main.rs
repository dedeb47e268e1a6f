//! Payment gate HTTP entrypoint.
//!
//! Serves resources behind the HTTP 402 protocol and settles them against finalized
//! `Balances.Transfer` events read through a light-client gateway.
//!
//! Endpoints:
//! - `POST /verify` – Verify a transaction or block hash against a recipient and amount
//! - `POST /enroll/{course_id}` – Course enrollment, 402 until paid
//! - `GET /premium` – Per-request priced resource, proof in the `X-Payment` header
//! - `GET /payment-info/{course_id}` – Payment instructions for a course
//! - `GET /tx-to-block/{tx_hash}` – Locate the finalized block holding a transaction
//! - `GET /health` – Latest finalized block
//! - `GET /debug/{block_hash}` – Dump a block's events
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `LIGHT_CLIENT_URL` (required) and the other variables listed in [`from_env`]
//! - `OTEL_*` variables enable trace and metric export

use axum::Router;
use axum::http::Method;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors;

use crate::chain::{LazyLightClient, RemoteConnector};
use crate::from_env::GateConfig;
use crate::gate::PaymentGate;
use crate::sig_down::SigDown;
use crate::telemetry::Telemetry;

mod address;
mod chain;
mod from_env;
mod gate;
mod handlers;
mod normalize;
mod resolver;
mod sig_down;
mod telemetry;
mod types;
mod verifier;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let (telemetry, telemetry_error) = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register();
    if let Some(e) = telemetry_error {
        tracing::warn!(error = %e, "Falling back to console logging");
    }

    let config = match GateConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    // The light client bootstraps on the first request that needs it.
    let light_client = Arc::new(LazyLightClient::new(RemoteConnector {
        base_url: config.light_client_url.clone(),
        timeout: config.light_client_timeout,
        serialize: config.serialize_light_client,
    }));
    let gate = match PaymentGate::new(light_client, config.gate.clone()) {
        Ok(gate) => gate,
        Err(e) => {
            tracing::error!("Default recipient cannot be decoded: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(
        network = %config.gate.network,
        default_recipient = %config.gate.default_recipient,
        default_recipient_hex = %gate.default_recipient_hex(),
        light_client = %config.light_client_url,
        "Payment gate configured"
    );
    let axum_state = Arc::new(gate);

    let http_endpoints = Router::new()
        .merge(handlers::routes().with_state(axum_state))
        .layer(telemetry.http_tracing())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host, config.port);
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        });

    let sig_down = SigDown::try_new()?;
    let axum_cancellation_token = sig_down.cancellation_token();
    let axum_graceful_shutdown = async move { axum_cancellation_token.cancelled().await };
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(axum_graceful_shutdown)
        .await?;

    Ok(())
}
