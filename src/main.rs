//! Academy backend server entry point.

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use academy::adapters::email::{ResendConfig, ResendMailer};
use academy::adapters::http::billing::{billing_router, BillingAppState};
use academy::adapters::postgres::{
    PostgresCourseCatalog, PostgresLedgerReader, PostgresLedgerStore,
};
use academy::adapters::stripe::{StripeConfig, StripePaymentAdapter};
use academy::application::handlers::billing::PurchaseNotifier;
use academy::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    init_tracing(&config);

    let pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .connect(&config.database.url)
        .await?;

    if config.database.run_migrations {
        tracing::info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
    }

    let ledger = Arc::new(PostgresLedgerStore::new(pool.clone()));
    let ledger_reader = Arc::new(PostgresLedgerReader::new(pool.clone()));
    let catalog = Arc::new(PostgresCourseCatalog::new(pool.clone()));

    let stripe_config = StripeConfig::new(
        config.payment.stripe_api_key.clone(),
        config.payment.stripe_webhook_secret.clone(),
    )
    .with_require_livemode(config.is_production());
    let payment_provider = Arc::new(StripePaymentAdapter::new(stripe_config));

    let mailer = Arc::new(ResendMailer::new(ResendConfig::new(
        config.email.resend_api_key.clone(),
        config.email.from_header(),
    )));
    let notifier = Arc::new(PurchaseNotifier::new(
        catalog.clone(),
        mailer,
        config.server.public_base_url.clone(),
    ));

    let state = BillingAppState {
        ledger,
        ledger_reader,
        catalog,
        payment_provider,
        notifier,
        currency: config.payment.currency.clone(),
        reconcile_enabled: config.features.enable_return_reconciliation,
    };

    let app = Router::new()
        .nest("/api", billing_router())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(cors_layer(&config));

    let addr = config.server.socket_addr();
    tracing::info!(%addr, "Academy backend listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.server.log_level.clone()));

    if config.is_production() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .server
        .cors_origins_list()
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new().allow_origin(origins)
    }
}
