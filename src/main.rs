use {
    axum::{
        Router,
        extract::DefaultBodyLimit,
        routing::{get, post},
    },
    paydesk::{
        AppState,
        adapters::{card::CardAdapter, crypto_pay::CryptoPayAdapter, http, wallet::WalletAdapter},
        config::AppConfig,
        domain::{notify::TracingNotifier, provider::ProviderRegistry},
        services::{
            settlement::{Settlement, SettlementSettings},
            sweeper,
        },
    },
    sqlx::postgres::PgPoolOptions,
    std::{sync::Arc, time::Duration},
    tokio::{signal, sync::watch},
    tower_http::timeout::TimeoutLayer,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();
    let config = AppConfig::load();

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(3))
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    let registry = ProviderRegistry::new()
        .register(Arc::new(
            CryptoPayAdapter::new(&config.crypto_pay, config.provider_timeout)
                .expect("crypto-pay adapter"),
        ))
        .register(Arc::new(
            CardAdapter::new(&config.card, config.provider_timeout).expect("card adapter"),
        ))
        .register(Arc::new(
            WalletAdapter::new(&config.wallet, config.provider_timeout).expect("wallet adapter"),
        ));

    let settlement = Arc::new(Settlement::new(
        pool.clone(),
        registry,
        Arc::new(TracingNotifier),
        SettlementSettings {
            duplicate_guard: config.duplicate_guard,
            overpay_tolerance_cents: config.overpay_tolerance_cents,
        },
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper_handle = tokio::spawn(sweeper::run_sweeper(
        settlement.clone(),
        config.stale_payment_ttl,
        shutdown_rx,
    ));

    let state = AppState { pool, settlement };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/orders", post(http::create_order))
        .route("/orders/{id}/balance", get(http::order_balance))
        .route("/orders/{id}/status", post(http::set_order_status))
        .route("/payments", post(http::initiate_payment))
        .route("/payments/{id}", get(http::get_payment))
        .route("/payments/{id}/refund", post(http::refund_payment))
        .route("/payments/{id}/status", post(http::override_payment_status))
        .route("/callbacks/{provider}", post(http::provider_callback))
        .layer(DefaultBodyLimit::max(64 * 1024)) // provider callbacks are small JSON
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind listener");
    tracing::info!("listening on {}", config.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    shutdown_tx.send(true).ok();
    sweeper_handle.await.ok();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl+c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
