use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vicinity_server::{create_router, AppState, Config};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            eprintln!("Optional: VICINITY_LISTEN_ADDR (default: 0.0.0.0:3000)");
            eprintln!("Optional: VICINITY_NOTIFY_URL (default: log notifications only)");
            eprintln!("Optional: VICINITY_AUTOSTART, VICINITY_FIX_RATE_LIMIT_PER_SEC");
            eprintln!("Optional: VICINITY_EXIT_MARGIN_METERS, VICINITY_DEDUPE_COOLDOWN_SECS,");
            eprintln!("          VICINITY_RATE_LIMIT_PER_MINUTE, VICINITY_MIN_FIX_INTERVAL_SECS,");
            eprintln!("          VICINITY_MIN_DISPLACEMENT_METERS, VICINITY_WATCHDOG_TIMEOUT_SECS,");
            eprintln!("          VICINITY_SUPPRESS_LOW_CONFIDENCE");
            std::process::exit(1);
        }
    };

    tracing::info!("Starting Vicinity server");
    tracing::info!("Listen address: {}", config.listen_addr);
    tracing::info!(
        "Notifications: {}",
        config.notify_url.as_deref().unwrap_or("log only")
    );

    let state = AppState::new(&config);

    if config.autostart {
        if let Err(e) = state.controller.start().await {
            eprintln!("Failed to start tracking: {}", e);
            std::process::exit(1);
        }
    }

    // Forget idle clients of the fix rate limiter
    let limiter = state.fix_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            limiter.cleanup();
        }
    });

    let controller = state.controller.clone();
    let app = create_router(state).into_make_service_with_connect_info::<std::net::SocketAddr>();

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server running at http://{}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .expect("Server error");

    controller.stop().await;
    tracing::info!("Server stopped");
}
