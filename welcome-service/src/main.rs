use service_core::observability::init_tracing;
use tokio::signal;
use welcome_service::config::WelcomeConfig;
use welcome_service::startup::Application;

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = WelcomeConfig::load()?;
    init_tracing("welcome-service", &config.common.log_level);

    tracing::info!("Starting welcome-service v{}", env!("CARGO_PKG_VERSION"));

    let application = Application::build(config).await?;
    let shutdown = application.shutdown_token();

    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received");
        shutdown.cancel();
    });

    application.run_until_stopped().await?;
    tracing::info!("Welcome service stopped");
    Ok(())
}
