use anyhow::Context;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;
use weatherdeck_app::{AppState, Settings, bootstrap, router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("Failed to load settings")?;
    init_tracing(&settings);

    let ready = bootstrap(&settings).await?;

    let listener = tokio::net::TcpListener::bind(settings.bind_address())
        .await
        .with_context(|| format!("Failed to bind {}", settings.bind_address()))?;
    tracing::info!(address = %settings.bind_address(), "Listening");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                shutdown_tx.send(()).ok();
            }
            Err(e) => tracing::warn!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    let app = router(AppState {
        config: ready.config,
    });
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown(shutdown_rx))
        .await?;

    if let Some(refresh) = ready.refresh {
        refresh.abort();
    }
    Ok(())
}

fn init_tracing(settings: &Settings) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if settings.log.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown(signal: oneshot::Receiver<()>) {
    // a dropped sender means no signal handler; keep serving
    if signal.await.is_err() {
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
