use std::process::ExitCode;

use mastery_backend::config::Config;
use mastery_backend::db::DatabaseProxy;
use mastery_backend::logging::init_tracing;
use mastery_backend::seed::seed_demo_catalog;
use mastery_backend::services::concepts::ConceptResolver;
use mastery_backend::state::AppState;

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            return ExitCode::FAILURE;
        }
    };
    let _log_guard = init_tracing(&config.log_level);
    let rating = config.rating.config();
    tracing::info!(
        k_factor = rating.k_factor,
        min = rating.min_mastery,
        max = rating.max_mastery,
        default = rating.default_mastery,
        "rating model loaded"
    );

    let db = match DatabaseProxy::from_env().await {
        Ok(db) => db,
        Err(err) => {
            tracing::error!(error = %err, "database initialization failed");
            return ExitCode::FAILURE;
        }
    };

    if std::env::args().any(|arg| arg == "--seed") {
        let resolver = ConceptResolver::new(
            db.mastery_store(),
            config.rating.default_concept_difficulty(),
        );
        if let Err(err) = seed_demo_catalog(&resolver, db.catalog().as_ref()).await {
            tracing::error!(error = %err, "demo catalog seed failed");
            db.close().await;
            return ExitCode::FAILURE;
        }
    }

    let state = AppState::from_proxy(
        &db,
        config.rating,
        config.selector,
        config.evaluation.clone(),
    );
    tracing::info!(url = state.evaluation().base_url(), "evaluation service configured");
    let app = mastery_backend::create_app(state);

    let addr = config.bind_addr();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%addr, error = %err, "bind listener failed");
            db.close().await;
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(%addr, backend = db.kind().as_str(), "mastery-backend listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    let exit = match server.await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "server error");
            ExitCode::FAILURE
        }
    };

    tracing::info!("HTTP server stopped, closing database");
    db.close().await;
    tracing::info!("Graceful shutdown complete");
    exit
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
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
