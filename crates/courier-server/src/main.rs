use courier_jobs::engine;
use courier_server::config::{self, Environment, Settings};
use courier_server::{telemetry, AppState, Router, Server, StartupError};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        tracing::error!("Courier exited with an error: {}", err);
        eprintln!("courier: {}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    config::load_dotenv();
    let environment = Environment::current();
    telemetry::init(&environment);

    let settings = Settings::from_env()?;
    tracing::info!(environment = %environment, bind_addr = %settings.bind_addr, "Starting Courier");

    let listener = TcpListener::bind(&settings.bind_addr).await?;
    let engine_config = settings.engine_config();
    let state = AppState::from_settings(settings).await?;
    let router = Router::api().map_err(|e| StartupError::Io(std::io::Error::other(e)))?;

    let mut engine = engine::start(&state.queue, engine_config);

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(Server::new(router, state).run(listener, async {
        let _ = stop_rx.await;
    }));

    let (outcome, server_running) = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            (Ok(()), true)
        }
        err = engine.failed() => {
            tracing::error!("Job engine failed: {}", err);
            (Err(StartupError::Jobs(err)), true)
        }
        joined = &mut server => {
            let err = match joined {
                Ok(Ok(())) => std::io::Error::other("server stopped unexpectedly"),
                Ok(Err(err)) => err,
                Err(err) => std::io::Error::other(err),
            };
            (Err(StartupError::Io(err)), false)
        }
    };

    // Stop taking submissions before the workers wind down
    if server_running {
        let _ = stop_tx.send(());
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!("Server error: {}", err),
            Err(err) => tracing::error!("Server task panicked: {}", err),
        }
    }

    if let Err(err) = engine.shutdown().await {
        tracing::warn!("Job engine stopped with an error: {}", err);
    } else {
        tracing::info!("Courier stopped");
    }
    outcome
}
