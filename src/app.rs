use crate::camera::{Camera, CameraConstraints, CameraDevice};
use crate::command::{dispatch, Command};
use crate::config::{CameraConfig, Config};
use crate::detector::LogoDetector;
use crate::page::{ConsoleDisplay, Display, Page};
use crate::prediction::PredictionClient;
use crate::wallet::Wallet;

use std::sync::Arc;
use tokio::{
    io::{self, AsyncBufReadExt, BufReader},
    signal,
    task::JoinSet,
};

pub async fn start_app(config: Config) -> anyhow::Result<()> {
    let display: Arc<dyn Display> = Arc::new(ConsoleDisplay);
    let page = Page::new(display, config.element_ids.clone());

    let camera = Camera::new(
        camera_device(&config.camera),
        CameraConstraints::from_config(&config.camera),
    );

    let prediction = match PredictionClient::new(&config.backend) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Failed to initialize prediction client: {:?}", e);
            return Err(e.into());
        }
    };

    let wallet = Wallet::from_config(config.wallet.as_ref(), config.contract.as_ref());
    let detector = Arc::new(LogoDetector::new(
        page,
        camera,
        prediction,
        wallet,
        &config.backend,
    ));

    // A camera failure is reported on the page; uploads keep working.
    let _ = detector.start_camera().await;

    tokio::select! {
        result = run_commands(detector) => result?,
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received, abandoning in-flight actions.");
        }
    }

    Ok(())
}

#[cfg(feature = "opencv")]
fn camera_device(config: &CameraConfig) -> Box<dyn CameraDevice> {
    Box::new(crate::opencv_camera::OpencvDevice::new(config))
}

#[cfg(not(feature = "opencv"))]
fn camera_device(_config: &CameraConfig) -> Box<dyn CameraDevice> {
    Box::new(crate::camera::UnavailableDevice)
}

/// Reads commands from stdin until `quit` or end of input. Every action runs
/// on its own task so a pending transaction never blocks the next command.
async fn run_commands(detector: Arc<LogoDetector>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(io::stdin()).lines();
    let mut in_flight = JoinSet::new();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(err) => {
                println!("{}", err);
                continue;
            }
        };

        match command {
            Command::Quit => break,
            // Selection must land before a following `upload`.
            Command::Choose(_) => dispatch(&detector, command).await,
            command => {
                let detector = detector.clone();
                in_flight.spawn(async move { dispatch(&detector, command).await });
            }
        }

        while in_flight.try_join_next().is_some() {}
    }

    tracing::info!("Waiting for {} in-flight action(s)", in_flight.len());
    while in_flight.join_next().await.is_some() {}

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
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
