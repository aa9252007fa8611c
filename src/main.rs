use log::{error, info};
use std::process::ExitCode;
use std::sync::Arc;

use gpio_edge_relay::{AppError, CancelToken, EdgeMonitor, MonitorConfig, shutdown};

#[cfg(feature = "hardware-gpio")]
use gpio_edge_relay::LibgpiodBackend;
#[cfg(not(feature = "hardware-gpio"))]
use gpio_edge_relay::MockGpioBackend;

fn load_config() -> Result<MonitorConfig, AppError> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("GPIO_RELAY_CONFIG").ok());

    match config_path {
        Some(path) => {
            info!("Loading config from {path}");
            MonitorConfig::load_from_file(&path)
        }
        None => {
            let config = MonitorConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match load_config() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let backend = {
        #[cfg(feature = "hardware-gpio")]
        {
            match LibgpiodBackend::new() {
                Ok(backend) => Arc::new(backend),
                Err(e) => {
                    error!("Failed to init libgpiod backend: {e}");
                    return ExitCode::FAILURE;
                }
            }
        }
        #[cfg(not(feature = "hardware-gpio"))]
        {
            Arc::new(MockGpioBackend::with_device(&config.device_path, 64))
        }
    };

    let cancel = CancelToken::new();
    shutdown::spawn_signal_listener(cancel.clone());

    let monitor = EdgeMonitor::new(config, backend);
    match tokio::task::spawn_blocking(move || monitor.run(&cancel)).await {
        Ok(Ok(_)) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            error!("{e}");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Monitor thread failed: {e}");
            ExitCode::FAILURE
        }
    }
}
