use anyhow::{Context, Result};
use clap::Parser;
use hwwatch::alerts::{
    AlertContext, AlertDispatcher, AlertFactory, AlertSink, IemLogSink, JsonLinesSink,
};
use hwwatch::collectors::ipmitool::detect_virtualization;
use hwwatch::collectors::{EnclosureApiClient, IpmiTool};
use hwwatch::config::{Config, OutputConfig};
use hwwatch::fru::FruSensor;
use hwwatch::sel::SelSensor;
use hwwatch::{SensorError, SensorScheduler};
use log::{error, info, warn};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

/// How often the main thread checks whether any sensor is still alive
const LIVENESS_CHECK: Duration = Duration::from_secs(1);

/// Command-line arguments for the hardware health agent
#[derive(Parser)]
#[command(
    name = "hwwatch",
    about = "Hardware health agent - SEL and enclosure FRU alerting",
    long_about = "Tails the BMC System Event Log and polls the enclosure management API, \
                  turning hardware events and FRU health transitions into deduplicated, \
                  severity-classified alerts."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        help = "Enable verbose logging output (sets RUST_LOG=debug)"
    )]
    verbose: bool,

    /// Run every sensor once and exit
    #[arg(long, help = "Poll every enabled sensor a single time, then exit")]
    once: bool,
}

impl Cli {
    /// Validate the CLI arguments
    fn validate(&self) -> Result<(), String> {
        if let Some(ref config_path) = self.config {
            // Missing files fall back to defaults in Config::load
            if config_path.exists() {
                if !config_path.is_file() {
                    return Err(format!(
                        "Configuration path is not a file: {}",
                        config_path.display()
                    ));
                }

                if let Some(extension) = config_path.extension() {
                    if extension != "toml" {
                        warn!(
                            "Configuration file does not have .toml extension: {}",
                            config_path.display()
                        );
                    }
                }
            }
        }

        Ok(())
    }
}

/// Owns the sensors and the scheduler driving them
struct HardwareWatcher {
    scheduler: SensorScheduler,
    shutdown_sender: Sender<()>,
    shutdown_receiver: Receiver<()>,
}

impl HardwareWatcher {
    fn new(config: &Config) -> Result<Self> {
        let host_id = AlertContext::local_host_id();
        let factory = AlertFactory::new(AlertContext::new(&config.system_information, host_id));
        let dispatcher = build_dispatcher(&config.output)?;
        let data_path = &config.system_information.data_path;

        let mut scheduler = SensorScheduler::new();

        if !config.sel.enabled {
            info!("SEL monitoring disabled in configuration");
        } else if detect_virtualization() {
            info!(
                "VM environment detected, ipmitool cannot fetch monitoring data; \
                 SEL sensor not started"
            );
        } else {
            let sensor = SelSensor::new(
                Box::new(IpmiTool::new(config.sel.use_sudo)),
                &data_path.join("server"),
                &config.sel,
                factory.clone(),
                dispatcher.clone(),
            );
            match sensor {
                Ok(sensor) => scheduler.add(Box::new(sensor), config.sel.poll_interval()),
                Err(SensorError::Collector(e)) => {
                    warn!("SEL sensor not started, dependencies failed: {}", e)
                }
                Err(e) => error!("SEL sensor not started: {}", e),
            }
        }

        if config.enclosure.enabled {
            let frus_dir = data_path.join("encl").join("frus");
            for kind in &config.enclosure.frus {
                let client = EnclosureApiClient::new(
                    &config.enclosure.api_url,
                    config.enclosure.request_timeout(),
                )
                .with_context(|| {
                    format!("invalid enclosure.api_url {:?}", config.enclosure.api_url)
                })?;

                match FruSensor::new(
                    *kind,
                    Box::new(client),
                    &frus_dir.join(kind.cache_dir()),
                    factory.clone(),
                    dispatcher.clone(),
                ) {
                    Ok(sensor) => scheduler.add(Box::new(sensor), config.enclosure.poll_interval()),
                    Err(e) => error!("{} FRU sensor not started: {}", kind.as_str(), e),
                }
            }
        } else {
            info!("Enclosure monitoring disabled in configuration");
        }

        let (shutdown_sender, shutdown_receiver) = mpsc::channel();
        Ok(Self {
            scheduler,
            shutdown_sender,
            shutdown_receiver,
        })
    }

    /// Block until a shutdown signal arrives or every sensor has exited
    fn wait_for_shutdown(&self) {
        info!("Waiting for shutdown signal...");
        loop {
            match self.shutdown_receiver.recv_timeout(LIVENESS_CHECK) {
                Ok(()) => {
                    info!("Shutdown signal received");
                    return;
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.scheduler.active_sensors() == 0 {
                        warn!("All sensors have stopped");
                        return;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    error!("Shutdown channel closed");
                    return;
                }
            }
        }
    }
}

/// JSON-lines primary sink, plus the IEM mirror when enabled
fn build_dispatcher(output: &OutputConfig) -> Result<AlertDispatcher> {
    let primary: Arc<dyn AlertSink> = match &output.alerts_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open alerts file {}", path.display()))?;
            info!("Writing alerts to {}", path.display());
            Arc::new(JsonLinesSink::new(file))
        }
        None => Arc::new(JsonLinesSink::new(std::io::stdout())),
    };

    let dispatcher = AlertDispatcher::new(primary);
    Ok(if output.iem_mirror {
        dispatcher.with_mirror(Arc::new(IemLogSink::default()))
    } else {
        dispatcher
    })
}

fn run(cli: &Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    let mut watcher = HardwareWatcher::new(&config)?;

    if watcher.scheduler.sensor_count() == 0 {
        warn!("No sensors could be started, exiting");
        return Ok(());
    }

    if cli.once {
        for (name, outcome) in watcher.scheduler.run_once() {
            info!("Sensor {} finished one cycle: {:?}", name, outcome);
        }
        return Ok(());
    }

    watcher.scheduler.start();

    let shutdown_sender = watcher.shutdown_sender.clone();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal (SIGINT), shutting down gracefully...");
        if let Err(e) = shutdown_sender.send(()) {
            error!("Failed to send shutdown signal: {}", e);
        }
    })
    .context("error setting SIGINT handler")?;

    info!("Hardware watcher is running. Press Ctrl+C to stop.");
    watcher.wait_for_shutdown();
    watcher.scheduler.stop();
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose && std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    info!("Starting hardware watcher");

    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(&cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }

    info!("Hardware watcher shutdown complete");
}
