// src/main.rs - relay entry point
use clap::Parser;
use printer_relay::communication::{BroadcastSink, open_serial};
use printer_relay::config::{self, Config};
use printer_relay::simulator::{SimulatedPrinter, SimulatorOptions};
use printer_relay::web;
use printer_relay::PrinterHost;
use relay_shared::EventSink;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Streams G-code to a serial printer and relays its telemetry.
#[derive(Parser, Debug)]
#[command(name = "printer-relay", version, about)]
struct Cli {
    /// Path to a TOML config file (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device, overrides [serial].port
    #[arg(long)]
    port: Option<String>,

    /// Baud rate, overrides [serial].baud
    #[arg(long)]
    baudrate: Option<u32>,

    /// HTTP listen address, overrides [web].listen
    #[arg(long)]
    listen: Option<String>,

    /// Talk to the built-in simulated firmware instead of a serial device
    #[arg(long)]
    simulate: bool,

    /// Log every line sent and received
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn load_config(&self) -> Result<Config, config::ConfigError> {
        let mut config = match &self.config {
            Some(path) => config::load_config(&path.to_string_lossy())?,
            None => Config::default(),
        };
        if let Some(port) = &self.port {
            config.serial.port = port.clone();
        }
        if let Some(baud) = self.baudrate {
            config.serial.baud = baud;
        }
        if let Some(listen) = &self.listen {
            config.web.listen = listen.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(if cli.debug { tracing::Level::DEBUG } else { tracing::Level::INFO })
        .init();

    tracing::info!("Starting printer-relay {}", env!("CARGO_PKG_VERSION"));

    let config = cli.load_config().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
    })?;

    let events = BroadcastSink::new(config.web.event_buffer);
    let sink: Arc<dyn EventSink> = Arc::new(events.clone());

    // The simulator must outlive the host when it is the device.
    let mut _simulator = None;
    let host = if cli.simulate {
        tracing::info!("Using simulated firmware");
        let options = SimulatorOptions {
            history: 100,
            ..Default::default()
        };
        let (simulator, transport) = SimulatedPrinter::transport(options);
        _simulator = Some(simulator);
        PrinterHost::new(config.clone(), transport, sink)
    } else {
        tracing::info!("Device: {} @ {} baud", config.serial.port, config.serial.baud);
        let transport = open_serial(&config.serial.port, config.serial.baud)?;
        PrinterHost::new(config.clone(), transport, sink)
    };
    let host = Arc::new(host);

    if let Err(e) = host.handshake().await {
        tracing::error!("Printer did not answer the firmware handshake: {}", e);
        host.shutdown().await;
        return Err(e.into());
    }

    if let Some(poller) = host.idle_poller() {
        poller.spawn();
    }

    // Control requests from the web handlers are served one at a time.
    let (printer_tx, printer_rx) = mpsc::channel(16);
    let control = {
        let host = host.clone();
        tokio::spawn(async move { host.run(printer_rx).await })
    };

    let app = web::api::create_router(printer_tx, events);
    let listener = tokio::net::TcpListener::bind(&config.web.listen).await?;
    tracing::info!("Web API listening on http://{}", listener.local_addr()?);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown requested");
        })
        .await;

    control.abort();
    host.shutdown().await;
    served?;
    Ok(())
}
