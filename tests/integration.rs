//! End-to-end run of the relay against the simulated printer.

use printer_relay::communication::RecordingSink;
use printer_relay::config::Config;
use printer_relay::file_manager::FileManager;
use printer_relay::simulator::{SimulatedPrinter, SimulatorOptions};
use printer_relay::web::printer_channel::PrinterRequest;
use printer_relay::{JobOutcome, PrintJobError, PrinterHost};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

fn test_config() -> Config {
    let mut config = Config::default();
    config.serial.read_timeout_ms = 500;
    config.serial.startup_delay_ms = 0;
    config.job.line_delay_ms = 0;
    config.telemetry.idle_poll_interval_secs = 0;
    config
}

#[tokio::test]
async fn handshake_then_print() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("job.gcode"), "G28\nM104 S200\n\nG1 X5 ; go\nM105\n").unwrap();

    let (printer, transport) = SimulatedPrinter::transport(SimulatorOptions::default());
    let sink = Arc::new(RecordingSink::new());
    let host = PrinterHost::new(test_config(), transport, sink.clone())
        .with_file_manager(FileManager::with_directory(dir.path()));

    host.handshake().await.unwrap();
    let handle = host.submit_job("job.gcode").await.unwrap();
    let job_id = handle.job_id.clone();
    let outcome = handle.wait().await;
    assert_eq!(outcome, JobOutcome::Finished { job_id, lines: 5 });

    assert_eq!(
        printer.received(),
        vec!["M115", "G28", "M104 S200", "G1 X5", "M105"]
    );

    let status = host.status().await;
    assert_eq!(status.state, "idle");
    assert_eq!(status.last_outcome.as_deref(), Some("finished"));

    let pairs = sink.pairs();
    assert_eq!(pairs.first().unwrap(), &("PRINTER_STATUS".to_string(), "printing".to_string()));
    assert_eq!(pairs.last().unwrap(), &("PRINTER_STATUS".to_string(), "finished".to_string()));
    // The in-job M105 reply is a temperature report, relayed as TEMP.
    assert!(pairs.contains(&("TEMP".to_string(), "24.26/200.00,24.37/0.00".to_string())));
    // Job status is reported once per new percentage.
    let reports: Vec<_> = pairs.iter().filter(|(k, _)| k == "JOB_STATUS").map(|(_, p)| p.as_str()).collect();
    assert_eq!(reports, vec!["20", "40", "60", "80", "100"]);

    host.shutdown().await;
}

#[tokio::test]
async fn control_loop_serves_requests_in_order() {
    let (printer, transport) = SimulatedPrinter::transport(SimulatorOptions::default());
    let host = Arc::new(PrinterHost::new(test_config(), transport, Arc::new(RecordingSink::new())));
    let (tx, rx) = mpsc::channel(8);
    let control = {
        let host = host.clone();
        tokio::spawn(async move { host.run(rx).await })
    };

    let (cmd_tx, cmd_rx) = oneshot::channel();
    tx.send(PrinterRequest::Command { message: "home X".to_string(), respond_to: cmd_tx })
        .await
        .unwrap();
    let (job_tx, job_rx) = oneshot::channel();
    tx.send(PrinterRequest::SubmitJob { path: "/no/such/file.gcode".to_string(), respond_to: job_tx })
        .await
        .unwrap();
    let (status_tx, status_rx) = oneshot::channel();
    tx.send(PrinterRequest::GetStatus { respond_to: status_tx }).await.unwrap();

    assert_eq!(cmd_rx.await.unwrap().unwrap(), Some("home".to_string()));
    assert!(matches!(job_rx.await.unwrap(), Err(PrintJobError::InputNotFound(_))));
    assert_eq!(status_rx.await.unwrap().state, "idle");
    assert_eq!(printer.received(), vec!["G28 X"]);

    drop(tx);
    control.await.unwrap();
}
