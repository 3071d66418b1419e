use printer_relay::communication::RecordingSink;
use printer_relay::config::Config;
use printer_relay::simulator::{SimulatedPrinter, SimulatorOptions};
use printer_relay::{Instruction, PrinterHost};
use std::sync::Arc;
use std::time::Duration;

fn host_for(options: SimulatorOptions, idle_poll_secs: u64) -> (SimulatedPrinter, PrinterHost, Arc<RecordingSink>) {
    let mut config = Config::default();
    config.serial.read_timeout_ms = 500;
    config.job.line_delay_ms = 0;
    config.telemetry.idle_poll_interval_secs = idle_poll_secs;
    let (printer, transport) = SimulatedPrinter::transport(options);
    let sink = Arc::new(RecordingSink::new());
    let host = PrinterHost::new(config, transport, sink.clone());
    (printer, host, sink)
}

#[tokio::test]
async fn idle_poll_reports_temperature() {
    let (printer, host, sink) = host_for(SimulatorOptions::default(), 10);
    let poller = host.idle_poller().unwrap();

    assert!(poller.poll_once().await.unwrap());
    assert_eq!(printer.received(), vec!["M105"]);
    assert_eq!(
        sink.pairs(),
        vec![("TEMP".to_string(), "24.26/0.00,24.37/0.00".to_string())]
    );
}

#[tokio::test]
async fn idle_poll_skips_while_printing() {
    let options = SimulatorOptions {
        response_delay: Duration::from_millis(2),
        ..Default::default()
    };
    let (printer, host, _sink) = host_for(options, 10);
    let poller = host.idle_poller().unwrap();
    let job = (0..200).map(|i| Instruction::new(format!("G1 X{}", i))).collect();
    let handle = host.streamer().start_job(job).await.unwrap();

    assert!(!poller.poll_once().await.unwrap());
    host.streamer().request_stop().await;
    handle.wait().await;
    assert!(printer.received().iter().all(|l| l != "M105"));
}

fn moves(count: usize) -> Vec<Instruction> {
    (0..count).map(|i| Instruction::new(format!("G1 X{}", i))).collect()
}

#[tokio::test]
async fn job_started_during_poll_waits_for_it() {
    let (printer, host, _sink) = host_for(SimulatorOptions::default(), 10);

    // Stand in for a poll that already holds the device.
    let mut session = host.engine().session().await;
    let handle = host.streamer().start_job(moves(3)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(printer.received_count(), 0);

    session.send_and_collect(&Instruction::new("M105")).await.unwrap();
    drop(session);

    handle.wait().await;
    assert_eq!(printer.received(), vec!["M105", "G1 X0", "G1 X1", "G1 X2"]);
}

#[tokio::test]
async fn poll_in_flight_completes_before_job_lines() {
    let options = SimulatorOptions {
        response_delay: Duration::from_millis(50),
        ..Default::default()
    };
    let (printer, host, sink) = host_for(options, 10);
    let poller = host.idle_poller().unwrap();
    let poll = tokio::spawn(async move { poller.poll_once().await });

    while printer.received_count() == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    let handle = host.streamer().start_job(moves(2)).await.unwrap();

    assert!(poll.await.unwrap().unwrap());
    handle.wait().await;
    assert_eq!(printer.received(), vec!["M105", "G1 X0", "G1 X1"]);
    assert!(sink.pairs().contains(&("TEMP".to_string(), "24.26/0.00,24.37/0.00".to_string())));

    // Once the job owns the slot, polls are skipped.
    let _ = host.streamer().start_job(moves(50)).await.unwrap();
    assert!(!host.idle_poller().unwrap().poll_once().await.unwrap());
}

#[tokio::test]
async fn zero_interval_disables_polling() {
    let (_printer, host, _sink) = host_for(SimulatorOptions::default(), 0);
    assert!(host.idle_poller().is_none());
}

#[tokio::test(start_paused = true)]
async fn poller_runs_on_interval() {
    let (printer, host, _sink) = host_for(SimulatorOptions::default(), 10);
    let task = host.idle_poller().unwrap().spawn();

    tokio::time::sleep(Duration::from_secs(25)).await;
    task.abort();
    assert_eq!(printer.received(), vec!["M105", "M105"]);
}
