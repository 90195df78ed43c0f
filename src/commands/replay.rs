//! `nethook replay`: drive a packet trace through configured subscribers.
//!
//! Every subscriber gets an echo worker that reads diverted packets and
//! writes them straight back through its writer. After the trace has been
//! replayed, whatever the workers reinjected into the stack is fed through
//! pre-routing once more, where loop prevention lets it pass.

use crate::commands::trace::{load_trace, TraceRecord};
use crate::commands::{build_host, load_config, open_subscriber};
use crate::error::{NetHookError, Result};
use crate::network::core::{CapturePath, MemoryHost, PacketHost};
use crate::network::filter::InterceptionPoint;
use crate::network::processing::{Interrupter, Session, StatsSnapshot};
use crate::network::NetHook;
use crate::settings::{FilterOptions, SubscriberConfig, WriterOptions};
use crate::utils::log_statistics;
use clap::Args;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const READ_BUFFER: usize = 65536;
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Configuration file (defaults to the user config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// JSON trace of packets to replay
    #[arg(long)]
    pub trace: PathBuf,

    /// Print statistics as JSON
    #[arg(long)]
    pub json: bool,

    /// Extra subscriber from the command line, added after the configured ones
    #[command(flatten)]
    pub filter: FilterOptions,

    #[command(flatten)]
    pub writer: WriterOptions,
}

impl ReplayArgs {
    fn extra_subscriber(&self) -> Option<SubscriberConfig> {
        self.filter.point.map(|_| SubscriberConfig {
            name: "cli".to_string(),
            filter: self.filter.clone(),
            writer: self.writer.dest_dev.is_some().then(|| self.writer.clone()),
        })
    }
}

#[derive(Debug, Serialize)]
struct ReplayReport {
    records: usize,
    fed_back: usize,
    raw_transmits: usize,
    queued_transmits: usize,
    stats: StatsSnapshot,
}

struct EchoWorker {
    name: String,
    interrupter: Interrupter,
    handle: JoinHandle<()>,
}

/// Reads until interrupted, writing every packet back if a writer is set.
fn spawn_echo(name: String, session: Session, handled: Arc<AtomicU64>) -> EchoWorker {
    let interrupter = session.interrupter();
    let thread_name = name.clone();
    let handle = thread::spawn(move || {
        let mut buf = vec![0u8; READ_BUFFER];
        loop {
            match session.read(&mut buf) {
                Ok(n) => {
                    match session.write(&buf[..n]) {
                        Ok(_) | Err(NetHookError::BadState(_)) => {}
                        Err(e) => warn!("{}: reinjection failed: {}", thread_name, e),
                    }
                    handled.fetch_add(1, Ordering::SeqCst);
                }
                Err(NetHookError::Interrupted) => break,
                Err(e @ NetHookError::BufferTooSmall { .. }) => {
                    warn!("{}: {}", thread_name, e);
                    handled.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) => {
                    error!("{}: read failed: {}", thread_name, e);
                    break;
                }
            }
        }
        debug!("{}: echo worker stopped", thread_name);
    });
    EchoWorker {
        name,
        interrupter,
        handle,
    }
}

/// Waits until every diverted packet has been handled by a worker.
fn settle(hook: &NetHook, handled: &AtomicU64, stop: &AtomicBool) {
    let deadline = Instant::now() + SETTLE_TIMEOUT;
    while handled.load(Ordering::SeqCst) < hook.stats().diverted {
        if stop.load(Ordering::SeqCst) || Instant::now() > deadline {
            warn!("Gave up waiting for subscribers to drain");
            return;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

fn replay_records(
    hook: &NetHook,
    host: &MemoryHost,
    records: &[TraceRecord],
    stop: &AtomicBool,
) -> Result<()> {
    for record in records {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        let packet = record.to_packet(host)?;
        let in_dev = record.in_dev.as_deref().and_then(|n| host.device_by_name(n));
        let out_dev = record.out_dev.as_deref().and_then(|n| host.device_by_name(n));
        hook.intercept(record.point, packet, in_dev.as_deref(), out_dev.as_deref());
    }
    Ok(())
}

/// Feeds packets reinjected into the stack back through pre-routing.
fn feed_back(hook: &NetHook, host: &MemoryHost) -> usize {
    let received = host.take_received();
    let count = received.len();
    for packet in received {
        let in_dev = packet.dev().cloned();
        hook.intercept(InterceptionPoint::PreRouting, packet, in_dev.as_deref(), None);
    }
    count
}

pub fn run(args: ReplayArgs) -> Result<()> {
    let (path, mut config) = load_config(args.config.as_deref())?;
    if let Some(extra) = args.extra_subscriber() {
        config.subscribers.push(extra);
        config.validate()?;
    }
    let records = load_trace(&args.trace)?;
    info!(
        "Replaying {} packets from {} with {}",
        records.len(),
        args.trace.display(),
        path.display()
    );

    let host = build_host(&config);
    let hook = NetHook::new(host.clone());
    let handled = Arc::new(AtomicU64::new(0));
    let stop = Arc::new(AtomicBool::new(false));

    let mut workers = Vec::with_capacity(config.subscribers.len());
    for sub in &config.subscribers {
        let session = open_subscriber(&hook, sub)?;
        workers.push(spawn_echo(sub.name.clone(), session, Arc::clone(&handled)));
    }

    let interrupters: Vec<Interrupter> = workers.iter().map(|w| w.interrupter.clone()).collect();
    let ctrlc_stop = Arc::clone(&stop);
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Interrupted, stopping readers");
        ctrlc_stop.store(true, Ordering::SeqCst);
        for interrupter in &interrupters {
            interrupter.interrupt();
        }
    }) {
        warn!("Could not install interrupt handler: {}", e);
    }

    let result = replay_records(&hook, &host, &records, &stop);
    settle(&hook, &handled, &stop);
    let fed_back = feed_back(&hook, &host);
    settle(&hook, &handled, &stop);

    for worker in workers {
        worker.interrupter.interrupt();
        if worker.handle.join().is_err() {
            error!("Echo worker '{}' panicked", worker.name);
        }
    }
    hook.deactivate_all();
    result?;

    let captured = host.take_captured();
    let count = |path: CapturePath| captured.iter().filter(|c| c.path == path).count();
    let report = ReplayReport {
        records: records.len(),
        fed_back,
        raw_transmits: count(CapturePath::RawTransmit),
        queued_transmits: count(CapturePath::QueuedTransmit),
        stats: hook.stats(),
    };
    if hook.loop_outstanding() > 0 {
        warn!("{} reinjected packets never came back", hook.loop_outstanding());
    }

    log_statistics(&report.stats);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &ReplayReport) {
    let stats = &report.stats;
    println!("replayed:        {}", report.records);
    println!("diverted:        {} ({:.2}%)", stats.diverted, stats.diversion_rate());
    println!("passthrough:     {}", stats.passthrough);
    println!("delivered:       {}", stats.delivered);
    println!("loop passes:     {}", stats.loop_passes);
    println!("fed back:        {}", report.fed_back);
    println!(
        "injected:        {} (stack {}, direct {}, queued {})",
        stats.injected(),
        stats.injected_to_stack,
        stats.injected_to_interface,
        stats.injected_to_interface_queue
    );
    println!("inject failures: {}", stats.inject_failures);
    println!(
        "transmitted:     {} direct, {} queued",
        report.raw_transmits, report.queued_transmits
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::core::headers::testing::tcp_packet;
    use crate::network::processing::WriteMode;
    use crate::settings::ConfigBuilder;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    fn record(point: InterceptionPoint, in_dev: Option<&str>, dport: u16) -> TraceRecord {
        TraceRecord {
            point,
            in_dev: in_dev.map(str::to_string),
            out_dev: None,
            neighbour: None,
            data: STANDARD.encode(tcp_packet(4000, dport)),
        }
    }

    #[test]
    fn test_echo_round_trip() {
        let config = ConfigBuilder::new()
            .interface("eth0", "02:00:00:00:00:01".parse().unwrap())
            .subscriber("web", InterceptionPoint::PreRouting)
            .dport(80)
            .writer("eth0", WriteMode::ToStack)
            .build();
        let host = build_host(&config);
        let hook = NetHook::new(host.clone());
        let handled = Arc::new(AtomicU64::new(0));
        let stop = AtomicBool::new(false);

        let session = open_subscriber(&hook, &config.subscribers[0]).unwrap();
        let worker = spawn_echo("web".to_string(), session, Arc::clone(&handled));

        let records = vec![
            record(InterceptionPoint::PreRouting, Some("eth0"), 80),
            record(InterceptionPoint::PreRouting, Some("eth0"), 443),
        ];
        replay_records(&hook, &host, &records, &stop).unwrap();
        settle(&hook, &handled, &stop);
        assert_eq!(hook.loop_outstanding(), 1);

        assert_eq!(feed_back(&hook, &host), 1);
        settle(&hook, &handled, &stop);
        assert_eq!(hook.loop_outstanding(), 0);

        worker.interrupter.interrupt();
        worker.handle.join().unwrap();

        let stats = hook.stats();
        assert_eq!(stats.seen, 3);
        assert_eq!(stats.diverted, 1);
        assert_eq!(stats.loop_passes, 1);
        assert_eq!(stats.injected_to_stack, 1);
    }

    #[test]
    fn test_extra_subscriber_from_args() {
        let args = ReplayArgs {
            config: None,
            trace: PathBuf::from("t.json"),
            json: false,
            filter: FilterOptions {
                point: Some(InterceptionPoint::Forward),
                ..Default::default()
            },
            writer: WriterOptions::default(),
        };
        let extra = args.extra_subscriber().unwrap();
        assert_eq!(extra.name, "cli");
        assert!(extra.writer.is_none());

        let args = ReplayArgs {
            filter: FilterOptions::default(),
            ..args
        };
        assert!(args.extra_subscriber().is_none());
    }
}
