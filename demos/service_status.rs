//! Look up the services running on a handful of hosts, concurrently.
//!
//! Each host is queried by its own work unit; hosts answer with different
//! latencies, so output arrives in the order the lookups finish. One host is
//! unreachable and is reported without stopping the others.
//!
//! Run with: cargo run --example service_status

use futures_interleave::prelude::*;
use futures_interleave::EmitEach;

use std::io;
use std::time::Duration;

/// Whether a service is running.
#[derive(Debug, Clone, Copy)]
enum Status {
    Running,
    Stopped,
}

/// One row of output.
#[derive(Debug)]
struct ServiceRecord {
    name: &'static str,
    status: Status,
    computer_name: String,
    can_pause: bool,
}

/// Prints rows to stdout and failures to stderr.
struct Console;

impl Host for Console {
    type Record = ServiceRecord;

    fn emit(&mut self, record: ServiceRecord) -> Result<(), EmitError> {
        println!(
            "{:<12} {:<24} {:?} pausable={}",
            record.computer_name, record.name, record.status, record.can_pause
        );
        Ok(())
    }

    fn report(&mut self, report: ErrorReport) {
        eprintln!(
            "error [{}] {} ({}): {}",
            report.category,
            report.error_id(),
            report.source,
            report.fault
        );
    }
}

const SERVICES: &[(&str, Status, bool)] = &[
    ("Print Spooler", Status::Running, false),
    ("Windows Update", Status::Stopped, true),
    ("Remote Registry", Status::Running, true),
];

/// Pretend to query `host` for its services.
async fn list_services(host: Option<String>) -> io::Result<Vec<ServiceRecord>> {
    let host = host.unwrap_or_else(|| String::from("localhost"));
    let latency = 50 * (host.len() as u64 % 5);
    tokio::time::sleep(Duration::from_millis(latency)).await;

    if host.starts_with("offline") {
        return Err(io::Error::new(
            io::ErrorKind::NotConnected,
            format!("{host} did not answer"),
        ));
    }

    Ok(SERVICES
        .iter()
        .map(|&(name, status, can_pause)| ServiceRecord {
            name,
            status,
            computer_name: host.clone(),
            can_pause,
        })
        .collect())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let hosts: Vec<String> = std::env::args().skip(1).collect();
    let hosts = if hosts.is_empty() {
        ["web-01", "db-primary", "offline-07", "cache"]
            .map(String::from)
            .to_vec()
    } else {
        hosts
    };

    let mut dispatcher = Dispatcher::new(list_services)
        .with_config(DispatchConfig::new("get-service"))
        .post_process(EmitEach);

    let drained = dispatcher.run(hosts, &mut Console).await?;
    eprintln!("{} hosts answered, {} failed", drained.emitted, drained.reported);
    Ok(())
}
