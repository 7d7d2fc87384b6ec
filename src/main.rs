//! ndt7 command line client

use clap::Parser;
use colored::Colorize;
use ndt7_client::cli::Cli;
use ndt7_client::error::TestError;
use ndt7_client::logging::{self, ConsoleSink, FileSink, LogLevel};
use ndt7_client::measurement::{Kind, Measurement, Origin};
use ndt7_client::output::{self, SpeedSummary};
use ndt7_client::test::{SpeedTest, TestObserver};
use std::sync::{Arc, Mutex};

struct ConsoleObserver {
    summary: Mutex<SpeedSummary>,
}

impl ConsoleObserver {
    fn new() -> Self {
        Self {
            summary: Mutex::new(SpeedSummary::default()),
        }
    }

    fn summary(&self) -> SpeedSummary {
        *self.summary.lock().unwrap()
    }
}

impl TestObserver for ConsoleObserver {
    fn running_changed(&self, kind: Kind, running: bool) {
        if running {
            println!("{} {} test...", "Running".bold(), kind);
        }
    }

    fn measurement(&self, origin: Origin, kind: Kind, measurement: &Measurement) {
        self.summary.lock().unwrap().record(origin, kind, measurement);
        if origin == Origin::Client {
            if let Some(line) = output::progress_line(kind, measurement) {
                println!("  {}", line);
            }
        }
    }

    fn test_error(&self, kind: Kind, error: &TestError) {
        eprintln!("{} {} test: {}", "Error:".red().bold(), kind, error);
    }
}

fn print_summary(summary: &SpeedSummary, download: bool, upload: bool) {
    println!();
    println!("{}", "Results".bold().underline());
    if download {
        println!("  {}", output::summary_line(Kind::Download, summary.download_mbps));
    }
    if upload {
        println!("  {}", output::summary_line(Kind::Upload, summary.upload_mbps));
    }
    if let Some(rtt) = summary.min_rtt_ms {
        println!("  {}: {:.1} ms", "Min RTT".bold(), rtt);
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }
    if cli.verbose || cli.log_file.is_some() {
        logging::set_enabled(true);
        logging::set_min_level(if cli.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        });
        if cli.verbose {
            logging::add_sink(Box::new(ConsoleSink::new(!cli.no_color)));
        }
        if let Some(path) = &cli.log_file {
            logging::add_sink(Box::new(FileSink::new(path)));
        }
    }

    let settings = match cli.to_settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(e.exit_code());
        }
    };
    let download = !cli.no_download;
    let upload = !cli.no_upload;

    let observer = Arc::new(ConsoleObserver::new());
    let test = Arc::new(SpeedTest::new(settings));
    test.set_observer(observer.clone());

    // Ctrl-C cancels the in-flight run; the run itself reports Cancelled.
    let canceller = test.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel();
        }
    });

    let result = test.start_test(download, upload).await;

    if let Some(server) = test.current_server() {
        let place = server
            .location
            .as_ref()
            .and_then(|l| match (&l.city, &l.country) {
                (Some(city), Some(country)) => Some(format!(" ({}, {})", city, country)),
                (Some(city), None) => Some(format!(" ({})", city)),
                (None, Some(country)) => Some(format!(" ({})", country)),
                (None, None) => None,
            })
            .unwrap_or_default();
        println!("\n{} {}{}", "Server:".bold(), server.machine, place);
    }

    match result {
        Ok(()) => {
            print_summary(&observer.summary(), download, upload);
        }
        Err(e) if e.is_cancellation() => {
            println!("{}", "Test cancelled.".yellow());
            std::process::exit(e.exit_code());
        }
        Err(e) => {
            print_summary(&observer.summary(), download, upload);
            eprintln!("\n{} {}", "Error:".red().bold(), e);
            std::process::exit(e.exit_code());
        }
    }
}
