//! mpsched CLI - multi-path subflow scheduler.

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use tokio::signal;
use tokio::sync::broadcast;

use mpsched::cli::*;
use mpsched::config::{init_logging, Config};
use mpsched::error::{Error, Result};
use mpsched::metrics::{ConfiguredBitrate, LinkMetrics, LinkMetricsCell, LinkMetricsCollector};
use mpsched::multipath::{AddressClassifier, ConnectionSnapshot, Outcome, Scheduler, Selection};
use mpsched::types::Bitrate;
use mpsched::util;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Initialize logging
    let log_config = mpsched::config::LoggingConfig {
        level: cli.log_level.clone(),
        color: !cli.no_color,
        ..Default::default()
    };
    init_logging(&log_config)?;

    // Load config if specified
    let config = if let Some(ref path) = cli.config {
        Config::load(path)?
    } else if Config::default_path().exists() {
        Config::load(Config::default_path())?
    } else {
        Config::default()
    };

    let format = cli.format;
    match cli.command {
        Commands::Decide(args) => run_decide(args, config, format),
        Commands::Watch(args) => run_watch(args, config, format).await,
        Commands::Config(args) => run_config(args),
    }
}

/// Run one scheduling decision over a snapshot file
fn run_decide(args: DecideArgs, config: Config, format: OutputFormat) -> Result<()> {
    let mut conn = load_snapshot(&args.snapshot)?;

    let mut scheduler_config = config.scheduler;
    if let Some(strategy) = args.strategy {
        scheduler_config.strategy = strategy.into();
    }
    scheduler_config.validate()?;

    let classifier = Arc::new(if args.wifi_addr.is_empty() {
        let classifier = AddressClassifier::new();
        classifier.refresh_from_interface(&config.link_metrics.wifi_interface);
        classifier
    } else {
        AddressClassifier::from_addrs(args.wifi_addr.iter().copied())
    });

    let link_metrics = Arc::new(LinkMetricsCell::new());
    let cellular = args
        .cellular_bitrate
        .map(Bitrate::from_bps)
        .or_else(|| Some(config.link_metrics.cellular_bitrate()));
    link_metrics.publish(args.wifi_bitrate.map(Bitrate::from_bps), cellular);

    let scheduler = Scheduler::with_cross_layer(scheduler_config, classifier, Arc::clone(&link_metrics));
    let mut state = scheduler.on_init();
    let result = state.get_subflow(&mut conn);
    let control = state.on_release();

    if let Ok(ref selection) = result {
        log_decision_metrics(&scheduler, selection, &link_metrics.load())?;
    }

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "strategy": control.strategy,
                "selection": result.as_ref().ok(),
                "error": result.as_ref().err().map(ToString::to_string),
                "control": control,
                "scheduled": conn.scheduled,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => match result {
            Ok(ref selection) => print_selection(selection, &conn),
            Err(ref e) => {
                println!("{} {}", "✗".red(), e);
            }
        },
    }

    result.map(|_| ()).map_err(Error::from)
}

fn load_snapshot(path: &Path) -> Result<ConnectionSnapshot> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read snapshot {}: {e}", path.display())))?;
    let mut conn: ConnectionSnapshot = serde_json::from_str(&content)?;
    conn.clear_scheduled();
    Ok(conn)
}

#[cfg(feature = "metrics")]
fn log_decision_metrics(scheduler: &Scheduler, selection: &Selection, links: &LinkMetrics) -> Result<()> {
    let prometheus = mpsched::metrics::PrometheusMetrics::new()
        .map_err(|e| Error::Other(anyhow::anyhow!("metrics registry: {e}")))?;
    prometheus.record_selection(scheduler.config().strategy, selection.outcome);
    prometheus.update_from(&scheduler.stats().snapshot());
    prometheus.set_link_metrics(links);
    tracing::debug!(metrics = %prometheus.encode().unwrap_or_default(), "Decision metrics");
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn log_decision_metrics(_scheduler: &Scheduler, _selection: &Selection, _links: &LinkMetrics) -> Result<()> {
    Ok(())
}

fn print_selection(selection: &Selection, conn: &ConnectionSnapshot) {
    let outcome = match selection.outcome {
        Outcome::Fastest => "fastest".green(),
        Outcome::Candidate => "candidate".cyan(),
        Outcome::HolPrevented => "hol prevented".yellow(),
        Outcome::RoundRobin => "round robin".normal(),
        Outcome::Redundant => "redundant".normal(),
        Outcome::LastResort => "last resort".red(),
    };

    let rtt = conn
        .path(selection.path)
        .map_or_else(|| "-".to_string(), |p| util::format_rtt(p.srtt));
    println!(
        "{} {} ({}, srtt {})",
        "→".cyan(),
        selection.path.to_string().bright_white().bold(),
        outcome,
        rtt
    );

    for duplicate in &selection.duplicates {
        println!("  {} {}", "+".cyan(), duplicate);
    }

    if let Some(check) = selection.check {
        println!();
        println!("{}", "HoL check:".bright_white());
        println!("  fastest:     {}", check.fastest);
        println!("  candidate:   {}", check.candidate);
        println!("  lambda:      {}", check.lambda);
        println!("  linger:      {}", util::format_rtt(check.linger));
        println!("  fast bytes:  {}", util::format_bytes(check.fast_bytes));
        println!("  in flight:   {}", util::format_bytes(check.slow_inflight_bytes));
        println!("  avail space: {}", util::format_bytes(check.avail_space));
    }
}

/// Poll link bitrates until interrupted
async fn run_watch(args: WatchArgs, config: Config, format: OutputFormat) -> Result<()> {
    let mut link_config = config.link_metrics;
    if let Some(interface) = args.interface {
        link_config.wifi_interface = interface;
    }
    if let Some(bps) = args.cellular_bitrate {
        link_config.cellular_bitrate_bps = bps;
    }
    link_config.validate()?;

    let cellular = Arc::new(ConfiguredBitrate::new("cellular", link_config.cellular_bitrate()));
    let classifier = Arc::new(AddressClassifier::new());
    let collector = LinkMetricsCollector::from_config(&link_config, cellular, Arc::new(LinkMetricsCell::new()))
        .with_classifier(Arc::clone(&classifier), link_config.wifi_interface.clone());

    let mut updates = collector.subscribe();
    let handle = collector.start();

    if format == OutputFormat::Text {
        println!(
            "{} Watching {} every {}. Press Ctrl+C to stop.",
            "●".green(),
            link_config.wifi_interface.bright_white(),
            util::format_rtt(link_config.poll_interval)
        );
    }

    let mut seen = 0usize;
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(metrics) => {
                    print_link_metrics(&metrics, &classifier, format)?;
                    seen += 1;
                    if args.count.is_some_and(|count| seen >= count) {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Watcher lagged behind collector");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = signal::ctrl_c() => break,
        }
    }

    collector.stop();
    let _ = handle.await;
    Ok(())
}

fn print_link_metrics(metrics: &LinkMetrics, classifier: &AddressClassifier, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "wifi_bps": metrics.wifi.map(Bitrate::bps),
                "cellular_bps": metrics.cellular.map(Bitrate::bps),
                "preferred": metrics.preferred_class(),
                "wifi_addrs": classifier.wifi_addrs(),
            });
            println!("{}", serde_json::to_string(&output)?);
        }
        OutputFormat::Text => {
            let show = |b: Option<Bitrate>| b.map_or_else(|| "-".dimmed().to_string(), |b| b.to_string());
            let preferred = metrics
                .preferred_class()
                .map_or_else(|| "-".dimmed().to_string(), |c| c.to_string().bright_green().to_string());
            println!(
                "wifi {:>14}  cellular {:>14}  preferred {}",
                show(metrics.wifi),
                show(metrics.cellular),
                preferred
            );
        }
    }
    Ok(())
}

/// Show example configuration
fn run_config(args: ConfigArgs) -> Result<()> {
    let output = Config::example().to_toml()?;

    if let Some(ref path) = args.output {
        std::fs::write(path, &output)?;
        println!(
            "{} Configuration written to {}",
            "✓".green(),
            path.display()
        );
    } else {
        println!("{output}");
    }

    Ok(())
}
