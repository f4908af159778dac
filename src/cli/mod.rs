//! Command line interface for mpsched.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// mpsched - multi-path subflow scheduler
#[derive(Parser, Debug)]
#[command(
    name = "mpsched",
    author,
    version,
    about = "Multi-path subflow scheduler with head-of-line blocking prevention",
    long_about = r#"
mpsched picks the path for the next segment of a multi-path connection.

  - min_rtt:     always the lowest-RTT available path
  - blest:       the host's best-path hint unless it would cause HoL blocking
  - xlayer:      the higher-bitrate radio link unless it would cause HoL blocking
  - round_robin: cycle through available paths
  - redundant:   send on every available path

EXAMPLES:
  mpsched decide snapshot.json --strategy blest
  mpsched decide snapshot.json --strategy xlayer --wifi-addr 192.168.1.10 \
      --wifi-bitrate 300000000 --cellular-bitrate 150000000
  mpsched watch --interface wlan0 --cellular-bitrate 150000000
"#
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one scheduling decision over a connection snapshot
    Decide(DecideArgs),

    /// Poll link bitrates and print each sample
    Watch(WatchArgs),

    /// Show example configuration
    Config(ConfigArgs),
}

/// Decide command arguments
#[derive(Args, Debug)]
pub struct DecideArgs {
    /// Connection snapshot (JSON)
    pub snapshot: PathBuf,

    /// Scheduling strategy (defaults to the configured one)
    #[arg(short, long)]
    pub strategy: Option<Strategy>,

    /// Local address belonging to the WiFi link (can be specified multiple times)
    #[arg(long)]
    pub wifi_addr: Vec<IpAddr>,

    /// WiFi link bitrate in bits/s
    #[arg(long)]
    pub wifi_bitrate: Option<u64>,

    /// Cellular link bitrate in bits/s
    #[arg(long)]
    pub cellular_bitrate: Option<u64>,
}

/// Watch command arguments
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// WiFi interface (defaults to the configured one)
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Cellular link bitrate in bits/s
    #[arg(long)]
    pub cellular_bitrate: Option<u64>,

    /// Stop after this many samples
    #[arg(short = 'n', long)]
    pub count: Option<usize>,
}

/// Config command arguments
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Output path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Scheduling strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    /// Minimum RTT
    #[value(alias = "min_rtt", alias = "minrtt")]
    MinRtt,
    /// BLEST (host hint with HoL check)
    Blest,
    /// Cross-layer (link bitrate with HoL check)
    Xlayer,
    /// Round-robin
    #[value(alias = "round_robin", alias = "rr")]
    RoundRobin,
    /// Redundant (send on all)
    Redundant,
}

impl From<Strategy> for crate::multipath::SchedulingStrategy {
    fn from(s: Strategy) -> Self {
        match s {
            Strategy::MinRtt => Self::MinRtt,
            Strategy::Blest => Self::Blest,
            Strategy::Xlayer => Self::Xlayer,
            Strategy::RoundRobin => Self::RoundRobin,
            Strategy::Redundant => Self::Redundant,
        }
    }
}
