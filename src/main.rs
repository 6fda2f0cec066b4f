use clap::{Parser, Subcommand};
use geofix::location::{FeedSource, ProviderMode};
use geofix::plugin::{GeolocationPlugin, PluginConfig, PluginResult, StaticPermissions};
use geofix::scenario::Scenario;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// geofix: location arbiter
///
/// Reconciles satellite (gps) and network fixes into one best position.
///
/// Examples:
///   geofix locate --scenario drive.json --mode both
///   geofix locate --scenario indoor.json --mode coarse --interval 0
///   geofix serve --port 8640 --mode both
#[derive(Parser)]
#[command(name = "geofix", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one single-shot position request against a scenario file.
    Locate {
        /// Scenario JSON: provider state plus events to replay.
        #[arg(long, short = 's')]
        scenario: PathBuf,

        #[command(flatten)]
        session: SessionArgs,
    },
    /// Serve the HTTP API. Providers push fixes, clients request positions.
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(long, default_value_t = 8640)]
        port: u16,

        #[command(flatten)]
        session: SessionArgs,
    },
}

#[derive(clap::Args)]
struct SessionArgs {
    /// Provider mode: "fine" (gps), "coarse" (network) or "both".
    #[arg(long, short = 'm', default_value = "coarse", value_parser = parse_mode)]
    mode: ProviderMode,

    /// Minimum milliseconds between updates. Negative values mean 0.
    #[arg(long, default_value_t = geofix::plugin::PLUGIN_INTERVAL_MS, allow_hyphen_values = true)]
    interval: i64,

    /// Minimum meters between updates. Negative values mean 0.
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    min_distance: f64,
}

impl SessionArgs {
    fn config(&self) -> PluginConfig {
        PluginConfig {
            mode: self.mode,
            interval_ms: self.interval,
            min_distance_m: self.min_distance,
        }
    }
}

fn parse_mode(s: &str) -> Result<ProviderMode, String> {
    s.parse()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("geofix=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Locate { scenario, session } => locate(&scenario, session.config()),
        Command::Serve { host, port, session } => {
            let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
                eprintln!("Error: Cannot start runtime: {}", e);
                std::process::exit(1);
            });
            runtime.block_on(geofix::server::start(&host, port, FeedSource::standard(), session.config()));
        }
    }
}

fn locate(path: &Path, config: PluginConfig) {
    let scenario = Scenario::load(path).unwrap_or_else(|e| {
        eprintln!("Error: {}: {}", path.display(), e);
        std::process::exit(1);
    });

    let feed = FeedSource::new();
    scenario.apply(&feed);

    let mut plugin = GeolocationPlugin::with_config(feed.clone(), StaticPermissions::all(), config);
    let (reply_tx, mut reply_rx) = tokio::sync::mpsc::unbounded_channel::<PluginResult>();
    plugin.execute("getCurrentPosition2", reply_tx);

    if let Some(best) = plugin.arbiter().and_then(|a| a.current_cached_position()) {
        eprintln!(
            "  \u{1F4CD} cached {} fix: {:.5}, {:.5} (\u{00B1}{:.0} m)",
            best.provider, best.latitude, best.longitude, best.accuracy
        );
    }

    scenario.replay(&feed);
    plugin.poll();
    plugin.destroy();

    match reply_rx.try_recv() {
        Ok(PluginResult::Position(payload)) => match payload.to_json() {
            Ok(json) => println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default()),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
        Ok(PluginResult::Error(msg)) => {
            eprintln!("Error: {}", msg);
            std::process::exit(1);
        }
        Ok(other) => {
            eprintln!("Error: unexpected reply {:?}", other);
            std::process::exit(1);
        }
        Err(_) => {
            eprintln!("Error: scenario ended without a fix (mode: {})", config.mode);
            std::process::exit(1);
        }
    }
}
