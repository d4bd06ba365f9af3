//! stickylb - sticky-cookie peer selection
//!
//! Usage:
//!     stickylb --config <path> [--validate | --digests | --route <upstream>]
//!
//! See --help for more options.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use stickylb::backend::PeerState;
use stickylb::config::load_config;
use stickylb::state::AppState;
use stickylb::util::init_logging;

/// Sticky-cookie peer selection with round-robin and least-connections fallback.
#[derive(Parser, Debug)]
#[command(name = "stickylb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// Print the routing cookie value of every sticky peer and exit
    #[arg(long)]
    digests: bool,

    /// Run peer selection for one request on this upstream
    #[arg(long, value_name = "UPSTREAM")]
    route: Option<String>,

    /// Cookie header sent with the simulated request
    #[arg(long, value_name = "VALUE", requires = "route")]
    cookie: Option<String>,

    /// Number of attempts for the simulated request
    #[arg(long, value_name = "N", default_value_t = 1, requires = "route")]
    attempts: u32,

    /// Report every simulated attempt as failed
    #[arg(long, requires = "route")]
    fail: bool,

    /// Print metrics in the Prometheus text format after routing
    #[arg(long, requires = "route")]
    metrics: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config).with_context(|| {
        format!(
            "failed to load configuration from '{}'",
            cli.config.display()
        )
    })?;

    // CLI overrides config
    let log_level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.global.log_level);

    init_logging(log_level, &config.global.log_format).context("failed to initialize logging")?;

    let state = AppState::new(&config).context("failed to build upstream groups")?;

    if cli.validate {
        info!("Configuration is valid");
        println!("Configuration is valid.");
        println!("  Upstreams: {}", config.upstreams.len());
        for upstream in &config.upstreams {
            let backups = upstream.servers.iter().filter(|s| s.backup).count();
            println!(
                "    - {} ({} servers, {} backup) [{}{}]",
                upstream.name,
                upstream.servers.len() - backups,
                backups,
                upstream.algorithm(),
                if upstream.sticky.is_some() { ", sticky" } else { "" }
            );
        }
        return Ok(());
    }

    if cli.digests {
        print_digests(&state);
        return Ok(());
    }

    if let Some(upstream) = &cli.route {
        return route(&state, upstream, &cli);
    }

    info!(
        config_path = %cli.config.display(),
        upstreams = config.upstreams.len(),
        "nothing to do, pass --validate, --digests or --route"
    );
    Ok(())
}

fn print_digests(state: &AppState) {
    let router = state.router();
    for name in router.names() {
        let Some(group) = router.group(name) else {
            continue;
        };
        if !group.sticky_enabled() {
            println!("{name}: sticky routing disabled");
            continue;
        }

        println!("{name}:");
        for (index, address) in group.pool().addresses().iter().enumerate() {
            let value = group.cookie_value(index).unwrap_or_default();
            println!("  {index:>3}  {address:<40}  {value}");
        }
    }
}

/// Run the attempts of one simulated request and print each decision.
fn route(state: &AppState, upstream: &str, cli: &Cli) -> Result<()> {
    let router = state.router();
    let headers: Vec<&str> = cli.cookie.as_deref().into_iter().collect();

    let Some(mut request) = router.begin(upstream, headers) else {
        bail!("unknown upstream '{upstream}'");
    };

    let outcome = if cli.fail {
        PeerState::Failed
    } else {
        PeerState::Succeeded
    };

    for attempt in 1..=cli.attempts {
        match request.get_peer() {
            Ok(peer) => {
                println!(
                    "attempt {attempt}: {} (index {}{})",
                    peer.address,
                    peer.index,
                    if peer.backup { ", backup" } else { "" }
                );
                if let Some(cookie) = request.take_cookie() {
                    println!("  Set-Cookie: {cookie}");
                }
                request.free_peer(outcome);
            }
            Err(busy) => {
                warn!(upstream, attempt, error = %busy, "no peer selected");
                println!("attempt {attempt}: busy ({busy})");
                break;
            }
        }
    }

    if cli.metrics {
        let text = state.metrics().encode().context("failed to encode metrics")?;
        print!("{text}");
    }

    Ok(())
}
