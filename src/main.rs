//! phishgate: decides which submitted URLs go to phishing analysis.
//!
//!   phishgate serve -c phishgate.yaml     # run the HTTP service
//!   phishgate check -c phishgate.yaml     # validate a config file
//!   phishgate decide -c phishgate.yaml URL...

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use phishgate::audit::AuditSink;
use phishgate::config::{self, Config, LoggingConfig};
use phishgate::dispatch::{AmqpPublisher, DispatchRouter};
use phishgate::gateway::{AppState, AuthTokens, GatewayServer, Metrics};
use phishgate::supervisor::FatalSignal;
use phishgate::validate::{NetworkInspector, UrlBlacklist, Validator};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "phishgate",
    version,
    about = "Admission gate for the phishing-detection pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        #[arg(short, long, env = "PHISHGATE_CONFIG", default_value = "phishgate.yaml")]
        config: PathBuf,
    },

    /// Validate a config file without starting anything
    Check {
        #[arg(short, long, env = "PHISHGATE_CONFIG", default_value = "phishgate.yaml")]
        config: PathBuf,
    },

    /// Run the validation chain for URLs and print each decision
    Decide {
        #[arg(short, long, env = "PHISHGATE_CONFIG", default_value = "phishgate.yaml")]
        config: PathBuf,

        #[arg(required = true)]
        urls: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { config } => run_serve(&config).await,
        Commands::Check { config } => run_check(&config),
        Commands::Decide { config, urls } => run_decide(&config, &urls).await,
    };

    if let Err(e) = result {
        eprintln!();
        eprintln!("  {} {}", "✗".red().bold(), e);
        for cause in e.chain().skip(1) {
            eprintln!("  {} {}", "caused by:".dimmed(), cause);
        }
        eprintln!();
        std::process::exit(1);
    }
}

fn setup_logging(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .with_context(|| format!("invalid log level: {}", config.level))?,
    };

    let subscriber = tracing_subscriber::registry().with(filter);
    let init = if config.format == "json" {
        subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
    };
    init.context("failed to install the log subscriber")
}

async fn run_serve(config_path: &Path) -> Result<()> {
    let config = config::parse_config_file(config_path)?;
    setup_logging(&config.logging)?;

    if config.http.auth_tokens.is_empty() {
        warn!("no auth tokens configured, every /v1 request will be rejected");
    }

    let fatal = FatalSignal::new();

    let validator = Validator::from_config(&config.validation)?;
    let publisher = Arc::new(
        AmqpPublisher::connect(&config.dispatch.dsn, fatal.clone())
            .await
            .context("dispatch init error")?,
    );
    let dispatcher = DispatchRouter::from_config(&config.dispatch, publisher.clone(), fatal.clone());
    let audit = AuditSink::open(&config.audit.who, &config.audit.path)?;
    let metrics = Metrics::new().context("failed to register metrics")?;

    let state = AppState {
        validator: Arc::new(validator),
        dispatcher: Arc::new(dispatcher),
        audit,
        metrics: Arc::new(metrics),
        tokens: Arc::new(AuthTokens::new(&config.http.auth_tokens)),
    };

    let server = GatewayServer::bind(&config.http.listen, state).await?;
    let shutdown = {
        let fatal = fatal.clone();
        async move {
            tokio::select! {
                _ = shutdown_signal() => info!("shutdown requested, draining in-flight requests"),
                reason = fatal.wait() => error!("shutting down after fatal error: {}", reason),
            }
        }
    };
    server.run(shutdown).await?;

    if let Err(e) = publisher.close().await {
        warn!("{:#}", e);
    }

    match fatal.reason() {
        Some(reason) => anyhow::bail!("service stopped: {}", reason),
        None => {
            info!("service stopped");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Validate the config and print what the service would run with.
fn run_check(config_path: &Path) -> Result<()> {
    let config = config::parse_config_file(config_path)?;
    let blacklist = UrlBlacklist::new(&config.validation.url_blacklist_regexps)?;
    let local_nets = NetworkInspector::parse_nets(&config.validation.local_ip_nets)?;

    println!();
    println!("  {} Config is valid!", "✓".green().bold());
    print_summary(&config, blacklist.len(), local_nets.len());

    if config.http.auth_tokens.is_empty() {
        println!();
        println!(
            "  {} no auth tokens configured, every /v1 request will be rejected",
            "!".yellow().bold()
        );
    }
    println!();
    Ok(())
}

fn print_summary(config: &Config, patterns: usize, nets: usize) {
    let reputation = &config.validation.reputation;
    println!("  Listen:      {}", config.http.listen.cyan());
    println!("  Tokens:      {}", config.http.auth_tokens.len());
    println!(
        "  Exchange:    {} (+{} mapped)",
        config.dispatch.exchange.cyan(),
        config.dispatch.exchanges.len()
    );
    println!("  Blacklist:   {} patterns", patterns);
    println!("  Local nets:  {}", nets);
    println!(
        "  Reputation:  {} tries, {}ms base sleep",
        reputation.max_tries, reputation.sleep_time_ms
    );
    println!("    domain     {}", reputation.check_domain_api_url.dimmed());
    println!("    ip         {}", reputation.check_ip_api_url.dimmed());
    println!("  Audit:       {}", config.audit.path.display().to_string().dimmed());
}

async fn run_decide(config_path: &Path, urls: &[String]) -> Result<()> {
    let config = config::parse_config_file(config_path)?;
    setup_logging(&config.logging)?;
    let validator = Validator::from_config(&config.validation)?;

    println!();
    for url in urls {
        match validator.decide(url).await {
            Ok(decision) => {
                let verdict = if decision.requires_processing() {
                    decision.verdict.as_str().green().bold()
                } else {
                    decision.verdict.as_str().yellow()
                };
                println!(
                    "  {}  {} {}",
                    verdict,
                    url,
                    decision
                        .domain
                        .as_deref()
                        .map(|d| format!("({})", d))
                        .unwrap_or_default()
                        .dimmed()
                );
            }
            Err(e) => println!("  {}  {} {}", "error".red().bold(), url, e),
        }
    }
    println!();
    Ok(())
}
