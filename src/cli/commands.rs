//! CLI commands implementation.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;

use crate::config::{env_nonempty, load_settings_with_options, LoadOptions, Settings};
use crate::outbound::OutboundSender;
use crate::queue::{TaskQueue, QUEUE_NAME};
use crate::repository::util::redact_url_password;
use crate::repository::DbContext;
use crate::services::reengage::ReengageService;
use crate::services::reply::ReplyService;
use crate::services::worker::QueueWorker;

#[derive(Parser)]
#[command(name = "bestie")]
#[command(about = "SMS bestie backend: webhook intake, reply worker, and affiliate link tracking")]
#[command(version)]
pub struct Cli {
    /// Config file path (JSON, TOML, or YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory or database file
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database schema
    Init,

    /// Start the webhook API server
    Serve {
        /// Address to bind to: PORT, HOST, or HOST:PORT (default: 0.0.0.0:$PORT)
        bind: Option<String>,
    },

    /// Run the queue worker
    Work {
        /// Number of concurrent job consumers (default: 4)
        #[arg(short, long, default_value = "4")]
        workers: usize,
    },

    /// Run one re-engagement sweep and exit
    Reengage,

    /// Show system status
    Status,

    /// Expose the local API through an ngrok tunnel
    Tunnel,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (settings, _config) = load_settings_with_options(LoadOptions {
        config_path: cli.config,
        data: cli.data,
        ..LoadOptions::default()
    })
    .await;

    match cli.command {
        Commands::Init => cmd_init(&settings).await,
        Commands::Serve { bind } => cmd_serve(&settings, bind.as_deref()).await,
        Commands::Work { workers } => cmd_work(&settings, workers).await,
        Commands::Reengage => cmd_reengage(&settings).await,
        Commands::Status => cmd_status(&settings).await,
        Commands::Tunnel => cmd_tunnel(&settings).await,
    }
}

async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    let ctx = DbContext::from_url(
        &settings.database_url(),
        settings.db_pool_size,
        settings.db_pool_timeout,
    )?;
    ctx.init_schema().await?;
    println!(
        "  {} Database ready: {}",
        style("✓").green(),
        redact_url_password(&settings.database_url())
    );

    println!(
        "{} Initialized bestie in {}",
        style("✓").green(),
        settings.data_dir.display()
    );
    println!("  Run 'bestie serve' to start the API and 'bestie work' for the worker");

    Ok(())
}

async fn cmd_serve(settings: &Settings, bind: Option<&str>) -> anyhow::Result<()> {
    let (host, port) = match bind {
        Some(bind) => parse_bind_address(bind, settings.port)?,
        None => ("0.0.0.0".to_string(), settings.port),
    };

    settings.ensure_directories()?;

    // Schema DDL is IF NOT EXISTS throughout, so running it on every
    // boot is safe and keeps fresh deploys one-command
    println!("{} Preparing database...", style("→").cyan());
    let ctx = DbContext::from_url(
        &settings.database_url(),
        settings.db_pool_size,
        settings.db_pool_timeout,
    )?;
    match ctx.init_schema().await {
        Ok(()) => println!("  {} Database ready", style("✓").green()),
        Err(e) => {
            eprintln!("  {} Schema init failed: {}", style("✗").red(), e);
            return Err(anyhow::anyhow!("database schema init failed: {}", e));
        }
    }

    println!(
        "{} Starting bestie API at http://{}:{}",
        style("→").cyan(),
        host,
        port
    );
    println!("  Press Ctrl+C to stop");

    crate::server::serve(settings, &host, port).await
}

/// Parse a bind address that can be:
/// - Just a port: "8000" -> 127.0.0.1:8000
/// - Just a host: "0.0.0.0" -> 0.0.0.0:<default port>
/// - Host and port: "0.0.0.0:8000" -> 0.0.0.0:8000
fn parse_bind_address(bind: &str, default_port: u16) -> anyhow::Result<(String, u16)> {
    // Try parsing as just a port number
    if let Ok(port) = bind.parse::<u16>() {
        return Ok(("127.0.0.1".to_string(), port));
    }

    // Try parsing as host:port
    if let Some((host, port_str)) = bind.rsplit_once(':') {
        if let Ok(port) = port_str.parse::<u16>() {
            return Ok((host.to_string(), port));
        }
    }

    // Must be just a host, use the configured port
    Ok((bind.to_string(), default_port))
}

async fn cmd_work(settings: &Settings, workers: usize) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    let ctx = DbContext::from_url(
        &settings.database_url(),
        settings.db_pool_size,
        settings.db_pool_timeout,
    )?;
    ctx.init_schema().await?;

    let queue = TaskQueue::open(&settings.redis_url)?;
    let reply = ReplyService::from_env(ctx.clone(), OutboundSender::from_env());
    let reengage = ReengageService::new(ctx.clone(), reply.clone());

    println!(
        "{} Starting worker: {} consumers on queue {}",
        style("→").cyan(),
        workers,
        QUEUE_NAME
    );
    println!("  Press Ctrl+C to stop");

    QueueWorker::new(queue, ctx, reply, reengage)
        .run(workers)
        .await
}

async fn cmd_reengage(settings: &Settings) -> anyhow::Result<()> {
    if !settings.database_exists() {
        println!(
            "{} System not initialized. Run 'bestie init' first.",
            style("!").yellow()
        );
        return Ok(());
    }

    let ctx = DbContext::from_url(
        &settings.database_url(),
        settings.db_pool_size,
        settings.db_pool_timeout,
    )?;
    let reply = ReplyService::from_env(ctx.clone(), OutboundSender::from_env());
    let sent = ReengageService::new(ctx, reply).run().await?;

    if sent == 0 {
        println!("{} No conversations due for a nudge", style("✓").green());
    } else {
        println!(
            "{} Sent {} re-engagement nudge(s)",
            style("✓").green(),
            sent
        );
    }

    Ok(())
}

async fn cmd_status(settings: &Settings) -> anyhow::Result<()> {
    if !settings.database_exists() {
        println!(
            "{} System not initialized. Run 'bestie init' first.",
            style("!").yellow()
        );
        return Ok(());
    }

    let ctx = DbContext::from_url(
        &settings.database_url(),
        settings.db_pool_size,
        settings.db_pool_timeout,
    )?;

    println!("\n{}", style("Bestie Status").bold());
    println!("{}", "-".repeat(40));
    println!("{:<20} {}", "Data Directory:", settings.data_dir.display());
    println!(
        "{:<20} {}",
        "Database:",
        redact_url_password(&settings.database_url())
    );
    println!("{:<20} {}", "Users:", ctx.users().count().await?);
    println!(
        "{:<20} {}",
        "Conversations:",
        ctx.conversations().count().await?
    );
    println!("{:<20} {}", "Messages:", ctx.messages().count().await?);
    println!("{:<20} {}", "Links:", ctx.links().count().await?);

    // Queue depth is best effort; the API keeps serving while Redis is
    // down and status should too
    let depth = match TaskQueue::open(&settings.redis_url) {
        Ok(queue) => queue.depth().await.ok(),
        Err(_) => None,
    };
    match depth {
        Some(depth) => println!("{:<20} {}", "Queued Jobs:", depth),
        None => println!(
            "{:<20} {}",
            "Queued Jobs:",
            style("redis unreachable").dim()
        ),
    }

    Ok(())
}

async fn cmd_tunnel(settings: &Settings) -> anyhow::Result<()> {
    let ngrok = which::which("ngrok").map_err(|_| {
        anyhow::anyhow!("ngrok not found in PATH; install it from https://ngrok.com/download")
    })?;

    let mut cmd = tokio::process::Command::new(&ngrok);
    cmd.arg("http").arg(settings.port.to_string());

    match env_nonempty("NGROK_DOMAIN") {
        Some(domain) => {
            cmd.arg("--domain").arg(&domain);
            println!(
                "{} Tunneling https://{} -> 127.0.0.1:{}",
                style("→").cyan(),
                domain,
                settings.port
            );
        }
        None => println!(
            "{} Tunneling port {} on a random subdomain (set NGROK_DOMAIN to pin one)",
            style("→").cyan(),
            settings.port
        ),
    }

    let status = cmd.status().await?;
    if !status.success() {
        anyhow::bail!("ngrok exited with {}", status);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bind_address_forms() {
        assert_eq!(
            parse_bind_address("8000", 9999).unwrap(),
            ("127.0.0.1".to_string(), 8000)
        );
        assert_eq!(
            parse_bind_address("0.0.0.0", 8000).unwrap(),
            ("0.0.0.0".to_string(), 8000)
        );
        assert_eq!(
            parse_bind_address("10.0.0.5:9001", 8000).unwrap(),
            ("10.0.0.5".to_string(), 9001)
        );
    }

    #[test]
    fn test_parse_bind_address_bad_port_falls_back_to_host() {
        // "host:notaport" does not parse as host:port, so the whole string
        // is treated as a host with the default port
        assert_eq!(
            parse_bind_address("myhost:abc", 8000).unwrap(),
            ("myhost:abc".to_string(), 8000)
        );
    }
}
