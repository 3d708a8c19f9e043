//! bubblectl - command-line entry point
//!
//! Usage:
//!   bubblectl init               Set up directories, render config, start the stack
//!   bubblectl start              Start the stack
//!   bubblectl stop               Stop the stack
//!   bubblectl restart            Restart all services
//!   bubblectl logs [service]     Stream logs
//!   bubblectl status             Container status and certificate summary
//!   bubblectl update-config      Re-render proxy config, validate, reload
//!   bubblectl issue-cert         Obtain/renew the certificate (webroot flow)
//!   bubblectl check-ssl          Inspect the issued certificate
//!   bubblectl backup             Snapshot env file, certificates, and config
//!   bubblectl restore <file>     Restore a snapshot
//!   bubblectl test-monitor       One-shot availability probe
//!   bubblectl monitor            Long-running availability monitor

use anyhow::Context;
use bubblectl::backup;
use bubblectl::certbot;
use bubblectl::compose::Compose;
use bubblectl::config::EnvConfig;
use bubblectl::monitor::ProxyMonitor;
use bubblectl::notify::TelegramNotifier;
use bubblectl::template;
use bubblectl::tls;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default env file next to the compose file
const DEFAULT_ENV_FILE: &str = ".env";

#[derive(Debug, PartialEq)]
enum Command {
    Init,
    Start,
    Stop,
    Restart,
    Logs { service: Option<String> },
    Status,
    UpdateConfig,
    IssueCert,
    CheckSsl,
    Backup,
    Restore { archive: PathBuf },
    TestMonitor,
    Monitor,
    Help,
    Version,
    Unknown(String),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bubblectl=info".parse().expect("valid log directive")),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let mut args: Vec<String> = env::args().skip(1).collect();
    let env_path = extract_env_file(&mut args);

    if args.is_empty() {
        print_help();
        return Ok(());
    }

    match parse_command(&args) {
        Command::Help => {
            print_help();
            Ok(())
        }
        Command::Version => {
            println!("bubblectl {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Unknown(name) => {
            print_help();
            anyhow::bail!("unknown command: {}", name);
        }
        Command::Init => handle_init(&env_path).await,
        Command::Start => handle_start(&env_path).await,
        Command::Stop => handle_stop(&env_path).await,
        Command::Restart => handle_restart(&env_path).await,
        Command::Logs { service } => handle_logs(&env_path, service.as_deref()).await,
        Command::Status => handle_status(&env_path).await,
        Command::UpdateConfig => handle_update_config(&env_path).await,
        Command::IssueCert => handle_issue_cert(&env_path).await,
        Command::CheckSsl => handle_check_ssl(&env_path),
        Command::Backup => handle_backup(&env_path),
        Command::Restore { archive } => handle_restore(&archive),
        Command::TestMonitor => handle_test_monitor(&env_path).await,
        Command::Monitor => handle_monitor(&env_path).await,
    }
}

/// Pull a global `--env-file <path>` flag out of the argument list.
/// Falls back to `BUBBLECTL_ENV_FILE`, then `.env`.
fn extract_env_file(args: &mut Vec<String>) -> PathBuf {
    if let Some(idx) = args.iter().position(|a| a == "--env-file") {
        if idx + 1 < args.len() {
            let path = args.remove(idx + 1);
            args.remove(idx);
            return PathBuf::from(path);
        }
        args.remove(idx);
    }

    env::var("BUBBLECTL_ENV_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_ENV_FILE))
}

fn parse_command(args: &[String]) -> Command {
    match args[0].as_str() {
        "help" | "--help" | "-h" => Command::Help,
        "version" | "--version" | "-v" => Command::Version,
        "init" => Command::Init,
        "start" | "up" => Command::Start,
        "stop" | "down" => Command::Stop,
        "restart" => Command::Restart,
        "logs" | "log" => Command::Logs {
            service: args.get(1).filter(|s| !s.starts_with('-')).cloned(),
        },
        "status" | "ps" => Command::Status,
        "update-config" | "update_config" => Command::UpdateConfig,
        "issue-cert" | "issue_cert" | "cert" => Command::IssueCert,
        "check-ssl" | "check_ssl" => Command::CheckSsl,
        "backup" => Command::Backup,
        "restore" => match args.get(1) {
            Some(path) => Command::Restore {
                archive: PathBuf::from(path),
            },
            None => Command::Unknown("restore (missing archive path)".to_string()),
        },
        "test-monitor" | "test_monitor" => Command::TestMonitor,
        "monitor" => Command::Monitor,
        other => Command::Unknown(other.to_string()),
    }
}

async fn handle_init(env_path: &Path) -> anyhow::Result<()> {
    let config = EnvConfig::load(env_path)?;
    let compose = Compose::from_config(&config);

    for dir in [
        &config.webroot_dir,
        &config.cert_dir,
        &config.backup_dir,
        &PathBuf::from("logs"),
    ] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    info!("Directory skeleton created");

    if config.nginx_template.exists() {
        template::render_file(&config.nginx_template, &config.nginx_conf, &config.vars)?;
    } else {
        warn!(
            template = %config.nginx_template.display(),
            "Template not found, skipping config render"
        );
    }

    compose.up().await?;
    println!("Stack initialised for {}", config.primary_domain);
    println!("Next: run `bubblectl issue-cert` to obtain a certificate.");
    Ok(())
}

async fn handle_start(env_path: &Path) -> anyhow::Result<()> {
    let config = EnvConfig::load(env_path)?;
    Compose::from_config(&config).up().await?;
    println!("Stack started");
    Ok(())
}

async fn handle_stop(env_path: &Path) -> anyhow::Result<()> {
    let config = EnvConfig::load(env_path)?;
    Compose::from_config(&config).down().await?;
    println!("Stack stopped");
    Ok(())
}

async fn handle_restart(env_path: &Path) -> anyhow::Result<()> {
    let config = EnvConfig::load(env_path)?;
    Compose::from_config(&config).restart().await?;
    println!("Stack restarted");
    Ok(())
}

async fn handle_logs(env_path: &Path, service: Option<&str>) -> anyhow::Result<()> {
    let config = EnvConfig::load(env_path)?;
    Compose::from_config(&config).logs(service).await
}

async fn handle_status(env_path: &Path) -> anyhow::Result<()> {
    let config = EnvConfig::load(env_path)?;
    let compose = Compose::from_config(&config);

    let ps = compose.ps().await?;
    println!("{}", ps.trim_end());
    println!();

    match tls::inspect_live_cert(&config) {
        Ok(report) => {
            let state = if report.is_expired() {
                "EXPIRED"
            } else if report.needs_renewal() {
                "renewal due"
            } else {
                "ok"
            };
            println!(
                "Certificate: {} ({} days remaining, expires {})",
                state,
                report.days_remaining,
                report.not_after.format("%Y-%m-%d")
            );
        }
        Err(_) => println!(
            "Certificate: not issued yet ({})",
            config.live_cert_path().display()
        ),
    }

    let backups = backup::list(&config.backup_dir)?;
    println!("Backups: {}", backups.len());
    Ok(())
}

/// Shared tail of config changes: re-render, validate inside the proxy
/// container, reload only when validation passed.
async fn render_and_reload(compose: &Compose, config: &EnvConfig) -> anyhow::Result<()> {
    template::render_file(&config.nginx_template, &config.nginx_conf, &config.vars)?;

    compose
        .exec(&config.nginx_service, &["nginx", "-t"])
        .await
        .context("proxy config validation failed, reload skipped")?;

    compose
        .exec(&config.nginx_service, &["nginx", "-s", "reload"])
        .await?;

    info!("Proxy configuration reloaded");
    Ok(())
}

async fn handle_update_config(env_path: &Path) -> anyhow::Result<()> {
    let config = EnvConfig::load(env_path)?;
    let compose = Compose::from_config(&config);
    render_and_reload(&compose, &config).await?;
    println!("Configuration updated and reloaded");
    Ok(())
}

async fn handle_issue_cert(env_path: &Path) -> anyhow::Result<()> {
    let config = EnvConfig::load(env_path)?;
    let compose = Compose::from_config(&config);

    // Ordering: certificate first, then config render, then reload
    certbot::issue(&compose, &config).await?;
    render_and_reload(&compose, &config).await?;

    println!(
        "Certificate issued for {} and {}",
        config.primary_domain, config.secondary_domain
    );
    Ok(())
}

fn handle_check_ssl(env_path: &Path) -> anyhow::Result<()> {
    let config = EnvConfig::load(env_path)?;
    let report = tls::inspect_live_cert(&config)?;

    println!("Subject:  {}", report.subject);
    println!("Issuer:   {}", report.issuer);
    println!("Domains:  {}", report.domains.join(", "));
    println!(
        "Expires:  {} ({} days remaining)",
        report.not_after.format("%Y-%m-%d %H:%M UTC"),
        report.days_remaining
    );

    if report.is_expired() {
        anyhow::bail!("certificate has expired, run `bubblectl issue-cert`");
    }
    if report.needs_renewal() {
        println!(
            "Warning: certificate expires within {} days, consider `bubblectl issue-cert`",
            tls::RENEWAL_WINDOW_DAYS
        );
    }
    Ok(())
}

fn handle_backup(env_path: &Path) -> anyhow::Result<()> {
    let config = EnvConfig::load(env_path)?;
    let archive = backup::create(&config, env_path)?;
    println!("Backup written to {}", archive.display());
    Ok(())
}

fn handle_restore(archive: &Path) -> anyhow::Result<()> {
    backup::restore(archive)?;
    println!("Restored from {}", archive.display());
    println!("Run `bubblectl restart` to pick up the restored configuration.");
    Ok(())
}

fn build_notifier(config: &EnvConfig) -> Option<TelegramNotifier> {
    match (&config.telegram_bot_token, &config.telegram_chat_id) {
        (Some(token), Some(chat_id)) => Some(TelegramNotifier::new(token, chat_id)),
        _ => {
            warn!("Telegram notifications disabled (TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID not set)");
            None
        }
    }
}

async fn handle_test_monitor(env_path: &Path) -> anyhow::Result<()> {
    let config = EnvConfig::load(env_path)?;
    let monitor = ProxyMonitor::new(&config.primary_domain, config.monitor.clone(), None)?;

    println!("Probing {} ...", monitor.url());
    let outcome = monitor.probe().await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if let Some(notifier) = build_notifier(&config) {
        notifier.send_test(&config.primary_domain).await?;
        println!("Telegram test message sent");
    }

    if !outcome.success {
        anyhow::bail!(
            "health probe failed: {}",
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
    println!("Health probe passed");
    Ok(())
}

async fn handle_monitor(env_path: &Path) -> anyhow::Result<()> {
    let config = EnvConfig::load(env_path)?;
    let notifier = build_notifier(&config);
    let mut monitor =
        ProxyMonitor::new(&config.primary_domain, config.monitor.clone(), notifier)?;
    monitor.run().await
}

fn print_help() {
    println!(
        r#"bubblectl - control CLI for the bubble proxy stack

USAGE:
    bubblectl [--env-file <path>] <command> [argument]

COMMANDS:
    init                 Create directories, render config, start the stack
    start                Start the stack (compose up -d)
    stop                 Stop the stack (compose down)
    restart              Restart all services
    logs [service]       Stream logs, optionally for one service
    status               Container status, certificate and backup summary

    issue-cert           Obtain/renew the certificate (certbot webroot flow)
    check-ssl            Inspect the issued certificate chain
    update-config        Re-render proxy config, validate, reload

    backup               Snapshot env file, certificates, rendered config
    restore <file>       Restore a snapshot archive

    test-monitor         One-shot availability probe of https://<domain>/health
    monitor              Long-running availability monitor with Telegram alerts

    help                 Show this help
    version              Show version

ENVIRONMENT:
    BUBBLECTL_ENV_FILE   Env file path (default: .env)
    RUST_LOG             Log filter (default: bubblectl=info)

The env file must define PRIMARY_DOMAIN, SECONDARY_DOMAIN and
LETSENCRYPT_EMAIL; see the documented optional keys for everything else."#
    );
}
