use clap::Parser;
use colored::*;
use eyre::{Context, Result, bail};
use log::{error, info};
use std::fs;
use std::path::PathBuf;

use hchk::HealthService;
use hchk::eventlog::LogSink;
use hchk::host::{ConsoleHost, ConsoleHostConfig};
use hchk::probe::HttpProbe;

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use config::Config;

/// Where log output goes for this invocation
enum LogTarget {
    Stderr,
    File,
}

fn setup_logging(target: LogTarget, level: &str) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));

    if let LogTarget::File = target {
        // Create log directory
        let log_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hchk")
            .join("logs");

        fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

        let log_file = log_dir.join("hchk.log");
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?;

        builder.target(env_logger::Target::Pipe(Box::new(file)));
        builder.init();
        info!("Logging initialized, writing to: {}", log_file.display());
    } else {
        builder.init();
    }
    Ok(())
}

fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    if cli.is_verbose() {
        eprintln!("{}", "Verbose mode enabled".yellow());
    }

    let url = config.resolve_url(cli.url.as_deref());
    if cli.command.needs_url() && url.is_none() {
        bail!("a healthcheck URL is required for this command (use --url)");
    }
    let url = url.unwrap_or_default();

    match cli.command {
        Commands::Debug => run_service(&url, config, true),
        Commands::Run => run_service(&url, config, false),
        Commands::Install => handle_install(&url, config),
        Commands::Remove => handle_remove(config),
        Commands::Start => handle_start(config),
        Commands::Stop => handle_stop(config),
    }
}

fn run_service(url: &str, config: &Config, debug: bool) -> Result<()> {
    info!("Starting service");

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let result = runtime.block_on(async {
        let probe = HttpProbe::with_timeout(config.probe.timeout(), &config.probe.user_agent)?;
        let host = ConsoleHost::start(&ConsoleHostConfig { read_stdin: debug })?;
        let (commands, status, status_task) = host.into_parts();

        let stats = HealthService::new(url, probe, LogSink)
            .run(commands, status)
            .await?;
        let _ = status_task.await;
        Ok::<_, hchk::HchkError>(stats)
    });
    // stdin reads cannot be cancelled; don't wait for them
    runtime.shutdown_background();

    match result {
        Ok(stats) => {
            info!(
                "Service stopped ticks={} probes={} failures={} skipped={}",
                stats.ticks, stats.probes, stats.failures, stats.skipped
            );
            Ok(())
        }
        Err(e) => {
            error!("Service failed: {}", e);
            Err(e).context("Service failed")
        }
    }
}

fn handle_install(url: &str, config: &Config) -> Result<()> {
    let executable = std::env::current_exe().context("Failed to locate current executable")?;
    let unit = config.service.unit();
    let path = unit
        .install(&executable, url, config.source.as_deref())
        .context("Failed to run command install")?;
    println!("{} {} ({})", "Installed:".green(), unit.name, path.display());
    Ok(())
}

fn handle_remove(config: &Config) -> Result<()> {
    let unit = config.service.unit();
    unit.remove().context("Failed to run command remove")?;
    println!("{} {}", "Removed:".green(), unit.name);
    Ok(())
}

fn handle_start(config: &Config) -> Result<()> {
    let unit = config.service.unit();
    unit.start().context("Failed to run command start")?;
    println!("{} {}", "Started:".green(), unit.name);
    Ok(())
}

fn handle_stop(config: &Config) -> Result<()> {
    let unit = config.service.unit();
    unit.stop().context("Failed to run command stop")?;
    println!("{} {}", "Stopped:".red(), unit.name);
    Ok(())
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration; a config file that exists but is broken is fatal
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Service mode logs to a file, everything else to the terminal
    let target = match cli.command {
        Commands::Run => LogTarget::File,
        _ => LogTarget::Stderr,
    };
    setup_logging(target, config.log_level()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", config.source);

    // Run the main application logic
    run_application(&cli, &config).context("Application failed")?;

    Ok(())
}
