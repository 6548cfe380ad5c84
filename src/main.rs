use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast;

mod cli;
mod config;
mod error;
mod metrics;
mod models;
mod monitor;
mod services;
mod sink;

use cli::CommandArgs;
use config::{MonitorConfig, OutputFormat};
use error::ConfigError;
use monitor::MonitorLoop;
use sink::ConsoleSink;

/// 退出时等待仍在运行的阻塞采集任务的最长时间
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CommandArgs::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("❌ Failed to start tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let code = runtime.block_on(run(args));
    // 卡住的采集任务（如 /proc 读取挂起）不能阻止进程退出
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    code
}

async fn run(args: CommandArgs) -> ExitCode {
    let config = match MonitorConfig::load(args.config.as_deref(), &args.overrides()) {
        Ok(config) => config,
        Err(e) => return config_failure(&e),
    };

    if config.output == OutputFormat::Text {
        print_banner(&config);
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let sink = ConsoleSink::stdout(config.output);

    let mut monitor = match MonitorLoop::new(config, sink, shutdown_rx) {
        Ok(monitor) => monitor,
        Err(e) => return config_failure(&e),
    };

    tokio::spawn(forward_shutdown_signal(shutdown_tx));

    if args.once {
        if monitor.run_tick().await.is_none() {
            log::info!("Interrupted before the tick completed");
        }
    } else {
        monitor.run().await;
    }

    log::info!("✅ Shutdown complete");
    ExitCode::SUCCESS
}

fn config_failure(e: &ConfigError) -> ExitCode {
    log::error!("❌ Invalid configuration: {}", e);
    let mut current: Option<&dyn std::error::Error> = std::error::Error::source(e);
    while let Some(err) = current {
        log::error!("     - {}", err);
        current = err.source();
    }
    eprintln!("health-monitor: configuration error: {}", e);
    ExitCode::from(2)
}

/// 收到 SIGINT/SIGTERM 后通知监控循环
async fn forward_shutdown_signal(tx: broadcast::Sender<()>) {
    match shutdown_signal().await {
        Ok(name) => {
            log::info!("🛑 Received {}, shutting down", name);
            let _ = tx.send(());
        }
        Err(e) => {
            log::error!("Failed to listen for shutdown signals: {:#}", e);
            // 保持 sender 存活，否则循环会立即退出
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> anyhow::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate()).context("cannot install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("cannot listen for Ctrl-C")?;
            Ok("SIGINT")
        }
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> anyhow::Result<&'static str> {
    tokio::signal::ctrl_c().await.context("cannot listen for Ctrl-C")?;
    Ok("Ctrl-C")
}

fn print_banner(config: &MonitorConfig) {
    println!("╔═══════════════════════════════════════════════════════════╗");
    println!("║      Health Monitor v{:<37}║", env!("CARGO_PKG_VERSION"));
    println!("╚═══════════════════════════════════════════════════════════╝");
    println!();
    println!("🩺 Endpoint: {} (timeout {:?})", config.endpoint_url, config.endpoint_timeout());
    println!("⏱  Interval: {:?}", config.tick_interval());
    println!();
    println!("📋 Services:");
    for service in &config.services {
        println!(
            "  • {:<16} {:?} '{}'  mem > {:.1}%",
            service.name, service.match_strategy, service.process_match, service.memory_threshold_percent
        );
    }
    println!();
    println!("📄 Log files (last {} lines):", config.log_tail_lines);
    for file in &config.log_files {
        println!("  • {}", file.display());
    }
    if let Some(path) = &config.metrics_file {
        println!();
        println!("📈 Metrics textfile: {}", path.display());
    }
    println!("═══════════════════════════════════════════════════════════");
}
