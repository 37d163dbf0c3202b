// SPDX-License-Identifier: Apache-2.0

use clap::{Parser, ValueEnum};
use journald_relay::bounded_channel::bounded;
use journald_relay::exporters::debug::{DebugExporter, Verbosity};
use journald_relay::init::args::JournaldReceiverArgs;
use journald_relay::init::wait::{self, TaskResult};
use journald_relay::receivers::journald::JournaldReceiver;
use journald_relay::receivers::journald::config::JournaldReceiverConfig;
use journald_relay::receivers::journald::sink::OtlpLogsSink;
use std::error::Error;
use std::process::ExitCode;
use std::time::Duration;
use tokio::select;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::metadata::LevelFilter;
use tracing::{error, info, warn};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

type BoxError = Box<dyn Error + Send + Sync>;

const SENDING_QUEUE_SIZE: usize = 1_000;

const RECEIVER_SHUTDOWN_TIMEOUT_SECS: u64 = 5;
const EXPORTER_SHUTDOWN_TIMEOUT_SECS: u64 = 3;

#[derive(Debug, Parser)]
#[command(name = "journald-relay")]
#[command(bin_name = "journald-relay")]
#[command(version, about, long_about = None)]
struct Arguments {
    #[arg(
        value_enum,
        long,
        env = "JOURNALD_RELAY_LOG_FORMAT",
        default_value = "text"
    )]
    /// Log format
    log_format: LogFormatArg,

    #[arg(
        value_enum,
        long,
        env = "JOURNALD_RELAY_DEBUG_VERBOSITY",
        default_value = "basic"
    )]
    /// How much of each received record the debug exporter writes
    debug_verbosity: Verbosity,

    #[command(flatten)]
    receiver: JournaldReceiverArgs,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

fn main() -> ExitCode {
    let opt = Arguments::parse();

    let config = match opt.receiver.build_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: invalid configuration: {}", e);
            return ExitCode::from(2);
        }
    };

    let _guard = match setup_logging(&opt.log_format) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("ERROR: failed to setup logging: {}", e);
            return ExitCode::from(1);
        }
    };

    match run_relay(config, opt.debug_verbosity) {
        Ok(_) => {}
        Err(e) => {
            error!(error = e, "Failed to run journald relay.");
            return ExitCode::from(1);
        }
    }

    ExitCode::SUCCESS
}

#[tokio::main]
async fn run_relay(config: JournaldReceiverConfig, verbosity: Verbosity) -> Result<(), BoxError> {
    info!(version = get_version(), "Starting journald relay");

    let (logs_tx, logs_rx) = bounded(SENDING_QUEUE_SIZE);

    let mut receivers_task_set: JoinSet<TaskResult> = JoinSet::new();
    let mut exporters_task_set: JoinSet<TaskResult> = JoinSet::new();
    let receivers_cancel = CancellationToken::new();
    let exporters_cancel = CancellationToken::new();

    {
        let token = exporters_cancel.clone();
        let mut exporter = DebugExporter::new(logs_rx, verbosity);
        exporters_task_set.spawn(async move {
            exporter.start(token).await;
            Ok(())
        });
    }

    {
        let token = receivers_cancel.clone();
        let source = journal_source(&config);
        let mut receiver = JournaldReceiver::new(config, source, OtlpLogsSink::new(logs_tx))?;
        receivers_task_set.spawn(async move {
            receiver
                .run(&token)
                .await
                .map(|_| ())
                .map_err(|e| e.into())
        });
    }

    let mut result = Ok(());
    select! {
        _ = signal_wait() => {
            info!("Shutdown signal received.");
        },
        e = wait::wait_for_any_task(&mut receivers_task_set) => {
            match e {
                Ok(()) => warn!("Unexpected early exit of journald receiver."),
                Err(e) => result = Err(e),
            }
        },
    }

    // The receiver saves its position before exiting, give it time to do so
    receivers_cancel.cancel();
    if let Err(e) = wait::wait_for_tasks_with_timeout(
        &mut receivers_task_set,
        Duration::from_secs(RECEIVER_SHUTDOWN_TIMEOUT_SECS),
    )
    .await
    {
        error!(error = e, "Journald receiver did not shut down cleanly.");
    }

    exporters_cancel.cancel();
    wait::wait_for_tasks_with_timeout(
        &mut exporters_task_set,
        Duration::from_secs(EXPORTER_SHUTDOWN_TIMEOUT_SECS),
    )
    .await?;

    result
}

#[cfg(not(feature = "sd_journal"))]
fn journal_source(
    config: &JournaldReceiverConfig,
) -> journald_relay::receivers::journald::journalctl::JournalctlSource {
    journald_relay::receivers::journald::journalctl::JournalctlSource::new(
        config.journalctl_path.clone(),
        config.journal_directory.clone(),
    )
}

#[cfg(feature = "sd_journal")]
fn journal_source(
    config: &JournaldReceiverConfig,
) -> journald_relay::receivers::journald::sd_journal::SdJournalSource {
    journald_relay::receivers::journald::sd_journal::SdJournalSource::new(
        config.journal_directory.clone(),
    )
}

type LoggerGuard = tracing_appender::non_blocking::WorkerGuard;

fn setup_logging(log_format: &LogFormatArg) -> Result<LoggerGuard, BoxError> {
    LogTracer::init()?;

    let (non_blocking_writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?
        .add_directive("opentelemetry=warn".parse()?);

    if *log_format == LogFormatArg::Json {
        let app_name = format!("{}-{}", env!("CARGO_PKG_NAME"), get_version());
        let bunyan_formatting_layer = BunyanFormattingLayer::new(app_name, non_blocking_writer);

        let subscriber = Registry::default()
            .with(filter)
            .with(JsonStorageLayer)
            .with(bunyan_formatting_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        use std::io;
        use std::io::IsTerminal;

        // Skip color codes when not in a terminal
        let use_ansi = io::stdout().is_terminal();

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_target(false)
            .with_level(true)
            .with_ansi(use_ansi)
            .compact();

        let subscriber = Registry::default().with(filter).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(guard)
}

fn get_version() -> String {
    // Set during CI
    let version_build = option_env!("BUILD_SHORT_SHA").unwrap_or("dev");

    format!("{}-{}", env!("CARGO_PKG_VERSION"), version_build)
}

async fn signal_wait() {
    let (mut sig_term, mut sig_int) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                error!(error = %e, "Unable to install signal handlers");
                return std::future::pending().await;
            }
        };

    select! {
        _ = sig_term.recv() => {},
        _ = sig_int.recv() => {},
    }
}
