use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use miraibot_common::models::SupervisorState;
use miraibot_common::traits::repository_traits::CredentialStore;
use miraibot_core::eventbus::{BotEvent, EventBus};
use miraibot_core::tasks::{MemoryWatchdog, WatchdogOutcome};
use miraibot_core::{Error, RunOutcome};

mod context;
use context::BotContext;

#[derive(Parser, Debug, Clone)]
#[command(name = "miraibot")]
#[command(author, version, about = "MiraiBot - Messenger chat bot")]
pub struct Args {
    /// Bot configuration file.
    #[arg(long, default_value = "config.json")]
    pub config: PathBuf,

    /// Overrides `credential_path` from the config.
    #[arg(long)]
    pub credential_path: Option<PathBuf>,

    /// Fail instead of prompting when a two-factor code is required.
    #[arg(long, default_value = "false")]
    pub headless: bool,
}

fn init_tracing() {
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("log bridge already installed: {e}");
    }
    let filter = EnvFilter::from_default_env()
        .add_directive("miraibot=info".parse().unwrap_or_default())
        .add_directive("miraibot_core=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(sub) {
        eprintln!("Failed to set global subscriber: {e}");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    init_tracing();
    let args = Args::parse();
    info!("MiraiBot starting. config={}, headless={}", args.config.display(), args.headless);

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let started = Instant::now();
    let cancel = CancellationToken::new();
    let mut ctx = BotContext::new(&args, cancel.clone())
        .await
        .context("failed to initialise the bot")?;

    // Ctrl-C => cancel everything
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {:?}", e);
            return;
        }
        info!("Ctrl-C detected; shutting down...");
        cancel_on_signal.cancel();
    });

    let watchdog = if ctx.config.watchdog.enabled {
        Some(MemoryWatchdog::from_settings(&ctx.config.watchdog, cancel.clone()).spawn())
    } else {
        None
    };

    let consumer = spawn_event_logger(ctx.event_bus.clone()).await;

    // Banner on the first time the stream is up.
    let mut handle = ctx.runtime.supervisor_handle();
    let store = ctx.store.clone();
    let bot_name = ctx.config.bot_name.clone().unwrap_or_else(|| "MiraiBot".to_string());
    let prefix = ctx.config.prefix.clone().unwrap_or_else(|| "/".to_string());
    let bus = ctx.event_bus.clone();
    let banner = tokio::spawn(async move {
        if handle.wait_for(SupervisorState::Listening).await.is_err() {
            return;
        }
        let identity = match store.load().await {
            Ok(Some(session)) => session.identity_id().unwrap_or("unknown").to_string(),
            _ => "unknown".to_string(),
        };
        info!("ID BOT: {}", identity);
        info!("PREFIX: {}", prefix);
        info!("NAME BOT: {}", bot_name);
        info!("Startup time: {} ms", started.elapsed().as_millis());
        bus.publish_system(format!("{} online as {}", bot_name, identity)).await;
    });

    let result = ctx.runtime.run().await;

    cancel.cancel();
    banner.abort();
    ctx.event_bus.shutdown();
    if let Err(e) = consumer.await {
        warn!("Event logger ended abnormally: {:?}", e);
    }

    let breached = match watchdog {
        Some(handle) => matches!(handle.await, Ok(WatchdogOutcome::ThresholdExceeded { .. })),
        None => false,
    };

    let code = exit_code(&result, breached);
    info!("MiraiBot stopped ({:?}). Goodbye!", code);
    Ok(code)
}

fn exit_code(result: &Result<RunOutcome, Error>, watchdog_breached: bool) -> ExitCode {
    if watchdog_breached {
        return ExitCode::FAILURE;
    }
    match result {
        Ok(RunOutcome::Stopped) => ExitCode::SUCCESS,
        Ok(RunOutcome::ChallengeFailed) => {
            error!("Stopping: the platform warning could not be cleared.");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Stopping: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Logs every bus event until the bus shuts down.
async fn spawn_event_logger(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut rx = event_bus.subscribe(None).await;
    let mut shutdown_rx = event_bus.shutdown_rx.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                maybe_event = rx.recv() => match maybe_event {
                    Some(BotEvent::Message { message, .. }) => {
                        info!(
                            "[{}] thread={} sender={} {}",
                            message.kind,
                            message.thread_id.as_deref().unwrap_or("-"),
                            message.sender_id.as_deref().unwrap_or("-"),
                            message.body.as_deref().unwrap_or("")
                        );
                    }
                    Some(BotEvent::SystemMessage(text)) => info!("{}", text),
                    None => break,
                },
                Ok(_) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        debug!("Event logger stopping.");
                        break;
                    }
                }
            }
        }
    })
}
