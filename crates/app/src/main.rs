use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;

use crosstalk_app::config::{Cli, WorkerConfig};
use crosstalk_app::worker::{spawn_provider_watchdog, HostServices, WorkerHost};
use crosstalk_foundation::{ShutdownHandler, StateManager, WorkerError, WorkerState};
use crosstalk_profile::{HttpProfileStore, ProfileCache};
use crosstalk_stt_deepgram::{DeepgramSttConfig, DeepgramSttPlugin};
use crosstalk_translate::{LlmTranslator, LlmTranslatorConfig, RetryingTranslator};
use crosstalk_tts::VoiceCatalog;
use crosstalk_tts_deepgram::{DeepgramTtsConfig, DeepgramTtsEngine};

const PROVIDER_CHECK_INTERVAL: Duration = Duration::from_secs(30);
const PROFILE_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

fn init_logging(log_dir: &str) -> Result<(), WorkerError> {
    std::fs::create_dir_all(log_dir)
        .map_err(|e| WorkerError::Config(format!("cannot create log dir {log_dir}: {e}")))?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "crosstalk.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_writer(std::io::stdout.and(non_blocking_file))
        .with_env_filter(log_level)
        .init();

    // The appender guard must outlive the process.
    std::mem::forget(guard);
    Ok(())
}

async fn run(config: WorkerConfig) -> Result<(), WorkerError> {
    let state = StateManager::new();
    let shutdown = ShutdownHandler::new().install().await;

    // Providers are shared across every room this process hosts; their
    // pools and rate limiters live inside the adapters.
    let stt = Arc::new(DeepgramSttPlugin::new(DeepgramSttConfig::new(
        config.deepgram_api_key.clone(),
    )));
    let translator = Arc::new(RetryingTranslator::new(LlmTranslator::new(
        LlmTranslatorConfig::new(config.openai_api_key.clone()),
    )));
    let tts = Arc::new(DeepgramTtsEngine::new(DeepgramTtsConfig::new(
        config.deepgram_api_key.clone(),
    )));

    let catalog = Arc::new(VoiceCatalog::seeded());
    let store = Arc::new(HttpProfileStore::new(config.profile_api_url.clone()));
    let profiles = Arc::new(ProfileCache::new(store, Arc::clone(&catalog)));
    let _sweeper = profiles.spawn_sweeper(PROFILE_SWEEP_INTERVAL);

    let host = WorkerHost::new(HostServices {
        stt: stt.clone(),
        translator,
        tts: tts.clone(),
        profiles,
        catalog,
        buffer: config.buffer.clone(),
    });

    let mut watchdog = spawn_provider_watchdog(
        stt,
        tts,
        config.provider_grace,
        PROVIDER_CHECK_INTERVAL,
    );

    state.transition(WorkerState::Running)?;
    tracing::info!("crosstalk worker ready; awaiting room jobs");

    // Jobs arrive through the transport dispatcher integration, which hands
    // each accepted room to `host.start_job`. The loop below owns process
    // lifetime: shutdown signal or a tripped provider watchdog ends it.
    let result = tokio::select! {
        _ = shutdown.wait() => Ok(()),
        outcome = &mut watchdog => match outcome {
            Ok(err) => Err(err),
            Err(join_err) => Err(WorkerError::Config(format!("watchdog task died: {join_err}"))),
        },
    };

    state.transition(WorkerState::Draining)?;
    host.shutdown().await;
    watchdog.abort();
    state.transition(WorkerState::Stopped)?;
    result
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match WorkerConfig::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::from(err.exit_code() as u8);
        }
    };

    if let Err(err) = init_logging(&config.log_dir) {
        eprintln!("logging setup failed: {err}");
        return ExitCode::from(err.exit_code() as u8);
    }

    tracing::info!(
        max_delay_ms = config.buffer.max_delay_ms,
        interim_trigger_ms = config.buffer.interim_trigger_ms,
        "starting crosstalk worker"
    );

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("worker exiting: {err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
