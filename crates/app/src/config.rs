//! Worker configuration: CLI flags plus environment-carried secrets.

use std::time::Duration;

use crate::pipeline::BufferConfig;
use clap::Parser;
use crosstalk_foundation::WorkerError;

pub const ENV_DEEPGRAM_API_KEY: &str = "CROSSTALK_DEEPGRAM_API_KEY";
pub const ENV_OPENAI_API_KEY: &str = "CROSSTALK_OPENAI_API_KEY";
pub const ENV_PROFILE_API_URL: &str = "CROSSTALK_PROFILE_API_URL";

#[derive(Debug, Parser)]
#[command(
    name = "crosstalk-worker",
    about = "Simultaneous-interpretation worker: one translation pipeline per listener/speaker pair"
)]
pub struct Cli {
    /// Directory for rotated log files.
    #[arg(long, default_value = "logs")]
    pub log_dir: String,

    /// Soft per-segment deadline from first transcript to TTS start.
    #[arg(long, default_value_t = 500)]
    pub max_delay_ms: u64,

    /// Minimum interim age before a provisional translation is issued.
    #[arg(long, default_value_t = 250)]
    pub interim_trigger_ms: u64,

    /// Tear down a room's coordinator after it has been empty this long.
    #[arg(long, default_value_t = 300)]
    pub empty_room_timeout_secs: u64,

    /// Continuous provider outage tolerated before the process exits.
    #[arg(long, default_value_t = 120)]
    pub provider_grace_secs: u64,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub deepgram_api_key: String,
    pub openai_api_key: String,
    pub profile_api_url: String,
    pub log_dir: String,
    pub buffer: BufferConfig,
    pub empty_room_timeout: Duration,
    pub provider_grace: Duration,
}

impl WorkerConfig {
    /// Merge CLI flags with environment secrets, validating everything the
    /// process cannot run without.
    pub fn load(cli: &Cli) -> Result<Self, WorkerError> {
        let deepgram_api_key = require_env(ENV_DEEPGRAM_API_KEY)?;
        let openai_api_key = require_env(ENV_OPENAI_API_KEY)?;
        let profile_api_url = require_env(ENV_PROFILE_API_URL)?;

        if cli.max_delay_ms == 0 {
            return Err(WorkerError::Config("max_delay_ms must be positive".into()));
        }
        if cli.interim_trigger_ms >= cli.max_delay_ms {
            return Err(WorkerError::Config(format!(
                "interim_trigger_ms ({}) must be below max_delay_ms ({})",
                cli.interim_trigger_ms, cli.max_delay_ms
            )));
        }

        let buffer = BufferConfig {
            max_delay_ms: cli.max_delay_ms,
            interim_trigger_ms: cli.interim_trigger_ms,
            ..BufferConfig::default()
        };

        Ok(Self {
            deepgram_api_key,
            openai_api_key,
            profile_api_url,
            log_dir: cli.log_dir.clone(),
            buffer,
            empty_room_timeout: Duration::from_secs(cli.empty_room_timeout_secs),
            provider_grace: Duration::from_secs(cli.provider_grace_secs),
        })
    }
}

fn require_env(name: &str) -> Result<String, WorkerError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(WorkerError::Config(format!("{name} is not set"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut full = vec!["crosstalk-worker"];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    #[test]
    fn defaults_follow_latency_contract() {
        let cli = cli(&[]);
        assert_eq!(cli.max_delay_ms, 500);
        assert_eq!(cli.interim_trigger_ms, 250);
    }

    #[test]
    fn interim_trigger_must_stay_below_deadline() {
        std::env::set_var(ENV_DEEPGRAM_API_KEY, "dg");
        std::env::set_var(ENV_OPENAI_API_KEY, "oa");
        std::env::set_var(ENV_PROFILE_API_URL, "http://localhost:8000/api/v1");

        let bad = cli(&["--max-delay-ms", "300", "--interim-trigger-ms", "400"]);
        let err = WorkerConfig::load(&bad).unwrap_err();
        assert_eq!(err.exit_code(), 1);

        let good = cli(&[]);
        let config = WorkerConfig::load(&good).unwrap();
        assert_eq!(config.buffer.max_delay_ms, 500);
    }
}
