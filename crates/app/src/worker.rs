//! Worker host: runs many room jobs in one process.
//!
//! The media transport's dispatcher hands a job to the worker when a room
//! is created or the first agent-requiring participant joins. Each job gets
//! its own coordinator and transport connection; rooms share only the
//! provider adapters, the profile cache and the voice catalog.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::coordinator::{Coordinator, CoordinatorConfig, CoordinatorHandle, RoomServices};
use crate::pipeline::BufferConfig;
use crosstalk_foundation::{WorkerError, ShutdownGuard};
use crosstalk_profile::{ProfileCache, ProfileSnapshot};
use crosstalk_stt::SttPlugin;
use crosstalk_telemetry::RoomStatsSnapshot;
use crosstalk_translate::Translator;
use crosstalk_transport::{RoomTransport, RoomType};
use crosstalk_tts::{TtsEngine, VoiceCatalog};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Job description from the dispatcher.
pub struct RoomJob {
    pub room_id: String,
    pub room_type: RoomType,
    pub transport: Arc<dyn RoomTransport>,
    /// Profiles known at token-mint time; pre-populate the cache so the
    /// first pipelines spawn without a store round-trip.
    pub seed_profiles: Vec<ProfileSnapshot>,
    pub empty_room_timeout: Duration,
}

/// Services shared by every room this process hosts.
#[derive(Clone)]
pub struct HostServices {
    pub stt: Arc<dyn SttPlugin>,
    pub translator: Arc<dyn Translator>,
    pub tts: Arc<dyn TtsEngine>,
    pub profiles: Arc<ProfileCache>,
    pub catalog: Arc<VoiceCatalog>,
    pub buffer: BufferConfig,
}

struct ActiveJob {
    handle: CoordinatorHandle,
    task: JoinHandle<()>,
}

pub struct WorkerHost {
    services: HostServices,
    jobs: Mutex<HashMap<String, ActiveJob>>,
}

impl WorkerHost {
    pub fn new(services: HostServices) -> Self {
        Self {
            services,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Accept a job and bind a coordinator to its room. Rejects a duplicate
    /// room id while the previous job is still running.
    pub fn start_job(&self, job: RoomJob) -> Result<(), WorkerError> {
        let mut jobs = self.jobs.lock();
        if let Some(existing) = jobs.get(&job.room_id) {
            if !existing.task.is_finished() {
                return Err(WorkerError::Config(format!(
                    "room {} already has a running job",
                    job.room_id
                )));
            }
            jobs.remove(&job.room_id);
        }

        for profile in &job.seed_profiles {
            self.services.profiles.put(profile.clone());
        }

        let mut config = CoordinatorConfig::new(job.room_id.clone(), job.room_type);
        config.empty_room_timeout = job.empty_room_timeout;
        config.buffer = self.services.buffer.clone();

        let services = RoomServices {
            stt: Arc::clone(&self.services.stt),
            translator: Arc::clone(&self.services.translator),
            tts: Arc::clone(&self.services.tts),
            transport: job.transport,
            profiles: Arc::clone(&self.services.profiles),
            catalog: Arc::clone(&self.services.catalog),
        };

        let (coordinator, handle) = Coordinator::new(config, services);
        let room_id = job.room_id.clone();
        info!(target: "worker", room = %room_id, "room job accepted");
        let task = tokio::spawn(async move {
            coordinator.run().await;
        });

        jobs.insert(job.room_id, ActiveJob { handle, task });
        Ok(())
    }

    /// Cancel one job, waiting for its coordinator to drain.
    pub async fn cancel_job(&self, room_id: &str) -> bool {
        let job = self.jobs.lock().remove(room_id);
        let Some(job) = job else { return false };
        info!(target: "worker", room = %room_id, "room job cancelled");
        job.handle.shutdown();
        let _ = job.task.await;
        true
    }

    pub async fn stats(&self, room_id: &str) -> Option<RoomStatsSnapshot> {
        let handle = {
            let jobs = self.jobs.lock();
            jobs.get(room_id).map(|job| job.handle.clone())
        };
        handle?.stats_snapshot().await
    }

    /// Room ids with a live coordinator; finished jobs are reaped.
    pub fn active_rooms(&self) -> Vec<String> {
        let mut jobs = self.jobs.lock();
        jobs.retain(|room_id, job| {
            let alive = !job.task.is_finished();
            if !alive {
                info!(target: "worker", room = %room_id, "room job finished");
            }
            alive
        });
        jobs.keys().cloned().collect()
    }

    /// Drain every job; used on process shutdown.
    pub async fn shutdown(&self) {
        let drained: Vec<(String, ActiveJob)> = self.jobs.lock().drain().collect();
        for (room_id, job) in drained {
            job.handle.shutdown();
            let _ = job.task.await;
            info!(target: "worker", room = %room_id, "room job stopped");
        }
    }

    /// Block until shutdown is requested, then drain.
    pub async fn run_until_shutdown(&self, guard: &ShutdownGuard) {
        guard.wait().await;
        self.shutdown().await;
    }
}

/// Watches provider availability and trips after a continuous outage longer
/// than the grace window. The returned task resolves with the fatal error;
/// the binary maps it to exit code 3.
pub fn spawn_provider_watchdog(
    stt: Arc<dyn SttPlugin>,
    tts: Arc<dyn TtsEngine>,
    grace: Duration,
    check_interval: Duration,
) -> JoinHandle<WorkerError> {
    tokio::spawn(async move {
        let mut outage_since: Option<tokio::time::Instant> = None;
        let mut ticker = tokio::time::interval(check_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let healthy = stt.is_available().await && tts.is_available().await;
            match (healthy, outage_since) {
                (true, Some(_)) => {
                    info!(target: "worker", "provider outage recovered");
                    outage_since = None;
                }
                (true, None) => {}
                (false, None) => {
                    warn!(target: "worker", "provider outage detected");
                    outage_since = Some(tokio::time::Instant::now());
                }
                (false, Some(since)) => {
                    if since.elapsed() > grace {
                        return WorkerError::ProviderOutage {
                            grace,
                            detail: "stt/tts unavailable past grace window".into(),
                        };
                    }
                }
            }
        }
    })
}
