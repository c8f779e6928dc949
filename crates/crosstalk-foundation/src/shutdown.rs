use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::Notify;

/// Installs signal handling and a panic hook, returning a guard the rest of
/// the process polls or awaits.
pub struct ShutdownHandler {
    requested: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Default for ShutdownHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandler {
    pub fn new() -> Self {
        Self {
            requested: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub async fn install(self) -> ShutdownGuard {
        let requested = Arc::clone(&self.requested);
        let notify = Arc::clone(&self.notify);

        tokio::spawn(async move {
            let ctrl_c = signal::ctrl_c();
            #[cfg(unix)]
            {
                let mut term =
                    signal::unix::signal(signal::unix::SignalKind::terminate())
                        .expect("failed to install SIGTERM handler");
                tokio::select! {
                    _ = ctrl_c => tracing::info!("shutdown requested via Ctrl-C"),
                    _ = term.recv() => tracing::info!("shutdown requested via SIGTERM"),
                }
            }
            #[cfg(not(unix))]
            {
                let _ = ctrl_c.await;
                tracing::info!("shutdown requested via Ctrl-C");
            }
            requested.store(true, Ordering::SeqCst);
            notify.notify_waiters();
        });

        let original_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |panic_info| {
            tracing::error!("PANIC: {}", panic_info);
            original_panic(panic_info);
        }));

        ShutdownGuard {
            requested: self.requested,
            notify: self.notify,
        }
    }
}

pub struct ShutdownGuard {
    requested: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownGuard {
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub async fn wait(&self) {
        if self.is_requested() {
            return;
        }
        self.notify.notified().await;
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}
