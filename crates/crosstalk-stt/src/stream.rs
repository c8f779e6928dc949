use crate::types::TranscriptEvent;
use crosstalk_foundation::{AudioFrame, ProviderError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Cheap, cloneable handle for pushing audio into a stream; lets the frame
/// path and the event path live on different tasks.
#[derive(Clone)]
pub struct SttFrameSink {
    frames_tx: mpsc::Sender<AudioFrame>,
}

impl SttFrameSink {
    /// Push one PCM frame. Never blocks on a slow backend: when the inbound
    /// queue is full the frame is dropped, matching the contract that STT
    /// ingress is never back-pressured by downstream slowness.
    pub fn push_frame(&self, frame: AudioFrame) -> Result<(), ProviderError> {
        match self.frames_tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::trace!(target: "stt", "inbound frame dropped: stream queue full");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ProviderError::Closed),
        }
    }
}

/// Handle to a live transcription stream.
///
/// Frames go in through a bounded channel; events come out of another. The
/// driver task belongs to the plugin that opened the stream and ends when
/// either channel closes.
pub struct SttStream {
    frames_tx: Option<mpsc::Sender<AudioFrame>>,
    events_rx: mpsc::Receiver<TranscriptEvent>,
    driver: Option<JoinHandle<()>>,
}

impl SttStream {
    pub fn new(
        frames_tx: mpsc::Sender<AudioFrame>,
        events_rx: mpsc::Receiver<TranscriptEvent>,
        driver: JoinHandle<()>,
    ) -> Self {
        Self {
            frames_tx: Some(frames_tx),
            events_rx,
            driver: Some(driver),
        }
    }

    /// Detachable frame path. `None` once the stream has been closed.
    pub fn frame_sink(&self) -> Option<SttFrameSink> {
        self.frames_tx
            .as_ref()
            .map(|frames_tx| SttFrameSink {
                frames_tx: frames_tx.clone(),
            })
    }

    /// Push one PCM frame; see [`SttFrameSink::push_frame`].
    pub fn push_frame(&self, frame: AudioFrame) -> Result<(), ProviderError> {
        let Some(frames_tx) = &self.frames_tx else {
            return Err(ProviderError::Closed);
        };
        match frames_tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::trace!(target: "stt", "inbound frame dropped: stream queue full");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ProviderError::Closed),
        }
    }

    /// Next transcript event; `None` once the stream has shut down.
    pub async fn next_event(&mut self) -> Option<TranscriptEvent> {
        self.events_rx.recv().await
    }

    /// Close the stream: stop accepting audio, let the driver drain, then
    /// wait for it to finish.
    pub async fn close(mut self) {
        self.frames_tx.take();
        self.events_rx.close();
        if let Some(driver) = self.driver.take() {
            let _ = driver.await;
        }
    }
}

impl Drop for SttStream {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}
