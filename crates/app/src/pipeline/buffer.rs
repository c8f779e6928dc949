//! Per-pair translation buffer.
//!
//! Pure policy: transcript events and clock readings go in, actions come
//! out. The buffer worker task owns an instance exclusively, which is the
//! single-writer discipline the pipeline's ordering invariant rests on.
//!
//! Ordering: segments are spoken in `first_seen` order, ties broken by
//! ascending segment id. With one STT stream per pipeline, segments are
//! created in arrival order, so the id-ordered map below is also
//! first-seen-ordered. A dropped segment still consumes its slot; its
//! successor is spoken in its natural place, never early.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crosstalk_stt::TranscriptEvent;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Soft deadline from first-seen to TTS start.
    pub max_delay_ms: u64,
    /// Minimum segment age before an interim is sent for translation.
    pub interim_trigger_ms: u64,
    /// Word-count delta that makes an interim "materially different".
    pub min_interim_word_delta: usize,
    /// Silence gap after which the last interim is promoted to final.
    pub utterance_end_ms: u64,
    /// A provisional translation is spoken once this close to the deadline.
    pub provisional_speak_margin_ms: u64,
    /// Speak-queue capacity; overflow drops the oldest unspoken segment.
    pub speak_queue_capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_delay_ms: 500,
            interim_trigger_ms: 250,
            min_interim_word_delta: 2,
            utterance_end_ms: 500,
            provisional_speak_margin_ms: 100,
            speak_queue_capacity: 8,
        }
    }
}

/// What the buffer wants done. The worker executes these; the buffer never
/// performs I/O itself.
#[derive(Debug, Clone, PartialEq)]
pub enum BufferAction {
    /// Issue a translation job for this text.
    Translate {
        segment_id: u64,
        text: String,
        provisional: bool,
    },
    /// Abort the in-flight translation job for this segment.
    CancelTranslation { segment_id: u64 },
    /// Queue this translated text for synthesis.
    Speak {
        segment_id: u64,
        text: String,
        first_seen: Instant,
    },
    /// Segment is gone; `missed` marks a deadline overrun.
    Drop { segment_id: u64, missed: bool },
}

#[derive(Debug, Clone, PartialEq)]
enum SegmentStatus {
    /// Interims accumulating; nothing submitted yet.
    Open,
    /// A translation job is in flight.
    Translating { provisional: bool },
    /// Translated text is waiting for its speaking slot.
    Ready { provisional: bool },
    /// Handed to the speak queue; slot consumed.
    Speaking,
    Spoken,
    Dropped,
}

#[derive(Debug)]
struct Segment {
    first_seen: Instant,
    last_change: Instant,
    interim_text: String,
    final_text: Option<String>,
    translated_text: Option<String>,
    last_submitted_interim: Option<String>,
    /// Set when a silence gap promoted the last interim to final while its
    /// provisional translation was still in flight.
    interim_promoted: bool,
    status: SegmentStatus,
}

impl Segment {
    fn resolved(&self) -> bool {
        matches!(
            self.status,
            SegmentStatus::Speaking | SegmentStatus::Spoken | SegmentStatus::Dropped
        )
    }

    fn deadline(&self, config: &BufferConfig) -> Instant {
        self.first_seen + Duration::from_millis(config.max_delay_ms)
    }
}

pub struct TranslationBuffer {
    config: BufferConfig,
    segments: BTreeMap<u64, Segment>,
    /// Ids below this are fully resolved and pruned.
    watermark: u64,
}

impl TranslationBuffer {
    pub fn new(config: BufferConfig) -> Self {
        Self {
            config,
            segments: BTreeMap::new(),
            watermark: 0,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.segments.values().filter(|s| !s.resolved()).count()
    }

    /// Feed one transcript event.
    pub fn on_transcript(&mut self, event: TranscriptEvent, now: Instant) -> Vec<BufferAction> {
        match event {
            TranscriptEvent::Interim {
                segment_id, text, ..
            } => self.on_interim(segment_id, text, now),
            TranscriptEvent::Final {
                segment_id, text, ..
            } => self.on_final(segment_id, text, now),
            TranscriptEvent::UtteranceEnd { segment_id } => self.on_utterance_end(segment_id, now),
            TranscriptEvent::Error { code, message } => {
                warn!(target: "buffer", code, message, "stt stream error");
                Vec::new()
            }
        }
    }

    fn on_interim(&mut self, segment_id: u64, text: String, now: Instant) -> Vec<BufferAction> {
        if segment_id < self.watermark || text.trim().is_empty() {
            return Vec::new();
        }
        let config_trigger = Duration::from_millis(self.config.interim_trigger_ms);
        let min_delta = self.config.min_interim_word_delta;

        let segment = self.segments.entry(segment_id).or_insert_with(|| {
            trace!(target: "buffer", segment_id, "segment opened");
            Segment {
                first_seen: now,
                last_change: now,
                interim_text: String::new(),
                final_text: None,
                translated_text: None,
                last_submitted_interim: None,
                interim_promoted: false,
                status: SegmentStatus::Open,
            }
        });

        if segment.final_text.is_some() || segment.resolved() {
            return Vec::new();
        }
        if segment.interim_text != text {
            segment.last_change = now;
        }
        segment.interim_text = text;

        // Interim translation trigger: old enough and materially different
        // from what we last submitted.
        let old_enough = now.duration_since(segment.first_seen) >= config_trigger;
        if !old_enough {
            return Vec::new();
        }
        let materially_different = match &segment.last_submitted_interim {
            None => true,
            Some(previous) => {
                let prev_words = previous.split_whitespace().count();
                let now_words = segment.interim_text.split_whitespace().count();
                now_words.abs_diff(prev_words) >= min_delta
            }
        };
        if !materially_different {
            return Vec::new();
        }

        let mut actions = Vec::new();
        if matches!(
            segment.status,
            SegmentStatus::Translating { provisional: true }
        ) {
            actions.push(BufferAction::CancelTranslation { segment_id });
        }
        segment.last_submitted_interim = Some(segment.interim_text.clone());
        segment.status = SegmentStatus::Translating { provisional: true };
        actions.push(BufferAction::Translate {
            segment_id,
            text: segment.interim_text.clone(),
            provisional: true,
        });
        debug!(target: "buffer", segment_id, "interim translation issued");
        actions
    }

    fn on_final(&mut self, segment_id: u64, text: String, now: Instant) -> Vec<BufferAction> {
        if segment_id < self.watermark {
            return Vec::new();
        }
        let segment = self.segments.entry(segment_id).or_insert_with(|| Segment {
            first_seen: now,
            last_change: now,
            interim_text: String::new(),
            final_text: None,
            translated_text: None,
            last_submitted_interim: None,
            interim_promoted: false,
            status: SegmentStatus::Open,
        });

        if segment.final_text.is_some() || text.trim().is_empty() {
            return Vec::new();
        }

        // The provisional already went to the speak queue: let it play out
        // and drop the final, preserving order over freshness.
        if matches!(
            segment.status,
            SegmentStatus::Speaking | SegmentStatus::Spoken
        ) {
            debug!(target: "buffer", segment_id, "final superseded by spoken interim, dropped");
            return Vec::new();
        }

        segment.final_text = Some(text.clone());
        segment.last_change = now;

        let mut actions = Vec::new();
        if matches!(segment.status, SegmentStatus::Translating { .. }) {
            actions.push(BufferAction::CancelTranslation { segment_id });
        }
        segment.translated_text = None;
        segment.status = SegmentStatus::Translating { provisional: false };
        actions.push(BufferAction::Translate {
            segment_id,
            text,
            provisional: false,
        });
        debug!(target: "buffer", segment_id, "final translation issued");
        actions
    }

    fn on_utterance_end(&mut self, segment_id: u64, now: Instant) -> Vec<BufferAction> {
        let Some(segment) = self.segments.get(&segment_id) else {
            return Vec::new();
        };
        if segment.final_text.is_some() || segment.resolved() {
            return Vec::new();
        }
        // No final arrived for this utterance: the last interim is as good
        // as it gets.
        self.promote_interim(segment_id, now)
    }

    /// Promote a segment's last interim to final standing.
    fn promote_interim(&mut self, segment_id: u64, now: Instant) -> Vec<BufferAction> {
        let Some(segment) = self.segments.get_mut(&segment_id) else {
            return Vec::new();
        };
        if segment.interim_text.trim().is_empty() {
            segment.status = SegmentStatus::Dropped;
            let mut actions = vec![BufferAction::Drop {
                segment_id,
                missed: false,
            }];
            actions.extend(self.advance(now));
            return actions;
        }

        segment.final_text = Some(segment.interim_text.clone());
        segment.last_change = now;

        let submitted_matches = segment.last_submitted_interim.as_deref()
            == Some(segment.interim_text.as_str());

        match (&segment.status, submitted_matches) {
            // The provisional translation already covers the promoted text.
            (SegmentStatus::Ready { provisional: true }, true) => {
                segment.status = SegmentStatus::Ready { provisional: false };
                debug!(target: "buffer", segment_id, "promoted interim, provisional reused");
                self.try_speak(now)
            }
            (SegmentStatus::Translating { provisional: true }, true) => {
                segment.interim_promoted = true;
                debug!(target: "buffer", segment_id, "promoted interim, awaiting in-flight job");
                Vec::new()
            }
            _ => {
                let text = segment.interim_text.clone();
                let mut actions = Vec::new();
                if matches!(segment.status, SegmentStatus::Translating { .. }) {
                    actions.push(BufferAction::CancelTranslation { segment_id });
                }
                segment.status = SegmentStatus::Translating { provisional: false };
                segment.last_submitted_interim = Some(text.clone());
                actions.push(BufferAction::Translate {
                    segment_id,
                    text,
                    provisional: false,
                });
                debug!(target: "buffer", segment_id, "promoted interim, final translation issued");
                actions
            }
        }
    }

    /// Feed a completed translation back in.
    pub fn on_translated(
        &mut self,
        segment_id: u64,
        provisional: bool,
        text: String,
        now: Instant,
    ) -> Vec<BufferAction> {
        let config = self.config.clone();
        let Some(segment) = self.segments.get_mut(&segment_id) else {
            return Vec::new();
        };
        if segment.resolved() {
            return Vec::new();
        }

        if provisional {
            // Result of an interim job. If a real final has superseded it,
            // the cancel may have lost the race; discard quietly.
            if segment.final_text.is_some() && !segment.interim_promoted {
                return Vec::new();
            }
            let effective_final = segment.interim_promoted;
            segment.translated_text = Some(text);
            segment.status = SegmentStatus::Ready {
                provisional: !effective_final,
            };
            return self.try_speak(now);
        }

        // Final translation. Late completion drops the segment.
        if now > segment.deadline(&config) {
            segment.status = SegmentStatus::Dropped;
            debug!(target: "buffer", segment_id, "final translation past deadline, dropped");
            let mut actions = vec![BufferAction::Drop {
                segment_id,
                missed: true,
            }];
            actions.extend(self.advance(now));
            return actions;
        }
        segment.translated_text = Some(text);
        segment.status = SegmentStatus::Ready { provisional: false };
        self.try_speak(now)
    }

    /// The translation job for a segment failed after retries.
    pub fn on_translation_failed(&mut self, segment_id: u64, now: Instant) -> Vec<BufferAction> {
        let Some(segment) = self.segments.get_mut(&segment_id) else {
            return Vec::new();
        };
        if segment.resolved() {
            return Vec::new();
        }
        segment.status = SegmentStatus::Dropped;
        let mut actions = vec![BufferAction::Drop {
            segment_id,
            missed: false,
        }];
        actions.extend(self.advance(now));
        actions
    }

    /// A queued segment overflowed the speak queue (oldest-first eviction).
    pub fn on_speak_evicted(&mut self, segment_id: u64) {
        if let Some(segment) = self.segments.get_mut(&segment_id) {
            segment.status = SegmentStatus::Dropped;
        }
    }

    /// The TTS writer finished (or abandoned) a queued segment.
    pub fn on_speech_finished(&mut self, segment_id: u64, now: Instant) -> Vec<BufferAction> {
        if let Some(segment) = self.segments.get_mut(&segment_id) {
            if segment.status == SegmentStatus::Speaking {
                segment.status = SegmentStatus::Spoken;
            }
        }
        self.advance(now)
    }

    /// Periodic housekeeping: silence promotion, deadline expiry, and
    /// last-chance provisional speech.
    pub fn on_tick(&mut self, now: Instant) -> Vec<BufferAction> {
        let config = self.config.clone();
        let mut actions = Vec::new();

        // Deadline sweep.
        let expired: Vec<u64> = self
            .segments
            .iter()
            .filter(|(_, s)| !s.resolved() && now > s.deadline(&config))
            .map(|(id, _)| *id)
            .collect();
        for segment_id in expired {
            let Some(segment) = self.segments.get_mut(&segment_id) else {
                continue;
            };
            let missed = matches!(
                segment.status,
                SegmentStatus::Translating { .. } | SegmentStatus::Ready { .. }
            );
            if matches!(segment.status, SegmentStatus::Translating { .. }) {
                actions.push(BufferAction::CancelTranslation { segment_id });
            }
            segment.status = SegmentStatus::Dropped;
            debug!(target: "buffer", segment_id, missed, "segment deadline expired");
            actions.push(BufferAction::Drop {
                segment_id,
                missed,
            });
        }

        // Silence gap: interim stable for the utterance-end window becomes
        // the final.
        let stale: Vec<u64> = self
            .segments
            .iter()
            .filter(|(_, s)| {
                !s.resolved()
                    && s.final_text.is_none()
                    && !s.interim_text.trim().is_empty()
                    && now.duration_since(s.last_change)
                        >= Duration::from_millis(config.utterance_end_ms)
            })
            .map(|(id, _)| *id)
            .collect();
        for segment_id in stale {
            actions.extend(self.promote_interim(segment_id, now));
        }

        actions.extend(self.try_speak(now));
        actions
    }

    /// Emit `Speak` for every head-of-line segment that may speak now.
    fn try_speak(&mut self, now: Instant) -> Vec<BufferAction> {
        let config = self.config.clone();
        let mut actions = Vec::new();

        loop {
            let Some((&segment_id, segment)) =
                self.segments.iter_mut().find(|(_, s)| !s.resolved())
            else {
                break;
            };

            match segment.status.clone() {
                SegmentStatus::Ready { provisional } => {
                    let deadline = segment.deadline(&config);
                    if now > deadline {
                        segment.status = SegmentStatus::Dropped;
                        actions.push(BufferAction::Drop {
                            segment_id,
                            missed: true,
                        });
                        continue;
                    }
                    if provisional {
                        // Hold provisional output until the deadline is close;
                        // a better final may still arrive.
                        let last_chance = deadline
                            - Duration::from_millis(config.provisional_speak_margin_ms);
                        if now < last_chance {
                            break;
                        }
                    }
                    let text = segment
                        .translated_text
                        .clone()
                        .unwrap_or_default();
                    segment.status = SegmentStatus::Speaking;
                    actions.push(BufferAction::Speak {
                        segment_id,
                        text,
                        first_seen: segment.first_seen,
                    });
                }
                // Head of line still working; successors wait their turn.
                _ => break,
            }
        }

        actions.extend(self.advance(now));
        actions
    }

    /// Prune fully resolved segments from the front and advance the
    /// watermark. Returns follow-up actions unlocked by the pruning.
    fn advance(&mut self, now: Instant) -> Vec<BufferAction> {
        let mut advanced = false;
        while let Some((&segment_id, segment)) = self.segments.iter().next() {
            if matches!(segment.status, SegmentStatus::Spoken | SegmentStatus::Dropped) {
                self.segments.remove(&segment_id);
                self.watermark = self.watermark.max(segment_id + 1);
                advanced = true;
            } else {
                break;
            }
        }
        if advanced {
            // Head changed; a successor may be ready to speak.
            let head_ready = self
                .segments
                .iter()
                .find(|(_, s)| !s.resolved())
                .map(|(_, s)| matches!(s.status, SegmentStatus::Ready { .. }))
                .unwrap_or(false);
            if head_ready {
                return self.try_speak(now);
            }
        }
        Vec::new()
    }
}
