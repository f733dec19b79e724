//! Challenge lifecycle controller.
//!
//! One controller per client session. It owns the active challenge, the
//! lifecycle record, the scratch detector and every timer handle. All state
//! changes happen on `&mut self`, driven by the session actor: client
//! commands arrive as method calls, timer and load completions arrive as
//! `SessionEvent`s on the channel the controller hands to its timers.
//!
//! Every timer event carries the round (or notice sequence) it was armed
//! for, so an event that outlives its round is recognised and dropped even
//! if it was already queued when the timer was cancelled.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;

use argus_common::constants::messages;
use argus_common::{
    ArgusError, ChallengeKind, DeviceClass, NoticeKind, NoticeView, OutcomeRecord, Phase,
    SessionView,
};

use crate::challenge::{ActiveChallenge, ChallengeLoader, Prompt, VariantSelector};
use crate::config::{ScratchConfig, TimingConfig};
use crate::deterrence::{CaptureGuard, CaptureSignal, ClientEvent};
use crate::outcome::{self, OutcomeSink};
use crate::scratch::{PointerEvent, ScratchDetector};
use crate::timer::{self, TaskGuard};

/// Collaborators shared by every session
pub struct ChallengeEngine {
    pub selector: VariantSelector,
    pub loader: Arc<ChallengeLoader>,
    pub sink: Arc<dyn OutcomeSink>,
    pub timing: TimingConfig,
    pub scratch: ScratchConfig,
}

/// Completions posted back to the session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Loaded { round: u64, challenge: ActiveChallenge },
    CountdownTick { round: u64 },
    ScratchDeadline { round: u64 },
    DeferredRefresh { round: u64 },
    NoticeExpired { seq: u64 },
}

/// The lifecycle record. `previous_kind` survives refreshes, everything
/// else is reset at the start of each round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleState {
    pub current_kind: Option<ChallengeKind>,
    pub previous_kind: Option<ChallengeKind>,
    pub phase: Phase,
    pub seconds_remaining: u32,
    pub has_been_viewed: bool,
    pub round: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    Expired,
    Dismissed,
    Interrupted,
}

#[derive(Debug, Clone)]
struct Notice {
    kind: NoticeKind,
    message: &'static str,
    seq: u64,
}

/// Round-scoped handles, all dropped together on a new round
#[derive(Default)]
struct RoundTimers {
    load: Option<TaskGuard>,
    countdown: Option<TaskGuard>,
    scratch_deadline: Option<TaskGuard>,
    deferred_refresh: Option<TaskGuard>,
}

impl RoundTimers {
    fn clear(&mut self) {
        *self = Self::default();
    }
}

pub struct LifecycleController {
    session_id: String,
    device: DeviceClass,
    rng: StdRng,
    engine: Arc<ChallengeEngine>,
    guard: CaptureGuard,
    events: UnboundedSender<SessionEvent>,

    state: LifecycleState,
    challenge: Option<ActiveChallenge>,
    scratch: Option<ScratchDetector>,
    last_result: Option<bool>,
    timers: RoundTimers,

    notice: Option<Notice>,
    notice_seq: u64,
    notice_timer: Option<TaskGuard>,
}

impl LifecycleController {
    pub fn new(
        session_id: String,
        device: DeviceClass,
        engine: Arc<ChallengeEngine>,
        events: UnboundedSender<SessionEvent>,
    ) -> Self {
        Self::with_rng(session_id, device, engine, events, StdRng::from_os_rng())
    }

    pub fn with_rng(
        session_id: String,
        device: DeviceClass,
        engine: Arc<ChallengeEngine>,
        events: UnboundedSender<SessionEvent>,
        rng: StdRng,
    ) -> Self {
        let guard = CaptureGuard::standard(engine.timing.rapid_toggle());
        tracing::trace!(session = %session_id, sources = ?guard.source_names(), "Capture guard ready");
        Self {
            session_id,
            device,
            rng,
            engine,
            guard,
            events,
            state: LifecycleState::default(),
            challenge: None,
            scratch: None,
            last_result: None,
            timers: RoundTimers::default(),
            notice: None,
            notice_seq: 0,
            notice_timer: None,
        }
    }

    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    pub fn device(&self) -> DeviceClass {
        self.device
    }

    /// Applies from the next selection on
    pub fn set_device(&mut self, compact: bool) {
        let device = DeviceClass::from_compact(compact);
        if device != self.device {
            tracing::debug!(session = %self.session_id, device = ?device, "Device class changed");
            self.device = device;
        }
    }

    // === Round start ===

    /// Start a new round. Returns false when a load is already in flight; the
    /// request is coalesced into it.
    pub fn request_refresh(&mut self) -> bool {
        if self.state.phase == Phase::Loading {
            tracing::debug!(session = %self.session_id, round = self.state.round, "Refresh coalesced with in-flight load");
            return false;
        }

        self.timers.clear();
        self.guard.reset();

        let previous = self.state.current_kind;
        let kind = self.engine.selector.select(previous, self.device, &mut self.rng);

        self.state = LifecycleState {
            current_kind: Some(kind),
            previous_kind: previous,
            phase: Phase::Loading,
            seconds_remaining: 0,
            has_been_viewed: false,
            round: self.state.round + 1,
        };
        self.challenge = None;
        self.scratch = None;
        self.last_result = None;

        tracing::debug!(
            session = %self.session_id,
            round = self.state.round,
            kind = %kind,
            previous = ?previous,
            "Loading challenge"
        );

        let plan = self.engine.loader.plan(kind, &mut self.rng);
        let loader = self.engine.loader.clone();
        let events = self.events.clone();
        let round = self.state.round;

        self.timers.load = Some(TaskGuard::spawn(async move {
            let fallback = plan.clone();
            let challenge = match AssertUnwindSafe(loader.resolve(plan)).catch_unwind().await {
                Ok(challenge) => challenge,
                Err(_) => {
                    tracing::error!(round, "Challenge load panicked, using degraded challenge");
                    loader.degraded(fallback)
                }
            };
            let _ = events.send(SessionEvent::Loaded { round, challenge });
        }));

        true
    }

    fn on_loaded(&mut self, round: u64, challenge: ActiveChallenge) {
        if round != self.state.round || self.state.phase != Phase::Loading {
            tracing::debug!(session = %self.session_id, round, "Dropping stale load");
            return;
        }

        self.timers.load = None;
        if challenge.kind == ChallengeKind::ScratchReveal {
            self.scratch = Some(ScratchDetector::new(&self.engine.scratch));
        }

        tracing::info!(
            session = %self.session_id,
            round,
            kind = %challenge.kind,
            has_media = challenge.media.is_some(),
            "Challenge ready"
        );

        self.challenge = Some(challenge);
        self.state.phase = Phase::Ready;
    }

    // === Viewing window ===

    /// Open the single-use viewing window and start the countdown
    pub fn open_view(&mut self) -> Result<(), ArgusError> {
        let kind = self
            .state
            .current_kind
            .ok_or_else(|| ArgusError::InvalidState("no challenge requested".into()))?;
        if !kind.is_viewable() {
            return Err(ArgusError::NotViewable);
        }

        match self.state.phase {
            Phase::Ready if !self.state.has_been_viewed => {}
            Phase::Ready | Phase::Presenting => return Err(ArgusError::AlreadyViewed),
            phase => {
                return Err(ArgusError::InvalidState(format!("cannot view while {}", phase)));
            }
        }

        let round = self.state.round;
        self.state.phase = Phase::Presenting;
        self.state.has_been_viewed = true;
        self.state.seconds_remaining = self.engine.timing.view_window_secs;
        self.timers.countdown = Some(timer::every(
            self.engine.timing.tick(),
            self.events.clone(),
            move || SessionEvent::CountdownTick { round },
        ));

        tracing::debug!(session = %self.session_id, round, seconds = self.state.seconds_remaining, "Viewing window opened");
        Ok(())
    }

    fn on_countdown_tick(&mut self, round: u64) {
        if round != self.state.round || self.state.phase != Phase::Presenting {
            return;
        }

        self.state.seconds_remaining = self.state.seconds_remaining.saturating_sub(1);
        if self.state.seconds_remaining == 0 {
            self.close_presentation(CloseReason::Expired);
        }
    }

    /// Single exit from `Presenting`. Returns false when not presenting.
    fn close_presentation(&mut self, reason: CloseReason) -> bool {
        if self.state.phase != Phase::Presenting {
            return false;
        }

        self.timers.countdown = None;
        self.state.phase = Phase::Ready;
        self.state.seconds_remaining = 0;

        tracing::debug!(session = %self.session_id, round = self.state.round, reason = ?reason, "Viewing window closed");
        true
    }

    /// Close the window without answering. Idempotent.
    pub fn dismiss(&mut self) -> bool {
        self.close_presentation(CloseReason::Dismissed)
    }

    /// Close the window and discard the round. A second call outside
    /// `Presenting` does nothing.
    pub fn force_close(&mut self) -> bool {
        if !self.close_presentation(CloseReason::Interrupted) {
            return false;
        }
        self.request_refresh();
        true
    }

    // === Capture deterrence ===

    /// Feed a raw client event through the signal sources. Only acted on
    /// while the window is open.
    pub fn observe_client_event(&mut self, event: &ClientEvent) -> Vec<CaptureSignal> {
        if self.state.phase != Phase::Presenting {
            return Vec::new();
        }

        let signals = self.guard.observe(event, Instant::now());
        if signals.is_empty() {
            return signals;
        }

        tracing::info!(
            session = %self.session_id,
            round = self.state.round,
            signals = ?signals,
            "Capture attempt detected"
        );
        self.show_notice(NoticeKind::CaptureWarning);

        if signals.iter().any(CaptureSignal::is_violation) {
            self.force_close();
        }
        signals
    }

    // === Grading ===

    /// Grade a category selection or glyph code. Glyph input keeps only
    /// digits, truncated to the code length, and must be exactly that long.
    pub fn submit(&mut self, answer: &str) -> Result<bool, ArgusError> {
        let challenge = self
            .challenge
            .as_ref()
            .ok_or_else(|| ArgusError::InvalidState("no challenge loaded".into()))?;
        if !challenge.kind.is_answerable() {
            return Err(ArgusError::InvalidInput(
                "scratch rounds are graded by coverage".into(),
            ));
        }
        if self.state.phase != Phase::Ready {
            return Err(ArgusError::InvalidState(format!(
                "cannot answer while {}",
                self.state.phase
            )));
        }

        let response = match &challenge.prompt {
            Prompt::Glyph { .. } => {
                let length = self.engine.loader.catalog().code_length();
                let digits = sanitize_code(answer, length);
                if digits.len() != length {
                    return Err(ArgusError::IncompleteAnswer(length));
                }
                digits
            }
            _ => {
                if answer.is_empty() {
                    return Err(ArgusError::InvalidInput("answer is empty".into()));
                }
                answer.to_string()
            }
        };

        let success = challenge.grade(&response);
        self.finish_round(success);
        Ok(success)
    }

    fn finish_round(&mut self, success: bool) {
        let Some(kind) = self.state.current_kind else {
            return;
        };

        self.timers.clear();
        self.state.phase = Phase::Answered;
        self.state.seconds_remaining = 0;
        self.last_result = Some(success);

        tracing::info!(
            session = %self.session_id,
            round = self.state.round,
            kind = %kind,
            success,
            "Round graded"
        );

        self.show_notice(if success {
            NoticeKind::Success
        } else {
            NoticeKind::Failure
        });
        outcome::dispatch(&self.engine.sink, OutcomeRecord::new(kind, success, self.device));

        let round = self.state.round;
        self.timers.deferred_refresh = Some(timer::after(
            self.engine.timing.refresh_delay(),
            self.events.clone(),
            SessionEvent::DeferredRefresh { round },
        ));
    }

    fn on_deferred_refresh(&mut self, round: u64) {
        if round == self.state.round && self.state.phase == Phase::Answered {
            self.request_refresh();
        }
    }

    // === Scratch ===

    fn scratch_mut(&mut self) -> Result<&mut ScratchDetector, ArgusError> {
        if self.state.phase != Phase::Ready {
            return Err(ArgusError::InvalidState(format!(
                "scratch surface inactive while {}",
                self.state.phase
            )));
        }
        self.scratch
            .as_mut()
            .ok_or_else(|| ArgusError::InvalidState("not a scratch round".into()))
    }

    /// Apply pointer samples in order. The first press arms the deadline.
    pub fn pointer(&mut self, events: &[PointerEvent]) -> Result<(), ArgusError> {
        let mut armed = false;
        {
            let detector = self.scratch_mut()?;
            for event in events {
                match *event {
                    PointerEvent::Down { x, y } => armed |= detector.pointer_down(x, y),
                    PointerEvent::Move { x, y } => detector.pointer_move(x, y),
                    PointerEvent::Up => detector.pointer_up(),
                }
            }
        }

        if armed {
            let round = self.state.round;
            self.timers.scratch_deadline = Some(timer::after(
                self.engine.timing.scratch_deadline(),
                self.events.clone(),
                SessionEvent::ScratchDeadline { round },
            ));
            tracing::debug!(session = %self.session_id, round, "Scratch deadline armed");
        }
        Ok(())
    }

    /// Produce the verdict now instead of waiting for the deadline
    pub fn check_scratch(&mut self) -> Result<bool, ArgusError> {
        let verdict = self
            .scratch_mut()?
            .resolve()
            .ok_or_else(|| ArgusError::InvalidState("scratch verdict already produced".into()))?;
        self.finish_round(verdict.passed);
        Ok(verdict.passed)
    }

    fn on_scratch_deadline(&mut self, round: u64) {
        if round != self.state.round || self.state.phase != Phase::Ready {
            return;
        }
        let verdict = self.scratch.as_mut().and_then(ScratchDetector::resolve);
        if let Some(verdict) = verdict {
            self.finish_round(verdict.passed);
        }
    }

    /// Current overlay raster as a PNG data URL
    pub fn scratch_surface(&self) -> Result<String, ArgusError> {
        self.scratch
            .as_ref()
            .ok_or_else(|| ArgusError::InvalidState("not a scratch round".into()))?
            .png_data_url()
    }

    // === Notices ===

    fn show_notice(&mut self, kind: NoticeKind) {
        self.notice_seq += 1;
        let seq = self.notice_seq;
        let message = match kind {
            NoticeKind::CaptureWarning => messages::CAPTURE_WARNING,
            NoticeKind::Success => messages::SUCCESS,
            NoticeKind::Failure => messages::FAILURE,
        };

        self.notice = Some(Notice { kind, message, seq });
        self.notice_timer = Some(timer::after(
            self.engine.timing.notice_duration(),
            self.events.clone(),
            SessionEvent::NoticeExpired { seq },
        ));
    }

    fn on_notice_expired(&mut self, seq: u64) {
        if self.notice.as_ref().is_some_and(|n| n.seq == seq) {
            self.notice = None;
            self.notice_timer = None;
        }
    }

    // === Events and snapshots ===

    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Loaded { round, challenge } => self.on_loaded(round, challenge),
            SessionEvent::CountdownTick { round } => self.on_countdown_tick(round),
            SessionEvent::ScratchDeadline { round } => self.on_scratch_deadline(round),
            SessionEvent::DeferredRefresh { round } => self.on_deferred_refresh(round),
            SessionEvent::NoticeExpired { seq } => self.on_notice_expired(seq),
        }
    }

    /// Cancel everything still scheduled
    pub fn shutdown(&mut self) {
        self.timers.clear();
        self.notice_timer = None;
    }

    /// Client snapshot. The correct answer is never included and media is
    /// only exposed while the window is open.
    pub fn view(&self) -> SessionView {
        let phase = self.state.phase;
        let challenge = self.challenge.as_ref();
        let answerable = matches!(phase, Phase::Ready | Phase::Presenting);

        let options = challenge
            .filter(|_| answerable)
            .map(|c| c.options().to_vec())
            .unwrap_or_default();
        let code_length = challenge
            .filter(|c| matches!(c.prompt, Prompt::Glyph { .. }))
            .map(|_| self.engine.loader.catalog().code_length());
        let media = challenge
            .filter(|_| phase == Phase::Presenting)
            .and_then(|c| c.media.clone());

        SessionView {
            session_id: self.session_id.clone(),
            round: self.state.round,
            kind: self.state.current_kind,
            phase,
            seconds_remaining: self.state.seconds_remaining,
            has_been_viewed: self.state.has_been_viewed,
            can_view: phase == Phase::Ready
                && !self.state.has_been_viewed
                && self.state.current_kind.is_some_and(|k| k.is_viewable()),
            options,
            code_length,
            media,
            scratch: self
                .scratch
                .as_ref()
                .map(|d| d.view(self.engine.timing.scratch_deadline())),
            notice: self.notice.as_ref().map(|n| NoticeView {
                kind: n.kind,
                message: n.message.to_string(),
            }),
            last_result: self.last_result,
            device: self.device,
        }
    }
}

fn sanitize_code(input: &str, length: usize) -> String {
    input.chars().filter(char::is_ascii_digit).take(length).collect()
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use crate::challenge::ChallengeCatalog;
    use crate::challenge::media::fakes::StaticProvider;
    use crate::outcome::fakes::MemorySink;
    use std::collections::BTreeMap;
    use std::time::Duration;

    /// Engine over small pools, a static media provider and an in-memory sink
    pub fn engine(kinds: &[ChallengeKind]) -> (Arc<ChallengeEngine>, Arc<MemorySink>) {
        let image = ["Nature", "Animals", "Food", "Space", "Art", "Music"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let gif = ["vehicles", "animals", "sports", "buildings", "cartoons"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut glyphs = BTreeMap::new();
        glyphs.insert("ka".to_string(), "4821".to_string());
        let catalog = Arc::new(ChallengeCatalog::new(image, gif, glyphs, 4, "/assets/glyphs"));

        let provider = StaticProvider::new("https://media/");
        let loader = ChallengeLoader::new(
            catalog,
            Some(provider.clone()),
            Some(provider),
            None,
            Duration::from_millis(500),
        );

        let sink = Arc::new(MemorySink::default());
        let engine = Arc::new(ChallengeEngine {
            selector: VariantSelector::new(kinds).unwrap(),
            loader: Arc::new(loader),
            sink: sink.clone(),
            timing: TimingConfig::default(),
            scratch: ScratchConfig::default(),
        });
        (engine, sink)
    }
}
