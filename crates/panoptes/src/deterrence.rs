//! Capture deterrence.
//!
//! Best-effort and advisory. Clients report raw events (key presses,
//! clipboard actions, context menu, visibility and focus changes); a set of
//! independent signal sources turns them into capture signals. The guard
//! holds no lifecycle logic: the controller decides what a signal does.
//! Nothing here prevents a determined agent from capturing content.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Raw client event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    KeyDown {
        key: String,
        #[serde(default)]
        key_code: Option<u32>,
        #[serde(default)]
        ctrl: bool,
        #[serde(default)]
        meta: bool,
        #[serde(default)]
        shift: bool,
    },
    Clipboard {
        action: ClipboardAction,
    },
    ContextMenu,
    Visibility {
        hidden: bool,
    },
    Focus {
        focused: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipboardAction {
    Copy,
    Cut,
    Paste,
}

/// Something that looks like an attempt to capture challenge content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureSignal {
    /// Print screen, save page or print shortcut
    CaptureShortcut,
    Clipboard(ClipboardAction),
    ContextMenu,
    VisibilityLost,
    /// Short background/foreground gap, typical of platform screenshot gestures
    RapidFocusToggle,
}

impl CaptureSignal {
    /// Violations force-close the presentation and discard the round
    pub fn is_violation(&self) -> bool {
        matches!(self, Self::ContextMenu | Self::VisibilityLost)
    }
}

/// Independent detector; sources can be added or removed freely
pub trait SignalSource: Send {
    fn name(&self) -> &'static str;

    fn observe(&mut self, event: &ClientEvent, at: Instant) -> Option<CaptureSignal>;

    /// Forget per-round state
    fn reset(&mut self) {}
}

/// PrintScreen, Ctrl/Cmd+Shift+S, Ctrl/Cmd+P
pub struct ShortcutSource;

const PRINT_SCREEN_KEY_CODE: u32 = 44;

impl SignalSource for ShortcutSource {
    fn name(&self) -> &'static str {
        "shortcut"
    }

    fn observe(&mut self, event: &ClientEvent, _at: Instant) -> Option<CaptureSignal> {
        let ClientEvent::KeyDown {
            key,
            key_code,
            ctrl,
            meta,
            shift,
        } = event
        else {
            return None;
        };

        let modifier = *ctrl || *meta;
        let hit = *key_code == Some(PRINT_SCREEN_KEY_CODE)
            || key == "PrintScreen"
            || (modifier && *shift && key.eq_ignore_ascii_case("s"))
            || (modifier && key.eq_ignore_ascii_case("p"));

        hit.then_some(CaptureSignal::CaptureShortcut)
    }
}

/// Copy, cut and paste
pub struct ClipboardSource;

impl SignalSource for ClipboardSource {
    fn name(&self) -> &'static str {
        "clipboard"
    }

    fn observe(&mut self, event: &ClientEvent, _at: Instant) -> Option<CaptureSignal> {
        match event {
            ClientEvent::Clipboard { action } => Some(CaptureSignal::Clipboard(*action)),
            _ => None,
        }
    }
}

pub struct ContextMenuSource;

impl SignalSource for ContextMenuSource {
    fn name(&self) -> &'static str {
        "context-menu"
    }

    fn observe(&mut self, event: &ClientEvent, _at: Instant) -> Option<CaptureSignal> {
        matches!(event, ClientEvent::ContextMenu).then_some(CaptureSignal::ContextMenu)
    }
}

pub struct VisibilitySource;

impl SignalSource for VisibilitySource {
    fn name(&self) -> &'static str {
        "visibility"
    }

    fn observe(&mut self, event: &ClientEvent, _at: Instant) -> Option<CaptureSignal> {
        matches!(event, ClientEvent::Visibility { hidden: true }).then_some(CaptureSignal::VisibilityLost)
    }
}

/// Focus lost and regained within `threshold`
pub struct FocusGapSource {
    threshold: Duration,
    blurred_at: Option<Instant>,
}

impl FocusGapSource {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            blurred_at: None,
        }
    }
}

impl SignalSource for FocusGapSource {
    fn name(&self) -> &'static str {
        "focus-gap"
    }

    fn observe(&mut self, event: &ClientEvent, at: Instant) -> Option<CaptureSignal> {
        match event {
            ClientEvent::Focus { focused: false } => {
                self.blurred_at = Some(at);
                None
            }
            ClientEvent::Focus { focused: true } => {
                let blurred_at = self.blurred_at.take()?;
                (at.duration_since(blurred_at) <= self.threshold)
                    .then_some(CaptureSignal::RapidFocusToggle)
            }
            _ => None,
        }
    }

    fn reset(&mut self) {
        self.blurred_at = None;
    }
}

/// The set of active signal sources
pub struct CaptureGuard {
    sources: Vec<Box<dyn SignalSource>>,
}

impl CaptureGuard {
    pub fn empty() -> Self {
        Self { sources: Vec::new() }
    }

    /// Every built-in source
    pub fn standard(rapid_toggle: Duration) -> Self {
        Self::empty()
            .with_source(ShortcutSource)
            .with_source(ClipboardSource)
            .with_source(ContextMenuSource)
            .with_source(VisibilitySource)
            .with_source(FocusGapSource::new(rapid_toggle))
    }

    pub fn with_source(mut self, source: impl SignalSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Run the event through every source
    pub fn observe(&mut self, event: &ClientEvent, at: Instant) -> Vec<CaptureSignal> {
        let mut signals = Vec::new();
        for source in &mut self.sources {
            if let Some(signal) = source.observe(event, at) {
                tracing::debug!(source = source.name(), signal = ?signal, "Capture signal");
                if !signals.contains(&signal) {
                    signals.push(signal);
                }
            }
        }
        signals
    }

    pub fn reset(&mut self) {
        for source in &mut self.sources {
            source.reset();
        }
    }
}
