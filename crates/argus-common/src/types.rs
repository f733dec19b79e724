//! Core types shared across Argus components.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of challenge variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChallengeKind {
    /// Pick the category matching a photo
    CategoryImage,
    /// Pick the category matching an animated GIF
    CategoryGif,
    /// Type the numeric code shown by a glyph image
    GlyphCode,
    /// Scratch off an overlay within the deadline
    ScratchReveal,
}

impl ChallengeKind {
    pub const ALL: [ChallengeKind; 4] = [
        ChallengeKind::CategoryImage,
        ChallengeKind::GlyphCode,
        ChallengeKind::CategoryGif,
        ChallengeKind::ScratchReveal,
    ];

    /// The variant requiring sustained pointer interaction
    pub fn is_high_friction(&self) -> bool {
        matches!(self, Self::ScratchReveal)
    }

    /// Kinds whose content is shown in a time-boxed viewing window
    pub fn is_viewable(&self) -> bool {
        !matches!(self, Self::ScratchReveal)
    }

    /// Kinds graded by comparing a submitted answer
    pub fn is_answerable(&self) -> bool {
        !matches!(self, Self::ScratchReveal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CategoryImage => "category-image",
            Self::CategoryGif => "category-gif",
            Self::GlyphCode => "glyph-code",
            Self::ScratchReveal => "scratch-reveal",
        }
    }
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device class supplied by the client (viewport / user-agent heuristics)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    /// Phones and tablets
    Compact,
    /// Everything else
    Standard,
}

impl DeviceClass {
    pub fn from_compact(compact: bool) -> Self {
        if compact { Self::Compact } else { Self::Standard }
    }

    pub fn is_compact(&self) -> bool {
        matches!(self, Self::Compact)
    }
}

impl Default for DeviceClass {
    fn default() -> Self {
        Self::Standard
    }
}

/// Lifecycle phase of the current round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Nothing requested yet
    Idle,
    /// Challenge being materialised
    Loading,
    /// Challenge available, viewing window closed
    #[serde(rename = "ready-unviewed")]
    Ready,
    /// Viewing window open, countdown running
    Presenting,
    /// Graded, waiting for the automatic refresh
    #[serde(rename = "answered-pending-refresh")]
    Answered,
}

impl Default for Phase {
    fn default() -> Self {
        Self::Idle
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Ready => "ready-unviewed",
            Self::Presenting => "presenting",
            Self::Answered => "answered-pending-refresh",
        };
        f.write_str(name)
    }
}

/// Transient notice category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoticeKind {
    CaptureWarning,
    Success,
    Failure,
}

/// Record handed to the outcome log after every graded attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub kind: ChallengeKind,
    pub success: bool,
    pub device: DeviceClass,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl OutcomeRecord {
    pub fn new(kind: ChallengeKind, success: bool, device: DeviceClass) -> Self {
        Self {
            kind,
            success,
            device,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Visible notice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoticeView {
    pub kind: NoticeKind,
    pub message: String,
}

/// Scratch detector status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScratchView {
    /// Deadline timer running
    pub armed: bool,

    /// Whole seconds until the deadline fires, while armed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds_remaining: Option<u64>,

    /// Pointer currently down
    pub drawing: bool,

    /// Coverage at verdict time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleared_fraction: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<bool>,
}

/// Session snapshot sent to the client.
///
/// Never carries the correct answer. The media reference is only present
/// while the viewing window is open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: String,
    pub round: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ChallengeKind>,
    pub phase: Phase,
    pub seconds_remaining: u32,
    pub has_been_viewed: bool,
    pub can_view: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch: Option<ScratchView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<NoticeView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_result: Option<bool>,
    pub device: DeviceClass,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_names() {
        let json = serde_json::to_string(&ChallengeKind::ScratchReveal).unwrap();
        assert_eq!(json, "\"scratch-reveal\"");
        let kind: ChallengeKind = serde_json::from_str("\"glyph-code\"").unwrap();
        assert_eq!(kind, ChallengeKind::GlyphCode);
        assert_eq!(ChallengeKind::CategoryGif.to_string(), "category-gif");
    }

    #[test]
    fn test_phase_wire_names() {
        assert_eq!(serde_json::to_string(&Phase::Ready).unwrap(), "\"ready-unviewed\"");
        assert_eq!(
            serde_json::to_string(&Phase::Answered).unwrap(),
            "\"answered-pending-refresh\""
        );
        assert_eq!(Phase::Presenting.to_string(), "presenting");
    }

    #[test]
    fn test_only_scratch_is_high_friction() {
        let friction: Vec<_> = ChallengeKind::ALL
            .iter()
            .filter(|k| k.is_high_friction())
            .collect();
        assert_eq!(friction, vec![&ChallengeKind::ScratchReveal]);
        assert!(!ChallengeKind::ScratchReveal.is_viewable());
    }
}
