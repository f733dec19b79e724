//! Scratch-reveal coverage detection.
//!
//! The surface is an RGBA raster that starts fully opaque (fill plus a label
//! band). Pointer samples erase discs by zeroing alpha. When the deadline
//! fires, or the caller forces a check, every cell's alpha is sampled and the
//! cleared fraction is compared against the pass threshold.

use std::io::Cursor;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use image::{ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use argus_common::constants::scratch::{FILL_RGB, LABEL_RGB, MAX_EDGE};
use argus_common::{ArgusError, ScratchView};

use crate::config::ScratchConfig;

const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Pointer sample on the surface, in raster coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PointerEvent {
    Down { x: f32, y: f32 },
    Move { x: f32, y: f32 },
    Up,
}

/// Armed period between the first pointer-down and the verdict
#[derive(Debug, Clone, PartialEq)]
pub struct ScratchSession {
    pub total_cells: u64,
    pub cleared_fraction: f64,
    pub deadline_armed: bool,
    pub armed_at: Instant,
}

/// Final result for the round
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScratchVerdict {
    pub cleared_fraction: f64,
    pub passed: bool,
}

/// Overlay raster and the state of the current scratch attempt
pub struct ScratchDetector {
    surface: RgbaImage,
    brush_radius: i32,
    pass_threshold: f64,
    drawing: bool,
    session: Option<ScratchSession>,
    verdict: Option<ScratchVerdict>,
}

impl ScratchDetector {
    pub fn new(config: &ScratchConfig) -> Self {
        let width = config.width.clamp(1, MAX_EDGE);
        let height = config.height.clamp(1, MAX_EDGE);
        let [r, g, b] = FILL_RGB;
        let mut surface = RgbaImage::from_pixel(width, height, Rgba([r, g, b, 255]));

        // Opaque label band across the middle
        let band_height = (height / 7).max(1);
        let band_width = (width * 3 / 5).max(1);
        let [r, g, b] = LABEL_RGB;
        draw_filled_rect_mut(
            &mut surface,
            Rect::at(((width - band_width) / 2) as i32, ((height - band_height) / 2) as i32)
                .of_size(band_width, band_height),
            Rgba([r, g, b, 255]),
        );

        Self::from_raster(surface, config)
    }

    pub(crate) fn from_raster(surface: RgbaImage, config: &ScratchConfig) -> Self {
        Self {
            surface,
            brush_radius: config.brush_radius.clamp(1, MAX_EDGE) as i32,
            pass_threshold: config.pass_threshold,
            drawing: false,
            session: None,
            verdict: None,
        }
    }

    pub fn total_cells(&self) -> u64 {
        u64::from(self.surface.width()) * u64::from(self.surface.height())
    }

    pub fn is_armed(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.deadline_armed)
    }

    pub fn verdict(&self) -> Option<ScratchVerdict> {
        self.verdict
    }

    pub fn session(&self) -> Option<&ScratchSession> {
        self.session.as_ref()
    }

    /// Start the armed session. Rejected while one is armed or after a verdict.
    pub fn arm(&mut self) -> Result<(), ArgusError> {
        if self.verdict.is_some() {
            return Err(ArgusError::InvalidState("scratch verdict already produced".into()));
        }
        if self.is_armed() {
            return Err(ArgusError::ScratchArmed);
        }
        self.session = Some(ScratchSession {
            total_cells: self.total_cells(),
            cleared_fraction: 0.0,
            deadline_armed: true,
            armed_at: Instant::now(),
        });
        Ok(())
    }

    /// Pointer pressed. Returns true when this press armed the session, which
    /// is the caller's cue to start the deadline timer.
    pub fn pointer_down(&mut self, x: f32, y: f32) -> bool {
        if self.verdict.is_some() {
            return false;
        }

        let newly_armed = !self.is_armed() && self.arm().is_ok();
        self.drawing = true;
        self.erase(x, y);
        newly_armed
    }

    pub fn pointer_move(&mut self, x: f32, y: f32) {
        if self.drawing && self.is_armed() && self.verdict.is_none() {
            self.erase(x, y);
        }
    }

    pub fn pointer_up(&mut self) {
        self.drawing = false;
        let coverage = self.coverage();
        if let Some(session) = self.session.as_mut() {
            session.cleared_fraction = coverage;
        }
    }

    /// Samples whose disc cannot touch the raster are dropped
    fn erase(&mut self, x: f32, y: f32) {
        let r = self.brush_radius as f32;
        let (width, height) = (self.surface.width() as f32, self.surface.height() as f32);
        let inside = |v: f32, edge: f32| v.is_finite() && v >= -r && v < edge + r;
        if !inside(x, width) || !inside(y, height) {
            return;
        }
        let center = (x.round() as i32, y.round() as i32);
        draw_filled_circle_mut(&mut self.surface, center, self.brush_radius, CLEAR);
    }

    /// Cells whose alpha is zero
    pub fn cleared_cells(&self) -> u64 {
        self.surface.pixels().filter(|p| p[3] == 0).count() as u64
    }

    pub fn coverage(&self) -> f64 {
        self.cleared_cells() as f64 / self.total_cells() as f64
    }

    /// Sample the surface and produce the verdict. Terminal: returns None if
    /// a verdict already exists.
    pub fn resolve(&mut self) -> Option<ScratchVerdict> {
        if self.verdict.is_some() {
            return None;
        }

        let cleared_fraction = self.coverage();
        let verdict = ScratchVerdict {
            cleared_fraction,
            passed: cleared_fraction > self.pass_threshold,
        };

        tracing::debug!(
            cleared_fraction,
            passed = verdict.passed,
            "Scratch verdict"
        );

        self.drawing = false;
        self.session = None;
        self.verdict = Some(verdict);
        Some(verdict)
    }

    /// Whole seconds left before `deadline` elapses, rounded up
    pub fn seconds_remaining(&self, deadline: Duration) -> Option<u64> {
        let session = self.session.as_ref().filter(|s| s.deadline_armed)?;
        let left = deadline.saturating_sub(session.armed_at.elapsed());
        Some(left.as_millis().div_ceil(1000) as u64)
    }

    pub fn view(&self, deadline: Duration) -> ScratchView {
        ScratchView {
            armed: self.is_armed(),
            seconds_remaining: self.seconds_remaining(deadline),
            drawing: self.drawing,
            cleared_fraction: self.verdict.map(|v| v.cleared_fraction),
            verdict: self.verdict.map(|v| v.passed),
        }
    }

    /// Current overlay as a PNG data URL
    pub fn png_data_url(&self) -> Result<String, ArgusError> {
        let mut buf = Vec::new();
        self.surface
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| ArgusError::Internal(format!("png encode failed: {}", e)))?;
        Ok(format!("data:image/png;base64,{}", STANDARD.encode(&buf)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ScratchConfig {
        ScratchConfig::default()
    }

    /// Surface with exactly `cleared` transparent cells in row-major order
    fn surface_with_cleared(cleared: u64) -> ScratchDetector {
        let config = config();
        let mut raster = RgbaImage::from_pixel(config.width, config.height, Rgba([1, 2, 3, 255]));
        for (i, pixel) in raster.pixels_mut().enumerate() {
            if (i as u64) < cleared {
                *pixel = CLEAR;
            }
        }
        ScratchDetector::from_raster(raster, &config)
    }

    #[test]
    fn test_new_surface_is_opaque() {
        let detector = ScratchDetector::new(&config());
        assert_eq!(detector.total_cells(), 28_000);
        assert_eq!(detector.cleared_cells(), 0);
        assert!(detector.session().is_none());
    }

    #[test]
    fn test_threshold_boundaries() {
        // 9523 / 28000 = 0.340107...
        let mut above = surface_with_cleared(9_523);
        let verdict = above.resolve().unwrap();
        assert!(verdict.cleared_fraction >= 0.3401);
        assert!(verdict.passed);

        // 9517 / 28000 = 0.339892...
        let mut below = surface_with_cleared(9_517);
        let verdict = below.resolve().unwrap();
        assert!(verdict.cleared_fraction <= 0.3399);
        assert!(!verdict.passed);

        // Exactly at the threshold does not pass
        let mut exact = surface_with_cleared(9_520);
        assert!(!exact.resolve().unwrap().passed);
    }

    #[test]
    fn test_first_down_arms_and_erases_disc() {
        let mut detector = ScratchDetector::new(&config());
        assert!(detector.pointer_down(100.0, 70.0));
        assert!(detector.is_armed());

        // Disc of radius 7 covers roughly pi * 7^2 cells
        let cleared = detector.cleared_cells();
        assert!(cleared > 140 && cleared < 200, "cleared {cleared}");

        // Second press does not re-arm
        detector.pointer_up();
        assert!(!detector.pointer_down(20.0, 20.0));
        assert!(detector.is_armed());
    }

    #[test]
    fn test_move_only_erases_while_down() {
        let mut detector = ScratchDetector::new(&config());
        detector.pointer_down(10.0, 10.0);
        detector.pointer_up();
        let before = detector.cleared_cells();

        detector.pointer_move(150.0, 100.0);
        assert_eq!(detector.cleared_cells(), before);

        detector.pointer_down(10.0, 10.0);
        detector.pointer_move(150.0, 100.0);
        assert!(detector.cleared_cells() > before);
    }

    #[test]
    fn test_rearm_rejected_while_armed() {
        let mut detector = ScratchDetector::new(&config());
        detector.arm().unwrap();
        assert_eq!(detector.arm().unwrap_err(), ArgusError::ScratchArmed);
    }

    #[test]
    fn test_verdict_is_terminal() {
        let mut detector = ScratchDetector::new(&config());
        detector.pointer_down(50.0, 50.0);
        let verdict = detector.resolve().unwrap();
        assert!(!verdict.passed);
        assert!(detector.session().is_none());

        let cleared = detector.cleared_cells();
        assert!(!detector.pointer_down(120.0, 60.0));
        detector.pointer_move(130.0, 60.0);
        assert_eq!(detector.cleared_cells(), cleared);

        assert!(detector.resolve().is_none());
        assert!(detector.arm().is_err());
        assert_eq!(detector.verdict(), Some(verdict));
    }

    #[test]
    fn test_full_sweep_passes() {
        let mut detector = ScratchDetector::new(&config());
        detector.pointer_down(0.0, 0.0);
        for y in (0..140).step_by(10) {
            for x in (0..200).step_by(5) {
                detector.pointer_move(x as f32, y as f32);
            }
        }
        assert!(detector.resolve().unwrap().passed);
    }

    #[test]
    fn test_off_surface_samples_are_ignored() {
        let mut detector = ScratchDetector::new(&config());
        assert!(detector.pointer_down(1.0e10, 10.0));
        detector.pointer_move(10.0, -1.0e10);
        detector.pointer_move(f32::NAN, 10.0);
        detector.pointer_move(10.0, f32::INFINITY);
        detector.pointer_move(f32::MAX, f32::MIN);
        detector.pointer_move(-8.0, 70.0);
        assert_eq!(detector.cleared_cells(), 0);

        // A disc centred just off the edge still clears its overlap
        detector.pointer_move(-3.0, 70.0);
        assert!(detector.cleared_cells() > 0);
        assert!(detector.is_armed());
    }

    #[test]
    fn test_oversized_config_is_clamped() {
        let config = ScratchConfig {
            width: u32::MAX,
            height: 10,
            brush_radius: 20,
            pass_threshold: 0.34,
        };
        let mut detector = ScratchDetector::new(&config);
        assert_eq!(detector.total_cells(), u64::from(MAX_EDGE) * 10);
        detector.pointer_down(4090.0, 5.0);
        assert!(detector.cleared_cells() > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seconds_remaining_counts_down() {
        let deadline = Duration::from_secs(5);
        let mut detector = ScratchDetector::new(&config());
        assert_eq!(detector.view(deadline).seconds_remaining, None);

        detector.pointer_down(100.0, 70.0);
        assert_eq!(detector.seconds_remaining(deadline), Some(5));

        tokio::time::advance(Duration::from_millis(1200)).await;
        assert_eq!(detector.seconds_remaining(deadline), Some(4));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(detector.seconds_remaining(deadline), Some(0));

        detector.resolve();
        assert_eq!(detector.view(deadline).seconds_remaining, None);
    }

    #[test]
    fn test_pointer_wire_format() {
        let events: Vec<PointerEvent> = serde_json::from_str(
            r#"[{"type": "down", "x": 3, "y": 4.5}, {"type": "move", "x": 5, "y": 6}, {"type": "up"}]"#,
        )
        .unwrap();
        assert_eq!(events[0], PointerEvent::Down { x: 3.0, y: 4.5 });
        assert_eq!(events[2], PointerEvent::Up);
    }

    #[test]
    fn test_png_export() {
        let detector = ScratchDetector::new(&config());
        let url = detector.png_data_url().unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
    }
}
