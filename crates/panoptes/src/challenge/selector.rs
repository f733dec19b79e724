//! Variant selection: device-weighted draw that never repeats the previous kind.

use rand::Rng;

use argus_common::constants::weights::{HIGH_FRICTION_COMPACT, HIGH_FRICTION_STANDARD};
use argus_common::{ArgusError, ChallengeKind, DeviceClass};

/// Picks the next challenge kind from the enabled set
#[derive(Debug, Clone)]
pub struct VariantSelector {
    kinds: Vec<ChallengeKind>,
}

impl VariantSelector {
    /// A selector needs at least two distinct kinds, otherwise excluding the
    /// previous kind leaves nothing to draw.
    pub fn new(kinds: &[ChallengeKind]) -> Result<Self, ArgusError> {
        let mut distinct: Vec<ChallengeKind> = Vec::with_capacity(kinds.len());
        for kind in kinds {
            if !distinct.contains(kind) {
                distinct.push(*kind);
            }
        }

        if distinct.len() < 2 {
            return Err(ArgusError::Config(format!(
                "at least two challenge kinds must be enabled, found {}",
                distinct.len()
            )));
        }

        Ok(Self { kinds: distinct })
    }

    pub fn kinds(&self) -> &[ChallengeKind] {
        &self.kinds
    }

    /// Probability of each candidate for this draw.
    ///
    /// The high-friction kind gets a fixed mass depending on the device and
    /// the rest is split evenly. When it is excluded the remaining kinds are
    /// uniform.
    pub fn weights(
        &self,
        excluding: Option<ChallengeKind>,
        device: DeviceClass,
    ) -> Vec<(ChallengeKind, f64)> {
        let candidates: Vec<ChallengeKind> = self
            .kinds
            .iter()
            .copied()
            .filter(|kind| Some(*kind) != excluding)
            .collect();

        let has_friction = candidates.iter().any(|k| k.is_high_friction());
        let others = candidates.len() - usize::from(has_friction);

        if !has_friction || others == 0 {
            let uniform = 1.0 / candidates.len() as f64;
            return candidates.into_iter().map(|k| (k, uniform)).collect();
        }

        let friction = match device {
            DeviceClass::Compact => HIGH_FRICTION_COMPACT,
            DeviceClass::Standard => HIGH_FRICTION_STANDARD,
        };
        let share = (1.0 - friction) / others as f64;

        candidates
            .into_iter()
            .map(|k| (k, if k.is_high_friction() { friction } else { share }))
            .collect()
    }

    /// Draw the next kind
    pub fn select<R: Rng>(
        &self,
        excluding: Option<ChallengeKind>,
        device: DeviceClass,
        rng: &mut R,
    ) -> ChallengeKind {
        let weights = self.weights(excluding, device);
        pick_weighted(&weights, rng.random::<f64>())
    }
}

/// Convenience draw over every kind
pub fn select_next_kind<R: Rng>(
    excluding: Option<ChallengeKind>,
    is_compact: bool,
    rng: &mut R,
) -> ChallengeKind {
    let selector = VariantSelector {
        kinds: ChallengeKind::ALL.to_vec(),
    };
    selector.select(excluding, DeviceClass::from_compact(is_compact), rng)
}

/// Cumulative-weight lookup. A draw past the accumulated total (float
/// rounding) lands on the last candidate.
fn pick_weighted(weights: &[(ChallengeKind, f64)], draw: f64) -> ChallengeKind {
    let mut cumulative = 0.0;
    for (kind, weight) in weights {
        cumulative += weight;
        if draw < cumulative {
            return *kind;
        }
    }
    weights[weights.len() - 1].0
}
