//! Ground points, biome categories and the measurement-error model.

/// Per-category measurement error tables.
pub mod error_table;
/// Error-reduction reward model.
pub mod reward;

use std::collections::BTreeSet;

use indexmap::IndexMap;
use planit::{GroundPointId, Tick};
use serde::{Deserialize, Serialize};

/// Seconds per model bucket (3 hours).
pub const MODEL_BUCKET_TICKS: Tick = 3 * 60 * 60;
/// Number of 3-hour buckets in a day.
pub const MODEL_BUCKETS: usize = 8;
/// Category used when a biome cannot be mapped.
pub const FALLBACK_CATEGORY: u8 = 5;

/// Index of the model bucket holding `tick` (0 for hours 0-2, .., 7 for 21+).
#[must_use]
pub fn model_bucket(tick: Tick) -> usize {
    usize::try_from(tick / MODEL_BUCKET_TICKS)
        .unwrap_or(usize::MAX)
        .min(MODEL_BUCKETS - 1)
}

/// Model hour of `tick`: 0, 3, .., 21.
#[must_use]
pub fn model_hour(tick: Tick) -> u32 {
    3 * (tick / MODEL_BUCKET_TICKS).min(7)
}

/// Error-table category of a biome type, or `None` when unmapped.
#[must_use]
pub const fn error_category(biome: u32) -> Option<u8> {
    match biome {
        1..=5 => Some(1),
        6 | 7 => Some(2),
        8..=10 => Some(3),
        12 | 14 => Some(4),
        16 => Some(5),
        _ => None,
    }
}

/// A ground cell whose soil-moisture model error the plan tries to reduce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundPoint {
    /// Identifier.
    pub id: GroundPointId,
    /// Biome type (land cover class).
    pub biome: u32,
    /// Model error per 3-hour bucket, starting at hour 0.
    #[serde(default)]
    pub model_error: Vec<f64>,
    /// Ticks at which the point is accessible.
    #[serde(default)]
    pub access_ticks: BTreeSet<Tick>,
}

impl GroundPoint {
    /// Model error at the bucket of `tick`, if provided.
    #[must_use]
    pub fn prior_error(&self, tick: Tick) -> Option<f64> {
        self.model_error.get(model_bucket(tick)).copied()
    }
}

/// Ground points of a scenario by id.
#[derive(Debug, Clone, Default)]
pub struct GroundRegistry {
    points: IndexMap<GroundPointId, GroundPoint>,
}

impl GroundRegistry {
    /// Indexes `points` by id; a repeated id merges access ticks into the first entry.
    pub fn new(points: impl IntoIterator<Item = GroundPoint>) -> Self {
        let mut registry = Self::default();
        for point in points {
            match registry.points.get_mut(&point.id) {
                Some(existing) => existing.access_ticks.extend(point.access_ticks),
                None => {
                    registry.points.insert(point.id, point);
                }
            }
        }
        registry
    }

    /// Looks up a point.
    #[must_use]
    pub fn get(&self, id: GroundPointId) -> Option<&GroundPoint> {
        self.points.get(&id)
    }

    /// Whether `id` is known.
    #[must_use]
    pub fn contains(&self, id: GroundPointId) -> bool {
        self.points.contains_key(&id)
    }

    /// Records that `id` is reachable at `tick`.
    pub fn add_access(&mut self, id: GroundPointId, tick: Tick) {
        if let Some(point) = self.points.get_mut(&id) {
            point.access_ticks.insert(tick);
        }
    }

    /// Access ticks of `id`; empty for unknown points.
    pub fn access_ticks(&self, id: GroundPointId) -> impl Iterator<Item = Tick> + '_ {
        self.points
            .get(&id)
            .into_iter()
            .flat_map(|point| point.access_ticks.iter().copied())
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points in input order.
    pub fn iter(&self) -> impl Iterator<Item = &GroundPoint> {
        self.points.values()
    }
}
