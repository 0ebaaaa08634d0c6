//! Per-prefix reliability statistics
//!
//! [`ReliabilityStatistics`] collects satisfied/unsatisfied counts for every
//! (face, layer) pair of one content prefix. Once per update period
//! [`snapshot_and_roll`](ReliabilityStatistics::snapshot_and_roll) turns the
//! period's counts into the values the forwarding matrix adapts on:
//!
//! - **Reliability**: satisfied / (satisfied + unsatisfied), or 1.0 when
//!   nothing went unsatisfied
//! - **Confidence**: `1 / (1 + sqrt(variance))` of the satisfied counts over
//!   a bounded history window, and its exponential moving average
//! - **Loss ratio**: share of forwarded requests not satisfied by any real
//!   face, the budget signal for probing
//!
//! The drop sentinel has a row like every other face: rejections are counted
//! there so they take part in the total.

use std::collections::{BTreeMap, VecDeque};

use saf_core::{FaceId, ForwardingError, Layer};

/// Variance assumed while the history holds at most one sample
pub const INIT_VARIANCE: f64 = 1000.0;

#[derive(Debug, Clone)]
struct FaceStats {
    satisfied: u64,
    unsatisfied: u64,
    last_satisfied: u64,
    last_unsatisfied: u64,
    reliability: f64,
    observed_share: f64,
    history: VecDeque<u64>,
    variance: f64,
    ema_confidence: f64,
}

impl FaceStats {
    fn new() -> Self {
        Self {
            satisfied: 0,
            unsatisfied: 0,
            last_satisfied: 0,
            last_unsatisfied: 0,
            reliability: 1.0,
            observed_share: 0.0,
            history: VecDeque::new(),
            variance: INIT_VARIANCE,
            ema_confidence: 0.0,
        }
    }

    fn confidence(&self) -> f64 {
        1.0 / (1.0 + self.variance.sqrt())
    }

    fn push_history(&mut self, sample: u64, window: usize) {
        self.history.push_back(sample);
        while self.history.len() > window {
            self.history.pop_front();
        }
        self.variance = if self.history.len() <= 1 {
            INIT_VARIANCE
        } else {
            let n = self.history.len() as f64;
            let mean = self.history.iter().map(|&s| s as f64).sum::<f64>() / n;
            self.history
                .iter()
                .map(|&s| (s as f64 - mean).powi(2))
                .sum::<f64>()
                / n
        };
    }
}

#[derive(Debug, Clone, Default)]
struct LayerStats {
    faces: BTreeMap<FaceId, FaceStats>,
    total_forwarded: u64,
    loss_ratio: f64,
}

/// Rolling reliability counters for one content prefix
#[derive(Debug, Clone)]
pub struct ReliabilityStatistics {
    layers: Vec<LayerStats>,
    history_window: usize,
    ema_weight: f64,
}

impl ReliabilityStatistics {
    /// Create statistics for `faces` (the drop sentinel is always included)
    pub fn new(faces: &[FaceId], layer_count: usize, history_window: usize, ema_weight: f64) -> Self {
        let mut stats = Self {
            layers: vec![LayerStats::default(); layer_count],
            history_window,
            ema_weight,
        };
        stats.add_face(FaceId::DROP);
        for &face in faces {
            stats.add_face(face);
        }
        stats
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Faces tracked, in canonical order (drop first)
    pub fn faces(&self) -> Vec<FaceId> {
        self.layers
            .first()
            .map(|l| l.faces.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, face: FaceId) -> bool {
        self.layers
            .first()
            .is_some_and(|l| l.faces.contains_key(&face))
    }

    /// Start tracking a face on every layer; known faces are left untouched
    pub fn add_face(&mut self, face: FaceId) {
        for layer in &mut self.layers {
            layer.faces.entry(face).or_insert_with(FaceStats::new);
        }
    }

    /// Stop tracking a face on every layer
    pub fn remove_face(&mut self, face: FaceId) {
        if face.is_drop() {
            return;
        }
        for layer in &mut self.layers {
            layer.faces.remove(&face);
        }
    }

    fn layer(&self, layer: Layer) -> Result<&LayerStats, ForwardingError> {
        self.layers.get(layer).ok_or(ForwardingError::UnknownLayer {
            layer,
            max: self.layers.len(),
        })
    }

    fn face(&self, face: FaceId, layer: Layer) -> Result<&FaceStats, ForwardingError> {
        self.layer(layer)?
            .faces
            .get(&face)
            .ok_or(ForwardingError::UnknownFace(face))
    }

    /// Count one outcome for the current period
    pub fn record_outcome(
        &mut self,
        face: FaceId,
        layer: Layer,
        satisfied: bool,
    ) -> Result<(), ForwardingError> {
        let max = self.layers.len();
        let stats = self
            .layers
            .get_mut(layer)
            .ok_or(ForwardingError::UnknownLayer { layer, max })?
            .faces
            .get_mut(&face)
            .ok_or(ForwardingError::UnknownFace(face))?;
        if satisfied {
            stats.satisfied += 1;
        } else {
            stats.unsatisfied += 1;
        }
        Ok(())
    }

    /// Close the current period for `layer`
    ///
    /// Derives reliability, variance, confidence and loss ratio from the
    /// period's counts, then moves the counts into the last-period fields
    /// and starts a fresh period.
    pub fn snapshot_and_roll(&mut self, layer: Layer) -> Result<(), ForwardingError> {
        let max = self.layers.len();
        let window = self.history_window;
        let weight = self.ema_weight;
        let stats = self
            .layers
            .get_mut(layer)
            .ok_or(ForwardingError::UnknownLayer { layer, max })?;

        let total: u64 = stats
            .faces
            .values()
            .map(|f| f.satisfied + f.unsatisfied)
            .sum();
        let satisfied_on_faces: u64 = stats
            .faces
            .iter()
            .filter(|(face, _)| !face.is_drop())
            .map(|(_, f)| f.satisfied)
            .sum();

        for f in stats.faces.values_mut() {
            let forwarded = f.satisfied + f.unsatisfied;
            f.reliability = if f.unsatisfied == 0 {
                1.0
            } else {
                f.satisfied as f64 / forwarded as f64
            };
            f.observed_share = if total == 0 {
                0.0
            } else {
                forwarded as f64 / total as f64
            };
            f.push_history(f.satisfied, window);
            f.ema_confidence = weight * f.confidence() + (1.0 - weight) * f.ema_confidence;

            f.last_satisfied = f.satisfied;
            f.last_unsatisfied = f.unsatisfied;
            f.satisfied = 0;
            f.unsatisfied = 0;
        }

        stats.total_forwarded = total;
        stats.loss_ratio = if total == 0 {
            0.0
        } else {
            1.0 - satisfied_on_faces as f64 / total as f64
        };
        Ok(())
    }

    /// Reliability derived at the last snapshot
    pub fn reliability(&self, face: FaceId, layer: Layer) -> Result<f64, ForwardingError> {
        Ok(self.face(face, layer)?.reliability)
    }

    /// Confidence in the face's satisfied counts: `1 / (1 + sqrt(variance))`
    pub fn confidence(&self, face: FaceId, layer: Layer) -> Result<f64, ForwardingError> {
        Ok(self.face(face, layer)?.confidence())
    }

    /// Exponential moving average of [`confidence`](Self::confidence)
    pub fn smoothed_confidence(&self, face: FaceId, layer: Layer) -> Result<f64, ForwardingError> {
        Ok(self.face(face, layer)?.ema_confidence)
    }

    /// Variance of the satisfied-count history
    pub fn variance(&self, face: FaceId, layer: Layer) -> Result<f64, ForwardingError> {
        Ok(self.face(face, layer)?.variance)
    }

    /// Requests forwarded on the face in the last period
    pub fn forwarded(&self, face: FaceId, layer: Layer) -> Result<u64, ForwardingError> {
        let f = self.face(face, layer)?;
        Ok(f.last_satisfied + f.last_unsatisfied)
    }

    pub fn last_satisfied(&self, face: FaceId, layer: Layer) -> Result<u64, ForwardingError> {
        Ok(self.face(face, layer)?.last_satisfied)
    }

    pub fn last_unsatisfied(&self, face: FaceId, layer: Layer) -> Result<u64, ForwardingError> {
        Ok(self.face(face, layer)?.last_unsatisfied)
    }

    /// Share of the layer's last-period traffic that went to the face
    pub fn observed_share(&self, face: FaceId, layer: Layer) -> Result<f64, ForwardingError> {
        Ok(self.face(face, layer)?.observed_share)
    }

    /// The face's last-period unsatisfied count over the layer total
    pub fn unsatisfied_fraction(&self, face: FaceId, layer: Layer) -> Result<f64, ForwardingError> {
        let total = self.total_forwarded(layer)?;
        if total == 0 {
            return Ok(0.0);
        }
        Ok(self.face(face, layer)?.last_unsatisfied as f64 / total as f64)
    }

    /// Requests forwarded on all faces (drop included) in the last period
    pub fn total_forwarded(&self, layer: Layer) -> Result<u64, ForwardingError> {
        Ok(self.layer(layer)?.total_forwarded)
    }

    /// Share of last-period requests not satisfied by any real face
    pub fn loss_ratio(&self, layer: Layer) -> Result<f64, ForwardingError> {
        Ok(self.layer(layer)?.loss_ratio)
    }

    /// Outcomes recorded so far in the current period: (satisfied, unsatisfied)
    pub fn current_counts(&self, face: FaceId, layer: Layer) -> Result<(u64, u64), ForwardingError> {
        let f = self.face(face, layer)?;
        Ok((f.satisfied, f.unsatisfied))
    }
}
