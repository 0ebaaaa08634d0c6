//! Per-prefix forwarding state
//!
//! A [`PrefixEntry`] pairs the [`ReliabilityStatistics`] and the
//! [`ForwardingMatrix`] of one content prefix and turns pipeline outcomes
//! into statistics updates through the prefix's [`MeasureKind`].

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use saf_core::{ContentPrefix, Delivery, FaceId, ForwardingError, Layer, NextHop};

use crate::config::EngineConfig;
use crate::matrix::{ForwardingMatrix, MatrixParams};
use crate::measure::MeasureKind;
use crate::statistics::ReliabilityStatistics;

/// Forwarding state of one content prefix
#[derive(Debug, Clone)]
pub struct PrefixEntry {
    prefix: ContentPrefix,
    measure: MeasureKind,
    /// FIB costs captured when the entry was created
    initial_costs: BTreeMap<FaceId, u32>,
    stats: ReliabilityStatistics,
    matrix: ForwardingMatrix,
}

impl PrefixEntry {
    /// Create the entry for `prefix`
    ///
    /// `roster` is the engine's live face list. Next hops naming faces
    /// outside the roster are ignored.
    pub fn new(
        prefix: ContentPrefix,
        roster: &[FaceId],
        next_hops: &[NextHop],
        measure: MeasureKind,
        config: &EngineConfig,
    ) -> Self {
        let faces: Vec<FaceId> = roster.iter().copied().filter(|f| !f.is_drop()).collect();
        let mut initial_costs = BTreeMap::new();
        for hop in next_hops {
            if faces.contains(&hop.face) {
                initial_costs.insert(hop.face, hop.cost);
            } else {
                debug!(prefix = %prefix, face = %hop.face, "Ignoring next hop outside the roster");
            }
        }

        let stats = ReliabilityStatistics::new(
            &faces,
            config.max_layers,
            config.history_window,
            config.ema_weight,
        );
        let matrix = ForwardingMatrix::new(
            &faces,
            config.max_layers,
            &initial_costs,
            MatrixParams::from(config),
        );

        Self {
            prefix,
            measure,
            initial_costs,
            stats,
            matrix,
        }
    }

    pub fn prefix(&self) -> &ContentPrefix {
        &self.prefix
    }

    pub fn measure(&self) -> MeasureKind {
        self.measure
    }

    pub fn initial_costs(&self) -> &BTreeMap<FaceId, u32> {
        &self.initial_costs
    }

    pub fn statistics(&self) -> &ReliabilityStatistics {
        &self.stats
    }

    pub fn matrix(&self) -> &ForwardingMatrix {
        &self.matrix
    }

    /// Sample the next face to try for a request of `layer`
    pub fn next_hop<R: Rng + ?Sized>(
        &self,
        layer: Layer,
        tried: &[FaceId],
        rng: &mut R,
    ) -> Result<FaceId, ForwardingError> {
        self.matrix.select_face(layer, tried, rng)
    }

    fn record(&mut self, face: FaceId, layer: Layer, satisfied: bool) {
        if let Err(e) = self.stats.record_outcome(face, layer, satisfied) {
            debug!(prefix = %self.prefix, face = %face, layer, error = %e, "Ignoring outcome");
        }
    }

    /// A response came back on `in_face`
    ///
    /// The response counts as satisfied on `in_face` when it passes the
    /// prefix's measure. Otherwise it is accounted like an expiry on every
    /// face in `out_faces`.
    pub fn record_satisfied(
        &mut self,
        layer: Layer,
        in_face: FaceId,
        out_faces: &[FaceId],
        delivery: &Delivery,
    ) {
        if self.measure.accepts(delivery) {
            self.record(in_face, layer, true);
        } else {
            debug!(prefix = %self.prefix, face = %in_face, ?delivery, "Response failed the measure");
            self.record_expired(layer, out_faces);
        }
    }

    /// The request timed out on every face it was sent to
    pub fn record_expired(&mut self, layer: Layer, out_faces: &[FaceId]) {
        for &face in out_faces {
            self.record(face, layer, false);
        }
    }

    /// Count one unsatisfied request on `face` (NACK or denied admission)
    pub fn record_unsatisfied(&mut self, face: FaceId, layer: Layer) {
        self.record(face, layer, false);
    }

    /// The engine gave up on a request after considering `face`
    ///
    /// Giving up is a correct outcome for the drop row and a failure for
    /// every real face.
    pub fn record_rejection(&mut self, face: FaceId, layer: Layer) {
        self.record(face, layer, face.is_drop());
    }

    /// Close the statistics period and adapt the matrix
    pub fn tick(&mut self) {
        for layer in 0..self.stats.layer_count() {
            if let Err(e) = self.stats.snapshot_and_roll(layer) {
                warn!(prefix = %self.prefix, layer, error = %e, "Statistics roll failed");
            }
        }
        if let Err(e) = self.matrix.update(&self.stats) {
            warn!(prefix = %self.prefix, error = %e, "Matrix update skipped");
        }
    }

    pub fn add_face(&mut self, face: FaceId) {
        self.stats.add_face(face);
        self.matrix.add_face(face);
    }

    pub fn remove_face(&mut self, face: FaceId) {
        self.matrix.remove_face(face);
        self.stats.remove_face(face);
    }

    pub fn probability(&self, face: FaceId, layer: Layer) -> Option<f64> {
        self.matrix.probability(face, layer)
    }

    pub fn threshold(&self, layer: Layer) -> Option<f64> {
        self.matrix.threshold(layer)
    }

    /// Serializable view of the entry's current state
    pub fn snapshot(&self) -> EntrySnapshot {
        let layers = (0..self.matrix.layer_count())
            .map(|layer| LayerSnapshot {
                threshold: self.matrix.threshold(layer).unwrap_or_default(),
                loss_ratio: self.stats.loss_ratio(layer).unwrap_or_default(),
                faces: self
                    .matrix
                    .faces()
                    .iter()
                    .map(|&face| FaceSnapshot {
                        face,
                        probability: self.matrix.probability(face, layer).unwrap_or_default(),
                        reliability: self.stats.reliability(face, layer).unwrap_or_default(),
                        forwarded: self.stats.forwarded(face, layer).unwrap_or_default(),
                    })
                    .collect(),
            })
            .collect();

        EntrySnapshot {
            prefix: self.prefix.clone(),
            measure: self.measure,
            layers,
        }
    }
}

/// Point-in-time view of a [`PrefixEntry`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub prefix: ContentPrefix,
    pub measure: MeasureKind,
    pub layers: Vec<LayerSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSnapshot {
    pub threshold: f64,
    pub loss_ratio: f64,
    pub faces: Vec<FaceSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceSnapshot {
    pub face: FaceId,
    pub probability: f64,
    /// Reliability derived at the last update
    pub reliability: f64,
    /// Requests forwarded in the last period
    pub forwarded: u64,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn face(id: u32) -> FaceId {
        FaceId::new(id).unwrap()
    }

    fn roster() -> Vec<FaceId> {
        vec![FaceId::DROP, face(1), face(2), face(3)]
    }

    fn entry(measure: MeasureKind) -> PrefixEntry {
        PrefixEntry::new(
            ContentPrefix::root(),
            &roster(),
            &[],
            measure,
            &EngineConfig::default(),
        )
    }

    #[test]
    fn test_fib_costs_intersect_roster() {
        let hops = [NextHop::new(face(1), 1), NextHop::new(face(7), 1)];
        let entry = PrefixEntry::new(
            ContentPrefix::root(),
            &roster(),
            &hops,
            MeasureKind::Ratio,
            &EngineConfig::default(),
        );
        assert_eq!(entry.initial_costs().len(), 1);
        assert_eq!(entry.probability(face(1), 0), Some(1.0));
        assert_eq!(entry.probability(face(2), 0), Some(0.0));
        assert_eq!(entry.probability(face(7), 0), None);
    }

    #[test]
    fn test_outcome_accounting() {
        let mut entry = entry(MeasureKind::Ratio);
        entry.record_satisfied(0, face(1), &[face(1), face(2)], &Delivery::default());
        entry.record_expired(0, &[face(2), face(3)]);
        entry.record_unsatisfied(face(3), 0);
        entry.record_rejection(FaceId::DROP, 0);
        entry.record_rejection(face(2), 0);

        let stats = entry.statistics();
        assert_eq!(stats.current_counts(face(1), 0), Ok((1, 0)));
        assert_eq!(stats.current_counts(face(2), 0), Ok((0, 2)));
        assert_eq!(stats.current_counts(face(3), 0), Ok((0, 2)));
        assert_eq!(stats.current_counts(FaceId::DROP, 0), Ok((1, 0)));
    }

    #[test]
    fn test_failed_measure_counts_as_expiry() {
        let mut entry = entry(MeasureKind::Delay {
            max_delay: Duration::from_millis(100),
        });
        let slow = Delivery::with_rtt(Duration::from_millis(250));
        entry.record_satisfied(0, face(1), &[face(1), face(2)], &slow);

        let stats = entry.statistics();
        assert_eq!(stats.current_counts(face(1), 0), Ok((0, 1)));
        assert_eq!(stats.current_counts(face(2), 0), Ok((0, 1)));
    }

    #[test]
    fn test_outcomes_for_removed_face_are_ignored() {
        let mut entry = entry(MeasureKind::Ratio);
        entry.remove_face(face(2));
        entry.record_unsatisfied(face(2), 0);
        entry.record_unsatisfied(face(1), 5);
        entry.tick();
        assert_eq!(entry.statistics().total_forwarded(0), Ok(0));
    }

    #[test]
    fn test_tick_adapts_matrix() {
        let mut entry = entry(MeasureKind::Ratio);
        for _ in 0..30 {
            entry.record_unsatisfied(face(1), 0);
            entry.record_satisfied(0, face(2), &[face(2)], &Delivery::default());
            entry.record_satisfied(0, face(3), &[face(3)], &Delivery::default());
        }
        entry.tick();
        entry.tick();

        let snapshot = entry.snapshot();
        let layer = &snapshot.layers[0];
        let sum: f64 = layer.faces.iter().map(|f| f.probability).sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(entry.probability(face(1), 0).unwrap() < 1.0 / 3.0);
        assert!(entry.threshold(0).unwrap() <= 0.999);
    }

    #[test]
    fn test_next_hop_skips_tried() {
        let entry = entry(MeasureKind::Ratio);
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            let hop = entry.next_hop(0, &[face(1), face(3)], &mut rng).unwrap();
            assert_eq!(hop, face(2));
        }
    }

    #[test]
    fn test_snapshot_serializes() {
        let entry = entry(MeasureKind::hops());
        let json = serde_json::to_string(&entry.snapshot()).unwrap();
        assert!(json.contains("\"prefix\":\"/\""));
        assert!(json.contains("probability"));
    }
}
