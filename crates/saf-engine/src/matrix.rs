//! Forwarding probability matrix
//!
//! One [`ForwardingMatrix`] per content prefix holds the probability of
//! sending a request of a given layer on each face. Rows follow the sorted
//! face roster (the drop sentinel first), columns are layers. Every column
//! sums to 1 after each public mutation.
//!
//! Once per update period [`ForwardingMatrix::update`] moves probability
//! away from faces whose reliability fell below the layer's threshold,
//! hands as much of it as they can absorb to the reliable faces, parks the
//! rest on the drop row and spends part of the dropped mass probing faces
//! that currently see no traffic. The threshold itself moves towards
//! `threshold_min` while traffic is being dropped and back towards
//! `threshold_max` once nothing is.

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use tracing::{debug, trace};

use saf_core::{FaceId, ForwardingError, Layer};

use crate::config::EngineConfig;
use crate::statistics::ReliabilityStatistics;

/// Tolerance used when checking column sums
pub const COLUMN_EPSILON: f64 = 1e-9;

/// Tunables of the matrix adaptation, taken from [`EngineConfig`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatrixParams {
    pub threshold_min: f64,
    pub threshold_max: f64,
    pub lambda: f64,
    pub cost_exponent: f64,
    pub min_probe: f64,
}

impl From<&EngineConfig> for MatrixParams {
    fn from(config: &EngineConfig) -> Self {
        Self {
            threshold_min: config.threshold_min,
            threshold_max: config.threshold_max,
            lambda: config.lambda,
            cost_exponent: config.cost_exponent,
            min_probe: config.min_probe,
        }
    }
}

impl Default for MatrixParams {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

/// What the statistics say about one face in one layer
#[derive(Debug, Clone, Copy)]
struct Observation {
    face: FaceId,
    reliability: f64,
    forwarded: u64,
    last_satisfied: u64,
    confidence: f64,
    unsatisfied_fraction: f64,
}

/// Per-layer inputs for one update, gathered before anything is mutated
#[derive(Debug, Clone)]
struct LayerObservations {
    faces: Vec<Observation>,
    total_forwarded: u64,
    loss_ratio: f64,
}

impl LayerObservations {
    fn gather(stats: &ReliabilityStatistics, faces: &[FaceId], layer: Layer) -> Result<Self, ForwardingError> {
        let faces = faces
            .iter()
            .filter(|face| !face.is_drop())
            .map(|&face| {
                Ok(Observation {
                    face,
                    reliability: stats.reliability(face, layer)?,
                    forwarded: stats.forwarded(face, layer)?,
                    last_satisfied: stats.last_satisfied(face, layer)?,
                    confidence: stats.confidence(face, layer)?,
                    unsatisfied_fraction: stats.unsatisfied_fraction(face, layer)?,
                })
            })
            .collect::<Result<Vec<_>, ForwardingError>>()?;
        Ok(Self {
            faces,
            total_forwarded: stats.total_forwarded(layer)?,
            loss_ratio: stats.loss_ratio(layer)?,
        })
    }
}

/// Probability table of one content prefix
#[derive(Debug, Clone)]
pub struct ForwardingMatrix {
    /// Sorted roster, drop sentinel first
    faces: Vec<FaceId>,
    /// `table[row][layer]`
    table: Vec<Vec<f64>>,
    thresholds: Vec<f64>,
    params: MatrixParams,
}

impl ForwardingMatrix {
    /// Build a matrix for `faces`, seeded from FIB costs
    ///
    /// Cheaper faces get more probability: each face's weight is
    /// `cost^gamma`, inverted against the weight sum and normalized. Faces
    /// without a cost start at 0. With no costs at all every real face gets
    /// the same share. The drop row starts at 0 unless no real face exists.
    pub fn new(
        faces: &[FaceId],
        layer_count: usize,
        costs: &BTreeMap<FaceId, u32>,
        params: MatrixParams,
    ) -> Self {
        let mut roster: Vec<FaceId> = faces.to_vec();
        roster.push(FaceId::DROP);
        roster.sort();
        roster.dedup();

        let seed = Self::seed_weights(&roster, costs, params.cost_exponent);
        let real_faces = roster.len() - 1;
        let table = roster
            .iter()
            .map(|face| {
                let p = if face.is_drop() {
                    0.0
                } else if seed.is_empty() {
                    1.0 / real_faces as f64
                } else {
                    seed.get(face).copied().unwrap_or(0.0)
                };
                vec![p; layer_count]
            })
            .collect();

        let mut matrix = Self {
            faces: roster,
            table,
            thresholds: vec![params.threshold_max; layer_count],
            params,
        };
        matrix.normalize();
        matrix
    }

    /// Initial probabilities from FIB costs, restricted to `roster`
    fn seed_weights(
        roster: &[FaceId],
        costs: &BTreeMap<FaceId, u32>,
        gamma: f64,
    ) -> BTreeMap<FaceId, f64> {
        // A zero cost would yield an infinite share
        let weights: BTreeMap<FaceId, f64> = costs
            .iter()
            .filter(|(face, _)| !face.is_drop() && roster.binary_search(face).is_ok())
            .map(|(&face, &cost)| (face, f64::from(cost.max(1)).powf(gamma)))
            .collect();

        let sum: f64 = weights.values().sum();
        let inverted: BTreeMap<FaceId, f64> = weights
            .into_iter()
            .map(|(face, w)| (face, sum / w))
            .collect();

        let norm: f64 = inverted.values().sum();
        inverted
            .into_iter()
            .map(|(face, w)| (face, w / norm))
            .collect()
    }

    pub fn faces(&self) -> &[FaceId] {
        &self.faces
    }

    pub fn layer_count(&self) -> usize {
        self.thresholds.len()
    }

    fn row_of(&self, face: FaceId) -> Option<usize> {
        self.faces.binary_search(&face).ok()
    }

    fn check_layer(&self, layer: Layer) -> Result<(), ForwardingError> {
        if layer < self.layer_count() {
            Ok(())
        } else {
            Err(ForwardingError::UnknownLayer {
                layer,
                max: self.layer_count(),
            })
        }
    }

    pub fn probability(&self, face: FaceId, layer: Layer) -> Option<f64> {
        let row = self.row_of(face)?;
        self.table[row].get(layer).copied()
    }

    pub fn threshold(&self, layer: Layer) -> Option<f64> {
        self.thresholds.get(layer).copied()
    }

    /// Every face with its probability for `layer`
    pub fn column(&self, layer: Layer) -> Option<Vec<(FaceId, f64)>> {
        if layer >= self.layer_count() {
            return None;
        }
        Some(
            self.faces
                .iter()
                .zip(&self.table)
                .map(|(&face, row)| (face, row[layer]))
                .collect(),
        )
    }

    /// Pick the next face for a request of `layer`
    ///
    /// Returns the drop sentinel when the faces already tried carry at least
    /// the layer's threshold in probability mass. Otherwise samples among
    /// the untried faces, their probabilities renormalized.
    ///
    /// A uniform draw `u` in `[0, 1)` picks the first candidate whose
    /// cumulative probability is strictly greater than `u`. A zero-probability
    /// row therefore never wins, even at `u == 0`, where the inclusive
    /// `cumulative >= u` comparison would pick it.
    pub fn select_face<R: Rng + ?Sized>(
        &self,
        layer: Layer,
        tried: &[FaceId],
        rng: &mut R,
    ) -> Result<FaceId, ForwardingError> {
        self.check_layer(layer)?;

        let tried: BTreeSet<FaceId> = tried.iter().copied().collect();
        let mut tried_mass = 0.0;
        for &face in &tried {
            let row = self
                .row_of(face)
                .ok_or(ForwardingError::TriedFaceMissing(face))?;
            tried_mass += self.table[row][layer];
        }
        if tried_mass > 0.0 && tried_mass >= self.thresholds[layer] {
            return Ok(FaceId::DROP);
        }

        let mut candidates: Vec<(FaceId, f64)> = self
            .faces
            .iter()
            .zip(&self.table)
            .filter(|(face, _)| !tried.contains(face))
            .map(|(&face, row)| (face, row[layer]))
            .collect();
        if candidates.is_empty() {
            return Ok(FaceId::DROP);
        }
        normalize_column(candidates.iter_mut().map(|(_, p)| p));

        let u: f64 = rng.random();
        let mut cumulative = 0.0;
        for (face, p) in candidates {
            cumulative += p;
            if u < cumulative {
                return Ok(face);
            }
        }
        Ok(FaceId::DROP)
    }

    /// Adapt every layer to the latest statistics snapshot
    ///
    /// Every face of the matrix must be known to `stats`; otherwise nothing
    /// is changed and the error is returned.
    pub fn update(&mut self, stats: &ReliabilityStatistics) -> Result<(), ForwardingError> {
        let observations = (0..self.layer_count())
            .map(|layer| LayerObservations::gather(stats, &self.faces, layer))
            .collect::<Result<Vec<_>, _>>()?;

        for (layer, obs) in observations.iter().enumerate() {
            self.update_layer(layer, obs);
        }
        self.normalize();
        Ok(())
    }

    fn update_layer(&mut self, layer: Layer, obs: &LayerObservations) {
        let t = self.thresholds[layer];
        let drop_row = 0;

        let mut reliable = Vec::new();
        let mut probing = Vec::new();
        let mut unreliable = Vec::new();
        for o in &obs.faces {
            if o.reliability < t {
                unreliable.push(*o);
            } else if o.forwarded > 0 {
                reliable.push(*o);
            } else {
                probing.push(*o);
            }
        }
        trace!(
            layer,
            threshold = t,
            reliable = reliable.len(),
            probing = probing.len(),
            unreliable = unreliable.len(),
            "Classified faces"
        );

        let mut pool = self.table[drop_row][layer];
        for o in &unreliable {
            let Some(row) = self.row_of(o.face) else {
                continue;
            };
            let removed = (o.confidence * o.unsatisfied_fraction).min(self.table[row][layer]);
            self.table[row][layer] -= removed;
            pool += removed;
            trace!(face = %o.face, layer, removed, "Removed probability from unreliable face");
        }

        if pool > 0.0 {
            if !reliable.is_empty() && obs.total_forwarded > 0 {
                let headroom: Vec<(FaceId, f64)> = reliable
                    .iter()
                    .map(|o| (o.face, o.last_satisfied as f64 / t - o.forwarded as f64))
                    .collect();
                let headroom_sum: f64 = headroom.iter().map(|(_, h)| h).sum();

                if headroom_sum > 0.0 {
                    let shifted = (headroom_sum / obs.total_forwarded as f64).min(pool);
                    for (face, h) in &headroom {
                        if let Some(row) = self.row_of(*face) {
                            self.table[row][layer] += shifted * h / headroom_sum;
                        }
                    }
                    pool -= shifted;
                    trace!(layer, shifted, "Shifted probability to reliable faces");
                }
            }

            self.table[drop_row][layer] = pool;

            if self.table[drop_row][layer] > 0.0 {
                self.probe(layer, &probing, obs.loss_ratio);

                if self.table[drop_row][layer] > 1.0 - t {
                    self.decrease_threshold(layer);
                }
            }
        } else if obs.total_forwarded > 0 {
            self.increase_threshold(layer);
        }
    }

    /// Move part of the dropped mass to faces that see no traffic
    fn probe(&mut self, layer: Layer, probing: &[Observation], loss_ratio: f64) {
        if probing.is_empty() {
            return;
        }

        let l = layer as f64;
        let layer_weight = 1.0 / ((1.0 + l).powi(2) - l);
        let budget = self.table[0][layer] * loss_ratio * layer_weight;
        if budget < self.params.min_probe {
            return;
        }
        self.table[0][layer] -= budget;

        let rows: Vec<usize> = probing.iter().filter_map(|o| self.row_of(o.face)).collect();
        let base_sum: f64 = rows.iter().map(|&row| self.table[row][0]).sum();
        for &row in &rows {
            let share = if layer == 0 || base_sum == 0.0 {
                budget / rows.len() as f64
            } else {
                budget * self.table[row][0] / base_sum
            };
            self.table[row][layer] += share;
        }
        debug!(layer, budget, faces = rows.len(), "Probing idle faces");
    }

    fn increase_threshold(&mut self, layer: Layer) {
        let t = self.thresholds[layer];
        self.set_threshold(layer, t + (self.params.threshold_max - t) * self.params.lambda);
    }

    fn decrease_threshold(&mut self, layer: Layer) {
        let t = self.thresholds[layer];
        self.set_threshold(layer, t - (t - self.params.threshold_min) * self.params.lambda);
    }

    fn set_threshold(&mut self, layer: Layer, value: f64) {
        let clamped = value.clamp(self.params.threshold_min, self.params.threshold_max);
        if clamped != self.thresholds[layer] {
            debug!(layer, threshold = clamped, "Reliability threshold changed");
        }
        self.thresholds[layer] = clamped;
    }

    /// Insert a zero row for a new face
    pub fn add_face(&mut self, face: FaceId) {
        if let Err(row) = self.faces.binary_search(&face) {
            self.faces.insert(row, face);
            self.table.insert(row, vec![0.0; self.layer_count()]);
            self.normalize();
        }
    }

    /// Delete a face's row; its mass is spread over the remaining rows
    pub fn remove_face(&mut self, face: FaceId) {
        if face.is_drop() {
            return;
        }
        if let Some(row) = self.row_of(face) {
            self.faces.remove(row);
            self.table.remove(row);
            self.normalize();
        }
    }

    fn normalize(&mut self) {
        for layer in 0..self.layer_count() {
            normalize_column(self.table.iter_mut().map(|row| &mut row[layer]));
        }
    }

    /// Sum of a layer's column
    pub fn column_sum(&self, layer: Layer) -> f64 {
        self.table.iter().filter_map(|row| row.get(layer)).sum()
    }
}

/// Scale a column to sum to 1; an all-zero column becomes uniform
fn normalize_column<'a>(column: impl Iterator<Item = &'a mut f64>) {
    let mut cells: Vec<&mut f64> = column.collect();
    if cells.is_empty() {
        return;
    }
    let sum: f64 = cells.iter().map(|p| p.max(0.0)).sum();
    if sum == 0.0 {
        let uniform = 1.0 / cells.len() as f64;
        for p in &mut cells {
            **p = uniform;
        }
    } else {
        for p in &mut cells {
            **p = p.max(0.0) / sum;
        }
    }
}
