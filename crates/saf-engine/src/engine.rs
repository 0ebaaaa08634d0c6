//! Adaptive multipath forwarding engine
//!
//! The [`ForwardingEngine`] owns the face roster, one [`PrefixEntry`] per
//! content prefix and one [`EgressLimiter`] per face. It answers the
//! pipeline's "where next?" question through [`ForwardingEngine::decide`]
//! and routes outcomes back into the statistics of the owning prefix.
//!
//! ## Decision Loop
//!
//! 1. Sample a face from the prefix's matrix, excluding faces already tried
//! 2. **REJECT** if the sample is the drop sentinel or a face the request
//!    came in on
//! 3. **FORWARD** if the face's limiter admits the request
//! 4. Otherwise count a NACK on the face, add it to the tried set and repeat
//!
//! ## Locking
//!
//! Roster, then prefix entry, then limiter. Face changes hold the roster
//! write lock until every entry and limiter has been updated. Ticks are
//! serialized by their own mutex.
//!
//! ## Logging
//!
//! Decisions, ticks and face changes run under a [`RouterContextGuard`] for
//! the engine's router, so every span they open is attributed to it.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rand::SeedableRng;
use rand::rngs::StdRng;
use saf_logging::RouterContextGuard;
use tracing::{debug, debug_span, info, trace, trace_span, warn};
use uuid::Uuid;

use saf_core::{
    ContentPrefix, Delivery, FaceId, ForwardingDecision, Layer, Name, RouterContext,
};

use crate::config::EngineConfig;
use crate::entry::{EntrySnapshot, PrefixEntry};
use crate::error::{EngineError, EngineResult};
use crate::limiter::EgressLimiter;
use crate::measure::MeasureRegistry;

/// Per-router forwarding engine
pub struct ForwardingEngine<R: RouterContext> {
    /// Router hosting the engine
    router: Arc<R>,
    /// Validated configuration
    config: EngineConfig,
    /// Name attached to log records
    router_name: String,
    /// Distinguishes engines sharing a router name
    instance_id: Uuid,
    /// Sorted face roster, drop sentinel first
    roster: RwLock<Vec<FaceId>>,
    /// Forwarding state per content prefix
    entries: DashMap<ContentPrefix, Arc<Mutex<PrefixEntry>>>,
    /// Admission control per face
    limiters: DashMap<FaceId, EgressLimiter>,
    /// Measure selection per prefix
    measures: MeasureRegistry,
    rng: Mutex<StdRng>,
    tick_guard: Mutex<()>,
}

impl<R: RouterContext> ForwardingEngine<R> {
    /// Create an engine for the faces the router currently knows
    ///
    /// Fails if the configuration does not validate.
    pub fn new(router: Arc<R>, config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;

        let mut roster: Vec<FaceId> = router.faces();
        roster.retain(|f| !f.is_drop());
        roster.push(FaceId::DROP);
        roster.sort();
        roster.dedup();

        let limiters = DashMap::new();
        for &face in roster.iter().filter(|f| !f.is_drop()) {
            limiters.insert(face, Self::build_limiter(router.as_ref(), &config, face)?);
        }

        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        let measures = MeasureRegistry::new(&config.measures, config.default_measure);

        info!(faces = roster.len() - 1, "Forwarding engine created");

        Ok(Self {
            router,
            config,
            router_name: String::from("router"),
            instance_id: Uuid::new_v4(),
            roster: RwLock::new(roster),
            entries: DashMap::new(),
            limiters,
            measures,
            rng: Mutex::new(rng),
            tick_guard: Mutex::new(()),
        })
    }

    /// Set the router name carried in log records
    pub fn with_router_name(mut self, name: impl Into<String>) -> Self {
        self.router_name = name.into();
        self
    }

    fn build_limiter(router: &R, config: &EngineConfig, face: FaceId) -> EngineResult<EgressLimiter> {
        if router.face_is_local(face) {
            return Ok(EgressLimiter::unlimited(face));
        }
        Ok(EgressLimiter::new(
            face,
            router.estimated_link_rate(face),
            &config.limiter,
        )?)
    }

    pub fn router(&self) -> &Arc<R> {
        &self.router
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn router_name(&self) -> &str {
        &self.router_name
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Attribute spans opened on this thread to the engine's router
    pub fn router_context(&self) -> RouterContextGuard {
        RouterContextGuard::with_instance_id(self.router_name.clone(), self.instance_id)
    }

    /// Content prefix a name adapts under
    pub fn prefix_of(&self, name: &Name) -> ContentPrefix {
        name.content_prefix(self.config.prefix_components)
    }

    /// Content layer of a name
    pub fn layer_of(&self, name: &Name) -> Layer {
        name.content_layer(self.config.max_layers)
    }

    /// Entry for `prefix`, created from the FIB on first sight
    fn entry_for(&self, name: &Name, prefix: &ContentPrefix, roster: &[FaceId]) -> Arc<Mutex<PrefixEntry>> {
        if let Some(entry) = self.entries.get(prefix) {
            return Arc::clone(entry.value());
        }

        let entry = self.entries.entry(prefix.clone()).or_insert_with(|| {
            let next_hops = self.router.longest_prefix_match(name);
            let measure = self.measures.resolve(name);
            debug!(
                router = %self.router_name,
                prefix = %prefix,
                next_hops = next_hops.len(),
                ?measure,
                "Creating prefix entry"
            );
            for mut limiter in self.limiters.iter_mut() {
                limiter.add_prefix(prefix);
            }
            Arc::new(Mutex::new(PrefixEntry::new(
                prefix.clone(),
                roster,
                &next_hops,
                measure,
                &self.config,
            )))
        });
        Arc::clone(entry.value())
    }

    fn existing_entry(&self, prefix: &ContentPrefix) -> Option<Arc<Mutex<PrefixEntry>>> {
        let entry = self.entries.get(prefix).map(|e| Arc::clone(e.value()));
        if entry.is_none() {
            debug!(router = %self.router_name, prefix = %prefix, "Outcome for unknown prefix ignored");
        }
        entry
    }

    /// Admit one request for `prefix` on `face`
    fn try_admit(&self, face: FaceId, prefix: &ContentPrefix) -> bool {
        match self.limiters.get_mut(&face) {
            Some(mut limiter) => limiter.try_consume(prefix),
            None => true,
        }
    }

    fn credit_nack(&self, face: FaceId, prefix: &ContentPrefix) {
        if let Some(mut limiter) = self.limiters.get_mut(&face) {
            limiter.on_nack_returned(prefix);
        }
    }

    /// Choose where to send a request
    ///
    /// `already_tried` holds faces the request was sent to before;
    /// `origin_in_faces` the non-local faces it arrived on. Neither is ever
    /// returned. Terminates after at most one attempt per face.
    pub fn decide(
        &self,
        name: &Name,
        already_tried: &[FaceId],
        origin_in_faces: &[FaceId],
    ) -> ForwardingDecision {
        let _context = self.router_context();
        let _span = trace_span!("decide", router = %self.router_name, name = %name).entered();
        let roster = self.roster.read();
        let prefix = self.prefix_of(name);
        let layer = self.layer_of(name);
        let entry = self.entry_for(name, &prefix, &roster);
        let mut entry = entry.lock();

        let mut tried: Vec<FaceId> = Vec::with_capacity(already_tried.len());
        for &face in already_tried {
            if !tried.contains(&face) {
                tried.push(face);
            }
        }
        let mut candidate = FaceId::DROP;

        for _ in 0..roster.len() {
            candidate = match entry.next_hop(layer, &tried, &mut *self.rng.lock()) {
                Ok(face) => face,
                Err(e) => {
                    warn!(prefix = %prefix, layer, error = %e, "Face selection failed, dropping");
                    FaceId::DROP
                }
            };

            if candidate.is_drop() || origin_in_faces.contains(&candidate) {
                break;
            }

            if self.try_admit(candidate, &prefix) {
                trace!(prefix = %prefix, face = %candidate, layer, "Forwarding");
                return ForwardingDecision::Forward(candidate);
            }

            debug!(prefix = %prefix, face = %candidate, "Admission denied");
            entry.record_unsatisfied(candidate, layer);
            self.credit_nack(candidate, &prefix);
            tried.push(candidate);
            candidate = FaceId::DROP;
        }

        for &face in &tried {
            entry.record_rejection(face, layer);
        }
        entry.record_rejection(candidate, layer);
        debug!(prefix = %prefix, layer, last = %candidate, tried = tried.len(), "Rejecting request");
        ForwardingDecision::Reject { tried }
    }

    /// A response for `name` arrived on `in_face`
    pub fn on_satisfied(&self, name: &Name, in_face: FaceId, out_faces: &[FaceId], delivery: &Delivery) {
        let prefix = self.prefix_of(name);
        if let Some(entry) = self.existing_entry(&prefix) {
            entry
                .lock()
                .record_satisfied(self.layer_of(name), in_face, out_faces, delivery);
        }
    }

    /// The request for `name` timed out on every face in `out_faces`
    pub fn on_expired(&self, name: &Name, out_faces: &[FaceId]) {
        let prefix = self.prefix_of(name);
        if let Some(entry) = self.existing_entry(&prefix) {
            entry.lock().record_expired(self.layer_of(name), out_faces);
        }
    }

    /// A NACK for `name` came back on `face`
    ///
    /// Counts as unsatisfied and credits part of a token back to the
    /// face's limiter.
    pub fn on_nack(&self, name: &Name, face: FaceId) {
        let prefix = self.prefix_of(name);
        if let Some(entry) = self.existing_entry(&prefix) {
            entry.lock().record_unsatisfied(face, self.layer_of(name));
        }
        self.credit_nack(face, &prefix);
    }

    /// The request for `name` was given up after considering `face`
    pub fn on_rejected(&self, name: &Name, face: FaceId) {
        let prefix = self.prefix_of(name);
        if let Some(entry) = self.existing_entry(&prefix) {
            entry.lock().record_rejection(face, self.layer_of(name));
        }
    }

    /// Close the statistics period of every prefix and adapt its matrix
    ///
    /// A second caller waits until the running tick has finished.
    pub fn tick(&self) {
        let _context = self.router_context();
        let _span = debug_span!("tick", router = %self.router_name).entered();
        let _guard = self.tick_guard.lock();
        let entries: Vec<Arc<Mutex<PrefixEntry>>> =
            self.entries.iter().map(|e| Arc::clone(e.value())).collect();
        for entry in &entries {
            entry.lock().tick();
        }
        debug!(prefixes = entries.len(), "Forwarding tables updated");
    }

    /// One fill interval of tokens for every limiter
    pub fn refill_limiters(&self) {
        let _context = self.router_context();
        let _span = trace_span!("refill_limiters", router = %self.router_name).entered();
        for mut limiter in self.limiters.iter_mut() {
            limiter.refill();
        }
    }

    /// Add a face to the roster, every prefix entry and the limiter map
    pub fn add_face(&self, face: FaceId) -> EngineResult<()> {
        let _context = self.router_context();
        let _span = debug_span!("add_face", router = %self.router_name, face = %face).entered();
        if face.is_drop() {
            return Err(EngineError::DropSentinel);
        }
        let mut roster = self.roster.write();
        let Err(pos) = roster.binary_search(&face) else {
            return Ok(());
        };

        let mut limiter = Self::build_limiter(self.router.as_ref(), &self.config, face)?;
        for entry in self.entries.iter() {
            limiter.add_prefix(entry.key());
        }
        self.limiters.insert(face, limiter);

        for entry in self.entries.iter() {
            entry.value().lock().add_face(face);
        }
        roster.insert(pos, face);
        info!(faces = roster.len() - 1, "Face added");
        Ok(())
    }

    /// Remove a face from the roster, every prefix entry and the limiter map
    pub fn remove_face(&self, face: FaceId) -> EngineResult<()> {
        let _context = self.router_context();
        let _span = debug_span!("remove_face", router = %self.router_name, face = %face).entered();
        if face.is_drop() {
            return Err(EngineError::DropSentinel);
        }
        let mut roster = self.roster.write();
        let Ok(pos) = roster.binary_search(&face) else {
            return Ok(());
        };

        for entry in self.entries.iter() {
            entry.value().lock().remove_face(face);
        }
        self.limiters.remove(&face);
        roster.remove(pos);
        info!(faces = roster.len() - 1, "Face removed");
        Ok(())
    }

    /// Current roster, drop sentinel first
    pub fn faces(&self) -> Vec<FaceId> {
        self.roster.read().clone()
    }

    /// Known content prefixes, sorted
    pub fn prefixes(&self) -> Vec<ContentPrefix> {
        let mut prefixes: Vec<ContentPrefix> = self.entries.iter().map(|e| e.key().clone()).collect();
        prefixes.sort();
        prefixes
    }

    pub fn probability(&self, prefix: &ContentPrefix, face: FaceId, layer: Layer) -> Option<f64> {
        let entry = self.entries.get(prefix).map(|e| Arc::clone(e.value()))?;
        let entry = entry.lock();
        entry.probability(face, layer)
    }

    pub fn threshold(&self, prefix: &ContentPrefix, layer: Layer) -> Option<f64> {
        let entry = self.entries.get(prefix).map(|e| Arc::clone(e.value()))?;
        let entry = entry.lock();
        entry.threshold(layer)
    }

    pub fn entry_snapshot(&self, prefix: &ContentPrefix) -> EngineResult<EntrySnapshot> {
        let entry = self
            .entries
            .get(prefix)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| EngineError::UnknownPrefix(prefix.to_string()))?;
        let snapshot = entry.lock().snapshot();
        Ok(snapshot)
    }

    /// Tokens left for `prefix` on `face`; `None` for unlimited faces
    pub fn limiter_tokens(&self, face: FaceId, prefix: &ContentPrefix) -> Option<f64> {
        self.limiters.get(&face)?.tokens(prefix)
    }
}
