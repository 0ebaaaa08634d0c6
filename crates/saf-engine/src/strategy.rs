//! SAF forwarding strategy
//!
//! [`SafStrategy`] adapts pipeline events to the [`ForwardingEngine`]:
//!
//! - New requests are decided with no faces tried and their non-local
//!   in-faces excluded
//! - NACK arrivals are re-decided with every out-record face counted as tried
//! - With retransmission detection on, a repeat from a known in-face while
//!   out-records are pending is re-decided the same way; a request from a
//!   new in-face is aggregated into the pending one
//! - Responses charge a NACK to every other out-face and feed the prefix's
//!   measure; expiries count as unsatisfied on every out-face

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, trace};

use saf_core::{
    Delivery, FaceId, ForwardingDecision, ForwardingStrategy, InterestContext, RouterContext,
    StrategyAction,
};

use crate::engine::ForwardingEngine;

/// Strategy name used in logs and configuration
pub const SAF_STRATEGY_NAME: &str = "saf";

/// Adaptive multipath strategy on top of a [`ForwardingEngine`]
pub struct SafStrategy<R: RouterContext> {
    engine: Arc<ForwardingEngine<R>>,
    /// In-faces seen per pending name (URI form)
    known_in_faces: DashMap<String, Vec<FaceId>>,
    rtx_detection: bool,
}

impl<R: RouterContext> SafStrategy<R> {
    pub fn new(engine: Arc<ForwardingEngine<R>>) -> Self {
        let rtx_detection = engine.config().rtx_detection;
        Self {
            engine,
            known_in_faces: DashMap::new(),
            rtx_detection,
        }
    }

    pub fn engine(&self) -> &Arc<ForwardingEngine<R>> {
        &self.engine
    }

    /// Number of names with in-face bookkeeping
    pub fn pending_names(&self) -> usize {
        self.known_in_faces.len()
    }

    fn is_retransmission(&self, ctx: &InterestContext) -> bool {
        self.known_in_faces
            .get(&ctx.name.to_string())
            .is_some_and(|faces| faces.contains(&ctx.in_face))
    }

    fn remember_in_face(&self, ctx: &InterestContext) {
        let mut faces = self.known_in_faces.entry(ctx.name.to_string()).or_default();
        if !faces.contains(&ctx.in_face) {
            faces.push(ctx.in_face);
        }
    }

    fn forget(&self, ctx: &InterestContext) {
        self.known_in_faces.remove(&ctx.name.to_string());
    }

    fn origin_in_faces(&self, ctx: &InterestContext) -> Vec<FaceId> {
        let router = self.engine.router();
        ctx.in_faces
            .iter()
            .copied()
            .filter(|&face| !router.face_is_local(face))
            .collect()
    }
}

impl<R: RouterContext> ForwardingStrategy for SafStrategy<R> {
    fn name(&self) -> &'static str {
        SAF_STRATEGY_NAME
    }

    fn after_receive_interest(&self, ctx: &InterestContext) -> StrategyAction {
        let tried = if ctx.is_nack {
            ctx.out_faces.clone()
        } else if ctx.has_pending_out_records && self.rtx_detection {
            if self.is_retransmission(ctx) {
                debug!(name = %ctx.name, face = %ctx.in_face, "Retransmission detected");
                ctx.out_faces.clone()
            } else {
                self.remember_in_face(ctx);
                trace!(name = %ctx.name, face = %ctx.in_face, "Aggregating request");
                return StrategyAction::Suppress;
            }
        } else {
            Vec::new()
        };

        if !ctx.is_nack {
            self.remember_in_face(ctx);
        }

        let origin = self.origin_in_faces(ctx);
        match self.engine.decide(&ctx.name, &tried, &origin) {
            ForwardingDecision::Forward(face) => StrategyAction::Forward(face),
            ForwardingDecision::Reject { .. } => {
                self.forget(ctx);
                StrategyAction::Reject
            }
        }
    }

    fn before_satisfy_interest(&self, ctx: &InterestContext, in_face: FaceId, delivery: &Delivery) {
        for &face in ctx.out_faces.iter().filter(|&&f| f != in_face) {
            self.engine.on_nack(&ctx.name, face);
        }
        self.engine
            .on_satisfied(&ctx.name, in_face, &ctx.out_faces, delivery);
        self.forget(ctx);
    }

    fn before_expire_interest(&self, ctx: &InterestContext) {
        self.engine.on_expired(&ctx.name, &ctx.out_faces);
        self.forget(ctx);
    }

    fn tick(&self) {
        self.engine.tick();
    }

    fn add_face(&self, face: FaceId) {
        if let Err(e) = self.engine.add_face(face) {
            debug!(face = %face, error = %e, "Face not added");
        }
    }

    fn remove_face(&self, face: FaceId) {
        if let Err(e) = self.engine.remove_face(face) {
            debug!(face = %face, error = %e, "Face not removed");
        }
    }
}
