//! # SAF Engine
//!
//! Stochastic adaptive forwarding for content-centric routers.
//!
//! The engine keeps one probability table per content prefix and picks the
//! next face for every request by weighted sampling. Outcomes reported by
//! the forwarding pipeline feed per-face reliability statistics, and a
//! periodic update shifts probability from unreliable faces to reliable
//! ones, drops traffic no face can carry and probes idle faces.
//!
//! ## Core Components
//!
//! - [`ForwardingEngine`]: Face roster, prefix entries, limiters, decision loop
//! - [`PrefixEntry`]: Statistics and probability table of one content prefix
//! - [`ForwardingMatrix`]: Per-layer probabilities and reliability thresholds
//! - [`ReliabilityStatistics`]: Satisfied/unsatisfied counts and derived values
//! - [`EgressLimiter`] / [`TokenBucket`]: Per-face, per-prefix admission control
//! - [`SafStrategy`] / [`BestRouteStrategy`]: Pipeline-facing strategies
//! - [`UpdateScheduler`]: Timer task driving updates and refills
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use saf_core::{ForwardingDecision, Name, NextHop, StaticRouter};
//! use saf_engine::{EngineConfig, ForwardingEngine};
//!
//! let router = Arc::new(StaticRouter::new());
//! let a = router.add_face(1, None);
//! let b = router.add_face(2, None);
//! router.set_route("/video", vec![NextHop::new(a, 1), NextHop::new(b, 2)]).unwrap();
//!
//! let engine = ForwardingEngine::new(router, EngineConfig::default()).unwrap();
//! let name = Name::parse("/video/seg=1").unwrap();
//! match engine.decide(&name, &[], &[]) {
//!     ForwardingDecision::Forward(face) => assert!(face == a || face == b),
//!     ForwardingDecision::Reject { .. } => unreachable!(),
//! }
//! engine.tick();
//! ```

pub mod best_route;
pub mod config;
pub mod engine;
pub mod entry;
pub mod error;
pub mod limiter;
pub mod matrix;
pub mod measure;
pub mod scheduler;
pub mod statistics;
pub mod strategy;
pub mod token_bucket;

pub use best_route::{BestRouteStrategy, StrategyKind};
pub use config::{EngineConfig, LimiterConfig};
pub use engine::ForwardingEngine;
pub use entry::{EntrySnapshot, FaceSnapshot, LayerSnapshot, PrefixEntry};
pub use error::{EngineError, EngineResult};
pub use limiter::EgressLimiter;
pub use matrix::{ForwardingMatrix, MatrixParams};
pub use measure::{MeasureKind, MeasureRegistry, MeasureRule};
pub use scheduler::UpdateScheduler;
pub use statistics::ReliabilityStatistics;
pub use strategy::SafStrategy;
pub use token_bucket::TokenBucket;
