//! Best-route baseline strategy and strategy selection
//!
//! [`BestRouteStrategy`] always forwards on the cheapest next hop that has
//! not been tried yet. It keeps no statistics and is meant as a baseline
//! next to [`SafStrategy`]. [`StrategyKind`] picks one of the two at
//! router-configuration time.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use saf_core::{
    ConfigError, Delivery, FaceId, ForwardingStrategy, InterestContext, RouterContext,
    StrategyAction,
};

use crate::engine::ForwardingEngine;
use crate::strategy::SafStrategy;

/// Strategy name used in logs and configuration
pub const BEST_ROUTE_STRATEGY_NAME: &str = "best-route";

/// Deterministic lowest-cost forwarding
pub struct BestRouteStrategy<R: RouterContext> {
    router: Arc<R>,
}

impl<R: RouterContext> BestRouteStrategy<R> {
    pub fn new(router: Arc<R>) -> Self {
        Self { router }
    }
}

impl<R: RouterContext> ForwardingStrategy for BestRouteStrategy<R> {
    fn name(&self) -> &'static str {
        BEST_ROUTE_STRATEGY_NAME
    }

    fn after_receive_interest(&self, ctx: &InterestContext) -> StrategyAction {
        let tried: &[FaceId] = if ctx.is_nack { &ctx.out_faces } else { &[] };

        let mut hops = self.router.longest_prefix_match(&ctx.name);
        hops.sort_by_key(|hop| (hop.cost, hop.face));

        let next = hops.iter().map(|hop| hop.face).find(|&face| {
            !face.is_drop()
                && !tried.contains(&face)
                && !(ctx.in_faces.contains(&face) && !self.router.face_is_local(face))
        });

        match next {
            Some(face) => {
                trace!(name = %ctx.name, face = %face, "Best route");
                StrategyAction::Forward(face)
            }
            None => StrategyAction::Reject,
        }
    }

    fn before_satisfy_interest(&self, _ctx: &InterestContext, _in_face: FaceId, _delivery: &Delivery) {}

    fn before_expire_interest(&self, _ctx: &InterestContext) {}

    fn add_face(&self, _face: FaceId) {}

    fn remove_face(&self, _face: FaceId) {}
}

/// Forwarding strategy chosen at router-configuration time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Adaptive multipath forwarding
    #[default]
    Saf,
    /// Lowest-cost next hop
    BestRoute,
}

impl StrategyKind {
    /// Instantiate the strategy on top of `engine`
    pub fn build<R>(self, engine: Arc<ForwardingEngine<R>>) -> Box<dyn ForwardingStrategy>
    where
        R: RouterContext + 'static,
    {
        match self {
            Self::Saf => Box::new(SafStrategy::new(engine)),
            Self::BestRoute => Box::new(BestRouteStrategy::new(Arc::clone(engine.router()))),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Saf => write!(f, "saf"),
            Self::BestRoute => write!(f, "{}", BEST_ROUTE_STRATEGY_NAME),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "saf" => Ok(Self::Saf),
            "best-route" => Ok(Self::BestRoute),
            other => Err(ConfigError::UnknownParameter(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use saf_core::{Name, NextHop, StaticRouter};

    use super::*;
    use crate::config::EngineConfig;

    fn setup() -> (Arc<StaticRouter>, [FaceId; 3]) {
        let router = Arc::new(StaticRouter::new());
        let consumer = router.add_face(1, None);
        let near = router.add_face(2, None);
        let far = router.add_face(3, None);
        router.set_route(
            "/p",
            vec![NextHop::new(far, 5), NextHop::new(near, 1), NextHop::new(consumer, 0)],
        )
        .unwrap();
        (router, [consumer, near, far])
    }

    #[test]
    fn test_picks_cheapest_untried_hop() {
        let (router, [consumer, near, far]) = setup();
        let strategy = BestRouteStrategy::new(router);
        let name = Name::parse("/p/1").unwrap();

        let ctx = InterestContext::new(name.clone(), consumer);
        assert_eq!(strategy.after_receive_interest(&ctx), StrategyAction::Forward(near));

        let nack = InterestContext::new(name.clone(), near)
            .as_nack()
            .with_in_faces(vec![consumer])
            .with_out_faces(vec![near]);
        assert_eq!(strategy.after_receive_interest(&nack), StrategyAction::Forward(far));

        let exhausted = nack.with_out_faces(vec![near, far]);
        assert_eq!(strategy.after_receive_interest(&exhausted), StrategyAction::Reject);
    }

    #[test]
    fn test_kind_parsing_and_build() {
        assert_eq!("saf".parse::<StrategyKind>(), Ok(StrategyKind::Saf));
        assert_eq!("best-route".parse::<StrategyKind>(), Ok(StrategyKind::BestRoute));
        assert!("ncc".parse::<StrategyKind>().is_err());
        assert_eq!(StrategyKind::BestRoute.to_string(), "best-route");

        let (router, _) = setup();
        let engine = Arc::new(ForwardingEngine::new(router, EngineConfig::default()).unwrap());
        assert_eq!(StrategyKind::Saf.build(Arc::clone(&engine)).name(), "saf");
        assert_eq!(StrategyKind::BestRoute.build(engine).name(), "best-route");
    }

    #[test]
    fn test_kind_serde() {
        let json = serde_json::to_string(&StrategyKind::BestRoute).unwrap();
        assert_eq!(json, "\"best-route\"");
        let kind: StrategyKind = serde_json::from_str("\"saf\"").unwrap();
        assert_eq!(kind, StrategyKind::Saf);
    }
}
