//! Core traits for the forwarding engine
//!
//! ## Key Traits
//!
//! - [`RouterContext`]: What the engine needs from the surrounding router
//! - [`ForwardingStrategy`]: Plug-in contract between the pipeline and a policy

use crate::face::{FaceId, NextHop};
use crate::name::Name;
use crate::request::{Delivery, InterestContext, StrategyAction};

/// Abstraction over the router hosting the engine
///
/// The engine never owns faces; it looks them up by id through this trait.
pub trait RouterContext: Send + Sync {
    /// Live face roster (the drop sentinel is never included)
    fn faces(&self) -> Vec<FaceId>;

    /// Check if a face is local (an application rather than a network link)
    fn face_is_local(&self, face: FaceId) -> bool;

    /// Candidate next hops for a name, with routing costs
    fn longest_prefix_match(&self, name: &Name) -> Vec<NextHop>;

    /// Estimated link rate in bits per second
    ///
    /// `None` means unknown; the engine then treats the link as unlimited.
    fn estimated_link_rate(&self, face: FaceId) -> Option<u64>;
}

/// A forwarding policy driven by pipeline events
///
/// Variants are selected at router-configuration time. All hooks take
/// `&self`; implementations handle their own synchronization.
pub trait ForwardingStrategy: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// A request (or a NACK for one) arrived; choose what to do with it
    fn after_receive_interest(&self, ctx: &InterestContext) -> StrategyAction;

    /// A response for the request arrived on `in_face`
    fn before_satisfy_interest(&self, ctx: &InterestContext, in_face: FaceId, delivery: &Delivery);

    /// The request timed out without a response
    fn before_expire_interest(&self, ctx: &InterestContext);

    /// Periodic maintenance
    fn tick(&self) {}

    /// A face came up
    fn add_face(&self, face: FaceId);

    /// A face went down
    fn remove_face(&self, face: FaceId);
}
