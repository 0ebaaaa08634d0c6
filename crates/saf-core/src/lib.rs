//! # SAF Core
//!
//! Core traits, types, and errors for the SAF adaptive forwarding engine.
//!
//! This crate holds the vocabulary shared between the forwarding engine and
//! the router that hosts it, so the same engine logic can be driven by a
//! real forwarding pipeline or by the in-memory [`StaticRouter`] in tests.
//!
//! ## Key Traits
//!
//! - [`RouterContext`]: Face roster, locality, FIB lookup and link rates
//! - [`ForwardingStrategy`]: Plug-in contract between pipeline and policy
//!
//! ## Key Types
//!
//! - [`FaceId`]: Stable face identity, with the [`FaceId::DROP`] sentinel
//! - [`Name`] / [`ContentPrefix`]: Request names and their adaptation key
//! - [`InterestContext`]: Live view of a pending request
//! - [`ForwardingDecision`]: Result of the engine's decision loop

pub mod error;
pub mod face;
pub mod name;
pub mod request;
pub mod static_router;
pub mod traits;

// Re-export main types
pub use error::*;
pub use face::*;
pub use name::*;
pub use request::*;
pub use static_router::*;
pub use traits::*;
