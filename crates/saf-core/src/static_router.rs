//! In-memory router context for testing
//!
//! Provides a [`RouterContext`] backed by plain maps so engine and strategy
//! logic can be exercised without a real forwarding pipeline.
//!
//! ## Usage
//!
//! ```rust
//! use saf_core::{FaceId, Name, NextHop, RouterContext, StaticRouter};
//!
//! let router = StaticRouter::new();
//! let a = router.add_face(1, Some(10_000_000));
//! let b = router.add_face(2, None);
//! router.set_route("/provider0", vec![NextHop::new(a, 1), NextHop::new(b, 2)]).unwrap();
//!
//! let hops = router.longest_prefix_match(&Name::parse("/provider0/x").unwrap());
//! assert_eq!(hops.len(), 2);
//! ```

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::NameError;
use crate::face::{FaceId, NextHop};
use crate::name::Name;
use crate::traits::RouterContext;

#[derive(Debug, Clone, Copy)]
struct FaceInfo {
    local: bool,
    link_rate: Option<u64>,
}

/// A router with a fixed, manually managed face table and FIB
#[derive(Debug, Default)]
pub struct StaticRouter {
    faces: RwLock<BTreeMap<FaceId, FaceInfo>>,
    routes: RwLock<Vec<(Name, Vec<NextHop>)>>,
}

impl StaticRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a network face with an optional link rate (bits/sec)
    ///
    /// # Panics
    ///
    /// Panics if `id` is the raw value reserved for the drop sentinel.
    pub fn add_face(&self, id: u32, link_rate: Option<u64>) -> FaceId {
        self.insert(id, false, link_rate)
    }

    /// Add a local (application) face
    pub fn add_local_face(&self, id: u32) -> FaceId {
        self.insert(id, true, None)
    }

    fn insert(&self, id: u32, local: bool, link_rate: Option<u64>) -> FaceId {
        let face = FaceId::new(id).expect("face id 0 is reserved for the drop sentinel");
        self.faces.write().insert(face, FaceInfo { local, link_rate });
        face
    }

    pub fn remove_face(&self, face: FaceId) {
        self.faces.write().remove(&face);
    }

    pub fn set_link_rate(&self, face: FaceId, link_rate: Option<u64>) {
        if let Some(info) = self.faces.write().get_mut(&face) {
            info.link_rate = link_rate;
        }
    }

    /// Register (or replace) the next hops for a name prefix
    pub fn set_route(&self, prefix: &str, next_hops: Vec<NextHop>) -> Result<(), NameError> {
        let prefix = Name::parse(prefix)?;
        let mut routes = self.routes.write();
        routes.retain(|(p, _)| *p != prefix);
        routes.push((prefix, next_hops));
        Ok(())
    }
}

impl RouterContext for StaticRouter {
    fn faces(&self) -> Vec<FaceId> {
        self.faces.read().keys().copied().collect()
    }

    fn face_is_local(&self, face: FaceId) -> bool {
        self.faces.read().get(&face).is_some_and(|info| info.local)
    }

    fn longest_prefix_match(&self, name: &Name) -> Vec<NextHop> {
        self.routes
            .read()
            .iter()
            .filter(|(prefix, _)| name.starts_with(prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, hops)| hops.clone())
            .unwrap_or_default()
    }

    fn estimated_link_rate(&self, face: FaceId) -> Option<u64> {
        self.faces.read().get(&face).and_then(|info| info.link_rate)
    }
}
