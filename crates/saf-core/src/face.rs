//! Face identities and next-hop records
//!
//! A face is an incoming/outgoing link endpoint owned by the router. The
//! forwarding engine only ever refers to faces by their stable integer id.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Content layer index (quality/priority class within a prefix)
pub type Layer = usize;

/// Stable identity of a router face
///
/// `FaceId::DROP` is a reserved sentinel meaning "forward to nobody". It
/// sorts before every real face so it always occupies the first row of a
/// forwarding matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FaceId(u32);

impl FaceId {
    /// Sentinel face: give up, no face chosen
    pub const DROP: FaceId = FaceId(0);

    /// Create a face id
    ///
    /// Returns `None` for the raw value reserved by [`FaceId::DROP`].
    pub fn new(id: u32) -> Option<Self> {
        if id == 0 { None } else { Some(Self(id)) }
    }

    /// The raw numeric id
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Check if this is the drop sentinel
    pub fn is_drop(&self) -> bool {
        *self == Self::DROP
    }
}

impl fmt::Display for FaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_drop() {
            write!(f, "drop")
        } else {
            write!(f, "face#{}", self.0)
        }
    }
}

/// A candidate next hop from a longest-prefix-match lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextHop {
    /// Outgoing face
    pub face: FaceId,
    /// Routing cost (lower is preferred)
    pub cost: u32,
}

impl NextHop {
    pub fn new(face: FaceId, cost: u32) -> Self {
        Self { face, cost }
    }
}
