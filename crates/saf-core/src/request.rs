//! Request context handed from the forwarding pipeline to a strategy

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::face::FaceId;
use crate::name::Name;

/// Live view of a pending request, as kept by the surrounding pipeline
#[derive(Debug, Clone)]
pub struct InterestContext {
    /// Request name
    pub name: Name,
    /// Face this arrival came in on
    pub in_face: FaceId,
    /// Whether this arrival is a negative acknowledgment from upstream
    pub is_nack: bool,
    /// Every face the request has arrived on (in-records)
    pub in_faces: Vec<FaceId>,
    /// Every face the request has been forwarded to (out-records)
    pub out_faces: Vec<FaceId>,
    /// Whether any out-record has not yet expired
    pub has_pending_out_records: bool,
}

impl InterestContext {
    /// A fresh request that arrived on `in_face`
    pub fn new(name: Name, in_face: FaceId) -> Self {
        Self {
            name,
            in_face,
            is_nack: false,
            in_faces: vec![in_face],
            out_faces: Vec::new(),
            has_pending_out_records: false,
        }
    }

    /// Mark the arrival as a NACK from `in_face`
    pub fn as_nack(mut self) -> Self {
        self.is_nack = true;
        self
    }

    pub fn with_in_faces(mut self, in_faces: Vec<FaceId>) -> Self {
        self.in_faces = in_faces;
        self
    }

    /// Set the out-records; pending out-records are assumed when non-empty
    pub fn with_out_faces(mut self, out_faces: Vec<FaceId>) -> Self {
        self.has_pending_out_records = !out_faces.is_empty();
        self.out_faces = out_faces;
        self
    }

    pub fn with_pending_out_records(mut self, pending: bool) -> Self {
        self.has_pending_out_records = pending;
        self
    }
}

/// Observations attached to a returned response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    /// Round-trip time measured by the pipeline
    pub rtt: Option<Duration>,
    /// Number of hops the response travelled
    pub hop_count: Option<u32>,
}

impl Delivery {
    pub fn with_rtt(rtt: Duration) -> Self {
        Self {
            rtt: Some(rtt),
            hop_count: None,
        }
    }

    pub fn with_hops(hop_count: u32) -> Self {
        Self {
            rtt: None,
            hop_count: Some(hop_count),
        }
    }
}

/// Outcome of the engine's decision loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardingDecision {
    /// Send the request on this face
    Forward(FaceId),
    /// Give up; the pipeline answers with a NACK
    Reject {
        /// Faces that were excluded or tried before giving up
        tried: Vec<FaceId>,
    },
}

impl ForwardingDecision {
    pub fn is_forward(&self) -> bool {
        matches!(self, Self::Forward(_))
    }

    pub fn is_reject(&self) -> bool {
        matches!(self, Self::Reject { .. })
    }

    /// The chosen face, if any
    pub fn face(&self) -> Option<FaceId> {
        match self {
            Self::Forward(face) => Some(*face),
            Self::Reject { .. } => None,
        }
    }
}

/// What a strategy asks the pipeline to do with an arrival
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyAction {
    /// Forward on the given face
    Forward(FaceId),
    /// Reject the request (pipeline sends a NACK downstream)
    Reject,
    /// Aggregate with the pending request; send nothing
    Suppress,
}
