//! Residency transfer between the host and the parallel lane.
//!
//! Only the three numeric arrays of each layer follow the residency tag;
//! the vertex index, edge/vertex identifiers, metadata, and ring pointers
//! always stay host-side. The transfer is observably value-identical in
//! both directions, and moving towards a lane that is not compiled in
//! degrades silently to host residency.

use tracing::debug;

use crate::backend::{Backend, Residency, select_backend};

use super::LayeredHypergraph;

impl LayeredHypergraph {
    /// Moves the numeric arrays to the parallel lane so subsequent
    /// kernels fan out. Silently stays on host when the lane is
    /// unavailable or the operator forced host execution.
    pub fn to_device(&mut self) {
        if select_backend() == Backend::Parallel {
            self.residency = Residency::Device;
        } else {
            debug!(farm_id = %self.farm_id, "parallel lane unavailable, staying host-resident");
        }
    }

    /// Materialises the numeric arrays on host. A no-op for already
    /// host-resident graphs.
    pub fn to_host(&mut self) {
        self.residency = Residency::Host;
    }

    /// Returns a host-resident clone for boundary crossings, leaving the
    /// graph's own residency untouched.
    #[must_use]
    pub fn ensure_host(&self) -> Self {
        let mut host = self.clone();
        host.residency = Residency::Host;
        host
    }
}
