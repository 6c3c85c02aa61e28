//! Result of one availability check for a (product, store) pair.

use serde::{Deserialize, Serialize};

use super::tracked_key::Facet;

/// What the observation source saw on one check.
///
/// Quantities are advisory: `available` with `quantity == None` means
/// "in stock, count unknown".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub available: bool,
    pub quantity: Option<u32>,
    pub open_box_available: bool,
    pub open_box_quantity: Option<u32>,
}

impl Observation {
    /// Stand-in used when a check failed: nothing is available.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn in_stock(quantity: Option<u32>) -> Self {
        Self {
            available: true,
            quantity,
            ..Self::default()
        }
    }

    pub fn with_open_box(mut self, quantity: Option<u32>) -> Self {
        self.open_box_available = true;
        self.open_box_quantity = quantity;
        self
    }

    /// Boolean condition for the given facet.
    pub fn is_true(&self, facet: Facet) -> bool {
        match facet {
            Facet::Availability => self.available,
            Facet::OpenBox => self.open_box_available,
        }
    }

    /// Display-only quantity for the given facet.
    pub fn quantity(&self, facet: Facet) -> Option<u32> {
        match facet {
            Facet::Availability => self.quantity,
            Facet::OpenBox => self.open_box_quantity,
        }
    }

    /// Drop open-box data when that facet is not tracked.
    pub fn without_open_box(mut self) -> Self {
        self.open_box_available = false;
        self.open_box_quantity = None;
        self
    }
}
