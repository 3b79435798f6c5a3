//! Tier list types and reference backends
//!
//! The engine works over an ordered list of [`LayerInfo`] entries, hottest
//! first. The position in the list is the tier index; the list is fixed at
//! construction.

pub mod memory;

use std::fmt;
use std::sync::Arc;

use crate::cache::traits::CacheLayer;

/// One entry of the tier list: the backend plus its stable display name.
#[derive(Clone)]
pub struct LayerInfo {
    pub layer: Arc<dyn CacheLayer>,
    pub name: String,
}

impl LayerInfo {
    pub fn new(layer: Arc<dyn CacheLayer>) -> Self {
        let name = layer.name().to_string();
        Self { layer, name }
    }

    /// Metric label for hits served by this tier.
    pub fn hit_label(&self) -> String {
        format!("layer_{}", self.name)
    }
}

impl fmt::Debug for LayerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerInfo").field("name", &self.name).finish()
    }
}
