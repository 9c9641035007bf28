//! Output sink descriptions for multi-layer streams.

use std::collections::BTreeSet;
use std::fmt::Display;

/// Handle of an output sink, equal to its position in the sink list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SinkId(pub usize);

impl Display for SinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// Frames of exactly one layer.
    Layer,
    /// Frames of the base layer, offered once the stream turns multi-layer.
    BaseOnly,
    /// Frames of one layer together with every layer below it.
    Combined,
}

impl Display for SinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkKind::Layer => write!(f, "Layer"),
            SinkKind::BaseOnly => write!(f, "Base only"),
            SinkKind::Combined => write!(f, "Combined"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerInfo {
    /// First-seen order of the layer that created this sink.
    pub order_id: usize,
    pub layer_id: u8,
    pub output_handle: SinkId,
    pub display_name: String,
    /// Layers merged into this sink besides `layer_id` itself; for a
    /// base-only sink this is the base layer.
    pub contributing_layers: BTreeSet<u8>,
    pub kind: SinkKind,
}

impl LayerInfo {
    pub fn layer(order_id: usize, layer_id: u8, output_handle: SinkId) -> Self {
        Self {
            order_id,
            layer_id,
            output_handle,
            display_name: format!("layer {layer_id}"),
            contributing_layers: BTreeSet::new(),
            kind: SinkKind::Layer,
        }
    }

    pub fn base_only(order_id: usize, base_layer_id: u8, output_handle: SinkId) -> Self {
        Self {
            order_id,
            layer_id: base_layer_id,
            output_handle,
            display_name: format!("layer {base_layer_id} only"),
            contributing_layers: BTreeSet::from([base_layer_id]),
            kind: SinkKind::BaseOnly,
        }
    }

    pub fn combined(
        order_id: usize,
        layer_id: u8,
        contributing_layers: BTreeSet<u8>,
        output_handle: SinkId,
    ) -> Self {
        let mut info = Self {
            order_id,
            layer_id,
            output_handle,
            display_name: String::new(),
            contributing_layers,
            kind: SinkKind::Combined,
        };
        info.rename();
        info
    }

    /// Adds a lower layer to a combined sink. Returns `true` if it was new.
    pub fn absorb(&mut self, layer_id: u8) -> bool {
        if self.kind != SinkKind::Combined || layer_id >= self.layer_id {
            return false;
        }

        let inserted = self.contributing_layers.insert(layer_id);
        if inserted {
            self.rename();
        }
        inserted
    }

    pub fn accepts(&self, layer_id: u8) -> bool {
        match self.kind {
            SinkKind::Layer => self.layer_id == layer_id,
            SinkKind::BaseOnly => self.contributing_layers.contains(&layer_id),
            SinkKind::Combined => {
                self.layer_id == layer_id || self.contributing_layers.contains(&layer_id)
            }
        }
    }

    fn rename(&mut self) {
        let lowest = self
            .contributing_layers
            .first()
            .copied()
            .unwrap_or(self.layer_id);
        self.display_name = format!("layer ids {lowest} -> {}", self.layer_id);
    }
}

impl Display for LayerInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{} {} [{}] (order {})",
            self.output_handle, self.display_name, self.kind, self.order_id
        )
    }
}

#[test]
fn sink_acceptance() {
    let layer = LayerInfo::layer(1, 1, SinkId(1));
    assert!(layer.accepts(1) && !layer.accepts(0));
    assert_eq!(layer.display_name, "layer 1");

    let base = LayerInfo::base_only(1, 0, SinkId(2));
    assert!(base.accepts(0) && !base.accepts(1));
    assert_eq!(base.display_name, "layer 0 only");

    let mut combined = LayerInfo::combined(2, 4, BTreeSet::from([2]), SinkId(3));
    assert_eq!(combined.display_name, "layer ids 2 -> 4");
    assert!(combined.accepts(4) && combined.accepts(2) && !combined.accepts(0));

    assert!(combined.absorb(0));
    assert!(!combined.absorb(0));
    assert!(!combined.absorb(5));
    assert_eq!(combined.display_name, "layer ids 0 -> 4");
    assert!(combined.accepts(0));
}
