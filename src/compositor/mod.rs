//! Layer compositor: the fixed, back-to-front render pass order that turns
//! positions into a composed frame, plus the filtered-view layer registry
//! sitting on top of it.
//!
//! An explicit `Vec`-ordered sequence of plain `wgpu` render passes rather
//! than a render-graph scheduler — there is no dynamic dependency graph to
//! resolve, just a fixed stage order run every frame.

mod contour;
mod density;
mod edges;
mod labels;
mod metaball;
mod nodes;

pub use contour::ContourPass;
pub use density::DensityPass;
pub use edges::{EdgeInstance, EdgePass};
pub use labels::{GlyphMetrics, LabelLayoutInput, LabelPass, PlacedLabel};
pub use metaball::MetaballPass;
pub use nodes::{NodeInstance, NodePass};

use crate::buffers::UniformSlot;
use crate::config::{
    ContourConfig, CurvedEdgesConfig, EdgeFlowConfig, HeatmapConfig, LabelsConfig, MetaballConfig,
};
use crate::error::Result;
use crate::gpu::GpuContext;
use crate::graph::{EdgeData, Graph, NodeData};
use crate::ids::NodeIndex;
use crate::value_stream::ValueStreamRegistry;
use crate::viewport::ViewportUniforms;
use std::sync::Arc;

/// One visualisation layer: a predicate over nodes/edges plus an ordered
/// list of sub-layers drawn for the matching subset — layers as filtered
/// views. Layers are drawn in ascending `z_index` after the always-present
/// base pass.
pub struct LayerDef {
    pub name: String,
    pub z_index: i32,
    pub visible: bool,
    pub node_filter: Option<Arc<dyn Fn(&NodeData) -> bool + Send + Sync>>,
    pub edge_filter: Option<Arc<dyn Fn(&EdgeData) -> bool + Send + Sync>>,
    pub sub_layers: Vec<SubLayer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubLayer {
    Heatmap,
    Contour,
    Metaball,
    Edges,
    Nodes,
    Labels,
}

impl LayerDef {
    pub fn matches_node(&self, node: &NodeData) -> bool {
        self.node_filter.as_ref().is_none_or(|f| f(node))
    }

    pub fn matches_edge(&self, edge: &EdgeData) -> bool {
        self.edge_filter.as_ref().is_none_or(|f| f(edge))
    }
}

/// The fixed back-to-front pipeline plus the caller-defined extra layers.
/// Owns every GPU resource the render side of the engine needs; the
/// simulation side (positions/forces) lives in [`crate::simulation::Simulation`].
pub struct Compositor {
    density: DensityPass,
    contour: ContourPass,
    metaball: MetaballPass,
    edges: EdgePass,
    nodes: NodePass,
    labels: LabelPass,

    pub heatmap_config: HeatmapConfig,
    pub contour_config: ContourConfig,
    pub metaball_config: MetaballConfig,
    pub edge_flow_config: EdgeFlowConfig,
    pub curved_edges_config: CurvedEdgesConfig,
    pub labels_config: LabelsConfig,

    heatmap_stream: Option<String>,
    contour_stream: Option<String>,
    hovered: Option<NodeIndex>,

    /// Rewritten in place every `render()` call, shared by every shader
    /// that needs graph→clip.
    viewport_slot: UniformSlot<ViewportUniforms>,

    layers: Vec<LayerDef>,
}

/// Everything a single `render` call needs that isn't already owned by the
/// compositor. Every GPU buffer has exactly one writer per pass.
pub struct FrameInputs<'a> {
    pub positions: &'a wgpu::Buffer,
    pub node_count: u32,
    /// Row bound for any pass sampling `positions` by dense row index
    /// rather than per-node instance; rows are slot indices, not a dense
    /// `0..node_count` range, so passes like metaball's per-pixel loop
    /// must bound on this (and consult `liveness`) instead of `node_count`.
    pub row_count: u32,
    pub liveness: &'a wgpu::Buffer,
    pub edge_count: u32,
    pub target: &'a wgpu::TextureView,
    pub target_format: wgpu::TextureFormat,
    pub width: u32,
    pub height: u32,
    pub viewport: &'a ViewportUniforms,
    pub graph: &'a Graph,
    pub value_streams: &'a ValueStreamRegistry,
    pub time_seconds: f32,
}

impl Compositor {
    pub fn new(ctx: &GpuContext, target_format: wgpu::TextureFormat, max_nodes: usize, max_edges: usize) -> Result<Self> {
        Ok(Self {
            density: DensityPass::new(ctx, target_format)?,
            contour: ContourPass::new(ctx, target_format)?,
            metaball: MetaballPass::new(ctx, target_format)?,
            edges: EdgePass::new(ctx, target_format, max_edges)?,
            nodes: NodePass::new(ctx, target_format, max_nodes)?,
            labels: LabelPass::new(ctx, target_format)?,
            heatmap_config: HeatmapConfig::default(),
            contour_config: ContourConfig::default(),
            metaball_config: MetaballConfig::default(),
            edge_flow_config: EdgeFlowConfig::default(),
            curved_edges_config: CurvedEdgesConfig::default(),
            labels_config: LabelsConfig::default(),
            heatmap_stream: None,
            contour_stream: None,
            hovered: None,
            viewport_slot: UniformSlot::new(ctx, "compositor-viewport"),
            layers: Vec::new(),
        })
    }

    pub fn define_layer(&mut self, layer: LayerDef) {
        self.remove_layer(&layer.name);
        self.layers.push(layer);
        self.layers.sort_by_key(|l| l.z_index);
    }

    pub fn remove_layer(&mut self, name: &str) {
        self.layers.retain(|l| l.name != name);
    }

    pub fn set_layer_visible(&mut self, name: &str, visible: bool) {
        if let Some(l) = self.layers.iter_mut().find(|l| l.name == name) {
            l.visible = visible;
        }
    }

    pub fn layer_visibility(&self, name: &str) -> Option<bool> {
        self.layers.iter().find(|l| l.name == name).map(|l| l.visible)
    }

    pub fn set_heatmap_data_source(&mut self, source: Option<String>) {
        self.heatmap_stream = source;
    }

    pub fn set_contour_data_source(&mut self, source: Option<String>) {
        self.contour_stream = source;
    }

    pub fn set_hovered(&mut self, node: Option<NodeIndex>) {
        self.hovered = node;
    }

    pub fn ensure_capacity(&mut self, ctx: &GpuContext, max_nodes: usize, max_edges: usize) {
        self.nodes.ensure_capacity(ctx, max_nodes);
        self.edges.ensure_capacity(ctx, max_edges);
    }

    pub fn set_labels(&mut self, labels: std::collections::HashMap<crate::ids::NodeIndex, String>) {
        self.labels.set_labels(labels);
    }

    pub fn set_label(&mut self, node: crate::ids::NodeIndex, text: Option<String>) {
        self.labels.set_label(node, text);
    }

    /// Uploads the host-supplied MSDF atlas backing [`SubLayer::Labels`].
    /// `rgb` is tightly packed `width*height*3` bytes.
    pub fn set_label_atlas(&mut self, ctx: &GpuContext, rgb: &[u8], width: u32, height: u32, glyphs: std::collections::HashMap<char, labels::GlyphMetrics>) {
        self.labels.set_atlas(ctx, rgb, width, height, glyphs);
    }

    /// Runs the fixed pass order, skipping any stage whose config says
    /// disabled, then draws every visible extra layer's sub-layers on top
    /// in z-index order.
    pub fn render(&mut self, ctx: &GpuContext, encoder: &mut wgpu::CommandEncoder, input: &FrameInputs) {
        self.viewport_slot.update(ctx, input.viewport);
        let viewport_buf = &self.viewport_slot.buffer;
        self.nodes.sync_instances(ctx, input.graph, self.hovered);
        self.edges.sync_instances(ctx, input.graph);

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("compositor-clear"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: input.target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r: 0.04, g: 0.04, b: 0.06, a: 1.0 }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            drop(pass);
        }

        let density_needed = self.heatmap_config.enabled || self.contour_config.enabled;
        if density_needed {
            let source = self.heatmap_stream.as_deref().or(self.contour_stream.as_deref());
            self.density.accumulate(ctx, encoder, input, source, viewport_buf);
        }
        if self.heatmap_config.enabled {
            self.density.colorize(ctx, encoder, input, &self.heatmap_config);
        }
        if self.contour_config.enabled {
            self.contour.render(ctx, encoder, input, &self.contour_config, self.density.texture_view());
        }
        if self.metaball_config.enabled {
            self.metaball.render(ctx, encoder, input, &self.metaball_config, viewport_buf);
        }

        self.edges.render(ctx, encoder, input, &self.edge_flow_config, &self.curved_edges_config, viewport_buf, None);
        self.nodes.render(ctx, encoder, input, viewport_buf, None);

        if self.labels_config.enabled {
            self.labels.render(ctx, encoder, input, &self.labels_config, viewport_buf, None);
        }

        for layer in &self.layers {
            if !layer.visible {
                continue;
            }
            let node_filter = layer.node_filter.clone();
            let edge_filter = layer.edge_filter.clone();
            for sub in &layer.sub_layers {
                match sub {
                    SubLayer::Heatmap if self.heatmap_config.enabled => {
                        self.density.colorize(ctx, encoder, input, &self.heatmap_config);
                    }
                    SubLayer::Contour if self.contour_config.enabled => {
                        self.contour.render(ctx, encoder, input, &self.contour_config, self.density.texture_view());
                    }
                    SubLayer::Metaball if self.metaball_config.enabled => {
                        self.metaball.render(ctx, encoder, input, &self.metaball_config, viewport_buf);
                    }
                    SubLayer::Edges => {
                        self.edges.render(
                            ctx,
                            encoder,
                            input,
                            &self.edge_flow_config,
                            &self.curved_edges_config,
                            viewport_buf,
                            edge_filter.as_deref(),
                        );
                    }
                    SubLayer::Nodes => {
                        self.nodes.render(ctx, encoder, input, viewport_buf, node_filter.as_deref());
                    }
                    SubLayer::Labels if self.labels_config.enabled => {
                        self.labels.render(ctx, encoder, input, &self.labels_config, viewport_buf, node_filter.as_deref());
                    }
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeFlags;

    fn sample_node() -> NodeData {
        NodeData {
            key: "a".into(),
            pos: [0.0, 0.0],
            vel: [0.0, 0.0],
            radius: 4.0,
            color: [1.0, 1.0, 1.0, 1.0],
            type_tag: None,
            flags: NodeFlags::empty(),
            visibility_mask: u32::MAX,
            metadata: None,
        }
    }

    #[test]
    fn layer_without_filter_matches_everything() {
        let layer = LayerDef {
            name: "l".into(),
            z_index: 0,
            visible: true,
            node_filter: None,
            edge_filter: None,
            sub_layers: vec![SubLayer::Nodes],
        };
        assert!(layer.matches_node(&sample_node()));
    }

    #[test]
    fn layer_filter_excludes_non_matching_nodes() {
        let layer = LayerDef {
            name: "big".into(),
            z_index: 0,
            visible: true,
            node_filter: Some(Arc::new(|n: &NodeData| n.radius > 10.0)),
            edge_filter: None,
            sub_layers: vec![SubLayer::Nodes],
        };
        assert!(!layer.matches_node(&sample_node()));
    }
}
