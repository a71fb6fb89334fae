//! Public façade: the single entry point a host talks to.
//!
//! Grounded on `other_examples`'s `GpuLayout` — one struct owning `ctx`,
//! buffers, config, and state behind `new`/`step`-shaped methods — scaled
//! up to own the full arena of algorithms, layers, and streams: every
//! cross-reference out of the engine is a numeric handle resolved back
//! through it. Cyclic references (Engine → Layer → Engine) never arise
//! because layers, streams, and type styles are plain data owned here,
//! not back-pointers into it.

use crate::algorithm::AlgorithmId;
use crate::compositor::{Compositor, FrameInputs, LayerDef};
use crate::config::{
    ContourConfig, CurvedEdgesConfig, EdgeFlowConfig, EdgeFlowPreset, EdgeStyle, ForceConfig,
    HeatmapConfig, LabelsConfig, MetaballConfig, NodeStyle,
};
use crate::error::{Error, Result};
use crate::events::{Event, EventBus};
use crate::gpu::GpuContext;
use crate::graph::{EdgeAddResult, EdgeInput, Graph, LoadCounts, NodeData, NodeInput, TypeTag};
use crate::ids::{EdgeIndex, NodeIndex, NodeKey};
use crate::simulation::{Simulation, TickReport};
use crate::value_stream::{ValueStream, ValueStreamRegistry};
use crate::viewport::Viewport;
use glam::Vec2;
use std::collections::HashMap;

/// Construction parameters (`createEngine({ canvas/surface, debug, initial_capacity })`).
/// `surface`/`surface_format` stand in for "canvas" on this native binding;
/// a headless host passes `surface: None` and renders into an offscreen
/// texture instead.
pub struct EngineOptions<'a> {
    pub instance: &'a wgpu::Instance,
    pub surface: Option<&'a wgpu::Surface<'a>>,
    pub surface_format: wgpu::TextureFormat,
    pub debug: bool,
    pub initial_capacity: usize,
}

/// Every algorithm, layer, and buffer the engine owns lives as an
/// ordinary field here; hosts never hold a reference back into the
/// engine, only numeric/string handles (`NodeIndex`, `EdgeIndex`,
/// layer/stream names) resolved through it.
pub struct Engine {
    ctx: GpuContext,
    graph: Graph,
    simulation: Simulation,
    viewport: Viewport,
    compositor: Compositor,
    streams: ValueStreamRegistry,
    events: EventBus,
    node_type_styles: HashMap<TypeTag, NodeStyle>,
    edge_type_styles: HashMap<TypeTag, EdgeStyle>,
    debug: bool,
    loaded: bool,
    disposed: bool,
}

fn registered_algorithms() -> Vec<Box<dyn crate::algorithm::Algorithm>> {
    vec![
        Box::new(crate::algorithm::brute_force::BruteForce::default()),
        Box::new(crate::algorithm::barnes_hut::BarnesHut::default()),
        Box::new(crate::algorithm::force_atlas2::ForceAtlas2::default()),
        Box::new(crate::algorithm::tidy_tree::TidyTree::default()),
    ]
}

impl Engine {
    /// Acquires a device (the engine's one and only async boundary) and
    /// builds every owned subsystem. Blocking; callers on an async host
    /// should prefer constructing a [`GpuContext`] themselves with
    /// [`GpuContext::new`] and calling [`Self::from_context`].
    pub fn new(options: EngineOptions<'_>) -> Result<Self> {
        let ctx = GpuContext::new_blocking(options.instance, options.surface)?;
        Self::from_context(ctx, options.surface_format, options.debug, options.initial_capacity)
    }

    pub fn from_context(
        ctx: GpuContext,
        surface_format: wgpu::TextureFormat,
        debug: bool,
        initial_capacity: usize,
    ) -> Result<Self> {
        let capacity = initial_capacity.max(1);
        let graph = Graph::new(capacity);
        let simulation = Simulation::new(&ctx, capacity, registered_algorithms())?;
        let compositor = Compositor::new(&ctx, surface_format, capacity, capacity)?;
        if debug {
            tracing::info!(capacity, "engine constructed");
        }
        Ok(Self {
            ctx,
            graph,
            simulation,
            viewport: Viewport::default(),
            compositor,
            streams: ValueStreamRegistry::default(),
            events: EventBus::new(),
            node_type_styles: HashMap::new(),
            edge_type_styles: HashMap::new(),
            debug,
            loaded: false,
            disposed: false,
        })
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.disposed {
            return Err(Error::NotReady("engine disposed"));
        }
        Ok(())
    }

    fn ensure_loaded(&self) -> Result<()> {
        self.ensure_ready()?;
        if !self.loaded {
            return Err(Error::NotReady("call made before load()"));
        }
        Ok(())
    }

    /// Releases GPU resources and marks the engine unusable; every method
    /// but a fresh `new`/`from_context` returns [`Error::NotReady`] after
    /// this.
    pub fn dispose(&mut self) {
        self.disposed = true;
        self.simulation.stop();
        self.events.clear();
    }

    // ---- graph mutation -------------------------------------------------

    fn resolve_node_input(&self, mut input: NodeInput) -> NodeInput {
        if let Some(style) = input.type_tag.as_ref().and_then(|tag| self.node_type_styles.get(tag)) {
            input.radius = input.radius.or(Some(style.radius));
            input.color = input.color.or(Some(style.color));
        }
        input
    }

    fn resolve_edge_input(&self, mut input: EdgeInput) -> EdgeInput {
        if let Some(style) = input.type_tag.as_ref().and_then(|tag| self.edge_type_styles.get(tag)) {
            input.width = input.width.or(Some(style.width));
            input.color = input.color.or(Some(style.color));
        }
        input
    }

    /// `load(graph)`: full replacement. Reseeds every node's GPU position
    /// and resizes both the simulation and compositor buffers to match.
    pub fn load(&mut self, nodes: Vec<NodeInput>, edges: Vec<EdgeInput>) -> Result<LoadCounts> {
        self.ensure_ready()?;
        let nodes: Vec<NodeInput> = nodes.into_iter().map(|n| self.resolve_node_input(n)).collect();
        let edges: Vec<EdgeInput> = edges.into_iter().map(|e| self.resolve_edge_input(e)).collect();
        let counts = self.graph.load(nodes, edges);
        self.loaded = true;
        self.sync_capacity_after_load();
        self.events.emit(Event::GraphLoaded(counts));
        Ok(counts)
    }

    fn row_capacity(&mut self) -> usize {
        self.graph.rebuild_csr_if_dirty();
        self.graph
            .csr()
            .offsets
            .len()
            .saturating_sub(1)
            .max(self.graph.node_count())
    }

    fn sync_capacity_after_load(&mut self) {
        let row_capacity = self.row_capacity();
        self.simulation.ensure_capacity(&self.ctx, row_capacity);
        self.simulation.reseed_all(&self.ctx, &self.graph);
        self.compositor
            .ensure_capacity(&self.ctx, row_capacity.max(1), self.graph.edge_count().max(1));
    }

    pub fn add_nodes(&mut self, inputs: Vec<NodeInput>) -> Result<Vec<NodeIndex>> {
        self.ensure_loaded()?;
        let inputs: Vec<NodeInput> = inputs.into_iter().map(|n| self.resolve_node_input(n)).collect();
        let indices = self.graph.add_nodes(inputs);
        let row_capacity = self.row_capacity();
        self.simulation.ensure_capacity(&self.ctx, row_capacity);
        for &idx in &indices {
            let pos = self.graph.get_node(idx).map(|n| n.pos).unwrap_or([0.0, 0.0]);
            self.simulation.seed_node(&self.ctx, Graph::row_of(idx), pos);
        }
        self.compositor
            .ensure_capacity(&self.ctx, row_capacity.max(1), self.graph.edge_count().max(1));
        Ok(indices)
    }

    pub fn add_edges(&mut self, inputs: Vec<EdgeInput>) -> Result<Vec<EdgeAddResult>> {
        self.ensure_loaded()?;
        let inputs: Vec<EdgeInput> = inputs.into_iter().map(|e| self.resolve_edge_input(e)).collect();
        let results = self.graph.add_edges(inputs);
        self.compositor
            .ensure_capacity(&self.ctx, self.graph.node_count().max(1), self.graph.edge_count().max(1));
        Ok(results)
    }

    pub fn remove_nodes(&mut self, keys: &[NodeKey]) -> Result<usize> {
        self.ensure_loaded()?;
        Ok(self.graph.remove_nodes(keys))
    }

    pub fn remove_edges(&mut self, indices: &[EdgeIndex]) -> Result<usize> {
        self.ensure_loaded()?;
        Ok(self.graph.remove_edges(indices))
    }

    pub fn set_node_positions(&mut self, values: &[[f32; 2]]) -> Result<()> {
        self.ensure_loaded()?;
        self.graph.set_node_positions(values)?;
        self.simulation.reseed_all(&self.ctx, &self.graph);
        Ok(())
    }

    pub fn set_node_colors(&mut self, values: &[[f32; 4]]) -> Result<()> {
        self.ensure_loaded()?;
        self.graph.set_node_colors(values)
    }

    pub fn set_node_sizes(&mut self, values: &[f32]) -> Result<()> {
        self.ensure_loaded()?;
        self.graph.set_node_sizes(values)
    }

    pub fn set_edge_colors(&mut self, values: &[[f32; 4]]) -> Result<()> {
        self.ensure_loaded()?;
        self.graph.set_edge_colors(values)
    }

    pub fn set_edge_widths(&mut self, values: &[f32]) -> Result<()> {
        self.ensure_loaded()?;
        self.graph.set_edge_widths(values)
    }

    pub fn set_edge_curvatures(&mut self, values: &[f32]) -> Result<()> {
        self.ensure_loaded()?;
        self.graph.set_edge_curvatures(values)
    }

    pub fn set_pinned(&mut self, idx: Option<NodeIndex>) {
        self.graph.set_pinned(idx);
        self.simulation.set_pinned(idx);
    }

    /// Host-driven hover highlight; the engine does no hit-testing of its
    /// own — callers resolve a screen point via [`Self::screen_to_graph`]
    /// and their own picking, then report the result here.
    pub fn set_hovered(&mut self, idx: Option<NodeIndex>) {
        self.compositor.set_hovered(idx);
    }

    pub fn set_node_type_styles(&mut self, styles: HashMap<TypeTag, NodeStyle>) {
        self.node_type_styles = styles;
    }

    pub fn set_edge_type_styles(&mut self, styles: HashMap<TypeTag, EdgeStyle>) {
        self.edge_type_styles = styles;
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn get_node(&self, idx: NodeIndex) -> Option<&NodeData> {
        self.graph.get_node(idx)
    }

    pub fn node_index(&self, key: &NodeKey) -> Option<NodeIndex> {
        self.graph.index_of(key)
    }

    // ---- simulation control ----------------------------------------------

    pub fn set_force_algorithm(&mut self, id: AlgorithmId) -> Result<()> {
        self.ensure_ready()?;
        self.simulation.set_algorithm(&self.ctx, id)
    }

    pub fn current_algorithm_id(&self) -> AlgorithmId {
        self.simulation.current_algorithm_id()
    }

    pub fn set_force_config(&mut self, config: ForceConfig) {
        self.simulation.set_force_config(config);
    }

    pub fn force_config(&self) -> ForceConfig {
        self.simulation.force_config()
    }

    pub fn start(&mut self) {
        self.simulation.start();
    }

    pub fn stop(&mut self) {
        self.simulation.stop();
    }

    pub fn restart(&mut self) {
        self.simulation.restart();
    }

    pub fn is_running(&self) -> bool {
        self.simulation.is_running()
    }

    pub fn alpha(&self) -> f32 {
        self.simulation.alpha()
    }

    /// Advances the simulation one tick, then blocks on a GPU→CPU
    /// readback so `get_node`/label layout see this tick's positions
    /// rather than whatever was last seeded. The disc/density/edge
    /// render passes don't need this — they sample the GPU position
    /// buffer directly — but nothing else keeps `NodeData.pos` current.
    pub fn tick(&mut self) -> Result<TickReport> {
        self.ensure_loaded()?;
        let report = self.simulation.tick(&self.ctx, &mut self.graph, &mut self.events)?;
        self.simulation.sync_positions(&self.ctx, &mut self.graph)?;
        Ok(report)
    }

    pub fn check_diverged(&mut self) -> Result<bool> {
        self.ensure_loaded()?;
        self.simulation.check_diverged(&self.ctx, &mut self.events)
    }

    // ---- render ------------------------------------------------------------

    /// Runs the fixed compositor pass order into `target`.
    pub fn render(
        &mut self,
        target: &wgpu::TextureView,
        target_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        time_seconds: f32,
    ) -> Result<()> {
        self.ensure_ready()?;
        self.viewport.resize(width as f32, height as f32);
        let viewport_uniforms = self.viewport.uniforms();
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("engine-render") });
        let inputs = FrameInputs {
            positions: self.simulation.position_buffer(),
            node_count: self.graph.node_count() as u32,
            row_count: self.simulation.row_count(),
            liveness: self.simulation.liveness_buffer(),
            edge_count: self.graph.edge_count() as u32,
            target,
            target_format,
            width,
            height,
            viewport: &viewport_uniforms,
            graph: &self.graph,
            value_streams: &self.streams,
            time_seconds,
        };
        self.compositor.render(&self.ctx, &mut encoder, &inputs);
        self.ctx.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    // ---- heatmap / contour / metaball / labels ---------------------------

    pub fn enable_heatmap(&mut self) {
        self.compositor.heatmap_config.enabled = true;
    }

    pub fn disable_heatmap(&mut self) {
        self.compositor.heatmap_config.enabled = false;
    }

    pub fn set_heatmap_config(&mut self, config: HeatmapConfig) {
        self.compositor.heatmap_config = config;
    }

    pub fn heatmap_config(&self) -> HeatmapConfig {
        self.compositor.heatmap_config
    }

    pub fn enable_contour(&mut self) {
        self.compositor.contour_config.enabled = true;
    }

    pub fn disable_contour(&mut self) {
        self.compositor.contour_config.enabled = false;
    }

    pub fn set_contour_config(&mut self, config: ContourConfig) {
        self.compositor.contour_config = config;
    }

    pub fn contour_config(&self) -> ContourConfig {
        self.compositor.contour_config
    }

    pub fn enable_metaball(&mut self) {
        self.compositor.metaball_config.enabled = true;
    }

    pub fn disable_metaball(&mut self) {
        self.compositor.metaball_config.enabled = false;
    }

    pub fn set_metaball_config(&mut self, config: MetaballConfig) {
        self.compositor.metaball_config = config;
    }

    pub fn metaball_config(&self) -> MetaballConfig {
        self.compositor.metaball_config
    }

    pub fn enable_labels(&mut self) {
        self.compositor.labels_config.enabled = true;
    }

    pub fn disable_labels(&mut self) {
        self.compositor.labels_config.enabled = false;
    }

    pub fn set_labels_config(&mut self, config: LabelsConfig) {
        self.compositor.labels_config = config;
    }

    pub fn labels_config(&self) -> LabelsConfig {
        self.compositor.labels_config
    }

    pub fn set_labels(&mut self, labels: HashMap<NodeIndex, String>) {
        self.compositor.set_labels(labels);
    }

    pub fn set_label(&mut self, node: NodeIndex, text: Option<String>) {
        self.compositor.set_label(node, text);
    }

    /// Uploads the host-supplied MSDF atlas; see [`crate::compositor::labels`]
    /// for the rationale (the engine bundles no font of its own).
    pub fn set_label_atlas(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
        glyphs: HashMap<char, crate::compositor::GlyphMetrics>,
    ) {
        self.compositor.set_label_atlas(&self.ctx, rgb, width, height, glyphs);
    }

    // ---- value streams ----------------------------------------------------

    pub fn define_value_stream(&mut self, stream: ValueStream) {
        self.streams.register(stream);
    }

    pub fn set_stream_values(&mut self, name: &str, values: impl IntoIterator<Item = (NodeIndex, f32)>) -> Result<()> {
        let stream = self.streams.get_mut(name).ok_or(Error::NotReady("unknown value stream"))?;
        stream.set_many(values);
        Ok(())
    }

    pub fn remove_value_stream(&mut self, name: &str) -> Option<ValueStream> {
        self.streams.unregister(name)
    }

    pub fn set_heatmap_data_source(&mut self, source: Option<String>) {
        self.compositor.set_heatmap_data_source(source);
    }

    pub fn set_contour_data_source(&mut self, source: Option<String>) {
        self.compositor.set_contour_data_source(source);
    }

    // ---- edges -------------------------------------------------------------

    pub fn enable_curved_edges(&mut self) {
        self.compositor.curved_edges_config.enabled = true;
    }

    pub fn disable_curved_edges(&mut self) {
        self.compositor.curved_edges_config.enabled = false;
    }

    pub fn set_curved_edges(&mut self, config: CurvedEdgesConfig) {
        self.compositor.curved_edges_config = config;
    }

    pub fn curved_edges_config(&self) -> CurvedEdgesConfig {
        self.compositor.curved_edges_config
    }

    pub fn set_edge_flow_config(&mut self, config: EdgeFlowConfig) {
        self.compositor.edge_flow_config = config;
    }

    pub fn set_edge_flow_preset(&mut self, preset: EdgeFlowPreset) {
        self.compositor.edge_flow_config = preset.to_config();
    }

    pub fn disable_edge_flow(&mut self) {
        self.compositor.edge_flow_config.enabled = false;
    }

    pub fn edge_flow_config(&self) -> EdgeFlowConfig {
        self.compositor.edge_flow_config
    }

    // ---- layers -------------------------------------------------------------

    pub fn define_layer(&mut self, layer: LayerDef) {
        self.compositor.define_layer(layer);
    }

    pub fn remove_layer(&mut self, name: &str) {
        self.compositor.remove_layer(name);
    }

    pub fn set_layer_visible(&mut self, name: &str, visible: bool) {
        self.compositor.set_layer_visible(name, visible);
    }

    pub fn layer_visibility(&self, name: &str) -> Option<bool> {
        self.compositor.layer_visibility(name)
    }

    // ---- viewport -----------------------------------------------------------

    pub fn resize(&mut self, width: f32, height: f32) {
        self.viewport.resize(width, height);
        self.events.emit(Event::ViewportChanged);
    }

    pub fn pan(&mut self, dx: f32, dy: f32) {
        self.viewport.pan_screen(dx, dy);
        self.events.emit(Event::ViewportChanged);
    }

    pub fn zoom(&mut self, pivot_screen: [f32; 2], factor: f32) {
        self.viewport.zoom_at(Vec2::from(pivot_screen), factor);
        self.events.emit(Event::ViewportChanged);
    }

    /// Computes the content AABB from current node positions/radii and
    /// fits the viewport to it, also feeding the same bounds to the
    /// simulation's boundary-gravity term.
    pub fn fit_to_view(&mut self, padding: f32) {
        let mut min = Vec2::splat(f32::MAX);
        let mut max = Vec2::splat(f32::MIN);
        let mut any = false;
        for (_, node) in self.graph.nodes() {
            let p = Vec2::from(node.pos);
            let r = Vec2::splat(node.radius.max(0.0));
            min = min.min(p - r);
            max = max.max(p + r);
            any = true;
        }
        if !any {
            min = Vec2::splat(-1.0);
            max = Vec2::splat(1.0);
        }
        self.viewport.fit_to_view(min, max, padding);
        self.simulation.set_bounds(min.into(), max.into());
        self.events.emit(Event::ViewportChanged);
    }

    pub fn screen_to_graph(&self, p: [f32; 2]) -> [f32; 2] {
        self.viewport.screen_to_graph(Vec2::from(p)).into()
    }

    pub fn graph_to_screen(&self, p: [f32; 2]) -> [f32; 2] {
        self.viewport.graph_to_screen(Vec2::from(p)).into()
    }

    // ---- events ---------------------------------------------------------

    /// Registers a handler (`on(event, handler)`); delivery is synchronous
    /// and push-only. There is no per-handler `off` — the
    /// engine exposes bulk [`Self::clear_event_handlers`] instead, since
    /// closures aren't comparable for identity (see [`crate::events`]).
    pub fn on(&mut self, handler: impl FnMut(&Event) + Send + 'static) {
        self.events.on(handler);
    }

    pub fn clear_event_handlers(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PwmShape;

    #[test]
    fn per_item_value_wins_over_type_style() {
        let styles = [(TypeTag::Int(1), NodeStyle { color: [1.0, 0.0, 0.0, 1.0], radius: 8.0 })]
            .into_iter()
            .collect::<HashMap<_, _>>();
        let input = NodeInput {
            key: "a".into(),
            pos: None,
            radius: Some(20.0),
            color: None,
            type_tag: Some(TypeTag::Int(1)),
        };
        let resolved = resolve_with(&styles, input);
        assert_eq!(resolved.radius, Some(20.0));
        assert_eq!(resolved.color, Some([1.0, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn missing_type_style_leaves_fields_untouched() {
        let styles: HashMap<TypeTag, NodeStyle> = HashMap::new();
        let input = NodeInput {
            key: "a".into(),
            pos: None,
            radius: None,
            color: None,
            type_tag: Some(TypeTag::Text("person".into())),
        };
        let resolved = resolve_with(&styles, input);
        assert_eq!(resolved.radius, None);
        assert_eq!(resolved.color, None);
    }

    /// Mirrors `Engine::resolve_node_input` without requiring a live
    /// `GpuContext`, so the precedence rule is testable without a device.
    fn resolve_with(styles: &HashMap<TypeTag, NodeStyle>, mut input: NodeInput) -> NodeInput {
        if let Some(tag) = input.type_tag.clone() {
            if let Some(style) = styles.get(&tag) {
                input.radius = input.radius.or(Some(style.radius));
                input.color = input.color.or(Some(style.color));
            }
        }
        input
    }

    #[test]
    fn edge_flow_presets_are_enabled() {
        assert!(EdgeFlowPreset::Pulse.to_config().enabled);
        assert!(EdgeFlowPreset::Flow.to_config().layer2.is_some());
        assert_eq!(EdgeFlowPreset::Alert.to_config().layer1_shape, PwmShape::Square);
    }
}
