//! Algorithm Contract: pluggable repulsion kernels behind a
//! fixed method table.
//!
//! Grounded on `other_examples`'s `GpuLayout`/`LayoutConfig` capability
//! split (`use_barnes_hut` toggling between kernels behind one `step()`
//! entry point), generalized here into a trait so the driver can swap
//! kernels without knowing their internals. Algorithms are registered once
//! at `Engine` construction into a `Vec<Box<dyn Algorithm>>` — a tagged
//! variant with a fixed method table, not an open registry.

pub mod barnes_hut;
pub mod brute_force;
pub mod force_atlas2;
pub mod tidy_tree;

use crate::config::ForceConfig;
use crate::error::Result;
use crate::gpu::GpuContext;
use crate::graph::Csr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmId {
    BruteForce,
    BarnesHut,
    ForceAtlas2,
    TidyTree,
}

#[derive(Debug, Clone, Copy)]
pub struct AlgorithmInfo {
    pub id: AlgorithmId,
    pub display_name: &'static str,
    pub complexity: &'static str,
    pub min_recommended_nodes: usize,
    pub max_recommended_nodes: usize,
}

/// Capability flags: which passes the Simulation Driver must
/// skip because this algorithm folds them into its own repulsion kernel.
/// Repulsion itself has no generic driver fallback — `record_repulsion_pass`
/// is always delegated to the algorithm, so there's no flag for it here.
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    pub handles_gravity: bool,
    pub handles_springs: bool,
}

/// Everything the driver hands an algorithm at `update_uniforms`/dispatch
/// time. Borrowed for the duration of one tick; algorithms never retain
/// these references past the call.
pub struct RenderContext<'a> {
    pub positions: &'a wgpu::Buffer,
    pub forces: &'a wgpu::Buffer,
    /// Live node count. Not a valid dispatch bound on its own — rows are
    /// slotmap slot indices, not a dense `0..node_count` range.
    pub node_count: u32,
    /// Highest live row + 1. The dispatch/bound every kernel that indexes
    /// `positions`/`forces`/the CSR by row must use instead of `node_count`.
    pub row_count: u32,
    /// One `u32` per row in `0..row_count`, 1 if that row holds a live node
    /// and 0 for the reserved slot-0 row or a recycled gap. Kernels that
    /// read another row's position directly (not through the CSR) must
    /// check this before treating it as a real particle.
    pub liveness: &'a wgpu::Buffer,
    pub edge_count: u32,
    pub force_config: &'a ForceConfig,
    pub bounds_min: [f32; 2],
    pub bounds_max: [f32; 2],
    pub csr: &'a Csr,
}

pub trait Algorithm {
    fn info(&self) -> AlgorithmInfo;
    fn capabilities(&self) -> Capabilities;

    /// Allocate GPU resources sized for up to `max_nodes`. Called once on
    /// `setAlgorithm` swap-in; the driver guarantees the previous
    /// algorithm's `destroy` already ran.
    fn create_buffers(&mut self, ctx: &GpuContext, max_nodes: usize) -> Result<()>;

    /// Upload this tick's uniforms (force config, bounds, counts).
    fn update_uniforms(&mut self, ctx: &GpuContext, rc: &RenderContext<'_>);

    /// Record the repulsion pass (and any algorithm-specific prelude —
    /// Morton/sort/quadtree for Barnes-Hut) into `encoder`. `&mut self`
    /// because algorithms with internal ping-pong state (Barnes-Hut's
    /// sort scratch) advance it here.
    fn record_repulsion_pass(&mut self, ctx: &GpuContext, encoder: &mut wgpu::CommandEncoder, rc: &RenderContext<'_>);

    /// Release GPU resources. The driver calls this before dropping the
    /// trait object, guaranteeing old buffers are freed before the next
    /// algorithm's `create_buffers` runs.
    fn destroy(&mut self);
}
