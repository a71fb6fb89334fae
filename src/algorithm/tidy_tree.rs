//! Tidy-tree style layout: analytic target positions from a breadth-first
//! layering of the graph, pulled toward by a spring each tick. Declares `handles_gravity = true` because it is a
//! layout-to-target algorithm, not a repulsion one, and the driver's
//! centre-pull pass would fight its own targets.
//!
//! The analytic layering walk reuses `graph.rs`'s CSR (`Csr::offsets` /
//! `Csr::targets`, symmetric per node) for a breadth-first depth
//! assignment; dispatch shape for the spring-pull pass follows
//! `brute_force.rs`.

use super::{Algorithm, AlgorithmId, AlgorithmInfo, Capabilities, RenderContext};
use crate::buffers::TypedBuffer;
use crate::error::Result;
use crate::gpu::GpuContext;
use std::collections::VecDeque;
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Params {
    row_count: u32,
    pull_strength: f32,
    force_scale_q: f32,
    _pad: u32,
}

const LAYER_SPACING: f32 = 80.0;
const SIBLING_SPACING: f32 = 40.0;

pub struct TidyTree {
    pipeline: Option<wgpu::ComputePipeline>,
    layout: Option<wgpu::BindGroupLayout>,
    params: Option<wgpu::Buffer>,
    targets: Option<TypedBuffer<f32>>,
    /// Row index of the CSR snapshot the cached targets were built from;
    /// recomputing the layering every tick is wasted CPU work once the
    /// graph has settled, so we only redo it when the row count changes.
    cached_row_count: usize,
}

impl Default for TidyTree {
    fn default() -> Self {
        Self {
            pipeline: None,
            layout: None,
            params: None,
            targets: None,
            cached_row_count: usize::MAX,
        }
    }
}

/// Breadth-first layering over the symmetric CSR: roots are rows with the
/// fewest neighbours (leaves of a tree are high-degree-one, but the actual
/// root is whichever unvisited row the scan reaches first at depth 0 — for
/// a forest every connected component gets its own root).
fn layer_targets(row_count: usize, offsets: &[u32], targets: &[u32]) -> Vec<[f32; 2]> {
    let mut depth = vec![u32::MAX; row_count];
    let mut order: Vec<Vec<u32>> = Vec::new();
    let mut queue = VecDeque::new();

    for root in 0..row_count as u32 {
        if depth[root as usize] != u32::MAX {
            continue;
        }
        depth[root as usize] = 0;
        queue.push_back(root);
        while let Some(row) = queue.pop_front() {
            let d = depth[row as usize];
            if order.len() <= d as usize {
                order.resize(d as usize + 1, Vec::new());
            }
            order[d as usize].push(row);
            let start = offsets[row as usize] as usize;
            let end = offsets[row as usize + 1] as usize;
            for &n in &targets[start..end] {
                if depth[n as usize] == u32::MAX {
                    depth[n as usize] = d + 1;
                    queue.push_back(n);
                }
            }
        }
    }

    let mut positions = vec![[0.0f32, 0.0f32]; row_count];
    for (d, rows) in order.iter().enumerate() {
        let width = rows.len() as f32 * SIBLING_SPACING;
        let y = d as f32 * LAYER_SPACING;
        for (i, &row) in rows.iter().enumerate() {
            let x = i as f32 * SIBLING_SPACING - width / 2.0;
            positions[row as usize] = [x, y];
        }
    }
    positions
}

impl Algorithm for TidyTree {
    fn info(&self) -> AlgorithmInfo {
        AlgorithmInfo {
            id: AlgorithmId::TidyTree,
            display_name: "Tidy Tree",
            complexity: "O(n)",
            min_recommended_nodes: 0,
            max_recommended_nodes: 200_000,
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            handles_gravity: true,
            handles_springs: false,
        }
    }

    fn create_buffers(&mut self, ctx: &GpuContext, max_nodes: usize) -> Result<()> {
        let source = include_str!("../../shaders/tidy_tree.wgsl");
        let module = ctx.create_shader("tidy-tree-pull", source);
        let layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("tidy-tree-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Uniform, has_dynamic_offset: false, min_binding_size: None },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Storage { read_only: true }, has_dynamic_offset: false, min_binding_size: None },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Storage { read_only: true }, has_dynamic_offset: false, min_binding_size: None },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Storage { read_only: false }, has_dynamic_offset: false, min_binding_size: None },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Storage { read_only: true }, has_dynamic_offset: false, min_binding_size: None },
                    count: None,
                },
            ],
        });
        let pipeline_layout = ctx.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("tidy-tree-pipeline-layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = ctx.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("tidy-tree-pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("pull_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });
        let params = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("tidy-tree-params"),
            contents: bytemuck::bytes_of(&Params {
                row_count: max_nodes as u32,
                pull_strength: 0.05,
                force_scale_q: 1024.0,
                _pad: 0,
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        self.pipeline = Some(pipeline);
        self.layout = Some(layout);
        self.params = Some(params);
        self.targets = Some(TypedBuffer::new(
            ctx,
            "tidy-tree-targets",
            max_nodes.max(1) * 2,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        ));
        self.cached_row_count = usize::MAX;
        Ok(())
    }

    fn update_uniforms(&mut self, ctx: &GpuContext, rc: &RenderContext<'_>) {
        if let Some(params) = &self.params {
            ctx.queue.write_buffer(
                params,
                0,
                bytemuck::bytes_of(&Params {
                    row_count: rc.row_count,
                    pull_strength: rc.force_config.spring_stiffness,
                    force_scale_q: 1024.0,
                    _pad: 0,
                }),
            );
        }
        let row_count = rc.row_count as usize;
        if self.cached_row_count == row_count {
            return;
        }
        if let Some(targets) = &mut self.targets {
            if rc.csr.offsets.len() >= row_count + 1 {
                let flat = layer_targets(row_count, &rc.csr.offsets, &rc.csr.targets);
                let values: Vec<f32> = flat.into_iter().flatten().collect();
                if targets.write(ctx, &values).is_ok() {
                    self.cached_row_count = row_count;
                }
            }
        }
    }

    fn record_repulsion_pass(&mut self, ctx: &GpuContext, encoder: &mut wgpu::CommandEncoder, rc: &RenderContext<'_>) {
        let (Some(pipeline), Some(layout), Some(params), Some(targets)) =
            (&self.pipeline, &self.layout, &self.params, &self.targets)
        else {
            return;
        };
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tidy-tree-bind-group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: params.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: rc.positions.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: targets.buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: rc.forces.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 4, resource: rc.liveness.as_entire_binding() },
            ],
        });
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("tidy-tree-pull"),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(rc.row_count.div_ceil(256), 1, 1);
    }

    fn destroy(&mut self) {
        self.pipeline = None;
        self.layout = None;
        self.params = None;
        self.targets = None;
        self.cached_row_count = usize::MAX;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layers_a_simple_chain() {
        // 0 - 1 - 2, symmetric CSR.
        let offsets = vec![0, 1, 3, 4];
        let targets = vec![1, 0, 2, 1];
        let positions = layer_targets(3, &offsets, &targets);
        assert_eq!(positions[0][1], 0.0);
        assert_eq!(positions[1][1], LAYER_SPACING);
        assert_eq!(positions[2][1], 2.0 * LAYER_SPACING);
    }

    #[test]
    fn disconnected_components_each_get_a_root() {
        let offsets = vec![0, 0, 0];
        let targets: Vec<u32> = vec![];
        let positions = layer_targets(2, &offsets, &targets);
        assert_eq!(positions[0][1], 0.0);
        assert_eq!(positions[1][1], 0.0);
    }
}
