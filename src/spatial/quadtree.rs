//! Bottom-up GPU quadtree build + Barnes-Hut traversal.
//!
//! Structurally grounded on `other_examples`'s `GpuTreeBuilder`/`TreeBuffers`
//! (plain-`wgpu` pipeline-per-pass, atomic-fixed-point bounds reduction,
//! `float_to_int`/`int_to_float` sortable-int encoding) generalized from that
//! file's standalone bounds+morton passes onto this crate's shared
//! [`crate::spatial::morton`] quantizer and [`crate::radix_sort::RadixSorter`]
//! for the sibling-sort step the traversal pass needs.

use crate::error::Result;
use crate::gpu::GpuContext;
use wgpu::util::DeviceExt;

/// Total node count for a perfect quadtree of `depth` levels:
/// `(4^(depth+1) - 1) / 3`.
pub fn tree_size_for_depth(depth: u32) -> u32 {
    ((1u32 << (2 * (depth + 1))) - 1) / 3
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct BoundsAtomic {
    min_x: i32,
    min_y: i32,
    max_x: i32,
    max_y: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct TreeParams {
    row_count: u32,
    max_depth: u32,
    _pad0: u32,
    _pad1: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct ForceParams {
    row_count: u32,
    theta: f32,
    gravity: f32,
    force_scale_q: f32,
}

/// Internal node during accumulation: fixed-point mass-weighted position
/// sum plus atomic descendant count and child slots.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct TreeNodeBuild {
    sum_x: i32,
    sum_y: i32,
    count: u32,
    half_width: f32,
    child: [i32; 4],
}

/// Finalised node as the force pass reads it: plain floats, no atomics.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadTreeNode {
    pub center_of_mass: [f32; 2],
    pub mass: f32,
    pub half_width: f32,
    pub child: [i32; 4],
}

/// Sortable-int encoding so atomic min/max works on IEEE floats.
fn float_to_int(f: f32) -> i32 {
    let bits = f.to_bits() as i32;
    if bits >= 0 {
        bits
    } else {
        bits ^ 0x7FFF_FFFF
    }
}

pub struct QuadTree {
    bounds_pipeline: wgpu::ComputePipeline,
    build_pipeline: wgpu::ComputePipeline,
    finalize_pipeline: wgpu::ComputePipeline,
    force_pipeline: wgpu::ComputePipeline,
    bounds_layout: wgpu::BindGroupLayout,
    build_layout: wgpu::BindGroupLayout,
    finalize_layout: wgpu::BindGroupLayout,
    force_layout: wgpu::BindGroupLayout,

    bounds_atomic: wgpu::Buffer,
    tree_build: wgpu::Buffer,
    tree_final: wgpu::Buffer,
    tree_params: wgpu::Buffer,
    force_params: wgpu::Buffer,

    max_depth: u32,
    tree_size: u32,
    node_capacity: u32,
}

impl QuadTree {
    pub fn new(ctx: &GpuContext, node_capacity: u32, max_depth: u32) -> Self {
        let tree_size = tree_size_for_depth(max_depth);
        let source = include_str!("../../shaders/quadtree.wgsl");
        let module = ctx.create_shader("quadtree", source);

        let bounds_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("quadtree-bounds-layout"),
            entries: &bgl_entries(&[
                (0, wgpu::BufferBindingType::Storage { read_only: true }),
                (1, wgpu::BufferBindingType::Storage { read_only: false }),
                (2, wgpu::BufferBindingType::Uniform),
            ]),
        });
        let build_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("quadtree-build-layout"),
            entries: &bgl_entries(&[
                (0, wgpu::BufferBindingType::Storage { read_only: true }),
                (1, wgpu::BufferBindingType::Storage { read_only: true }),
                (2, wgpu::BufferBindingType::Storage { read_only: false }),
                (3, wgpu::BufferBindingType::Uniform),
                (4, wgpu::BufferBindingType::Storage { read_only: true }),
            ]),
        });
        let finalize_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("quadtree-finalize-layout"),
            entries: &bgl_entries(&[
                (0, wgpu::BufferBindingType::Storage { read_only: true }),
                (1, wgpu::BufferBindingType::Storage { read_only: false }),
                (2, wgpu::BufferBindingType::Uniform),
            ]),
        });
        let force_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("quadtree-force-layout"),
            entries: &bgl_entries(&[
                (0, wgpu::BufferBindingType::Storage { read_only: true }),
                (1, wgpu::BufferBindingType::Storage { read_only: true }),
                (2, wgpu::BufferBindingType::Storage { read_only: false }),
                (3, wgpu::BufferBindingType::Uniform),
            ]),
        });

        let make_pipeline = |entry: &str, layout: &wgpu::BindGroupLayout| {
            let pipeline_layout = ctx.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(entry),
                bind_group_layouts: &[layout],
                push_constant_ranges: &[],
            });
            ctx.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some(entry),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            })
        };

        let bounds_atomic = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quadtree-bounds-atomic"),
            contents: bytemuck::bytes_of(&BoundsAtomic {
                min_x: float_to_int(1e30),
                min_y: float_to_int(1e30),
                max_x: float_to_int(-1e30),
                max_y: float_to_int(-1e30),
            }),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });
        let tree_build = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("quadtree-build"),
            size: (tree_size as usize * std::mem::size_of::<TreeNodeBuild>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let tree_final = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("quadtree-final"),
            size: (tree_size as usize * std::mem::size_of::<QuadTreeNode>()) as u64,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });
        let tree_params = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quadtree-params"),
            contents: bytemuck::bytes_of(&TreeParams {
                row_count: node_capacity,
                max_depth,
                _pad0: 0,
                _pad1: 0,
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let force_params = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quadtree-force-params"),
            contents: bytemuck::bytes_of(&ForceParams {
                row_count: node_capacity,
                theta: 0.8,
                gravity: 0.0,
                force_scale_q: 1024.0,
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        Self {
            bounds_pipeline: make_pipeline("bounds_main", &bounds_layout),
            build_pipeline: make_pipeline("tree_build_main", &build_layout),
            finalize_pipeline: make_pipeline("tree_finalize_main", &finalize_layout),
            force_pipeline: make_pipeline("force_main", &force_layout),
            bounds_layout,
            build_layout,
            finalize_layout,
            force_layout,
            bounds_atomic,
            tree_build,
            tree_final,
            tree_params,
            force_params,
            max_depth,
            tree_size,
            node_capacity,
        }
    }

    pub fn tree_size(&self) -> u32 {
        self.tree_size
    }

    /// Reset the bounds accumulator and zero the build buffer ahead of a
    /// fresh build this tick.
    pub fn reset_for_tick(&self, ctx: &GpuContext) {
        ctx.queue.write_buffer(
            &self.bounds_atomic,
            0,
            bytemuck::bytes_of(&BoundsAtomic {
                min_x: float_to_int(1e30),
                min_y: float_to_int(1e30),
                max_x: float_to_int(-1e30),
                max_y: float_to_int(-1e30),
            }),
        );
        let zeros = vec![0u8; self.tree_size as usize * std::mem::size_of::<TreeNodeBuild>()];
        ctx.queue.write_buffer(&self.tree_build, 0, &zeros);
    }

    /// Refresh both uniforms with this tick's live row range. `row_count`
    /// in both `TreeParams`/`ForceParams` is a dispatch bound, not a live
    /// count — it must cover every row the build/traversal passes touch,
    /// so callers pass the driver's row capacity, never its live node count.
    pub fn begin_tick(&self, ctx: &GpuContext, row_count: u32, theta: f32, gravity: f32) {
        ctx.queue.write_buffer(
            &self.tree_params,
            0,
            bytemuck::bytes_of(&TreeParams {
                row_count,
                max_depth: self.max_depth,
                _pad0: 0,
                _pad1: 0,
            }),
        );
        ctx.queue.write_buffer(
            &self.force_params,
            0,
            bytemuck::bytes_of(&ForceParams {
                row_count,
                theta,
                gravity,
                force_scale_q: 1024.0,
            }),
        );
    }

    pub fn compute_bounds(
        &self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        positions: &wgpu::Buffer,
    ) {
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("quadtree-bounds-bind-group"),
            layout: &self.bounds_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: positions.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: self.bounds_atomic.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: self.tree_params.as_entire_binding() },
            ],
        });
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("quadtree-bounds"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.bounds_pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(self.node_capacity.div_ceil(256), 1, 1);
    }

    /// Build internal nodes bottom-up from `sorted_morton_to_node`, the
    /// (Morton, NodeIndex) pairs already produced by [`crate::radix_sort`].
    pub fn build(
        &self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        positions: &wgpu::Buffer,
        sorted_node_indices: &wgpu::Buffer,
        liveness: &wgpu::Buffer,
    ) {
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("quadtree-build-bind-group"),
            layout: &self.build_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: positions.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: sorted_node_indices.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: self.tree_build.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: self.tree_params.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 4, resource: liveness.as_entire_binding() },
            ],
        });
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("quadtree-build"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.build_pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(self.node_capacity.div_ceil(256), 1, 1);
    }

    pub fn finalize(&self, ctx: &GpuContext, encoder: &mut wgpu::CommandEncoder) {
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("quadtree-finalize-bind-group"),
            layout: &self.finalize_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: self.tree_build.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: self.tree_final.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: self.tree_params.as_entire_binding() },
            ],
        });
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("quadtree-finalize"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.finalize_pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(self.tree_size.div_ceil(256), 1, 1);
    }

    /// Barnes-Hut traversal: one thread per node, stack-based descent,
    /// accumulating fixed-point repulsion into `force_accum`.
    pub fn accumulate_forces(
        &self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        positions: &wgpu::Buffer,
        force_accum: &wgpu::Buffer,
    ) {
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("quadtree-force-bind-group"),
            layout: &self.force_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: positions.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: self.tree_final.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: force_accum.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: self.force_params.as_entire_binding() },
            ],
        });
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("quadtree-force"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.force_pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(self.node_capacity.div_ceil(256), 1, 1);
    }
}

fn bgl_entries(specs: &[(u32, wgpu::BufferBindingType)]) -> Vec<wgpu::BindGroupLayoutEntry> {
    specs
        .iter()
        .map(|&(binding, ty)| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_size_matches_closed_form() {
        // depth 0: just the root -> 1 node.
        assert_eq!(tree_size_for_depth(0), 1);
        // depth 1: root + 4 children -> 5 nodes.
        assert_eq!(tree_size_for_depth(1), 5);
        // depth 2: 1 + 4 + 16 -> 21 nodes.
        assert_eq!(tree_size_for_depth(2), 21);
    }

    #[test]
    fn float_to_int_preserves_order() {
        let a = float_to_int(-5.0);
        let b = float_to_int(-1.0);
        let c = float_to_int(0.0);
        let d = float_to_int(3.0);
        assert!(a < b);
        assert!(b < c);
        assert!(c < d);
    }
}
