//! Barnes-Hut repulsion: Morton → sort → quadtree build → traversal,
//! assembled from [`crate::spatial`] and [`crate::radix_sort`].
//!
//! Grounded on `other_examples`'s `GpuLayout::dispatch_tree_compute`
//! (periodic tree rebuild ahead of a force pass that reads the finalized
//! tree) for the per-tick ordering of the prelude vs. the traversal.

use super::{Algorithm, AlgorithmId, AlgorithmInfo, Capabilities, RenderContext};
use crate::buffers::PingPong;
use crate::error::Result;
use crate::gpu::GpuContext;
use crate::spatial::QuadTree;
use wgpu::util::DeviceExt;

const DEFAULT_MAX_DEPTH: u32 = 12;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct MortonParams {
    row_count: u32,
    bounds_min: [f32; 2],
    bounds_max: [f32; 2],
}

pub struct BarnesHut {
    quadtree: Option<QuadTree>,
    morton_pipeline: Option<wgpu::ComputePipeline>,
    morton_layout: Option<wgpu::BindGroupLayout>,
    morton_params: Option<wgpu::Buffer>,
    keys: Option<PingPong<u32>>,
    values: Option<PingPong<u32>>,
    radix_sorter: Option<crate::radix_sort::RadixSorter>,
    max_nodes: usize,
}

impl Default for BarnesHut {
    fn default() -> Self {
        Self {
            quadtree: None,
            morton_pipeline: None,
            morton_layout: None,
            morton_params: None,
            keys: None,
            values: None,
            radix_sorter: None,
            max_nodes: 0,
        }
    }
}

impl Algorithm for BarnesHut {
    fn info(&self) -> AlgorithmInfo {
        AlgorithmInfo {
            id: AlgorithmId::BarnesHut,
            display_name: "Barnes-Hut",
            complexity: "O(n log n)",
            min_recommended_nodes: 500,
            max_recommended_nodes: 1_000_000,
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            handles_gravity: false,
            handles_springs: false,
        }
    }

    fn create_buffers(&mut self, ctx: &GpuContext, max_nodes: usize) -> Result<()> {
        let source = include_str!("../../shaders/barnes_hut_morton.wgsl");
        let module = ctx.create_shader("barnes-hut-morton", source);
        let layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("barnes-hut-morton-layout"),
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
                    ty: wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Storage { read_only: false }, has_dynamic_offset: false, min_binding_size: None },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Storage { read_only: false }, has_dynamic_offset: false, min_binding_size: None },
                    count: None,
                },
            ],
        });
        let pipeline_layout = ctx.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("barnes-hut-morton-pipeline-layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = ctx.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("barnes-hut-morton-pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("morton_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });
        let params = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("barnes-hut-morton-params"),
            contents: bytemuck::bytes_of(&MortonParams {
                row_count: max_nodes as u32,
                bounds_min: [0.0, 0.0],
                bounds_max: [1.0, 1.0],
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        self.morton_pipeline = Some(pipeline);
        self.morton_layout = Some(layout);
        self.morton_params = Some(params);
        self.keys = Some(PingPong::new(
            ctx,
            "barnes-hut-morton-keys",
            max_nodes.max(1),
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        ));
        self.values = Some(PingPong::new(
            ctx,
            "barnes-hut-node-indices",
            max_nodes.max(1),
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        ));
        self.radix_sorter = Some(crate::radix_sort::RadixSorter::new(ctx, max_nodes.max(1)));
        self.quadtree = Some(QuadTree::new(ctx, max_nodes.max(1) as u32, DEFAULT_MAX_DEPTH));
        self.max_nodes = max_nodes;
        Ok(())
    }

    fn update_uniforms(&mut self, ctx: &GpuContext, rc: &RenderContext<'_>) {
        if let (Some(params), Some(quadtree)) = (&self.morton_params, &self.quadtree) {
            ctx.queue.write_buffer(
                params,
                0,
                bytemuck::bytes_of(&MortonParams {
                    row_count: rc.row_count,
                    bounds_min: rc.bounds_min,
                    bounds_max: rc.bounds_max,
                }),
            );
            quadtree.begin_tick(ctx, rc.row_count, rc.force_config.theta, 0.0);
        }
    }

    fn record_repulsion_pass(&mut self, ctx: &GpuContext, encoder: &mut wgpu::CommandEncoder, rc: &RenderContext<'_>) {
        let (
            Some(morton_pipeline),
            Some(morton_layout),
            Some(morton_params),
            Some(keys),
            Some(values),
            Some(sorter),
            Some(quadtree),
        ) = (
            &self.morton_pipeline,
            &self.morton_layout,
            &self.morton_params,
            &mut self.keys,
            &mut self.values,
            &self.radix_sorter,
            &self.quadtree,
        )
        else {
            return;
        };

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("barnes-hut-morton-bind-group"),
            layout: morton_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: morton_params.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: rc.positions.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: keys.write().as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: values.write().as_entire_binding() },
            ],
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("barnes-hut-morton"),
                timestamp_writes: None,
            });
            pass.set_pipeline(morton_pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(rc.row_count.div_ceil(256), 1, 1);
        }

        // The morton shader just populated `write()`; flip so `read()`
        // is this tick's (key, index) pairs before sorting them in place.
        // Sorting the full row range (not just the live count) keeps
        // gap/dead rows' entries in the array instead of leaving a stale,
        // unsorted tail that `tree_build_main` would otherwise read.
        keys.swap();
        values.swap();
        let _ = sorter.sort(ctx, encoder, keys, values, rc.row_count as usize);

        quadtree.reset_for_tick(ctx);
        quadtree.build(ctx, encoder, rc.positions, values.read(), rc.liveness);
        quadtree.finalize(ctx, encoder);
        quadtree.accumulate_forces(ctx, encoder, rc.positions, rc.forces);
    }

    fn destroy(&mut self) {
        self.quadtree = None;
        self.morton_pipeline = None;
        self.morton_layout = None;
        self.morton_params = None;
        self.keys = None;
        self.values = None;
        self.radix_sorter = None;
    }
}
