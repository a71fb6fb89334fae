//! O(n²) pairwise repulsion — the simplest conformer to the Algorithm
//! contract, useful for small graphs and as a correctness oracle for the
//! approximating algorithms.
//!
//! One uniform buffer rewritten per tick, one storage-buffer bind group
//! built once at `create_buffers` time.

use super::{Algorithm, AlgorithmId, AlgorithmInfo, Capabilities, RenderContext};
use crate::error::Result;
use crate::gpu::GpuContext;
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Params {
    row_count: u32,
    repulsion_strength: f32,
    force_scale_q: f32,
    _pad: u32,
}

pub struct BruteForce {
    pipeline: Option<wgpu::ComputePipeline>,
    layout: Option<wgpu::BindGroupLayout>,
    params: Option<wgpu::Buffer>,
    max_nodes: usize,
}

impl Default for BruteForce {
    fn default() -> Self {
        Self {
            pipeline: None,
            layout: None,
            params: None,
            max_nodes: 0,
        }
    }
}

impl Algorithm for BruteForce {
    fn info(&self) -> AlgorithmInfo {
        AlgorithmInfo {
            id: AlgorithmId::BruteForce,
            display_name: "Brute Force",
            complexity: "O(n^2)",
            min_recommended_nodes: 0,
            max_recommended_nodes: 2_000,
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            handles_gravity: false,
            handles_springs: false,
        }
    }

    fn create_buffers(&mut self, ctx: &GpuContext, max_nodes: usize) -> Result<()> {
        let source = include_str!("../../shaders/brute_force.wgsl");
        let module = ctx.create_shader("brute-force-repulsion", source);
        let layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("brute-force-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });
        let pipeline_layout = ctx.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("brute-force-pipeline-layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = ctx.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("brute-force-pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("repulsion_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });
        let params = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("brute-force-params"),
            contents: bytemuck::bytes_of(&Params {
                row_count: max_nodes as u32,
                repulsion_strength: 400.0,
                force_scale_q: 1024.0,
                _pad: 0,
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        self.pipeline = Some(pipeline);
        self.layout = Some(layout);
        self.params = Some(params);
        self.max_nodes = max_nodes;
        Ok(())
    }

    fn update_uniforms(&mut self, ctx: &GpuContext, rc: &RenderContext<'_>) {
        if let Some(params) = &self.params {
            ctx.queue.write_buffer(
                params,
                0,
                bytemuck::bytes_of(&Params {
                    row_count: rc.row_count,
                    repulsion_strength: rc.force_config.repulsion_strength,
                    force_scale_q: 1024.0,
                    _pad: 0,
                }),
            );
        }
    }

    fn record_repulsion_pass(&mut self, ctx: &GpuContext, encoder: &mut wgpu::CommandEncoder, rc: &RenderContext<'_>) {
        let (Some(pipeline), Some(layout), Some(params)) = (&self.pipeline, &self.layout, &self.params) else {
            return;
        };
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("brute-force-bind-group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: params.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: rc.positions.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: rc.forces.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: rc.liveness.as_entire_binding() },
            ],
        });
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("brute-force-repulsion"),
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
    }
}
