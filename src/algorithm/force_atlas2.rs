//! ForceAtlas2-style degree-weighted repulsion. Unlike
//! brute-force/Barnes-Hut, this kernel folds gravity into the same pass
//! (`handles_gravity = true`), matching the original ForceAtlas2 algorithm
//! pulling low-degree nodes toward the centre more strongly.
//!
//! Dispatch shape copied from `brute_force.rs`; the addition is a
//! per-node degree buffer built from the CSR each tick the degree count
//! changes, grounded on `graph.rs`'s `Csr::offsets` being exactly
//! `degree[row] = offsets[row+1] - offsets[row]`.

use super::{Algorithm, AlgorithmId, AlgorithmInfo, Capabilities, RenderContext};
use crate::buffers::TypedBuffer;
use crate::error::Result;
use crate::gpu::GpuContext;
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Params {
    row_count: u32,
    repulsion_strength: f32,
    gravity: f32,
    force_scale_q: f32,
}

pub struct ForceAtlas2 {
    pipeline: Option<wgpu::ComputePipeline>,
    layout: Option<wgpu::BindGroupLayout>,
    params: Option<wgpu::Buffer>,
    degrees: Option<TypedBuffer<u32>>,
}

impl Default for ForceAtlas2 {
    fn default() -> Self {
        Self {
            pipeline: None,
            layout: None,
            params: None,
            degrees: None,
        }
    }
}

impl Algorithm for ForceAtlas2 {
    fn info(&self) -> AlgorithmInfo {
        AlgorithmInfo {
            id: AlgorithmId::ForceAtlas2,
            display_name: "ForceAtlas2-style",
            complexity: "O(n^2)",
            min_recommended_nodes: 0,
            max_recommended_nodes: 5_000,
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            handles_gravity: true,
            handles_springs: false,
        }
    }

    fn create_buffers(&mut self, ctx: &GpuContext, max_nodes: usize) -> Result<()> {
        let source = include_str!("../../shaders/force_atlas2.wgsl");
        let module = ctx.create_shader("force-atlas2-repulsion", source);
        let layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("force-atlas2-layout"),
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
            label: Some("force-atlas2-pipeline-layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = ctx.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("force-atlas2-pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("repulsion_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });
        let params = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("force-atlas2-params"),
            contents: bytemuck::bytes_of(&Params {
                row_count: max_nodes as u32,
                repulsion_strength: 400.0,
                gravity: 0.02,
                force_scale_q: 1024.0,
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        self.pipeline = Some(pipeline);
        self.layout = Some(layout);
        self.params = Some(params);
        self.degrees = Some(TypedBuffer::new(
            ctx,
            "force-atlas2-degrees",
            max_nodes.max(1),
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        ));
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
                    gravity: rc.force_config.gravity,
                    force_scale_q: 1024.0,
                }),
            );
        }
        if let Some(degrees) = &mut self.degrees {
            let offsets = &rc.csr.offsets;
            if offsets.len() >= rc.row_count as usize + 1 {
                let degree_values: Vec<u32> = (0..rc.row_count as usize)
                    .map(|row| offsets[row + 1] - offsets[row])
                    .collect();
                let _ = degrees.write(ctx, &degree_values);
            }
        }
    }

    fn record_repulsion_pass(&mut self, ctx: &GpuContext, encoder: &mut wgpu::CommandEncoder, rc: &RenderContext<'_>) {
        let (Some(pipeline), Some(layout), Some(params), Some(degrees)) =
            (&self.pipeline, &self.layout, &self.params, &self.degrees)
        else {
            return;
        };
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("force-atlas2-bind-group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: params.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: rc.positions.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: degrees.buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: rc.forces.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 4, resource: rc.liveness.as_entire_binding() },
            ],
        });
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("force-atlas2-repulsion"),
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
        self.degrees = None;
    }
}
