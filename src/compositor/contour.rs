//! Marching-squares contours over the density texture.
//!
//! The compute pass atomically claims a slot in a line-vertex buffer,
//! writes directly, and the draw call reads the vertex count back via
//! `draw_indirect` — the same atomic-scatter idiom `radix_sort.rs`'s
//! histogram build uses, adapted from counting buckets to emitting
//! geometry.

use super::FrameInputs;
use crate::config::ContourConfig;
use crate::error::Result;
use crate::gpu::GpuContext;
use wgpu::util::DeviceExt;

/// Fixed sampling grid independent of screen resolution; keeps the line
/// buffer's worst-case size bounded regardless of viewport size.
const GRID: u32 = 128;
const MAX_LINE_VERTICES: u32 = (GRID - 1) * (GRID - 1) * 4;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct ContourParams {
    grid: u32,
    threshold_count: u32,
    thresholds: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct DrawIndirectArgs {
    vertex_count: u32,
    instance_count: u32,
    first_vertex: u32,
    first_instance: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct LineParams {
    color: [f32; 4],
}

pub struct ContourPass {
    sampler: wgpu::Sampler,
    build_pipeline: wgpu::ComputePipeline,
    build_layout: wgpu::BindGroupLayout,
    params: wgpu::Buffer,
    indirect: wgpu::Buffer,
    line_vertices: wgpu::Buffer,

    draw_pipeline: wgpu::RenderPipeline,
    draw_layout: wgpu::BindGroupLayout,
    line_params: wgpu::Buffer,
}

impl ContourPass {
    pub fn new(ctx: &GpuContext, target_format: wgpu::TextureFormat) -> Result<Self> {
        let sampler = ctx.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("contour-sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let build_source = include_str!("../../shaders/contour_build.wgsl");
        let build_module = ctx.create_shader("contour-build", build_source);
        let build_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("contour-build-layout"),
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
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
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
                    ty: wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Storage { read_only: false }, has_dynamic_offset: false, min_binding_size: None },
                    count: None,
                },
            ],
        });
        let build_pipeline_layout = ctx.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("contour-build-pipeline-layout"),
            bind_group_layouts: &[&build_layout],
            push_constant_ranges: &[],
        });
        let build_pipeline = ctx.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("contour-build-pipeline"),
            layout: Some(&build_pipeline_layout),
            module: &build_module,
            entry_point: Some("contour_main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let params = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("contour-params"),
            contents: bytemuck::bytes_of(&ContourParams { grid: GRID, threshold_count: 1, thresholds: [0.5, 0.0, 0.0, 0.0] }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let indirect = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("contour-indirect-args"),
            size: std::mem::size_of::<DrawIndirectArgs>() as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::INDIRECT | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let line_vertices = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("contour-line-vertices"),
            size: (MAX_LINE_VERTICES as u64) * (std::mem::size_of::<[f32; 2]>() as u64),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::VERTEX,
            mapped_at_creation: false,
        });

        let draw_source = include_str!("../../shaders/contour_draw.wgsl");
        let draw_module = ctx.create_shader("contour-draw", draw_source);
        let draw_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("contour-draw-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Uniform, has_dynamic_offset: false, min_binding_size: None },
                count: None,
            }],
        });
        let draw_pipeline_layout = ctx.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("contour-draw-pipeline-layout"),
            bind_group_layouts: &[&draw_layout],
            push_constant_ranges: &[],
        });
        let draw_pipeline = ctx.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("contour-draw-pipeline"),
            layout: Some(&draw_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &draw_module,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<[f32; 2]>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x2],
                }],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &draw_module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState { topology: wgpu::PrimitiveTopology::LineList, ..Default::default() },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        let line_params = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("contour-line-params"),
            contents: bytemuck::bytes_of(&LineParams { color: [1.0, 1.0, 1.0, 1.0] }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        Ok(Self {
            sampler,
            build_pipeline,
            build_layout,
            params,
            indirect,
            line_vertices,
            draw_pipeline,
            draw_layout,
            line_params,
        })
    }

    pub fn render(
        &self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        input: &FrameInputs,
        config: &ContourConfig,
        density_view: &wgpu::TextureView,
    ) {
        let mut thresholds = config.thresholds;
        let count = config.threshold_count.min(4).max(1);
        for t in thresholds.iter_mut().skip(count as usize) {
            *t = f32::MAX;
        }
        ctx.queue.write_buffer(&self.params, 0, bytemuck::bytes_of(&ContourParams { grid: GRID, threshold_count: count as u32, thresholds }));
        ctx.queue.write_buffer(
            &self.indirect,
            0,
            bytemuck::bytes_of(&DrawIndirectArgs { vertex_count: 0, instance_count: 1, first_vertex: 0, first_instance: 0 }),
        );
        ctx.queue.write_buffer(&self.line_params, 0, bytemuck::bytes_of(&LineParams { color: config.stroke_color }));

        let build_bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("contour-build-bind-group"),
            layout: &self.build_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: self.params.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(density_view) },
                wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::Sampler(&self.sampler) },
                wgpu::BindGroupEntry { binding: 3, resource: self.indirect.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 4, resource: self.line_vertices.as_entire_binding() },
            ],
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor { label: Some("contour-build"), timestamp_writes: None });
            pass.set_pipeline(&self.build_pipeline);
            pass.set_bind_group(0, &build_bind_group, &[]);
            let cells = GRID - 1;
            pass.dispatch_workgroups(cells.div_ceil(16), cells.div_ceil(16), 1);
        }

        let draw_bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("contour-draw-bind-group"),
            layout: &self.draw_layout,
            entries: &[wgpu::BindGroupEntry { binding: 0, resource: self.line_params.as_entire_binding() }],
        });
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("contour-draw"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: input.target,
                resolve_target: None,
                ops: wgpu::Operations { load: wgpu::LoadOp::Load, store: wgpu::StoreOp::Store },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.draw_pipeline);
        pass.set_bind_group(0, &draw_bind_group, &[]);
        pass.set_vertex_buffer(0, self.line_vertices.slice(..));
        pass.draw_indirect(&self.indirect, 0);
    }
}
