//! Metaball SDF layer: quadratic smooth-min over node discs, shaded at
//! the configured iso-band.
//!
//! A per-pixel distance/threshold compare, generalized from a
//! single-sample cutoff to an accumulated smooth-min over every node disc.

use super::FrameInputs;
use crate::config::MetaballConfig;
use crate::error::Result;
use crate::gpu::GpuContext;
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct MetaballParams {
    screen_size: [f32; 2],
    smoothing: f32,
    iso_value: f32,
    fill_color: [f32; 4],
    opacity: f32,
    row_count: u32,
    _pad: [f32; 2],
}

pub struct MetaballPass {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    params: wgpu::Buffer,
}

impl MetaballPass {
    pub fn new(ctx: &GpuContext, target_format: wgpu::TextureFormat) -> Result<Self> {
        let source = include_str!("../../shaders/metaball.wgsl");
        let module = ctx.create_shader("metaball", source);
        let layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("metaball-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Uniform, has_dynamic_offset: false, min_binding_size: None },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Storage { read_only: true }, has_dynamic_offset: false, min_binding_size: None },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Uniform, has_dynamic_offset: false, min_binding_size: None },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Storage { read_only: true }, has_dynamic_offset: false, min_binding_size: None },
                    count: None,
                },
            ],
        });
        let pipeline_layout = ctx.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("metaball-pipeline-layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = ctx.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("metaball-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState { module: &module, entry_point: Some("vs_fullscreen"), buffers: &[], compilation_options: Default::default() },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        let params = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("metaball-params"),
            contents: bytemuck::bytes_of(&MetaballParams {
                screen_size: [1.0, 1.0],
                smoothing: 0.3,
                iso_value: 0.5,
                fill_color: [0.2, 0.6, 1.0, 1.0],
                opacity: 0.85,
                row_count: 0,
                _pad: [0.0; 2],
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        Ok(Self { pipeline, layout, params })
    }

    pub fn render(&self, ctx: &GpuContext, encoder: &mut wgpu::CommandEncoder, input: &FrameInputs, config: &MetaballConfig, viewport: &wgpu::Buffer) {
        ctx.queue.write_buffer(
            &self.params,
            0,
            bytemuck::bytes_of(&MetaballParams {
                screen_size: [input.width as f32, input.height as f32],
                smoothing: config.smoothing,
                iso_value: config.iso_value,
                fill_color: config.fill_color,
                opacity: config.opacity,
                row_count: input.row_count,
                _pad: [0.0; 2],
            }),
        );
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("metaball-bind-group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: self.params.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: input.positions.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: viewport.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: input.liveness.as_entire_binding() },
            ],
        });
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("metaball-render"),
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
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}
