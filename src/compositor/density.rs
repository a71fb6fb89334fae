//! Density accumulator + heatmap colourisation.
//!
//! Additive-blend splat draw: `BlendState` with
//! `BlendComponent { src_factor: One, dst_factor: One, operation: Add }`,
//! accumulating Gaussian-splat density into an offscreen `R32Float`
//! target rather than an RGBA colour target.

use super::FrameInputs;
use crate::config::{ColorScaleName, HeatmapConfig};
use crate::error::Result;
use crate::gpu::GpuContext;
use crate::graph::Graph;
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct SplatInstance {
    row: u32,
    value: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct SplatParams {
    screen_size: [f32; 2],
    kernel_radius: f32,
    intensity: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct HeatmapParams {
    opacity: f32,
    scale_id: u32,
    _pad: [f32; 2],
}

pub struct DensityPass {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,

    splat_pipeline: wgpu::RenderPipeline,
    splat_layout: wgpu::BindGroupLayout,
    splat_params: wgpu::Buffer,
    instances: Vec<SplatInstance>,

    colorize_pipeline: wgpu::RenderPipeline,
    colorize_layout: wgpu::BindGroupLayout,
    heatmap_params: wgpu::Buffer,
}

fn make_density_texture(ctx: &GpuContext, width: u32, height: u32) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("density-accumulator"),
        size: wgpu::Extent3d { width: width.max(1), height: height.max(1), depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::R32Float,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

impl DensityPass {
    pub fn new(ctx: &GpuContext, target_format: wgpu::TextureFormat) -> Result<Self> {
        let (texture, view) = make_density_texture(ctx, 1, 1);
        let sampler = ctx.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("density-sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let splat_source = include_str!("../../shaders/density_splat.wgsl");
        let splat_module = ctx.create_shader("density-splat", splat_source);
        let splat_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("density-splat-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });
        let splat_pipeline_layout = ctx.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("density-splat-pipeline-layout"),
            bind_group_layouts: &[&splat_layout],
            push_constant_ranges: &[],
        });
        let splat_pipeline = ctx.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("density-splat-pipeline"),
            layout: Some(&splat_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &splat_module,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<SplatInstance>() as u64,
                    step_mode: wgpu::VertexStepMode::Instance,
                    attributes: &wgpu::vertex_attr_array![0 => Uint32, 1 => Float32],
                }],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &splat_module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: wgpu::TextureFormat::R32Float,
                    blend: Some(wgpu::BlendState {
                        color: wgpu::BlendComponent {
                            src_factor: wgpu::BlendFactor::One,
                            dst_factor: wgpu::BlendFactor::One,
                            operation: wgpu::BlendOperation::Add,
                        },
                        alpha: wgpu::BlendComponent::REPLACE,
                    }),
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
        let splat_params = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("density-splat-params"),
            contents: bytemuck::bytes_of(&SplatParams { screen_size: [1.0, 1.0], kernel_radius: 40.0, intensity: 1.0 }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let colorize_source = include_str!("../../shaders/density_heatmap.wgsl");
        let colorize_module = ctx.create_shader("density-heatmap", colorize_source);
        let colorize_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("density-heatmap-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let colorize_pipeline_layout = ctx.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("density-heatmap-pipeline-layout"),
            bind_group_layouts: &[&colorize_layout],
            push_constant_ranges: &[],
        });
        let colorize_pipeline = ctx.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("density-heatmap-pipeline"),
            layout: Some(&colorize_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &colorize_module,
                entry_point: Some("vs_fullscreen"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &colorize_module,
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
        let heatmap_params = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("density-heatmap-params"),
            contents: bytemuck::bytes_of(&HeatmapParams { opacity: 0.8, scale_id: 0, _pad: [0.0; 2] }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        Ok(Self {
            texture,
            view,
            sampler,
            splat_pipeline,
            splat_layout,
            splat_params,
            instances: Vec::new(),
            colorize_pipeline,
            colorize_layout,
            heatmap_params,
        })
    }

    pub fn texture_view(&self) -> &wgpu::TextureView {
        &self.view
    }

    fn ensure_texture_size(&mut self, ctx: &GpuContext, width: u32, height: u32) {
        if self.texture.size().width == width && self.texture.size().height == height {
            return;
        }
        let (texture, view) = make_density_texture(ctx, width, height);
        self.texture = texture;
        self.view = view;
    }

    fn collect_instances(&mut self, graph: &Graph, source: Option<&str>, value_streams: &crate::value_stream::ValueStreamRegistry) {
        self.instances.clear();
        for (idx, _node) in graph.nodes() {
            let value = source
                .and_then(|name| value_streams.get(name))
                .and_then(|s| s.get(idx))
                .unwrap_or(1.0);
            self.instances.push(SplatInstance { row: Graph::row_of(idx), value });
        }
    }

    pub fn accumulate(
        &mut self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        input: &FrameInputs,
        source: Option<&str>,
        viewport: &wgpu::Buffer,
    ) {
        self.ensure_texture_size(ctx, input.width, input.height);
        self.collect_instances(input.graph, source, input.value_streams);
        if self.instances.is_empty() {
            return;
        }

        ctx.queue.write_buffer(
            &self.splat_params,
            0,
            bytemuck::bytes_of(&SplatParams {
                screen_size: [input.width as f32, input.height as f32],
                kernel_radius: 40.0,
                intensity: 1.0,
            }),
        );
        let instance_buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("density-splat-instances"),
            contents: bytemuck::cast_slice(&self.instances),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("density-splat-bind-group"),
            layout: &self.splat_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: self.splat_params.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: viewport.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: input.positions.as_entire_binding() },
            ],
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("density-accumulate"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.view,
                resolve_target: None,
                ops: wgpu::Operations { load: wgpu::LoadOp::Clear(wgpu::Color::BLACK), store: wgpu::StoreOp::Store },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.splat_pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.set_vertex_buffer(0, instance_buffer.slice(..));
        pass.draw(0..6, 0..self.instances.len() as u32);
    }

    pub fn colorize(&self, ctx: &GpuContext, encoder: &mut wgpu::CommandEncoder, input: &FrameInputs, config: &HeatmapConfig) {
        let scale_id: u32 = match config.scale_name {
            ColorScaleName::Viridis => 0,
            ColorScaleName::Plasma => 1,
            ColorScaleName::Magma => 2,
        };
        ctx.queue.write_buffer(
            &self.heatmap_params,
            0,
            bytemuck::bytes_of(&HeatmapParams { opacity: config.opacity, scale_id, _pad: [0.0; 2] }),
        );
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("density-heatmap-bind-group"),
            layout: &self.colorize_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: self.heatmap_params.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(&self.view) },
                wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::Sampler(&self.sampler) },
            ],
        });
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("density-colorize"),
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
        pass.set_pipeline(&self.colorize_pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}
