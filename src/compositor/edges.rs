//! Edge instancing: straight or conic-Bézier, with dual-PWM flow
//! modulation.
//!
//! No vertex buffer beyond per-instance attributes; geometry is built
//! entirely in the vertex shader from `@builtin(vertex_index)`.

use super::FrameInputs;
use crate::config::{CurvedEdgesConfig, EdgeFlowConfig, PwmShape};
use crate::error::Result;
use crate::gpu::GpuContext;
use crate::graph::{EdgeData, Graph};
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct EdgeInstance {
    pub source_row: u32,
    pub target_row: u32,
    pub width: f32,
    pub curvature: f32,
    pub color: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct EdgeParams {
    time: f32,
    flow_enabled: u32,
    shape1: u32,
    speed1: f32,
    flow2_enabled: u32,
    shape2: u32,
    speed2: f32,
    fade2: f32,
    curve_weight: f32,
    _pad: [f32; 3],
}

fn shape_id(shape: PwmShape) -> u32 {
    match shape {
        PwmShape::Square => 0,
        PwmShape::Triangle => 1,
        PwmShape::Sine => 2,
    }
}

pub struct EdgePass {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    params: wgpu::Buffer,
    capacity: usize,
    instances: Vec<EdgeInstance>,
}

/// Quads stitched along the curve; more segments only matter when curved
/// edges are enabled — a straight edge (curvature 0) degenerates cleanly.
const SEGMENTS: u32 = 12;

impl EdgePass {
    pub fn new(ctx: &GpuContext, target_format: wgpu::TextureFormat, max_edges: usize) -> Result<Self> {
        let source = include_str!("../../shaders/edges.wgsl");
        let module = ctx.create_shader("edges", source);
        let layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("edges-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Uniform, has_dynamic_offset: false, min_binding_size: None },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Storage { read_only: true }, has_dynamic_offset: false, min_binding_size: None },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Uniform, has_dynamic_offset: false, min_binding_size: None },
                    count: None,
                },
            ],
        });
        let pipeline_layout = ctx.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("edges-pipeline-layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = ctx.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("edges-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<EdgeInstance>() as u64,
                    step_mode: wgpu::VertexStepMode::Instance,
                    attributes: &wgpu::vertex_attr_array![0 => Uint32, 1 => Uint32, 2 => Float32, 3 => Float32, 4 => Float32x4],
                }],
                compilation_options: Default::default(),
            },
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
            label: Some("edges-params"),
            contents: bytemuck::bytes_of(&EdgeParams::default()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        Ok(Self { pipeline, layout, params, capacity: max_edges.max(1), instances: Vec::new() })
    }

    pub fn ensure_capacity(&mut self, _ctx: &GpuContext, max_edges: usize) {
        self.capacity = self.capacity.max(max_edges);
    }

    fn to_instance(edge: &EdgeData, source_row: u32, target_row: u32) -> EdgeInstance {
        EdgeInstance { source_row, target_row, width: edge.width, curvature: edge.curvature, color: edge.color }
    }

    pub fn sync_instances(&mut self, _ctx: &GpuContext, graph: &Graph) {
        self.instances.clear();
        for (_, edge) in graph.edges() {
            self.instances.push(Self::to_instance(edge, Graph::row_of(edge.source), Graph::row_of(edge.target)));
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn render(
        &self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        input: &FrameInputs,
        flow: &EdgeFlowConfig,
        curved: &CurvedEdgesConfig,
        viewport: &wgpu::Buffer,
        filter: Option<&(dyn Fn(&EdgeData) -> bool + Send + Sync)>,
    ) {
        let instances: Vec<EdgeInstance> = if let Some(filter) = filter {
            input
                .graph
                .edges()
                .filter(|(_, e)| filter(e))
                .map(|(_, e)| Self::to_instance(e, Graph::row_of(e.source), Graph::row_of(e.target)))
                .collect()
        } else {
            self.instances.clone()
        };
        if instances.is_empty() {
            return;
        }

        let (shape1, speed1) = (shape_id(flow.layer1_shape), flow.layer1_speed);
        let (flow2_enabled, shape2, speed2, fade2) = match flow.layer2 {
            Some((shape, speed, fade)) => (1u32, shape_id(shape), speed, fade),
            None => (0, 0, 0.0, 0.0),
        };
        ctx.queue.write_buffer(
            &self.params,
            0,
            bytemuck::bytes_of(&EdgeParams {
                time: input.time_seconds,
                flow_enabled: flow.enabled as u32,
                shape1,
                speed1,
                flow2_enabled,
                shape2,
                speed2,
                fade2,
                curve_weight: if curved.enabled { curved.weight } else { 0.0 },
                _pad: [0.0; 3],
            }),
        );
        let instance_buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("edge-instances"),
            contents: bytemuck::cast_slice(&instances),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("edges-bind-group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: viewport.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: input.positions.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: self.params.as_entire_binding() },
            ],
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("edges-render"),
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
        pass.set_vertex_buffer(0, instance_buffer.slice(..));
        pass.draw(0..(SEGMENTS * 6), 0..instances.len() as u32);
    }
}
