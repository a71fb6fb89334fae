//! Node disc instancing: filled disc with an optional ring border,
//! selection/hover highlight as shader uniforms.
//!
//! Instanced-quad draw where the vertex shader pulls each instance's
//! position out of a storage buffer rather than a vertex buffer.

use super::FrameInputs;
use crate::error::Result;
use crate::gpu::GpuContext;
use crate::graph::{Graph, NodeData};
use crate::ids::NodeIndex;
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct NodeInstance {
    pub row: u32,
    pub flags: u32,
    pub radius: f32,
    pub _pad: f32,
    pub color: [f32; 4],
}

const FLAG_SELECTED: u32 = 0b01;
const FLAG_HOVERED: u32 = 0b10;

pub struct NodePass {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    capacity: usize,
    instances: Vec<NodeInstance>,
}

impl NodePass {
    pub fn new(ctx: &GpuContext, target_format: wgpu::TextureFormat, max_nodes: usize) -> Result<Self> {
        let source = include_str!("../../shaders/nodes.wgsl");
        let module = ctx.create_shader("nodes", source);
        let layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("nodes-layout"),
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
            ],
        });
        let pipeline_layout = ctx.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("nodes-pipeline-layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = ctx.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("nodes-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<NodeInstance>() as u64,
                    step_mode: wgpu::VertexStepMode::Instance,
                    attributes: &wgpu::vertex_attr_array![0 => Uint32, 1 => Uint32, 2 => Float32, 3 => Float32x4],
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
        Ok(Self { pipeline, layout, capacity: max_nodes.max(1), instances: Vec::new() })
    }

    pub fn ensure_capacity(&mut self, _ctx: &GpuContext, max_nodes: usize) {
        self.capacity = self.capacity.max(max_nodes);
    }

    pub fn sync_instances(&mut self, _ctx: &GpuContext, graph: &Graph, hovered: Option<NodeIndex>) {
        self.instances.clear();
        for (idx, node) in graph.nodes() {
            let mut flags = 0u32;
            if node.visibility_mask == 0 {
                continue;
            }
            if node.flags.contains(crate::graph::NodeFlags::PINNED) {
                flags |= FLAG_SELECTED;
            }
            if hovered == Some(idx) {
                flags |= FLAG_HOVERED;
            }
            self.instances.push(NodeInstance {
                row: Graph::row_of(idx),
                flags,
                radius: node.radius,
                _pad: 0.0,
                color: node.color,
            });
        }
    }

    pub fn render(
        &self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        input: &FrameInputs,
        viewport: &wgpu::Buffer,
        filter: Option<&(dyn Fn(&NodeData) -> bool + Send + Sync)>,
    ) {
        let instances: Vec<NodeInstance> = if let Some(filter) = filter {
            input
                .graph
                .nodes()
                .filter(|(_, n)| filter(n))
                .map(|(idx, n)| NodeInstance { row: Graph::row_of(idx), flags: 0, radius: n.radius, _pad: 0.0, color: n.color })
                .collect()
        } else {
            self.instances.clone()
        };
        if instances.is_empty() {
            return;
        }

        let instance_buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("node-instances"),
            contents: bytemuck::cast_slice(&instances),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("nodes-bind-group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: viewport.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: input.positions.as_entire_binding() },
            ],
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("nodes-render"),
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
        pass.draw(0..6, 0..instances.len() as u32);
    }
}
