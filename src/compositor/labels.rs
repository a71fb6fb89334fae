//! Screen-space label layout and MSDF-text draw.
//!
//! The ranking/culling pass is pure CPU bookkeeping; its coarse-grid
//! occupancy test is grounded on `spatial/morton.rs`'s quantise-into-cells
//! idiom, generalized from a single Morton key to an occupancy
//! `HashSet<(i32, i32)>`. The draw side reuses the instanced-quad-from-
//! storage-lookup shape of `nodes.rs`; the texture-upload/sampling path
//! is a plain upload-bytes-then-`textureSample`-in-the-fragment-stage
//! blit.
//!
//! The engine does not bundle a font: per `DESIGN.md`, the host supplies a
//! pre-baked MSDF atlas (bytes + per-glyph UV/metrics) via [`LabelPass::set_atlas`]
//! at `enableLabels` time. Before that call the layer is a no-op — nothing
//! to rasterize yet, same as an unbound value stream.

use super::FrameInputs;
use crate::config::{LabelsConfig, TypeStyle};
use crate::error::Result;
use crate::gpu::GpuContext;
use crate::graph::{Graph, NodeData};
use crate::ids::NodeIndex;
use std::collections::{HashMap, HashSet};
use wgpu::util::DeviceExt;

/// One label candidate before culling.
pub struct LabelLayoutInput {
    pub node_row: u32,
    pub text: String,
    pub priority: f32,
    pub screen_pos: [f32; 2],
}

/// A label that survived ranking and collision culling, ready to draw.
#[derive(Debug, Clone)]
pub struct PlacedLabel {
    pub node_row: u32,
    pub text: String,
    pub screen_pos: [f32; 2],
    pub half_extent: [f32; 2],
}

/// UV rect plus layout metrics for one glyph within the atlas texture.
#[derive(Debug, Clone, Copy)]
pub struct GlyphMetrics {
    pub uv_min: [f32; 2],
    pub uv_max: [f32; 2],
    /// Glyph quad size, in multiples of the configured font size.
    pub size: [f32; 2],
    /// Horizontal advance to the next glyph, in multiples of font size.
    pub advance: f32,
}

fn aabb_half_extent(text: &str, style: &TypeStyle) -> [f32; 2] {
    let advance = style.font_size_px * 0.55;
    [(text.chars().count().max(1) as f32 * advance) * 0.5, style.font_size_px * 0.6]
}

/// Ranks by descending priority, walks the list once, and rejects any
/// candidate whose AABB overlaps a previously accepted label's footprint
/// on a `cell_px`-wide grid (spec: "coarse grid", not exact AABB tests).
pub fn rank_and_cull(mut candidates: Vec<LabelLayoutInput>, style: &TypeStyle, cell_px: f32, max_labels: usize) -> Vec<PlacedLabel> {
    candidates.sort_by(|a, b| b.priority.total_cmp(&a.priority));
    let mut occupied: HashSet<(i32, i32)> = HashSet::new();
    let mut placed = Vec::new();

    for candidate in candidates {
        if placed.len() >= max_labels {
            break;
        }
        let half = aabb_half_extent(&candidate.text, style);
        let min_cell = (
            ((candidate.screen_pos[0] - half[0]) / cell_px).floor() as i32,
            ((candidate.screen_pos[1] - half[1]) / cell_px).floor() as i32,
        );
        let max_cell = (
            ((candidate.screen_pos[0] + half[0]) / cell_px).floor() as i32,
            ((candidate.screen_pos[1] + half[1]) / cell_px).floor() as i32,
        );
        let mut blocked = false;
        for cx in min_cell.0..=max_cell.0 {
            for cy in min_cell.1..=max_cell.1 {
                if occupied.contains(&(cx, cy)) {
                    blocked = true;
                }
            }
        }
        if blocked {
            continue;
        }
        for cx in min_cell.0..=max_cell.0 {
            for cy in min_cell.1..=max_cell.1 {
                occupied.insert((cx, cy));
            }
        }
        placed.push(PlacedLabel { node_row: candidate.node_row, text: candidate.text, screen_pos: candidate.screen_pos, half_extent: half });
    }
    placed
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct GlyphInstance {
    center: [f32; 2],
    half_extent: [f32; 2],
    uv_min: [f32; 2],
    uv_max: [f32; 2],
    color: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct LabelParams {
    screen_size: [f32; 2],
    _pad: [f32; 2],
}

struct LabelAtlas {
    _texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    glyphs: HashMap<char, GlyphMetrics>,
}

pub struct LabelPass {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    params: wgpu::Buffer,
    atlas: Option<LabelAtlas>,
    texts: HashMap<NodeIndex, String>,
}

impl LabelPass {
    pub fn new(ctx: &GpuContext, target_format: wgpu::TextureFormat) -> Result<Self> {
        let source = include_str!("../../shaders/labels.wgsl");
        let module = ctx.create_shader("labels", source);

        let params = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("label-params"),
            contents: bytemuck::bytes_of(&LabelParams { screen_size: [0.0, 0.0], _pad: [0.0, 0.0] }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("labels-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Uniform, has_dynamic_offset: false, min_binding_size: None },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture { sample_type: wgpu::TextureSampleType::Float { filterable: true }, view_dimension: wgpu::TextureViewDimension::D2, multisampled: false },
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

        let pipeline_layout = ctx.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("labels-pipeline-layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = ctx.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("labels-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<GlyphInstance>() as u64,
                    step_mode: wgpu::VertexStepMode::Instance,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2, 2 => Float32x2, 3 => Float32x2, 4 => Float32x4],
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

        Ok(Self { pipeline, layout, params, atlas: None, texts: HashMap::new() })
    }

    /// Uploads a host-supplied MSDF atlas (RGB8, `width*height*3` bytes) and
    /// its glyph table. Replaces any previously bound atlas.
    pub fn set_atlas(&mut self, ctx: &GpuContext, rgb: &[u8], width: u32, height: u32, glyphs: HashMap<char, GlyphMetrics>) {
        let size = wgpu::Extent3d { width, height, depth_or_array_layers: 1 };
        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("label-atlas"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let rgba: Vec<u8> = rgb.chunks(3).flat_map(|px| [px[0], px[1], px[2], 255]).collect();
        ctx.queue.write_texture(
            wgpu::TexelCopyTextureInfo { texture: &texture, mip_level: 0, origin: wgpu::Origin3d::ZERO, aspect: wgpu::TextureAspect::All },
            &rgba,
            wgpu::TexelCopyBufferLayout { offset: 0, bytes_per_row: Some(width * 4), rows_per_image: Some(height) },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = ctx.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("label-atlas-sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("labels-bind-group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: self.params.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(&view) },
                wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::Sampler(&sampler) },
            ],
        });
        self.atlas = Some(LabelAtlas { _texture: texture, bind_group, glyphs });
    }

    pub fn set_labels(&mut self, labels: HashMap<NodeIndex, String>) {
        self.texts = labels;
    }

    pub fn set_label(&mut self, node: NodeIndex, text: Option<String>) {
        match text {
            Some(t) => {
                self.texts.insert(node, t);
            }
            None => {
                self.texts.remove(&node);
            }
        }
    }

    fn screen_pos(node: &NodeData, viewport: &crate::viewport::ViewportUniforms) -> [f32; 2] {
        let clip_x = viewport.transform_col0[0] * node.pos[0] + viewport.transform_col2[0];
        let clip_y = viewport.transform_col1[1] * node.pos[1] + viewport.transform_col2[1];
        [
            (clip_x + 1.0) * 0.5 * viewport.screen_size[0],
            (1.0 - clip_y) * 0.5 * viewport.screen_size[1],
        ]
    }

    #[allow(clippy::too_many_arguments)]
    pub fn render(
        &self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        input: &FrameInputs,
        config: &LabelsConfig,
        _viewport: &wgpu::Buffer,
        filter: Option<&(dyn Fn(&NodeData) -> bool + Send + Sync)>,
    ) {
        let Some(atlas) = &self.atlas else { return };

        let mut candidates = Vec::new();
        for (idx, node) in input.graph.nodes() {
            if node.visibility_mask == 0 {
                continue;
            }
            let Some(text) = self.texts.get(&idx) else { continue };
            if let Some(filter) = filter {
                if !filter(node) {
                    continue;
                }
            }
            let screen = Self::screen_pos(node, input.viewport);
            let visible_size = (node.radius * input.viewport.scale).max(0.1);
            let importance = node.radius.max(0.1);
            candidates.push(LabelLayoutInput { node_row: Graph::row_of(idx), text: text.clone(), priority: importance / visible_size, screen_pos: screen });
        }
        let placed = rank_and_cull(candidates, &config.style, config.collision_grid_cell_px, config.max_labels);
        if placed.is_empty() {
            return;
        }

        ctx.queue.write_buffer(&self.params, 0, bytemuck::bytes_of(&LabelParams { screen_size: [input.width as f32, input.height as f32], _pad: [0.0, 0.0] }));

        let font_size = config.style.font_size_px;
        let mut instances = Vec::new();
        for label in &placed {
            let total_advance: f32 = label.text.chars().filter_map(|c| atlas.glyphs.get(&c)).map(|g| g.advance * font_size).sum();
            let mut cursor_x = label.screen_pos[0] - total_advance * 0.5;
            for c in label.text.chars() {
                let Some(glyph) = atlas.glyphs.get(&c) else { continue };
                let size = [glyph.size[0] * font_size, glyph.size[1] * font_size];
                let center = [cursor_x + size[0] * 0.5, label.screen_pos[1]];
                instances.push(GlyphInstance {
                    center,
                    half_extent: [size[0] * 0.5, size[1] * 0.5],
                    uv_min: glyph.uv_min,
                    uv_max: glyph.uv_max,
                    color: config.style.color,
                });
                cursor_x += glyph.advance * font_size;
            }
        }
        if instances.is_empty() {
            return;
        }

        let instance_buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("label-instances"),
            contents: bytemuck::cast_slice(&instances),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("labels-render"),
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
        pass.set_bind_group(0, &atlas.bind_group, &[]);
        pass.set_vertex_buffer(0, instance_buffer.slice(..));
        pass.draw(0..6, 0..instances.len() as u32);
    }
}
