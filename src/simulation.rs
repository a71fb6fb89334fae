//! Simulation driver: per-tick pass schedule, α annealing, pinned-node
//! handling, and the coupling between graph mutations and GPU buffer
//! layout.
//!
//! One encoder per tick, several compute passes recorded back to back
//! into a single `queue.submit`, ordered
//! spring→algorithm-prelude→repulsion→gravity→integrate→swap.

use crate::algorithm::{Algorithm, AlgorithmId, RenderContext};
use crate::buffers::{PingPong, TypedBuffer};
use crate::config::ForceConfig;
use crate::error::{Error, Result};
use crate::events::{Event, EventBus};
use crate::gpu::GpuContext;
use crate::graph::Graph;
use crate::ids::NodeIndex;
use wgpu::util::DeviceExt;

const FORCE_SCALE_Q: f32 = 1024.0;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct SpringParams {
    row_count: u32,
    spring_stiffness: f32,
    ideal_edge_length: f32,
    force_scale_q: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct GravityParams {
    row_count: u32,
    gravity: f32,
    force_scale_q: f32,
    _pad: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct IntegrateParams {
    row_count: u32,
    pinned_row: u32,
    damping: f32,
    max_velocity: f32,
    dt: f32,
    alpha: f32,
    force_scale_q: f32,
    _pad: u32,
}

/// Per-tick timing breakdown.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickReport {
    pub alpha: f32,
    pub ended: bool,
    pub csr_rebuild: Option<std::time::Duration>,
    pub dispatch: std::time::Duration,
}

struct PassSet {
    spring_pipeline: wgpu::ComputePipeline,
    spring_layout: wgpu::BindGroupLayout,
    spring_params: wgpu::Buffer,
    gravity_pipeline: wgpu::ComputePipeline,
    gravity_layout: wgpu::BindGroupLayout,
    gravity_params: wgpu::Buffer,
    integrate_pipeline: wgpu::ComputePipeline,
    integrate_layout: wgpu::BindGroupLayout,
    integrate_params: wgpu::Buffer,
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn build_passes(ctx: &GpuContext) -> PassSet {
    let make_pipeline = |label: &str, source: &str, entry: &str, layout: &wgpu::BindGroupLayout| {
        let module = ctx.create_shader(label, source);
        let pipeline_layout = ctx.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[layout],
            push_constant_ranges: &[],
        });
        ctx.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some(entry),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        })
    };

    let spring_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("spring-layout"),
        entries: &[
            uniform_entry(0),
            storage_entry(1, true),
            storage_entry(2, true),
            storage_entry(3, true),
            storage_entry(4, false),
            storage_entry(5, true),
        ],
    });
    let spring_pipeline = make_pipeline(
        "spring-pipeline",
        include_str!("../shaders/simulation_spring.wgsl"),
        "spring_main",
        &spring_layout,
    );
    let spring_params = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("spring-params"),
        contents: bytemuck::bytes_of(&SpringParams {
            row_count: 0,
            spring_stiffness: 0.0,
            ideal_edge_length: 0.0,
            force_scale_q: FORCE_SCALE_Q,
        }),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    });

    let gravity_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("gravity-layout"),
        entries: &[
            uniform_entry(0),
            storage_entry(1, true),
            storage_entry(2, false),
            storage_entry(3, true),
        ],
    });
    let gravity_pipeline = make_pipeline(
        "gravity-pipeline",
        include_str!("../shaders/simulation_gravity.wgsl"),
        "gravity_main",
        &gravity_layout,
    );
    let gravity_params = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("gravity-params"),
        contents: bytemuck::bytes_of(&GravityParams {
            row_count: 0,
            gravity: 0.0,
            force_scale_q: FORCE_SCALE_Q,
            _pad: 0,
        }),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    });

    let integrate_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("integrate-layout"),
        entries: &[
            uniform_entry(0),
            storage_entry(1, true),
            storage_entry(2, false),
            storage_entry(3, false),
            storage_entry(4, false),
            storage_entry(5, true),
        ],
    });
    let integrate_pipeline = make_pipeline(
        "integrate-pipeline",
        include_str!("../shaders/simulation_integrate.wgsl"),
        "integrate_main",
        &integrate_layout,
    );
    let integrate_params = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("integrate-params"),
        contents: bytemuck::bytes_of(&IntegrateParams {
            row_count: 0,
            pinned_row: u32::MAX,
            damping: 0.0,
            max_velocity: 0.0,
            dt: 0.0,
            alpha: 0.0,
            force_scale_q: FORCE_SCALE_Q,
            _pad: 0,
        }),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    });

    PassSet {
        spring_pipeline,
        spring_layout,
        spring_params,
        gravity_pipeline,
        gravity_layout,
        gravity_params,
        integrate_pipeline,
        integrate_layout,
        integrate_params,
    }
}

pub struct Simulation {
    passes: PassSet,
    positions: PingPong<f32>,
    velocities: TypedBuffer<f32>,
    forces: TypedBuffer<i32>,
    liveness: TypedBuffer<u32>,
    csr_offsets: TypedBuffer<u32>,
    csr_targets: TypedBuffer<u32>,
    capacity: usize,
    capacity_floor: usize,
    algorithms: Vec<Box<dyn Algorithm>>,
    current: usize,
    running: bool,
    alpha: f32,
    force_config: ForceConfig,
    pinned: Option<NodeIndex>,
    bounds_min: [f32; 2],
    bounds_max: [f32; 2],
}

impl Simulation {
    /// Only `algorithms[0]` gets its GPU buffers allocated here — exactly
    /// one algorithm holds live buffers at a time, so the rest stay in
    /// their zero-allocated `Default` state until swapped in.
    pub fn new(ctx: &GpuContext, capacity_floor: usize, mut algorithms: Vec<Box<dyn Algorithm>>) -> Result<Self> {
        let capacity = capacity_floor.max(1);
        algorithms[0].create_buffers(ctx, capacity)?;
        Ok(Self {
            passes: build_passes(ctx),
            positions: PingPong::new(ctx, "sim-positions", capacity * 2, wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC),
            velocities: TypedBuffer::new(ctx, "sim-velocities", capacity * 2, wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST),
            forces: TypedBuffer::new(ctx, "sim-forces", capacity * 2, wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST),
            liveness: TypedBuffer::new(ctx, "sim-liveness", capacity, wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST),
            csr_offsets: TypedBuffer::new(ctx, "sim-csr-offsets", 1, wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST),
            csr_targets: TypedBuffer::new(ctx, "sim-csr-targets", 1, wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST),
            capacity,
            capacity_floor,
            algorithms,
            current: 0,
            running: false,
            alpha: 1.0,
            force_config: ForceConfig::default(),
            pinned: None,
            bounds_min: [-1.0, -1.0],
            bounds_max: [1.0, 1.0],
        })
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn restart(&mut self) {
        self.alpha = 1.0;
        self.running = true;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn set_force_config(&mut self, config: ForceConfig) {
        self.force_config = config;
    }

    pub fn force_config(&self) -> ForceConfig {
        self.force_config
    }

    pub fn set_pinned(&mut self, idx: Option<NodeIndex>) {
        self.pinned = idx;
    }

    /// Atomically swap the repulsion kernel: release the old algorithm's
    /// buffers before allocating the new ones.
    pub fn set_algorithm(&mut self, ctx: &GpuContext, id: AlgorithmId) -> Result<()> {
        let Some(index) = self.algorithms.iter().position(|a| a.info().id == id) else {
            return Err(Error::NotReady("unknown algorithm id"));
        };
        if index == self.current {
            return Ok(());
        }
        self.algorithms[self.current].destroy();
        match self.algorithms[index].create_buffers(ctx, self.capacity) {
            Ok(()) => {
                self.current = index;
                Ok(())
            }
            Err(e) => {
                // Revert: re-allocate the previous algorithm's buffers so
                // the driver is left in a runnable state instead of with no
                // algorithm at all.
                let _ = self.algorithms[self.current].create_buffers(ctx, self.capacity);
                Err(e)
            }
        }
    }

    pub fn current_algorithm_id(&self) -> AlgorithmId {
        self.algorithms[self.current].info().id
    }

    /// Grow the position/velocity/force buffers (and the live algorithm's
    /// own buffers) to cover `row_capacity`. `tick()` calls this itself
    /// every frame; the façade also calls it right after `load`/`addNodes`
    /// so a `render()` before the first `tick()` still has valid buffers.
    pub fn ensure_capacity(&mut self, ctx: &GpuContext, row_capacity: usize) {
        if row_capacity <= self.capacity {
            return;
        }
        let target = row_capacity.max(self.capacity_floor);
        self.positions.grow(ctx, target * 2, self.capacity_floor * 2);
        self.velocities.grow(ctx, target * 2, self.capacity_floor * 2);
        self.forces.grow(ctx, target * 2, self.capacity_floor * 2);
        self.liveness.grow(ctx, target, self.capacity_floor);
        self.capacity = target;
        // Only the live algorithm holds buffers; resize those in place.
        let _ = self.algorithms[self.current].create_buffers(ctx, target);
    }

    /// Scatter-write one node's position/velocity/force-reset into both
    /// ping-pong halves. Used after `load`/`addNodes` to seed rows the bulk
    /// growth copy doesn't cover (brand new rows start undefined, not the
    /// node's actual placement).
    pub fn seed_node(&mut self, ctx: &GpuContext, row: u32, pos: [f32; 2]) {
        let offset = (row as u64) * 8;
        ctx.queue.write_buffer(self.positions.read(), offset, bytemuck::bytes_of(&pos));
        ctx.queue.write_buffer(self.positions.write(), offset, bytemuck::bytes_of(&pos));
        ctx.queue.write_buffer(&self.velocities.buffer, offset, bytemuck::bytes_of(&[0.0f32, 0.0]));
        ctx.queue.write_buffer(&self.forces.buffer, (row as u64) * 8, bytemuck::bytes_of(&[0i32, 0]));
        self.positions.mark_populated(row as usize * 2 + 2);
        self.velocities.mark_populated(row as usize * 2 + 2);
        self.forces.mark_populated(row as usize * 2 + 2);
    }

    /// Re-seed every current node's position (used right after a full
    /// `load()` replaces the graph, or after a host-driven bulk position
    /// overwrite).
    pub fn reseed_all(&mut self, ctx: &GpuContext, graph: &Graph) {
        for (idx, node) in graph.nodes() {
            let row = Graph::row_of(idx);
            self.seed_node(ctx, row, node.pos);
        }
    }

    fn sync_csr(&mut self, ctx: &GpuContext, graph: &mut Graph) -> Option<std::time::Duration> {
        let elapsed = graph.rebuild_csr_if_dirty();
        let csr = graph.csr();
        if self.csr_offsets.capacity() < csr.offsets.len() {
            self.csr_offsets = TypedBuffer::new(
                ctx,
                "sim-csr-offsets",
                csr.offsets.len().next_power_of_two(),
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            );
        }
        if self.csr_targets.capacity() < csr.targets.len().max(1) {
            self.csr_targets = TypedBuffer::new(
                ctx,
                "sim-csr-targets",
                csr.targets.len().max(1).next_power_of_two(),
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            );
        }
        let _ = self.csr_offsets.write(ctx, &csr.offsets);
        let _ = self.csr_targets.write(ctx, &csr.targets);
        elapsed
    }

    /// Rebuild the row liveness mask: 1 for a row holding a live node, 0 for
    /// the reserved slot-0 row and any recycled gap. Every kernel that reads
    /// another row's position directly — not through the CSR, which already
    /// only lists live targets — depends on this to avoid treating a gap row
    /// as a phantom particle at the origin.
    fn sync_liveness(&mut self, ctx: &GpuContext, graph: &Graph, row_capacity: usize) {
        let mut mask = vec![0u32; row_capacity];
        for (idx, _) in graph.nodes() {
            mask[Graph::row_of(idx) as usize] = 1;
        }
        if self.liveness.capacity() < row_capacity {
            self.liveness = TypedBuffer::new(
                ctx,
                "sim-liveness",
                row_capacity.next_power_of_two(),
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            );
        }
        let _ = self.liveness.write(ctx, &mask);
    }

    /// Advance the simulation by one tick. Never blocks on GPU readback;
    /// divergence is checked separately via [`Self::check_diverged`].
    pub fn tick(&mut self, ctx: &GpuContext, graph: &mut Graph, bus: &mut EventBus) -> Result<TickReport> {
        if !self.running {
            return Ok(TickReport {
                alpha: self.alpha,
                ended: true,
                csr_rebuild: None,
                dispatch: std::time::Duration::ZERO,
            });
        }

        let node_count = graph.node_count() as u32;
        let row_capacity = graph
            .csr()
            .offsets
            .len()
            .saturating_sub(1)
            .max(node_count as usize);
        self.ensure_capacity(ctx, row_capacity);
        let csr_rebuild = self.sync_csr(ctx, graph);
        self.sync_liveness(ctx, &*graph, row_capacity);
        let row_count = row_capacity as u32;

        let started = std::time::Instant::now();
        let caps = self.algorithms[self.current].capabilities();
        let pinned_row = self.pinned.map(Graph::row_of).unwrap_or(u32::MAX);

        let rc = RenderContext {
            positions: self.positions.read(),
            forces: &self.forces.buffer,
            node_count,
            row_count,
            liveness: &self.liveness.buffer,
            edge_count: graph.edge_count() as u32,
            force_config: &self.force_config,
            bounds_min: self.bounds_min,
            bounds_max: self.bounds_max,
            csr: graph.csr(),
        };
        self.algorithms[self.current].update_uniforms(ctx, &rc);

        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("simulation-tick"),
        });

        if !caps.handles_springs {
            ctx.queue.write_buffer(
                &self.passes.spring_params,
                0,
                bytemuck::bytes_of(&SpringParams {
                    row_count,
                    spring_stiffness: self.force_config.spring_stiffness,
                    ideal_edge_length: self.force_config.ideal_edge_length,
                    force_scale_q: FORCE_SCALE_Q,
                }),
            );
            let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("spring-bind-group"),
                layout: &self.passes.spring_layout,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: self.passes.spring_params.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 1, resource: self.positions.read().as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 2, resource: self.csr_offsets.buffer.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 3, resource: self.csr_targets.buffer.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 4, resource: self.forces.buffer.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 5, resource: self.liveness.buffer.as_entire_binding() },
                ],
            });
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("spring-pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.passes.spring_pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(row_count.div_ceil(256), 1, 1);
        }

        // Re-borrow rc for the algorithm's own prelude + repulsion pass; the
        // trait takes `&mut self` because Barnes-Hut advances its sort
        // ping-pong state here.
        self.algorithms[self.current].record_repulsion_pass(ctx, &mut encoder, &rc);

        if !caps.handles_gravity {
            ctx.queue.write_buffer(
                &self.passes.gravity_params,
                0,
                bytemuck::bytes_of(&GravityParams {
                    row_count,
                    gravity: self.force_config.gravity,
                    force_scale_q: FORCE_SCALE_Q,
                    _pad: 0,
                }),
            );
            let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("gravity-bind-group"),
                layout: &self.passes.gravity_layout,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: self.passes.gravity_params.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 1, resource: self.positions.read().as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 2, resource: self.forces.buffer.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 3, resource: self.liveness.buffer.as_entire_binding() },
                ],
            });
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("gravity-pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.passes.gravity_pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(row_count.div_ceil(256), 1, 1);
        }

        ctx.queue.write_buffer(
            &self.passes.integrate_params,
            0,
            bytemuck::bytes_of(&IntegrateParams {
                row_count,
                pinned_row,
                damping: self.force_config.damping,
                max_velocity: self.force_config.max_velocity,
                dt: self.force_config.dt,
                alpha: self.alpha,
                force_scale_q: FORCE_SCALE_Q,
                _pad: 0,
            }),
        );
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("integrate-bind-group"),
            layout: &self.passes.integrate_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: self.passes.integrate_params.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: self.positions.read().as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: self.positions.write().as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: self.velocities.buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 4, resource: self.forces.buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 5, resource: self.liveness.buffer.as_entire_binding() },
            ],
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("integrate-pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.passes.integrate_pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(row_count.div_ceil(256), 1, 1);
        }

        ctx.queue.submit(Some(encoder.finish()));
        self.positions.swap();
        graph.end_frame();

        self.alpha += (self.force_config.alpha_target - self.alpha) * self.force_config.alpha_decay;
        let mut ended = false;
        if self.alpha < self.force_config.alpha_min {
            self.running = false;
            ended = true;
            bus.emit(Event::SimulationEnd);
        }
        bus.emit(Event::SimulationTick { alpha: self.alpha });

        tracing::debug!(alpha = self.alpha, node_count, "tick");

        Ok(TickReport {
            alpha: self.alpha,
            ended,
            csr_rebuild,
            dispatch: started.elapsed(),
        })
    }

    /// On-demand NaN check, detected lazily by a validation pass rather
    /// than every tick. Blocks on a GPU→CPU readback; callers should not
    /// invoke this every tick on the hot path. Scans the full row range
    /// (not just the live node count) since a NaN can land on any row
    /// the integrate pass writes, and rows are slot indices, not a dense
    /// `0..node_count` range.
    pub fn check_diverged(&mut self, ctx: &GpuContext, bus: &mut EventBus) -> Result<bool> {
        let row_capacity = self.positions.capacity() / 2;
        let byte_len = (row_capacity * 2 * std::mem::size_of::<f32>()) as u64;
        if byte_len == 0 {
            return Ok(false);
        }
        let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("diverge-check-staging"),
            size: byte_len,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("diverge-check-copy"),
        });
        encoder.copy_buffer_to_buffer(self.positions.read(), 0, &staging, 0, byte_len);
        ctx.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        ctx.device.poll(wgpu::PollType::Wait).map_err(|e| Error::InitFailure(e.to_string()))?;
        rx.recv().map_err(|_| Error::InitFailure("map_async channel closed".into()))?
            .map_err(|e| Error::InitFailure(e.to_string()))?;

        let data = slice.get_mapped_range();
        let values: &[f32] = bytemuck::cast_slice(&data);
        let diverged = values.iter().any(|v| v.is_nan());
        drop(data);
        staging.unmap();

        if diverged {
            self.running = false;
            tracing::warn!("simulation:diverged");
            bus.emit(Event::SimulationDiverged);
            return Err(Error::SimulationDiverged);
        }
        Ok(false)
    }

    /// Maps the GPU position buffer back to the host and writes each live
    /// node's row into [`NodeData::pos`]. `integrate_main` is the only
    /// writer of the GPU buffer once the simulation is running, so this
    /// is the one place `NodeData.pos` gets refreshed after the seed
    /// value written by `insert_node`/`set_node_positions`. Blocks on a
    /// GPU→CPU readback; callers that don't need the CPU-side value
    /// (most renders sample the GPU buffer directly) can skip this.
    pub fn sync_positions(&mut self, ctx: &GpuContext, graph: &mut Graph) -> Result<()> {
        let row_capacity = self.positions.capacity() / 2;
        let byte_len = (row_capacity * 2 * std::mem::size_of::<f32>()) as u64;
        if byte_len == 0 {
            return Ok(());
        }
        let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("position-readback-staging"),
            size: byte_len,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("position-readback-copy"),
        });
        encoder.copy_buffer_to_buffer(self.positions.read(), 0, &staging, 0, byte_len);
        ctx.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        ctx.device.poll(wgpu::PollType::Wait).map_err(|e| Error::InitFailure(e.to_string()))?;
        rx.recv().map_err(|_| Error::InitFailure("map_async channel closed".into()))?
            .map_err(|e| Error::InitFailure(e.to_string()))?;

        let data = slice.get_mapped_range();
        let rows: &[[f32; 2]] = bytemuck::cast_slice(&data);
        for (idx, node) in graph.nodes_mut() {
            if let Some(&p) = rows.get(Graph::row_of(idx) as usize) {
                node.pos = p;
            }
        }
        drop(data);
        staging.unmap();
        Ok(())
    }

    pub fn position_buffer(&self) -> &wgpu::Buffer {
        self.positions.read()
    }

    /// One `u32` per row, 1 for a row holding a live node. Any render
    /// pass that samples `position_buffer()` by dense row index (rather
    /// than through the CSR or a per-node instance) needs this to skip
    /// the reserved slot-0 row and recycled gaps the same way the force
    /// kernels do.
    pub fn liveness_buffer(&self) -> &wgpu::Buffer {
        &self.liveness.buffer
    }

    /// Row bound a render pass should iterate up to when sampling
    /// `position_buffer()`/`liveness_buffer()` by dense row index; the
    /// value [`Self::sync_liveness`] last sized the mask to.
    pub fn row_count(&self) -> u32 {
        self.liveness.len() as u32
    }

    pub fn set_bounds(&mut self, min: [f32; 2], max: [f32; 2]) {
        self.bounds_min = min;
        self.bounds_max = max;
    }
}
