//! Typed GPU buffer pool: ping-pong pairs and staging uniforms.
//!
//! Pre-sized storage buffers with a recorded element count, plus small
//! uniform buffers rewritten in place every frame rather than recreated.

use crate::error::{Error, Result};
use crate::gpu::GpuContext;
use std::marker::PhantomData;
use wgpu::util::DeviceExt;

/// A storage buffer typed by its element, with a recorded `max_capacity`.
/// Writes beyond capacity are a fatal error, never silently truncated.
pub struct TypedBuffer<T: bytemuck::Pod> {
    pub buffer: wgpu::Buffer,
    capacity: usize,
    len: usize,
    usage: wgpu::BufferUsages,
    label: String,
    _marker: PhantomData<T>,
}

impl<T: bytemuck::Pod> TypedBuffer<T> {
    pub fn new(ctx: &GpuContext, label: &str, capacity: usize, usage: wgpu::BufferUsages) -> Self {
        let size = (capacity.max(1) * std::mem::size_of::<T>()) as u64;
        let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        });
        Self {
            buffer,
            capacity,
            len: 0,
            usage,
            label: label.to_string(),
            _marker: PhantomData,
        }
    }

    pub fn with_data(ctx: &GpuContext, label: &str, data: &[T], usage: wgpu::BufferUsages) -> Self {
        let buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(data),
            usage,
        });
        Self {
            buffer,
            capacity: data.len(),
            len: data.len(),
            usage,
            label: label.to_string(),
            _marker: PhantomData,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Record that `len` elements are meaningfully populated without
    /// writing them — for callers that scatter-write individual rows
    /// directly via `ctx.queue.write_buffer` (e.g. seeding one new node's
    /// position) rather than through [`Self::write`]. Ensures a later
    /// [`Self::grow`] still copies those rows forward.
    pub fn mark_populated(&mut self, len: usize) {
        self.len = self.len.max(len.min(self.capacity));
    }

    /// Write `data` at element offset `0`. Errors (never truncates) if
    /// `data` would overflow the recorded capacity.
    pub fn write(&mut self, ctx: &GpuContext, data: &[T]) -> Result<()> {
        if data.len() > self.capacity {
            return Err(Error::CapacityExceeded {
                buffer: self.label.clone(),
                requested: data.len(),
                capacity: self.capacity,
            });
        }
        ctx.queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(data));
        self.len = data.len();
        Ok(())
    }

    /// Grow to `next_power_of_two(max(new_capacity, floor))`, copying old
    /// contents via a GPU-side copy. Returns the new capacity.
    pub fn grow(&mut self, ctx: &GpuContext, new_capacity: usize, floor: usize) -> usize {
        let target = new_capacity.max(floor).next_power_of_two();
        if target <= self.capacity {
            return self.capacity;
        }
        let new_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&self.label),
            size: (target * std::mem::size_of::<T>()) as u64,
            usage: self.usage,
            mapped_at_creation: false,
        });
        if self.len > 0 {
            let mut encoder = ctx
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("buffer-grow-copy"),
                });
            encoder.copy_buffer_to_buffer(
                &self.buffer,
                0,
                &new_buffer,
                0,
                (self.len * std::mem::size_of::<T>()) as u64,
            );
            ctx.queue.submit(Some(encoder.finish()));
        }
        self.buffer = new_buffer;
        self.capacity = target;
        target
    }
}

/// A ping-pong pair of typed buffers: a frame reads slot A, writes slot B,
/// then swaps. No pass is ever handed both halves writable.
pub struct PingPong<T: bytemuck::Pod> {
    a: TypedBuffer<T>,
    b: TypedBuffer<T>,
    /// `false` => read A / write B; `true` => read B / write A.
    swapped: bool,
}

impl<T: bytemuck::Pod> PingPong<T> {
    pub fn new(ctx: &GpuContext, label: &str, capacity: usize, usage: wgpu::BufferUsages) -> Self {
        Self {
            a: TypedBuffer::new(ctx, &format!("{label}-a"), capacity, usage),
            b: TypedBuffer::new(ctx, &format!("{label}-b"), capacity, usage),
            swapped: false,
        }
    }

    pub fn read(&self) -> &wgpu::Buffer {
        if self.swapped {
            &self.b.buffer
        } else {
            &self.a.buffer
        }
    }

    pub fn write(&self) -> &wgpu::Buffer {
        if self.swapped {
            &self.a.buffer
        } else {
            &self.b.buffer
        }
    }

    pub fn swap(&mut self) {
        self.swapped = !self.swapped;
    }

    pub fn capacity(&self) -> usize {
        self.a.capacity()
    }

    pub fn grow(&mut self, ctx: &GpuContext, new_capacity: usize, floor: usize) -> usize {
        self.a.grow(ctx, new_capacity, floor);
        self.b.grow(ctx, new_capacity, floor)
    }

    /// See [`TypedBuffer::mark_populated`]; applies to both halves since a
    /// scatter-written row is written into whichever half is live at the
    /// time (`read()` and `write()` alike over the row's lifetime).
    pub fn mark_populated(&mut self, len: usize) {
        self.a.mark_populated(len);
        self.b.mark_populated(len);
    }

    /// Seed both halves with the same initial contents (used right after a
    /// `load()` or `grow`, before any pass has run).
    pub fn seed(&mut self, ctx: &GpuContext, data: &[T]) -> Result<()> {
        self.a.write(ctx, data)?;
        self.b.write(ctx, data)
    }
}

/// A small uniform buffer rewritten in place every tick/frame rather than
/// recreated.
pub struct UniformSlot<T: bytemuck::Pod> {
    pub buffer: wgpu::Buffer,
    _marker: PhantomData<T>,
}

impl<T: bytemuck::Pod + Default> UniformSlot<T> {
    pub fn new(ctx: &GpuContext, label: &str) -> Self {
        let buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::bytes_of(&T::default()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        Self {
            buffer,
            _marker: PhantomData,
        }
    }

    pub fn update(&self, ctx: &GpuContext, value: &T) {
        ctx.queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(value));
    }
}
