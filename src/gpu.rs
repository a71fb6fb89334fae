//! Device/queue acquisition and capability probing.
//!
//! Mirrors the plain (non-ECS) `GpuContext` shape used throughout the
//! surrounding pack for raw `wgpu` access: one struct holding the device
//! and queue, constructed once via the engine's single asynchronous
//! boundary and then used synchronously for the engine's
//! lifetime.

use crate::error::{Error, Result};

/// Device/queue pair plus the capability probe recorded at acquisition time.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    limits: wgpu::Limits,
}

impl GpuContext {
    /// Acquire a device against an existing `wgpu::Instance`, optionally
    /// targeting a surface (for on-screen hosts) or headless (for tests and
    /// offscreen compositing).
    pub async fn new(
        instance: &wgpu::Instance,
        compatible_surface: Option<&wgpu::Surface<'_>>,
    ) -> Result<Self> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| Error::InitFailure(format!("no suitable adapter: {e}")))?;

        let required_limits = wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits());

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("heroine-graph device"),
                required_features: wgpu::Features::empty(),
                required_limits,
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| Error::InitFailure(format!("device request failed: {e}")))?;

        let limits = device.limits();

        Ok(Self {
            device,
            queue,
            limits,
        })
    }

    /// Blocking wrapper for hosts without their own async runtime — the
    /// engine's one and only async boundary.
    pub fn new_blocking(
        instance: &wgpu::Instance,
        compatible_surface: Option<&wgpu::Surface<'_>>,
    ) -> Result<Self> {
        pollster::block_on(Self::new(instance, compatible_surface))
    }

    /// Limits granted at device acquisition, so callers can size buffers
    /// without guessing.
    pub fn limits(&self) -> &wgpu::Limits {
        &self.limits
    }

    pub fn max_storage_buffer_binding_size(&self) -> u64 {
        self.limits.max_storage_buffer_binding_size as u64
    }

    /// Compile a WGSL module, surfacing compilation errors through the
    /// engine's own error type instead of relying on `wgpu`'s panic-on-drop
    /// validation error path.
    pub fn create_shader(&self, label: &str, source: &str) -> wgpu::ShaderModule {
        self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        })
    }
}
