//! GPU LSD radix sort over 32-bit keys paired with 32-bit values, used by
//! Barnes-Hut to bucket particles by Morton code.
//!
//! Upsweep → spine → downsweep, one `begin_compute_pass` per stage for the
//! implicit memory barrier between them, run on a plain `wgpu::Device`
//! with a 4-bit/8-pass digit split. The scan stage branches on histogram
//! size: a single-workgroup Blelloch scan when the histogram fits in one
//! workgroup's shared memory, otherwise a three-phase reduce/scan/
//! propagate; arrays under 1024 elements skip the sort kernel entirely in
//! favour of an O(n²) counting sort.

use crate::buffers::{PingPong, TypedBuffer};
use crate::error::{Error, Result};
use crate::gpu::GpuContext;
use wgpu::util::DeviceExt;

const RADIX_BITS: u32 = 4;
pub const RADIX: usize = 1 << RADIX_BITS;
pub const PASSES: u32 = 8;
const BLOCK_SIZE: usize = 1024;
/// Below this element count, `sort` runs the O(n²) counting-sort kernel
/// instead of the full multi-pass pipeline.
pub const SMALL_ARRAY_THRESHOLD: usize = 1024;
/// Elements a single-workgroup Blelloch scan can cover (two elements per
/// thread, 256 threads). Bounds both scan branches.
const SINGLE_WORKGROUP_SCAN_MAX: usize = 512;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct SortParams {
    pass_index: u32,
    bit_shift: u32,
    element_count: u32,
    num_partitions: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct CountingSortParams {
    element_count: u32,
    _pad: [u32; 3],
}

struct Pipelines {
    histogram: wgpu::ComputePipeline,
    scan_single: wgpu::ComputePipeline,
    scan_reduce: wgpu::ComputePipeline,
    scan_spine: wgpu::ComputePipeline,
    scan_propagate: wgpu::ComputePipeline,
    scatter: wgpu::ComputePipeline,
    counting_sort: wgpu::ComputePipeline,
    histogram_layout: wgpu::BindGroupLayout,
    scan_single_layout: wgpu::BindGroupLayout,
    scan_three_phase_layout: wgpu::BindGroupLayout,
    scatter_layout: wgpu::BindGroupLayout,
    counting_sort_layout: wgpu::BindGroupLayout,
}

/// Owns the sort pipelines and the scratch buffers sized for a maximum
/// element count; reused across ticks and across algorithms.
pub struct RadixSorter {
    pipelines: Pipelines,
    global_histogram: TypedBuffer<u32>,
    partition_sums: TypedBuffer<u32>,
    params: wgpu::Buffer,
    counting_params: wgpu::Buffer,
    max_elements: usize,
}

impl RadixSorter {
    pub fn new(ctx: &GpuContext, max_elements: usize) -> Self {
        let pipelines = build_pipelines(ctx);
        let num_partitions = max_elements.div_ceil(BLOCK_SIZE).max(1);
        let global_histogram = TypedBuffer::new(
            ctx,
            "radix-sort-global-histogram",
            RADIX * PASSES as usize,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        );
        let partition_sums = TypedBuffer::new(
            ctx,
            "radix-sort-partition-histogram",
            RADIX * num_partitions,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        );
        let params = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("radix-sort-params"),
            contents: bytemuck::bytes_of(&SortParams {
                pass_index: 0,
                bit_shift: 0,
                element_count: 0,
                num_partitions: num_partitions as u32,
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let counting_params = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("counting-sort-params"),
            contents: bytemuck::bytes_of(&CountingSortParams {
                element_count: 0,
                _pad: [0; 3],
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        Self {
            pipelines,
            global_histogram,
            partition_sums,
            params,
            counting_params,
            max_elements,
        }
    }

    /// Sort `count` (key, value) pairs in place across the ping-pong
    /// pair. After an even pass count the result lands back in the
    /// buffer the caller started with, so `keys.read()`/`values.read()`
    /// is the sorted output regardless of which path ran.
    pub fn sort(
        &self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        keys: &mut PingPong<u32>,
        values: &mut PingPong<u32>,
        count: usize,
    ) -> Result<()> {
        if count > self.max_elements {
            return Err(Error::SortCapacityExceeded { element_count: count });
        }
        if count < SMALL_ARRAY_THRESHOLD {
            self.counting_sort(ctx, encoder, keys, values, count);
            return Ok(());
        }

        let num_partitions = count.div_ceil(BLOCK_SIZE).max(1);
        let histogram_entries = RADIX * num_partitions;
        if histogram_entries > SINGLE_WORKGROUP_SCAN_MAX {
            let scan_chunks = histogram_entries.div_ceil(SINGLE_WORKGROUP_SCAN_MAX);
            if scan_chunks > SINGLE_WORKGROUP_SCAN_MAX {
                return Err(Error::SortCapacityExceeded { element_count: count });
            }
        }

        for pass in 0..PASSES {
            tracing::trace!(pass, num_partitions, "radix sort pass");
            ctx.queue.write_buffer(
                &self.params,
                0,
                bytemuck::bytes_of(&SortParams {
                    pass_index: pass,
                    bit_shift: pass * RADIX_BITS,
                    element_count: count as u32,
                    num_partitions: num_partitions as u32,
                }),
            );

            self.dispatch_histogram(ctx, encoder, keys.read(), num_partitions);
            if histogram_entries <= SINGLE_WORKGROUP_SCAN_MAX {
                self.dispatch_scan_single(ctx, encoder);
            } else {
                self.dispatch_scan_three_phase(ctx, encoder, histogram_entries);
            }
            self.dispatch_scatter(ctx, encoder, keys, values, num_partitions);

            keys.swap();
            values.swap();
        }
        Ok(())
    }

    fn dispatch_histogram(
        &self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        keys_in: &wgpu::Buffer,
        num_partitions: usize,
    ) {
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("radix-histogram-bind-group"),
            layout: &self.pipelines.histogram_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: self.params.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: keys_in.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: self.global_histogram.buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: self.partition_sums.buffer.as_entire_binding() },
            ],
        });
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("radix-histogram"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipelines.histogram);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(num_partitions as u32, 1, 1);
    }

    fn dispatch_scan_single(&self, ctx: &GpuContext, encoder: &mut wgpu::CommandEncoder) {
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("radix-scan-single-bind-group"),
            layout: &self.pipelines.scan_single_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: self.params.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: self.partition_sums.buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: self.global_histogram.buffer.as_entire_binding() },
            ],
        });
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("radix-scan-single"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipelines.scan_single);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(1, 1, 1);
    }

    fn dispatch_scan_three_phase(
        &self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        histogram_entries: usize,
    ) {
        let chunks = histogram_entries.div_ceil(SINGLE_WORKGROUP_SCAN_MAX) as u32;
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("radix-scan-three-phase-bind-group"),
            layout: &self.pipelines.scan_three_phase_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: self.params.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: self.partition_sums.buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: self.global_histogram.buffer.as_entire_binding() },
            ],
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("radix-scan-reduce"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipelines.scan_reduce);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(chunks, 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("radix-scan-spine"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipelines.scan_spine);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(1, 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("radix-scan-propagate"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipelines.scan_propagate);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(chunks, 1, 1);
        }
    }

    fn dispatch_scatter(
        &self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        keys: &PingPong<u32>,
        values: &PingPong<u32>,
        num_partitions: usize,
    ) {
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("radix-scatter-bind-group"),
            layout: &self.pipelines.scatter_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: self.params.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: keys.read().as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: values.read().as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: self.partition_sums.buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 4, resource: keys.write().as_entire_binding() },
                wgpu::BindGroupEntry { binding: 5, resource: values.write().as_entire_binding() },
            ],
        });
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("radix-scatter"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipelines.scatter);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(num_partitions as u32, 1, 1);
    }

    fn counting_sort(
        &self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        keys: &mut PingPong<u32>,
        values: &mut PingPong<u32>,
        count: usize,
    ) {
        ctx.queue.write_buffer(
            &self.counting_params,
            0,
            bytemuck::bytes_of(&CountingSortParams {
                element_count: count as u32,
                _pad: [0; 3],
            }),
        );
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("counting-sort-bind-group"),
            layout: &self.pipelines.counting_sort_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: self.counting_params.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: keys.read().as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: values.read().as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: keys.write().as_entire_binding() },
                wgpu::BindGroupEntry { binding: 4, resource: values.write().as_entire_binding() },
            ],
        });
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("counting-sort"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipelines.counting_sort);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(count.div_ceil(256) as u32, 1, 1);
        drop(pass);
        keys.swap();
        values.swap();
    }
}

fn build_pipelines(ctx: &GpuContext) -> Pipelines {
    let source = include_str!("../shaders/radix_sort.wgsl");
    let module = ctx.create_shader("radix-sort", source);

    let histogram_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("radix-histogram-layout"),
        entries: &storage_entries(&[
            (0, wgpu::BufferBindingType::Uniform),
            (1, wgpu::BufferBindingType::Storage { read_only: true }),
            (2, wgpu::BufferBindingType::Storage { read_only: false }),
            (3, wgpu::BufferBindingType::Storage { read_only: false }),
        ]),
    });
    let scan_group_entries = [
        (0, wgpu::BufferBindingType::Uniform),
        (1, wgpu::BufferBindingType::Storage { read_only: false }),
        (2, wgpu::BufferBindingType::Storage { read_only: false }),
    ];
    let scan_single_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("radix-scan-single-layout"),
        entries: &storage_entries(&scan_group_entries),
    });
    let scan_three_phase_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("radix-scan-three-phase-layout"),
        entries: &storage_entries(&scan_group_entries),
    });
    let scatter_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("radix-scatter-layout"),
        entries: &storage_entries(&[
            (0, wgpu::BufferBindingType::Uniform),
            (1, wgpu::BufferBindingType::Storage { read_only: true }),
            (2, wgpu::BufferBindingType::Storage { read_only: true }),
            (3, wgpu::BufferBindingType::Storage { read_only: true }),
            (4, wgpu::BufferBindingType::Storage { read_only: false }),
            (5, wgpu::BufferBindingType::Storage { read_only: false }),
        ]),
    });
    let counting_sort_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("counting-sort-layout"),
        entries: &storage_entries(&[
            (0, wgpu::BufferBindingType::Uniform),
            (1, wgpu::BufferBindingType::Storage { read_only: true }),
            (2, wgpu::BufferBindingType::Storage { read_only: true }),
            (3, wgpu::BufferBindingType::Storage { read_only: false }),
            (4, wgpu::BufferBindingType::Storage { read_only: false }),
        ]),
    });

    let make_pipeline = |entry: &str, layout: &wgpu::BindGroupLayout| {
        let pipeline_layout = ctx.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(entry),
            bind_group_layouts: &[layout],
            push_constant_ranges: &[],
        });
        ctx.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(entry),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some(entry),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        })
    };

    Pipelines {
        histogram: make_pipeline("histogram_main", &histogram_layout),
        scan_single: make_pipeline("scan_single_main", &scan_single_layout),
        scan_reduce: make_pipeline("scan_reduce_main", &scan_three_phase_layout),
        scan_spine: make_pipeline("scan_spine_main", &scan_three_phase_layout),
        scan_propagate: make_pipeline("scan_propagate_main", &scan_three_phase_layout),
        scatter: make_pipeline("scatter_main", &scatter_layout),
        counting_sort: make_pipeline("counting_sort_main", &counting_sort_layout),
        histogram_layout,
        scan_single_layout,
        scan_three_phase_layout,
        scatter_layout,
        counting_sort_layout,
    }
}

fn storage_entries(specs: &[(u32, wgpu::BufferBindingType)]) -> Vec<wgpu::BindGroupLayoutEntry> {
    specs
        .iter()
        .map(|&(binding, ty)| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    /// CPU reference used by the GPU sort's correctness/fuzz tests.
    fn cpu_radix_sort_reference(keys: &[u32], values: &[u32]) -> (Vec<u32>, Vec<u32>) {
        let mut pairs: Vec<(u32, u32)> = keys.iter().copied().zip(values.iter().copied()).collect();
        pairs.sort_by_key(|&(k, _)| k);
        pairs.into_iter().unzip()
    }

    fn is_sorted(keys: &[u32]) -> bool {
        keys.windows(2).all(|w| w[0] <= w[1])
    }

    #[test]
    fn reference_sort_is_sorted_and_stable_pairing() {
        let keys = vec![5u32, 1, 4, 2, 8, 1, 9, 3];
        let values: Vec<u32> = (0..keys.len() as u32).collect();
        let (sorted_keys, sorted_values) = cpu_radix_sort_reference(&keys, &values);
        assert!(is_sorted(&sorted_keys));
        for (k, v) in sorted_keys.iter().zip(sorted_values.iter()) {
            assert_eq!(keys[*v as usize], *k);
        }
    }

    #[test]
    fn reference_handles_empty_and_singleton() {
        let (k, v) = cpu_radix_sort_reference(&[], &[]);
        assert!(k.is_empty() && v.is_empty());
        let (k, v) = cpu_radix_sort_reference(&[42], &[7]);
        assert_eq!(k, vec![42]);
        assert_eq!(v, vec![7]);
    }

    #[test]
    fn reference_sort_holds_on_random_keys() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let keys: Vec<u32> = (0..1000).map(|_| rng.gen_range(0..u32::MAX)).collect();
        let values: Vec<u32> = (0..keys.len() as u32).collect();
        let (sorted_keys, sorted_values) = cpu_radix_sort_reference(&keys, &values);
        assert!(is_sorted(&sorted_keys));
        for (k, v) in sorted_keys.iter().zip(sorted_values.iter()) {
            assert_eq!(keys[*v as usize], *k);
        }
    }
}
