//! GPU matrix-product kernel using WGPU.
//!
//! Only the matrix product is offloaded: it is the one kernel whose cost
//! grows faster than its buffers. Operands are converted to `f32`, uploaded,
//! multiplied by a WGSL compute shader with one invocation per output
//! element, read back and widened to `f64`.
//!
//! The device, queue and pipeline are created once, lazily. If no adapter is
//! available the context stays empty and every call returns `None`, which
//! makes the dispatcher fall back to the rayon kernel.
//!
//! Every call blocks until the result buffer has been mapped and copied out.

use std::sync::mpsc;

use thiserror::Error;
use wgpu::util::DeviceExt;

const MATMUL: &str = include_str!("shaders/matmul.wgsl");

/// Side length of the shader's square workgroup.
const TILE: u32 = 16;

/// Failures while setting up or running the GPU kernel.
#[derive(Debug, Error)]
pub enum GpuError {
    /// No suitable adapter.
    #[error("adapter error: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    /// The adapter refused to create a device.
    #[error("device error: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    /// The problem does not fit the device limits.
    #[error("exceeds device limits: {0}")]
    Limit(String),
    /// Submission, polling or read-back failed.
    #[error("dispatch error: {0}")]
    Dispatch(String),
}

/// Device, queue and the compiled matrix-product pipeline.
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
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

impl GpuContext {
    /// Selects the default adapter, creates a device and compiles the shader.
    ///
    /// # Errors
    /// Fails if no adapter or device can be acquired.
    pub fn new() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::default();
        let options = wgpu::RequestAdapterOptions::default();
        let adapter = pollster::block_on(instance.request_adapter(&options))?;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("tensorgraph"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))?;

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("matmul"),
            source: wgpu::ShaderSource::Wgsl(MATMUL.into()),
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("matmul_bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("matmul_pipeline_layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("matmul_pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        Ok(Self { device, queue, layout, pipeline })
    }

    /// Runs `C = A × B` on the GPU and waits for the result.
    ///
    /// # Errors
    /// Fails if the problem exceeds the device limits, if validation rejects
    /// the dispatch, or if the read-back cannot be mapped.
    pub fn matmul(
        &self,
        a: &[f32],
        b: &[f32],
        m: usize,
        k: usize,
        n: usize,
    ) -> Result<Vec<f32>, GpuError> {
        let device = &self.device;
        let [m32, k32, n32] = check_limits(&device.limits(), m, k, n)?;
        let out_bytes = (m * n * size_of::<f32>()) as u64;

        // Anything the limit check missed surfaces here instead of reaching
        // the panicking default error handler.
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let dims = [m32, k32, n32, 0u32];
        let dims_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("dims"),
            contents: bytemuck::cast_slice(&dims),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let a_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("A"),
            contents: bytemuck::cast_slice(a),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let b_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("B"),
            contents: bytemuck::cast_slice(b),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let c_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("C"),
            size: out_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging"),
            size: out_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("matmul_bind_group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: dims_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: a_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: b_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: c_buffer.as_entire_binding() },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("matmul_encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("matmul_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(n32.div_ceil(TILE), m32.div_ceil(TILE), 1);
        }
        encoder.copy_buffer_to_buffer(&c_buffer, 0, &staging, 0, out_bytes);
        let commands = encoder.finish();

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(GpuError::Dispatch(err.to_string()));
        }
        self.queue.submit(Some(commands));

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| GpuError::Dispatch(e.to_string()))?;
        rx.recv()
            .map_err(|e| GpuError::Dispatch(e.to_string()))?
            .map_err(|e| GpuError::Dispatch(e.to_string()))?;

        let view = slice.get_mapped_range();
        let out = bytemuck::try_cast_slice::<u8, f32>(&view)
            .map_err(|e| GpuError::Dispatch(e.to_string()))?
            .to_vec();
        drop(view);
        staging.unmap();

        Ok(out)
    }
}

/// Checks an `(m×k) × (k×n)` product against the device limits and returns
/// the dimensions as shader-sized integers.
fn check_limits(limits: &wgpu::Limits, m: usize, k: usize, n: usize) -> Result<[u32; 3], GpuError> {
    let dim = |name: &str, v: usize| {
        u32::try_from(v).map_err(|_| GpuError::Limit(format!("{name} = {v} does not fit in u32")))
    };
    let dims = [dim("m", m)?, dim("k", k)?, dim("n", n)?];

    let max_binding = u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size);
    let buffers = [("A", m.checked_mul(k)), ("B", k.checked_mul(n)), ("C", m.checked_mul(n))];
    for (name, elems) in buffers {
        let bytes = elems
            .and_then(|e| e.checked_mul(size_of::<f32>()))
            .and_then(|b| u64::try_from(b).ok());
        match bytes {
            Some(b) if b <= max_binding => {}
            _ => return Err(GpuError::Limit(format!("buffer {name} exceeds {max_binding} bytes"))),
        }
    }

    let max_groups = limits.max_compute_workgroups_per_dimension;
    let [m32, _, n32] = dims;
    if m32.div_ceil(TILE) > max_groups || n32.div_ceil(TILE) > max_groups {
        return Err(GpuError::Limit(format!(
            "{m}×{n} output needs more than {max_groups} workgroups per dimension"
        )));
    }

    Ok(dims)
}

lazy_static::lazy_static! {
    static ref GPU_CONTEXT: Option<GpuContext> = match GpuContext::new() {
        Ok(ctx) => Some(ctx),
        Err(err) => {
            tracing::warn!(%err, "GPU unavailable, accelerated matmul stays on the CPU");
            None
        }
    };
}

/// Whether a GPU context could be created.
pub fn is_available() -> bool {
    GPU_CONTEXT.is_some()
}

/// Matrix product on the GPU; `None` when the GPU is unavailable, a
/// dimension is zero, the product exceeds the device limits, or the
/// dispatch fails.
pub fn matmul(a: &[f64], b: &[f64], m: usize, k: usize, n: usize) -> Option<Vec<f64>> {
    let ctx = GPU_CONTEXT.as_ref()?;
    if m == 0 || k == 0 || n == 0 {
        return None;
    }
    if let Err(err) = check_limits(&ctx.device.limits(), m, k, n) {
        tracing::debug!(%err, m, k, n, "matmul too large for the GPU");
        return None;
    }

    let a32: Vec<f32> = a.iter().map(|&x| x as f32).collect();
    let b32: Vec<f32> = b.iter().map(|&x| x as f32).collect();

    match ctx.matmul(&a32, &b32, m, k, n) {
        Ok(out) => Some(out.into_iter().map(f64::from).collect()),
        Err(err) => {
            tracing::warn!(%err, m, k, n, "GPU matmul failed");
            None
        }
    }
}
