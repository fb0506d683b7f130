//! Kernel program loading and compilation.
//!
//! The program is one WGSL module exposing the `lbm` and `reset_fluid`
//! entry points. Compiler diagnostics are collected into a build log so a
//! failed build can be reported verbatim.

use std::fmt::Write as _;
use std::path::Path;

use bytemuck::{Pod, Zeroable};

use crate::error::{SimError, SimResult};
use crate::state::STATE_FORMAT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    Lbm,
    ResetFluid,
}

impl Kernel {
    pub fn entry_point(self) -> &'static str {
        match self {
            Kernel::Lbm => "lbm",
            Kernel::ResetFluid => "reset_fluid",
        }
    }

    /// Binding of the first kernel argument; later arguments follow in order.
    pub fn first_binding(self) -> u32 {
        match self {
            Kernel::Lbm => 0,
            Kernel::ResetFluid => 8,
        }
    }

    /// Texture arguments as (sampled inputs, storage outputs).
    pub fn texture_arity(self) -> (u32, u32) {
        match self {
            Kernel::Lbm => (4, 3),
            Kernel::ResetFluid => (0, 3),
        }
    }
}

/// Uniform block of `lbm`; mirrors `LbmParams` in the WGSL source.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LbmParams {
    pub tau: f32,
    pub width: u32,
    pub height: u32,
    pub cursor_x: f32,
    pub cursor_y: f32,
    pub cursor_active: u32,
    pub cursor_radius: f32,
    pub _pad0: u32,
}

/// Uniform block of `reset_fluid`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ResetParams {
    pub rho: f32,
    pub width: u32,
    pub height: u32,
    pub _pad0: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelParams {
    Lbm(LbmParams),
    Reset(ResetParams),
}

impl KernelParams {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            KernelParams::Lbm(p) => bytemuck::bytes_of(p),
            KernelParams::Reset(p) => bytemuck::bytes_of(p),
        }
    }
}

pub struct KernelPipeline {
    pub pipeline: wgpu::ComputePipeline,
    pub layout: wgpu::BindGroupLayout,
}

pub struct Program {
    lbm: KernelPipeline,
    reset_fluid: KernelPipeline,
}

impl Program {
    pub fn kernel(&self, kernel: Kernel) -> &KernelPipeline {
        match kernel {
            Kernel::Lbm => &self.lbm,
            Kernel::ResetFluid => &self.reset_fluid,
        }
    }
}

/// Reads and compiles a WGSL source, returning the module or the build log.
pub fn compile_program(device: &wgpu::Device, path: &Path) -> SimResult<wgpu::ShaderModule> {
    let source = std::fs::read_to_string(path).map_err(|e| SimError::Build {
        path: path.to_path_buf(),
        log: format!("kernel source not found: {e}"),
    })?;

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("lbm-program"),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let info = pollster::block_on(module.get_compilation_info());
    let scope = pollster::block_on(device.pop_error_scope());

    let mut log = String::new();
    let mut failed = false;
    for message in &info.messages {
        failed |= matches!(message.message_type, wgpu::CompilationMessageType::Error);
        match &message.location {
            Some(loc) => {
                let _ = writeln!(
                    log,
                    "{:?} at {}:{}: {}",
                    message.message_type, loc.line_number, loc.line_position, message.message
                );
            }
            None => {
                let _ = writeln!(log, "{:?}: {}", message.message_type, message.message);
            }
        }
    }
    if let Some(err) = scope {
        failed = true;
        let _ = writeln!(log, "{err}");
    }

    if failed {
        return Err(SimError::Build {
            path: path.to_path_buf(),
            log,
        });
    }
    if !log.is_empty() {
        log::warn!("kernel program {} compiled with diagnostics:\n{log}", path.display());
    }
    Ok(module)
}

pub fn build_program(device: &wgpu::Device, path: &Path) -> SimResult<Program> {
    let module = compile_program(device, path)?;

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let lbm = mk_kernel(device, &module, Kernel::Lbm);
    let reset_fluid = mk_kernel(device, &module, Kernel::ResetFluid);
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(SimError::Build {
            path: path.to_path_buf(),
            log: err.to_string(),
        });
    }

    log::info!(
        "built kernel program {} (kernels: {}, {})",
        path.display(),
        Kernel::Lbm.entry_point(),
        Kernel::ResetFluid.entry_point()
    );
    Ok(Program {
        lbm,
        reset_fluid,
    })
}

fn mk_kernel(device: &wgpu::Device, module: &wgpu::ShaderModule, kernel: Kernel) -> KernelPipeline {
    let label = kernel.entry_point();
    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &kernel_layout_entries(kernel),
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[&layout],
        push_constant_ranges: &[],
    });
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module,
        entry_point: Some(label),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    });
    KernelPipeline { pipeline, layout }
}

/// Sampled inputs, then storage outputs, then the parameter block.
fn kernel_layout_entries(kernel: Kernel) -> Vec<wgpu::BindGroupLayoutEntry> {
    let (inputs, outputs) = kernel.texture_arity();
    let mut binding = kernel.first_binding();
    let mut entries = Vec::new();
    for _ in 0..inputs {
        entries.push(sampled_entry(binding, wgpu::ShaderStages::COMPUTE));
        binding += 1;
    }
    for _ in 0..outputs {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format: STATE_FORMAT,
                view_dimension: wgpu::TextureViewDimension::D2,
            },
            count: None,
        });
        binding += 1;
    }
    entries.push(wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    });
    entries
}

/// Float textures without filtering; `Rgba32Float` is not filterable by default.
pub(crate) fn sampled_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}
