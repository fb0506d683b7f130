//! Display side: draws group C of the current read buffer over the boundary.

use crate::error::{SimError, SimResult};
use crate::interop::HandleLedger;
use crate::lattice::{BufferIndex, ChannelGroup};
use crate::program::sampled_entry;
use crate::state::{LatticeStateStore, TextureId};

const RENDER_WGSL: &str = include_str!("../shaders/render.wgsl");

/// Background behind the lattice, `(199, 237, 204) / 255`.
pub const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 199.0 / 255.0,
    g: 237.0 / 255.0,
    b: 204.0 / 255.0,
    a: 1.0,
};

pub struct FrameRenderer {
    pipeline: wgpu::RenderPipeline,
    // one per buffer index so presenting never creates bind groups
    bind_groups: [wgpu::BindGroup; 2],
    sampled: [[TextureId; 2]; 2],
}

impl FrameRenderer {
    pub fn new(
        device: &wgpu::Device,
        store: &LatticeStateStore,
        target_format: wgpu::TextureFormat,
    ) -> SimResult<Self> {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("render"),
            entries: &[
                sampled_entry(0, wgpu::ShaderStages::FRAGMENT),
                sampled_entry(1, wgpu::ShaderStages::FRAGMENT),
            ],
        });

        let handles = store.handles();
        let sampled = [BufferIndex::Zero, BufferIndex::One]
            .map(|b| [handles.boundary, handles.group(b, ChannelGroup::C)]);

        let mut groups = Vec::with_capacity(2);
        for ids in &sampled {
            let mut views = Vec::with_capacity(2);
            for &id in ids {
                views.push(store.view(id).ok_or_else(|| {
                    SimError::Surface(format!("store has no texture {}", id.0))
                })?);
            }
            groups.push(device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("render"),
                layout: &layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&views[0]),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&views[1]),
                    },
                ],
            }));
        }
        let Ok(bind_groups) = <[wgpu::BindGroup; 2]>::try_from(groups) else {
            return Err(SimError::Surface("render bind groups".into()));
        };

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("render"),
            source: wgpu::ShaderSource::Wgsl(RENDER_WGSL.into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("render"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("render"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Ok(Self {
            pipeline,
            bind_groups,
            sampled,
        })
    }

    /// Textures a frame drawn from `buffer` samples.
    pub fn sampled_textures(&self, buffer: BufferIndex) -> [TextureId; 2] {
        self.sampled[buffer.index()]
    }

    /// Records and submits one frame into `target`. Refuses to sample
    /// textures that compute still owns.
    pub fn render(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        target: &wgpu::TextureView,
        buffer: BufferIndex,
        ledger: &HandleLedger,
    ) -> SimResult<()> {
        ledger.ensure_free(&self.sampled_textures(buffer))?;

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("render"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("render"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_groups[buffer.index()], &[]);
            pass.draw(0..3, 0..1);
        }
        queue.submit(Some(encoder.finish()));
        Ok(())
    }
}
