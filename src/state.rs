//! GPU-resident lattice state: the boundary texture and two copies of the
//! three channel-group textures.

use crate::error::{InteropOp, SimError, SimResult};
use crate::init::InitialState;
use crate::lattice::{BufferIndex, ChannelGroup, LatticeDims};

pub const STATE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

const TEXEL_BYTES: u32 = 16;

/// Cross-API reference to one shared texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// Handle layout of the store, independent of any device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatticeHandles {
    pub boundary: TextureId,
    pub buffers: [[TextureId; 3]; 2],
}

impl Default for LatticeHandles {
    fn default() -> Self {
        Self {
            boundary: TextureId(0),
            buffers: [
                [TextureId(1), TextureId(2), TextureId(3)],
                [TextureId(4), TextureId(5), TextureId(6)],
            ],
        }
    }
}

impl LatticeHandles {
    pub fn group(&self, buffer: BufferIndex, group: ChannelGroup) -> TextureId {
        self.buffers[buffer.index()][group.index()]
    }

    pub fn buffer(&self, buffer: BufferIndex) -> [TextureId; 3] {
        self.buffers[buffer.index()]
    }

    /// Boundary followed by buffer 0 and buffer 1 groups.
    pub fn all(&self) -> Vec<TextureId> {
        let mut ids = vec![self.boundary];
        ids.extend(self.buffers[0]);
        ids.extend(self.buffers[1]);
        ids
    }
}

pub struct LatticeStateStore {
    dims: LatticeDims,
    handles: LatticeHandles,
    boundary: wgpu::Texture,
    buffers: [[wgpu::Texture; 3]; 2],
}

impl LatticeStateStore {
    /// Allocates every texture once and uploads the initial contents.
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, init: &InitialState) -> SimResult<Self> {
        let dims = init.dims;
        check_texture_limit(dims, device.limits().max_texture_dimension_2d)?;
        let boundary = mk_state_texture(device, "lbm-boundary", dims);
        upload(queue, &boundary, dims, &init.boundary_rgba());

        let zero = init.zeroed_group();
        let buffers: [[wgpu::Texture; 3]; 2] = std::array::from_fn(|b| {
            std::array::from_fn(|g| {
                let group = ChannelGroup::ALL[g];
                let texture = mk_state_texture(device, &format!("lbm-buffer-{b}-{group:?}"), dims);
                let data = if b == 0 { init.group(group) } else { &zero[..] };
                upload(queue, &texture, dims, data);
                texture
            })
        });

        log::debug!("allocated lattice textures {}x{}", dims.width, dims.height);
        Ok(Self {
            dims,
            handles: LatticeHandles::default(),
            boundary,
            buffers,
        })
    }

    pub fn dims(&self) -> LatticeDims {
        self.dims
    }

    pub fn handles(&self) -> LatticeHandles {
        self.handles
    }

    pub fn texture(&self, id: TextureId) -> Option<&wgpu::Texture> {
        if id == self.handles.boundary {
            return Some(&self.boundary);
        }
        for (b, ids) in self.handles.buffers.iter().enumerate() {
            if let Some(g) = ids.iter().position(|&candidate| candidate == id) {
                return Some(&self.buffers[b][g]);
            }
        }
        None
    }

    pub fn view(&self, id: TextureId) -> Option<wgpu::TextureView> {
        self.texture(id)
            .map(|t| t.create_view(&wgpu::TextureViewDescriptor::default()))
    }

    /// Copies one channel group back to the host. Waits for the device.
    pub fn read_back(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        buffer: BufferIndex,
        group: ChannelGroup,
    ) -> SimResult<Vec<[f32; 4]>> {
        let texture = &self.buffers[buffer.index()][group.index()];
        let (width, height) = (self.dims.width, self.dims.height);
        let row_bytes = width * TEXEL_BYTES;
        let padded_row = row_bytes.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("lbm-readback"),
            size: (padded_row * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&Default::default());
        encoder.copy_texture_to_buffer(
            texture.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            extent(self.dims),
        );
        queue.submit(Some(encoder.finish()));

        let slice = readback.slice(..);
        map_wait(device, &slice)?;

        let mapped = slice.get_mapped_range();
        let mut texels = Vec::with_capacity(self.dims.cells());
        for row in 0..height as usize {
            let start = row * padded_row as usize;
            let floats: &[f32] = bytemuck::cast_slice(&mapped[start..start + row_bytes as usize]);
            texels.extend(floats.chunks_exact(4).map(|t| [t[0], t[1], t[2], t[3]]));
        }
        drop(mapped);
        readback.unmap();
        Ok(texels)
    }
}

/// Rejects lattices the device cannot hold in a single 2D texture.
pub fn check_texture_limit(dims: LatticeDims, max_dimension: u32) -> SimResult<()> {
    if dims.width > max_dimension || dims.height > max_dimension {
        return Err(SimError::Configuration(format!(
            "mask is {}x{} but the device allows at most {max_dimension}x{max_dimension}",
            dims.width, dims.height
        )));
    }
    Ok(())
}

fn extent(dims: LatticeDims) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: dims.width,
        height: dims.height,
        depth_or_array_layers: 1,
    }
}

fn mk_state_texture(device: &wgpu::Device, label: &str, dims: LatticeDims) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: extent(dims),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: STATE_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::STORAGE_BINDING
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

fn upload(queue: &wgpu::Queue, texture: &wgpu::Texture, dims: LatticeDims, texels: &[[f32; 4]]) {
    queue.write_texture(
        texture.as_image_copy(),
        bytemuck::cast_slice(texels),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(dims.width * TEXEL_BYTES),
            rows_per_image: Some(dims.height),
        },
        extent(dims),
    );
}

fn map_wait(device: &wgpu::Device, slice: &wgpu::BufferSlice<'_>) -> SimResult<()> {
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |r| {
        let _ = tx.send(r);
    });
    device
        .poll(wgpu::PollType::wait_indefinitely())
        .map_err(|e| SimError::interop(InteropOp::Finish, e))?;
    rx.recv()
        .map_err(|_| SimError::interop(InteropOp::Finish, "map_async channel closed"))?
        .map_err(|e| SimError::interop(InteropOp::Finish, e))?;
    Ok(())
}
