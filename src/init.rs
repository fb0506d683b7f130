//! Initial lattice contents: boundary derived from the mask and a uniform
//! equilibrium field for the first buffer copy.

use crate::error::SimResult;
use crate::lattice::{Cell, ChannelGroup, LatticeDims};
use crate::mask::MaskImage;

/// Pixels closer than this to any edge are forced solid.
pub const BORDER_WIDTH: u32 = 2;

#[derive(Debug, Clone)]
pub struct InitialState {
    pub dims: LatticeDims,
    /// RGB in `[0, 1]`; black marks solid cells.
    pub boundary: Vec<[f32; 3]>,
    /// Buffer 0 texels, indexed by `ChannelGroup::index`.
    pub groups: [Vec<[f32; 4]>; 3],
}

impl InitialState {
    pub fn group(&self, group: ChannelGroup) -> &[[f32; 4]] {
        &self.groups[group.index()]
    }

    /// Contents of every group in buffer 1; never read before the first tick writes it.
    pub fn zeroed_group(&self) -> Vec<[f32; 4]> {
        vec![[0.0; 4]; self.dims.cells()]
    }

    /// Boundary texels padded to RGBA for upload.
    pub fn boundary_rgba(&self) -> Vec<[f32; 4]> {
        self.boundary
            .iter()
            .map(|&[r, g, b]| [r, g, b, 1.0])
            .collect()
    }
}

pub fn is_border(x: u32, y: u32, dims: LatticeDims) -> bool {
    x < BORDER_WIDTH
        || y < BORDER_WIDTH
        || x + BORDER_WIDTH >= dims.width
        || y + BORDER_WIDTH >= dims.height
}

pub fn derive_boundary(mask: &MaskImage) -> SimResult<Vec<[f32; 3]>> {
    let dims = LatticeDims::new(mask.width, mask.height)?;
    let mut boundary = Vec::with_capacity(dims.cells());
    for y in 0..dims.height {
        for x in 0..dims.width {
            if is_border(x, y, dims) {
                boundary.push([0.0; 3]);
            } else {
                let [r, g, b] = mask.pixel(x, y);
                boundary.push([r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0]);
            }
        }
    }
    Ok(boundary)
}

/// Builds the boundary and the buffer-0 texels for a uniform `(ux, uy, rho)` field.
pub fn initialize(mask: &MaskImage, ux: f32, uy: f32, rho: f32) -> SimResult<InitialState> {
    let dims = LatticeDims::new(mask.width, mask.height)?;
    let boundary = derive_boundary(mask)?;

    // the field is uniform, so every cell packs to the same texels
    let cell = Cell::at_equilibrium(rho, ux, uy);
    let groups = ChannelGroup::ALL.map(|group| vec![cell.texel(group); dims.cells()]);

    Ok(InitialState {
        dims,
        boundary,
        groups,
    })
}
