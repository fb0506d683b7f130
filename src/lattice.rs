//! D2Q9 lattice constants and the per-cell texel layout.
//!
//! Each buffer copy packs a cell into three RGBA texels:
//! group A holds `f1..f4`, group B holds `f5..f8` and group C holds
//! `f0, rho, ux, uy`.

use crate::error::{SimError, SimResult};

pub const Q: usize = 9;

pub const WEIGHTS: [f32; Q] = [
    4.0 / 9.0,
    1.0 / 9.0,
    1.0 / 9.0,
    1.0 / 9.0,
    1.0 / 9.0,
    1.0 / 36.0,
    1.0 / 36.0,
    1.0 / 36.0,
    1.0 / 36.0,
];

pub const DIRECTIONS: [[i32; 2]; Q] = [
    [0, 0],
    [1, 0],
    [0, 1],
    [-1, 0],
    [0, -1],
    [1, 1],
    [-1, 1],
    [-1, -1],
    [1, -1],
];

/// Lattice speed of sound, `1/sqrt(3)`.
pub const SOUND_SPEED: f32 = 0.577_350_26;

/// Side of the square compute workgroup, in cells.
pub const BLOCK_DIM: u32 = 16;

/// BGK equilibrium `f_i = w_i rho (1 + 3 e.u + 4.5 (e.u)^2 - 1.5 u.u)`.
pub fn equilibrium(rho: f32, ux: f32, uy: f32) -> [f32; Q] {
    let uu = ux * ux + uy * uy;
    let mut f = [0.0; Q];
    for i in 0..Q {
        let eu = DIRECTIONS[i][0] as f32 * ux + DIRECTIONS[i][1] as f32 * uy;
        f[i] = WEIGHTS[i] * rho * (1.0 + 3.0 * eu + 4.5 * eu * eu - 1.5 * uu);
    }
    f
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelGroup {
    A,
    B,
    C,
}

impl ChannelGroup {
    pub const ALL: [ChannelGroup; 3] = [ChannelGroup::A, ChannelGroup::B, ChannelGroup::C];

    pub fn index(self) -> usize {
        match self {
            ChannelGroup::A => 0,
            ChannelGroup::B => 1,
            ChannelGroup::C => 2,
        }
    }
}

/// One lattice cell, before packing into texels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    pub f: [f32; Q],
    pub rho: f32,
    pub ux: f32,
    pub uy: f32,
}

impl Cell {
    pub fn at_equilibrium(rho: f32, ux: f32, uy: f32) -> Self {
        Self {
            f: equilibrium(rho, ux, uy),
            rho,
            ux,
            uy,
        }
    }

    pub fn texel(&self, group: ChannelGroup) -> [f32; 4] {
        let f = &self.f;
        match group {
            ChannelGroup::A => [f[1], f[2], f[3], f[4]],
            ChannelGroup::B => [f[5], f[6], f[7], f[8]],
            ChannelGroup::C => [f[0], self.rho, self.ux, self.uy],
        }
    }

    pub fn from_texels(a: [f32; 4], b: [f32; 4], c: [f32; 4]) -> Self {
        Self {
            f: [c[0], a[0], a[1], a[2], a[3], b[0], b[1], b[2], b[3]],
            rho: c[1],
            ux: c[2],
            uy: c[3],
        }
    }
}

/// Which of the two buffer copies is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferIndex {
    Zero,
    One,
}

impl BufferIndex {
    pub fn index(self) -> usize {
        match self {
            BufferIndex::Zero => 0,
            BufferIndex::One => 1,
        }
    }

    pub fn other(self) -> BufferIndex {
        match self {
            BufferIndex::Zero => BufferIndex::One,
            BufferIndex::One => BufferIndex::Zero,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatticeDims {
    pub width: u32,
    pub height: u32,
}

impl LatticeDims {
    pub fn new(width: u32, height: u32) -> SimResult<Self> {
        if width == 0 || height == 0 {
            return Err(SimError::Configuration(format!(
                "lattice dimensions must be positive, got {width}x{height}"
            )));
        }
        Ok(Self { width, height })
    }

    pub fn cells(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Workgroups needed to cover the grid, rounded up on both axes.
    pub fn workgroups(&self) -> (u32, u32) {
        (self.width.div_ceil(BLOCK_DIM), self.height.div_ceil(BLOCK_DIM))
    }
}
