#![allow(dead_code)]

use std::collections::HashMap;

use lattice_flow::init::{initialize, InitialState};
use lattice_flow::interop::{AcquireToken, HandleLedger, InteropBackend, KernelArg, KernelCall};
use lattice_flow::lattice::{BufferIndex, Cell, ChannelGroup, LatticeDims};
use lattice_flow::mask::MaskImage;
use lattice_flow::program::Kernel;
use lattice_flow::state::{LatticeHandles, TextureId};
use lattice_flow::stepper::{SimulationStepper, StepParams};
use lattice_flow::{InteropOp, SimError, SimResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Acquire(Vec<TextureId>),
    Dispatch(KernelCall),
    Release(Vec<TextureId>),
    Finish,
}

/// Keeps texture contents in host memory. `lbm` copies the read buffer into
/// the write buffer; `reset_fluid` writes the rest equilibrium.
pub struct CpuBackend {
    pub dims: LatticeDims,
    pub handles: LatticeHandles,
    pub textures: HashMap<TextureId, Vec<[f32; 4]>>,
    pub calls: Vec<Recorded>,
    pub fail_acquire: bool,
    pub fail_dispatch: bool,
    /// Handles the renderer could not sample while a dispatch was running.
    pub blocked_during_dispatch: Vec<TextureId>,
    ledger: HandleLedger,
}

impl CpuBackend {
    pub fn new(init: &InitialState) -> Self {
        let handles = LatticeHandles::default();
        let mut textures = HashMap::new();
        textures.insert(handles.boundary, init.boundary_rgba());
        for group in ChannelGroup::ALL {
            textures.insert(handles.group(BufferIndex::Zero, group), init.group(group).to_vec());
            textures.insert(handles.group(BufferIndex::One, group), init.zeroed_group());
        }
        Self {
            dims: init.dims,
            handles,
            textures,
            calls: Vec::new(),
            fail_acquire: false,
            fail_dispatch: false,
            blocked_during_dispatch: Vec::new(),
            ledger: HandleLedger::default(),
        }
    }

    pub fn texture(&self, buffer: BufferIndex, group: ChannelGroup) -> &[[f32; 4]] {
        &self.textures[&self.handles.group(buffer, group)]
    }

    fn run_kernel(&mut self, call: &KernelCall) {
        let textures = call.textures();
        match call.kernel {
            Kernel::Lbm => {
                for i in 0..3 {
                    let src = self.textures[&textures[1 + i]].clone();
                    self.textures.insert(textures[4 + i], src);
                }
            }
            Kernel::ResetFluid => {
                let rho = match call.args[3] {
                    KernelArg::Float(rho) => rho,
                    other => panic!("reset_fluid rho argument was {other:?}"),
                };
                let cell = Cell::at_equilibrium(rho, 0.0, 0.0);
                for (i, group) in ChannelGroup::ALL.into_iter().enumerate() {
                    self.textures
                        .insert(textures[i], vec![cell.texel(group); self.dims.cells()]);
                }
            }
        }
    }
}

impl InteropBackend for CpuBackend {
    fn acquire(&mut self, handles: &[TextureId]) -> SimResult<AcquireToken> {
        self.calls.push(Recorded::Acquire(handles.to_vec()));
        if self.fail_acquire {
            return Err(SimError::interop(InteropOp::Acquire, "status -5"));
        }
        self.ledger.acquire(handles)
    }

    fn dispatch(&mut self, token: &AcquireToken, call: &KernelCall) -> SimResult<()> {
        self.calls.push(Recorded::Dispatch(call.clone()));
        call.check_covered(token)?;
        for &id in token.handles() {
            if self.ledger.ensure_free(&[id]).is_err() {
                self.blocked_during_dispatch.push(id);
            }
        }
        if self.fail_dispatch {
            return Err(SimError::interop(InteropOp::Dispatch, "status -36"));
        }
        self.run_kernel(call);
        Ok(())
    }

    fn release(&mut self, token: AcquireToken) -> SimResult<()> {
        self.calls.push(Recorded::Release(token.handles().to_vec()));
        self.ledger.release(token)
    }

    fn finish(&mut self) -> SimResult<()> {
        self.calls.push(Recorded::Finish);
        Ok(())
    }

    fn ledger(&self) -> &HandleLedger {
        &self.ledger
    }
}

pub fn white_mask(width: u32, height: u32) -> MaskImage {
    MaskImage::from_rgb(width, height, vec![255; (width * height * 3) as usize]).unwrap()
}

pub fn params() -> StepParams {
    StepParams {
        tau: 0.58,
        rho_init: 1.0,
        cursor_radius: 8.0,
    }
}

/// A stepper and CPU backend over a white mask with the default flow.
pub fn fixture(width: u32, height: u32) -> (SimulationStepper, CpuBackend) {
    let init = initialize(&white_mask(width, height), 0.3, 0.06, 1.0).unwrap();
    let backend = CpuBackend::new(&init);
    let stepper = SimulationStepper::new(init.dims, backend.handles, params());
    (stepper, backend)
}
