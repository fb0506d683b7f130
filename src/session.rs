//! The owning simulation value threaded through the driving loop.

use crate::config::SimulationConfig;
use crate::error::SimResult;
use crate::init::InitialState;
use crate::interop::{HandleLedger, InteropBackend, InteropSession};
use crate::lattice::{BufferIndex, ChannelGroup, LatticeDims};
use crate::render::FrameRenderer;
use crate::state::LatticeStateStore;
use crate::stepper::{KernelCursor, SimulationStepper, StepParams};

pub struct SimulationSession {
    interop: InteropSession,
    store: LatticeStateStore,
    stepper: SimulationStepper,
    adapter_name: String,
}

impl SimulationSession {
    /// Opens the shared context, builds the kernels and uploads the initial state.
    pub fn new(
        adapter: &wgpu::Adapter,
        config: &SimulationConfig,
        init: &InitialState,
    ) -> SimResult<Self> {
        let adapter_name = adapter.get_info().name;
        let mut interop = InteropSession::create_shared_context(adapter)?;
        interop.build_program(&config.kernel_path)?;

        let store = LatticeStateStore::new(interop.device(), interop.queue(), init)?;
        interop.share_textures(&store)?;

        let stepper = SimulationStepper::new(
            store.dims(),
            store.handles(),
            StepParams {
                tau: config.tau,
                rho_init: config.rho_init,
                cursor_radius: config.cursor_radius,
            },
        );
        Ok(Self {
            interop,
            store,
            stepper,
            adapter_name,
        })
    }

    /// Optional reset, then one regular tick.
    pub fn step(&mut self, reset: bool, cursor: KernelCursor) -> SimResult<()> {
        if reset {
            self.stepper.reset(&mut self.interop)?;
        }
        self.stepper.tick(&mut self.interop, cursor)
    }

    /// Buffer the renderer should draw: the one the last tick wrote.
    pub fn display_buffer(&self) -> BufferIndex {
        self.stepper.read_buffer()
    }

    pub fn render(&self, renderer: &FrameRenderer, target: &wgpu::TextureView) -> SimResult<()> {
        renderer.render(
            self.interop.device(),
            self.interop.queue(),
            target,
            self.display_buffer(),
            self.interop.ledger(),
        )
    }

    /// Host copy of one channel group of the current state.
    pub fn read_state(&self, group: ChannelGroup) -> SimResult<Vec<[f32; 4]>> {
        let id = self.store.handles().group(self.display_buffer(), group);
        self.ledger().ensure_free(&[id])?;
        self.store.read_back(
            self.interop.device(),
            self.interop.queue(),
            self.display_buffer(),
            group,
        )
    }

    pub fn ledger(&self) -> &HandleLedger {
        self.interop.ledger()
    }

    pub fn dims(&self) -> LatticeDims {
        self.store.dims()
    }

    pub fn device(&self) -> &wgpu::Device {
        self.interop.device()
    }

    pub fn store(&self) -> &LatticeStateStore {
        &self.store
    }

    pub fn stepper(&self) -> &SimulationStepper {
        &self.stepper
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }
}
