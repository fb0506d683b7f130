//! One simulation tick: parity bookkeeping, argument binding and the
//! acquire/dispatch/release bracket.

use crate::error::SimResult;
use crate::interop::{InteropBackend, KernelArg, KernelCall};
use crate::lattice::{BufferIndex, ChannelGroup, LatticeDims};
use crate::program::Kernel;
use crate::state::{LatticeHandles, TextureId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPhase {
    Idle,
    Acquiring,
    Dispatching,
    Releasing,
}

/// Cursor as handed to the kernel, in texture space (origin bottom-left).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelCursor {
    pub x: f32,
    pub y: f32,
    pub active: bool,
}

impl KernelCursor {
    pub const NONE: KernelCursor = KernelCursor {
        x: 0.0,
        y: 0.0,
        active: false,
    };

    /// Converts window coordinates (origin top-left) to texture coordinates.
    pub fn from_window(position: Option<(f64, f64)>, height: u32) -> Self {
        match position {
            Some((x, y)) => KernelCursor {
                x: x as f32,
                y: height as f32 - y as f32,
                active: true,
            },
            None => KernelCursor::NONE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepParams {
    pub tau: f32,
    pub rho_init: f32,
    pub cursor_radius: f32,
}

pub struct SimulationStepper {
    dims: LatticeDims,
    handles: LatticeHandles,
    params: StepParams,
    read: BufferIndex,
    phase: TickPhase,
    ticks: u64,
    resets: u64,
}

impl SimulationStepper {
    pub fn new(dims: LatticeDims, handles: LatticeHandles, params: StepParams) -> Self {
        Self {
            dims,
            handles,
            params,
            read: BufferIndex::Zero,
            phase: TickPhase::Idle,
            ticks: 0,
            resets: 0,
        }
    }

    /// Buffer holding the current state.
    pub fn read_buffer(&self) -> BufferIndex {
        self.read
    }

    pub fn write_buffer(&self) -> BufferIndex {
        self.read.other()
    }

    pub fn parity(&self) -> usize {
        self.read.index()
    }

    pub fn phase(&self) -> TickPhase {
        self.phase
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn resets(&self) -> u64 {
        self.resets
    }

    pub fn handles(&self) -> LatticeHandles {
        self.handles
    }

    /// Textures the renderer samples after the last completed tick.
    pub fn display_textures(&self) -> [TextureId; 2] {
        [
            self.handles.boundary,
            self.handles.group(self.read, ChannelGroup::C),
        ]
    }

    /// Boundary plus every group of both buffers.
    pub fn tick_bundle(&self) -> Vec<TextureId> {
        self.handles.all()
    }

    /// The read buffer's groups only; the boundary is left alone.
    pub fn reset_bundle(&self) -> Vec<TextureId> {
        self.handles.buffer(self.read).to_vec()
    }

    pub fn lbm_call(&self, cursor: KernelCursor) -> KernelCall {
        let mut args = vec![KernelArg::Texture(self.handles.boundary)];
        args.extend(self.handles.buffer(self.read).map(KernelArg::Texture));
        args.extend(self.handles.buffer(self.write_buffer()).map(KernelArg::Texture));
        args.extend([
            KernelArg::Float(self.params.tau),
            KernelArg::Uint(self.dims.width),
            KernelArg::Uint(self.dims.height),
            KernelArg::Float(cursor.x),
            KernelArg::Float(cursor.y),
            KernelArg::Uint(cursor.active as u32),
            KernelArg::Float(self.params.cursor_radius),
        ]);
        KernelCall {
            kernel: Kernel::Lbm,
            args,
            workgroups: self.dims.workgroups(),
        }
    }

    pub fn reset_call(&self) -> KernelCall {
        let mut args: Vec<KernelArg> = self
            .handles
            .buffer(self.read)
            .map(KernelArg::Texture)
            .to_vec();
        args.extend([
            KernelArg::Float(self.params.rho_init),
            KernelArg::Uint(self.dims.width),
            KernelArg::Uint(self.dims.height),
        ]);
        KernelCall {
            kernel: Kernel::ResetFluid,
            args,
            workgroups: self.dims.workgroups(),
        }
    }

    /// Regular tick: read buffer in, write buffer out, then flip parity.
    pub fn tick<B: InteropBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        cursor: KernelCursor,
    ) -> SimResult<()> {
        let call = self.lbm_call(cursor);
        let bundle = self.tick_bundle();
        self.run_bracket(backend, &bundle, &call)?;
        self.read = self.read.other();
        self.ticks += 1;
        Ok(())
    }

    /// Rewrites the read buffer with a zero-velocity equilibrium. Parity is kept.
    pub fn reset<B: InteropBackend + ?Sized>(&mut self, backend: &mut B) -> SimResult<()> {
        let call = self.reset_call();
        let bundle = self.reset_bundle();
        self.run_bracket(backend, &bundle, &call)?;
        self.resets += 1;
        log::debug!("fluid reset on buffer {}", self.read.index());
        Ok(())
    }

    fn run_bracket<B: InteropBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        bundle: &[TextureId],
        call: &KernelCall,
    ) -> SimResult<()> {
        self.enter(TickPhase::Acquiring);
        let token = backend.acquire(bundle)?;

        self.enter(TickPhase::Dispatching);
        log::debug!(
            "{} dispatch {}x{} workgroups",
            call.kernel.entry_point(),
            call.workgroups.0,
            call.workgroups.1
        );
        let dispatched = backend.dispatch(&token, call);

        // release even after a failed dispatch so ownership is never left dangling
        self.enter(TickPhase::Releasing);
        let released = backend.release(token);
        dispatched?;
        released?;
        backend.finish()?;

        self.enter(TickPhase::Idle);
        Ok(())
    }

    fn enter(&mut self, phase: TickPhase) {
        log::debug!("tick phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::KernelParams;

    fn stepper(width: u32, height: u32) -> SimulationStepper {
        SimulationStepper::new(
            LatticeDims::new(width, height).unwrap(),
            LatticeHandles::default(),
            StepParams {
                tau: 0.58,
                rho_init: 1.0,
                cursor_radius: 8.0,
            },
        )
    }

    #[test]
    fn cursor_y_is_flipped() {
        let cursor = KernelCursor::from_window(Some((120.0, 30.0)), 600);
        assert_eq!((cursor.x, cursor.y, cursor.active), (120.0, 570.0, true));
    }

    #[test]
    fn missing_cursor_is_flagged_not_flipped() {
        let cursor = KernelCursor::from_window(None, 600);
        assert_eq!(cursor, KernelCursor::NONE);
        assert!(!cursor.active);
    }

    #[test]
    fn lbm_arguments_follow_binding_order() {
        let s = stepper(40, 20);
        let h = LatticeHandles::default();
        let call = s.lbm_call(KernelCursor::from_window(Some((5.0, 5.0)), 20));
        assert_eq!(call.kernel, Kernel::Lbm);
        let expected_textures = vec![
            h.boundary,
            h.buffers[0][0],
            h.buffers[0][1],
            h.buffers[0][2],
            h.buffers[1][0],
            h.buffers[1][1],
            h.buffers[1][2],
        ];
        assert_eq!(call.textures(), expected_textures);
        assert_eq!(
            &call.args[7..],
            &[
                KernelArg::Float(0.58),
                KernelArg::Uint(40),
                KernelArg::Uint(20),
                KernelArg::Float(5.0),
                KernelArg::Float(15.0),
                KernelArg::Uint(1),
                KernelArg::Float(8.0),
            ]
        );
        assert_eq!(call.workgroups, (3, 2));
    }

    #[test]
    fn lbm_call_decodes_into_uniform_block() {
        let s = stepper(40, 20);
        let call = s.lbm_call(KernelCursor::NONE);
        let Ok(KernelParams::Lbm(params)) = call.params() else {
            panic!("lbm call did not decode");
        };
        assert_eq!((params.width, params.height), (40, 20));
        assert_eq!(params.cursor_active, 0);
        assert_eq!((params.cursor_x, params.cursor_y), (0.0, 0.0));
        assert_eq!(params.cursor_radius, 8.0);
    }

    #[test]
    fn reset_targets_read_buffer_only() {
        let s = stepper(16, 16);
        let call = s.reset_call();
        assert_eq!(call.textures(), s.handles().buffer(BufferIndex::Zero).to_vec());
        assert!(!call.textures().contains(&s.handles().boundary));
        assert_eq!(
            &call.args[3..],
            &[KernelArg::Float(1.0), KernelArg::Uint(16), KernelArg::Uint(16)]
        );
    }

    #[test]
    fn fresh_stepper_is_idle_at_parity_zero() {
        let s = stepper(8, 8);
        assert_eq!(s.phase(), TickPhase::Idle);
        assert_eq!(s.parity(), 0);
        assert_eq!(s.write_buffer(), BufferIndex::One);
        assert_eq!(s.display_textures()[1], s.handles().buffers[0][2]);
    }
}
