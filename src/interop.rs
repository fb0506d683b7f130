//! Compute/display hand-off for the shared lattice textures.
//!
//! Compute and display run on one device, so "acquiring" a texture means:
//! wait until every submitted display command has retired, record the
//! texture as owned by compute in the [`HandleLedger`], and open an error
//! scope. Releasing waits for the compute submission, closes the scope and
//! hands ownership back. The display side checks the ledger before it
//! samples anything.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::error::{InteropOp, SimError, SimResult};
use crate::program::{build_program, Kernel, KernelParams, LbmParams, Program, ResetParams};
use crate::state::{LatticeStateStore, TextureId};

/// Proof that a set of textures is owned by compute. Consumed by release.
#[derive(Debug)]
pub struct AcquireToken {
    serial: u64,
    handles: Vec<TextureId>,
}

impl AcquireToken {
    pub fn handles(&self) -> &[TextureId] {
        &self.handles
    }

    pub fn covers(&self, id: TextureId) -> bool {
        self.handles.contains(&id)
    }
}

/// Per-texture acquisition counters.
#[derive(Debug, Default)]
pub struct HandleLedger {
    held: HashMap<TextureId, u32>,
    outstanding: HashSet<u64>,
    next_serial: u64,
}

impl HandleLedger {
    pub fn acquire(&mut self, handles: &[TextureId]) -> SimResult<AcquireToken> {
        let mut seen = HashSet::new();
        for &id in handles {
            if !seen.insert(id) {
                return Err(SimError::interop(
                    InteropOp::Acquire,
                    format!("texture {} listed twice", id.0),
                ));
            }
            if self.is_held(id) {
                return Err(SimError::interop(
                    InteropOp::Acquire,
                    format!("texture {} is already acquired", id.0),
                ));
            }
        }
        for &id in handles {
            *self.held.entry(id).or_insert(0) += 1;
        }
        let serial = self.next_serial;
        self.next_serial += 1;
        self.outstanding.insert(serial);
        Ok(AcquireToken {
            serial,
            handles: handles.to_vec(),
        })
    }

    pub fn release(&mut self, token: AcquireToken) -> SimResult<()> {
        if !self.outstanding.remove(&token.serial) {
            return Err(SimError::interop(
                InteropOp::Release,
                format!("token {} is not outstanding", token.serial),
            ));
        }
        for id in token.handles {
            if let Some(count) = self.held.get_mut(&id) {
                *count -= 1;
                if *count == 0 {
                    self.held.remove(&id);
                }
            }
        }
        Ok(())
    }

    pub fn hold_count(&self, id: TextureId) -> u32 {
        self.held.get(&id).copied().unwrap_or(0)
    }

    pub fn is_held(&self, id: TextureId) -> bool {
        self.hold_count(id) > 0
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    /// Fails if any of `ids` is currently owned by compute.
    pub fn ensure_free(&self, ids: &[TextureId]) -> SimResult<()> {
        match ids.iter().find(|&&id| self.is_held(id)) {
            Some(id) => Err(SimError::interop(
                InteropOp::Sample,
                format!("texture {} sampled while acquired by compute", id.0),
            )),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelArg {
    Texture(TextureId),
    Float(f32),
    Uint(u32),
}

/// One kernel invocation: arguments in binding order plus the workgroup grid.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelCall {
    pub kernel: Kernel,
    pub args: Vec<KernelArg>,
    pub workgroups: (u32, u32),
}

impl KernelCall {
    pub fn textures(&self) -> Vec<TextureId> {
        self.args
            .iter()
            .filter_map(|arg| match arg {
                KernelArg::Texture(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    fn scalars(&self) -> Vec<KernelArg> {
        self.args
            .iter()
            .filter(|arg| !matches!(arg, KernelArg::Texture(_)))
            .copied()
            .collect()
    }

    fn bad_scalar(&self, index: usize, expected: &str) -> SimError {
        SimError::interop(
            InteropOp::Dispatch,
            format!(
                "{} scalar argument {index} is not a {expected}",
                self.kernel.entry_point()
            ),
        )
    }

    /// Scalar arguments decoded, in order, into the kernel's uniform block.
    pub fn params(&self) -> SimResult<KernelParams> {
        let scalars = self.scalars();
        let float = |i: usize| match scalars.get(i) {
            Some(KernelArg::Float(v)) => Ok(*v),
            _ => Err(self.bad_scalar(i, "float")),
        };
        let uint = |i: usize| match scalars.get(i) {
            Some(KernelArg::Uint(v)) => Ok(*v),
            _ => Err(self.bad_scalar(i, "uint")),
        };

        let (params, arity) = match self.kernel {
            Kernel::Lbm => (
                KernelParams::Lbm(LbmParams {
                    tau: float(0)?,
                    width: uint(1)?,
                    height: uint(2)?,
                    cursor_x: float(3)?,
                    cursor_y: float(4)?,
                    cursor_active: uint(5)?,
                    cursor_radius: float(6)?,
                    _pad0: 0,
                }),
                7,
            ),
            Kernel::ResetFluid => (
                KernelParams::Reset(ResetParams {
                    rho: float(0)?,
                    width: uint(1)?,
                    height: uint(2)?,
                    _pad0: 0,
                }),
                3,
            ),
        };
        if scalars.len() != arity {
            return Err(SimError::interop(
                InteropOp::Dispatch,
                format!(
                    "{} takes {arity} scalar arguments, got {}",
                    self.kernel.entry_point(),
                    scalars.len()
                ),
            ));
        }
        Ok(params)
    }

    pub fn check_covered(&self, token: &AcquireToken) -> SimResult<()> {
        match self.textures().into_iter().find(|&id| !token.covers(id)) {
            Some(id) => Err(SimError::interop(
                InteropOp::Dispatch,
                format!(
                    "{} bound texture {} outside its acquire bracket",
                    self.kernel.entry_point(),
                    id.0
                ),
            )),
            None => Ok(()),
        }
    }
}

/// The protocol the stepper drives each tick.
pub trait InteropBackend {
    /// Blocks until display work has retired, then takes ownership of `handles`.
    fn acquire(&mut self, handles: &[TextureId]) -> SimResult<AcquireToken>;

    /// Submits one kernel invocation against acquired textures.
    fn dispatch(&mut self, token: &AcquireToken, call: &KernelCall) -> SimResult<()>;

    /// Blocks until compute work has retired, then returns ownership to display.
    fn release(&mut self, token: AcquireToken) -> SimResult<()>;

    /// Drains the queue.
    fn finish(&mut self) -> SimResult<()>;

    fn ledger(&self) -> &HandleLedger;
}

/// The shared compute context: device, queue, program and texture references.
pub struct InteropSession {
    device: wgpu::Device,
    queue: wgpu::Queue,
    program: Option<Program>,
    shared: HashMap<TextureId, wgpu::TextureView>,
    // one bind group per distinct argument texture list, built on first use
    bind_groups: HashMap<(Kernel, Vec<TextureId>), wgpu::BindGroup>,
    params: HashMap<Kernel, wgpu::Buffer>,
    ledger: HandleLedger,
}

impl InteropSession {
    /// Opens the device against the adapter that presents the display surface.
    pub fn create_shared_context(adapter: &wgpu::Adapter) -> SimResult<Self> {
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("lbm-shared-device"),
            required_limits: adapter.limits(),
            ..Default::default()
        }))
        .map_err(|e| SimError::interop(InteropOp::Share, format!("request_device failed: {e}")))?;
        Ok(Self::from_parts(device, queue))
    }

    pub fn from_parts(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            program: None,
            shared: HashMap::new(),
            bind_groups: HashMap::new(),
            params: HashMap::new(),
            ledger: HandleLedger::default(),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn build_program(&mut self, path: &Path) -> SimResult<&Program> {
        let program = build_program(&self.device, path)?;
        self.bind_groups.clear();
        Ok(self.program.insert(program))
    }

    /// Creates the compute-side reference for every texture in the store.
    pub fn share_textures(&mut self, store: &LatticeStateStore) -> SimResult<()> {
        for id in store.handles().all() {
            let view = store.view(id).ok_or_else(|| {
                SimError::interop(InteropOp::Share, format!("store has no texture {}", id.0))
            })?;
            self.shared.insert(id, view);
        }
        self.bind_groups.clear();
        log::debug!("shared {} lattice textures with compute", self.shared.len());
        Ok(())
    }

    fn wait_idle(&self, op: InteropOp) -> SimResult<()> {
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map(|_| ())
            .map_err(|e| SimError::interop(op, e))
    }

    fn ensure_params(&mut self, kernel: Kernel, size: u64) {
        let stale = self.params.get(&kernel).is_none_or(|buf| buf.size() != size);
        if stale {
            let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(kernel.entry_point()),
                size,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            self.params.insert(kernel, buffer);
            self.bind_groups.retain(|(k, _), _| *k != kernel);
        }
    }

    fn ensure_bind_group(&mut self, call: &KernelCall) -> SimResult<(Kernel, Vec<TextureId>)> {
        let key = (call.kernel, call.textures());
        if self.bind_groups.contains_key(&key) {
            return Ok(key);
        }

        let program = self.program.as_ref().ok_or_else(|| {
            SimError::interop(InteropOp::Dispatch, "kernel program has not been built")
        })?;
        let params = self.params.get(&call.kernel).ok_or_else(|| {
            SimError::interop(InteropOp::Dispatch, "kernel parameters were not allocated")
        })?;

        let first = call.kernel.first_binding();
        let mut entries = Vec::with_capacity(key.1.len() + 1);
        for (i, id) in key.1.iter().enumerate() {
            let view = self.shared.get(id).ok_or_else(|| {
                SimError::interop(InteropOp::Dispatch, format!("texture {} is not shared", id.0))
            })?;
            entries.push(wgpu::BindGroupEntry {
                binding: first + i as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: first + key.1.len() as u32,
            resource: params.as_entire_binding(),
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(call.kernel.entry_point()),
            layout: &program.kernel(call.kernel).layout,
            entries: &entries,
        });
        self.bind_groups.insert(key.clone(), bind_group);
        Ok(key)
    }
}

impl InteropBackend for InteropSession {
    fn acquire(&mut self, handles: &[TextureId]) -> SimResult<AcquireToken> {
        // display commands touching these textures must retire first
        self.wait_idle(InteropOp::Acquire)?;
        let token = self.ledger.acquire(handles)?;
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        Ok(token)
    }

    fn dispatch(&mut self, token: &AcquireToken, call: &KernelCall) -> SimResult<()> {
        call.check_covered(token)?;

        let uniforms = call.params()?;
        self.ensure_params(call.kernel, uniforms.as_bytes().len() as u64);
        let key = self.ensure_bind_group(call)?;

        let (Some(program), Some(params), Some(bind_group)) = (
            self.program.as_ref(),
            self.params.get(&call.kernel),
            self.bind_groups.get(&key),
        ) else {
            return Err(SimError::interop(InteropOp::Dispatch, "kernel resources missing"));
        };
        self.queue.write_buffer(params, 0, uniforms.as_bytes());

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(call.kernel.entry_point()),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor::default());
            pass.set_pipeline(&program.kernel(call.kernel).pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(call.workgroups.0, call.workgroups.1, 1);
        }
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn release(&mut self, token: AcquireToken) -> SimResult<()> {
        let waited = self.wait_idle(InteropOp::Release);
        let scope = pollster::block_on(self.device.pop_error_scope());
        self.ledger.release(token)?;
        waited?;
        match scope {
            Some(err) => Err(SimError::interop(InteropOp::Dispatch, err)),
            None => Ok(()),
        }
    }

    fn finish(&mut self) -> SimResult<()> {
        self.wait_idle(InteropOp::Finish)
    }

    fn ledger(&self) -> &HandleLedger {
        &self.ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u32]) -> Vec<TextureId> {
        raw.iter().map(|&r| TextureId(r)).collect()
    }

    #[test]
    fn acquire_and_release_balance_counters() {
        let mut ledger = HandleLedger::default();
        let token = ledger.acquire(&ids(&[0, 1, 2])).unwrap();
        assert_eq!(ledger.hold_count(TextureId(1)), 1);
        assert_eq!(ledger.outstanding(), 1);
        assert!(ledger.ensure_free(&ids(&[2])).is_err());
        assert!(ledger.ensure_free(&ids(&[3])).is_ok());

        ledger.release(token).unwrap();
        assert_eq!(ledger.hold_count(TextureId(1)), 0);
        assert_eq!(ledger.outstanding(), 0);
        assert!(ledger.ensure_free(&ids(&[0, 1, 2])).is_ok());
    }

    #[test]
    fn overlapping_acquire_is_rejected() {
        let mut ledger = HandleLedger::default();
        let _held = ledger.acquire(&ids(&[4, 5])).unwrap();
        let err = ledger.acquire(&ids(&[5, 6])).unwrap_err();
        assert!(matches!(err, SimError::Interop { op: InteropOp::Acquire, .. }));
        // the failed request must not leave partial holds behind
        assert!(!ledger.is_held(TextureId(6)));
    }

    #[test]
    fn duplicate_handles_are_rejected() {
        let mut ledger = HandleLedger::default();
        assert!(ledger.acquire(&ids(&[1, 1])).is_err());
        assert_eq!(ledger.outstanding(), 0);
    }

    #[test]
    fn disjoint_brackets_may_coexist() {
        let mut ledger = HandleLedger::default();
        let a = ledger.acquire(&ids(&[1])).unwrap();
        let b = ledger.acquire(&ids(&[2])).unwrap();
        assert_eq!(ledger.outstanding(), 2);
        ledger.release(b).unwrap();
        assert!(ledger.is_held(TextureId(1)));
        ledger.release(a).unwrap();
        assert_eq!(ledger.outstanding(), 0);
    }

    #[test]
    fn reset_params_keep_order() {
        let call = KernelCall {
            kernel: Kernel::ResetFluid,
            args: vec![
                KernelArg::Texture(TextureId(1)),
                KernelArg::Float(1.0),
                KernelArg::Uint(64),
                KernelArg::Uint(32),
            ],
            workgroups: (4, 2),
        };
        assert_eq!(call.textures(), ids(&[1]));
        let KernelParams::Reset(params) = call.params().unwrap() else {
            panic!("expected reset params");
        };
        assert_eq!(
            bytemuck::cast::<ResetParams, [u32; 4]>(params),
            [1.0f32.to_bits(), 64, 32, 0]
        );
    }

    #[test]
    fn lbm_params_fill_the_eight_word_block() {
        let mut args: Vec<KernelArg> = (0..7).map(|i| KernelArg::Texture(TextureId(i))).collect();
        args.extend([
            KernelArg::Float(0.58),
            KernelArg::Uint(400),
            KernelArg::Uint(200),
            KernelArg::Float(12.5),
            KernelArg::Float(170.0),
            KernelArg::Uint(1),
            KernelArg::Float(8.0),
        ]);
        let call = KernelCall {
            kernel: Kernel::Lbm,
            args,
            workgroups: (25, 13),
        };
        let KernelParams::Lbm(params) = call.params().unwrap() else {
            panic!("expected lbm params");
        };
        assert_eq!(
            bytemuck::cast::<LbmParams, [u32; 8]>(params),
            [
                0.58f32.to_bits(),
                400,
                200,
                12.5f32.to_bits(),
                170.0f32.to_bits(),
                1,
                8.0f32.to_bits(),
                0,
            ]
        );
        assert_eq!(KernelParams::Lbm(params).as_bytes().len(), 32);
    }

    #[test]
    fn mistyped_or_missing_scalars_are_rejected() {
        let swapped = KernelCall {
            kernel: Kernel::ResetFluid,
            args: vec![KernelArg::Uint(1), KernelArg::Uint(64), KernelArg::Uint(32)],
            workgroups: (1, 1),
        };
        let err = swapped.params().unwrap_err();
        assert!(matches!(err, SimError::Interop { op: InteropOp::Dispatch, .. }));

        let short = KernelCall {
            kernel: Kernel::Lbm,
            args: vec![KernelArg::Float(0.58), KernelArg::Uint(4), KernelArg::Uint(4)],
            workgroups: (1, 1),
        };
        assert!(short.params().is_err());

        let long = KernelCall {
            kernel: Kernel::ResetFluid,
            args: vec![
                KernelArg::Float(1.0),
                KernelArg::Uint(4),
                KernelArg::Uint(4),
                KernelArg::Uint(9),
            ],
            workgroups: (1, 1),
        };
        assert!(long.params().unwrap_err().to_string().contains("3 scalar arguments"));
    }

    #[test]
    fn dispatch_outside_bracket_is_caught() {
        let mut ledger = HandleLedger::default();
        let token = ledger.acquire(&ids(&[1, 2])).unwrap();
        let call = KernelCall {
            kernel: Kernel::ResetFluid,
            args: vec![
                KernelArg::Texture(TextureId(1)),
                KernelArg::Texture(TextureId(3)),
            ],
            workgroups: (1, 1),
        };
        let err = call.check_covered(&token).unwrap_err();
        assert!(err.to_string().contains("texture 3"));
    }
}
