mod common;

use common::{fixture, Recorded};
use lattice_flow::interop::{InteropBackend, KernelArg};
use lattice_flow::lattice::{equilibrium, BufferIndex, ChannelGroup, WEIGHTS};
use lattice_flow::program::Kernel;
use lattice_flow::stepper::{KernelCursor, TickPhase};
use lattice_flow::{InteropOp, SimError};

#[test]
fn parity_equals_completed_ticks_mod_two() {
    let (mut stepper, mut backend) = fixture(20, 20);
    for n in 0..6u64 {
        assert_eq!(stepper.parity() as u64, n % 2);
        assert_eq!(stepper.ticks(), n);
        stepper.tick(&mut backend, KernelCursor::NONE).unwrap();
    }
    assert_eq!(stepper.parity(), 0);
}

#[test]
fn reset_keeps_parity() {
    let (mut stepper, mut backend) = fixture(20, 20);
    stepper.tick(&mut backend, KernelCursor::NONE).unwrap();
    assert_eq!(stepper.parity(), 1);
    stepper.reset(&mut backend).unwrap();
    stepper.reset(&mut backend).unwrap();
    assert_eq!(stepper.parity(), 1);
    assert_eq!(stepper.resets(), 2);
}

#[test]
fn tick_runs_one_full_bracket_over_every_texture() {
    let (mut stepper, mut backend) = fixture(20, 20);
    stepper.tick(&mut backend, KernelCursor::NONE).unwrap();

    let all = backend.handles.all();
    assert_eq!(backend.calls.len(), 4);
    assert_eq!(backend.calls[0], Recorded::Acquire(all.clone()));
    assert!(matches!(&backend.calls[1], Recorded::Dispatch(call) if call.kernel == Kernel::Lbm));
    assert_eq!(backend.calls[2], Recorded::Release(all));
    assert_eq!(backend.calls[3], Recorded::Finish);
    assert_eq!(stepper.phase(), TickPhase::Idle);
}

#[test]
fn reset_bracket_covers_read_buffer_only() {
    let (mut stepper, mut backend) = fixture(20, 20);
    stepper.tick(&mut backend, KernelCursor::NONE).unwrap();
    backend.calls.clear();

    stepper.reset(&mut backend).unwrap();
    let read = backend.handles.buffer(BufferIndex::One).to_vec();
    assert_eq!(backend.calls[0], Recorded::Acquire(read.clone()));
    assert!(!read.contains(&backend.handles.boundary));
    assert!(
        matches!(&backend.calls[1], Recorded::Dispatch(call) if call.kernel == Kernel::ResetFluid)
    );
    assert_eq!(backend.calls[2], Recorded::Release(read));
    assert_eq!(backend.calls[3], Recorded::Finish);
}

#[test]
fn renderer_never_sees_acquired_textures() {
    let (mut stepper, mut backend) = fixture(20, 20);
    for _ in 0..3 {
        stepper.tick(&mut backend, KernelCursor::NONE).unwrap();
        // between ticks nothing is held and the display textures are free
        assert_eq!(backend.ledger().outstanding(), 0);
        assert!(backend.ledger().ensure_free(&stepper.display_textures()).is_ok());
    }
    // while each dispatch ran, every bracketed texture was off-limits
    assert_eq!(backend.blocked_during_dispatch.len(), 3 * 7);
}

#[test]
fn display_reads_the_buffer_just_written() {
    let (mut stepper, mut backend) = fixture(20, 20);
    let written = stepper.write_buffer();
    stepper.tick(&mut backend, KernelCursor::NONE).unwrap();
    let [_, shown] = stepper.display_textures();
    assert_eq!(shown, backend.handles.group(written, ChannelGroup::C));
    // the CPU lbm copies state forward, so the written buffer now holds it
    let expected = equilibrium(1.0, 0.3, 0.06)[0];
    assert!(backend
        .texture(written, ChannelGroup::C)
        .iter()
        .all(|t| (t[0] - expected).abs() < 1e-7));
}

#[test]
fn arguments_bind_in_fixed_order_with_flipped_cursor() {
    let (mut stepper, mut backend) = fixture(24, 40);
    stepper
        .tick(&mut backend, KernelCursor::from_window(Some((6.0, 10.0)), 40))
        .unwrap();
    let Recorded::Dispatch(call) = &backend.calls[1] else {
        panic!("expected dispatch, got {:?}", backend.calls[1]);
    };
    let h = backend.handles;
    let mut textures = vec![h.boundary];
    textures.extend(h.buffer(BufferIndex::Zero));
    textures.extend(h.buffer(BufferIndex::One));
    assert_eq!(call.textures(), textures);
    assert_eq!(
        call.args[7..],
        [
            KernelArg::Float(0.58),
            KernelArg::Uint(24),
            KernelArg::Uint(40),
            KernelArg::Float(6.0),
            KernelArg::Float(30.0),
            KernelArg::Uint(1),
            KernelArg::Float(8.0),
        ]
    );
}

#[test]
fn second_tick_swaps_read_and_write_groups() {
    let (mut stepper, mut backend) = fixture(16, 16);
    stepper.tick(&mut backend, KernelCursor::NONE).unwrap();
    stepper.tick(&mut backend, KernelCursor::NONE).unwrap();
    let Recorded::Dispatch(call) = &backend.calls[5] else {
        panic!("expected dispatch, got {:?}", backend.calls[5]);
    };
    let textures = call.textures();
    assert_eq!(textures[1..4], backend.handles.buffer(BufferIndex::One));
    assert_eq!(textures[4..7], backend.handles.buffer(BufferIndex::Zero));
}

#[test]
fn dispatch_grid_rounds_up() {
    let (mut stepper, mut backend) = fixture(17, 33);
    stepper.tick(&mut backend, KernelCursor::NONE).unwrap();
    let Recorded::Dispatch(call) = &backend.calls[1] else {
        panic!("expected dispatch");
    };
    assert_eq!(call.workgroups, (2, 3));
}

#[test]
fn reset_writes_rest_equilibrium_into_buffer_zero_only() {
    let (mut stepper, mut backend) = fixture(4, 4);
    let untouched: Vec<_> = ChannelGroup::ALL
        .iter()
        .map(|&g| backend.texture(BufferIndex::One, g).to_vec())
        .collect();

    stepper.reset(&mut backend).unwrap();

    for texel in backend.texture(BufferIndex::Zero, ChannelGroup::C) {
        assert!((texel[0] - 4.0 / 9.0).abs() < 1e-7);
        assert_eq!(texel[1..], [1.0, 0.0, 0.0]);
    }
    for texel in backend.texture(BufferIndex::Zero, ChannelGroup::A) {
        assert_eq!(*texel, [WEIGHTS[1], WEIGHTS[2], WEIGHTS[3], WEIGHTS[4]]);
    }
    for (g, before) in ChannelGroup::ALL.iter().zip(&untouched) {
        assert_eq!(backend.texture(BufferIndex::One, *g), &before[..]);
    }
}

#[test]
fn failed_dispatch_still_releases_and_keeps_parity() {
    let (mut stepper, mut backend) = fixture(20, 20);
    backend.fail_dispatch = true;
    let err = stepper.tick(&mut backend, KernelCursor::NONE).unwrap_err();
    assert!(matches!(err, SimError::Interop { op: InteropOp::Dispatch, .. }));
    assert_eq!(stepper.parity(), 0);
    assert_eq!(stepper.ticks(), 0);
    assert_eq!(backend.ledger().outstanding(), 0);
    assert!(backend.calls.iter().any(|c| matches!(c, Recorded::Release(_))));
}

#[test]
fn failed_acquire_never_dispatches() {
    let (mut stepper, mut backend) = fixture(20, 20);
    backend.fail_acquire = true;
    let err = stepper.reset(&mut backend).unwrap_err();
    assert_eq!(err.exit_code(), 4);
    assert_eq!(backend.calls.len(), 1);
    assert_eq!(stepper.resets(), 0);
}
