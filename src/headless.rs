//! Headless benchmark: the interactive tick without a window.

use serde::Serialize;

use crate::config::SimulationConfig;
use crate::device::select_compute_device;
use crate::error::SimResult;
use crate::init::InitialState;
use crate::lattice::ChannelGroup;
use crate::session::SimulationSession;
use crate::stepper::KernelCursor;

#[derive(Debug, Serialize)]
pub struct BenchReport {
    pub ok: bool,
    pub adapter: String,
    pub width: u32,
    pub height: u32,
    pub ticks: u32,
    pub parity: usize,
    pub elapsed_ms: f64,
    pub tps: f64,
    #[serde(flatten)]
    pub field: FieldStats,
}

/// Summary of group C texels `(f0, rho, ux, uy)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldStats {
    pub mean_rho: f32,
    pub mean_speed: f32,
    pub max_speed: f32,
}

impl FieldStats {
    pub fn summarize(texels: &[[f32; 4]]) -> Self {
        if texels.is_empty() {
            return Self {
                mean_rho: 0.0,
                mean_speed: 0.0,
                max_speed: 0.0,
            };
        }
        let mut rho_sum = 0.0f64;
        let mut speed_sum = 0.0f64;
        let mut max_speed = 0.0f32;
        for &[_, rho, ux, uy] in texels {
            let speed = (ux * ux + uy * uy).sqrt();
            rho_sum += rho as f64;
            speed_sum += speed as f64;
            max_speed = max_speed.max(speed);
        }
        let n = texels.len() as f64;
        Self {
            mean_rho: (rho_sum / n) as f32,
            mean_speed: (speed_sum / n) as f32,
            max_speed,
        }
    }
}

pub fn run_bench(config: &SimulationConfig, init: &InitialState, ticks: u32) -> SimResult<BenchReport> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
    let adapter = select_compute_device(&instance, None, &config.preferred_vendors)?;
    let mut session = SimulationSession::new(&adapter, config, init)?;

    let t0 = std::time::Instant::now();
    for _ in 0..ticks {
        session.step(false, KernelCursor::NONE)?;
    }
    let elapsed_ms = t0.elapsed().as_secs_f64() * 1000.0;

    let field = FieldStats::summarize(&session.read_state(ChannelGroup::C)?);
    let dims = session.dims();
    log::info!("bench: {ticks} ticks in {elapsed_ms:.1} ms");
    Ok(BenchReport {
        ok: true,
        adapter: session.adapter_name().to_string(),
        width: dims.width,
        height: dims.height,
        ticks,
        parity: session.stepper().parity(),
        elapsed_ms,
        tps: if elapsed_ms > 0.0 { ticks as f64 * 1000.0 / elapsed_ms } else { 0.0 },
        field,
    })
}
