use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use lattice_flow::config::{ConfigOverrides, SimulationConfig};
use lattice_flow::{app, headless, init, mask, SimError};

#[derive(Debug, Parser)]
#[command(name = "lattice-flow", version, about = "GPU lattice-Boltzmann flow around an image mask")]
struct Cli {
    #[command(flatten)]
    sim: SimArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Args)]
struct SimArgs {
    /// TOML config file; flags below override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Boundary mask image (black = solid).
    #[arg(long, global = true)]
    mask: Option<PathBuf>,

    /// WGSL source with the `lbm` and `reset_fluid` kernels.
    #[arg(long, global = true)]
    kernel: Option<PathBuf>,

    #[arg(long, global = true)]
    tau: Option<f32>,

    #[arg(long, global = true)]
    rho: Option<f32>,

    #[arg(long, global = true)]
    no_vsync: bool,
}

impl SimArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            mask_path: self.mask.clone(),
            kernel_path: self.kernel.clone(),
            tau: self.tau,
            rho_init: self.rho,
            vsync: self.no_vsync.then_some(false),
        }
    }
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Command {
    /// Open the window and run interactively (default).
    Run,
    /// Step without a window and print a JSON report.
    Bench {
        #[arg(long, default_value_t = 500)]
        ticks: u32,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let bench = matches!(cli.command, Some(Command::Bench { .. }));
    if let Err(err) = run(cli) {
        let code = err.downcast_ref::<SimError>().map_or(1, SimError::exit_code);
        if bench {
            let out = serde_json::json!({"ok": false, "error": format!("{err:#}")});
            println!(
                "{}",
                serde_json::to_string_pretty(&out).unwrap_or_else(|_| "{\"ok\":false}".into())
            );
        } else {
            eprintln!("error: {err:#}");
        }
        std::process::exit(code);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = SimulationConfig::resolve(cli.sim.config.as_deref(), &cli.sim.overrides())
        .context("loading configuration")?;

    let mask = mask::load_mask(&config.mask_path)?;
    let state = init::initialize(&mask, config.ux_init, config.uy_init, config.rho_init)
        .context("initializing lattice")?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => app::run(config, state)?,
        Command::Bench { ticks } => {
            let report = headless::run_bench(&config, &state, ticks.max(1))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
