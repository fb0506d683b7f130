//! GPU-resident D2Q9 lattice-Boltzmann simulation.
//!
//! State lives in textures shared by a compute program and the display
//! pipeline; [`stepper::SimulationStepper`] drives each tick through the
//! acquire/dispatch/release bracket of an [`interop::InteropBackend`].

pub mod app;
pub mod config;
pub mod device;
pub mod error;
pub mod headless;
pub mod init;
pub mod input;
pub mod interop;
pub mod lattice;
pub mod mask;
pub mod program;
pub mod render;
pub mod session;
pub mod state;
pub mod stepper;

pub use config::SimulationConfig;
pub use error::{InteropOp, SimError, SimResult};
pub use session::SimulationSession;
