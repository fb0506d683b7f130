use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{SimError, SimResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    #[serde(default = "default_mask_path")]
    pub mask_path: PathBuf,
    #[serde(default = "default_kernel_path")]
    pub kernel_path: PathBuf,
    #[serde(default = "default_tau")]
    pub tau: f32,
    #[serde(default = "default_ux_init")]
    pub ux_init: f32,
    #[serde(default = "default_uy_init")]
    pub uy_init: f32,
    #[serde(default = "default_rho_init")]
    pub rho_init: f32,
    #[serde(default = "default_vendors")]
    pub preferred_vendors: Vec<String>,
    #[serde(default = "default_vsync")]
    pub vsync: bool,
    #[serde(default = "default_fps_interval")]
    pub fps_interval_secs: f64,
    #[serde(default = "default_cursor_radius")]
    pub cursor_radius: f32,
}

fn default_mask_path() -> PathBuf { PathBuf::from("assets/mask.png") }
fn default_kernel_path() -> PathBuf { PathBuf::from("shaders/lbm.wgsl") }
fn default_tau() -> f32 { 0.58 }
fn default_ux_init() -> f32 { 0.3 }
fn default_uy_init() -> f32 { 0.06 }
fn default_rho_init() -> f32 { 1.0 }
fn default_vsync() -> bool { true }
fn default_fps_interval() -> f64 { 0.1 }
fn default_cursor_radius() -> f32 { 8.0 }

fn default_vendors() -> Vec<String> {
    ["NVIDIA", "AMD", "Intel", "Apple", "Mesa"]
        .iter()
        .map(|v| v.to_string())
        .collect()
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            mask_path: default_mask_path(),
            kernel_path: default_kernel_path(),
            tau: default_tau(),
            ux_init: default_ux_init(),
            uy_init: default_uy_init(),
            rho_init: default_rho_init(),
            preferred_vendors: default_vendors(),
            vsync: default_vsync(),
            fps_interval_secs: default_fps_interval(),
            cursor_radius: default_cursor_radius(),
        }
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub mask_path: Option<PathBuf>,
    pub kernel_path: Option<PathBuf>,
    pub tau: Option<f32>,
    pub rho_init: Option<f32>,
    pub vsync: Option<bool>,
}

impl SimulationConfig {
    pub fn from_toml_str(text: &str) -> SimResult<Self> {
        toml::from_str(text).map_err(|e| SimError::Configuration(format!("config parse: {e}")))
    }

    pub fn load(path: &Path) -> SimResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SimError::Configuration(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Defaults, then the optional file, then CLI overrides; validated.
    pub fn resolve(file: Option<&Path>, overrides: &ConfigOverrides) -> SimResult<Self> {
        let mut config = match file {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(path) = &overrides.mask_path {
            self.mask_path = path.clone();
        }
        if let Some(path) = &overrides.kernel_path {
            self.kernel_path = path.clone();
        }
        if let Some(tau) = overrides.tau {
            self.tau = tau;
        }
        if let Some(rho) = overrides.rho_init {
            self.rho_init = rho;
        }
        if let Some(vsync) = overrides.vsync {
            self.vsync = vsync;
        }
    }

    pub fn validate(&self) -> SimResult<()> {
        // viscosity (tau - 0.5) / 3 must stay positive
        if !(self.tau > 0.5) {
            return Err(SimError::Configuration(format!(
                "tau must be greater than 0.5, got {}",
                self.tau
            )));
        }
        if !(self.rho_init > 0.0) {
            return Err(SimError::Configuration(format!(
                "rho_init must be positive, got {}",
                self.rho_init
            )));
        }
        let speed = (self.ux_init * self.ux_init + self.uy_init * self.uy_init).sqrt();
        if !(speed < crate::lattice::SOUND_SPEED) {
            return Err(SimError::Configuration(format!(
                "initial speed {speed:.3} must stay below the lattice sound speed"
            )));
        }
        if self.preferred_vendors.is_empty() {
            return Err(SimError::Configuration("preferred_vendors is empty".into()));
        }
        if !(self.fps_interval_secs > 0.0 && self.fps_interval_secs.is_finite()) {
            return Err(SimError::Configuration(format!(
                "fps_interval_secs must be positive and finite, got {}",
                self.fps_interval_secs
            )));
        }
        if !(self.cursor_radius >= 0.0) {
            return Err(SimError::Configuration(
                "cursor_radius must not be negative".into(),
            ));
        }
        Ok(())
    }
}
