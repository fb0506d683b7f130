//! Compute device selection.

use crate::error::{SimError, SimResult};
use crate::state::STATE_FORMAT;

pub const REQUIRED_CAPABILITY: &str = "storage-writable Rgba32Float textures shared with the display surface";

/// The parts of an adapter's identity used for vendor matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterSummary {
    pub name: String,
    pub driver: String,
    pub driver_info: String,
    pub vendor_id: u32,
}

impl From<&wgpu::AdapterInfo> for AdapterSummary {
    fn from(info: &wgpu::AdapterInfo) -> Self {
        Self {
            name: info.name.clone(),
            driver: info.driver.clone(),
            driver_info: info.driver_info.clone(),
            vendor_id: info.vendor,
        }
    }
}

fn pci_vendor(vendor: &str) -> Option<u32> {
    match vendor.to_ascii_lowercase().as_str() {
        "nvidia" => Some(0x10de),
        "amd" => Some(0x1002),
        "intel" => Some(0x8086),
        "apple" => Some(0x106b),
        _ => None,
    }
}

pub fn matches_vendor(adapter: &AdapterSummary, vendor: &str) -> bool {
    let needle = vendor.to_ascii_lowercase();
    let text_match = [&adapter.name, &adapter.driver, &adapter.driver_info]
        .iter()
        .any(|field| field.to_ascii_lowercase().contains(&needle));
    text_match || pci_vendor(vendor) == Some(adapter.vendor_id)
}

/// Adapter indices in vendor preference order; each adapter appears once.
pub fn rank_adapters(adapters: &[AdapterSummary], preferred: &[String]) -> Vec<usize> {
    let mut order = Vec::new();
    for vendor in preferred {
        for (i, adapter) in adapters.iter().enumerate() {
            if !order.contains(&i) && matches_vendor(adapter, vendor) {
                order.push(i);
            }
        }
    }
    order
}

fn supports_capability(adapter: &wgpu::Adapter, surface: Option<&wgpu::Surface<'_>>) -> bool {
    let storage = adapter
        .get_texture_format_features(STATE_FORMAT)
        .allowed_usages
        .contains(wgpu::TextureUsages::STORAGE_BINDING);
    let presents = surface.is_none_or(|s| adapter.is_surface_supported(s));
    storage && presents
}

/// Picks the first adapter, in vendor preference order, able to share
/// lattice textures with `surface` (or any adapter when headless).
pub fn select_compute_device(
    instance: &wgpu::Instance,
    surface: Option<&wgpu::Surface<'_>>,
    preferred: &[String],
) -> SimResult<wgpu::Adapter> {
    let mut adapters = instance.enumerate_adapters(wgpu::Backends::all());
    let summaries: Vec<AdapterSummary> = adapters
        .iter()
        .map(|a| AdapterSummary::from(&a.get_info()))
        .collect();
    for s in &summaries {
        log::debug!("adapter candidate: {} ({}, {})", s.name, s.driver, s.driver_info);
    }

    let order = rank_adapters(&summaries, preferred);
    if order.is_empty() {
        return Err(SimError::PlatformNotFound {
            preferred: preferred.to_vec(),
        });
    }

    for idx in order {
        if supports_capability(&adapters[idx], surface) {
            log::info!("Found platform: {}", summaries[idx].name);
            log::info!("Found sharing capability: {REQUIRED_CAPABILITY}");
            return Ok(adapters.swap_remove(idx));
        }
        log::warn!("{} lacks {REQUIRED_CAPABILITY}", summaries[idx].name);
    }
    Err(SimError::DeviceNotFound {
        capability: REQUIRED_CAPABILITY.to_string(),
    })
}
