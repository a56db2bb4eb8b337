//! Per-session capability overrides.
//!
//! Overrides are looked up synchronously when a backend is initialized and
//! when its features are refreshed. The config-backed source matches a
//! printer by serial number first and falls back to its address.

use std::collections::HashMap;
use std::sync::RwLock;

use printfleet_core::{Capability, CapabilityOverrides, ConnectionParameters, OverrideSetting};

use super::config::{AppConfig, PrinterOverrides};

pub trait OverrideSource: Send + Sync {
    fn overrides_for(&self, params: &ConnectionParameters) -> CapabilityOverrides;
}

/// Overrides from the `[[printers]]` table.
///
/// Entries can be replaced at runtime (e.g. after the settings screen saved a
/// new file) with [`ConfigOverrideSource::reload`].
#[derive(Default)]
pub struct ConfigOverrideSource {
    tables: RwLock<Tables>,
}

#[derive(Default)]
struct Tables {
    by_serial: HashMap<String, CapabilityOverrides>,
    by_address: HashMap<String, CapabilityOverrides>,
}

impl ConfigOverrideSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let source = Self::new();
        source.reload(config);
        source
    }

    /// Replaces every entry with those in `config`.
    pub fn reload(&self, config: &AppConfig) {
        let mut tables = Tables::default();
        for printer in &config.printers {
            let overrides = to_capability_overrides(&printer.overrides);
            if let Some(serial) = &printer.serial_number {
                tables.by_serial.insert(serial.clone(), overrides.clone());
            }
            tables.by_address.insert(printer.address.clone(), overrides);
        }
        *self.tables.write().expect("lock poisoned") = tables;
    }

    /// Sets the overrides for one printer address.
    pub fn set_for_address(&self, address: impl Into<String>, overrides: CapabilityOverrides) {
        self.tables
            .write()
            .expect("lock poisoned")
            .by_address
            .insert(address.into(), overrides);
    }
}

impl OverrideSource for ConfigOverrideSource {
    fn overrides_for(&self, params: &ConnectionParameters) -> CapabilityOverrides {
        let tables = self.tables.read().expect("lock poisoned");
        params
            .serial_number
            .as_ref()
            .and_then(|serial| tables.by_serial.get(serial))
            .or_else(|| tables.by_address.get(&params.address))
            .cloned()
            .unwrap_or_default()
    }
}

fn switch(enabled: bool) -> OverrideSetting {
    if enabled {
        OverrideSetting::ForceOn
    } else {
        OverrideSetting::ForceOff
    }
}

/// Maps user-facing switches onto capability overrides. An explicit
/// `camera = false` wins over a custom camera URL.
pub fn to_capability_overrides(settings: &PrinterOverrides) -> CapabilityOverrides {
    let mut overrides = CapabilityOverrides::new();
    if let Some(url) = &settings.camera_url {
        overrides.set(Capability::Camera, OverrideSetting::CustomUrl { url: url.clone() });
    }
    if settings.camera == Some(false) {
        overrides.set(Capability::Camera, OverrideSetting::ForceOff);
    }
    if let Some(on) = settings.led {
        overrides.set(Capability::Led, switch(on));
    }
    if let Some(on) = settings.filtration {
        overrides.set(Capability::Filtration, switch(on));
    }
    if let Some(on) = settings.material_station {
        overrides.set(Capability::MaterialMultiplexing, switch(on));
    }
    overrides
}
