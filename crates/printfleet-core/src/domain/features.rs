//! Capability model and the feature resolver.
//!
//! Every backend variant declares a static [`CapabilityMatrix`]. At runtime the
//! matrix is combined with a [`HardwareProbe`] (what the printer reports about
//! itself) and the user's [`CapabilityOverrides`] into an immutable
//! [`FeatureSet`].
//!
//! # Precedence
//!
//! ```text
//! valid user override  >  probe-augmented base  >  static base
//! ```
//!
//! An override that fails validation is ignored and resolution falls through
//! to the next rule. [`validate_overrides`] reports the rejected ones so the
//! caller can log them; [`resolve`] itself has no side effects.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Capabilities a session can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    Camera,
    Led,
    Filtration,
    CommandExecution,
    StatusMonitoring,
    JobControl,
    MaterialMultiplexing,
}

impl Capability {
    pub const ALL: [Capability; 7] = [
        Capability::Camera,
        Capability::Led,
        Capability::Filtration,
        Capability::CommandExecution,
        Capability::StatusMonitoring,
        Capability::JobControl,
        Capability::MaterialMultiplexing,
    ];

    /// Human-readable name used in disabled reasons.
    pub fn label(self) -> &'static str {
        match self {
            Capability::Camera => "camera",
            Capability::Led => "LED control",
            Capability::Filtration => "filtration",
            Capability::CommandExecution => "command execution",
            Capability::StatusMonitoring => "status monitoring",
            Capability::JobControl => "job control",
            Capability::MaterialMultiplexing => "material station",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Availability record for one capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<String>,
}

impl Availability {
    pub fn enabled() -> Self {
        Self {
            available: true,
            disabled_reason: None,
        }
    }

    pub fn disabled(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            disabled_reason: Some(reason.into()),
        }
    }
}

/// How a backend variant supports a capability before any runtime information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseSupport {
    /// Always available on this variant.
    Native,
    /// Available only if the hardware probe reports the component.
    RequiresProbe,
    /// The variant cannot drive this capability.
    Unsupported { reason: String },
}

impl BaseSupport {
    pub fn unsupported(reason: impl Into<String>) -> Self {
        BaseSupport::Unsupported {
            reason: reason.into(),
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, BaseSupport::Unsupported { .. })
    }
}

/// Static capability declaration of a backend variant.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CapabilityMatrix {
    entries: BTreeMap<Capability, BaseSupport>,
}

impl CapabilityMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, capability: Capability, support: BaseSupport) -> Self {
        self.entries.insert(capability, support);
        self
    }

    /// Returns the declared support; undeclared capabilities are unsupported.
    pub fn support(&self, capability: Capability) -> BaseSupport {
        self.entries
            .get(&capability)
            .cloned()
            .unwrap_or_else(|| BaseSupport::unsupported("not provided by this backend"))
    }
}

/// What the printer reported about its own hardware.
///
/// A capability absent from the probe means "unknown", which is different from
/// "reported missing".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HardwareProbe {
    detected: BTreeMap<Capability, bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    camera_url: Option<String>,
}

impl HardwareProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, capability: Capability, present: bool) -> Self {
        self.detected.insert(capability, present);
        self
    }

    pub fn with_camera_url(mut self, url: impl Into<String>) -> Self {
        self.camera_url = Some(url.into());
        self
    }

    pub fn detected(&self, capability: Capability) -> Option<bool> {
        self.detected.get(&capability).copied()
    }

    /// Stream URL advertised by the printer, if any.
    pub fn camera_url(&self) -> Option<&str> {
        self.camera_url.as_deref()
    }
}

/// A single per-session user override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum OverrideSetting {
    ForceOn,
    ForceOff,
    /// Enable the capability through a user-supplied endpoint (camera only).
    CustomUrl { url: String },
}

/// Per-session user overrides, read from the override source.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CapabilityOverrides {
    entries: BTreeMap<Capability, OverrideSetting>,
}

impl CapabilityOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, capability: Capability, setting: OverrideSetting) -> Self {
        self.entries.insert(capability, setting);
        self
    }

    pub fn set(&mut self, capability: Capability, setting: OverrideSetting) {
        self.entries.insert(capability, setting);
    }

    pub fn get(&self, capability: Capability) -> Option<&OverrideSetting> {
        self.entries.get(&capability)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the custom camera URL when one is configured.
    pub fn custom_camera_url(&self) -> Option<&str> {
        match self.entries.get(&Capability::Camera) {
            Some(OverrideSetting::CustomUrl { url }) => Some(url.as_str()),
            _ => None,
        }
    }
}

/// An override that was ignored during resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{capability} override ignored: {reason}")]
pub struct OverrideRejection {
    pub capability: Capability,
    pub reason: String,
}

/// Resolved, immutable capability descriptor for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSet {
    entries: BTreeMap<Capability, Availability>,
}

impl FeatureSet {
    /// Availability of `capability`. Every capability is always present.
    pub fn get(&self, capability: Capability) -> Availability {
        self.entries
            .get(&capability)
            .cloned()
            .unwrap_or_else(|| Availability::disabled("not resolved"))
    }

    pub fn is_available(&self, capability: Capability) -> bool {
        self.entries
            .get(&capability)
            .map(|a| a.available)
            .unwrap_or(false)
    }

    pub fn disabled_reason(&self, capability: Capability) -> Option<&str> {
        self.entries
            .get(&capability)
            .and_then(|a| a.disabled_reason.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Capability, &Availability)> {
        self.entries.iter().map(|(c, a)| (*c, a))
    }

    pub fn available_capabilities(&self) -> Vec<Capability> {
        self.iter()
            .filter(|(_, a)| a.available)
            .map(|(c, _)| c)
            .collect()
    }
}

const REASON_DISABLED_BY_USER: &str = "disabled in printer settings";

/// Merges base capabilities, a hardware probe and user overrides.
///
/// Deterministic and side-effect free.
pub fn resolve(
    base: &CapabilityMatrix,
    probe: &HardwareProbe,
    overrides: &CapabilityOverrides,
) -> FeatureSet {
    let entries = Capability::ALL
        .iter()
        .map(|&capability| {
            let availability = match overrides.get(capability) {
                Some(setting) if check_override(capability, setting, base).is_ok() => {
                    from_override(setting)
                }
                _ => from_base(capability, &base.support(capability), probe),
            };
            (capability, availability)
        })
        .collect();
    FeatureSet { entries }
}

/// Returns every override that [`resolve`] would ignore, with the reason.
pub fn validate_overrides(
    base: &CapabilityMatrix,
    overrides: &CapabilityOverrides,
) -> Vec<OverrideRejection> {
    overrides
        .entries
        .iter()
        .filter_map(|(&capability, setting)| {
            check_override(capability, setting, base)
                .err()
                .map(|reason| OverrideRejection { capability, reason })
        })
        .collect()
}

fn from_override(setting: &OverrideSetting) -> Availability {
    match setting {
        OverrideSetting::ForceOn | OverrideSetting::CustomUrl { .. } => Availability::enabled(),
        OverrideSetting::ForceOff => Availability::disabled(REASON_DISABLED_BY_USER),
    }
}

fn from_base(capability: Capability, support: &BaseSupport, probe: &HardwareProbe) -> Availability {
    match (support, probe.detected(capability)) {
        (BaseSupport::Unsupported { reason }, _) => Availability::disabled(reason.clone()),
        (_, Some(false)) => {
            Availability::disabled(format!("{capability} not detected on the printer"))
        }
        (BaseSupport::Native, _) | (BaseSupport::RequiresProbe, Some(true)) => {
            Availability::enabled()
        }
        (BaseSupport::RequiresProbe, None) => Availability::disabled(format!(
            "{capability} hardware was not reported by the printer"
        )),
    }
}

fn check_override(
    capability: Capability,
    setting: &OverrideSetting,
    base: &CapabilityMatrix,
) -> Result<(), String> {
    match (capability, setting) {
        (Capability::StatusMonitoring, OverrideSetting::ForceOff) => {
            Err("status monitoring cannot be disabled".to_string())
        }
        (_, OverrideSetting::ForceOff) => Ok(()),
        (Capability::Camera, OverrideSetting::CustomUrl { url }) => validate_stream_url(url),
        (Capability::Camera, OverrideSetting::ForceOn) => {
            Err("enabling the camera requires a custom stream URL".to_string())
        }
        (_, OverrideSetting::CustomUrl { .. }) => {
            Err("custom URLs are only supported for the camera".to_string())
        }
        (Capability::Led, OverrideSetting::ForceOn) => {
            if base.support(Capability::Led).is_supported()
                || base.support(Capability::CommandExecution).is_supported()
            {
                Ok(())
            } else {
                Err("custom LEDs need G-code command execution".to_string())
            }
        }
        (_, OverrideSetting::ForceOn) => {
            if base.support(capability).is_supported() {
                Ok(())
            } else {
                Err(format!("this backend cannot drive {capability}"))
            }
        }
    }
}

fn validate_stream_url(url: &str) -> Result<(), String> {
    let rest = ["http://", "https://", "rtsp://"]
        .iter()
        .find_map(|scheme| url.strip_prefix(scheme))
        .ok_or_else(|| format!("unsupported stream URL scheme in {url:?}"))?;
    let host = rest.split(['/', '?', '#']).next().unwrap_or("");
    if host.is_empty() || host.starts_with(':') {
        return Err(format!("stream URL {url:?} has no host"));
    }
    Ok(())
}
