//! Backend variants and model resolution.
//!
//! A printer's declared model string is mapped to exactly one [`BackendKind`]
//! by walking [`MODEL_RULES`] in order and taking the first match. The last
//! rule matches anything, so resolution never fails: unknown printers are
//! served by the generic legacy backend.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::features::{BaseSupport, Capability, CapabilityMatrix};
use super::session::ConnectionParameters;

/// Closed set of backend adapter variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Legacy TCP G-code protocol only. Fallback for unknown models.
    GenericLegacy,
    /// Adventurer 5M: HTTP API plus legacy TCP channel.
    Adventurer5M,
    /// Adventurer 5M Pro: as 5M, with camera and filtration.
    Adventurer5MPro,
    /// AD5X: dual API with an optional material station.
    Ad5x,
}

impl BackendKind {
    /// Resolves the variant for a connection, honouring `force_legacy`.
    pub fn for_connection(params: &ConnectionParameters) -> BackendKind {
        if params.force_legacy {
            return BackendKind::GenericLegacy;
        }
        resolve_backend_kind(params.model.as_deref())
    }

    pub fn display_name(self) -> &'static str {
        match self {
            BackendKind::GenericLegacy => "Generic Legacy",
            BackendKind::Adventurer5M => "Adventurer 5M",
            BackendKind::Adventurer5MPro => "Adventurer 5M Pro",
            BackendKind::Ad5x => "AD5X",
        }
    }

    /// Returns `true` if this variant needs the HTTP API client in addition
    /// to the legacy TCP client.
    pub fn is_dual_api(self) -> bool {
        !matches!(self, BackendKind::GenericLegacy)
    }

    /// Static capability declaration for this variant.
    pub fn base_capabilities(self) -> CapabilityMatrix {
        let common = CapabilityMatrix::new()
            .with(Capability::StatusMonitoring, BaseSupport::Native)
            .with(Capability::CommandExecution, BaseSupport::Native)
            .with(Capability::JobControl, BaseSupport::Native);

        match self {
            BackendKind::GenericLegacy => common
                .with(
                    Capability::Camera,
                    BaseSupport::unsupported(
                        "legacy printers have no built-in camera; configure a custom camera URL",
                    ),
                )
                .with(
                    Capability::Led,
                    BaseSupport::unsupported(
                        "legacy printers have no LED control; enable custom LEDs to drive them via G-code",
                    ),
                )
                .with(
                    Capability::Filtration,
                    BaseSupport::unsupported("filtration is not available on legacy printers"),
                )
                .with(
                    Capability::MaterialMultiplexing,
                    BaseSupport::unsupported("legacy printers have no material station"),
                ),
            BackendKind::Adventurer5M => common
                .with(Capability::Camera, BaseSupport::RequiresProbe)
                .with(Capability::Led, BaseSupport::Native)
                .with(
                    Capability::Filtration,
                    BaseSupport::unsupported("the Adventurer 5M has no filtration module"),
                )
                .with(
                    Capability::MaterialMultiplexing,
                    BaseSupport::unsupported("the Adventurer 5M has no material station"),
                ),
            BackendKind::Adventurer5MPro => common
                .with(Capability::Camera, BaseSupport::Native)
                .with(Capability::Led, BaseSupport::Native)
                .with(Capability::Filtration, BaseSupport::Native)
                .with(
                    Capability::MaterialMultiplexing,
                    BaseSupport::unsupported("the Adventurer 5M Pro has no material station"),
                ),
            BackendKind::Ad5x => common
                .with(Capability::Camera, BaseSupport::RequiresProbe)
                .with(Capability::Led, BaseSupport::RequiresProbe)
                .with(
                    Capability::Filtration,
                    BaseSupport::unsupported("the AD5X has no filtration module"),
                )
                .with(Capability::MaterialMultiplexing, BaseSupport::RequiresProbe),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// How a rule matches the normalised model string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelPattern {
    Exact(&'static str),
    Prefix(&'static str),
    Contains(&'static str),
    /// Unconditional fallback.
    Any,
}

impl ModelPattern {
    fn matches(self, normalised: &str) -> bool {
        match self {
            ModelPattern::Exact(s) => normalised == s,
            ModelPattern::Prefix(s) => normalised.starts_with(s),
            ModelPattern::Contains(s) => normalised.contains(s),
            ModelPattern::Any => true,
        }
    }
}

/// One entry of the ordered resolution table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelRule {
    pub pattern: ModelPattern,
    pub kind: BackendKind,
}

/// Ordered first-match rules. More specific models must come first
/// ("adventurer 5m pro" before "adventurer 5m").
pub const MODEL_RULES: &[ModelRule] = &[
    ModelRule {
        pattern: ModelPattern::Contains("5m pro"),
        kind: BackendKind::Adventurer5MPro,
    },
    ModelRule {
        pattern: ModelPattern::Prefix("adventurer 5m"),
        kind: BackendKind::Adventurer5M,
    },
    ModelRule {
        pattern: ModelPattern::Exact("5m"),
        kind: BackendKind::Adventurer5M,
    },
    ModelRule {
        pattern: ModelPattern::Contains("ad5x"),
        kind: BackendKind::Ad5x,
    },
    ModelRule {
        pattern: ModelPattern::Any,
        kind: BackendKind::GenericLegacy,
    },
];

/// Lower-cases, strips a vendor prefix and collapses whitespace.
fn normalise_model(model: &str) -> String {
    let lowered = model.trim().to_lowercase();
    let without_vendor = lowered.strip_prefix("flashforge").unwrap_or(&lowered);
    without_vendor.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Maps a declared model string to its backend variant.
pub fn resolve_backend_kind(model: Option<&str>) -> BackendKind {
    let normalised = normalise_model(model.unwrap_or(""));
    MODEL_RULES
        .iter()
        .find(|rule| rule.pattern.matches(&normalised))
        .map(|rule| rule.kind)
        .unwrap_or(BackendKind::GenericLegacy)
}
