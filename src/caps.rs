//! Twitch capability negotiation support.
//!
//! Twitch exposes three extensions under the `twitch.tv/` namespace. The
//! client requests each one with its own `CAP REQ` and records the server's
//! acknowledgments; acknowledgments never gate readiness.
//!
//! # Reference
//! - <https://dev.twitch.tv/docs/chat/irc/#requesting-twitch-specific-irc-capabilities>

use std::collections::BTreeMap;

use tracing::{info, warn};

/// Namespace prefix of every Twitch capability.
pub const NAMESPACE: &str = "twitch.tv";

/// Definition of a known capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityDef {
    /// Capability name without namespace (e.g., "membership")
    pub name: &'static str,
    /// Human-readable description
    pub description: &'static str,
}

/// Known Twitch capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "String", into = "String"))]
pub enum Capability {
    /// JOIN/PART for other users and NAMES snapshots
    Membership,
    /// Twitch-specific commands (USERNOTICE, CLEARCHAT, ...)
    Commands,
    /// Tag blocks on lines
    Tags,
    /// Unknown/custom capability
    Custom(String),
}

impl Capability {
    /// The capabilities requested by default.
    pub fn all() -> Vec<Capability> {
        vec![Self::Commands, Self::Tags, Self::Membership]
    }

    /// Parse a namespaced or bare name (`twitch.tv/tags` or `tags`).
    pub fn from_wire(s: &str) -> Self {
        let bare = s
            .strip_prefix(NAMESPACE)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(s);
        Self::from(bare)
    }

    /// The namespaced name, as sent in `CAP REQ`.
    pub fn wire_name(&self) -> String {
        format!("{}/{}", NAMESPACE, self.as_ref())
    }

    /// The `CAP REQ` line for this capability.
    pub fn request_line(&self) -> String {
        format!("CAP REQ :{}", self.wire_name())
    }

    /// The table entry for a capability Twitch documents; `None` for custom
    /// names.
    pub fn definition(&self) -> Option<&'static CapabilityDef> {
        CAPABILITIES.iter().find(|def| def.name == self.as_ref())
    }
}

impl AsRef<str> for Capability {
    fn as_ref(&self) -> &str {
        match self {
            Self::Membership => "membership",
            Self::Commands => "commands",
            Self::Tags => "tags",
            Self::Custom(s) => s,
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl From<&str> for Capability {
    fn from(s: &str) -> Self {
        match s {
            "membership" => Self::Membership,
            "commands" => Self::Commands,
            "tags" => Self::Tags,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl From<String> for Capability {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<Capability> for String {
    fn from(cap: Capability) -> Self {
        cap.as_ref().to_owned()
    }
}

/// Static list of supported capabilities.
pub const CAPABILITIES: &[CapabilityDef] = &[
    CapabilityDef {
        name: "membership",
        description: "JOIN/PART of other chatters and NAMES (353) snapshots",
    },
    CapabilityDef {
        name: "commands",
        description: "Twitch commands: CLEARCHAT, USERNOTICE, RECONNECT, ...",
    },
    CapabilityDef {
        name: "tags",
        description: "Metadata tag blocks (badges, emotes, color, ...)",
    },
];

/// Acknowledgment flags for the requested capabilities.
///
/// Only requested capabilities are tracked. An acknowledgment for anything
/// else is reported and ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityAcks(BTreeMap<Capability, bool>);

impl CapabilityAcks {
    /// Track the given capabilities, all unacknowledged.
    pub fn new(requested: &[Capability]) -> Self {
        Self(requested.iter().cloned().map(|c| (c, false)).collect())
    }

    /// Record an acknowledgment. Returns `false` (and warns) if the
    /// capability was never requested.
    pub fn acknowledge(&mut self, wire: &str) -> bool {
        let cap = Capability::from_wire(wire);
        match self.0.get_mut(&cap) {
            Some(acked) => {
                *acked = true;
                match cap.definition() {
                    Some(def) => {
                        info!(capability = %cap, description = def.description, "capability acknowledged")
                    }
                    None => warn!(capability = %cap, "acknowledged capability is not a Twitch capability"),
                }
                true
            }
            None => {
                warn!(capability = wire, "acknowledgment for unrequested capability");
                false
            }
        }
    }

    /// Whether the capability was acknowledged.
    pub fn is_acknowledged(&self, cap: &Capability) -> bool {
        self.0.get(cap).copied().unwrap_or(false)
    }

    /// Whether every requested capability was acknowledged.
    pub fn all_acknowledged(&self) -> bool {
        self.0.values().all(|acked| *acked)
    }

    /// Iterate `(capability, acknowledged)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Capability, bool)> {
        self.0.iter().map(|(c, a)| (c, *a))
    }

    /// Mark every capability unacknowledged, as after a reconnect.
    pub fn reset(&mut self) {
        for acked in self.0.values_mut() {
            *acked = false;
        }
    }
}
