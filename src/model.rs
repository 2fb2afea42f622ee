/*
    Copyright 2025 TII (SSRC) and the contributors
    SPDX-License-Identifier: Apache-2.0
*/
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::ErrorKind;

/// Display name of a location, as printed by `expressvpn status` and as
/// persisted by the settings store.
pub type LocationId = String;

/// Key of the automatic location pick, also the fallback connect key.
pub const SMART_LOCATION_KEY: &str = "smart";

#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct VpnStatus {
    pub connected_location: Option<LocationId>,
    pub daemon_reachable: bool,
    pub activated: bool,
}

impl VpnStatus {
    pub fn is_connected(&self) -> bool {
        self.connected_location.is_some()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub enum NetworkLock {
    #[default]
    Default,
    Strict,
    Off,
}

impl NetworkLock {
    pub const ALL: [NetworkLock; 3] = [Self::Default, Self::Strict, Self::Off];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Strict => "strict",
            Self::Off => "off",
        }
    }
}

impl fmt::Display for NetworkLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkLock {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "default" => Ok(Self::Default),
            "strict" => Ok(Self::Strict),
            "off" => Ok(Self::Off),
            other => Err(format!("Unknown network lock mode {other}.")),
        }
    }
}

/// Mirror of the tool's persisted preferences the GUI cares about.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Preferences {
    pub network_lock: NetworkLock,
    pub preferred_protocol: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            network_lock: NetworkLock::Default,
            preferred_protocol: "auto".into(),
        }
    }
}

/// A single preference change requested by the user.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Preference {
    NetworkLock(NetworkLock),
    Protocol(String),
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Default, Debug)]
pub struct Location {
    pub key: String,
    pub display_name: String,
}

/// Everything the presentation side needs to render one frame of state.
///
/// When `error_kind` is set the status and preferences are left over from the
/// last good probe and are only fit for display.
#[derive(Clone, PartialEq, Default, Debug)]
pub struct Snapshot {
    pub status: VpnStatus,
    pub preferences: Preferences,
    pub last_known_location: Option<LocationId>,
    pub error_kind: Option<ErrorKind>,
    pub locations: Arc<Vec<Location>>,
    pub protocols: Arc<Vec<String>>,
}

impl Snapshot {
    /// Copy of `previous` that only reports `kind`.
    pub fn failed(previous: &Snapshot, kind: ErrorKind) -> Self {
        Self {
            error_kind: Some(kind),
            ..previous.clone()
        }
    }

    pub fn is_trusted(&self) -> bool {
        self.error_kind.is_none()
    }

    /// Location to preselect: the persisted one, then the connected one, then
    /// the first known location.
    pub fn preferred_location(&self) -> Option<&str> {
        self.last_known_location
            .as_deref()
            .or(self.status.connected_location.as_deref())
            .or_else(|| self.locations.first().map(|l| l.display_name.as_str()))
    }
}

/// Connection button state. One render decision per phase instead of
/// swapping click handlers.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub enum ConnectionPhase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl ConnectionPhase {
    pub fn from_status(status: &VpnStatus) -> Self {
        if status.is_connected() {
            Self::Connected
        } else {
            Self::Disconnected
        }
    }

    pub fn button_label(self) -> &'static str {
        match self {
            Self::Disconnected => "Connect",
            Self::Connecting => "Connecting...",
            Self::Connected => "Disconnect",
            Self::Disconnecting => "Disconnecting...",
        }
    }

    pub fn button_enabled(self) -> bool {
        matches!(self, Self::Disconnected | Self::Connected)
    }

    /// Location, protocol and network lock can only change while offline.
    pub fn selectors_enabled(self) -> bool {
        self == Self::Disconnected
    }

    pub fn is_busy(self) -> bool {
        matches!(self, Self::Connecting | Self::Disconnecting)
    }
}
