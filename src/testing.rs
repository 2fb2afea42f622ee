/*
    Copyright 2025 TII (SSRC) and the contributors
    SPDX-License-Identifier: Apache-2.0
*/
//! Scripted in-memory [`StatusProvider`] for engine tests.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::ErrorKind;
use crate::model::{Location, Preference, Preferences, VpnStatus};
use crate::probe::StatusProvider;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pending {
    Connect(String),
    Disconnect,
}

#[derive(Debug)]
pub struct FakeState {
    pub network: bool,
    pub tool: bool,
    pub daemon: bool,
    pub activated: bool,
    pub connected: Option<String>,
    pub locations: Vec<Location>,
    pub protocols: Vec<String>,
    pub preferences: Preferences,
    pub valid_code: String,
    /// Probes a connect/disconnect needs before it shows up. `None` never
    /// settles.
    pub settle_after: Option<usize>,
    pending: Option<(Pending, usize)>,
    calls: HashMap<&'static str, usize>,
    commands: Vec<String>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            network: true,
            tool: true,
            daemon: true,
            activated: true,
            connected: None,
            locations: vec![
                Location {
                    key: "ukl".into(),
                    display_name: "UK - London".into(),
                },
                Location {
                    key: "usny".into(),
                    display_name: "USA - New York".into(),
                },
            ],
            protocols: vec!["auto".into(), "udp".into(), "tcp".into()],
            preferences: Preferences::default(),
            valid_code: "EXPRESS-CODE".into(),
            settle_after: Some(1),
            pending: None,
            calls: HashMap::new(),
            commands: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeProvider {
    state: Mutex<FakeState>,
}

impl FakeProvider {
    pub fn update(&self, f: impl FnOnce(&mut FakeState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn set_connected(&self, location: Option<&str>) {
        self.update(|s| s.connected = location.map(str::to_owned));
    }

    pub fn calls(&self, name: &str) -> usize {
        self.state.lock().unwrap().calls.get(name).copied().unwrap_or(0)
    }

    /// Commands issued so far, e.g. `connect usny`.
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    fn record(&self, name: &'static str) -> std::sync::MutexGuard<'_, FakeState> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(name).or_default() += 1;
        state
    }

    fn schedule(state: &mut FakeState, pending: Pending) {
        if let Some(after) = state.settle_after {
            state.pending = Some((pending, after));
        }
    }
}

impl StatusProvider for FakeProvider {
    fn network_reachable(&self) -> bool {
        self.record("network_reachable").network
    }

    fn tool_available(&self) -> bool {
        self.record("tool_available").tool
    }

    fn probe(&self) -> Result<VpnStatus, ErrorKind> {
        let mut state = self.record("probe");
        if !state.tool {
            return Err(ErrorKind::ToolMissing);
        }
        if !state.daemon {
            return Ok(VpnStatus::default());
        }

        if let Some((pending, left)) = state.pending.take() {
            if left <= 1 {
                state.connected = match pending {
                    Pending::Connect(name) => Some(name),
                    Pending::Disconnect => None,
                };
            } else {
                state.pending = Some((pending, left - 1));
            }
        }

        Ok(VpnStatus {
            connected_location: state.connected.clone(),
            daemon_reachable: true,
            activated: state.activated,
        })
    }

    fn list_locations(&self) -> Result<Vec<Location>, ErrorKind> {
        let state = self.record("list_locations");
        if !state.daemon {
            return Err(ErrorKind::DaemonUnavailable);
        }
        Ok(state.locations.clone())
    }

    fn list_protocols(&self) -> Result<Vec<String>, ErrorKind> {
        let state = self.record("list_protocols");
        if !state.daemon {
            return Err(ErrorKind::DaemonUnavailable);
        }
        Ok(state.protocols.clone())
    }

    fn get_preferences(&self) -> Result<Preferences, ErrorKind> {
        let state = self.record("get_preferences");
        if !state.daemon {
            return Err(ErrorKind::DaemonUnavailable);
        }
        Ok(state.preferences.clone())
    }

    fn set_preference(&self, preference: &Preference) {
        let mut state = self.record("set_preference");
        match preference {
            Preference::NetworkLock(lock) => {
                state.commands.push(format!("network_lock {lock}"));
                state.preferences.network_lock = *lock;
            }
            Preference::Protocol(protocol) => {
                state.commands.push(format!("protocol {protocol}"));
                state.preferences.preferred_protocol = protocol.clone();
            }
        }
    }

    fn connect(&self, location_key: &str) {
        let mut state = self.record("connect");
        state.commands.push(format!("connect {location_key}"));
        let name = state
            .locations
            .iter()
            .find(|l| l.key == location_key)
            .map_or_else(|| location_key.to_owned(), |l| l.display_name.clone());
        Self::schedule(&mut state, Pending::Connect(name));
    }

    fn disconnect(&self) {
        let mut state = self.record("disconnect");
        state.commands.push("disconnect".into());
        Self::schedule(&mut state, Pending::Disconnect);
    }

    fn activate(&self, code: &str) -> Result<bool, ErrorKind> {
        let mut state = self.record("activate");
        if !state.tool {
            return Err(ErrorKind::ToolMissing);
        }
        if code.trim() == state.valid_code {
            state.activated = true;
        }
        Ok(state.activated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NetworkLock;

    #[test]
    fn fake_connect_settles_after_configured_status_reads() {
        let fake = FakeProvider::default();
        fake.update(|s| s.settle_after = Some(2));
        fake.connect("usny");

        assert_eq!(fake.probe().unwrap().connected_location, None);
        assert_eq!(
            fake.probe().unwrap().connected_location.as_deref(),
            Some("USA - New York")
        );
        assert_eq!(fake.commands(), vec!["connect usny"]);
        assert_eq!(
            NetworkLock::default(),
            fake.get_preferences().unwrap().network_lock
        );
    }
}
