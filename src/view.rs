/*
    Copyright 2025 TII (SSRC) and the contributors
    SPDX-License-Identifier: Apache-2.0
*/
use crate::error::{ActionError, ErrorKind};
use crate::events::PresentationSink;
use crate::model::{ConnectionPhase, Location, NetworkLock, Snapshot};

/// Toolkit-independent window state.
///
/// Front-ends render from this after every pump instead of reacting to each
/// event on their own.
#[derive(Debug, Default)]
pub struct ViewState {
    snapshot: Option<Snapshot>,
    phase: ConnectionPhase,
    notices: Vec<String>,
    /// Recoverable failure shown next to the activation prompt.
    prompt_error: Option<String>,
}

impl PresentationSink for ViewState {
    fn render_snapshot(&mut self, snapshot: &Snapshot) {
        if snapshot.is_trusted() {
            self.prompt_error = None;
            if !self.phase.is_busy() {
                self.phase = ConnectionPhase::from_status(&snapshot.status);
            }
        }
        self.snapshot = Some(snapshot.clone());
    }

    fn render_phase(&mut self, phase: ConnectionPhase) {
        self.phase = phase;
    }

    fn render_action_error(&mut self, error: &ActionError) {
        match error {
            ActionError::Vpn(kind) if kind.is_recoverable() => {
                self.prompt_error = Some(kind.to_string())
            }
            _ => self.notices.push(error.to_string()),
        }
    }
}

impl ViewState {
    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn error(&self) -> Option<ErrorKind> {
        self.snapshot.as_ref().and_then(|s| s.error_kind)
    }

    /// Controls are only usable once the client state is known to be good.
    pub fn is_ready(&self) -> bool {
        self.snapshot.as_ref().is_some_and(Snapshot::is_trusted)
    }

    pub fn needs_activation(&self) -> bool {
        self.error() == Some(ErrorKind::NotActivated) || self.prompt_error.is_some()
    }

    /// Why the last activation attempt was rejected.
    pub fn prompt_error(&self) -> Option<&str> {
        self.prompt_error.as_deref()
    }

    pub fn button_label(&self) -> &'static str {
        self.phase.button_label()
    }

    pub fn button_enabled(&self) -> bool {
        self.is_ready() && self.phase.button_enabled()
    }

    pub fn selectors_enabled(&self) -> bool {
        self.is_ready() && self.phase.selectors_enabled()
    }

    pub fn status_text(&self) -> String {
        let Some(snapshot) = &self.snapshot else {
            return "Checking expressvpn...".into();
        };
        if let Some(kind) = snapshot.error_kind {
            return kind.to_string();
        }
        match (&snapshot.status.connected_location, self.phase) {
            (_, ConnectionPhase::Connecting) => "Connecting...".into(),
            (_, ConnectionPhase::Disconnecting) => "Disconnecting...".into(),
            (Some(location), _) => format!("Connected to {location}"),
            (None, _) => "Not connected".into(),
        }
    }

    pub fn locations(&self) -> &[Location] {
        self.snapshot
            .as_ref()
            .map(|s| s.locations.as_slice())
            .unwrap_or_default()
    }

    pub fn protocols(&self) -> &[String] {
        self.snapshot
            .as_ref()
            .map(|s| s.protocols.as_slice())
            .unwrap_or_default()
    }

    pub fn network_lock(&self) -> NetworkLock {
        self.snapshot
            .as_ref()
            .map(|s| s.preferences.network_lock)
            .unwrap_or_default()
    }

    pub fn protocol(&self) -> Option<&str> {
        self.snapshot
            .as_ref()
            .map(|s| s.preferences.preferred_protocol.as_str())
    }

    pub fn selected_location(&self) -> Option<&str> {
        self.snapshot.as_ref().and_then(Snapshot::preferred_location)
    }

    /// Action failures not shown yet.
    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }
}
