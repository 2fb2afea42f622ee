/*
    Copyright 2025 TII (SSRC) and the contributors
    SPDX-License-Identifier: Apache-2.0
*/
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::error::{ActionError, ErrorKind};
use crate::events::EventBus;
use crate::gate::ActionGate;
use crate::model::{ConnectionPhase, Preference, SMART_LOCATION_KEY, VpnStatus};
use crate::parser;
use crate::probe::StatusProvider;
use crate::reconciler::Reconciler;
use crate::settings::SettingsStore;

/// Runs user actions one at a time.
///
/// While an action is in flight the reconciler does not publish, so the
/// presentation side only sees the phase change and then the converged state.
pub struct ActionCoordinator {
    provider: Arc<dyn StatusProvider>,
    reconciler: Arc<Reconciler>,
    gate: Arc<ActionGate>,
    bus: Arc<EventBus>,
    settings: SettingsStore,
    action_timeout: Duration,
}

impl ActionCoordinator {
    pub fn new(
        provider: Arc<dyn StatusProvider>,
        reconciler: Arc<Reconciler>,
        gate: Arc<ActionGate>,
        bus: Arc<EventBus>,
        settings: SettingsStore,
        action_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            reconciler,
            gate,
            bus,
            settings,
            action_timeout,
        }
    }

    /// Connect to `location_key` and wait until the client reports a
    /// connection.
    pub async fn connect(&self, location_key: &str) -> Result<(), ActionError> {
        self.start_connect(location_key.to_owned(), None).await
    }

    /// Remember `display_name` as the last used location and connect to it.
    /// Unknown names connect to the smart location. Nothing is remembered
    /// when another action is in flight.
    pub async fn connect_to(&self, display_name: &str) -> Result<(), ActionError> {
        let key = match self.bus.latest() {
            Some(snapshot) => parser::location_key(&snapshot.locations, display_name).to_owned(),
            None => SMART_LOCATION_KEY.to_owned(),
        };
        self.start_connect(key, Some(display_name.to_owned())).await
    }

    async fn start_connect(
        &self,
        key: String,
        remember: Option<String>,
    ) -> Result<(), ActionError> {
        info!("Connecting to {key}");
        let settings = self.settings.clone();
        let res = self
            .converge(
                ConnectionPhase::Connecting,
                move |provider| {
                    if let Some(name) = remember
                        && let Err(err) = settings.save(&name)
                    {
                        warn!(
                            "Could not save last location to {}: {err}",
                            settings.path().display()
                        );
                    }
                    provider.connect(&key);
                },
                VpnStatus::is_connected,
            )
            .await;
        self.report(res)
    }

    pub async fn disconnect(&self) -> Result<(), ActionError> {
        info!("Disconnecting");
        let res = self
            .converge(
                ConnectionPhase::Disconnecting,
                |provider| provider.disconnect(),
                |status| !status.is_connected(),
            )
            .await;
        self.report(res)
    }

    /// Send `preference` to the client. The change is not confirmed; the
    /// next snapshot shows whatever the client reports.
    pub async fn change_preference(&self, preference: Preference) -> Result<(), ActionError> {
        info!("Changing preference: {preference:?}");
        let res = self.set_preference(preference).await;
        self.report(res)
    }

    /// Submit an activation code. On success polling resumes if an earlier
    /// error halted it.
    pub async fn activate(&self, code: &str) -> Result<(), ActionError> {
        let res = self.submit_activation(code).await;
        self.report(res)
    }

    async fn set_preference(&self, preference: Preference) -> Result<(), ActionError> {
        let action = self.gate.try_begin().ok_or(ActionError::Busy)?;
        let provider = Arc::clone(&self.provider);
        run_blocking(move || provider.set_preference(&preference)).await?;
        drop(action);
        self.refresh().await;
        Ok(())
    }

    async fn submit_activation(&self, code: &str) -> Result<(), ActionError> {
        if code.trim().is_empty() {
            return Err(ErrorKind::InvalidActivationCode.into());
        }

        let action = self.gate.try_begin().ok_or(ActionError::Busy)?;
        let provider = Arc::clone(&self.provider);
        let code = code.to_owned();
        let activated = run_blocking(move || provider.activate(&code)).await??;
        drop(action);

        if !activated {
            return Err(ErrorKind::InvalidActivationCode.into());
        }
        info!("Activation succeeded");
        self.reconciler.resume();
        self.refresh().await;
        Ok(())
    }

    /// Issue `command`, then verify until `done` holds. The gate is lowered
    /// before the final reconciliation whatever the outcome.
    async fn converge(
        &self,
        phase: ConnectionPhase,
        command: impl FnOnce(&dyn StatusProvider) + Send + 'static,
        done: impl Fn(&VpnStatus) -> bool,
    ) -> Result<(), ActionError> {
        let action = self.gate.try_begin().ok_or(ActionError::Busy)?;
        self.bus.set_phase(phase);

        let provider = Arc::clone(&self.provider);
        let res = async {
            run_blocking(move || command(provider.as_ref())).await?;
            self.reconciler
                .await_status(done, self.action_timeout)
                .await
        }
        .await;

        drop(action);
        self.refresh().await;
        res.map(|status| debug!("Converged: {status:?}"))
            .map_err(ActionError::from)
    }

    /// Force a reconciliation and derive the phase from what it published.
    async fn refresh(&self) {
        self.reconciler.reconcile().await;
        let phase = self
            .bus
            .latest()
            .map(|snapshot| ConnectionPhase::from_status(&snapshot.status))
            .unwrap_or_default();
        self.bus.set_phase(phase);
    }

    fn report(&self, res: Result<(), ActionError>) -> Result<(), ActionError> {
        if let Err(err) = &res {
            warn!("Action failed: {err}");
            self.bus.action_failed(err.clone());
        }
        res
    }
}

async fn run_blocking<R: Send + 'static>(
    f: impl FnOnce() -> R + Send + 'static,
) -> Result<R, ErrorKind> {
    tokio::task::spawn_blocking(f).await.map_err(|err| {
        error!("VPN command task failed: {err}");
        ErrorKind::DaemonUnavailable
    })
}
