/*
    Copyright 2025 TII (SSRC) and the contributors
    SPDX-License-Identifier: Apache-2.0
*/
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::info;
use tokio::sync::watch;

use crate::coordinator::ActionCoordinator;
use crate::events::{self, EventBus, EventPump};
use crate::gate::ActionGate;
use crate::model::{ConnectionPhase, Snapshot};
use crate::probe::StatusProvider;
use crate::reconciler::Reconciler;
use crate::settings::SettingsStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub poll_interval: Duration,
    /// Upper bound on waiting for a connect or disconnect to show up.
    pub action_timeout: Duration,
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            action_timeout: Duration::from_secs(60),
            event_capacity: 64,
        }
    }
}

/// Wires the reconciler, the coordinator and the event bus together.
pub struct Engine {
    provider: Arc<dyn StatusProvider>,
    reconciler: Arc<Reconciler>,
    coordinator: Arc<ActionCoordinator>,
    bus: Arc<EventBus>,
    shutdown: watch::Sender<bool>,
}

impl Engine {
    /// Returns the engine and the pump the presentation side drains.
    pub fn new(
        provider: Arc<dyn StatusProvider>,
        settings: SettingsStore,
        config: EngineConfig,
    ) -> (Self, EventPump) {
        let (bus, pump) = events::channel(config.event_capacity);
        let bus = Arc::new(bus);
        let gate = Arc::new(ActionGate::default());

        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&provider),
            settings.clone(),
            Arc::clone(&gate),
            Arc::clone(&bus),
            config.poll_interval,
        ));
        let coordinator = Arc::new(ActionCoordinator::new(
            Arc::clone(&provider),
            Arc::clone(&reconciler),
            gate,
            Arc::clone(&bus),
            settings,
            config.action_timeout,
        ));
        let (shutdown, _) = watch::channel(false);

        let engine = Self {
            provider,
            reconciler,
            coordinator,
            bus,
            shutdown,
        };
        (engine, pump)
    }

    /// Polling loop. Spawn it on a runtime; it returns after [`Self::shutdown`].
    pub fn poller(&self) -> impl Future<Output = ()> + Send + use<> {
        Arc::clone(&self.reconciler).run(self.shutdown.subscribe())
    }

    pub fn coordinator(&self) -> Arc<ActionCoordinator> {
        Arc::clone(&self.coordinator)
    }

    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.bus.latest()
    }

    /// Stop polling and drop an open or opening connection. The disconnect
    /// is not waited for.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);

        let connected = self
            .latest()
            .is_some_and(|snapshot| snapshot.status.is_connected());
        if connected || self.bus.phase() == ConnectionPhase::Connecting {
            info!("Disconnecting on exit");
            self.provider.disconnect();
        }
    }
}
