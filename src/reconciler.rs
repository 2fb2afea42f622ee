/*
    Copyright 2025 TII (SSRC) and the contributors
    SPDX-License-Identifier: Apache-2.0
*/
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, error, info, trace, warn};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::error::ErrorKind;
use crate::events::EventBus;
use crate::gate::ActionGate;
use crate::model::{Location, Snapshot, VpnStatus};
use crate::probe::{StatusProvider, check_health};
use crate::settings::SettingsStore;

/// Why a tick did not publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InFlight,
    Halted,
    Aborted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Published(Arc<Snapshot>),
    /// An error snapshot was published and polling is halted.
    Failed(ErrorKind),
    Skipped(SkipReason),
}

/// Location and protocol lists. Fetched once and kept until an error forces
/// a re-fetch.
#[derive(Debug, Clone)]
struct Catalog {
    locations: Arc<Vec<Location>>,
    protocols: Arc<Vec<String>>,
}

/// Owner of the published [`Snapshot`].
///
/// Probing happens on the blocking pool; publishing goes through the
/// [`EventBus`] so the presentation thread is never called directly.
pub struct Reconciler {
    provider: Arc<dyn StatusProvider>,
    settings: SettingsStore,
    gate: Arc<ActionGate>,
    bus: Arc<EventBus>,
    poll_interval: Duration,
    network_checked: AtomicBool,
    halted: AtomicBool,
    catalog: Mutex<Option<Catalog>>,
    serial: tokio::sync::Mutex<()>,
}

impl Reconciler {
    pub fn new(
        provider: Arc<dyn StatusProvider>,
        settings: SettingsStore,
        gate: Arc<ActionGate>,
        bus: Arc<EventBus>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            provider,
            settings,
            gate,
            bus,
            poll_interval,
            network_checked: AtomicBool::new(false),
            halted: AtomicBool::new(false),
            catalog: Mutex::new(None),
            serial: tokio::sync::Mutex::new(()),
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Leave the halted state after the user fixed the problem in-app.
    pub fn resume(&self) {
        *self.catalog.lock().unwrap_or_else(PoisonError::into_inner) = None;
        if self.halted.swap(false, Ordering::SeqCst) {
            info!("Polling resumed");
        }
    }

    /// Poll until `shutdown` turns true or its sender goes away.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Polling every {:?}", self.poll_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = self.reconcile().await;
                    trace!("Tick: {outcome:?}");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Polling stopped");
    }

    /// One Idle → Probing → Publishing → Idle cycle.
    ///
    /// Skipped entirely while an action is in flight or after a fatal error.
    /// Equal snapshots are published again.
    pub async fn reconcile(self: &Arc<Self>) -> TickOutcome {
        let _serial = self.serial.lock().await;

        if self.gate.is_in_flight() {
            return TickOutcome::Skipped(SkipReason::InFlight);
        }
        if self.is_halted() {
            return TickOutcome::Skipped(SkipReason::Halted);
        }

        let include_network = !self.network_checked.swap(true, Ordering::SeqCst);
        trace!("Probing (network check: {include_network})");

        let this = Arc::clone(self);
        let probed =
            match tokio::task::spawn_blocking(move || this.probe_snapshot(include_network)).await {
                Ok(probed) => probed,
                Err(err) => {
                    error!("Probe task failed: {err}");
                    return TickOutcome::Skipped(SkipReason::Aborted);
                }
            };

        match probed {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                if self.publish(Arc::clone(&snapshot)) {
                    TickOutcome::Published(snapshot)
                } else {
                    TickOutcome::Skipped(SkipReason::InFlight)
                }
            }
            Err(kind) => {
                let previous = self.bus.latest().unwrap_or_default();
                let snapshot = Arc::new(Snapshot::failed(&previous, kind));
                if !self.publish(snapshot) {
                    return TickOutcome::Skipped(SkipReason::InFlight);
                }
                warn!("Polling halted: {kind}");
                self.halted.store(true, Ordering::SeqCst);
                *self.catalog.lock().unwrap_or_else(PoisonError::into_inner) = None;
                TickOutcome::Failed(kind)
            }
        }
    }

    /// Probe status without publishing. Used by the coordinator to confirm an
    /// action took effect.
    pub async fn verify(self: &Arc<Self>) -> Result<VpnStatus, ErrorKind> {
        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || check_health(this.provider.as_ref(), false))
            .await
            .unwrap_or_else(|err| {
                error!("Verification probe failed: {err}");
                Err(ErrorKind::DaemonUnavailable)
            })
    }

    /// Verify every poll interval until `done` holds, giving up after
    /// `timeout`.
    pub async fn await_status(
        self: &Arc<Self>,
        done: impl Fn(&VpnStatus) -> bool,
        timeout: Duration,
    ) -> Result<VpnStatus, ErrorKind> {
        let wait = async {
            loop {
                let status = self.verify().await?;
                if done(&status) {
                    return Ok(status);
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(res) => res,
            Err(_) => {
                warn!("No convergence within {timeout:?}");
                Err(ErrorKind::CommandTimedOut)
            }
        }
    }

    fn publish(&self, snapshot: Arc<Snapshot>) -> bool {
        self.gate
            .unless_in_flight(|| {
                debug!(
                    "Publishing snapshot: connected to {:?}, error {:?}",
                    snapshot.status.connected_location, snapshot.error_kind
                );
                self.bus.publish_snapshot(snapshot);
            })
            .is_some()
    }

    fn catalog(&self) -> Result<Catalog, ErrorKind> {
        let mut cached = self.catalog.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(catalog) = cached.as_ref() {
            return Ok(catalog.clone());
        }

        let catalog = Catalog {
            locations: Arc::new(self.provider.list_locations()?),
            protocols: Arc::new(self.provider.list_protocols()?),
        };
        debug!(
            "Loaded {} locations and {} protocols",
            catalog.locations.len(),
            catalog.protocols.len()
        );
        *cached = Some(catalog.clone());
        Ok(catalog)
    }

    fn probe_snapshot(&self, include_network: bool) -> Result<Snapshot, ErrorKind> {
        let status = check_health(self.provider.as_ref(), include_network)?;
        let preferences = self.provider.get_preferences()?;
        let catalog = self.catalog()?;
        let last_known_location = self
            .settings
            .load(catalog.locations.iter().map(|l| l.display_name.as_str()));

        Ok(Snapshot {
            status,
            preferences,
            last_known_location,
            error_kind: None,
            locations: catalog.locations,
            protocols: catalog.protocols,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{self, EventPump, tests::RecordingSink};
    use crate::testing::FakeProvider;

    const INTERVAL: Duration = Duration::from_millis(20);

    fn setup(fake: Arc<FakeProvider>) -> (Arc<Reconciler>, EventPump, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let (bus, pump) = events::channel(16);
        let reconciler = Reconciler::new(
            fake,
            SettingsStore::new(dir.path().join("last_location")),
            Arc::new(ActionGate::default()),
            Arc::new(bus),
            INTERVAL,
        );
        (Arc::new(reconciler), pump, dir)
    }

    #[tokio::test]
    async fn publishes_full_snapshot() {
        let fake = Arc::new(FakeProvider::default());
        fake.set_connected(Some("UK - London"));
        let (reconciler, mut pump, dir) = setup(fake.clone());
        std::fs::write(dir.path().join("last_location"), "USA - New York").unwrap();

        let TickOutcome::Published(snapshot) = reconciler.reconcile().await else {
            panic!("expected a publish");
        };
        assert!(snapshot.is_trusted());
        assert_eq!(snapshot.status.connected_location.as_deref(), Some("UK - London"));
        assert_eq!(snapshot.last_known_location.as_deref(), Some("USA - New York"));
        assert_eq!(snapshot.locations.len(), 2);
        assert_eq!(snapshot.protocols.len(), 3);

        let mut sink = RecordingSink::default();
        assert_eq!(pump.pump(&mut sink), 1);
        assert_eq!(sink.snapshots[0], *snapshot);
    }

    #[tokio::test]
    async fn network_checked_only_on_first_tick() {
        let fake = Arc::new(FakeProvider::default());
        let (reconciler, _pump, _dir) = setup(fake.clone());

        reconciler.reconcile().await;
        reconciler.reconcile().await;
        reconciler.reconcile().await;
        assert_eq!(fake.calls("network_reachable"), 1);
        assert_eq!(fake.calls("probe"), 3);
    }

    #[tokio::test]
    async fn locations_fetched_once() {
        let fake = Arc::new(FakeProvider::default());
        let (reconciler, _pump, _dir) = setup(fake.clone());

        reconciler.reconcile().await;
        reconciler.reconcile().await;
        assert_eq!(fake.calls("list_locations"), 1);
        assert_eq!(fake.calls("get_preferences"), 2);
    }

    #[tokio::test]
    async fn equal_snapshots_are_published_again() {
        let fake = Arc::new(FakeProvider::default());
        let (reconciler, mut pump, _dir) = setup(fake);

        reconciler.reconcile().await;
        reconciler.reconcile().await;

        let mut sink = RecordingSink::default();
        pump.pump(&mut sink);
        assert_eq!(sink.snapshots.len(), 2);
        assert_eq!(sink.snapshots[0], sink.snapshots[1]);
    }

    #[tokio::test]
    async fn error_publishes_and_halts() {
        let fake = Arc::new(FakeProvider::default());
        let (reconciler, mut pump, _dir) = setup(fake.clone());

        fake.set_connected(Some("UK - London"));
        reconciler.reconcile().await;
        fake.update(|s| s.daemon = false);

        assert_eq!(
            reconciler.reconcile().await,
            TickOutcome::Failed(ErrorKind::DaemonUnavailable)
        );
        assert!(reconciler.is_halted());

        let probes = fake.calls("probe");
        fake.update(|s| s.daemon = true);
        assert_eq!(
            reconciler.reconcile().await,
            TickOutcome::Skipped(SkipReason::Halted)
        );
        assert_eq!(fake.calls("probe"), probes);

        let mut sink = RecordingSink::default();
        pump.pump(&mut sink);
        let failed = sink.snapshots.last().unwrap();
        assert_eq!(failed.error_kind, Some(ErrorKind::DaemonUnavailable));
        // Stale values are kept for display.
        assert_eq!(failed.status.connected_location.as_deref(), Some("UK - London"));
    }

    #[tokio::test]
    async fn startup_reports_unreachable_network_first() {
        let fake = Arc::new(FakeProvider::default());
        fake.update(|s| {
            s.network = false;
            s.tool = false;
        });
        let (reconciler, _pump, _dir) = setup(fake);

        assert_eq!(
            reconciler.reconcile().await,
            TickOutcome::Failed(ErrorKind::NetworkUnreachable)
        );
    }

    #[tokio::test]
    async fn resume_restarts_polling() {
        let fake = Arc::new(FakeProvider::default());
        fake.update(|s| s.activated = false);
        let (reconciler, _pump, _dir) = setup(fake.clone());

        assert_eq!(
            reconciler.reconcile().await,
            TickOutcome::Failed(ErrorKind::NotActivated)
        );
        fake.update(|s| s.activated = true);
        reconciler.resume();

        assert!(matches!(reconciler.reconcile().await, TickOutcome::Published(_)));
        assert_eq!(fake.calls("list_locations"), 1);
    }

    #[tokio::test]
    async fn tick_skipped_while_in_flight() {
        let fake = Arc::new(FakeProvider::default());
        let gate = Arc::new(ActionGate::default());
        let (bus, mut pump) = events::channel(16);
        let dir = tempfile::tempdir().unwrap();
        let reconciler = Arc::new(Reconciler::new(
            fake.clone(),
            SettingsStore::new(dir.path().join("last_location")),
            gate.clone(),
            Arc::new(bus),
            INTERVAL,
        ));

        let action = gate.try_begin().unwrap();
        assert_eq!(
            reconciler.reconcile().await,
            TickOutcome::Skipped(SkipReason::InFlight)
        );
        assert_eq!(fake.calls("probe"), 0);
        let mut sink = RecordingSink::default();
        assert_eq!(pump.pump(&mut sink), 0);

        drop(action);
        assert!(matches!(reconciler.reconcile().await, TickOutcome::Published(_)));
    }

    #[tokio::test]
    async fn await_status_times_out() {
        let fake = Arc::new(FakeProvider::default());
        let (reconciler, _pump, _dir) = setup(fake);

        let res = reconciler
            .await_status(|s| s.is_connected(), Duration::from_millis(100))
            .await;
        assert_eq!(res, Err(ErrorKind::CommandTimedOut));
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let fake = Arc::new(FakeProvider::default());
        let (reconciler, mut pump, _dir) = setup(fake.clone());
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(Arc::clone(&reconciler).run(stop_rx));
        tokio::time::sleep(INTERVAL * 5).await;
        stop_tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();

        let mut sink = RecordingSink::default();
        pump.pump(&mut sink);
        assert!(sink.snapshots.len() >= 2);
        assert!(fake.calls("probe") >= 2);
    }
}
