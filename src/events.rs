/*
    Copyright 2025 TII (SSRC) and the contributors
    SPDX-License-Identifier: Apache-2.0
*/
//! Handoff between the background engine and the presentation thread.
//!
//! The engine never calls into the presentation layer. It stores the latest
//! state in watch channels and offers events to a bounded queue; the
//! presentation side drains both with [`EventPump::pump`] on its own tick.

use std::sync::Arc;

use log::{debug, trace};
use tokio::sync::{mpsc, watch};

use crate::error::ActionError;
use crate::model::{ConnectionPhase, Snapshot};

#[derive(Debug, Clone)]
pub enum UiEvent {
    Snapshot(Arc<Snapshot>),
    Phase(ConnectionPhase),
    ActionFailed(ActionError),
}

/// Consumer of engine state. Implemented by the front-end.
pub trait PresentationSink {
    fn render_snapshot(&mut self, snapshot: &Snapshot);
    fn render_phase(&mut self, phase: ConnectionPhase);
    fn render_action_error(&mut self, error: &ActionError);
}

/// Producer half, shared by the reconciler (snapshots) and the coordinator
/// (phases and action failures).
#[derive(Debug)]
pub struct EventBus {
    snapshot: watch::Sender<Option<Arc<Snapshot>>>,
    phase: watch::Sender<ConnectionPhase>,
    queue: mpsc::Sender<UiEvent>,
}

impl EventBus {
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.borrow().clone()
    }

    pub fn phase(&self) -> ConnectionPhase {
        *self.phase.borrow()
    }

    pub(crate) fn publish_snapshot(&self, snapshot: Arc<Snapshot>) {
        self.snapshot.send_replace(Some(Arc::clone(&snapshot)));
        self.offer(UiEvent::Snapshot(snapshot));
    }

    pub(crate) fn set_phase(&self, phase: ConnectionPhase) {
        self.phase.send_replace(phase);
        self.offer(UiEvent::Phase(phase));
    }

    pub(crate) fn action_failed(&self, error: ActionError) {
        self.offer(UiEvent::ActionFailed(error));
    }

    /// Never blocks. A dropped snapshot or phase is recovered from the watch
    /// channels on the next pump.
    fn offer(&self, event: UiEvent) {
        match self.queue.try_send(event) {
            Ok(()) => (),
            Err(mpsc::error::TrySendError::Full(event)) => {
                debug!("Presentation queue is full, dropping {event:?}")
            }
            Err(mpsc::error::TrySendError::Closed(_)) => trace!("Presentation side is gone"),
        }
    }
}

/// Consumer half, owned by the presentation thread.
#[derive(Debug)]
pub struct EventPump {
    queue: mpsc::Receiver<UiEvent>,
    snapshot: watch::Receiver<Option<Arc<Snapshot>>>,
    phase: watch::Receiver<ConnectionPhase>,
    last_snapshot: Option<Arc<Snapshot>>,
    last_phase: Option<ConnectionPhase>,
}

/// Create a connected bus and pump. `capacity` bounds the event queue.
pub fn channel(capacity: usize) -> (EventBus, EventPump) {
    let (snapshot_tx, snapshot_rx) = watch::channel(None);
    let (phase_tx, phase_rx) = watch::channel(ConnectionPhase::default());
    let (queue_tx, queue_rx) = mpsc::channel(capacity.max(1));

    (
        EventBus {
            snapshot: snapshot_tx,
            phase: phase_tx,
            queue: queue_tx,
        },
        EventPump {
            queue: queue_rx,
            snapshot: snapshot_rx,
            phase: phase_rx,
            last_snapshot: None,
            last_phase: None,
        },
    )
}

impl EventPump {
    /// Deliver everything pending to `sink` without waiting. Returns the
    /// number of render calls made.
    pub fn pump<S: PresentationSink + ?Sized>(&mut self, sink: &mut S) -> usize {
        let mut rendered = 0;

        while let Ok(event) = self.queue.try_recv() {
            match event {
                UiEvent::Snapshot(snapshot) => {
                    sink.render_snapshot(&snapshot);
                    self.last_snapshot = Some(snapshot);
                }
                UiEvent::Phase(phase) => {
                    sink.render_phase(phase);
                    self.last_phase = Some(phase);
                }
                UiEvent::ActionFailed(error) => sink.render_action_error(&error),
            }
            rendered += 1;
        }

        if self.snapshot.has_changed().unwrap_or(false) {
            let latest = self.snapshot.borrow_and_update().clone();
            if let Some(latest) = latest {
                let seen = self
                    .last_snapshot
                    .as_ref()
                    .is_some_and(|last| Arc::ptr_eq(last, &latest));
                if !seen {
                    sink.render_snapshot(&latest);
                    self.last_snapshot = Some(latest);
                    rendered += 1;
                }
            }
        }

        if self.phase.has_changed().unwrap_or(false) {
            let latest = *self.phase.borrow_and_update();
            if self.last_phase != Some(latest) {
                sink.render_phase(latest);
                self.last_phase = Some(latest);
                rendered += 1;
            }
        }

        rendered
    }
}
