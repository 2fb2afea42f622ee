/*
    Copyright 2025 TII (SSRC) and the contributors
    SPDX-License-Identifier: Apache-2.0
*/
use std::sync::{Mutex, MutexGuard, PoisonError};

/// The "action in flight" flag shared by the coordinator and the poller.
///
/// Only [`crate::coordinator::ActionCoordinator`] raises it. Publishing a
/// snapshot happens under the same lock, so a poll that started before an
/// action cannot publish after the action began.
#[derive(Debug, Default)]
pub struct ActionGate {
    in_flight: Mutex<bool>,
}

/// Holds the gate raised; dropping it lowers the gate again.
#[derive(Debug)]
pub struct InFlight<'a> {
    gate: &'a ActionGate,
}

impl ActionGate {
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_in_flight(&self) -> bool {
        *self.lock()
    }

    /// Raise the gate unless another action holds it.
    pub(crate) fn try_begin(&self) -> Option<InFlight<'_>> {
        let mut in_flight = self.lock();
        if *in_flight {
            return None;
        }
        *in_flight = true;
        Some(InFlight { gate: self })
    }

    /// Run `f` only while no action is in flight, keeping the gate closed
    /// for the duration.
    pub(crate) fn unless_in_flight<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let in_flight = self.lock();
        if *in_flight {
            return None;
        }
        let res = f();
        drop(in_flight);
        Some(res)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        *self.gate.lock() = false;
    }
}
