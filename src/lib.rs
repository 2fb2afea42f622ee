/// Command line arguments.
pub mod cli;
/// Coordinates user actions against the poller.
pub mod coordinator;
/// Wiring of the background engine.
pub mod engine;
/// Error kinds reported to the user.
pub mod error;
/// Handoff of engine state to the presentation thread.
pub mod events;
/// In-flight flag shared by actions and polling.
pub mod gate;
/// Logger setup.
pub mod logger;
/// VPN status, preferences and snapshots.
pub mod model;
/// Parsers for the expressvpn client's text output.
pub mod parser;
/// Status provider trait and the expressvpn client backend.
pub mod probe;
/// Periodic status polling.
pub mod reconciler;
/// Persisted last used location.
pub mod settings;
/// Various utility functions
pub mod utils;
/// Toolkit-independent window state.
pub mod view;

#[cfg(test)]
mod testing;
