/*
    Copyright 2025 TII (SSRC) and the contributors
    SPDX-License-Identifier: Apache-2.0
*/
use thiserror::Error;

/// Conditions that stop the engine from trusting the VPN tool's state.
///
/// The messages are meant to be shown to the user as-is.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    #[error("Please check your internet connection")]
    NetworkUnreachable,
    #[error("Please install expressvpn in order to use GUI")]
    ToolMissing,
    #[error("The expressvpn daemon is not responding, please start it")]
    DaemonUnavailable,
    #[error("Please activate expressvpn in order to use GUI")]
    NotActivated,
    #[error("Invalid activation code!")]
    InvalidActivationCode,
    #[error("The VPN did not reach the requested state in time")]
    CommandTimedOut,
}

impl ErrorKind {
    /// Whether the user can retry in-app instead of restarting after
    /// remediation.
    pub fn is_recoverable(self) -> bool {
        matches!(self, Self::InvalidActivationCode)
    }
}

/// Why a user action did not complete.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("another VPN action is already in progress")]
    Busy,
    #[error(transparent)]
    Vpn(#[from] ErrorKind),
}
