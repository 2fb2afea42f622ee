/*
    Copyright 2025 TII (SSRC) and the contributors
    SPDX-License-Identifier: Apache-2.0
*/
use std::time::Duration;

use log::{debug, warn};

use crate::error::ErrorKind;
use crate::model::{Location, Preference, Preferences, VpnStatus};
use crate::parser;
use crate::utils::{self, CommandError};

/// Everything the engine needs from the VPN client.
///
/// Query methods block while the client runs. Commands (`connect`,
/// `disconnect`, `set_preference`) return as soon as they are started; their
/// effect is only visible through later probes.
pub trait StatusProvider: Send + Sync {
    fn network_reachable(&self) -> bool;
    fn tool_available(&self) -> bool;
    fn probe(&self) -> Result<VpnStatus, ErrorKind>;
    /// Known locations, sorted by display name.
    fn list_locations(&self) -> Result<Vec<Location>, ErrorKind>;
    fn list_protocols(&self) -> Result<Vec<String>, ErrorKind>;
    fn get_preferences(&self) -> Result<Preferences, ErrorKind>;
    fn set_preference(&self, preference: &Preference);
    fn connect(&self, location_key: &str);
    fn disconnect(&self);
    /// Submit an activation code and report whether the client is activated
    /// afterwards.
    fn activate(&self, code: &str) -> Result<bool, ErrorKind>;
}

/// Probe `provider` and report the first failing check.
///
/// Checks run cheapest-to-remediate last: network, tool, daemon, activation.
/// The network check is the slowest and is only worth doing at startup.
pub fn check_health<P: StatusProvider + ?Sized>(
    provider: &P,
    include_network: bool,
) -> Result<VpnStatus, ErrorKind> {
    if include_network && !provider.network_reachable() {
        return Err(ErrorKind::NetworkUnreachable);
    }
    if !provider.tool_available() {
        return Err(ErrorKind::ToolMissing);
    }

    let status = provider.probe()?;
    if !status.daemon_reachable {
        return Err(ErrorKind::DaemonUnavailable);
    }
    if !status.activated {
        return Err(ErrorKind::NotActivated);
    }

    Ok(status)
}

fn error_kind(err: &CommandError) -> ErrorKind {
    match err {
        CommandError::Spawn(..) => ErrorKind::ToolMissing,
        CommandError::Failed(..) | CommandError::TimedOut(..) | CommandError::Io(..) => {
            ErrorKind::DaemonUnavailable
        }
    }
}

/// [`StatusProvider`] backed by the `expressvpn` command-line client.
#[derive(Debug, Clone)]
pub struct ExpressVpnCli {
    binary: String,
    command_timeout: Duration,
    reachability_host: String,
}

impl ExpressVpnCli {
    pub fn new(
        binary: impl Into<String>,
        command_timeout: Duration,
        reachability_host: impl Into<String>,
    ) -> Self {
        Self {
            binary: binary.into(),
            command_timeout,
            reachability_host: reachability_host.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String, CommandError> {
        utils::run_with_timeout(&self.binary, args, None, self.command_timeout)
    }

    fn query(&self, args: &[&str]) -> Result<String, ErrorKind> {
        self.run(args).map_err(|err| {
            warn!("{err}");
            error_kind(&err)
        })
    }
}

impl StatusProvider for ExpressVpnCli {
    fn network_reachable(&self) -> bool {
        utils::is_reachable(&self.reachability_host, self.command_timeout)
    }

    fn tool_available(&self) -> bool {
        match self.run(&["-v"]) {
            Ok(out) => parser::is_version_banner(&out),
            Err(err) => {
                debug!("{err}");
                false
            }
        }
    }

    fn probe(&self) -> Result<VpnStatus, ErrorKind> {
        match self.run(&["status"]) {
            Ok(out) => Ok(parser::parse_status(&out)),
            Err(err @ CommandError::Spawn(..)) => {
                warn!("{err}");
                Err(ErrorKind::ToolMissing)
            }
            Err(err) => {
                debug!("Daemon did not answer: {err}");
                Ok(VpnStatus::default())
            }
        }
    }

    fn list_locations(&self) -> Result<Vec<Location>, ErrorKind> {
        self.query(&["list", "all"])
            .map(|out| parser::parse_locations(&out))
    }

    fn list_protocols(&self) -> Result<Vec<String>, ErrorKind> {
        self.query(&["protocol", "--list"])
            .map(|out| parser::parse_protocols(&out))
    }

    fn get_preferences(&self) -> Result<Preferences, ErrorKind> {
        self.query(&["preferences"])
            .map(|out| parser::parse_preferences(&out))
    }

    fn set_preference(&self, preference: &Preference) {
        match preference {
            Preference::NetworkLock(lock) => utils::spawn_detached(
                &self.binary,
                &["preferences", "set", "network_lock", lock.as_str()],
            ),
            Preference::Protocol(protocol) => {
                utils::spawn_detached(&self.binary, &["protocol", protocol.as_str()])
            }
        }
    }

    fn connect(&self, location_key: &str) {
        utils::spawn_detached(&self.binary, &["connect", location_key]);
    }

    fn disconnect(&self) {
        utils::spawn_detached(&self.binary, &["disconnect"]);
    }

    fn activate(&self, code: &str) -> Result<bool, ErrorKind> {
        let input = format!("{}\n", code.trim());
        let res = utils::run_with_timeout(
            &self.binary,
            &["activate"],
            Some(input.as_str()),
            self.command_timeout,
        );
        match res {
            Ok(_) => (),
            Err(err @ CommandError::Spawn(..)) => {
                warn!("{err}");
                return Err(ErrorKind::ToolMissing);
            }
            // A rejected code exits non-zero; the status below is authoritative.
            Err(err) => debug!("{err}"),
        }

        let status = self.probe()?;
        if !status.daemon_reachable {
            return Err(ErrorKind::DaemonUnavailable);
        }
        Ok(status.activated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeProvider;

    #[test]
    fn healthy_provider_returns_status() {
        let fake = FakeProvider::default();
        fake.set_connected(Some("UK - London"));

        let status = check_health(&fake, true).unwrap();
        assert_eq!(status.connected_location.as_deref(), Some("UK - London"));
    }

    #[test]
    fn network_wins_over_missing_tool() {
        let fake = FakeProvider::default();
        fake.update(|s| {
            s.network = false;
            s.tool = false;
            s.daemon = false;
            s.activated = false;
        });

        assert_eq!(check_health(&fake, true), Err(ErrorKind::NetworkUnreachable));
    }

    #[test]
    fn network_is_skipped_on_recurring_polls() {
        let fake = FakeProvider::default();
        fake.update(|s| {
            s.network = false;
            s.tool = false;
        });

        assert_eq!(check_health(&fake, false), Err(ErrorKind::ToolMissing));
        assert_eq!(fake.calls("network_reachable"), 0);
    }

    #[test]
    fn priority_order_holds() {
        let fake = FakeProvider::default();
        fake.update(|s| {
            s.daemon = false;
            s.activated = false;
        });
        assert_eq!(check_health(&fake, true), Err(ErrorKind::DaemonUnavailable));

        fake.update(|s| s.daemon = true);
        assert_eq!(check_health(&fake, true), Err(ErrorKind::NotActivated));
    }

    #[test]
    fn missing_binary_maps_to_tool_missing() {
        let cli = ExpressVpnCli::new(
            "definitely-not-an-installed-binary",
            Duration::from_secs(1),
            "host.invalid:80",
        );
        assert!(!cli.tool_available());
        assert_eq!(cli.probe(), Err(ErrorKind::ToolMissing));
        assert_eq!(cli.list_locations(), Err(ErrorKind::ToolMissing));
        assert_eq!(check_health(&cli, false), Err(ErrorKind::ToolMissing));
    }

    /// Install a shell script standing in for the client. `cases` is the body
    /// of a `case "$1" in ... esac` block; `@DIR@` expands to the script's
    /// directory.
    #[cfg(unix)]
    fn scripted_cli(dir: &tempfile::TempDir, cases: &str, timeout: Duration) -> ExpressVpnCli {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("expressvpn");
        let cases = cases.replace("@DIR@", &dir.path().display().to_string());
        std::fs::write(&path, format!("#!/bin/sh\ncase \"$1\" in\n{cases}\nesac\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        ExpressVpnCli::new(path.display().to_string(), timeout, "host.invalid:80")
    }

    #[cfg(unix)]
    #[test]
    fn version_banner_marks_tool_usable() {
        let dir = tempfile::tempdir().unwrap();
        let cli = scripted_cli(
            &dir,
            r#"-v) echo "expressvpn version 3.61.0.12 (abc)" ;;"#,
            Duration::from_secs(5),
        );
        assert!(cli.tool_available());

        let other = tempfile::tempdir().unwrap();
        let cli = scripted_cli(
            &other,
            r#"-v) echo "some other tool 1.0" ;;"#,
            Duration::from_secs(5),
        );
        assert!(!cli.tool_available());
    }

    #[cfg(unix)]
    #[test]
    fn failing_status_means_daemon_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let cli = scripted_cli(
            &dir,
            r#"-v) echo "expressvpn version 3.61.0" ;;
status) echo "Cannot connect to expressvpnd daemon." >&2; exit 1 ;;"#,
            Duration::from_secs(5),
        );

        let status = cli.probe().unwrap();
        assert!(!status.daemon_reachable);
        assert_eq!(check_health(&cli, false), Err(ErrorKind::DaemonUnavailable));
    }

    #[cfg(unix)]
    #[test]
    fn hanging_status_means_daemon_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let cli = scripted_cli(
            &dir,
            r#"-v) echo "expressvpn version 3.61.0" ;;
status) sleep 5 ;;"#,
            Duration::from_millis(300),
        );

        let started = std::time::Instant::now();
        assert_eq!(check_health(&cli, false), Err(ErrorKind::DaemonUnavailable));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[cfg(unix)]
    #[test]
    fn status_output_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let cli = scripted_cli(
            &dir,
            "status) printf '\\033[1;32mConnected to UK - London\\033[0m\\n' ;;",
            Duration::from_secs(5),
        );

        let status = cli.probe().unwrap();
        assert!(status.daemon_reachable);
        assert!(status.activated);
        assert_eq!(status.connected_location.as_deref(), Some("UK - London"));
    }

    #[cfg(unix)]
    #[test]
    fn activation_code_goes_through_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let cli = scripted_cli(
            &dir,
            r#"activate) read code; [ "$code" = "GOOD" ] || exit 1; touch "@DIR@/activated" ;;
status) if [ -e "@DIR@/activated" ]; then echo "Not connected"; else echo "Not Activated"; fi ;;"#,
            Duration::from_secs(5),
        );

        assert_eq!(cli.activate("BAD"), Ok(false));
        assert_eq!(cli.activate("  GOOD \n"), Ok(true));
        assert!(cli.probe().unwrap().activated);
    }

    #[cfg(unix)]
    #[test]
    fn location_listing_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let cli = scripted_cli(
            &dir,
            r#"list) cat <<'OUT'
ALIAS  COUNTRY                 LOCATION                RECOMMENDED
-----  ---------------         ------------------      -----------
smart  Smart Location          USA - New York          Y
usny   United States (US)      USA - New York          Y
ukl    United Kingdom (GB)     UK - London
OUT
;;"#,
            Duration::from_secs(5),
        );

        let locations = cli.list_locations().unwrap();
        let pairs: Vec<_> = locations
            .iter()
            .map(|l| (l.key.as_str(), l.display_name.as_str()))
            .collect();
        assert_eq!(pairs, vec![("ukl", "UK - London"), ("usny", "USA - New York")]);
    }

    #[cfg(unix)]
    #[test]
    fn failing_listing_means_daemon_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let cli = scripted_cli(&dir, "list) exit 2 ;;", Duration::from_secs(5));
        assert_eq!(cli.list_locations(), Err(ErrorKind::DaemonUnavailable));
    }
}
