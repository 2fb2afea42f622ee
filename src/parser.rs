/*
    Copyright 2025 TII (SSRC) and the contributors
    SPDX-License-Identifier: Apache-2.0
*/
//! Pure parsers for the text printed by the `expressvpn` tool.
//!
//! Every parser strips terminal escape sequences first; the tool colours its
//! output even when stdout is not a terminal.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use log::warn;
use regex::Regex;

use crate::model::{Location, NetworkLock, Preferences, SMART_LOCATION_KEY, VpnStatus};

lazy_static! {
    static ref ANSI_ESCAPE: Regex =
        Regex::new(r"(?:\x1B[@-_]|[\x80-\x9F])[0-?]*[ -/]*[@-~]").expect("valid escape regex");
    static ref COLUMN_GAP: Regex = Regex::new(r"\s{2,}").expect("valid column regex");
}

const RECOMMENDED_MARKER: &str = "Y";
const CONNECTED_PREFIX: &str = "Connected to ";
const NOT_ACTIVATED: &str = "Not Activated";
const VERSION_BANNER: &str = "expressvpn version";

/// Remove ANSI CSI and C1 escape sequences.
///
/// Runs until nothing matches, so sequences that only appear once an inner
/// one is removed are stripped too and a second call is a no-op.
pub fn strip_ansi(s: &str) -> String {
    let mut out = ANSI_ESCAPE.replace_all(s, "").into_owned();
    while ANSI_ESCAPE.is_match(&out) {
        out = ANSI_ESCAPE.replace_all(&out, "").into_owned();
    }
    out
}

fn split_columns(line: &str) -> Vec<String> {
    let mut columns: Vec<String> = COLUMN_GAP
        .split(line)
        .filter(|c| !c.is_empty())
        .map(str::to_owned)
        .collect();

    if let Some(first) = columns.first_mut() {
        if let Some(key) = first.split_whitespace().next() {
            *first = key.to_owned();
        }
    }

    columns
        .into_iter()
        .map(|c| match c.split_once(") ") {
            Some((_, rest)) => rest.to_owned(),
            None => c,
        })
        .collect()
}

fn display_name(row: &[String]) -> Option<&str> {
    let last = row.last()?.trim();
    if last == RECOMMENDED_MARKER && row.len() > 1 {
        Some(row[row.len() - 2].trim())
    } else {
        Some(last)
    }
}

/// Parse `expressvpn list all`.
///
/// Rows before the `smart` row are headers and are dropped. When several rows
/// share a display name the later row's key wins. The result is sorted by
/// display name.
pub fn parse_locations(output: &str) -> Vec<Location> {
    let clean = strip_ansi(output);
    let rows: Vec<Vec<String>> = clean
        .lines()
        .map(split_columns)
        .filter(|row| !row.is_empty())
        .collect();

    let start = rows
        .iter()
        .rposition(|row| row.iter().any(|c| c.starts_with(SMART_LOCATION_KEY)))
        .unwrap_or(0);

    let mut by_name: BTreeMap<String, String> = BTreeMap::new();
    for row in &rows[start..] {
        let Some(name) = display_name(row) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        by_name.insert(name.to_owned(), row[0].trim().to_owned());
    }

    by_name
        .into_iter()
        .map(|(display_name, key)| Location { key, display_name })
        .collect()
}

/// Connect key for `display_name`, or the smart pick when it is unknown.
pub fn location_key<'a>(locations: &'a [Location], display_name: &str) -> &'a str {
    locations
        .iter()
        .find(|l| l.display_name == display_name)
        .map_or(SMART_LOCATION_KEY, |l| l.key.as_str())
}

/// Parse `expressvpn protocol --list`.
pub fn parse_protocols(output: &str) -> Vec<String> {
    strip_ansi(output)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Parse `expressvpn preferences`.
pub fn parse_preferences(output: &str) -> Preferences {
    let mut preferences = Preferences::default();

    for line in strip_ansi(output).lines() {
        let mut fields = line.split_whitespace();
        let (Some(name), Some(value)) = (fields.next(), fields.next()) else {
            continue;
        };
        match name {
            "network_lock" => {
                preferences.network_lock = value.parse().unwrap_or_else(|err| {
                    warn!("{err} Falling back to {}", NetworkLock::Default);
                    NetworkLock::Default
                })
            }
            "preferred_protocol" => preferences.preferred_protocol = value.to_owned(),
            _ => (),
        }
    }

    preferences
}

/// Parse `expressvpn status`. Only called when the command succeeded, so the
/// daemon is known to be reachable.
pub fn parse_status(output: &str) -> VpnStatus {
    let clean = strip_ansi(output);

    let connected_location = clean
        .lines()
        .filter_map(|l| l.strip_prefix(CONNECTED_PREFIX))
        .map(|l| l.trim().to_owned())
        .next_back();

    VpnStatus {
        connected_location,
        daemon_reachable: true,
        activated: !clean.contains(NOT_ACTIVATED),
    }
}

/// Whether `expressvpn -v` printed the expected banner.
pub fn is_version_banner(output: &str) -> bool {
    strip_ansi(output).contains(VERSION_BANNER)
}
