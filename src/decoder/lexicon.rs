//! Status and command code tables
//!
//! Codes observed on the wire, mapped to what they mean. Both tables are built
//! once and never mutated.

use std::collections::HashMap;

use once_cell::sync::Lazy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusEntry {
    pub error: bool,
    pub description: &'static str,
}

/// Applied to any status code missing from the table.
pub const UNKNOWN_STATUS: StatusEntry = StatusEntry {
    error: true,
    description: "Unknown status code",
};

static STATUSES: Lazy<HashMap<&'static str, StatusEntry>> = Lazy::new(|| {
    let entries: [(&str, bool, &str); 21] = [
        ("Rdy",  false, "Ready"),
        ("RDY",  false, "Ready"),
        ("CCP",  false, "Clean cycle in progress"),
        ("CCC",  false, "Clean cycle complete"),
        ("CST",  false, "Cat sensor timing"),
        ("CSI",  false, "Cat sensor interrupted"),
        ("EC",   false, "Empty cycle"),
        ("DF1",  false, "Drawer almost full, 2 cycles left"),
        ("DF2",  false, "Drawer almost full, 1 cycle left"),
        ("P",    false, "Paused"),
        ("OFF",  false, "Power off"),
        ("DFS",  true,  "Drawer full"),
        ("SDF",  true,  "Drawer full at startup"),
        ("BR",   true,  "Bonnet removed"),
        ("CSF",  true,  "Cat sensor fault"),
        ("DHF",  true,  "Dump and home position fault"),
        ("DPF",  true,  "Dump position fault"),
        ("HPF",  true,  "Home position fault"),
        ("OTF",  true,  "Over torque fault"),
        ("PD",   true,  "Pinch detect"),
        ("SPF",  true,  "Pinch detect at startup"),
    ];

    entries
        .into_iter()
        .map(|(code, error, description)| (code, StatusEntry { error, description }))
        .collect()
});

static COMMANDS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("C",   "Start clean cycle"),
        ("D",   "Reset settings to defaults"),
        ("G",   "Request status report"),
        ("P0",  "Power off"),
        ("P1",  "Power on"),
        ("N0",  "Night light off"),
        ("N1",  "Night light on"),
        ("L0",  "Panel lock off"),
        ("L1",  "Panel lock on"),
        ("W3",  "Set clean wait to 3 minutes"),
        ("W7",  "Set clean wait to 7 minutes"),
        ("WF",  "Set clean wait to 15 minutes"),
        ("S0",  "Sleep mode off"),
        ("S1",  "Sleep mode on"),
        ("R",   "Reset drawer full indicator"),
        ("AOK", "Acknowledged"),
        ("NOK", "Not acknowledged"),
    ])
});

pub fn lookup_status(code: &str) -> Option<&'static StatusEntry> {
    STATUSES.get(code)
}

/// Named default rule: a status code we have never seen is treated as an error.
pub fn status_or_unknown(code: &str) -> StatusEntry {
    lookup_status(code).copied().unwrap_or(UNKNOWN_STATUS)
}

pub fn lookup_command(code: &str) -> Option<&'static str> {
    COMMANDS.get(code).copied()
}
