//! LAN-world heuristics.
//!
//! A world opened to the local network from a game client advertises a banner
//! shaped like `<player> - <world name>` and a fixed capacity of 8 players.

use lazy_static::lazy_static;
use regex::Regex;

use crate::types::{Category, ServerStatus};

/// Marker that introduces a two-character formatting code.
pub const FORMAT_MARKER: char = '§';

/// Player capacity of a world opened to LAN.
pub const LAN_MAX_PLAYERS: u32 = 8;

lazy_static! {
    static ref LAN_MOTD_SHAPE: Regex =
        Regex::new(r"^[A-Za-z0-9_ ]+\s*-\s*.+$").expect("static pattern compiles");
}

/// Strip formatting codes, turn line breaks into spaces, collapse whitespace runs and trim.
///
/// The marker swallows whatever character follows it, line breaks included, so the
/// output never contains a marker and normalizing twice changes nothing.
pub fn normalize_motd(raw: &str) -> String {
    let mut stripped = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == FORMAT_MARKER {
            chars.next();
            continue;
        }
        stripped.push(c);
    }
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `<name> - <anything>` where the name is ASCII alphanumerics, underscores and spaces.
pub fn is_lan_motd_shape(motd: &str) -> bool {
    LAN_MOTD_SHAPE.is_match(motd)
}

pub fn classify(status: &ServerStatus) -> Category {
    let motd = normalize_motd(&status.motd);
    let lan = motd.contains(" - ")
        && status.online_players >= 1
        && status.max_players == LAN_MAX_PLAYERS
        && is_lan_motd_shape(&motd);
    if lan {
        Category::LanExposed
    } else {
        Category::Public
    }
}
