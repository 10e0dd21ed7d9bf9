//! Room codes and invite links.
//!
//! A room is addressed only by a short code that people read aloud or paste
//! into chat, so generation avoids look-alike characters while parsing stays
//! lenient about case. Two hosts can draw the same code; the log resolves
//! that with "create if absent", not with global uniqueness.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Number of characters in a room code.
pub const CODE_LEN: usize = 4;

/// Characters used when generating codes: no `0`/`O`, `1`/`I`/`L`.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Fragment that precedes the code in an invite link.
pub const INVITE_PREFIX: &str = "#/fun-zone/battleship-";

/// A short, case-insensitive room identifier, stored uppercase.
///
/// Serializes as a plain string (`"AX9G"`), so it can be used directly as
/// a map key on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Draws a fresh random code from [`CODE_ALPHABET`].
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let code = (0..CODE_LEN)
            .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    /// Parses a code, ignoring case and surrounding whitespace.
    ///
    /// Accepts any ASCII alphanumerics of the right length, not just the
    /// generation alphabet: codes typed by hand may contain an `O` for `0`.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.len() != CODE_LEN || !trimmed.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return None;
        }
        Some(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomCode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ProtocolError::InvalidRoomCode(s.to_string()))
    }
}

impl TryFrom<String> for RoomCode {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

/// Builds the deep-link fragment for a code: `#/fun-zone/battleship-AX9G`.
pub fn build_invite(code: &RoomCode) -> String {
    format!("{INVITE_PREFIX}{code}")
}

/// Extracts the room code from an invite.
///
/// Accepts the bare fragment or a full URL that ends with it. Anything else
/// (wrong prefix, wrong length, trailing path segments) yields `None`.
pub fn parse_room_code(link: &str) -> Option<RoomCode> {
    let link = link.trim();
    let fragment = &link[link.find('#')?..];
    let prefix_len = INVITE_PREFIX.len();
    if fragment.len() != prefix_len + CODE_LEN {
        return None;
    }
    // Prefix match is case-insensitive, like the code itself.
    let (prefix, code) = fragment.split_at_checked(prefix_len)?;
    if !prefix.eq_ignore_ascii_case(INVITE_PREFIX) {
        return None;
    }
    RoomCode::parse(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_uses_alphabet_and_length() {
        for _ in 0..200 {
            let code = RoomCode::generate();
            assert_eq!(code.as_str().len(), CODE_LEN);
            assert!(code.as_str().bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_generated_codes_parse_back() {
        for _ in 0..50 {
            let code = RoomCode::generate();
            assert_eq!(RoomCode::parse(code.as_str()), Some(code));
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(RoomCode::parse("ax9g").unwrap().as_str(), "AX9G");
        assert_eq!(RoomCode::parse(" Ax9G ").unwrap().as_str(), "AX9G");
    }

    #[test]
    fn test_parse_rejects_bad_codes() {
        assert!(RoomCode::parse("").is_none());
        assert!(RoomCode::parse("AX9").is_none());
        assert!(RoomCode::parse("AX9GG").is_none());
        assert!(RoomCode::parse("AX-G").is_none());
        assert!(RoomCode::parse("ÅX9G").is_none());
    }

    #[test]
    fn test_from_str_error_names_input() {
        let err = "nope!".parse::<RoomCode>().unwrap_err();
        assert!(err.to_string().contains("nope!"));
    }

    #[test]
    fn test_room_code_serializes_as_string() {
        let code = RoomCode::parse("AX9G").unwrap();
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"AX9G\"");
        let back: RoomCode = serde_json::from_str("\"ax9g\"").unwrap();
        assert_eq!(back, code);
        assert!(serde_json::from_str::<RoomCode>("\"toolong\"").is_err());
    }

    #[test]
    fn test_invite_round_trip() {
        let code = RoomCode::parse("AX9G").unwrap();
        assert_eq!(build_invite(&code), "#/fun-zone/battleship-AX9G");
        assert_eq!(parse_room_code(&build_invite(&code)), Some(code));
    }

    #[test]
    fn test_parse_room_code_from_full_url() {
        let code = parse_room_code("https://example.dev/#/fun-zone/battleship-q7rt").unwrap();
        assert_eq!(code.as_str(), "Q7RT");
    }

    #[test]
    fn test_parse_room_code_rejects_malformed_links() {
        assert_eq!(parse_room_code("not-a-valid-link"), None);
        assert_eq!(parse_room_code(""), None);
        assert_eq!(parse_room_code("#/fun-zone/battleship-"), None);
        assert_eq!(parse_room_code("#/fun-zone/battleship-AX9GZ"), None);
        assert_eq!(parse_room_code("#/fun-zone/minesweeper-AX9G"), None);
        assert_eq!(parse_room_code("#/fun-zone/battleship-AX!G"), None);
    }
}
