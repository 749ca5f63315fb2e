//! Pure codec between chunk metadata and the variable portion of a
//! chunk filename.
//!
//! Every chunk file is named `<prefix><variable_portion><suffix>`. The
//! variable portion encodes the journal key, the chunk role, and a
//! timestamp+nonce segment:
//!
//! ```text
//! <escaped-key> . <marker> <t_suffix>
//!                  │        └── 16 lowercase hex digits of
//!                  │            (timestamp_us << 12) | nonce
//!                  └── 'b' for a head chunk, 'q' for a sealed chunk
//! ```
//!
//! The key escaping (`%XX` for every byte outside `[A-Za-z0-9_-]`)
//! guarantees the escaped key never contains `.`, so the separator is
//! unambiguous. Head and Rest encodings differ in exactly the marker
//! character, which lets roll-over seal a chunk with a single rename
//! that preserves `t_suffix` and the unique id.
//!
//! The codec is pure: it never touches the filesystem.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Number of low bits of the encoded timestamp segment reserved for the
/// per-chunk random nonce.
pub(crate) const NONCE_BITS: u32 = 12;

/// Fixed width of the hex-encoded `t_suffix` segment.
const T_SUFFIX_LEN: usize = 16;

/// The role a chunk file plays within its journal.
///
/// A journal has at most one `Head` chunk (the file currently being
/// appended to) and it is always the newest. Every other chunk is
/// `Rest`: sealed by the roll-over rename and immutable from the
/// journal's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkRole {
    /// The chunk is open for appending.
    Head,
    /// The chunk has been sealed by roll-over.
    Rest,
}

impl ChunkRole {
    /// The single filename character that distinguishes the two roles.
    fn marker(self) -> char {
        match self {
            ChunkRole::Head => 'b',
            ChunkRole::Rest => 'q',
        }
    }

    fn from_marker(marker: char) -> Option<Self> {
        match marker {
            'b' => Some(ChunkRole::Head),
            'q' => Some(ChunkRole::Rest),
            _ => None,
        }
    }
}

/// Decoded (or freshly encoded) chunk filename metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathInfo {
    /// The portion of the filename between the group prefix and suffix.
    pub variable_portion: String,
    /// The journal key this chunk belongs to.
    pub key: String,
    /// The chunk role recovered from the marker character.
    pub role: ChunkRole,
    /// The encoded timestamp+nonce segment, stable across rename.
    pub t_suffix: String,
    /// Microseconds since the Unix epoch, used only to order chunks on
    /// startup.
    pub timestamp: u64,
    /// Per-chunk identifier embedded in the filename; survives rename.
    pub unique_id: [u8; 8],
}

/// A filename variable portion that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeError {
    /// No `.` separator between the escaped key and the role segment.
    MissingSeparator,
    /// The key portion decodes to an empty string.
    EmptyKey,
    /// The key portion contains an invalid or truncated `%XX` escape,
    /// or a character outside the escaped alphabet.
    InvalidEscape,
    /// The role marker character is not one of the known markers.
    InvalidRole {
        /// The unrecognized marker character.
        marker: char,
    },
    /// The timestamp segment is missing, has the wrong width, or is not
    /// lowercase hex.
    MalformedTimestamp,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::MissingSeparator => {
                write!(f, "missing key/role separator in chunk filename")
            }
            DecodeError::EmptyKey => write!(f, "empty journal key in chunk filename"),
            DecodeError::InvalidEscape => {
                write!(f, "invalid key escape sequence in chunk filename")
            }
            DecodeError::InvalidRole { marker } => {
                write!(f, "unknown chunk role marker '{marker}'")
            }
            DecodeError::MalformedTimestamp => {
                write!(f, "malformed timestamp segment in chunk filename")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Encode the variable filename portion for a brand-new chunk.
///
/// `nonce` is truncated to its low [`NONCE_BITS`] bits. Times before
/// the Unix epoch encode as timestamp zero.
pub fn encode(key: &str, role: ChunkRole, time: SystemTime, nonce: u16) -> PathInfo {
    let timestamp_us = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0);
    let t = (timestamp_us << NONCE_BITS) | u64::from(nonce & ((1 << NONCE_BITS) - 1));
    let t_suffix = format!("{t:016x}");
    let variable_portion = build_variable_portion(key, role, &t_suffix);
    PathInfo {
        variable_portion,
        key: key.to_string(),
        role,
        t_suffix,
        timestamp: timestamp_us,
        unique_id: t.to_be_bytes(),
    }
}

/// Re-encode a variable filename portion for an existing chunk,
/// preserving its `t_suffix` (and with it the timestamp and unique id).
///
/// This is the rename half of roll-over: only the role marker changes.
pub fn encode_with_t_suffix(key: &str, role: ChunkRole, t_suffix: &str) -> String {
    build_variable_portion(key, role, t_suffix)
}

fn build_variable_portion(key: &str, role: ChunkRole, t_suffix: &str) -> String {
    format!("{}.{}{}", escape_key(key), role.marker(), t_suffix)
}

/// Decode a variable filename portion back into chunk metadata.
///
/// # Errors
///
/// Returns a [`DecodeError`] describing the first malformed segment.
/// Callers scanning a directory treat any decode error as "not one of
/// our files" and skip the entry with a warning.
pub fn decode(variable_portion: &str) -> Result<PathInfo, DecodeError> {
    let (escaped_key, role_segment) = variable_portion
        .split_once('.')
        .ok_or(DecodeError::MissingSeparator)?;
    let key = unescape_key(escaped_key)?;
    if key.is_empty() {
        return Err(DecodeError::EmptyKey);
    }

    let mut chars = role_segment.chars();
    let marker = chars.next().ok_or(DecodeError::MalformedTimestamp)?;
    let role = ChunkRole::from_marker(marker).ok_or(DecodeError::InvalidRole { marker })?;

    let t_suffix = chars.as_str();
    if t_suffix.len() != T_SUFFIX_LEN
        || !t_suffix
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return Err(DecodeError::MalformedTimestamp);
    }
    let t = u64::from_str_radix(t_suffix, 16).map_err(|_| DecodeError::MalformedTimestamp)?;

    Ok(PathInfo {
        variable_portion: variable_portion.to_string(),
        key,
        role,
        t_suffix: t_suffix.to_string(),
        timestamp: t >> NONCE_BITS,
        unique_id: t.to_be_bytes(),
    })
}

fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for &b in key.as_bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'-' => out.push(b as char),
            _ => {
                out.push('%');
                out.push(hex_digit(b >> 4));
                out.push(hex_digit(b & 0x0f));
            }
        }
    }
    out
}

fn hex_digit(nibble: u8) -> char {
    char::from_digit(u32::from(nibble), 16)
        .map(|c| c.to_ascii_uppercase())
        .unwrap_or('0')
}

fn unescape_key(escaped: &str) -> Result<String, DecodeError> {
    let mut out = Vec::with_capacity(escaped.len());
    let mut bytes = escaped.bytes();
    while let Some(b) = bytes.next() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'-' => out.push(b),
            b'%' => {
                let hi = bytes.next().ok_or(DecodeError::InvalidEscape)?;
                let lo = bytes.next().ok_or(DecodeError::InvalidEscape)?;
                let hi = (hi as char)
                    .to_digit(16)
                    .ok_or(DecodeError::InvalidEscape)?;
                let lo = (lo as char)
                    .to_digit(16)
                    .ok_or(DecodeError::InvalidEscape)?;
                out.push(((hi << 4) | lo) as u8);
            }
            _ => return Err(DecodeError::InvalidEscape),
        }
    }
    String::from_utf8(out).map_err(|_| DecodeError::InvalidEscape)
}
