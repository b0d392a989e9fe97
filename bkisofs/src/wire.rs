//! ISO9660 on-disk constants and the field encodings shared by the reader
//! and the writer.
//!
//! # Encoding
//!
//! Numeric fields are either little-endian, big-endian or "both-endian": the
//! little-endian representation immediately followed by the big-endian one.
//! Readers only ever look at the little-endian half.
//!
//! Fixed-width text fields are padded with spaces. In the Joliet
//! supplementary descriptor they hold big-endian UCS-2 instead, padded with
//! `0x00 0x20`.
//!
//! Directory records carry a 7 byte binary timestamp, volume descriptors a
//! 17 byte ASCII one. Both are written in UTC.
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

/// Size of a logical block. Every extent starts on a block boundary.
pub const BLOCK_SIZE: u64 = 2048;

/// Blocks reserved for the system area in front of the first volume
/// descriptor.
pub const SYSTEM_AREA_BLOCKS: u64 = 16;

pub const VD_BOOT_RECORD: u8 = 0;
pub const VD_PRIMARY: u8 = 1;
pub const VD_SUPPLEMENTARY: u8 = 2;
pub const VD_TERMINATOR: u8 = 255;

pub const STANDARD_ID: &[u8; 5] = b"CD001";

pub const EL_TORITO_ID: &[u8] = b"EL TORITO SPECIFICATION";

/// Escape sequences announcing UCS-2 levels 1, 2 and 3.
pub const JOLIET_ESCAPES: [[u8; 3]; 3] = [[0x25, 0x2f, 0x40], [0x25, 0x2f, 0x43], [0x25, 0x2f, 0x45]];

/// Length of a directory record before the file identifier.
pub const DR_BASE_LEN: usize = 33;

/// Directory record flag bit of subdirectories.
pub const FLAG_DIRECTORY: u8 = 0x02;

/// The longest symlink target that is accepted.
pub const MAX_SYMLINK_TARGET: usize = 250;

/// The longest name a node can have.
pub const MAX_NAME_LEN: usize = 255;

pub fn both_u16(v: u16) -> [u8; 4] {
    let le = v.to_le_bytes();
    let be = v.to_be_bytes();
    [le[0], le[1], be[0], be[1]]
}

pub fn both_u32(v: u32) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[..4].copy_from_slice(&v.to_le_bytes());
    out[4..].copy_from_slice(&v.to_be_bytes());
    out
}

/// Reads a little-endian u16 at `off`. Callers check bounds.
pub fn le_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

/// Reads a little-endian u32 at `off`. Callers check bounds.
pub fn le_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// Space-padded (and truncated) ASCII field.
pub fn a_chars(s: &str, len: usize) -> Vec<u8> {
    let mut out: Vec<u8> = s
        .bytes()
        .map(|b| if b.is_ascii() { b } else { b'_' })
        .take(len)
        .collect();
    out.resize(len, b' ');
    out
}

/// Big-endian UCS-2 field for the Joliet descriptor. Characters outside the
/// BMP are replaced, the field is padded with UCS-2 spaces.
pub fn ucs2_chars(s: &str, len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    for c in s.chars() {
        let unit = u16::try_from(u32::from(c)).unwrap_or(u16::from(b'_'));
        if out.len() + 2 > len {
            break;
        }
        out.extend_from_slice(&unit.to_be_bytes());
    }
    while out.len() + 2 <= len {
        out.extend_from_slice(&[0x00, 0x20]);
    }
    out.resize(len, 0);
    out
}

/// Decodes a space-padded field, dropping trailing padding.
pub fn trim_a_chars(field: &[u8]) -> String {
    String::from_utf8_lossy(field)
        .trim_end_matches([' ', '\0'])
        .to_string()
}

/// Encodes a string as big-endian UTF-16 code units.
pub fn ucs2_encode(units: &[u16]) -> Vec<u8> {
    units.iter().flat_map(|u| u.to_be_bytes()).collect()
}

/// Decodes big-endian UTF-16. Unpaired surrogates become U+FFFD.
pub fn ucs2_decode(raw: &[u8]) -> String {
    let units = raw
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]));
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

fn utc(dt: OffsetDateTime) -> OffsetDateTime {
    dt.to_offset(UtcOffset::UTC)
}

/// 7 byte directory record timestamp. Years outside 1900..=2155 are clamped.
pub fn short_timestamp(dt: OffsetDateTime) -> [u8; 7] {
    let dt = utc(dt);
    [
        (dt.year().clamp(1900, 2155) - 1900) as u8,
        dt.month() as u8,
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second(),
        0,
    ]
}

/// 17 byte volume descriptor timestamp.
pub fn long_timestamp(dt: OffsetDateTime) -> [u8; 17] {
    let dt = utc(dt);
    let s = format!(
        "{:04}{:02}{:02}{:02}{:02}{:02}00",
        dt.year().clamp(1, 9999),
        dt.month() as u8,
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second()
    );
    let mut out = [0u8; 17];
    out[..16].copy_from_slice(&s.as_bytes()[..16]);
    out
}

/// Field that means "not specified".
pub fn unset_long_timestamp() -> [u8; 17] {
    let mut out = [b'0'; 17];
    out[16] = 0;
    out
}

fn assemble(
    year: i32,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
    quarter_hours: i8,
) -> Option<OffsetDateTime> {
    let date = Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()?;
    let time = Time::from_hms(hour, minute, second).ok()?;
    let offset = UtcOffset::from_whole_seconds(i32::from(quarter_hours) * 15 * 60).ok()?;
    Some(PrimitiveDateTime::new(date, time).assume_offset(offset))
}

/// Parses a 17 byte volume descriptor timestamp. The unset value and
/// garbage yield `None`.
pub fn parse_long_timestamp(raw: &[u8]) -> Option<OffsetDateTime> {
    let raw = raw.get(..17)?;
    let digits = std::str::from_utf8(&raw[..16]).ok()?;
    let field = |range: std::ops::Range<usize>| digits.get(range)?.parse::<u16>().ok();
    let year = field(0..4)?;
    if year == 0 {
        return None;
    }
    assemble(
        i32::from(year),
        u8::try_from(field(4..6)?).ok()?,
        u8::try_from(field(6..8)?).ok()?,
        u8::try_from(field(8..10)?).ok()?,
        u8::try_from(field(10..12)?).ok()?,
        u8::try_from(field(12..14)?).ok()?,
        raw[16] as i8,
    )
}
