//! Directory record parsing.
use crate::wire::{le_u32, DR_BASE_LEN, FLAG_DIRECTORY};

/// A directory record borrowed from a directory extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawRecord<'a> {
    pub len: usize,
    pub extent: u32,
    pub size: u32,
    pub flags: u8,
    pub identifier: &'a [u8],
    pub system_use: &'a [u8],
}

impl<'a> RawRecord<'a> {
    /// Parses the record at the start of `buf`. Returns `None` if the length
    /// byte or identifier length do not fit.
    pub(crate) fn parse(buf: &'a [u8]) -> Option<Self> {
        let len = usize::from(*buf.first()?);
        if len < DR_BASE_LEN || len > buf.len() {
            return None;
        }
        let id_len = usize::from(buf[32]);
        let id_end = DR_BASE_LEN + id_len;
        if id_end > len {
            return None;
        }
        // A pad byte follows identifiers of even length.
        let su_start = (id_end + usize::from(id_len % 2 == 0)).min(len);
        Some(RawRecord {
            len,
            extent: le_u32(buf, 2),
            size: le_u32(buf, 10),
            flags: buf[25],
            identifier: &buf[DR_BASE_LEN..id_end],
            system_use: &buf[su_start..len],
        })
    }

    pub(crate) fn is_directory(&self) -> bool {
        self.flags & FLAG_DIRECTORY != 0
    }

    /// The `.` and `..` records have the single byte identifiers 0 and 1.
    pub(crate) fn is_self_or_parent(&self) -> bool {
        matches!(self.identifier, [0] | [1])
    }
}

/// Drops the `;N` version suffix and the trailing dot of extensionless
/// names.
pub(crate) fn strip_version(name: &str) -> &str {
    let name = name.split_once(';').map(|(n, _)| n).unwrap_or(name);
    match name.strip_suffix('.') {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::{strip_version, RawRecord};
    use rstest::rstest;

    fn record(id: &[u8], su: &[u8], flags: u8) -> Vec<u8> {
        let mut r = vec![0u8; 33];
        r[2..6].copy_from_slice(&20u32.to_le_bytes());
        r[10..14].copy_from_slice(&4096u32.to_le_bytes());
        r[25] = flags;
        r[32] = id.len() as u8;
        r.extend_from_slice(id);
        if id.len() % 2 == 0 {
            r.push(0);
        }
        r.extend_from_slice(su);
        r[0] = r.len() as u8;
        r
    }

    #[test]
    fn parse_file_record() {
        let buf = record(b"FOO.TXT;1", b"PX", 0);
        let r = RawRecord::parse(&buf).unwrap();
        assert_eq!(20, r.extent);
        assert_eq!(4096, r.size);
        assert!(!r.is_directory());
        assert_eq!(b"FOO.TXT;1", r.identifier);
        assert_eq!(b"PX", r.system_use);
    }

    #[test]
    fn parse_padded_identifier() {
        let buf = record(b"AB", b"NM", 2);
        let r = RawRecord::parse(&buf).unwrap();
        assert!(r.is_directory());
        assert_eq!(b"AB", r.identifier);
        assert_eq!(b"NM", r.system_use);
        assert!(RawRecord::parse(&record(&[0], &[], 2)).unwrap().is_self_or_parent());
    }

    #[test]
    fn reject_garbage() {
        assert_eq!(None, RawRecord::parse(&[]));
        assert_eq!(None, RawRecord::parse(&[10; 10]));
        let mut buf = record(b"A", &[], 0);
        buf[32] = 200;
        assert_eq!(None, RawRecord::parse(&buf));
    }

    #[rstest]
    #[case("FOO.TXT;1", "FOO.TXT")]
    #[case("FOO.;1", "FOO")]
    #[case("FOO", "FOO")]
    #[case("README.", "README")]
    #[case(".", ".")]
    fn versions(#[case] raw: &str, #[case] exp: &str) {
        assert_eq!(exp, strip_version(raw));
    }
}
