//! System use sharing protocol entries and the Rock Ridge fields carried in
//! them.
use crate::cursor::BlockReader;
use crate::wire::le_u32;
use crate::Error;

/// Continuation areas followed from a single record before giving up.
const MAX_CONTINUATIONS: usize = 16;

/// Longest continuation area accepted.
const MAX_CE_LEN: u32 = 64 * 1024;

const NM_CONTINUE: u8 = 0x01;
const SL_CONTINUE: u8 = 0x01;
const SL_CURRENT: u8 = 0x02;
const SL_PARENT: u8 = 0x04;
const SL_ROOT: u8 = 0x08;

/// Rock Ridge attributes collected from a record's system use area and its
/// continuation areas.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct RockRidge {
    /// Skip length announced by an `SP` entry.
    pub sp_skip: Option<usize>,
    pub mode: Option<u32>,
    name: Option<Vec<u8>>,
    name_done: bool,
    target: Option<String>,
    target_sep: bool,
}

impl RockRidge {
    pub(crate) fn name(&self) -> Option<String> {
        self.name
            .as_ref()
            .map(|n| String::from_utf8_lossy(n).into_owned())
    }

    pub(crate) fn symlink_target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    fn push_name(&mut self, flags: u8, data: &[u8]) {
        if self.name_done {
            return;
        }
        self.name.get_or_insert_with(Vec::new).extend_from_slice(data);
        if flags & NM_CONTINUE == 0 {
            self.name_done = true;
        }
    }

    /// Appends the components of one `SL` entry.
    fn push_symlink(&mut self, mut components: &[u8]) {
        let target = self.target.get_or_insert_with(String::new);
        while components.len() >= 2 {
            let flags = components[0];
            let len = usize::from(components[1]);
            let Some(data) = components.get(2..2 + len) else {
                break;
            };
            components = &components[2 + len..];

            if flags & SL_ROOT != 0 {
                target.push('/');
                self.target_sep = false;
                continue;
            }
            if self.target_sep {
                target.push('/');
            }
            if flags & SL_CURRENT != 0 {
                target.push('.');
            } else if flags & SL_PARENT != 0 {
                target.push_str("..");
            } else {
                target.push_str(&String::from_utf8_lossy(data));
            }
            self.target_sep = flags & SL_CONTINUE == 0;
        }
    }
}

/// Where a `CE` entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Continuation {
    block: u32,
    offset: u32,
    len: u32,
}

/// Parses the entries in `area`, then follows continuation areas.
pub(crate) fn parse(reader: BlockReader, area: &[u8]) -> Result<RockRidge, Error> {
    let mut rr = RockRidge::default();
    let mut next = parse_area(area, &mut rr);
    let mut followed = 0;
    while let Some(ce) = next {
        followed += 1;
        if followed > MAX_CONTINUATIONS || ce.len > MAX_CE_LEN {
            return Err(Error::InvalidImage(
                "runaway Rock Ridge continuation chain".to_string(),
            ));
        }
        let offset = u64::from(ce.block) * crate::wire::BLOCK_SIZE + u64::from(ce.offset);
        let buf = reader.read_vec(offset, ce.len as usize)?;
        next = parse_area(&buf, &mut rr);
    }
    Ok(rr)
}

/// Parses one area, returning its continuation if it has one.
fn parse_area(mut area: &[u8], rr: &mut RockRidge) -> Option<Continuation> {
    let mut continuation = None;
    while area.len() >= 4 {
        let sig = &area[..2];
        let len = usize::from(area[2]);
        if len < 4 || len > area.len() {
            break;
        }
        let entry = &area[..len];
        area = &area[len..];

        match sig {
            b"SP" if len >= 7 && entry[4..6] == [0xbe, 0xef] => {
                rr.sp_skip = Some(usize::from(entry[6]));
            }
            b"PX" if len >= 12 => rr.mode = Some(le_u32(entry, 4)),
            b"NM" if len >= 5 => rr.push_name(entry[4], &entry[5..]),
            b"SL" if len >= 5 => rr.push_symlink(&entry[5..]),
            b"CE" if len >= 28 => {
                continuation = Some(Continuation {
                    block: le_u32(entry, 4),
                    offset: le_u32(entry, 12),
                    len: le_u32(entry, 20),
                })
            }
            b"ST" => break,
            _ => {}
        }
    }
    continuation
}

#[cfg(test)]
mod tests {
    use super::{parse_area, RockRidge};

    fn entry(sig: &[u8; 2], body: &[u8]) -> Vec<u8> {
        let mut e = sig.to_vec();
        e.push((body.len() + 4) as u8);
        e.push(1);
        e.extend_from_slice(body);
        e
    }

    #[test]
    fn name_spans_entries() {
        let mut area = entry(b"NM", b"\x01long ");
        area.extend(entry(b"NM", b"\x00name"));
        area.extend(entry(b"NM", b"\x00ignored"));
        let mut rr = RockRidge::default();
        assert_eq!(None, parse_area(&area, &mut rr));
        assert_eq!(Some("long name".to_string()), rr.name());
    }

    #[test]
    fn posix_mode() {
        let mut body = vec![];
        body.extend_from_slice(&[0xed, 0x41, 0, 0, 0, 0, 0x41, 0xed]);
        body.extend_from_slice(&[0u8; 32]);
        let area = entry(b"PX", &body);
        let mut rr = RockRidge::default();
        parse_area(&area, &mut rr);
        assert_eq!(Some(0o40755), rr.mode);
    }

    #[test]
    fn symlink_components() {
        let comps: Vec<u8> = [
            vec![0x08, 0],
            vec![0, 3],
            b"usr".to_vec(),
            vec![0x01, 2],
            b"fo".to_vec(),
        ]
        .concat();
        let mut area = entry(b"SL", &[&[0x01][..], &comps[..]].concat());
        let more: Vec<u8> = [vec![0, 1], b"o".to_vec(), vec![0x04, 0], vec![0x02, 0]].concat();
        area.extend(entry(b"SL", &[&[0x00][..], &more[..]].concat()));
        let mut rr = RockRidge::default();
        parse_area(&area, &mut rr);
        assert_eq!(Some("/usr/foo/../."), rr.symlink_target());
    }

    #[test]
    fn continuation_and_sp() {
        let mut ce = vec![];
        ce.extend_from_slice(&[7, 0, 0, 0, 0, 0, 0, 7]);
        ce.extend_from_slice(&[100, 0, 0, 0, 0, 0, 0, 100]);
        ce.extend_from_slice(&[50, 0, 0, 0, 0, 0, 0, 50]);
        let mut area = entry(b"SP", &[0xbe, 0xef, 0]);
        area.extend(entry(b"CE", &ce));
        let mut rr = RockRidge::default();
        let next = parse_area(&area, &mut rr).unwrap();
        assert_eq!((7, 100, 50), (next.block, next.offset, next.len));
        assert_eq!(Some(0), rr.sp_skip);
    }

    #[test]
    fn truncated_entry_stops() {
        let mut area = entry(b"NM", b"\x00ok");
        area.extend_from_slice(b"PX\xff\x01");
        let mut rr = RockRidge::default();
        parse_area(&area, &mut rr);
        assert_eq!(Some("ok".to_string()), rr.name());
        assert_eq!(None, rr.mode);
    }
}
