//! Rock Ridge system use entries.
use crate::wire::{both_u32, BLOCK_SIZE};

const ER_ID: &[u8] = b"RRIP_1991A";
const ER_DESCRIPTOR: &[u8] =
    b"THE ROCK RIDGE INTERCHANGE PROTOCOL PROVIDES SUPPORT FOR POSIX FILE SYSTEM SEMANTICS";
const ER_SOURCE: &[u8] = b"PLEASE CONTACT DISC PUBLISHER FOR SPECIFICATION SOURCE.  SEE PUBLISHER IDENTIFIER IN PRIMARY VOLUME DESCRIPTOR FOR CONTACT INFORMATION.";

/// Longest system use entry.
const MAX_ENTRY: usize = 255;

/// Length of a `CE` entry.
pub(crate) const CE_LEN: usize = 28;

const CONTINUE: u8 = 0x01;
const SL_CURRENT: u8 = 0x02;
const SL_PARENT: u8 = 0x04;
const SL_ROOT: u8 = 0x08;

fn entry(sig: &[u8; 2], body: &[u8]) -> Vec<u8> {
    let mut e = Vec::with_capacity(4 + body.len());
    e.extend_from_slice(sig);
    e.push((4 + body.len()) as u8);
    e.push(1);
    e.extend_from_slice(body);
    e
}

/// The `SP` entry marking the use of the sharing protocol, with a skip
/// length of zero.
pub(crate) fn sp() -> Vec<u8> {
    entry(b"SP", &[0xbe, 0xef, 0])
}

/// The `ER` entry identifying Rock Ridge.
pub(crate) fn er() -> Vec<u8> {
    let mut body = vec![
        ER_ID.len() as u8,
        ER_DESCRIPTOR.len() as u8,
        ER_SOURCE.len() as u8,
        1,
    ];
    body.extend_from_slice(ER_ID);
    body.extend_from_slice(ER_DESCRIPTOR);
    body.extend_from_slice(ER_SOURCE);
    entry(b"ER", &body)
}

/// POSIX attributes. Owner and group are always 0.
pub(crate) fn px(mode: u32, links: u32) -> Vec<u8> {
    let mut body = Vec::with_capacity(32);
    body.extend_from_slice(&both_u32(mode));
    body.extend_from_slice(&both_u32(links));
    body.extend_from_slice(&both_u32(0));
    body.extend_from_slice(&both_u32(0));
    entry(b"PX", &body)
}

/// The name split into as many `NM` entries as needed.
pub(crate) fn nm(name: &str) -> Vec<Vec<u8>> {
    let chunks: Vec<&[u8]> = name.as_bytes().chunks(MAX_ENTRY - 5).collect();
    let last = chunks.len().saturating_sub(1);
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let mut body = vec![if i < last { CONTINUE } else { 0 }];
            body.extend_from_slice(chunk);
            entry(b"NM", &body)
        })
        .collect()
}

/// Components of a symlink target: flags and text.
fn components(target: &str) -> Vec<(u8, &[u8])> {
    let mut out = vec![];
    if target.starts_with('/') {
        out.push((SL_ROOT, &[][..]));
    }
    for part in target.split('/').filter(|p| !p.is_empty()) {
        out.push(match part {
            "." => (SL_CURRENT, &[][..]),
            ".." => (SL_PARENT, &[][..]),
            _ => (0, part.as_bytes()),
        });
    }
    out
}

/// The target split into `SL` entries. Component records that do not fit
/// an entry are split with the component continuation flag.
pub(crate) fn sl(target: &str) -> Vec<Vec<u8>> {
    let room = MAX_ENTRY - 5;
    let mut bodies: Vec<Vec<u8>> = vec![];
    let mut current: Vec<u8> = vec![];

    for (flags, mut data) in components(target) {
        loop {
            if room - current.len() < 3 {
                bodies.push(std::mem::take(&mut current));
            }
            let take = data.len().min(room - current.len() - 2);
            let more = take < data.len();
            current.push(if more { flags | CONTINUE } else { flags });
            current.push(take as u8);
            current.extend_from_slice(&data[..take]);
            data = &data[take..];
            if !more {
                break;
            }
        }
    }
    bodies.push(current);

    let last = bodies.len() - 1;
    bodies
        .iter()
        .enumerate()
        .map(|(i, comps)| {
            let mut body = vec![if i < last { CONTINUE } else { 0 }];
            body.extend_from_slice(comps);
            entry(b"SL", &body)
        })
        .collect()
}

/// A continuation entry pointing at `len` bytes at `offset` into `block`.
pub(crate) fn ce(block: u32, offset: u32, len: u32) -> Vec<u8> {
    let mut body = Vec::with_capacity(24);
    body.extend_from_slice(&both_u32(block));
    body.extend_from_slice(&both_u32(offset));
    body.extend_from_slice(&both_u32(len));
    entry(b"CE", &body)
}

/// A record's system use entries after fitting them into the record.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Fitted {
    /// Bytes stored in the record itself.
    pub inline: Vec<u8>,
    /// Position of the `CE` entry inside `inline`, and the bytes of its
    /// continuation area, if anything spilled.
    pub spill: Option<(usize, Vec<u8>)>,
}

/// Keeps entries in the record while they fit into `room` bytes and moves
/// the rest into a continuation area, in order.
pub(crate) fn fit(entries: Vec<Vec<u8>>, room: usize) -> Fitted {
    let total: usize = entries.iter().map(Vec::len).sum();
    if total <= room {
        return Fitted {
            inline: entries.concat(),
            spill: None,
        };
    }

    let mut inline = vec![];
    let mut area = vec![];
    let mut spilling = false;
    for e in entries {
        if !spilling && inline.len() + e.len() + CE_LEN <= room {
            inline.extend(e);
        } else {
            spilling = true;
            area.extend(e);
        }
    }
    debug_assert!(area.len() as u64 <= BLOCK_SIZE);
    let at = inline.len();
    inline.extend(ce(0, 0, 0));
    Fitted {
        inline,
        spill: Some((at, area)),
    }
}
