//! UCS-2 names for the Joliet tree.
use super::hash;

/// Longest Joliet name, in UCS-2 code units.
pub(crate) const MAX_LEN: usize = 64;
const EXT_LEN: usize = 5;

const UNDERSCORE: u16 = b'_' as u16;

fn valid_char(c: char) -> bool {
    !matches!(c, '*' | '/' | ':' | ';' | '?' | '\\') && !c.is_control() && (c as u32) <= 0xffff
}

/// Maps every character to one code unit. Invalid characters and
/// characters outside the BMP become `_`.
fn fold(s: &str) -> Vec<u16> {
    s.chars()
        .map(|c| {
            if valid_char(c) {
                c as u16
            } else {
                UNDERSCORE
            }
        })
        .collect()
}

fn split(name: &str, is_dir: bool) -> (&str, Option<&str>) {
    if is_dir {
        return (name, None);
    }
    match name.rfind('.') {
        Some(pos) if pos > 0 => {
            let ext = &name[pos + 1..];
            let n = ext.chars().count();
            if (1..=EXT_LEN).contains(&n) && ext.chars().all(valid_char) {
                (&name[..pos], Some(ext))
            } else {
                (name, None)
            }
        }
        _ => (name, None),
    }
}

fn assemble(base: &[u16], base_room: usize, ext: Option<&str>) -> Vec<u16> {
    let mut out: Vec<u16> = base.iter().copied().take(base_room).collect();
    if let Some(ext) = ext {
        out.push(u16::from(b'.'));
        out.extend(fold(ext));
    }
    out
}

fn ext_room(ext: Option<&str>) -> usize {
    ext.map(|e| e.chars().count() + 1).unwrap_or(0)
}

/// The name in pass 0. Names that fit are kept whole, longer ones lose the
/// end of their base but keep a short extension.
pub(crate) fn plain(name: &str, is_dir: bool) -> Vec<u16> {
    let whole = fold(name);
    if whole.len() <= MAX_LEN {
        return whole;
    }
    let (base, ext) = split(name, is_dir);
    assemble(&fold(base), MAX_LEN - ext_room(ext), ext)
}

/// The name in later passes, with a hash suffix at the end of the base.
pub(crate) fn hashed(name: &str, is_dir: bool, pass: u32) -> Vec<u16> {
    let (base, ext) = split(name, is_dir);
    let suffix = fold(&hash::suffix(name, pass));
    let mut base = fold(base);
    base.truncate(MAX_LEN - ext_room(ext) - suffix.len());
    base.extend(suffix);
    assemble(&base, MAX_LEN, ext)
}
