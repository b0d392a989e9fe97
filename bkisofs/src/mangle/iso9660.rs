//! Short upper-case 8.3 names for the primary tree.
use super::hash;

const BASE_LEN: usize = 8;
const EXT_LEN: usize = 3;

/// Characters kept in a base or extension. `.` is valid in a name only as
/// the one separator before the extension, so dots inside the base fold to
/// `_` and every written name stays a level 1 `BASE.EXT`.
fn valid_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '$' | '~')
}

fn fold(s: &str) -> String {
    s.chars()
        .map(|c| {
            if valid_char(c) {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Splits `name` into base and extension. Only files have extensions, and
/// only when they are short and made of valid characters. A leading dot does
/// not start an extension.
fn split(name: &str, is_dir: bool) -> (&str, Option<&str>) {
    if is_dir {
        return (name, None);
    }
    match name.rfind('.') {
        Some(pos) if pos > 0 => {
            let ext = &name[pos + 1..];
            if (1..=EXT_LEN).contains(&ext.len()) && ext.chars().all(valid_char) {
                (&name[..pos], Some(ext))
            } else {
                (name, None)
            }
        }
        _ => (name, None),
    }
}

fn assemble(base: String, ext: Option<&str>) -> String {
    match ext {
        Some(ext) => format!("{base}.{}", fold(ext)),
        None => base,
    }
}

/// The name in pass 0: folded and truncated, no hash.
pub(crate) fn plain(name: &str, is_dir: bool) -> String {
    let (base, ext) = split(name, is_dir);
    let mut base: String = fold(base).chars().take(BASE_LEN).collect();
    if base.is_empty() {
        base.push('_');
    }
    assemble(base, ext)
}

/// The name in later passes: the base is cut short to make room for a hash
/// suffix.
pub(crate) fn hashed(name: &str, is_dir: bool, pass: u32) -> String {
    let (base, ext) = split(name, is_dir);
    let suffix = hash::suffix(name, pass);
    let keep = BASE_LEN - suffix.len();
    let mut base: String = fold(base).chars().take(keep).collect();
    base.push_str(&suffix);
    assemble(base, ext)
}

/// Whether `name` can be written into the primary tree unchanged.
pub(crate) fn is_valid(name: &str, is_dir: bool) -> bool {
    !name.is_empty() && plain(name, is_dir) == name
}
