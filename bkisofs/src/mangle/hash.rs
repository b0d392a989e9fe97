const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// 31-bit FNV-1a hash of `name` salted with the mangling pass.
pub(crate) fn fnv31(name: &str, pass: u32) -> u32 {
    let h = name
        .bytes()
        .chain(pass.to_le_bytes())
        .fold(FNV_OFFSET, |h, b| (h ^ u32::from(b)).wrapping_mul(FNV_PRIME));
    (h >> 31) ^ (h & 0x7fff_ffff)
}

/// Renders the low digits of `h` in upper-case base 36, zero-padded to
/// `width`.
pub(crate) fn base36(mut h: u32, width: usize) -> String {
    let mut out = vec![b'0'; width];
    for slot in out.iter_mut().rev() {
        *slot = BASE36[(h % 36) as usize];
        h /= 36;
    }
    out.into_iter().map(char::from).collect()
}

/// Width of the hash suffix for a pass: longer suffixes once short ones
/// kept colliding.
pub(crate) fn suffix_width(pass: u32) -> usize {
    match pass {
        0..=9 => 4,
        10..=99 => 5,
        _ => 6,
    }
}

/// The `~XXXX` suffix for `name` in `pass`.
pub(crate) fn suffix(name: &str, pass: u32) -> String {
    format!("~{}", base36(fnv31(name, pass), suffix_width(pass)))
}
