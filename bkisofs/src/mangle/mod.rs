//! Derives the per-namespace names of a directory's children.
//!
//! Every child keeps its original name for Rock Ridge. For the primary tree
//! it gets an upper-case 8.3 name, for Joliet a name of at most 64 UCS-2
//! units. Both are derived independently and de-collided among siblings:
//! each pass finds groups of siblings sharing a name and gives every member
//! but the first a new name with a hash suffix salted by the pass number.
use std::collections::HashMap;
use std::hash::Hash;

use tracing::debug;

use crate::Error;

mod hash;
pub(crate) mod iso9660;
pub(crate) mod joliet;

/// Upper bound on collision passes per directory.
pub(crate) const MAX_PASSES: u32 = 50_000;

/// A child to be named.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate<'a> {
    pub name: &'a str,
    pub is_dir: bool,
    /// Short name from a source image, reused if still valid and unique.
    pub original_9660: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MangledName {
    /// Without the `;1` version suffix.
    pub iso9660: String,
    pub joliet: Vec<u16>,
}

/// Indices of every group member after the first, for groups of more than
/// one equal name.
fn colliding<T: Eq + Hash>(names: &[T]) -> Vec<usize> {
    let mut seen: HashMap<&T, usize> = HashMap::with_capacity(names.len());
    let mut out = vec![];
    for (i, name) in names.iter().enumerate() {
        if seen.insert(name, i).is_some() {
            out.push(i);
        }
    }
    out
}

/// Resolves collisions in one namespace, regenerating names with `regen`
/// until all are distinct.
fn decollide<T: Eq + Hash>(
    names: &mut [T],
    mut regen: impl FnMut(usize, u32) -> T,
    namespace: &str,
    dir: &str,
) -> Result<(), Error> {
    for pass in 1..=MAX_PASSES {
        let dups = colliding(names);
        if dups.is_empty() {
            return Ok(());
        }
        debug!(dir, namespace, pass, collisions = dups.len(), "mangling");
        for i in dups {
            names[i] = regen(i, pass);
        }
    }
    if colliding(names).is_empty() {
        Ok(())
    } else {
        Err(Error::MangleTooManyCollisions(dir.to_string()))
    }
}

/// Names the children of the directory at `dir`, in input order.
pub(crate) fn mangle_names(dir: &str, candidates: &[Candidate]) -> Result<Vec<MangledName>, Error> {
    let mut short: Vec<String> = candidates
        .iter()
        .map(|c| match c.original_9660 {
            Some(orig) if iso9660::is_valid(orig, c.is_dir) => orig.to_string(),
            _ => iso9660::plain(c.name, c.is_dir),
        })
        .collect();
    decollide(
        &mut short,
        |i, pass| iso9660::hashed(candidates[i].name, candidates[i].is_dir, pass),
        "iso9660",
        dir,
    )?;

    let mut long: Vec<Vec<u16>> = candidates
        .iter()
        .map(|c| joliet::plain(c.name, c.is_dir))
        .collect();
    decollide(
        &mut long,
        |i, pass| joliet::hashed(candidates[i].name, candidates[i].is_dir, pass),
        "joliet",
        dir,
    )?;

    Ok(short
        .into_iter()
        .zip(long)
        .map(|(iso9660, joliet)| MangledName { iso9660, joliet })
        .collect())
}
