use std::collections::HashMap;

use super::Node;
use crate::Error;

/// Children of a directory node.
///
/// Entries keep their insertion order, and names are unique. Lookups by name
/// go through an index into the entry list.
#[derive(Debug, Default, Clone)]
pub struct Directory {
    entries: Vec<Node>,
    index: HashMap<String, usize>,
}

impl PartialEq for Directory {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for Directory {}

impl Directory {
    pub fn new() -> Self {
        Directory::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Children in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.entries.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.index.get(name).map(|&i| &mut self.entries[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Appends a child, refusing names already present.
    pub(crate) fn insert(&mut self, node: Node) -> Result<(), Error> {
        if self.index.contains_key(&node.name) {
            return Err(Error::DuplicateName(node.name));
        }
        self.index.insert(node.name.clone(), self.entries.len());
        self.entries.push(node);
        Ok(())
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<Node> {
        let i = self.index.remove(name)?;
        let node = self.entries.remove(i);
        for idx in self.index.values_mut() {
            if *idx > i {
                *idx -= 1;
            }
        }
        Some(node)
    }

    /// Renames a child in place, keeping its position.
    pub(crate) fn rename(&mut self, from: &str, to: &str) -> Result<(), Error> {
        let i = *self
            .index
            .get(from)
            .ok_or_else(|| Error::ItemNotFound(from.to_string()))?;
        if from == to {
            return Ok(());
        }
        if self.index.contains_key(to) {
            return Err(Error::DuplicateName(to.to_string()));
        }
        self.index.remove(from);
        self.entries[i].name = to.to_string();
        self.entries[i].original_9660_name = None;
        self.index.insert(to.to_string(), i);
        Ok(())
    }
}
