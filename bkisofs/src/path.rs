//! Absolute paths inside a volume.
use std::fmt::{self, Display};
use std::str::FromStr;

use crate::Error;

/// An absolute, `/`-separated path into the volume tree.
///
/// The root is `/`. A single trailing slash is accepted, empty components
/// (`a//b`), `.` and `..` are not.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ImagePath {
    components: Vec<String>,
}

impl ImagePath {
    pub const fn root() -> Self {
        ImagePath { components: vec![] }
    }

    pub fn parse(s: &str) -> Result<Self, Error> {
        let rest = s
            .strip_prefix('/')
            .ok_or_else(|| Error::MalformedPath(s.to_string()))?;
        if rest.is_empty() {
            return Ok(Self::root());
        }
        let rest = rest.strip_suffix('/').unwrap_or(rest);

        let mut components = vec![];
        for component in rest.split('/') {
            if component.is_empty() || component == "." || component == ".." {
                return Err(Error::MalformedPath(s.to_string()));
            }
            components.push(component.to_string());
        }
        Ok(ImagePath { components })
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(String::as_str)
    }

    /// The parent and the final component, or `None` for the root.
    pub fn split_last(&self) -> Option<(ImagePath, &str)> {
        let (last, parent) = self.components.split_last()?;
        Some((
            ImagePath {
                components: parent.to_vec(),
            },
            last.as_str(),
        ))
    }

    pub fn file_name(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    /// Appends a single name. The name is not validated here.
    pub fn join(&self, name: &str) -> ImagePath {
        let mut components = self.components.clone();
        components.push(name.to_string());
        ImagePath { components }
    }
}

impl FromStr for ImagePath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImagePath::parse(s)
    }
}

impl Display for ImagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return f.write_str("/");
        }
        for c in &self.components {
            write!(f, "/{c}")?;
        }
        Ok(())
    }
}
