//! Write-time mirror of the volume tree.
//!
//! The mirror carries what only exists while an image is written: the
//! mangled names of both namespaces, the sorted record order, and where each
//! record and extent ended up.
use crate::mangle::{mangle_names, Candidate};
use crate::nodes::{Node, NodeKind};
use crate::reader::Extent;
use crate::wire::ucs2_encode;
use crate::Error;

/// Placement of one directory in one of the trees.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct DirLayout {
    pub extent: Extent,
    /// Offsets of the `.` and `..` records.
    pub dot: u64,
    pub dotdot: u64,
}

#[derive(Debug)]
pub(crate) struct WriteNode<'v> {
    pub node: &'v Node,
    /// 9660 name without version suffix.
    pub name_9660: String,
    pub name_joliet: Vec<u16>,
    pub children: Vec<WriteNode<'v>>,
    /// Indices into `children` in on-disc order.
    pub order_9660: Vec<usize>,
    pub order_joliet: Vec<usize>,
    pub layout_9660: DirLayout,
    pub layout_joliet: DirLayout,
    /// Offsets of this node's record inside its parent's extent.
    pub record_9660: u64,
    pub record_joliet: u64,
    /// Contents extent of a file.
    pub data: Extent,
}

impl<'v> WriteNode<'v> {
    /// Builds the mirror of the directory `node`, found at `path`.
    pub(crate) fn build(node: &'v Node, path: &str) -> Result<Self, Error> {
        let mut this = WriteNode::leaf(node, String::new(), vec![]);
        let Some(dir) = node.as_directory() else {
            return Ok(this);
        };

        let candidates: Vec<Candidate> = dir
            .iter()
            .map(|n| Candidate {
                name: n.name(),
                is_dir: n.is_directory(),
                original_9660: n.original_9660_name(),
            })
            .collect();
        let names = mangle_names(path, &candidates)?;

        for (child, name) in dir.iter().zip(names) {
            let built = if child.is_directory() {
                let child_path = if path == "/" {
                    format!("/{}", child.name())
                } else {
                    format!("{path}/{}", child.name())
                };
                let mut built = WriteNode::build(child, &child_path)?;
                built.name_9660 = name.iso9660;
                built.name_joliet = name.joliet;
                built
            } else {
                WriteNode::leaf(child, name.iso9660, name.joliet)
            };
            this.children.push(built);
        }

        this.order_9660 = sorted_order(&this.children, WriteNode::identifier_9660);
        this.order_joliet = sorted_order(&this.children, WriteNode::identifier_joliet);
        Ok(this)
    }

    fn leaf(node: &'v Node, name_9660: String, name_joliet: Vec<u16>) -> Self {
        WriteNode {
            node,
            name_9660,
            name_joliet,
            children: vec![],
            order_9660: vec![],
            order_joliet: vec![],
            layout_9660: DirLayout::default(),
            layout_joliet: DirLayout::default(),
            record_9660: 0,
            record_joliet: 0,
            data: Extent::default(),
        }
    }

    pub(crate) fn is_directory(&self) -> bool {
        self.node.is_directory()
    }

    /// The identifier recorded in the primary tree. Files carry a `;1`
    /// version.
    pub(crate) fn identifier_9660(&self) -> Vec<u8> {
        let mut id = self.name_9660.as_bytes().to_vec();
        if matches!(self.node.kind(), NodeKind::File(_) | NodeKind::Symlink { .. }) {
            id.extend_from_slice(b";1");
        }
        id
    }

    pub(crate) fn identifier_joliet(&self) -> Vec<u8> {
        ucs2_encode(&self.name_joliet)
    }

    /// Number of subdirectories.
    pub(crate) fn subdirectories(&self) -> usize {
        self.children.iter().filter(|c| c.is_directory()).count()
    }
}

fn sorted_order<'v>(children: &[WriteNode<'v>], key: impl Fn(&WriteNode<'v>) -> Vec<u8>) -> Vec<usize> {
    let keys: Vec<Vec<u8>> = children.iter().map(key).collect();
    let mut order: Vec<usize> = (0..children.len()).collect();
    order.sort_by(|&a, &b| keys[a].cmp(&keys[b]));
    order
}
