//! Staged write transaction over a committed [`TreeState`].
//!
//! A [`WriteTransaction`] never touches the committed state. The first write
//! to a node copies it into the overlay; removals are recorded as
//! tombstones. [`WriteTransaction::into_changes`] hands the overlay over to be
//! applied in one step, and dropping the transaction instead discards every
//! staged change.
//!
//! The primitive mutators here only record results. Choosing where to insert
//! and how to split belongs to the insertion and deletion engines.

use std::collections::HashMap;

use super::node_store::{dangling, NodeReader, StagedChanges, TreeState};
use super::rtree_types::{
    Entry, IndexNode, NodeBody, NodeId, ObjectId, RecordId, SpatialError, SpatialResult,
    TreeMetadata,
};
use crate::envelope::Envelope;

pub struct WriteTransaction<'a> {
    base: &'a TreeState,
    nodes: HashMap<NodeId, Option<IndexNode>>,
    references: HashMap<ObjectId, Option<NodeId>>,
    root: NodeId,
    next_id: RecordId,
    metadata: TreeMetadata,
}

impl<'a> WriteTransaction<'a> {
    pub fn begin(base: &'a TreeState) -> Self {
        Self {
            base,
            nodes: HashMap::new(),
            references: HashMap::new(),
            root: base.root,
            next_id: base.next_id,
            metadata: base.metadata,
        }
    }

    pub(crate) fn into_changes(self) -> StagedChanges {
        StagedChanges {
            nodes: self.nodes,
            references: self.references,
            root: self.root,
            next_id: self.next_id,
            metadata: self.metadata,
        }
    }

    /// Number of live nodes as seen through the overlay.
    pub fn node_count(&self) -> usize {
        let base = self.base.nodes.len();
        let mut count = base;
        for (id, node) in &self.nodes {
            let in_base = self.base.nodes.contains_key(id);
            match (node.is_some(), in_base) {
                (true, false) => count += 1,
                (false, true) => count -= 1,
                _ => {}
            }
        }
        count
    }

    pub fn metadata_mut(&mut self) -> &mut TreeMetadata {
        &mut self.metadata
    }

    pub fn node_mut(&mut self, id: NodeId) -> SpatialResult<&mut IndexNode> {
        if !self.nodes.contains_key(&id) {
            let node = self.base.nodes.get(&id).cloned().ok_or_else(|| dangling(id))?;
            self.nodes.insert(id, Some(node));
        }
        match self.nodes.get_mut(&id) {
            Some(Some(node)) => Ok(node),
            _ => Err(dangling(id)),
        }
    }

    pub fn set_root(&mut self, id: NodeId) -> SpatialResult<()> {
        self.node_mut(id)?.parent = None;
        self.root = id;
        Ok(())
    }

    /// Stores a new, unlinked node and returns its id.
    pub fn create_node(&mut self, body: NodeBody) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(
            id,
            Some(IndexNode {
                envelope: Envelope::empty(),
                parent: None,
                body,
            }),
        );
        id
    }

    /// Removes a node record and returns what it held.
    ///
    /// The caller is responsible for unlinking it from its parent first and
    /// for the references of any entries it held.
    pub fn destroy_node(&mut self, id: NodeId) -> SpatialResult<IndexNode> {
        let node = self.node(id)?.clone();
        self.nodes.insert(id, None);
        Ok(node)
    }

    /// Links `child` under the branch `parent` and widens the parent's
    /// envelope to cover the child's. Returns whether the parent widened.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> SpatialResult<bool> {
        let child_envelope = self.node(child)?.envelope;
        self.node_mut(child)?.parent = Some(parent);

        let node = self.node_mut(parent)?;
        if matches!(&node.body, NodeBody::Leaf(entries) if entries.is_empty()) {
            node.body = NodeBody::Branch(Vec::new());
        }
        match &mut node.body {
            NodeBody::Branch(children) => children.push(child),
            NodeBody::Leaf(_) => {
                return Err(SpatialError::InvariantViolation(format!(
                    "cannot link node {} under leaf {}",
                    child, parent
                )))
            }
        }
        Ok(node.envelope.expand_to_include(&child_envelope))
    }

    /// Appends `entry` to the leaf and records the inbound reference.
    /// Returns whether the leaf widened.
    pub fn add_entry(&mut self, leaf: NodeId, entry: Entry) -> SpatialResult<bool> {
        let node = self.node_mut(leaf)?;
        match &mut node.body {
            NodeBody::Leaf(entries) => entries.push(entry),
            NodeBody::Branch(_) => {
                return Err(SpatialError::InvariantViolation(format!(
                    "cannot add entry {} to branch {}",
                    entry.object, leaf
                )))
            }
        }
        let widened = node.envelope.expand_to_include(&entry.envelope);
        self.references.insert(entry.object, Some(leaf));
        Ok(widened)
    }

    /// Unlinks `child` from `parent`. The parent's envelope is left as is.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> SpatialResult<()> {
        let node = self.node_mut(parent)?;
        let removed = match &mut node.body {
            NodeBody::Branch(children) => match children.iter().position(|c| *c == child) {
                Some(index) => {
                    children.remove(index);
                    true
                }
                None => false,
            },
            NodeBody::Leaf(_) => false,
        };
        if !removed {
            return Err(SpatialError::InvariantViolation(format!(
                "node {} is not a child of node {}",
                child, parent
            )));
        }
        self.node_mut(child)?.parent = None;
        Ok(())
    }

    /// Removes the entry of `object` from the leaf and drops its inbound
    /// reference. The leaf's envelope is left as is.
    pub fn remove_entry(&mut self, leaf: NodeId, object: ObjectId) -> SpatialResult<Entry> {
        let node = self.node_mut(leaf)?;
        let removed = match &mut node.body {
            NodeBody::Leaf(entries) => entries
                .iter()
                .position(|e| e.object == object)
                .map(|index| entries.remove(index)),
            NodeBody::Branch(_) => None,
        };
        let entry = removed.ok_or(SpatialError::NotIndexedInThisTree(object))?;
        self.references.insert(object, None);
        Ok(entry)
    }

    /// Drops the inbound reference of an entry whose leaf is being destroyed.
    pub fn forget_reference(&mut self, object: ObjectId) {
        self.references.insert(object, None);
    }

    pub fn set_bounding_box(&mut self, id: NodeId, envelope: Envelope) -> SpatialResult<()> {
        self.node_mut(id)?.envelope = envelope;
        Ok(())
    }

    /// Widens the stored envelope to cover `envelope`; returns whether it moved.
    pub fn expand_bounding_box(&mut self, id: NodeId, envelope: &Envelope) -> SpatialResult<bool> {
        Ok(self.node_mut(id)?.envelope.expand_to_include(envelope))
    }

    /// Resets the stored envelope to the exact union of the node's children or
    /// entries; returns whether it changed.
    pub fn recompute_bounding_box(&mut self, id: NodeId) -> SpatialResult<bool> {
        let exact = self.children_envelope(id)?;
        let node = self.node_mut(id)?;
        if node.envelope == exact {
            Ok(false)
        } else {
            node.envelope = exact;
            Ok(true)
        }
    }

    /// Turns a branch that lost its last child back into an empty leaf.
    pub fn reset_to_empty_leaf(&mut self, id: NodeId) -> SpatialResult<()> {
        let node = self.node_mut(id)?;
        if !node.is_empty() {
            return Err(SpatialError::InvariantViolation(format!(
                "node {} still holds {} references",
                id,
                node.len()
            )));
        }
        node.body = NodeBody::Leaf(Vec::new());
        node.envelope = Envelope::empty();
        Ok(())
    }
}

impl NodeReader for WriteTransaction<'_> {
    fn node(&self, id: NodeId) -> SpatialResult<&IndexNode> {
        match self.nodes.get(&id) {
            Some(Some(node)) => Ok(node),
            Some(None) => Err(dangling(id)),
            None => self.base.node(id),
        }
    }

    fn root(&self) -> NodeId {
        self.root
    }

    fn leaf_of(&self, object: ObjectId) -> Option<NodeId> {
        match self.references.get(&object) {
            Some(staged) => *staged,
            None => self.base.leaf_of(object),
        }
    }

    fn metadata(&self) -> TreeMetadata {
        self.metadata
    }
}
