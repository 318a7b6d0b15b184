//! Arena storage of the committed tree.
//!
//! Nodes live in a map keyed by [`NodeId`] and point to their parent by id.
//! The inbound reference map records, for every indexed object, the leaf
//! holding its entry. [`NodeReader`] is the read surface shared by the
//! committed [`TreeState`] and a staged write transaction, so the insertion,
//! deletion and traversal engines run unchanged against either.

use std::collections::{HashMap, VecDeque};

use super::rtree_config::RTreeConfig;
use super::rtree_types::{
    IndexNode, NodeBody, NodeId, ObjectId, RecordId, SpatialError, SpatialResult, TreeMetadata,
};
use crate::envelope::Envelope;

pub(crate) fn dangling(id: NodeId) -> SpatialError {
    SpatialError::InvariantViolation(format!("node {} does not exist in this tree", id))
}

/// Read access to a tree, committed or staged.
pub trait NodeReader {
    /// Looks up a node; a missing id means the tree is corrupt.
    fn node(&self, id: NodeId) -> SpatialResult<&IndexNode>;

    fn root(&self) -> NodeId;

    /// The leaf currently referencing `object`, if any.
    fn leaf_of(&self, object: ObjectId) -> Option<NodeId>;

    fn metadata(&self) -> TreeMetadata;

    fn parent(&self, id: NodeId) -> SpatialResult<Option<NodeId>> {
        Ok(self.node(id)?.parent)
    }

    fn is_leaf(&self, id: NodeId) -> SpatialResult<bool> {
        Ok(self.node(id)?.is_leaf())
    }

    fn envelope(&self, id: NodeId) -> SpatialResult<Envelope> {
        Ok(self.node(id)?.envelope)
    }

    /// Exact union of the envelopes directly below `id`.
    fn children_envelope(&self, id: NodeId) -> SpatialResult<Envelope> {
        let node = self.node(id)?;
        match &node.body {
            NodeBody::Leaf(entries) => Ok(Envelope::union_all(entries.iter().map(|e| &e.envelope))),
            NodeBody::Branch(children) => {
                let mut envelope = Envelope::empty();
                for child in children {
                    envelope = envelope.union(&self.node(*child)?.envelope);
                }
                Ok(envelope)
            }
        }
    }

    /// Number of levels from the root to the leaves, following first children.
    fn height(&self) -> SpatialResult<u32> {
        let mut height = 1;
        let mut current = self.node(self.root())?;
        while let Some(first) = current.children().first() {
            current = self.node(*first)?;
            height += 1;
        }
        Ok(height)
    }

    /// Walks the parent links from `id` and returns the topmost node.
    ///
    /// The walk is bounded so that a parent cycle is reported instead of
    /// looping forever.
    fn top_of(&self, id: NodeId, limit: usize) -> SpatialResult<NodeId> {
        let mut current = id;
        for _ in 0..=limit {
            match self.parent(current)? {
                Some(parent) => current = parent,
                None => return Ok(current),
            }
        }
        Err(SpatialError::InvariantViolation(format!(
            "parent links starting at node {} form a cycle",
            id
        )))
    }

    /// Node ids in breadth-first order from the root.
    fn breadth_first(&self) -> SpatialResult<Vec<NodeId>> {
        let mut order = Vec::new();
        let mut queue = VecDeque::from([self.root()]);
        while let Some(id) = queue.pop_front() {
            order.push(id);
            queue.extend(self.node(id)?.children().iter().copied());
        }
        Ok(order)
    }
}

/// The committed state of one tree.
#[derive(Debug, Clone)]
pub struct TreeState {
    pub(crate) nodes: HashMap<NodeId, IndexNode>,
    pub(crate) references: HashMap<ObjectId, NodeId>,
    pub(crate) root: NodeId,
    pub(crate) next_id: RecordId,
    pub(crate) metadata: TreeMetadata,
    /// Owning container record the ROOT and METADATA links start from
    pub(crate) container: RecordId,
    pub(crate) metadata_record: RecordId,
}

impl TreeState {
    /// A tree holding only an empty root leaf.
    ///
    /// Record ids are allocated after the container id so that the metadata
    /// record and the nodes never collide with it.
    pub fn new(config: &RTreeConfig, container: RecordId) -> Self {
        let metadata_record = container + 1;
        let root = container + 2;
        let mut nodes = HashMap::new();
        nodes.insert(root, IndexNode::empty_leaf());

        Self {
            nodes,
            references: HashMap::new(),
            root,
            next_id: root + 1,
            metadata: TreeMetadata {
                max_node_references: config.max_node_references(),
                min_node_references: config.min_node_references(),
                total_count: 0,
            },
            container,
            metadata_record,
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn container(&self) -> RecordId {
        self.container
    }

    /// True when the root holds neither children nor entries.
    pub fn is_empty(&self) -> SpatialResult<bool> {
        Ok(self.node(self.root)?.is_empty())
    }

    pub(crate) fn apply(&mut self, changes: StagedChanges) {
        for (id, node) in changes.nodes {
            match node {
                Some(node) => {
                    self.nodes.insert(id, node);
                }
                None => {
                    self.nodes.remove(&id);
                }
            }
        }
        for (object, leaf) in changes.references {
            match leaf {
                Some(leaf) => {
                    self.references.insert(object, leaf);
                }
                None => {
                    self.references.remove(&object);
                }
            }
        }
        self.root = changes.root;
        self.next_id = changes.next_id;
        self.metadata = changes.metadata;
    }
}

impl NodeReader for TreeState {
    fn node(&self, id: NodeId) -> SpatialResult<&IndexNode> {
        self.nodes.get(&id).ok_or_else(|| dangling(id))
    }

    fn root(&self) -> NodeId {
        self.root
    }

    fn leaf_of(&self, object: ObjectId) -> Option<NodeId> {
        self.references.get(&object).copied()
    }

    fn metadata(&self) -> TreeMetadata {
        self.metadata
    }
}

/// Everything a write transaction changed, ready to be applied in one step.
///
/// `None` values are tombstones.
#[derive(Debug, Default)]
pub(crate) struct StagedChanges {
    pub(crate) nodes: HashMap<NodeId, Option<IndexNode>>,
    pub(crate) references: HashMap<ObjectId, Option<NodeId>>,
    pub(crate) root: NodeId,
    pub(crate) next_id: RecordId,
    pub(crate) metadata: TreeMetadata,
}

impl StagedChanges {
    pub(crate) fn is_noop(&self) -> bool {
        self.nodes.is_empty() && self.references.is_empty()
    }
}
