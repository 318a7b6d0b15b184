//! The persisted record-and-link layout of a tree.
//!
//! A tree is stored as node records connected by typed links:
//! - one ROOT link from the owning container to the root node
//! - one METADATA link from the container to the metadata record
//! - CHILD links from a branch to each of its children
//! - REFERENCE links from a leaf to each indexed object
//!
//! Node kind is implicit: a node with CHILD links is a branch, a node with
//! REFERENCE links is a leaf and a node with neither is the empty root.
//! Entry envelopes are not stored; they are decoded again when a layout is
//! loaded.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::node_store::{NodeReader, TreeState};
use super::rtree_types::{
    Entry, IndexNode, NodeBody, NodeId, ObjectId, RecordId, SpatialError, SpatialResult,
    TreeMetadata,
};
use crate::decoder::EnvelopeDecoder;
use crate::envelope::Envelope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkKind {
    Root,
    Child,
    Reference,
    Metadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub kind: LinkKind,
    pub from: RecordId,
    pub to: RecordId,
}

impl Link {
    pub fn new(kind: LinkKind, from: RecordId, to: RecordId) -> Self {
        Self { kind, from, to }
    }
}

/// A node record; `bbox` is `[min_x, min_y, max_x, max_y]`, absent for the
/// empty root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub bbox: Option<[f64; 4]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub id: RecordId,
    pub max_node_references: usize,
    pub min_node_references: usize,
    pub total_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeLayout {
    pub container: RecordId,
    pub metadata: MetadataRecord,
    pub nodes: Vec<NodeRecord>,
    pub links: Vec<Link>,
}

impl TreeLayout {
    /// Emits the layout of a committed tree.
    ///
    /// The order is fixed: ROOT link, METADATA link, then the nodes
    /// breadth-first from the root, each followed by its own links in
    /// stored order.
    pub fn from_state(state: &TreeState) -> SpatialResult<TreeLayout> {
        let metadata = state.metadata();
        let mut nodes = Vec::with_capacity(state.node_count());
        let mut links = vec![
            Link::new(LinkKind::Root, state.container, state.root()),
            Link::new(LinkKind::Metadata, state.container, state.metadata_record),
        ];

        for id in state.breadth_first()? {
            let node = state.node(id)?;
            nodes.push(NodeRecord {
                id,
                bbox: node.envelope.to_array(),
            });
            match &node.body {
                NodeBody::Branch(children) => links.extend(
                    children
                        .iter()
                        .map(|child| Link::new(LinkKind::Child, id, *child)),
                ),
                NodeBody::Leaf(entries) => links.extend(
                    entries
                        .iter()
                        .map(|entry| Link::new(LinkKind::Reference, id, entry.object)),
                ),
            }
        }

        Ok(TreeLayout {
            container: state.container,
            metadata: MetadataRecord {
                id: state.metadata_record,
                max_node_references: metadata.max_node_references,
                min_node_references: metadata.min_node_references,
                total_count: metadata.total_count,
            },
            nodes,
            links,
        })
    }

    /// Rebuilds a tree from its layout, decoding every referenced object.
    ///
    /// Structural problems are reported as
    /// [`SpatialError::InvariantViolation`] and an object without a valid
    /// envelope as [`SpatialError::UndecodableObject`]. Nothing is repaired.
    pub fn into_state(&self, decoder: &dyn EnvelopeDecoder) -> SpatialResult<TreeState> {
        let records = self.node_records()?;
        let root = self.root_link()?;
        self.metadata_link()?;

        let mut children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let mut objects: HashMap<NodeId, Vec<ObjectId>> = HashMap::new();
        let mut parents: HashMap<NodeId, NodeId> = HashMap::new();
        let mut referenced: HashSet<ObjectId> = HashSet::new();

        for link in &self.links {
            match link.kind {
                LinkKind::Root | LinkKind::Metadata => {}
                LinkKind::Child => {
                    require_node(&records, link.from)?;
                    require_node(&records, link.to)?;
                    if parents.insert(link.to, link.from).is_some() {
                        return Err(corrupt(format!("node {} has more than one parent", link.to)));
                    }
                    children.entry(link.from).or_default().push(link.to);
                }
                LinkKind::Reference => {
                    require_node(&records, link.from)?;
                    if !referenced.insert(link.to) {
                        return Err(corrupt(format!(
                            "object {} is referenced by more than one leaf",
                            link.to
                        )));
                    }
                    objects.entry(link.from).or_default().push(link.to);
                }
            }
        }

        require_node(&records, root)?;
        if parents.contains_key(&root) {
            return Err(corrupt(format!("root node {} has a parent", root)));
        }

        let mut nodes = HashMap::with_capacity(records.len());
        let mut references = HashMap::with_capacity(referenced.len());
        for (id, record) in &records {
            let envelope = match record.bbox {
                Some(bbox) => Envelope::from_array(bbox)
                    .ok_or_else(|| corrupt(format!("node {} stores an invalid envelope", id)))?,
                None => Envelope::empty(),
            };
            let body = match (children.remove(id), objects.remove(id)) {
                (Some(_), Some(_)) => {
                    return Err(corrupt(format!(
                        "node {} has both child and reference links",
                        id
                    )))
                }
                (Some(ids), None) => NodeBody::Branch(ids),
                (None, Some(ids)) => {
                    let mut entries = Vec::with_capacity(ids.len());
                    for object in ids {
                        let decoded = decoder
                            .decode_envelope(object)
                            .ok_or(SpatialError::UndecodableObject(object))?;
                        entries.push(Entry::new(object, decoded));
                        references.insert(object, *id);
                    }
                    NodeBody::Leaf(entries)
                }
                (None, None) => NodeBody::Leaf(Vec::new()),
            };
            nodes.insert(
                *id,
                IndexNode {
                    envelope,
                    parent: parents.get(id).copied(),
                    body,
                },
            );
        }

        let max_id = records
            .keys()
            .copied()
            .chain([self.container, self.metadata.id])
            .max()
            .unwrap_or(self.container);
        let state = TreeState {
            nodes,
            references,
            root,
            next_id: max_id + 1,
            metadata: TreeMetadata {
                max_node_references: self.metadata.max_node_references,
                min_node_references: self.metadata.min_node_references,
                total_count: self.metadata.total_count,
            },
            container: self.container,
            metadata_record: self.metadata.id,
        };

        let reachable = state.breadth_first()?;
        if reachable.len() != state.node_count() {
            return Err(corrupt(format!(
                "{} of {} nodes are unreachable from the root",
                state.node_count() - reachable.len(),
                state.node_count()
            )));
        }
        for id in reachable {
            let stored = state.envelope(id)?;
            let exact = state.children_envelope(id)?;
            if stored != exact {
                return Err(corrupt(format!(
                    "node {} stores {} but its children cover {}",
                    id, stored, exact
                )));
            }
        }

        Ok(state)
    }

    fn node_records(&self) -> SpatialResult<HashMap<NodeId, &NodeRecord>> {
        let mut records = HashMap::with_capacity(self.nodes.len());
        for record in &self.nodes {
            if records.insert(record.id, record).is_some() {
                return Err(corrupt(format!("node record {} appears twice", record.id)));
            }
        }
        Ok(records)
    }

    fn root_link(&self) -> SpatialResult<NodeId> {
        let roots: Vec<&Link> = self
            .links
            .iter()
            .filter(|link| link.kind == LinkKind::Root)
            .collect();
        match roots.as_slice() {
            [link] if link.from == self.container => Ok(link.to),
            [link] => Err(corrupt(format!(
                "root link starts at record {} instead of container {}",
                link.from, self.container
            ))),
            _ => Err(corrupt(format!("expected one root link, found {}", roots.len()))),
        }
    }

    fn metadata_link(&self) -> SpatialResult<()> {
        let found = self.links.iter().any(|link| {
            link.kind == LinkKind::Metadata
                && link.from == self.container
                && link.to == self.metadata.id
        });
        if found {
            Ok(())
        } else {
            Err(corrupt(format!(
                "no metadata link from container {} to record {}",
                self.container, self.metadata.id
            )))
        }
    }
}

fn corrupt(message: String) -> SpatialError {
    SpatialError::InvariantViolation(message)
}

fn require_node(records: &HashMap<NodeId, &NodeRecord>, id: NodeId) -> SpatialResult<()> {
    if records.contains_key(&id) {
        Ok(())
    } else {
        Err(corrupt(format!("link points to missing node {}", id)))
    }
}
