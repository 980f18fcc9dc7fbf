//! Raw persisted layout of [`RegTree`].
//!
//! ```text
//! param block (32 bytes)
//!   i32 num_roots, i32 num_nodes, i32 num_deleted, i32 max_depth,
//!   i32 num_feature, 12 reserved bytes
//! node array (num_nodes × 20 bytes)
//!   i32 parent   -1 = none, bit 31 set = left child
//!   i32 cleft    -1 = leaf
//!   i32 cright
//!   u32 sindex   low 31 bits feature, bit 31 = default_left
//!   f32 info     leaf value or split condition
//! stats array (num_nodes × 16 bytes)
//!   f32 loss_chg, f32 sum_hess, f32 base_weight, i32 leaf_child_cnt
//! free list (num_deleted × i32)
//! ```
//!
//! The packed parent and split-index encodings exist only here; in memory
//! nodes are [`NodeKind`] values with an optional [`ParentLink`].

use std::io::{Read, Write};

use super::model::{RegTree, TreeParam};
use super::node::{Node, NodeKind, NodeStat, ParentLink};
use super::NodeId;
use crate::io::{DeserializeError, ReadLe, SerializeError, WriteLe};

const LEFT_BIT: u32 = 1 << 31;
const RESERVED_PARAM_BYTES: usize = 12;

fn pack_parent(parent: Option<ParentLink>) -> i32 {
    match parent {
        None => -1,
        Some(p) if p.is_left => (p.id | LEFT_BIT) as i32,
        Some(p) => p.id as i32,
    }
}

fn unpack_parent(raw: i32) -> Option<ParentLink> {
    if raw == -1 {
        return None;
    }
    let bits = raw as u32;
    Some(ParentLink {
        id: bits & !LEFT_BIT,
        is_left: bits & LEFT_BIT != 0,
    })
}

fn corrupt(msg: impl Into<String>) -> DeserializeError {
    DeserializeError::Corrupt(msg.into())
}

fn read_count<R: Read + ?Sized>(reader: &mut R, field: &'static str) -> Result<u32, DeserializeError> {
    let v = reader.read_le_i32("tree param block")?;
    u32::try_from(v).map_err(|_| corrupt(format!("tree {field} is negative ({v})")))
}

impl RegTree {
    /// Write the tree in the raw layout.
    pub fn serialize<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), SerializeError> {
        let p = &self.param;
        for v in [p.num_roots, p.num_nodes, p.num_deleted, p.max_depth, p.num_feature] {
            writer.write_le_i32(v as i32)?;
        }
        writer.write_all(&[0u8; RESERVED_PARAM_BYTES])?;

        for node in &self.nodes {
            writer.write_le_i32(pack_parent(node.parent))?;
            match node.kind {
                NodeKind::Leaf { value } => {
                    writer.write_le_i32(-1)?;
                    writer.write_le_i32(-1)?;
                    writer.write_le_u32(0)?;
                    writer.write_le_f32(value)?;
                }
                NodeKind::Split {
                    feature,
                    cond,
                    default_left,
                    left,
                    right,
                } => {
                    writer.write_le_i32(left as i32)?;
                    writer.write_le_i32(right as i32)?;
                    writer.write_le_u32(if default_left { feature | LEFT_BIT } else { feature })?;
                    writer.write_le_f32(cond)?;
                }
            }
        }

        for s in &self.stats {
            writer.write_le_f32(s.loss_chg)?;
            writer.write_le_f32(s.sum_hess)?;
            writer.write_le_f32(s.base_weight)?;
            writer.write_le_i32(s.leaf_child_cnt)?;
        }

        for &nid in &self.deleted {
            writer.write_le_i32(nid as i32)?;
        }
        Ok(())
    }

    /// Read a tree written by [`serialize`](Self::serialize).
    ///
    /// Rejects streams whose recorded deleted count or free list disagree
    /// with the orphaned slots actually present, and node graphs that fail
    /// [`validate`](Self::validate).
    pub fn deserialize<R: Read + ?Sized>(reader: &mut R) -> Result<Self, DeserializeError> {
        let param = TreeParam {
            num_roots: read_count(reader, "num_roots")?,
            num_nodes: read_count(reader, "num_nodes")?,
            num_deleted: read_count(reader, "num_deleted")?,
            max_depth: read_count(reader, "max_depth")?,
            num_feature: read_count(reader, "num_feature")?,
        };
        reader.read_le_array::<RESERVED_PARAM_BYTES>("tree param block")?;

        if param.num_roots == 0 {
            return Err(corrupt("tree has no roots"));
        }
        if param.num_nodes < param.num_roots {
            return Err(corrupt(format!(
                "num_nodes {} is below num_roots {}",
                param.num_nodes, param.num_roots
            )));
        }

        let n_nodes = param.num_nodes as usize;
        let nodes = reader.read_le_vec(n_nodes, |r| {
            let parent = unpack_parent(r.read_le_i32("tree nodes")?);
            let cleft = r.read_le_i32("tree nodes")?;
            let cright = r.read_le_i32("tree nodes")?;
            let sindex = r.read_le_u32("tree nodes")?;
            let info = r.read_le_f32("tree nodes")?;
            let kind = if cleft == -1 {
                NodeKind::Leaf { value: info }
            } else {
                let in_range = |c: i32| c >= 0 && (c as usize) < n_nodes;
                if !in_range(cleft) || !in_range(cright) {
                    return Err(corrupt(format!(
                        "child ids ({cleft}, {cright}) outside {n_nodes} nodes"
                    )));
                }
                NodeKind::Split {
                    feature: sindex & !LEFT_BIT,
                    cond: info,
                    default_left: sindex & LEFT_BIT != 0,
                    left: cleft as NodeId,
                    right: cright as NodeId,
                }
            };
            Ok(Node { parent, kind })
        })?;

        let stats = reader.read_le_vec(n_nodes, |r| {
            Ok(NodeStat {
                loss_chg: r.read_le_f32("tree stats")?,
                sum_hess: r.read_le_f32("tree stats")?,
                base_weight: r.read_le_f32("tree stats")?,
                leaf_child_cnt: r.read_le_i32("tree stats")?,
            })
        })?;

        let deleted = reader.read_le_vec(param.num_deleted as usize, |r| {
            let v = r.read_le_i32("tree free list")?;
            u32::try_from(v).map_err(|_| corrupt(format!("free list entry {v} is negative")))
        })?;

        let mut orphans: Vec<NodeId> = (param.num_roots..param.num_nodes)
            .filter(|&nid| nodes[nid as usize].parent.is_none())
            .collect();
        if orphans.len() != param.num_deleted as usize {
            return Err(corrupt(format!(
                "num_deleted is {} but {} orphaned nodes exist",
                param.num_deleted,
                orphans.len()
            )));
        }
        let mut listed = deleted.clone();
        listed.sort_unstable();
        orphans.sort_unstable();
        if listed != orphans {
            return Err(corrupt("free list does not match orphaned nodes"));
        }

        let tree = Self {
            param,
            nodes,
            stats,
            deleted,
        };
        tree.validate().map_err(|e| corrupt(e.to_string()))?;
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(tree: &RegTree) -> RegTree {
        let mut buf = Vec::new();
        tree.serialize(&mut buf).unwrap();
        RegTree::deserialize(&mut buf.as_slice()).unwrap()
    }

    #[test]
    fn single_leaf_layout() {
        let tree = RegTree::new();
        let mut buf = Vec::new();
        tree.serialize(&mut buf).unwrap();
        assert_eq!(buf.len(), 32 + 20 + 16);
        assert_eq!(&buf[0..4], &1i32.to_le_bytes());
        assert_eq!(&buf[32..36], &(-1i32).to_le_bytes());
        assert_eq!(roundtrip(&tree), tree);
    }

    #[test]
    fn packed_bits() {
        assert_eq!(pack_parent(None), -1);
        let left = ParentLink { id: 5, is_left: true };
        let right = ParentLink { id: 5, is_left: false };
        assert_eq!(unpack_parent(pack_parent(Some(left))), Some(left));
        assert_eq!(unpack_parent(pack_parent(Some(right))), Some(right));
        assert_eq!(pack_parent(Some(right)), 5);
    }

    #[test]
    fn roundtrip_with_free_list_and_stats() {
        let mut tree = RegTree::new();
        let (l, r) = tree.split(0, 3, 0.25, true);
        tree.split(r, 7, -1.0, false);
        tree.set_leaf_value(l, 0.5);
        tree.stat_mut(0).loss_chg = 2.0;
        tree.stat_mut(0).leaf_child_cnt = 1;
        tree.prune(r);

        let loaded = roundtrip(&tree);
        assert_eq!(loaded, tree);
        assert_eq!(loaded.param().num_deleted, 2);
        assert!(loaded.default_left(0));
        assert_eq!(loaded.split_index(0), 3);
    }

    #[test]
    fn rejects_wrong_deleted_count() {
        let mut tree = RegTree::new();
        tree.split(0, 0, 0.0, false);
        tree.prune(0);
        let mut buf = Vec::new();
        tree.serialize(&mut buf).unwrap();
        // num_deleted lives at offset 8; drop one free-list entry to match.
        buf[8..12].copy_from_slice(&1i32.to_le_bytes());
        buf.truncate(buf.len() - 4);
        let err = RegTree::deserialize(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, DeserializeError::Corrupt(_)), "got: {err:?}");
    }

    #[test]
    fn rejects_truncated_stream() {
        let mut tree = RegTree::new();
        tree.split(0, 0, 0.0, false);
        let mut buf = Vec::new();
        tree.serialize(&mut buf).unwrap();
        buf.truncate(buf.len() - 3);
        let err = RegTree::deserialize(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, DeserializeError::Truncated { .. }), "got: {err:?}");
    }
}
