//! Lazy zero-copy structure index (`EvioNode`).
//!
//! A node is a weak positional view into an uncompressed buffer: byte
//! offsets, lengths, and type codes only — never a copy of the data. Nodes
//! live in an arena owned by the reader that scanned them; handles are
//! small integer ids, and parent/child/event links are ids too, so the
//! parent-child graph carries no reference cycles.
//!
//! A structural mutation (`add_structure` / `remove_structure`) marks every
//! outstanding node obsolete before rescanning; the arena keeps the old
//! entries so stale handles stay observably obsolete instead of silently
//! aliasing fresh nodes.

use evio_core::{ByteOrder, DataType, StructureHeader, StructureKind};

use crate::error::{Error, Result};

pub type NodeId = usize;

/// Positional index of one structure inside a buffer.
#[derive(Debug, Clone)]
pub struct EvioNode {
    /// Length word of the structure (words following the first header word).
    pub len: u32,
    pub tag: u16,
    pub num: u8,
    pub pad: u8,
    /// Absolute byte position of the structure start.
    pub pos: usize,
    /// The structure's own kind (bank / segment / tagsegment).
    pub kind: DataType,
    /// Payload length in words.
    pub data_len: u32,
    /// Absolute byte position of the payload.
    pub data_pos: usize,
    /// Type of the payload.
    pub data_type: DataType,
    /// Byte position of the record this structure belongs to.
    pub record_pos: usize,
    /// Event ordinal within the buffer (meaningful on event roots).
    pub place: usize,
    pub(crate) is_event: bool,
    pub(crate) obsolete: bool,
    pub(crate) parent: Option<NodeId>,
    pub(crate) event_node: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    /// Every descendant in scan order, kept on the event root only.
    pub(crate) all_nodes: Vec<NodeId>,
}

impl EvioNode {
    pub fn is_event(&self) -> bool {
        self.is_event
    }

    pub fn is_obsolete(&self) -> bool {
        self.obsolete
    }

    /// Total structure size in bytes, header included.
    pub fn total_bytes(&self) -> usize {
        (self.len as usize + 1) * 4
    }

    pub fn data_bytes(&self) -> usize {
        self.data_len as usize * 4
    }

    pub fn child_ids(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent_id(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn event_id(&self) -> Option<NodeId> {
        self.event_node
    }
}

/// Arena of nodes produced by buffer scans.
#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: Vec<EvioNode>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Fetch a node, failing with `ObsoleteNode` for handles invalidated by
    /// a mutation.
    pub fn get(&self, id: NodeId) -> Result<&EvioNode> {
        let node = self.nodes.get(id).ok_or(Error::ObsoleteNode)?;
        if node.obsolete {
            return Err(Error::ObsoleteNode);
        }
        Ok(node)
    }

    /// Fetch a node even if obsolete (mutation bookkeeping needs this).
    pub(crate) fn get_raw(&self, id: NodeId) -> Option<&EvioNode> {
        self.nodes.get(id)
    }

    pub(crate) fn mark_all_obsolete(&mut self) {
        for node in &mut self.nodes {
            node.obsolete = true;
        }
    }

    /// Index one event (a bank) at `pos` and all its descendants.
    ///
    /// `buf` is the whole uncompressed buffer; offsets in the produced
    /// nodes are absolute.
    pub fn extract_event_node(
        &mut self,
        buf: &[u8],
        order: ByteOrder,
        record_pos: usize,
        pos: usize,
        place: usize,
    ) -> Result<NodeId> {
        let header = StructureHeader::read(StructureKind::Bank, get_region(buf, pos)?, order)?;
        let total = header.total_bytes();
        if pos + total > buf.len() {
            return Err(Error::Core(evio_core::Error::BadLength(format!(
                "event {place} of {total} bytes overruns buffer at offset {pos}"
            ))));
        }

        let id = self.nodes.len();
        self.nodes.push(EvioNode {
            len: header.total_words() - 1,
            tag: header.tag(),
            num: header.num(),
            pad: header.padding(),
            pos,
            kind: DataType::Bank,
            data_len: header.data_words(),
            data_pos: pos + 8,
            data_type: header.data_type(),
            record_pos,
            place,
            is_event: true,
            obsolete: false,
            parent: None,
            event_node: None,
            children: Vec::new(),
            all_nodes: vec![id],
        });

        if header.data_type().is_structure() {
            self.extract_children(buf, order, id, id)?;
        }
        Ok(id)
    }

    /// Walk the children of `parent` by their length prefixes, adding each
    /// child and recursing into container payloads.
    fn extract_children(
        &mut self,
        buf: &[u8],
        order: ByteOrder,
        parent: NodeId,
        event: NodeId,
    ) -> Result<()> {
        let (child_kind, data_pos, data_bytes, record_pos) = {
            let p = &self.nodes[parent];
            (p.data_type, p.data_pos, p.data_bytes(), p.record_pos)
        };
        let kind = match child_kind {
            t if t.is_bank() => StructureKind::Bank,
            t if t.is_segment() => StructureKind::Segment,
            t if t.is_tag_segment() => StructureKind::TagSegment,
            _ => return Ok(()),
        };

        let mut pos = data_pos;
        let end = data_pos + data_bytes;
        while pos < end {
            let header = StructureHeader::read(kind, get_region(buf, pos)?, order)?;
            let total = header.total_bytes();
            if pos + total > end {
                return Err(Error::Core(evio_core::Error::BadLength(format!(
                    "child {header} overruns parent at offset {pos}"
                ))));
            }

            let id = self.nodes.len();
            let header_bytes = header.header_words() * 4;
            self.nodes.push(EvioNode {
                len: header.total_words() - 1,
                tag: header.tag(),
                num: header.num(),
                pad: header.padding(),
                pos,
                kind: match kind {
                    StructureKind::Bank => DataType::Bank,
                    StructureKind::Segment => DataType::Segment,
                    StructureKind::TagSegment => DataType::TagSegment,
                },
                data_len: header.data_words(),
                data_pos: pos + header_bytes,
                data_type: header.data_type(),
                record_pos,
                place: self.nodes[event].place,
                is_event: false,
                obsolete: false,
                parent: Some(parent),
                event_node: Some(event),
                children: Vec::new(),
                all_nodes: Vec::new(),
            });
            self.nodes[parent].children.push(id);
            self.nodes[event].all_nodes.push(id);

            if header.data_type().is_structure() {
                self.extract_children(buf, order, id, event)?;
            }
            pos += total;
        }
        Ok(())
    }
}

fn get_region(buf: &[u8], pos: usize) -> Result<&[u8]> {
    if pos > buf.len() {
        return Err(Error::Truncated(format!(
            "structure offset {pos} exceeds buffer of {} bytes",
            buf.len()
        )));
    }
    Ok(&buf[pos..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use evio_core::StructureHeader;

    fn uint_bank(order: ByteOrder, tag: u16, num: u8, values: &[u32]) -> Vec<u8> {
        let hdr = StructureHeader::bank(tag, num, DataType::Uint32, values.len() as u32);
        let mut out = vec![0u8; hdr.total_bytes()];
        hdr.write(&mut out, order).unwrap();
        for (i, v) in values.iter().enumerate() {
            order.write_u32(&mut out[8 + 4 * i..], *v);
        }
        out
    }

    fn container_bank(order: ByteOrder, tag: u16, children: &[Vec<u8>]) -> Vec<u8> {
        let words: usize = children.iter().map(|c| c.len() / 4).sum();
        let hdr = StructureHeader::bank(tag, 0, DataType::Bank, words as u32);
        let mut out = vec![0u8; 8];
        hdr.write(&mut out, order).unwrap();
        for c in children {
            out.extend_from_slice(c);
        }
        out
    }

    #[test]
    fn test_flat_event_node() {
        let order = ByteOrder::LittleEndian;
        let event = uint_bank(order, 7, 3, &[1, 2, 3]);
        let mut arena = NodeArena::new();
        let id = arena.extract_event_node(&event, order, 0, 0, 0).unwrap();

        let node = arena.get(id).unwrap();
        assert!(node.is_event());
        assert_eq!(node.tag, 7);
        assert_eq!(node.num, 3);
        assert_eq!(node.total_bytes(), event.len());
        assert_eq!(node.data_pos, 8);
        assert_eq!(node.data_len, 3);
        assert_eq!(node.data_type, DataType::Uint32);
        assert!(node.child_ids().is_empty());
    }

    #[test]
    fn test_nested_tree_indexed() {
        let order = ByteOrder::LittleEndian;
        let a = uint_bank(order, 1, 0, &[10, 11]);
        let b = uint_bank(order, 2, 0, &[20]);
        let inner = container_bank(order, 5, &[a.clone(), b.clone()]);
        let event = container_bank(order, 9, &[inner.clone()]);

        let mut arena = NodeArena::new();
        let root = arena.extract_event_node(&event, order, 0, 0, 0).unwrap();

        let root_node = arena.get(root).unwrap();
        assert_eq!(root_node.child_ids().len(), 1);
        assert_eq!(root_node.all_nodes.len(), 4, "root + inner + a + b");

        let inner_id = root_node.child_ids()[0];
        let inner_node = arena.get(inner_id).unwrap();
        assert_eq!(inner_node.tag, 5);
        assert_eq!(inner_node.pos, 8);
        assert_eq!(inner_node.child_ids().len(), 2);
        assert_eq!(inner_node.parent_id(), Some(root));
        assert_eq!(inner_node.event_id(), Some(root));

        let a_node = arena.get(inner_node.child_ids()[0]).unwrap();
        assert_eq!(a_node.tag, 1);
        assert_eq!(a_node.pos, 16);
        assert_eq!(a_node.total_bytes(), a.len());
        let b_node = arena.get(inner_node.child_ids()[1]).unwrap();
        assert_eq!(b_node.tag, 2);
        assert_eq!(b_node.pos, 16 + a.len());
    }

    #[test]
    fn test_segment_children() {
        let order = ByteOrder::LittleEndian;
        // segment with 2 data words inside a bank typed "segment"
        let seg = StructureHeader::segment(4, DataType::Uint32, 2);
        let mut seg_bytes = vec![0u8; seg.total_bytes()];
        seg.write(&mut seg_bytes, order).unwrap();

        let hdr = StructureHeader::bank(3, 0, DataType::Segment, 3);
        let mut event = vec![0u8; 8];
        hdr.write(&mut event, order).unwrap();
        event.extend_from_slice(&seg_bytes);

        let mut arena = NodeArena::new();
        let root = arena.extract_event_node(&event, order, 0, 0, 0).unwrap();
        let root_node = arena.get(root).unwrap();
        assert_eq!(root_node.child_ids().len(), 1);

        let child = arena.get(root_node.child_ids()[0]).unwrap();
        assert_eq!(child.kind, DataType::Segment);
        assert_eq!(child.tag, 4);
        assert_eq!(child.data_pos, child.pos + 4);
    }

    #[test]
    fn test_bad_child_length_rejected() {
        let order = ByteOrder::LittleEndian;
        let mut event = vec![0u8; 16];
        StructureHeader::bank(1, 0, DataType::Bank, 2)
            .write(&mut event, order)
            .unwrap();
        order.write_u32(&mut event[8..], 50); // child claims 51 words
        order.write_u32(&mut event[12..], 0x0000_0100);

        let mut arena = NodeArena::new();
        assert!(arena.extract_event_node(&event, order, 0, 0, 0).is_err());
    }

    #[test]
    fn test_obsolete_handle_rejected() {
        let order = ByteOrder::LittleEndian;
        let event = uint_bank(order, 1, 0, &[5]);
        let mut arena = NodeArena::new();
        let id = arena.extract_event_node(&event, order, 0, 0, 0).unwrap();

        arena.mark_all_obsolete();
        assert!(matches!(arena.get(id), Err(Error::ObsoleteNode)));

        // rescan issues a fresh handle
        let fresh = arena.extract_event_node(&event, order, 0, 0, 1).unwrap();
        assert!(arena.get(fresh).is_ok());
    }
}
