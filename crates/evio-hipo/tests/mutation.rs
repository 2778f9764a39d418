//! Structural mutation: removing and adding substructures in place.

use evio_core::{ByteBuffer, ByteOrder, DataType, StructureHeader};
use evio_hipo::{CompressionType, Error, Reader, RecordOutput};

const ORDER: ByteOrder = ByteOrder::LittleEndian;

fn uint_bank(tag: u16, num: u8, values: &[u32]) -> Vec<u8> {
    let hdr = StructureHeader::bank(tag, num, DataType::Uint32, values.len() as u32);
    let mut out = vec![0u8; hdr.total_bytes()];
    hdr.write(&mut out, ORDER).unwrap();
    for (i, v) in values.iter().enumerate() {
        ORDER.write_u32(&mut out[8 + 4 * i..], *v);
    }
    out
}

fn container_bank(tag: u16, children: &[Vec<u8>]) -> Vec<u8> {
    let words: usize = children.iter().map(|c| c.len() / 4).sum();
    let hdr = StructureHeader::bank(tag, 0, DataType::Bank, words as u32);
    let mut out = vec![0u8; 8];
    hdr.write(&mut out, ORDER).unwrap();
    for c in children {
        out.extend_from_slice(c);
    }
    out
}

/// One record holding event = bank { A, B, C }, each child an 8-word bank.
fn abc_reader() -> (Reader, Vec<u8>, Vec<u8>, Vec<u8>) {
    let a = uint_bank(0xA, 1, &[10, 11, 12, 13, 14, 15]);
    let b = uint_bank(0xB, 2, &[20, 21, 22, 23, 24, 25]);
    let c = uint_bank(0xC, 3, &[30, 31, 32, 33, 34, 35]);
    assert_eq!(a.len(), 32);

    let event = container_bank(0xEE, &[a.clone(), b.clone(), c.clone()]);

    let mut record = RecordOutput::new(ORDER, 0, 0, CompressionType::None);
    assert!(record.try_add_event(&event));
    record.set_record_number(1);
    record.set_last_record(true);
    record.build().unwrap();

    let mut buffer = ByteBuffer::wrap(record.as_bytes().to_vec());
    buffer.set_order(ORDER);
    (Reader::from_buffer(buffer).unwrap(), a, b, c)
}

fn child_tags(reader: &Reader, event_ordinal: usize) -> Vec<u16> {
    let event = reader.get_event_node(event_ordinal).unwrap();
    reader
        .node(event)
        .unwrap()
        .child_ids()
        .iter()
        .map(|&id| reader.node(id).unwrap().tag)
        .collect()
}

#[test]
fn test_remove_middle_child() {
    let (mut reader, a, b, c) = abc_reader();
    let before_limit = reader.buffer().unwrap().limit();

    let event_id = reader.get_event_node(0).unwrap();
    let event_before = reader.node(event_id).unwrap().clone();
    assert_eq!(child_tags(&reader, 0), vec![0xA, 0xB, 0xC]);

    let b_id = reader.node(event_id).unwrap().child_ids()[1];
    let cut = reader.remove_structure(b_id).unwrap();
    assert_eq!(cut, b, "removed bytes are returned");

    // buffer shrank by the 32-byte bank
    assert_eq!(reader.buffer().unwrap().limit(), before_limit - 32);

    // outer bank lost 8 words
    let event_id = reader.get_event_node(0).unwrap();
    let event_after = reader.node(event_id).unwrap();
    assert_eq!(event_after.len, event_before.len - 8);
    assert_eq!(child_tags(&reader, 0), vec![0xA, 0xC]);

    // record header: length down 8 words, uncompressed length down 32 bytes
    let rh = reader.first_record_header().unwrap();
    assert_eq!(rh.record_bytes(), before_limit - 32);
    assert_eq!(rh.data_length as usize, event_before.total_bytes() - 32);

    // the event still reads as a valid bank, now { A, C }
    let expected = container_bank(0xEE, &[a, c]);
    assert_eq!(reader.get_event(0).unwrap().unwrap(), expected);
}

#[test]
fn test_removed_handles_are_obsolete() {
    let (mut reader, ..) = abc_reader();
    let event_id = reader.get_event_node(0).unwrap();
    let a_id = reader.node(event_id).unwrap().child_ids()[0];
    let b_id = reader.node(event_id).unwrap().child_ids()[1];

    reader.remove_structure(b_id).unwrap();

    // every pre-mutation handle is dead, the removed one included
    assert!(matches!(reader.node(b_id), Err(Error::ObsoleteNode)));
    assert!(matches!(reader.node(a_id), Err(Error::ObsoleteNode)));
    assert!(matches!(reader.node(event_id), Err(Error::ObsoleteNode)));

    // a second mutation through a dead handle fails cleanly
    assert!(matches!(
        reader.remove_structure(b_id),
        Err(Error::ObsoleteNode)
    ));
}

#[test]
fn test_remove_event_root_rejected() {
    let (mut reader, ..) = abc_reader();
    let event_id = reader.get_event_node(0).unwrap();
    assert!(matches!(
        reader.remove_structure(event_id),
        Err(Error::InvalidConfig(_))
    ));
    // nothing was invalidated
    assert!(reader.node(event_id).is_ok());
}

#[test]
fn test_add_structure_appends_child() {
    let (mut reader, a, b, c) = abc_reader();
    let before_limit = reader.buffer().unwrap().limit();

    let d = uint_bank(0xD, 4, &[40, 41]);
    reader.add_structure(0, &d).unwrap();

    assert_eq!(reader.buffer().unwrap().limit(), before_limit + d.len());
    assert_eq!(child_tags(&reader, 0), vec![0xA, 0xB, 0xC, 0xD]);

    let expected = container_bank(0xEE, &[a, b, c, d]);
    assert_eq!(reader.get_event(0).unwrap().unwrap(), expected);

    let rh = reader.first_record_header().unwrap();
    assert_eq!(rh.data_length as usize, expected.len());
}

#[test]
fn test_remove_then_add_then_rescan_consistent() {
    let (mut reader, a, _b, c) = abc_reader();

    let event_id = reader.get_event_node(0).unwrap();
    let b_id = reader.node(event_id).unwrap().child_ids()[1];
    reader.remove_structure(b_id).unwrap();

    let d = uint_bank(0xD, 4, &[1, 2, 3, 4, 5, 6]);
    reader.add_structure(0, &d).unwrap();

    let expected = container_bank(0xEE, &[a, c, d.clone()]);
    assert_eq!(reader.get_event(0).unwrap().unwrap(), expected);

    // ancestor lengths agree with a fresh scan of the mutated buffer
    let event_id = reader.get_event_node(0).unwrap();
    let event = reader.node(event_id).unwrap();
    assert_eq!(event.total_bytes(), expected.len());
    let sum: usize = event
        .child_ids()
        .iter()
        .map(|&id| reader.node(id).unwrap().total_bytes())
        .sum();
    assert_eq!(sum + 8, event.total_bytes());
}

#[test]
fn test_mutation_in_multi_event_record() {
    // remove from the middle event; its siblings must stay intact
    let e0 = container_bank(1, &[uint_bank(0x1, 0, &[1])]);
    let e1 = container_bank(2, &[uint_bank(0x2, 0, &[2]), uint_bank(0x3, 0, &[3])]);
    let e2 = container_bank(3, &[uint_bank(0x4, 0, &[4])]);

    let mut record = RecordOutput::new(ORDER, 0, 0, CompressionType::None);
    for e in [&e0, &e1, &e2] {
        assert!(record.try_add_event(e));
    }
    record.set_record_number(1);
    record.set_last_record(true);
    record.build().unwrap();

    let mut buffer = ByteBuffer::wrap(record.as_bytes().to_vec());
    buffer.set_order(ORDER);
    let mut reader = Reader::from_buffer(buffer).unwrap();
    assert_eq!(reader.event_count(), 3);

    let middle = reader.get_event_node(1).unwrap();
    let victim = reader.node(middle).unwrap().child_ids()[0];
    reader.remove_structure(victim).unwrap();

    assert_eq!(reader.event_count(), 3);
    assert_eq!(reader.get_event(0).unwrap().unwrap(), e0);
    assert_eq!(
        reader.get_event(1).unwrap().unwrap(),
        container_bank(2, &[uint_bank(0x3, 0, &[3])])
    );
    assert_eq!(reader.get_event(2).unwrap().unwrap(), e2);
}
