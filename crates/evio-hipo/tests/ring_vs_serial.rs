//! The ring writer's on-disk bytes are independent of its thread count and
//! identical to the single-threaded writer's output.

use evio_core::{ByteOrder, DataType, StructureHeader};
use evio_hipo::{CompressionType, Reader, RingWriter, Writer, WriterConfig};

fn event(i: u32) -> Vec<u8> {
    let values: Vec<u32> = (0..(i % 29 + 1)).map(|j| i.wrapping_mul(2654435761) ^ j).collect();
    let hdr = StructureHeader::bank(
        (i % 5) as u16,
        i as u8,
        DataType::Uint32,
        values.len() as u32,
    );
    let mut out = vec![0u8; hdr.total_bytes()];
    hdr.write(&mut out, ByteOrder::LittleEndian).unwrap();
    for (k, v) in values.iter().enumerate() {
        ByteOrder::LittleEndian.write_u32(&mut out[8 + 4 * k..], *v);
    }
    out
}

fn config(ct: CompressionType, comp_threads: usize) -> WriterConfig {
    WriterConfig {
        compression: ct,
        comp_threads,
        ring_size: 16,
        max_event_count: 7, // small records so slots cycle hard
        add_trailer_index: true,
        ..Default::default()
    }
}

fn write_serial(path: &std::path::Path, ct: CompressionType, n: u32) {
    let mut writer = Writer::new(path.to_str().unwrap(), config(ct, 1)).unwrap();
    for i in 0..n {
        writer.add_event(&event(i)).unwrap();
    }
    writer.close().unwrap();
}

fn write_ring(path: &std::path::Path, ct: CompressionType, threads: usize, n: u32) {
    let mut writer = RingWriter::new(path.to_str().unwrap(), config(ct, threads)).unwrap();
    for i in 0..n {
        writer.add_event(&event(i)).unwrap();
    }
    writer.close().unwrap();
}

#[test]
fn test_ring_output_independent_of_thread_count() {
    for ct in [CompressionType::None, CompressionType::Lz4, CompressionType::Gzip] {
        let dir = tempfile::tempdir().unwrap();
        let one = dir.path().join("ring1.evio");
        let four = dir.path().join("ring4.evio");

        write_ring(&one, ct, 1, 300);
        write_ring(&four, ct, 4, 300);

        let bytes_one = std::fs::read(&one).unwrap();
        let bytes_four = std::fs::read(&four).unwrap();
        assert_eq!(bytes_one, bytes_four, "{ct:?}: thread count leaked into output");
    }
}

#[test]
fn test_ring_matches_single_threaded_writer() {
    for ct in [CompressionType::None, CompressionType::Lz4] {
        let dir = tempfile::tempdir().unwrap();
        let serial = dir.path().join("serial.evio");
        let ring = dir.path().join("ring.evio");

        write_serial(&serial, ct, 250);
        write_ring(&ring, ct, 3, 250);

        assert_eq!(
            std::fs::read(&serial).unwrap(),
            std::fs::read(&ring).unwrap(),
            "{ct:?}: ring output diverged from serial output"
        );
    }
}

#[test]
fn test_ring_events_read_back_in_submission_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ordered.evio");
    write_ring(&path, CompressionType::Gzip, 4, 1000);

    let mut reader = Reader::open(&path).unwrap();
    assert_eq!(reader.event_count(), 1000);
    for i in 0..1000u32 {
        assert_eq!(
            reader.get_event(i as usize).unwrap().unwrap(),
            event(i),
            "event {i} out of order"
        );
    }
}

#[test]
fn test_ring_split_decisions_made_by_io_thread() {
    // splitting works identically under the ring writer; producer and
    // compressors never touch the files
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("rsplit_%d.evio");

    let cfg = WriterConfig {
        split_size: 2000,
        comp_threads: 3,
        ring_size: 8,
        max_event_count: 4,
        ..Default::default()
    };
    let mut writer = RingWriter::new(template.to_str().unwrap(), cfg).unwrap();
    for i in 0..60 {
        writer.add_event(&event(i)).unwrap();
    }
    writer.close().unwrap();

    let mut files = Vec::new();
    for split in 0..64 {
        let p = dir.path().join(format!("rsplit_{split}.evio"));
        if p.exists() {
            files.push(p);
        }
    }
    assert!(files.len() > 1, "expected splits");

    let mut all = Vec::new();
    for f in &files {
        let mut reader = Reader::open(f).unwrap();
        for i in 0..reader.event_count() {
            all.push(reader.get_event(i).unwrap().unwrap());
        }
    }
    assert_eq!(all.len(), 60);
    for (i, e) in all.iter().enumerate() {
        assert_eq!(e, &event(i as u32), "event {i}");
    }
}
