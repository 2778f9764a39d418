//! Endian swap of an EVIO structure tree.
//!
//! Swapping walks the tree: the header of each structure is swapped as
//! 32-bit words, then the payload is swapped according to the header's type
//! field. Container payloads recurse child by child using the length
//! prefixes; primitive arrays are swapped at their element stride; character
//! and opaque payloads are left as bytes; composite payloads are handed to
//! the format-driven swapper in [`crate::composite`].
//!
//! All swaps are pure byte reversals, so swapping twice restores the
//! original bytes, and an in-place swap followed by a copy is identical to a
//! copying swap.

use crate::composite::swap_composite;
use crate::data_type::DataType;
use crate::error::{Error, Result};
use crate::order::ByteOrder;
use crate::structure::{StructureHeader, StructureKind};

/// Swap one event (a bank) in place. `order` is the byte order of `data`
/// before the swap; the new order is returned.
pub fn swap_event(data: &mut [u8], order: ByteOrder) -> Result<ByteOrder> {
    swap_bank(data, order)?;
    Ok(order.swapped())
}

/// Copying variant of [`swap_event`]: `src` is untouched and the swapped
/// event appears in `dest`.
pub fn swap_event_copy(src: &[u8], dest: &mut [u8], order: ByteOrder) -> Result<ByteOrder> {
    if dest.len() < src.len() {
        return Err(Error::OutOfBounds {
            pos: 0,
            len: src.len(),
            bound: dest.len(),
        });
    }
    dest[..src.len()].copy_from_slice(src);
    swap_event(&mut dest[..src.len()], order)
}

fn swap_words(data: &mut [u8]) {
    for chunk in data.chunks_exact_mut(4) {
        chunk.reverse();
    }
}

fn swap_halves(data: &mut [u8]) {
    for chunk in data.chunks_exact_mut(2) {
        chunk.reverse();
    }
}

fn swap_doubles(data: &mut [u8]) {
    for chunk in data.chunks_exact_mut(8) {
        chunk.reverse();
    }
}

fn swap_bank(data: &mut [u8], order: ByteOrder) -> Result<()> {
    let hdr = StructureHeader::read(StructureKind::Bank, data, order)?;
    let total = hdr.total_bytes();
    if total > data.len() {
        return Err(Error::BadLength(format!(
            "bank of {total} bytes exceeds its {}-byte region",
            data.len()
        )));
    }
    swap_words(&mut data[0..8]);
    swap_data(
        &mut data[8..total],
        hdr.data_type(),
        hdr.padding() as usize,
        order,
    )
}

fn swap_segment(data: &mut [u8], order: ByteOrder) -> Result<()> {
    let hdr = StructureHeader::read(StructureKind::Segment, data, order)?;
    let total = hdr.total_bytes();
    if total > data.len() {
        return Err(Error::BadLength(format!(
            "segment of {total} bytes exceeds its {}-byte region",
            data.len()
        )));
    }
    swap_words(&mut data[0..4]);
    swap_data(
        &mut data[4..total],
        hdr.data_type(),
        hdr.padding() as usize,
        order,
    )
}

fn swap_tagsegment(data: &mut [u8], order: ByteOrder) -> Result<()> {
    let hdr = StructureHeader::read(StructureKind::TagSegment, data, order)?;
    let total = hdr.total_bytes();
    if total > data.len() {
        return Err(Error::BadLength(format!(
            "tagsegment of {total} bytes exceeds its {}-byte region",
            data.len()
        )));
    }
    swap_words(&mut data[0..4]);
    swap_data(&mut data[4..total], hdr.data_type(), 0, order)
}

fn swap_data(data: &mut [u8], dt: DataType, _pad: usize, order: ByteOrder) -> Result<()> {
    match dt {
        // 32-bit primitives
        DataType::Uint32 | DataType::Int32 | DataType::Float32 => {
            swap_words(data);
            Ok(())
        }
        // 16-bit primitives; any pad half-word swaps harmlessly
        DataType::Short16 | DataType::UShort16 => {
            swap_halves(data);
            Ok(())
        }
        // 64-bit primitives
        DataType::Double64 | DataType::Long64 | DataType::ULong64 => {
            swap_doubles(data);
            Ok(())
        }
        // byte data has no endianness
        DataType::Unknown32 | DataType::CharStar8 | DataType::Char8 | DataType::UChar8 => Ok(()),
        DataType::Composite => swap_composite(data, order),
        DataType::Bank | DataType::AlsoBank => {
            swap_children(data, order, StructureKind::Bank)
        }
        DataType::Segment | DataType::AlsoSegment => {
            swap_children(data, order, StructureKind::Segment)
        }
        DataType::TagSegment => swap_children(data, order, StructureKind::TagSegment),
    }
}

fn swap_children(data: &mut [u8], order: ByteOrder, kind: StructureKind) -> Result<()> {
    let mut pos = 0usize;
    while pos < data.len() {
        let hdr = StructureHeader::read(kind, &data[pos..], order)?;
        let total = hdr.total_bytes();
        if pos + total > data.len() {
            return Err(Error::BadLength(format!(
                "child {hdr} overruns parent at offset {pos}"
            )));
        }
        let region = &mut data[pos..pos + total];
        match kind {
            StructureKind::Bank => swap_bank(region, order)?,
            StructureKind::Segment => swap_segment(region, order)?,
            StructureKind::TagSegment => swap_tagsegment(region, order)?,
        }
        pos += total;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::StructureHeader;

    fn build_uint_bank(order: ByteOrder, tag: u16, values: &[u32]) -> Vec<u8> {
        let hdr = StructureHeader::bank(tag, 1, DataType::Uint32, values.len() as u32);
        let mut out = vec![0u8; hdr.total_bytes()];
        hdr.write(&mut out, order).unwrap();
        for (i, v) in values.iter().enumerate() {
            order.write_u32(&mut out[8 + 4 * i..], *v);
        }
        out
    }

    fn build_container_bank(
        order: ByteOrder,
        tag: u16,
        child_type: DataType,
        children: &[Vec<u8>],
    ) -> Vec<u8> {
        let data_words: usize = children.iter().map(|c| c.len() / 4).sum();
        let hdr = StructureHeader::bank(tag, 0, child_type, data_words as u32);
        let mut out = vec![0u8; 8];
        hdr.write(&mut out, order).unwrap();
        for c in children {
            out.extend_from_slice(c);
        }
        out
    }

    #[test]
    fn test_swap_flat_bank_matches_rebuild() {
        let values = [0u32, 1, 2, 0xDEAD_BEEF];
        let le = build_uint_bank(ByteOrder::LittleEndian, 5, &values);
        let be = build_uint_bank(ByteOrder::BigEndian, 5, &values);

        let mut swapped = le.clone();
        let new_order = swap_event(&mut swapped, ByteOrder::LittleEndian).unwrap();
        assert_eq!(new_order, ByteOrder::BigEndian);
        assert_eq!(swapped, be);
    }

    #[test]
    fn test_double_swap_is_identity() {
        let child_a = build_uint_bank(ByteOrder::LittleEndian, 1, &[1, 2, 3]);
        let child_b = build_uint_bank(ByteOrder::LittleEndian, 2, &[4]);
        let event =
            build_container_bank(ByteOrder::LittleEndian, 9, DataType::Bank, &[child_a, child_b]);

        let mut data = event.clone();
        swap_event(&mut data, ByteOrder::LittleEndian).unwrap();
        assert_ne!(data, event);
        swap_event(&mut data, ByteOrder::BigEndian).unwrap();
        assert_eq!(data, event);
    }

    #[test]
    fn test_swap_nested_containers() {
        // bank { bank { uint32 data } } built in both orders independently
        for (src, dst) in [
            (ByteOrder::LittleEndian, ByteOrder::BigEndian),
            (ByteOrder::BigEndian, ByteOrder::LittleEndian),
        ] {
            let inner_src = build_uint_bank(src, 3, &[10, 20]);
            let outer_src = build_container_bank(src, 7, DataType::Bank, &[inner_src]);
            let inner_dst = build_uint_bank(dst, 3, &[10, 20]);
            let outer_dst = build_container_bank(dst, 7, DataType::Bank, &[inner_dst]);

            let mut swapped = outer_src.clone();
            swap_event(&mut swapped, src).unwrap();
            assert_eq!(swapped, outer_dst);
        }
    }

    #[test]
    fn test_swap_short_payload_with_padding() {
        // 3 shorts -> 2 data words with 2 pad bytes, recorded in the header
        let order = ByteOrder::BigEndian;
        let mut hdr = StructureHeader::bank(4, 0, DataType::Short16, 2);
        hdr.set_padding(2);
        let mut event = vec![0u8; hdr.total_bytes()];
        hdr.write(&mut event, order).unwrap();
        for (i, v) in [100u16, 200, 300].iter().enumerate() {
            order.write_u16(&mut event[8 + 2 * i..], *v);
        }

        let mut swapped = event.clone();
        swap_event(&mut swapped, order).unwrap();
        let le = ByteOrder::LittleEndian;
        assert_eq!(le.read_u16(&swapped[8..]), 100);
        assert_eq!(le.read_u16(&swapped[10..]), 200);
        assert_eq!(le.read_u16(&swapped[12..]), 300);
    }

    #[test]
    fn test_swap_char_payload_untouched() {
        let order = ByteOrder::LittleEndian;
        let hdr = StructureHeader::bank(2, 0, DataType::Char8, 1);
        let mut event = vec![0u8; hdr.total_bytes()];
        hdr.write(&mut event, order).unwrap();
        event[8..12].copy_from_slice(b"abcd");

        let mut swapped = event.clone();
        swap_event(&mut swapped, order).unwrap();
        assert_eq!(&swapped[8..12], b"abcd");
    }

    #[test]
    fn test_swap_copy_leaves_source() {
        let event = build_uint_bank(ByteOrder::LittleEndian, 1, &[42]);
        let mut dest = vec![0u8; event.len()];
        swap_event_copy(&event, &mut dest, ByteOrder::LittleEndian).unwrap();
        assert_eq!(event, build_uint_bank(ByteOrder::LittleEndian, 1, &[42]));
        assert_eq!(dest, build_uint_bank(ByteOrder::BigEndian, 1, &[42]));
    }

    #[test]
    fn test_swap_bad_child_length() {
        // child claims more words than the parent holds
        let order = ByteOrder::LittleEndian;
        let mut event = vec![0u8; 16];
        StructureHeader::bank(1, 0, DataType::Bank, 2)
            .write(&mut event, order)
            .unwrap();
        order.write_u32(&mut event[8..], 100); // child length word: way too big
        order.write_u32(&mut event[12..], 0x0000_0100);
        assert!(matches!(
            swap_event(&mut event, order),
            Err(Error::BadLength(_))
        ));
    }

    #[test]
    fn test_swap_composite_event() {
        use crate::structure::StructureKind;
        let order = ByteOrder::BigEndian;

        // composite element: tagsegment("2i") + bank of 2 u32
        let fmt = b"2i\0\0";
        let ts = StructureHeader::tag_segment(1, DataType::CharStar8, 1);
        let inner = StructureHeader::bank(2, 0, DataType::Uint32, 2);
        let mut payload = vec![0u8; 4 + 4 + 8 + 8];
        ts.write(&mut payload[0..4], order).unwrap();
        payload[4..8].copy_from_slice(fmt);
        inner.write(&mut payload[8..16], order).unwrap();
        order.write_u32(&mut payload[16..], 0x0102_0304);
        order.write_u32(&mut payload[20..], 0x0A0B_0C0D);

        let outer = StructureHeader::bank(9, 0, DataType::Composite, (payload.len() / 4) as u32);
        let mut event = vec![0u8; 8];
        outer.write(&mut event, order).unwrap();
        event.extend_from_slice(&payload);

        let original = event.clone();
        swap_event(&mut event, order).unwrap();

        let le = ByteOrder::LittleEndian;
        // format string survives as bytes
        let ts_back =
            StructureHeader::read(StructureKind::TagSegment, &event[8..], le).unwrap();
        assert_eq!(ts_back.data_words(), 1);
        assert_eq!(&event[12..16], fmt);
        // data values now little-endian
        assert_eq!(le.read_u32(&event[24..]), 0x0102_0304);
        assert_eq!(le.read_u32(&event[28..]), 0x0A0B_0C0D);

        // and back again
        swap_event(&mut event, le).unwrap();
        assert_eq!(event, original);
    }
}
