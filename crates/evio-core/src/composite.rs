//! Composite (type 0xF) payload handling.
//!
//! A composite payload is an array of elements, each a format tagsegment
//! followed by a data bank:
//!
//! ```text
//! | tagsegment header | format string (ASCII, null-padded to words) |
//! | bank header (2 words) | formatted data ... |
//! ```
//!
//! The format string describes the data layout well enough to byte-swap it:
//!
//! ```text
//! i I F A   32-bit items          S s   16-bit items
//! D L l     64-bit items          a C c  8-bit items
//! <digits>  fixed repeat for the next item or group
//! N n m     runtime repeat: a u32 / u16 / u8 read from the data itself
//! ( ... )   group, repeated per the preceding count
//! ```
//!
//! `parse_format` compiles the string into an instruction stream, and
//! `swap_formatted` runs that stream over the data, swapping each item at
//! its own width. Runtime counts are part of the data and are swapped in
//! passing. The whole format repeats until the data region (minus the pad
//! bytes recorded in the bank header) is consumed.

use crate::error::{Error, Result};
use crate::order::ByteOrder;
use crate::structure::{StructureHeader, StructureKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    B8,
    B16,
    B32,
    B64,
}

impl Width {
    fn bytes(self) -> usize {
        match self {
            Width::B8 => 1,
            Width::B16 => 2,
            Width::B32 => 4,
            Width::B64 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Fixed(u32),
    /// Count is the next u32 in the data stream.
    CountU32,
    /// Count is the next u16 in the data stream.
    CountU16,
    /// Count is the next u8 in the data stream.
    CountU8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormatItem {
    Value { repeat: Repeat, width: Width },
    Group { repeat: Repeat, items: Vec<FormatItem> },
}

fn width_for(ch: char) -> Option<Width> {
    match ch {
        'i' | 'I' | 'F' | 'A' => Some(Width::B32),
        'S' | 's' => Some(Width::B16),
        'a' | 'C' | 'c' => Some(Width::B8),
        'D' | 'L' | 'l' => Some(Width::B64),
        _ => None,
    }
}

/// Compile a composite format string into an instruction stream.
pub fn parse_format(fmt: &str) -> Result<Vec<FormatItem>> {
    struct Frame {
        items: Vec<FormatItem>,
        repeat: Repeat,
    }

    let mut stack: Vec<Frame> = Vec::new();
    let mut items: Vec<FormatItem> = Vec::new();
    let mut pending: Option<Repeat> = None;
    let mut digits: u32 = 0;
    let mut have_digits = false;

    for ch in fmt.chars() {
        match ch {
            '0'..='9' => {
                if pending.is_some() {
                    return Err(Error::BadFormat(format!(
                        "digit after runtime count in '{fmt}'"
                    )));
                }
                digits = digits
                    .checked_mul(10)
                    .and_then(|d| d.checked_add(ch as u32 - '0' as u32))
                    .ok_or_else(|| Error::BadFormat(format!("repeat overflow in '{fmt}'")))?;
                have_digits = true;
            }
            'N' | 'n' | 'm' => {
                if pending.is_some() || have_digits {
                    return Err(Error::BadFormat(format!("stacked counts in '{fmt}'")));
                }
                pending = Some(match ch {
                    'N' => Repeat::CountU32,
                    'n' => Repeat::CountU16,
                    _ => Repeat::CountU8,
                });
            }
            '(' => {
                let repeat = take_repeat(&mut pending, &mut digits, &mut have_digits);
                stack.push(Frame {
                    items: std::mem::take(&mut items),
                    repeat,
                });
            }
            ')' => {
                if pending.is_some() || have_digits {
                    return Err(Error::BadFormat(format!("dangling count in '{fmt}'")));
                }
                let frame = stack
                    .pop()
                    .ok_or_else(|| Error::BadFormat(format!("unbalanced ')' in '{fmt}'")))?;
                let group = FormatItem::Group {
                    repeat: frame.repeat,
                    items: std::mem::replace(&mut items, frame.items),
                };
                items.push(group);
            }
            ',' | ' ' | '\t' => {
                if pending.is_some() || have_digits {
                    return Err(Error::BadFormat(format!("dangling count in '{fmt}'")));
                }
            }
            _ => {
                let width = width_for(ch).ok_or_else(|| {
                    Error::BadFormat(format!("unknown format character '{ch}' in '{fmt}'"))
                })?;
                let repeat = take_repeat(&mut pending, &mut digits, &mut have_digits);
                items.push(FormatItem::Value { repeat, width });
            }
        }
    }

    if !stack.is_empty() {
        return Err(Error::BadFormat(format!("unbalanced '(' in '{fmt}'")));
    }
    if pending.is_some() || have_digits {
        return Err(Error::BadFormat(format!("dangling count in '{fmt}'")));
    }
    if items.is_empty() {
        return Err(Error::BadFormat(format!("empty format '{fmt}'")));
    }
    Ok(items)
}

fn take_repeat(pending: &mut Option<Repeat>, digits: &mut u32, have_digits: &mut bool) -> Repeat {
    if let Some(r) = pending.take() {
        return r;
    }
    if *have_digits {
        let n = *digits;
        *digits = 0;
        *have_digits = false;
        return Repeat::Fixed(n);
    }
    Repeat::Fixed(1)
}

fn swap_run(data: &mut [u8], width: Width) {
    match width {
        Width::B8 => {}
        Width::B16 => {
            for chunk in data.chunks_exact_mut(2) {
                chunk.reverse();
            }
        }
        Width::B32 => {
            for chunk in data.chunks_exact_mut(4) {
                chunk.reverse();
            }
        }
        Width::B64 => {
            for chunk in data.chunks_exact_mut(8) {
                chunk.reverse();
            }
        }
    }
}

struct Interp<'a> {
    data: &'a mut [u8],
    cursor: usize,
    end: usize,
    order: ByteOrder,
}

impl Interp<'_> {
    fn need(&self, bytes: usize) -> Result<()> {
        if self.cursor + bytes > self.end {
            return Err(Error::BadFormat(format!(
                "data exhausted: need {bytes} bytes at offset {} of {}",
                self.cursor, self.end
            )));
        }
        Ok(())
    }

    /// Read, swap, and consume a runtime count of the given width.
    fn take_count(&mut self, repeat: Repeat) -> Result<u32> {
        match repeat {
            Repeat::Fixed(n) => Ok(n),
            Repeat::CountU32 => {
                self.need(4)?;
                let n = self.order.read_u32(&self.data[self.cursor..]);
                self.data[self.cursor..self.cursor + 4].reverse();
                self.cursor += 4;
                Ok(n)
            }
            Repeat::CountU16 => {
                self.need(2)?;
                let n = self.order.read_u16(&self.data[self.cursor..]);
                self.data[self.cursor..self.cursor + 2].reverse();
                self.cursor += 2;
                Ok(n as u32)
            }
            Repeat::CountU8 => {
                self.need(1)?;
                let n = self.data[self.cursor];
                self.cursor += 1;
                Ok(n as u32)
            }
        }
    }

    fn run(&mut self, items: &[FormatItem]) -> Result<()> {
        for item in items {
            match item {
                FormatItem::Value { repeat, width } => {
                    let n = self.take_count(*repeat)? as usize;
                    let bytes = n * width.bytes();
                    self.need(bytes)?;
                    swap_run(&mut self.data[self.cursor..self.cursor + bytes], *width);
                    self.cursor += bytes;
                }
                FormatItem::Group { repeat, items } => {
                    let n = self.take_count(*repeat)?;
                    for _ in 0..n {
                        self.run(items)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Swap a formatted data region in place. The format repeats until the
/// region, minus its trailing `padding` bytes, is consumed.
pub fn swap_formatted(
    data: &mut [u8],
    order: ByteOrder,
    items: &[FormatItem],
    padding: usize,
) -> Result<()> {
    if padding > data.len() {
        return Err(Error::BadFormat(format!(
            "padding {padding} exceeds data length {}",
            data.len()
        )));
    }
    let end = data.len() - padding;
    let mut interp = Interp {
        data,
        cursor: 0,
        end,
        order,
    };
    while interp.cursor < interp.end {
        let before = interp.cursor;
        interp.run(items)?;
        if interp.cursor == before {
            return Err(Error::BadFormat(
                "format consumes no data".to_string(),
            ));
        }
    }
    Ok(())
}

/// Swap an array of composite elements in place.
///
/// `data` is the full composite payload of a containing structure; `order`
/// is its byte order before the swap.
pub fn swap_composite(data: &mut [u8], order: ByteOrder) -> Result<()> {
    let mut pos = 0usize;

    while pos < data.len() {
        // Format tagsegment
        let ts = StructureHeader::read(StructureKind::TagSegment, &data[pos..], order)?;
        let fmt_words = ts.data_words() as usize;
        data[pos..pos + 4].reverse();
        pos += 4;

        if pos + fmt_words * 4 > data.len() {
            return Err(Error::BadFormat(
                "composite format string overruns payload".to_string(),
            ));
        }
        let fmt_bytes = &data[pos..pos + fmt_words * 4];
        let fmt: String = fmt_bytes
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| b as char)
            .collect();
        let items = parse_format(fmt.trim())?;
        pos += fmt_words * 4;

        // Data bank
        let bank = StructureHeader::read(StructureKind::Bank, &data[pos..], order)?;
        let data_words = bank.data_words() as usize;
        let pad = bank.padding() as usize;
        data[pos..pos + 4].reverse();
        data[pos + 4..pos + 8].reverse();
        pos += 8;

        if pos + data_words * 4 > data.len() {
            return Err(Error::BadFormat(
                "composite data bank overruns payload".to_string(),
            ));
        }
        swap_formatted(&mut data[pos..pos + data_words * 4], order, &items, pad)?;
        pos += data_words * 4;
    }

    Ok(())
}
