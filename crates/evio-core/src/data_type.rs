//! EVIO payload type codes.
//!
//! The 6-bit (4-bit in tagsegments) type field of every structure header
//! names what its payload holds: a primitive array, character data, a
//! composite element, or more structures. Two codes each exist for bank
//! (0xE/0x10) and segment (0xD/0x20) for historical reasons; both members of
//! a pair mean the same thing.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Unknown32,
    Uint32,
    Float32,
    CharStar8,
    Short16,
    UShort16,
    Char8,
    UChar8,
    Double64,
    Long64,
    ULong64,
    Int32,
    TagSegment,
    AlsoSegment,
    AlsoBank,
    Composite,
    Bank,
    Segment,
}

impl DataType {
    /// Decode a raw type code. Codes outside the known set come back as
    /// `None`; callers that must keep walking treat those as opaque words.
    pub fn from_code(code: u32) -> Option<DataType> {
        Some(match code {
            0x0 => DataType::Unknown32,
            0x1 => DataType::Uint32,
            0x2 => DataType::Float32,
            0x3 => DataType::CharStar8,
            0x4 => DataType::Short16,
            0x5 => DataType::UShort16,
            0x6 => DataType::Char8,
            0x7 => DataType::UChar8,
            0x8 => DataType::Double64,
            0x9 => DataType::Long64,
            0xa => DataType::ULong64,
            0xb => DataType::Int32,
            0xc => DataType::TagSegment,
            0xd => DataType::AlsoSegment,
            0xe => DataType::AlsoBank,
            0xf => DataType::Composite,
            0x10 => DataType::Bank,
            0x20 => DataType::Segment,
            _ => return None,
        })
    }

    pub fn code(self) -> u32 {
        match self {
            DataType::Unknown32 => 0x0,
            DataType::Uint32 => 0x1,
            DataType::Float32 => 0x2,
            DataType::CharStar8 => 0x3,
            DataType::Short16 => 0x4,
            DataType::UShort16 => 0x5,
            DataType::Char8 => 0x6,
            DataType::UChar8 => 0x7,
            DataType::Double64 => 0x8,
            DataType::Long64 => 0x9,
            DataType::ULong64 => 0xa,
            DataType::Int32 => 0xb,
            DataType::TagSegment => 0xc,
            DataType::AlsoSegment => 0xd,
            DataType::AlsoBank => 0xe,
            DataType::Composite => 0xf,
            DataType::Bank => 0x10,
            DataType::Segment => 0x20,
        }
    }

    pub fn is_bank(self) -> bool {
        matches!(self, DataType::Bank | DataType::AlsoBank)
    }

    pub fn is_segment(self) -> bool {
        matches!(self, DataType::Segment | DataType::AlsoSegment)
    }

    pub fn is_tag_segment(self) -> bool {
        self == DataType::TagSegment
    }

    /// True for the container types whose payload is more structures.
    pub fn is_structure(self) -> bool {
        self.is_bank() || self.is_segment() || self.is_tag_segment()
    }

    /// Element width in bytes for primitive array types; `None` for
    /// containers, composite, and opaque data.
    pub fn element_bytes(self) -> Option<usize> {
        match self {
            DataType::Char8 | DataType::UChar8 | DataType::CharStar8 => Some(1),
            DataType::Short16 | DataType::UShort16 => Some(2),
            DataType::Uint32 | DataType::Int32 | DataType::Float32 => Some(4),
            DataType::Double64 | DataType::Long64 | DataType::ULong64 => Some(8),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Unknown32 => "unknown32",
            DataType::Uint32 => "uint32",
            DataType::Float32 => "float32",
            DataType::CharStar8 => "charstar8",
            DataType::Short16 => "short16",
            DataType::UShort16 => "ushort16",
            DataType::Char8 => "char8",
            DataType::UChar8 => "uchar8",
            DataType::Double64 => "double64",
            DataType::Long64 => "long64",
            DataType::ULong64 => "ulong64",
            DataType::Int32 => "int32",
            DataType::TagSegment => "tagsegment",
            DataType::AlsoSegment | DataType::Segment => "segment",
            DataType::AlsoBank | DataType::Bank => "bank",
            DataType::Composite => "composite",
        };
        f.write_str(name)
    }
}
