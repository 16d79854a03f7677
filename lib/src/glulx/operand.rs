use super::DecodeError;
use byteorder::{BigEndian, ByteOrder};

/// One instruction operand, tagged with its addressing space and the number
/// of data bytes it is encoded in
///
/// The encoded width is part of the value: the format allows a one-byte and
/// a four-byte encoding of the same quantity, and the assembler exploits
/// this during relaxation. An operand is *canonical* when its width is the
/// smallest one that can represent its value - see [`Operand::is_canonical`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    /// Immediate constant, sign-extended from `width` bytes (width 0 encodes
    /// the constant zero with no data bytes)
    Imm { value: i32, width: u8 },

    /// Absolute memory address, zero-extended from `width` bytes
    Mem { addr: u32, width: u8 },

    /// Top of the virtual stack (pop when loaded, push when stored)
    Stack,

    /// Byte offset into the local-variable frame
    Local { offset: u32, width: u8 },

    /// Memory address stored relative to `ramstart`
    Ram { offset: u32, width: u8 },
}

/// Smallest width (1, 2, or 4) whose sign-extension reproduces `value`
pub fn signed_width(value: i32) -> u8 {
    if (-0x80..=0x7f).contains(&value) {
        1
    } else if (-0x8000..=0x7fff).contains(&value) {
        2
    } else {
        4
    }
}

/// Smallest width (1, 2, or 4) whose zero-extension reproduces `value`
pub fn unsigned_width(value: u32) -> u8 {
    if value <= 0xff {
        1
    } else if value <= 0xffff {
        2
    } else {
        4
    }
}

impl Operand {
    /// Immediate with the canonical (minimal) width
    pub fn imm(value: i32) -> Operand {
        let width = if value == 0 { 0 } else { signed_width(value) };
        Operand::Imm { value, width }
    }

    /// Memory reference with the canonical (minimal) width
    pub fn mem(addr: u32) -> Operand {
        Operand::Mem { addr, width: unsigned_width(addr) }
    }

    /// Local-frame reference with the canonical (minimal) width
    pub fn local(offset: u32) -> Operand {
        Operand::Local { offset, width: unsigned_width(offset) }
    }

    /// RAM-relative reference with the canonical (minimal) width
    pub fn ram(offset: u32) -> Operand {
        Operand::Ram { offset, width: unsigned_width(offset) }
    }

    /// The 4-bit addressing mode this operand encodes to
    pub fn mode(&self) -> u8 {
        match *self {
            Operand::Imm { width: 0, .. } => 0x0,
            Operand::Imm { width, .. } => width_mode(0x0, width),
            Operand::Mem { width, .. } => width_mode(0x4, width),
            Operand::Stack => 0x8,
            Operand::Local { width, .. } => width_mode(0x8, width),
            Operand::Ram { width, .. } => width_mode(0xc, width),
        }
    }

    /// Number of data bytes following the mode nibble
    pub fn width(&self) -> usize {
        match *self {
            Operand::Stack => 0,
            Operand::Imm { width, .. }
            | Operand::Mem { width, .. }
            | Operand::Local { width, .. }
            | Operand::Ram { width, .. } => width as usize,
        }
    }

    /// The operand's value, wrapped to 32 bits regardless of family
    pub fn raw_value(&self) -> u32 {
        match *self {
            Operand::Imm { value, .. } => value as u32,
            Operand::Mem { addr, .. } => addr,
            Operand::Stack => 0,
            Operand::Local { offset, .. } | Operand::Ram { offset, .. } => offset,
        }
    }

    /// The immediate value, if this is an immediate (or constant-zero)
    pub fn imm_value(&self) -> Option<i32> {
        match *self {
            Operand::Imm { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn is_immediate(&self) -> bool {
        matches!(self, Operand::Imm { .. })
    }

    pub fn is_mem_ref(&self) -> bool {
        matches!(self, Operand::Mem { .. })
    }

    pub fn is_stack_ref(&self) -> bool {
        matches!(self, Operand::Stack)
    }

    pub fn is_local_ref(&self) -> bool {
        matches!(self, Operand::Local { .. })
    }

    pub fn is_ram_ref(&self) -> bool {
        matches!(self, Operand::Ram { .. })
    }

    /// Does the stored width equal the minimal width for the value?
    ///
    /// Zero is canonical both as mode 0x0 (no data bytes) and as a one-byte
    /// immediate. Encoders may produce non-canonical operands on purpose (a
    /// relaxed label reference pinned at four bytes, say); this is a query,
    /// not a repair.
    pub fn is_canonical(&self) -> bool {
        match *self {
            Operand::Stack => true,
            Operand::Imm { value, width: 0 } => value == 0,
            Operand::Imm { value, width } => width == signed_width(value),
            Operand::Mem { addr: v, width }
            | Operand::Local { offset: v, width }
            | Operand::Ram { offset: v, width } => width == unsigned_width(v),
        }
    }

    /// Append the operand's data bytes (not its mode nibble) to `out`
    pub fn encode(&self, out: &mut Vec<u8>) {
        let value = self.raw_value();
        match self.width() {
            0 => {}
            1 => out.push(value as u8),
            2 => out.extend_from_slice(&(value as u16).to_be_bytes()),
            4 => out.extend_from_slice(&value.to_be_bytes()),
            _ => unreachable!("operand width is always 0, 1, 2, or 4"),
        }
    }

    /// Decode one operand's data bytes given its mode nibble
    ///
    /// Returns the operand and the number of data bytes consumed.
    pub fn decode(mode: u8, data: &[u8], offset: usize) -> Result<(Operand, usize), DecodeError> {
        let unsigned = |width: usize| -> Result<u32, DecodeError> {
            if offset + width > data.len() {
                return Err(DecodeError::Truncated);
            }
            Ok(match width {
                1 => data[offset] as u32,
                2 => BigEndian::read_u16(&data[offset..]) as u32,
                _ => BigEndian::read_u32(&data[offset..]),
            })
        };
        let signed = |width: usize| -> Result<i32, DecodeError> {
            if offset + width > data.len() {
                return Err(DecodeError::Truncated);
            }
            Ok(match width {
                1 => data[offset] as i8 as i32,
                2 => BigEndian::read_i16(&data[offset..]) as i32,
                _ => BigEndian::read_i32(&data[offset..]),
            })
        };

        let operand = match mode {
            0x0 => (Operand::Imm { value: 0, width: 0 }, 0),
            0x8 => (Operand::Stack, 0),
            0x1 => (Operand::Imm { value: signed(1)?, width: 1 }, 1),
            0x2 => (Operand::Imm { value: signed(2)?, width: 2 }, 2),
            0x3 => (Operand::Imm { value: signed(4)?, width: 4 }, 4),
            0x5 => (Operand::Mem { addr: unsigned(1)?, width: 1 }, 1),
            0x6 => (Operand::Mem { addr: unsigned(2)?, width: 2 }, 2),
            0x7 => (Operand::Mem { addr: unsigned(4)?, width: 4 }, 4),
            0x9 => (Operand::Local { offset: unsigned(1)?, width: 1 }, 1),
            0xa => (Operand::Local { offset: unsigned(2)?, width: 2 }, 2),
            0xb => (Operand::Local { offset: unsigned(4)?, width: 4 }, 4),
            0xd => (Operand::Ram { offset: unsigned(1)?, width: 1 }, 1),
            0xe => (Operand::Ram { offset: unsigned(2)?, width: 2 }, 2),
            0xf => (Operand::Ram { offset: unsigned(4)?, width: 4 }, 4),
            mode => return Err(DecodeError::ReservedMode(mode)),
        };
        Ok(operand)
    }
}

/// Mode nibble for a non-zero-width operand: `base + 1/2/3` for widths 1/2/4
fn width_mode(base: u8, width: u8) -> u8 {
    match width {
        1 => base + 1,
        2 => base + 2,
        4 => base + 3,
        _ => unreachable!("operand width is always 1, 2, or 4 here"),
    }
}
