use super::Error;
use crate::glulx::{
    signed_width, unsigned_width, FuncHeader, Instruction, Opcode, Operand,
};
use std::collections::HashMap;

/// One operation in the assembler's program-order item list
///
/// Each item owns its own encoding; the [`super::Assembler`] owns the label
/// table and the offsets, and hands both to the items during resolution.
#[derive(Debug, Clone)]
pub enum Item {
    Instr(AsmInstr),
    Func(FuncHeader),
    /// Pre-encoded raw bytes (`db`/`dw`/`dd`/`dc`/`fill` directives)
    Data(Vec<u8>),
    /// A minimal run of zero bytes aligning the next item to `boundary`
    Padding { boundary: u32 },
}

impl Item {
    /// Encoded size when the item starts at `offset` (only padding cares)
    pub fn encoded_len(&self, offset: u32) -> usize {
        match self {
            Item::Instr(instr) => instr.encoded_len(),
            Item::Func(func) => func.encoded_len(),
            Item::Data(bytes) => bytes.len(),
            Item::Padding { boundary } => ((boundary - offset % boundary) % boundary) as usize,
        }
    }

    pub fn encode(&self, offset: u32, out: &mut Vec<u8>) {
        match self {
            Item::Instr(instr) => instr.encode(out),
            Item::Func(func) => func.encode(out),
            Item::Data(bytes) => out.extend_from_slice(bytes),
            Item::Padding { .. } => {
                out.resize(out.len() + self.encoded_len(offset), 0);
            }
        }
    }
}

/// An instruction whose operands may still be symbolic
#[derive(Debug, Clone)]
pub struct AsmInstr {
    pub opcode: Opcode,
    pub operands: Vec<AsmOperand>,
}

impl AsmInstr {
    pub fn new(opcode: Opcode, operands: Vec<AsmOperand>) -> AsmInstr {
        debug_assert_eq!(operands.len(), opcode.params().len());
        AsmInstr { opcode, operands }
    }

    pub fn encoded_len(&self) -> usize {
        Instruction::opcode_prefix_len(self.opcode.number())
            + (self.operands.len() + 1) / 2
            + self.operands.iter().map(|o| o.operand().width()).sum::<usize>()
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        let operands = self.operands.iter().map(|o| *o.operand()).collect();
        Instruction::new(self.opcode, operands).encode(out);
    }

    /// Re-resolve every label reference against `addresses`
    ///
    /// `offset` is this instruction's offset from the previous relaxation
    /// pass; branch displacements are computed against it and against the
    /// instruction's previous length, exactly mirroring how the target
    /// address will be recovered after the loop converges.
    pub fn resolve(&mut self, addresses: &HashMap<String, u32>, offset: u32) -> Result<(), Error> {
        let len = self.encoded_len() as u32;
        for operand in &mut self.operands {
            if let AsmOperand::Ref(reference) = operand {
                reference.resolve(addresses, offset, len)?;
            }
        }
        Ok(())
    }
}

/// Either a finished operand or a symbolic reference to a label
#[derive(Debug, Clone)]
pub enum AsmOperand {
    Fixed(Operand),
    Ref(LabelRef),
}

impl AsmOperand {
    /// The operand as currently encoded (a reference yields its most recent
    /// resolution)
    pub fn operand(&self) -> &Operand {
        match self {
            AsmOperand::Fixed(operand) => operand,
            AsmOperand::Ref(reference) => &reference.resolved,
        }
    }
}

/// How a label's address is folded into an operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// Immediate displacement relative to the end of the instruction
    /// (`lb(..)`)
    Branch,
    /// Absolute address as an immediate (`la(..)`/`limm(..)`)
    Absolute,
    /// Absolute address in a memory operand (`lmem(..)`)
    Mem,
    /// Address stored relative to `ramstart` (`lram(..)`)
    Ram,
}

/// A symbolic operand: a label name plus how (and how wide) to encode its
/// address
///
/// Without an explicit width the reference starts at one byte and widens to
/// the minimal width for whatever address each relaxation pass resolves it
/// to - never narrowing again, which is what makes relaxation monotone.
#[derive(Debug, Clone)]
pub struct LabelRef {
    pub label: String,
    pub kind: RefKind,
    explicit_width: Option<u8>,
    resolved: Operand,
}

impl LabelRef {
    pub fn new(label: impl Into<String>, kind: RefKind, explicit_width: Option<u8>) -> LabelRef {
        let width = explicit_width.unwrap_or(1);
        let resolved = match kind {
            RefKind::Branch | RefKind::Absolute => Operand::Imm { value: 0, width },
            RefKind::Mem => Operand::Mem { addr: 0, width },
            RefKind::Ram => Operand::Ram { offset: 0, width },
        };
        LabelRef { label: label.into(), kind, explicit_width, resolved }
    }

    fn resolve(
        &mut self,
        addresses: &HashMap<String, u32>,
        offset: u32,
        instr_len: u32,
    ) -> Result<(), Error> {
        let target = *addresses
            .get(&self.label)
            .ok_or_else(|| Error::UndefinedLabel(self.label.clone()))?;

        self.resolved = match self.kind {
            RefKind::Branch => {
                let displacement =
                    target.wrapping_sub(offset).wrapping_sub(instr_len).wrapping_add(2) as i32;
                Operand::Imm { value: displacement, width: self.pick_signed(displacement) }
            }
            RefKind::Absolute => {
                let value = target as i32;
                Operand::Imm { value, width: self.pick_signed(value) }
            }
            RefKind::Mem => Operand::Mem { addr: target, width: self.pick_unsigned(target) },
            RefKind::Ram => {
                let ramstart = *addresses
                    .get("ramstart")
                    .ok_or_else(|| Error::UndefinedLabel("ramstart".to_owned()))?;
                let relative = target.wrapping_sub(ramstart);
                Operand::Ram { offset: relative, width: self.pick_unsigned(relative) }
            }
        };
        Ok(())
    }

    fn pick_signed(&self, value: i32) -> u8 {
        match self.explicit_width {
            Some(width) => width,
            None => signed_width(value).max(self.resolved.width() as u8),
        }
    }

    fn pick_unsigned(&self, value: u32) -> u8 {
        match self.explicit_width {
            Some(width) => width,
            None => unsigned_width(value).max(self.resolved.width() as u8),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn padding_lengths() {
        let pad = Item::Padding { boundary: 256 };
        assert_eq!(pad.encoded_len(256), 0);
        assert_eq!(pad.encoded_len(257), 255);
        assert_eq!(pad.encoded_len(41), 215);

        let mut out = vec![0xff; 3];
        Item::Padding { boundary: 4 }.encode(3, &mut out);
        assert_eq!(out, vec![0xff, 0xff, 0xff, 0x00]);
    }

    #[test]
    fn branch_reference_resolution() {
        let mut addresses = HashMap::new();
        addresses.insert("target".to_owned(), 100u32);

        // jump at offset 90, 3 bytes long, to address 100: displacement 9
        let mut reference = LabelRef::new("target", RefKind::Branch, None);
        reference.resolve(&addresses, 90, 3).unwrap();
        assert_eq!(*AsmOperand::Ref(reference.clone()).operand(), Operand::imm(9));

        // backwards: jump at 200 to 100 gives a negative displacement
        reference.resolve(&addresses, 200, 3).unwrap();
        assert_eq!(
            *AsmOperand::Ref(reference).operand(),
            Operand::Imm { value: -101, width: 2 }
        );
    }

    #[test]
    fn widths_never_shrink() {
        let mut addresses = HashMap::new();
        addresses.insert("x".to_owned(), 0x9000u32);
        let mut reference = LabelRef::new("x", RefKind::Absolute, None);
        reference.resolve(&addresses, 0, 4).unwrap();
        assert_eq!(reference.resolved.width(), 4);

        // even if a later pass moves the label back down, the width holds
        addresses.insert("x".to_owned(), 0x10u32);
        reference.resolve(&addresses, 0, 4).unwrap();
        assert_eq!(reference.resolved, Operand::Imm { value: 0x10, width: 4 });
    }

    #[test]
    fn explicit_width_is_pinned() {
        let mut addresses = HashMap::new();
        addresses.insert("x".to_owned(), 0x40u32);
        let mut reference = LabelRef::new("x", RefKind::Mem, Some(4));
        reference.resolve(&addresses, 0, 4).unwrap();
        assert_eq!(reference.resolved, Operand::Mem { addr: 0x40, width: 4 });
    }

    #[test]
    fn ram_reference_is_relative() {
        let mut addresses = HashMap::new();
        addresses.insert("ramstart".to_owned(), 0x400u32);
        addresses.insert("buf".to_owned(), 0x420u32);
        let mut reference = LabelRef::new("buf", RefKind::Ram, None);
        reference.resolve(&addresses, 0, 4).unwrap();
        assert_eq!(reference.resolved, Operand::Ram { offset: 0x20, width: 1 });
    }
}
