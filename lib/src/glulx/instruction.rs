use super::{DecodeError, Opcode, Operand, Param};
use byteorder::{BigEndian, ByteOrder};

/// A fully-decoded instruction: an opcode plus one operand per slot of the
/// opcode's signature
///
/// Instructions are immutable once constructed. They do not remember where
/// they came from; methods that need a position (branch-target arithmetic)
/// take the instruction's own byte offset as an argument, which keeps the
/// arithmetic identical whether the instruction was just decoded from an
/// image or is about to be encoded into one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: Vec<Operand>,
}

impl Instruction {
    pub fn new(opcode: Opcode, operands: Vec<Operand>) -> Instruction {
        debug_assert_eq!(operands.len(), opcode.params().len());
        Instruction { opcode, operands }
    }

    /// Encoded size of the opcode prefix for a given opcode number
    pub fn opcode_prefix_len(number: u32) -> usize {
        if number <= 0x7f {
            1
        } else if number <= 0x3fff {
            2
        } else {
            4
        }
    }

    /// Total encoded size: prefix + packed mode nibbles + operand data
    pub fn encoded_len(&self) -> usize {
        Instruction::opcode_prefix_len(self.opcode.number())
            + (self.operands.len() + 1) / 2
            + self.operands.iter().map(Operand::width).sum::<usize>()
    }

    /// Append the full encoding (prefix, mode nibbles, operand data) to `out`
    pub fn encode(&self, out: &mut Vec<u8>) {
        let number = self.opcode.number();
        match Instruction::opcode_prefix_len(number) {
            1 => out.push(number as u8),
            2 => out.extend_from_slice(&((number | 0x8000) as u16).to_be_bytes()),
            _ => out.extend_from_slice(&(number | 0x00c0_0000).to_be_bytes()),
        }

        // Mode nibbles go two to a byte, low nibble first, zero padded
        for pair in self.operands.chunks(2) {
            let low = pair[0].mode();
            let high = pair.get(1).map(Operand::mode).unwrap_or(0);
            out.push(low | (high << 4));
        }

        for operand in &self.operands {
            operand.encode(out);
        }
    }

    /// Decode one instruction starting at `offset`
    ///
    /// Returns the instruction and its total encoded length. Never panics:
    /// unknown opcodes, reserved modes, and truncation all come back as
    /// [`DecodeError`]s.
    pub fn decode(data: &[u8], offset: usize) -> Result<(Instruction, usize), DecodeError> {
        let first = *data.get(offset).ok_or(DecodeError::Truncated)?;
        let (number, prefix_len) = if first & 0x80 == 0 {
            (first as u32, 1)
        } else if first & 0xc0 == 0x80 {
            if offset + 2 > data.len() {
                return Err(DecodeError::Truncated);
            }
            (BigEndian::read_u16(&data[offset..]) as u32 - 0x8000, 2)
        } else {
            if offset + 4 > data.len() {
                return Err(DecodeError::Truncated);
            }
            (BigEndian::read_u32(&data[offset..]) - 0x00c0_0000, 4)
        };

        let opcode = Opcode::from_number(number).ok_or(DecodeError::UnknownOpcode(number))?;
        let count = opcode.params().len();
        let modes_at = offset + prefix_len;
        let mut data_at = modes_at + (count + 1) / 2;
        if data_at > data.len() {
            return Err(DecodeError::Truncated);
        }

        let mut operands = Vec::with_capacity(count);
        for i in 0..count {
            let mode = (data[modes_at + i / 2] >> (4 * (i % 2))) & 0x0f;
            let (operand, used) = Operand::decode(mode, data, data_at)?;
            operands.push(operand);
            data_at += used;
        }

        Ok((Instruction { opcode, operands }, data_at - offset))
    }

    /// Does the signature contain a (relative or absolute) branch slot?
    pub fn is_branch(&self) -> bool {
        self.opcode
            .params()
            .iter()
            .any(|p| matches!(p, Param::Branch | Param::AbsBranch))
    }

    /// Does the signature contain a function-reference slot?
    pub fn is_call(&self) -> bool {
        self.opcode.params().contains(&Param::FuncRef)
    }

    /// The return-false/return-true sentinel carried by a relative-branch
    /// operand, if any
    pub fn return_sentinel(&self) -> Option<u32> {
        let i = self.opcode.params().iter().position(|p| *p == Param::Branch)?;
        match self.operands[i].imm_value() {
            Some(v @ (0 | 1)) => Some(v as u32),
            _ => None,
        }
    }

    /// Absolute address a branch operand transfers to, given this
    /// instruction's own byte offset
    ///
    /// A relative branch lands at `offset + len + displacement - 2`; the
    /// sentinel displacements 0 and 1 mean "return" and produce no target.
    /// An absolute branch's target is the operand value itself. A branch
    /// through a non-immediate operand has no statically-known target.
    pub fn branch_target(&self, offset: u32) -> Option<u32> {
        let params = self.opcode.params();

        if let Some(i) = params.iter().position(|p| *p == Param::Branch) {
            if let Some(value) = self.operands[i].imm_value() {
                if value != 0 && value != 1 {
                    let after = offset.wrapping_add(self.encoded_len() as u32);
                    return Some(after.wrapping_add(value as u32).wrapping_sub(2));
                }
            }
        }

        if let Some(i) = params.iter().position(|p| *p == Param::AbsBranch) {
            if let Some(value) = self.operands[i].imm_value() {
                return Some(value as u32);
            }
        }

        None
    }

    /// Address of the function a call-class instruction targets, if the
    /// function operand is an immediate
    pub fn call_target(&self) -> Option<u32> {
        let i = self.opcode.params().iter().position(|p| *p == Param::FuncRef)?;
        self.operands[i].imm_value().map(|v| v as u32)
    }

    /// Any address this instruction transfers control to
    pub fn target(&self, offset: u32) -> Option<u32> {
        self.branch_target(offset).or_else(|| self.call_target())
    }
}
