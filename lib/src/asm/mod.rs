//! The relaxation assembler
//!
//! ### Why relaxation
//!
//! An operand that references a label must be wide enough to hold the
//! label's final address, but the width of every operand feeds back into the
//! addresses of everything behind it. The assembler therefore loops:
//! re-resolve every symbolic reference against the offsets of the previous
//! pass, re-measure every operation, and stop once no operation changed
//! length. Widths only ever grow (a reference never shrinks below a width it
//! already needed), so the loop is a least fixed point and terminates -
//! widths are capped at four bytes. A defensive iteration cap turns a bug in
//! that reasoning into an error instead of a hang.
//!
//! ### Pipeline
//!
//! [`parser`] turns the line-oriented textual form into an [`Assembler`]
//! loaded with items and labels; [`Assembler::finish`] relaxes, truncates
//! the image at `extstart`, computes the checksum, and finalizes the header.
//! [`assemble`] glues the two together.

mod item;
mod parser;

pub use item::*;
pub use parser::parse;

use crate::glulx::Header;
use std::collections::HashMap;

#[derive(Debug)]
pub enum Error {
    /// Source text the parser could not make sense of
    Parse { line: usize, message: String },

    /// The same label name was bound twice
    DuplicateLabel(String),

    /// An operand or header field references a label that is never bound
    UndefinedLabel(String),

    /// The relaxation loop failed to reach a fixed point within its
    /// iteration cap (an internal-consistency bug, not a user error)
    RelaxationDiverged,

    Io(std::io::Error),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

/// Assemble a complete textual program into a binary image
pub fn assemble(source: &str) -> Result<Vec<u8>, Error> {
    parse(source)?.finish()
}

/// Accumulates items and labels in program order, then produces the image
///
/// Labels map to item *indices*, not addresses: an index resolves to the
/// offset of the item it precedes (or to the total image length when it
/// points past the last item), so label addresses follow the items around as
/// relaxation changes their sizes.
pub struct Assembler {
    header: Header,
    items: Vec<Item>,
    offsets: Vec<u32>,
    lengths: Vec<usize>,
    labels: HashMap<String, usize>,
}

impl Assembler {
    pub fn new() -> Assembler {
        Assembler {
            header: Header::default(),
            items: vec![],
            offsets: vec![],
            lengths: vec![],
            labels: HashMap::new(),
        }
    }

    pub fn set_version(&mut self, major: u16, minor: u8, patch: u8) {
        self.header.version = Header::pack_version(major, minor, patch);
    }

    pub fn set_stack_size(&mut self, size: u32) {
        self.header.stack_size = size;
    }

    pub fn set_decoding_tbl(&mut self, offset: u32) {
        self.header.decoding_tbl = offset;
    }

    /// Bind `name` to the position of the next item to be pushed
    pub fn define_label(&mut self, name: &str) -> Result<(), Error> {
        if self.labels.contains_key(name) {
            return Err(Error::DuplicateLabel(name.to_owned()));
        }
        self.labels.insert(name.to_owned(), self.items.len());
        Ok(())
    }

    /// Append an item after everything pushed so far
    pub fn push(&mut self, item: Item) {
        let offset = self.next_offset();
        let length = item.encoded_len(offset);
        self.items.push(item);
        self.offsets.push(offset);
        self.lengths.push(length);
    }

    fn next_offset(&self) -> u32 {
        match self.offsets.last() {
            Some(offset) => offset + *self.lengths.last().unwrap_or(&0) as u32,
            None => Header::SIZE as u32,
        }
    }

    /// Current absolute address of every label, given the current offsets
    fn absolute_labels(&self) -> HashMap<String, u32> {
        let total = self.next_offset();
        self.labels
            .iter()
            .map(|(name, index)| {
                let address = self.offsets.get(*index).copied().unwrap_or(total);
                (name.clone(), address)
            })
            .collect()
    }

    /// Relax to a fixed point, then emit the finalized image
    pub fn finish(mut self) -> Result<Vec<u8>, Error> {
        // Each unresolved reference can widen at most twice (1 -> 2 -> 4),
        // and a pass with no width growth is the last one.
        let cap = 2 * self.items.len() + 8;
        let mut passes = 0;
        loop {
            let addresses = self.absolute_labels();
            let mut changed = 0usize;
            let mut offset = Header::SIZE as u32;
            for i in 0..self.items.len() {
                // Resolution and re-measurement both use the offset from the
                // previous pass; at the fixed point the two coincide.
                let previous_offset = self.offsets[i];
                if let Item::Instr(instr) = &mut self.items[i] {
                    instr.resolve(&addresses, previous_offset)?;
                }
                let new_len = self.items[i].encoded_len(previous_offset);
                if new_len != self.lengths[i] {
                    changed += 1;
                }
                self.lengths[i] = new_len;
                self.offsets[i] = offset;
                offset += new_len as u32;
            }

            if changed == 0 {
                break;
            }
            log::debug!("relaxation pass {}: {} operations changed length", passes, changed);
            passes += 1;
            if passes > cap {
                return Err(Error::RelaxationDiverged);
            }
        }

        // The reserved label names pin down the header's layout fields
        let addresses = self.absolute_labels();
        let lookup = |name: &str| -> Result<u32, Error> {
            addresses
                .get(name)
                .copied()
                .ok_or_else(|| Error::UndefinedLabel(name.to_owned()))
        };
        self.header.ramstart = lookup("ramstart")?;
        self.header.extstart = lookup("extstart")?;
        self.header.endmem = lookup("endmem")?;
        self.header.start_func = lookup("start_func")?;
        if let Some(tbl) = addresses.get("decoding_tbl") {
            self.header.decoding_tbl = *tbl;
        }

        // Emit, cut off at extstart (memory past it is zero-filled at load
        // time and never written to the file), then fix up the checksum.
        let mut out = Vec::with_capacity(self.next_offset() as usize);
        out.extend_from_slice(&self.header.pack());
        for (i, item) in self.items.iter().enumerate() {
            item.encode(self.offsets[i], &mut out);
        }
        out.truncate(self.header.extstart as usize);
        self.header.update_checksum(&out);
        out[..Header::SIZE].copy_from_slice(&self.header.pack());
        Ok(out)
    }
}

impl Default for Assembler {
    fn default() -> Assembler {
        Assembler::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::glulx::{CallingConvention, FuncHeader, Opcode, Operand};

    fn ret_zero() -> Item {
        Item::Instr(AsmInstr::new(
            Opcode::Ret,
            vec![AsmOperand::Fixed(Operand::imm(0))],
        ))
    }

    /// Minimal well-formed program: one empty function, RAM of `ram_len`
    /// bytes, ROM padded out to `ramstart`.
    fn tiny_program(asm: &mut Assembler) {
        asm.set_stack_size(0x100);
        asm.define_label("start_func").unwrap();
        asm.push(Item::Func(FuncHeader::new(CallingConvention::LocalArgs, vec![])));
        asm.push(ret_zero());
        asm.push(Item::Padding { boundary: 256 });
        asm.define_label("ramstart").unwrap();
        asm.push(Item::Data(vec![0; 4]));
        asm.define_label("extstart").unwrap();
        asm.push(Item::Data(vec![0; 4]));
        asm.define_label("endmem").unwrap();
    }

    #[test]
    fn minimal_image() {
        let mut asm = Assembler::new();
        tiny_program(&mut asm);
        let image = asm.finish().unwrap();

        let header = Header::unpack(&image).unwrap();
        assert_eq!(header.start_func, 36);
        assert_eq!(header.ramstart, 256);
        assert_eq!(header.extstart, 260);
        assert_eq!(header.endmem, 264);
        assert_eq!(image.len(), 260);
        assert!(header.verify_checksum(&image));

        // func_local() then `ret 0`
        assert_eq!(&image[36..41], &[0xc1, 0x00, 0x00, 0x31, 0x00]);
    }

    #[test]
    fn duplicate_label_rejected() {
        let mut asm = Assembler::new();
        asm.define_label("x").unwrap();
        assert!(matches!(asm.define_label("x"), Err(Error::DuplicateLabel(_))));
    }

    #[test]
    fn undefined_label_rejected() {
        let mut asm = Assembler::new();
        asm.define_label("start_func").unwrap();
        asm.push(ret_zero());
        assert!(matches!(asm.finish(), Err(Error::UndefinedLabel(_))));
    }

    #[test]
    fn relaxation_widens_forward_references() {
        let mut asm = Assembler::new();
        asm.set_stack_size(0x100);
        asm.define_label("start_func").unwrap();
        asm.push(Item::Func(FuncHeader::new(CallingConvention::LocalArgs, vec![])));
        // An absolute reference to a label that ends up past 0x7fff: the
        // reference starts out one byte wide and must grow to four.
        asm.push(Item::Instr(AsmInstr::new(
            Opcode::Jumpabs,
            vec![AsmOperand::Ref(LabelRef::new("far", RefKind::Absolute, None))],
        )));
        asm.push(Item::Data(vec![0; 0x8000]));
        asm.define_label("far").unwrap();
        asm.push(ret_zero());
        asm.push(Item::Padding { boundary: 256 });
        asm.define_label("ramstart").unwrap();
        asm.push(Item::Data(vec![0; 4]));
        asm.define_label("extstart").unwrap();
        asm.define_label("endmem").unwrap();
        let image = asm.finish().unwrap();

        let header = Header::unpack(&image).unwrap();
        // jumpabs is at 39: two-byte prefix, one mode byte, then the target
        assert_eq!(&image[39..41], &[0x81, 0x04]);
        assert_eq!(image[41], 0x03, "operand should have relaxed to width 4");
        let target = u32::from_be_bytes([image[42], image[43], image[44], image[45]]);
        assert_eq!(target, 0x8000 + 46);
        assert!(header.verify_checksum(&image));
    }

    #[test]
    fn relaxation_reaches_fixed_point() {
        let mut asm = Assembler::new();
        asm.set_stack_size(0x100);
        asm.define_label("start_func").unwrap();
        asm.push(Item::Func(FuncHeader::new(CallingConvention::LocalArgs, vec![])));
        for _ in 0..4 {
            asm.push(Item::Instr(AsmInstr::new(
                Opcode::Jumpabs,
                vec![AsmOperand::Ref(LabelRef::new("end", RefKind::Absolute, None))],
            )));
        }
        asm.push(Item::Data(vec![0; 300]));
        asm.define_label("end").unwrap();
        asm.push(ret_zero());
        asm.push(Item::Padding { boundary: 256 });
        asm.define_label("ramstart").unwrap();
        asm.define_label("extstart").unwrap();
        asm.define_label("endmem").unwrap();
        let image = asm.finish().unwrap();

        // all four references agree on the final address of `end`
        let header = Header::unpack(&image).unwrap();
        assert!(header.verify_checksum(&image));
        let mut at = 39;
        for _ in 0..4 {
            assert_eq!(&image[at..at + 3], &[0x81, 0x04, 0x02]);
            let target = u16::from_be_bytes([image[at + 3], image[at + 4]]) as usize;
            assert_eq!(&image[target..target + 2], &[0x31, 0x00]);
            at += 5;
        }
    }
}
