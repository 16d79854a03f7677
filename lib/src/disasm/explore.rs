use super::Error;
use crate::glulx::{FuncHeader, Header, Instruction, Opcode, MAGIC};
use byteorder::{BigEndian, ByteOrder};

/// One decoded operation in the read-only region
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RomOp {
    Func(FuncHeader),
    Instr(Instruction),
}

impl RomOp {
    pub fn encoded_len(&self) -> usize {
        match self {
            RomOp::Func(func) => func.encoded_len(),
            RomOp::Instr(instr) => instr.encoded_len(),
        }
    }
}

/// Result of an exploratory pass over one image
///
/// `ops` is indexed by byte offset; a `Some` entry marks the first byte of a
/// decoded operation. Offsets covered by no entry are raw data (or the
/// interior bytes of an operation that starts earlier).
pub struct Disassembly {
    pub header: Header,
    pub ops: Vec<Option<RomOp>>,
}

/// Recover every recognizable function in the read-only region of `data`
///
/// Structural problems (size, magic, layout, checksum) are fatal; everything
/// else degrades to raw data with a diagnostic.
pub fn disassemble(data: &[u8]) -> Result<Disassembly, Error> {
    if data.len() < 256 || data.len() % 4 != 0 {
        return Err(Error::BadImageSize(data.len()));
    }
    let header = Header::unpack(data).map_err(|_| Error::TruncatedHeader)?;
    if header.magic != MAGIC {
        return Err(Error::BadMagic(header.magic));
    }
    if header.ramstart < Header::SIZE as u32
        || header.ramstart > header.extstart
        || header.extstart > header.endmem
        || header.extstart as usize > data.len()
    {
        return Err(Error::BadLayout {
            ramstart: header.ramstart,
            extstart: header.extstart,
            endmem: header.endmem,
        });
    }
    if !header.verify_checksum(data) {
        return Err(Error::ChecksumMismatch {
            stored: header.checksum,
            computed: header.calculate_checksum(data),
        });
    }

    let mut ops: Vec<Option<RomOp>> = vec![None; data.len()];
    let mut skipped: Vec<u8> = vec![];
    let mut offset = Header::SIZE;
    while offset < header.ramstart as usize {
        // The string-decoding table is length-prefixed; skip it wholesale
        // rather than trying to decode instructions out of Huffman nodes.
        if header.decoding_tbl != 0
            && offset == header.decoding_tbl as usize
            && offset + 4 <= data.len()
        {
            let table_len = BigEndian::read_u32(&data[offset..]) as usize;
            if table_len > 0 {
                offset += table_len;
                continue;
            }
            log::warn!(
                "string-decoding table at {:#010x} declares a zero length; scanning it as data",
                offset
            );
        }

        if ops[offset].is_none() {
            try_decode_function(data, offset, &mut ops);
        }

        match &ops[offset] {
            None => {
                skipped.push(data[offset]);
                offset += 1;
            }
            Some(op) => {
                flush_skipped(&mut skipped, offset);
                offset += op.encoded_len();
            }
        }
    }

    Ok(Disassembly { header, ops })
}

/// Warn about a flushed run of raw bytes, unless it looks like padding
///
/// Pure zero runs are alignment padding, and whatever immediately follows
/// the header is usually a string table; neither deserves noise.
fn flush_skipped(skipped: &mut Vec<u8>, offset: usize) {
    if skipped.is_empty() {
        return;
    }
    let start = offset - skipped.len();
    if skipped.iter().any(|byte| *byte != 0) && start != Header::SIZE {
        let mut preview: String = skipped
            .iter()
            .take(10)
            .map(|byte| format!("{:02x} ", byte))
            .collect();
        preview.pop();
        if skipped.len() > 10 {
            preview.push_str("..");
        }
        log::warn!(
            "skipped {} bytes ({}) at offset {:#010x}",
            skipped.len(),
            preview,
            start
        );
    }
    skipped.clear();
}

/// Try to decode a whole function starting at `start`
///
/// A candidate is accepted only if a well-formed function header is followed
/// by a decodable first instruction that is not `nop` - data and padding
/// produce a lot of spurious `nop`s (zero bytes), and a real function never
/// opens with one.
fn try_decode_function(data: &[u8], start: usize, ops: &mut [Option<RomOp>]) -> bool {
    let Ok((func, func_len)) = FuncHeader::decode(data, start) else {
        return false;
    };
    let code_start = start + func_len;
    let Ok((first, _)) = Instruction::decode(data, code_start) else {
        return false;
    };
    if first.opcode == Opcode::Nop {
        return false;
    }

    ops[start] = Some(RomOp::Func(func));
    explore_body(data, code_start, ops);
    true
}

/// Worklist traversal of one function body
///
/// Every popped offset decodes one instruction; branch targets are queued,
/// and the lexically next offset is queued unless the instruction is a
/// block terminator. Offsets already visited (in this traversal or an
/// earlier function's) are never re-queued.
fn explore_body(data: &[u8], start: usize, ops: &mut [Option<RomOp>]) {
    let mut todo = vec![start];
    let mut seen = vec![false; data.len()];
    seen[start] = true;

    while let Some(offset) = todo.pop() {
        let (instr, len) = match Instruction::decode(data, offset) {
            Ok(decoded) => decoded,
            Err(err) => {
                log::warn!(
                    "failed to decode instruction at offset {:#010x}: {:?}",
                    offset,
                    err
                );
                continue;
            }
        };

        let mut branches = vec![];
        if let Some(target) = instr.branch_target(offset as u32) {
            if target as usize >= data.len() {
                log::warn!(
                    "invalid branch target {:#010x} at offset {:#010x}",
                    target,
                    offset
                );
            } else {
                branches.push(target as usize);
            }
        }

        let next = offset + len;
        if !instr.opcode.ends_block() {
            branches.push(next);
        } else if FuncHeader::decode(data, next).is_err() {
            // The block ended, but if the following bytes still look like an
            // instruction (and not a new function or padding), assume they
            // are reachable through a branch we have not decoded yet.
            if let Ok((next_instr, _)) = Instruction::decode(data, next) {
                if next_instr.opcode != Opcode::Nop {
                    branches.push(next);
                }
            }
        }

        ops[offset] = Some(RomOp::Instr(instr));

        for target in branches {
            if !seen[target] && ops[target].is_none() {
                seen[target] = true;
                todo.push(target);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::asm;

    #[test]
    fn all_zero_rom_is_classified_as_data() {
        let source = "\
version(3,1,1)
stack_size(0x100)
label(\"start_func\")
fill(220)
label(\"ramstart\")
pad(256)
label(\"extstart\")
label(\"endmem\")
eof()
";
        let image = asm::assemble(source).unwrap();
        assert_eq!(image.len(), 256);
        let dis = disassemble(&image).unwrap();
        assert!(dis.ops[36..256].iter().all(Option::is_none));
    }

    #[test]
    fn function_starting_with_nop_is_rejected() {
        let source = "\
version(3,1,1)
stack_size(0x100)
label(\"start_func\")
func_local()
nop()
ret(0)
fill(214)
label(\"ramstart\")
pad(256)
label(\"extstart\")
label(\"endmem\")
eof()
";
        let image = asm::assemble(source).unwrap();
        let dis = disassemble(&image).unwrap();
        // the header at 36 is a false-positive candidate: well-formed, but
        // its first instruction is nop, so the whole region stays raw
        assert!(dis.ops[36].is_none());
    }

    #[test]
    fn simple_function_is_recovered() {
        let source = "\
version(3,1,1)
stack_size(0x100)
label(\"start_func\")
func_local()
ret(0)
fill(215)
label(\"ramstart\")
pad(256)
label(\"extstart\")
label(\"endmem\")
eof()
";
        let image = asm::assemble(source).unwrap();
        let dis = disassemble(&image).unwrap();
        assert!(matches!(dis.ops[36], Some(RomOp::Func(_))));
        match &dis.ops[39] {
            Some(RomOp::Instr(instr)) => assert_eq!(instr.opcode, Opcode::Ret),
            other => panic!("expected ret at offset 39, found {:?}", other),
        }
    }

    #[test]
    fn decoding_table_region_is_skipped() {
        let source = "\
version(3,1,1)
stack_size(0x100)
label(\"start_func\")
func_local()
ret(0)
label(\"decoding_tbl\")
dd(12)
db(0xc1, 0, 0, 0x31, 0, 0, 0, 0)
fill(203)
label(\"ramstart\")
pad(256)
label(\"extstart\")
label(\"endmem\")
eof()
";
        let image = asm::assemble(source).unwrap();
        let header = Header::unpack(&image).unwrap();
        assert_eq!(header.decoding_tbl, 41);
        let dis = disassemble(&image).unwrap();
        // the table bytes would decode as a function if scanned, but the
        // whole declared region is skipped instead
        assert!(dis.ops[41..53].iter().all(Option::is_none));
    }

    #[test]
    fn structural_errors_are_fatal() {
        assert!(matches!(
            disassemble(&[0u8; 255]),
            Err(Error::BadImageSize(255))
        ));
        assert!(matches!(
            disassemble(&vec![0u8; 256]),
            Err(Error::BadMagic(0))
        ));

        let source = "\
version(3,1,1)
stack_size(0x100)
label(\"start_func\")
func_local()
ret(0)
fill(215)
label(\"ramstart\")
pad(256)
label(\"extstart\")
label(\"endmem\")
eof()
";
        let mut image = asm::assemble(source).unwrap();
        image[40] ^= 1;
        assert!(matches!(
            disassemble(&image),
            Err(Error::ChecksumMismatch { .. })
        ));
    }
}
