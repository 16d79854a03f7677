use super::{Disassembly, RomOp};
use crate::glulx::{CallingConvention, Header, Instruction, Operand, Param};
use std::collections::{BTreeMap, HashSet};
use std::io::{self, Write};

/// Print a disassembly in the textual form the assembler accepts
///
/// Reassembling the output reproduces the input image byte for byte: label
/// operands always carry their original encoded width, non-canonical
/// operands are printed with an explicit width, and raw data is emitted in
/// chunks that never straddle a label or a decoded operation.
pub fn write_listing<W: Write>(dis: &Disassembly, data: &[u8], out: &mut W) -> io::Result<()> {
    let header = &dis.header;
    let extstart = header.extstart as usize;
    let labels = discover_labels(dis, extstart);

    let (major, minor, patch) = header.version_parts();
    writeln!(out, "version({},{},{})", major, minor, patch)?;
    writeln!(out, "stack_size({:#010x})", header.stack_size)?;

    let mut offset = Header::SIZE;
    loop {
        if let Some(names) = labels.get(&(offset as u32)) {
            for name in names {
                writeln!(out, "label(\"{}\")  # {:08x}", name, offset)?;
            }
        }
        if offset == extstart {
            break;
        }

        match &dis.ops[offset] {
            None => {
                let end = raw_chunk_end(dis, &labels, offset, extstart);
                let values: Vec<String> =
                    data[offset..end].iter().map(|byte| format!("{:3}", byte)).collect();
                let preview: String = data[offset..end]
                    .iter()
                    .map(|byte| if (32..=126).contains(byte) { *byte as char } else { '.' })
                    .collect();
                writeln!(out, "\tdb({})  # {}  {:08x}", values.join(","), preview, offset)?;
                offset = end;
            }
            Some(op @ RomOp::Instr(instr)) => {
                let args = instruction_args(instr, offset as u32, header, &labels);
                writeln!(
                    out,
                    "\t{}({})  # {:08x}",
                    instr.opcode.mnemonic(),
                    args.join(", "),
                    offset
                )?;
                offset += op.encoded_len();
            }
            Some(op @ RomOp::Func(func)) => {
                writeln!(out)?;
                writeln!(
                    out,
                    "# Function at offset {:08x} (code starts at {:08x})",
                    offset,
                    offset + op.encoded_len()
                )?;
                let directive = match func.convention {
                    CallingConvention::StackArgs => "func_stack",
                    CallingConvention::LocalArgs => "func_local",
                };
                let pieces: Vec<String> = func
                    .locals
                    .iter()
                    .map(|(width, count)| format!("({},{})", width, count))
                    .collect();
                writeln!(out, "\t{}({})", directive, pieces.join(", "))?;
                offset += op.encoded_len();
            }
        }

        // Region boundaries are re-established on reassembly by an
        // alignment directive, which only reproduces the image when the
        // boundary actually is aligned.
        if (offset == header.ramstart as usize || offset == extstart) && offset % 256 == 0 {
            writeln!(out, "pad(256)")?;
        }
    }

    writeln!(out, "fill({})", header.endmem - header.extstart)?;
    if header.endmem % 256 == 0 {
        writeln!(out, "pad(256)")?;
    }
    writeln!(out, "label(\"endmem\")")?;
    writeln!(out, "eof()")?;
    Ok(())
}

/// Addresses worth a label: every address referenced by an operand that is
/// also the start of something (an operation or a raw byte), named `l1...`
/// in address order, plus the fixed section markers.
fn discover_labels(dis: &Disassembly, extstart: usize) -> BTreeMap<u32, Vec<String>> {
    let header = &dis.header;
    let mut can_label = HashSet::new();
    let mut has_label = HashSet::new();

    let mut offset = Header::SIZE;
    while offset < extstart {
        can_label.insert(offset as u32);
        match &dis.ops[offset] {
            None => offset += 1,
            Some(op) => {
                if let RomOp::Instr(instr) = op {
                    if let Some(target) = instr.target(offset as u32) {
                        has_label.insert(target);
                    }
                    for (param, operand) in instr.opcode.params().iter().zip(&instr.operands) {
                        if operand.is_mem_ref() {
                            has_label.insert(operand.raw_value());
                        }
                        if operand.is_ram_ref() {
                            has_label.insert(header.ramstart.wrapping_add(operand.raw_value()));
                        }
                        if operand.is_immediate() && *param == Param::MemAddr {
                            has_label.insert(operand.raw_value());
                        }
                    }
                }
                offset += op.encoded_len();
            }
        }
    }

    let mut positions: Vec<u32> = has_label.intersection(&can_label).copied().collect();
    positions.sort_unstable();
    let mut labels: BTreeMap<u32, Vec<String>> = BTreeMap::new();
    for (index, position) in positions.iter().enumerate() {
        labels.insert(*position, vec![format!("l{}", index + 1)]);
    }

    let mut sections: Vec<(u32, &str)> = vec![
        (Header::SIZE as u32, "romstart"),
        (header.start_func, "start_func"),
    ];
    if header.decoding_tbl != 0 {
        sections.push((header.decoding_tbl, "decoding_tbl"));
    }
    sections.push((header.ramstart, "ramstart"));
    sections.push((header.extstart, "extstart"));
    for (position, name) in sections {
        labels.entry(position).or_default().push(name.to_owned());
    }

    labels
}

/// A raw chunk runs to the next label, decoded operation, or 16-byte cap
fn raw_chunk_end(
    dis: &Disassembly,
    labels: &BTreeMap<u32, Vec<String>>,
    offset: usize,
    extstart: usize,
) -> usize {
    let mut end = offset + 1;
    while end < offset + 16
        && end < extstart
        && !labels.contains_key(&(end as u32))
        && dis.ops[end].is_none()
    {
        end += 1;
    }
    end
}

/// Render one instruction's operands, substituting labels back in
fn instruction_args(
    instr: &Instruction,
    offset: u32,
    header: &Header,
    labels: &BTreeMap<u32, Vec<String>>,
) -> Vec<String> {
    let name_at = |address: u32| labels.get(&address).map(|names| names[0].as_str());
    let len = instr.encoded_len() as u32;

    instr
        .opcode
        .params()
        .iter()
        .zip(&instr.operands)
        .map(|(param, operand)| match operand {
            Operand::Imm { value, width } => {
                // a relative branch displacement points here:
                let dest = offset.wrapping_add(len).wrapping_add(*value as u32).wrapping_sub(2);
                if *param == Param::Branch && name_at(dest).is_some() {
                    format!("lb(\"{}\", {})", name_at(dest).unwrap_or_default(), width)
                } else if matches!(param, Param::AbsBranch | Param::FuncRef)
                    && name_at(*value as u32).is_some()
                {
                    format!("la(\"{}\", {})", name_at(*value as u32).unwrap_or_default(), width)
                } else if *param == Param::MemAddr && name_at(*value as u32).is_some() {
                    format!("limm(\"{}\", {})", name_at(*value as u32).unwrap_or_default(), width)
                } else if operand.is_canonical() {
                    format!("{}", value)
                } else {
                    format!("imm({},{})", value, width)
                }
            }
            Operand::Mem { addr, width } => match name_at(*addr) {
                Some(name) => format!("lmem(\"{}\", {})", name, width),
                None if operand.is_canonical() => format!("mem({})", addr),
                None => format!("mem({},{})", addr, width),
            },
            Operand::Ram { offset: relative, width } => {
                match name_at(header.ramstart.wrapping_add(*relative)) {
                    Some(name) => format!("lram(\"{}\", {})", name, width),
                    None if operand.is_canonical() => format!("ram({})", relative),
                    None => format!("ram({},{})", relative, width),
                }
            }
            Operand::Local { offset: slot, width } => {
                if operand.is_canonical() {
                    format!("loc({})", slot)
                } else {
                    format!("loc({},{})", slot, width)
                }
            }
            Operand::Stack => "stk()".to_owned(),
        })
        .collect()
}
