//! Whole-pipeline round trips: assemble a program, disassemble the image,
//! reassemble the listing, and demand the exact same bytes back.

use glulx_tools::glulx::{Header, Opcode};
use glulx_tools::{analyze, asm, container, disasm};

/// Assemble, disassemble, print, reassemble; returns (image, listing)
fn round_trip(source: &str) -> (Vec<u8>, String) {
    let image = asm::assemble(source).expect("assembly should succeed");
    let dis = disasm::disassemble(&image).expect("disassembly should succeed");
    let mut text = vec![];
    disasm::write_listing(&dis, &image, &mut text).expect("listing should succeed");
    let listing = String::from_utf8(text).expect("listing should be UTF-8");
    let again = asm::assemble(&listing).expect("reassembly should succeed");
    assert_eq!(again, image, "reassembled image differs from the original");
    (image, listing)
}

const MINIMAL: &str = r#"
version(3,1,1)
stack_size(0x100)
label("romstart")
label("start_func")
	func_local()
	ret(0)
fill(215)
label("ramstart")
	db(0, 0, 0, 0)
label("extstart")
fill(4)
label("endmem")
eof()
"#;

#[test]
fn minimal_image_round_trips() {
    let (image, listing) = round_trip(MINIMAL);

    let header = Header::unpack(&image).unwrap();
    assert_eq!(header.ramstart, 256);
    assert_eq!(header.extstart, 260);
    assert_eq!(header.endmem, 264);
    assert_eq!(header.start_func, 36);
    assert_eq!(image.len(), 260);
    assert!(header.verify_checksum(&image));

    // the single local-argument function and its `ret 0`
    assert_eq!(&image[36..41], &[0xc1, 0x00, 0x00, 0x31, 0x00]);
    assert!(listing.contains("\tfunc_local()"));
    assert!(listing.contains("\tret(0)  # 00000027"));
}

const BRANCHY: &str = r#"
version(3,1,1)
stack_size(0x00000400)
label("romstart")
label("start_func")
	func_stack((4,2))
	copy(1, stk())
	jz(stk(), lb("ret_path", 1))
	aload(lmem("table", 2), 0, stk())
	add(stk(), 3, loc(0))
	jump(lb("done", 1))
label("ret_path")
	copy(2, loc(4))
label("done")
	ret(loc(0))
label("table")
	dd(7, 8, 9)
fill(177)
label("ramstart")
	db(1, 2, 3, 4)
label("extstart")
fill(252)
label("endmem")
eof()
"#;

#[test]
fn branchy_function_round_trips() {
    let (image, listing) = round_trip(BRANCHY);

    // the exploratory pass follows both the branch and the fallthrough
    let dis = disasm::disassemble(&image).unwrap();
    for offset in [41, 44, 47, 52, 57, 60, 64] {
        assert!(
            matches!(dis.ops[offset], Some(disasm::RomOp::Instr(_))),
            "expected an instruction at offset {}",
            offset
        );
    }
    assert!(dis.ops[67].is_none(), "the data table is not code");

    // discovered labels stand in for the original names
    assert!(listing.contains("lb(\"l1\", 1)"));
    assert!(listing.contains("lmem(\"l3\", 2)"));
}

#[test]
fn recovered_function_is_analyzable() {
    let image = asm::assemble(BRANCHY).unwrap();
    let dis = disasm::disassemble(&image).unwrap();

    let mut function = vec![];
    let mut offset = 41;
    while let Some(disasm::RomOp::Instr(instr)) = &dis.ops[offset] {
        function.push((offset as u32, instr.clone()));
        offset += instr.encoded_len();
    }
    assert_eq!(function.len(), 7);
    assert_eq!(function[6].1.opcode, Opcode::Ret);

    let analysis = analyze::analyze(&function).unwrap();
    assert!(analysis.heights.iter().all(Option::is_some));
    assert_eq!(analysis.range, 0..1);
}

#[test]
fn wrapped_image_unwraps_to_the_same_bytes() {
    let image = asm::assemble(MINIMAL).unwrap();

    let mut wrapped = vec![];
    wrapped.extend_from_slice(b"FORM");
    wrapped.extend_from_slice(&((4 + 8 + image.len()) as u32).to_be_bytes());
    wrapped.extend_from_slice(b"IFRS");
    wrapped.extend_from_slice(b"GLUL");
    wrapped.extend_from_slice(&(image.len() as u32).to_be_bytes());
    wrapped.extend_from_slice(&image);

    let inner = container::unwrap(&wrapped).unwrap();
    assert_eq!(inner, &image[..]);
    assert!(disasm::disassemble(inner).is_ok());
}

#[test]
fn corrupted_image_is_rejected_whole() {
    let mut image = asm::assemble(MINIMAL).unwrap();
    image[0] = b'X';
    assert!(matches!(
        disasm::disassemble(&image),
        Err(disasm::Error::BadMagic(_))
    ));
}
