/// Kind of one parameter slot in an opcode's signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    /// Loaded value
    Load,
    /// Loaded value interpreted as a memory address
    MemAddr,
    /// Stored result
    Store,
    /// Relative branch target, or the return-false/return-true sentinels 0/1
    Branch,
    /// Absolute branch target
    AbsBranch,
    /// Function address
    FuncRef,
}

// One table drives everything: the enum itself, number <-> variant,
// mnemonic <-> variant, and the operand signature. Keeping these in a single
// place is what lets the assembler and disassembler agree by construction.
macro_rules! opcode_table {
    ($(($num:literal, $variant:ident, $mnemonic:literal, [$($param:ident),*]),)+) => {
        /// A Glulx opcode
        ///
        /// The set is closed: every opcode the format defines is a variant
        /// here, and every variant carries its numeric value, mnemonic, and
        /// parameter signature through the lookup methods below.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $($variant,)+
        }

        impl Opcode {
            /// Numeric opcode value as encoded in an image
            pub fn number(self) -> u32 {
                match self {
                    $(Opcode::$variant => $num,)+
                }
            }

            /// Look an opcode up by its numeric value
            pub fn from_number(num: u32) -> Option<Opcode> {
                match num {
                    $($num => Some(Opcode::$variant),)+
                    _ => None,
                }
            }

            /// Textual mnemonic used in the assembly form
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$variant => $mnemonic,)+
                }
            }

            /// Look an opcode up by mnemonic
            pub fn from_mnemonic(mnemonic: &str) -> Option<Opcode> {
                match mnemonic {
                    $($mnemonic => Some(Opcode::$variant),)+
                    _ => None,
                }
            }

            /// Fixed operand signature
            pub fn params(self) -> &'static [Param] {
                match self {
                    $(Opcode::$variant => &[$(Param::$param),*],)+
                }
            }
        }
    };
}

opcode_table![
    (0x00, Nop, "nop", []),
    (0x10, Add, "add", [Load, Load, Store]),
    (0x11, Sub, "sub", [Load, Load, Store]),
    (0x12, Mul, "mul", [Load, Load, Store]),
    (0x13, Div, "div", [Load, Load, Store]),
    (0x14, Mod, "mod", [Load, Load, Store]),
    (0x15, Neg, "neg", [Load, Store]),
    (0x18, Bitand, "bitand", [Load, Load, Store]),
    (0x19, Bitor, "bitor", [Load, Load, Store]),
    (0x1A, Bitxor, "bitxor", [Load, Load, Store]),
    (0x1B, Bitnot, "bitnot", [Load, Store]),
    (0x1C, Shiftl, "shiftl", [Load, Load, Store]),
    (0x1D, Sshiftr, "sshiftr", [Load, Load, Store]),
    (0x1E, Ushiftr, "ushiftr", [Load, Load, Store]),
    (0x20, Jump, "jump", [Branch]),
    (0x22, Jz, "jz", [Load, Branch]),
    (0x23, Jnz, "jnz", [Load, Branch]),
    (0x24, Jeq, "jeq", [Load, Load, Branch]),
    (0x25, Jne, "jne", [Load, Load, Branch]),
    (0x26, Jlt, "jlt", [Load, Load, Branch]),
    (0x27, Jge, "jge", [Load, Load, Branch]),
    (0x28, Jgt, "jgt", [Load, Load, Branch]),
    (0x29, Jle, "jle", [Load, Load, Branch]),
    (0x2A, Jltu, "jltu", [Load, Load, Branch]),
    (0x2B, Jgeu, "jgeu", [Load, Load, Branch]),
    (0x2C, Jgtu, "jgtu", [Load, Load, Branch]),
    (0x2D, Jleu, "jleu", [Load, Load, Branch]),
    (0x30, Call, "call", [FuncRef, Load, Store]),
    (0x31, Ret, "ret", [Load]),
    (0x32, Catch, "catch", [Store, Branch]),
    (0x33, Throw, "throw", [Load, Load]),
    (0x34, Tailcall, "tailcall", [FuncRef, Load]),
    (0x40, Copy, "copy", [Load, Store]),
    (0x41, Copys, "copys", [Load, Store]),
    (0x42, Copyb, "copyb", [Load, Store]),
    (0x44, Sexs, "sexs", [Load, Store]),
    (0x45, Sexb, "sexb", [Load, Store]),
    (0x48, Aload, "aload", [MemAddr, Load, Store]),
    (0x49, Aloads, "aloads", [MemAddr, Load, Store]),
    (0x4A, Aloadb, "aloadb", [MemAddr, Load, Store]),
    (0x4B, Aloadbit, "aloadbit", [MemAddr, Load, Store]),
    (0x4C, Astore, "astore", [MemAddr, Load, Load]),
    (0x4D, Astores, "astores", [MemAddr, Load, Load]),
    (0x4E, Astoreb, "astoreb", [MemAddr, Load, Load]),
    (0x4F, Astorebit, "astorebit", [MemAddr, Load, Load]),
    (0x50, Stkcount, "stkcount", [Store]),
    (0x51, Stkpeek, "stkpeek", [Load, Store]),
    (0x52, Stkswap, "stkswap", []),
    (0x53, Stkroll, "stkroll", [Load, Load]),
    (0x54, Stkcopy, "stkcopy", [Load]),
    (0x70, Streamchar, "streamchar", [Load]),
    (0x71, Streamnum, "streamnum", [Load]),
    (0x72, Streamstr, "streamstr", [MemAddr]),
    (0x73, Streamunichar, "streamunichar", [Load]),
    (0x100, Gestalt, "gestalt", [Load, Load, Store]),
    (0x101, Debugtrap, "debugtrap", [Load]),
    (0x102, Getmemsize, "getmemsize", [Store]),
    (0x103, Setmemsize, "setmemsize", [Load, Store]),
    (0x104, Jumpabs, "jumpabs", [AbsBranch]),
    (0x110, Random, "random", [Load, Store]),
    (0x111, Setrandom, "setrandom", [Load]),
    (0x120, Quit, "quit", []),
    (0x121, Verify, "verify", [Store]),
    (0x122, Restart, "restart", []),
    (0x123, Save, "save", [Load, Store]),
    (0x124, Restore, "restore", [Load, Store]),
    (0x125, Saveundo, "saveundo", [Store]),
    (0x126, Restoreundo, "restoreundo", [Store]),
    (0x127, Protect, "protect", [Load, Load]),
    (0x130, Glk, "glk", [Load, Load, Store]),
    (0x140, Getstringtbl, "getstringtbl", [Store]),
    (0x141, Setstringtbl, "setstringtbl", [MemAddr]),
    (0x148, Getiosys, "getiosys", [Store, Store]),
    (0x149, Setiosys, "setiosys", [Load, Load]),
    (0x150, Linearsearch, "linearsearch", [MemAddr, Load, MemAddr, Load, Load, Load, Load, Store]),
    (0x151, Binarysearch, "binarysearch", [MemAddr, Load, MemAddr, Load, Load, Load, Load, Store]),
    (0x152, Linkedsearch, "linkedsearch", [MemAddr, Load, MemAddr, Load, Load, Load, Store]),
    (0x160, Callf, "callf", [FuncRef, Store]),
    (0x161, Callfi, "callfi", [FuncRef, Load, Store]),
    (0x162, Callfii, "callfii", [FuncRef, Load, Load, Store]),
    (0x163, Callfiii, "callfiii", [FuncRef, Load, Load, Load, Store]),
    (0x170, Mzero, "mzero", [Load, MemAddr]),
    (0x171, Mcopy, "mcopy", [Load, MemAddr, MemAddr]),
    (0x178, Malloc, "malloc", [Load, Store]),
    (0x179, Mfree, "mfree", [Load]),
    (0x180, Accelfunc, "accelfunc", [Load, FuncRef]),
    (0x181, Accelparam, "accelparam", [Load, Load]),
];

impl Opcode {
    /// Does this opcode unconditionally end a straight-line run of
    /// instructions?
    ///
    /// This is the set both the exploratory decoder and the flow analyzer
    /// treat as block terminators: controlled function exits and
    /// unconditional transfers.
    pub fn ends_block(self) -> bool {
        matches!(
            self,
            Opcode::Tailcall
                | Opcode::Ret
                | Opcode::Throw
                | Opcode::Jump
                | Opcode::Jumpabs
                | Opcode::Quit
                | Opcode::Restart
        )
    }

    /// Is this one of the direct stack-manipulation opcodes (`stk*`)?
    pub fn manipulates_stack(self) -> bool {
        matches!(
            self,
            Opcode::Stkcount
                | Opcode::Stkpeek
                | Opcode::Stkswap
                | Opcode::Stkroll
                | Opcode::Stkcopy
        )
    }
}
