/// Failure to decode a single operation out of an image
///
/// These are local conditions: during exploratory disassembly they demote
/// the bytes in question to raw data instead of aborting the pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Ran off the end of the buffer mid-operation
    Truncated,

    /// Opcode number not in the instruction table
    UnknownOpcode(u32),

    /// Operand mode nibble 0x4 or 0xC (both reserved)
    ReservedMode(u8),

    /// Function-header tag other than 0xC0/0xC1
    BadFunctionType(u8),

    /// Function-header local group with a width other than 1/2/4, or a zero
    /// repeat count before the terminator
    MalformedLocals,
}
