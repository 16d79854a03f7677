//! The exploratory disassembler
//!
//! ### The problem
//!
//! A story image has no symbol table: the read-only region is an unknown mix
//! of function headers, instructions, string tables, and raw data. The
//! disassembler walks the region speculatively - at each unclaimed offset it
//! tries to decode a function header followed by a plausible first
//! instruction, explores the function body along its control flow if that
//! works, and otherwise classifies a single byte as raw data and moves on.
//! Local decode failures are diagnostics, never fatal; only structural
//! problems with the image itself (bad magic, bad checksum, impossible
//! layout) abort the pass.
//!
//! ### Output
//!
//! [`disassemble`] produces a [`Disassembly`]: the header plus an
//! offset-indexed table of decoded operations. [`write_listing`] prints it
//! in the textual form the assembler accepts, with discovered labels
//! substituted back into branch and memory operands so that reassembling
//! the listing reproduces the image byte for byte.

mod explore;
mod listing;

pub use explore::*;
pub use listing::*;

#[derive(Debug)]
pub enum Error {
    /// First four bytes are not the magic constant
    BadMagic(u32),

    /// Image smaller than the minimum (256 bytes) or not a whole number of
    /// 32-bit words
    BadImageSize(usize),

    /// Image too small to hold the fixed header
    TruncatedHeader,

    /// Header layout boundaries that cannot describe this image
    BadLayout { ramstart: u32, extstart: u32, endmem: u32 },

    /// Stored checksum does not match the image contents
    ChecksumMismatch { stored: u32, computed: u32 },

    Container(crate::container::Error),

    Io(std::io::Error),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<crate::container::Error> for Error {
    fn from(err: crate::container::Error) -> Error {
        Error::Container(err)
    }
}
