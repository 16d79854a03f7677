//! Toolchain for the bytecode of the Glulx 32-bit virtual machine
//!
//! The crate is split into four parts that mirror the lifecycle of a story
//! file:
//!
//!   - [`glulx`] is the shared instruction/operand model: the header, the
//!     opcode table, and the encoding and decoding of individual operations
//!   - [`asm`] assembles a textual program description into a binary image,
//!     iteratively relaxing operand widths until label references converge
//!   - [`disasm`] recovers functions, instructions, and raw data from a
//!     binary image with no symbol information, and prints them back out in
//!     the textual form `asm` accepts
//!   - [`analyze`] computes a control-flow graph and stack-height assignment
//!     for one function, used to decide whether virtual-stack traffic can be
//!     promoted to fixed storage

pub mod analyze;
pub mod asm;
pub mod container;
pub mod disasm;
pub mod glulx;
