//! Unwrap an archival container around a story image
//!
//! Story files are sometimes distributed inside an IFF `FORM` container
//! (form type `IFRS`) whose `GLUL` chunk holds the actual image. The unwrap
//! step yields the chunk's bytes unchanged; input that is not wrapped at all
//! passes straight through untouched.

use byteorder::{BigEndian, ByteOrder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A chunk's declared length runs past the end of the container
    TruncatedChunk { offset: usize },

    /// A well-formed container with no `GLUL` chunk in it
    NoStoryChunk,
}

/// Extract the story image from `data`, unwrapping a container if present
pub fn unwrap(data: &[u8]) -> Result<&[u8], Error> {
    if data.len() < 12 || &data[0..4] != b"FORM" || &data[8..12] != b"IFRS" {
        return Ok(data);
    }

    let mut at = 12;
    while at + 8 <= data.len() {
        let kind = &data[at..at + 4];
        let len = BigEndian::read_u32(&data[at + 4..]) as usize;
        let body = at + 8;
        if len > data.len() - body {
            return Err(Error::TruncatedChunk { offset: at });
        }
        if kind == b"GLUL" {
            return Ok(&data[body..body + len]);
        }
        // chunk bodies are padded to even lengths
        at = body + len + (len & 1);
    }
    Err(Error::NoStoryChunk)
}
