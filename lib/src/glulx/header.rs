use super::DecodeError;
use byteorder::{BigEndian, ByteOrder};

/// The magic constant in the first four bytes of every image
pub const MAGIC: u32 = 0x476c_756c;

/// The fixed 36-byte record at the start of an image
///
/// The header is the sole owner of the memory-layout boundaries: `ramstart`
/// splits read-only from writable memory, `extstart` is where the file ends
/// (memory beyond it is zero-filled at load), `endmem` is the total memory
/// size. Every other entity's offsets are interpreted relative to these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: u32,
    /// Packed `major << 16 | minor << 8 | patch`
    pub version: u32,
    pub ramstart: u32,
    pub extstart: u32,
    pub endmem: u32,
    pub stack_size: u32,
    pub start_func: u32,
    pub decoding_tbl: u32,
    pub checksum: u32,
}

impl Header {
    /// Encoded size in bytes
    pub const SIZE: usize = 36;

    pub fn pack_version(major: u16, minor: u8, patch: u8) -> u32 {
        (major as u32) << 16 | (minor as u32) << 8 | patch as u32
    }

    /// Split the packed version into (major, minor, patch)
    pub fn version_parts(&self) -> (u16, u8, u8) {
        ((self.version >> 16) as u16, (self.version >> 8) as u8, self.version as u8)
    }

    /// Serialize the nine header words
    pub fn pack(&self) -> [u8; Header::SIZE] {
        let mut out = [0u8; Header::SIZE];
        let words = [
            self.magic,
            self.version,
            self.ramstart,
            self.extstart,
            self.endmem,
            self.stack_size,
            self.start_func,
            self.decoding_tbl,
            self.checksum,
        ];
        for (i, word) in words.iter().enumerate() {
            BigEndian::write_u32(&mut out[4 * i..], *word);
        }
        out
    }

    /// Deserialize a header from the start of `data`
    pub fn unpack(data: &[u8]) -> Result<Header, DecodeError> {
        if data.len() < Header::SIZE {
            return Err(DecodeError::Truncated);
        }
        let word = |i: usize| BigEndian::read_u32(&data[4 * i..]);
        Ok(Header {
            magic: word(0),
            version: word(1),
            ramstart: word(2),
            extstart: word(3),
            endmem: word(4),
            stack_size: word(5),
            start_func: word(6),
            decoding_tbl: word(7),
            checksum: word(8),
        })
    }

    /// Additive checksum of the header words themselves, `checksum` excluded
    fn header_checksum(&self) -> u32 {
        self.magic
            .wrapping_add(self.version)
            .wrapping_add(self.ramstart)
            .wrapping_add(self.extstart)
            .wrapping_add(self.endmem)
            .wrapping_add(self.stack_size)
            .wrapping_add(self.start_func)
            .wrapping_add(self.decoding_tbl)
    }

    /// Checksum over the header fields plus every 32-bit word of
    /// `[36, extstart)` in `data`
    pub fn calculate_checksum(&self, data: &[u8]) -> u32 {
        let mut sum = self.header_checksum();
        let mut at = Header::SIZE;
        while at + 4 <= data.len() && at < self.extstart as usize {
            sum = sum.wrapping_add(BigEndian::read_u32(&data[at..]));
            at += 4;
        }
        sum
    }

    pub fn update_checksum(&mut self, data: &[u8]) {
        self.checksum = self.calculate_checksum(data);
    }

    pub fn verify_checksum(&self, data: &[u8]) -> bool {
        self.checksum == self.calculate_checksum(data)
    }
}

impl Default for Header {
    fn default() -> Header {
        Header {
            magic: MAGIC,
            version: Header::pack_version(3, 1, 1),
            ramstart: 0,
            extstart: 0,
            endmem: 0,
            stack_size: 0,
            start_func: 0,
            decoding_tbl: 0,
            checksum: 0,
        }
    }
}
