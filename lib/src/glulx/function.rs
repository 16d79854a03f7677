use super::DecodeError;

/// How a function receives its arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallingConvention {
    /// Tag 0xC0: arguments stay on the virtual stack, count on top
    StackArgs,
    /// Tag 0xC1: arguments are copied into the local-variable frame
    LocalArgs,
}

impl CallingConvention {
    pub fn tag(self) -> u8 {
        match self {
            CallingConvention::StackArgs => 0xc0,
            CallingConvention::LocalArgs => 0xc1,
        }
    }

    pub fn from_tag(tag: u8) -> Option<CallingConvention> {
        match tag {
            0xc0 => Some(CallingConvention::StackArgs),
            0xc1 => Some(CallingConvention::LocalArgs),
            _ => None,
        }
    }
}

/// A function header: calling convention plus the run-length-encoded local
/// variable frame layout
///
/// The frame layout is a list of `(width, count)` groups - `count` locals of
/// `width` bytes each - terminated on the wire by a `(0, 0)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncHeader {
    pub convention: CallingConvention,
    pub locals: Vec<(u8, u8)>,
}

impl FuncHeader {
    pub fn new(convention: CallingConvention, locals: Vec<(u8, u8)>) -> FuncHeader {
        FuncHeader { convention, locals }
    }

    /// Encoded size: tag byte, the local groups, and the terminator pair
    pub fn encoded_len(&self) -> usize {
        1 + 2 * self.locals.len() + 2
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.convention.tag());
        for (width, count) in &self.locals {
            out.push(*width);
            out.push(*count);
        }
        out.push(0);
        out.push(0);
    }

    /// Try to decode a function header starting at `offset`
    ///
    /// Returns the header and its encoded length. Rejects a bad tag, a local
    /// width outside {1, 2, 4}, a zero repeat count, and truncation; the
    /// exploratory scanner treats all of these as "not a function here".
    pub fn decode(data: &[u8], offset: usize) -> Result<(FuncHeader, usize), DecodeError> {
        let tag = *data.get(offset).ok_or(DecodeError::Truncated)?;
        let convention =
            CallingConvention::from_tag(tag).ok_or(DecodeError::BadFunctionType(tag))?;

        let mut locals = vec![];
        let mut at = offset + 1;
        while at + 2 <= data.len() {
            let width = data[at];
            let count = data[at + 1];
            at += 2;
            if width == 0 && count == 0 {
                return Ok((FuncHeader { convention, locals }, at - offset));
            }
            if !matches!(width, 1 | 2 | 4) || count == 0 {
                return Err(DecodeError::MalformedLocals);
            }
            locals.push((width, count));
        }
        Err(DecodeError::Truncated)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trip() {
        let func = FuncHeader::new(CallingConvention::LocalArgs, vec![(4, 3), (1, 2)]);
        let mut bytes = vec![];
        func.encode(&mut bytes);
        assert_eq!(bytes, vec![0xc1, 4, 3, 1, 2, 0, 0]);
        assert_eq!(bytes.len(), func.encoded_len());

        let (decoded, used) = FuncHeader::decode(&bytes, 0).unwrap();
        assert_eq!(decoded, func);
        assert_eq!(used, bytes.len());
    }

    #[test]
    fn empty_frame() {
        let func = FuncHeader::new(CallingConvention::StackArgs, vec![]);
        let mut bytes = vec![];
        func.encode(&mut bytes);
        assert_eq!(bytes, vec![0xc0, 0, 0]);
    }

    #[test]
    fn rejects_malformed() {
        // wrong tag
        assert_eq!(
            FuncHeader::decode(&[0xc2, 0, 0], 0),
            Err(DecodeError::BadFunctionType(0xc2))
        );
        // width 3 is not a legal local width
        assert_eq!(
            FuncHeader::decode(&[0xc1, 3, 1, 0, 0], 0),
            Err(DecodeError::MalformedLocals)
        );
        // zero count before the terminator
        assert_eq!(
            FuncHeader::decode(&[0xc1, 4, 0, 0, 0], 0),
            Err(DecodeError::MalformedLocals)
        );
        // missing terminator
        assert_eq!(
            FuncHeader::decode(&[0xc1, 4, 1], 0),
            Err(DecodeError::Truncated)
        );
    }
}
