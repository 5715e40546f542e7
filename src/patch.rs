use std::ops::Range;

use itertools::Itertools;

use crate::{error::PatchError, signature::Signature};

/// Decodes a patch payload such as `"B8 06 00 00 00"`.
///
/// All whitespace is ignored. An odd digit count is reported before any
/// invalid character; character positions count bytes of the
/// whitespace-stripped digits.
pub fn parse_patch_hex(text: &str) -> Result<Vec<u8>, PatchError> {
    let digits = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>();

    let bytes = hex::decode(&digits).map_err(|err| match err {
        hex::FromHexError::InvalidHexCharacter { c, index } => PatchError::InvalidHexCharacter {
            character: c,
            index,
        },
        hex::FromHexError::OddLength | hex::FromHexError::InvalidStringLength => {
            PatchError::OddLength {
                digits: digits.len(),
            }
        }
    })?;
    if bytes.is_empty() {
        return Err(PatchError::EmptyPatch);
    }
    Ok(bytes)
}

/// Space separated upper-case hex, the way bytes are shown in reports.
pub fn format_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).join(" ")
}

/// Bytes to write and where to write them, relative to the start of a match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchSpec {
    bytes: Vec<u8>,
    offset: isize,
}

/// Result of a scan-and-patch that did not fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatchStatus {
    Applied(PatchOutcome),
    /// The signature does not occur in the buffer. The buffer is untouched.
    NotFound,
}

impl PatchStatus {
    pub fn outcome(&self) -> Option<&PatchOutcome> {
        match self {
            PatchStatus::Applied(outcome) => Some(outcome),
            PatchStatus::NotFound => None,
        }
    }
}

/// What was written where.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchOutcome {
    pub match_offset: usize,
    pub write_offset: usize,
    pub original: Vec<u8>,
    pub patched: Vec<u8>,
}

impl PatchOutcome {
    pub fn write_range(&self) -> Range<usize> {
        self.write_offset..self.write_offset + self.patched.len()
    }

    /// Checks that `buffer` holds the new bytes at the write offset.
    pub fn verify(&self, buffer: &[u8]) -> bool {
        buffer.get(self.write_range()) == Some(self.patched.as_slice())
    }
}

impl PatchSpec {
    pub fn new(bytes: Vec<u8>, offset: isize) -> Result<Self, PatchError> {
        if bytes.is_empty() {
            return Err(PatchError::EmptyPatch);
        }
        Ok(Self { bytes, offset })
    }

    pub fn from_hex(text: &str, offset: isize) -> Result<Self, PatchError> {
        Self::new(parse_patch_hex(text)?, offset)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn offset(&self) -> isize {
        self.offset
    }

    /// Range the payload would occupy for a match at `match_offset`, or
    /// `None` if any part of it falls outside `0..buffer_len`.
    pub fn write_range(&self, match_offset: usize, buffer_len: usize) -> Option<Range<usize>> {
        let start = match_offset.checked_add_signed(self.offset)?;
        let end = start.checked_add(self.bytes.len())?;
        (end <= buffer_len).then_some(start..end)
    }

    /// Finds the leftmost match of `signature` and overwrites the payload
    /// at the match offset plus [`PatchSpec::offset`].
    ///
    /// The patch lands in `buffer` itself, so the mutated buffer is the one
    /// passed in; the returned [`PatchOutcome`] only carries offsets and the
    /// old and new bytes. `buffer` is only written when
    /// `Ok(PatchStatus::Applied(_))` is returned; every error leaves it
    /// byte-for-byte unchanged.
    pub fn apply(&self, buffer: &mut [u8], signature: &Signature) -> Result<PatchStatus, PatchError> {
        if self.bytes.is_empty() {
            return Err(PatchError::EmptyPatch);
        }

        let Some(match_offset) = signature.find(buffer) else {
            return Ok(PatchStatus::NotFound);
        };

        let range = self
            .write_range(match_offset, buffer.len())
            .ok_or(PatchError::OutOfBounds {
                match_offset,
                offset: self.offset,
                len: self.bytes.len(),
                buffer_len: buffer.len(),
            })?;

        let target = &mut buffer[range.clone()];
        let original = target.to_vec();
        target.copy_from_slice(&self.bytes);

        Ok(PatchStatus::Applied(PatchOutcome {
            match_offset,
            write_offset: range.start,
            original,
            patched: self.bytes.clone(),
        }))
    }
}

/// Free-standing form of [`PatchSpec::apply`] taking a raw payload.
pub fn apply_patch(
    buffer: &mut [u8],
    signature: &Signature,
    payload: &[u8],
    offset: isize,
) -> Result<PatchStatus, PatchError> {
    PatchSpec::new(payload.to_vec(), offset)?.apply(buffer, signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUFFER: [u8; 10] = [0x41, 0x83, 0xF9, 0x07, 0x0F, 0x87, 0x12, 0x34, 0x56, 0x78];

    fn ja_signature() -> Signature {
        Signature::compile("41 83 F9 07 0F 87 ?? ?? ?? ??").unwrap()
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_patch_hex("0F 86").unwrap(), vec![0x0F, 0x86]);
        assert_eq!(
            parse_patch_hex("b8 06 00\n00 00").unwrap(),
            vec![0xB8, 0x06, 0x00, 0x00, 0x00]
        );
        assert_eq!(parse_patch_hex("0f86").unwrap(), vec![0x0F, 0x86]);
    }

    #[test]
    fn test_parse_hex_errors() {
        assert_eq!(
            parse_patch_hex("0F 8"),
            Err(PatchError::OddLength { digits: 3 })
        );
        assert_eq!(
            parse_patch_hex("0F ZZ"),
            Err(PatchError::InvalidHexCharacter {
                character: 'Z',
                index: 2
            })
        );
        assert_eq!(
            parse_patch_hex("0F 8Z"),
            Err(PatchError::InvalidHexCharacter {
                character: 'Z',
                index: 3
            })
        );
        // Length is checked before characters.
        assert_eq!(
            parse_patch_hex("ZZZ"),
            Err(PatchError::OddLength { digits: 3 })
        );
        assert_eq!(parse_patch_hex(""), Err(PatchError::EmptyPatch));
        assert_eq!(parse_patch_hex("  \t"), Err(PatchError::EmptyPatch));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(&[0x0F, 0x87, 0x00]), "0F 87 00");
        assert_eq!(format_bytes(&[]), "");
    }

    #[test]
    fn test_apply_jump_flip() {
        let mut buffer = BUFFER;
        let spec = PatchSpec::from_hex("0F 86", 4).unwrap();
        let status = spec.apply(&mut buffer, &ja_signature()).unwrap();

        let outcome = status.outcome().unwrap();
        assert_eq!(outcome.match_offset, 0);
        assert_eq!(outcome.write_offset, 4);
        assert_eq!(outcome.original, vec![0x0F, 0x87]);
        assert_eq!(outcome.patched, vec![0x0F, 0x86]);
        assert_eq!(outcome.write_range(), 4..6);
        assert!(outcome.verify(&buffer));
        assert_eq!(
            buffer,
            [0x41, 0x83, 0xF9, 0x07, 0x0F, 0x86, 0x12, 0x34, 0x56, 0x78]
        );

        // The jump no longer matches once flipped.
        assert_eq!(
            spec.apply(&mut buffer, &ja_signature()),
            Ok(PatchStatus::NotFound)
        );
    }

    #[test]
    fn test_apply_at_later_match() {
        let mut buffer = vec![0x90; 6];
        buffer.extend_from_slice(&BUFFER);
        let status = apply_patch(&mut buffer, &ja_signature(), &[0xEB], 5).unwrap();
        let outcome = status.outcome().unwrap();
        assert_eq!(outcome.match_offset, 6);
        assert_eq!(outcome.write_offset, 11);
        assert_eq!(buffer[11], 0xEB);
    }

    #[test]
    fn test_empty_payload() {
        let mut buffer = BUFFER;
        assert_eq!(
            apply_patch(&mut buffer, &ja_signature(), &[], 4),
            Err(PatchError::EmptyPatch)
        );
        assert_eq!(PatchSpec::from_hex("", 4), Err(PatchError::EmptyPatch));
        assert_eq!(buffer, BUFFER);
    }

    #[test]
    fn test_short_buffer_not_found() {
        let mut buffer = [0x41, 0x83, 0xF9];
        assert_eq!(
            apply_patch(&mut buffer, &ja_signature(), &[0x0F, 0x86], 4),
            Ok(PatchStatus::NotFound)
        );
        assert_eq!(buffer, [0x41, 0x83, 0xF9]);
    }

    #[test]
    fn test_negative_offset() {
        let mut buffer = vec![0xAA, 0xBB];
        buffer.extend_from_slice(&BUFFER);
        let status = apply_patch(&mut buffer, &ja_signature(), &[0xCC], -2).unwrap();
        assert_eq!(status.outcome().unwrap().write_offset, 0);
        assert_eq!(buffer[..3], [0xCCu8, 0xBB, 0x41]);
    }

    #[test]
    fn test_out_of_bounds() {
        let mut buffer = BUFFER;

        assert_eq!(
            apply_patch(&mut buffer, &ja_signature(), &[0x00], -1),
            Err(PatchError::OutOfBounds {
                match_offset: 0,
                offset: -1,
                len: 1,
                buffer_len: 10
            })
        );
        assert_eq!(
            apply_patch(&mut buffer, &ja_signature(), &[0x00, 0x00], 9),
            Err(PatchError::OutOfBounds {
                match_offset: 0,
                offset: 9,
                len: 2,
                buffer_len: 10
            })
        );
        assert_eq!(
            apply_patch(&mut buffer, &ja_signature(), &[0x00], isize::MAX),
            Err(PatchError::OutOfBounds {
                match_offset: 0,
                offset: isize::MAX,
                len: 1,
                buffer_len: 10
            })
        );
        assert_eq!(buffer, BUFFER);

        // Exactly touching the end is fine.
        assert!(apply_patch(&mut buffer, &ja_signature(), &[0x00, 0x00], 8).is_ok());
    }

    #[test]
    fn test_write_range() {
        let spec = PatchSpec::new(vec![1, 2, 3], -4).unwrap();
        assert_eq!(spec.write_range(3, 100), None);
        assert_eq!(spec.write_range(4, 100), Some(0..3));
        assert_eq!(spec.write_range(10, 8), None);
        assert_eq!(spec.write_range(10, 9), Some(6..9));
    }
}
