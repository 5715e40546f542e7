use std::{fmt, str::FromStr};

use itertools::Itertools;

use crate::{error::SignatureError, scanner::Scanner};

/// Token standing in for any byte.
pub const WILDCARD: &str = "??";

/// A unit of comparison. Runs of concrete bytes are packed into the widest
/// native-endian word that fits, runs of wildcards collapse into a skip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Atom {
    LongLong(u64),
    Long(u32),
    Short(u16),
    Byte(u8),
    Mask(usize),
}

impl Atom {
    fn from_bytes(mut bytes: &[u8]) -> Vec<Self> {
        let mut atoms = Vec::new();
        while !bytes.is_empty() {
            let (atom, size) = if let Some(word) = bytes.first_chunk::<8>() {
                (Self::LongLong(u64::from_ne_bytes(*word)), 8)
            } else if let Some(word) = bytes.first_chunk::<4>() {
                (Self::Long(u32::from_ne_bytes(*word)), 4)
            } else if let Some(word) = bytes.first_chunk::<2>() {
                (Self::Short(u16::from_ne_bytes(*word)), 2)
            } else {
                (Self::Byte(bytes[0]), 1)
            };
            atoms.push(atom);
            bytes = &bytes[size..];
        }
        atoms
    }

    pub fn size(&self) -> usize {
        match self {
            Atom::LongLong(_) => 8,
            Atom::Long(_) => 4,
            Atom::Short(_) => 2,
            Atom::Byte(_) => 1,
            Atom::Mask(len) => *len,
        }
    }

    /// Compares the atom against the start of `view`. A view too short for
    /// the atom never matches.
    fn matches(&self, view: &[u8]) -> bool {
        match self {
            Atom::LongLong(val) => view
                .first_chunk::<8>()
                .is_some_and(|w| u64::from_ne_bytes(*w) == *val),
            Atom::Long(val) => view
                .first_chunk::<4>()
                .is_some_and(|w| u32::from_ne_bytes(*w) == *val),
            Atom::Short(val) => view
                .first_chunk::<2>()
                .is_some_and(|w| u16::from_ne_bytes(*w) == *val),
            Atom::Byte(val) => view.first() == Some(val),
            Atom::Mask(len) => view.len() >= *len,
        }
    }
}

/// A compiled AOB signature: `N >= 1` slots, each a concrete byte or a
/// wildcard.
///
/// Wildcard slots hold a `0x00` placeholder in [`Signature::bytes`] which is
/// never compared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    bytes: Vec<u8>,
    wildcards: Vec<bool>,
    atoms: Vec<Atom>,
}

impl Signature {
    /// Parses IDA-style text such as `"41 83 F9 07 0F 87 ?? ?? ?? ??"`.
    ///
    /// Tokens are separated by exactly one space, so doubled, leading or
    /// trailing spaces and tabs show up as invalid tokens. Either every
    /// token parses or nothing is returned.
    pub fn compile(text: &str) -> Result<Self, SignatureError> {
        if text.is_empty() {
            return Err(SignatureError::Empty);
        }

        let mut bytes = Vec::new();
        let mut masked = Vec::new();

        for (index, token) in text.split(' ').enumerate() {
            if token == WILDCARD {
                masked.push(index);
                bytes.push(0);
                continue;
            }

            let invalid = || SignatureError::InvalidToken {
                index,
                token: token.to_string(),
            };
            // `from_str_radix` alone would also take "+F" or a lone digit.
            if token.len() != 2 || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            bytes.push(u8::from_str_radix(token, 16).map_err(|_| invalid())?);
        }

        Self::from_bytes(&bytes, &masked)
    }

    /// Builds a signature from raw bytes, treating every position listed in
    /// `mask_bytes` as a wildcard.
    pub fn from_bytes(bytes: &[u8], mask_bytes: &[usize]) -> Result<Self, SignatureError> {
        if bytes.is_empty() {
            return Err(SignatureError::Empty);
        }
        if let Some(&index) = mask_bytes.iter().find(|&&idx| idx >= bytes.len()) {
            return Err(SignatureError::WildcardOutOfRange {
                index,
                len: bytes.len(),
            });
        }

        let wildcards = (0..bytes.len())
            .map(|idx| mask_bytes.contains(&idx))
            .collect::<Vec<bool>>();
        let bytes = bytes
            .iter()
            .zip(&wildcards)
            .map(|(&b, &masked)| if masked { 0 } else { b })
            .collect::<Vec<u8>>();

        let atoms = bytes
            .iter()
            .zip(&wildcards)
            .group_by(|(_, masked)| **masked)
            .into_iter()
            .map(|(m, g)| (m, g.map(|(b, _)| *b).collect::<Vec<u8>>()))
            .flat_map(|(masked, segment)| match masked {
                true => vec![Atom::Mask(segment.len())],
                false => Atom::from_bytes(&segment),
            })
            .collect();

        Ok(Self {
            bytes,
            wildcards,
            atoms,
        })
    }

    /// Number of slots, wildcards included.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Never true for a compiled signature.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn is_wildcard(&self, idx: usize) -> bool {
        self.wildcards.get(idx).copied().unwrap_or(false)
    }

    pub fn wildcard_count(&self) -> usize {
        self.wildcards.iter().filter(|&&m| m).count()
    }

    /// True when `view` starts with bytes satisfying every concrete slot.
    pub fn is_matching(&self, mut view: &[u8]) -> bool {
        if view.len() < self.len() {
            return false;
        }
        self.atoms.iter().all(|atom| {
            let hit = atom.matches(view);
            view = &view[atom.size()..];
            hit
        })
    }

    /// Every match in ascending offset order.
    pub fn scan<'a>(&self, haystack: &'a [u8]) -> Scanner<'a, '_> {
        Scanner::new(self, haystack)
    }

    /// Leftmost match, if any. A haystack shorter than the signature never
    /// matches.
    pub fn find(&self, haystack: &[u8]) -> Option<usize> {
        self.scan(haystack).next().map(|(pos, _)| pos)
    }
}

impl FromStr for Signature {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::compile(s)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .bytes
            .iter()
            .zip(&self.wildcards)
            .map(|(b, &masked)| match masked {
                true => WILDCARD.to_string(),
                false => format!("{b:02X}"),
            })
            .join(" ");
        f.write_str(&text)
    }
}
