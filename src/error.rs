use thiserror::Error;

/// Errors raised while compiling a signature.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature is empty")]
    Empty,

    /// A token was neither two hex digits nor `??`.
    #[error("invalid signature token {token:?} at index {index}")]
    InvalidToken { index: usize, token: String },

    #[error("wildcard index {index} is out of range for a {len} byte signature")]
    WildcardOutOfRange { index: usize, len: usize },
}

/// Errors raised while parsing or applying a patch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("patch hex has an odd number of digits ({digits})")]
    OddLength { digits: usize },

    #[error("invalid hex character {character:?} at position {index} in patch")]
    InvalidHexCharacter { character: char, index: usize },

    #[error("patch data is empty")]
    EmptyPatch,

    /// `offset` is relative to the match, `len` is the payload length.
    #[error(
        "patch of {len} bytes at offset {offset:+} from match {match_offset:#x} \
         falls outside the {buffer_len} byte buffer"
    )]
    OutOfBounds {
        match_offset: usize,
        offset: isize,
        len: usize,
        buffer_len: usize,
    },
}
