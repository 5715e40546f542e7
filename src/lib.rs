//! Locate an array-of-bytes signature in a binary and overwrite bytes at an
//! offset relative to the match.
//!
//! ```
//! use binpatch::{PatchSpec, PatchStatus, Signature};
//!
//! let mut data = [0x41u8, 0x83, 0xF9, 0x07, 0x0F, 0x87, 0x12, 0x34, 0x56, 0x78];
//! let signature = Signature::compile("41 83 F9 07 0F 87 ?? ?? ?? ??").unwrap();
//! let patch = PatchSpec::from_hex("0F 86", 4).unwrap();
//!
//! let status = patch.apply(&mut data, &signature).unwrap();
//! assert!(matches!(status, PatchStatus::Applied(ref o) if o.match_offset == 0));
//! assert_eq!(data[5], 0x86);
//! ```
//!
//! The engine only works on in-memory buffers; reading and writing files is
//! left to [`task`].

pub mod error;
pub mod patch;
pub mod scanner;
pub mod signature;
pub mod task;

pub use error::{PatchError, SignatureError};
pub use patch::{apply_patch, format_bytes, parse_patch_hex, PatchOutcome, PatchSpec, PatchStatus};
pub use scanner::Scanner;
pub use signature::{Atom, Signature, WILDCARD};
pub use task::{
    verify_written, BatchSummary, PatchTask, TaskError, TaskList, TaskListError, TaskReport,
};
