//! Detached OpenPGP verification for repository metadata.
//!
//! Mirrors verify the origin's `repomd.xml`/`Release` against the armored
//! signature and public-key siblings published next to it. Package
//! signatures are out of scope; only repository metadata is checked.

pub mod error;
pub mod verify;

pub use error::{SignerError, SignerResult};
pub use verify::verify_detached;
