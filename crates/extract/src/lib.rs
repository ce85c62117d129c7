//! # DocSentry Extract
//!
//! Content extraction and fingerprinting for the indexing pipeline.
//!
//! Every file gets a SHA-256 fingerprint of its raw bytes, whether or not
//! its text can be parsed; exact-duplicate detection never depends on a
//! parser succeeding. Text extraction dispatches on a closed set of
//! [`FileKind`] variants chosen by a pure classification function.
//!
//! ## Pipeline
//!
//! ```text
//! Path
//!   ├──> classify()      (extension tables + UTF-8 sniff)
//!   ├──> fingerprint_file()   (streaming SHA-256, always)
//!   └──> extract()       (per-format text, normalized)
//! ```

mod error;
mod extractor;
mod fingerprint;
mod kind;

pub use error::{ExtractError, Result};
pub use extractor::{extract, extract_text, Extraction};
pub use fingerprint::{fingerprint_bytes, fingerprint_file};
pub use kind::{classify, FileKind};
