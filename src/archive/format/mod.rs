//! On-disk structure of MDict 1.x/2.x archives.
//!
//! - [`header`]: XML header and passcode handling
//! - [`index`]: key and record block indexes
//! - [`content`]: block decoding and key entry parsing

pub mod content;
pub mod header;
pub mod index;
