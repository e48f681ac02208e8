//! Patch a disassembled entry class so that constructing it loads a native
//! library.
//!
//! [`locate`] finds the class's `.smali` document in a decoded tree,
//! [`inject`] splices the `System.loadLibrary` call into its constructor and
//! repairs `.locals`, and [`pipeline`] ties the two together with write-back
//! and alternative-target retry.

pub mod buffer;
pub mod config;
pub mod document;
pub mod error;
pub mod inject;
pub mod locate;
pub mod pipeline;
pub mod report;
pub mod smali;

pub use error::Error;
