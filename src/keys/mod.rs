//! Authorized keys file management.
//!
//! - [`editor`] - pure region transforms and the file editor
//! - [`writer`] - the single-writer queue every edit goes through

pub mod editor;
pub mod writer;

pub use editor::{
    KeyEntry, KeyFileEditor, KeyOperation, KeySet, Line, REGION_FOOTER, REGION_HEADER,
};
pub use writer::{FailureHook, KeyWriter};
