//! The native inference boundary.
//!
//! This module defines the [`InferenceBackend`] trait every local engine
//! binding implements, the [`InferenceCapability`] object that records
//! whether such a binding exists in this process, and [`KeywordBackend`],
//! a deterministic heuristic engine used when no real model library is
//! linked.
//!
//! # Architecture
//!
//! ```text
//! InferenceCapability --backend()--> Arc<dyn InferenceBackend>
//!                                          |
//!        load(path, params) --> RawHandle  |  (0 = failure)
//!        run(handle, prompt, max_tokens, cancel) --> String
//!        unload(handle)
//! ```
//!
//! Raw handles never leave [`crate::model`]; everything else talks to the
//! lifecycle manager.

pub mod capability;
pub mod keyword;
pub mod trait_def;

pub use capability::InferenceCapability;
pub use keyword::KeywordBackend;
pub use trait_def::{BackendError, InferenceBackend, LoadParams, NULL_HANDLE, RawHandle};
