//! Stride core: turns a free-form user request into one structured
//! goal/task [`action::Action`].
//!
//! # Pipeline
//!
//! ```text
//! user text + context
//!     |
//!     v
//! prompt::build_prompt ---> model::ModelLifecycleManager::run ---> raw text
//!                                  (backend::InferenceBackend)         |
//!                                                                      v
//!                                                  response::parse_response
//!                                                                      |
//!                 fallback::parse_command  <---- on any failure -------+
//!                          |
//!                          v
//!                   resolver::ActionResolver  ==> Action
//! ```
//!
//! The model stage is optional: when the native backend is missing, no
//! model is selected, or generation fails, the deterministic command
//! cascade in [`fallback`] still produces an action.

pub mod action;
pub mod backend;
pub mod fallback;
pub mod model;
pub mod prompt;
pub mod resolver;
pub mod response;
