//! Core domain types for the WorkInCZ session layer.
//!
//! This crate provides the identifier types shared by the session crate and
//! its composition roots.

pub mod id;

pub use id::{ActionId, Identity, JobId, ParseIdError, SubscriberId};
