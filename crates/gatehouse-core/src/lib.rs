//! Core types and trait definitions for the Gatehouse site-access subsystem.
//!
//! This crate is free of HTTP and database dependencies. It owns the access
//! event model, the vehicle movement state machine, the occupancy projection
//! and the [`service::GateService`] that ties them to a storage backend and an
//! identity directory.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod cpf;
pub mod credential;
pub mod directory;
pub mod error;
pub mod event;
pub mod movement;
pub mod occupancy;
pub mod service;
pub mod store;
pub mod visitor;

pub use error::{Error, ErrorClass, Result};
