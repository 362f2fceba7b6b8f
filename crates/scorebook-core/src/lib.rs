//! Core types, storage traits, and the average/ranking recomputation engine
//! for Scorebook.
//!
//! This crate has no HTTP or database dependencies.
//! Storage backends implement the traits in [`store`]; the engine in
//! [`engine`] only ever talks to those traits, so it runs unchanged against
//! SQLite or the in-memory [`memory::MemoryStore`].

// Native `async fn` in trait impls; the traits themselves spell out `Send`.
#![allow(async_fn_in_trait)]

pub mod average;
pub mod book;
pub mod code;
pub mod engine;
pub mod error;
pub mod memory;
pub mod ranking;
pub mod report;
pub mod school;
pub mod score;
pub mod store;

pub use error::{Error, Result, ServiceError};

#[cfg(test)]
mod fixture;
