//! Canonical domain model for the dynamic application engine.
//!
//! # Responsibility
//! - Define the aggregate shapes shared by registry, store, projector and
//!   workflow code.
//! - Keep payload coercion and definition validation next to the data they
//!   protect.
//!
//! # Invariants
//! - Every aggregate is identified by a stable UUID that is never reused.
//! - Deletion of apps and records is represented by explicit lifecycle
//!   state, not by dropping rows.

pub mod actor;
pub mod app;
pub mod audit;
pub mod field;
pub mod process;
pub mod record;
pub mod view;
