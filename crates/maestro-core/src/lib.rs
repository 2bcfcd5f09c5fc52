//! Core types and error definitions for the Maestro orchestration core.
//!
//! This crate provides the foundational types shared by the orchestrator and
//! its front ends: the error taxonomy, participant identifiers and priorities.
//!
//! # Main types
//!
//! - [`MaestroError`]: Unified error enum for all Maestro subsystems.
//! - [`MaestroResult`]: Convenience alias for `Result<T, MaestroError>`.
//! - [`AgentId`]: Identifier of a worker or coordinator on the message hub.
//! - [`TaskPriority`] / [`MessagePriority`]: Work and delivery priorities.

/// Error taxonomy.
pub mod error;
/// Participant identifiers.
pub mod ids;
/// Task and message priorities.
pub mod priority;

pub use error::{MaestroError, MaestroResult};
pub use ids::AgentId;
pub use priority::{MessagePriority, TaskPriority};
