//! Workflow Domain Types for Flowdeck
//!
//! A workflow in Flowdeck is a user-authored, ordered list of typed
//! steps plus an optional recurrence schedule. These types describe
//! both the static side (templates) and the dynamic side (runs).
//!
//! # Key Concepts
//!
//! - **WorkflowTemplate**: A reusable process definition: an ordered
//!   sequence of [`StepDef`]s and an optional [`Schedule`]. Insertion
//!   order is execution order.
//! - **StepDef**: One typed step. A closed sum over agent tasks,
//!   human gates, and document outputs ([`StepKind`]).
//! - **WorkflowRun**: One execution of a template. Carries its own
//!   immutable snapshot of the template's steps, so a run always
//!   completes against the plan it started with.
//! - **StepResult**: Per-step progress, keyed by stable step id,
//!   never by array index.
//! - **GateResponse**: A human's answer to a gate step (approve,
//!   reject, select, or free-text input).
//!
//! # Design Principles
//!
//! 1. Runs execute against their snapshot. Template edits never leak
//!    into an in-flight run.
//! 2. Step results key on stable step ids so a result survives
//!    template reordering between runs.
//! 3. These types record state; transition policy lives in the engine.

#![deny(unsafe_code)]

mod errors;
mod run;
mod schedule;
mod template;

pub use errors::*;
pub use run::*;
pub use schedule::*;
pub use template::*;
