//! # condeval-logic — JSONLogic-compatible expression interpreter
//!
//! Field conditions are JSON trees in the JSONLogic convention: an object
//! keyed by an operator name whose value is the argument list, with
//! `{"var": "a.b.c"}` reading a dotted path out of the evaluation context.
//!
//! This crate is the pure core of the evaluation pipeline:
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`validate`] | Structural check — shape and bounded depth, no evaluation |
//! | [`evaluate`] | Interpret an expression against a context value |
//! | [`extract_vars`] | Collect every `var` path referenced by an expression |
//!
//! Everything here operates on `serde_json::Value` directly; there is no
//! parallel AST. All functions are pure and safe to call from any number of
//! handlers concurrently. Evaluation never panics: every failure mode is an
//! [`EvalError`].

mod error;
mod eval;
mod validate;
mod vars;

pub use error::EvalError;
pub use eval::{evaluate, truthy};
pub use validate::{validate, MAX_DEPTH};
pub use vars::extract_vars;
