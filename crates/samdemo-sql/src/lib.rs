//! Config-driven SQL expression builders.
//!
//! Builders resolve distributions through [`samdemo_core::ConfigAccessor`]
//! and return structured [`SqlExpr`] trees; text is produced once, by
//! `Display`. Missing configuration never fails a build: it degrades to an
//! ELSE-only expression or `NULL`.

pub mod builders;
pub mod expr;

pub use builders::ExpressionBuilder;
pub use expr::{Condition, Literal, SqlExpr, When};
