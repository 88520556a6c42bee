//! Where-clause support: compile the clause list against a plan, then evaluate it row by
//! row over the ordered buffers.

pub mod compile;
pub mod comparator;
pub mod evaluate;

pub use compile::{compile_filter, CompiledClause, CompiledFilter};
pub use comparator::{coerce_number, coerce_string, compare, EvalError};
pub use evaluate::apply_filter;
