//! On-demand type inference.
//!
//! A [`SearchContext`] answers "what is the type of this node" for any
//! expression or annotation in a compilation, memoizing every answer for the
//! lifetime of the query session.

mod call;
mod context;
pub mod doc_type;
mod expression;
mod members;

pub use context::SearchContext;
pub use expression::ReturnSummary;
pub use members::MemberKey;
