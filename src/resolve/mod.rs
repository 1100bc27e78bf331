//! Fixed-point resolution of declarations whose types depend on other
//! declarations.
//!
//! The declaration builder records an [`UnresolvedItem`] for every piece of
//! work that needs inference: untyped initializers, member assignments,
//! function returns, callback parameters and generic `for` variables. The
//! [`ResolveAnalyzer`] settles them in passes, tracking what each pending
//! item waits on in a [`DependencyGraph`].

mod analyzer;
pub mod control_flow;
mod dependency_graph;
mod unresolved;

pub use analyzer::{analyze, ResolveAnalyzer};
pub use dependency_graph::DependencyGraph;
pub use unresolved::{ResolveState, UnresolvedItem, UnresolvedKind};
