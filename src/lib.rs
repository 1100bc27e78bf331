//! Declaration resolution and type inference for annotated Lua.
//!
//! A [`Compilation`] holds parsed documents, their declaration trees and the
//! project-wide [`TypeIndex`]. Types of expressions are answered on demand by
//! a [`SearchContext`]; declarations whose types depend on each other are
//! settled ahead of time by the resolve analyzer.
//!
//! ```
//! use luanext_analysis::{Compilation, LuaType};
//!
//! let mut compilation = Compilation::default();
//! let doc = compilation.add_document("main.lua", "local n = 1 + 2");
//! let tree = compilation.syntax(doc).unwrap();
//! let expr = tree.find_expr("1 + 2").unwrap();
//!
//! let mut ctx = compilation.search_context();
//! let ty = ctx.infer(luanext_analysis::SyntaxRef::new(doc, expr));
//! assert_eq!(ty, LuaType::Integer);
//! ```

pub mod compilation;
pub mod config;
pub mod declaration;
pub mod diagnostics;
pub mod errors;
pub mod index;
pub mod inference;
pub mod metrics;
pub mod resolve;
pub mod stdlib;
pub mod syntax;
pub mod types;

pub use compilation::{Compilation, Document};
pub use config::{AnalysisConfig, AnalysisOptions, ConfigOverrides};
pub use declaration::{DeclId, DeclKind, DeclRef, Declaration, DeclarationTree};
pub use diagnostics::{CollectingDiagnosticHandler, Diagnostic, DiagnosticHandler, DiagnosticLevel};
pub use errors::AnalysisError;
pub use index::{NamedKind, TypeEntry, TypeIndex};
pub use inference::{MemberKey, SearchContext};
pub use metrics::{InferenceStats, ResolveReport};
pub use syntax::{DocumentId, NodeId, SyntaxRef, SyntaxTree};
pub use types::{format_type, FormatOptions, LuaType, Signature, TypeCompatibility};
