use crate::compilation::Compilation;
use crate::config::MAX_INFER_DEPTH;
use crate::declaration::{DeclKind, DeclRef, TypeSource};
use crate::index::NamedKind;
use crate::metrics::InferenceStats;
use crate::syntax::{NodeId, NodeKind, SyntaxRef, SyntaxTree};
use crate::types::{format_type, FormatOptions, LuaType};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{trace, warn};

use super::doc_type::doc_type;

/// A query session over a compilation snapshot.
///
/// Every inferred node is memoized for the lifetime of the context. A depth
/// counter and an in-progress set keep self-referential programs from
/// recursing without bound; both degrade to `unknown`.
pub struct SearchContext<'c> {
    pub(super) compilation: &'c Compilation,
    cache: FxHashMap<SyntaxRef, LuaType>,
    in_progress: FxHashSet<SyntaxRef>,
    decls_in_progress: FxHashSet<DeclRef>,
    pub(super) returns_in_progress: FxHashSet<SyntaxRef>,
    depth: usize,
    max_depth: usize,
    pub(super) stats: InferenceStats,
}

impl<'c> SearchContext<'c> {
    pub fn new(compilation: &'c Compilation) -> Self {
        Self {
            compilation,
            cache: FxHashMap::with_capacity_and_hasher(64, Default::default()),
            in_progress: FxHashSet::default(),
            decls_in_progress: FxHashSet::default(),
            returns_in_progress: FxHashSet::default(),
            depth: 0,
            max_depth: compilation.options().max_infer_depth.min(MAX_INFER_DEPTH),
            stats: InferenceStats::new(),
        }
    }

    pub fn compilation(&self) -> &'c Compilation {
        self.compilation
    }

    pub fn stats(&self) -> &InferenceStats {
        &self.stats
    }

    /// Forget every memoized result
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn is_cached(&self, node: SyntaxRef) -> bool {
        self.cache.contains_key(&node)
    }

    pub(super) fn evict(&mut self, node: SyntaxRef) {
        self.cache.remove(&node);
    }

    /// Infer the type of an expression or annotation node.
    ///
    /// Never fails: anything that cannot be typed is `unknown`.
    pub fn infer(&mut self, node: SyntaxRef) -> LuaType {
        if let Some(ty) = self.cache.get(&node) {
            self.stats.record_lookup(true);
            return ty.clone();
        }
        self.stats.record_lookup(false);
        if self.depth >= self.max_depth {
            warn!(node = ?node.node, document = %node.document, depth = self.depth, "inference depth limit reached");
            self.stats.record_depth_limit();
            return LuaType::Unknown;
        }
        if !self.in_progress.insert(node) {
            trace!(node = ?node.node, "cycle cut");
            self.stats.record_cycle_cut();
            return LuaType::Unknown;
        }
        self.depth += 1;
        let ty = self.infer_uncached(node);
        self.depth -= 1;
        self.in_progress.remove(&node);
        self.cache.insert(node, ty.clone());
        ty
    }

    fn infer_uncached(&mut self, node: SyntaxRef) -> LuaType {
        let compilation = self.compilation;
        let Some(tree) = compilation.syntax(node.document) else {
            return LuaType::Unknown;
        };
        let kind = tree.kind(node.node);
        trace!(node = ?node.node, kind = kind.label(), "infer");
        if kind.is_doc_type() {
            return doc_type(tree, node.document, node.node);
        }
        match kind {
            NodeKind::NilLit
            | NodeKind::TrueLit
            | NodeKind::FalseLit
            | NodeKind::NumberLit(_)
            | NodeKind::StringLit(_) => self.infer_literal(kind),
            NodeKind::Vararg => self.infer_vararg(tree, node),
            NodeKind::NameExpr(name) => self.infer_name(tree, node, name),
            NodeKind::IndexExpr { .. } => self.infer_index(tree, node),
            NodeKind::CallExpr { .. } => {
                let ty = self.infer_call(tree, node);
                if is_multi_position(tree, node.node) {
                    ty
                } else {
                    ty.first_value()
                }
            }
            NodeKind::ClosureExpr { .. } => self.infer_closure(tree, node),
            NodeKind::TableExpr { fields } => self.infer_table(tree, node, fields),
            NodeKind::UnaryExpr { op, operand } => {
                let operand = self.infer(SyntaxRef::new(node.document, *operand));
                self.infer_unary(*op, operand)
            }
            NodeKind::BinaryExpr { op, lhs, rhs } => {
                let lhs = self.infer(SyntaxRef::new(node.document, *lhs)).first_value();
                let rhs = self.infer(SyntaxRef::new(node.document, *rhs)).first_value();
                self.infer_binary(*op, lhs, rhs)
            }
            NodeKind::ParenExpr(inner) => self.infer(SyntaxRef::new(node.document, *inner)).first_value(),
            _ => LuaType::Unknown,
        }
    }

    /// Value `index` of `expr` as a declaration initialized from it sees it
    pub fn value_of(&mut self, expr: SyntaxRef, index: usize) -> LuaType {
        self.infer(expr).value_at(index)
    }

    /// Type of a declaration: its settled type, or one computed from its
    /// source. The computed type is not stored; only the resolver does that.
    pub fn declaration_type(&mut self, decl: DeclRef) -> LuaType {
        let compilation = self.compilation;
        let Some(declaration) = compilation.decl(decl) else {
            return LuaType::Unknown;
        };
        if let Some(ty) = declaration.ty() {
            return ty.clone();
        }
        if !self.decls_in_progress.insert(decl) {
            self.stats.record_cycle_cut();
            return LuaType::Unknown;
        }
        let ty = match declaration.source {
            TypeSource::Doc { ty, optional } => {
                let ty = self.infer(SyntaxRef::new(decl.document, ty));
                if optional {
                    LuaType::union(ty, LuaType::Nil)
                } else {
                    ty
                }
            }
            TypeSource::Expr { expr, index } => {
                let value = self.value_of(SyntaxRef::new(decl.document, expr), index);
                if declaration.kind.widens_literals() {
                    value.widen()
                } else {
                    value
                }
            }
            TypeSource::None => match declaration.kind {
                DeclKind::Local | DeclKind::Global => LuaType::Nil,
                _ => LuaType::Unknown,
            },
        };
        self.decls_in_progress.remove(&decl);
        ty
    }

    /// Declaration a name expression refers to: the visible local, or the
    /// first global of that name
    pub fn find_declaration(&self, node: SyntaxRef) -> Option<DeclRef> {
        let tree = self.compilation.syntax(node.document)?;
        let decls = self.compilation.declarations(node.document)?;
        if let Some(id) = decls.find_declaration(tree, node.node) {
            return Some(DeclRef::new(node.document, id));
        }
        match tree.kind(node.node) {
            NodeKind::NameExpr(name) => self.compilation.index().globals(name).first().copied(),
            _ => None,
        }
    }

    /// Render a type for hover: a top-level alias shows its origin and long
    /// unions are truncated
    pub fn render_type(&self, ty: &LuaType) -> String {
        let options = FormatOptions::truncated(self.compilation.options().union_render_limit);
        if let LuaType::Named { name, .. } = ty {
            if let Some(entry) = self.compilation.index().find_type_info(name) {
                if entry.kind == NamedKind::Alias {
                    if let Some(origin) = entry.alias_origin() {
                        return format_type(origin, &options);
                    }
                }
            }
        }
        format_type(ty, &options)
    }
}

/// Whether an expression at `node` keeps every value of a multi-value
/// result: the last value of a return, local or assignment list, the last
/// argument of a call, the last positional table field, or a generic `for`
/// iterator list.
pub(super) fn is_multi_position(tree: &SyntaxTree, node: NodeId) -> bool {
    let Some(parent) = tree.parent(node) else {
        return false;
    };
    match tree.kind(parent) {
        NodeKind::ReturnStat { values }
        | NodeKind::LocalStat { values, .. }
        | NodeKind::AssignStat { values, .. } => values.last() == Some(&node),
        NodeKind::CallExpr { args, .. } => args.last() == Some(&node),
        NodeKind::ForInStat { exprs, .. } => exprs.last() == Some(&node),
        NodeKind::TableField {
            key: crate::syntax::FieldKey::Positional,
            ..
        } => {
            let Some(table) = tree.parent(parent) else {
                return false;
            };
            matches!(tree.kind(table), NodeKind::TableExpr { fields } if fields.last() == Some(&parent))
        }
        _ => false,
    }
}
