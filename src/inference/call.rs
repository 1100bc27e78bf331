//! Call expressions: builtin calls, overload selection and generic
//! instantiation of return types.

use super::SearchContext;
use crate::declaration::DeclKind;
use crate::syntax::{IndexKey, NodeId, NodeKind, SyntaxRef, SyntaxTree};
use crate::types::generics::{bind_templates, instantiate_signature, Substitution};
use crate::types::{LuaType, Signature, TypeCompatibility};
use std::sync::Arc;
use tracing::{debug, trace};

impl<'c> SearchContext<'c> {
    /// Every value a call returns, before the multi-value position rule
    pub(super) fn infer_call(&mut self, tree: &SyntaxTree, node: SyntaxRef) -> LuaType {
        let NodeKind::CallExpr { callee, args } = tree.kind(node.node) else {
            return LuaType::Unknown;
        };
        if let Some(ty) = self.infer_builtin_call(tree, node, *callee, args) {
            return ty;
        }
        let callee_ref = SyntaxRef::new(node.document, *callee);
        let callee_ty = self.infer(callee_ref).first_value();
        let Some(sig) = callee_ty.as_signature().cloned() else {
            return match callee_ty {
                LuaType::Any => LuaType::Any,
                _ => LuaType::Unknown,
            };
        };
        let arg_types = self.call_arguments(tree, node, *callee, args, &sig);
        let chosen = self.select_overload(&sig, &arg_types);
        self.instantiate_returns(&chosen, &arg_types)
    }

    /// `require("mod")` and `setmetatable(t, mt)` when the names are not
    /// shadowed by a local
    fn infer_builtin_call(
        &mut self,
        tree: &SyntaxTree,
        node: SyntaxRef,
        callee: NodeId,
        args: &[NodeId],
    ) -> Option<LuaType> {
        let NodeKind::NameExpr(name) = tree.kind(callee) else {
            return None;
        };
        let shadowed = self
            .find_declaration(SyntaxRef::new(node.document, callee))
            .and_then(|decl| self.compilation.decl(decl))
            .is_some_and(|decl| decl.kind != DeclKind::Global);
        if shadowed {
            return None;
        }
        match name.as_str() {
            "require" => {
                let arg = args.first()?;
                let NodeKind::StringLit(module) = tree.kind(*arg) else {
                    return Some(LuaType::Unknown);
                };
                Some(self.module_export(module))
            }
            "setmetatable" => {
                let target = args.first()?;
                Some(self.infer(SyntaxRef::new(node.document, *target)).first_value())
            }
            _ => None,
        }
    }

    /// Exported type of a module: what its chunk returns
    pub fn module_export(&mut self, module: &str) -> LuaType {
        let compilation = self.compilation;
        let Some(document) = compilation.find_module(module) else {
            debug!(module, "module not found");
            return LuaType::Unknown;
        };
        if let Some(ty) = compilation.index().export_type(document) {
            return ty.clone();
        }
        let Some(tree) = compilation.syntax(document) else {
            return LuaType::Unknown;
        };
        let chunk = SyntaxRef::new(document, tree.root());
        self.infer_body_returns(chunk)
            .returns
            .first()
            .cloned()
            .unwrap_or(LuaType::Nil)
    }

    /// Argument types as the signature sees them: a `:` call passes the
    /// prefix as `self` unless the function was defined with `:`, a `.`
    /// call of a `:` function passes `self` as its first argument
    pub(crate) fn call_arguments(
        &mut self,
        tree: &SyntaxTree,
        node: SyntaxRef,
        callee: NodeId,
        args: &[NodeId],
        sig: &Signature,
    ) -> Vec<LuaType> {
        let mut out: Vec<LuaType> = Vec::with_capacity(args.len() + 1);
        for (i, arg) in args.iter().enumerate() {
            match self.infer(SyntaxRef::new(node.document, *arg)) {
                LuaType::MultiReturn(items) if i + 1 == args.len() => out.extend(items),
                ty => out.push(ty.first_value()),
            }
        }
        let colon_call = matches!(
            tree.kind(callee),
            NodeKind::IndexExpr {
                key: IndexKey::Colon(_),
                ..
            }
        );
        match (colon_call, sig.colon_define) {
            (true, false) => {
                if let NodeKind::IndexExpr { prefix, .. } = tree.kind(callee) {
                    let this = self.infer(SyntaxRef::new(node.document, *prefix)).first_value();
                    out.insert(0, this);
                }
            }
            (false, true) if !out.is_empty() => {
                out.remove(0);
            }
            _ => {}
        }
        out
    }

    /// Parameter of `sig` that argument `arg_index` of a call through
    /// `callee` binds to, after the `self` adjustment
    pub(crate) fn parameter_position(
        tree: &SyntaxTree,
        callee: NodeId,
        sig: &Signature,
        arg_index: usize,
    ) -> Option<usize> {
        let colon_call = matches!(
            tree.kind(callee),
            NodeKind::IndexExpr {
                key: IndexKey::Colon(_),
                ..
            }
        );
        match (colon_call, sig.colon_define) {
            (true, false) => Some(arg_index + 1),
            (false, true) => arg_index.checked_sub(1),
            _ => Some(arg_index),
        }
    }

    /// First candidate whose arity and parameter types accept the call,
    /// falling back to the first with a matching arity
    fn select_overload(&mut self, sig: &Arc<Signature>, args: &[LuaType]) -> Arc<Signature> {
        let candidates = sig.candidates();
        if candidates.len() == 1 {
            return sig.clone();
        }
        let index = self.compilation.index();
        let by_types = candidates.iter().find(|candidate| {
            candidate.accepts_arity(args.len())
                && args.iter().enumerate().all(|(i, arg)| match candidate.param_type(i) {
                    Some(param) => TypeCompatibility::is_assignable(arg, param, index),
                    None => true,
                })
        });
        let chosen = by_types
            .or_else(|| candidates.iter().find(|c| c.accepts_arity(args.len())))
            .unwrap_or(sig);
        trace!(candidates = candidates.len(), params = chosen.params.len(), "selected overload");
        chosen.clone()
    }

    /// Return type of a call to `sig`, with its template parameters bound
    /// from the argument types
    fn instantiate_returns(&mut self, sig: &Signature, args: &[LuaType]) -> LuaType {
        if sig.generics.is_empty() {
            return sig.return_type();
        }
        let bindings = self.bind_arguments(sig, args);
        if bindings.is_empty() {
            return sig.return_type();
        }
        self.stats.record_generic_instantiation();
        instantiate_signature(sig, &bindings).return_type()
    }

    pub(crate) fn bind_arguments(&mut self, sig: &Signature, args: &[LuaType]) -> Substitution {
        let mut bindings = Substitution::default();
        for (i, arg) in args.iter().enumerate() {
            let Some(param) = sig.param_type(i) else {
                continue;
            };
            match (param, arg) {
                // a table constructor against `table<K, V>` binds its keys
                // and field types
                (LuaType::Table { key, value }, LuaType::TableLiteral(table)) => {
                    let field_types = self.table_field_types(*table);
                    bind_templates(key, &LuaType::String, &sig.generics, &mut bindings);
                    bind_templates(value, &field_types, &sig.generics, &mut bindings);
                }
                _ => bind_templates(param, arg, &sig.generics, &mut bindings),
            }
        }
        bindings
    }

    /// Union of the value types of a table constructor's keyed fields
    fn table_field_types(&mut self, table: SyntaxRef) -> LuaType {
        let compilation = self.compilation;
        let Some(decls) = compilation.declarations(table.document) else {
            return LuaType::Unknown;
        };
        let fields: Vec<_> = decls
            .table_fields(table.node)
            .iter()
            .map(|id| crate::declaration::DeclRef::new(table.document, *id))
            .collect();
        LuaType::union_all(fields.into_iter().map(|d| self.declaration_type(d)))
    }
}
