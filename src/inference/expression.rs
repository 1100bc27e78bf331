//! Expression rules: literals, names, operators, table constructors and
//! function signatures.

use super::SearchContext;
use crate::declaration::{DeclRef, TypeSource};
use crate::resolve::control_flow::{block_always_returns, body_block, return_statements};
use crate::syntax::{
    BinaryOp, DocFlag, FieldKey, NodeId, NodeKind, NumberValue, SyntaxRef, SyntaxTree, UnaryOp,
};
use crate::types::{LiteralValue, LuaType, Signature, SignatureParam};
use std::sync::Arc;
use tracing::{debug, trace};

/// Positional return types of a body plus the value expressions that
/// could not be typed yet
#[derive(Debug, Clone, Default)]
pub struct ReturnSummary {
    pub returns: Vec<LuaType>,
    pub blockers: Vec<NodeId>,
}

impl<'c> SearchContext<'c> {
    pub(super) fn infer_literal(&self, kind: &NodeKind) -> LuaType {
        match kind {
            NodeKind::NilLit => LuaType::Nil,
            NodeKind::TrueLit => LuaType::Literal(LiteralValue::Boolean(true)),
            NodeKind::FalseLit => LuaType::Literal(LiteralValue::Boolean(false)),
            NodeKind::NumberLit(NumberValue::Integer(value)) => LuaType::integer_literal(*value),
            NodeKind::NumberLit(NumberValue::Float(value)) => {
                LuaType::Literal(LiteralValue::Float(*value))
            }
            NodeKind::StringLit(value) => LuaType::string_literal(value.clone()),
            _ => LuaType::Unknown,
        }
    }

    /// `...` takes the type given by `---@param ...` on the enclosing function
    pub(super) fn infer_vararg(&mut self, tree: &SyntaxTree, node: SyntaxRef) -> LuaType {
        let Some(closure) = tree
            .ancestors(node.node)
            .find(|a| matches!(tree.kind(*a), NodeKind::ClosureExpr { .. }))
        else {
            return LuaType::Unknown;
        };
        let docs = self
            .compilation
            .declarations(node.document)
            .and_then(|decls| decls.closure(closure))
            .and_then(|info| info.docs);
        let Some(docs) = docs else {
            return LuaType::Unknown;
        };
        let variadic = doc_tags(tree, docs).find_map(|tag| match tree.kind(tag) {
            NodeKind::DocParam { name, ty, .. } if name.text == "..." => Some(*ty),
            _ => None,
        });
        match variadic {
            Some(ty) => self.infer(SyntaxRef::new(node.document, ty)),
            None => LuaType::Unknown,
        }
    }

    /// A name is the visible local, otherwise the union of every global
    /// declaration of that name
    pub(super) fn infer_name(&mut self, tree: &SyntaxTree, node: SyntaxRef, name: &str) -> LuaType {
        let compilation = self.compilation;
        if let Some(decls) = compilation.declarations(node.document) {
            if let Some(id) = decls.find_declaration(tree, node.node) {
                return self.declaration_type(DeclRef::new(node.document, id));
            }
        }
        let globals = compilation.index().globals(name);
        if globals.is_empty() {
            trace!(name, "unresolved global");
            return LuaType::Unknown;
        }
        LuaType::union_all(globals.iter().map(|decl| self.declaration_type(*decl)))
    }

    /// Table constructors with any named field keep their shape; otherwise
    /// they are arrays or `table<K, V>`
    pub(super) fn infer_table(&mut self, tree: &SyntaxTree, node: SyntaxRef, fields: &[NodeId]) -> LuaType {
        if fields.is_empty() {
            return LuaType::TableLiteral(node);
        }
        let mut keys: Vec<LuaType> = Vec::new();
        let mut values: Vec<LuaType> = Vec::new();
        let mut positional = true;
        for field in fields {
            let NodeKind::TableField { key, value } = tree.kind(*field) else {
                continue;
            };
            let value_ref = SyntaxRef::new(node.document, *value);
            match key {
                FieldKey::Named(_) => return LuaType::TableLiteral(node),
                FieldKey::Expr(key) => {
                    if matches!(tree.kind(*key), NodeKind::StringLit(_)) {
                        return LuaType::TableLiteral(node);
                    }
                    positional = false;
                    keys.push(self.infer(SyntaxRef::new(node.document, *key)).widen());
                    values.push(self.infer(value_ref).first_value().widen());
                }
                FieldKey::Positional => {
                    keys.push(LuaType::Integer);
                    match self.infer(value_ref) {
                        LuaType::MultiReturn(items) => values.extend(items.iter().map(LuaType::widen)),
                        ty => values.push(ty.widen()),
                    }
                }
            }
        }
        let value = LuaType::union_all(values);
        if positional {
            LuaType::array(value)
        } else {
            LuaType::table(LuaType::union_all(keys), value)
        }
    }

    pub(super) fn infer_closure(&mut self, tree: &SyntaxTree, node: SyntaxRef) -> LuaType {
        let compilation = self.compilation;
        let Some(info) = compilation
            .declarations(node.document)
            .and_then(|decls| decls.closure(node.node))
        else {
            return LuaType::Unknown;
        };
        let mut sig = Signature {
            colon_define: info.colon,
            origin: Some(node),
            ..Default::default()
        };
        for param in &info.params {
            let decl_ref = DeclRef::new(node.document, *param);
            let optional = compilation.decl(decl_ref).is_some_and(|d| {
                matches!(d.source, TypeSource::Doc { optional: true, .. })
            });
            let ty = match self.declaration_type(decl_ref) {
                LuaType::Unknown => LuaType::Any,
                ty => ty,
            };
            let name = compilation
                .decl(decl_ref)
                .map(|d| d.name.clone())
                .unwrap_or_default();
            sig.params.push(SignatureParam { name, ty, optional });
        }
        if info.vararg {
            sig.variadic = Some(LuaType::Any);
        }

        let mut doc_returns: Option<Vec<LuaType>> = None;
        if let Some(docs) = info.docs {
            for tag in doc_tags(tree, docs) {
                match tree.kind(tag) {
                    NodeKind::DocReturn { returns } => {
                        let out = doc_returns.get_or_insert_with(Vec::new);
                        for item in returns {
                            out.push(self.infer(SyntaxRef::new(node.document, item.ty)));
                        }
                    }
                    NodeKind::DocParam { name, ty, .. } if name.text == "..." && info.vararg => {
                        sig.variadic = Some(self.infer(SyntaxRef::new(node.document, *ty)));
                    }
                    NodeKind::DocOverload { signature } => {
                        if let LuaType::Signature(overload) =
                            self.infer(SyntaxRef::new(node.document, *signature))
                        {
                            sig.overloads.push(overload);
                        }
                    }
                    NodeKind::DocGeneric { params } => {
                        sig.generics.extend(params.iter().map(|p| p.name.text.clone()));
                    }
                    NodeKind::DocFlag(DocFlag::Async) => sig.is_async = true,
                    _ => {}
                }
            }
        }

        sig.returns = match doc_returns {
            Some(returns) => returns,
            None => match compilation.closure_returns(node) {
                Some(returns) => returns.to_vec(),
                None => self.infer_body_returns(node).returns,
            },
        };
        LuaType::Signature(Arc::new(sig))
    }

    /// Positional union of every `return` of a function body or chunk.
    ///
    /// A body that can fall off its end also returns `nil` in every
    /// position. A position fed by an untyped expression stays `unknown`
    /// rather than committing to a partial union.
    pub fn infer_body_returns(&mut self, owner: SyntaxRef) -> ReturnSummary {
        let compilation = self.compilation;
        let Some(tree) = compilation.syntax(owner.document) else {
            return ReturnSummary::default();
        };
        let Some(block) = body_block(tree, owner.node) else {
            return ReturnSummary::default();
        };
        if !self.returns_in_progress.insert(owner) {
            self.stats.record_cycle_cut();
            return ReturnSummary {
                returns: vec![LuaType::Unknown],
                blockers: vec![owner.node],
            };
        }
        let mut summary = ReturnSummary::default();
        let statements = return_statements(tree, block);
        for (n, stat) in statements.iter().enumerate() {
            let NodeKind::ReturnStat { values } = tree.kind(*stat) else {
                continue;
            };
            let mut row: Vec<LuaType> = Vec::with_capacity(values.len());
            for (i, value) in values.iter().enumerate() {
                let ty = self.infer(SyntaxRef::new(owner.document, *value));
                if ty.is_unknown() {
                    summary.blockers.push(*value);
                }
                match ty {
                    LuaType::MultiReturn(items) if i + 1 == values.len() => row.extend(items),
                    ty => row.push(ty.first_value()),
                }
            }
            let width = summary.returns.len().max(row.len());
            for position in 0..width {
                let incoming = row.get(position).cloned().unwrap_or(LuaType::Nil);
                if position >= summary.returns.len() {
                    // earlier statements returned nothing here
                    let ty = if n == 0 { incoming } else { merge_return(LuaType::Nil, incoming) };
                    summary.returns.push(ty);
                } else {
                    let current = std::mem::replace(&mut summary.returns[position], LuaType::Unknown);
                    summary.returns[position] = merge_return(current, incoming);
                }
            }
        }
        if !summary.returns.is_empty() && !block_always_returns(tree, block) {
            for ty in summary.returns.iter_mut() {
                let current = std::mem::replace(ty, LuaType::Unknown);
                *ty = merge_return(current, LuaType::Nil);
            }
        }
        self.returns_in_progress.remove(&owner);
        debug!(node = ?owner.node, returns = summary.returns.len(), blocked = summary.blockers.len(), "inferred returns");
        summary
    }

    pub(super) fn infer_unary(&mut self, op: UnaryOp, operand: LuaType) -> LuaType {
        let operand = operand.first_value();
        match op {
            UnaryOp::Not => LuaType::Boolean,
            UnaryOp::Len | UnaryOp::BNot => LuaType::Integer,
            UnaryOp::Neg => match operand {
                LuaType::Literal(LiteralValue::Integer(v)) => LuaType::integer_literal(v.wrapping_neg()),
                LuaType::Literal(LiteralValue::Float(v)) => LuaType::Literal(LiteralValue::Float(-v)),
                LuaType::Named { ref name, .. } => self
                    .operator_result(name, "unm", None)
                    .unwrap_or(operand.clone()),
                other => other.widen(),
            },
        }
    }

    pub(super) fn infer_binary(&mut self, op: BinaryOp, lhs: LuaType, rhs: LuaType) -> LuaType {
        if op.is_comparison() {
            return LuaType::Boolean;
        }
        match op {
            BinaryOp::And => rhs,
            BinaryOp::Or => LuaType::union(lhs.without_nil(), rhs),
            BinaryOp::BAnd | BinaryOp::BOr | BinaryOp::BXor | BinaryOp::Shl | BinaryOp::Shr => {
                LuaType::Integer
            }
            _ => {
                if let (LuaType::Named { name, .. }, Some(metamethod)) = (&lhs, op.metamethod()) {
                    if let Some(result) = self.operator_result(name, metamethod, Some(&rhs)) {
                        return result;
                    }
                }
                match op {
                    BinaryOp::Concat => LuaType::String,
                    BinaryOp::Div | BinaryOp::Pow => match lhs.widen() {
                        LuaType::Integer | LuaType::Number => LuaType::Number,
                        other => other,
                    },
                    _ => match (lhs.widen(), rhs.widen()) {
                        (LuaType::Integer, LuaType::Number) => LuaType::Number,
                        (lhs, _) => lhs,
                    },
                }
            }
        }
    }

    /// Result of an `---@operator` declared on `type_name` or a super type
    fn operator_result(&mut self, type_name: &str, op: &str, operand: Option<&LuaType>) -> Option<LuaType> {
        let index = self.compilation.index();
        let mut queue = vec![type_name.to_string()];
        let mut seen: Vec<String> = Vec::new();
        while let Some(name) = queue.pop() {
            if seen.contains(&name) {
                continue;
            }
            let Some(entry) = index.find_type_info(&name) else {
                continue;
            };
            let candidates: Vec<_> = entry.operators().iter().filter(|o| o.op == op).collect();
            let chosen = candidates
                .iter()
                .find(|o| match (&o.operand, operand) {
                    (Some(expected), Some(actual)) => {
                        crate::types::TypeCompatibility::is_assignable(actual, expected, index)
                    }
                    _ => true,
                })
                .or(candidates.first());
            if let Some(def) = chosen {
                return Some(def.result.clone());
            }
            queue.extend(entry.supers().iter().map(|s| s.name.clone()));
            seen.push(name);
        }
        None
    }
}

/// Union two return values, keeping `unknown` sticky
fn merge_return(current: LuaType, incoming: LuaType) -> LuaType {
    if current.is_unknown() || incoming.is_unknown() {
        LuaType::Unknown
    } else {
        LuaType::union(current, incoming)
    }
}

/// Tags of an annotation block
pub(super) fn doc_tags(tree: &SyntaxTree, docs: NodeId) -> impl Iterator<Item = NodeId> + '_ {
    let tags: &[NodeId] = match tree.kind(docs) {
        NodeKind::DocBlock { tags } => tags,
        _ => &[],
    };
    tags.iter().copied()
}
