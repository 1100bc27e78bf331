//! Index expressions and member lookup.
//!
//! Lookup walks table shapes, named types (through aliases and supers,
//! instantiating class generics on the way) and the builtin classes of
//! primitive values.

use super::SearchContext;
use crate::declaration::{DeclKind, DeclRef};
use crate::syntax::{IndexKey, NodeKind, NumberValue, SyntaxRef, SyntaxTree};
use crate::types::generics::substitution_for;
use crate::types::{LiteralValue, LuaType, TypeCompatibility};
use rustc_hash::FxHashSet;
use tracing::trace;

/// Key of a member access
#[derive(Debug, Clone, PartialEq)]
pub enum MemberKey {
    Name(String),
    Integer(i64),
    /// Computed key, known only by its type
    Type(LuaType),
}

impl MemberKey {
    fn as_name(&self) -> Option<String> {
        match self {
            MemberKey::Name(name) => Some(name.clone()),
            MemberKey::Integer(value) => Some(value.to_string()),
            MemberKey::Type(LuaType::Literal(LiteralValue::String(value))) => Some(value.clone()),
            MemberKey::Type(LuaType::Literal(LiteralValue::Integer(value))) => Some(value.to_string()),
            MemberKey::Type(_) => None,
        }
    }

    fn key_type(&self) -> LuaType {
        match self {
            MemberKey::Name(name) => LuaType::string_literal(name.clone()),
            MemberKey::Integer(value) => LuaType::integer_literal(*value),
            MemberKey::Type(ty) => ty.clone(),
        }
    }
}

impl<'c> SearchContext<'c> {
    pub(super) fn infer_index(&mut self, tree: &SyntaxTree, node: SyntaxRef) -> LuaType {
        let NodeKind::IndexExpr { prefix, key } = tree.kind(node.node) else {
            return LuaType::Unknown;
        };
        let prefix_ref = SyntaxRef::new(node.document, *prefix);
        let mut owner = self.infer(prefix_ref).first_value();
        if owner.is_unknown() && matches!(tree.kind(*prefix), NodeKind::NameExpr(_)) {
            // the container may have been cut short earlier in this query;
            // analyze its declaration again before giving up
            if self.find_declaration(prefix_ref).is_some() {
                self.evict(prefix_ref);
                owner = self.infer(prefix_ref).first_value();
            }
        }
        let key = self.member_key(tree, node, key);
        trace!(node = ?node.node, key = ?key, "member lookup");
        self.member_type(&owner, &key).unwrap_or(LuaType::Unknown)
    }

    fn member_key(&mut self, tree: &SyntaxTree, node: SyntaxRef, key: &IndexKey) -> MemberKey {
        match key {
            IndexKey::Dot(name) | IndexKey::Colon(name) => MemberKey::Name(name.text.clone()),
            IndexKey::Bracket(expr) => match tree.kind(*expr) {
                NodeKind::StringLit(value) => MemberKey::Name(value.clone()),
                NodeKind::NumberLit(NumberValue::Integer(value)) => MemberKey::Integer(*value),
                _ => MemberKey::Type(self.infer(SyntaxRef::new(node.document, *expr)).first_value()),
            },
        }
    }

    /// Type of member `key` of `owner`, `None` when there is no such member
    pub fn member_type(&mut self, owner: &LuaType, key: &MemberKey) -> Option<LuaType> {
        let mut visited = FxHashSet::default();
        self.member_type_inner(owner, key, &mut visited)
    }

    fn member_type_inner(
        &mut self,
        owner: &LuaType,
        key: &MemberKey,
        visited: &mut FxHashSet<String>,
    ) -> Option<LuaType> {
        match owner {
            LuaType::Any => Some(LuaType::Any),
            LuaType::TableLiteral(table) => self.table_member(*table, key),
            LuaType::Named { name, args } => self.named_member(name, args, key, visited),
            LuaType::Array(elem) => match key {
                MemberKey::Integer(_) => Some((**elem).clone()),
                MemberKey::Type(ty) if matches!(ty.widen(), LuaType::Integer | LuaType::Number) => {
                    Some((**elem).clone())
                }
                _ => None,
            },
            LuaType::Tuple(items) => match key {
                MemberKey::Integer(i) if *i >= 1 => items.get(*i as usize - 1).cloned(),
                _ => None,
            },
            LuaType::Table { key: table_key, value } => {
                let accepts = matches!(**table_key, LuaType::Any | LuaType::Unknown)
                    || TypeCompatibility::is_assignable(&key.key_type(), table_key, self.compilation.index());
                accepts.then(|| (**value).clone())
            }
            LuaType::Union(items) => {
                let found: Vec<LuaType> = items
                    .iter()
                    .filter(|t| !t.is_nil())
                    .filter_map(|t| {
                        let mut branch = visited.clone();
                        self.member_type_inner(t, key, &mut branch)
                    })
                    .collect();
                (!found.is_empty()).then(|| LuaType::union_all(found))
            }
            other => {
                let class = other.builtin_class()?;
                self.named_member(class, &[], key, visited)
            }
        }
    }

    fn table_member(&mut self, table: SyntaxRef, key: &MemberKey) -> Option<LuaType> {
        let compilation = self.compilation;
        let tree = compilation.syntax(table.document)?;
        match tree.kind(table.node) {
            NodeKind::TyTable { fields } => {
                let name = key.as_name()?;
                let field = fields.iter().find(|f| f.key == name)?;
                let ty = self.infer(SyntaxRef::new(table.document, field.ty));
                Some(if field.optional {
                    LuaType::union(ty, LuaType::Nil)
                } else {
                    ty
                })
            }
            NodeKind::TableExpr { fields } => {
                if let MemberKey::Integer(position) = key {
                    let value = fields
                        .iter()
                        .filter_map(|f| match tree.kind(*f) {
                            NodeKind::TableField {
                                key: crate::syntax::FieldKey::Positional,
                                value,
                            } => Some(*value),
                            _ => None,
                        })
                        .nth((*position as usize).checked_sub(1)?);
                    if let Some(value) = value {
                        return Some(self.infer(SyntaxRef::new(table.document, value)).first_value().widen());
                    }
                }
                let decls = self.table_member_declarations(table, &key.as_name()?);
                if decls.is_empty() {
                    return None;
                }
                Some(LuaType::union_all(decls.into_iter().map(|d| self.declaration_type(d))))
            }
            _ => None,
        }
    }

    fn table_member_declarations(&self, table: SyntaxRef, name: &str) -> Vec<DeclRef> {
        let mut out = Vec::new();
        if let Some(decls) = self.compilation.declarations(table.document) {
            out.extend(
                decls
                    .table_fields(table.node)
                    .iter()
                    .filter(|id| decls.decl(**id).name == name)
                    .map(|id| DeclRef::new(table.document, *id)),
            );
        }
        if let Some(members) = self.compilation.index().table_members(table) {
            out.extend(members.get(name).into_iter().flatten().copied());
        }
        out
    }

    fn named_member(
        &mut self,
        name: &str,
        args: &[LuaType],
        key: &MemberKey,
        visited: &mut FxHashSet<String>,
    ) -> Option<LuaType> {
        if !visited.insert(name.to_string()) {
            self.stats.record_cycle_cut();
            return None;
        }
        let compilation = self.compilation;
        let entry = compilation.index().find_type_info(name)?;
        let substitution = substitution_for(entry.generics(), args);
        if !substitution.is_empty() {
            self.stats.record_generic_instantiation();
        }
        if let Some(origin) = entry.alias_origin() {
            let origin = origin.instantiate(&substitution);
            return self.member_type_inner(&origin, key, visited);
        }
        if let Some(member) = key.as_name() {
            let decls = entry.member(&member);
            if !decls.is_empty() {
                // an annotated field wins over assignments to it
                let annotated: Vec<DeclRef> = decls
                    .iter()
                    .copied()
                    .filter(|d| compilation.decl(*d).is_some_and(|d| d.kind == DeclKind::DocField))
                    .collect();
                let chosen = if annotated.is_empty() { decls.to_vec() } else { annotated };
                let ty = LuaType::union_all(chosen.into_iter().map(|d| self.declaration_type(d)));
                return Some(ty.instantiate(&substitution));
            }
        }
        for sup in entry.supers() {
            let sup = sup.ty.instantiate(&substitution);
            if let Some(ty) = self.member_type_inner(&sup, key, visited) {
                return Some(ty);
            }
        }
        let key_type = key.key_type();
        entry
            .index_fields()
            .iter()
            .find(|field| TypeCompatibility::is_assignable(&key_type, &field.key, compilation.index()))
            .map(|field| field.value.instantiate(&substitution))
    }

    /// Declaration of the member an index expression refers to, or `None`
    /// when the prefix has no such member
    pub fn find_member_declaration(&mut self, index: SyntaxRef) -> Option<DeclRef> {
        let compilation = self.compilation;
        let tree = compilation.syntax(index.document)?;
        let NodeKind::IndexExpr { prefix, key } = tree.kind(index.node) else {
            return None;
        };
        let owner = self.infer(SyntaxRef::new(index.document, *prefix)).first_value();
        let name = self.member_key(tree, index, key).as_name()?;
        let mut visited = FxHashSet::default();
        self.member_declarations(&owner, &name, &mut visited).into_iter().next()
    }

    fn member_declarations(
        &mut self,
        owner: &LuaType,
        name: &str,
        visited: &mut FxHashSet<String>,
    ) -> Vec<DeclRef> {
        match owner {
            LuaType::TableLiteral(table) => self.table_member_declarations(*table, name),
            LuaType::Named { name: type_name, .. } => {
                if !visited.insert(type_name.clone()) {
                    return Vec::new();
                }
                let compilation = self.compilation;
                let Some(entry) = compilation.index().find_type_info(type_name) else {
                    return Vec::new();
                };
                if let Some(origin) = entry.alias_origin() {
                    return self.member_declarations(origin, name, visited);
                }
                let own = entry.member(name);
                if !own.is_empty() {
                    return own.to_vec();
                }
                for sup in entry.supers() {
                    let found = self.member_declarations(&sup.ty, name, visited);
                    if !found.is_empty() {
                        return found;
                    }
                }
                Vec::new()
            }
            LuaType::Union(items) => items
                .iter()
                .flat_map(|t| {
                    let mut branch = visited.clone();
                    self.member_declarations(t, name, &mut branch)
                })
                .collect(),
            other => match other.builtin_class() {
                Some(class) => self.member_declarations(&LuaType::named(class), name, visited),
                None => Vec::new(),
            },
        }
    }
}
