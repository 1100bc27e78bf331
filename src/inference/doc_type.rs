//! Lowering of annotation type syntax to [`LuaType`].
//!
//! Annotation types only depend on the syntax tree they are written in, so
//! lowering is a pure function. The type index uses it at registration time
//! and the search context caches it like any other node.

use crate::syntax::{DocumentId, NodeId, NodeKind, SyntaxRef, SyntaxTree, TyLiteral};
use crate::types::{LiteralValue, LuaType, Signature, SignatureParam};

/// Lower the annotation type at `node`.
///
/// Names bound by an enclosing `@generic`, or by the generic parameters of a
/// class or alias in the same annotation block, become template references.
/// Anything that is not a type node lowers to `unknown`.
pub fn doc_type(tree: &SyntaxTree, document: DocumentId, node: NodeId) -> LuaType {
    let templates = template_names(tree, node);
    Lowering {
        tree,
        document,
        templates: &templates,
    }
    .lower(node)
}

/// Name of the class a super type annotation refers to
pub fn super_name(tree: &SyntaxTree, node: NodeId) -> Option<String> {
    match tree.kind(node) {
        NodeKind::TyName(name) => Some(name.clone()),
        NodeKind::TyGeneric { base, .. } => Some(base.text.clone()),
        NodeKind::TyParen(inner) => super_name(tree, *inner),
        _ => None,
    }
}

/// Generic parameter names in scope for the annotation at `node`
pub fn template_names(tree: &SyntaxTree, node: NodeId) -> Vec<String> {
    let mut names = Vec::new();
    for ancestor in tree.ancestors(node) {
        let docs = match tree.kind(ancestor) {
            NodeKind::DocBlock { .. } => Some(ancestor),
            NodeKind::LocalStat { docs, .. }
            | NodeKind::AssignStat { docs, .. }
            | NodeKind::CallStat { docs, .. }
            | NodeKind::FuncStat { docs, .. }
            | NodeKind::LocalFuncStat { docs, .. } => *docs,
            _ => None,
        };
        if let Some(docs) = docs {
            collect_generics(tree, docs, &mut names);
        }
    }
    names
}

fn collect_generics(tree: &SyntaxTree, docs: NodeId, names: &mut Vec<String>) {
    let NodeKind::DocBlock { tags } = tree.kind(docs) else {
        return;
    };
    for tag in tags {
        let params = match tree.kind(*tag) {
            NodeKind::DocGeneric { params } => params,
            NodeKind::DocClass { generics, .. } | NodeKind::DocAlias { generics, .. } => generics,
            _ => continue,
        };
        for param in params {
            if !names.contains(&param.name.text) {
                names.push(param.name.text.clone());
            }
        }
    }
}

struct Lowering<'a> {
    tree: &'a SyntaxTree,
    document: DocumentId,
    templates: &'a [String],
}

impl Lowering<'_> {
    fn lower(&self, node: NodeId) -> LuaType {
        match self.tree.kind(node) {
            NodeKind::TyName(name) => self.name(name),
            NodeKind::TyArray(inner) => LuaType::array(self.lower(*inner)),
            NodeKind::TyUnion(items) => LuaType::union_all(items.iter().map(|t| self.lower(*t))),
            NodeKind::TyNullable(inner) => LuaType::union(self.lower(*inner), LuaType::Nil),
            NodeKind::TyTuple(items) => LuaType::Tuple(items.iter().map(|t| self.lower(*t)).collect()),
            NodeKind::TyParen(inner) => self.lower(*inner),
            NodeKind::TyFunc {
                params,
                returns,
                is_async,
            } => {
                let mut sig = Signature {
                    returns: returns.iter().map(|r| self.lower(*r)).collect(),
                    generics: self.templates.to_vec(),
                    is_async: *is_async,
                    ..Default::default()
                };
                for param in params {
                    let ty = param.ty.map_or(LuaType::Any, |t| self.lower(t));
                    if param.name == "..." {
                        sig.variadic = Some(ty);
                    } else {
                        sig.params.push(SignatureParam {
                            name: param.name.clone(),
                            ty,
                            optional: param.optional,
                        });
                    }
                }
                if !sig.params.iter().any(|p| p.ty.contains_template())
                    && !sig.variadic.as_ref().is_some_and(LuaType::contains_template)
                {
                    sig.generics.clear();
                }
                LuaType::signature(sig)
            }
            NodeKind::TyGeneric { base, args } => {
                let args: Vec<LuaType> = args.iter().map(|a| self.lower(*a)).collect();
                match (base.text.as_str(), args.as_slice()) {
                    ("table", [key, value]) => LuaType::table(key.clone(), value.clone()),
                    ("table", [value]) => LuaType::table(LuaType::Any, value.clone()),
                    _ => LuaType::Named {
                        name: base.text.clone(),
                        args,
                    },
                }
            }
            NodeKind::TyTable { .. } => LuaType::TableLiteral(SyntaxRef::new(self.document, node)),
            NodeKind::TyLiteral(lit) => match lit {
                TyLiteral::String(value) => LuaType::string_literal(value.clone()),
                TyLiteral::Integer(value) => LuaType::integer_literal(*value),
                TyLiteral::Boolean(value) => LuaType::Literal(LiteralValue::Boolean(*value)),
            },
            _ => LuaType::Unknown,
        }
    }

    fn name(&self, name: &str) -> LuaType {
        match name {
            "nil" | "void" => LuaType::Nil,
            "any" => LuaType::Any,
            "unknown" => LuaType::Unknown,
            "boolean" | "bool" => LuaType::Boolean,
            "number" => LuaType::Number,
            "integer" | "int" => LuaType::Integer,
            "string" => LuaType::String,
            "table" => LuaType::table(LuaType::Any, LuaType::Any),
            "function" => LuaType::signature(Signature {
                variadic: Some(LuaType::Any),
                returns: vec![LuaType::Any],
                ..Default::default()
            }),
            _ if self.templates.iter().any(|t| t == name) => LuaType::TemplateRef(name.to_string()),
            _ => LuaType::named(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lower_first_type(source: &str) -> LuaType {
        let tree = SyntaxTree::parse(source);
        let node = tree
            .ids()
            .find(|id| matches!(tree.kind(*id), NodeKind::DocType { .. }))
            .and_then(|id| match tree.kind(id) {
                NodeKind::DocType { types } => types.first().copied(),
                _ => None,
            })
            .expect("no @type tag");
        doc_type(&tree, DocumentId(0), node)
    }

    #[test]
    fn test_primitives_and_nullable() {
        assert_eq!(lower_first_type("---@type integer\nlocal x"), LuaType::Integer);
        assert_eq!(
            lower_first_type("---@type string?\nlocal x"),
            LuaType::union(LuaType::String, LuaType::Nil)
        );
        assert_eq!(
            lower_first_type("---@type Foo[]\nlocal x"),
            LuaType::array(LuaType::named("Foo"))
        );
    }

    #[test]
    fn test_table_generic_and_function() {
        assert_eq!(
            lower_first_type("---@type table<string, number>\nlocal x"),
            LuaType::table(LuaType::String, LuaType::Number)
        );
        let ty = lower_first_type("---@type fun(a: integer, ...: string): boolean\nlocal f");
        let sig = ty.as_signature().expect("signature");
        assert_eq!(sig.params.len(), 1);
        assert_eq!(sig.variadic, Some(LuaType::String));
        assert_eq!(sig.returns, vec![LuaType::Boolean]);
    }

    #[test]
    fn test_generic_names_become_templates() {
        let ty = lower_first_type("---@generic T\n---@type T[]\nlocal x");
        assert_eq!(ty, LuaType::array(LuaType::TemplateRef("T".to_string())));
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            lower_first_type("---@type \"a\" | \"b\"\nlocal x"),
            LuaType::union(LuaType::string_literal("a"), LuaType::string_literal("b"))
        );
    }
}
