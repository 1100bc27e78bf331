//! Syntax tree consumed by the declaration builder and the inference engine.
//!
//! Nodes live in a flat arena and are addressed by [`NodeId`]. Every node
//! records its parent so consumers can walk outward from any position
//! without holding references into the tree.

mod doc;
mod lexer;
mod parser;
mod span;

pub use lexer::{Lexer, Token, TokenKind};
pub use parser::Parser;
pub use span::Span;

use crate::diagnostics::Diagnostic;
use serde::{Deserialize, Serialize};

/// Index of a node inside its [`SyntaxTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identity of a document inside a compilation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub u32);

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}

/// A node address that is unique across all documents of a compilation.
///
/// Used as the key of every inference cache and of the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SyntaxRef {
    pub document: DocumentId,
    pub node: NodeId,
}

impl SyntaxRef {
    pub fn new(document: DocumentId, node: NodeId) -> Self {
        Self { document, node }
    }
}

/// An identifier together with the span it was written at
#[derive(Debug, Clone, PartialEq)]
pub struct Name {
    pub text: String,
    pub span: Span,
}

impl Name {
    pub fn new(text: impl Into<String>, span: Span) -> Self {
        Self {
            text: text.into(),
            span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumberValue {
    Integer(i64),
    Float(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
    Package,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
    Len,
    BNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Or,
    And,
    Lt,
    Gt,
    Le,
    Ge,
    Ne,
    Eq,
    BOr,
    BXor,
    BAnd,
    Shl,
    Shr,
    Concat,
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge | BinaryOp::Ne | BinaryOp::Eq
        )
    }

    /// Name used by `---@operator` annotations for this operator
    pub fn metamethod(self) -> Option<&'static str> {
        let name = match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::IDiv => "idiv",
            BinaryOp::Mod => "mod",
            BinaryOp::Pow => "pow",
            BinaryOp::Concat => "concat",
            BinaryOp::BAnd => "band",
            BinaryOp::BOr => "bor",
            BinaryOp::BXor => "bxor",
            BinaryOp::Shl => "shl",
            BinaryOp::Shr => "shr",
            _ => return None,
        };
        Some(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfClause {
    /// `None` for the trailing `else`
    pub condition: Option<NodeId>,
    pub block: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndexKey {
    /// `a.b`
    Dot(Name),
    /// `a:b`, only valid as a callee or a method definition name
    Colon(Name),
    /// `a[expr]`
    Bracket(NodeId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKey {
    Positional,
    Named(Name),
    Expr(NodeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Interface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClassAttributes {
    pub partial: bool,
    pub exact: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocGenericParam {
    pub name: Name,
    pub constraint: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocFieldKey {
    Name(Name),
    Type(NodeId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocReturnItem {
    pub ty: NodeId,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocFlag {
    Deprecated,
    Async,
    NoDiscard,
    Visibility(Visibility),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TyFuncParam {
    pub name: String,
    pub ty: Option<NodeId>,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TyTableField {
    pub key: String,
    pub ty: NodeId,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TyLiteral {
    String(String),
    Integer(i64),
    Boolean(bool),
}

/// Closed set of syntax node kinds
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Chunk {
        block: NodeId,
    },
    Block {
        stats: Vec<NodeId>,
    },

    LocalStat {
        names: Vec<Name>,
        values: Vec<NodeId>,
        docs: Option<NodeId>,
    },
    AssignStat {
        targets: Vec<NodeId>,
        values: Vec<NodeId>,
        docs: Option<NodeId>,
    },
    CallStat {
        call: NodeId,
        docs: Option<NodeId>,
    },
    /// `function a.b:c() end`, the target is a name or index expression
    FuncStat {
        target: NodeId,
        closure: NodeId,
        docs: Option<NodeId>,
    },
    LocalFuncStat {
        name: Name,
        closure: NodeId,
        docs: Option<NodeId>,
    },
    ReturnStat {
        values: Vec<NodeId>,
    },
    IfStat {
        clauses: Vec<IfClause>,
    },
    WhileStat {
        condition: NodeId,
        block: NodeId,
    },
    RepeatStat {
        block: NodeId,
        condition: NodeId,
    },
    ForNumStat {
        var: Name,
        start: NodeId,
        limit: NodeId,
        step: Option<NodeId>,
        block: NodeId,
    },
    ForInStat {
        vars: Vec<Name>,
        exprs: Vec<NodeId>,
        block: NodeId,
    },
    DoStat {
        block: NodeId,
    },
    BreakStat,
    GotoStat {
        label: String,
    },
    LabelStat {
        name: String,
    },
    /// Doc comments not followed by a statement
    DocStat {
        docs: NodeId,
    },

    NilLit,
    TrueLit,
    FalseLit,
    NumberLit(NumberValue),
    StringLit(String),
    Vararg,
    NameExpr(String),
    IndexExpr {
        prefix: NodeId,
        key: IndexKey,
    },
    CallExpr {
        callee: NodeId,
        args: Vec<NodeId>,
    },
    ClosureExpr {
        params: Vec<Name>,
        vararg: bool,
        block: NodeId,
    },
    TableExpr {
        fields: Vec<NodeId>,
    },
    TableField {
        key: FieldKey,
        value: NodeId,
    },
    UnaryExpr {
        op: UnaryOp,
        operand: NodeId,
    },
    BinaryExpr {
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    ParenExpr(NodeId),

    DocBlock {
        tags: Vec<NodeId>,
    },
    DocClass {
        name: Name,
        kind: ClassKind,
        attributes: ClassAttributes,
        generics: Vec<DocGenericParam>,
        supers: Vec<NodeId>,
    },
    DocEnum {
        name: Name,
        key: bool,
        base: Option<NodeId>,
    },
    DocAlias {
        name: Name,
        generics: Vec<DocGenericParam>,
        origin: NodeId,
    },
    DocField {
        visibility: Option<Visibility>,
        key: DocFieldKey,
        ty: NodeId,
        optional: bool,
    },
    DocType {
        types: Vec<NodeId>,
    },
    DocParam {
        name: Name,
        ty: NodeId,
        optional: bool,
    },
    DocReturn {
        returns: Vec<DocReturnItem>,
    },
    DocGeneric {
        params: Vec<DocGenericParam>,
    },
    DocOverload {
        signature: NodeId,
    },
    DocOperator {
        op: String,
        operand: Option<NodeId>,
        result: Option<NodeId>,
    },
    DocFlag(DocFlag),

    TyName(String),
    TyArray(NodeId),
    TyUnion(Vec<NodeId>),
    TyNullable(NodeId),
    TyTuple(Vec<NodeId>),
    TyFunc {
        params: Vec<TyFuncParam>,
        returns: Vec<NodeId>,
        is_async: bool,
    },
    TyGeneric {
        base: Name,
        args: Vec<NodeId>,
    },
    TyTable {
        fields: Vec<TyTableField>,
    },
    TyParen(NodeId),
    TyLiteral(TyLiteral),

    /// Placeholder produced by error recovery
    Error,
}

impl NodeKind {
    /// Direct children in source order
    pub fn children(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        match self {
            NodeKind::Chunk { block } => out.push(*block),
            NodeKind::Block { stats } => out.extend(stats),
            NodeKind::LocalStat { values, docs, .. } => {
                out.extend(docs);
                out.extend(values);
            }
            NodeKind::AssignStat {
                targets,
                values,
                docs,
            } => {
                out.extend(docs);
                out.extend(targets);
                out.extend(values);
            }
            NodeKind::CallStat { call, docs } => {
                out.extend(docs);
                out.push(*call);
            }
            NodeKind::FuncStat {
                target,
                closure,
                docs,
            } => {
                out.extend(docs);
                out.push(*target);
                out.push(*closure);
            }
            NodeKind::LocalFuncStat { closure, docs, .. } => {
                out.extend(docs);
                out.push(*closure);
            }
            NodeKind::ReturnStat { values } => out.extend(values),
            NodeKind::IfStat { clauses } => {
                for clause in clauses {
                    out.extend(clause.condition);
                    out.push(clause.block);
                }
            }
            NodeKind::WhileStat { condition, block } => {
                out.push(*condition);
                out.push(*block);
            }
            NodeKind::RepeatStat { block, condition } => {
                out.push(*block);
                out.push(*condition);
            }
            NodeKind::ForNumStat {
                start,
                limit,
                step,
                block,
                ..
            } => {
                out.push(*start);
                out.push(*limit);
                out.extend(step);
                out.push(*block);
            }
            NodeKind::ForInStat { exprs, block, .. } => {
                out.extend(exprs);
                out.push(*block);
            }
            NodeKind::DoStat { block } => out.push(*block),
            NodeKind::DocStat { docs } => out.push(*docs),
            NodeKind::IndexExpr { prefix, key } => {
                out.push(*prefix);
                if let IndexKey::Bracket(expr) = key {
                    out.push(*expr);
                }
            }
            NodeKind::CallExpr { callee, args } => {
                out.push(*callee);
                out.extend(args);
            }
            NodeKind::ClosureExpr { block, .. } => out.push(*block),
            NodeKind::TableExpr { fields } => out.extend(fields),
            NodeKind::TableField { key, value } => {
                if let FieldKey::Expr(expr) = key {
                    out.push(*expr);
                }
                out.push(*value);
            }
            NodeKind::UnaryExpr { operand, .. } => out.push(*operand),
            NodeKind::BinaryExpr { lhs, rhs, .. } => {
                out.push(*lhs);
                out.push(*rhs);
            }
            NodeKind::ParenExpr(inner) => out.push(*inner),
            NodeKind::DocBlock { tags } => out.extend(tags),
            NodeKind::DocClass {
                generics, supers, ..
            } => {
                out.extend(generics.iter().filter_map(|g| g.constraint));
                out.extend(supers);
            }
            NodeKind::DocEnum { base, .. } => out.extend(base),
            NodeKind::DocAlias {
                generics, origin, ..
            } => {
                out.extend(generics.iter().filter_map(|g| g.constraint));
                out.push(*origin);
            }
            NodeKind::DocField { key, ty, .. } => {
                if let DocFieldKey::Type(key_ty) = key {
                    out.push(*key_ty);
                }
                out.push(*ty);
            }
            NodeKind::DocType { types } => out.extend(types),
            NodeKind::DocParam { ty, .. } => out.push(*ty),
            NodeKind::DocReturn { returns } => out.extend(returns.iter().map(|r| r.ty)),
            NodeKind::DocGeneric { params } => {
                out.extend(params.iter().filter_map(|g| g.constraint))
            }
            NodeKind::DocOverload { signature } => out.push(*signature),
            NodeKind::DocOperator {
                operand, result, ..
            } => {
                out.extend(operand);
                out.extend(result);
            }
            NodeKind::TyArray(inner) | NodeKind::TyNullable(inner) | NodeKind::TyParen(inner) => {
                out.push(*inner)
            }
            NodeKind::TyUnion(items) | NodeKind::TyTuple(items) => out.extend(items),
            NodeKind::TyFunc {
                params, returns, ..
            } => {
                out.extend(params.iter().filter_map(|p| p.ty));
                out.extend(returns);
            }
            NodeKind::TyGeneric { args, .. } => out.extend(args),
            NodeKind::TyTable { fields } => out.extend(fields.iter().map(|f| f.ty)),
            NodeKind::BreakStat
            | NodeKind::GotoStat { .. }
            | NodeKind::LabelStat { .. }
            | NodeKind::NilLit
            | NodeKind::TrueLit
            | NodeKind::FalseLit
            | NodeKind::NumberLit(_)
            | NodeKind::StringLit(_)
            | NodeKind::Vararg
            | NodeKind::NameExpr(_)
            | NodeKind::DocFlag(_)
            | NodeKind::TyName(_)
            | NodeKind::TyLiteral(_)
            | NodeKind::Error => {}
        }
        out
    }

    pub fn is_expression(&self) -> bool {
        matches!(
            self,
            NodeKind::NilLit
                | NodeKind::TrueLit
                | NodeKind::FalseLit
                | NodeKind::NumberLit(_)
                | NodeKind::StringLit(_)
                | NodeKind::Vararg
                | NodeKind::NameExpr(_)
                | NodeKind::IndexExpr { .. }
                | NodeKind::CallExpr { .. }
                | NodeKind::ClosureExpr { .. }
                | NodeKind::TableExpr { .. }
                | NodeKind::UnaryExpr { .. }
                | NodeKind::BinaryExpr { .. }
                | NodeKind::ParenExpr(_)
        )
    }

    pub fn is_doc_type(&self) -> bool {
        matches!(
            self,
            NodeKind::TyName(_)
                | NodeKind::TyArray(_)
                | NodeKind::TyUnion(_)
                | NodeKind::TyNullable(_)
                | NodeKind::TyTuple(_)
                | NodeKind::TyFunc { .. }
                | NodeKind::TyGeneric { .. }
                | NodeKind::TyTable { .. }
                | NodeKind::TyParen(_)
                | NodeKind::TyLiteral(_)
        )
    }

    /// Short kind label for logging
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Chunk { .. } => "chunk",
            NodeKind::Block { .. } => "block",
            NodeKind::LocalStat { .. } => "local",
            NodeKind::AssignStat { .. } => "assign",
            NodeKind::CallStat { .. } => "call-stat",
            NodeKind::FuncStat { .. } => "function",
            NodeKind::LocalFuncStat { .. } => "local-function",
            NodeKind::ReturnStat { .. } => "return",
            NodeKind::IfStat { .. } => "if",
            NodeKind::WhileStat { .. } => "while",
            NodeKind::RepeatStat { .. } => "repeat",
            NodeKind::ForNumStat { .. } => "for-num",
            NodeKind::ForInStat { .. } => "for-in",
            NodeKind::DoStat { .. } => "do",
            NodeKind::BreakStat => "break",
            NodeKind::GotoStat { .. } => "goto",
            NodeKind::LabelStat { .. } => "label",
            NodeKind::DocStat { .. } => "doc-stat",
            NodeKind::NilLit => "nil",
            NodeKind::TrueLit | NodeKind::FalseLit => "boolean",
            NodeKind::NumberLit(_) => "number",
            NodeKind::StringLit(_) => "string",
            NodeKind::Vararg => "vararg",
            NodeKind::NameExpr(_) => "name",
            NodeKind::IndexExpr { .. } => "index",
            NodeKind::CallExpr { .. } => "call",
            NodeKind::ClosureExpr { .. } => "closure",
            NodeKind::TableExpr { .. } => "table",
            NodeKind::TableField { .. } => "table-field",
            NodeKind::UnaryExpr { .. } => "unary",
            NodeKind::BinaryExpr { .. } => "binary",
            NodeKind::ParenExpr(_) => "paren",
            NodeKind::DocBlock { .. } => "doc-block",
            NodeKind::DocClass { .. } => "doc-class",
            NodeKind::DocEnum { .. } => "doc-enum",
            NodeKind::DocAlias { .. } => "doc-alias",
            NodeKind::DocField { .. } => "doc-field",
            NodeKind::DocType { .. } => "doc-type",
            NodeKind::DocParam { .. } => "doc-param",
            NodeKind::DocReturn { .. } => "doc-return",
            NodeKind::DocGeneric { .. } => "doc-generic",
            NodeKind::DocOverload { .. } => "doc-overload",
            NodeKind::DocOperator { .. } => "doc-operator",
            NodeKind::DocFlag(_) => "doc-flag",
            NodeKind::TyName(_) => "type-name",
            NodeKind::TyArray(_) => "type-array",
            NodeKind::TyUnion(_) => "type-union",
            NodeKind::TyNullable(_) => "type-nullable",
            NodeKind::TyTuple(_) => "type-tuple",
            NodeKind::TyFunc { .. } => "type-function",
            NodeKind::TyGeneric { .. } => "type-generic",
            NodeKind::TyTable { .. } => "type-table",
            NodeKind::TyParen(_) => "type-paren",
            NodeKind::TyLiteral(_) => "type-literal",
            NodeKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    pub parent: Option<NodeId>,
}

/// Immutable parse result of one document
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    source: String,
    nodes: Vec<Node>,
    root: NodeId,
    diagnostics: Vec<Diagnostic>,
}

impl SyntaxTree {
    /// Parse `source`, collecting syntax diagnostics on the tree
    pub fn parse(source: &str) -> SyntaxTree {
        Parser::new(source).parse()
    }

    pub(crate) fn from_parts(
        source: String,
        nodes: Vec<Node>,
        root: NodeId,
        diagnostics: Vec<Diagnostic>,
    ) -> Self {
        let mut tree = Self {
            source,
            nodes,
            root,
            diagnostics,
        };
        tree.link_parents();
        tree
    }

    fn link_parents(&mut self) {
        for index in 0..self.nodes.len() {
            for child in self.nodes[index].kind.children() {
                self.nodes[child.index()].parent = Some(NodeId(index as u32));
            }
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.nodes[id.index()].span
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.kind(id).children()
    }

    /// Ancestors of `id`, nearest first, not including `id` itself
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |current| self.parent(*current))
    }

    pub fn text(&self, id: NodeId) -> &str {
        let span = self.span(id);
        self.source
            .get(span.start as usize..span.end as usize)
            .unwrap_or_default()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    /// First expression node (in source order) whose text is exactly `text`
    pub fn find_expr(&self, text: &str) -> Option<NodeId> {
        self.ids()
            .filter(|id| self.kind(*id).is_expression() && self.text(*id) == text)
            .min_by_key(|id| (self.span(*id).start, std::cmp::Reverse(self.span(*id).end)))
    }

    /// Innermost node whose span contains `offset`
    pub fn node_at(&self, offset: u32) -> Option<NodeId> {
        self.ids()
            .filter(|id| self.span(*id).contains(offset))
            .min_by_key(|id| self.span(*id).len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parents_are_linked() {
        let tree = SyntaxTree::parse("local a = b.c");
        let index = tree.find_expr("b.c").unwrap();
        let name = tree.find_expr("b").unwrap();
        assert_eq!(tree.parent(name), Some(index));
        assert!(tree.ancestors(index).any(|a| a == tree.root()));
    }

    #[test]
    fn test_node_at_returns_innermost() {
        let tree = SyntaxTree::parse("local x = foo(1)");
        let offset = tree.source().find("foo").unwrap() as u32;
        let node = tree.node_at(offset).unwrap();
        assert_eq!(tree.kind(node), &NodeKind::NameExpr("foo".to_string()));
    }
}
