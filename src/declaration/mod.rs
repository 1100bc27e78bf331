//! Lexical declarations of one document and the scope tree that orders them.
//!
//! Declarations and scopes live in flat arenas addressed by [`DeclId`] and
//! [`ScopeId`]. A declaration's identity is its source position; the syntax
//! node it came from is kept only to find its initializer again.

mod builder;
mod scope;

pub use builder::{DeclarationBuilder, DocumentAnalysis};
pub use scope::{Scope, ScopeChild, ScopeId, ScopeKind};

use crate::syntax::{DocumentId, NodeId, Span, SyntaxTree, Visibility};
use crate::types::LuaType;
use rustc_hash::FxHashMap;

/// Index of a declaration inside its [`DeclarationTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclId(pub u32);

impl DeclId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A declaration addressed across documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclRef {
    pub document: DocumentId,
    pub decl: DeclId,
}

impl DeclRef {
    pub fn new(document: DocumentId, decl: DeclId) -> Self {
        Self { document, decl }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclKind {
    Local,
    Param,
    Global,
    /// `function a.b()` / `function a:b()`
    Method,
    /// Keyed field of a table constructor
    TableField,
    /// `---@field`
    DocField,
    /// Field of a table annotated with `---@enum`
    EnumMember,
    /// `---@generic`
    GenericParam,
    /// `a.b = value`
    IndexMember,
}

impl DeclKind {
    /// Found by walking scopes rather than through the type index
    pub fn is_lexical(self) -> bool {
        matches!(
            self,
            DeclKind::Local | DeclKind::Param | DeclKind::GenericParam
        )
    }

    /// Values stored here are widened from literal to primitive types
    pub fn widens_literals(self) -> bool {
        matches!(
            self,
            DeclKind::Local
                | DeclKind::Global
                | DeclKind::TableField
                | DeclKind::IndexMember
                | DeclKind::EnumMember
        )
    }
}

/// Declaration feature bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct DeclFeatures(u8);

impl DeclFeatures {
    pub const NONE: DeclFeatures = DeclFeatures(0);
    pub const LOCAL: DeclFeatures = DeclFeatures(1 << 0);
    pub const GLOBAL: DeclFeatures = DeclFeatures(1 << 1);
    pub const DEPRECATED: DeclFeatures = DeclFeatures(1 << 2);
    pub const ASYNC: DeclFeatures = DeclFeatures(1 << 3);
    pub const NO_DISCARD: DeclFeatures = DeclFeatures(1 << 4);

    #[inline]
    pub const fn contains(self, other: DeclFeatures) -> bool {
        (self.0 & other.0) == other.0
    }

    #[inline]
    pub const fn union(self, other: DeclFeatures) -> DeclFeatures {
        DeclFeatures(self.0 | other.0)
    }
}

impl std::ops::BitOr for DeclFeatures {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for DeclFeatures {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Where a declaration's type comes from when it is not set yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeSource {
    None,
    /// Value `index` of an initializer expression
    Expr { expr: NodeId, index: usize },
    /// An annotation type node
    Doc { ty: NodeId, optional: bool },
}

#[derive(Debug, Clone)]
pub struct Declaration {
    pub id: DeclId,
    pub document: DocumentId,
    pub name: String,
    /// Start offset of the declared name
    pub position: u32,
    pub span: Span,
    /// Statement, field or expression that introduced the declaration
    pub syntax: Option<NodeId>,
    pub kind: DeclKind,
    pub source: TypeSource,
    pub features: DeclFeatures,
    pub visibility: Visibility,
    ty: Option<LuaType>,
}

impl Declaration {
    pub fn new(
        document: DocumentId,
        name: impl Into<String>,
        span: Span,
        kind: DeclKind,
    ) -> Self {
        let features = match kind {
            DeclKind::Global => DeclFeatures::GLOBAL,
            DeclKind::Local | DeclKind::Param => DeclFeatures::LOCAL,
            _ => DeclFeatures::NONE,
        };
        Self {
            id: DeclId(0),
            document,
            name: name.into(),
            position: span.start,
            span,
            syntax: None,
            kind,
            source: TypeSource::None,
            features,
            visibility: Visibility::Public,
            ty: None,
        }
    }

    pub fn decl_ref(&self) -> DeclRef {
        DeclRef::new(self.document, self.id)
    }

    pub fn ty(&self) -> Option<&LuaType> {
        self.ty.as_ref()
    }

    pub fn is_typed(&self) -> bool {
        self.ty.is_some()
    }

    /// Set the type once; later calls are ignored and return `false`
    pub fn set_type(&mut self, ty: LuaType) -> bool {
        if self.ty.is_some() {
            return false;
        }
        self.ty = Some(ty);
        true
    }

    pub fn is_deprecated(&self) -> bool {
        self.features.contains(DeclFeatures::DEPRECATED)
    }
}

/// Extra facts about a function body recorded during the build
#[derive(Debug, Clone, Default)]
pub struct ClosureInfo {
    /// Annotation block of the statement that defines the function
    pub docs: Option<NodeId>,
    /// Defined with `:`
    pub colon: bool,
    pub params: Vec<DeclId>,
    pub self_param: Option<DeclId>,
    pub vararg: bool,
}

/// Declarations and scopes of one document
#[derive(Debug, Clone)]
pub struct DeclarationTree {
    document: DocumentId,
    decls: Vec<Declaration>,
    scopes: Vec<Scope>,
    scope_owners: FxHashMap<NodeId, ScopeId>,
    by_syntax: FxHashMap<NodeId, DeclId>,
    by_position: FxHashMap<u32, DeclId>,
    globals: Vec<DeclId>,
    closures: FxHashMap<NodeId, ClosureInfo>,
    table_fields: FxHashMap<NodeId, Vec<DeclId>>,
}

impl DeclarationTree {
    pub(crate) fn new(document: DocumentId, node_count: usize) -> Self {
        Self {
            document,
            decls: Vec::with_capacity(node_count / 4),
            scopes: Vec::new(),
            scope_owners: FxHashMap::with_capacity_and_hasher(node_count / 8, Default::default()),
            by_syntax: FxHashMap::default(),
            by_position: FxHashMap::default(),
            globals: Vec::new(),
            closures: FxHashMap::default(),
            table_fields: FxHashMap::default(),
        }
    }

    pub fn document(&self) -> DocumentId {
        self.document
    }

    pub fn decl(&self, id: DeclId) -> &Declaration {
        &self.decls[id.index()]
    }

    pub fn decl_mut(&mut self, id: DeclId) -> &mut Declaration {
        &mut self.decls[id.index()]
    }

    pub fn decls(&self) -> impl Iterator<Item = &Declaration> {
        self.decls.iter()
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    pub fn scopes(&self) -> impl Iterator<Item = &Scope> {
        self.scopes.iter()
    }

    /// Global assignments and global functions of this document
    pub fn globals(&self) -> impl Iterator<Item = &Declaration> {
        self.globals.iter().map(|id| self.decl(*id))
    }

    /// Declaration introduced by `node` (an index target, a table field, a
    /// doc field or a global name)
    pub fn decl_for_syntax(&self, node: NodeId) -> Option<DeclId> {
        self.by_syntax.get(&node).copied()
    }

    /// Declaration whose name starts at `position`
    pub fn decl_at(&self, position: u32) -> Option<DeclId> {
        self.by_position.get(&position).copied()
    }

    pub fn closure(&self, closure: NodeId) -> Option<&ClosureInfo> {
        self.closures.get(&closure)
    }

    /// Keyed fields declared by a table constructor
    pub fn table_fields(&self, table: NodeId) -> &[DeclId] {
        self.table_fields
            .get(&table)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn tables(&self) -> impl Iterator<Item = (NodeId, &[DeclId])> {
        self.table_fields.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    /// Nearest scope owned by an ancestor of `node`
    pub fn find_scope(&self, tree: &SyntaxTree, node: NodeId) -> Option<ScopeId> {
        tree.ancestors(node)
            .find_map(|ancestor| self.scope_owners.get(&ancestor).copied())
    }

    /// Resolve a name reference to the local it denotes.
    ///
    /// Returns `None` when no local is visible; the caller treats the name
    /// as a global.
    pub fn find_declaration(&self, tree: &SyntaxTree, name_expr: NodeId) -> Option<DeclId> {
        let crate::syntax::NodeKind::NameExpr(name) = tree.kind(name_expr) else {
            return None;
        };
        let position = tree.span(name_expr).start;
        let scope = self.find_scope(tree, name_expr)?;
        self.lookup(name, position, scope)
    }

    fn push_decl(&mut self, mut decl: Declaration) -> DeclId {
        let id = DeclId(self.decls.len() as u32);
        decl.id = id;
        decl.document = self.document;
        self.by_position.entry(decl.position).or_insert(id);
        if let Some(node) = decl.syntax {
            if matches!(
                decl.kind,
                DeclKind::IndexMember
                    | DeclKind::TableField
                    | DeclKind::EnumMember
                    | DeclKind::DocField
                    | DeclKind::Method
                    | DeclKind::Global
            ) {
                self.by_syntax.entry(node).or_insert(id);
            }
        }
        if decl.kind == DeclKind::Global {
            self.globals.push(id);
        }
        self.decls.push(decl);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_features_bits() {
        let mut features = DeclFeatures::LOCAL;
        features |= DeclFeatures::DEPRECATED;
        assert!(features.contains(DeclFeatures::LOCAL));
        assert!(features.contains(DeclFeatures::DEPRECATED));
        assert!(!features.contains(DeclFeatures::GLOBAL));
        assert!((DeclFeatures::ASYNC | DeclFeatures::NO_DISCARD).contains(DeclFeatures::ASYNC));
    }

    #[test]
    fn test_type_is_set_once() {
        let mut decl = Declaration::new(DocumentId(0), "x", Span::default(), DeclKind::Local);
        assert!(!decl.is_typed());
        assert!(decl.set_type(LuaType::Integer));
        assert!(!decl.set_type(LuaType::String));
        assert_eq!(decl.ty(), Some(&LuaType::Integer));
    }
}
