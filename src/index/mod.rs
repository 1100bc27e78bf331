//! Project-wide registry of named types, globals and module exports.
//!
//! Every entry remembers which documents contributed to it so that removing
//! a document prunes exactly its slice. A type declared `(partial)` across
//! several files keeps the members of the remaining files; the last
//! contributor leaving removes the entry outright.

use crate::declaration::{DeclId, DeclRef};
use crate::inference::doc_type::{doc_type, super_name};
use crate::syntax::{DocumentId, NodeId, NodeKind, SyntaxRef, SyntaxTree};
use crate::types::{LuaType, TypeHierarchy};
use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKind {
    Class,
    Interface,
    Enum,
    Alias,
}

/// Attribute flags of a named type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct TypeFlags(u8);

impl TypeFlags {
    pub const NONE: TypeFlags = TypeFlags(0);
    pub const PARTIAL: TypeFlags = TypeFlags(1 << 0);
    pub const EXACT: TypeFlags = TypeFlags(1 << 1);
    /// Bound to a global variable
    pub const GLOBAL: TypeFlags = TypeFlags(1 << 2);
    /// `---@enum (key)`: members are the keys, not the values
    pub const KEY_ENUM: TypeFlags = TypeFlags(1 << 3);

    #[inline]
    pub const fn contains(self, other: TypeFlags) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for TypeFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        TypeFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for TypeFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A type declaration as written in one document, before registration
#[derive(Debug, Clone)]
pub struct TypeDeclaration {
    pub name: String,
    pub kind: NamedKind,
    pub flags: TypeFlags,
    /// The `@class`/`@enum`/`@alias` tag
    pub node: NodeId,
    pub generics: Vec<String>,
    /// Super type annotations
    pub supers: Vec<NodeId>,
    /// `@field` declarations following the tag
    pub members: Vec<DeclId>,
    /// `@operator` tags following the tag
    pub operators: Vec<NodeId>,
    /// `@field [K] V` as (key, value) annotation nodes
    pub index_fields: Vec<(NodeId, NodeId)>,
    /// Alias origin or enum base annotation
    pub origin: Option<NodeId>,
}

impl TypeDeclaration {
    pub fn new(name: impl Into<String>, kind: NamedKind, node: NodeId) -> Self {
        Self {
            name: name.into(),
            kind,
            flags: TypeFlags::NONE,
            node,
            generics: Vec::new(),
            supers: Vec::new(),
            members: Vec::new(),
            operators: Vec::new(),
            index_fields: Vec::new(),
            origin: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuperRef {
    pub document: DocumentId,
    pub name: String,
    pub ty: LuaType,
}

/// `---@operator op(Operand): Result`
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorDef {
    pub document: DocumentId,
    pub op: String,
    pub operand: Option<LuaType>,
    pub result: LuaType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexField {
    pub document: DocumentId,
    pub key: LuaType,
    pub value: LuaType,
}

/// Aggregate of every document's contribution to one named type
#[derive(Debug, Clone)]
pub struct TypeEntry {
    pub name: String,
    pub kind: NamedKind,
    pub flags: TypeFlags,
    contributors: IndexSet<DocumentId>,
    declarations: Vec<SyntaxRef>,
    members: IndexMap<String, Vec<DeclRef>>,
    supers: Vec<SuperRef>,
    generics: Vec<String>,
    operators: Vec<OperatorDef>,
    index_fields: Vec<IndexField>,
    origin: Option<(DocumentId, LuaType)>,
}

impl TypeEntry {
    fn new(name: &str, kind: NamedKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            flags: TypeFlags::NONE,
            contributors: IndexSet::new(),
            declarations: Vec::new(),
            members: IndexMap::new(),
            supers: Vec::new(),
            generics: Vec::new(),
            operators: Vec::new(),
            index_fields: Vec::new(),
            origin: None,
        }
    }

    pub fn contributors(&self) -> impl Iterator<Item = DocumentId> + '_ {
        self.contributors.iter().copied()
    }

    /// Declaring tags, one per contributing declaration
    pub fn declarations(&self) -> &[SyntaxRef] {
        &self.declarations
    }

    pub fn members(&self) -> &IndexMap<String, Vec<DeclRef>> {
        &self.members
    }

    pub fn member(&self, name: &str) -> &[DeclRef] {
        self.members.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn supers(&self) -> &[SuperRef] {
        &self.supers
    }

    pub fn generics(&self) -> &[String] {
        &self.generics
    }

    pub fn operators(&self) -> &[OperatorDef] {
        &self.operators
    }

    pub fn index_fields(&self) -> &[IndexField] {
        &self.index_fields
    }

    /// Origin of an alias
    pub fn alias_origin(&self) -> Option<&LuaType> {
        match self.kind {
            NamedKind::Alias => self.origin.as_ref().map(|(_, ty)| ty),
            _ => None,
        }
    }

    /// Value type of an enum
    pub fn enum_base(&self) -> Option<&LuaType> {
        match self.kind {
            NamedKind::Enum => self.origin.as_ref().map(|(_, ty)| ty),
            _ => None,
        }
    }

    pub fn is_partial(&self) -> bool {
        self.flags.contains(TypeFlags::PARTIAL)
    }

    /// Drop everything `document` contributed; `true` when nothing is left
    fn prune(&mut self, document: DocumentId) -> bool {
        self.members.retain(|_, decls| {
            decls.retain(|d| d.document != document);
            !decls.is_empty()
        });
        self.supers.retain(|s| s.document != document);
        self.operators.retain(|o| o.document != document);
        self.index_fields.retain(|f| f.document != document);
        self.declarations.retain(|d| d.document != document);
        if matches!(self.origin, Some((doc, _)) if doc == document) {
            self.origin = None;
        }
        self.contributors.shift_remove(&document);
        self.contributors.is_empty()
    }
}

/// Named types, global declarations, members attached to table
/// constructors and module exports of a compilation
#[derive(Debug, Clone, Default)]
pub struct TypeIndex {
    types: IndexMap<String, TypeEntry>,
    /// super name → names of the types declaring it as a super
    subtypes: FxHashMap<String, IndexSet<String>>,
    globals: IndexMap<String, Vec<DeclRef>>,
    table_members: FxHashMap<SyntaxRef, IndexMap<String, Vec<DeclRef>>>,
    exports: FxHashMap<DocumentId, LuaType>,
    /// Members other documents attached to a type whose last declaring
    /// document left; handed back when the name is registered again
    detached_members: FxHashMap<String, IndexMap<String, Vec<DeclRef>>>,
}

impl TypeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type declared in `document`, merging into an existing
    /// entry of the same name
    pub fn register_type(
        &mut self,
        document: DocumentId,
        tree: &SyntaxTree,
        decl: &TypeDeclaration,
        member_names: impl IntoIterator<Item = (String, DeclId)>,
    ) {
        let detached = &mut self.detached_members;
        let entry = self.types.entry(decl.name.clone()).or_insert_with(|| {
            let mut entry = TypeEntry::new(&decl.name, decl.kind);
            if let Some(members) = detached.remove(&decl.name) {
                trace!(name = %decl.name, members = members.len(), "re-attached detached members");
                entry.members = members;
            }
            entry
        });
        entry.flags |= decl.flags;
        entry.contributors.insert(document);
        entry.declarations.push(SyntaxRef::new(document, decl.node));
        if entry.generics.is_empty() {
            entry.generics = decl.generics.clone();
        }
        for (name, id) in member_names {
            entry
                .members
                .entry(name)
                .or_default()
                .push(DeclRef::new(document, id));
        }
        for node in &decl.supers {
            let Some(name) = super_name(tree, *node) else {
                continue;
            };
            let ty = doc_type(tree, document, *node);
            self.subtypes
                .entry(name.clone())
                .or_default()
                .insert(decl.name.clone());
            entry.supers.push(SuperRef { document, name, ty });
        }
        for node in &decl.operators {
            if let NodeKind::DocOperator {
                op,
                operand,
                result,
            } = tree.kind(*node)
            {
                entry.operators.push(OperatorDef {
                    document,
                    op: op.clone(),
                    operand: operand.map(|t| doc_type(tree, document, t)),
                    result: result.map_or(LuaType::Unknown, |t| doc_type(tree, document, t)),
                });
            }
        }
        for (key, value) in &decl.index_fields {
            entry.index_fields.push(IndexField {
                document,
                key: doc_type(tree, document, *key),
                value: doc_type(tree, document, *value),
            });
        }
        if let Some(origin) = decl.origin {
            entry.origin = Some((document, doc_type(tree, document, origin)));
        }
        debug!(name = %decl.name, %document, supers = entry.supers.len(), "registered type");
    }

    pub fn find_type_info(&self, name: &str) -> Option<&TypeEntry> {
        self.types.get(name)
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeEntry> {
        self.types.values()
    }

    /// Attach a member declaration to a named type.
    ///
    /// Returns `false` when no type of that name is registered.
    pub fn add_member(&mut self, type_name: &str, member: &str, decl: DeclRef) -> bool {
        let Some(entry) = self.types.get_mut(type_name) else {
            return false;
        };
        let slot = entry.members.entry(member.to_string()).or_default();
        if !slot.contains(&decl) {
            slot.push(decl);
        }
        trace!(type_name, member, "added member");
        true
    }

    /// Attach a member assigned after construction to a table constructor
    pub fn add_table_member(&mut self, table: SyntaxRef, member: &str, decl: DeclRef) {
        let slot = self
            .table_members
            .entry(table)
            .or_default()
            .entry(member.to_string())
            .or_default();
        if !slot.contains(&decl) {
            slot.push(decl);
        }
    }

    pub fn table_members(&self, table: SyntaxRef) -> Option<&IndexMap<String, Vec<DeclRef>>> {
        self.table_members.get(&table)
    }

    pub fn add_global(&mut self, name: &str, decl: DeclRef) {
        self.globals.entry(name.to_string()).or_default().push(decl);
    }

    pub fn globals(&self, name: &str) -> &[DeclRef] {
        self.globals.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn global_names(&self) -> impl Iterator<Item = &str> {
        self.globals.keys().map(String::as_str)
    }

    pub fn add_export_type(&mut self, document: DocumentId, ty: LuaType) {
        self.exports.insert(document, ty);
    }

    pub fn export_type(&self, document: DocumentId) -> Option<&LuaType> {
        self.exports.get(&document)
    }

    /// Types that name `name` as a direct super
    pub fn subtypes(&self, name: &str) -> impl Iterator<Item = &str> {
        self.subtypes
            .get(name)
            .into_iter()
            .flat_map(|subs| subs.iter().map(String::as_str))
    }

    /// Remove everything `document` contributed
    pub fn remove_document(&mut self, document: DocumentId) {
        self.detached_members.retain(|_, members| {
            members.retain(|_, decls| {
                decls.retain(|d| d.document != document);
                !decls.is_empty()
            });
            !members.is_empty()
        });

        let mut removed: Vec<String> = Vec::new();
        let detached = &mut self.detached_members;
        self.types.retain(|name, entry| {
            let empty = entry.prune(document);
            if empty {
                removed.push(name.clone());
                // prune kept only members declared by other documents
                if !entry.members.is_empty() {
                    detached.insert(name.clone(), std::mem::take(&mut entry.members));
                }
            }
            !empty
        });
        self.rebuild_subtypes();

        self.globals.retain(|_, decls| {
            decls.retain(|d| d.document != document);
            !decls.is_empty()
        });
        self.table_members.retain(|table, members| {
            if table.document == document {
                return false;
            }
            members.retain(|_, decls| {
                decls.retain(|d| d.document != document);
                !decls.is_empty()
            });
            !members.is_empty()
        });
        self.exports.remove(&document);
        debug!(%document, removed = removed.len(), remaining = self.types.len(), "pruned document from index");
    }

    fn rebuild_subtypes(&mut self) {
        self.subtypes.clear();
        for entry in self.types.values() {
            for sup in &entry.supers {
                self.subtypes
                    .entry(sup.name.clone())
                    .or_default()
                    .insert(entry.name.clone());
            }
        }
    }
}

impl TypeHierarchy for TypeIndex {
    fn super_names(&self, name: &str) -> Vec<String> {
        self.types
            .get(name)
            .map(|entry| entry.supers.iter().map(|s| s.name.clone()).collect())
            .unwrap_or_default()
    }

    fn alias_origin(&self, name: &str) -> Option<LuaType> {
        self.types.get(name).and_then(|e| e.alias_origin()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class_tag(tree: &SyntaxTree) -> NodeId {
        tree.ids()
            .find(|id| matches!(tree.kind(*id), NodeKind::DocClass { .. }))
            .expect("no class tag")
    }

    #[test]
    fn test_partial_contributions_and_removal() {
        let tree = SyntaxTree::parse("---@class (partial) Foo");
        let node = class_tag(&tree);
        let decl = TypeDeclaration::new("Foo", NamedKind::Class, node);
        let mut index = TypeIndex::new();
        index.register_type(DocumentId(1), &tree, &decl, [("a".to_string(), DeclId(0))]);
        index.register_type(DocumentId(2), &tree, &decl, [("b".to_string(), DeclId(0))]);

        let entry = index.find_type_info("Foo").expect("registered");
        assert_eq!(entry.contributors().count(), 2);
        assert_eq!(entry.members().len(), 2);

        index.remove_document(DocumentId(2));
        let entry = index.find_type_info("Foo").expect("still registered");
        assert_eq!(entry.member("a").len(), 1);
        assert!(entry.member("b").is_empty());

        index.remove_document(DocumentId(1));
        assert!(index.find_type_info("Foo").is_none());
    }

    #[test]
    fn test_foreign_members_survive_redeclaration() {
        let tree = SyntaxTree::parse("---@class Point");
        let node = class_tag(&tree);
        let decl = TypeDeclaration::new("Point", NamedKind::Class, node);
        let mut index = TypeIndex::new();
        index.register_type(DocumentId(1), &tree, &decl, [("x".to_string(), DeclId(0))]);
        assert!(index.add_member("Point", "norm", DeclRef::new(DocumentId(2), DeclId(3))));

        index.remove_document(DocumentId(1));
        assert!(index.find_type_info("Point").is_none());

        index.register_type(DocumentId(1), &tree, &decl, [("x".to_string(), DeclId(0))]);
        let entry = index.find_type_info("Point").expect("registered again");
        assert_eq!(entry.member("norm"), &[DeclRef::new(DocumentId(2), DeclId(3))]);
        assert_eq!(entry.member("x").len(), 1);

        // a detached member goes away with its own document
        index.remove_document(DocumentId(1));
        index.remove_document(DocumentId(2));
        index.register_type(DocumentId(1), &tree, &decl, []);
        let entry = index.find_type_info("Point").expect("registered again");
        assert!(entry.member("norm").is_empty());
    }

    #[test]
    fn test_subtypes_pruned_with_last_contributor() {
        let tree = SyntaxTree::parse("---@class Dog : Animal");
        let node = class_tag(&tree);
        let supers = match tree.kind(node) {
            NodeKind::DocClass { supers, .. } => supers.clone(),
            _ => unreachable!(),
        };
        let mut decl = TypeDeclaration::new("Dog", NamedKind::Class, node);
        decl.supers = supers;
        let mut index = TypeIndex::new();
        index.register_type(DocumentId(3), &tree, &decl, []);
        assert_eq!(index.subtypes("Animal").collect::<Vec<_>>(), vec!["Dog"]);
        assert_eq!(index.super_names("Dog"), vec!["Animal".to_string()]);

        index.remove_document(DocumentId(3));
        assert_eq!(index.subtypes("Animal").count(), 0);
    }

    #[test]
    fn test_globals_and_exports_pruned() {
        let mut index = TypeIndex::new();
        index.add_global("g", DeclRef::new(DocumentId(1), DeclId(0)));
        index.add_global("g", DeclRef::new(DocumentId(2), DeclId(4)));
        index.add_export_type(DocumentId(2), LuaType::Integer);
        assert!(!index.add_member("Missing", "x", DeclRef::new(DocumentId(1), DeclId(1))));

        index.remove_document(DocumentId(2));
        assert_eq!(index.globals("g").len(), 1);
        assert!(index.export_type(DocumentId(2)).is_none());
    }
}
