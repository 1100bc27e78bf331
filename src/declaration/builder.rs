use super::{
    ClosureInfo, DeclFeatures, DeclId, DeclKind, DeclRef, Declaration, DeclarationTree, ScopeId,
    ScopeKind, TypeSource,
};
use crate::index::{NamedKind, TypeDeclaration, TypeFlags};
use crate::resolve::UnresolvedItem;
use crate::syntax::{
    ClassKind, DocFieldKey, DocFlag, DocumentId, FieldKey, IndexKey, Name, NodeId, NodeKind,
    NumberValue, Span, SyntaxTree, Visibility,
};
use crate::types::LuaType;
use tracing::{debug, instrument, trace};

/// Everything one walk over a document produces
#[derive(Debug)]
pub struct DocumentAnalysis {
    pub tree: DeclarationTree,
    /// `@class`, `@enum`, `@alias` and `@interface` declarations
    pub types: Vec<TypeDeclaration>,
    pub unresolved: Vec<UnresolvedItem>,
}

/// Facts read from the annotation block of a statement
#[derive(Debug, Default)]
struct StatDocs {
    node: Option<NodeId>,
    types: Vec<NodeId>,
    /// Index into the builder's type list of a `@class`/`@enum` bound to the
    /// first declared name
    declared: Option<usize>,
    features: DeclFeatures,
    visibility: Option<Visibility>,
    params: Vec<(String, NodeId, bool)>,
    generics: Vec<String>,
    has_return: bool,
}

impl StatDocs {
    fn param(&self, name: &str) -> Option<(NodeId, bool)> {
        self.params
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, ty, optional)| (*ty, *optional))
    }
}

/// Walks a syntax tree once, pushing a scope at each scope-introducing
/// construct and a declaration at each binding construct.
pub struct DeclarationBuilder<'a> {
    document: DocumentId,
    syntax: &'a SyntaxTree,
    tree: DeclarationTree,
    scope: Option<ScopeId>,
    types: Vec<TypeDeclaration>,
    unresolved: Vec<UnresolvedItem>,
}

impl<'a> DeclarationBuilder<'a> {
    pub fn new(document: DocumentId, syntax: &'a SyntaxTree) -> Self {
        Self {
            document,
            syntax,
            tree: DeclarationTree::new(document, syntax.len()),
            scope: None,
            types: Vec::new(),
            unresolved: Vec::new(),
        }
    }

    #[instrument(skip(self), fields(document = %self.document))]
    pub fn build(mut self) -> DocumentAnalysis {
        let root = self.syntax.root();
        if let NodeKind::Chunk { block } = self.syntax.kind(root) {
            let block = *block;
            let scope = self
                .tree
                .push_scope(ScopeKind::Block, root, self.syntax.span(root), None);
            self.scope = Some(scope);
            self.visit_stats(block);
            if self.block_has_return(block) {
                self.unresolved
                    .push(UnresolvedItem::resolved_return(self.document, root));
            }
            self.scope = None;
        }
        debug!(
            decls = self.tree.len(),
            types = self.types.len(),
            unresolved = self.unresolved.len(),
            "built declaration tree"
        );
        DocumentAnalysis {
            tree: self.tree,
            types: self.types,
            unresolved: self.unresolved,
        }
    }

    fn block_has_return(&self, block: NodeId) -> bool {
        match self.syntax.kind(block) {
            NodeKind::Block { stats } => stats
                .iter()
                .any(|s| matches!(self.syntax.kind(*s), NodeKind::ReturnStat { .. })),
            _ => false,
        }
    }

    fn with_scope(&mut self, kind: ScopeKind, owner: NodeId, span: Span, f: impl FnOnce(&mut Self)) {
        let parent = self.scope;
        let scope = self.tree.push_scope(kind, owner, span, parent);
        self.scope = Some(scope);
        f(self);
        self.scope = parent;
    }

    fn visit_block(&mut self, block: NodeId) {
        let span = self.syntax.span(block);
        self.with_scope(ScopeKind::Block, block, span, |this| this.visit_stats(block));
    }

    fn visit_stats(&mut self, block: NodeId) {
        let NodeKind::Block { stats } = self.syntax.kind(block) else {
            return;
        };
        for stat in stats.clone() {
            self.visit_stat(stat);
        }
    }

    fn visit_stat(&mut self, stat: NodeId) {
        trace!(node = ?stat, kind = self.syntax.kind(stat).label(), "visit statement");
        match self.syntax.kind(stat).clone() {
            NodeKind::LocalStat {
                names,
                values,
                docs,
            } => self.local_stat(stat, &names, &values, docs),
            NodeKind::AssignStat {
                targets,
                values,
                docs,
            } => self.assign_stat(&targets, &values, docs),
            NodeKind::CallStat { call, docs } => {
                self.read_docs(docs);
                self.visit_expr(call);
            }
            NodeKind::FuncStat {
                target,
                closure,
                docs,
            } => self.func_stat(target, closure, docs),
            NodeKind::LocalFuncStat {
                name,
                closure,
                docs,
            } => {
                let stat_docs = self.read_docs(docs);
                let mut decl = Declaration::new(self.document, &name.text, name.span, DeclKind::Local);
                decl.syntax = Some(stat);
                decl.source = TypeSource::Expr {
                    expr: closure,
                    index: 0,
                };
                self.apply_docs(&mut decl, &stat_docs);
                self.tree.declare(self.scope, decl);
                self.closure(closure, Some(&stat_docs), None);
            }
            NodeKind::ReturnStat { values } => {
                for value in values {
                    self.visit_expr(value);
                }
            }
            NodeKind::IfStat { clauses } => {
                for clause in clauses {
                    if let Some(condition) = clause.condition {
                        self.visit_expr(condition);
                    }
                    self.visit_block(clause.block);
                }
            }
            NodeKind::WhileStat { condition, block } => {
                self.visit_expr(condition);
                self.visit_block(block);
            }
            NodeKind::RepeatStat { block, condition } => {
                let span = self.syntax.span(stat);
                self.with_scope(ScopeKind::Repeat, stat, span, |this| {
                    this.visit_stats(block);
                    this.visit_expr(condition);
                });
            }
            NodeKind::ForNumStat {
                var,
                start,
                limit,
                step,
                block,
            } => {
                let span = self.syntax.span(stat);
                let body_start = self.syntax.span(block).start;
                self.with_scope(ScopeKind::ForRange { body_start }, stat, span, |this| {
                    for expr in [Some(start), Some(limit), step].into_iter().flatten() {
                        this.visit_expr(expr);
                    }
                    let mut decl =
                        Declaration::new(this.document, &var.text, var.span, DeclKind::Local);
                    decl.syntax = Some(stat);
                    decl.source = TypeSource::Expr {
                        expr: start,
                        index: 0,
                    };
                    let id = this.tree.declare(this.scope, decl);
                    this.unresolved.push(UnresolvedItem::resolved_type(
                        DeclRef::new(this.document, id),
                        start,
                        0,
                    ));
                    this.visit_stats(block);
                });
            }
            NodeKind::ForInStat { vars, exprs, block } => {
                let span = self.syntax.span(stat);
                let body_start = self.syntax.span(block).start;
                self.with_scope(ScopeKind::ForRange { body_start }, stat, span, |this| {
                    for expr in &exprs {
                        this.visit_expr(*expr);
                    }
                    let decls: Vec<DeclRef> = vars
                        .iter()
                        .map(|var| {
                            let mut decl = Declaration::new(
                                this.document,
                                &var.text,
                                var.span,
                                DeclKind::Local,
                            );
                            decl.syntax = Some(stat);
                            DeclRef::new(this.document, this.tree.declare(this.scope, decl))
                        })
                        .collect();
                    this.unresolved.push(UnresolvedItem::resolved_for_range(
                        this.document,
                        decls,
                        exprs.clone(),
                    ));
                    this.visit_stats(block);
                });
            }
            NodeKind::DoStat { block } => self.visit_block(block),
            NodeKind::DocStat { docs } => {
                self.read_docs(Some(docs));
            }
            _ => {}
        }
    }

    fn local_stat(&mut self, stat: NodeId, names: &[Name], values: &[NodeId], docs: Option<NodeId>) {
        let stat_docs = self.read_docs(docs);
        let span = self.syntax.span(stat);
        self.with_scope(ScopeKind::LocalStat, stat, span, |this| {
            for (i, name) in names.iter().enumerate() {
                let mut decl = Declaration::new(this.document, &name.text, name.span, DeclKind::Local);
                decl.syntax = Some(stat);
                this.apply_docs(&mut decl, &stat_docs);
                let value = value_source(this.syntax, values, i);
                let id = this.declare_valued(decl, &stat_docs, i, value);
                trace!(name = %name.text, decl = ?id, "declared local");
            }
            for (i, value) in values.iter().enumerate() {
                this.visit_value(*value, (i == 0).then_some(&stat_docs));
            }
        });
    }

    fn assign_stat(&mut self, targets: &[NodeId], values: &[NodeId], docs: Option<NodeId>) {
        let stat_docs = self.read_docs(docs);
        for (i, value) in values.iter().enumerate() {
            self.visit_value(*value, (i == 0).then_some(&stat_docs));
        }
        for (i, target) in targets.iter().enumerate() {
            let value = value_source(self.syntax, values, i);
            match self.syntax.kind(*target).clone() {
                NodeKind::NameExpr(name) => {
                    let position = self.syntax.span(*target).start;
                    let local = self
                        .scope
                        .and_then(|scope| self.tree.lookup(&name, position, scope));
                    match local {
                        Some(id) => self.reassign_local(id, &stat_docs, i, value),
                        None => {
                            let mut decl = Declaration::new(
                                self.document,
                                &name,
                                self.syntax.span(*target),
                                DeclKind::Global,
                            );
                            decl.syntax = Some(*target);
                            self.apply_docs(&mut decl, &stat_docs);
                            if i == 0 {
                                if let Some(declared) = stat_docs.declared {
                                    self.types[declared].flags |= TypeFlags::GLOBAL;
                                }
                            }
                            self.declare_valued(decl, &stat_docs, i, value);
                        }
                    }
                }
                NodeKind::IndexExpr { prefix, key } => {
                    self.visit_expr(prefix);
                    if let IndexKey::Bracket(key) = &key {
                        self.visit_expr(*key);
                    }
                    let Some((name, span)) = self.member_name(&key) else {
                        continue;
                    };
                    let mut decl = Declaration::new(self.document, name, span, DeclKind::IndexMember);
                    decl.syntax = Some(*target);
                    self.apply_docs(&mut decl, &stat_docs);
                    let doc_type = stat_docs.types.get(i).copied();
                    if let Some(ty) = doc_type {
                        decl.source = TypeSource::Doc {
                            ty,
                            optional: false,
                        };
                    } else if let Some((expr, index)) = value {
                        decl.source = TypeSource::Expr { expr, index };
                    }
                    if i == 0 {
                        if let Some(declared) = stat_docs.declared {
                            decl.set_type(LuaType::named(&self.types[declared].name));
                        }
                    }
                    let id = self.tree.declare(None, decl);
                    let typed_value = match (doc_type, value) {
                        (None, Some((expr, index))) if !self.is_closure(expr) => Some((expr, index)),
                        _ => None,
                    };
                    self.unresolved.push(UnresolvedItem::resolved_index(
                        DeclRef::new(self.document, id),
                        *target,
                        typed_value,
                    ));
                }
                _ => self.visit_expr(*target),
            }
        }
    }

    fn func_stat(&mut self, target: NodeId, closure: NodeId, docs: Option<NodeId>) {
        let stat_docs = self.read_docs(docs);
        let source = TypeSource::Expr {
            expr: closure,
            index: 0,
        };
        match self.syntax.kind(target).clone() {
            NodeKind::NameExpr(name) => {
                let position = self.syntax.span(target).start;
                let local = self
                    .scope
                    .and_then(|scope| self.tree.lookup(&name, position, scope));
                match local {
                    Some(id) => {
                        let decl = self.tree.decl_mut(id);
                        if decl.source == TypeSource::None && !decl.is_typed() {
                            decl.source = source;
                        }
                    }
                    None => {
                        let mut decl = Declaration::new(
                            self.document,
                            &name,
                            self.syntax.span(target),
                            DeclKind::Global,
                        );
                        decl.syntax = Some(target);
                        decl.source = source;
                        self.apply_docs(&mut decl, &stat_docs);
                        self.tree.declare(None, decl);
                    }
                }
                self.closure(closure, Some(&stat_docs), None);
            }
            NodeKind::IndexExpr { prefix, key } => {
                let colon = matches!(key, IndexKey::Colon(_));
                if let Some((name, span)) = self.member_name(&key) {
                    let mut decl = Declaration::new(self.document, name, span, DeclKind::Method);
                    decl.syntax = Some(target);
                    decl.source = source;
                    self.apply_docs(&mut decl, &stat_docs);
                    let id = self.tree.declare(None, decl);
                    self.unresolved.push(UnresolvedItem::resolved_index(
                        DeclRef::new(self.document, id),
                        target,
                        None,
                    ));
                }
                let self_source = colon.then_some(prefix);
                self.closure(closure, Some(&stat_docs), self_source);
            }
            _ => self.closure(closure, Some(&stat_docs), None),
        }
    }

    /// Declare `decl`, taking its type from the `index`-th `@type` or from
    /// the value feeding it
    fn declare_valued(
        &mut self,
        mut decl: Declaration,
        docs: &StatDocs,
        index: usize,
        value: Option<(NodeId, usize)>,
    ) -> DeclId {
        let doc_type = docs.types.get(index).copied();
        if let Some(ty) = doc_type {
            decl.source = TypeSource::Doc {
                ty,
                optional: false,
            };
        } else if let Some((expr, index)) = value {
            decl.source = TypeSource::Expr { expr, index };
        }
        let declared = (index == 0).then_some(docs.declared).flatten();
        if let Some(declared) = declared {
            decl.set_type(LuaType::named(&self.types[declared].name));
        }
        let lexical = decl.kind.is_lexical();
        let id = self
            .tree
            .declare(if lexical { self.scope } else { None }, decl);
        if let (None, Some((expr, index))) = (doc_type, value) {
            // a named declaration still collects the members of its table
            let is_table = matches!(self.syntax.kind(expr), NodeKind::TableExpr { .. });
            if !self.is_closure(expr) && (declared.is_none() || is_table) {
                self.unresolved.push(UnresolvedItem::resolved_type(
                    DeclRef::new(self.document, id),
                    expr,
                    index,
                ));
            }
        }
        id
    }

    /// A local assigned after its declaration without an initializer takes
    /// its type from the first assignment
    fn reassign_local(
        &mut self,
        id: DeclId,
        docs: &StatDocs,
        index: usize,
        value: Option<(NodeId, usize)>,
    ) {
        let decl = self.tree.decl(id);
        if decl.source != TypeSource::None || decl.is_typed() {
            return;
        }
        let doc_type = docs.types.get(index).copied();
        let source = match (doc_type, value) {
            (Some(ty), _) => TypeSource::Doc {
                ty,
                optional: false,
            },
            (None, Some((expr, index))) => TypeSource::Expr { expr, index },
            (None, None) => return,
        };
        self.tree.decl_mut(id).source = source;
        if let (TypeSource::Expr { expr, index }, false) = (source, value.is_some_and(|(e, _)| self.is_closure(e))) {
            self.unresolved.push(UnresolvedItem::resolved_type(
                DeclRef::new(self.document, id),
                expr,
                index,
            ));
        }
    }

    fn apply_docs(&self, decl: &mut Declaration, docs: &StatDocs) {
        decl.features |= docs.features;
        if let Some(visibility) = docs.visibility {
            decl.visibility = visibility;
        }
    }

    fn member_name(&self, key: &IndexKey) -> Option<(String, Span)> {
        match key {
            IndexKey::Dot(name) | IndexKey::Colon(name) => Some((name.text.clone(), name.span)),
            IndexKey::Bracket(expr) => {
                literal_key(self.syntax, *expr).map(|name| (name, self.syntax.span(*expr)))
            }
        }
    }

    fn is_closure(&self, node: NodeId) -> bool {
        matches!(self.syntax.kind(node), NodeKind::ClosureExpr { .. })
    }

    fn visit_value(&mut self, value: NodeId, docs: Option<&StatDocs>) {
        if self.is_closure(value) {
            self.closure(value, docs, None);
        } else {
            self.visit_expr(value);
        }
    }

    fn visit_expr(&mut self, expr: NodeId) {
        let syntax = self.syntax;
        // operator and suffix chains nest as deep as they are long, so the
        // walk keeps its own stack
        let mut pending = vec![expr];
        while let Some(expr) = pending.pop() {
            match syntax.kind(expr) {
                NodeKind::ClosureExpr { .. } => self.closure(expr, None, None),
                NodeKind::TableExpr { fields } => {
                    let fields = fields.clone();
                    self.table(expr, &fields);
                }
                kind => pending.extend(
                    kind.children()
                        .into_iter()
                        .rev()
                        .filter(|child| syntax.kind(*child).is_expression()),
                ),
            }
        }
    }

    fn table(&mut self, table: NodeId, fields: &[NodeId]) {
        let mut ids = Vec::new();
        for field in fields {
            let NodeKind::TableField { key, value } = self.syntax.kind(*field).clone() else {
                continue;
            };
            let named = match &key {
                FieldKey::Named(name) => Some((name.text.clone(), name.span)),
                FieldKey::Expr(expr) => {
                    literal_key(self.syntax, *expr).map(|name| (name, self.syntax.span(*expr)))
                }
                FieldKey::Positional => None,
            };
            if let Some((name, span)) = named {
                let mut decl = Declaration::new(self.document, name, span, DeclKind::TableField);
                decl.syntax = Some(*field);
                decl.source = TypeSource::Expr {
                    expr: value,
                    index: 0,
                };
                let id = self.tree.declare(None, decl);
                if !self.is_closure(value) {
                    self.unresolved.push(UnresolvedItem::resolved_type(
                        DeclRef::new(self.document, id),
                        value,
                        0,
                    ));
                }
                ids.push(id);
            }
            if let FieldKey::Expr(expr) = key {
                self.visit_expr(expr);
            }
            self.visit_expr(value);
        }
        self.tree.table_fields.insert(table, ids);
    }

    fn closure(&mut self, closure: NodeId, docs: Option<&StatDocs>, self_source: Option<NodeId>) {
        let NodeKind::ClosureExpr {
            params,
            vararg,
            block,
        } = self.syntax.kind(closure).clone()
        else {
            return;
        };
        let span = self.syntax.span(closure);
        let empty = StatDocs::default();
        let docs = docs.unwrap_or(&empty);
        let parent = self.scope;
        let scope = self.tree.push_scope(ScopeKind::Block, closure, span, parent);
        self.scope = Some(scope);

        for generic in &docs.generics {
            let mut decl = Declaration::new(self.document, generic, Span::new(span.start, span.start, span.line, span.column), DeclKind::GenericParam);
            decl.syntax = docs.node;
            decl.set_type(LuaType::TemplateRef(generic.clone()));
            self.tree.declare(self.scope, decl);
        }

        let self_param = self_source.map(|prefix| {
            let mut decl = Declaration::new(
                self.document,
                "self",
                Span::new(span.start, span.start, span.line, span.column),
                DeclKind::Param,
            );
            decl.syntax = Some(closure);
            decl.source = TypeSource::Expr {
                expr: prefix,
                index: 0,
            };
            let id = self.tree.declare(self.scope, decl);
            self.unresolved.push(UnresolvedItem::resolved_type(
                DeclRef::new(self.document, id),
                prefix,
                0,
            ));
            id
        });

        let mut undocumented = false;
        let param_ids: Vec<DeclId> = params
            .iter()
            .map(|param| {
                let mut decl = Declaration::new(self.document, &param.text, param.span, DeclKind::Param);
                decl.syntax = Some(closure);
                match docs.param(&param.text) {
                    Some((ty, optional)) => decl.source = TypeSource::Doc { ty, optional },
                    None => undocumented = true,
                }
                self.tree.declare(self.scope, decl)
            })
            .collect();

        if undocumented {
            if let Some((call, arg_index)) = self.call_argument(closure) {
                self.unresolved.push(UnresolvedItem::resolved_parameters(
                    self.document,
                    closure,
                    call,
                    arg_index,
                ));
            }
        }

        self.tree.closures.insert(
            closure,
            ClosureInfo {
                docs: docs.node,
                colon: self_source.is_some(),
                params: param_ids,
                self_param,
                vararg,
            },
        );

        self.visit_stats(block);
        if !docs.has_return {
            self.unresolved
                .push(UnresolvedItem::resolved_return(self.document, closure));
        }
        self.scope = parent;
    }

    /// `(call, argument index)` when `closure` is passed directly to a call
    fn call_argument(&self, closure: NodeId) -> Option<(NodeId, usize)> {
        let call = self.syntax.parent(closure)?;
        let NodeKind::CallExpr { args, .. } = self.syntax.kind(call) else {
            return None;
        };
        let index = args.iter().position(|a| *a == closure)?;
        Some((call, index))
    }

    /// Read an annotation block, registering the types it declares
    fn read_docs(&mut self, docs: Option<NodeId>) -> StatDocs {
        let mut out = StatDocs {
            node: docs,
            ..Default::default()
        };
        let Some(docs) = docs else {
            return out;
        };
        let NodeKind::DocBlock { tags } = self.syntax.kind(docs).clone() else {
            return out;
        };
        // type that following @field and @operator tags attach to
        let mut current: Option<usize> = None;
        for tag in tags {
            match self.syntax.kind(tag).clone() {
                NodeKind::DocClass {
                    name,
                    kind,
                    attributes,
                    generics,
                    supers,
                } => {
                    let named = match kind {
                        ClassKind::Class => NamedKind::Class,
                        ClassKind::Interface => NamedKind::Interface,
                    };
                    let mut decl = TypeDeclaration::new(&name.text, named, tag);
                    if attributes.partial {
                        decl.flags |= TypeFlags::PARTIAL;
                    }
                    if attributes.exact {
                        decl.flags |= TypeFlags::EXACT;
                    }
                    decl.generics = generics.iter().map(|g| g.name.text.clone()).collect();
                    decl.supers = supers;
                    current = Some(self.push_type(decl));
                    out.declared = out.declared.or(current);
                }
                NodeKind::DocEnum { name, key, base } => {
                    let mut decl = TypeDeclaration::new(&name.text, NamedKind::Enum, tag);
                    if key {
                        decl.flags |= TypeFlags::KEY_ENUM;
                    }
                    decl.origin = base;
                    current = Some(self.push_type(decl));
                    out.declared = out.declared.or(current);
                }
                NodeKind::DocAlias {
                    name,
                    generics,
                    origin,
                } => {
                    let mut decl = TypeDeclaration::new(&name.text, NamedKind::Alias, tag);
                    decl.generics = generics.iter().map(|g| g.name.text.clone()).collect();
                    decl.origin = Some(origin);
                    self.push_type(decl);
                    current = None;
                }
                NodeKind::DocField {
                    visibility,
                    key,
                    ty,
                    optional,
                } => {
                    let Some(owner) = current else {
                        continue;
                    };
                    match key {
                        DocFieldKey::Name(name) => {
                            let mut decl =
                                Declaration::new(self.document, &name.text, name.span, DeclKind::DocField);
                            decl.syntax = Some(tag);
                            decl.source = TypeSource::Doc { ty, optional };
                            if let Some(visibility) = visibility {
                                decl.visibility = visibility;
                            }
                            let id = self.tree.declare(None, decl);
                            self.types[owner].members.push(id);
                        }
                        DocFieldKey::Type(key) => self.types[owner].index_fields.push((key, ty)),
                    }
                }
                NodeKind::DocOperator { .. } => {
                    if let Some(owner) = current {
                        self.types[owner].operators.push(tag);
                    }
                }
                NodeKind::DocType { types } => out.types = types,
                NodeKind::DocParam { name, ty, optional } => {
                    out.params.push((name.text, ty, optional))
                }
                NodeKind::DocReturn { .. } => out.has_return = true,
                NodeKind::DocGeneric { params } => {
                    out.generics
                        .extend(params.into_iter().map(|p| p.name.text));
                }
                NodeKind::DocFlag(flag) => match flag {
                    DocFlag::Deprecated => out.features |= DeclFeatures::DEPRECATED,
                    DocFlag::Async => out.features |= DeclFeatures::ASYNC,
                    DocFlag::NoDiscard => out.features |= DeclFeatures::NO_DISCARD,
                    DocFlag::Visibility(visibility) => out.visibility = Some(visibility),
                },
                _ => {}
            }
        }
        out
    }

    fn push_type(&mut self, decl: TypeDeclaration) -> usize {
        trace!(name = %decl.name, kind = ?decl.kind, "type declaration");
        self.types.push(decl);
        self.types.len() - 1
    }
}

/// Initializer feeding the `index`-th name of a multiple assignment.
///
/// Names past the value list take the trailing values of a final call or
/// `...`, and get nothing otherwise.
fn value_source(tree: &SyntaxTree, values: &[NodeId], index: usize) -> Option<(NodeId, usize)> {
    if let Some(value) = values.get(index) {
        return Some((*value, 0));
    }
    let last = values.last()?;
    match tree.kind(*last) {
        NodeKind::CallExpr { .. } | NodeKind::Vararg => Some((*last, index + 1 - values.len())),
        _ => None,
    }
}

/// Member name written as a string or integer literal key
fn literal_key(tree: &SyntaxTree, expr: NodeId) -> Option<String> {
    match tree.kind(expr) {
        NodeKind::StringLit(value) => Some(value.clone()),
        NodeKind::NumberLit(NumberValue::Integer(value)) => Some(value.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(source: &str) -> (SyntaxTree, DocumentAnalysis) {
        let tree = SyntaxTree::parse(source);
        let analysis = DeclarationBuilder::new(DocumentId(0), &tree).build();
        (tree, analysis)
    }

    fn decl_named<'a>(analysis: &'a DocumentAnalysis, name: &str) -> &'a Declaration {
        analysis
            .tree
            .decls()
            .find(|d| d.name == name)
            .unwrap_or_else(|| panic!("no declaration {}", name))
    }

    #[test]
    fn test_long_operator_and_suffix_chains() {
        let terms = vec!["1"; 20_000].join(" + ");
        let path = vec!["t"; 20_000].join(".");
        let (tree, analysis) = build(&format!("local sum = {}\nlocal deep = {}", terms, path));

        assert!(tree.diagnostics().is_empty());
        assert_eq!(decl_named(&analysis, "sum").kind, DeclKind::Local);
        assert_eq!(decl_named(&analysis, "deep").kind, DeclKind::Local);
    }

    #[test]
    fn test_locals_params_and_globals() {
        let (_, analysis) = build("local a, b = 1\nfunction f(x, y) return x end\ng = 2");
        assert_eq!(decl_named(&analysis, "a").kind, DeclKind::Local);
        assert_eq!(decl_named(&analysis, "x").kind, DeclKind::Param);
        assert_eq!(decl_named(&analysis, "f").kind, DeclKind::Global);
        assert_eq!(decl_named(&analysis, "g").kind, DeclKind::Global);
        assert_eq!(analysis.tree.globals().count(), 2);
        // `b` has no value and no call to expand
        assert_eq!(decl_named(&analysis, "b").source, TypeSource::None);
    }

    #[test]
    fn test_multi_value_sources() {
        let (tree, analysis) = build("local a, b, c = f()");
        let call = tree.find_expr("f()").unwrap();
        assert_eq!(
            decl_named(&analysis, "c").source,
            TypeSource::Expr { expr: call, index: 2 }
        );
    }

    #[test]
    fn test_class_declaration_collects_fields() {
        let (_, analysis) = build(
            "---@class (partial) Point : Base\n---@field x number\n---@field y? number\nlocal Point = {}",
        );
        assert_eq!(analysis.types.len(), 1);
        let ty = &analysis.types[0];
        assert_eq!(ty.name, "Point");
        assert!(ty.flags.contains(TypeFlags::PARTIAL));
        assert_eq!(ty.members.len(), 2);
        assert_eq!(ty.supers.len(), 1);
        assert_eq!(
            decl_named(&analysis, "Point").ty(),
            Some(&LuaType::named("Point"))
        );
    }

    #[test]
    fn test_method_gets_self_and_index_item() {
        let (_, analysis) = build("local M = {}\nfunction M:go(n) return self end");
        let go = decl_named(&analysis, "go");
        assert_eq!(go.kind, DeclKind::Method);
        let this = decl_named(&analysis, "self");
        assert_eq!(this.kind, DeclKind::Param);
        assert!(analysis
            .unresolved
            .iter()
            .any(|item| matches!(item.kind, crate::resolve::UnresolvedKind::Index { decl, .. } if decl.decl == go.id)));
    }

    #[test]
    fn test_table_fields_are_declared() {
        let (tree, analysis) = build("local t = { x = 1, [\"y\"] = 2, 3, [4] = 5 }");
        let table = tree.find_expr("{ x = 1, [\"y\"] = 2, 3, [4] = 5 }").unwrap();
        let names: Vec<&str> = analysis
            .tree
            .table_fields(table)
            .iter()
            .map(|id| analysis.tree.decl(*id).name.as_str())
            .collect();
        assert_eq!(names, vec!["x", "y", "4"]);
    }

    #[test]
    fn test_callback_params_wait_on_call() {
        let (_, analysis) = build("each(list, function(item) end)");
        assert!(analysis.unresolved.iter().any(|item| matches!(
            item.kind,
            crate::resolve::UnresolvedKind::Parameters { arg_index: 1, .. }
        )));
    }

    #[test]
    fn test_deprecated_flag_applies() {
        let (_, analysis) = build("---@deprecated\nlocal old = 1");
        assert!(decl_named(&analysis, "old").is_deprecated());
    }
}
