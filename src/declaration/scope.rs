use super::{DeclId, DeclarationTree};
use crate::syntax::{NodeId, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

impl ScopeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Visibility rule a scope applies to positions inside it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Chunk, function body, `do`, `while`, `if` branches
    Block,
    /// Names of a `local` statement; visible only after the statement ends
    LocalStat,
    /// `repeat ... until cond`; the condition sees the body's locals
    Repeat,
    /// Numeric and generic `for`; the loop variables exist from `body_start` on
    ForRange { body_start: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeChild {
    Decl(DeclId),
    Scope(ScopeId),
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    /// Node that owns the scope
    pub node: NodeId,
    pub span: Span,
    pub parent: Option<ScopeId>,
    /// Sorted by source position
    children: Vec<ScopeChild>,
}

impl Scope {
    pub fn children(&self) -> &[ScopeChild] {
        &self.children
    }
}

impl DeclarationTree {
    pub(crate) fn push_scope(
        &mut self,
        kind: ScopeKind,
        node: NodeId,
        span: Span,
        parent: Option<ScopeId>,
    ) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            id,
            kind,
            node,
            span,
            parent,
            children: Vec::new(),
        });
        self.scope_owners.insert(node, id);
        if let Some(parent) = parent {
            self.insert_child(parent, ScopeChild::Scope(id), span.start);
        }
        id
    }

    /// Register a declaration and, for lexical ones, place it in `scope`
    pub(crate) fn declare(&mut self, scope: Option<ScopeId>, decl: super::Declaration) -> DeclId {
        let position = decl.position;
        let lexical = decl.kind.is_lexical();
        let id = self.push_decl(decl);
        if let (Some(scope), true) = (scope, lexical) {
            self.insert_child(scope, ScopeChild::Decl(id), position);
        }
        id
    }

    fn insert_child(&mut self, scope: ScopeId, child: ScopeChild, position: u32) {
        let index = {
            let children = &self.scopes[scope.index()].children;
            children.partition_point(|c| self.child_position(*c) <= position)
        };
        self.scopes[scope.index()].children.insert(index, child);
    }

    fn child_position(&self, child: ScopeChild) -> u32 {
        match child {
            ScopeChild::Decl(id) => self.decl(id).position,
            ScopeChild::Scope(id) => self.scope(id).span.start,
        }
    }

    /// Walk outward from `scope` looking for a local named `name` that is
    /// visible at `position`
    pub fn lookup(&self, name: &str, position: u32, scope: ScopeId) -> Option<DeclId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let scope = self.scope(id);
            if let Some(found) = self.lookup_in_scope(scope, name, position) {
                return Some(found);
            }
            current = scope.parent;
        }
        None
    }

    fn lookup_in_scope(&self, scope: &Scope, name: &str, position: u32) -> Option<DeclId> {
        match scope.kind {
            // the initializer cannot see the names it defines
            ScopeKind::LocalStat if position < scope.span.end => return None,
            // generator expressions run before the loop variables exist
            ScopeKind::ForRange { body_start } if position < body_start => return None,
            _ => {}
        }
        let end = scope
            .children
            .partition_point(|c| self.child_position(*c) < position);
        for child in scope.children[..end].iter().rev() {
            match *child {
                ScopeChild::Decl(id) => {
                    if self.decl(id).name == name {
                        return Some(id);
                    }
                }
                ScopeChild::Scope(nested) => {
                    let nested = self.scope(nested);
                    if nested.kind == ScopeKind::LocalStat && nested.span.end <= position {
                        let found = nested.children.iter().rev().find_map(|c| match *c {
                            ScopeChild::Decl(id) if self.decl(id).name == name => Some(id),
                            _ => None,
                        });
                        if found.is_some() {
                            return found;
                        }
                    }
                }
            }
        }
        None
    }

    /// Every local visible at `position` inside `scope`, innermost first
    pub fn visible_locals(&self, position: u32, scope: ScopeId) -> Vec<DeclId> {
        let mut out: Vec<DeclId> = Vec::new();
        let mut current = Some(scope);
        while let Some(id) = current {
            let scope = self.scope(id);
            let blocked = match scope.kind {
                ScopeKind::LocalStat => position < scope.span.end,
                ScopeKind::ForRange { body_start } => position < body_start,
                _ => false,
            };
            if !blocked {
                let end = scope
                    .children
                    .partition_point(|c| self.child_position(*c) < position);
                for child in scope.children[..end].iter().rev() {
                    match *child {
                        ScopeChild::Decl(id) => out.push(id),
                        ScopeChild::Scope(nested) => {
                            let nested = self.scope(nested);
                            if nested.kind == ScopeKind::LocalStat && nested.span.end <= position {
                                out.extend(nested.children.iter().rev().filter_map(|c| match *c {
                                    ScopeChild::Decl(id) => Some(id),
                                    ScopeChild::Scope(_) => None,
                                }));
                            }
                        }
                    }
                }
            }
            current = scope.parent;
        }
        let mut seen = rustc_hash::FxHashSet::default();
        out.retain(|id| seen.insert(self.decl(*id).name.clone()));
        out
    }
}
