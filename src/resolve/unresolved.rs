use crate::declaration::DeclRef;
use crate::syntax::{DocumentId, NodeId, SyntaxRef};

/// Pending concerns of one work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ResolveState(u8);

impl ResolveState {
    pub const NONE: ResolveState = ResolveState(0);
    pub const UNRESOLVED_TYPE: ResolveState = ResolveState(1 << 0);
    pub const UNRESOLVED_INDEX: ResolveState = ResolveState(1 << 1);
    pub const UNRESOLVED_RETURN: ResolveState = ResolveState(1 << 2);
    pub const UNRESOLVED_PARAMETERS: ResolveState = ResolveState(1 << 3);

    const ALL: [ResolveState; 4] = [
        Self::UNRESOLVED_TYPE,
        Self::UNRESOLVED_INDEX,
        Self::UNRESOLVED_RETURN,
        Self::UNRESOLVED_PARAMETERS,
    ];

    #[inline]
    pub const fn contains(self, other: ResolveState) -> bool {
        (self.0 & other.0) == other.0
    }

    #[inline]
    pub const fn is_resolved(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: ResolveState) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: ResolveState) {
        self.0 &= !other.0;
    }

    /// Single-bit states still pending
    pub fn pending(self) -> impl Iterator<Item = ResolveState> {
        Self::ALL.into_iter().filter(move |s| self.contains(*s))
    }
}

impl std::ops::BitOr for ResolveState {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        ResolveState(self.0 | rhs.0)
    }
}

/// What a deferred work item has to do once its blockers infer
#[derive(Debug, Clone, PartialEq)]
pub enum UnresolvedKind {
    /// Type a declaration from value `index` of `expr`
    Type {
        decl: DeclRef,
        expr: NodeId,
        index: usize,
    },
    /// Attach a member declared through `target` (an index expression) to
    /// the prefix's type, and type it from `value` when given
    Index {
        decl: DeclRef,
        target: NodeId,
        value: Option<(NodeId, usize)>,
    },
    /// Infer the returns of a closure, or the export of a chunk
    Return { closure: NodeId },
    /// Type a callback's parameters from the callee's declared parameter
    Parameters {
        closure: NodeId,
        call: NodeId,
        arg_index: usize,
    },
    /// Type generic `for` variables through the iterator protocol
    ForRange {
        decls: Vec<DeclRef>,
        exprs: Vec<NodeId>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedItem {
    pub document: DocumentId,
    pub kind: UnresolvedKind,
    pub state: ResolveState,
}

impl UnresolvedItem {
    pub fn resolved_type(decl: DeclRef, expr: NodeId, index: usize) -> Self {
        Self {
            document: decl.document,
            kind: UnresolvedKind::Type { decl, expr, index },
            state: ResolveState::UNRESOLVED_TYPE,
        }
    }

    pub fn resolved_index(decl: DeclRef, target: NodeId, value: Option<(NodeId, usize)>) -> Self {
        let mut state = ResolveState::UNRESOLVED_INDEX;
        if value.is_some() {
            state.insert(ResolveState::UNRESOLVED_TYPE);
        }
        Self {
            document: decl.document,
            kind: UnresolvedKind::Index {
                decl,
                target,
                value,
            },
            state,
        }
    }

    pub fn resolved_return(document: DocumentId, closure: NodeId) -> Self {
        Self {
            document,
            kind: UnresolvedKind::Return { closure },
            state: ResolveState::UNRESOLVED_RETURN,
        }
    }

    pub fn resolved_parameters(
        document: DocumentId,
        closure: NodeId,
        call: NodeId,
        arg_index: usize,
    ) -> Self {
        Self {
            document,
            kind: UnresolvedKind::Parameters {
                closure,
                call,
                arg_index,
            },
            state: ResolveState::UNRESOLVED_PARAMETERS,
        }
    }

    pub fn resolved_for_range(document: DocumentId, decls: Vec<DeclRef>, exprs: Vec<NodeId>) -> Self {
        Self {
            document,
            kind: UnresolvedKind::ForRange { decls, exprs },
            state: ResolveState::UNRESOLVED_TYPE,
        }
    }

    /// Node the item is anchored at, used to order forced resolution
    pub fn anchor(&self) -> SyntaxRef {
        let node = match &self.kind {
            UnresolvedKind::Type { expr, .. } => *expr,
            UnresolvedKind::Index { target, .. } => *target,
            UnresolvedKind::Return { closure } => *closure,
            UnresolvedKind::Parameters { closure, .. } => *closure,
            UnresolvedKind::ForRange { exprs, .. } => exprs.first().copied().unwrap_or(NodeId(0)),
        };
        SyntaxRef::new(self.document, node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::DeclId;

    #[test]
    fn test_index_item_carries_both_states() {
        let decl = DeclRef::new(DocumentId(0), DeclId(1));
        let item = UnresolvedItem::resolved_index(decl, NodeId(4), Some((NodeId(5), 0)));
        assert!(item.state.contains(ResolveState::UNRESOLVED_INDEX));
        assert!(item.state.contains(ResolveState::UNRESOLVED_TYPE));
        assert_eq!(item.state.pending().count(), 2);

        let mut state = item.state;
        state.remove(ResolveState::UNRESOLVED_INDEX);
        assert!(!state.is_resolved());
        state.remove(ResolveState::UNRESOLVED_TYPE);
        assert!(state.is_resolved());
    }

    #[test]
    fn test_member_without_value_only_waits_on_index() {
        let decl = DeclRef::new(DocumentId(0), DeclId(0));
        let item = UnresolvedItem::resolved_index(decl, NodeId(1), None);
        assert_eq!(item.state, ResolveState::UNRESOLVED_INDEX);
        assert_eq!(item.anchor(), SyntaxRef::new(DocumentId(0), NodeId(1)));
    }
}
