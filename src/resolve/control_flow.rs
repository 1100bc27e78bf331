//! Control flow helpers for return inference
//!
//! Return inference needs to know whether a function body can fall off its
//! end (which yields an implicit `nil`) and which `return` statements belong
//! to the body rather than to a nested function.

use crate::syntax::{NodeId, NodeKind, SyntaxTree};

/// Check if every path through `block` ends in a return or a call to
/// `error`.
pub fn block_always_returns(tree: &SyntaxTree, block: NodeId) -> bool {
    match tree.kind(block) {
        NodeKind::Block { stats } => stats
            .iter()
            .any(|stat| statement_always_returns(tree, *stat)),
        _ => false,
    }
}

/// Check if a statement always returns.
///
/// - `return` always returns
/// - `if` returns when it has an `else` and every branch returns
/// - `do` returns when its block does
/// - `error(...)` never comes back
pub fn statement_always_returns(tree: &SyntaxTree, stat: NodeId) -> bool {
    match tree.kind(stat) {
        NodeKind::ReturnStat { .. } => true,
        NodeKind::IfStat { clauses } => {
            let has_else = clauses.iter().any(|c| c.condition.is_none());
            has_else
                && clauses
                    .iter()
                    .all(|clause| block_always_returns(tree, clause.block))
        }
        NodeKind::DoStat { block } => block_always_returns(tree, *block),
        NodeKind::CallStat { call, .. } => {
            let NodeKind::CallExpr { callee, .. } = tree.kind(*call) else {
                return false;
            };
            matches!(tree.kind(*callee), NodeKind::NameExpr(name) if name == "error")
        }
        _ => false,
    }
}

/// Every `return` statement of a function body, in source order, skipping
/// the bodies of nested functions
pub fn return_statements(tree: &SyntaxTree, block: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    collect_returns(tree, block, &mut out);
    out
}

fn collect_returns(tree: &SyntaxTree, node: NodeId, out: &mut Vec<NodeId>) {
    for child in tree.children(node) {
        match tree.kind(child) {
            NodeKind::ReturnStat { .. } => out.push(child),
            NodeKind::ClosureExpr { .. } => {}
            kind if kind.is_expression() => {}
            NodeKind::DocBlock { .. } => {}
            _ => collect_returns(tree, child, out),
        }
    }
}

/// Body block of a closure or of a chunk
pub fn body_block(tree: &SyntaxTree, node: NodeId) -> Option<NodeId> {
    match tree.kind(node) {
        NodeKind::ClosureExpr { block, .. } | NodeKind::Chunk { block } => Some(*block),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_block(tree: &SyntaxTree) -> NodeId {
        body_block(tree, tree.root()).unwrap()
    }

    #[test]
    fn test_if_without_else_falls_through() {
        let tree = SyntaxTree::parse("if x then return 1 end");
        assert!(!block_always_returns(&tree, root_block(&tree)));

        let tree = SyntaxTree::parse("if x then return 1 else return 2 end");
        assert!(block_always_returns(&tree, root_block(&tree)));
    }

    #[test]
    fn test_error_call_terminates() {
        let tree = SyntaxTree::parse("error('boom')");
        assert!(block_always_returns(&tree, root_block(&tree)));
    }

    #[test]
    fn test_nested_function_returns_are_skipped() {
        let tree = SyntaxTree::parse(
            "local function f() return 1 end\nwhile true do return 2 end\nreturn 3",
        );
        let returns = return_statements(&tree, root_block(&tree));
        assert_eq!(returns.len(), 2);
    }
}
