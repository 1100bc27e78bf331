//! Annotated declarations of the Lua standard library, embedded at compile
//! time and loaded as an ordinary document.

/// Path the prelude document is registered under
pub const BUILTINS_PATH: &str = "@builtin/prelude.lua";

/// Global functions plus the `string`, `table` and `math` libraries
pub const BUILTINS: &str = include_str!("builtins.lua");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::SyntaxTree;

    #[test]
    fn test_prelude_parses_cleanly() {
        let tree = SyntaxTree::parse(BUILTINS);
        assert!(
            tree.diagnostics().is_empty(),
            "prelude diagnostics: {:?}",
            tree.diagnostics()
        );
    }
}
