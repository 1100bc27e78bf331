//! Shared harness for integration tests
//!
//! Wraps a [`Compilation`] with helpers that address expressions and
//! declarations by their source text.

#![allow(dead_code)]

use luanext_analysis::{
    AnalysisOptions, Compilation, DeclRef, DocumentId, LuaType, SearchContext, SyntaxRef,
};

pub struct AnalysisHarness {
    pub compilation: Compilation,
}

impl AnalysisHarness {
    /// Harness with the builtin prelude loaded
    pub fn new() -> Self {
        Self {
            compilation: Compilation::default(),
        }
    }

    /// Harness without the prelude, so reports only cover test documents
    pub fn bare() -> Self {
        Self::with_options(AnalysisOptions {
            load_builtins: false,
            ..Default::default()
        })
    }

    pub fn with_options(options: AnalysisOptions) -> Self {
        Self {
            compilation: Compilation::new(options),
        }
    }

    pub fn add(&mut self, path: &str, source: &str) -> DocumentId {
        self.compilation.add_document(path, source)
    }

    pub fn context(&self) -> SearchContext<'_> {
        self.compilation.search_context()
    }

    /// First expression in `document` whose source text is `text`
    pub fn expr(&self, document: DocumentId, text: &str) -> SyntaxRef {
        let tree = self
            .compilation
            .syntax(document)
            .expect("document should exist");
        let node = tree
            .find_expr(text)
            .unwrap_or_else(|| panic!("no expression `{}`", text));
        SyntaxRef::new(document, node)
    }

    /// Type of the first expression whose text is `text`
    pub fn type_of(&self, document: DocumentId, text: &str) -> LuaType {
        let expr = self.expr(document, text);
        self.context().infer(expr)
    }

    /// Last declaration named `name` in `document`
    pub fn decl(&self, document: DocumentId, name: &str) -> DeclRef {
        let decls = self
            .compilation
            .declarations(document)
            .expect("document should exist");
        decls
            .decls()
            .filter(|d| d.name == name)
            .last()
            .map(|d| d.decl_ref())
            .unwrap_or_else(|| panic!("no declaration `{}`", name))
    }

    /// Type of the last declaration named `name`
    pub fn decl_type(&self, document: DocumentId, name: &str) -> LuaType {
        let decl = self.decl(document, name);
        self.context().declaration_type(decl)
    }

    pub fn render(&self, ty: &LuaType) -> String {
        self.context().render_type(ty)
    }
}
