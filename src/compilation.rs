//! The set of documents analyzed together.
//!
//! Adding documents parses them, builds their declaration trees, registers
//! their annotated types and globals, then runs one resolve pass over the
//! work items of every document added in the batch.

use crate::config::AnalysisOptions;
use crate::declaration::{DeclRef, Declaration, DeclarationBuilder, DeclarationTree};
use crate::diagnostics::DiagnosticHandler;
use crate::errors::AnalysisError;
use crate::index::{TypeDeclaration, TypeIndex};
use crate::inference::SearchContext;
use crate::metrics::ResolveReport;
use crate::resolve::{analyze, UnresolvedItem};
use crate::stdlib;
use crate::syntax::{DocumentId, SyntaxRef, SyntaxTree};
use crate::types::LuaType;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// One source file of the compilation
#[derive(Debug)]
pub struct Document {
    pub id: DocumentId,
    pub path: PathBuf,
    /// Name `require` finds the document by (`a/b/init.lua` is `a.b`)
    pub module: String,
    pub syntax: Arc<SyntaxTree>,
    pub decls: DeclarationTree,
}

pub struct Compilation {
    options: AnalysisOptions,
    documents: IndexMap<DocumentId, Document>,
    next_id: u32,
    index: TypeIndex,
    /// Inferred returns of unannotated functions, settled by the resolver
    closure_returns: FxHashMap<SyntaxRef, Vec<LuaType>>,
    last_report: ResolveReport,
}

impl Compilation {
    pub fn new(options: AnalysisOptions) -> Self {
        let load_builtins = options.load_builtins;
        let mut compilation = Self {
            options,
            documents: IndexMap::new(),
            next_id: 0,
            index: TypeIndex::new(),
            closure_returns: FxHashMap::default(),
            last_report: ResolveReport::default(),
        };
        if load_builtins {
            compilation.add_document(stdlib::BUILTINS_PATH, stdlib::BUILTINS);
        }
        compilation
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    /// Parse and analyze one document
    pub fn add_document(&mut self, path: impl AsRef<Path>, source: &str) -> DocumentId {
        let ids = self.add_documents([(path.as_ref().to_path_buf(), source.to_string())]);
        ids[0]
    }

    /// Parse and analyze a batch of documents, resolving them together so
    /// that the order inside the batch does not matter
    #[instrument(skip(self, batch))]
    pub fn add_documents(
        &mut self,
        batch: impl IntoIterator<Item = (PathBuf, String)>,
    ) -> Vec<DocumentId> {
        let mut ids = Vec::new();
        let mut unresolved = Vec::new();
        for (path, source) in batch {
            let id = DocumentId(self.next_id);
            self.next_id += 1;
            unresolved.extend(self.build_document(id, path, &source));
            ids.push(id);
        }
        self.resolve(unresolved);
        ids
    }

    /// Read a document from disk and add it
    pub fn load_document(&mut self, path: impl AsRef<Path>) -> Result<DocumentId, AnalysisError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        Ok(self.add_document(path, &source))
    }

    /// Replace the source of a document, keeping its id
    pub fn update_document(&mut self, id: DocumentId, source: &str) -> Result<(), AnalysisError> {
        let document = self
            .documents
            .get(&id)
            .ok_or(AnalysisError::DocumentNotFound(id))?;
        let path = document.path.clone();
        self.remove_contribution(id);
        let unresolved = self.build_document(id, path, source);
        self.resolve(unresolved);
        Ok(())
    }

    pub fn remove_document(&mut self, id: DocumentId) -> Result<(), AnalysisError> {
        if !self.documents.contains_key(&id) {
            return Err(AnalysisError::DocumentNotFound(id));
        }
        self.remove_contribution(id);
        info!(document = %id, "removed document");
        Ok(())
    }

    fn remove_contribution(&mut self, id: DocumentId) {
        self.documents.shift_remove(&id);
        self.index.remove_document(id);
        self.closure_returns.retain(|closure, _| closure.document != id);
    }

    fn build_document(&mut self, id: DocumentId, path: PathBuf, source: &str) -> Vec<UnresolvedItem> {
        let syntax = Arc::new(SyntaxTree::parse(source));
        let analysis = DeclarationBuilder::new(id, &syntax).build();
        self.register(id, &syntax, &analysis.tree, &analysis.types);
        let module = module_name(&path);
        debug!(
            document = %id,
            path = %path.display(),
            module = %module,
            diagnostics = syntax.diagnostics().len(),
            "added document"
        );
        self.documents.insert(
            id,
            Document {
                id,
                path,
                module,
                syntax,
                decls: analysis.tree,
            },
        );
        analysis.unresolved
    }

    fn register(
        &mut self,
        id: DocumentId,
        syntax: &SyntaxTree,
        decls: &DeclarationTree,
        types: &[TypeDeclaration],
    ) {
        for ty in types {
            let members = ty
                .members
                .iter()
                .map(|member| (decls.decl(*member).name.clone(), *member));
            self.index.register_type(id, syntax, ty, members);
        }
        for global in decls.globals() {
            self.index.add_global(&global.name, global.decl_ref());
        }
    }

    fn resolve(&mut self, unresolved: Vec<UnresolvedItem>) {
        let report = analyze(self, unresolved);
        self.last_report = report;
    }

    /// Report of the resolve pass run by the last edit
    pub fn last_report(&self) -> &ResolveReport {
        &self.last_report
    }

    pub fn document(&self, id: DocumentId) -> Option<&Document> {
        self.documents.get(&id)
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    pub fn syntax(&self, id: DocumentId) -> Option<&SyntaxTree> {
        self.documents.get(&id).map(|doc| doc.syntax.as_ref())
    }

    pub fn declarations(&self, id: DocumentId) -> Option<&DeclarationTree> {
        self.documents.get(&id).map(|doc| &doc.decls)
    }

    pub fn decl(&self, decl: DeclRef) -> Option<&Declaration> {
        let tree = self.declarations(decl.document)?;
        (decl.decl.index() < tree.len()).then(|| tree.decl(decl.decl))
    }

    pub(crate) fn decl_mut(&mut self, decl: DeclRef) -> Option<&mut Declaration> {
        let tree = &mut self.documents.get_mut(&decl.document)?.decls;
        (decl.decl.index() < tree.len()).then(|| tree.decl_mut(decl.decl))
    }

    pub fn index(&self) -> &TypeIndex {
        &self.index
    }

    pub(crate) fn index_mut(&mut self) -> &mut TypeIndex {
        &mut self.index
    }

    pub fn closure_returns(&self, closure: SyntaxRef) -> Option<&[LuaType]> {
        self.closure_returns.get(&closure).map(Vec::as_slice)
    }

    pub(crate) fn set_closure_returns(&mut self, closure: SyntaxRef, returns: Vec<LuaType>) {
        self.closure_returns.insert(closure, returns);
    }

    /// A fresh query session over the current state
    pub fn search_context(&self) -> SearchContext<'_> {
        SearchContext::new(self)
    }

    /// Send the syntax diagnostics of a document to `handler`
    pub fn report_diagnostics(&self, id: DocumentId, handler: &dyn DiagnosticHandler) {
        if let Some(syntax) = self.syntax(id) {
            for diagnostic in syntax.diagnostics() {
                handler.report(diagnostic.clone());
            }
        }
    }

    /// Document a `require` of `module` loads, trying each configured path
    /// pattern in order
    pub fn find_module(&self, module: &str) -> Option<DocumentId> {
        let relative = module.replace('.', "/");
        for pattern in &self.options.require_patterns {
            let candidate = PathBuf::from(pattern.replace('?', &relative));
            let found = self
                .documents
                .values()
                .find(|doc| doc.path == candidate || doc.path.ends_with(&candidate));
            if let Some(doc) = found {
                return Some(doc.id);
            }
        }
        self.documents
            .values()
            .find(|doc| doc.module == module)
            .map(|doc| doc.id)
    }

    pub fn require_module(&self, module: &str) -> Result<DocumentId, AnalysisError> {
        self.find_module(module)
            .ok_or_else(|| AnalysisError::ModuleNotFound(module.to_string()))
    }
}

impl Default for Compilation {
    fn default() -> Self {
        Self::new(AnalysisOptions::default())
    }
}

impl std::fmt::Debug for Compilation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compilation")
            .field("documents", &self.documents.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// `a/b.lua` and `a/b/init.lua` are both module `a.b`
fn module_name(path: &Path) -> String {
    let mut parts: Vec<String> = path
        .with_extension("")
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.len() > 1 && parts.last().is_some_and(|last| last == "init") {
        parts.pop();
    }
    parts.join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare() -> Compilation {
        Compilation::new(AnalysisOptions {
            load_builtins: false,
            ..Default::default()
        })
    }

    #[test]
    fn test_module_names() {
        assert_eq!(module_name(Path::new("a/b.lua")), "a.b");
        assert_eq!(module_name(Path::new("a/b/init.lua")), "a.b");
        assert_eq!(module_name(Path::new("./main.lua")), "main");
    }

    #[test]
    fn test_find_module_uses_patterns() {
        let mut compilation = bare();
        let util = compilation.add_document("lib/util/init.lua", "return {}");
        let main = compilation.add_document("main.lua", "local u = require('util')");
        assert_eq!(compilation.find_module("lib.util"), Some(util));
        assert_eq!(compilation.find_module("util"), Some(util));
        assert_eq!(compilation.find_module("main"), Some(main));
        assert!(matches!(
            compilation.require_module("missing"),
            Err(AnalysisError::ModuleNotFound(_))
        ));
    }

    #[test]
    fn test_update_and_remove() {
        let mut compilation = bare();
        let id = compilation.add_document("a.lua", "x = 1");
        assert_eq!(compilation.index().globals("x").len(), 1);

        compilation.update_document(id, "y = 1").unwrap();
        assert!(compilation.index().globals("x").is_empty());
        assert_eq!(compilation.index().globals("y").len(), 1);

        compilation.remove_document(id).unwrap();
        assert!(compilation.document(id).is_none());
        assert!(matches!(
            compilation.remove_document(id),
            Err(AnalysisError::DocumentNotFound(_))
        ));
    }

    #[test]
    fn test_builtins_loaded_by_default() {
        let compilation = Compilation::default();
        assert!(!compilation.index().globals("print").is_empty());
        assert!(compilation.index().find_type_info("string").is_some());
    }
}
