//! Parsing of `---@` annotation lines into doc nodes.
//!
//! Each annotation line is tokenized on its own; all produced nodes carry
//! absolute spans so declarations built from them sort correctly among the
//! code around them.

use super::lexer::{Token, TokenKind};
use super::parser::Parser;
use super::{
    ClassAttributes, ClassKind, DocFieldKey, DocFlag, DocGenericParam, DocReturnItem, Name,
    NodeId, NodeKind, Span, TyFuncParam, TyLiteral, TyTableField, Visibility,
};
use crate::diagnostics::{codes, Diagnostic, DiagnosticHandler};
use tracing::trace;

/// Tags that are accepted but carry nothing the analysis uses
const IGNORED_TAGS: &[&str] = &[
    "see",
    "meta",
    "diagnostic",
    "version",
    "source",
    "cast",
    "module",
    "language",
    "as",
    "export",
    "mapping",
];

#[derive(Debug, Clone, PartialEq)]
enum DocTokKind {
    Ident(String),
    Str(String),
    Int(i64),
    Dots,
    Punct(char),
    End,
}

#[derive(Debug, Clone)]
struct DocTok {
    kind: DocTokKind,
    span: Span,
}

fn tokenize_line(text: &str, base: Span) -> Vec<DocTok> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    let make_span = |from: usize, to: usize| {
        Span::new(
            base.start + from as u32,
            base.start + to as u32,
            base.line,
            base.column + from as u32,
        )
    };
    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        let kind = if c.is_ascii_alphabetic() || c == b'_' || c >= 0x80 {
            while i < bytes.len() {
                let b = bytes[i];
                let dotted_name = b == b'.'
                    && bytes
                        .get(i + 1)
                        .map(|n| n.is_ascii_alphabetic() || *n == b'_')
                        .unwrap_or(false);
                if b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80 || dotted_name {
                    i += 1;
                } else {
                    break;
                }
            }
            DocTokKind::Ident(text[start..i].to_string())
        } else if c.is_ascii_digit() || (c == b'-' && bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit())) {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            DocTokKind::Int(text[start..i].parse().unwrap_or(0))
        } else if c == b'"' || c == b'\'' || c == b'`' {
            i += 1;
            while i < bytes.len() && bytes[i] != c {
                i += 1;
            }
            let value = text[start + 1..i.min(bytes.len())].to_string();
            i = (i + 1).min(bytes.len());
            DocTokKind::Str(value)
        } else if text[i..].starts_with("...") {
            i += 3;
            DocTokKind::Dots
        } else {
            let ch = text[i..].chars().next().unwrap_or(' ');
            i += ch.len_utf8();
            DocTokKind::Punct(ch)
        };
        out.push(DocTok {
            kind,
            span: make_span(start, i),
        });
    }
    let end = make_span(bytes.len(), bytes.len());
    out.push(DocTok {
        kind: DocTokKind::End,
        span: end,
    });
    out
}

/// Cursor over the tokens of one annotation line
struct DocCursor {
    toks: Vec<DocTok>,
    pos: usize,
}

impl DocCursor {
    fn peek(&self) -> &DocTok {
        &self.toks[self.pos.min(self.toks.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &DocTok {
        &self.toks[(self.pos + offset).min(self.toks.len() - 1)]
    }

    fn bump(&mut self) -> DocTok {
        let tok = self.peek().clone();
        if tok.kind != DocTokKind::End {
            self.pos += 1;
        }
        tok
    }

    fn is_punct(&self, c: char) -> bool {
        self.peek().kind == DocTokKind::Punct(c)
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.is_punct(c) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Option<Name> {
        match self.peek().kind.clone() {
            DocTokKind::Ident(text) => {
                let tok = self.bump();
                Some(Name::new(text, tok.span))
            }
            _ => None,
        }
    }

    fn at_end(&self) -> bool {
        self.peek().kind == DocTokKind::End
    }

    fn prev_end(&self) -> u32 {
        if self.pos == 0 {
            self.toks[0].span.start
        } else {
            self.toks[self.pos - 1].span.end
        }
    }
}

impl<'src> Parser<'src> {
    /// Build a doc block node out of consecutive annotation lines
    pub(super) fn doc_block(&mut self, lines: Vec<Token>) -> Option<NodeId> {
        let mut tags = Vec::new();
        let mut span: Option<Span> = None;
        for line in lines {
            let TokenKind::Doc(text) = &line.kind else {
                continue;
            };
            span = Some(match span {
                Some(existing) => existing.merge(&line.span),
                None => line.span,
            });
            if let Some(tag) = self.doc_tag(text, line.span) {
                tags.push(tag);
            }
        }
        let span = span?;
        Some(self.alloc(NodeKind::DocBlock { tags }, span))
    }

    fn doc_warning(&self, span: Span, code: crate::diagnostics::DiagnosticCode, message: String) {
        self.handler
            .report(Diagnostic::warning(span, message).with_code(code));
    }

    fn doc_tag(&mut self, text: &str, span: Span) -> Option<NodeId> {
        // skip '@'
        let body = &text[1..];
        let body_span = Span::new(span.start + 1, span.end, span.line, span.column + 1);
        let mut cursor = DocCursor {
            toks: tokenize_line(body, body_span),
            pos: 0,
        };
        let tag = cursor.ident()?;
        trace!(tag = %tag.text, "parsing annotation");
        let kind = match tag.text.as_str() {
            "class" => self.doc_class(&mut cursor, ClassKind::Class)?,
            "interface" => self.doc_class(&mut cursor, ClassKind::Interface)?,
            "enum" => {
                let key = self.doc_attributes(&mut cursor).iter().any(|a| a == "key");
                let name = cursor.ident()?;
                let base = if cursor.eat_punct(':') {
                    Some(self.doc_type(&mut cursor, false))
                } else {
                    None
                };
                NodeKind::DocEnum { name, key, base }
            }
            "alias" => {
                let name = cursor.ident()?;
                let generics = self.doc_generic_list(&mut cursor);
                let origin = if cursor.at_end() {
                    let end = cursor.peek().span;
                    self.alloc(NodeKind::TyName("any".to_string()), end)
                } else {
                    self.doc_type(&mut cursor, true)
                };
                NodeKind::DocAlias {
                    name,
                    generics,
                    origin,
                }
            }
            "field" => self.doc_field(&mut cursor)?,
            "type" => {
                let mut types = vec![self.doc_type(&mut cursor, false)];
                while cursor.eat_punct(',') {
                    types.push(self.doc_type(&mut cursor, false));
                }
                NodeKind::DocType { types }
            }
            "param" => {
                let name = if matches!(cursor.peek().kind, DocTokKind::Dots) {
                    let tok = cursor.bump();
                    Name::new("...", tok.span)
                } else {
                    cursor.ident()?
                };
                let optional = cursor.eat_punct('?');
                let ty = self.doc_type(&mut cursor, true);
                NodeKind::DocParam { name, ty, optional }
            }
            "return" => {
                let mut returns = Vec::new();
                loop {
                    let ty = self.doc_type(&mut cursor, false);
                    let mut name = None;
                    if let DocTokKind::Ident(word) = &cursor.peek().kind {
                        name = Some(word.clone());
                        cursor.bump();
                    }
                    // trailing descriptions are free text
                    while !cursor.at_end() && !cursor.is_punct(',') {
                        cursor.bump();
                    }
                    returns.push(DocReturnItem { ty, name });
                    if !cursor.eat_punct(',') {
                        break;
                    }
                }
                NodeKind::DocReturn { returns }
            }
            "generic" => {
                let mut params = Vec::new();
                loop {
                    let Some(name) = cursor.ident() else {
                        break;
                    };
                    let constraint = if cursor.eat_punct(':') {
                        Some(self.doc_type(&mut cursor, false))
                    } else {
                        None
                    };
                    params.push(DocGenericParam { name, constraint });
                    if !cursor.eat_punct(',') {
                        break;
                    }
                }
                NodeKind::DocGeneric { params }
            }
            "overload" => {
                let signature = self.doc_type(&mut cursor, true);
                NodeKind::DocOverload { signature }
            }
            "operator" => {
                let op = cursor.ident()?.text;
                let operand = if cursor.eat_punct('(') {
                    let operand = if cursor.is_punct(')') {
                        None
                    } else {
                        Some(self.doc_type(&mut cursor, false))
                    };
                    cursor.eat_punct(')');
                    operand
                } else {
                    None
                };
                let result = if cursor.eat_punct(':') {
                    Some(self.doc_type(&mut cursor, false))
                } else {
                    None
                };
                NodeKind::DocOperator {
                    op,
                    operand,
                    result,
                }
            }
            "deprecated" => NodeKind::DocFlag(DocFlag::Deprecated),
            "async" => NodeKind::DocFlag(DocFlag::Async),
            "nodiscard" => NodeKind::DocFlag(DocFlag::NoDiscard),
            "private" => NodeKind::DocFlag(DocFlag::Visibility(Visibility::Private)),
            "protected" => NodeKind::DocFlag(DocFlag::Visibility(Visibility::Protected)),
            "public" => NodeKind::DocFlag(DocFlag::Visibility(Visibility::Public)),
            "package" => NodeKind::DocFlag(DocFlag::Visibility(Visibility::Package)),
            other if IGNORED_TAGS.contains(&other) => return None,
            other => {
                self.doc_warning(
                    tag.span,
                    codes::UNKNOWN_DOC_TAG,
                    format!("unknown annotation '@{}'", other),
                );
                return None;
            }
        };
        let end = cursor.prev_end().max(tag.span.end);
        let span = Span::new(span.start, end, span.line, span.column);
        Some(self.alloc(kind, span))
    }

    /// `(partial, exact)` style attribute lists
    fn doc_attributes(&mut self, cursor: &mut DocCursor) -> Vec<String> {
        let mut attributes = Vec::new();
        if cursor.eat_punct('(') {
            while let Some(name) = cursor.ident() {
                attributes.push(name.text);
                if !cursor.eat_punct(',') {
                    break;
                }
            }
            cursor.eat_punct(')');
        }
        attributes
    }

    fn doc_class(&mut self, cursor: &mut DocCursor, kind: ClassKind) -> Option<NodeKind> {
        let attrs = self.doc_attributes(cursor);
        let attributes = ClassAttributes {
            partial: attrs.iter().any(|a| a == "partial"),
            exact: attrs.iter().any(|a| a == "exact"),
        };
        let name = cursor.ident()?;
        let generics = self.doc_generic_list(cursor);
        let mut supers = Vec::new();
        if cursor.eat_punct(':') {
            loop {
                supers.push(self.doc_type(cursor, false));
                if !cursor.eat_punct(',') {
                    break;
                }
            }
        }
        Some(NodeKind::DocClass {
            name,
            kind,
            attributes,
            generics,
            supers,
        })
    }

    /// `<T, U: Constraint>` after a declared type name
    fn doc_generic_list(&mut self, cursor: &mut DocCursor) -> Vec<DocGenericParam> {
        let mut generics = Vec::new();
        if cursor.eat_punct('<') {
            while let Some(name) = cursor.ident() {
                let constraint = if cursor.eat_punct(':') {
                    Some(self.doc_type(cursor, false))
                } else {
                    None
                };
                generics.push(DocGenericParam { name, constraint });
                if !cursor.eat_punct(',') {
                    break;
                }
            }
            cursor.eat_punct('>');
        }
        generics
    }

    fn doc_field(&mut self, cursor: &mut DocCursor) -> Option<NodeKind> {
        let visibility = match &cursor.peek().kind {
            DocTokKind::Ident(word)
                if matches!(word.as_str(), "public" | "private" | "protected" | "package")
                    && !matches!(cursor.peek_at(1).kind, DocTokKind::Punct(_) | DocTokKind::End) =>
            {
                let visibility = match word.as_str() {
                    "private" => Visibility::Private,
                    "protected" => Visibility::Protected,
                    "package" => Visibility::Package,
                    _ => Visibility::Public,
                };
                cursor.bump();
                Some(visibility)
            }
            _ => None,
        };
        let key = if cursor.eat_punct('[') {
            let key = self.doc_type(cursor, false);
            cursor.eat_punct(']');
            DocFieldKey::Type(key)
        } else if let DocTokKind::Str(text) = cursor.peek().kind.clone() {
            let tok = cursor.bump();
            DocFieldKey::Name(Name::new(text, tok.span))
        } else {
            DocFieldKey::Name(cursor.ident()?)
        };
        let optional = cursor.eat_punct('?');
        let ty = self.doc_type(cursor, true);
        Some(NodeKind::DocField {
            visibility,
            key,
            ty,
            optional,
        })
    }

    /// Full type expression: `A | B?` with postfix `[]` and `?`
    fn doc_type(&mut self, cursor: &mut DocCursor, multi_return: bool) -> NodeId {
        if !self.enter_level() {
            // the rest of the line is dropped
            let start = cursor.peek().span;
            while !cursor.at_end() {
                cursor.bump();
            }
            let span = Span::new(start.start, cursor.prev_end().max(start.start), start.line, start.column);
            return self.alloc(NodeKind::Error, span);
        }
        let ty = self.doc_union_type(cursor, multi_return);
        self.leave_level();
        ty
    }

    fn doc_union_type(&mut self, cursor: &mut DocCursor, multi_return: bool) -> NodeId {
        let start = cursor.peek().span;
        let mut items = vec![self.doc_postfix_type(cursor, multi_return)];
        while cursor.eat_punct('|') {
            items.push(self.doc_postfix_type(cursor, multi_return));
        }
        if items.len() == 1 {
            return items[0];
        }
        let span = Span::new(start.start, cursor.prev_end(), start.line, start.column);
        self.alloc(NodeKind::TyUnion(items), span)
    }

    fn doc_postfix_type(&mut self, cursor: &mut DocCursor, multi_return: bool) -> NodeId {
        let start = cursor.peek().span;
        let mut ty = self.doc_primary_type(cursor, multi_return);
        loop {
            let span = |cursor: &DocCursor| {
                Span::new(start.start, cursor.prev_end(), start.line, start.column)
            };
            if cursor.is_punct('[') && cursor.peek_at(1).kind == DocTokKind::Punct(']') {
                cursor.bump();
                cursor.bump();
                ty = self.alloc(NodeKind::TyArray(ty), span(cursor));
            } else if cursor.eat_punct('?') {
                ty = self.alloc(NodeKind::TyNullable(ty), span(cursor));
            } else {
                return ty;
            }
        }
    }

    fn doc_primary_type(&mut self, cursor: &mut DocCursor, multi_return: bool) -> NodeId {
        let tok = cursor.peek().clone();
        let kind = match &tok.kind {
            DocTokKind::Ident(word) if word == "fun" => {
                cursor.bump();
                self.doc_function_type(cursor, false, multi_return)
            }
            DocTokKind::Ident(word) if word == "async" && cursor.peek_at(1).kind == DocTokKind::Ident("fun".to_string()) => {
                cursor.bump();
                cursor.bump();
                self.doc_function_type(cursor, true, multi_return)
            }
            DocTokKind::Ident(word) if word == "true" || word == "false" => {
                cursor.bump();
                NodeKind::TyLiteral(TyLiteral::Boolean(word == "true"))
            }
            DocTokKind::Ident(word) => {
                let base = Name::new(word.clone(), tok.span);
                cursor.bump();
                if cursor.eat_punct('<') {
                    let mut args = Vec::new();
                    while !cursor.is_punct('>') && !cursor.at_end() {
                        args.push(self.doc_type(cursor, false));
                        if !cursor.eat_punct(',') {
                            break;
                        }
                    }
                    cursor.eat_punct('>');
                    NodeKind::TyGeneric { base, args }
                } else {
                    NodeKind::TyName(base.text)
                }
            }
            DocTokKind::Str(value) => {
                cursor.bump();
                NodeKind::TyLiteral(TyLiteral::String(value.clone()))
            }
            DocTokKind::Int(value) => {
                cursor.bump();
                NodeKind::TyLiteral(TyLiteral::Integer(*value))
            }
            DocTokKind::Punct('(') => {
                cursor.bump();
                let inner = self.doc_type(cursor, false);
                cursor.eat_punct(')');
                NodeKind::TyParen(inner)
            }
            DocTokKind::Punct('[') => {
                cursor.bump();
                let mut items = Vec::new();
                while !cursor.is_punct(']') && !cursor.at_end() {
                    items.push(self.doc_type(cursor, false));
                    if !cursor.eat_punct(',') {
                        break;
                    }
                }
                cursor.eat_punct(']');
                NodeKind::TyTuple(items)
            }
            DocTokKind::Punct('{') => {
                cursor.bump();
                let mut fields = Vec::new();
                while !cursor.is_punct('}') && !cursor.at_end() {
                    let key = match cursor.peek().kind.clone() {
                        DocTokKind::Ident(word) | DocTokKind::Str(word) => {
                            cursor.bump();
                            word
                        }
                        DocTokKind::Int(value) => {
                            cursor.bump();
                            value.to_string()
                        }
                        _ => break,
                    };
                    let optional = cursor.eat_punct('?');
                    cursor.eat_punct(':');
                    let ty = self.doc_type(cursor, false);
                    fields.push(TyTableField { key, ty, optional });
                    if !cursor.eat_punct(',') && !cursor.eat_punct(';') {
                        break;
                    }
                }
                cursor.eat_punct('}');
                NodeKind::TyTable { fields }
            }
            _ => {
                self.doc_warning(
                    tok.span,
                    codes::MALFORMED_DOC_TYPE,
                    "expected a type in annotation".to_string(),
                );
                if !cursor.at_end() {
                    cursor.bump();
                }
                NodeKind::Error
            }
        };
        let span = Span::new(tok.span.start, cursor.prev_end().max(tok.span.start), tok.span.line, tok.span.column);
        self.alloc(kind, span)
    }

    fn doc_function_type(
        &mut self,
        cursor: &mut DocCursor,
        is_async: bool,
        multi_return: bool,
    ) -> NodeKind {
        let mut params = Vec::new();
        if cursor.eat_punct('(') {
            while !cursor.is_punct(')') && !cursor.at_end() {
                let name = match cursor.peek().kind.clone() {
                    DocTokKind::Ident(word) => {
                        cursor.bump();
                        word
                    }
                    DocTokKind::Dots => {
                        cursor.bump();
                        "...".to_string()
                    }
                    _ => break,
                };
                let optional = cursor.eat_punct('?');
                let ty = if cursor.eat_punct(':') {
                    Some(self.doc_type(cursor, false))
                } else {
                    None
                };
                params.push(TyFuncParam { name, ty, optional });
                if !cursor.eat_punct(',') {
                    break;
                }
            }
            cursor.eat_punct(')');
        }
        let mut returns = Vec::new();
        if cursor.eat_punct(':') {
            if cursor.eat_punct('(') {
                loop {
                    returns.push(self.doc_type(cursor, false));
                    if !cursor.eat_punct(',') {
                        break;
                    }
                }
                cursor.eat_punct(')');
            } else {
                returns.push(self.doc_postfix_type(cursor, false));
                while multi_return && cursor.eat_punct(',') {
                    returns.push(self.doc_postfix_type(cursor, false));
                }
            }
        }
        NodeKind::TyFunc {
            params,
            returns,
            is_async,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::syntax::{NodeKind, SyntaxTree, TyLiteral};

    fn doc_tags(source: &str) -> (SyntaxTree, Vec<crate::syntax::NodeId>) {
        let tree = SyntaxTree::parse(source);
        let block = tree
            .ids()
            .find(|id| matches!(tree.kind(*id), NodeKind::DocBlock { .. }))
            .expect("doc block");
        let NodeKind::DocBlock { tags } = tree.kind(block).clone() else {
            unreachable!()
        };
        (tree, tags)
    }

    #[test]
    fn test_class_with_generics_and_supers() {
        let (tree, tags) = doc_tags("---@class (partial) List<T> : Base, Iterable<T>\nlocal List = {}");
        match tree.kind(tags[0]) {
            NodeKind::DocClass {
                name,
                attributes,
                generics,
                supers,
                ..
            } => {
                assert_eq!(name.text, "List");
                assert!(attributes.partial);
                assert_eq!(generics.len(), 1);
                assert_eq!(supers.len(), 2);
                assert!(matches!(tree.kind(supers[1]), NodeKind::TyGeneric { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_field_with_union_and_optional() {
        let (tree, tags) = doc_tags("---@field private name? string|integer[]\nlocal x");
        match tree.kind(tags[0]) {
            NodeKind::DocField {
                visibility,
                optional,
                ty,
                ..
            } => {
                assert_eq!(*visibility, Some(crate::syntax::Visibility::Private));
                assert!(*optional);
                let NodeKind::TyUnion(items) = tree.kind(*ty) else {
                    panic!("expected union");
                };
                assert!(matches!(tree.kind(items[1]), NodeKind::TyArray(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_function_type_with_returns() {
        let (tree, tags) = doc_tags("---@param cb fun(a: integer, b?: string): boolean, string\nlocal function f(cb) end");
        let NodeKind::DocParam { ty, .. } = tree.kind(tags[0]) else {
            panic!("expected param");
        };
        match tree.kind(*ty) {
            NodeKind::TyFunc {
                params, returns, ..
            } => {
                assert_eq!(params.len(), 2);
                assert!(params[1].optional);
                assert_eq!(returns.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_return_names_and_literals() {
        let (tree, tags) = doc_tags("---@return \"ok\"|\"err\" status the status\n---@return 42\nlocal x");
        let NodeKind::DocReturn { returns } = tree.kind(tags[0]) else {
            panic!("expected return");
        };
        assert_eq!(returns[0].name.as_deref(), Some("status"));
        let NodeKind::DocReturn { returns } = tree.kind(tags[1]) else {
            panic!("expected return");
        };
        assert_eq!(
            tree.kind(returns[0].ty),
            &NodeKind::TyLiteral(TyLiteral::Integer(42))
        );
    }

    #[test]
    fn test_unknown_tag_warns() {
        let tree = SyntaxTree::parse("---@frobnicate x\nlocal x");
        assert_eq!(tree.diagnostics().len(), 1);
    }
}
