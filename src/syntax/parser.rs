use super::lexer::{Lexer, Token, TokenKind};
use super::{
    BinaryOp, FieldKey, IfClause, IndexKey, Name, Node, NodeId, NodeKind, Span, SyntaxTree,
    UnaryOp,
};
use crate::diagnostics::{codes, CollectingDiagnosticHandler, Diagnostic, DiagnosticHandler};
use std::sync::Arc;
use tracing::{debug, instrument};

const UNARY_PRIORITY: u8 = 12;

/// Nesting of blocks, expressions and annotation types the parser descends
/// into, the same limit the reference Lua parser applies
pub const MAX_SYNTAX_LEVELS: usize = 200;

/// Recursive descent parser for Lua 5.4 plus `---@` annotations.
///
/// The parser never fails: malformed input produces diagnostics and
/// [`NodeKind::Error`] placeholders so the rest of the document still
/// yields declarations.
pub struct Parser<'src> {
    pub(super) source: &'src str,
    tokens: Vec<Token>,
    docs: Vec<Token>,
    doc_cursor: usize,
    pos: usize,
    prev_end: u32,
    pub(super) nodes: Vec<Node>,
    pub(super) handler: Arc<CollectingDiagnosticHandler>,
    level: usize,
    level_reported: bool,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> Self {
        let handler = Arc::new(CollectingDiagnosticHandler::new());
        let all = Lexer::new(source, handler.clone() as Arc<dyn DiagnosticHandler>).tokenize();
        let (docs, tokens): (Vec<Token>, Vec<Token>) = all
            .into_iter()
            .partition(|t| matches!(t.kind, TokenKind::Doc(_)));
        Self {
            source,
            tokens,
            docs,
            doc_cursor: 0,
            pos: 0,
            prev_end: 0,
            nodes: Vec::new(),
            handler,
            level: 0,
            level_reported: false,
        }
    }

    #[instrument(skip(self), fields(len = self.source.len()))]
    pub fn parse(mut self) -> SyntaxTree {
        let start = self.current().span;
        let block = self.block();
        if !self.check(&TokenKind::Eof) {
            let token = self.current().clone();
            self.error_at(token.span, format!("unexpected {}", token.kind.describe()));
        }
        let span = Span::new(0, self.source.len() as u32, start.line.min(1), 1);
        let root = self.alloc(NodeKind::Chunk { block }, span);
        let diagnostics = self.handler.take();
        debug!(nodes = self.nodes.len(), errors = diagnostics.len(), "parsed chunk");
        SyntaxTree::from_parts(self.source.to_string(), self.nodes, root, diagnostics)
    }

    pub(super) fn alloc(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            span,
            parent: None,
        });
        id
    }

    pub(super) fn span_of(&self, id: NodeId) -> Span {
        self.nodes[id.index()].span
    }

    fn current(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    fn peek_kind(&self, offset: usize) -> &TokenKind {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + offset).min(last)].kind
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        self.prev_end = token.span.end;
        token
    }

    fn accept(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, context: &str) {
        if !self.accept(&kind) {
            let token = self.current().clone();
            self.error_at(
                token.span,
                format!(
                    "expected {} {}, found {}",
                    kind.describe(),
                    context,
                    token.kind.describe()
                ),
            );
        }
    }

    fn error_at(&self, span: Span, message: String) {
        self.handler.report(Diagnostic::error_with_code(
            span,
            codes::UNEXPECTED_TOKEN,
            message,
        ));
    }

    /// Descend one syntax level; `false` once the limit is reached, which
    /// is reported a single time per document
    pub(super) fn enter_level(&mut self) -> bool {
        if self.level >= MAX_SYNTAX_LEVELS {
            if !self.level_reported {
                self.level_reported = true;
                self.handler.report(Diagnostic::error_with_code(
                    self.current().span,
                    codes::TOO_MANY_SYNTAX_LEVELS,
                    format!("chunk has too many syntax levels (limit is {})", MAX_SYNTAX_LEVELS),
                ));
            }
            return false;
        }
        self.level += 1;
        true
    }

    pub(super) fn leave_level(&mut self) {
        self.level -= 1;
    }

    fn finish(&self, start: Span) -> Span {
        Span::new(
            start.start,
            self.prev_end.max(start.start),
            start.line,
            start.column,
        )
    }

    fn name(&mut self, context: &str) -> Name {
        let token = self.current().clone();
        if let TokenKind::Name(text) = &token.kind {
            self.advance();
            Name::new(text.clone(), token.span)
        } else {
            self.error_at(
                token.span,
                format!("expected name {}, found {}", context, token.kind.describe()),
            );
            Name::new("", Span::new(token.span.start, token.span.start, token.span.line, token.span.column))
        }
    }

    /// Annotation lines that precede `offset` and were not attached yet
    fn take_docs(&mut self, offset: u32) -> Option<NodeId> {
        let first = self.doc_cursor;
        while self.doc_cursor < self.docs.len() && self.docs[self.doc_cursor].span.start < offset {
            self.doc_cursor += 1;
        }
        if first == self.doc_cursor {
            return None;
        }
        let lines = self.docs[first..self.doc_cursor].to_vec();
        self.doc_block(lines)
    }

    fn block_ends(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::End
                | TokenKind::Else
                | TokenKind::Elseif
                | TokenKind::Until
                | TokenKind::Eof
        )
    }

    fn block(&mut self) -> NodeId {
        if !self.enter_level() {
            return self.skip_nested_block();
        }
        let block = self.block_at_level();
        self.leave_level();
        block
    }

    /// Consume a block nested past the limit up to the keyword closing it
    fn skip_nested_block(&mut self) -> NodeId {
        let start = self.current().span;
        let mut open = 0usize;
        loop {
            match self.current().kind {
                TokenKind::Do | TokenKind::Function | TokenKind::If | TokenKind::Repeat => open += 1,
                TokenKind::End | TokenKind::Until | TokenKind::Else | TokenKind::Elseif
                    if open == 0 =>
                {
                    break
                }
                TokenKind::End | TokenKind::Until => open -= 1,
                TokenKind::Eof => break,
                _ => {}
            }
            self.advance();
        }
        let span = Span::new(start.start, start.start, start.line, start.column);
        self.alloc(NodeKind::Block { stats: Vec::new() }, span)
    }

    fn block_at_level(&mut self) -> NodeId {
        let start = self.current().span;
        let mut stats = Vec::new();
        loop {
            let offset = self.current().span.start;
            if self.block_ends() {
                if let Some(docs) = self.take_docs(offset) {
                    let span = self.span_of(docs);
                    stats.push(self.alloc(NodeKind::DocStat { docs }, span));
                }
                break;
            }
            if self.check(&TokenKind::Return) {
                let docs = self.take_docs(offset);
                if let Some(docs) = docs {
                    let span = self.span_of(docs);
                    stats.push(self.alloc(NodeKind::DocStat { docs }, span));
                }
                stats.push(self.return_stat());
                continue;
            }
            let before = self.pos;
            let docs = self.take_docs(offset);
            if let Some(stat) = self.statement(docs) {
                stats.push(stat);
            }
            if self.pos == before {
                let token = self.advance();
                self.error_at(token.span, format!("unexpected {}", token.kind.describe()));
            }
        }
        let span = if stats.is_empty() {
            Span::new(start.start, start.start, start.line, start.column)
        } else {
            let first = self.span_of(stats[0]);
            self.finish(first)
        };
        self.alloc(NodeKind::Block { stats }, span)
    }

    fn return_stat(&mut self) -> NodeId {
        let start = self.advance().span;
        let mut values = Vec::new();
        if !self.block_ends() && !self.check(&TokenKind::Semicolon) {
            values = self.expr_list();
        }
        self.accept(&TokenKind::Semicolon);
        let span = self.finish(start);
        self.alloc(NodeKind::ReturnStat { values }, span)
    }

    fn statement(&mut self, docs: Option<NodeId>) -> Option<NodeId> {
        let start = self.current().span;
        let kind = match self.current().kind.clone() {
            TokenKind::Semicolon => {
                self.advance();
                return docs.map(|docs| {
                    let span = self.span_of(docs);
                    self.alloc(NodeKind::DocStat { docs }, span)
                });
            }
            TokenKind::If => self.if_stat(),
            TokenKind::While => {
                self.advance();
                let condition = self.expr();
                self.expect(TokenKind::Do, "after 'while' condition");
                let block = self.block();
                self.expect(TokenKind::End, "to close 'while'");
                NodeKind::WhileStat { condition, block }
            }
            TokenKind::Do => {
                self.advance();
                let block = self.block();
                self.expect(TokenKind::End, "to close 'do'");
                NodeKind::DoStat { block }
            }
            TokenKind::For => self.for_stat(),
            TokenKind::Repeat => {
                self.advance();
                let block = self.block();
                self.expect(TokenKind::Until, "to close 'repeat'");
                let condition = self.expr();
                NodeKind::RepeatStat { block, condition }
            }
            TokenKind::Function => {
                self.advance();
                let (target, is_method) = self.function_name();
                let closure = self.function_body(start, is_method);
                NodeKind::FuncStat {
                    target,
                    closure,
                    docs,
                }
            }
            TokenKind::Local => {
                self.advance();
                if self.accept(&TokenKind::Function) {
                    let name = self.name("after 'local function'");
                    let closure = self.function_body(start, false);
                    NodeKind::LocalFuncStat {
                        name,
                        closure,
                        docs,
                    }
                } else {
                    self.local_stat(docs)
                }
            }
            TokenKind::DoubleColon => {
                self.advance();
                let name = self.name("in label");
                self.expect(TokenKind::DoubleColon, "to close label");
                NodeKind::LabelStat { name: name.text }
            }
            TokenKind::Break => {
                self.advance();
                NodeKind::BreakStat
            }
            TokenKind::Goto => {
                self.advance();
                let label = self.name("after 'goto'");
                NodeKind::GotoStat { label: label.text }
            }
            _ => self.expr_stat(docs)?,
        };
        let span = self.finish(start);
        Some(self.alloc(kind, span))
    }

    fn if_stat(&mut self) -> NodeKind {
        self.advance();
        let mut clauses = Vec::new();
        let condition = self.expr();
        self.expect(TokenKind::Then, "after 'if' condition");
        let block = self.block();
        clauses.push(IfClause {
            condition: Some(condition),
            block,
        });
        loop {
            if self.accept(&TokenKind::Elseif) {
                let condition = self.expr();
                self.expect(TokenKind::Then, "after 'elseif' condition");
                let block = self.block();
                clauses.push(IfClause {
                    condition: Some(condition),
                    block,
                });
            } else if self.accept(&TokenKind::Else) {
                let block = self.block();
                clauses.push(IfClause {
                    condition: None,
                    block,
                });
            } else {
                break;
            }
        }
        self.expect(TokenKind::End, "to close 'if'");
        NodeKind::IfStat { clauses }
    }

    fn for_stat(&mut self) -> NodeKind {
        self.advance();
        let first = self.name("after 'for'");
        if self.accept(&TokenKind::Assign) {
            let start = self.expr();
            self.expect(TokenKind::Comma, "in numeric 'for'");
            let limit = self.expr();
            let step = if self.accept(&TokenKind::Comma) {
                Some(self.expr())
            } else {
                None
            };
            self.expect(TokenKind::Do, "in numeric 'for'");
            let block = self.block();
            self.expect(TokenKind::End, "to close 'for'");
            return NodeKind::ForNumStat {
                var: first,
                start,
                limit,
                step,
                block,
            };
        }
        let mut vars = vec![first];
        while self.accept(&TokenKind::Comma) {
            vars.push(self.name("in 'for' variable list"));
        }
        self.expect(TokenKind::In, "in generic 'for'");
        let exprs = self.expr_list();
        self.expect(TokenKind::Do, "in generic 'for'");
        let block = self.block();
        self.expect(TokenKind::End, "to close 'for'");
        NodeKind::ForInStat { vars, exprs, block }
    }

    fn local_stat(&mut self, docs: Option<NodeId>) -> NodeKind {
        let mut names = vec![self.name("after 'local'")];
        self.attribute();
        while self.accept(&TokenKind::Comma) {
            names.push(self.name("in 'local' list"));
            self.attribute();
        }
        let values = if self.accept(&TokenKind::Assign) {
            self.expr_list()
        } else {
            Vec::new()
        };
        NodeKind::LocalStat {
            names,
            values,
            docs,
        }
    }

    /// `<const>` / `<close>`; carries no typing information
    fn attribute(&mut self) {
        if self.accept(&TokenKind::Less) {
            self.name("in attribute");
            self.expect(TokenKind::Greater, "to close attribute");
        }
    }

    fn function_name(&mut self) -> (NodeId, bool) {
        let first = self.name("after 'function'");
        let mut target = self.alloc(NodeKind::NameExpr(first.text.clone()), first.span);
        let mut is_method = false;
        loop {
            let key = if self.accept(&TokenKind::Dot) {
                IndexKey::Dot(self.name("after '.'"))
            } else if self.accept(&TokenKind::Colon) {
                is_method = true;
                IndexKey::Colon(self.name("after ':'"))
            } else {
                break;
            };
            let span = self.finish(first.span);
            target = self.alloc(NodeKind::IndexExpr { prefix: target, key }, span);
            if is_method {
                break;
            }
        }
        (target, is_method)
    }

    fn function_body(&mut self, start: Span, _is_method: bool) -> NodeId {
        self.expect(TokenKind::LParen, "to open parameter list");
        let mut params = Vec::new();
        let mut vararg = false;
        if !self.check(&TokenKind::RParen) {
            loop {
                if self.accept(&TokenKind::Dots) {
                    vararg = true;
                    break;
                }
                params.push(self.name("in parameter list"));
                if !self.accept(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "to close parameter list");
        let block = self.block();
        self.expect(TokenKind::End, "to close function body");
        let span = self.finish(start);
        self.alloc(
            NodeKind::ClosureExpr {
                params,
                vararg,
                block,
            },
            span,
        )
    }

    fn expr_stat(&mut self, docs: Option<NodeId>) -> Option<NodeKind> {
        let first = self.suffixed_expr();
        if self.check(&TokenKind::Assign) || self.check(&TokenKind::Comma) {
            let mut targets = vec![first];
            while self.accept(&TokenKind::Comma) {
                targets.push(self.suffixed_expr());
            }
            self.expect(TokenKind::Assign, "in assignment");
            let values = self.expr_list();
            return Some(NodeKind::AssignStat {
                targets,
                values,
                docs,
            });
        }
        if matches!(self.nodes[first.index()].kind, NodeKind::CallExpr { .. }) {
            return Some(NodeKind::CallStat { call: first, docs });
        }
        if !matches!(self.nodes[first.index()].kind, NodeKind::Error) {
            self.error_at(self.span_of(first), "syntax error: expression is not a statement".to_string());
        }
        None
    }

    fn expr_list(&mut self) -> Vec<NodeId> {
        let mut exprs = vec![self.expr()];
        while self.accept(&TokenKind::Comma) {
            exprs.push(self.expr());
        }
        exprs
    }

    pub(super) fn expr(&mut self) -> NodeId {
        self.sub_expr(0)
    }

    fn sub_expr(&mut self, limit: u8) -> NodeId {
        if !self.enter_level() {
            return self.skip_nested_expr();
        }
        let expr = self.sub_expr_at_level(limit);
        self.leave_level();
        expr
    }

    /// Consume an expression nested past the limit, stopping at the bracket
    /// that closes the enclosing level
    fn skip_nested_expr(&mut self) -> NodeId {
        let start = self.current().span;
        let mut open = 0usize;
        loop {
            match self.current().kind {
                TokenKind::LParen | TokenKind::LBrace | TokenKind::LBracket => open += 1,
                TokenKind::RParen | TokenKind::RBrace | TokenKind::RBracket => {
                    if open == 0 {
                        break;
                    }
                    open -= 1;
                }
                TokenKind::Eof => break,
                _ if open == 0 && self.block_ends() => break,
                _ => {}
            }
            self.advance();
        }
        let span = self.finish(start);
        self.alloc(NodeKind::Error, span)
    }

    fn sub_expr_at_level(&mut self, limit: u8) -> NodeId {
        let start = self.current().span;
        let unary = match self.current().kind {
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Hash => Some(UnaryOp::Len),
            TokenKind::Tilde => Some(UnaryOp::BNot),
            _ => None,
        };
        let mut lhs = if let Some(op) = unary {
            self.advance();
            let operand = self.sub_expr(UNARY_PRIORITY);
            let span = self.finish(start);
            self.alloc(NodeKind::UnaryExpr { op, operand }, span)
        } else {
            self.simple_expr()
        };

        while let Some((op, left, right)) = binary_op(&self.current().kind) {
            if left <= limit {
                break;
            }
            self.advance();
            let rhs = self.sub_expr(right);
            let span = self.finish(start);
            lhs = self.alloc(NodeKind::BinaryExpr { op, lhs, rhs }, span);
        }
        lhs
    }

    fn simple_expr(&mut self) -> NodeId {
        let start = self.current().span;
        let kind = match self.current().kind.clone() {
            TokenKind::Number(value) => {
                self.advance();
                NodeKind::NumberLit(value)
            }
            TokenKind::String(value) => {
                self.advance();
                NodeKind::StringLit(value)
            }
            TokenKind::Nil => {
                self.advance();
                NodeKind::NilLit
            }
            TokenKind::True => {
                self.advance();
                NodeKind::TrueLit
            }
            TokenKind::False => {
                self.advance();
                NodeKind::FalseLit
            }
            TokenKind::Dots => {
                self.advance();
                NodeKind::Vararg
            }
            TokenKind::LBrace => return self.table_expr(),
            TokenKind::Function => {
                self.advance();
                return self.function_body(start, false);
            }
            _ => return self.suffixed_expr(),
        };
        let span = self.finish(start);
        self.alloc(kind, span)
    }

    fn primary_expr(&mut self) -> NodeId {
        let token = self.current().clone();
        match &token.kind {
            TokenKind::Name(text) => {
                self.advance();
                self.alloc(NodeKind::NameExpr(text.clone()), token.span)
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.expr();
                self.expect(TokenKind::RParen, "to close parenthesized expression");
                let span = self.finish(token.span);
                self.alloc(NodeKind::ParenExpr(inner), span)
            }
            other => {
                self.error_at(token.span, format!("unexpected {}", other.describe()));
                if !self.block_ends() {
                    self.advance();
                }
                let span = self.finish(token.span);
                self.alloc(NodeKind::Error, span)
            }
        }
    }

    fn suffixed_expr(&mut self) -> NodeId {
        let start = self.current().span;
        let mut expr = self.primary_expr();
        loop {
            match self.current().kind.clone() {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.name("after '.'");
                    let span = self.finish(start);
                    expr = self.alloc(
                        NodeKind::IndexExpr {
                            prefix: expr,
                            key: IndexKey::Dot(name),
                        },
                        span,
                    );
                }
                TokenKind::LBracket => {
                    self.advance();
                    let key = self.expr();
                    self.expect(TokenKind::RBracket, "to close index");
                    let span = self.finish(start);
                    expr = self.alloc(
                        NodeKind::IndexExpr {
                            prefix: expr,
                            key: IndexKey::Bracket(key),
                        },
                        span,
                    );
                }
                TokenKind::Colon => {
                    self.advance();
                    let name = self.name("after ':'");
                    let span = self.finish(start);
                    let callee = self.alloc(
                        NodeKind::IndexExpr {
                            prefix: expr,
                            key: IndexKey::Colon(name),
                        },
                        span,
                    );
                    expr = self.call_args(start, callee);
                }
                TokenKind::LParen | TokenKind::String(_) | TokenKind::LBrace => {
                    expr = self.call_args(start, expr);
                }
                _ => return expr,
            }
        }
    }

    fn call_args(&mut self, start: Span, callee: NodeId) -> NodeId {
        let token = self.current().clone();
        let args = match &token.kind {
            TokenKind::String(value) => {
                self.advance();
                vec![self.alloc(NodeKind::StringLit(value.clone()), token.span)]
            }
            TokenKind::LBrace => vec![self.table_expr()],
            TokenKind::LParen => {
                self.advance();
                let args = if self.check(&TokenKind::RParen) {
                    Vec::new()
                } else {
                    self.expr_list()
                };
                self.expect(TokenKind::RParen, "to close argument list");
                args
            }
            other => {
                self.error_at(
                    token.span,
                    format!("expected function arguments, found {}", other.describe()),
                );
                Vec::new()
            }
        };
        let span = self.finish(start);
        self.alloc(NodeKind::CallExpr { callee, args }, span)
    }

    fn table_expr(&mut self) -> NodeId {
        let start = self.advance().span;
        let mut fields = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
            let field_start = self.current().span;
            let before = self.pos;
            let key = match (self.current().kind.clone(), self.peek_kind(1)) {
                (TokenKind::LBracket, _) => {
                    self.advance();
                    let key = self.expr();
                    self.expect(TokenKind::RBracket, "to close table key");
                    self.expect(TokenKind::Assign, "after table key");
                    FieldKey::Expr(key)
                }
                (TokenKind::Name(text), TokenKind::Assign) => {
                    let token = self.advance();
                    self.advance();
                    FieldKey::Named(Name::new(text, token.span))
                }
                _ => FieldKey::Positional,
            };
            let value = self.expr();
            let span = self.finish(field_start);
            fields.push(self.alloc(NodeKind::TableField { key, value }, span));
            if !self.accept(&TokenKind::Comma) && !self.accept(&TokenKind::Semicolon) {
                break;
            }
            if self.pos == before {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "to close table constructor");
        let span = self.finish(start);
        self.alloc(NodeKind::TableExpr { fields }, span)
    }
}

/// Operator with its left and right binding priorities
fn binary_op(kind: &TokenKind) -> Option<(BinaryOp, u8, u8)> {
    let entry = match kind {
        TokenKind::Or => (BinaryOp::Or, 1, 1),
        TokenKind::And => (BinaryOp::And, 2, 2),
        TokenKind::Less => (BinaryOp::Lt, 3, 3),
        TokenKind::Greater => (BinaryOp::Gt, 3, 3),
        TokenKind::LessEq => (BinaryOp::Le, 3, 3),
        TokenKind::GreaterEq => (BinaryOp::Ge, 3, 3),
        TokenKind::NotEq => (BinaryOp::Ne, 3, 3),
        TokenKind::EqEq => (BinaryOp::Eq, 3, 3),
        TokenKind::Pipe => (BinaryOp::BOr, 4, 4),
        TokenKind::Tilde => (BinaryOp::BXor, 5, 5),
        TokenKind::Ampersand => (BinaryOp::BAnd, 6, 6),
        TokenKind::ShiftLeft => (BinaryOp::Shl, 7, 7),
        TokenKind::ShiftRight => (BinaryOp::Shr, 7, 7),
        TokenKind::Concat => (BinaryOp::Concat, 9, 8),
        TokenKind::Plus => (BinaryOp::Add, 10, 10),
        TokenKind::Minus => (BinaryOp::Sub, 10, 10),
        TokenKind::Star => (BinaryOp::Mul, 11, 11),
        TokenKind::Slash => (BinaryOp::Div, 11, 11),
        TokenKind::DoubleSlash => (BinaryOp::IDiv, 11, 11),
        TokenKind::Percent => (BinaryOp::Mod, 11, 11),
        TokenKind::Caret => (BinaryOp::Pow, 14, 13),
        _ => return None,
    };
    Some(entry)
}
