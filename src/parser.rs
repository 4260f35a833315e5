//! Recursive-descent parser with import-first processing (spec.md §4.2).

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::arena::Arena;
use crate::arena_ctx::AstContext;
use crate::ast::{
    BinaryOp, BlockModifier, FnModifier, FunctionDecl, ImportStmt, Lambda, LambdaBody, LambdaParam,
    Literal, MatchArm, MemoryQualifier, Module, Param, PragmaKind, PragmaStmt, Stmt, StmtKind,
    StructType, Type, UnaryOp, VarDecl,
};
use crate::error::{ParseError, ParseErrorKind};
use crate::import::{self, Action, ImportContext};
use crate::intern::{Interner, Symbol};
use crate::lexer::Lexer;
use crate::scope::{SymbolKind, SymbolTable};
use crate::token::{LiteralValue, Token, TokenKind};

pub struct Parser<'a> {
    ctx: AstContext<'a>,
    literals: &'a Arena<LiteralValue<'a>>,
    lexer: Lexer<'a>,
    current: Token<'a>,
    previous: Token<'a>,
    had_error: bool,
    panic_mode: bool,
    errors: Vec<ParseError<'a>>,
    pending_comments: Vec<&'a str>,
    /// `#pragma pack(1)` / `#pragma pack()` state, consumed by the next
    /// struct declaration (spec.md §4.2).
    pack_alignment: u32,
    /// `#pragma alias "c_name"`, consumed by the next native declaration.
    pending_alias: Option<&'a str>,
    in_native_function: u32,
    symbols: Rc<RefCell<SymbolTable>>,
    interner: Rc<RefCell<Interner>>,
    import_ctx: ImportContext<'a>,
    compiler_dir: Option<String>,
    filename: &'a str,
    source: &'a str,
    /// Canonical import path → the namespaced `STMT_IMPORT` node already
    /// kept for it in *this* module, so a later direct import of the same
    /// module can flip `also_imported_directly` on it (spec.md §4.3).
    namespaced_seen: HashMap<String, &'a ImportStmt<'a>>,
}

/// Everything a recursive (imported-file) parse needs that isn't already on
/// `Parser` — threaded through so `Parser::parse_file` can call itself.
pub struct ParseEnv<'a> {
    pub ctx: AstContext<'a>,
    pub literals: &'a Arena<LiteralValue<'a>>,
    pub symbols: Rc<RefCell<SymbolTable>>,
    pub interner: Rc<RefCell<Interner>>,
    pub import_ctx: ImportContext<'a>,
    pub compiler_dir: Option<String>,
}

impl<'a> Parser<'a> {
    pub fn parse_file(env: &ParseEnv<'a>, source: &'a str, filename: &'a str) -> Result<Module<'a>, Vec<ParseError<'a>>> {
        let lexer = Lexer::new(env.ctx.strs, env.literals, source, filename);
        let mut parser = Parser {
            ctx: env.ctx,
            literals: env.literals,
            lexer,
            current: Token::new(TokenKind::Eof, "", 0, filename),
            previous: Token::new(TokenKind::Eof, "", 0, filename),
            had_error: false,
            panic_mode: false,
            errors: Vec::new(),
            pending_comments: Vec::new(),
            pack_alignment: 0,
            pending_alias: None,
            in_native_function: 0,
            symbols: env.symbols.clone(),
            interner: env.interner.clone(),
            import_ctx: env.import_ctx.clone(),
            compiler_dir: env.compiler_dir.clone(),
            filename,
            source,
            namespaced_seen: HashMap::new(),
        };
        parser.advance();
        let module = parser.parse_module();
        if parser.had_error {
            Err(parser.errors)
        } else {
            Ok(module)
        }
    }

    // ---- token stream helpers ------------------------------------------------

    fn advance(&mut self) {
        loop {
            let tok = self.lexer.next_token();
            match tok.kind {
                TokenKind::Comment => self.pending_comments.push(tok.text),
                _ => {
                    self.previous = self.current;
                    self.current = tok;
                    break;
                }
            }
        }
    }

    fn take_comments(&mut self) -> &'a [&'a str] {
        if self.pending_comments.is_empty() {
            &[]
        } else {
            let comments = std::mem::take(&mut self.pending_comments);
            self.ctx.alloc_slice(self.ctx.stmts_comment_arena(), comments)
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_tok(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error_at_current(&mut self, kind: ParseErrorKind) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        self.errors.push(ParseError::new(kind, self.current));
    }

    fn expect(&mut self, kind: TokenKind, err: ParseErrorKind) -> Token<'a> {
        if self.check(kind) {
            let tok = self.current;
            self.advance();
            tok
        } else {
            self.error_at_current(err);
            self.current
        }
    }

    fn skip_newlines(&mut self) {
        while self.check(TokenKind::Newline) {
            self.advance();
        }
    }

    fn end_statement(&mut self) {
        if self.check(TokenKind::Newline) {
            self.advance();
        }
    }

    /// spec.md §4.2 "Error recovery": consume until a statement-start token.
    fn synchronize(&mut self) {
        self.panic_mode = false;
        while !self.check(TokenKind::Eof) {
            if self.previous.kind == TokenKind::Newline {
                return;
            }
            if TokenKind::STATEMENT_START.contains(&self.current.kind) {
                return;
            }
            self.advance();
        }
    }

    fn intern(&self, text: &str) -> Symbol {
        self.interner.borrow_mut().intern(text)
    }

    // ---- module-level -----------------------------------------------------

    fn parse_module(&mut self) -> Module<'a> {
        let mut module = Module::new(self.filename);
        self.skip_newlines();
        while !self.check(TokenKind::Eof) {
            module.stmts.extend(self.parse_decl());
            if self.panic_mode {
                self.synchronize();
            }
            self.skip_newlines();
        }
        module
    }

    /// Parses one declaration/statement, returning every `Stmt` it
    /// contributes to the enclosing list. Almost always exactly one; a
    /// direct (non-namespaced) import instead splices in the whole merged
    /// statement sequence from the imported module in place (spec.md §4.3's
    /// "merge imported statements into the current module"), and a dropped
    /// duplicate or fully-consumed pragma contributes none.
    fn parse_decl(&mut self) -> Vec<&'a Stmt<'a>> {
        let comments = self.take_comments();
        let mut stmts: Vec<&'a Stmt<'a>> = match self.current.kind {
            TokenKind::Import => self.parse_import(),
            TokenKind::Pragma => self.parse_pragma().into_iter().collect(),
            TokenKind::Native | TokenKind::Shared | TokenKind::Private | TokenKind::Fn => {
                vec![self.parse_fn_decl(false)]
            }
            TokenKind::Struct => vec![self.parse_struct_decl()],
            TokenKind::Type => vec![self.parse_type_alias()],
            TokenKind::Var | TokenKind::Static | TokenKind::Sync => vec![self.parse_var_decl()],
            _ => vec![self.parse_statement()],
        };
        if !comments.is_empty() {
            if let Some(first) = stmts.first_mut() {
                *first = self.ctx.stmt_with_comments(*first, comments);
            }
        }
        stmts
    }

    // ---- imports ------------------------------------------------------------

    /// Parses `import "module"[, as NS]` and, per spec.md §4.3's
    /// processing-rules table, returns whatever the importer's statement
    /// list should gain in its place: nothing for a dropped duplicate, the
    /// imported module's own statements spliced in directly for a plain
    /// (non-namespaced) import, or the single `STMT_IMPORT` node for a
    /// namespaced one.
    fn parse_import(&mut self) -> Vec<&'a Stmt<'a>> {
        let tok = self.current;
        self.advance();
        let name_tok = self.expect(TokenKind::Str, ParseErrorKind::ExpectedIdentifier);
        let module_name = match name_tok.literal {
            Some(LiteralValue::Str(s)) => *s,
            _ => name_tok.text,
        };
        let namespace = if self.match_tok(TokenKind::As) {
            let ns_tok = self.expect(TokenKind::Ident, ParseErrorKind::ExpectedIdentifier);
            Some(self.intern(ns_tok.text))
        } else {
            None
        };
        self.end_statement();

        let importer_dir = parent_dir(self.filename);
        let canonical = match import::resolve_import_path(&importer_dir, module_name, self.compiler_dir.as_deref(), |p| {
            std::path::Path::new(p).exists()
        }) {
            Ok(p) => p,
            Err(e) => {
                self.errors.push(ParseError::new(
                    ParseErrorKind::ExpectedIdentifier,
                    tok,
                ));
                self.had_error = true;
                let _ = e;
                return Vec::new();
            }
        };
        let canonical_sym = self.ctx.alloc_str(&canonical);

        let env = ParseEnv {
            ctx: self.ctx,
            literals: self.literals_arena_handle(),
            symbols: self.symbols.clone(),
            interner: self.interner.clone(),
            import_ctx: self.import_ctx.clone(),
            compiler_dir: self.compiler_dir.clone(),
        };
        let canonical_for_closure = canonical.clone();
        let action = import::ImportCache::resolve(&self.import_ctx, &canonical, namespace, || {
            let text = std::fs::read_to_string(&canonical_for_closure).map_err(|e| {
                crate::error::ImportError::CannotReadModule {
                    path: canonical_for_closure.clone(),
                    message: e.to_string(),
                }
            })?;
            let src = env.ctx.alloc_str(&text);
            let fname = env.ctx.alloc_str(&canonical_for_closure);
            match Parser::parse_file(&env, src, fname) {
                Ok(m) => Ok(env.ctx.alloc_slice(env.ctx.module_stmt_slice_arena(), m.stmts)),
                Err(_) => Err(crate::error::ImportError::RecursiveParseFailed { path: canonical_for_closure.clone() }),
            }
        });

        let action = match action {
            Ok(a) => a,
            Err(_) => {
                self.had_error = true;
                return Vec::new();
            }
        };

        match action {
            Action::DropDuplicate => Vec::new(),
            Action::MergeDirect { stmts } => {
                if let Some(prior) = self.namespaced_seen.get(&canonical) {
                    prior.also_imported_directly.set(true);
                }
                stmts.to_vec()
            }
            Action::KeepNamespaced { stmts, emits_code } => {
                let import_stmt = self.ctx.import_stmt(
                    ImportStmt {
                        module_name: self.ctx.alloc_str(module_name),
                        canonical_path: canonical_sym,
                        namespace,
                        imported_stmts: std::cell::Cell::new(Some(stmts)),
                        imported_count: std::cell::Cell::new(stmts.len() as u32),
                        also_imported_directly: std::cell::Cell::new(!emits_code),
                        namespace_code_emitted: std::cell::Cell::new(emits_code),
                    },
                    tok,
                );
                if let StmtKind::Import(is) = import_stmt.kind {
                    self.namespaced_seen.insert(canonical.clone(), is);
                    if namespace.is_some() {
                        for s in stmts {
                            if let StmtKind::FunctionDecl(f) = s.kind {
                                self.symbols.borrow_mut().remove_global(f.name);
                            }
                        }
                    }
                }
                vec![import_stmt]
            }
        }
    }

    fn literals_arena_handle(&self) -> &'a Arena<LiteralValue<'a>> {
        self.literals
    }

    // ---- pragmas --------------------------------------------------------------

    fn parse_pragma(&mut self) -> Option<&'a Stmt<'a>> {
        let tok = self.current;
        self.advance();
        let line_text = self.rest_of_line();
        let trimmed = line_text.trim_start();

        let (kind, raw_value) = if let Some(rest) = trimmed.strip_prefix("include") {
            let value = rest.trim();
            if value.starts_with('"') && value[1..].contains('<') {
                self.errors.push(ParseError::new(ParseErrorKind::ExpectedType, tok));
                self.had_error = true;
            }
            (PragmaKind::Include, value)
        } else if let Some(rest) = trimmed.strip_prefix("link") {
            (PragmaKind::Link, rest.trim())
        } else if let Some(rest) = trimmed.strip_prefix("source") {
            (PragmaKind::Source, rest.trim())
        } else if let Some(rest) = trimmed.strip_prefix("pack") {
            let inside = rest.trim();
            self.pack_alignment = if inside == "(1)" { 1 } else { 0 };
            (PragmaKind::Pack, rest.trim())
        } else if let Some(rest) = trimmed.strip_prefix("alias") {
            let value = rest.trim();
            self.pending_alias = Some(self.ctx.alloc_str(value.trim_matches('"')));
            (PragmaKind::Alias, value)
        } else {
            self.errors.push(ParseError::new(ParseErrorKind::ExpectedType, tok));
            self.had_error = true;
            (PragmaKind::Include, trimmed)
        };

        let source_dir = if kind == PragmaKind::Source {
            Some(self.ctx.alloc_str(&parent_dir(self.filename)))
        } else {
            None
        };

        Some(self.ctx.pragma_stmt(
            PragmaStmt { kind, raw_value: self.ctx.alloc_str(raw_value), source_dir },
            tok,
        ))
    }

    /// Reads the verbatim remainder of the current line so pragma payloads
    /// keep their exact quoting/angle-bracket text (spec.md §4.2/§6 WYSIWYG).
    fn rest_of_line(&mut self) -> String {
        let mut text = String::new();
        while !self.check(TokenKind::Newline) && !self.check(TokenKind::Eof) {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(self.current.text);
            self.advance();
        }
        self.end_statement();
        text
    }

    // ---- declarations -----------------------------------------------------

    fn parse_var_decl(&mut self) -> &'a Stmt<'a> {
        let tok = self.current;
        let is_static = self.match_tok(TokenKind::Static);
        let is_sync = self.match_tok(TokenKind::Sync);
        self.expect(TokenKind::Var, ParseErrorKind::ExpectedStatement);
        let name_tok = self.expect(TokenKind::Ident, ParseErrorKind::ExpectedIdentifier);
        let name = self.intern(name_tok.text);

        let declared_type = if self.match_tok(TokenKind::Colon) { Some(self.parse_type()) } else { None };
        let mem_qualifier = self.parse_trailing_mem_qualifier();
        let init = if self.match_tok(TokenKind::Eq) { Some(self.parse_expression()) } else { None };
        self.end_statement();

        self.symbols.borrow_mut().bind(name, SymbolKind::Variable);
        self.ctx.var_decl(VarDecl { name, declared_type, init, mem_qualifier, is_sync, is_static }, tok)
    }

    fn parse_fn_modifier(&mut self) -> FnModifier {
        if self.match_tok(TokenKind::Shared) {
            FnModifier::Shared
        } else if self.match_tok(TokenKind::Private) {
            FnModifier::Private
        } else {
            FnModifier::Default
        }
    }

    fn parse_fn_decl(&mut self, is_static: bool) -> &'a Stmt<'a> {
        let tok = self.current;
        let modifier = self.parse_fn_modifier();
        if (self.check(TokenKind::Shared) || self.check(TokenKind::Private)) && modifier != FnModifier::Default {
            self.error_at_current(ParseErrorKind::ConflictingFnModifiers);
        }
        let is_native = self.match_tok(TokenKind::Native);
        if is_native {
            self.in_native_function += 1;
        }
        self.expect(TokenKind::Fn, ParseErrorKind::ExpectedStatement);
        let name_tok = self.expect(TokenKind::Ident, ParseErrorKind::ExpectedIdentifier);
        let name = self.intern(name_tok.text);
        self.symbols.borrow_mut().bind(name, SymbolKind::Function);

        self.expect(TokenKind::LParen, ParseErrorKind::ExpectedParam);
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                params.push(self.parse_param());
                if !self.match_tok(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, ParseErrorKind::ExpectedParam);

        let return_type = if self.match_tok(TokenKind::Colon) { self.parse_type() } else { self.ctx.alloc_type(Type::Void) };

        let c_alias = self.pending_alias.take();

        let body = self.parse_fn_body();

        if is_native {
            self.in_native_function -= 1;
        }

        let decl = FunctionDecl {
            name,
            params: self.ctx.alloc_slice(self.ctx.params_arena(), params),
            return_type,
            body,
            modifier,
            is_native,
            is_variadic: false,
            c_alias,
            has_arena_param: modifier == FnModifier::Shared,
            is_static,
        };
        self.ctx.function_decl(decl, tok)
    }

    fn parse_param(&mut self) -> Param<'a> {
        let name_tok = self.expect(TokenKind::Ident, ParseErrorKind::ExpectedIdentifier);
        let name = self.intern(name_tok.text);
        self.expect(TokenKind::Colon, ParseErrorKind::ExpectedColon);
        let ty = self.parse_type();
        let mem_qualifier = self.parse_trailing_mem_qualifier();
        self.ctx.param(name, ty, mem_qualifier)
    }

    fn parse_trailing_mem_qualifier(&mut self) -> MemoryQualifier {
        if self.match_tok(TokenKind::As) {
            if self.match_tok(TokenKind::Val) {
                MemoryQualifier::Val
            } else if self.match_tok(TokenKind::Ref) {
                MemoryQualifier::Ref
            } else {
                self.error_at_current(ParseErrorKind::MemoryQualifierOnInvalidTarget);
                MemoryQualifier::Default
            }
        } else {
            MemoryQualifier::Default
        }
    }

    /// `=>` then either a same-line expression or an indented block.
    fn parse_fn_body(&mut self) -> &'a [Stmt<'a>] {
        self.expect(TokenKind::Arrow, ParseErrorKind::ExpectedFatArrow);
        if self.check(TokenKind::Newline) {
            self.parse_block()
        } else {
            let tok = self.current;
            let expr = self.parse_expression();
            self.end_statement();
            let stmt = self.ctx.stmt(StmtKind::Return(Some(expr)), tok);
            self.ctx.alloc_slice(self.ctx.stmts_arena(), [*stmt])
        }
    }

    fn parse_struct_decl(&mut self) -> &'a Stmt<'a> {
        let tok = self.current;
        let is_native = self.match_tok(TokenKind::Native);
        self.expect(TokenKind::Struct, ParseErrorKind::ExpectedStatement);
        let name_tok = self.expect(TokenKind::Ident, ParseErrorKind::ExpectedIdentifier);
        let name = self.intern(name_tok.text);
        let _ = self.parse_trailing_mem_qualifier();
        let c_alias = self.pending_alias.take();
        let is_packed = self.pack_alignment == 1;
        self.pack_alignment = 0;

        self.symbols.borrow_mut().bind(name, SymbolKind::Struct);
        self.expect(TokenKind::Arrow, ParseErrorKind::ExpectedFatArrow);
        self.expect(TokenKind::Newline, ParseErrorKind::ExpectedFatArrow);
        self.expect(TokenKind::Indent, ParseErrorKind::ExpectedFatArrow);

        let mut fields = Vec::new();
        let mut methods = Vec::new();
        while !self.check(TokenKind::Dedent) && !self.check(TokenKind::Eof) {
            if self.check(TokenKind::Newline) {
                self.advance();
                continue;
            }
            if self.check(TokenKind::Fn) || self.check(TokenKind::Static) || self.check(TokenKind::Native) {
                methods.push(self.parse_method());
            } else {
                fields.push(self.parse_field());
            }
        }
        self.expect(TokenKind::Dedent, ParseErrorKind::ExpectedFatArrow);

        let struct_ty = StructType {
            name,
            fields: self.ctx.alloc_slice(self.ctx.fields_arena(), fields),
            methods: self.ctx.alloc_slice(self.ctx.methods_arena(), methods),
            size: std::cell::Cell::new(0),
            alignment: std::cell::Cell::new(0),
            is_native,
            is_packed,
            pass_self_by_ref: std::cell::Cell::new(false),
            c_alias,
        };
        self.ctx.struct_decl(struct_ty, tok)
    }

    fn parse_field(&mut self) -> crate::ast::Field<'a> {
        let name_tok = self.expect(TokenKind::Ident, ParseErrorKind::ExpectedIdentifier);
        let name = self.intern(name_tok.text);
        self.expect(TokenKind::Colon, ParseErrorKind::ExpectedColon);
        let ty = self.parse_type();
        let c_alias = self.pending_alias.take();
        self.end_statement();
        crate::ast::Field { name, ty, offset: std::cell::Cell::new(None), c_alias }
    }

    fn parse_method(&mut self) -> &'a Stmt<'a> {
        let is_static = self.match_tok(TokenKind::Static);
        self.parse_fn_decl(is_static)
    }

    fn parse_type_alias(&mut self) -> &'a Stmt<'a> {
        let tok = self.current;
        self.advance();
        let name_tok = self.expect(TokenKind::Ident, ParseErrorKind::ExpectedIdentifier);
        let name = self.intern(name_tok.text);
        self.expect(TokenKind::Eq, ParseErrorKind::ExpectedColon);
        let ty = self.parse_type();
        self.end_statement();
        self.symbols.borrow_mut().bind(name, SymbolKind::TypeAlias);
        self.ctx.stmt(StmtKind::TypeAlias { name, ty }, tok)
    }

    // ---- types --------------------------------------------------------------

    fn parse_type(&mut self) -> &'a Type<'a> {
        let base = match self.current.kind {
            TokenKind::KwInt => { self.advance(); self.ctx.alloc_type(Type::Int) }
            TokenKind::KwInt32 => { self.advance(); self.ctx.alloc_type(Type::Int32) }
            TokenKind::KwUint => { self.advance(); self.ctx.alloc_type(Type::Uint) }
            TokenKind::KwUint32 => { self.advance(); self.ctx.alloc_type(Type::Uint32) }
            TokenKind::KwLong => { self.advance(); self.ctx.alloc_type(Type::Long) }
            TokenKind::KwDouble => { self.advance(); self.ctx.alloc_type(Type::Double) }
            TokenKind::KwFloat => { self.advance(); self.ctx.alloc_type(Type::Float) }
            TokenKind::KwChar => { self.advance(); self.ctx.alloc_type(Type::Char) }
            TokenKind::KwString => { self.advance(); self.ctx.alloc_type(Type::String) }
            TokenKind::KwBool => { self.advance(); self.ctx.alloc_type(Type::Bool) }
            TokenKind::KwByte => { self.advance(); self.ctx.alloc_type(Type::Byte) }
            TokenKind::KwVoid => { self.advance(); self.ctx.alloc_type(Type::Void) }
            TokenKind::KwAny => { self.advance(); self.ctx.alloc_type(Type::Any) }
            TokenKind::Star => {
                self.advance();
                let base = self.parse_type();
                return self.ctx.pointer_type(base);
            }
            TokenKind::Ident => {
                let name = self.intern(self.current.text);
                self.advance();
                self.ctx.alloc_type(Type::Opaque { name })
            }
            _ => {
                self.error_at_current(ParseErrorKind::ExpectedType);
                self.ctx.alloc_type(Type::Void)
            }
        };
        if self.match_tok(TokenKind::LBracket) {
            self.expect(TokenKind::RBracket, ParseErrorKind::ExpectedType);
            return self.ctx.array_type(base);
        }
        base
    }

    // ---- statements -----------------------------------------------------------

    fn parse_statement(&mut self) -> &'a Stmt<'a> {
        match self.current.kind {
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Break => { let t = self.current; self.advance(); self.end_statement(); self.ctx.stmt(StmtKind::Break, t) }
            TokenKind::Continue => { let t = self.current; self.advance(); self.end_statement(); self.ctx.stmt(StmtKind::Continue, t) }
            TokenKind::Lock => self.parse_lock(),
            _ => self.parse_expr_statement(),
        }
    }

    fn parse_block(&mut self) -> &'a [Stmt<'a>] {
        self.skip_newlines();
        self.expect(TokenKind::Indent, ParseErrorKind::ExpectedStatement);
        let mut stmts = Vec::new();
        while !self.check(TokenKind::Dedent) && !self.check(TokenKind::Eof) {
            if self.check(TokenKind::Newline) {
                self.advance();
                continue;
            }
            for stmt in self.parse_decl() {
                stmts.push(*stmt);
            }
            if self.panic_mode {
                self.synchronize();
            }
        }
        self.expect(TokenKind::Dedent, ParseErrorKind::ExpectedStatement);
        self.ctx.alloc_slice(self.ctx.stmts_arena(), stmts)
    }

    /// Body after `=>` for control-flow statements: an indented block, or a
    /// single same-line statement.
    fn parse_body_after_arrow(&mut self) -> &'a [Stmt<'a>] {
        self.expect(TokenKind::Arrow, ParseErrorKind::ExpectedFatArrow);
        if self.check(TokenKind::Newline) {
            self.parse_block()
        } else {
            let stmt = self.parse_statement();
            self.ctx.alloc_slice(self.ctx.stmts_arena(), [*stmt])
        }
    }

    fn parse_if(&mut self) -> &'a Stmt<'a> {
        let tok = self.current;
        self.advance();
        let cond = self.parse_expression();
        let then_branch = self.parse_body_after_arrow();
        self.skip_newlines();
        let else_branch = if self.match_tok(TokenKind::Else) {
            Some(self.parse_body_after_arrow())
        } else {
            None
        };
        self.ctx.stmt(StmtKind::If { cond, then_branch, else_branch }, tok)
    }

    fn parse_while(&mut self) -> &'a Stmt<'a> {
        let tok = self.current;
        self.advance();
        let cond = self.parse_expression();
        let body = self.parse_body_after_arrow();
        self.ctx.stmt(StmtKind::While { cond, body }, tok)
    }

    fn parse_for(&mut self) -> &'a Stmt<'a> {
        let tok = self.current;
        self.advance();
        // for-each: `for IDENT in EXPR =>`
        if self.check(TokenKind::Ident) {
            let checkpoint_text = self.current.text;
            let var = self.intern(checkpoint_text);
            let save_current = self.current;
            self.advance();
            if self.match_tok(TokenKind::In) {
                let iterable = self.parse_expression();
                let body = self.parse_body_after_arrow();
                return self.ctx.stmt(StmtKind::ForEach { var, iterable, body }, tok);
            }
            // Not for-each: treat consumed ident as the start of a C-style
            // for's init clause by re-parsing it as an expression statement.
            let init_expr = self.finish_ident_expr(save_current);
            return self.parse_c_style_for(tok, Some(init_expr));
        }
        self.parse_c_style_for(tok, None)
    }

    fn finish_ident_expr(&mut self, ident_tok: Token<'a>) -> &'a Stmt<'a> {
        let name = self.intern(ident_tok.text);
        let target = self.ctx.variable(name, ident_tok);
        let expr = self.parse_assignment_tail(target, ident_tok);
        self.ctx.stmt(StmtKind::Expr(expr), ident_tok)
    }

    /// `for [init] : [cond] [, update] =>`: the classic three-clause form,
    /// with `:` and `,` standing in for the source language's `;` (this
    /// token set has no semicolon).
    fn parse_c_style_for(&mut self, tok: Token<'a>, init: Option<&'a Stmt<'a>>) -> &'a Stmt<'a> {
        let init = match init {
            Some(s) => Some(s),
            None if self.check(TokenKind::Colon) => None,
            None if matches!(self.current.kind, TokenKind::Var | TokenKind::Static | TokenKind::Sync) => {
                Some(self.parse_var_decl())
            }
            None => {
                let init_tok = self.current;
                let expr = self.parse_expression();
                Some(self.ctx.stmt(StmtKind::Expr(expr), init_tok))
            }
        };
        self.match_tok(TokenKind::Colon);
        let cond = if !self.check(TokenKind::Comma) && !self.check(TokenKind::Arrow) {
            Some(self.parse_expression())
        } else {
            None
        };
        let update = if self.match_tok(TokenKind::Comma) {
            let update_tok = self.current;
            let expr = self.parse_expression();
            Some(self.ctx.stmt(StmtKind::Expr(expr), update_tok))
        } else {
            None
        };
        let body = self.parse_body_after_arrow();
        self.ctx.stmt(StmtKind::For { init, cond, update, body }, tok)
    }

    fn parse_return(&mut self) -> &'a Stmt<'a> {
        let tok = self.current;
        self.advance();
        let value = if self.check(TokenKind::Newline) || self.check(TokenKind::Eof) {
            None
        } else {
            Some(self.parse_expression())
        };
        self.end_statement();
        self.ctx.stmt(StmtKind::Return(value), tok)
    }

    fn parse_lock(&mut self) -> &'a Stmt<'a> {
        let tok = self.current;
        self.advance();
        self.expect(TokenKind::LParen, ParseErrorKind::ExpectedParam);
        let guard = self.parse_expression();
        self.expect(TokenKind::RParen, ParseErrorKind::ExpectedParam);
        let body = self.parse_body_after_arrow();
        self.ctx.stmt(StmtKind::Lock { guard, body }, tok)
    }

    fn parse_expr_statement(&mut self) -> &'a Stmt<'a> {
        let tok = self.current;
        let expr = self.parse_expression();
        self.end_statement();
        self.ctx.stmt(StmtKind::Expr(expr), tok)
    }

    // ---- expressions: precedence ladder (spec.md §4.2) ----------------------

    fn parse_expression(&mut self) -> &'a crate::ast::Expr<'a> {
        self.parse_assignment()
    }

    fn compound_op(&self) -> Option<BinaryOp> {
        Some(match self.current.kind {
            TokenKind::PlusEq => BinaryOp::Add,
            TokenKind::MinusEq => BinaryOp::Sub,
            TokenKind::StarEq => BinaryOp::Mul,
            TokenKind::SlashEq => BinaryOp::Div,
            TokenKind::PercentEq => BinaryOp::Mod,
            TokenKind::AmpEq => BinaryOp::BitAnd,
            TokenKind::PipeEq => BinaryOp::BitOr,
            TokenKind::CaretEq => BinaryOp::BitXor,
            TokenKind::ShlEq => BinaryOp::Shl,
            TokenKind::ShrEq => BinaryOp::Shr,
            _ => return None,
        })
    }

    fn parse_assignment(&mut self) -> &'a crate::ast::Expr<'a> {
        let expr = self.parse_logical_or();
        self.parse_assignment_tail(expr, self.previous)
    }

    fn parse_assignment_tail(&mut self, expr: &'a crate::ast::Expr<'a>, tok: Token<'a>) -> &'a crate::ast::Expr<'a> {
        if self.match_tok(TokenKind::Eq) {
            let value = self.parse_assignment();
            return self.lower_assignment(expr, value, tok);
        }
        if let Some(op) = self.compound_op() {
            self.advance();
            let value = self.parse_assignment();
            return self.ctx.expr(crate::ast::ExprKind::CompoundAssign { op, target: expr, value }, tok);
        }
        expr
    }

    /// Lowers a plain `=` assignment to the AST node its target shape calls
    /// for: `a[i] = v` becomes `IndexAssign`, `a.f = v` becomes
    /// `MemberAssign`, anything else stays a generic `Assign`.
    fn lower_assignment(
        &self,
        target: &'a crate::ast::Expr<'a>,
        value: &'a crate::ast::Expr<'a>,
        tok: Token<'a>,
    ) -> &'a crate::ast::Expr<'a> {
        match &target.kind {
            crate::ast::ExprKind::ArrayAccess { array, index } => self.ctx.expr(
                crate::ast::ExprKind::IndexAssign { array: *array, index: *index, value },
                tok,
            ),
            crate::ast::ExprKind::Member { object, field, .. } => self.ctx.expr(
                crate::ast::ExprKind::MemberAssign {
                    object: *object,
                    field: *field,
                    field_index: Cell::new(None),
                    value,
                },
                tok,
            ),
            _ => self.ctx.expr(crate::ast::ExprKind::Assign { target, value }, tok),
        }
    }

    fn parse_logical_or(&mut self) -> &'a crate::ast::Expr<'a> {
        let mut left = self.parse_logical_and();
        while self.check(TokenKind::PipePipe) {
            let tok = self.current;
            self.advance();
            let right = self.parse_logical_and();
            left = self.ctx.binary(BinaryOp::Or, left, right, tok);
        }
        left
    }

    fn parse_logical_and(&mut self) -> &'a crate::ast::Expr<'a> {
        let mut left = self.parse_bitor();
        while self.check(TokenKind::AmpAmp) {
            let tok = self.current;
            self.advance();
            let right = self.parse_bitor();
            left = self.ctx.binary(BinaryOp::And, left, right, tok);
        }
        left
    }

    fn parse_bitor(&mut self) -> &'a crate::ast::Expr<'a> {
        let mut left = self.parse_bitxor();
        while self.check(TokenKind::Pipe) {
            let tok = self.current;
            self.advance();
            let right = self.parse_bitxor();
            left = self.ctx.binary(BinaryOp::BitOr, left, right, tok);
        }
        left
    }

    fn parse_bitxor(&mut self) -> &'a crate::ast::Expr<'a> {
        let mut left = self.parse_bitand();
        while self.check(TokenKind::Caret) {
            let tok = self.current;
            self.advance();
            let right = self.parse_bitand();
            left = self.ctx.binary(BinaryOp::BitXor, left, right, tok);
        }
        left
    }

    fn parse_bitand(&mut self) -> &'a crate::ast::Expr<'a> {
        let mut left = self.parse_equality();
        while self.check(TokenKind::Amp) {
            let tok = self.current;
            self.advance();
            let right = self.parse_equality();
            left = self.ctx.binary(BinaryOp::BitAnd, left, right, tok);
        }
        left
    }

    fn parse_equality(&mut self) -> &'a crate::ast::Expr<'a> {
        let mut left = self.parse_relational();
        loop {
            let op = match self.current.kind {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::NotEq,
                _ => break,
            };
            let tok = self.current;
            self.advance();
            let right = self.parse_relational();
            left = self.ctx.binary(op, left, right, tok);
        }
        left
    }

    fn parse_relational(&mut self) -> &'a crate::ast::Expr<'a> {
        let mut left = self.parse_shift();
        loop {
            let op = match self.current.kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::LtEq => BinaryOp::LtEq,
                TokenKind::GtEq => BinaryOp::GtEq,
                _ => break,
            };
            let tok = self.current;
            self.advance();
            let right = self.parse_shift();
            left = self.ctx.binary(op, left, right, tok);
        }
        left
    }

    fn parse_shift(&mut self) -> &'a crate::ast::Expr<'a> {
        let mut left = self.parse_range();
        loop {
            let op = match self.current.kind {
                TokenKind::Shl => BinaryOp::Shl,
                TokenKind::Shr => BinaryOp::Shr,
                _ => break,
            };
            let tok = self.current;
            self.advance();
            let right = self.parse_range();
            left = self.ctx.binary(op, left, right, tok);
        }
        left
    }

    fn parse_range(&mut self) -> &'a crate::ast::Expr<'a> {
        let left = self.parse_additive();
        if self.check(TokenKind::DotDot) {
            let tok = self.current;
            self.advance();
            let right = self.parse_additive();
            return self.ctx.expr(crate::ast::ExprKind::Range { start: left, end: right }, tok);
        }
        left
    }

    fn parse_additive(&mut self) -> &'a crate::ast::Expr<'a> {
        let mut left = self.parse_multiplicative();
        loop {
            let op = match self.current.kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let tok = self.current;
            self.advance();
            let right = self.parse_multiplicative();
            left = self.ctx.binary(op, left, right, tok);
        }
        left
    }

    fn parse_multiplicative(&mut self) -> &'a crate::ast::Expr<'a> {
        let mut left = self.parse_unary();
        loop {
            let op = match self.current.kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            let tok = self.current;
            self.advance();
            let right = self.parse_unary();
            left = self.ctx.binary(op, left, right, tok);
        }
        left
    }

    fn parse_unary(&mut self) -> &'a crate::ast::Expr<'a> {
        match self.current.kind {
            TokenKind::Bang => {
                let tok = self.current;
                self.advance();
                let operand = self.parse_unary();
                self.ctx.unary(UnaryOp::Not, operand, tok)
            }
            TokenKind::Minus => {
                let tok = self.current;
                self.advance();
                let operand = self.parse_unary();
                self.ctx.unary(UnaryOp::Neg, operand, tok)
            }
            TokenKind::Tilde => {
                let tok = self.current;
                self.advance();
                let operand = self.parse_unary();
                self.ctx.unary(UnaryOp::BitNot, operand, tok)
            }
            TokenKind::Typeof => {
                let tok = self.current;
                self.advance();
                let operand = self.parse_unary();
                self.ctx.expr(crate::ast::ExprKind::Typeof(operand), tok)
            }
            TokenKind::Sizeof => {
                let tok = self.current;
                self.advance();
                let ty = self.parse_type();
                self.ctx.expr(crate::ast::ExprKind::Sizeof(ty), tok)
            }
            TokenKind::Amp => {
                let tok = self.current;
                self.advance();
                let operand = self.parse_unary();
                self.ctx.expr(crate::ast::ExprKind::ThreadSpawn(operand), tok)
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> &'a crate::ast::Expr<'a> {
        let mut expr = self.parse_primary();
        loop {
            match self.current.kind {
                TokenKind::LParen => {
                    let tok = self.current;
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check(TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expression());
                            if !self.match_tok(TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RParen, ParseErrorKind::ExpectedParam);
                    let args = self.ctx.alloc_slice(self.ctx.expr_lists_arena(), args);
                    expr = self.ctx.expr(crate::ast::ExprKind::Call { callee: expr, args }, tok);
                }
                TokenKind::LBracket => {
                    let tok = self.current;
                    self.advance();
                    let start = if self.check(TokenKind::DotDot) { None } else { Some(self.parse_additive()) };
                    if self.match_tok(TokenKind::DotDot) {
                        let end = if self.check(TokenKind::Colon) || self.check(TokenKind::RBracket) {
                            None
                        } else {
                            Some(self.parse_additive())
                        };
                        let step = if self.match_tok(TokenKind::Colon) { Some(self.parse_additive()) } else { None };
                        self.expect(TokenKind::RBracket, ParseErrorKind::ExpectedExpression);
                        expr = self.ctx.expr(crate::ast::ExprKind::ArraySlice { array: expr, start, end, step }, tok);
                    } else {
                        let index = match start {
                            Some(e) => e,
                            None => {
                                self.error_at_current(ParseErrorKind::ExpectedExpression);
                                self.ctx.literal(Literal::Nil, false, self.current)
                            }
                        };
                        self.expect(TokenKind::RBracket, ParseErrorKind::ExpectedExpression);
                        expr = self.ctx.expr(crate::ast::ExprKind::ArrayAccess { array: expr, index }, tok);
                    }
                }
                TokenKind::Dot => {
                    let tok = self.current;
                    self.advance();
                    let field_tok = self.expect(TokenKind::Ident, ParseErrorKind::ExpectedIdentifier);
                    let field = self.intern(field_tok.text);
                    expr = self.ctx.member(expr, field, tok);
                }
                TokenKind::PlusPlus => {
                    let tok = self.current;
                    self.advance();
                    expr = self.ctx.expr(crate::ast::ExprKind::Increment(expr), tok);
                }
                TokenKind::MinusMinus => {
                    let tok = self.current;
                    self.advance();
                    expr = self.ctx.expr(crate::ast::ExprKind::Decrement(expr), tok);
                }
                TokenKind::Bang => {
                    let tok = self.current;
                    self.advance();
                    expr = self.ctx.expr(crate::ast::ExprKind::ThreadSync(expr), tok);
                }
                TokenKind::As => {
                    let tok = self.current;
                    self.advance();
                    if self.check(TokenKind::Val) || self.check(TokenKind::Ref) {
                        let qualifier = if self.match_tok(TokenKind::Val) { MemoryQualifier::Val } else { MemoryQualifier::Ref };
                        self.match_tok(TokenKind::Ref);
                        expr = self.ctx.expr(crate::ast::ExprKind::MemQualCast { value: expr, qualifier }, tok);
                    } else {
                        let ty = self.parse_type();
                        expr = self.ctx.expr(crate::ast::ExprKind::As { value: expr, ty }, tok);
                    }
                }
                TokenKind::Is => {
                    let tok = self.current;
                    self.advance();
                    let ty = self.parse_type();
                    expr = self.ctx.expr(crate::ast::ExprKind::Is { value: expr, ty }, tok);
                }
                _ => break,
            }
        }
        expr
    }

    fn parse_primary(&mut self) -> &'a crate::ast::Expr<'a> {
        let tok = self.current;
        match tok.kind {
            TokenKind::Int | TokenKind::Float => {
                self.advance();
                let lit = literal_from_token(tok);
                self.ctx.literal(lit, false, tok)
            }
            TokenKind::Char => {
                self.advance();
                let lit = match tok.literal {
                    Some(LiteralValue::Char(c)) => Literal::Char(*c),
                    _ => Literal::Char('\0'),
                };
                self.ctx.literal(lit, false, tok)
            }
            TokenKind::Str => {
                self.advance();
                let lit = match tok.literal {
                    Some(LiteralValue::Str(s)) => Literal::Str(s),
                    _ => Literal::Str(""),
                };
                self.ctx.literal(lit, false, tok)
            }
            TokenKind::InterpolatedStr => {
                self.advance();
                self.parse_interpolated(tok)
            }
            TokenKind::True => { self.advance(); self.ctx.literal(Literal::Bool(true), false, tok) }
            TokenKind::False => { self.advance(); self.ctx.literal(Literal::Bool(false), false, tok) }
            TokenKind::Nil => { self.advance(); self.ctx.literal(Literal::Nil, false, tok) }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression();
                self.expect(TokenKind::RParen, ParseErrorKind::ExpectedExpression);
                inner
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                if !self.check(TokenKind::RBracket) {
                    loop {
                        items.push(self.parse_expression());
                        if !self.match_tok(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RBracket, ParseErrorKind::ExpectedExpression);
                let items = self.ctx.alloc_slice(self.ctx.expr_lists_arena(), items);
                self.ctx.expr(crate::ast::ExprKind::ArrayLiteral(items), tok)
            }
            TokenKind::DotDot => {
                self.advance();
                let operand = self.parse_additive();
                self.ctx.expr(crate::ast::ExprKind::Spread(operand), tok)
            }
            TokenKind::Fn => self.parse_lambda(),
            TokenKind::Match => self.parse_match(),
            TokenKind::Ident => {
                self.advance();
                self.finish_ident_primary(tok)
            }
            _ => {
                self.error_at_current(ParseErrorKind::ExpectedExpression);
                self.advance();
                self.ctx.literal(Literal::Nil, false, tok)
            }
        }
    }

    fn finish_ident_primary(&mut self, tok: Token<'a>) -> &'a crate::ast::Expr<'a> {
        let name = self.intern(tok.text);
        self.ctx.variable(name, tok)
    }

    fn parse_lambda(&mut self) -> &'a crate::ast::Expr<'a> {
        let tok = self.current;
        self.advance();
        let is_native = self.in_native_function > 0;
        self.expect(TokenKind::LParen, ParseErrorKind::ExpectedParam);
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let name_tok = self.expect(TokenKind::Ident, ParseErrorKind::ExpectedIdentifier);
                let name = self.intern(name_tok.text);
                let ty = if self.match_tok(TokenKind::Colon) { Some(self.parse_type()) } else { None };
                let mem_qualifier = self.parse_trailing_mem_qualifier();
                params.push(LambdaParam { name, ty, mem_qualifier });
                if !self.match_tok(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, ParseErrorKind::ExpectedParam);
        let return_type = if self.match_tok(TokenKind::Colon) { Some(self.parse_type()) } else { None };
        self.expect(TokenKind::Arrow, ParseErrorKind::ExpectedFatArrow);
        let body = if self.check(TokenKind::Newline) {
            LambdaBody::Block(self.parse_block())
        } else {
            LambdaBody::Expr(self.parse_expression())
        };
        let lambda = Lambda {
            params: self.ctx.alloc_slice(self.ctx.lambda_params_arena(), params),
            return_type,
            body,
            is_native,
            captured_vars: std::cell::Cell::new(None),
            captured_types: std::cell::Cell::new(None),
        };
        self.ctx.lambda(lambda, tok)
    }

    fn parse_match(&mut self) -> &'a crate::ast::Expr<'a> {
        let tok = self.current;
        self.advance();
        let subject = self.parse_expression();
        self.expect(TokenKind::Arrow, ParseErrorKind::ExpectedFatArrow);
        self.skip_newlines();
        self.expect(TokenKind::Indent, ParseErrorKind::ExpectedStatement);
        let mut arms = Vec::new();
        while !self.check(TokenKind::Dedent) && !self.check(TokenKind::Eof) {
            if self.check(TokenKind::Newline) {
                self.advance();
                continue;
            }
            arms.push(self.parse_match_arm());
        }
        self.expect(TokenKind::Dedent, ParseErrorKind::ExpectedStatement);
        let arms = self.ctx.alloc_slice(self.ctx.match_arms_arena(), arms);
        self.ctx.expr(crate::ast::ExprKind::Match { subject, arms }, tok)
    }

    fn parse_match_arm(&mut self) -> MatchArm<'a> {
        let patterns = if self.match_tok(TokenKind::Else) {
            Vec::new()
        } else {
            let mut pats = vec![self.parse_expression()];
            while self.match_tok(TokenKind::Comma) {
                pats.push(self.parse_expression());
            }
            pats
        };
        let body = self.parse_body_after_arrow();
        MatchArm { patterns: self.ctx.alloc_slice(self.ctx.expr_lists_arena(), patterns), body }
    }

    /// Re-lexes and re-parses each `{...}` code region inside a captured
    /// `$"..."` body, sharing the outer symbol table (spec.md §4.2, §4.3,
    /// §9's "Recursive lexer/parser for interpolation" note).
    fn parse_interpolated(&mut self, tok: Token<'a>) -> &'a crate::ast::Expr<'a> {
        let body = match tok.literal {
            Some(LiteralValue::Str(s)) => *s,
            _ => "",
        };
        let mut parts = Vec::new();
        let bytes = body.as_bytes();
        let mut i = 0;
        let mut literal_start = 0;
        while i < bytes.len() {
            if bytes[i] == b'{' && bytes.get(i + 1) == Some(&b'{') {
                i += 2;
                continue;
            }
            if bytes[i] == b'{' {
                if literal_start < i {
                    let seg = self.ctx.alloc_str(&body[literal_start..i]);
                    parts.push(crate::ast::InterpolationPart::Str(seg));
                }
                i += 1;
                let region_start = i;
                // Bounded state stack over brace depth, paren depth, and
                // whether we're inside a string literal (spec.md §9's "small
                // bounded state stack") so an embedded `(`, `)`, or string
                // containing `}`/`:` doesn't end the region or get mistaken
                // for the format separator.
                let mut depth = 1;
                let mut paren_depth: i32 = 0;
                let mut in_string = false;
                let mut format_split = None;
                while i < bytes.len() && depth > 0 {
                    let b = bytes[i];
                    if in_string {
                        if b == b'\\' {
                            i += 1;
                        } else if b == b'"' {
                            in_string = false;
                        }
                        i += 1;
                        continue;
                    }
                    match b {
                        b'"' => {
                            in_string = true;
                            i += 1;
                        }
                        b'(' => {
                            paren_depth += 1;
                            i += 1;
                        }
                        b')' => {
                            paren_depth -= 1;
                            i += 1;
                        }
                        b'{' => {
                            depth += 1;
                            i += 1;
                        }
                        b'}' => {
                            depth -= 1;
                            if depth > 0 {
                                i += 1;
                            }
                        }
                        b':' if depth == 1 && paren_depth == 0 && format_split.is_none() => {
                            format_split = Some(i - region_start);
                            i += 1;
                        }
                        _ => i += 1,
                    }
                }
                let region = &body[region_start..i];
                i += 1; // consume closing '}'
                literal_start = i;

                let (expr_src, format) = match format_split {
                    Some(idx) => (&region[..idx], Some(&region[idx + 1..])),
                    None => (region, None),
                };
                let sub_source = self.ctx.alloc_str(expr_src);
                let sub_lexer = Lexer::new(self.ctx.strs, self.literals, sub_source, self.filename);
                let mut sub_parser = Parser {
                    ctx: self.ctx,
                    literals: self.literals,
                    lexer: sub_lexer,
                    current: Token::new(TokenKind::Eof, "", tok.line, self.filename),
                    previous: Token::new(TokenKind::Eof, "", tok.line, self.filename),
                    had_error: false,
                    panic_mode: false,
                    errors: Vec::new(),
                    pending_comments: Vec::new(),
                    pack_alignment: 0,
                    pending_alias: None,
                    in_native_function: self.in_native_function,
                    symbols: self.symbols.clone(),
                    interner: self.interner.clone(),
                    import_ctx: self.import_ctx.clone(),
                    compiler_dir: self.compiler_dir.clone(),
                    filename: self.filename,
                    source: sub_source,
                    namespaced_seen: HashMap::new(),
                };
                sub_parser.advance();
                let sub_expr = sub_parser.parse_expression();
                parts.push(crate::ast::InterpolationPart::Expr { expr: sub_expr, format });
            } else {
                i += 1;
            }
        }
        if literal_start < body.len() {
            let seg = self.ctx.alloc_str(&body[literal_start..]);
            parts.push(crate::ast::InterpolationPart::Str(seg));
        }
        let parts = self.ctx.alloc_slice(self.ctx.interp_parts_arena(), parts);
        self.ctx.expr(crate::ast::ExprKind::InterpolatedString(parts), tok)
    }
}

fn literal_from_token<'a>(tok: Token<'a>) -> Literal<'a> {
    match tok.literal {
        Some(LiteralValue::Int(v)) => Literal::Int(*v),
        Some(LiteralValue::Uint(v)) => Literal::Uint(*v),
        Some(LiteralValue::Double(v)) => Literal::Double(*v),
        _ => Literal::Int(0),
    }
}

fn parent_dir(filename: &str) -> String {
    match filename.rfind(|c| c == '/' || c == '\\') {
        Some(idx) => filename[..idx].to_string(),
        None => ".".to_string(),
    }
}
