//! `Stmt` and `Module` (spec.md §3.1).

use std::cell::Cell;

use crate::ast::expr::Expr;
use crate::ast::ty::{MemoryQualifier, StructType, Type};
use crate::intern::Symbol;
use crate::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FnModifier {
    #[default]
    Default,
    Shared,
    Private,
}

#[derive(Debug)]
pub struct Param<'a> {
    pub name: Symbol,
    pub ty: &'a Type<'a>,
    pub mem_qualifier: MemoryQualifier,
}

#[derive(Debug)]
pub struct FunctionDecl<'a> {
    pub name: Symbol,
    pub params: &'a [Param<'a>],
    pub return_type: &'a Type<'a>,
    pub body: &'a [Stmt<'a>],
    pub modifier: FnModifier,
    pub is_native: bool,
    pub is_variadic: bool,
    pub c_alias: Option<&'a str>,
    pub has_arena_param: bool,
    /// Set when this declaration is a struct method bound with `static`.
    pub is_static: bool,
}

#[derive(Debug)]
pub struct VarDecl<'a> {
    pub name: Symbol,
    pub declared_type: Option<&'a Type<'a>>,
    pub init: Option<&'a Expr<'a>>,
    pub mem_qualifier: MemoryQualifier,
    pub is_sync: bool,
    pub is_static: bool,
}

/// `import "module"[, as NS]`. `imported_stmts`/`imported_count` are filled
/// in by the import resolver as it walks the statement (spec.md §4.3); a
/// purely-direct import is removed from its module entirely and never
/// allocated as a node at all (see `Parser::parse_import`'s `MergeDirect`
/// handling, which splices the imported statements in place instead).
#[derive(Debug)]
pub struct ImportStmt<'a> {
    /// SDK- or project-relative module name as written, e.g. `"util"`.
    pub module_name: &'a str,
    /// Canonical, normalised path used as the import-cache key.
    pub canonical_path: &'a str,
    pub namespace: Option<Symbol>,
    pub imported_stmts: Cell<Option<&'a [&'a Stmt<'a>]>>,
    pub imported_count: Cell<u32>,
    /// True once some *other* namespaced/direct import has already claimed
    /// emission of this module's code (spec.md §4.3's processing table).
    pub also_imported_directly: Cell<bool>,
    /// True for the one namespaced import of a module that is responsible
    /// for emitting its code.
    pub namespace_code_emitted: Cell<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PragmaKind {
    Include,
    Link,
    Source,
    Pack,
    Alias,
}

/// Pragma payload is captured verbatim (WYSIWYG) — see spec.md §4.2 and §6.
#[derive(Debug)]
pub struct PragmaStmt<'a> {
    pub kind: PragmaKind,
    pub raw_value: &'a str,
    /// For `#pragma source`, the directory the pragma appeared in — needed
    /// to resolve `value` relative to the *source file*, not the cwd
    /// (spec.md §4.4's path-composition rules).
    pub source_dir: Option<&'a str>,
}

/// Round-trips the legacy `shared`/`private` block modifiers the parser now
/// rejects on blocks (spec.md §9 Open Questions) so old pretty-printer
/// output can still be represented; the parser never constructs anything
/// but `None` here, but the variant is kept for fidelity with tooling that
/// consumes this AST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockModifier {
    Shared,
    Private,
}

#[derive(Debug, Clone, Copy)]
pub enum StmtKind<'a> {
    Expr(&'a Expr<'a>),
    VarDecl(&'a VarDecl<'a>),
    FunctionDecl(&'a FunctionDecl<'a>),
    StructDecl(&'a StructType<'a>),
    TypeAlias { name: Symbol, ty: &'a Type<'a> },
    Return(Option<&'a Expr<'a>>),
    Block { modifier: Option<BlockModifier>, body: &'a [Stmt<'a>] },
    If { cond: &'a Expr<'a>, then_branch: &'a [Stmt<'a>], else_branch: Option<&'a [Stmt<'a>]> },
    While { cond: &'a Expr<'a>, body: &'a [Stmt<'a>] },
    For {
        init: Option<&'a Stmt<'a>>,
        cond: Option<&'a Expr<'a>>,
        update: Option<&'a Stmt<'a>>,
        body: &'a [Stmt<'a>],
    },
    ForEach { var: Symbol, iterable: &'a Expr<'a>, body: &'a [Stmt<'a>] },
    Break,
    Continue,
    /// `lock(expr) => ...`: a critical section guarded by `expr`.
    Lock { guard: &'a Expr<'a>, body: &'a [Stmt<'a>] },
    Import(&'a ImportStmt<'a>),
    Pragma(&'a PragmaStmt<'a>),
}

#[derive(Debug, Clone, Copy)]
pub struct Stmt<'a> {
    pub kind: StmtKind<'a>,
    pub token: Token<'a>,
    pub leading_comments: &'a [&'a str],
}

impl<'a> Stmt<'a> {
    pub fn new(kind: StmtKind<'a>, token: Token<'a>) -> Self {
        Stmt { kind, token, leading_comments: &[] }
    }

    pub fn with_comments(mut self, comments: &'a [&'a str]) -> Self {
        self.leading_comments = comments;
        self
    }
}

/// A growable sequence of statements plus the file it came from. Initial
/// capacity 8, doubled on overflow — `Vec::with_capacity`'s amortised growth
/// already gives us this for free (spec.md §3.1).
#[derive(Debug)]
pub struct Module<'a> {
    pub filename: &'a str,
    pub stmts: Vec<&'a Stmt<'a>>,
}

impl<'a> Module<'a> {
    pub fn new(filename: &'a str) -> Self {
        Module { filename, stmts: Vec::with_capacity(8) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind;

    #[test]
    fn module_starts_with_capacity_eight() {
        let m = Module::new("main.sn");
        assert_eq!(m.stmts.capacity(), 8);
        assert!(m.stmts.is_empty());
    }

    #[test]
    fn stmt_default_has_no_comments() {
        let tok = Token::new(TokenKind::Break, "break", 1, "a.sn");
        let s = Stmt::new(StmtKind::Break, tok);
        assert!(s.leading_comments.is_empty());
    }

    #[test]
    fn import_stmt_emission_defaults_unclaimed() {
        let import = ImportStmt {
            module_name: "util",
            canonical_path: "/a/util.sn",
            namespace: None,
            imported_stmts: Cell::new(None),
            imported_count: Cell::new(0),
            also_imported_directly: Cell::new(false),
            namespace_code_emitted: Cell::new(false),
        };
        assert!(!import.namespace_code_emitted.get());
    }
}
