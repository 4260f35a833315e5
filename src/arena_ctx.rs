//! AST builder helpers (spec.md §4.5).
//!
//! One factory per `Type`/`Expr`/`Stmt` variant, generalised from the
//! teacher's handful of `AstContext::alloc_*`/`predicate`/`binary` factory
//! methods to the full grammar. Every factory allocates into the arena
//! bundle below and never fails — exhaustion aborts the process, which is
//! `bumpalo`'s own documented behaviour and already matches spec.md's
//! "fatal out-of-memory" design note.

use std::cell::Cell;

use crate::arena::{Arena, StrArena};
use crate::ast::{
    Expr, ExprKind, Field, FunctionDecl, ImportStmt, InterpolationPart, Lambda, LambdaParam,
    MatchArm, Param, PragmaStmt, Stmt, StmtKind, StructType, Type, VarDecl,
};
use crate::intern::Symbol;
use crate::token::Token;

/// One typed bump arena per node kind — the teacher's `Arena<T>`
/// (`src/arena.rs`) generalised from its single logic-expression arena to
/// the full AST, plus `StrArena` for byte-duplication.
pub struct AstContext<'a> {
    pub types: &'a Arena<Type<'a>>,
    pub struct_types: &'a Arena<StructType<'a>>,
    pub function_types: &'a Arena<crate::ast::FunctionType<'a>>,
    pub exprs: &'a Arena<Expr<'a>>,
    pub lambdas: &'a Arena<Lambda<'a>>,
    pub stmts: &'a Arena<Stmt<'a>>,
    pub var_decls: &'a Arena<VarDecl<'a>>,
    pub fn_decls: &'a Arena<FunctionDecl<'a>>,
    pub imports: &'a Arena<ImportStmt<'a>>,
    pub pragmas: &'a Arena<PragmaStmt<'a>>,
    pub strs: &'a StrArena,
    /// Backs `take_comments`'s comment-slice allocation.
    pub comment_slices: &'a Arena<&'a str>,
    /// Backs `&'a [&'a Stmt<'a>]` slices: a namespaced import's
    /// `imported_stmts` and a module's own top-level statement list.
    pub stmt_ref_slices: &'a Arena<&'a Stmt<'a>>,
    pub params: &'a Arena<Param<'a>>,
    pub lambda_params: &'a Arena<LambdaParam<'a>>,
    pub fields: &'a Arena<Field<'a>>,
    pub expr_lists: &'a Arena<&'a Expr<'a>>,
    pub match_arms: &'a Arena<MatchArm<'a>>,
    pub interp_parts: &'a Arena<InterpolationPart<'a>>,
}

impl<'a> Clone for AstContext<'a> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<'a> Copy for AstContext<'a> {}

impl<'a> AstContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        types: &'a Arena<Type<'a>>,
        struct_types: &'a Arena<StructType<'a>>,
        function_types: &'a Arena<crate::ast::FunctionType<'a>>,
        exprs: &'a Arena<Expr<'a>>,
        lambdas: &'a Arena<Lambda<'a>>,
        stmts: &'a Arena<Stmt<'a>>,
        var_decls: &'a Arena<VarDecl<'a>>,
        fn_decls: &'a Arena<FunctionDecl<'a>>,
        imports: &'a Arena<ImportStmt<'a>>,
        pragmas: &'a Arena<PragmaStmt<'a>>,
        strs: &'a StrArena,
        comment_slices: &'a Arena<&'a str>,
        stmt_ref_slices: &'a Arena<&'a Stmt<'a>>,
        params: &'a Arena<Param<'a>>,
        lambda_params: &'a Arena<LambdaParam<'a>>,
        fields: &'a Arena<Field<'a>>,
        expr_lists: &'a Arena<&'a Expr<'a>>,
        match_arms: &'a Arena<MatchArm<'a>>,
        interp_parts: &'a Arena<InterpolationPart<'a>>,
    ) -> Self {
        AstContext {
            types,
            struct_types,
            function_types,
            exprs,
            lambdas,
            stmts,
            var_decls,
            fn_decls,
            imports,
            pragmas,
            strs,
            comment_slices,
            stmt_ref_slices,
            params,
            lambda_params,
            fields,
            expr_lists,
            match_arms,
            interp_parts,
        }
    }

    // ---- slice-building arena accessors ------------------------------------
    // One bump arena per element type backs every `alloc_slice` call site in
    // `Parser`; sharing a single arena per type (rather than one per call
    // site) keeps `AstContext` small while still letting each kind of list
    // grow independently of the single-node arenas above.

    pub fn stmts_comment_arena(&self) -> &'a Arena<&'a str> {
        self.comment_slices
    }

    pub fn module_stmt_slice_arena(&self) -> &'a Arena<&'a Stmt<'a>> {
        self.stmt_ref_slices
    }

    pub fn methods_arena(&self) -> &'a Arena<&'a Stmt<'a>> {
        self.stmt_ref_slices
    }

    pub fn stmts_arena(&self) -> &'a Arena<Stmt<'a>> {
        self.stmts
    }

    pub fn params_arena(&self) -> &'a Arena<Param<'a>> {
        self.params
    }

    pub fn lambda_params_arena(&self) -> &'a Arena<LambdaParam<'a>> {
        self.lambda_params
    }

    pub fn fields_arena(&self) -> &'a Arena<Field<'a>> {
        self.fields
    }

    pub fn expr_lists_arena(&self) -> &'a Arena<&'a Expr<'a>> {
        self.expr_lists
    }

    pub fn match_arms_arena(&self) -> &'a Arena<MatchArm<'a>> {
        self.match_arms
    }

    pub fn interp_parts_arena(&self) -> &'a Arena<InterpolationPart<'a>> {
        self.interp_parts
    }

    /// Re-allocates `s` with `comments` attached — `Stmt` is `Copy`, so this
    /// is a cheap struct-update rather than a deep clone.
    pub fn stmt_with_comments(&self, s: &'a Stmt<'a>, comments: &'a [&'a str]) -> &'a Stmt<'a> {
        self.stmts.alloc(Stmt { leading_comments: comments, ..*s })
    }

    /// Arena-duplicate a byte range; backs every identifier, pragma value,
    /// and literal text a token carries so source buffers can be dropped
    /// after tokenisation (spec.md §3.2's `token->start` invariant).
    pub fn alloc_str(&self, s: &str) -> &'a str {
        self.strs.alloc_str(s)
    }

    pub fn alloc_slice<T, I>(&self, arena: &'a Arena<T>, items: I) -> &'a [T]
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: ExactSizeIterator,
    {
        arena.alloc_slice(items)
    }

    // ---- Type factories ----------------------------------------------------

    pub fn alloc_type(&self, ty: Type<'a>) -> &'a Type<'a> {
        self.types.alloc(ty)
    }

    pub fn array_type(&self, element: &'a Type<'a>) -> &'a Type<'a> {
        self.types.alloc(Type::Array { element })
    }

    pub fn pointer_type(&self, base: &'a Type<'a>) -> &'a Type<'a> {
        self.types.alloc(Type::Pointer { base })
    }

    pub fn function_type(&self, ft: crate::ast::FunctionType<'a>) -> &'a Type<'a> {
        let leaked = self.function_types.alloc(ft);
        self.types.alloc(Type::Function(leaked))
    }

    pub fn struct_type(&self, s: StructType<'a>) -> &'a Type<'a> {
        let leaked = self.struct_types.alloc(s);
        self.types.alloc(Type::Struct(leaked))
    }

    // ---- Expr factories ------------------------------------------------------

    pub fn expr(&self, kind: ExprKind<'a>, token: Token<'a>) -> &'a Expr<'a> {
        self.exprs.alloc(Expr::new(kind, token))
    }

    pub fn binary(&self, op: crate::ast::BinaryOp, left: &'a Expr<'a>, right: &'a Expr<'a>, token: Token<'a>) -> &'a Expr<'a> {
        self.expr(ExprKind::BinaryOp { op, left, right }, token)
    }

    pub fn unary(&self, op: crate::ast::UnaryOp, operand: &'a Expr<'a>, token: Token<'a>) -> &'a Expr<'a> {
        self.expr(ExprKind::UnaryOp { op, operand }, token)
    }

    pub fn literal(&self, value: crate::ast::Literal<'a>, is_interpolated: bool, token: Token<'a>) -> &'a Expr<'a> {
        self.expr(ExprKind::Literal { value, is_interpolated }, token)
    }

    pub fn variable(&self, name: Symbol, token: Token<'a>) -> &'a Expr<'a> {
        self.expr(ExprKind::Variable(name), token)
    }

    pub fn member(&self, object: &'a Expr<'a>, field: Symbol, token: Token<'a>) -> &'a Expr<'a> {
        self.expr(ExprKind::Member { object, field, field_index: Cell::new(None) }, token)
    }

    pub fn lambda(&self, l: Lambda<'a>, token: Token<'a>) -> &'a Expr<'a> {
        let leaked = self.lambdas.alloc(l);
        self.expr(ExprKind::Lambda(leaked), token)
    }

    // ---- Stmt factories -----------------------------------------------------

    pub fn stmt(&self, kind: StmtKind<'a>, token: Token<'a>) -> &'a Stmt<'a> {
        self.stmts.alloc(Stmt::new(kind, token))
    }

    pub fn var_decl(&self, decl: VarDecl<'a>, token: Token<'a>) -> &'a Stmt<'a> {
        let leaked = self.var_decls.alloc(decl);
        self.stmt(StmtKind::VarDecl(leaked), token)
    }

    pub fn function_decl(&self, decl: FunctionDecl<'a>, token: Token<'a>) -> &'a Stmt<'a> {
        let leaked = self.fn_decls.alloc(decl);
        self.stmt(StmtKind::FunctionDecl(leaked), token)
    }

    pub fn struct_decl(&self, s: StructType<'a>, token: Token<'a>) -> &'a Stmt<'a> {
        let leaked = self.struct_types.alloc(s);
        self.stmt(StmtKind::StructDecl(leaked), token)
    }

    pub fn import_stmt(&self, import: ImportStmt<'a>, token: Token<'a>) -> &'a Stmt<'a> {
        let leaked = self.imports.alloc(import);
        self.stmt(StmtKind::Import(leaked), token)
    }

    pub fn pragma_stmt(&self, pragma: PragmaStmt<'a>, token: Token<'a>) -> &'a Stmt<'a> {
        let leaked = self.pragmas.alloc(pragma);
        self.stmt(StmtKind::Pragma(leaked), token)
    }

    pub fn param(&self, name: Symbol, ty: &'a Type<'a>, mem_qualifier: crate::ast::MemoryQualifier) -> Param<'a> {
        Param { name, ty, mem_qualifier }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOp;
    use crate::token::TokenKind;

    struct Arenas<'a> {
        types: Arena<Type<'a>>,
        struct_types: Arena<StructType<'a>>,
        function_types: Arena<crate::ast::FunctionType<'a>>,
        exprs: Arena<Expr<'a>>,
        lambdas: Arena<Lambda<'a>>,
        stmts: Arena<Stmt<'a>>,
        var_decls: Arena<VarDecl<'a>>,
        fn_decls: Arena<FunctionDecl<'a>>,
        imports: Arena<ImportStmt<'a>>,
        pragmas: Arena<PragmaStmt<'a>>,
        strs: StrArena,
        comment_slices: Arena<&'a str>,
        stmt_ref_slices: Arena<&'a Stmt<'a>>,
        params: Arena<Param<'a>>,
        lambda_params: Arena<crate::ast::LambdaParam<'a>>,
        fields: Arena<crate::ast::Field<'a>>,
        expr_lists: Arena<&'a Expr<'a>>,
        match_arms: Arena<crate::ast::MatchArm<'a>>,
        interp_parts: Arena<crate::ast::InterpolationPart<'a>>,
    }

    impl<'a> Arenas<'a> {
        fn new() -> Self {
            Arenas {
                types: Arena::new(),
                struct_types: Arena::new(),
                function_types: Arena::new(),
                exprs: Arena::new(),
                lambdas: Arena::new(),
                stmts: Arena::new(),
                var_decls: Arena::new(),
                fn_decls: Arena::new(),
                imports: Arena::new(),
                pragmas: Arena::new(),
                strs: StrArena::new(),
                comment_slices: Arena::new(),
                stmt_ref_slices: Arena::new(),
                params: Arena::new(),
                lambda_params: Arena::new(),
                fields: Arena::new(),
                expr_lists: Arena::new(),
                match_arms: Arena::new(),
                interp_parts: Arena::new(),
            }
        }

        fn ctx(&'a self) -> AstContext<'a> {
            AstContext::new(
                &self.types,
                &self.struct_types,
                &self.function_types,
                &self.exprs,
                &self.lambdas,
                &self.stmts,
                &self.var_decls,
                &self.fn_decls,
                &self.imports,
                &self.pragmas,
                &self.strs,
                &self.comment_slices,
                &self.stmt_ref_slices,
                &self.params,
                &self.lambda_params,
                &self.fields,
                &self.expr_lists,
                &self.match_arms,
                &self.interp_parts,
            )
        }
    }

    fn tok<'a>() -> Token<'a> {
        Token::new(TokenKind::Plus, "+", 1, "t.sn")
    }

    #[test]
    fn binary_builder_allocates_into_expr_arena() {
        let arenas = Arenas::new();
        let c = arenas.ctx();
        let one = c.literal(crate::ast::Literal::Int(1), false, tok());
        let two = c.literal(crate::ast::Literal::Int(2), false, tok());
        let sum = c.binary(BinaryOp::Add, one, two, tok());
        assert!(matches!(sum.kind, ExprKind::BinaryOp { op: BinaryOp::Add, .. }));
    }

    #[test]
    fn variable_builder_interns_token() {
        let arenas = Arenas::new();
        let c = arenas.ctx();
        let mut interner = crate::intern::Interner::new();
        let x = interner.intern("x");
        let v = c.variable(x, tok());
        assert!(matches!(v.kind, ExprKind::Variable(s) if s == x));
    }

    #[test]
    fn alloc_str_copies_bytes() {
        let arenas = Arenas::new();
        let c = arenas.ctx();
        let a = c.alloc_str("hello");
        assert_eq!(a, "hello");
    }

    #[test]
    fn param_carries_memory_qualifier() {
        let arenas = Arenas::new();
        let c = arenas.ctx();
        let p = c.param(Symbol::EMPTY, &Type::Int, crate::ast::MemoryQualifier::Ref);
        assert_eq!(p.mem_qualifier, crate::ast::MemoryQualifier::Ref);
    }

    #[test]
    fn struct_decl_builder_allocates_struct_type() {
        let arenas = Arenas::new();
        let c = arenas.ctx();
        let st = StructType {
            name: Symbol::EMPTY,
            fields: &[],
            methods: &[],
            size: Cell::new(0),
            alignment: Cell::new(0),
            is_native: false,
            is_packed: false,
            pass_self_by_ref: Cell::new(false),
            c_alias: None,
        };
        let s = c.struct_decl(st, tok());
        assert!(matches!(s.kind, StmtKind::StructDecl(_)));
    }
}
