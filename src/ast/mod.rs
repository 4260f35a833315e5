pub mod expr;
pub mod stmt;
pub mod ty;

pub use expr::{
    BinaryOp, EscapeInfo, Expr, ExprKind, InterpolationPart, Lambda, LambdaBody, LambdaParam,
    Literal, MatchArm, UnaryOp,
};
pub use stmt::{
    BlockModifier, FnModifier, FunctionDecl, ImportStmt, Module, Param, PragmaKind, PragmaStmt,
    Stmt, StmtKind, VarDecl,
};
pub use ty::{Field, FunctionType, MemoryQualifier, StructType, Type};
