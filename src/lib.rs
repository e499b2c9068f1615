//! Semantic core of an SPMD compiler front end.
//!
//! This crate owns the type system, symbol table, and the two expression
//! passes — `type_check` and `optimize` — that a parser-driven front end
//! runs over its AST before handing it to an emitter. It does not parse
//! source text and does not generate code; both are explicitly out of
//! scope (see `target::EmitContext`).
//!
//! ```rust
//! use varyc::{CheckCtx, Expr, Literal, Module, OptFlags, TargetInfo};
//! use varyc::diag::CollectingDiagnostics;
//! use varyc::pos::Pos;
//! use varyc::types::{AtomicKind, Type};
//!
//! let mut module = Module::new();
//! let target = TargetInfo::default();
//! let opts = OptFlags::default();
//! let mut diags = CollectingDiagnostics::new();
//!
//! let one = Expr::Literal {
//!     value: Literal::Int(1),
//!     ty: Type::uniform(AtomicKind::Int32),
//!     pos: Pos::synthetic(),
//! };
//! let checked = module.check_and_optimize(one, &target, &opts, &mut diags);
//! assert!(checked.is_some());
//! ```

pub mod convert;
pub mod diag;
pub mod expr;
pub mod fold;
pub mod overload;
pub mod pos;
pub mod sym;
pub mod target;
pub mod types;

pub use convert::{convert, is_convertible};
pub use diag::{CollectingDiagnostics, Diagnostic, DiagnosticKind, DiagnosticSink, Severity};
pub use expr::{
    AssignOp, BinaryOp, CheckCtx, Expr, Literal, MemberAccessKind, Module, SizeOfTarget, UnaryOp,
};
pub use overload::{OverloadArg, resolve as resolve_overload};
pub use pos::Pos;
pub use sym::{ConstValue, DeclConflict, StorageClass, Symbol, SymbolTable};
pub use target::{EmitContext, OptFlags, TargetInfo};
pub use types::{
    ArrayType, AtomicKind, AtomicType, EnumType, FunctionParam, FunctionType, PointerType,
    ReferenceType, StructMember, StructType, Type, Variability, VectorType,
};
