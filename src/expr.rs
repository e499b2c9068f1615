//! The expression AST and its two passes: `type_check` and `optimize`.
//!
//! `Expr` is a single closed enum, a tagged variant rather than a
//! virtual/trait-object hierarchy. There is no per-kind trait;
//! `type_check`/`optimize`/`type_of`/`lvalue_type`/`base_symbol`/
//! `estimate_cost` are inherent methods implemented by one exhaustive
//! `match` each. Passes consume `self` and return `Option<Self>` under
//! move semantics: a pass never holds both the pre- and post-substitution
//! node at once.

use crate::convert::convert;
use crate::diag::{DiagnosticKind, DiagnosticSink};
use crate::fold;
use crate::overload::{self, OverloadArg};
use crate::pos::Pos;
use crate::sym::{ConstValue, DeclConflict, Symbol, SymbolTable};
use crate::target::{OptFlags, TargetInfo};
use crate::types::{AtomicKind, FunctionType, Type, Variability};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl Literal {
    /// `true` iff this is the integer literal `0`, which case 6 of the
    /// conversion engine treats as convertible to any pointer type.
    pub fn is_zero_int(&self) -> bool {
        matches!(self, Literal::Int(0) | Literal::UInt(0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    LogNot,
    BitNot,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    LogAnd,
    LogOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::LogAnd | BinaryOp::LogOr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    ShlAssign,
    ShrAssign,
    AndAssign,
    OrAssign,
    XorAssign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberAccessKind {
    Dot,
    Arrow,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SizeOfTarget {
    Type(Type),
    Expr(Box<Expr>),
}

/// The closed expression variant. `ty` fields are `None` before
/// `type_check` runs and `Some` after.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal {
        value: Literal,
        ty: Type,
        pos: Pos,
    },
    NullPointer {
        ty: Type,
        pos: Pos,
    },
    Ident {
        name: Rc<str>,
        ty: Option<Type>,
        pos: Pos,
    },
    FuncRef {
        name: Rc<str>,
        /// Bound by `resolve_overload`; `None` until then.
        matching_func: Option<Rc<Symbol>>,
        ty: Option<Type>,
        pos: Pos,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        ty: Option<Type>,
        pos: Pos,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        ty: Option<Type>,
        pos: Pos,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
        ty: Option<Type>,
        pos: Pos,
    },
    Select {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
        ty: Option<Type>,
        pos: Pos,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        launch_count: Option<Box<Expr>>,
        ty: Option<Type>,
        pos: Pos,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
        ty: Option<Type>,
        pos: Pos,
    },
    Member {
        base: Box<Expr>,
        kind: MemberAccessKind,
        name: Rc<str>,
        ty: Option<Type>,
        pos: Pos,
    },
    AddressOf {
        operand: Box<Expr>,
        ty: Option<Type>,
        pos: Pos,
    },
    Deref {
        operand: Box<Expr>,
        ty: Option<Type>,
        pos: Pos,
    },
    ReferenceOf {
        operand: Box<Expr>,
        ty: Option<Type>,
        pos: Pos,
    },
    Cast {
        target_type: Type,
        operand: Box<Expr>,
        pos: Pos,
    },
    SizeOf {
        target: SizeOfTarget,
        pos: Pos,
    },
    Sync {
        pos: Pos,
    },
    ExprList {
        items: Vec<Expr>,
        ty: Option<Type>,
        pos: Pos,
    },
}

impl Expr {
    pub fn pos(&self) -> Pos {
        match self {
            Expr::Literal { pos, .. }
            | Expr::NullPointer { pos, .. }
            | Expr::Ident { pos, .. }
            | Expr::FuncRef { pos, .. }
            | Expr::Unary { pos, .. }
            | Expr::Binary { pos, .. }
            | Expr::Assign { pos, .. }
            | Expr::Select { pos, .. }
            | Expr::Call { pos, .. }
            | Expr::Index { pos, .. }
            | Expr::Member { pos, .. }
            | Expr::AddressOf { pos, .. }
            | Expr::Deref { pos, .. }
            | Expr::ReferenceOf { pos, .. }
            | Expr::Cast { pos, .. }
            | Expr::SizeOf { pos, .. }
            | Expr::Sync { pos }
            | Expr::ExprList { pos, .. } => *pos,
        }
    }

    // ---- common contract ---------------------------------------------------

    /// Semantic type of this node's value, or `None` before/failed checking.
    pub fn type_of(&self) -> Option<&Type> {
        match self {
            Expr::Literal { ty, .. } | Expr::NullPointer { ty, .. } => Some(ty),
            Expr::Cast { target_type, .. } => Some(target_type),
            Expr::Sync { .. } => None,
            Expr::Ident { ty, .. }
            | Expr::FuncRef { ty, .. }
            | Expr::Unary { ty, .. }
            | Expr::Binary { ty, .. }
            | Expr::Assign { ty, .. }
            | Expr::Select { ty, .. }
            | Expr::Call { ty, .. }
            | Expr::Index { ty, .. }
            | Expr::Member { ty, .. }
            | Expr::AddressOf { ty, .. }
            | Expr::Deref { ty, .. }
            | Expr::ReferenceOf { ty, .. }
            | Expr::ExprList { ty, .. } => ty.as_ref(),
            Expr::SizeOf { .. } => None,
        }
    }

    /// Pointer-to-target type if this node designates storage, else `None`.
    pub fn lvalue_type(&self) -> Option<Type> {
        match self {
            Expr::Ident { ty: Some(ty), .. } => Some(Type::Pointer(crate::types::PointerType {
                base: Box::new(ty.clone()),
                variability: Variability::Uniform,
                is_const: ty.is_const(),
            })),
            Expr::Deref { operand, .. } => operand.type_of().cloned(),
            Expr::Index { base, ty: Some(ty), .. } => {
                let base_varying = base.type_of().is_some_and(Type::is_varying);
                Some(Type::Pointer(crate::types::PointerType {
                    base: Box::new(ty.clone()),
                    variability: if base_varying {
                        Variability::Varying
                    } else {
                        Variability::Uniform
                    },
                    is_const: ty.is_const(),
                }))
            }
            Expr::Member { ty: Some(ty), .. } => Some(Type::Pointer(crate::types::PointerType {
                base: Box::new(ty.clone()),
                variability: Variability::Uniform,
                is_const: ty.is_const(),
            })),
            _ => None,
        }
    }

    /// The root variable this node ultimately refers to, for mask
    /// selection during assignment.
    pub fn base_symbol(&self) -> Option<&str> {
        match self {
            Expr::Ident { name, .. } => Some(name),
            Expr::Index { base, .. } | Expr::Member { base, .. } => base.base_symbol(),
            Expr::Deref { operand, .. }
            | Expr::AddressOf { operand, .. }
            | Expr::ReferenceOf { operand, .. } => operand.base_symbol(),
            Expr::Cast { operand, .. } => operand.base_symbol(),
            _ => None,
        }
    }

    /// Heuristic cost used by the emitter's scheduling; not semantically
    /// observable. Leaves are cheap, memory ops and calls are expensive.
    pub fn estimate_cost(&self) -> u32 {
        match self {
            Expr::Literal { .. } | Expr::NullPointer { .. } | Expr::Sync { .. } => 1,
            Expr::Ident { .. } | Expr::FuncRef { .. } => 1,
            Expr::Unary { operand, .. } => 2 + operand.estimate_cost(),
            Expr::Binary { lhs, rhs, .. } => 2 + lhs.estimate_cost() + rhs.estimate_cost(),
            Expr::Assign { target, value, .. } => {
                3 + target.estimate_cost() + value.estimate_cost()
            }
            Expr::Select {
                cond,
                then_branch,
                else_branch,
                ..
            } => 2 + cond.estimate_cost() + then_branch.estimate_cost() + else_branch.estimate_cost(),
            Expr::Call { args, .. } => 10 + args.iter().map(Expr::estimate_cost).sum::<u32>(),
            Expr::Index { base, index, .. } => 4 + base.estimate_cost() + index.estimate_cost(),
            Expr::Member { base, .. } => 2 + base.estimate_cost(),
            Expr::AddressOf { operand, .. } | Expr::ReferenceOf { operand, .. } => {
                1 + operand.estimate_cost()
            }
            Expr::Deref { operand, .. } => 3 + operand.estimate_cost(),
            Expr::Cast { operand, .. } => 1 + operand.estimate_cost(),
            Expr::SizeOf { .. } => 1,
            Expr::ExprList { items, .. } => items.iter().map(Expr::estimate_cost).sum::<u32>().max(1),
        }
    }
}

/// Checking context threaded explicitly through every call, rather than
/// living as implicit global state.
pub struct CheckCtx<'a> {
    pub symbols: &'a mut SymbolTable,
    pub target: &'a TargetInfo,
    pub opts: &'a OptFlags,
    pub diags: &'a mut dyn DiagnosticSink,
}

impl Expr {
    /// Binds identifiers/overloads, inserts implicit conversions and
    /// decays, and computes the node's type. Consumes `self`; `None`
    /// means a diagnostic was already reported.
    pub fn type_check(self, ctx: &mut CheckCtx) -> Option<Expr> {
        match self {
            Expr::Literal { .. } | Expr::NullPointer { .. } => Some(self),

            Expr::Ident { name, pos, .. } => {
                match ctx.symbols.lookup_variable(&name) {
                    Some(sym) => {
                        let ty = sym.ty.clone();
                        Some(Expr::Ident {
                            name,
                            ty: Some(ty),
                            pos,
                        })
                    }
                    None => {
                        let suggestions = ctx.symbols.near_miss(&name);
                        ctx.diags.error(
                            DiagnosticKind::Lookup,
                            pos,
                            lookup_error_message(&name, &suggestions),
                        );
                        None
                    }
                }
            }

            Expr::FuncRef { name, pos, .. } => {
                if ctx.symbols.lookup_function_any(&name).is_empty() {
                    let suggestions = ctx.symbols.near_miss(&name);
                    ctx.diags.error(
                        DiagnosticKind::Lookup,
                        pos,
                        lookup_error_message(&name, &suggestions),
                    );
                    return None;
                }
                // Type is bound once overload resolution runs; left `None`
                // until `resolve_overload` sets `matching_func`.
                Some(Expr::FuncRef {
                    name,
                    matching_func: None,
                    ty: None,
                    pos,
                })
            }

            Expr::Unary { op, operand, pos, .. } => {
                let operand = (*operand).type_check(ctx)?;
                let operand_ty = operand.type_of()?.clone();
                check_unary(op, operand, &operand_ty, pos, ctx)
            }

            Expr::Binary { op, lhs, rhs, pos, .. } => {
                let lhs = (*lhs).type_check(ctx)?;
                let rhs = (*rhs).type_check(ctx)?;
                check_binary(op, lhs, rhs, pos, ctx)
            }

            Expr::Assign {
                op,
                target,
                value,
                pos,
                ..
            } => check_assign(op, (*target).type_check(ctx)?, (*value).type_check(ctx)?, pos, ctx),

            Expr::Select {
                cond,
                then_branch,
                else_branch,
                pos,
                ..
            } => {
                let cond = (*cond).type_check(ctx)?;
                let then_branch = (*then_branch).type_check(ctx)?;
                let else_branch = (*else_branch).type_check(ctx)?;
                check_select(cond, then_branch, else_branch, pos, ctx)
            }

            Expr::Call {
                callee,
                args,
                launch_count,
                pos,
                ..
            } => check_call(*callee, args, launch_count, pos, ctx),

            Expr::Index { base, index, pos, .. } => {
                let base = (*base).type_check(ctx)?;
                let index = (*index).type_check(ctx)?;
                check_index(base, index, pos, ctx)
            }

            Expr::Member {
                base,
                kind,
                name,
                pos,
                ..
            } => {
                let base = (*base).type_check(ctx)?;
                check_member(base, kind, name, pos, ctx)
            }

            Expr::AddressOf { operand, pos, .. } => {
                let operand = (*operand).type_check(ctx)?;
                let target = operand.type_of()?.clone();
                let variability = target.variability();
                Some(Expr::AddressOf {
                    ty: Some(Type::Pointer(crate::types::PointerType {
                        base: Box::new(target),
                        variability,
                        is_const: false,
                    })),
                    operand: Box::new(operand),
                    pos,
                })
            }

            Expr::Deref { operand, pos, .. } => {
                let operand = (*operand).type_check(ctx)?;
                match operand.type_of() {
                    Some(t) if t.is_pointer() => {
                        let base = t.base_type().unwrap().clone();
                        let varying = base.is_varying() || t.is_varying();
                        Some(Expr::Deref {
                            ty: Some(if varying { base.as_varying() } else { base }),
                            operand: Box::new(operand),
                            pos,
                        })
                    }
                    _ => {
                        ctx.diags.error(
                            DiagnosticKind::ShapeMismatch,
                            pos,
                            "can't dereference a non-pointer type".to_string(),
                        );
                        None
                    }
                }
            }

            Expr::ReferenceOf { operand, pos, .. } => {
                let operand = (*operand).type_check(ctx)?;
                let target = operand.type_of()?.clone();
                Some(Expr::ReferenceOf {
                    ty: Some(Type::Reference(crate::types::ReferenceType {
                        target: Box::new(target),
                    })),
                    operand: Box::new(operand),
                    pos,
                })
            }

            Expr::Cast {
                target_type,
                operand,
                pos,
            } => {
                let operand = (*operand).type_check(ctx)?;
                let from = operand.type_of()?.clone();
                convert(operand, &from, &target_type, "explicit cast", pos, false, ctx.diags)
            }

            Expr::SizeOf { target, pos } => {
                let target = match target {
                    SizeOfTarget::Type(t) => SizeOfTarget::Type(t),
                    SizeOfTarget::Expr(e) => SizeOfTarget::Expr(Box::new((*e).type_check(ctx)?)),
                };
                Some(Expr::SizeOf { target, pos })
            }

            Expr::Sync { pos } => Some(Expr::Sync { pos }),

            Expr::ExprList { items, pos, .. } => {
                let mut checked = Vec::with_capacity(items.len());
                for item in items {
                    checked.push(item.type_check(ctx)?);
                }
                let ty = checked.last().and_then(|e| e.type_of()).cloned();
                Some(Expr::ExprList {
                    items: checked,
                    ty,
                    pos,
                })
            }
        }
    }

    /// Constant folding and fast-math rewrites. Consumes
    /// `self`; never emits a diagnostic type-check didn't already cover,
    /// except the fast-math `rcp` missing warning.
    pub fn optimize(self, ctx: &mut CheckCtx) -> Option<Expr> {
        fold::optimize(self, ctx)
    }
}

fn lookup_error_message(name: &str, suggestions: &[&str]) -> String {
    if suggestions.is_empty() {
        format!("undeclared identifier \"{name}\"")
    } else {
        format!(
            "undeclared identifier \"{name}\"; did you mean {}?",
            suggestions
                .iter()
                .map(|s| format!("\"{s}\""))
                .collect::<Vec<_>>()
                .join(" or ")
        )
    }
}

fn check_unary(
    op: UnaryOp,
    operand: Expr,
    operand_ty: &Type,
    pos: Pos,
    ctx: &mut CheckCtx,
) -> Option<Expr> {
    match op {
        UnaryOp::LogNot => {
            if !operand_ty.is_numeric() && !operand_ty.is_pointer() {
                ctx.diags.error(
                    DiagnosticKind::ShapeMismatch,
                    pos,
                    "logical not requires a numeric or pointer operand".to_string(),
                );
                return None;
            }
            let ty = Type::atomic(AtomicKind::Bool, operand_ty.variability(), false);
            Some(Expr::Unary {
                op,
                operand: Box::new(operand),
                ty: Some(ty),
                pos,
            })
        }
        UnaryOp::BitNot => {
            if !operand_ty.is_integer() {
                ctx.diags.error(
                    DiagnosticKind::Arithmetic,
                    pos,
                    "bitwise not requires an integer operand".to_string(),
                );
                return None;
            }
            Some(Expr::Unary {
                op,
                ty: Some(operand_ty.clone()),
                operand: Box::new(operand),
                pos,
            })
        }
        UnaryOp::Neg => {
            if !operand_ty.is_numeric() {
                ctx.diags.error(
                    DiagnosticKind::Arithmetic,
                    pos,
                    "negation requires a numeric operand".to_string(),
                );
                return None;
            }
            Some(Expr::Unary {
                op,
                ty: Some(operand_ty.clone()),
                operand: Box::new(operand),
                pos,
            })
        }
        UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec => {
            if !operand_ty.is_numeric() && !operand_ty.is_pointer() {
                ctx.diags.error(
                    DiagnosticKind::ShapeMismatch,
                    pos,
                    "increment/decrement requires a numeric or pointer operand".to_string(),
                );
                return None;
            }
            Some(Expr::Unary {
                op,
                ty: Some(operand_ty.clone()),
                operand: Box::new(operand),
                pos,
            })
        }
    }
}

fn check_binary(op: BinaryOp, lhs: Expr, rhs: Expr, pos: Pos, ctx: &mut CheckCtx) -> Option<Expr> {
    let lhs_ty = lhs.type_of()?.clone();
    let rhs_ty = rhs.type_of()?.clone();

    if matches!(op, BinaryOp::Mod) && (lhs_ty.is_float() || rhs_ty.is_float()) {
        ctx.diags.error(
            DiagnosticKind::Arithmetic,
            pos,
            "modulo on a float operand is illegal".to_string(),
        );
        return None;
    }
    if matches!(op, BinaryOp::Shl | BinaryOp::Shr) && (!lhs_ty.is_integer() || !rhs_ty.is_integer())
    {
        ctx.diags.error(
            DiagnosticKind::Arithmetic,
            pos,
            "shift requires integer operands".to_string(),
        );
        return None;
    }
    if (matches!(op, BinaryOp::Add | BinaryOp::Sub) && lhs_ty.is_pointer() && lhs_ty.base_type().is_some_and(Type::is_void))
        || (matches!(op, BinaryOp::Add | BinaryOp::Sub) && rhs_ty.is_pointer() && rhs_ty.base_type().is_some_and(Type::is_void))
    {
        ctx.diags.error(
            DiagnosticKind::Arithmetic,
            pos,
            "arithmetic on a void pointer is illegal".to_string(),
        );
        return None;
    }

    // Pointer ± integer: the result is the pointer type, scaled-offset
    // semantics (the integer counts elements, not bytes). `int + pointer`
    // is legal for `Add`; `pointer - int` is legal for `Sub`, but not
    // `int - pointer`.
    let pointer_offset = if matches!(op, BinaryOp::Add | BinaryOp::Sub) && lhs_ty.is_pointer() && rhs_ty.is_integer() {
        Some(lhs_ty.clone())
    } else if op == BinaryOp::Add && rhs_ty.is_pointer() && lhs_ty.is_integer() {
        Some(rhs_ty.clone())
    } else {
        None
    };
    if let Some(ptr_ty) = pointer_offset {
        let varying = lhs_ty.is_varying() || rhs_ty.is_varying();
        let ty = if varying { ptr_ty.as_varying() } else { ptr_ty };
        return Some(Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            ty: Some(ty),
            pos,
        });
    }

    // Pointer difference.
    if matches!(op, BinaryOp::Sub) && lhs_ty.is_pointer() && rhs_ty.is_pointer() {
        let kind = ctx.target.pointer_diff_type(ctx.opts.force_32_bit_addressing);
        let varying = lhs_ty.is_varying() || rhs_ty.is_varying();
        let ty = if varying {
            Type::varying(kind)
        } else {
            Type::uniform(kind)
        };
        return Some(Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            ty: Some(ty),
            pos,
        });
    }

    let result_ty = Type::more_general_type(&lhs_ty, &rhs_ty, pos, "binary operator", false, None, ctx.diags)?;

    let (lhs, rhs) = (
        convert(lhs, &lhs_ty, &result_ty, "binary operator", pos, false, ctx.diags)?,
        convert(rhs, &rhs_ty, &result_ty, "binary operator", pos, false, ctx.diags)?,
    );

    let ty = if op.is_comparison() || op.is_logical() {
        Type::atomic(AtomicKind::Bool, result_ty.variability(), false)
    } else {
        result_ty.as_mutable()
    };

    Some(Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        ty: Some(ty),
        pos,
    })
}

fn check_assign(op: AssignOp, target: Expr, value: Expr, pos: Pos, ctx: &mut CheckCtx) -> Option<Expr> {
    let target_ty = target.type_of()?.clone();
    if target.lvalue_type().is_none() {
        ctx.diags.error(
            DiagnosticKind::ShapeMismatch,
            pos,
            "left-hand side of assignment is not an lvalue".to_string(),
        );
        return None;
    }
    if target_ty.is_const() {
        // A struct can be const only because one of its members is
        // (invariant 4); name that member rather than just the struct type.
        let message = match &target_ty {
            Type::Struct(s) if !s.is_const => match s.members.iter().find(|m| m.is_const || m.ty.is_const()) {
                Some(m) => format!(
                    "Can't assign to type \"{}\" on left-hand side of expression; member \"{}\" has type \"{}\".",
                    target_ty, m.name, m.ty
                ),
                None => format!("Can't assign to type \"{}\" on left-hand side of expression.", target_ty),
            },
            _ => format!("Can't assign to type \"{}\" on left-hand side of expression.", target_ty),
        };
        ctx.diags.error(DiagnosticKind::Constness, pos, message);
        return None;
    }

    let value_ty = value.type_of()?.clone();
    let value = convert(value, &value_ty, &target_ty, "assignment", pos, false, ctx.diags)?;

    Some(Expr::Assign {
        op,
        ty: Some(target_ty),
        target: Box::new(target),
        value: Box::new(value),
        pos,
    })
}

fn check_select(cond: Expr, then_branch: Expr, else_branch: Expr, pos: Pos, ctx: &mut CheckCtx) -> Option<Expr> {
    let cond_ty = cond.type_of()?.clone();
    let then_ty = then_branch.type_of()?.clone();
    let else_ty = else_branch.type_of()?.clone();

    let cond = convert(
        cond,
        &cond_ty,
        &Type::atomic(AtomicKind::Bool, cond_ty.variability(), false),
        "ternary condition",
        pos,
        false,
        ctx.diags,
    )?;

    let force_varying = cond_ty.is_varying();
    let result_ty = Type::more_general_type(&then_ty, &else_ty, pos, "ternary operator", force_varying, None, ctx.diags)?;
    let then_branch = convert(then_branch, &then_ty, &result_ty, "ternary operator", pos, false, ctx.diags)?;
    let else_branch = convert(else_branch, &else_ty, &result_ty, "ternary operator", pos, false, ctx.diags)?;

    Some(Expr::Select {
        cond: Box::new(cond),
        then_branch: Box::new(then_branch),
        else_branch: Box::new(else_branch),
        ty: Some(result_ty),
        pos,
    })
}

fn check_index(base: Expr, index: Expr, pos: Pos, ctx: &mut CheckCtx) -> Option<Expr> {
    let base_ty = base.type_of()?.clone();
    let index_ty = index.type_of()?.clone();
    if !index_ty.is_integer() {
        ctx.diags.error(
            DiagnosticKind::ShapeMismatch,
            pos,
            "array/pointer index must be an integer".to_string(),
        );
        return None;
    }

    let decayed = base_ty.decay_array_to_pointer();
    let element = match decayed.base_type() {
        Some(e) => e.clone(),
        None => {
            ctx.diags.error(
                DiagnosticKind::ShapeMismatch,
                pos,
                "indexed expression is not an array or pointer".to_string(),
            );
            return None;
        }
    };

    // Invariant 6: r-value is varying if either base or index is varying.
    let varying = base_ty.is_varying() || index_ty.is_varying();
    let ty = if varying { element.as_varying() } else { element };

    Some(Expr::Index {
        base: Box::new(base),
        index: Box::new(index),
        ty: Some(ty),
        pos,
    })
}

fn check_member(base: Expr, kind: MemberAccessKind, name: Rc<str>, pos: Pos, ctx: &mut CheckCtx) -> Option<Expr> {
    let base_ty = base.type_of()?.clone();

    let struct_ty = match (kind, &base_ty) {
        (MemberAccessKind::Dot, Type::Struct(_)) => base_ty.clone(),
        (MemberAccessKind::Arrow, t) if t.is_pointer() => t.base_type().unwrap().clone(),
        _ => {
            ctx.diags.error(
                DiagnosticKind::ShapeMismatch,
                pos,
                "member access requires a struct (`.`) or pointer-to-struct (`->`)".to_string(),
            );
            return None;
        }
    };

    let Type::Struct(s) = &struct_ty else {
        ctx.diags.error(
            DiagnosticKind::ShapeMismatch,
            pos,
            "member access target is not a struct".to_string(),
        );
        return None;
    };

    let Some(member) = s.member(&name) else {
        let candidates: Vec<&str> = s.members.iter().map(|m| m.name.as_ref()).collect();
        let suggestions = crate::diag::near_miss_suggestions(&name, candidates, 2);
        ctx.diags.error(
            DiagnosticKind::Lookup,
            pos,
            lookup_error_message(&name, &suggestions),
        );
        return None;
    };

    let varying = struct_ty.is_varying() || member.ty.is_varying();
    let ty = if varying {
        member.ty.as_varying()
    } else {
        member.ty.clone()
    };

    Some(Expr::Member {
        base: Box::new(base),
        kind,
        name,
        ty: Some(ty),
        pos,
    })
}

fn check_call(
    callee: Expr,
    args: Vec<Expr>,
    launch_count: Option<Box<Expr>>,
    pos: Pos,
    ctx: &mut CheckCtx,
) -> Option<Expr> {
    let Expr::FuncRef { name, pos: fpos, .. } = callee else {
        ctx.diags.error(
            DiagnosticKind::ShapeMismatch,
            pos,
            "call target is not a function name".to_string(),
        );
        return None;
    };

    let candidates = ctx.symbols.lookup_function_any(&name);
    if candidates.is_empty() {
        let suggestions = ctx.symbols.near_miss(&name);
        ctx.diags.error(
            DiagnosticKind::Lookup,
            fpos,
            lookup_error_message(&name, &suggestions),
        );
        return None;
    }
    let candidates: Vec<Rc<Symbol>> = candidates.into_iter().map(|s| Rc::new(s.clone())).collect();

    let mut checked_args = Vec::with_capacity(args.len());
    for a in args {
        checked_args.push(a.type_check(ctx)?);
    }

    let overload_args: Vec<OverloadArg> = checked_args
        .iter()
        .map(|a| {
            let ty = a.type_of().cloned().unwrap_or_else(|| Type::uniform(AtomicKind::Void));
            let could_be_null = matches!(a, Expr::Literal { value, .. } if value.is_zero_int());
            OverloadArg { ty, could_be_null }
        })
        .collect();

    let resolved = overload::resolve(&name, &candidates, &overload_args, fpos, ctx.diags)?;

    if launch_count.is_some() && !resolved.ty.is_task_function() {
        ctx.diags.error(
            DiagnosticKind::Overload,
            pos,
            "launch expression illegal with non-task-qualified function.".to_string(),
        );
        return None;
    }

    let launch_count = match launch_count {
        Some(lc) => Some(Box::new((*lc).type_check(ctx)?)),
        None => None,
    };

    let return_type = resolved.ty.function_return_type().cloned();

    let callee = Expr::FuncRef {
        name,
        matching_func: Some(resolved),
        ty: None,
        pos: fpos,
    };

    Some(Expr::Call {
        callee: Box::new(callee),
        args: checked_args,
        launch_count,
        ty: return_type,
        pos,
    })
}

/// Owns the symbol table and drives the two passes over a checked program.
pub struct Module {
    pub symbols: SymbolTable,
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

impl Module {
    pub fn new() -> Self {
        Module {
            symbols: SymbolTable::new(),
        }
    }

    /// Canonicalizes parameter types, adds to the symbol table's overload
    /// set, and returns whether the declaration was accepted outright.
    /// A `Redeclaration` conflict (identical mangled signature already
    /// present) is reported and rejected; a `Shadow` conflict is a warning
    /// and still accepted.
    pub fn add_function(
        &mut self,
        name: impl Into<Rc<str>>,
        func_type: FunctionType,
        pos: Pos,
        diags: &mut dyn DiagnosticSink,
    ) -> bool {
        let name = name.into();
        let symbol = Symbol::new(name.clone(), pos, Type::Function(Rc::new(func_type)), crate::sym::StorageClass::Extern);
        match self.symbols.add_function(symbol) {
            Some(DeclConflict::Redeclaration) => {
                diags.error(
                    DiagnosticKind::Overload,
                    pos,
                    format!("redefinition of function \"{name}\" with identical signature"),
                );
                false
            }
            Some(DeclConflict::Shadow) => {
                diags.warning(
                    DiagnosticKind::Overload,
                    pos,
                    format!("declaration of \"{name}\" shadows an outer function"),
                );
                true
            }
            None => true,
        }
    }

    /// The main driver: type-check then optimize, in one call.
    pub fn check_and_optimize(
        &mut self,
        expr: Expr,
        target: &TargetInfo,
        opts: &OptFlags,
        diags: &mut dyn DiagnosticSink,
    ) -> Option<Expr> {
        let mut ctx = CheckCtx {
            symbols: &mut self.symbols,
            target,
            opts,
            diags,
        };
        let checked = expr.type_check(&mut ctx)?;
        checked.optimize(&mut ctx)
    }

    /// Resolves an already-looked-up call's overload set in place,
    /// returning whether resolution succeeded.
    pub fn resolve_overload(
        &mut self,
        func_expr: &mut Expr,
        arg_types: &[Type],
        null_flags: &[bool],
        diags: &mut dyn DiagnosticSink,
    ) -> bool {
        let Expr::FuncRef { name, pos, .. } = func_expr else {
            return false;
        };
        let candidates: Vec<Rc<Symbol>> = self
            .symbols
            .lookup_function_any(name)
            .into_iter()
            .map(|s| Rc::new(s.clone()))
            .collect();
        let args: Vec<OverloadArg> = arg_types
            .iter()
            .zip(null_flags.iter())
            .map(|(ty, &could_be_null)| OverloadArg {
                ty: ty.clone(),
                could_be_null,
            })
            .collect();
        match overload::resolve(name, &candidates, &args, *pos, diags) {
            Some(resolved) => {
                if let Expr::FuncRef { matching_func, .. } = func_expr {
                    *matching_func = Some(resolved);
                }
                true
            }
            None => false,
        }
    }
}
