//! Constant folder (`optimize()`). Recurses over every node to reach
//! nested literals, then folds unary/binary/select/cast nodes whose
//! operands are all literals, plus the two fast-math rewrites.
//!
//! Folding never re-derives a node's type: the result always keeps the
//! type the type-checker already assigned.

use crate::diag::DiagnosticKind;
use crate::expr::{AssignOp, BinaryOp, CheckCtx, Expr, Literal, MemberAccessKind, SizeOfTarget, UnaryOp};
use crate::types::{AtomicKind, Type};

/// Recurses into every subexpression, then attempts to fold the node
/// itself. Consumes `self`; `None` only propagates a child's failure —
/// folding itself never fails (an unfoldable node is just left as-is).
pub fn optimize(expr: Expr, ctx: &mut CheckCtx) -> Option<Expr> {
    let expr = optimize_children(expr, ctx)?;
    Some(fold_node(expr, ctx))
}

fn optimize_children(expr: Expr, ctx: &mut CheckCtx) -> Option<Expr> {
    Some(match expr {
        Expr::Literal { .. } | Expr::NullPointer { .. } | Expr::Ident { .. } | Expr::FuncRef { .. } | Expr::Sync { .. } => expr,

        Expr::Unary { op, operand, ty, pos } => Expr::Unary {
            op,
            operand: Box::new((*operand).optimize(ctx)?),
            ty,
            pos,
        },

        Expr::Binary { op, lhs, rhs, ty, pos } => Expr::Binary {
            op,
            lhs: Box::new((*lhs).optimize(ctx)?),
            rhs: Box::new((*rhs).optimize(ctx)?),
            ty,
            pos,
        },

        Expr::Assign { op, target, value, ty, pos } => Expr::Assign {
            op,
            target: Box::new((*target).optimize(ctx)?),
            value: Box::new((*value).optimize(ctx)?),
            ty,
            pos,
        },

        Expr::Select {
            cond,
            then_branch,
            else_branch,
            ty,
            pos,
        } => Expr::Select {
            cond: Box::new((*cond).optimize(ctx)?),
            then_branch: Box::new((*then_branch).optimize(ctx)?),
            else_branch: Box::new((*else_branch).optimize(ctx)?),
            ty,
            pos,
        },

        Expr::Call {
            callee,
            args,
            launch_count,
            ty,
            pos,
        } => {
            let mut optimized_args = Vec::with_capacity(args.len());
            for a in args {
                optimized_args.push(a.optimize(ctx)?);
            }
            let launch_count = match launch_count {
                Some(lc) => Some(Box::new((*lc).optimize(ctx)?)),
                None => None,
            };
            Expr::Call {
                callee,
                args: optimized_args,
                launch_count,
                ty,
                pos,
            }
        }

        Expr::Index { base, index, ty, pos } => Expr::Index {
            base: Box::new((*base).optimize(ctx)?),
            index: Box::new((*index).optimize(ctx)?),
            ty,
            pos,
        },

        Expr::Member { base, kind, name, ty, pos } => Expr::Member {
            base: Box::new((*base).optimize(ctx)?),
            kind,
            name,
            ty,
            pos,
        },

        Expr::AddressOf { operand, ty, pos } => Expr::AddressOf {
            operand: Box::new((*operand).optimize(ctx)?),
            ty,
            pos,
        },

        Expr::Deref { operand, ty, pos } => Expr::Deref {
            operand: Box::new((*operand).optimize(ctx)?),
            ty,
            pos,
        },

        Expr::ReferenceOf { operand, ty, pos } => Expr::ReferenceOf {
            operand: Box::new((*operand).optimize(ctx)?),
            ty,
            pos,
        },

        Expr::Cast { target_type, operand, pos } => Expr::Cast {
            target_type,
            operand: Box::new((*operand).optimize(ctx)?),
            pos,
        },

        Expr::SizeOf { target, pos } => {
            let target = match target {
                SizeOfTarget::Type(t) => SizeOfTarget::Type(t),
                SizeOfTarget::Expr(e) => SizeOfTarget::Expr(Box::new((*e).optimize(ctx)?)),
            };
            Expr::SizeOf { target, pos }
        }

        Expr::ExprList { items, ty, pos } => {
            let mut optimized = Vec::with_capacity(items.len());
            for item in items {
                optimized.push(item.optimize(ctx)?);
            }
            Expr::ExprList { items: optimized, ty, pos }
        }
    })
}

fn fold_node(expr: Expr, ctx: &mut CheckCtx) -> Expr {
    match expr {
        Expr::Unary { op, operand, ty, pos } => fold_unary_node(op, operand, ty, pos),
        Expr::Binary { op, lhs, rhs, ty, pos } => fold_binary_node(op, lhs, rhs, ty, pos, ctx),
        Expr::Select {
            cond,
            then_branch,
            else_branch,
            ty,
            pos,
        } => {
            if let Expr::Literal {
                value: Literal::Bool(b),
                ..
            } = cond.as_ref()
            {
                return if *b { *then_branch } else { *else_branch };
            }
            Expr::Select {
                cond,
                then_branch,
                else_branch,
                ty,
                pos,
            }
        }
        Expr::Cast { target_type, operand, pos } => {
            if let Expr::Literal { value, .. } = operand.as_ref() {
                if let Some(kind) = target_type.atomic_kind() {
                    return Expr::Literal {
                        value: cast_literal(value, kind),
                        ty: target_type,
                        pos,
                    };
                }
            }
            Expr::Cast { target_type, operand, pos }
        }
        other => other,
    }
}

fn fold_unary_node(op: UnaryOp, operand: Box<Expr>, ty: Option<Type>, pos: crate::pos::Pos) -> Expr {
    if let Expr::Literal { value, .. } = operand.as_ref() {
        if let Some(kind) = ty.as_ref().and_then(Type::atomic_kind) {
            if let Some(folded) = fold_unary(op, *value, kind) {
                return Expr::Literal {
                    value: folded,
                    ty: ty.unwrap(),
                    pos,
                };
            }
        }
    }
    Expr::Unary { op, operand, ty, pos }
}

fn fold_binary_node(
    op: BinaryOp,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
    ty: Option<Type>,
    pos: crate::pos::Pos,
    ctx: &mut CheckCtx,
) -> Expr {
    if op.is_logical() {
        if let Expr::Literal {
            value: Literal::Bool(b),
            ..
        } = lhs.as_ref()
        {
            let short_circuits = (op == BinaryOp::LogAnd && !b) || (op == BinaryOp::LogOr && *b);
            if short_circuits {
                return Expr::Literal {
                    value: Literal::Bool(*b),
                    ty: ty.unwrap_or_else(|| Type::uniform(AtomicKind::Bool)),
                    pos,
                };
            }
            if let Expr::Literal {
                value: Literal::Bool(rb),
                ..
            } = rhs.as_ref()
            {
                return Expr::Literal {
                    value: Literal::Bool(*rb),
                    ty: ty.unwrap_or_else(|| Type::uniform(AtomicKind::Bool)),
                    pos,
                };
            }
        }
        return Expr::Binary { op, lhs, rhs, ty, pos };
    }

    if let (Expr::Literal { value: lv, ty: lhs_ty, .. }, Expr::Literal { value: rv, .. }) = (lhs.as_ref(), rhs.as_ref()) {
        if let Some(kind) = lhs_ty.atomic_kind() {
            if op.is_comparison() {
                return Expr::Literal {
                    value: Literal::Bool(fold_compare(op, *lv, *rv, kind)),
                    ty: ty.unwrap_or_else(|| Type::uniform(AtomicKind::Bool)),
                    pos,
                };
            }
            if let Some(folded) = fold_binary(op, *lv, *rv, kind) {
                return Expr::Literal {
                    value: folded,
                    ty: ty.unwrap_or_else(|| lhs_ty.clone()),
                    pos,
                };
            }
        }
    }

    if matches!(op, BinaryOp::Add | BinaryOp::Sub) && ty.as_ref().is_some_and(Type::is_pointer) {
        if let Some(combined) = fold_pointer_offset(op, lhs.as_ref(), rhs.as_ref(), &ty, pos) {
            return combined;
        }
    }

    fast_math_rewrite(op, lhs, rhs, ty, pos, ctx)
}

/// The two fast-math rewrites: `x / literal` becomes a multiply by the
/// precomputed reciprocal; `x / y` becomes `x * rcp(y)` when an `rcp`
/// builtin is visible, else it's left alone with a warning.
fn fast_math_rewrite(
    op: BinaryOp,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
    ty: Option<Type>,
    pos: crate::pos::Pos,
    ctx: &mut CheckCtx,
) -> Expr {
    if op != BinaryOp::Div || !ctx.opts.fast_math || !rhs.type_of().is_some_and(Type::is_float) {
        return Expr::Binary { op, lhs, rhs, ty, pos };
    }

    if let Expr::Literal {
        value: Literal::Float(divisor),
        ty: rhs_ty,
        ..
    } = rhs.as_ref()
    {
        let reciprocal = Expr::Literal {
            value: Literal::Float(1.0 / divisor),
            ty: rhs_ty.clone(),
            pos,
        };
        return Expr::Binary {
            op: BinaryOp::Mul,
            lhs,
            rhs: Box::new(reciprocal),
            ty,
            pos,
        };
    }

    if ctx.symbols.lookup_function_any("rcp").is_empty() {
        ctx.diags.performance_warning(
            pos,
            "fast-math division rewrite skipped: no \"rcp\" builtin visible".to_string(),
        );
        return Expr::Binary { op, lhs, rhs, ty, pos };
    }

    let rhs_ty = rhs.type_of().cloned();
    let call = Expr::Call {
        callee: Box::new(Expr::FuncRef {
            name: "rcp".into(),
            matching_func: None,
            ty: None,
            pos,
        }),
        args: vec![*rhs],
        launch_count: None,
        ty: rhs_ty,
        pos,
    };
    Expr::Binary {
        op: BinaryOp::Mul,
        lhs,
        rhs: Box::new(call),
        ty,
        pos,
    }
}

/// Combines a chain of literal pointer offsets (`(p + c1) + c2` ->
/// `p + (c1 + c2)`, likewise for `-`) without ever evaluating `p`
/// itself — only the offset magnitude is constant-folded, the pointer's
/// address is not.
fn fold_pointer_offset(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    ty: &Option<Type>,
    pos: crate::pos::Pos,
) -> Option<Expr> {
    let Expr::Literal { value: outer_val, .. } = rhs else {
        return None;
    };
    let Expr::Binary {
        op: inner_op,
        lhs: base,
        rhs: inner_offset,
        ..
    } = lhs
    else {
        return None;
    };
    if !matches!(inner_op, BinaryOp::Add | BinaryOp::Sub) {
        return None;
    }
    let Expr::Literal { value: inner_val, ty: offset_ty, .. } = inner_offset.as_ref() else {
        return None;
    };
    let kind = offset_ty.atomic_kind()?;

    let signed_magnitude = |o: BinaryOp, v: &Literal| {
        let n = literal_as_i128(v);
        if o == BinaryOp::Sub { -n } else { n }
    };
    let combined = signed_magnitude(*inner_op, inner_val) + signed_magnitude(op, outer_val);
    let (new_op, magnitude) = if combined < 0 { (BinaryOp::Sub, -combined) } else { (BinaryOp::Add, combined) };

    Some(Expr::Binary {
        op: new_op,
        lhs: base.clone(),
        rhs: Box::new(Expr::Literal {
            value: wrap_int(magnitude, kind),
            ty: offset_ty.clone(),
            pos,
        }),
        ty: ty.clone(),
        pos,
    })
}

fn literal_as_i128(lit: &Literal) -> i128 {
    match lit {
        Literal::Bool(b) => *b as i128,
        Literal::Int(v) => *v as i128,
        Literal::UInt(v) => *v as i128,
        Literal::Float(v) => *v as i128,
    }
}

fn literal_as_f64(lit: &Literal) -> f64 {
    match lit {
        Literal::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Literal::Int(v) => *v as f64,
        Literal::UInt(v) => *v as f64,
        Literal::Float(v) => *v,
    }
}

/// Two's-complement wrap at `kind`'s width — applied uniformly across all
/// integer widths, including the three the original unary `Optimize` elides
/// (Open Question #3's resolution).
fn wrap_int(v: i128, kind: AtomicKind) -> Literal {
    let bits = kind.width_bits();
    if kind.is_bool() {
        return Literal::Bool(v & 1 != 0);
    }
    let mask: i128 = (1i128 << bits) - 1;
    let truncated = v & mask;
    if kind.is_unsigned() {
        Literal::UInt(truncated as u64)
    } else {
        let sign_bit = 1i128 << (bits - 1);
        let signed = if truncated & sign_bit != 0 {
            truncated - (1i128 << bits)
        } else {
            truncated
        };
        Literal::Int(signed as i64)
    }
}

fn fold_unary(op: UnaryOp, value: Literal, kind: AtomicKind) -> Option<Literal> {
    match op {
        UnaryOp::LogNot => Some(Literal::Bool(literal_as_f64(&value) == 0.0)),
        UnaryOp::Neg => {
            if kind.is_float() {
                Some(Literal::Float(-literal_as_f64(&value)))
            } else {
                Some(wrap_int(-literal_as_i128(&value), kind))
            }
        }
        UnaryOp::BitNot => {
            if kind.is_float() {
                return None;
            }
            let bits = kind.width_bits();
            let mask: i128 = (1i128 << bits) - 1;
            Some(wrap_int(!literal_as_i128(&value) & mask, kind))
        }
        UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec => None,
    }
}

fn fold_compare(op: BinaryOp, lhs: Literal, rhs: Literal, kind: AtomicKind) -> bool {
    if kind.is_float() {
        let (a, b) = (literal_as_f64(&lhs), literal_as_f64(&rhs));
        match op {
            BinaryOp::Eq => a == b,
            BinaryOp::Ne => a != b,
            BinaryOp::Lt => a < b,
            BinaryOp::Le => a <= b,
            BinaryOp::Gt => a > b,
            BinaryOp::Ge => a >= b,
            _ => unreachable!("fold_compare called with a non-comparison op"),
        }
    } else {
        let (a, b) = (literal_as_i128(&lhs), literal_as_i128(&rhs));
        match op {
            BinaryOp::Eq => a == b,
            BinaryOp::Ne => a != b,
            BinaryOp::Lt => a < b,
            BinaryOp::Le => a <= b,
            BinaryOp::Gt => a > b,
            BinaryOp::Ge => a >= b,
            _ => unreachable!("fold_compare called with a non-comparison op"),
        }
    }
}

/// Integer arithmetic wraps two's-complement at `kind`'s width; shifts by
/// ≥ width are left unfolded, matching the emitter's own behavior. Float
/// arithmetic is carried in `f64` and narrowed once at the end for
/// `float`-typed results.
fn fold_binary(op: BinaryOp, lhs: Literal, rhs: Literal, kind: AtomicKind) -> Option<Literal> {
    if kind.is_float() {
        let (a, b) = (literal_as_f64(&lhs), literal_as_f64(&rhs));
        let r = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            _ => return None,
        };
        return Some(Literal::Float(if kind == AtomicKind::Float { r as f32 as f64 } else { r }));
    }

    let (a, b) = (literal_as_i128(&lhs), literal_as_i128(&rhs));
    let bits = kind.width_bits();
    let r = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return None;
            }
            a.wrapping_div(b)
        }
        BinaryOp::Mod => {
            if b == 0 {
                return None;
            }
            a.wrapping_rem(b)
        }
        BinaryOp::BitAnd => a & b,
        BinaryOp::BitOr => a | b,
        BinaryOp::BitXor => a ^ b,
        BinaryOp::Shl => {
            if b < 0 || b as u32 >= bits {
                return None;
            }
            a << b
        }
        BinaryOp::Shr => {
            if b < 0 || b as u32 >= bits {
                return None;
            }
            a >> b
        }
        _ => return None,
    };
    Some(wrap_int(r, kind))
}

fn cast_literal(lit: &Literal, kind: AtomicKind) -> Literal {
    if kind.is_bool() {
        return Literal::Bool(literal_as_f64(lit) != 0.0);
    }
    if kind.is_float() {
        let f = literal_as_f64(lit);
        return Literal::Float(if kind == AtomicKind::Float { f as f32 as f64 } else { f });
    }
    wrap_int(literal_as_i128(lit), kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::CollectingDiagnostics;
    use crate::pos::Pos;
    use crate::sym::SymbolTable;
    use crate::target::{OptFlags, TargetInfo};

    fn lit_int(v: i64, kind: AtomicKind) -> Expr {
        Expr::Literal {
            value: Literal::Int(v),
            ty: Type::uniform(kind),
            pos: Pos::synthetic(),
        }
    }

    fn run(expr: Expr, opts: &OptFlags) -> Expr {
        let mut symbols = SymbolTable::new();
        let target = TargetInfo::default();
        let mut diags = CollectingDiagnostics::new();
        let mut ctx = CheckCtx {
            symbols: &mut symbols,
            target: &target,
            opts,
            diags: &mut diags,
        };
        optimize(expr, &mut ctx).unwrap()
    }

    /// `(p + 2) + 3` folds to `p + 5`: only the literal offset magnitude
    /// is combined, `p` itself is never evaluated.
    #[test]
    fn pointer_plus_literal_offsets_combine_without_touching_the_base() {
        let opts = OptFlags::default();
        let ptr_ty = Type::Pointer(crate::types::PointerType {
            base: Box::new(Type::uniform(AtomicKind::Int32)),
            variability: crate::types::Variability::Uniform,
            is_const: false,
        });
        let p = Expr::Ident {
            name: "p".into(),
            ty: Some(ptr_ty.clone()),
            pos: Pos::synthetic(),
        };
        let inner = Expr::Binary {
            op: BinaryOp::Add,
            lhs: Box::new(p),
            rhs: Box::new(lit_int(2, AtomicKind::Int32)),
            ty: Some(ptr_ty.clone()),
            pos: Pos::synthetic(),
        };
        let outer = Expr::Binary {
            op: BinaryOp::Add,
            lhs: Box::new(inner),
            rhs: Box::new(lit_int(3, AtomicKind::Int32)),
            ty: Some(ptr_ty),
            pos: Pos::synthetic(),
        };
        let folded = run(outer, &opts);
        match folded {
            Expr::Binary {
                op: BinaryOp::Add,
                lhs,
                rhs,
                ..
            } => {
                assert!(matches!(*lhs, Expr::Ident { .. }));
                assert!(matches!(*rhs, Expr::Literal { value: Literal::Int(5), .. }));
            }
            other => panic!("expected a combined pointer offset, got {other:?}"),
        }
    }

    /// Scenario (h): constant folding preserves two's-complement wrap.
    #[test]
    fn scenario_h_int8_addition_wraps() {
        let opts = OptFlags::default();
        let expr = Expr::Binary {
            op: BinaryOp::Add,
            lhs: Box::new(lit_int(127, AtomicKind::Int8)),
            rhs: Box::new(lit_int(1, AtomicKind::Int8)),
            ty: Some(Type::uniform(AtomicKind::Int8)),
            pos: Pos::synthetic(),
        };
        let folded = run(expr, &opts);
        match folded {
            Expr::Literal { value: Literal::Int(v), .. } => assert_eq!(v, -128),
            other => panic!("expected folded literal, got {other:?}"),
        }
    }

    #[test]
    fn boolean_and_short_circuits_on_false_lhs() {
        let opts = OptFlags::default();
        let side_effect = Expr::Ident {
            name: "f".into(),
            ty: Some(Type::uniform(AtomicKind::Bool)),
            pos: Pos::synthetic(),
        };
        let expr = Expr::Binary {
            op: BinaryOp::LogAnd,
            lhs: Box::new(Expr::Literal {
                value: Literal::Bool(false),
                ty: Type::uniform(AtomicKind::Bool),
                pos: Pos::synthetic(),
            }),
            rhs: Box::new(side_effect),
            ty: Some(Type::uniform(AtomicKind::Bool)),
            pos: Pos::synthetic(),
        };
        let folded = run(expr, &opts);
        assert!(matches!(
            folded,
            Expr::Literal {
                value: Literal::Bool(false),
                ..
            }
        ));
    }

    #[test]
    fn shift_by_full_width_is_left_unfolded() {
        let opts = OptFlags::default();
        let expr = Expr::Binary {
            op: BinaryOp::Shl,
            lhs: Box::new(lit_int(1, AtomicKind::Int32)),
            rhs: Box::new(lit_int(32, AtomicKind::Int32)),
            ty: Some(Type::uniform(AtomicKind::Int32)),
            pos: Pos::synthetic(),
        };
        let folded = run(expr, &opts);
        assert!(matches!(folded, Expr::Binary { .. }));
    }

    #[test]
    fn fast_math_rewrites_division_by_float_literal_to_multiply_by_reciprocal() {
        let opts = OptFlags::new().with_fast_math(true);
        let expr = Expr::Binary {
            op: BinaryOp::Div,
            lhs: Box::new(Expr::Ident {
                name: "x".into(),
                ty: Some(Type::uniform(AtomicKind::Float)),
                pos: Pos::synthetic(),
            }),
            rhs: Box::new(Expr::Literal {
                value: Literal::Float(2.0),
                ty: Type::uniform(AtomicKind::Float),
                pos: Pos::synthetic(),
            }),
            ty: Some(Type::uniform(AtomicKind::Float)),
            pos: Pos::synthetic(),
        };
        let folded = run(expr, &opts);
        match folded {
            Expr::Binary {
                op: BinaryOp::Mul,
                rhs,
                ..
            } => assert!(matches!(*rhs, Expr::Literal { value: Literal::Float(r), .. } if (r - 0.5).abs() < 1e-12)),
            other => panic!("expected a multiply by reciprocal, got {other:?}"),
        }
    }

    #[test]
    fn fast_math_division_by_non_literal_warns_without_rcp_builtin() {
        let opts = OptFlags::new().with_fast_math(true);
        let mut symbols = SymbolTable::new();
        let target = TargetInfo::default();
        let mut diags = CollectingDiagnostics::new();
        let mut ctx = CheckCtx {
            symbols: &mut symbols,
            target: &target,
            opts: &opts,
            diags: &mut diags,
        };
        let expr = Expr::Binary {
            op: BinaryOp::Div,
            lhs: Box::new(Expr::Ident {
                name: "x".into(),
                ty: Some(Type::uniform(AtomicKind::Float)),
                pos: Pos::synthetic(),
            }),
            rhs: Box::new(Expr::Ident {
                name: "y".into(),
                ty: Some(Type::uniform(AtomicKind::Float)),
                pos: Pos::synthetic(),
            }),
            ty: Some(Type::uniform(AtomicKind::Float)),
            pos: Pos::synthetic(),
        };
        let folded = optimize(expr, &mut ctx).unwrap();
        assert!(matches!(folded, Expr::Binary { op: BinaryOp::Div, .. }));
        assert_eq!(diags.warnings().count(), 1);
    }
}
