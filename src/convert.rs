//! The implicit conversion engine: one ordered case analysis, first
//! match wins. `strict` suppresses diagnostics and is what the overload
//! resolver uses as a dry run — see `is_convertible`.

use crate::diag::{DiagnosticKind, DiagnosticSink};
use crate::expr::{Expr, Literal};
use crate::pos::Pos;
use crate::types::{PointerType, ReferenceType, Type};

fn wrap(expr: Expr, to: &Type, pos: Pos) -> Expr {
    Expr::Cast {
        target_type: to.clone(),
        operand: Box::new(expr),
        pos,
    }
}

fn report_error(strict: bool, diags: &mut dyn DiagnosticSink, pos: Pos, msg: String) {
    report_error_kind(strict, diags, DiagnosticKind::ShapeMismatch, pos, msg);
}

fn report_error_kind(strict: bool, diags: &mut dyn DiagnosticSink, kind: DiagnosticKind, pos: Pos, msg: String) {
    if !strict {
        diags.error(kind, pos, msg);
    }
}

/// Converts `expr` of type `from` to `to`, inserting whatever cast/deref/
/// address-of/reference-of nodes case analysis calls for, or reports an
/// error and returns `None`. `ctx_msg` names the syntactic context
/// ("assignment", "binary operator", ...) for error messages.
#[allow(clippy::too_many_arguments)]
pub fn convert(
    expr: Expr,
    from: &Type,
    to: &Type,
    ctx_msg: &str,
    pos: Pos,
    strict: bool,
    diags: &mut dyn DiagnosticSink,
) -> Option<Expr> {
    // Case 1: equal types, no-op.
    if Type::equal(from, to) {
        return Some(expr);
    }

    // Case 2: void on either side.
    if from.is_void() || to.is_void() {
        report_error(strict, diags, pos, format!("{ctx_msg}: can't convert to/from void"));
        return None;
    }

    // Case 3: array -> pointer, element matches modulo const.
    if let (Type::Array(a), Type::Pointer(p)) = (from, to) {
        if Type::equal_ignoring_const(&a.element, &p.base) {
            let zero = Expr::Literal {
                value: Literal::Int(0),
                ty: Type::uniform(crate::types::AtomicKind::Int32),
                pos,
            };
            let element = (*a.element).clone();
            let indexed = Expr::Index {
                base: Box::new(expr),
                index: Box::new(zero),
                ty: Some(element.clone()),
                pos,
            };
            let addr = Expr::AddressOf {
                ty: Some(Type::Pointer(PointerType {
                    base: Box::new(element),
                    variability: p.variability,
                    is_const: p.is_const,
                })),
                operand: Box::new(indexed),
                pos,
            };
            return Some(wrap(addr, to, pos));
        }
        report_error(
            strict,
            diags,
            pos,
            format!("{ctx_msg}: array element type doesn't match pointer target"),
        );
        return None;
    }

    // Case 4: to uniform <- from varying, always an error.
    if !to.is_varying() && from.is_varying() {
        report_error_kind(
            strict,
            diags,
            DiagnosticKind::Variability,
            pos,
            format!("{ctx_msg}: can't convert a varying value to uniform"),
        );
        return None;
    }

    // Case 5: pointer -> bool.
    if from.is_pointer() && to.is_bool() {
        return Some(wrap(expr, to, pos));
    }

    // Case 6: pointer -> pointer, or 0 literal -> null pointer.
    if from.is_pointer() && to.is_pointer() {
        let from_base = from.base_type().unwrap();
        let to_base = to.base_type().unwrap();
        if from_base.is_void() || to_base.is_void() || Type::equal_ignoring_const(from_base, to_base) {
            return Some(wrap(expr, to, pos));
        }
        report_error(
            strict,
            diags,
            pos,
            format!("{ctx_msg}: incompatible pointer types \"{from}\" and \"{to}\""),
        );
        return None;
    }
    if !from.is_pointer() && to.is_pointer() {
        if let Expr::Literal { value, .. } = &expr {
            if value.is_zero_int() {
                let null = Expr::NullPointer {
                    ty: to.clone(),
                    pos,
                };
                return Some(wrap(null, to, pos));
            }
        }
    }

    // Case 7: reference -> reference.
    if let (Type::Reference(fr), Type::Reference(tr)) = (from, to) {
        let target_eq = Type::equal(&fr.target, &tr.target);
        let adds_const = tr.target.is_const() && Type::equal_ignoring_const(&fr.target, &tr.target);
        let both_arrays = fr.target.is_array()
            && tr.target.is_array()
            && Type::equal_ignoring_const(
                fr.target.base_type().unwrap(),
                tr.target.base_type().unwrap(),
            );
        if target_eq || adds_const || both_arrays {
            return Some(wrap(expr, to, pos));
        }
        report_error(
            strict,
            diags,
            pos,
            format!("{ctx_msg}: incompatible reference types \"{from}\" and \"{to}\""),
        );
        return None;
    }

    // Case 8: reference T -> T, insert dereference and recurse.
    if let Type::Reference(fr) = from {
        let target = (*fr.target).clone();
        let deref = Expr::Deref {
            ty: Some(target.clone()),
            operand: Box::new(expr),
            pos,
        };
        return convert(deref, &target, to, ctx_msg, pos, strict, diags);
    }

    // Case 9: T -> reference T, insert reference-of and recurse.
    if let Type::Reference(_) = to {
        let ref_ty = Type::Reference(ReferenceType {
            target: Box::new(from.clone()),
        });
        let refof = Expr::ReferenceOf {
            ty: Some(ref_ty.clone()),
            operand: Box::new(expr),
            pos,
        };
        return convert(refof, &ref_ty, to, ctx_msg, pos, strict, diags);
    }

    // Case 10: array -> array, equal element, possibly different count.
    if let (Type::Array(a), Type::Array(b)) = (from, to) {
        if Type::equal_ignoring_const(&a.element, &b.element) {
            if a.count != b.count && !a.is_incomplete() && !b.is_incomplete() && !strict {
                diags.warning(
                    DiagnosticKind::ShapeMismatch,
                    pos,
                    format!("{ctx_msg}: array size mismatch ({} vs {})", a.count, b.count),
                );
            }
            return Some(wrap(expr, to, pos));
        }
        report_error(
            strict,
            diags,
            pos,
            format!("{ctx_msg}: array element types differ"),
        );
        return None;
    }

    // Case 11: vector(n,A) -> vector(n,B).
    if let (Type::Vector(va), Type::Vector(vb)) = (from, to) {
        if va.count != vb.count {
            report_error(
                strict,
                diags,
                pos,
                format!("{ctx_msg}: vector size mismatch ({} vs {})", va.count, vb.count),
            );
            return None;
        }
        if va.element.atomic_kind().is_some() && vb.element.atomic_kind().is_some() {
            return Some(wrap(expr, to, pos));
        }
        report_error(
            strict,
            diags,
            pos,
            format!("{ctx_msg}: vector element types aren't convertible"),
        );
        return None;
    }

    // Case 12: struct -> struct, equal modulo uniform/varying and const.
    if from.is_struct() && to.is_struct() {
        if Type::equal_ignoring_const(&from.as_uniform(), &to.as_uniform()) {
            return Some(wrap(expr, to, pos));
        }
        report_error(
            strict,
            diags,
            pos,
            format!("{ctx_msg}: incompatible struct types \"{from}\" and \"{to}\""),
        );
        return None;
    }

    // Case 13/14: enum -> integer legal, enum -> enum illegal.
    if matches!(from, Type::Enum(_)) {
        if to.is_integer() {
            return Some(wrap(expr, to, pos));
        }
        if matches!(to, Type::Enum(_)) {
            report_error(
                strict,
                diags,
                pos,
                format!("{ctx_msg}: can't convert between distinct enum types"),
            );
            return None;
        }
    }

    // Case 15: atomic -> vector(n, atomic), broadcast.
    if from.atomic_kind().is_some() {
        if let Type::Vector(v) = to {
            if v.element.atomic_kind().is_some() {
                return Some(wrap(expr, to, pos));
            }
        }
    }

    // Case 16: atomic -> atomic.
    if let (Some(from_kind), Some(to_kind)) = (from.atomic_kind(), to.atomic_kind()) {
        if may_lose_precision(from_kind, to_kind) && !strict {
            let losslessly_representable = matches!(&expr, Expr::Literal { value, .. } if is_losslessly_representable(value, to_kind));
            if !losslessly_representable {
                diags.warning(
                    DiagnosticKind::Precision,
                    pos,
                    format!("{ctx_msg}: conversion from \"{from_kind}\" to \"{to_kind}\" may lose precision"),
                );
            }
        }
        return Some(wrap(expr, to, pos));
    }

    report_error(
        strict,
        diags,
        pos,
        format!("{ctx_msg}: can't convert \"{from}\" to \"{to}\""),
    );
    None
}

/// Dry-run feasibility check with no expression to build and no
/// diagnostics — used by the overload resolver's tiers 5 and 6.
pub fn is_convertible(from: &Type, to: &Type) -> bool {
    // `Bool(false)` never trips the case-6 "zero literal" special case, so
    // this probes pure type-level feasibility regardless of `from`'s shape.
    let placeholder = Expr::Literal {
        value: Literal::Bool(false),
        ty: from.clone(),
        pos: Pos::synthetic(),
    };
    let mut sink = crate::diag::CollectingDiagnostics::new();
    convert(placeholder, from, to, "overload resolution", Pos::synthetic(), true, &mut sink).is_some()
}

/// Open Question #1's resolution: narrowing heuristic covering the named
/// cases (width narrowing, signed↔float, signed↔unsigned across widths).
fn may_lose_precision(from: crate::types::AtomicKind, to: crate::types::AtomicKind) -> bool {
    use crate::types::AtomicKind;
    if from == to {
        return false;
    }
    if to.width_bits() < from.width_bits() {
        return true;
    }
    if (from.is_signed() && to.is_float()) || (from.is_float() && to.is_signed()) {
        return true;
    }
    if from.is_integer() && to.is_integer() && from.is_signed() != to.is_signed() {
        return true;
    }
    if from.is_integer() && to.is_float() && from.width_bits() >= to.width_bits() {
        return true;
    }
    matches!((from, to), (AtomicKind::Double, AtomicKind::Float))
}

/// Open Question #1: never warn when a constant value is representable
/// losslessly in the narrower target.
fn is_losslessly_representable(value: &Literal, to: crate::types::AtomicKind) -> bool {
    use crate::types::AtomicKind;
    match (value, to) {
        (Literal::Bool(_), _) => true,
        (Literal::Int(v), _) if to.is_integer() => int_fits(*v as i128, to),
        (Literal::UInt(v), _) if to.is_integer() => int_fits(*v as i128, to),
        (Literal::Int(v), AtomicKind::Float) => (*v as f32 as i64) == *v,
        (Literal::Int(v), AtomicKind::Double) => (*v as f64 as i64) == *v,
        (Literal::UInt(v), AtomicKind::Float) => (*v as f32 as u64) == *v,
        (Literal::UInt(v), AtomicKind::Double) => (*v as f64 as u64) == *v,
        (Literal::Float(v), AtomicKind::Float) => (*v as f32 as f64) == *v,
        _ => false,
    }
}

fn int_fits(v: i128, to: crate::types::AtomicKind) -> bool {
    use crate::types::AtomicKind;
    let (lo, hi): (i128, i128) = match to {
        AtomicKind::Bool => (0, 1),
        AtomicKind::Int8 => (i8::MIN as i128, i8::MAX as i128),
        AtomicKind::UInt8 => (0, u8::MAX as i128),
        AtomicKind::Int16 => (i16::MIN as i128, i16::MAX as i128),
        AtomicKind::UInt16 => (0, u16::MAX as i128),
        AtomicKind::Int32 => (i32::MIN as i128, i32::MAX as i128),
        AtomicKind::UInt32 => (0, u32::MAX as i128),
        AtomicKind::Int64 => (i64::MIN as i128, i64::MAX as i128),
        AtomicKind::UInt64 => (0, u64::MAX as i128),
        AtomicKind::Float | AtomicKind::Double | AtomicKind::Void => return false,
    };
    v >= lo && v <= hi
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::CollectingDiagnostics;
    use crate::types::AtomicKind;

    fn ident(ty: Type) -> Expr {
        Expr::Ident {
            name: "x".into(),
            ty: Some(ty),
            pos: Pos::synthetic(),
        }
    }

    #[test]
    fn equal_types_are_a_no_op() {
        let ty = Type::uniform(AtomicKind::Int32);
        let mut diags = CollectingDiagnostics::new();
        let result = convert(ident(ty.clone()), &ty, &ty, "test", Pos::synthetic(), false, &mut diags).unwrap();
        assert!(matches!(result, Expr::Ident { .. }));
    }

    #[test]
    fn int_to_float_inserts_cast_without_warning() {
        let mut diags = CollectingDiagnostics::new();
        let from = Type::uniform(AtomicKind::Int32);
        let to = Type::uniform(AtomicKind::Float);
        let result = convert(ident(from.clone()), &from, &to, "test", Pos::synthetic(), false, &mut diags).unwrap();
        assert!(matches!(result, Expr::Cast { .. }));
        assert!(!diags.has_errors());
    }

    #[test]
    fn varying_to_uniform_is_rejected_before_any_other_case() {
        let mut diags = CollectingDiagnostics::new();
        let from = Type::varying(AtomicKind::Int32);
        let to = Type::uniform(AtomicKind::Int32);
        let result = convert(ident(from.clone()), &from, &to, "test", Pos::synthetic(), false, &mut diags);
        assert!(result.is_none());
        let errors: Vec<_> = diags.errors().collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, DiagnosticKind::Variability);
    }

    #[test]
    fn array_decays_to_pointer_via_address_of_first_element() {
        let element = Type::uniform(AtomicKind::Int32);
        let from = Type::Array(crate::types::ArrayType {
            element: Box::new(element.clone()),
            count: 10,
            variability: crate::types::Variability::Uniform,
            is_const: false,
        });
        let to = Type::Pointer(PointerType {
            base: Box::new(element),
            variability: crate::types::Variability::Uniform,
            is_const: false,
        });
        let mut diags = CollectingDiagnostics::new();
        let result = convert(ident(from.clone()), &from, &to, "test", Pos::synthetic(), false, &mut diags).unwrap();
        match result {
            Expr::Cast { operand, .. } => assert!(matches!(*operand, Expr::AddressOf { .. })),
            other => panic!("expected a cast wrapping address-of, got {other:?}"),
        }
    }

    #[test]
    fn zero_literal_converts_to_null_pointer() {
        let mut diags = CollectingDiagnostics::new();
        let from = Type::uniform(AtomicKind::Int32);
        let to = Type::Pointer(PointerType {
            base: Box::new(Type::uniform(AtomicKind::Int32)),
            variability: crate::types::Variability::Uniform,
            is_const: false,
        });
        let zero = Expr::Literal {
            value: Literal::Int(0),
            ty: from.clone(),
            pos: Pos::synthetic(),
        };
        let result = convert(zero, &from, &to, "test", Pos::synthetic(), false, &mut diags).unwrap();
        match result {
            Expr::Cast { operand, .. } => assert!(matches!(*operand, Expr::NullPointer { .. })),
            other => panic!("expected a cast wrapping a null pointer, got {other:?}"),
        }
    }

    #[test]
    fn narrowing_a_non_literal_int_warns() {
        let mut diags = CollectingDiagnostics::new();
        let from = Type::uniform(AtomicKind::Int32);
        let to = Type::uniform(AtomicKind::Int8);
        convert(ident(from.clone()), &from, &to, "test", Pos::synthetic(), false, &mut diags).unwrap();
        assert_eq!(diags.warnings().count(), 1);
    }

    #[test]
    fn narrowing_a_losslessly_representable_literal_does_not_warn() {
        let mut diags = CollectingDiagnostics::new();
        let from = Type::uniform(AtomicKind::Int32);
        let to = Type::uniform(AtomicKind::Int8);
        let lit = Expr::Literal {
            value: Literal::Int(5),
            ty: from.clone(),
            pos: Pos::synthetic(),
        };
        convert(lit, &from, &to, "test", Pos::synthetic(), false, &mut diags).unwrap();
        assert_eq!(diags.warnings().count(), 0);
    }

    #[test]
    fn strict_mode_suppresses_diagnostics_on_failure() {
        let mut diags = CollectingDiagnostics::new();
        let from = Type::varying(AtomicKind::Int32);
        let to = Type::uniform(AtomicKind::Int32);
        let result = convert(ident(from.clone()), &from, &to, "test", Pos::synthetic(), true, &mut diags);
        assert!(result.is_none());
        assert!(!diags.has_errors());
    }

    #[test]
    fn is_convertible_matches_convert_feasibility() {
        assert!(is_convertible(
            &Type::uniform(AtomicKind::Int32),
            &Type::uniform(AtomicKind::Float)
        ));
        assert!(!is_convertible(
            &Type::varying(AtomicKind::Int32),
            &Type::uniform(AtomicKind::Int32)
        ));
    }

    /// Scenario (b): `uniform int a; varying int b = a;` — broadcast,
    /// `type(b) = varying int`.
    #[test]
    fn scenario_b_uniform_to_varying_inserts_a_broadcast() {
        let mut diags = CollectingDiagnostics::new();
        let from = Type::uniform(AtomicKind::Int32);
        let to = Type::varying(AtomicKind::Int32);
        let result = convert(ident(from.clone()), &from, &to, "test", Pos::synthetic(), false, &mut diags).unwrap();
        assert!(matches!(result, Expr::Cast { .. }));
        assert_eq!(result.type_of(), Some(&to));
        assert!(!diags.has_errors());
    }

    #[test]
    fn struct_converts_modulo_variability_and_const() {
        let members = std::rc::Rc::new(vec![crate::types::StructMember {
            name: "x".into(),
            ty: Type::uniform(AtomicKind::Int32),
            is_const: false,
        }]);
        let from = Type::Struct(crate::types::StructType {
            name: "S".into(),
            members: members.clone(),
            variability: crate::types::Variability::Uniform,
            is_const: false,
        });
        let to = Type::Struct(crate::types::StructType {
            name: "S".into(),
            members,
            variability: crate::types::Variability::Varying,
            is_const: true,
        });
        let mut diags = CollectingDiagnostics::new();
        let result = convert(ident(from.clone()), &from, &to, "test", Pos::synthetic(), false, &mut diags);
        assert!(result.is_some());
    }
}
