//! The overload resolver: six ranked cost predicates tried in strict
//! order, first tier with any qualifying candidate wins (unless it's a
//! tie, which is an ambiguity error).

use crate::convert::is_convertible;
use crate::diag::{DiagnosticKind, DiagnosticSink};
use crate::pos::Pos;
use crate::sym::Symbol;
use crate::types::{AtomicKind, Type};
use std::rc::Rc;

/// One call-site argument: its type, and whether it's a compile-time
/// all-zero integer (so it can bind to a pointer formal for free).
#[derive(Debug, Clone)]
pub struct OverloadArg {
    pub ty: Type,
    pub could_be_null: bool,
}

/// Whether `params.len()` can accept `arg_count` arguments: callers at
/// most the formal count, and every formal beyond the supplied count must
/// carry a default.
fn arity_compatible(params: &[crate::types::FunctionParam], arg_count: usize) -> bool {
    if arg_count > params.len() {
        return false;
    }
    params[arg_count..].iter().all(|p| p.has_default)
}

fn strip_ref(ty: &Type) -> Type {
    ty.reference_target().cloned().unwrap_or_else(|| ty.clone())
}

/// Tier 1: exact match, modulo the caller's value implicitly binding to a
/// by-reference formal of the identical type.
fn exact_match(arg: &Type, param: &Type) -> bool {
    Type::equal(arg, param)
        || matches!(param, Type::Reference(r) if Type::equal(arg, &r.target))
}

/// Tier 2: equal once references are stripped from both sides.
fn ignore_references(arg: &Type, param: &Type) -> bool {
    Type::equal(&strip_ref(arg), &strip_ref(param))
}

/// Tier 3: widens without loss — a static table over atomic kinds only.
/// Same-width sign changes and `double -> float` are deliberately excluded.
fn widens_without_loss(from: AtomicKind, to: AtomicKind) -> bool {
    if from == to {
        return false;
    }
    if from.is_bool() && to.is_numeric() {
        return true;
    }
    if from.is_integer() && to.is_integer() && from.is_signed() == to.is_signed() {
        return to.width_bits() >= from.width_bits();
    }
    if from.is_float() && to.is_float() {
        return to.width_bits() >= from.width_bits();
    }
    false
}

/// Tier 4: `uniform -> varying` only, otherwise structurally identical.
fn uniform_to_varying_only(arg: &Type, param: &Type) -> bool {
    !arg.is_varying() && param.is_varying() && Type::equal(&arg.as_varying(), param)
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
enum Tier {
    Exact,
    IgnoreRefs,
    Widen,
    UniformToVarying,
    AnyConversionSameVariability,
    AnyConversion,
}

const TIERS: [Tier; 6] = [
    Tier::Exact,
    Tier::IgnoreRefs,
    Tier::Widen,
    Tier::UniformToVarying,
    Tier::AnyConversionSameVariability,
    Tier::AnyConversion,
];

/// Per-argument cost at a given tier, or `None` if this argument doesn't
/// qualify under this tier's predicate. A null-capable argument against a
/// pointer formal is free at any tier.
fn arg_cost(tier: Tier, arg: &OverloadArg, param_ty: &Type) -> Option<u32> {
    if arg.could_be_null && param_ty.is_pointer() {
        return Some(0);
    }
    match tier {
        Tier::Exact => exact_match(&arg.ty, param_ty).then_some(0),
        Tier::IgnoreRefs => ignore_references(&arg.ty, param_ty).then_some(1),
        Tier::Widen => {
            // An enum value and its integer representation are related but
            // distinct types, so this doesn't go through `widens_without_loss`'s
            // atomic-kind table; it's the only non-atomic case this tier admits.
            if matches!(arg.ty, Type::Enum(_)) && param_ty.is_integer() {
                return Some(1);
            }
            let (from, to) = (arg.ty.atomic_kind()?, param_ty.atomic_kind()?);
            widens_without_loss(from, to).then_some(1)
        }
        Tier::UniformToVarying => uniform_to_varying_only(&arg.ty, param_ty).then_some(1),
        Tier::AnyConversionSameVariability => {
            (arg.ty.variability() == param_ty.variability() && is_convertible(&arg.ty, param_ty)).then_some(1)
        }
        Tier::AnyConversion => is_convertible(&arg.ty, param_ty).then_some(1),
    }
}

/// Total cost of `candidate` at `tier` for the given call-site arguments,
/// or `None` if any argument fails to qualify.
fn candidate_cost(tier: Tier, candidate: &Symbol, args: &[OverloadArg]) -> Option<u32> {
    let Type::Function(f) = &candidate.ty else {
        return None;
    };
    if !arity_compatible(&f.params, args.len()) {
        return None;
    }
    let mut total = 0u32;
    for (arg, param) in args.iter().zip(f.params.iter()) {
        total += arg_cost(tier, arg, &param.ty)?;
    }
    Some(total)
}

/// Resolves `name`'s call against `args`, returning the unique best
/// candidate or reporting an ambiguity/no-match error and returning `None`.
pub fn resolve(
    name: &str,
    candidates: &[Rc<Symbol>],
    args: &[OverloadArg],
    pos: Pos,
    diags: &mut dyn DiagnosticSink,
) -> Option<Rc<Symbol>> {
    if candidates.is_empty() {
        diags.error(DiagnosticKind::Overload, pos, format!("no function named \"{name}\""));
        return None;
    }

    // Double-underscore-prefixed names bypass tiers 2-6 entirely.
    let tiers: &[Tier] = if name.starts_with("__") {
        &TIERS[..1]
    } else {
        &TIERS
    };

    for &tier in tiers {
        let mut scored: Vec<(u32, &Rc<Symbol>)> = candidates
            .iter()
            .filter_map(|c| candidate_cost(tier, c, args).map(|cost| (cost, c)))
            .collect();
        if scored.is_empty() {
            continue;
        }
        scored.sort_by_key(|(cost, _)| *cost);
        let best_cost = scored[0].0;
        let tied: Vec<&Rc<Symbol>> = scored
            .iter()
            .take_while(|(cost, _)| *cost == best_cost)
            .map(|(_, c)| *c)
            .collect();
        if tied.len() == 1 {
            return Some(Rc::clone(tied[0]));
        }
        let names: Vec<String> = tied.iter().map(|c| format!("{}", c.ty)).collect();
        diags.error(
            DiagnosticKind::Overload,
            pos,
            format!(
                "call to \"{name}\" is ambiguous between {} candidates: {}",
                tied.len(),
                names.join(", ")
            ),
        );
        return None;
    }

    let names: Vec<String> = candidates.iter().map(|c| format!("{}", c.ty)).collect();
    diags.error(
        DiagnosticKind::Overload,
        pos,
        format!("no matching overload for call to \"{name}\"; candidates: {}", names.join(", ")),
    );
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::CollectingDiagnostics;
    use crate::pos::Pos;
    use crate::sym::StorageClass;
    use crate::types::FunctionType;

    fn func(name: &str, params: Vec<(Type, bool)>) -> Rc<Symbol> {
        Rc::new(Symbol::new(
            name,
            Pos::synthetic(),
            Type::Function(Rc::new(FunctionType::new(Type::uniform(AtomicKind::Void), params, false))),
            StorageClass::Extern,
        ))
    }

    fn arg(ty: Type) -> OverloadArg {
        OverloadArg { ty, could_be_null: false }
    }

    #[test]
    fn exact_match_wins_over_widening_candidate() {
        let exact = func("f", vec![(Type::uniform(AtomicKind::Int32), false)]);
        let widen = func("f", vec![(Type::uniform(AtomicKind::Int64), false)]);
        let candidates = vec![exact.clone(), widen];
        let mut diags = CollectingDiagnostics::new();
        let resolved = resolve("f", &candidates, &[arg(Type::uniform(AtomicKind::Int32))], Pos::synthetic(), &mut diags).unwrap();
        assert!(Rc::ptr_eq(&resolved, &exact));
    }

    /// Scenario (d): `int f(float); int f(int); f(1)` — exact match (tier 1)
    /// picks `f(int)`.
    #[test]
    fn scenario_d_exact_match_picks_the_int_overload() {
        let f_float = func("f", vec![(Type::uniform(AtomicKind::Float), false)]);
        let f_int = func("f", vec![(Type::uniform(AtomicKind::Int32), false)]);
        let candidates = vec![f_float, f_int.clone()];
        let mut diags = CollectingDiagnostics::new();
        let resolved = resolve("f", &candidates, &[arg(Type::uniform(AtomicKind::Int32))], Pos::synthetic(), &mut diags).unwrap();
        assert!(Rc::ptr_eq(&resolved, &f_int));
    }

    /// Scenario (e): `int f(float); int f(int64); f((int16)3)` — no exact or
    /// ignore-refs match; the widening tier picks `f(int64)` because
    /// `int16 -> float` isn't in the widening table (different atomic
    /// category), leaving `int64` (cost 1) as the sole qualifier.
    #[test]
    fn scenario_e_widening_tier_rejects_int_to_float_and_picks_int64() {
        let f_float = func("f", vec![(Type::uniform(AtomicKind::Float), false)]);
        let f_int64 = func("f", vec![(Type::uniform(AtomicKind::Int64), false)]);
        let candidates = vec![f_float, f_int64.clone()];
        let mut diags = CollectingDiagnostics::new();
        let resolved = resolve("f", &candidates, &[arg(Type::uniform(AtomicKind::Int16))], Pos::synthetic(), &mut diags).unwrap();
        assert!(Rc::ptr_eq(&resolved, &f_int64));
        assert!(!diags.has_errors());
    }

    #[test]
    fn ambiguous_tie_is_reported() {
        let a = func("f", vec![(Type::uniform(AtomicKind::Int32), false)]);
        let b = func("f", vec![(Type::uniform(AtomicKind::UInt32), false)]);
        let candidates = vec![a, b];
        let mut diags = CollectingDiagnostics::new();
        // A double is convertible at equal cost to both int32 and uint32 at tier 5/6.
        let resolved = resolve("f", &candidates, &[arg(Type::uniform(AtomicKind::Double))], Pos::synthetic(), &mut diags);
        assert!(resolved.is_none());
        assert!(diags.has_errors());
    }

    #[test]
    fn arity_mismatch_without_defaults_disqualifies_a_candidate() {
        let too_few_args = func("f", vec![(Type::uniform(AtomicKind::Int32), false), (Type::uniform(AtomicKind::Int32), false)]);
        let exact = func("f", vec![(Type::uniform(AtomicKind::Int32), false)]);
        let candidates = vec![too_few_args, exact.clone()];
        let mut diags = CollectingDiagnostics::new();
        let resolved = resolve("f", &candidates, &[arg(Type::uniform(AtomicKind::Int32))], Pos::synthetic(), &mut diags).unwrap();
        assert!(Rc::ptr_eq(&resolved, &exact));
    }

    #[test]
    fn null_capable_argument_is_free_against_a_pointer_formal() {
        let ptr_ty = Type::Pointer(crate::types::PointerType {
            base: Box::new(Type::uniform(AtomicKind::Int32)),
            variability: crate::types::Variability::Uniform,
            is_const: false,
        });
        let f = func("f", vec![(ptr_ty, false)]);
        let candidates = vec![f.clone()];
        let mut diags = CollectingDiagnostics::new();
        let null_arg = OverloadArg {
            ty: Type::uniform(AtomicKind::Int32),
            could_be_null: true,
        };
        let resolved = resolve("f", &candidates, &[null_arg], Pos::synthetic(), &mut diags).unwrap();
        assert!(Rc::ptr_eq(&resolved, &f));
        assert!(!diags.has_errors());
    }

    fn an_enum() -> Type {
        Type::Enum(crate::types::EnumType {
            name: "Color".into(),
            variability: crate::types::Variability::Uniform,
            is_const: false,
        })
    }

    /// An enum argument qualifies at the widening tier (cost 1) against an
    /// integer formal, not only at the any-conversion tiers.
    #[test]
    fn enum_argument_qualifies_at_the_widening_tier_against_an_integer_formal() {
        let cost = arg_cost(Tier::Widen, &arg(an_enum()), &Type::uniform(AtomicKind::UInt32));
        assert_eq!(cost, Some(1));
    }

    /// An enum argument still fails tier 1/2 (it isn't the same type as, nor
    /// reference-equal to, the integer formal).
    #[test]
    fn enum_argument_does_not_qualify_at_exact_or_ignore_refs_tiers() {
        let param = Type::uniform(AtomicKind::UInt32);
        assert_eq!(arg_cost(Tier::Exact, &arg(an_enum()), &param), None);
        assert_eq!(arg_cost(Tier::IgnoreRefs, &arg(an_enum()), &param), None);
    }

    #[test]
    fn enum_argument_resolves_to_the_sole_integer_overload() {
        let f_uint = func("f", vec![(Type::uniform(AtomicKind::UInt32), false)]);
        let f_ptr = func(
            "f",
            vec![(
                Type::Pointer(crate::types::PointerType {
                    base: Box::new(Type::uniform(AtomicKind::Int32)),
                    variability: crate::types::Variability::Uniform,
                    is_const: false,
                }),
                false,
            )],
        );
        let candidates = vec![f_ptr, f_uint.clone()];
        let mut diags = CollectingDiagnostics::new();
        let resolved = resolve("f", &candidates, &[arg(an_enum())], Pos::synthetic(), &mut diags).unwrap();
        assert!(Rc::ptr_eq(&resolved, &f_uint));
        assert!(!diags.has_errors());
    }

    #[test]
    fn double_underscore_prefix_bypasses_widening_tiers() {
        let f = func("__builtin", vec![(Type::uniform(AtomicKind::Int64), false)]);
        let candidates = vec![f];
        let mut diags = CollectingDiagnostics::new();
        let resolved = resolve(
            "__builtin",
            &candidates,
            &[arg(Type::uniform(AtomicKind::Int32))],
            Pos::synthetic(),
            &mut diags,
        );
        assert!(resolved.is_none());
        assert!(diags.has_errors());
    }

    #[test]
    fn no_candidates_at_all_is_a_lookup_style_error() {
        let mut diags = CollectingDiagnostics::new();
        let resolved = resolve("missing", &[], &[], Pos::synthetic(), &mut diags);
        assert!(resolved.is_none());
        assert!(diags.has_errors());
    }
}
