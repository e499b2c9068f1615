//! The type system: the uniform/varying variability lattice, reference and
//! pointer algebra, and the atomic/enum/struct/vector/array shape
//! categories.
//!
//! `Type` is a closed tagged variant: there is no trait-object `TypeNode`
//! hierarchy, just one enum and exhaustive matches over it. Composite
//! shapes own their element/member types directly (`Box`/`Rc`) rather
//! than through an arena handle — arena-plus-handle is *a* strategy for
//! sharing, not a requirement, and this crate is small and
//! single-threaded enough that ordinary ownership is simpler and just as
//! correct (see DESIGN.md).

use crate::diag::{DiagnosticKind, DiagnosticSink};
use crate::pos::Pos;
use std::rc::Rc;

/// Width/signedness-ordered atomic kinds.
///
/// Declaration order **is** the promotion rank ladder
/// (`bool < int8 < uint8 < ... < double`); `rank()` reads it
/// straight off the discriminant, so the whole "wider wins, same-width
/// unsigned wins" tie-break collapses to one `max()` rather than a
/// bespoke table (see `Type::promote_atomic_pair`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicKind {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    Void,
}

impl AtomicKind {
    /// Promotion rank; `Void` has none and must never reach this path.
    fn rank(self) -> u8 {
        debug_assert!(self != AtomicKind::Void, "void has no promotion rank");
        self as u8
    }

    pub fn is_bool(self) -> bool {
        self == AtomicKind::Bool
    }

    pub fn is_void(self) -> bool {
        self == AtomicKind::Void
    }

    pub fn is_float(self) -> bool {
        matches!(self, AtomicKind::Float | AtomicKind::Double)
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            AtomicKind::Int8
                | AtomicKind::UInt8
                | AtomicKind::Int16
                | AtomicKind::UInt16
                | AtomicKind::Int32
                | AtomicKind::UInt32
                | AtomicKind::Int64
                | AtomicKind::UInt64
        )
    }

    /// Non-void: the rank ladder's domain, including `bool`.
    pub fn is_numeric(self) -> bool {
        !self.is_void()
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            AtomicKind::Int8 | AtomicKind::Int16 | AtomicKind::Int32 | AtomicKind::Int64
        )
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            AtomicKind::UInt8 | AtomicKind::UInt16 | AtomicKind::UInt32 | AtomicKind::UInt64
        )
    }

    pub fn width_bits(self) -> u32 {
        match self {
            AtomicKind::Bool | AtomicKind::Int8 | AtomicKind::UInt8 => 8,
            AtomicKind::Int16 | AtomicKind::UInt16 => 16,
            AtomicKind::Int32 | AtomicKind::UInt32 | AtomicKind::Float => 32,
            AtomicKind::Int64 | AtomicKind::UInt64 | AtomicKind::Double => 64,
            AtomicKind::Void => 0,
        }
    }

    fn mangle_code(self) -> char {
        match self {
            AtomicKind::Bool => 'b',
            AtomicKind::Int8 => 'c',
            AtomicKind::UInt8 => 'h',
            AtomicKind::Int16 => 's',
            AtomicKind::UInt16 => 't',
            AtomicKind::Int32 => 'i',
            AtomicKind::UInt32 => 'j',
            AtomicKind::Int64 => 'x',
            AtomicKind::UInt64 => 'y',
            AtomicKind::Float => 'f',
            AtomicKind::Double => 'd',
            AtomicKind::Void => 'v',
        }
    }
}

impl std::fmt::Display for AtomicKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AtomicKind::Bool => "bool",
            AtomicKind::Int8 => "int8",
            AtomicKind::UInt8 => "uint8",
            AtomicKind::Int16 => "int16",
            AtomicKind::UInt16 => "uint16",
            AtomicKind::Int32 => "int32",
            AtomicKind::UInt32 => "uint32",
            AtomicKind::Int64 => "int64",
            AtomicKind::UInt64 => "uint64",
            AtomicKind::Float => "float",
            AtomicKind::Double => "double",
            AtomicKind::Void => "void",
        };
        write!(f, "{s}")
    }
}

/// SIMD-lane variability: one shared value (`Uniform`) or one independent
/// value per lane (`Varying`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variability {
    Uniform,
    Varying,
}

impl Variability {
    pub fn is_varying(self) -> bool {
        matches!(self, Variability::Varying)
    }

    /// `varying` if either operand is varying, or `force_varying` is set.
    pub fn union(a: Variability, b: Variability, force_varying: bool) -> Variability {
        if force_varying || a.is_varying() || b.is_varying() {
            Variability::Varying
        } else {
            Variability::Uniform
        }
    }
}

impl std::fmt::Display for Variability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Variability::Uniform => write!(f, "uniform"),
            Variability::Varying => write!(f, "varying"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AtomicType {
    pub kind: AtomicKind,
    pub variability: Variability,
    pub is_const: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumType {
    pub name: Rc<str>,
    pub variability: Variability,
    pub is_const: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PointerType {
    pub base: Box<Type>,
    /// Variability of the pointer *value itself*, not of the pointee.
    pub variability: Variability,
    pub is_const: bool,
}

/// Always uniform, never nested. The referent's own constness lives on
/// `target`, so "a reference that adds const" is just a const `target`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceType {
    pub target: Box<Type>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArrayType {
    pub element: Box<Type>,
    /// `0` means incomplete/unsized.
    pub count: u32,
    pub variability: Variability,
    pub is_const: bool,
}

impl ArrayType {
    pub fn is_incomplete(&self) -> bool {
        self.count == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VectorType {
    pub element: Box<Type>,
    pub count: u32,
    pub variability: Variability,
    pub is_const: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructMember {
    pub name: Rc<str>,
    pub ty: Type,
    pub is_const: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructType {
    pub name: Rc<str>,
    pub members: Rc<Vec<StructMember>>,
    pub variability: Variability,
    pub is_const: bool,
}

impl StructType {
    /// Invariant 4: const if any member is (transitively) const.
    pub fn has_const_member(&self) -> bool {
        self.members.iter().any(|m| m.is_const || m.ty.is_const())
    }

    pub fn member(&self, name: &str) -> Option<&StructMember> {
        self.members.iter().find(|m| m.name.as_ref() == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionParam {
    pub ty: Type,
    pub has_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub return_type: Box<Type>,
    pub params: Vec<FunctionParam>,
    pub is_task: bool,
}

impl FunctionType {
    /// Build a function type, applying invariant 3: top-level `const` on
    /// a non-reference parameter is erased for signature identity.
    pub fn new(return_type: Type, params: Vec<(Type, bool)>, is_task: bool) -> Self {
        FunctionType {
            return_type: Box::new(return_type),
            params: params
                .into_iter()
                .map(|(ty, has_default)| FunctionParam {
                    ty: ty.canonicalized_param(),
                    has_default,
                })
                .collect(),
            is_task,
        }
    }
}

/// The closed type variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Atomic(AtomicType),
    Enum(EnumType),
    Pointer(PointerType),
    Reference(ReferenceType),
    Array(ArrayType),
    Vector(VectorType),
    Struct(StructType),
    Function(Rc<FunctionType>),
}

impl Type {
    pub fn atomic(kind: AtomicKind, variability: Variability, is_const: bool) -> Type {
        Type::Atomic(AtomicType {
            kind,
            variability,
            is_const,
        })
    }

    pub fn uniform(kind: AtomicKind) -> Type {
        Type::atomic(kind, Variability::Uniform, false)
    }

    pub fn varying(kind: AtomicKind) -> Type {
        Type::atomic(kind, Variability::Varying, false)
    }

    pub fn void_pointer(variability: Variability) -> Type {
        Type::Pointer(PointerType {
            base: Box::new(Type::uniform(AtomicKind::Void)),
            variability,
            is_const: false,
        })
    }

    // ---- shape predicates -------------------------------------------------

    pub fn is_void(&self) -> bool {
        matches!(
            self,
            Type::Atomic(AtomicType {
                kind: AtomicKind::Void,
                ..
            })
        )
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Type::Function(_))
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Type::Reference(_))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array(_))
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, Type::Vector(_))
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, Type::Struct(_))
    }

    pub fn is_task_function(&self) -> bool {
        matches!(self, Type::Function(f) if f.is_task)
    }

    pub fn function_return_type(&self) -> Option<&Type> {
        match self {
            Type::Function(f) => Some(&f.return_type),
            _ => None,
        }
    }

    pub fn atomic_kind(&self) -> Option<AtomicKind> {
        match self {
            Type::Atomic(a) => Some(a.kind),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.atomic_kind().is_some_and(AtomicKind::is_numeric)
    }

    pub fn is_integer(&self) -> bool {
        self.atomic_kind().is_some_and(AtomicKind::is_integer)
    }

    pub fn is_float(&self) -> bool {
        self.atomic_kind().is_some_and(AtomicKind::is_float)
    }

    pub fn is_bool(&self) -> bool {
        self.atomic_kind().is_some_and(AtomicKind::is_bool)
    }

    pub fn is_unsigned(&self) -> bool {
        self.atomic_kind().is_some_and(AtomicKind::is_unsigned)
    }

    pub fn is_signed(&self) -> bool {
        self.atomic_kind().is_some_and(AtomicKind::is_signed)
    }

    pub fn is_const(&self) -> bool {
        match self {
            Type::Atomic(a) => a.is_const,
            Type::Enum(e) => e.is_const,
            Type::Pointer(p) => p.is_const,
            Type::Array(a) => a.is_const,
            Type::Vector(v) => v.is_const,
            Type::Struct(s) => s.is_const || s.has_const_member(),
            Type::Reference(_) | Type::Function(_) => false,
        }
    }

    pub fn variability(&self) -> Variability {
        match self {
            Type::Atomic(a) => a.variability,
            Type::Enum(e) => e.variability,
            Type::Pointer(p) => p.variability,
            Type::Array(a) => a.variability,
            Type::Vector(v) => v.variability,
            Type::Struct(s) => s.variability,
            // References are always uniform; functions carry no lane variability.
            Type::Reference(_) | Type::Function(_) => Variability::Uniform,
        }
    }

    pub fn is_varying(&self) -> bool {
        self.variability().is_varying()
    }

    // ---- shape queries ------------------------------------------------------

    pub fn reference_target(&self) -> Option<&Type> {
        match self {
            Type::Reference(r) => Some(&r.target),
            _ => None,
        }
    }

    /// The element/pointee type one level down: pointer base, array
    /// element, or vector element. `None` for atomic/enum/struct/function.
    pub fn base_type(&self) -> Option<&Type> {
        match self {
            Type::Pointer(p) => Some(&p.base),
            Type::Array(a) => Some(&a.element),
            Type::Vector(v) => Some(&v.element),
            _ => None,
        }
    }

    /// Vector/array element count, or struct member count. `None` for
    /// scalar/pointer/reference/function shapes.
    pub fn element_count(&self) -> Option<u32> {
        match self {
            Type::Array(a) => Some(a.count),
            Type::Vector(v) => Some(v.count),
            Type::Struct(s) => Some(s.members.len() as u32),
            _ => None,
        }
    }

    /// Type of the `i`th element/member, for vectors, arrays (uniform
    /// element type regardless of index) and structs (per-member type).
    pub fn element_type(&self, i: u32) -> Option<&Type> {
        match self {
            Type::Array(a) => Some(&a.element),
            Type::Vector(v) => Some(&v.element),
            Type::Struct(s) => s.members.get(i as usize).map(|m| &m.ty),
            _ => None,
        }
    }

    // ---- variability / const morphisms ---------------------------------

    /// Top-level-only const strip, used when canonicalizing a function
    /// parameter type for signature matching (invariant 3). Unlike
    /// `as_mutable`, this does **not** recurse into composite elements:
    /// only the parameter's own top-level qualifier is erased, and only
    /// for non-reference types (references carry no const of their own).
    pub fn canonicalized_param(&self) -> Type {
        match self {
            Type::Reference(_) => self.clone(),
            Type::Atomic(a) => Type::Atomic(AtomicType {
                is_const: false,
                ..a.clone()
            }),
            Type::Enum(e) => Type::Enum(EnumType {
                is_const: false,
                ..e.clone()
            }),
            Type::Pointer(p) => Type::Pointer(PointerType {
                is_const: false,
                ..p.clone()
            }),
            Type::Array(a) => Type::Array(ArrayType {
                is_const: false,
                ..a.clone()
            }),
            Type::Vector(v) => Type::Vector(VectorType {
                is_const: false,
                ..v.clone()
            }),
            Type::Struct(s) => Type::Struct(StructType {
                is_const: false,
                ..s.clone()
            }),
            Type::Function(_) => self.clone(),
        }
    }

    pub fn as_uniform(&self) -> Type {
        self.with_variability(Variability::Uniform)
    }

    pub fn as_varying(&self) -> Type {
        self.with_variability(Variability::Varying)
    }

    fn with_variability(&self, variability: Variability) -> Type {
        match self {
            Type::Atomic(a) => Type::Atomic(AtomicType {
                variability,
                ..a.clone()
            }),
            Type::Enum(e) => Type::Enum(EnumType {
                variability,
                ..e.clone()
            }),
            // Pointer variability is the pointer's own; the base is untouched.
            Type::Pointer(p) => Type::Pointer(PointerType {
                variability,
                ..p.clone()
            }),
            Type::Array(a) => Type::Array(ArrayType {
                variability,
                element: Box::new(a.element.with_variability(variability)),
                ..a.clone()
            }),
            Type::Vector(v) => Type::Vector(VectorType {
                variability,
                element: Box::new(v.element.with_variability(variability)),
                ..v.clone()
            }),
            Type::Struct(s) => Type::Struct(StructType {
                variability,
                members: Rc::new(
                    s.members
                        .iter()
                        .map(|m| StructMember {
                            name: m.name.clone(),
                            ty: m.ty.with_variability(variability),
                            is_const: m.is_const,
                        })
                        .collect(),
                ),
                ..s.clone()
            }),
            // References are always uniform regardless of what's asked for;
            // functions carry no variability at all.
            Type::Reference(_) | Type::Function(_) => self.clone(),
        }
    }

    pub fn as_const(&self) -> Type {
        self.with_const(true)
    }

    pub fn as_mutable(&self) -> Type {
        self.with_const(false)
    }

    fn with_const(&self, is_const: bool) -> Type {
        match self {
            Type::Atomic(a) => Type::Atomic(AtomicType {
                is_const,
                ..a.clone()
            }),
            Type::Enum(e) => Type::Enum(EnumType {
                is_const,
                ..e.clone()
            }),
            Type::Pointer(p) => Type::Pointer(PointerType {
                is_const,
                ..p.clone()
            }),
            Type::Array(a) => Type::Array(ArrayType {
                is_const,
                element: Box::new(a.element.with_const(is_const)),
                ..a.clone()
            }),
            Type::Vector(v) => Type::Vector(VectorType {
                is_const,
                element: Box::new(v.element.with_const(is_const)),
                ..v.clone()
            }),
            Type::Struct(s) => Type::Struct(StructType {
                is_const,
                members: Rc::new(
                    s.members
                        .iter()
                        .map(|m| StructMember {
                            name: m.name.clone(),
                            ty: m.ty.with_const(is_const),
                            is_const,
                        })
                        .collect(),
                ),
                ..s.clone()
            }),
            // A reference recurses into its target (DESIGN.md open question);
            // functions have no const of their own.
            Type::Reference(r) => Type::Reference(ReferenceType {
                target: Box::new(r.target.with_const(is_const)),
            }),
            Type::Function(_) => self.clone(),
        }
    }

    /// Shallow const rewrite used only by `more_general_type`'s result
    /// construction, where recursing into elements would double-apply
    /// constness already folded into the operands.
    fn with_const_shallow(&self, is_const: bool) -> Type {
        match self {
            Type::Atomic(a) => Type::Atomic(AtomicType {
                is_const,
                ..a.clone()
            }),
            Type::Pointer(p) => Type::Pointer(PointerType {
                is_const,
                ..p.clone()
            }),
            Type::Struct(s) => Type::Struct(StructType {
                is_const,
                ..s.clone()
            }),
            other => other.clone(),
        }
    }

    fn with_variability_and_const(&self, variability: Variability, is_const: bool) -> Type {
        self.with_variability(variability)
            .with_const_shallow(is_const)
    }

    // ---- equality -----------------------------------------------------------

    /// Structural equality including const and variability.
    pub fn equal(a: &Type, b: &Type) -> bool {
        a == b
    }

    /// Equal modulo const, at every depth.
    pub fn equal_ignoring_const(a: &Type, b: &Type) -> bool {
        a.as_mutable() == b.as_mutable()
    }

    // ---- array-to-pointer decay --------------------------------------------

    /// Spec.md §4.1 step 1 of `MoreGeneralType`, also used standalone by
    /// the conversion engine (case 3) and call-boundary handling (case 10).
    pub fn decay_array_to_pointer(&self) -> Type {
        match self {
            Type::Array(a) => Type::Pointer(PointerType {
                base: a.element.clone(),
                variability: a.variability,
                is_const: a.is_const,
            }),
            _ => self.clone(),
        }
    }

    // ---- promotion (`MoreGeneralType`) --------------------------------------

    /// Returns the common type under promotion rules, or `None` with a
    /// diagnostic already emitted through `diags`.
    #[allow(clippy::too_many_arguments)]
    pub fn more_general_type(
        a: &Type,
        b: &Type,
        pos: Pos,
        ctx_msg: &str,
        force_varying: bool,
        vector_size: Option<u32>,
        diags: &mut dyn DiagnosticSink,
    ) -> Option<Type> {
        if a.is_void() || b.is_void() {
            diags.error(
                DiagnosticKind::ShapeMismatch,
                pos,
                format!("{ctx_msg}: can't apply to void type"),
            );
            return None;
        }
        if a.is_function() || b.is_function() {
            diags.error(
                DiagnosticKind::ShapeMismatch,
                pos,
                format!("{ctx_msg}: can't apply to a function type"),
            );
            return None;
        }

        // Step 1: decay arrays to pointers.
        let a = a.decay_array_to_pointer();
        let b = b.decay_array_to_pointer();

        // Step 2: strip references.
        let a = a.reference_target().cloned().unwrap_or(a);
        let b = b.reference_target().cloned().unwrap_or(b);

        let variability = Variability::union(a.variability(), b.variability(), force_varying);
        let is_const = a.is_const() && b.is_const();

        // Step 3: scalar-vs-vector broadcast shape.
        if let (Some(_), Type::Vector(vec_ty)) = (a.atomic_kind(), &b) {
            return Self::promote_scalar_into_vector(
                &a, vec_ty, variability, is_const, pos, ctx_msg, diags,
            );
        }
        if let (Type::Vector(vec_ty), Some(_)) = (&a, b.atomic_kind()) {
            return Self::promote_scalar_into_vector(
                &b, vec_ty, variability, is_const, pos, ctx_msg, diags,
            );
        }

        // Two vectors: sizes must agree.
        if let (Type::Vector(va), Type::Vector(vb)) = (&a, &b) {
            if va.count != vb.count {
                diags.error(
                    DiagnosticKind::ShapeMismatch,
                    pos,
                    format!(
                        "{ctx_msg}: vector size mismatch ({} vs {})",
                        va.count, vb.count
                    ),
                );
                return None;
            }
            let elem = Self::promote_atomic_pair(&va.element, &vb.element, pos, ctx_msg, diags)?;
            let count = vector_size.unwrap_or(va.count);
            return Some(Type::Vector(VectorType {
                element: Box::new(elem.as_mutable().as_uniform()),
                count,
                variability,
                is_const,
            }));
        }

        // Step 4: two atomic scalars.
        if a.atomic_kind().is_some() && b.atomic_kind().is_some() {
            let promoted = Self::promote_atomic_pair(&a, &b, pos, ctx_msg, diags)?;
            if let Some(n) = vector_size.filter(|n| *n > 1) {
                return Some(Type::Vector(VectorType {
                    element: Box::new(promoted.as_mutable().as_uniform()),
                    count: n,
                    variability,
                    is_const,
                }));
            }
            return Some(promoted.with_variability_and_const(variability, is_const));
        }

        // Pointers: the more general pointer when they agree on target
        // modulo const; pointer-vs-non-pointer is an error.
        if let (Type::Pointer(pa), Type::Pointer(pb)) = (&a, &b) {
            if Type::equal_ignoring_const(&pa.base, &pb.base) {
                let base_const = pa.base.is_const() || pb.base.is_const();
                return Some(Type::Pointer(PointerType {
                    base: Box::new(pa.base.as_mutable().with_const_shallow(base_const)),
                    variability,
                    is_const,
                }));
            }
        }

        diags.error(
            DiagnosticKind::ShapeMismatch,
            pos,
            format!("{ctx_msg}: can't find a common type for \"{a}\" and \"{b}\""),
        );
        None
    }

    fn promote_scalar_into_vector(
        scalar: &Type,
        vec_ty: &VectorType,
        variability: Variability,
        is_const: bool,
        pos: Pos,
        ctx_msg: &str,
        diags: &mut dyn DiagnosticSink,
    ) -> Option<Type> {
        let elem = Self::promote_atomic_pair(scalar, &vec_ty.element, pos, ctx_msg, diags)?;
        Some(Type::Vector(VectorType {
            element: Box::new(elem.as_mutable().as_uniform()),
            count: vec_ty.count,
            variability,
            is_const,
        }))
    }

    /// Step 4: the atomic-kind rank ladder with its tie-breaks. Because
    /// the ladder is already ordered so that "mixing signed+unsigned of
    /// the same width yields unsigned" and "integer < float < double",
    /// the entire rule collapses to "take the higher-ranked kind".
    fn promote_atomic_pair(
        a: &Type,
        b: &Type,
        pos: Pos,
        ctx_msg: &str,
        diags: &mut dyn DiagnosticSink,
    ) -> Option<Type> {
        let (ka, kb) = match (a.atomic_kind(), b.atomic_kind()) {
            (Some(ka), Some(kb)) => (ka, kb),
            _ => {
                diags.error(
                    DiagnosticKind::ShapeMismatch,
                    pos,
                    format!("{ctx_msg}: expected atomic scalar types"),
                );
                return None;
            }
        };
        let kind = if ka.rank() >= kb.rank() { ka } else { kb };
        Some(Type::uniform(kind))
    }

    // ---- name mangling --------------------------------------------------

    /// Deterministic, injective string encoding of a type.
    ///
    /// Every variable-length component (identifier, member list, parameter
    /// list) is length-prefixed, so no concatenation of mangled fragments
    /// can be re-segmented two different ways — this is what makes
    /// "distinct types mangle distinctly" hold constructively.
    pub fn mangle(&self) -> String {
        let mut out = String::new();
        self.mangle_into(&mut out);
        out
    }

    fn mangle_qualifiers(variability: Variability, is_const: bool, out: &mut String) {
        out.push(match variability {
            Variability::Uniform => 'u',
            Variability::Varying => 'v',
        });
        if is_const {
            out.push('K');
        }
    }

    fn mangle_ident(name: &str, out: &mut String) {
        out.push_str(&name.len().to_string());
        out.push('_');
        out.push_str(name);
    }

    fn mangle_into(&self, out: &mut String) {
        match self {
            Type::Atomic(a) => {
                Self::mangle_qualifiers(a.variability, a.is_const, out);
                out.push(a.kind.mangle_code());
            }
            Type::Enum(e) => {
                Self::mangle_qualifiers(e.variability, e.is_const, out);
                out.push('E');
                Self::mangle_ident(&e.name, out);
            }
            Type::Pointer(p) => {
                Self::mangle_qualifiers(p.variability, p.is_const, out);
                out.push('P');
                p.base.mangle_into(out);
            }
            Type::Reference(r) => {
                out.push('R');
                r.target.mangle_into(out);
            }
            Type::Array(a) => {
                Self::mangle_qualifiers(a.variability, a.is_const, out);
                out.push('A');
                out.push_str(&a.count.to_string());
                out.push('_');
                a.element.mangle_into(out);
            }
            Type::Vector(v) => {
                Self::mangle_qualifiers(v.variability, v.is_const, out);
                out.push('W');
                out.push_str(&v.count.to_string());
                out.push('_');
                v.element.mangle_into(out);
            }
            Type::Struct(s) => {
                Self::mangle_qualifiers(s.variability, s.is_const, out);
                out.push('S');
                Self::mangle_ident(&s.name, out);
                out.push_str(&s.members.len().to_string());
                out.push('_');
                for m in s.members.iter() {
                    Self::mangle_ident(&m.name, out);
                    out.push(if m.is_const { 'K' } else { '_' });
                    m.ty.mangle_into(out);
                }
            }
            Type::Function(fun) => {
                out.push('F');
                out.push(if fun.is_task { 'T' } else { '_' });
                fun.return_type.mangle_into(out);
                out.push_str(&fun.params.len().to_string());
                out.push('_');
                for p in &fun.params {
                    out.push(if p.has_default { 'D' } else { '_' });
                    p.ty.mangle_into(out);
                }
            }
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Atomic(a) => {
                if a.is_const {
                    write!(f, "const ")?;
                }
                write!(f, "{} {}", a.variability, a.kind)
            }
            Type::Enum(e) => {
                if e.is_const {
                    write!(f, "const ")?;
                }
                write!(f, "{} enum {}", e.variability, e.name)
            }
            Type::Pointer(p) => {
                if p.is_const {
                    write!(f, "const ")?;
                }
                write!(f, "{} {} *", p.variability, p.base)
            }
            Type::Reference(r) => write!(f, "reference to {}", r.target),
            Type::Array(a) => {
                if a.is_const {
                    write!(f, "const ")?;
                }
                if a.is_incomplete() {
                    write!(f, "{} {}[]", a.variability, a.element)
                } else {
                    write!(f, "{} {}[{}]", a.variability, a.element, a.count)
                }
            }
            Type::Vector(v) => {
                if v.is_const {
                    write!(f, "const ")?;
                }
                write!(f, "{} {}<{}>", v.variability, v.element, v.count)
            }
            Type::Struct(s) => {
                if s.is_const {
                    write!(f, "const ")?;
                }
                write!(f, "{} struct {}", s.variability, s.name)
            }
            Type::Function(fun) => {
                if fun.is_task {
                    write!(f, "task ")?;
                }
                write!(f, "{} (", fun.return_type)?;
                for (i, p) in fun.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p.ty)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::CollectingDiagnostics;

    fn int32(v: Variability) -> Type {
        Type::atomic(AtomicKind::Int32, v, false)
    }

    #[test]
    fn as_uniform_as_varying_idempotent_and_commute() {
        let t = int32(Variability::Uniform);
        assert_eq!(t.as_varying().as_uniform(), t.as_uniform());

        let c = t.as_const();
        assert_eq!(c.as_mutable().as_const(), c.as_const());

        let varying_const = t.as_varying().as_const();
        assert_eq!(
            varying_const.as_uniform(),
            t.as_const().as_varying().as_uniform()
        );
    }

    #[test]
    fn variability_recurses_into_array_not_pointer() {
        let arr = Type::Array(ArrayType {
            element: Box::new(int32(Variability::Uniform)),
            count: 4,
            variability: Variability::Uniform,
            is_const: false,
        });
        let varr = arr.as_varying();
        assert!(varr.is_varying());
        assert!(varr.element_type(0).unwrap().is_varying());

        let ptr = Type::Pointer(PointerType {
            base: Box::new(int32(Variability::Uniform)),
            variability: Variability::Uniform,
            is_const: false,
        });
        let vptr = ptr.as_varying();
        assert!(vptr.is_varying());
        // The pointee is untouched: pointer variability != pointee variability.
        assert!(!vptr.base_type().unwrap().is_varying());
    }

    #[test]
    fn struct_is_const_when_any_member_is() {
        let s = StructType {
            name: "S".into(),
            members: Rc::new(vec![
                StructMember {
                    name: "k".into(),
                    ty: Type::uniform(AtomicKind::Int32),
                    is_const: true,
                },
                StructMember {
                    name: "m".into(),
                    ty: Type::uniform(AtomicKind::Int32),
                    is_const: false,
                },
            ]),
            variability: Variability::Uniform,
            is_const: false,
        };
        assert!(Type::Struct(s).is_const());
    }

    #[test]
    fn mangling_is_injective_over_a_representative_set() {
        let samples: Vec<Type> = vec![
            Type::uniform(AtomicKind::Int32),
            Type::varying(AtomicKind::Int32),
            Type::uniform(AtomicKind::Int32).as_const(),
            Type::uniform(AtomicKind::UInt32),
            Type::Pointer(PointerType {
                base: Box::new(Type::uniform(AtomicKind::Int32)),
                variability: Variability::Uniform,
                is_const: false,
            }),
            Type::Pointer(PointerType {
                base: Box::new(Type::uniform(AtomicKind::Int32).as_const()),
                variability: Variability::Uniform,
                is_const: false,
            }),
            Type::Array(ArrayType {
                element: Box::new(Type::uniform(AtomicKind::Int32)),
                count: 4,
                variability: Variability::Uniform,
                is_const: false,
            }),
            Type::Array(ArrayType {
                element: Box::new(Type::uniform(AtomicKind::Int32)),
                count: 40,
                variability: Variability::Uniform,
                is_const: false,
            }),
            Type::Vector(VectorType {
                element: Box::new(Type::uniform(AtomicKind::Float)),
                count: 4,
                variability: Variability::Uniform,
                is_const: false,
            }),
            Type::Struct(StructType {
                name: "Foo".into(),
                members: Rc::new(vec![StructMember {
                    name: "x".into(),
                    ty: Type::uniform(AtomicKind::Int32),
                    is_const: false,
                }]),
                variability: Variability::Uniform,
                is_const: false,
            }),
            Type::Struct(StructType {
                name: "Foobar".into(),
                members: Rc::new(vec![]),
                variability: Variability::Uniform,
                is_const: false,
            }),
            Type::Function(Rc::new(FunctionType::new(
                Type::uniform(AtomicKind::Void),
                vec![(Type::uniform(AtomicKind::Int32), false)],
                false,
            ))),
            Type::Function(Rc::new(FunctionType::new(
                Type::uniform(AtomicKind::Void),
                vec![(Type::uniform(AtomicKind::Int32), true)],
                false,
            ))),
        ];

        for i in 0..samples.len() {
            for j in 0..samples.len() {
                let equal = samples[i] == samples[j];
                let same_mangle = samples[i].mangle() == samples[j].mangle();
                assert_eq!(
                    equal, same_mangle,
                    "mangle injectivity violated between {:?} and {:?}",
                    samples[i], samples[j]
                );
            }
        }
    }

    #[test]
    fn more_general_type_promotes_int_and_float() {
        let mut diags = CollectingDiagnostics::new();
        let got = Type::more_general_type(
            &Type::uniform(AtomicKind::Int32),
            &Type::uniform(AtomicKind::Float),
            Pos::synthetic(),
            "test",
            false,
            None,
            &mut diags,
        )
        .unwrap();
        assert_eq!(got.atomic_kind(), Some(AtomicKind::Float));
        assert!(!diags.has_errors());
    }

    #[test]
    fn more_general_type_propagates_varying() {
        let mut diags = CollectingDiagnostics::new();
        let got = Type::more_general_type(
            &Type::uniform(AtomicKind::Int32),
            &Type::varying(AtomicKind::Int32),
            Pos::synthetic(),
            "test",
            false,
            None,
            &mut diags,
        )
        .unwrap();
        assert!(got.is_varying());
    }

    #[test]
    fn more_general_type_scalar_vector_broadcast() {
        let mut diags = CollectingDiagnostics::new();
        let vec4 = Type::Vector(VectorType {
            element: Box::new(Type::uniform(AtomicKind::Float)),
            count: 4,
            variability: Variability::Uniform,
            is_const: false,
        });
        let got = Type::more_general_type(
            &Type::uniform(AtomicKind::Int32),
            &vec4,
            Pos::synthetic(),
            "test",
            false,
            None,
            &mut diags,
        )
        .unwrap();
        assert!(got.is_vector());
        assert_eq!(got.element_count(), Some(4));
        assert!(!diags.has_errors());
    }

    #[test]
    fn more_general_type_mismatched_vector_sizes_errors() {
        let mut diags = CollectingDiagnostics::new();
        let vec4 = Type::Vector(VectorType {
            element: Box::new(Type::uniform(AtomicKind::Float)),
            count: 4,
            variability: Variability::Uniform,
            is_const: false,
        });
        let vec8 = Type::Vector(VectorType {
            count: 8,
            ..match vec4.clone() {
                Type::Vector(v) => v,
                _ => unreachable!(),
            }
        });
        let got = Type::more_general_type(
            &vec4,
            &vec8,
            Pos::synthetic(),
            "test",
            false,
            None,
            &mut diags,
        );
        assert!(got.is_none());
        assert!(diags.has_errors());
    }

    #[test]
    fn equal_ignoring_const_strips_at_every_depth() {
        let a = Type::Array(ArrayType {
            element: Box::new(Type::uniform(AtomicKind::Int32).as_const()),
            count: 4,
            variability: Variability::Uniform,
            is_const: true,
        });
        let b = Type::Array(ArrayType {
            element: Box::new(Type::uniform(AtomicKind::Int32)),
            count: 4,
            variability: Variability::Uniform,
            is_const: false,
        });
        assert!(!Type::equal(&a, &b));
        assert!(Type::equal_ignoring_const(&a, &b));
    }

    #[test]
    fn function_canonicalizes_top_level_param_const_only() {
        let fun = FunctionType::new(
            Type::uniform(AtomicKind::Void),
            vec![(Type::uniform(AtomicKind::Int32).as_const(), false)],
            false,
        );
        assert!(!fun.params[0].ty.is_const());
    }

    #[test]
    fn function_variability_and_const_morphisms_are_no_ops() {
        let fun = Type::Function(Rc::new(FunctionType::new(
            Type::uniform(AtomicKind::Void),
            vec![],
            false,
        )));
        assert_eq!(fun.as_varying(), fun);
        assert_eq!(fun.as_const(), fun);
    }
}
