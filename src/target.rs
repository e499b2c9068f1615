//! Read-only handles supplied by external collaborators.
//!
//! `TargetInfo` and `OptFlags` are owned by whatever embeds this crate
//! (the driver that also owns the parser and the emitter); the core only
//! ever reads them. They follow a plain-struct-plus-builder-method style
//! rather than a trait object, since there is exactly one shape of
//! "target description" and no need for dynamic dispatch over it.

use crate::types::AtomicKind;

/// Target machine description, as queried from the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetInfo {
    pub vector_width: u32,
    pub is_32_bit: bool,
    pub pointer_int_type: AtomicKind,
}

impl TargetInfo {
    pub fn new(vector_width: u32, is_32_bit: bool) -> Self {
        TargetInfo {
            vector_width,
            is_32_bit,
            pointer_int_type: if is_32_bit {
                AtomicKind::Int32
            } else {
                AtomicKind::Int64
            },
        }
    }

    /// The integer type used for pointer differences, honoring
    /// `OptFlags::force_32_bit_addressing`.
    pub fn pointer_diff_type(&self, force_32_bit: bool) -> AtomicKind {
        if self.is_32_bit || force_32_bit {
            AtomicKind::Int32
        } else {
            AtomicKind::Int64
        }
    }
}

impl Default for TargetInfo {
    fn default() -> Self {
        TargetInfo::new(8, false)
    }
}

/// Optimization / codegen flags that feed the constant folder and the
/// conversion engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptFlags {
    pub fast_math: bool,
    pub force_32_bit_addressing: bool,
    pub disable_masked_store_to_store: bool,
    pub disable_mask_all_on_optimizations: bool,
    pub disable_uniform_memory_optimizations: bool,
}

impl OptFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fast_math(mut self, on: bool) -> Self {
        self.fast_math = on;
        self
    }

    pub fn with_force_32_bit_addressing(mut self, on: bool) -> Self {
        self.force_32_bit_addressing = on;
        self
    }
}

/// Marker for the opaque downstream IR emitter.
///
/// The core never calls a method on this trait — it exists purely so that
/// `Expr`/`Module` APIs which need to *name* "an emitter" in their
/// signatures (for a downstream crate building on top of this one) have
/// something to name. Adding methods here would mean this crate is
/// prescribing how code is generated, which is explicitly out of scope.
pub trait EmitContext {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_diff_type_follows_addressing_width() {
        let t32 = TargetInfo::new(4, true);
        assert_eq!(t32.pointer_diff_type(false), AtomicKind::Int32);

        let t64 = TargetInfo::new(8, false);
        assert_eq!(t64.pointer_diff_type(false), AtomicKind::Int64);
        assert_eq!(t64.pointer_diff_type(true), AtomicKind::Int32);
    }

    #[test]
    fn opt_flags_builder() {
        let flags = OptFlags::new().with_fast_math(true);
        assert!(flags.fast_math);
        assert!(!flags.force_32_bit_addressing);
    }
}
