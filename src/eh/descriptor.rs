//! Type-matching descriptors.
//!
//! The runtime compares a thrown type against a handler's type by the address
//! of a type-info object. Both sides must name the same object for the same
//! type, so every descriptor is built from a normalized type: one level of
//! reference and the outermost cv-qualifiers are removed, deeper qualifiers
//! stay.

use std::fmt;

use blake3::hash;

use crate::types::{Ty, TypeSystem};

/// Address of a type-info object, or the upstream error sentinel.
#[derive(Clone, Debug)]
pub enum MatchingDescriptor {
    Address { symbol: String, identity: u64 },
    Error,
}

impl MatchingDescriptor {
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, MatchingDescriptor::Error)
    }

    #[must_use]
    pub fn symbol(&self) -> Option<&str> {
        match self {
            MatchingDescriptor::Address { symbol, .. } => Some(symbol),
            MatchingDescriptor::Error => None,
        }
    }

    #[must_use]
    pub fn identity(&self) -> Option<u64> {
        match self {
            MatchingDescriptor::Address { identity, .. } => Some(*identity),
            MatchingDescriptor::Error => None,
        }
    }
}

impl PartialEq for MatchingDescriptor {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                MatchingDescriptor::Address { identity: lhs, .. },
                MatchingDescriptor::Address { identity: rhs, .. },
            ) => lhs == rhs,
            (MatchingDescriptor::Error, MatchingDescriptor::Error) => true,
            _ => false,
        }
    }
}

impl Eq for MatchingDescriptor {}

impl fmt::Display for MatchingDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchingDescriptor::Address { symbol, .. } => write!(f, "&{symbol}"),
            MatchingDescriptor::Error => f.write_str("<error>"),
        }
    }
}

/// Stable 64-bit identity for a normalized type.
#[must_use]
pub fn type_identity(ty: &Ty) -> u64 {
    let digest = hash(ty.canonical_name().as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

/// Strips one reference level, then the outermost qualifiers.
#[must_use]
pub fn normalize(ty: &Ty) -> Ty {
    ty.non_reference().main_variant()
}

#[must_use]
pub fn describe(types: &dyn TypeSystem, ty: &Ty) -> MatchingDescriptor {
    if ty.is_error() {
        return MatchingDescriptor::Error;
    }
    let normalized = normalize(ty);
    if normalized.is_error() {
        return MatchingDescriptor::Error;
    }
    MatchingDescriptor::Address {
        symbol: types.type_info_symbol(&normalized),
        identity: type_identity(&normalized),
    }
}
