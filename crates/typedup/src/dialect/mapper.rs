//! Abstract type → dialect type mapping.
//!
//! [`to_dialect_type`] is total: every [`AbstractType`] resolves to some
//! [`DialectType`], falling back to the serialized representation whenever no
//! native type fits. [`acceptable_types`] lists every type name a previous run
//! could legitimately have produced, which is what schema diffing compares
//! against.

use std::collections::BTreeSet;

use tracing::debug;

use crate::core::types::{AbstractType, PrimitiveKind};

use super::table::{normalize_type_name, DialectKind, DialectType, SupportedTypes, TypeTable};

/// Dialect kind a primitive maps to before support is considered.
pub fn primitive_kind(kind: PrimitiveKind) -> DialectKind {
    match kind {
        PrimitiveKind::String | PrimitiveKind::Unknown => DialectKind::Text,
        PrimitiveKind::Number => DialectKind::Decimal,
        PrimitiveKind::Integer => DialectKind::BigInt,
        PrimitiveKind::Boolean => DialectKind::Boolean,
        PrimitiveKind::TimestampWithTimezone => DialectKind::TimestampTz,
        PrimitiveKind::TimestampWithoutTimezone => DialectKind::Timestamp,
        PrimitiveKind::TimeWithTimezone => DialectKind::TimeTz,
        PrimitiveKind::TimeWithoutTimezone => DialectKind::Time,
        PrimitiveKind::Date => DialectKind::Date,
    }
}

/// Resolve the dialect kind of an abstract type under `supported`.
///
/// - primitives use their fixed kind, or `Text` when the destination lacks it
/// - structs and arrays use native kinds when supported, else `Serialized`
/// - unions resolve to the widest variant when all variants share a family,
///   else `Serialized`
/// - `UnsupportedOneOf` is always `Serialized`
pub fn resolve_kind(ty: &AbstractType, supported: &SupportedTypes) -> DialectKind {
    match ty {
        AbstractType::Primitive(kind) => {
            let kind = primitive_kind(*kind);
            if supported.contains(kind) {
                kind
            } else {
                DialectKind::Text
            }
        }
        AbstractType::Struct(_) => native_or_serialized(DialectKind::Struct, supported),
        AbstractType::Array(_) => native_or_serialized(DialectKind::Array, supported),
        AbstractType::Union(variants) => resolve_union(variants, supported),
        AbstractType::UnsupportedOneOf => DialectKind::Serialized,
    }
}

fn native_or_serialized(kind: DialectKind, supported: &SupportedTypes) -> DialectKind {
    if supported.contains(kind) {
        kind
    } else {
        DialectKind::Serialized
    }
}

fn resolve_union(variants: &[AbstractType], supported: &SupportedTypes) -> DialectKind {
    let kinds: Vec<DialectKind> = variants
        .iter()
        .map(|v| resolve_kind(v, supported))
        .collect();

    let Some(first) = kinds.first() else {
        return DialectKind::Serialized;
    };
    if kinds.iter().any(|k| k.family() != first.family()) {
        debug!(?kinds, "union variants span several families, serializing");
        return DialectKind::Serialized;
    }
    kinds
        .iter()
        .copied()
        .max_by_key(DialectKind::width)
        .unwrap_or(DialectKind::Serialized)
}

/// Map an abstract type to the column type to create.
pub fn to_dialect_type(
    ty: &AbstractType,
    table: &TypeTable,
    supported: &SupportedTypes,
) -> DialectType {
    table.dialect_type(resolve_kind(ty, supported))
}

/// Every normalized type name an existing column may have for `ty`.
///
/// Covers the kind chosen under `supported` plus, for composite and
/// serialized-capable types, the alternatives another run may have chosen:
/// native struct/array types and the serialized fallback. A primitive whose
/// kind is unsupported also accepts its native spellings.
pub fn acceptable_types(
    ty: &AbstractType,
    table: &TypeTable,
    supported: &SupportedTypes,
) -> BTreeSet<String> {
    let mut kinds = vec![resolve_kind(ty, supported)];
    match ty {
        AbstractType::Primitive(kind) => kinds.push(primitive_kind(*kind)),
        AbstractType::Struct(_) => kinds.extend([DialectKind::Struct, DialectKind::Serialized]),
        AbstractType::Array(_) => kinds.extend([DialectKind::Array, DialectKind::Serialized]),
        AbstractType::Union(_) | AbstractType::UnsupportedOneOf => {
            kinds.push(DialectKind::Serialized)
        }
    }

    kinds
        .into_iter()
        .flat_map(|kind| table.entry(kind).spellings().collect::<Vec<_>>())
        .collect()
}

/// Whether an introspected type name is one of `acceptable`.
///
/// Parameterized actual types (`numeric(38,9)`) also match an unparameterized
/// acceptable name (`numeric`).
pub fn type_name_matches(actual: &str, acceptable: &BTreeSet<String>) -> bool {
    let actual = normalize_type_name(actual);
    if acceptable.contains(&actual) {
        return true;
    }
    match actual.split_once('(') {
        Some((base, _)) => acceptable.contains(base.trim_end()),
        None => false,
    }
}
