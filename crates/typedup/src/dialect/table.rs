//! Dialect type tables: the per-destination data behind type mapping.
//!
//! The mapping algorithm is the same for every destination; only the names in
//! a [`TypeTable`] differ. Tables are plain data so destinations can override
//! individual entries from configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Kind of column a dialect type represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialectKind {
    Text,
    Decimal,
    BigInt,
    Boolean,
    TimestampTz,
    Timestamp,
    TimeTz,
    Time,
    Date,
    Struct,
    Array,
    /// Textual JSON-like representation for anything without a native type.
    Serialized,
}

/// Groups of kinds that values can be widened within.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeFamily {
    Text,
    Numeric,
    Boolean,
    DateTime,
    TimeOfDay,
    Struct,
    Array,
    Serialized,
}

impl DialectKind {
    pub const ALL: [DialectKind; 12] = [
        DialectKind::Text,
        DialectKind::Decimal,
        DialectKind::BigInt,
        DialectKind::Boolean,
        DialectKind::TimestampTz,
        DialectKind::Timestamp,
        DialectKind::TimeTz,
        DialectKind::Time,
        DialectKind::Date,
        DialectKind::Struct,
        DialectKind::Array,
        DialectKind::Serialized,
    ];

    pub fn family(&self) -> TypeFamily {
        match self {
            DialectKind::Text => TypeFamily::Text,
            DialectKind::Decimal | DialectKind::BigInt => TypeFamily::Numeric,
            DialectKind::Boolean => TypeFamily::Boolean,
            DialectKind::Date | DialectKind::Timestamp | DialectKind::TimestampTz => {
                TypeFamily::DateTime
            }
            DialectKind::Time | DialectKind::TimeTz => TypeFamily::TimeOfDay,
            DialectKind::Struct => TypeFamily::Struct,
            DialectKind::Array => TypeFamily::Array,
            DialectKind::Serialized => TypeFamily::Serialized,
        }
    }

    /// Rank within the family; a higher rank holds every value of a lower one.
    ///
    /// `BigInt < Decimal`, `Date < Timestamp < TimestampTz`, `Time < TimeTz`.
    pub fn width(&self) -> u8 {
        match self {
            DialectKind::BigInt | DialectKind::Date | DialectKind::Time => 0,
            DialectKind::Decimal | DialectKind::Timestamp | DialectKind::TimeTz => 1,
            DialectKind::TimestampTz => 2,
            DialectKind::Text
            | DialectKind::Boolean
            | DialectKind::Struct
            | DialectKind::Array
            | DialectKind::Serialized => 0,
        }
    }
}

/// A concrete column type of some dialect.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DialectType {
    pub kind: DialectKind,
    /// Type name as written in DDL, e.g. `timestamp with time zone`.
    pub name: String,
}

impl fmt::Display for DialectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// DDL name of a kind plus other spellings introspection may report for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeEntry {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl TypeEntry {
    pub fn new(name: &str, aliases: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Normalized DDL name and aliases.
    pub fn spellings(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(&self.name)
            .chain(self.aliases.iter())
            .map(|s| normalize_type_name(s))
    }
}

/// Names of every dialect kind for one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeTable {
    pub text: TypeEntry,
    pub decimal: TypeEntry,
    pub bigint: TypeEntry,
    pub boolean: TypeEntry,
    pub timestamp_tz: TypeEntry,
    pub timestamp: TypeEntry,
    pub time_tz: TypeEntry,
    pub time: TypeEntry,
    pub date: TypeEntry,
    pub struct_type: TypeEntry,
    pub array_type: TypeEntry,
    pub serialized: TypeEntry,
}

impl TypeTable {
    pub fn entry(&self, kind: DialectKind) -> &TypeEntry {
        match kind {
            DialectKind::Text => &self.text,
            DialectKind::Decimal => &self.decimal,
            DialectKind::BigInt => &self.bigint,
            DialectKind::Boolean => &self.boolean,
            DialectKind::TimestampTz => &self.timestamp_tz,
            DialectKind::Timestamp => &self.timestamp,
            DialectKind::TimeTz => &self.time_tz,
            DialectKind::Time => &self.time,
            DialectKind::Date => &self.date,
            DialectKind::Struct => &self.struct_type,
            DialectKind::Array => &self.array_type,
            DialectKind::Serialized => &self.serialized,
        }
    }

    /// Replace the entry for `kind`.
    pub fn set(&mut self, kind: DialectKind, entry: TypeEntry) {
        let slot = match kind {
            DialectKind::Text => &mut self.text,
            DialectKind::Decimal => &mut self.decimal,
            DialectKind::BigInt => &mut self.bigint,
            DialectKind::Boolean => &mut self.boolean,
            DialectKind::TimestampTz => &mut self.timestamp_tz,
            DialectKind::Timestamp => &mut self.timestamp,
            DialectKind::TimeTz => &mut self.time_tz,
            DialectKind::Time => &mut self.time,
            DialectKind::Date => &mut self.date,
            DialectKind::Struct => &mut self.struct_type,
            DialectKind::Array => &mut self.array_type,
            DialectKind::Serialized => &mut self.serialized,
        };
        *slot = entry;
    }

    pub fn dialect_type(&self, kind: DialectKind) -> DialectType {
        DialectType {
            kind,
            name: self.entry(kind).name.clone(),
        }
    }
}

/// The set of dialect kinds a destination supports natively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedTypes {
    kinds: BTreeSet<DialectKind>,
}

impl SupportedTypes {
    pub fn all() -> Self {
        Self {
            kinds: DialectKind::ALL.into_iter().collect(),
        }
    }

    pub fn without(mut self, kind: DialectKind) -> Self {
        self.kinds.remove(&kind);
        self
    }

    pub fn contains(&self, kind: DialectKind) -> bool {
        self.kinds.contains(&kind)
    }
}

impl FromIterator<DialectKind> for SupportedTypes {
    fn from_iter<I: IntoIterator<Item = DialectKind>>(iter: I) -> Self {
        Self {
            kinds: iter.into_iter().collect(),
        }
    }
}

/// Lower-case a type name and collapse internal whitespace.
pub fn normalize_type_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
