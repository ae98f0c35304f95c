//! Abstract, dialect-independent column types.
//!
//! [`AbstractType`] is the closed type algebra every other component matches
//! on. It is derived once per sync cycle from a stream's JSON schema and never
//! mutated afterwards.

use serde_json::Value;
use std::fmt;

/// Primitive kinds of the abstract type model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveKind {
    String,
    Number,
    Integer,
    Boolean,
    TimestampWithTimezone,
    TimestampWithoutTimezone,
    TimeWithTimezone,
    TimeWithoutTimezone,
    Date,
    /// Anything the schema did not describe precisely enough.
    Unknown,
}

impl PrimitiveKind {
    /// Every primitive kind, in declaration order.
    pub const ALL: [PrimitiveKind; 10] = [
        PrimitiveKind::String,
        PrimitiveKind::Number,
        PrimitiveKind::Integer,
        PrimitiveKind::Boolean,
        PrimitiveKind::TimestampWithTimezone,
        PrimitiveKind::TimestampWithoutTimezone,
        PrimitiveKind::TimeWithTimezone,
        PrimitiveKind::TimeWithoutTimezone,
        PrimitiveKind::Date,
        PrimitiveKind::Unknown,
    ];

    /// Lower-case name used in logs and diff reasons.
    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveKind::String => "string",
            PrimitiveKind::Number => "number",
            PrimitiveKind::Integer => "integer",
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::TimestampWithTimezone => "timestamp_with_timezone",
            PrimitiveKind::TimestampWithoutTimezone => "timestamp_without_timezone",
            PrimitiveKind::TimeWithTimezone => "time_with_timezone",
            PrimitiveKind::TimeWithoutTimezone => "time_without_timezone",
            PrimitiveKind::Date => "date",
            PrimitiveKind::Unknown => "unknown",
        }
    }

    /// Parse an `airbyte_type` hint.
    fn from_airbyte_type(hint: &str) -> Option<Self> {
        match hint {
            "integer" | "big_integer" => Some(PrimitiveKind::Integer),
            "number" | "big_number" => Some(PrimitiveKind::Number),
            "timestamp_with_timezone" => Some(PrimitiveKind::TimestampWithTimezone),
            "timestamp_without_timezone" => Some(PrimitiveKind::TimestampWithoutTimezone),
            "time_with_timezone" => Some(PrimitiveKind::TimeWithTimezone),
            "time_without_timezone" => Some(PrimitiveKind::TimeWithoutTimezone),
            _ => None,
        }
    }
}

/// Logical column type.
///
/// Struct fields keep the order in which the schema declared them. Union
/// variants are kept deduplicated; their order carries no meaning, so two
/// unions with the same variants compare equal regardless of order.
#[derive(Debug, Clone)]
pub enum AbstractType {
    Primitive(PrimitiveKind),
    Struct(Vec<(String, AbstractType)>),
    Array(Box<AbstractType>),
    Union(Vec<AbstractType>),
    /// A `oneOf` the parser could not reduce to a union of known types.
    UnsupportedOneOf,
}

impl PartialEq for AbstractType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AbstractType::Primitive(a), AbstractType::Primitive(b)) => a == b,
            (AbstractType::Struct(a), AbstractType::Struct(b)) => a == b,
            (AbstractType::Array(a), AbstractType::Array(b)) => a == b,
            (AbstractType::Union(a), AbstractType::Union(b)) => {
                a.len() == b.len() && a.iter().all(|v| b.contains(v))
            }
            (AbstractType::UnsupportedOneOf, AbstractType::UnsupportedOneOf) => true,
            _ => false,
        }
    }
}

impl Eq for AbstractType {}

impl AbstractType {
    pub const STRING: AbstractType = AbstractType::Primitive(PrimitiveKind::String);
    pub const NUMBER: AbstractType = AbstractType::Primitive(PrimitiveKind::Number);
    pub const INTEGER: AbstractType = AbstractType::Primitive(PrimitiveKind::Integer);
    pub const BOOLEAN: AbstractType = AbstractType::Primitive(PrimitiveKind::Boolean);
    pub const UNKNOWN: AbstractType = AbstractType::Primitive(PrimitiveKind::Unknown);

    /// Build a union, flattening nested unions and dropping duplicates.
    ///
    /// A union of a single distinct type collapses to that type.
    pub fn union(variants: impl IntoIterator<Item = AbstractType>) -> AbstractType {
        let mut flat: Vec<AbstractType> = Vec::new();
        for variant in variants {
            let nested = match variant {
                AbstractType::Union(inner) => inner,
                other => vec![other],
            };
            for v in nested {
                if !flat.contains(&v) {
                    flat.push(v);
                }
            }
        }
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            AbstractType::Union(flat)
        }
    }

    /// Short name for diagnostics (`string`, `struct`, `array<integer>`, ...).
    pub fn name(&self) -> String {
        match self {
            AbstractType::Primitive(kind) => kind.name().to_string(),
            AbstractType::Struct(_) => "struct".to_string(),
            AbstractType::Array(element) => format!("array<{}>", element.name()),
            AbstractType::Union(variants) => {
                let names: Vec<String> = variants.iter().map(|v| v.name()).collect();
                format!("union<{}>", names.join("|"))
            }
            AbstractType::UnsupportedOneOf => "unsupported_one_of".to_string(),
        }
    }

    /// Derive an abstract type from a JSON schema node.
    ///
    /// Never fails: nodes that cannot be classified become `Unknown`, and a
    /// `oneOf` containing such nodes becomes `UnsupportedOneOf`.
    pub fn from_json_schema(schema: &Value) -> AbstractType {
        let Some(node) = schema.as_object() else {
            return AbstractType::UNKNOWN;
        };

        if let Some(one_of) = node.get("oneOf").and_then(Value::as_array) {
            let variants: Vec<AbstractType> =
                one_of.iter().map(AbstractType::from_json_schema).collect();
            if variants.is_empty() || variants.contains(&AbstractType::UNKNOWN) {
                return AbstractType::UnsupportedOneOf;
            }
            return AbstractType::union(variants);
        }

        match node.get("type") {
            Some(Value::String(ty)) => Self::from_type_name(ty, schema),
            Some(Value::Array(types)) => {
                let variants: Vec<AbstractType> = types
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|ty| *ty != "null")
                    .map(|ty| Self::from_type_name(ty, schema))
                    .collect();
                match variants.len() {
                    0 => AbstractType::UNKNOWN,
                    _ => AbstractType::union(variants),
                }
            }
            _ => {
                if node.contains_key("properties") {
                    Self::parse_struct(schema)
                } else if node.contains_key("items") {
                    Self::parse_array(schema)
                } else {
                    AbstractType::UNKNOWN
                }
            }
        }
    }

    fn from_type_name(ty: &str, schema: &Value) -> AbstractType {
        let hint = schema.get("airbyte_type").and_then(Value::as_str);
        match ty {
            "string" => {
                if let Some(kind) = hint.and_then(PrimitiveKind::from_airbyte_type) {
                    return AbstractType::Primitive(kind);
                }
                match schema.get("format").and_then(Value::as_str) {
                    Some("date") => AbstractType::Primitive(PrimitiveKind::Date),
                    Some("date-time") => {
                        AbstractType::Primitive(PrimitiveKind::TimestampWithTimezone)
                    }
                    Some("time") => AbstractType::Primitive(PrimitiveKind::TimeWithTimezone),
                    _ => AbstractType::STRING,
                }
            }
            "number" => match hint {
                Some("integer") | Some("big_integer") => AbstractType::INTEGER,
                _ => AbstractType::NUMBER,
            },
            "integer" => AbstractType::INTEGER,
            "boolean" => AbstractType::BOOLEAN,
            "object" => Self::parse_struct(schema),
            "array" => Self::parse_array(schema),
            _ => AbstractType::UNKNOWN,
        }
    }

    fn parse_struct(schema: &Value) -> AbstractType {
        let fields = schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(name, sub)| (name.clone(), AbstractType::from_json_schema(sub)))
                    .collect()
            })
            .unwrap_or_default();
        AbstractType::Struct(fields)
    }

    fn parse_array(schema: &Value) -> AbstractType {
        let element = match schema.get("items") {
            Some(items @ Value::Object(_)) => AbstractType::from_json_schema(items),
            // Tuple-style `items` lists carry heterogeneous elements.
            Some(Value::Array(items)) if !items.is_empty() => {
                AbstractType::union(items.iter().map(AbstractType::from_json_schema))
            }
            _ => AbstractType::UNKNOWN,
        };
        AbstractType::Array(Box::new(element))
    }
}

impl fmt::Display for AbstractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
