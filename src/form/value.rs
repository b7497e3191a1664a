use std::fmt::{Display, Formatter};

use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::controller::{FormError, FormResult};

/// Field name to value map, kept in registration order.
pub type FieldValues = IndexMap<String, FieldValue>;

/// The value a single field holds. The engine never interprets it beyond
/// what a rule asks for.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Text(String),
    Number(#[serde(with = "rust_decimal::serde::float")] Decimal),
    List(Vec<FieldValue>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            FieldValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Null, empty text and empty lists count as "nothing entered".
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(text) => text.is_empty(),
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Bool(_) | FieldValue::Number(_) => false,
        }
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "boolean",
            FieldValue::Number(_) => "number",
            FieldValue::Text(_) => "string",
            FieldValue::List(_) => "array",
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Bool(value) => write!(f, "{value}"),
            FieldValue::Number(value) => write!(f, "{value}"),
            FieldValue::Text(text) => f.write_str(text),
            FieldValue::List(items) => {
                f.write_str("[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<Decimal> for FieldValue {
    fn from(value: Decimal) -> Self {
        FieldValue::Number(value)
    }
}

macro_rules! impl_integer_field_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    FieldValue::Number(Decimal::from(value))
                }
            }

            impl FromFieldValue for $ty {
                const EXPECTED: &'static str = "integer";

                fn from_field_value(value: &FieldValue) -> Option<Self> {
                    use rust_decimal::prelude::ToPrimitive;
                    let number = value.as_number()?;
                    if !number.fract().is_zero() {
                        return None;
                    }
                    <$ty as TryFrom<i128>>::try_from(number.to_i128()?).ok()
                }
            }
        )*
    };
}

impl_integer_field_value!(i32, i64, u32, u64, usize);

impl<T> From<Option<T>> for FieldValue
where
    T: Into<FieldValue>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}

impl<T> From<Vec<T>> for FieldValue
where
    T: Into<FieldValue>,
{
    fn from(value: Vec<T>) -> Self {
        FieldValue::List(value.into_iter().map(Into::into).collect())
    }
}

/// Typed extraction of a [`FieldValue`], used by derived form models.
pub trait FromFieldValue: Sized {
    const EXPECTED: &'static str;

    fn from_field_value(value: &FieldValue) -> Option<Self>;
}

impl FromFieldValue for FieldValue {
    const EXPECTED: &'static str = "any";

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromFieldValue for String {
    const EXPECTED: &'static str = "string";

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        value.as_text().map(str::to_string)
    }
}

impl FromFieldValue for bool {
    const EXPECTED: &'static str = "boolean";

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        value.as_bool()
    }
}

impl FromFieldValue for Decimal {
    const EXPECTED: &'static str = "number";

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        value.as_number()
    }
}

impl<T> FromFieldValue for Option<T>
where
    T: FromFieldValue,
{
    const EXPECTED: &'static str = T::EXPECTED;

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Null => Some(None),
            other => T::from_field_value(other).map(Some),
        }
    }
}

impl<T> FromFieldValue for Vec<T>
where
    T: FromFieldValue,
{
    const EXPECTED: &'static str = "array";

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        value
            .as_list()?
            .iter()
            .map(T::from_field_value)
            .collect::<Option<Vec<_>>>()
    }
}

/// A struct whose named fields map one-to-one onto form fields.
///
/// Usually derived with `#[derive(FormModel)]`.
pub trait FormModel: Sized {
    fn field_names() -> &'static [&'static str];
    fn to_values(&self) -> FieldValues;
    fn from_values(values: &FieldValues) -> FormResult<Self>;
}

/// Reads `name` out of `values` as `T`. A missing field reads as `Null`, so
/// `Option` fields may be absent.
pub fn field_from_values<T>(values: &FieldValues, name: &str) -> FormResult<T>
where
    T: FromFieldValue,
{
    let value = values.get(name).unwrap_or(&FieldValue::Null);
    if let Some(parsed) = T::from_field_value(value) {
        return Ok(parsed);
    }
    if value.is_null() {
        return Err(FormError::MissingField(name.to_string()));
    }
    Err(FormError::FieldTypeMismatch {
        field: name.to_string(),
        expected: T::EXPECTED,
        found: value.kind_name(),
    })
}
