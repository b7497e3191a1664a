use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::future::BoxFuture;
use regex::Regex;
use rust_decimal::Decimal;

use super::controller::{FormError, FormResult};
use super::value::{FieldValue, FieldValues};

pub type SyncRuleValidatorFn = Arc<dyn Fn(&FieldValue) -> Result<(), String> + Send + Sync>;
pub type AsyncRuleValidatorFn =
    Arc<dyn Fn(FieldValue) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;
pub type TransformFn = Arc<dyn Fn(FieldValue) -> FieldValue + Send + Sync>;
pub type DynamicRuleFn =
    Arc<dyn Fn(&FieldReader) -> Result<RuleItem, RuleError> + Send + Sync>;

/// Value type a static rule checks for. `String` applies when none is given.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RuleType {
    #[default]
    String,
    Number,
    Boolean,
    Integer,
    Float,
    Array,
    Enum,
    Email,
    Url,
    Regexp,
    Any,
}

impl RuleType {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleType::String => "string",
            RuleType::Number => "number",
            RuleType::Boolean => "boolean",
            RuleType::Integer => "integer",
            RuleType::Float => "float",
            RuleType::Array => "array",
            RuleType::Enum => "enum",
            RuleType::Email => "email",
            RuleType::Url => "url",
            RuleType::Regexp => "regexp",
            RuleType::Any => "any",
        }
    }
}

/// A declarative constraint, checked against one field's value without
/// looking at other fields.
#[derive(Clone, Default)]
pub struct RuleItem {
    pub required: bool,
    pub kind: Option<RuleType>,
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
    pub len: Option<Decimal>,
    pub allowed: Vec<FieldValue>,
    pub pattern: Option<Regex>,
    pub whitespace: bool,
    pub message: Option<String>,
    pub transform: Option<TransformFn>,
    pub validator: Option<SyncRuleValidatorFn>,
    pub async_validator: Option<AsyncRuleValidatorFn>,
}

impl RuleItem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required() -> Self {
        Self {
            required: true,
            ..Self::default()
        }
    }

    pub fn is_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn kind(mut self, kind: RuleType) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn min(mut self, min: impl Into<Decimal>) -> Self {
        self.min = Some(min.into());
        self
    }

    pub fn max(mut self, max: impl Into<Decimal>) -> Self {
        self.max = Some(max.into());
        self
    }

    pub fn len(mut self, len: impl Into<Decimal>) -> Self {
        self.len = Some(len.into());
        self
    }

    /// Restricts the value to `values` and switches the rule to [`RuleType::Enum`].
    pub fn one_of<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        self.allowed = values.into_iter().map(Into::into).collect();
        self.kind = Some(RuleType::Enum);
        self
    }

    pub fn pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn pattern_str(self, pattern: &str) -> FormResult<Self> {
        let regex = Regex::new(pattern).map_err(|error| FormError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: error.to_string(),
        })?;
        Ok(self.pattern(regex))
    }

    pub fn whitespace(mut self, whitespace: bool) -> Self {
        self.whitespace = whitespace;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn transform(
        mut self,
        transform: impl Fn(FieldValue) -> FieldValue + Send + Sync + 'static,
    ) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn validator(
        mut self,
        validator: impl Fn(&FieldValue) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn async_validator<F, Fut>(mut self, validator: F) -> Self
    where
        F: Fn(FieldValue) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.async_validator = Some(Arc::new(
            move |value: FieldValue| -> BoxFuture<'static, Result<(), String>> {
                Box::pin(validator(value))
            },
        ));
        self
    }

    /// True when the rule only asserts presence.
    pub(super) fn is_required_only(&self) -> bool {
        self.required
            && self.kind.is_none()
            && self.min.is_none()
            && self.max.is_none()
            && self.len.is_none()
            && self.allowed.is_empty()
            && self.pattern.is_none()
            && !self.whitespace
    }

    pub(super) fn effective_kind(&self) -> RuleType {
        self.kind.unwrap_or_default()
    }
}

impl Debug for RuleItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleItem")
            .field("required", &self.required)
            .field("kind", &self.kind)
            .field("min", &self.min)
            .field("max", &self.max)
            .field("len", &self.len)
            .field("allowed", &self.allowed)
            .field("pattern", &self.pattern.as_ref().map(Regex::as_str))
            .field("whitespace", &self.whitespace)
            .field("message", &self.message)
            .field("transform", &self.transform.is_some())
            .field("validator", &self.validator.is_some())
            .field("async_validator", &self.async_validator.is_some())
            .finish()
    }
}

/// Raised by a dynamic rule that cannot produce a constraint.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RuleError(pub String);

impl RuleError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

impl From<&str> for RuleError {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RuleError {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Read-only view of the field values a validation pass started with.
#[derive(Clone, Debug, Default)]
pub struct FieldReader {
    values: FieldValues,
}

impl FieldReader {
    pub fn new(values: FieldValues) -> Self {
        Self { values }
    }

    pub fn get_field_value(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    pub fn values(&self) -> &FieldValues {
        &self.values
    }
}

#[derive(Clone)]
pub enum Rule {
    Static(RuleItem),
    Dynamic(DynamicRuleFn),
}

impl Rule {
    /// A rule resolved against the other fields' values on every pass.
    pub fn dynamic<F, R>(resolve: F) -> Self
    where
        F: Fn(&FieldReader) -> Result<RuleItem, R> + Send + Sync + 'static,
        R: Into<RuleError>,
    {
        Rule::Dynamic(Arc::new(move |reader: &FieldReader| {
            resolve(reader).map_err(Into::into)
        }))
    }

    pub fn as_static(&self) -> Option<&RuleItem> {
        match self {
            Rule::Static(item) => Some(item),
            Rule::Dynamic(_) => None,
        }
    }
}

impl From<RuleItem> for Rule {
    fn from(value: RuleItem) -> Self {
        Rule::Static(value)
    }
}

impl Debug for Rule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Rule::Static(item) => f.debug_tuple("Static").field(item).finish(),
            Rule::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// The concrete constraint a rule produced for one pass.
#[derive(Clone, Debug)]
pub enum CompiledRule {
    Item(RuleItem),
    Unresolved { reason: String },
}

/// Resolves `rules` against `reader`. Called afresh for every pass.
pub fn compile(rules: &[Rule], reader: &FieldReader) -> Vec<CompiledRule> {
    rules
        .iter()
        .map(|rule| match rule {
            Rule::Static(item) => CompiledRule::Item(item.clone()),
            Rule::Dynamic(resolve) => {
                let resolved = panic::catch_unwind(AssertUnwindSafe(|| resolve(reader)))
                    .unwrap_or_else(|payload| Err(RuleError(panic_reason(payload.as_ref()))));
                match resolved {
                    Ok(item) => CompiledRule::Item(item),
                    Err(RuleError(reason)) => {
                        log::warn!("dynamic rule could not be resolved: {reason}");
                        CompiledRule::Unresolved { reason }
                    }
                }
            }
        })
        .collect()
}

pub(super) fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(reason) = payload.downcast_ref::<&str>() {
        (*reason).to_string()
    } else if let Some(reason) = payload.downcast_ref::<String>() {
        reason.clone()
    } else {
        "rule panicked".to_string()
    }
}

/// The usual "repeat the password" rule: the field must equal `other`.
pub fn matches_field(other: impl Into<String>, message: impl Into<String>) -> Rule {
    let other = other.into();
    let message = message.into();
    Rule::dynamic(move |form: &FieldReader| {
        let expected = form.get_field_value(&other).cloned().unwrap_or_default();
        let message = message.clone();
        Ok::<_, RuleError>(RuleItem::new().async_validator(move |value: FieldValue| {
            let outcome = if value == expected {
                Ok(())
            } else {
                Err(message.clone())
            };
            async move { outcome }
        }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(pairs: &[(&str, &str)]) -> FieldReader {
        FieldReader::new(
            pairs
                .iter()
                .map(|(name, value)| (name.to_string(), FieldValue::from(*value)))
                .collect(),
        )
    }

    #[test]
    fn static_rules_pass_through_in_order() {
        let rules = vec![
            Rule::from(RuleItem::required()),
            Rule::from(RuleItem::new().min(3)),
        ];
        let compiled = compile(&rules, &FieldReader::default());
        assert_eq!(compiled.len(), 2);
        assert!(matches!(&compiled[0], CompiledRule::Item(item) if item.required));
        assert!(matches!(&compiled[1], CompiledRule::Item(item) if item.min == Some(Decimal::from(3))));
    }

    #[test]
    fn dynamic_rules_see_the_reader_they_are_compiled_with() {
        let rule = Rule::dynamic(|form: &FieldReader| -> Result<RuleItem, RuleError> {
            let min = form
                .get_field_value("min")
                .and_then(FieldValue::as_text)
                .and_then(|text| text.parse::<i64>().ok())
                .ok_or("min is not set")?;
            Ok(RuleItem::new().min(min))
        });
        let rules = vec![rule];

        let first = compile(&rules, &reader(&[("min", "2")]));
        let second = compile(&rules, &reader(&[("min", "5")]));
        assert!(matches!(&first[0], CompiledRule::Item(item) if item.min == Some(Decimal::from(2))));
        assert!(matches!(&second[0], CompiledRule::Item(item) if item.min == Some(Decimal::from(5))));
    }

    #[test]
    fn failing_dynamic_rule_compiles_to_unresolved() {
        let rules = vec![
            Rule::dynamic(|_: &FieldReader| Err::<RuleItem, _>("lookup table missing")),
            Rule::from(RuleItem::required()),
        ];
        let compiled = compile(&rules, &FieldReader::default());
        assert!(matches!(
            &compiled[0],
            CompiledRule::Unresolved { reason } if reason == "lookup table missing"
        ));
        assert!(matches!(&compiled[1], CompiledRule::Item(_)));
    }

    #[test]
    fn panicking_dynamic_rule_is_isolated() {
        let rules = vec![Rule::dynamic(|_: &FieldReader| -> Result<RuleItem, RuleError> {
            panic!("boom")
        })];
        let compiled = compile(&rules, &FieldReader::default());
        assert!(matches!(
            &compiled[0],
            CompiledRule::Unresolved { reason } if reason == "boom"
        ));
    }

    #[test]
    fn matches_field_accepts_runtime_names() {
        let prefix = String::from("billing");
        let rules = vec![matches_field(format!("{prefix}_email"), "emails differ")];
        let compiled = compile(&rules, &reader(&[("billing_email", "a@b.co")]));
        let CompiledRule::Item(item) = &compiled[0] else {
            panic!("rule should resolve");
        };
        let check = item.async_validator.as_ref().expect("async check");
        assert_eq!(
            futures::executor::block_on(check(FieldValue::from("a@b.co"))),
            Ok(())
        );
        assert_eq!(
            futures::executor::block_on(check(FieldValue::from("x@b.co"))),
            Err("emails differ".to_string())
        );
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let error = RuleItem::new().pattern_str("(").expect_err("pattern must fail");
        assert!(matches!(error, FormError::InvalidPattern { pattern, .. } if pattern == "("));
    }
}
