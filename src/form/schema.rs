use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{self, BoxFuture};
use indexmap::IndexMap;
use rust_decimal::Decimal;

use super::rule::{CompiledRule, RuleItem, RuleType, panic_reason};
use super::store::{FieldErrors, ValidationError};
use super::value::{FieldValue, FieldValues};
use crate::i18n::ValidateMessages;

#[derive(Clone, Debug, Default)]
pub struct FieldDescriptor {
    pub label: Option<String>,
    pub rules: Vec<CompiledRule>,
}

/// Field name to the rules that apply to it for one pass.
pub type Descriptor = IndexMap<String, FieldDescriptor>;

/// Every error of a rejected pass, in field order, and the same errors
/// grouped by field.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SchemaRejection {
    pub errors: Vec<ValidationError>,
    pub fields: FieldErrors,
}

impl SchemaRejection {
    pub fn from_fields(fields: FieldErrors) -> Self {
        let errors = fields.values().flatten().cloned().collect();
        Self { errors, fields }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SchemaFailure {
    /// One or more fields broke their rules.
    Rejected(SchemaRejection),
    /// The facility itself could not finish.
    Fault(String),
    /// The pass outlived the configured validation timeout.
    TimedOut(Duration),
}

pub type SchemaOutcome = Result<(), SchemaFailure>;

/// Checks a descriptor against a value map.
pub trait SchemaValidator: Send + Sync + 'static {
    fn validate(
        &self,
        descriptor: Descriptor,
        values: FieldValues,
    ) -> BoxFuture<'static, SchemaOutcome>;
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SchemaOptions {
    /// Stop checking a field after its first failing rule.
    pub first_error_only: bool,
}

/// The built-in facility: required, type, range, enum, pattern and
/// whitespace checks plus custom sync and async validators.
#[derive(Clone, Debug, Default)]
pub struct RuleSchema {
    messages: ValidateMessages,
    options: SchemaOptions,
}

impl RuleSchema {
    pub fn new(messages: ValidateMessages, options: SchemaOptions) -> Self {
        Self { messages, options }
    }
}

impl SchemaValidator for RuleSchema {
    fn validate(
        &self,
        descriptor: Descriptor,
        values: FieldValues,
    ) -> BoxFuture<'static, SchemaOutcome> {
        let messages = self.messages.clone();
        let options = self.options;
        Box::pin(async move {
            let checks = descriptor.into_iter().map(|(name, field)| {
                let value = values.get(&name).cloned().unwrap_or_default();
                let messages = messages.clone();
                async move {
                    let errors =
                        validate_field_rules(&name, &field, value, &messages, options).await;
                    (name, errors)
                }
            });

            let mut fields = FieldErrors::new();
            for (name, errors) in future::join_all(checks).await {
                if !errors.is_empty() {
                    fields.insert(name, errors);
                }
            }

            if fields.is_empty() {
                Ok(())
            } else {
                Err(SchemaFailure::Rejected(SchemaRejection::from_fields(fields)))
            }
        })
    }
}

async fn validate_field_rules(
    name: &str,
    field: &FieldDescriptor,
    value: FieldValue,
    messages: &ValidateMessages,
    options: SchemaOptions,
) -> Vec<ValidationError> {
    let display = field.label.as_deref().unwrap_or(name);
    let mut errors = Vec::new();

    for rule in &field.rules {
        let messages_for_rule = match rule {
            CompiledRule::Unresolved { reason } => vec![messages.t_with(
                "unresolved",
                &[("field", display), ("reason", reason.as_str())],
            )],
            CompiledRule::Item(item) => check_rule(display, item, value.clone(), messages).await,
        };

        if messages_for_rule.is_empty() {
            continue;
        }

        let rule_message = match rule {
            CompiledRule::Item(item) => item.message.clone(),
            CompiledRule::Unresolved { .. } => None,
        };
        match rule_message {
            Some(message) => errors.push(ValidationError::new(name, message)),
            None => errors.extend(
                messages_for_rule
                    .into_iter()
                    .map(|message| ValidationError::new(name, message)),
            ),
        }

        if options.first_error_only {
            break;
        }
    }

    errors
}

/// Runs one rule. Custom validators replace the built-in checks.
async fn check_rule(
    display: &str,
    rule: &RuleItem,
    value: FieldValue,
    messages: &ValidateMessages,
) -> Vec<String> {
    let value = match &rule.transform {
        Some(transform) => transform(value),
        None => value,
    };

    if let Some(validator) = &rule.async_validator {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| validator(value))) {
            Ok(pending) => AssertUnwindSafe(pending).catch_unwind().await,
            Err(payload) => Err(payload),
        };
        return validator_messages(display, outcome, messages);
    }
    if let Some(validator) = &rule.validator {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| validator(&value)));
        return validator_messages(display, outcome, messages);
    }

    check_builtin(display, rule, &value, messages)
}

/// A panicking validator fails its own field instead of the whole pass.
fn validator_messages(
    display: &str,
    outcome: Result<Result<(), String>, Box<dyn Any + Send>>,
    messages: &ValidateMessages,
) -> Vec<String> {
    match outcome {
        Ok(Ok(())) => Vec::new(),
        Ok(Err(message)) => vec![custom_message(display, message, messages)],
        Err(payload) => {
            let reason = panic_reason(payload.as_ref());
            log::warn!("validator for {display} panicked: {reason}");
            vec![messages.t_with("fault", &[("field", display), ("reason", reason.as_str())])]
        }
    }
}

fn custom_message(display: &str, message: String, messages: &ValidateMessages) -> String {
    if message.is_empty() {
        messages.t_with("default", &[("field", display)])
    } else {
        message
    }
}

fn check_builtin(
    display: &str,
    rule: &RuleItem,
    value: &FieldValue,
    messages: &ValidateMessages,
) -> Vec<String> {
    if value.is_empty() {
        return if rule.required {
            vec![messages.t_with("required", &[("field", display)])]
        } else {
            Vec::new()
        };
    }
    if rule.is_required_only() {
        return Vec::new();
    }

    let kind = rule.effective_kind();
    if !matches_type(kind, value, rule) {
        let message = if kind == RuleType::Enum {
            let allowed = allowed_list(&rule.allowed);
            messages.t_with("enum", &[("field", display), ("values", allowed.as_str())])
        } else {
            messages.t_with("types.invalid", &[("field", display), ("type", kind.as_str())])
        };
        return vec![message];
    }

    let mut errors = Vec::new();
    if let Some(message) = check_range(display, rule, value, messages) {
        errors.push(message);
    }
    if let (Some(pattern), FieldValue::Text(text)) = (&rule.pattern, value) {
        if !pattern.is_match(text) {
            errors.push(messages.t_with(
                "pattern.mismatch",
                &[
                    ("field", display),
                    ("value", text.as_str()),
                    ("pattern", pattern.as_str()),
                ],
            ));
        }
    }
    if rule.whitespace {
        if let FieldValue::Text(text) = value {
            if text.trim().is_empty() {
                errors.push(messages.t_with("whitespace", &[("field", display)]));
            }
        }
    }
    errors
}

fn matches_type(kind: RuleType, value: &FieldValue, rule: &RuleItem) -> bool {
    match kind {
        RuleType::String => matches!(value, FieldValue::Text(_)),
        RuleType::Number => matches!(value, FieldValue::Number(_)),
        RuleType::Boolean => matches!(value, FieldValue::Bool(_)),
        RuleType::Integer => value.as_number().is_some_and(|number| number.fract().is_zero()),
        RuleType::Float => value.as_number().is_some_and(|number| !number.fract().is_zero()),
        RuleType::Array => matches!(value, FieldValue::List(_)),
        RuleType::Enum => rule.allowed.contains(value),
        RuleType::Email => value
            .as_text()
            .is_some_and(email_address::EmailAddress::is_valid),
        RuleType::Url => value
            .as_text()
            .and_then(|text| url::Url::parse(text).ok())
            .is_some_and(|url| url.has_host()),
        RuleType::Regexp => value
            .as_text()
            .is_some_and(|text| regex::Regex::new(text).is_ok()),
        RuleType::Any => true,
    }
}

fn check_range(
    display: &str,
    rule: &RuleItem,
    value: &FieldValue,
    messages: &ValidateMessages,
) -> Option<String> {
    let (measure, family) = match value {
        FieldValue::Text(text) => (Decimal::from(text.chars().count()), "string"),
        FieldValue::Number(number) => (*number, "number"),
        FieldValue::List(items) => (Decimal::from(items.len()), "array"),
        FieldValue::Null | FieldValue::Bool(_) => return None,
    };

    let failure = if let Some(len) = rule.len {
        (measure != len).then(|| ("len", Some(len), None, None))
    } else {
        match (rule.min, rule.max) {
            (Some(min), Some(max)) if measure < min || measure > max => {
                Some(("range", None, Some(min), Some(max)))
            }
            (Some(min), None) if measure < min => Some(("min", None, Some(min), None)),
            (None, Some(max)) if measure > max => Some(("max", None, None, Some(max))),
            _ => None,
        }
    };

    let (suffix, len, min, max) = failure?;
    let key = format!("{family}.{suffix}");
    let len = len.map(|value| value.to_string()).unwrap_or_default();
    let min = min.map(|value| value.to_string()).unwrap_or_default();
    let max = max.map(|value| value.to_string()).unwrap_or_default();
    Some(messages.t_with(
        &key,
        &[
            ("field", display),
            ("len", len.as_str()),
            ("min", min.as_str()),
            ("max", max.as_str()),
        ],
    ))
}

fn allowed_list(allowed: &[FieldValue]) -> String {
    allowed
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::rule::{FieldReader, Rule, RuleItem, compile};
    use crate::i18n::Locale;
    use futures::executor::block_on;

    fn schema() -> RuleSchema {
        RuleSchema::new(
            ValidateMessages::new(&Locale::from("en-US")),
            SchemaOptions::default(),
        )
    }

    fn run(
        schema: &RuleSchema,
        name: &str,
        value: impl Into<FieldValue>,
        rules: Vec<Rule>,
    ) -> Vec<String> {
        let mut descriptor = Descriptor::new();
        descriptor.insert(
            name.to_string(),
            FieldDescriptor {
                label: None,
                rules: compile(&rules, &FieldReader::default()),
            },
        );
        let mut values = FieldValues::new();
        values.insert(name.to_string(), value.into());
        match block_on(schema.validate(descriptor, values)) {
            Ok(()) => Vec::new(),
            Err(SchemaFailure::Rejected(rejection)) => rejection
                .errors
                .into_iter()
                .map(|error| error.message)
                .collect(),
            Err(failure) => panic!("unexpected failure: {failure:?}"),
        }
    }

    #[test]
    fn required_rejects_empty_values() {
        let errors = run(&schema(), "username", "", vec![RuleItem::required().into()]);
        assert_eq!(errors, vec!["username is required"]);
    }

    #[test]
    fn optional_empty_values_skip_other_checks() {
        let errors = run(
            &schema(),
            "nickname",
            "",
            vec![RuleItem::new().kind(RuleType::Email).min(3).into()],
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn string_length_bounds_use_character_counts() {
        let schema = schema();
        let short = run(&schema, "username", "ab", vec![RuleItem::required().min(3).into()]);
        assert_eq!(short, vec!["username must be at least 3 characters"]);

        let ranged = run(
            &schema,
            "password",
            "密码密码密码密码密码",
            vec![RuleItem::new().min(3).max(8).into()],
        );
        assert_eq!(ranged, vec!["password must be between 3 and 8 characters"]);

        let exact = run(&schema, "pin", "12345", vec![RuleItem::new().len(4).into()]);
        assert_eq!(exact, vec!["pin must be exactly 4 characters"]);
    }

    #[test]
    fn number_bounds_compare_values() {
        let errors = run(
            &schema(),
            "age",
            12_i64,
            vec![RuleItem::new().kind(RuleType::Integer).min(18).into()],
        );
        assert_eq!(errors, vec!["age cannot be less than 18"]);
    }

    #[test]
    fn type_mismatch_is_reported_before_ranges() {
        let errors = run(
            &schema(),
            "age",
            "eighteen",
            vec![RuleItem::new().kind(RuleType::Number).min(18).into()],
        );
        assert_eq!(errors, vec!["age is not a valid number"]);
    }

    #[test]
    fn enum_checks_membership() {
        let rules = vec![
            RuleItem::new()
                .one_of([true])
                .message("Please accept the agreement")
                .into(),
        ];
        assert_eq!(
            run(&schema(), "agreement", false, rules.clone()),
            vec!["Please accept the agreement"]
        );
        assert!(run(&schema(), "agreement", true, rules).is_empty());

        let plain = run(&schema(), "plan", "gold", vec![RuleItem::new().one_of(["free", "pro"]).into()]);
        assert_eq!(plain, vec!["plan must be one of free, pro"]);
    }

    #[test]
    fn email_and_url_types() {
        let schema = schema();
        let email = vec![Rule::from(RuleItem::new().kind(RuleType::Email))];
        assert!(run(&schema, "email", "user@example.com", email.clone()).is_empty());
        assert_eq!(
            run(&schema, "email", "not-an-email", email),
            vec!["email is not a valid email"]
        );
        let url = vec![Rule::from(RuleItem::new().kind(RuleType::Url))];
        assert!(run(&schema, "site", "https://calm.ui/docs", url.clone()).is_empty());
        assert_eq!(run(&schema, "site", "calm", url), vec!["site is not a valid url"]);
    }

    #[test]
    fn pattern_and_whitespace() {
        let schema = schema();
        let rules = vec![
            RuleItem::new()
                .pattern_str("^[a-z]+$")
                .expect("valid pattern")
                .into(),
        ];
        assert_eq!(
            run(&schema, "slug", "Hello", rules),
            vec!["slug value Hello does not match pattern ^[a-z]+$"]
        );
        assert_eq!(
            run(&schema, "bio", "   ", vec![RuleItem::required().whitespace(true).into()]),
            vec!["bio cannot be empty"]
        );
    }

    #[test]
    fn custom_message_replaces_rule_errors() {
        let errors = run(
            &schema(),
            "username",
            "ab",
            vec![RuleItem::required().min(3).message("Too short").into()],
        );
        assert_eq!(errors, vec!["Too short"]);
    }

    #[test]
    fn custom_validators_replace_builtin_checks() {
        let schema = schema();
        let sync_rule = vec![Rule::from(RuleItem::required().validator(|value| {
            if value.as_text() == Some("admin") {
                Err("admin is reserved".to_string())
            } else {
                Ok(())
            }
        }))];
        assert_eq!(run(&schema, "username", "admin", sync_rule), vec!["admin is reserved"]);

        let async_rule = vec![Rule::from(
            RuleItem::new().async_validator(|_value| async { Err::<(), String>(String::new()) }),
        )];
        assert_eq!(
            run(&schema, "username", "anything", async_rule),
            vec!["Validation error on field username"]
        );
    }

    #[test]
    fn panicking_validators_fail_their_rule() {
        let schema = schema();
        let sync_rule = vec![Rule::from(
            RuleItem::new().validator(|_value| -> Result<(), String> { panic!("validator bug") }),
        )];
        assert_eq!(
            run(&schema, "username", "neo", sync_rule),
            vec!["Validation of username failed: validator bug"]
        );

        let async_rule = vec![Rule::from(RuleItem::new().async_validator(
            |_value| async move {
                if true {
                    panic!("lookup crashed");
                }
                Ok::<(), String>(())
            },
        ))];
        assert_eq!(
            run(&schema, "username", "neo", async_rule),
            vec!["Validation of username failed: lookup crashed"]
        );
    }

    #[test]
    fn transform_runs_before_checks() {
        let rules = vec![Rule::from(
            RuleItem::required()
                .transform(|value| match value {
                    FieldValue::Text(text) => FieldValue::Text(text.trim().to_string()),
                    other => other,
                })
                .min(3),
        )];
        assert_eq!(
            run(&schema(), "username", "  ab  ", rules),
            vec!["username must be at least 3 characters"]
        );
    }

    #[test]
    fn every_rule_is_evaluated_unless_first_error_only() {
        let rules = vec![
            Rule::from(RuleItem::new().min(5)),
            Rule::from(RuleItem::new().pattern_str("^[0-9]+$").expect("valid pattern")),
        ];
        assert_eq!(run(&schema(), "code", "ab", rules.clone()).len(), 2);

        let first_only = RuleSchema::new(
            ValidateMessages::new(&Locale::from("en-US")),
            SchemaOptions {
                first_error_only: true,
            },
        );
        assert_eq!(
            run(&first_only, "code", "ab", rules),
            vec!["code must be at least 5 characters"]
        );
    }

    #[test]
    fn labels_replace_names_in_default_messages() {
        let mut descriptor = Descriptor::new();
        descriptor.insert(
            "username".to_string(),
            FieldDescriptor {
                label: Some("User name".to_string()),
                rules: compile(&[RuleItem::required().into()], &FieldReader::default()),
            },
        );
        let outcome = block_on(schema().validate(descriptor, FieldValues::new()));
        let Err(SchemaFailure::Rejected(rejection)) = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(rejection.fields["username"][0].message, "User name is required");
        assert_eq!(rejection.fields["username"][0].field, "username");
    }

    #[test]
    fn localized_messages() {
        let schema = RuleSchema::new(
            ValidateMessages::new(&Locale::from("zh-CN")),
            SchemaOptions::default(),
        );
        assert_eq!(
            run(&schema, "用户名", "", vec![RuleItem::required().into()]),
            vec!["用户名 为必填项"]
        );
    }
}
