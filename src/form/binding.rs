use super::controller::{FormController, FormResult, ValidationMode};
use super::rule::Rule;
use super::store::{FieldRecord, ValidationError};
use super::value::FieldValue;

/// Which property of the input carries the field value.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ValueProp {
    #[default]
    Value,
    Checked,
}

impl ValueProp {
    fn empty_value(self) -> FieldValue {
        match self {
            ValueProp::Value => FieldValue::Text(String::new()),
            ValueProp::Checked => FieldValue::Bool(false),
        }
    }
}

/// What an input needs to draw itself for one field.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldPresentation {
    pub name: String,
    pub label: Option<String>,
    pub value: FieldValue,
    pub required: bool,
    pub errors: Vec<ValidationError>,
}

impl FieldPresentation {
    pub fn error_message(&self) -> Option<&str> {
        self.errors.first().map(ValidationError::message)
    }
}

/// Connects one input to a form field: registers it, feeds it the current
/// value and forwards changes and blur events.
#[derive(Clone)]
pub struct FieldBinding {
    controller: FormController,
    name: String,
    label: Option<String>,
    required: Option<bool>,
    rules: Vec<Rule>,
    initial_value: Option<FieldValue>,
    value_prop: ValueProp,
    validate_mode: Option<ValidationMode>,
}

impl FormController {
    pub fn bind(&self, name: impl Into<String>) -> FieldBinding {
        FieldBinding {
            controller: self.clone(),
            name: name.into(),
            label: None,
            required: None,
            rules: Vec::new(),
            initial_value: None,
            value_prop: ValueProp::Value,
            validate_mode: None,
        }
    }
}

impl FieldBinding {
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    pub fn rules(mut self, rules: impl IntoIterator<Item = impl Into<Rule>>) -> Self {
        self.rules = rules.into_iter().map(Into::into).collect();
        self
    }

    pub fn rule(mut self, rule: impl Into<Rule>) -> Self {
        self.rules.push(rule.into());
        self
    }

    pub fn initial_value(mut self, value: impl Into<FieldValue>) -> Self {
        self.initial_value = Some(value.into());
        self
    }

    pub fn value_prop(mut self, value_prop: ValueProp) -> Self {
        self.value_prop = value_prop;
        self
    }

    pub fn validate_mode(mut self, mode: ValidationMode) -> Self {
        self.validate_mode = Some(mode);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers the field unless a record for it already exists.
    pub fn mount(&self) -> FormResult<()> {
        let mut record = FieldRecord::new(self.name.clone(), self.initial());
        record.label = self.label.clone();
        record.rules = self.rules.clone();
        self.controller.add_field(self.name.clone(), record)
    }

    pub fn value(&self) -> FormResult<FieldValue> {
        Ok(self
            .controller
            .get_field_value(&self.name)?
            .unwrap_or_else(|| self.initial()))
    }

    pub fn on_change(&self, value: impl Into<FieldValue>) -> FormResult<()> {
        self.controller.update_value(self.name.clone(), value)
    }

    pub async fn on_change_async(&self, value: impl Into<FieldValue>) -> FormResult<()> {
        self.on_change(value)?;
        if self.effective_mode() == ValidationMode::OnChange {
            self.controller.validate_field(&self.name).await?;
        }
        Ok(())
    }

    pub async fn on_blur(&self) -> FormResult<()> {
        if self.effective_mode() == ValidationMode::OnBlur {
            self.controller.validate_field(&self.name).await?;
        }
        Ok(())
    }

    pub fn errors(&self) -> FormResult<Vec<ValidationError>> {
        Ok(self
            .controller
            .field(&self.name)?
            .map(|record| record.errors)
            .unwrap_or_default())
    }

    pub fn has_error(&self) -> FormResult<bool> {
        Ok(!self.errors()?.is_empty())
    }

    /// The explicit flag wins; otherwise any static rule marked required
    /// makes the field required. Dynamic rules are not consulted.
    pub fn is_required(&self) -> bool {
        self.required.unwrap_or_else(|| {
            self.rules
                .iter()
                .filter_map(Rule::as_static)
                .any(|item| item.required)
        })
    }

    pub fn presentation(&self) -> FormResult<FieldPresentation> {
        Ok(FieldPresentation {
            name: self.name.clone(),
            label: self.label.clone(),
            value: self.value()?,
            required: self.is_required(),
            errors: self.errors()?,
        })
    }

    fn effective_mode(&self) -> ValidationMode {
        self.validate_mode
            .unwrap_or(self.controller.options.validate_mode)
    }

    fn initial(&self) -> FieldValue {
        self.initial_value
            .clone()
            .or_else(|| self.controller.initial_values.get(&self.name).cloned())
            .unwrap_or_else(|| self.value_prop.empty_value())
    }
}
