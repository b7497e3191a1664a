use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::controller::{FormResult, read_lock, write_lock};
use super::rule::Rule;
use super::value::{FieldValue, FieldValues};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Field name to error list, as produced by a whole-form pass.
pub type FieldErrors = IndexMap<String, Vec<ValidationError>>;

#[derive(Clone, Debug)]
pub struct FieldRecord {
    pub name: String,
    pub label: Option<String>,
    pub value: FieldValue,
    pub rules: Vec<Rule>,
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
}

impl FieldRecord {
    pub fn new(name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            name: name.into(),
            label: None,
            value: value.into(),
            rules: Vec::new(),
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
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
}

/// Outcome of validating one field.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FieldValidity {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
}

impl FieldValidity {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    /// Validity follows the error list: any error makes the field invalid.
    pub fn from_errors(errors: Vec<ValidationError>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

pub type Fields = IndexMap<String, FieldRecord>;

#[derive(Clone, Debug)]
pub enum FieldAction {
    AddField { name: String, record: FieldRecord },
    UpdateValue { name: String, value: FieldValue },
    UpdateValidationResult { name: String, result: FieldValidity },
}

impl FieldAction {
    pub fn name(&self) -> &str {
        match self {
            FieldAction::AddField { name, .. }
            | FieldAction::UpdateValue { name, .. }
            | FieldAction::UpdateValidationResult { name, .. } => name,
        }
    }

    pub fn kind(&self) -> FieldActionKind {
        match self {
            FieldAction::AddField { .. } => FieldActionKind::AddField,
            FieldAction::UpdateValue { .. } => FieldActionKind::UpdateValue,
            FieldAction::UpdateValidationResult { .. } => FieldActionKind::UpdateValidationResult,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldActionKind {
    AddField,
    UpdateValue,
    UpdateValidationResult,
}

/// Applies one action to the registry. Adding an existing name and updating
/// an unknown one leave the registry as it was.
pub fn reduce(mut fields: Fields, action: FieldAction) -> Fields {
    match action {
        FieldAction::AddField { name, mut record } => {
            if !fields.contains_key(&name) {
                record.name = name.clone();
                fields.insert(name, record);
            }
        }
        FieldAction::UpdateValue { name, value } => {
            if let Some(record) = fields.get_mut(&name) {
                record.value = value;
            }
        }
        FieldAction::UpdateValidationResult { name, result } => {
            if let Some(record) = fields.get_mut(&name) {
                record.is_valid = result.is_valid;
                record.errors = result.errors;
            }
        }
    }
    fields
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FormEvent {
    Field { name: String, kind: FieldActionKind },
    FormState,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SubscriptionId(u64);

pub(super) type Listener = Arc<dyn Fn(&FormEvent) + Send + Sync>;

#[derive(Clone, Default)]
pub(super) struct Listeners {
    next_id: Arc<AtomicU64>,
    pub(super) entries: Arc<RwLock<Vec<(SubscriptionId, Listener)>>>,
}

impl Listeners {
    pub(super) fn subscribe(&self, listener: Listener) -> FormResult<SubscriptionId> {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        write_lock(&self.entries, "registering form listener")?.push((id, listener));
        Ok(id)
    }

    pub(super) fn unsubscribe(&self, id: SubscriptionId) -> FormResult<bool> {
        let mut entries = write_lock(&self.entries, "removing form listener")?;
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        Ok(entries.len() != before)
    }

    /// Listeners run after the registry lock is released, so they may read
    /// the store again.
    pub(super) fn notify(&self, event: &FormEvent) -> FormResult<()> {
        let listeners = read_lock(&self.entries, "reading form listeners")?
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect::<Vec<_>>();
        for listener in listeners {
            listener(event);
        }
        Ok(())
    }
}

/// Owner of every [`FieldRecord`] of one form. Mutation only happens through
/// [`FieldStore::dispatch`]; readers get clones.
#[derive(Clone, Default)]
pub struct FieldStore {
    fields: Arc<RwLock<Fields>>,
    pub(super) listeners: Listeners,
}

impl FieldStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatch(&self, action: FieldAction) -> FormResult<()> {
        let event = FormEvent::Field {
            name: action.name().to_string(),
            kind: action.kind(),
        };
        {
            let mut fields = write_lock(&self.fields, "dispatching field action")?;
            log::trace!("dispatch {:?} for field {}", action.kind(), action.name());
            let current = std::mem::take(&mut *fields);
            *fields = reduce(current, action);
        }
        self.listeners.notify(&event)
    }

    pub fn add_field(&self, name: impl Into<String>, record: FieldRecord) -> FormResult<()> {
        let name = name.into();
        if self.contains(&name)? {
            return Ok(());
        }
        self.dispatch(FieldAction::AddField { name, record })
    }

    pub fn update_value(&self, name: impl Into<String>, value: impl Into<FieldValue>) -> FormResult<()> {
        let name = name.into();
        if !self.contains(&name)? {
            return Ok(());
        }
        self.dispatch(FieldAction::UpdateValue {
            name,
            value: value.into(),
        })
    }

    pub fn update_validation_result(
        &self,
        name: impl Into<String>,
        result: FieldValidity,
    ) -> FormResult<()> {
        let name = name.into();
        if !self.contains(&name)? {
            return Ok(());
        }
        self.dispatch(FieldAction::UpdateValidationResult { name, result })
    }

    pub fn contains(&self, name: &str) -> FormResult<bool> {
        Ok(read_lock(&self.fields, "checking field registration")?.contains_key(name))
    }

    pub fn get_field_value(&self, name: &str) -> FormResult<Option<FieldValue>> {
        Ok(read_lock(&self.fields, "reading field value")?
            .get(name)
            .map(|record| record.value.clone()))
    }

    pub fn get_all_values(&self) -> FormResult<FieldValues> {
        Ok(values_of(&*read_lock(&self.fields, "reading all field values")?))
    }

    pub fn field(&self, name: &str) -> FormResult<Option<FieldRecord>> {
        Ok(read_lock(&self.fields, "reading field record")?
            .get(name)
            .cloned())
    }

    pub fn snapshot(&self) -> FormResult<Fields> {
        Ok(read_lock(&self.fields, "creating field snapshot")?.clone())
    }

    /// Puts every registered field named in `initial_values` back to its
    /// initial value. Other fields are left alone.
    pub fn reset_fields(&self, initial_values: &FieldValues) -> FormResult<()> {
        for (name, value) in initial_values {
            if self.contains(name)? {
                self.dispatch(FieldAction::UpdateValue {
                    name: name.clone(),
                    value: value.clone(),
                })?;
            }
        }
        Ok(())
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&FormEvent) + Send + Sync + 'static,
    ) -> FormResult<SubscriptionId> {
        self.listeners.subscribe(Arc::new(listener))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> FormResult<bool> {
        self.listeners.unsubscribe(id)
    }
}

pub(super) fn values_of(fields: &Fields) -> FieldValues {
    fields
        .iter()
        .map(|(name, record)| (name.clone(), record.value.clone()))
        .collect()
}
