use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde::Serialize;

use super::schema::{RuleSchema, SchemaOptions, SchemaValidator};
use super::store::{
    FieldErrors, FieldRecord, FieldStore, Fields, FormEvent, Listeners, SubscriptionId,
};
use super::value::{FieldValue, FieldValues, FormModel};
use crate::i18n::{Locale, ValidateMessages};

static FORM_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FormId(pub u64);

impl FormId {
    pub fn next() -> Self {
        Self(FORM_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

impl Display for FormId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "form#{}", self.0)
    }
}

/// When a bound field validates itself.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ValidationMode {
    OnChange,
    #[default]
    OnBlur,
    OnSubmit,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FormOptions {
    pub validate_mode: ValidationMode,
    pub validate_first_error_only: bool,
    /// Upper bound for one schema run. `None` waits for as long as the
    /// validators take.
    pub validation_timeout: Option<Duration>,
    pub locale: Locale,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            validate_mode: ValidationMode::OnBlur,
            validate_first_error_only: false,
            validation_timeout: None,
            locale: Locale::System,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FormState {
    pub is_valid: bool,
    pub is_submitting: bool,
    /// Filled by whole-form passes only.
    pub errors: FieldErrors,
    pub submit_count: u32,
}

impl Default for FormState {
    fn default() -> Self {
        Self {
            is_valid: true,
            is_submitting: false,
            errors: FieldErrors::new(),
            submit_count: 0,
        }
    }
}

/// Result of one whole-form pass together with the values it checked.
#[derive(Clone, Debug, PartialEq)]
pub struct FormValidation {
    pub is_valid: bool,
    pub errors: FieldErrors,
    pub values: FieldValues,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmitOutcome {
    Finished,
    FinishFailed,
}

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FormError {
    #[error("form state lock poisoned while {0}")]
    StatePoisoned(&'static str),
    #[error("form submit is already in progress")]
    AlreadySubmitting,
    #[error("field `{0}` has no value")]
    MissingField(String),
    #[error("field `{field}` expected {expected}, found {found}")]
    FieldTypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

pub type FormResult<T> = Result<T, FormError>;

#[derive(Clone)]
pub struct FormController {
    pub(super) id: FormId,
    pub(super) options: FormOptions,
    pub(super) initial_values: Arc<FieldValues>,
    pub(super) store: FieldStore,
    pub(super) state: Arc<RwLock<FormState>>,
    pub(super) schema: Arc<dyn SchemaValidator>,
    pub(super) messages: ValidateMessages,
}

impl FormController {
    pub fn new(initial_values: FieldValues, options: FormOptions) -> Self {
        let messages = ValidateMessages::new(&options.locale);
        let schema = RuleSchema::new(
            messages.clone(),
            SchemaOptions {
                first_error_only: options.validate_first_error_only,
            },
        );
        let id = FormId::next();
        log::debug!("{id} created with {} initial values", initial_values.len());
        Self {
            id,
            options,
            initial_values: Arc::new(initial_values),
            store: FieldStore::new(),
            state: Arc::new(RwLock::new(FormState::default())),
            schema: Arc::new(schema),
            messages,
        }
    }

    pub fn from_model<M: FormModel>(model: &M, options: FormOptions) -> Self {
        Self::new(model.to_values(), options)
    }

    /// Replaces the facility that checks descriptors. Every pass after this
    /// call goes through `schema`.
    pub fn with_schema(mut self, schema: impl SchemaValidator) -> Self {
        self.schema = Arc::new(schema);
        self
    }

    pub fn id(&self) -> FormId {
        self.id
    }

    pub fn options(&self) -> &FormOptions {
        &self.options
    }

    pub fn messages(&self) -> &ValidateMessages {
        &self.messages
    }

    pub fn initial_values(&self) -> &FieldValues {
        &self.initial_values
    }

    pub fn store(&self) -> &FieldStore {
        &self.store
    }

    pub fn add_field(&self, name: impl Into<String>, record: FieldRecord) -> FormResult<()> {
        let name = name.into();
        log::debug!("{} registering field {name}", self.id);
        self.store.add_field(name, record)
    }

    pub fn update_value(
        &self,
        name: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> FormResult<()> {
        self.store.update_value(name, value)
    }

    /// Writes a value from outside the field's own input. Unregistered names
    /// are ignored.
    pub fn set_field_value(
        &self,
        name: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> FormResult<()> {
        self.update_value(name, value)
    }

    pub fn get_field_value(&self, name: &str) -> FormResult<Option<FieldValue>> {
        self.store.get_field_value(name)
    }

    pub fn get_fields_value(&self) -> FormResult<FieldValues> {
        self.store.get_all_values()
    }

    pub fn get_fields_value_as<M: FormModel>(&self) -> FormResult<M> {
        M::from_values(&self.get_fields_value()?)
    }

    pub fn reset_fields(&self, initial_values: &FieldValues) -> FormResult<()> {
        self.store.reset_fields(initial_values)
    }

    /// Puts every registered field back to the value the form was created
    /// with.
    pub fn reset_to_initial(&self) -> FormResult<()> {
        self.store.reset_fields(&self.initial_values)
    }

    pub fn field(&self, name: &str) -> FormResult<Option<FieldRecord>> {
        self.store.field(name)
    }

    pub fn fields(&self) -> FormResult<Fields> {
        self.store.snapshot()
    }

    pub fn form_state(&self) -> FormResult<FormState> {
        Ok(read_lock(&self.state, "reading form state")?.clone())
    }

    pub fn is_submitting(&self) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading submitting flag")?.is_submitting)
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&FormEvent) + Send + Sync + 'static,
    ) -> FormResult<SubscriptionId> {
        self.store.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> FormResult<bool> {
        self.store.unsubscribe(id)
    }

    /// Validates every field and hands the result to exactly one of the two
    /// callbacks. A submission that overlaps a running pass is refused with
    /// [`FormError::AlreadySubmitting`] and fires neither.
    pub async fn submit_form<S, F>(
        &self,
        on_finish: S,
        on_finish_failed: F,
    ) -> FormResult<SubmitOutcome>
    where
        S: FnOnce(FieldValues),
        F: FnOnce(FieldValues, FieldErrors),
    {
        let FormValidation {
            is_valid,
            errors,
            values,
        } = self.validate_all_fields().await?;

        {
            let mut state = write_lock(&self.state, "counting submit")?;
            state.submit_count = state.submit_count.saturating_add(1);
        }

        if is_valid {
            log::debug!("{} submit finished", self.id);
            on_finish(values);
            Ok(SubmitOutcome::Finished)
        } else {
            log::debug!("{} submit failed on {} fields", self.id, errors.len());
            on_finish_failed(values, errors);
            Ok(SubmitOutcome::FinishFailed)
        }
    }

    /// Raises the submitting flag, or refuses when it is already up. The
    /// returned guard lowers it again when dropped.
    pub(super) fn begin_submitting(&self) -> FormResult<SubmittingGuard> {
        {
            let mut state = write_lock(&self.state, "starting whole-form validation")?;
            if state.is_submitting {
                log::warn!("{} rejected overlapping submission", self.id);
                return Err(FormError::AlreadySubmitting);
            }
            state.is_submitting = true;
        }
        let guard = SubmittingGuard {
            state: self.state.clone(),
            listeners: self.store.listeners.clone(),
        };
        self.store.listeners.notify(&FormEvent::FormState)?;
        Ok(guard)
    }
}

pub(super) struct SubmittingGuard {
    state: Arc<RwLock<FormState>>,
    listeners: Listeners,
}

impl SubmittingGuard {
    /// Stores the pass result and lowers the flag in one write.
    pub(super) fn finish(self, is_valid: bool, errors: FieldErrors) -> FormResult<()> {
        {
            let mut state = write_lock(&self.state, "finishing whole-form validation")?;
            state.is_valid = is_valid;
            state.errors = errors;
            state.is_submitting = false;
        }
        // Drop notifies.
        Ok(())
    }
}

impl Drop for SubmittingGuard {
    fn drop(&mut self) {
        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.is_submitting = false;
        drop(state);
        if let Err(error) = self.listeners.notify(&FormEvent::FormState) {
            log::warn!("failed to notify listeners after validation: {error}");
        }
    }
}

pub(crate) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(crate) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}
