use futures::future::{self, Either};
use futures_timer::Delay;

use super::controller::{FormController, FormResult, FormValidation, write_lock};
use super::rule::{FieldReader, compile};
use super::schema::{Descriptor, FieldDescriptor, SchemaFailure, SchemaOutcome, SchemaRejection};
use super::store::{
    FieldErrors, FieldRecord, FieldValidity, Fields, FormEvent, ValidationError, values_of,
};
use super::value::FieldValues;

impl FormController {
    /// Checks one field against the live registry and records the outcome.
    /// Failures land on the field record. They are never returned as `Err`.
    pub async fn validate_field(&self, name: &str) -> FormResult<()> {
        let fields = self.store.snapshot()?;
        let Some(record) = fields.get(name) else {
            log::trace!("{} skipped validation of unknown field {name}", self.id);
            return Ok(());
        };

        let reader = FieldReader::new(values_of(&fields));
        let mut descriptor = Descriptor::new();
        descriptor.insert(name.to_string(), describe(record, &reader));
        let mut values = FieldValues::new();
        values.insert(name.to_string(), record.value.clone());

        let errors = match self.run_schema(descriptor, values).await {
            Ok(()) => Vec::new(),
            Err(SchemaFailure::Rejected(rejection)) => {
                self.rejected_errors(name, record, rejection)
            }
            Err(failure) => vec![self.failure_error(name, record, &failure)],
        };

        log::debug!(
            "{} validated field {name}: {} errors",
            self.id,
            errors.len()
        );
        self.store
            .update_validation_result(name, FieldValidity::from_errors(errors))
    }

    /// Runs one pass over every registered field and records the outcome on
    /// each field with rules and on the form state. Fields without rules keep
    /// whatever validity they had.
    pub async fn validate_all_fields(&self) -> FormResult<FormValidation> {
        let guard = self.begin_submitting()?;

        let fields = self.store.snapshot()?;
        let values = values_of(&fields);
        let reader = FieldReader::new(values.clone());
        let descriptor = fields
            .iter()
            .map(|(name, record)| (name.clone(), describe(record, &reader)))
            .collect::<Descriptor>();
        log::debug!("{} validating {} fields", self.id, descriptor.len());

        let (errors, passed) = match self.run_schema(descriptor, values.clone()).await {
            Ok(()) => (FieldErrors::new(), true),
            Err(SchemaFailure::Rejected(rejection)) => {
                (self.rejected_field_errors(&fields, rejection), false)
            }
            Err(failure) => (self.failure_errors(&fields, &failure), false),
        };
        let errors = errors
            .into_iter()
            .filter(|(_, errors)| !errors.is_empty())
            .collect::<FieldErrors>();

        for (name, record) in &fields {
            match errors.get(name) {
                Some(field_errors) => self.store.update_validation_result(
                    name.as_str(),
                    FieldValidity::from_errors(field_errors.clone()),
                )?,
                None if !record.rules.is_empty() => self
                    .store
                    .update_validation_result(name.as_str(), FieldValidity::valid())?,
                None => {}
            }
        }

        let is_valid = passed && errors.is_empty();
        log::debug!(
            "{} validation finished: valid={is_valid}, {} failing fields",
            self.id,
            errors.len()
        );
        guard.finish(is_valid, errors.clone())?;

        Ok(FormValidation {
            is_valid,
            errors,
            values,
        })
    }

    pub fn clear_errors(&self) -> FormResult<()> {
        for (name, record) in self.store.snapshot()? {
            if !record.is_valid {
                self.store
                    .update_validation_result(name, FieldValidity::valid())?;
            }
        }
        let mut state = write_lock(&self.state, "clearing form errors")?;
        state.errors.clear();
        state.is_valid = true;
        drop(state);
        self.store.listeners.notify(&FormEvent::FormState)
    }

    async fn run_schema(&self, descriptor: Descriptor, values: FieldValues) -> SchemaOutcome {
        let validation = self.schema.validate(descriptor, values);
        let Some(timeout) = self.options.validation_timeout else {
            return validation.await;
        };

        match future::select(validation, Delay::new(timeout)).await {
            Either::Left((outcome, _)) => outcome,
            Either::Right(((), _)) => Err(SchemaFailure::TimedOut(timeout)),
        }
    }

    fn rejected_errors(
        &self,
        name: &str,
        record: &FieldRecord,
        rejection: SchemaRejection,
    ) -> Vec<ValidationError> {
        let SchemaRejection { errors, mut fields } = rejection;
        let errors = match fields.swap_remove(name) {
            Some(field_errors) if !field_errors.is_empty() => field_errors,
            _ => errors,
        };
        if errors.is_empty() {
            let display = record.label.as_deref().unwrap_or(name);
            return vec![ValidationError::new(
                name,
                self.messages.t_with("default", &[("field", display)]),
            )];
        }
        errors
    }

    /// Errors of a rejected whole-form pass, grouped by field. A rejection
    /// that names no failing field lands on every field with rules.
    fn rejected_field_errors(&self, fields: &Fields, rejection: SchemaRejection) -> FieldErrors {
        let SchemaRejection {
            errors,
            fields: by_field,
        } = rejection;
        let by_field = by_field
            .into_iter()
            .filter(|(_, field_errors)| !field_errors.is_empty())
            .collect::<FieldErrors>();
        if !by_field.is_empty() {
            return by_field;
        }

        log::warn!("{} schema rejected the form without naming a field", self.id);
        fields
            .iter()
            .filter(|(_, record)| !record.rules.is_empty())
            .map(|(name, record)| {
                let field_errors = if errors.is_empty() {
                    let display = record.label.as_deref().unwrap_or(name);
                    vec![ValidationError::new(
                        name.as_str(),
                        self.messages.t_with("default", &[("field", display)]),
                    )]
                } else {
                    errors
                        .iter()
                        .map(|error| ValidationError::new(name.as_str(), error.message()))
                        .collect()
                };
                (name.clone(), field_errors)
            })
            .collect()
    }

    fn failure_errors(&self, fields: &Fields, failure: &SchemaFailure) -> FieldErrors {
        fields
            .iter()
            .filter(|(_, record)| !record.rules.is_empty())
            .map(|(name, record)| {
                (
                    name.clone(),
                    vec![self.failure_error(name, record, failure)],
                )
            })
            .collect()
    }

    fn failure_error(
        &self,
        name: &str,
        record: &FieldRecord,
        failure: &SchemaFailure,
    ) -> ValidationError {
        let display = record.label.as_deref().unwrap_or(name);
        let message = match failure {
            SchemaFailure::TimedOut(timeout) => {
                log::warn!("{} validation of {name} timed out after {timeout:?}", self.id);
                self.messages.t_with("timeout", &[("field", display)])
            }
            SchemaFailure::Fault(reason) => {
                log::warn!("{} validation of {name} faulted: {reason}", self.id);
                self.messages
                    .t_with("fault", &[("field", display), ("reason", reason.as_str())])
            }
            SchemaFailure::Rejected(_) => self.messages.t_with("default", &[("field", display)]),
        };
        ValidationError::new(name, message)
    }
}

fn describe(record: &FieldRecord, reader: &FieldReader) -> FieldDescriptor {
    FieldDescriptor {
        label: record.label.clone(),
        rules: compile(&record.rules, reader),
    }
}
