pub use crate::form::{
    FieldBinding, FieldPresentation, FieldRecord, FieldReader, FieldValue, FieldValues,
    FormController, FormError, FormModel, FormOptions, FormResult, FormState, Rule, RuleError,
    RuleItem, RuleType, SubmitOutcome, ValidationError, ValidationMode, ValueProp, matches_field,
};
pub use crate::i18n::{Locale, ValidateMessages};
