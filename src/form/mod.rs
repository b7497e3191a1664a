mod binding;
mod controller;
mod rule;
mod schema;
mod store;
mod validation;
mod value;


pub use binding::{FieldBinding, FieldPresentation, ValueProp};
pub use calmform_derive::FormModel;
pub use controller::{
    FormController, FormError, FormId, FormOptions, FormResult, FormState, FormValidation,
    SubmitOutcome, ValidationMode,
};
pub use rule::{
    AsyncRuleValidatorFn, CompiledRule, DynamicRuleFn, FieldReader, Rule, RuleError, RuleItem,
    RuleType, SyncRuleValidatorFn, TransformFn, compile, matches_field,
};
pub use schema::{
    Descriptor, FieldDescriptor, RuleSchema, SchemaFailure, SchemaOptions, SchemaOutcome,
    SchemaRejection, SchemaValidator,
};
pub use store::{
    FieldAction, FieldActionKind, FieldErrors, FieldRecord, FieldStore, FieldValidity, Fields,
    FormEvent, SubscriptionId, ValidationError, reduce,
};
pub use value::{FieldValue, FieldValues, FormModel, FromFieldValue, field_from_values};
