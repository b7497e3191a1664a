use calmform::form::{FieldValue, FormModel};

#[derive(Clone, calmform::form::FormModel)]
struct SignupForm {
    email: String,
    nickname: Option<String>,
    agree: bool,
    age: u32,
}

fn main() {
    assert_eq!(
        SignupForm::field_names(),
        &["email", "nickname", "agree", "age"]
    );

    let model = SignupForm {
        email: "a@calm.form".to_string(),
        nickname: None,
        agree: true,
        age: 30,
    };
    let values = model.to_values();
    assert_eq!(values.get("email"), Some(&FieldValue::from("a@calm.form")));
    assert_eq!(values.get("nickname"), Some(&FieldValue::Null));

    let restored = SignupForm::from_values(&values).expect("model should round-trip");
    assert_eq!(restored.email, "a@calm.form");
    assert!(restored.agree);
    assert_eq!(restored.age, 30);
}
