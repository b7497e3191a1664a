use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

const DEFAULT_LOCALE: &str = "en-US";

const EN_US: &[(&str, &str)] = &[
    ("default", "Validation error on field {field}"),
    ("required", "{field} is required"),
    ("enum", "{field} must be one of {values}"),
    ("whitespace", "{field} cannot be empty"),
    ("unresolved", "{field} has a rule that could not be resolved: {reason}"),
    ("timeout", "Validation of {field} timed out"),
    ("fault", "Validation of {field} failed: {reason}"),
    ("types.invalid", "{field} is not a valid {type}"),
    ("string.len", "{field} must be exactly {len} characters"),
    ("string.min", "{field} must be at least {min} characters"),
    ("string.max", "{field} cannot be longer than {max} characters"),
    ("string.range", "{field} must be between {min} and {max} characters"),
    ("number.len", "{field} must equal {len}"),
    ("number.min", "{field} cannot be less than {min}"),
    ("number.max", "{field} cannot be greater than {max}"),
    ("number.range", "{field} must be between {min} and {max}"),
    ("array.len", "{field} must be exactly {len} in length"),
    ("array.min", "{field} cannot be less than {min} in length"),
    ("array.max", "{field} cannot be greater than {max} in length"),
    ("array.range", "{field} must be between {min} and {max} in length"),
    ("pattern.mismatch", "{field} value {value} does not match pattern {pattern}"),
];

const ZH_CN: &[(&str, &str)] = &[
    ("default", "字段 {field} 校验失败"),
    ("required", "{field} 为必填项"),
    ("enum", "{field} 必须是 {values} 之一"),
    ("whitespace", "{field} 不能为空"),
    ("unresolved", "{field} 的校验规则无法解析：{reason}"),
    ("timeout", "{field} 校验超时"),
    ("fault", "{field} 校验出错：{reason}"),
    ("types.invalid", "{field} 不是有效的 {type}"),
    ("string.len", "{field} 必须为 {len} 个字符"),
    ("string.min", "{field} 至少为 {min} 个字符"),
    ("string.max", "{field} 最多为 {max} 个字符"),
    ("string.range", "{field} 必须在 {min} 到 {max} 个字符之间"),
    ("number.len", "{field} 必须等于 {len}"),
    ("number.min", "{field} 不能小于 {min}"),
    ("number.max", "{field} 不能大于 {max}"),
    ("number.range", "{field} 必须在 {min} 到 {max} 之间"),
    ("array.len", "{field} 的长度必须为 {len}"),
    ("array.min", "{field} 的长度不能小于 {min}"),
    ("array.max", "{field} 的长度不能大于 {max}"),
    ("array.range", "{field} 的长度必须在 {min} 到 {max} 之间"),
    ("pattern.mismatch", "{field} 的值 {value} 不匹配格式 {pattern}"),
];

const LOCALES: &[(&str, &[(&str, &str)])] = &[("en-US", EN_US), ("zh-CN", ZH_CN)];

static CATALOG: LazyLock<MessageCatalog> = LazyLock::new(MessageCatalog::load);

#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub enum Locale {
    #[default]
    System,
    Tag(String),
}

impl From<String> for Locale {
    fn from(value: String) -> Self {
        if value.trim().eq_ignore_ascii_case("system") {
            return Self::System;
        }
        Self::Tag(value.trim().to_string())
    }
}

impl From<&str> for Locale {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

/// Validation message templates for one resolved locale, plus any per-key
/// overrides supplied by the caller.
#[derive(Clone, Debug)]
pub struct ValidateMessages {
    locale: &'static str,
    overrides: Arc<HashMap<String, String>>,
}

impl Default for ValidateMessages {
    fn default() -> Self {
        Self::new(&Locale::System)
    }
}

impl ValidateMessages {
    pub fn new(locale: &Locale) -> Self {
        Self {
            locale: CATALOG.resolve_locale(requested_locale(locale).as_deref()),
            overrides: Arc::new(HashMap::new()),
        }
    }

    pub fn resolved_locale(&self) -> &'static str {
        self.locale
    }

    pub fn with_override(mut self, key: impl Into<String>, template: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.overrides).insert(key.into(), template.into());
        self
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    pub fn t(&self, key: &str) -> String {
        self.lookup(key).unwrap_or(key).to_string()
    }

    pub fn t_with(&self, key: &str, params: &[(&str, &str)]) -> String {
        let raw = self.lookup(key).unwrap_or(key);
        if params.is_empty() {
            return raw.to_string();
        }
        format_template(raw, params)
    }

    fn lookup(&self, key: &str) -> Option<&str> {
        if let Some(template) = self.overrides.get(key) {
            return Some(template);
        }
        CATALOG
            .lookup(self.locale, key)
            .or_else(|| CATALOG.lookup(DEFAULT_LOCALE, key))
    }
}

#[cfg(feature = "i18n")]
fn requested_locale(locale: &Locale) -> Option<String> {
    match locale {
        Locale::System => sys_locale::get_locale(),
        Locale::Tag(tag) => Some(tag.clone()),
    }
}

#[cfg(not(feature = "i18n"))]
fn requested_locale(locale: &Locale) -> Option<String> {
    match locale {
        Locale::System => None,
        Locale::Tag(tag) => Some(tag.clone()),
    }
}

struct MessageCatalog {
    locales: HashMap<&'static str, HashMap<&'static str, &'static str>>,
    normalized_locale_lookup: HashMap<String, &'static str>,
    language_lookup: HashMap<String, &'static str>,
}

impl MessageCatalog {
    fn load() -> Self {
        let mut locales = HashMap::new();
        let mut normalized_locale_lookup = HashMap::new();
        let mut language_lookup = HashMap::new();

        for (locale, entries) in LOCALES.iter().copied() {
            let normalized = normalize_locale_tag(locale);
            normalized_locale_lookup.insert(normalized.clone(), locale);

            let language = normalized.split('-').next().unwrap_or_default().to_string();
            language_lookup.entry(language).or_insert(locale);

            locales.insert(locale, entries.iter().copied().collect::<HashMap<_, _>>());
        }

        Self {
            locales,
            normalized_locale_lookup,
            language_lookup,
        }
    }

    fn resolve_locale(&self, requested: Option<&str>) -> &'static str {
        let Some(requested) = requested else {
            return DEFAULT_LOCALE;
        };

        let normalized = normalize_locale_tag(requested);
        if let Some(locale) = self.normalized_locale_lookup.get(&normalized) {
            return locale;
        }

        let language = normalized.split('-').next().unwrap_or_default();
        if let Some(locale) = self.language_lookup.get(language) {
            return locale;
        }

        DEFAULT_LOCALE
    }

    fn lookup(&self, locale: &str, key: &str) -> Option<&'static str> {
        self.locales
            .get(locale)
            .and_then(|entries| entries.get(key).copied())
    }
}

fn normalize_locale_tag(tag: &str) -> String {
    let trimmed = tag.trim();
    let without_encoding = trimmed.split('.').next().unwrap_or(trimmed);
    let without_variant = without_encoding
        .split('@')
        .next()
        .unwrap_or(without_encoding);
    without_variant
        .replace('_', "-")
        .split('-')
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

/// Fills `{name}` placeholders from `params`. Unknown placeholders and an
/// unterminated `{` are kept as written.
fn format_template(template: &str, params: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            output.push_str(&rest[open..]);
            return output;
        };

        let token = &after[..close];
        match params.iter().find(|(key, _)| *key == token) {
            Some((_, value)) => output.push_str(value),
            None => output.push_str(&rest[open..open + close + 2]),
        }
        rest = &after[close + 1..];
    }

    output.push_str(rest);
    output
}
