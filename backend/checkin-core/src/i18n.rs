// src/i18n.rs

use crate::api_client::value_to_string;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{error, info};

pub const DEFAULT_LANGUAGE: &str = "en-US";
pub const SUPPORTED_LANGUAGES: [&str; 7] = ["zh-TW", "en-US", "ja", "vi", "id", "ko", "th"];

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("placeholder pattern is valid"));

/// Maps a locale string such as `zh_TW.UTF-8` or `ja-JP` to a supported language.
pub fn detect_language(locale: Option<&str>) -> &'static str {
    let Some(locale) = locale else {
        return DEFAULT_LANGUAGE;
    };
    let lower = locale.trim().to_lowercase();
    if lower.starts_with("zh") {
        "zh-TW"
    } else if lower.starts_with("ja") {
        "ja"
    } else if lower.starts_with("vi") {
        "vi"
    } else if lower.starts_with("id") {
        "id"
    } else if lower.starts_with("ko") {
        "ko"
    } else if lower.starts_with("th") {
        "th"
    } else {
        DEFAULT_LANGUAGE
    }
}

pub fn is_supported_language(lang: &str) -> bool {
    SUPPORTED_LANGUAGES.contains(&lang)
}

pub fn translation_url(base_url: &str, lang: &str) -> String {
    format!("{}/i18n/{}.json", base_url.trim_end_matches('/'), lang)
}

/// A loaded translation table. Unknown keys render as the key itself.
#[derive(Debug, Clone, Default)]
pub struct Translations {
    lang: String,
    table: HashMap<String, String>,
}

impl Translations {
    pub fn new(lang: impl Into<String>, table: HashMap<String, String>) -> Self {
        Self {
            lang: lang.into(),
            table,
        }
    }

    /// Reads a flat JSON object; non-string values are stringified.
    pub fn from_json(lang: impl Into<String>, value: &Value) -> Self {
        let table = match value {
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| (k.clone(), value_to_string(v)))
                .collect(),
            _ => HashMap::new(),
        };
        Self::new(lang, table)
    }

    /// Fetches `{base}/i18n/{lang}.json`. On failure the error is logged and
    /// `previous` is kept.
    pub async fn load(http: &Client, base_url: &str, lang: &str, previous: Translations) -> Self {
        let url = translation_url(base_url, lang);
        info!("Loading translations for '{}' from {}", lang, url);

        let result = async {
            let response = http.get(&url).send().await?.error_for_status()?;
            response.json::<Value>().await
        }
        .await;

        match result {
            Ok(value) => {
                let translations = Self::from_json(lang, &value);
                info!(
                    "Loaded {} translation entries for '{}'",
                    translations.table.len(),
                    lang
                );
                translations
            }
            Err(e) => {
                error!("Failed to load translations for '{}': {}", lang, e);
                previous
            }
        }
    }

    pub fn lang(&self) -> &str {
        &self.lang
    }

    pub fn contains(&self, key: &str) -> bool {
        self.table.contains_key(key)
    }

    /// Empty entries count as missing.
    fn lookup(&self, key: &str) -> Option<&String> {
        self.table.get(key).filter(|text| !text.is_empty())
    }

    pub fn t(&self, key: &str) -> String {
        self.lookup(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }

    /// Like [`t`](Self::t) but with a fallback for keys missing from the table.
    pub fn t_or(&self, key: &str, fallback: &str) -> String {
        self.lookup(key)
            .cloned()
            .unwrap_or_else(|| fallback.to_string())
    }

    /// Substitutes `{name}` placeholders. A parameter value that is itself
    /// a translation key is translated first.
    pub fn t_with(&self, key: &str, params: &HashMap<String, String>) -> String {
        let template = self.t(key);
        if params.is_empty() {
            return template;
        }
        PLACEHOLDER
            .replace_all(&template, |caps: &regex::Captures| {
                let name = &caps[1];
                match params.get(name) {
                    Some(value) => self.t(value),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    /// Convenience for call sites with literal parameters.
    pub fn t_params(&self, key: &str, params: &[(&str, String)]) -> String {
        let map: HashMap<String, String> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        self.t_with(key, &map)
    }
}
