use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Literal token replaced by the current candidate word.
pub const PLACEHOLDER: &str = "FUZZ";

/// Request-options template supplied through `-o/--opts` as JSON. Substitutable
/// string fields are `method`, header values, and `body`; `proxy` and `verbose`
/// ride along untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RequestOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,
}

impl RequestOptions {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Whether the serialized options payload carries the placeholder token.
    pub fn contains_placeholder(&self) -> bool {
        serde_json::to_string(self)
            .map(|raw| raw.contains(PLACEHOLDER))
            .unwrap_or(false)
    }
}

pub fn substitute(template: &str, word: &str) -> String {
    template.replace(PLACEHOLDER, word)
}

/// Resolves the options template for one candidate word. Pure: the template is
/// never mutated, retries resolve again from the same template.
pub fn resolve(template: &RequestOptions, word: &str) -> RequestOptions {
    RequestOptions {
        method: template.method.as_deref().map(|m| substitute(m, word)),
        headers: template
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), substitute(value, word)))
            .collect(),
        body: template.body.as_deref().map(|b| substitute(b, word)),
        proxy: template.proxy.clone(),
        verbose: template.verbose,
    }
}

/// A fresh random IPv4-looking value, one per attempt.
pub fn random_spoof_ip() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "{}.{}.{}.{}",
        rng.gen_range(0..=255u8),
        rng.gen_range(0..=255u8),
        rng.gen_range(0..=255u8),
        rng.gen_range(0..=255u8),
    )
}
