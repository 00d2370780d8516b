use serde::{Deserialize, Serialize};
use std::fmt;

/// Pricing tier a raw model id is reduced to.
///
/// Anything that names neither "haiku" nor "opus" lands in `Sonnet`. That
/// bucket is an approximation for unknown models, not an exact match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelClass {
    Haiku,
    Sonnet,
    Opus,
}

impl ModelClass {
    pub const ALL: [ModelClass; 3] = [ModelClass::Haiku, ModelClass::Sonnet, ModelClass::Opus];

    pub fn classify(model: &str) -> Self {
        let lower = model.to_lowercase();

        if lower.contains("haiku") {
            ModelClass::Haiku
        } else if lower.contains("opus") {
            ModelClass::Opus
        } else {
            ModelClass::Sonnet
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelClass::Haiku => "haiku",
            ModelClass::Sonnet => "sonnet",
            ModelClass::Opus => "opus",
        }
    }
}

impl fmt::Display for ModelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
