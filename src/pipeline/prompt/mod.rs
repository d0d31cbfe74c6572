pub mod templates;
pub mod builder;
pub mod intent;

pub use builder::{
    build_messages, build_system_prompt, resolve_language, ApplicationContext, UserProfile,
};
pub use intent::{clarification_question, extract_intent, Intent};

use serde::{Deserialize, Serialize};

/// Supported response languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ru,
    Uz,
}

impl Language {
    /// Parse a language code; unknown codes are `None`.
    pub fn parse(code: &str) -> Option<Self> {
        match code.trim().to_lowercase().as_str() {
            "en" | "english" => Some(Language::En),
            "ru" | "russian" => Some(Language::Ru),
            "uz" | "uzbek" => Some(Language::Uz),
            _ => None,
        }
    }

    /// Parse a language code, defaulting to English.
    pub fn from_code(code: &str) -> Self {
        Self::parse(code).unwrap_or_default()
    }

    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ru => "ru",
            Language::Uz => "uz",
        }
    }

    pub fn base_prompt(&self) -> &'static str {
        match self {
            Language::En => templates::SYSTEM_PROMPT_EN,
            Language::Ru => templates::SYSTEM_PROMPT_RU,
            Language::Uz => templates::SYSTEM_PROMPT_UZ,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_codes_parse() {
        assert_eq!(Language::parse("RU"), Some(Language::Ru));
        assert_eq!(Language::parse("uzbek"), Some(Language::Uz));
        assert_eq!(Language::parse("fr"), None);
        assert_eq!(Language::from_code("fr"), Language::En);
    }

    #[test]
    fn base_prompts_are_localized() {
        assert!(Language::En.base_prompt().starts_with("You are VisaBuddy"));
        assert!(Language::Ru.base_prompt().starts_with("Вы VisaBuddy"));
        assert!(Language::Uz.base_prompt().starts_with("Siz VisaBuddy"));
    }
}
