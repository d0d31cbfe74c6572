//! Keyword-based intent detection for incoming chat messages.

use serde::Serialize;

const INTENT_KEYWORDS: &[(&str, &[&str])] = &[
    ("requirements", &["require", "requirement", "need", "document", "what do i need"]),
    ("cost", &["cost", "fee", "price", "how much", "expensive"]),
    ("timeline", &["how long", "time", "days", "weeks", "processing time"]),
    ("application", &["apply", "application", "apply for", "application process"]),
    ("eligibility", &["eligible", "qualify", "am i eligible", "can i apply"]),
    ("documentation", &["document", "passport", "proof", "certificate"]),
    ("country", &["spain", "usa", "uae", "japan", "germany", "uk", "canada", "australia"]),
];

const KNOWN_COUNTRIES: &[&str] = &[
    "spain", "usa", "uae", "japan", "germany", "uk", "canada", "australia", "france",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Intent {
    pub intents: Vec<&'static str>,
    pub target_country: Option<&'static str>,
    /// Share of intent categories that matched, in `[0, 1]`.
    pub confidence: f32,
}

impl Intent {
    pub fn has(&self, intent: &str) -> bool {
        self.intents.iter().any(|i| *i == intent)
    }
}

/// Substring match over lowercased text.
pub fn extract_intent(message: &str) -> Intent {
    let lower = message.to_lowercase();

    let intents: Vec<&'static str> = INTENT_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(name, _)| *name)
        .collect();

    let target_country = KNOWN_COUNTRIES.iter().copied().find(|c| lower.contains(c));
    let confidence = intents.len() as f32 / INTENT_KEYWORDS.len() as f32;

    Intent {
        intents,
        target_country,
        confidence,
    }
}

/// Follow-up question when the message lacks what is needed to answer.
pub fn clarification_question(intent: &Intent) -> String {
    match intent.target_country {
        None => "Which country are you interested in applying for a visa to?".to_string(),
        Some(country) if intent.has("eligibility") => format!(
            "Are you a citizen of which country? This helps determine your visa options for {}.",
            title_case(country)
        ),
        Some(_) => {
            "What type of visa are you applying for? (e.g., tourist, work, student, residence)"
                .to_string()
        }
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_multiple_intents_and_country() {
        let intent = extract_intent("How much does the Spain visa cost and how long does it take?");
        assert!(intent.has("cost"));
        assert!(intent.has("timeline"));
        assert!(intent.has("country"));
        assert_eq!(intent.target_country, Some("spain"));
        assert!((intent.confidence - 3.0 / 7.0).abs() < 1e-6);
    }

    #[test]
    fn france_is_a_country_but_not_a_country_intent() {
        let intent = extract_intent("visa for France");
        assert_eq!(intent.target_country, Some("france"));
        assert!(!intent.has("country"));
    }

    #[test]
    fn empty_message_has_no_intents() {
        let intent = extract_intent("");
        assert!(intent.intents.is_empty());
        assert_eq!(intent.confidence, 0.0);
    }

    #[test]
    fn clarification_depends_on_what_is_missing() {
        let no_country = extract_intent("what documents do I need?");
        assert_eq!(
            clarification_question(&no_country),
            "Which country are you interested in applying for a visa to?"
        );

        let eligibility = extract_intent("am i eligible for canada?");
        assert_eq!(
            clarification_question(&eligibility),
            "Are you a citizen of which country? This helps determine your visa options for Canada."
        );

        let other = extract_intent("japan fees");
        assert!(clarification_question(&other).starts_with("What type of visa"));
    }
}
