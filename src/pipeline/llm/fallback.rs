//! Canned replies used when no model can answer.

use super::LlmError;

/// Keyword → reply, checked in order against the lowercased message.
const KEYWORD_REPLIES: &[(&str, &str)] = &[
    (
        "visa",
        "To apply for a visa, follow these general steps:\n\n\
         1. **Determine Your Visa Type**: Choose the appropriate visa category (tourist, work, student, etc.)\n\
         2. **Gather Documents**: Collect required documents (passport, financial proof, accommodation, etc.)\n\
         3. **Complete Application**: Fill out official application forms\n\
         4. **Schedule Appointment**: Book an appointment at the embassy or visa center\n\
         5. **Attend Interview**: If required, attend a visa interview\n\
         6. **Wait for Decision**: Processing times vary (2-12 weeks typically)\n\n\
         Please specify which country you're interested in for more detailed guidance.",
    ),
    (
        "document",
        "Common visa documents typically include:\n\n\
         - Valid passport (6+ months validity)\n\
         - Completed application form\n\
         - Passport-sized photos\n\
         - Proof of financial means\n\
         - Proof of accommodation\n\
         - Travel insurance (if required)\n\
         - Employment letter (for work visas)\n\
         - University acceptance (for student visas)\n\n\
         Requirements vary significantly by country and visa type. Which country are you applying to?",
    ),
    (
        "cost",
        "Visa costs vary significantly by country and type:\n\n\
         - **Tourist Visas**: $20-150 USD\n\
         - **Work Visas**: $100-500+ USD\n\
         - **Student Visas**: $50-300 USD\n\
         - **Residence Permits**: $200-1000+ USD\n\n\
         Costs may include application fees, visa fees, and processing fees. \
         Which country interests you?",
    ),
    (
        "time",
        "Visa processing times vary by country and type:\n\n\
         - **Tourist Visas**: 5-15 business days (fastest)\n\
         - **Standard Processing**: 2-4 weeks\n\
         - **Work/Student Visas**: 4-8 weeks\n\
         - **Complex Cases**: 8-12 weeks+\n\n\
         Some countries offer expedited processing for additional fees. \
         Which country's visa are you applying for?",
    ),
    (
        "requirement",
        "Visa requirements vary by your nationality and destination country.\n\n\
         **Generally Required**:\n\
         - Valid passport\n\
         - Proof of funds\n\
         - Return ticket\n\
         - Accommodation proof\n\n\
         **May Be Required**:\n\
         - Employment letter\n\
         - Invitation letter\n\
         - Health insurance\n\
         - Criminal background check\n\n\
         Please tell me which country you're interested in visiting.",
    ),
    (
        "application",
        "The visa application process generally involves:\n\n\
         1. Research visa types for your destination\n\
         2. Prepare required documents\n\
         3. Complete application form accurately\n\
         4. Schedule appointment (online or in-person)\n\
         5. Submit application and fees\n\
         6. Attend interview if required\n\
         7. Wait for processing\n\
         8. Collect visa or receive decision\n\n\
         Each country has unique procedures. What's your destination?",
    ),
];

const DEFAULT_REPLY: &str = "I'm VisaBuddy's AI assistant, here to help with visa application questions!\n\n\
     I can help you with:\n\
     - Visa types and requirements\n\
     - Application procedures\n\
     - Required documents\n\
     - Processing times and costs\n\
     - General immigration guidance\n\n\
     What would you like to know about visa applications?";

pub const RATE_LIMITED_REPLY: &str = "Rate limit exceeded. Please try again later.";
pub const UNAVAILABLE_REPLY: &str = "AI service is temporarily unavailable. Please try again later.";
pub const PROVIDER_ERROR_REPLY: &str = "AI service encountered an error. Please try again later.";

/// Pick the canned reply for a user message. Returns the matched keyword
/// (`"default"` when nothing matched) and the reply text.
pub fn keyword_reply(message: &str) -> (&'static str, &'static str) {
    let lower = message.to_lowercase();
    KEYWORD_REPLIES
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .copied()
        .unwrap_or(("default", DEFAULT_REPLY))
}

/// Reply and error text for a provider that fails hard instead of
/// degrading to keyword replies.
pub fn unavailable_reply(err: &LlmError) -> (&'static str, String) {
    match err {
        LlmError::MissingApiKey(_) => (UNAVAILABLE_REPLY, err.to_string()),
        LlmError::Status { status, body } => (
            PROVIDER_ERROR_REPLY,
            format!("Together.ai API error: {status} - {body}"),
        ),
        other => (
            UNAVAILABLE_REPLY,
            format!("DeepSeek/Together service error: {other}"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_matching_keyword_wins() {
        // "visa" precedes "document" in the table.
        let (keyword, reply) = keyword_reply("Which VISA documents do I need?");
        assert_eq!(keyword, "visa");
        assert!(reply.starts_with("To apply for a visa"));
    }

    #[test]
    fn cost_keyword_matches() {
        let (keyword, reply) = keyword_reply("how much does it cost");
        assert_eq!(keyword, "cost");
        assert!(reply.contains("$20-150 USD"));
    }

    #[test]
    fn unmatched_message_gets_default() {
        let (keyword, reply) = keyword_reply("hello there");
        assert_eq!(keyword, "default");
        assert!(reply.starts_with("I'm VisaBuddy's AI assistant"));
    }

    #[test]
    fn unavailable_reply_distinguishes_status_errors() {
        let (reply, error) = unavailable_reply(&LlmError::Status {
            status: 503,
            body: "overloaded".into(),
        });
        assert_eq!(reply, PROVIDER_ERROR_REPLY);
        assert_eq!(error, "Together.ai API error: 503 - overloaded");

        let (reply, error) = unavailable_reply(&LlmError::MissingApiKey("DEEPSEEK_API_KEY"));
        assert_eq!(reply, UNAVAILABLE_REPLY);
        assert_eq!(error, "DEEPSEEK_API_KEY not configured in environment variables");

        let (_, error) = unavailable_reply(&LlmError::Timeout(60));
        assert!(error.starts_with("DeepSeek/Together service error:"));
    }
}
