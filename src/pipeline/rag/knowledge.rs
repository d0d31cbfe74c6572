//! Visa knowledge base: JSON loading and conversion into indexable
//! documents.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use super::types::{metadata, KbDocument};
use super::RagError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KnowledgeBase {
    #[serde(default)]
    pub countries: BTreeMap<String, CountryEntry>,
    #[serde(default)]
    pub general_topics: BTreeMap<String, TopicEntry>,
    #[serde(default)]
    pub faqs: Vec<FaqEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CountryEntry {
    pub country_code: String,
    pub flag: String,
    pub description: String,
    pub visa_types: BTreeMap<String, VisaTypeEntry>,
}

/// Scalar fields are kept as raw JSON: sources mix strings, numbers and
/// lists for the same key.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VisaTypeEntry {
    pub requirements: Option<Value>,
    pub processing_time: Option<Value>,
    pub validity: Option<Value>,
    pub fee: Option<Value>,
    pub documents: Vec<String>,
    pub tips: Option<Value>,
    pub embassy: Option<EmbassyEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbassyEntry {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TopicEntry {
    pub content: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FaqEntry {
    pub question: String,
    pub answer: String,
}

fn display(value: &Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => "N/A".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Some(other) => other.to_string(),
    }
}

fn slug(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

impl KnowledgeBase {
    pub fn load(path: &Path) -> Result<Self, RagError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RagError::KnowledgeBaseNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        let kb: Self = serde_json::from_str(&raw)?;
        tracing::info!(
            path = %path.display(),
            countries = kb.countries.len(),
            topics = kb.general_topics.len(),
            faqs = kb.faqs.len(),
            "Loaded knowledge base"
        );
        Ok(kb)
    }

    /// Country overview and per-visa-type documents.
    pub fn visa_documents(&self) -> Vec<KbDocument> {
        let mut documents = Vec::new();

        for (country, entry) in &self.countries {
            let code = entry.country_code.as_str();
            let overview = format!(
                "{} {}\n\n{}\n\n--- VISA INFORMATION ---",
                entry.flag, country, entry.description
            );
            documents.push(KbDocument::new(
                format!("country_overview_{}", code.to_lowercase()),
                overview.trim(),
                metadata(&[
                    ("type", "country_overview"),
                    ("country", country.as_str()),
                    ("country_code", code),
                    ("source", "visa_kb"),
                ]),
            ));

            for (visa_type, info) in &entry.visa_types {
                let documents_list = if info.documents.is_empty() {
                    "N/A".to_string()
                } else {
                    info.documents.join(", ")
                };
                let embassy = info
                    .embassy
                    .as_ref()
                    .and_then(|e| e.url.as_deref())
                    .unwrap_or("Check official website");

                let text = format!(
                    "Country: {country}\nVisa Type: {visa_type}\n\n\
                     Requirements:\n{}\n\n\
                     Processing Time: {}\nValidity: {}\nFee: {}\n\n\
                     Required Documents:\n{documents_list}\n\n\
                     Tips & Recommendations:\n{}\n\n\
                     Embassy Contact:\n{embassy}",
                    display(&info.requirements),
                    display(&info.processing_time),
                    display(&info.validity),
                    display(&info.fee),
                    display(&info.tips),
                );

                documents.push(KbDocument::new(
                    format!("visa_{}_{}", code.to_lowercase(), slug(visa_type)),
                    text,
                    metadata(&[
                        ("type", "visa_info"),
                        ("country", country.as_str()),
                        ("country_code", code),
                        ("visa_type", visa_type.as_str()),
                        ("source", "visa_kb"),
                    ]),
                ));
            }
        }

        tracing::debug!(count = documents.len(), "Extracted visa documents");
        documents
    }

    pub fn topic_documents(&self) -> Vec<KbDocument> {
        self.general_topics
            .iter()
            .map(|(name, topic)| {
                KbDocument::new(
                    format!("topic_{}", slug(name)),
                    format!("Topic: {name}\n\n{}", display(&topic.content)),
                    metadata(&[("type", "general_topic"), ("topic", name.as_str()), ("source", "visa_kb")]),
                )
            })
            .collect()
    }

    pub fn faq_documents(&self) -> Vec<KbDocument> {
        self.faqs
            .iter()
            .enumerate()
            .map(|(idx, faq)| {
                KbDocument::new(
                    format!("faq_{idx}"),
                    format!("Q: {}\n\nA: {}", faq.question, faq.answer),
                    metadata(&[("type", "faq"), ("question", faq.question.as_str()), ("source", "visa_kb")]),
                )
            })
            .collect()
    }

    /// Every knowledge base document followed by the built-in guides.
    pub fn all_documents(&self) -> Vec<KbDocument> {
        let mut documents = self.visa_documents();
        documents.extend(self.topic_documents());
        documents.extend(self.faq_documents());
        documents.extend(supplementary_documents());
        tracing::info!(count = documents.len(), "Prepared documents for indexing");
        documents
    }
}

/// Guides that are always indexed, independent of the knowledge base file.
pub fn supplementary_documents() -> Vec<KbDocument> {
    [
        ("visa_process_general", "General Visa Application Process", GUIDE_PROCESS),
        ("document_requirements_guide", "Document Requirements Guide", GUIDE_DOCUMENTS),
        ("visa_refusal_handling", "Visa Refusal Handling", GUIDE_REFUSAL),
    ]
    .into_iter()
    .map(|(id, topic, text)| {
        KbDocument::new(
            id,
            text.trim(),
            metadata(&[("type", "guide"), ("topic", topic), ("source", "internal")]),
        )
    })
    .collect()
}

const GUIDE_PROCESS: &str = r#"
General Visa Application Process:

1. Research & Planning
   - Identify visa type needed for your destination
   - Check eligibility criteria
   - Verify required documents
   - Plan timeline (apply 3-6 months in advance)

2. Gather Documents
   - Valid passport (usually 6+ months validity)
   - Completed application forms
   - Passport photos (typically 2x2 inches)
   - Financial documents (bank statements, income proof)
   - Travel plans (flight bookings, hotel reservations)
   - Employment letter or leave approval
   - Proof of accommodation

3. Application Submission
   - Fill application forms completely and accurately
   - Arrange supporting documents in order
   - Pay application fee (cash, check, or online)
   - Submit at embassy, consulate, or visa center
   - Obtain receipt and reference number

4. Interview (if required)
   - Be prepared to answer questions about trip purpose
   - Bring original documents and supporting copies
   - Dress professionally
   - Be honest and confident
   - Keep answers concise and relevant

5. Processing & Decision
   - Wait for processing (typically 5-30 days)
   - Monitor application status online if available
   - Respond promptly to any requests for additional info
   - Expect decision (approval, rejection, or extension)

6. Visa Issuance
   - Retrieve processed passport with visa
   - Verify visa details for accuracy
   - Plan travel dates according to visa validity
"#;

const GUIDE_DOCUMENTS: &str = r#"
Essential Documents for Most Visa Applications:

1. PASSPORT
   - Must be valid for at least 6 months beyond travel
   - Should have blank pages for visa stamp
   - Use recent/current passport
   - Some countries allow only 10-year passports

2. IDENTIFICATION
   - Birth certificate (original or certified copy)
   - National ID card (if applicable)
   - Marriage certificate (if name changed)
   - Divorce decree (if applicable)

3. FINANCIAL DOCUMENTS
   - Bank statements (3-6 months)
   - Investment statements
   - Income tax returns (1-2 years)
   - Employment letter with salary confirmation
   - Proof of steady income
   - Sponsor affidavit (if applicable)

4. TRAVEL DOCUMENTS
   - Flight booking confirmation
   - Hotel reservation
   - Travel insurance policy
   - Itinerary or travel plan
   - Return ticket confirmation

5. EMPLOYMENT & EDUCATION
   - Employment letter from current employer
   - Leave approval (if needed)
   - Educational certificates/diplomas
   - Enrollment letter (for students)
   - Employer recommendation letter

6. HEALTH & CHARACTER
   - Medical examination report (if required)
   - Vaccination records
   - Police clearance certificate
   - Character reference letters
   - Background check documentation

7. PHOTOGRAPHS
   - Passport-sized photos (usually 2x2 inches)
   - Recent, color, head-on shots
   - Specific background color per country
   - No glasses/sunglasses
   - Natural expression

Tips:
- Provide originals + 2 certified copies
- Get documents translated if not in visa country language
- Use official translations only
- Keep digital copies of all documents
- Submit well in advance of travel dates
"#;

const GUIDE_REFUSAL: &str = r#"
How to Handle Visa Refusal:

Common Reasons for Refusal:
1. Insufficient Financial Support
2. Lack of Ties to Home Country
3. Incomplete or Fraudulent Documentation
4. Previous Visa Violations
5. Criminal History or Security Concerns
6. Inconsistent Information
7. Overstaying Previous Visas

Steps to Take After Refusal:

1. Request Written Explanation
   - Ask embassy/consulate for detailed reason
   - Understand specific deficiencies
   - Document the official response

2. Review & Analyze
   - Carefully review what went wrong
   - Identify documentation gaps
   - Consider professional consultation

3. Plan Your Response
   - Address identified issues directly
   - Gather additional supporting documents
   - Prepare stronger application

4. Improve Your Case
   - If financial: show increased savings, sponsor support
   - If ties to home: document property, family, employment
   - If documents: obtain certified copies, translations
   - If history: obtain character reference, clearance

5. Consider Appeal (if available)
   - Check if country allows appeals
   - Submit within specified timeframe
   - Include new information addressing concerns

6. Reapply Strategically
   - Wait recommended period (usually 3-6 months)
   - Apply with significantly improved documentation
   - Consider different visa type if applicable
   - Use same documentation package that worked before

7. Seek Professional Help
   - Hire immigration lawyer/consultant
   - Use professional visa service
   - Get personalized case review
   - Improve odds with expert guidance

Prevention Tips:
- Be completely honest in application
- Provide only required documents (quality over quantity)
- Keep all information consistent
- Submit well-organized applications
- Don't rush - prepare thoroughly
- Keep originals, submit certified copies
"#;

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "countries": {
            "USA": {
                "country_code": "US",
                "flag": "🇺🇸",
                "description": "United States visas.",
                "visa_types": {
                    "B1/B2 Visitor": {
                        "requirements": "Valid passport, DS-160",
                        "processing_time": "3-5 weeks",
                        "fee": 185,
                        "documents": ["Passport", "DS-160 confirmation"],
                        "embassy": {"url": "https://travel.state.gov"}
                    }
                }
            }
        },
        "general_topics": {"Travel Insurance": {"content": "Most Schengen visas require insurance."}},
        "faqs": [{"question": "Can I work on a tourist visa?", "answer": "No."}]
    }"#;

    fn sample() -> KnowledgeBase {
        serde_json::from_str(SAMPLE).unwrap()
    }

    #[test]
    fn visa_documents_have_ids_and_metadata() {
        let docs = sample().visa_documents();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "country_overview_us");
        assert_eq!(docs[0].text, "🇺🇸 USA\n\nUnited States visas.\n\n--- VISA INFORMATION ---");

        let visa = &docs[1];
        assert_eq!(visa.id, "visa_us_b1/b2_visitor");
        assert_eq!(visa.meta_str("visa_type"), Some("B1/B2 Visitor"));
        assert_eq!(visa.meta_str("country_code"), Some("US"));
        assert!(visa.text.contains("Fee: 185"));
        assert!(visa.text.contains("Validity: N/A"));
        assert!(visa.text.contains("Tips & Recommendations:\nN/A"));
        assert!(visa.text.contains("Passport, DS-160 confirmation"));
        assert!(visa.text.ends_with("https://travel.state.gov"));
    }

    #[test]
    fn topics_and_faqs() {
        let kb = sample();
        let topics = kb.topic_documents();
        assert_eq!(topics[0].id, "topic_travel_insurance");
        assert_eq!(topics[0].meta_str("type"), Some("general_topic"));

        let faqs = kb.faq_documents();
        assert_eq!(faqs[0].id, "faq_0");
        assert_eq!(faqs[0].text, "Q: Can I work on a tourist visa?\n\nA: No.");
    }

    #[test]
    fn all_documents_append_guides() {
        let docs = sample().all_documents();
        assert_eq!(docs.len(), 2 + 1 + 1 + 3);
        let last = docs.last().unwrap();
        assert_eq!(last.id, "visa_refusal_handling");
        assert_eq!(last.meta_str("topic"), Some("Visa Refusal Handling"));
        assert!(last.text.starts_with("How to Handle Visa Refusal:"));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = KnowledgeBase::load(Path::new("/nonexistent/visa_kb.json")).unwrap_err();
        assert!(matches!(err, RagError::KnowledgeBaseNotFound(_)));
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");
        std::fs::write(&path, "[").unwrap();
        assert!(matches!(KnowledgeBase::load(&path), Err(RagError::Json(_))));
    }

    #[test]
    fn bundled_knowledge_base_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("data").join("visa_kb.json");
        let kb = KnowledgeBase::load(&path).unwrap();
        assert!(kb.countries.contains_key("USA"));
        assert!(!kb.faqs.is_empty());
    }
}
