//! Retrieval quality checks over a fixed query set.

use std::collections::HashSet;

use serde::Serialize;

use super::service::RagService;
use super::types::{RetrievalFilter, RetrievalSource};

const PASS_RATIO: f32 = 0.6;

struct TestQuery {
    query: &'static str,
    expected_keywords: &'static [&'static str],
    category: &'static str,
}

const TEST_QUERIES: &[TestQuery] = &[
    TestQuery {
        query: "How much does a US visitor visa cost?",
        expected_keywords: &["USA", "visitor", "B1/B2", "fee", "cost"],
        category: "cost",
    },
    TestQuery {
        query: "What documents do I need for a UK tourist visa?",
        expected_keywords: &["UK", "documents", "passport", "tourist"],
        category: "documents",
    },
    TestQuery {
        query: "How long does Schengen visa processing take?",
        expected_keywords: &["Schengen", "processing", "days", "time"],
        category: "processing_time",
    },
    TestQuery {
        query: "What are the requirements for working in Spain?",
        expected_keywords: &["Spain", "work", "employment", "requirements"],
        category: "work_requirements",
    },
    TestQuery {
        query: "How long can I stay in Australia on a visitor visa?",
        expected_keywords: &["Australia", "visitor", "stay", "duration"],
        category: "stay_duration",
    },
    TestQuery {
        query: "What should I do if my visa application is rejected?",
        expected_keywords: &["refusal", "rejected", "denial", "appeal"],
        category: "visa_refusal",
    },
    TestQuery {
        query: "Do I need a visa for Canada as a tourist?",
        expected_keywords: &["Canada", "visitor", "tourist", "requirements"],
        category: "visa_type",
    },
    TestQuery {
        query: "How much financial support do I need to show for Schengen visa?",
        expected_keywords: &["Schengen", "funds", "financial", "requirement"],
        category: "financial_requirements",
    },
    TestQuery {
        query: "What is the processing time for a US work visa?",
        expected_keywords: &["USA", "work", "H1-B", "processing"],
        category: "processing_time",
    },
    TestQuery {
        query: "Common reasons for visa rejection and how to avoid them",
        expected_keywords: &["refusal", "reasons", "rejection", "avoid"],
        category: "visa_refusal",
    },
];

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub query: String,
    pub category: String,
    pub retrieved_documents: usize,
    pub sources: Vec<String>,
    pub expected_keywords: Vec<String>,
    pub matched_keywords: Vec<String>,
    pub match_ratio: f32,
    pub passed: bool,
    pub retrieval_source: RetrievalSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuiteSummary {
    pub total_tests: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f32,
    pub average_match_ratio: f32,
    pub total_documents_retrieved: usize,
    pub results: Vec<QueryResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterTestResult {
    pub test: String,
    pub passed: bool,
    pub documents_retrieved: usize,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterSummary {
    pub filter_tests: Vec<FilterTestResult>,
    pub filter_pass_rate: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoreDistribution {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityMetrics {
    pub total_retrieved: usize,
    pub unique_results: usize,
    pub average_score: f32,
    pub score_distribution: ScoreDistribution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    Passed,
    NeedsImprovement,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub timestamp: String,
    pub validation_suite: SuiteSummary,
    pub filter_tests: FilterSummary,
    pub quality_metrics: QualityMetrics,
    pub overall_status: OverallStatus,
}

fn ratio(part: usize, whole: usize) -> f32 {
    if whole == 0 {
        0.0
    } else {
        part as f32 / whole as f32
    }
}

pub struct RagValidator<'a> {
    rag: &'a RagService,
}

impl<'a> RagValidator<'a> {
    pub fn new(rag: &'a RagService) -> Self {
        Self { rag }
    }

    fn validate_query(&self, test: &TestQuery) -> QueryResult {
        let ctx = self.rag.retrieve_context(test.query, &RetrievalFilter::default(), 5);
        let content = ctx
            .documents
            .iter()
            .map(|d| d.content.as_str())
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        let matched: Vec<String> = test
            .expected_keywords
            .iter()
            .filter(|k| content.contains(&k.to_lowercase()))
            .map(|k| k.to_string())
            .collect();
        let match_ratio = ratio(matched.len(), test.expected_keywords.len());

        QueryResult {
            query: test.query.to_string(),
            category: test.category.to_string(),
            retrieved_documents: ctx.documents.len(),
            sources: ctx.sources,
            expected_keywords: test.expected_keywords.iter().map(|k| k.to_string()).collect(),
            matched_keywords: matched,
            match_ratio,
            passed: match_ratio >= PASS_RATIO,
            retrieval_source: ctx.source,
        }
    }

    pub fn run_suite(&self) -> SuiteSummary {
        tracing::info!(queries = TEST_QUERIES.len(), "Running RAG validation suite");
        let results: Vec<QueryResult> = TEST_QUERIES
            .iter()
            .map(|t| {
                let result = self.validate_query(t);
                if result.passed {
                    tracing::info!(query = t.query, ratio = result.match_ratio, "Query passed");
                } else {
                    tracing::warn!(query = t.query, ratio = result.match_ratio, "Query failed");
                }
                result
            })
            .collect();

        let passed = results.iter().filter(|r| r.passed).count();
        let total = results.len();
        SuiteSummary {
            total_tests: total,
            passed,
            failed: total - passed,
            pass_rate: ratio(passed, total),
            average_match_ratio: if total == 0 {
                0.0
            } else {
                results.iter().map(|r| r.match_ratio).sum::<f32>() / total as f32
            },
            total_documents_retrieved: results.iter().map(|r| r.retrieved_documents).sum(),
            results,
        }
    }

    pub fn run_filter_tests(&self) -> FilterSummary {
        let tests: [(&str, &str, RetrievalFilter, &[&str]); 2] = [
            (
                "Filter by country (USA)",
                "visitor visa requirements",
                RetrievalFilter::new(Some("USA"), None),
                &["USA", "visitor"],
            ),
            (
                "Filter by visa type (Work)",
                "work visa",
                RetrievalFilter::new(None, Some("Work")),
                &["work", "employment"],
            ),
        ];

        let results: Vec<FilterTestResult> = tests
            .iter()
            .map(|(name, query, filter, expected)| {
                let ctx = self.rag.retrieve_context(query, filter, 5);
                let content = ctx
                    .documents
                    .iter()
                    .map(|d| d.content.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
                    .to_lowercase();
                let passed = expected.iter().all(|e| content.contains(&e.to_lowercase()));
                FilterTestResult {
                    test: name.to_string(),
                    passed,
                    documents_retrieved: ctx.documents.len(),
                    sources: ctx.sources,
                }
            })
            .collect();

        let passed = results.iter().filter(|r| r.passed).count();
        FilterSummary {
            filter_pass_rate: ratio(passed, results.len()),
            filter_tests: results,
        }
    }

    pub fn quality_metrics(&self) -> QualityMetrics {
        let ctx = self
            .rag
            .retrieve_context("visa requirements", &RetrievalFilter::default(), 10);

        let unique: HashSet<String> = ctx
            .documents
            .iter()
            .map(|d| d.content.chars().take(50).collect())
            .collect();
        let scores: Vec<f32> = ctx.documents.iter().map(|d| d.score).collect();

        let mut distribution = ScoreDistribution::default();
        for &s in &scores {
            if s > 0.8 {
                distribution.high += 1;
            } else if s >= 0.5 {
                distribution.medium += 1;
            } else {
                distribution.low += 1;
            }
        }

        QualityMetrics {
            total_retrieved: scores.len(),
            unique_results: unique.len(),
            average_score: if scores.is_empty() {
                0.0
            } else {
                scores.iter().sum::<f32>() / scores.len() as f32
            },
            score_distribution: distribution,
        }
    }

    pub fn validate(&self) -> ValidationReport {
        let validation_suite = self.run_suite();
        let filter_tests = self.run_filter_tests();
        let quality_metrics = self.quality_metrics();
        let overall_status = if validation_suite.pass_rate >= PASS_RATIO {
            OverallStatus::Passed
        } else {
            OverallStatus::NeedsImprovement
        };
        tracing::info!(
            pass_rate = validation_suite.pass_rate,
            status = ?overall_status,
            "RAG validation complete"
        );

        ValidationReport {
            timestamp: chrono::Utc::now().to_rfc3339(),
            validation_suite,
            filter_tests,
            quality_metrics,
            overall_status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::rag::service::tests::test_service;

    #[test]
    fn uninitialized_service_needs_improvement() {
        let dir = tempfile::tempdir().unwrap();
        let rag = test_service(&dir, None);
        let report = RagValidator::new(&rag).validate();
        assert_eq!(report.validation_suite.total_tests, 10);
        assert_eq!(report.validation_suite.passed, 0);
        assert_eq!(report.validation_suite.total_documents_retrieved, 0);
        assert_eq!(report.overall_status, OverallStatus::NeedsImprovement);
        assert_eq!(report.quality_metrics.total_retrieved, 0);
        assert_eq!(report.quality_metrics.average_score, 0.0);
    }

    #[test]
    fn filter_test_by_country_passes_on_matching_kb() {
        let dir = tempfile::tempdir().unwrap();
        let rag = test_service(&dir, None);
        rag.initialize();
        let summary = RagValidator::new(&rag).run_filter_tests();
        assert_eq!(summary.filter_tests.len(), 2);
        // No USA document in the test knowledge base mentions "visitor".
        assert!(!summary.filter_tests[0].passed);
        assert!(summary.filter_tests[0].sources.iter().all(|s| s == "USA"));
        // Work filter returns both work visas; "employment" appears in the USA one.
        assert!(summary.filter_tests[1].passed);
        assert_eq!(summary.filter_pass_rate, 0.5);
    }

    #[test]
    fn quality_metrics_count_unique_results() {
        let dir = tempfile::tempdir().unwrap();
        let rag = test_service(&dir, None);
        rag.initialize();
        let metrics = RagValidator::new(&rag).quality_metrics();
        assert_eq!(metrics.total_retrieved, 9);
        assert_eq!(metrics.unique_results, 9);
        let d = &metrics.score_distribution;
        assert_eq!(d.high + d.medium + d.low, 9);
    }

    #[test]
    fn report_serializes_status() {
        let json = serde_json::to_value(OverallStatus::NeedsImprovement).unwrap();
        assert_eq!(json, "NEEDS_IMPROVEMENT");
    }
}
