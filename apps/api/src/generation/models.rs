//! Shapes the model is asked to return at each step, and the checks each
//! shape must pass before the pipeline accepts it.
//!
//! Field names follow the camelCase JSON the prompts ask for.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::llm_client::LlmError;

/// Sections and sub-headings the writing step aims for.
pub const TARGET_SECTIONS: usize = 10;
pub const SUBSECTIONS_PER_SECTION: usize = 2;

/// A model response that must pass a shape check before it is accepted.
/// `check` may also patch minor gaps in place.
pub trait StepOutput: Sized {
    fn check(&mut self) -> Result<(), LlmError> {
        Ok(())
    }
}

fn invalid(step: &str, what: &str) -> LlmError {
    LlmError::Validation(format!("{step} validation failed: {what}"))
}

// ────────────────────────────────────────────────────────────────────────────
// Headings
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeadingStructure {
    #[serde(default)]
    pub h1: String,
    #[serde(default)]
    pub headings: Vec<HeadingGroup>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeadingGroup {
    #[serde(default)]
    pub h2: String,
    #[serde(default)]
    pub h3: Vec<String>,
}

impl HeadingStructure {
    pub fn h3_count(&self) -> usize {
        self.headings.iter().map(|h| h.h3.len()).sum()
    }

    /// Every heading text, lower-cased, title first.
    pub fn all_titles_lowercase(&self) -> Vec<String> {
        std::iter::once(self.h1.as_str())
            .chain(self.headings.iter().flat_map(|g| {
                std::iter::once(g.h2.as_str()).chain(g.h3.iter().map(String::as_str))
            }))
            .map(str::to_lowercase)
            .collect()
    }
}

impl StepOutput for HeadingStructure {
    fn check(&mut self) -> Result<(), LlmError> {
        self.headings.retain(|g| !g.h2.trim().is_empty());
        if self.h1.trim().is_empty() || self.headings.is_empty() {
            return Err(invalid("Heading structure", "missing required fields (h1 or headings)"));
        }
        if self.headings.len() != TARGET_SECTIONS {
            warn!(
                "{} H2 headings generated, expected {TARGET_SECTIONS}",
                self.headings.len()
            );
        }
        let uneven = self
            .headings
            .iter()
            .filter(|g| g.h3.len() != SUBSECTIONS_PER_SECTION)
            .count();
        if uneven > 0 {
            warn!("{uneven} H2 sections don't have exactly {SUBSECTIONS_PER_SECTION} H3 titles");
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Semantic keywords
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticKeywords {
    #[serde(default)]
    pub semantic_keywords: Vec<String>,
}

impl StepOutput for SemanticKeywords {
    fn check(&mut self) -> Result<(), LlmError> {
        self.semantic_keywords.retain(|k| !k.trim().is_empty());
        if self.semantic_keywords.is_empty() {
            return Err(invalid("Semantic keywords", "missing semanticKeywords array"));
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Outline
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleOutline {
    #[serde(default)]
    pub h1: String,
    #[serde(default)]
    pub introduction: String,
    #[serde(default)]
    pub sections: Vec<OutlineSection>,
    #[serde(default)]
    pub faq: Vec<FaqOutline>,
    #[serde(default)]
    pub conclusion: String,
    #[serde(default)]
    pub author_section: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutlineSection {
    #[serde(default)]
    pub h2: String,
    #[serde(default)]
    pub intro: String,
    #[serde(default)]
    pub subsections: Vec<OutlineSubsection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutlineSubsection {
    #[serde(default)]
    pub h3: String,
    #[serde(default)]
    pub outline: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaqOutline {
    #[serde(default)]
    pub question: String,
    #[serde(default, alias = "answer")]
    pub answer_outline: String,
}

impl ArticleOutline {
    /// Fills the gaps a model outline commonly has, using the merged headings
    /// and keyword. Fails only when there are no sections at all.
    pub fn complete(&mut self, keyword: &str, headings: &HeadingStructure) -> Result<(), LlmError> {
        if self.h1.trim().is_empty() {
            warn!("Outline missing h1, using heading structure title");
            self.h1 = headings.h1.clone();
        }

        self.sections.retain(|s| !s.h2.trim().is_empty());
        if self.sections.is_empty() {
            return Err(invalid("Outline", "missing or empty sections array"));
        }

        for section in &mut self.sections {
            if section.subsections.len() == SUBSECTIONS_PER_SECTION {
                continue;
            }
            warn!("Section '{}' has {} subsections, fixing", section.h2, section.subsections.len());
            section.subsections.truncate(SUBSECTIONS_PER_SECTION);
            while section.subsections.len() < SUBSECTIONS_PER_SECTION {
                section.subsections.push(OutlineSubsection {
                    h3: format!("Additional aspect of {}", section.h2),
                    outline: "Key points about this aspect".to_string(),
                });
            }
        }

        if self.faq.is_empty() {
            warn!("Outline missing FAQ, adding a default question");
            self.faq.push(FaqOutline {
                question: format!("What is {keyword}?"),
                answer_outline: format!("Brief explanation of {keyword}"),
            });
        }
        if self.conclusion.trim().is_empty() {
            self.conclusion = format!("Summary of key points about {keyword}");
        }
        if self.author_section.trim().is_empty() {
            self.author_section = "Expert insights on AI tools and technology".to_string();
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tool analysis
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnalysis {
    pub pricing: Pricing,
    pub advantages: Vec<ToolPoint>,
    pub disadvantages: Vec<ToolPoint>,
    pub how_it_works: HowItWorks,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pricing {
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub tiers: Vec<PricingTier>,
    #[serde(default)]
    pub free_trial: String,
    #[serde(default)]
    pub money_back_guarantee: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingTier {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub billing: String,
    #[serde(default)]
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolPoint {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HowItWorks {
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub technical_details: String,
    #[serde(default)]
    pub best_practices: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    #[serde(default)]
    pub step_number: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl StepOutput for ToolAnalysis {}

// ────────────────────────────────────────────────────────────────────────────
// Tables, sources, meta
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableSpec {
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "string_cells")]
    pub headers: Vec<String>,
    #[serde(default, deserialize_with = "string_rows")]
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TablesResponse {
    pub comparison_table: TableSpec,
    pub summary_table: TableSpec,
}

impl StepOutput for TablesResponse {
    fn check(&mut self) -> Result<(), LlmError> {
        for table in [&self.comparison_table, &self.summary_table] {
            if table.headers.is_empty() {
                return Err(invalid("Tables", "table without headers"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    #[serde(default)]
    pub text: String,
    pub url: String,
    #[serde(default)]
    pub position: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesResponse {
    pub sources: Vec<Citation>,
}

impl StepOutput for SourcesResponse {
    fn check(&mut self) -> Result<(), LlmError> {
        self.sources.retain(|s| s.url.starts_with("http"));
        for source in &mut self.sources {
            if source.text.trim().is_empty() {
                source.text = source.url.clone();
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleMeta {
    #[serde(default)]
    pub meta_title: String,
    #[serde(default)]
    pub meta_description: String,
    #[serde(default)]
    pub meta_keywords: Vec<String>,
    #[serde(default)]
    pub og_title: String,
    #[serde(default)]
    pub og_description: String,
    #[serde(default)]
    pub twitter_title: String,
    #[serde(default)]
    pub twitter_description: String,
    #[serde(default)]
    pub robots_meta: String,
    #[serde(default)]
    pub slug: String,
}

impl StepOutput for ArticleMeta {
    fn check(&mut self) -> Result<(), LlmError> {
        if self.meta_title.trim().is_empty()
            || self.meta_description.trim().is_empty()
            || self.slug.trim().is_empty()
        {
            return Err(invalid("Meta tags", "missing meta tags or slug"));
        }
        if self.robots_meta.trim().is_empty() {
            self.robots_meta = "index, follow".to_string();
        }
        if self.og_title.is_empty() {
            self.og_title = self.meta_title.clone();
        }
        if self.og_description.is_empty() {
            self.og_description = self.meta_description.clone();
        }
        if self.twitter_title.is_empty() {
            self.twitter_title = self.og_title.clone();
        }
        if self.twitter_description.is_empty() {
            self.twitter_description = self.og_description.clone();
        }
        Ok(())
    }
}

// Models sometimes emit numbers or booleans in table cells.
fn cell_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn string_cells<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let cells = Vec::<Value>::deserialize(d)?;
    Ok(cells.into_iter().map(cell_to_string).collect())
}

fn string_rows<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Vec<String>>, D::Error> {
    let rows = Vec::<Vec<Value>>::deserialize(d)?;
    Ok(rows
        .into_iter()
        .map(|row| row.into_iter().map(cell_to_string).collect())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_structure_requires_title_and_headings() {
        let mut empty: HeadingStructure = serde_json::from_str(r#"{"h1": "T", "headings": []}"#).unwrap();
        assert!(empty.check().is_err());

        let mut no_title: HeadingStructure =
            serde_json::from_str(r#"{"headings": [{"h2": "A", "h3": ["a", "b"]}]}"#).unwrap();
        assert!(no_title.check().is_err());

        let mut ok: HeadingStructure =
            serde_json::from_str(r#"{"h1": "T", "headings": [{"h2": "A", "h3": ["a"]}]}"#).unwrap();
        assert!(ok.check().is_ok());
    }

    #[test]
    fn test_outline_completion_pads_and_trims_subsections() {
        let mut outline: ArticleOutline = serde_json::from_str(
            r#"{"sections": [
                {"h2": "One", "subsections": []},
                {"h2": "Two", "subsections": [{"h3":"a"},{"h3":"b"},{"h3":"c"}]}
            ]}"#,
        )
        .unwrap();
        let headings = HeadingStructure {
            h1: "Title".into(),
            headings: vec![],
        };
        outline.complete("widgets", &headings).unwrap();

        assert_eq!(outline.h1, "Title");
        assert!(outline.sections.iter().all(|s| s.subsections.len() == 2));
        assert_eq!(outline.faq[0].question, "What is widgets?");
        assert!(!outline.conclusion.is_empty());
    }

    #[test]
    fn test_outline_without_sections_is_rejected() {
        let mut outline = ArticleOutline::default();
        assert!(outline.complete("k", &HeadingStructure::default()).is_err());
    }

    #[test]
    fn test_tool_analysis_requires_all_blocks() {
        let missing = serde_json::from_str::<ToolAnalysis>(r#"{"pricing": {}, "advantages": []}"#);
        assert!(missing.is_err());
    }

    #[test]
    fn test_table_cells_accept_numbers() {
        let table: TableSpec = serde_json::from_str(
            r#"{"title": "T", "headers": ["Plan", "Price"], "rows": [["Pro", 20], ["Free", null]]}"#,
        )
        .unwrap();
        assert_eq!(table.rows[0], vec!["Pro", "20"]);
        assert_eq!(table.rows[1], vec!["Free", ""]);
    }

    #[test]
    fn test_meta_requires_slug_and_fills_social_fields() {
        let mut meta: ArticleMeta =
            serde_json::from_str(r#"{"metaTitle": "T", "metaDescription": "D"}"#).unwrap();
        assert!(meta.check().is_err());

        let mut meta: ArticleMeta =
            serde_json::from_str(r#"{"metaTitle": "T", "metaDescription": "D", "slug": "t"}"#).unwrap();
        meta.check().unwrap();
        assert_eq!(meta.robots_meta, "index, follow");
        assert_eq!(meta.twitter_title, "T");
    }

    #[test]
    fn test_sources_drop_non_http_urls() {
        let mut sources: SourcesResponse = serde_json::from_str(
            r#"{"sources": [{"text": "Docs", "url": "https://a.dev"}, {"text": "x", "url": "n/a"}]}"#,
        )
        .unwrap();
        sources.check().unwrap();
        assert_eq!(sources.sources.len(), 1);
    }
}
