//! Article generation pipeline: orchestrates one run end to end.
//!
//! Flow: research → headings → semantic keywords → keyword merge → outline →
//!       (tool analysis) → write → tables → sources → images → meta →
//!       structured data → render → quality → complete.
//!
//! Steps run strictly one after another. Every model call goes through the
//! `StepExecutor`, and every output is recorded in the run's
//! `GenerationContext` before the next step reads it. Progress and the single
//! terminal event go out through the `ProgressEmitter`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::generation::assembly::{self, TableBlocks};
use crate::generation::context::{ArticleImages, ContextError, GenerationContext, StepOutcome};
use crate::generation::executor::{StepError, StepExecutor};
use crate::generation::fallback;
use crate::generation::models::{
    ArticleMeta, ArticleOutline, Citation, HeadingStructure, SemanticKeywords, SourcesResponse,
    StepOutput, TableSpec, TablesResponse, ToolAnalysis,
};
use crate::generation::progress::ProgressEmitter;
use crate::generation::prompts::{self, WriteInputs};
use crate::images::{create_image_prompt, GeneratedImage, ImageGenerator, ImageSlot};
use crate::llm_client::{parse_model_json, FailureClass, LlmError, ResponseMode, TextModel};
use crate::quality;
use crate::render::markdown_to_html;
use crate::research::{paa_coverage, ResearchProvider};
use crate::structured_data::{self, FaqItem, Publisher, SchemaInput};

const DEFAULT_ROUNDS: u32 = 3;
const WRITE_ROUNDS: u32 = 5;

/// Category that switches on the tool-analysis step and tool tables.
pub const TOOL_CATEGORY: &str = "AI Tools";

const MIN_RAW_ARTICLE_CHARS: usize = 100;
const MIN_ARTICLE_CHARS: usize = 500;
const SCHEMA_KEYWORDS: usize = 20;
const MIN_PAA_COVERAGE: f64 = 0.6;

const STEP_HEADINGS: &str = "Step 1: Title Generation";
const STEP_KEYWORDS: &str = "Step 2: Semantic Keywords";
const STEP_MERGE: &str = "Step 3: Keyword Merge";
const STEP_OUTLINE: &str = "Step 4: Article Structure";
const STEP_TOOL: &str = "Step 4.5: AI Tool Analysis";
const STEP_WRITE: &str = "Step 5: Content Writing";
const STEP_TABLES: &str = "Step 6: Tables";
const STEP_META: &str = "Step 10: Meta Tags & Slug";
const STEP_SOURCES: &str = "Step 7: External Sources";

const FORMAT_ERROR: &str = "AI response formatting error. Please try again.";
const QUOTA_ERROR: &str = "All API keys have exceeded quota. Please wait a few minutes or add more keys in Settings.";
const KEYS_FAILED_ERROR: &str = "All API keys failed. This could be due to rate limits or quota. Please wait 5 minutes and try again, or add more API keys in Settings.";
const INVALID_KEY_ERROR: &str = "One or more API keys appear invalid. Please verify your keys in Settings.";

// ────────────────────────────────────────────────────────────────────────────
// Request / settings
// ────────────────────────────────────────────────────────────────────────────

/// Request body for `POST /api/v1/content/auto-generate`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArticleRequest {
    pub keyword: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub affiliate_link: Option<String>,
}

/// Site identity and pacing shared by every run.
#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub site_url: String,
    pub site_name: String,
    /// Pause after the heading, keyword and outline stages.
    pub step_pause: Duration,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Missing required fields")]
    MissingFields,

    #[error("Step 1 failed: {0}")]
    Headings(#[source] StepError),

    #[error(transparent)]
    Step(#[from] StepError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("failed to encode article payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl PipelineError {
    /// The single line sent to the client as the stream's `error` event.
    pub fn client_message(&self) -> String {
        let PipelineError::Step(step) = self else {
            return self.to_string();
        };
        let Some(last) = step.last_error() else {
            return step.to_string();
        };
        match last.classify() {
            _ if matches!(last, LlmError::Parse(_)) => FORMAT_ERROR.to_string(),
            FailureClass::RateLimited => QUOTA_ERROR.to_string(),
            _ if matches!(step, StepError::Exhausted { .. }) => KEYS_FAILED_ERROR.to_string(),
            FailureClass::Unauthorized => INVALID_KEY_ERROR.to_string(),
            _ if last.to_string().contains("API_KEY_INVALID") => INVALID_KEY_ERROR.to_string(),
            _ => step.to_string(),
        }
    }
}

/// "ai-tools" style categories map to the tool category; anything else is
/// filed under its subcategory, or "Blog".
pub fn determine_category(category: &str, subcategory: Option<&str>) -> String {
    if category == "ai-tools" || category == TOOL_CATEGORY {
        return TOOL_CATEGORY.to_string();
    }
    subcategory
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("Blog")
        .to_string()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ────────────────────────────────────────────────────────────────────────────
// Completion payload
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ArticlePayload {
    title: String,
    category: String,
    subcategory: Option<String>,
    html: String,
    content: String,
    excerpt: String,
    slug: String,
    canonical_url: String,
    meta_title: String,
    meta_description: String,
    keywords: Vec<String>,
    og_title: String,
    og_description: String,
    og_image: Option<String>,
    og_url: String,
    twitter_card: &'static str,
    twitter_title: String,
    twitter_description: String,
    twitter_image: Option<String>,
    robots_meta: String,
    viewport: &'static str,
    featured_image: Option<String>,
    author: String,
    author_experience: String,
    quality_score: u32,
    quality_metrics: QualityMetrics,
    schema_markup: String,
    schemas: Vec<serde_json::Value>,
    tables: TablesPayload,
    external_sources: Vec<Citation>,
    images: Vec<String>,
    #[serde(flatten)]
    tool: Option<ToolPayload>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QualityMetrics {
    word_count: usize,
    heading_count: usize,
    h2_count: usize,
    h3_count: usize,
    semantic_keywords_used: usize,
    external_sources: usize,
    readability_score: f64,
    ai_detection_score: u32,
    issues: Vec<String>,
    recommendations: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TablesPayload {
    comparison: TableSpec,
    summary: TableSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pricing: Option<TableSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pros_cons: Option<TableSpec>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolPayload {
    affiliate_link: Option<String>,
    ai_tool_data: ToolAnalysis,
}

// ────────────────────────────────────────────────────────────────────────────
// Pipeline
// ────────────────────────────────────────────────────────────────────────────

pub struct ArticlePipeline {
    model: Arc<dyn TextModel>,
    research: Arc<dyn ResearchProvider>,
    images: Arc<dyn ImageGenerator>,
    executor: StepExecutor,
    site: SiteSettings,
}

impl ArticlePipeline {
    pub fn new(
        model: Arc<dyn TextModel>,
        research: Arc<dyn ResearchProvider>,
        images: Arc<dyn ImageGenerator>,
        executor: StepExecutor,
        site: SiteSettings,
    ) -> Self {
        Self {
            model,
            research,
            images,
            executor,
            site,
        }
    }

    /// Runs one generation and always finishes the stream with exactly one
    /// `complete` or `error` event.
    pub async fn run(&self, request: ArticleRequest, emitter: &mut ProgressEmitter) {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "article_run",
            %run_id,
            keyword = request.keyword.as_deref().unwrap_or_default()
        );

        async {
            match self.generate(request, emitter).await {
                Ok(payload) => emitter.complete(payload).await,
                Err(e) => {
                    error!("Auto-generation failed: {e}");
                    emitter.error(e.client_message()).await;
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn generate(
        &self,
        request: ArticleRequest,
        emitter: &mut ProgressEmitter,
    ) -> Result<serde_json::Value, PipelineError> {
        let (Some(keyword), Some(category)) =
            (non_blank(request.keyword), non_blank(request.category))
        else {
            return Err(PipelineError::MissingFields);
        };
        let subcategory = non_blank(request.subcategory);
        let affiliate_link = non_blank(request.affiliate_link);
        let determined_category = determine_category(&category, subcategory.as_deref());
        let is_tool_article = determined_category == TOOL_CATEGORY;

        if self.executor.key_count().await == 0 {
            return Err(StepError::NoKeys.into());
        }

        let now = Utc::now();
        let year = now.year();
        let month = now.format("%B").to_string();
        let as_of = now.format("%B %Y").to_string();

        let mut ctx = GenerationContext::new(keyword.clone());
        emitter
            .progress(0.0, "Initializing workflow with load-balanced API keys...")
            .await;
        info!("Generating '{}' ({determined_category})", ctx.keyword);

        // Step 1: research + heading structure
        emitter
            .progress(1.0, "Step 1: Latest Information & Title Generation (10 H2 + 20 H3 titles)...")
            .await;
        ctx.research.set(self.research.research(&keyword).await)?;
        let research = ctx.research.get()?;
        info!(
            "Research: {} news articles, {} search results, {} questions",
            research.news.articles.len(),
            research.serp.top_results.len(),
            research.serp.people_also_ask.len()
        );

        let headings: HeadingStructure = self
            .json_step(STEP_HEADINGS, 0, &prompts::headings(&keyword, research, year))
            .await
            .map_err(PipelineError::Headings)?;
        ctx.headings.set(headings)?;
        let headings = ctx.headings.get()?;
        info!(
            "Headings: {} H2, {} H3",
            headings.headings.len(),
            headings.h3_count()
        );

        let coverage = paa_coverage(headings, &research.serp.people_also_ask);
        if coverage.ratio() < MIN_PAA_COVERAGE {
            warn!(
                "Only {}/{} 'people also ask' questions covered by headings: {:?}",
                coverage.covered, coverage.total, coverage.uncovered
            );
        } else {
            info!("'People also ask' coverage {}/{}", coverage.covered, coverage.total);
        }
        self.pause().await;

        // Step 2: semantic keywords
        emitter
            .progress(2.0, "Step 2: Extracting 100 Semantic Keywords...")
            .await;
        let keywords: SemanticKeywords = self
            .json_step(STEP_KEYWORDS, 1, &prompts::semantic_keywords(&keyword, research))
            .await?;
        info!("{} semantic keywords extracted", keywords.semantic_keywords.len());
        ctx.keywords.set(keywords)?;
        let keywords = ctx.keywords.get()?;
        self.pause().await;

        // Step 3: merge keywords into headings
        emitter
            .progress(3.0, "Step 3: Merging Keywords into All Titles (H2 + H3)...")
            .await;
        let merged: HeadingStructure = self
            .json_step(
                STEP_MERGE,
                2,
                &prompts::merge_keywords(headings, &keywords.semantic_keywords),
            )
            .await?;
        ctx.merged.set(merged)?;
        let merged = ctx.merged.get()?;

        // Step 4: outline, falling back to one built from the merged headings
        emitter
            .progress(4.0, "Step 4: Building Complete Article Structure...")
            .await;
        let result = self
            .json_step_with(
                STEP_OUTLINE,
                3,
                &prompts::outline(&keyword, merged),
                |outline: &mut ArticleOutline| outline.complete(&keyword, merged),
            )
            .await;
        let outline = settle(
            STEP_OUTLINE,
            StepOutcome::optional(result, || fallback::outline_from_headings(&keyword, merged)),
        )?;
        info!("Outline: {} sections, {} FAQ", outline.sections.len(), outline.faq.len());
        ctx.outline.set(outline)?;
        let outline = ctx.outline.get()?;

        // Step 4.5: tool analysis for tool articles only
        let tool_analysis = if is_tool_article {
            emitter
                .progress(4.5, "Step 4.5: Analyzing AI Tool (Pricing, Pros/Cons, Workflow)...")
                .await;
            let result = self
                .json_step::<ToolAnalysis>(
                    STEP_TOOL,
                    4,
                    &prompts::tool_analysis(&keyword, research, &as_of),
                )
                .await;
            Some(settle(
                STEP_TOOL,
                StepOutcome::optional(result, || fallback::tool_analysis(&keyword, &as_of)),
            )?)
        } else {
            None
        };
        ctx.tool_analysis.set(tool_analysis)?;
        let tool_analysis = ctx.tool_analysis.get()?.as_ref();
        self.pause().await;

        // Step 5: long-form writing
        emitter
            .progress(5.0, "Step 5: Writing Advanced SEO Content (E-E-A-T Optimized)...")
            .await;
        let write_prompt = prompts::write_article(&WriteInputs {
            keyword: &keyword,
            outline,
            keywords: &keywords.semantic_keywords,
            people_also_ask: &research.serp.people_also_ask,
            tool_analysis,
            affiliate_link: affiliate_link.as_deref(),
            month: &month,
            year,
        });
        let model = &self.model;
        let write_prompt = write_prompt.as_str();
        let written = self
            .executor
            .execute(STEP_WRITE, 5, WRITE_ROUNDS, move |key| async move {
                let raw = model.generate(&key, write_prompt, ResponseMode::Text).await?;
                clean_article(&raw)
            })
            .await?;
        info!(
            "Article written: {} characters in {} attempt(s)",
            written.data.chars().count(),
            written.attempts_used
        );
        ctx.article.set(written.data)?;
        let article = ctx.article.get()?;

        // Step 6: tables
        emitter.progress(6.0, "Step 6: Creating Tables...").await;
        let tables: TablesResponse = self
            .json_step(STEP_TABLES, 6, &prompts::tables(&keyword, article))
            .await?;
        ctx.tables.set(tables)?;
        let tables = ctx.tables.get()?;
        let blocks = TableBlocks {
            pricing: tool_analysis.map(|a| assembly::pricing_markdown(&keyword, &a.pricing)),
            pros_cons: tool_analysis.map(|a| assembly::pros_cons_markdown(&keyword, a)),
            comparison: assembly::table_markdown(&tables.comparison_table),
            summary: assembly::table_markdown(&tables.summary_table),
        };

        // Step 7: external sources
        emitter
            .progress(7.0, "Step 7: Adding External Sources & Citations...")
            .await;
        let sources: SourcesResponse = self
            .json_step(STEP_SOURCES, 8, &prompts::sources(&keyword, research))
            .await?;
        info!("{} external sources", sources.sources.len());
        ctx.sources.set(sources)?;
        let sources = ctx.sources.get()?;

        let mut final_article = assembly::splice_tables(article, &blocks);
        final_article = assembly::append_sources(&final_article, &sources.sources);

        // Step 8: images, each one optional
        emitter
            .progress(8.0, "Step 8: Generating Three Images Using Pollinations AI...")
            .await;
        let title = assembly::extract_title(&final_article).unwrap_or_else(|| keyword.clone());
        let images = ArticleImages {
            hero: self.image(&title, ImageSlot::Hero).await,
            illustration: self.image(&title, ImageSlot::Illustration).await,
            supporting: self.image(&title, ImageSlot::Supporting).await,
        };
        info!("{}/3 images generated", images.urls().len());
        ctx.images.set(images)?;
        let images = ctx.images.get()?;
        final_article = assembly::insert_images(
            &final_article,
            &title,
            images.hero.as_ref(),
            images.illustration.as_ref(),
            images.supporting.as_ref(),
        );
        let content = assembly::strip_title(&final_article);
        let word_count = content.split_whitespace().count();

        // Step 10: meta tags and slug
        emitter
            .progress(10.0, "Step 10: Generating Meta Tags, Slug & Publishing...")
            .await;
        let mut meta: ArticleMeta = self
            .json_step(STEP_META, 7, &prompts::meta(&keyword, &title, &outline.introduction))
            .await?;
        let slug = assembly::generate_slug(&meta.slug);
        if slug != meta.slug {
            info!("Slug normalised: '{}' -> '{slug}'", meta.slug);
        }
        meta.slug = slug;
        ctx.meta.set(meta)?;
        let meta = ctx.meta.get()?;
        let canonical_url = format!("{}/{}", self.site.site_url.trim_end_matches('/'), meta.slug);

        // Step 9: structured data
        emitter
            .progress(9.0, "Step 9: Generating JSON-LD Schema Markup...")
            .await;
        let author = format!("{} Team", self.site.site_name);
        let faq_items: Vec<FaqItem> = outline
            .faq
            .iter()
            .map(|f| FaqItem {
                question: f.question.clone(),
                answer: f.answer_outline.clone(),
            })
            .collect();
        let hero_url = images.hero.as_ref().map(|img| img.url.clone());
        let schema_keywords =
            &keywords.semantic_keywords[..keywords.semantic_keywords.len().min(SCHEMA_KEYWORDS)];
        let structured = structured_data::generate_all(
            &SchemaInput {
                title: &title,
                description: &outline.introduction,
                markdown: &content,
                image_url: hero_url.as_deref(),
                url: Some(&canonical_url),
                author: &author,
                category: Some(&determined_category),
                keywords: schema_keywords,
                word_count,
                faq_items: &faq_items,
                published_at: now,
            },
            &Publisher {
                name: self.site.site_name.clone(),
                url: self.site.site_url.clone(),
            },
        );
        info!("{} schema blocks generated", structured.schemas.len());

        let html = markdown_to_html(&content);
        let report = quality::analyze(&content, &html, &keyword);
        info!(
            "Quality score {}/100 ({} words, readability {:.1}, AI detection {})",
            report.overall_score, report.word_count, report.readability_score, report.ai_detection_score
        );
        if !report.issues.is_empty() {
            warn!("Quality issues: {}", report.issues.join("; "));
        }

        let payload = ArticlePayload {
            title,
            category: determined_category,
            subcategory: if category.eq_ignore_ascii_case("blog") { subcategory } else { None },
            html,
            excerpt: outline.introduction.clone(),
            slug: meta.slug.clone(),
            og_url: canonical_url.clone(),
            canonical_url,
            meta_title: meta.meta_title.clone(),
            meta_description: meta.meta_description.clone(),
            keywords: meta.meta_keywords.clone(),
            og_title: meta.og_title.clone(),
            og_description: meta.og_description.clone(),
            og_image: hero_url.clone(),
            twitter_card: "summary_large_image",
            twitter_title: meta.twitter_title.clone(),
            twitter_description: meta.twitter_description.clone(),
            twitter_image: hero_url.clone(),
            robots_meta: meta.robots_meta.clone(),
            viewport: "width=device-width, initial-scale=1.0",
            featured_image: hero_url,
            author,
            author_experience: outline.author_section.clone(),
            quality_score: report.overall_score,
            quality_metrics: QualityMetrics {
                word_count: report.word_count,
                heading_count: report.heading_count,
                h2_count: headings.headings.len(),
                h3_count: headings.h3_count(),
                semantic_keywords_used: keywords.semantic_keywords.len(),
                external_sources: sources.sources.len(),
                readability_score: report.readability_score,
                ai_detection_score: report.ai_detection_score,
                issues: report.issues,
                recommendations: report.recommendations,
            },
            schema_markup: structured.schema_html,
            schemas: structured.schemas,
            tables: TablesPayload {
                comparison: tables.comparison_table.clone(),
                summary: tables.summary_table.clone(),
                pricing: tool_analysis.map(|a| assembly::pricing_table(&keyword, &a.pricing)),
                pros_cons: tool_analysis.map(|a| assembly::pros_cons_table(&keyword, a)),
            },
            external_sources: sources.sources.clone(),
            images: images.urls(),
            tool: tool_analysis.map(|analysis| ToolPayload {
                affiliate_link: affiliate_link.clone(),
                ai_tool_data: analysis.clone(),
            }),
            content,
        };

        info!("Generation complete: '{}'", payload.title);
        Ok(serde_json::to_value(&payload)?)
    }

    /// A JSON-mode step whose output must pass its own shape check.
    async fn json_step<T>(&self, step: &str, index: usize, prompt: &str) -> Result<T, StepError>
    where
        T: DeserializeOwned + StepOutput,
    {
        self.json_step_with(step, index, prompt, T::check).await
    }

    async fn json_step_with<T, V>(
        &self,
        step: &str,
        index: usize,
        prompt: &str,
        validate: V,
    ) -> Result<T, StepError>
    where
        T: DeserializeOwned,
        V: Fn(&mut T) -> Result<(), LlmError>,
    {
        let model = &self.model;
        let validate = &validate;
        let result = self
            .executor
            .execute(step, index, DEFAULT_ROUNDS, move |key| async move {
                let raw = model.generate(&key, prompt, ResponseMode::Json).await?;
                let mut parsed: T = parse_model_json(&raw)?;
                validate(&mut parsed)?;
                Ok(parsed)
            })
            .await?;
        debug!(
            "{step} accepted from key #{} after {} attempt(s)",
            result.key_index_used + 1,
            result.attempts_used
        );
        Ok(result.data)
    }

    async fn image(&self, title: &str, slot: ImageSlot) -> Option<GeneratedImage> {
        let prompt = create_image_prompt(title, slot);
        match self.images.generate(&prompt).await {
            Ok(image) => {
                info!("{} image generated: {}", slot.label(), image.url);
                Some(image)
            }
            Err(e) => {
                warn!("{} image generation failed, omitting it: {e}", slot.label());
                None
            }
        }
    }

    async fn pause(&self) {
        if !self.site.step_pause.is_zero() {
            tokio::time::sleep(self.site.step_pause).await;
        }
    }
}

/// Unwraps a step outcome, logging when synthesized data stood in.
fn settle<T>(step: &str, outcome: StepOutcome<T>) -> Result<T, PipelineError> {
    match outcome {
        StepOutcome::Success(data) => Ok(data),
        StepOutcome::Fallback(data) => {
            warn!("{step} failed, continuing with generated fallback");
            Ok(data)
        }
        StepOutcome::Fatal(e) => Err(e.into()),
    }
}

/// Strips Markdown fences from the written article and rejects output too
/// short to be an article.
fn clean_article(raw: &str) -> Result<String, LlmError> {
    if raw.chars().count() < MIN_RAW_ARTICLE_CHARS {
        return Err(LlmError::Validation(
            "AI returned empty or very short response".into(),
        ));
    }
    let unfenced = static_regex!(r"(?i)```markdown\n?").replace_all(raw, "");
    let cleaned = static_regex!(r"```\n?").replace_all(&unfenced, "").trim().to_string();
    if cleaned.chars().count() < MIN_ARTICLE_CHARS {
        return Err(LlmError::Validation("Article content too short or empty".into()));
    }
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::credentials::settings::test_support::MemorySettings;
    use crate::credentials::KeyPool;
    use crate::generation::progress::ProgressEvent;
    use crate::generation::prompts::{
        HEADINGS_OPENING, KEYWORDS_OPENING, MERGE_OPENING, META_OPENING, OUTLINE_OPENING,
        SOURCES_OPENING, TABLES_OPENING, TOOL_OPENING, WRITE_OPENING,
    };
    use crate::images::test_support::FakeImages;
    use crate::llm_client::test_support::ScriptedModel;
    use crate::research::ResearchBundle;

    struct StaticResearch;

    #[async_trait]
    impl ResearchProvider for StaticResearch {
        async fn research(&self, keyword: &str) -> ResearchBundle {
            ResearchBundle::fallback(keyword)
        }
    }

    fn headings_json() -> String {
        let headings: Vec<Value> = (1..=10)
            .map(|i| json!({"h2": format!("Notion AI Section {i}"), "h3": [format!("Part {i}a"), format!("Part {i}b")]}))
            .collect();
        json!({"h1": "Notion AI Review", "headings": headings}).to_string()
    }

    fn article_text() -> String {
        let mut md = String::from(
            "```markdown\n# Notion AI Review\n\nNotion AI is a writing assistant built into Notion. We tested it for three weeks.\n",
        );
        for i in 1..=10 {
            md.push_str(&format!(
                "\n## Notion AI Section {i}\n\nThis section covers part {i} of how the assistant behaves in daily use.\n"
            ));
        }
        md.push_str("\n## Conclusion\n\nIn conclusion, it's a solid helper.\n```");
        md
    }

    fn outline_json() -> String {
        json!({
            "h1": "Notion AI Review",
            "introduction": "A hands-on look at Notion AI.",
            "sections": [{"h2": "Notion AI Section 1", "intro": "x", "subsections": [{"h3": "a", "outline": "o"}, {"h3": "b", "outline": "o"}]}],
            "faq": [{"question": "Is Notion AI free?", "answerOutline": "No, it is a paid add-on for most plans."}],
            "conclusion": "Worth trying.",
            "authorSection": "Written by people who use Notion daily."
        })
        .to_string()
    }

    fn tool_json() -> String {
        json!({
            "pricing": {"lastUpdated": "May 2025", "tiers": [{"name": "Plus", "price": "$10", "billing": "monthly", "features": ["AI blocks"]}], "freeTrial": "Yes", "moneyBackGuarantee": "No"},
            "advantages": [{"title": "Fast", "description": "Quick drafts"}],
            "disadvantages": [{"title": "Cost", "description": "Extra fee"}],
            "howItWorks": {"overview": "Type a prompt", "steps": [], "technicalDetails": "LLM", "bestPractices": []}
        })
        .to_string()
    }

    /// Every step answered; individual tests replace rules by listing theirs first.
    fn scripted(overrides: ScriptedModel) -> ScriptedModel {
        overrides
            .reply(HEADINGS_OPENING, headings_json())
            .reply(KEYWORDS_OPENING, r#"{"semanticKeywords": ["notion workspace", "ai writing"]}"#)
            .reply(MERGE_OPENING, headings_json())
            .reply(OUTLINE_OPENING, outline_json())
            .reply(TOOL_OPENING, tool_json())
            .reply(WRITE_OPENING, article_text())
            .reply(
                TABLES_OPENING,
                r#"{"comparisonTable": {"title": "Compare", "headers": ["A", "B"], "rows": [["1", "2"]]},
                    "summaryTable": {"title": "Summary", "headers": ["Aspect", "Details"], "rows": [["x", "y"]]}}"#,
            )
            .reply(
                SOURCES_OPENING,
                r#"{"sources": [{"text": "Notion docs", "url": "https://www.notion.so/help", "position": "end"}]}"#,
            )
            .reply(
                META_OPENING,
                r#"{"metaTitle": "Notion AI Review", "metaDescription": "Tested for three weeks", "metaKeywords": ["notion ai"], "slug": "Notion AI  Review!"}"#,
            )
    }

    fn pipeline(model: ScriptedModel, keys: &[&str], images: FakeImages) -> ArticlePipeline {
        let list = serde_json::to_string(keys).unwrap();
        let settings = Arc::new(MemorySettings::with(&[("GEMINI_API_KEYS", &list)]));
        let pool = Arc::new(KeyPool::new(settings, Duration::from_secs(60)));
        ArticlePipeline::new(
            Arc::new(model),
            Arc::new(StaticResearch),
            Arc::new(images),
            StepExecutor::new(pool),
            SiteSettings {
                site_url: "https://example.com/".into(),
                site_name: "Example".into(),
                step_pause: Duration::from_secs(2),
            },
        )
    }

    fn request(category: &str) -> ArticleRequest {
        ArticleRequest {
            keyword: Some("Notion AI".into()),
            category: Some(category.into()),
            subcategory: Some("Productivity".into()),
            affiliate_link: Some("https://notion.so/?ref=ex".into()),
        }
    }

    async fn collect(pipeline: &ArticlePipeline, request: ArticleRequest) -> Vec<ProgressEvent> {
        let (mut emitter, mut rx) = ProgressEmitter::channel(64);
        pipeline.run(request, &mut emitter).await;
        drop(emitter);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn completion(events: &[ProgressEvent]) -> &Value {
        match events.last() {
            Some(ProgressEvent::Complete { data }) => data,
            other => panic!("expected complete event, got {other:?}"),
        }
    }

    fn progress_steps(events: &[ProgressEvent]) -> Vec<f32> {
        events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Progress { step, .. } => Some(*step),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_article_completes_with_tool_data() {
        let p = pipeline(
            scripted(ScriptedModel::default()),
            &["gemini-key-0000"],
            FakeImages { fail_all: false },
        );
        let events = collect(&p, request("ai-tools")).await;

        assert_eq!(
            progress_steps(&events),
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 4.5, 5.0, 6.0, 7.0, 8.0, 10.0, 9.0]
        );
        let data = completion(&events);
        assert_eq!(data["title"], "Notion AI Review");
        assert_eq!(data["category"], "AI Tools");
        assert_eq!(data["subcategory"], Value::Null);
        assert_eq!(data["slug"], "notion-ai-review");
        assert_eq!(data["canonicalUrl"], "https://example.com/notion-ai-review");
        assert_eq!(data["author"], "Example Team");
        assert_eq!(data["excerpt"], "A hands-on look at Notion AI.");
        assert_eq!(data["affiliateLink"], "https://notion.so/?ref=ex");
        assert_eq!(data["aiToolData"]["pricing"]["tiers"][0]["name"], "Plus");
        assert_eq!(data["tables"]["pricing"]["title"], "Notion AI Pricing");
        assert!(data["tables"]["prosCons"].is_object());
        assert_eq!(data["images"].as_array().unwrap().len(), 3);
        assert_eq!(data["qualityMetrics"]["h2Count"], 10);
        assert_eq!(data["qualityMetrics"]["h3Count"], 20);

        let content = data["content"].as_str().unwrap();
        assert!(!content.starts_with("# "));
        assert!(!content.contains("```"));
        assert!(content.contains("Source: [Notion docs](https://www.notion.so/help)"));
        assert!(content.contains("| **Plus** | $10 | monthly | AI blocks |"));
        assert!(data["html"].as_str().unwrap().contains("<table>"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blog_article_skips_tool_step() {
        let model = scripted(ScriptedModel::default());
        let p = pipeline(model, &["gemini-key-0000"], FakeImages { fail_all: false });
        let events = collect(&p, request("blog")).await;

        assert!(!progress_steps(&events).contains(&4.5));
        let data = completion(&events);
        assert_eq!(data["category"], "Productivity");
        assert_eq!(data["subcategory"], "Productivity");
        assert!(data.get("aiToolData").is_none());
        assert!(data["tables"].get("pricing").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heading_failure_ends_with_error() {
        let model = scripted(ScriptedModel::default().fail(HEADINGS_OPENING, 400));
        let p = pipeline(model, &["gemini-key-0000"], FakeImages { fail_all: false });
        let events = collect(&p, request("blog")).await;

        match events.last() {
            Some(ProgressEvent::Error { error }) => assert!(error.starts_with("Step 1 failed:")),
            other => panic!("expected error event, got {other:?}"),
        }
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_outline_failure_uses_heading_outline() {
        let model = Arc::new(scripted(ScriptedModel::default().fail(OUTLINE_OPENING, 500)));
        let p = ArticlePipeline {
            model: model.clone(),
            ..pipeline(ScriptedModel::default(), &["gemini-key-0000"], FakeImages { fail_all: false })
        };
        let events = collect(&p, request("blog")).await;

        let data = completion(&events);
        assert!(data["excerpt"]
            .as_str()
            .unwrap()
            .starts_with("Discover everything you need to know about Notion AI"));
        assert_eq!(model.calls_matching(OUTLINE_OPENING), 3);
        assert_eq!(model.calls_matching(WRITE_OPENING), 1);

        // The writer works from the outline built out of the merged headings.
        let prompt = model.last_prompt(WRITE_OPENING).unwrap();
        let structure = prompt
            .split_once("ARTICLE STRUCTURE:\n")
            .and_then(|(_, rest)| rest.split_once("\n\nSEMANTIC KEYWORDS"))
            .map(|(outline, _)| outline)
            .unwrap();
        let outline: ArticleOutline = serde_json::from_str(structure).unwrap();
        assert_eq!(outline.sections.len(), 10);
        assert!(outline.sections.iter().all(|s| !s.subsections.is_empty()));
        assert_eq!(outline.sections[0].h2, "Notion AI Section 1");
        assert!(!outline.faq.is_empty());

        let faq_schema = data["schemas"]
            .as_array()
            .unwrap()
            .iter()
            .find(|s| s["@type"] == "FAQPage")
            .unwrap();
        assert_eq!(
            faq_schema["mainEntity"].as_array().unwrap().len(),
            outline.faq.len()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_capitalised_blog_category_keeps_subcategory() {
        let model = scripted(ScriptedModel::default());
        let p = pipeline(model, &["gemini-key-0000"], FakeImages { fail_all: false });
        let events = collect(&p, request("Blog")).await;

        let data = completion(&events);
        assert_eq!(data["category"], "Productivity");
        assert_eq!(data["subcategory"], "Productivity");
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_analysis_failure_uses_generic_block() {
        let model = scripted(ScriptedModel::default().fail(TOOL_OPENING, 503));
        let p = pipeline(model, &["gemini-key-0000"], FakeImages { fail_all: false });
        let events = collect(&p, request("AI Tools")).await;

        let data = completion(&events);
        assert_eq!(
            data["aiToolData"]["pricing"]["tiers"][0]["name"],
            "Contact for pricing"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_images_are_omitted() {
        let model = scripted(ScriptedModel::default());
        let p = pipeline(model, &["gemini-key-0000"], FakeImages { fail_all: true });
        let events = collect(&p, request("blog")).await;

        let data = completion(&events);
        assert_eq!(data["images"], json!([]));
        assert_eq!(data["featuredImage"], Value::Null);
        assert!(!data["content"].as_str().unwrap().contains("!["));
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_article_exhausts_write_budget() {
        let model = Arc::new(scripted(
            ScriptedModel::default().reply(WRITE_OPENING, "# Too short"),
        ));
        let p = ArticlePipeline {
            model: model.clone(),
            ..pipeline(ScriptedModel::default(), &["gemini-key-0000"], FakeImages { fail_all: false })
        };
        let events = collect(&p, request("blog")).await;

        assert!(matches!(events.last(), Some(ProgressEvent::Error { .. })));
        assert_eq!(model.calls_matching(WRITE_OPENING), 5);
    }

    #[tokio::test]
    async fn test_missing_fields_is_single_error() {
        let p = pipeline(
            ScriptedModel::default(),
            &["gemini-key-0000"],
            FakeImages { fail_all: false },
        );
        let events = collect(
            &p,
            ArticleRequest {
                keyword: Some("  ".into()),
                category: Some("blog".into()),
                ..Default::default()
            },
        )
        .await;
        assert_eq!(
            events,
            vec![ProgressEvent::Error {
                error: "Missing required fields".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_no_keys_reported_before_any_step() {
        let p = pipeline(ScriptedModel::default(), &[], FakeImages { fail_all: false });
        let events = collect(&p, request("blog")).await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            ProgressEvent::Error { error } => {
                assert!(error.starts_with("No Gemini API keys configured"))
            }
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[test]
    fn test_client_messages() {
        let exhausted = |last_error: LlmError| {
            PipelineError::Step(StepError::Exhausted {
                step: "Step 6: Tables".into(),
                attempts: 3,
                keys: 1,
                last_error,
            })
        };
        let parse_error = serde_json::from_str::<Value>("{").unwrap_err();
        assert_eq!(exhausted(LlmError::Parse(parse_error)).client_message(), FORMAT_ERROR);
        assert_eq!(
            exhausted(LlmError::Api { status: 429, message: "slow down".into() }).client_message(),
            QUOTA_ERROR
        );
        assert_eq!(
            exhausted(LlmError::Api { status: 500, message: "boom".into() }).client_message(),
            KEYS_FAILED_ERROR
        );

        let unauthorized = PipelineError::Step(StepError::Fatal {
            step: "Step 2".into(),
            source: LlmError::Api { status: 401, message: "nope".into() },
        });
        assert_eq!(unauthorized.client_message(), INVALID_KEY_ERROR);
        assert_eq!(PipelineError::MissingFields.client_message(), "Missing required fields");
    }

    #[test]
    fn test_category_normalisation() {
        assert_eq!(determine_category("ai-tools", Some("Writing")), "AI Tools");
        assert_eq!(determine_category("AI Tools", None), "AI Tools");
        assert_eq!(determine_category("blog", Some("Marketing")), "Marketing");
        assert_eq!(determine_category("blog", Some(" ")), "Blog");
    }

    #[test]
    fn test_clean_article_strips_fences_and_checks_length() {
        assert!(clean_article("short").is_err());
        let fenced = format!("```markdown\n{}\n```", "word ".repeat(30));
        assert!(clean_article(&fenced).is_err());
        let long = format!("```markdown\n# T\n\n{}\n```", "word ".repeat(120));
        let cleaned = clean_article(&long).unwrap();
        assert!(cleaned.starts_with("# T"));
        assert!(!cleaned.contains("```"));
    }
}
