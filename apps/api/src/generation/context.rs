//! Per-run accumulation of step outputs.
//!
//! Every slot is write-once: a step either records its output (real or
//! synthesized) exactly once, or the run aborts. Reading a slot that was
//! never written is a sequencing bug and surfaces as `MissingOutput`.

use thiserror::Error;

use crate::generation::executor::StepError;
use crate::generation::models::{
    ArticleMeta, ArticleOutline, HeadingStructure, SemanticKeywords, SourcesResponse,
    TablesResponse, ToolAnalysis,
};
use crate::images::GeneratedImage;
use crate::research::ResearchBundle;

#[derive(Debug, Error, PartialEq)]
pub enum ContextError {
    #[error("{0} was already recorded for this run")]
    AlreadyRecorded(&'static str),

    #[error("{0} has not been produced yet")]
    MissingOutput(&'static str),
}

#[derive(Debug)]
pub struct Slot<T> {
    name: &'static str,
    value: Option<T>,
}

impl<T> Slot<T> {
    pub const fn new(name: &'static str) -> Self {
        Self { name, value: None }
    }

    pub fn set(&mut self, value: T) -> Result<(), ContextError> {
        if self.value.is_some() {
            return Err(ContextError::AlreadyRecorded(self.name));
        }
        self.value = Some(value);
        Ok(())
    }

    pub fn get(&self) -> Result<&T, ContextError> {
        self.value.as_ref().ok_or(ContextError::MissingOutput(self.name))
    }
}

/// How an optional step ended. `Fatal` only carries a missing-keys error;
/// any other failure is replaced by synthesized data.
#[derive(Debug)]
pub enum StepOutcome<T> {
    Success(T),
    Fallback(T),
    Fatal(StepError),
}

impl<T> StepOutcome<T> {
    /// Replaces a failed result with synthesized data. Missing keys are
    /// still fatal: there is nothing to fall back from.
    pub fn optional(result: Result<T, StepError>, fallback: impl FnOnce() -> T) -> Self {
        match result {
            Ok(data) => StepOutcome::Success(data),
            Err(StepError::NoKeys) => StepOutcome::Fatal(StepError::NoKeys),
            Err(_) => StepOutcome::Fallback(fallback()),
        }
    }
}

#[derive(Debug)]
pub struct GenerationContext {
    pub keyword: String,
    pub research: Slot<ResearchBundle>,
    pub headings: Slot<HeadingStructure>,
    pub keywords: Slot<SemanticKeywords>,
    pub merged: Slot<HeadingStructure>,
    pub outline: Slot<ArticleOutline>,
    pub tool_analysis: Slot<Option<ToolAnalysis>>,
    pub article: Slot<String>,
    pub tables: Slot<TablesResponse>,
    pub sources: Slot<SourcesResponse>,
    pub images: Slot<ArticleImages>,
    pub meta: Slot<ArticleMeta>,
}

/// Images that were generated; any subset may be missing.
#[derive(Debug, Clone, Default)]
pub struct ArticleImages {
    pub hero: Option<GeneratedImage>,
    pub illustration: Option<GeneratedImage>,
    pub supporting: Option<GeneratedImage>,
}

impl ArticleImages {
    pub fn urls(&self) -> Vec<String> {
        [&self.hero, &self.illustration, &self.supporting]
            .into_iter()
            .flatten()
            .map(|img| img.url.clone())
            .collect()
    }
}

impl GenerationContext {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            research: Slot::new("research"),
            headings: Slot::new("heading structure"),
            keywords: Slot::new("semantic keywords"),
            merged: Slot::new("merged headings"),
            outline: Slot::new("outline"),
            tool_analysis: Slot::new("tool analysis"),
            article: Slot::new("article"),
            tables: Slot::new("tables"),
            sources: Slot::new("sources"),
            images: Slot::new("images"),
            meta: Slot::new("meta"),
        }
    }
}
