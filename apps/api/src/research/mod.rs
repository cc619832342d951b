//! External research adapters: recent news and search-results analysis.
//!
//! Research never fails a run. Every problem degrades to an emptier bundle.

pub mod news;
pub mod serp;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::warn;

use crate::credentials::{KeyPool, Service};
use crate::generation::models::HeadingStructure;

pub use news::NewsContext;
pub use serp::SerpAnalysis;

const NEWS_TIMEOUT: Duration = Duration::from_secs(15);

/// Words ignored when matching "people also ask" questions to headings.
const PAA_FILLER: &[&str] = &[
    "what", "how", "why", "when", "where", "does", "the", "this", "that", "with", "from", "are",
];

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResearchBundle {
    pub news: NewsContext,
    pub serp: SerpAnalysis,
}

impl ResearchBundle {
    pub fn fallback(keyword: &str) -> Self {
        Self {
            news: NewsContext::default(),
            serp: SerpAnalysis::fallback(keyword),
        }
    }
}

#[async_trait]
pub trait ResearchProvider: Send + Sync {
    async fn research(&self, keyword: &str) -> ResearchBundle;
}

#[derive(Debug, Clone)]
pub struct ResearchUrls {
    pub news_api: String,
    pub search: String,
}

/// Live research over HTTP, using the shared key pool for news keys.
pub struct WebResearch {
    http: Client,
    keys: Arc<KeyPool>,
    urls: ResearchUrls,
}

impl WebResearch {
    pub fn new(keys: Arc<KeyPool>, urls: ResearchUrls) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: Client::builder().timeout(NEWS_TIMEOUT).build()?,
            keys,
            urls,
        })
    }
}

#[async_trait]
impl ResearchProvider for WebResearch {
    async fn research(&self, keyword: &str) -> ResearchBundle {
        let news = match self.keys.next_key(Service::News).await {
            Some(key) => {
                news::fetch_news(&self.http, &self.urls.news_api, keyword, &key, &self.keys).await
            }
            None => {
                warn!("No NewsAPI keys configured, continuing without news context");
                NewsContext::default()
            }
        };
        let serp = serp::analyze(&self.http, &self.urls.search, keyword).await;
        ResearchBundle { news, serp }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaaCoverage {
    pub covered: usize,
    pub total: usize,
    pub uncovered: Vec<String>,
}

impl PaaCoverage {
    /// Share of questions covered; 1.0 when there were no questions.
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.covered as f64 / self.total as f64
        }
    }
}

/// A question counts as covered when any of its significant words appears
/// in any heading.
pub fn paa_coverage(headings: &HeadingStructure, questions: &[String]) -> PaaCoverage {
    let titles = headings.all_titles_lowercase();
    let mut uncovered = Vec::new();

    for question in questions {
        let lowered = question.to_lowercase().replace('?', "");
        let covered = lowered
            .split_whitespace()
            .filter(|w| w.len() > 3 && !PAA_FILLER.contains(w))
            .any(|word| titles.iter().any(|t| t.contains(word)));
        if !covered {
            uncovered.push(question.clone());
        }
    }

    PaaCoverage {
        covered: questions.len() - uncovered.len(),
        total: questions.len(),
        uncovered,
    }
}
