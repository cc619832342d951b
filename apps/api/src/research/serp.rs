//! Search-results page analysis: top results, "people also ask", related
//! searches and the topic vocabulary competitors use.
//!
//! Scraping is best effort. Any fetch failure, or a page with nothing we
//! recognise, yields a keyword-derived fallback instead.

use std::time::Duration;

use reqwest::{header, Client};
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::{info, warn};

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const MAX_RESULTS: usize = 10;
const MAX_TOPICS: usize = 15;

const HEADING_VOCABULARY: &[&str] = &[
    "introduction",
    "overview",
    "what is",
    "how to",
    "benefits",
    "features",
    "advantages",
    "disadvantages",
    "pros and cons",
    "comparison",
    "alternatives",
    "pricing",
    "conclusion",
    "faq",
    "getting started",
    "best practices",
    "tips",
    "guide",
];

#[derive(Debug, Clone, Serialize)]
pub struct SerpResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SerpAnalysis {
    pub top_results: Vec<SerpResult>,
    pub people_also_ask: Vec<String>,
    pub related_searches: Vec<String>,
    pub common_headings: Vec<String>,
    pub competitor_topics: Vec<String>,
}

impl SerpAnalysis {
    /// Generic search-intent data for when the results page is unusable.
    pub fn fallback(keyword: &str) -> Self {
        let k = keyword;
        Self {
            top_results: Vec::new(),
            people_also_ask: vec![
                format!("What is {k}?"),
                format!("How does {k} work?"),
                format!("What are the benefits of {k}?"),
                format!("Is {k} worth it?"),
                format!("How to use {k} effectively?"),
                format!("What are the best practices for {k}?"),
                format!("What are the common mistakes with {k}?"),
                format!("How much does {k} cost?"),
                format!("What are alternatives to {k}?"),
                format!("Who should use {k}?"),
            ],
            related_searches: vec![
                format!("{k} tutorial"),
                format!("{k} guide"),
                format!("{k} review"),
                format!("{k} comparison"),
                format!("best {k}"),
                format!("{k} tips"),
                format!("{k} features"),
                format!("{k} pricing"),
                format!("{k} alternatives"),
                format!("{k} vs"),
                format!("how to {k}"),
                format!("{k} benefits"),
            ],
            common_headings: [
                "introduction",
                "overview",
                "benefits",
                "features",
                "how to",
                "comparison",
                "pricing",
                "faq",
                "conclusion",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            competitor_topics: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.top_results.is_empty() && self.people_also_ask.is_empty()
    }
}

pub async fn analyze(http: &Client, endpoint: &str, keyword: &str) -> SerpAnalysis {
    let html = match fetch_page(http, endpoint, keyword).await {
        Ok(html) => html,
        Err(e) => {
            warn!("Search results fetch failed, using fallback data: {e}");
            return SerpAnalysis::fallback(keyword);
        }
    };

    let analysis = parse_results_page(&html);
    if analysis.is_empty() {
        warn!("Search results page had no recognisable results, using fallback data");
        return SerpAnalysis::fallback(keyword);
    }

    info!(
        "Search analysis: {} results, {} PAA questions, {} related searches",
        analysis.top_results.len(),
        analysis.people_also_ask.len(),
        analysis.related_searches.len()
    );
    analysis
}

async fn fetch_page(http: &Client, endpoint: &str, keyword: &str) -> Result<String, reqwest::Error> {
    http.get(endpoint)
        .query(&[("q", keyword), ("num", "10"), ("hl", "en")])
        .header(header::USER_AGENT, BROWSER_UA)
        .header(
            header::ACCEPT,
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        )
        .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
        .header(header::REFERER, "https://www.google.com/")
        .timeout(FETCH_TIMEOUT)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static CSS selector is valid")
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Pure extraction from a results page.
pub fn parse_results_page(html: &str) -> SerpAnalysis {
    let doc = Html::parse_document(html);

    let result_sel = selector("div.g");
    let h3_sel = selector("h3");
    let link_sel = selector("a[href]");
    let snippet_sel = selector("div.VwiC3b");
    let alt_snippet_sel = selector("span.aCOpRe");
    let paa_sel = selector("div.related-question-pair");
    let span_sel = selector("span");
    let related_sel = selector("div.s75CSd");

    let top_results: Vec<SerpResult> = doc
        .select(&result_sel)
        .take(MAX_RESULTS)
        .filter_map(|el| {
            let title = el.select(&h3_sel).next().map(text_of)?;
            let url = el
                .select(&link_sel)
                .next()
                .and_then(|a| a.value().attr("href"))?
                .to_string();
            let snippet = el
                .select(&snippet_sel)
                .next()
                .or_else(|| el.select(&alt_snippet_sel).next())
                .map(text_of)
                .unwrap_or_default();
            (!title.is_empty() && !url.is_empty()).then_some(SerpResult { title, url, snippet })
        })
        .collect();

    let people_also_ask = doc
        .select(&paa_sel)
        .filter_map(|pair| pair.select(&span_sel).next().map(text_of))
        .filter(|q| !q.is_empty())
        .collect();

    let related_searches = doc
        .select(&related_sel)
        .map(text_of)
        .filter(|s| !s.is_empty())
        .collect();

    SerpAnalysis {
        competitor_topics: extract_topics(&top_results),
        common_headings: extract_common_headings(&top_results),
        top_results,
        people_also_ask,
        related_searches,
    }
}

/// Phrases following "how to", "what is" and similar lead-ins, or preceding
/// "explained" / "overview" / "comparison".
pub fn extract_topics(results: &[SerpResult]) -> Vec<String> {
    let patterns = [
        static_regex!(r"(?i)(?:how to|ways to|tips for|guide to|benefits of|best)\s+([^,.]{10,50})"),
        static_regex!(r"(?i)(?:what is|understanding|learn about)\s+([^,.]{10,50})"),
        static_regex!(r"(?i)([^,.]{10,50})\s+(?:explained|overview|comparison)"),
    ];

    let mut topics: Vec<String> = Vec::new();
    for result in results {
        let text = format!("{} {}", result.title, result.snippet).to_lowercase();
        for pattern in &patterns {
            for caps in pattern.captures_iter(&text) {
                if let Some(m) = caps.get(1) {
                    let topic = m.as_str().trim().to_string();
                    if !topics.contains(&topic) {
                        topics.push(topic);
                    }
                }
            }
        }
    }
    topics.truncate(MAX_TOPICS);
    topics
}

pub fn extract_common_headings(results: &[SerpResult]) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for result in results {
        let title = result.title.to_lowercase();
        for pattern in HEADING_VOCABULARY {
            if title.contains(pattern) && !found.iter().any(|f| f == pattern) {
                found.push(pattern.to_string());
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div class="g">
            <a href="https://a.example/guide"><h3>How to use Notion AI for beginners</h3></a>
            <div class="VwiC3b">A complete guide to notion ai features, pricing and tips.</div>
          </div>
          <div class="g">
            <a href="https://b.example/review"><h3>Notion AI Pricing and Alternatives</h3></a>
            <span class="aCOpRe">Plans explained in detail.</span>
          </div>
          <div class="g"><div>no title here</div></div>
          <div class="related-question-pair"><span>Is Notion AI free?</span><span>ignored</span></div>
          <div class="related-question-pair"><span>What can Notion AI do?</span></div>
          <div class="s75CSd">notion ai review</div>
        </body></html>
    "#;

    #[test]
    fn test_parse_results_page() {
        let analysis = parse_results_page(PAGE);
        assert_eq!(analysis.top_results.len(), 2);
        assert_eq!(analysis.top_results[0].url, "https://a.example/guide");
        assert_eq!(analysis.top_results[1].snippet, "Plans explained in detail.");
        assert_eq!(
            analysis.people_also_ask,
            vec!["Is Notion AI free?".to_string(), "What can Notion AI do?".to_string()]
        );
        assert_eq!(analysis.related_searches, vec!["notion ai review".to_string()]);
        assert!(analysis.common_headings.contains(&"how to".to_string()));
        assert!(analysis.common_headings.contains(&"pricing".to_string()));
    }

    #[test]
    fn test_empty_page_is_empty() {
        assert!(parse_results_page("<html><body>captcha</body></html>").is_empty());
    }

    #[test]
    fn test_fallback_mentions_keyword() {
        let fallback = SerpAnalysis::fallback("jasper");
        assert_eq!(fallback.people_also_ask.len(), 10);
        assert_eq!(fallback.people_also_ask[0], "What is jasper?");
        assert!(fallback.related_searches.contains(&"best jasper".to_string()));
    }

    #[test]
    fn test_extract_topics() {
        let results = vec![SerpResult {
            title: "How to write better prompts, fast".into(),
            snippet: String::new(),
            url: "u".into(),
        }];
        assert_eq!(extract_topics(&results), vec!["write better prompts".to_string()]);
    }
}
