//! Recent-news context from the news-search API.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::credentials::{KeyPool, Service};

const PAGE_SIZE: &str = "10";
const LOOKBACK_DAYS: i64 = 30;
const MAX_ARTICLES: usize = 25;
const SUMMARY_ARTICLES: usize = 5;
const MAX_TRENDS: usize = 10;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "as", "is", "was", "are", "were", "been", "be", "have", "has", "had", "do", "does",
    "did", "will", "would", "could", "should", "may", "might", "can", "this", "that", "these",
    "those", "it", "its", "they", "them", "their", "what", "which", "who", "when", "where", "why",
    "how", "all", "each", "every", "both", "few", "more", "most", "other", "some", "such", "than",
    "too", "very",
];

#[derive(Debug, Clone, Serialize)]
pub struct NewsArticle {
    pub title: String,
    pub description: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub source: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NewsContext {
    pub articles: Vec<NewsArticle>,
    pub summary: String,
    pub trends: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsApiResponse {
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsApiArticle {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    published_at: Option<DateTime<Utc>>,
    source: Option<NewsApiSource>,
}

#[derive(Debug, Deserialize)]
struct NewsApiSource {
    name: Option<String>,
}

impl NewsApiArticle {
    fn into_article(self) -> Option<NewsArticle> {
        let title = self.title.filter(|t| !t.trim().is_empty())?;
        let description = self.description.filter(|d| !d.trim().is_empty())?;
        Some(NewsArticle {
            title,
            description,
            url: self.url.unwrap_or_default(),
            published_at: self.published_at,
            source: self
                .source
                .and_then(|s| s.name)
                .unwrap_or_else(|| "Unknown".to_string()),
        })
    }
}

/// Runs the query variants for `keyword` with one news key and condenses
/// the results. Individual query failures are skipped; the key is reported
/// failed only when every query failed.
pub async fn fetch_news(
    http: &Client,
    endpoint: &str,
    keyword: &str,
    api_key: &str,
    keys: &KeyPool,
) -> NewsContext {
    let from = (Utc::now() - ChronoDuration::days(LOOKBACK_DAYS))
        .format("%Y-%m-%d")
        .to_string();
    let queries = query_variants(keyword, Utc::now().year());

    let mut collected = Vec::new();
    let mut errors = Vec::new();

    for query in &queries {
        match fetch_query(http, endpoint, query, &from, api_key).await {
            Ok(articles) => collected.extend(articles),
            Err(e) => errors.push(format!("query \"{query}\": {e}")),
        }
    }

    if errors.is_empty() {
        keys.report_success(Service::News, api_key);
    } else {
        warn!("News API errors: {errors:?}");
        if errors.len() == queries.len() {
            keys.report_failure(Service::News, api_key, &errors.join("; "));
        }
    }

    let context = condense(collected);
    info!(
        "News context: {} articles, {} trends",
        context.articles.len(),
        context.trends.len()
    );
    context
}

async fn fetch_query(
    http: &Client,
    endpoint: &str,
    query: &str,
    from: &str,
    api_key: &str,
) -> Result<Vec<NewsArticle>, reqwest::Error> {
    let response: NewsApiResponse = http
        .get(endpoint)
        .header("X-Api-Key", api_key)
        .query(&[
            ("q", query),
            ("sortBy", "publishedAt"),
            ("language", "en"),
            ("pageSize", PAGE_SIZE),
            ("from", from),
        ])
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    Ok(response
        .articles
        .into_iter()
        .filter_map(NewsApiArticle::into_article)
        .collect())
}

pub fn query_variants(keyword: &str, year: i32) -> Vec<String> {
    vec![
        keyword.to_string(),
        format!("{keyword} {year}"),
        format!("{keyword} latest"),
        format!("{keyword} news"),
        format!("{keyword} trends"),
    ]
}

/// Dedupe by title, newest first, then build summary and trends.
pub fn condense(articles: Vec<NewsArticle>) -> NewsContext {
    let mut seen = std::collections::HashSet::new();
    let mut unique: Vec<NewsArticle> = articles
        .into_iter()
        .filter(|a| seen.insert(a.title.trim().to_lowercase()))
        .collect();
    unique.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    unique.truncate(MAX_ARTICLES);

    NewsContext {
        summary: summarize(&unique),
        trends: extract_trends(&unique),
        articles: unique,
    }
}

fn summarize(articles: &[NewsArticle]) -> String {
    articles
        .iter()
        .take(SUMMARY_ARTICLES)
        .map(|a| format!("{} ({}): {}", a.title, a.source, a.description))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Words of four or more letters seen at least twice, most frequent first.
pub fn extract_trends(articles: &[NewsArticle]) -> Vec<String> {
    let word_re = static_regex!(r"\b[a-z]{4,}\b");

    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();

    for article in articles {
        let text = format!("{} {}", article.title, article.description).to_lowercase();
        for word in word_re.find_iter(&text).map(|m| m.as_str()) {
            if STOP_WORDS.contains(&word) {
                continue;
            }
            let count = counts.entry(word.to_string()).or_insert(0);
            if *count == 0 {
                order.push(word.to_string());
            }
            *count += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = order
        .into_iter()
        .map(|w| {
            let c = counts[&w];
            (w, c)
        })
        .filter(|(_, c)| *c >= 2)
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.into_iter().take(MAX_TRENDS).map(|(w, _)| w).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn article(title: &str, description: &str, day: u32) -> NewsArticle {
        NewsArticle {
            title: title.to_string(),
            description: description.to_string(),
            url: format!("https://news.example/{day}"),
            published_at: Some(Utc.with_ymd_and_hms(2025, 3, day, 12, 0, 0).unwrap()),
            source: "Example".to_string(),
        }
    }

    #[test]
    fn test_query_variants() {
        let queries = query_variants("notion ai", 2025);
        assert_eq!(queries.len(), 5);
        assert_eq!(queries[1], "notion ai 2025");
        assert_eq!(queries[4], "notion ai trends");
    }

    #[test]
    fn test_condense_dedupes_by_title_and_sorts_newest_first() {
        let context = condense(vec![
            article("Agents ship", "first", 1),
            article("agents SHIP ", "duplicate", 5),
            article("Models grow", "second", 9),
        ]);
        assert_eq!(context.articles.len(), 2);
        assert_eq!(context.articles[0].title, "Models grow");
        assert!(context.summary.starts_with("Models grow (Example): second"));
    }

    #[test]
    fn test_trends_skip_short_and_stop_words() {
        let articles = vec![
            article("Robots learn quickly", "robots with vision", 1),
            article("Robots everywhere", "vision systems which scale", 2),
        ];
        let trends = extract_trends(&articles);
        assert_eq!(trends, vec!["robots".to_string(), "vision".to_string()]);
    }

    #[test]
    fn test_api_article_without_description_is_dropped() {
        let raw: NewsApiResponse = serde_json::from_str(
            r#"{"articles": [
                {"title": "A", "description": null, "url": "u"},
                {"title": "B", "description": "d", "source": {"name": "Wire"}, "publishedAt": "2025-03-02T10:00:00Z"}
            ]}"#,
        )
        .unwrap();
        let articles: Vec<_> = raw.articles.into_iter().filter_map(NewsApiArticle::into_article).collect();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].source, "Wire");
    }
}
