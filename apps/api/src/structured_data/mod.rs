//! Structured-Data Assembler: schema.org JSON-LD blocks for a finished article.
//!
//! Article markup is always emitted. Breadcrumb, FAQ, HowTo and ImageObject
//! markup are emitted only when their inputs are present; a missing pattern
//! in the markdown omits that kind silently.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::info;

const IMAGE_WIDTH: u32 = 1200;
const IMAGE_HEIGHT: u32 = 675;
const MIN_HOWTO_STEPS: usize = 3;
const MAX_FAQ_ANSWER: usize = 500;
const MAX_STEP_TEXT: usize = 300;
const MIN_FAQ_ANSWER: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct FaqItem {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HowToStep {
    pub name: String,
    pub text: String,
}

/// Publisher identity stamped into every block.
#[derive(Debug, Clone)]
pub struct Publisher {
    pub name: String,
    pub url: String,
}

pub struct SchemaInput<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub markdown: &'a str,
    pub image_url: Option<&'a str>,
    pub url: Option<&'a str>,
    pub author: &'a str,
    pub category: Option<&'a str>,
    pub keywords: &'a [String],
    pub word_count: usize,
    /// Preferred over FAQ items found in the markdown.
    pub faq_items: &'a [FaqItem],
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StructuredData {
    pub schemas: Vec<Value>,
    pub schema_html: String,
}

pub fn generate_all(input: &SchemaInput<'_>, publisher: &Publisher) -> StructuredData {
    let mut schemas = vec![article_schema(input, publisher)];

    if let (Some(url), Some(category)) = (input.url, input.category) {
        let crumbs = [
            ("Home".to_string(), publisher.url.clone()),
            (
                category.to_string(),
                format!("{}/{}", publisher.url, hyphenate(category)),
            ),
            (input.title.to_string(), url.to_string()),
        ];
        schemas.push(breadcrumb_schema(&crumbs));
    }

    let extracted;
    let faq_items = if input.faq_items.is_empty() {
        extracted = extract_faq(input.markdown);
        &extracted[..]
    } else {
        input.faq_items
    };
    if !faq_items.is_empty() {
        schemas.push(faq_schema(faq_items, input.url));
    }

    let steps = extract_howto_steps(input.markdown);
    if !steps.is_empty() {
        schemas.push(howto_schema(input, &steps));
    }

    if let Some(image_url) = input.image_url {
        schemas.push(image_schema(image_url, input.title, input.description, publisher));
    }

    let kinds: Vec<&str> = schemas
        .iter()
        .filter_map(|s| s.get("@type").and_then(Value::as_str))
        .collect();
    info!("Generated {} schema types: {}", schemas.len(), kinds.join(", "));

    StructuredData {
        schema_html: schema_html(&schemas),
        schemas,
    }
}

/// Each schema as a `<script type="application/ld+json">` block.
pub fn schema_html(schemas: &[Value]) -> String {
    schemas
        .iter()
        .map(|schema| {
            let body = serde_json::to_string_pretty(schema).unwrap_or_else(|_| "{}".to_string());
            format!("<script type=\"application/ld+json\">\n{body}\n</script>")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn organization(publisher: &Publisher) -> Value {
    json!({ "@type": "Organization", "name": publisher.name, "url": publisher.url })
}

fn image_object(url: &str) -> Value {
    json!({ "@type": "ImageObject", "url": url, "width": IMAGE_WIDTH, "height": IMAGE_HEIGHT })
}

fn article_schema(input: &SchemaInput<'_>, publisher: &Publisher) -> Value {
    let date = input.published_at.to_rfc3339();
    let mut schema = json!({
        "@context": "https://schema.org",
        "@type": "Article",
        "headline": input.title,
        "description": input.description,
        "author": { "@type": "Organization", "name": input.author, "url": publisher.url },
        "publisher": {
            "@type": "Organization",
            "name": publisher.name,
            "url": publisher.url,
            "logo": {
                "@type": "ImageObject",
                "url": format!("{}/logo.png", publisher.url),
                "width": 600,
                "height": 60
            }
        },
        "datePublished": date,
        "dateModified": date,
        "inLanguage": "en-US",
        "articleSection": "Technology"
    });

    if let Value::Object(map) = &mut schema {
        if let Some(image_url) = input.image_url {
            map.insert("image".into(), image_object(image_url));
        }
        if let Some(url) = input.url {
            map.insert(
                "mainEntityOfPage".into(),
                json!({ "@type": "WebPage", "@id": url }),
            );
            map.insert("url".into(), json!(url));
        }
        if !input.keywords.is_empty() {
            map.insert("keywords".into(), json!(input.keywords.join(", ")));
        }
        if input.word_count > 0 {
            map.insert("wordCount".into(), json!(input.word_count));
        }
    }
    schema
}

fn breadcrumb_schema(crumbs: &[(String, String)]) -> Value {
    let items: Vec<Value> = crumbs
        .iter()
        .enumerate()
        .map(|(i, (name, url))| {
            json!({
                "@type": "ListItem",
                "position": i + 1,
                "name": name,
                "item": { "@type": "Thing", "@id": url, "name": name }
            })
        })
        .collect();

    json!({
        "@context": "https://schema.org",
        "@type": "BreadcrumbList",
        "numberOfItems": crumbs.len(),
        "itemListElement": items
    })
}

fn faq_schema(items: &[FaqItem], url: Option<&str>) -> Value {
    let questions: Vec<Value> = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            json!({
                "@type": "Question",
                "name": item.question,
                "position": i + 1,
                "acceptedAnswer": { "@type": "Answer", "text": item.answer, "inLanguage": "en-US" }
            })
        })
        .collect();

    let mut schema = Map::new();
    schema.insert("@context".into(), json!("https://schema.org"));
    schema.insert("@type".into(), json!("FAQPage"));
    schema.insert("mainEntity".into(), Value::Array(questions));
    if let Some(url) = url {
        schema.insert("url".into(), json!(url));
    }
    Value::Object(schema)
}

fn howto_schema(input: &SchemaInput<'_>, steps: &[HowToStep]) -> Value {
    let steps: Vec<Value> = steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            let mut node = json!({
                "@type": "HowToStep",
                "position": i + 1,
                "name": step.name,
                "text": step.text
            });
            if let (Some(url), Value::Object(map)) = (input.url, &mut node) {
                map.insert("url".into(), json!(format!("{url}#step-{}", i + 1)));
            }
            node
        })
        .collect();

    let mut schema = json!({
        "@context": "https://schema.org",
        "@type": "HowTo",
        "name": input.title,
        "description": input.description,
        "inLanguage": "en-US",
        "step": steps,
        "estimatedCost": { "@type": "MonetaryAmount", "currency": "USD", "value": "0" }
    });
    if let Value::Object(map) = &mut schema {
        if let Some(image_url) = input.image_url {
            map.insert("image".into(), image_object(image_url));
        }
        if let Some(url) = input.url {
            map.insert("url".into(), json!(url));
        }
    }
    schema
}

fn image_schema(url: &str, caption: &str, description: &str, publisher: &Publisher) -> Value {
    json!({
        "@context": "https://schema.org",
        "@type": "ImageObject",
        "url": url,
        "contentUrl": url,
        "width": IMAGE_WIDTH,
        "height": IMAGE_HEIGHT,
        "encodingFormat": "image/png",
        "inLanguage": "en-US",
        "caption": caption,
        "description": description,
        "author": organization(publisher),
        "copyrightHolder": organization(publisher),
        "license": "https://creativecommons.org/licenses/by/4.0/",
        "acquireLicensePage": format!("{}/license", publisher.url)
    })
}

fn hyphenate(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Question/answer pairs under an "FAQ" or "Frequently Asked Questions" H2.
/// Each H3 inside the section is a question; the text up to the next H3 is
/// its answer.
pub fn extract_faq(markdown: &str) -> Vec<FaqItem> {
    let faq_heading = static_regex!(r"(?i)^##\s*(?:faq|frequently asked questions)\b");
    let question_heading = static_regex!(r"^###\s+([^#].*)$");

    let mut items = Vec::new();
    let mut in_section = false;
    let mut current: Option<(String, Vec<&str>)> = None;

    let mut flush = |current: &mut Option<(String, Vec<&str>)>| {
        if let Some((question, lines)) = current.take() {
            let answer = lines
                .iter()
                .map(|l| l.trim())
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if answer.chars().count() > MIN_FAQ_ANSWER {
                items.push(FaqItem {
                    question: format!("{}?", question.trim().trim_end_matches('?')),
                    answer: truncate_chars(&answer, MAX_FAQ_ANSWER),
                });
            }
        }
    };

    for line in markdown.lines() {
        let trimmed = line.trim_start();
        if !in_section {
            in_section = faq_heading.is_match(trimmed);
            continue;
        }
        if let Some(caps) = question_heading.captures(trimmed) {
            flush(&mut current);
            current = Some((caps[1].to_string(), Vec::new()));
        } else if trimmed.starts_with("## ") || trimmed.starts_with("# ") {
            break;
        } else if let Some((_, lines)) = current.as_mut() {
            lines.push(line);
        }
    }
    flush(&mut current);
    items
}

/// Numbered-list steps anywhere in the article. Fewer than three yields none.
pub fn extract_howto_steps(markdown: &str) -> Vec<HowToStep> {
    let numbered = static_regex!(r"^\s*\d+\.\s*(.+)$");

    let mut steps: Vec<HowToStep> = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    let finish = |lines: Vec<&str>, steps: &mut Vec<HowToStep>| {
        let text = lines.join("\n").trim().to_string();
        let name = text.lines().next().unwrap_or_default().trim().to_string();
        if !name.is_empty() {
            steps.push(HowToStep {
                name,
                text: truncate_chars(&text, MAX_STEP_TEXT),
            });
        }
    };

    for line in markdown.lines() {
        if let Some(caps) = numbered.captures(line) {
            if let Some(lines) = current.take() {
                finish(lines, &mut steps);
            }
            current = Some(vec![caps.get(1).map_or("", |m| m.as_str())]);
        } else if line.trim_start().starts_with('#') {
            if let Some(lines) = current.take() {
                finish(lines, &mut steps);
            }
        } else if let Some(lines) = current.as_mut() {
            lines.push(line);
        }
    }
    if let Some(lines) = current.take() {
        finish(lines, &mut steps);
    }

    if steps.len() < MIN_HOWTO_STEPS {
        return Vec::new();
    }
    steps
}
