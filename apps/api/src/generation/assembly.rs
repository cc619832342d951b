//! Text assembly of the finished article: tables, citations and images are
//! spliced into the written markdown at fixed fractional positions.
//!
//! Positions are counted in "parts": part 0 is everything before the first
//! H2 (title and introduction), part k is the k-th H2 section. A block
//! scheduled after part i lands at the end of that part; indices past the
//! end are clamped to the last part.

use crate::generation::models::{Citation, Pricing, TableSpec, ToolAnalysis, ToolPoint};
use crate::images::GeneratedImage;

const MAX_FEATURES_PER_TIER: usize = 3;

// ────────────────────────────────────────────────────────────────────────────
// Tables
// ────────────────────────────────────────────────────────────────────────────

fn escape_cell(cell: &str) -> String {
    cell.replace('|', "\\|").replace('\n', " ")
}

fn table_rows(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut out = format!(
        "| {} |\n| {} |\n",
        headers.iter().map(|h| escape_cell(h)).collect::<Vec<_>>().join(" | "),
        headers.iter().map(|_| "---").collect::<Vec<_>>().join(" | ")
    );
    for row in rows {
        out.push_str(&format!(
            "| {} |\n",
            row.iter().map(|c| escape_cell(c)).collect::<Vec<_>>().join(" | ")
        ));
    }
    out
}

/// A model-produced table as an H3 block.
pub fn table_markdown(table: &TableSpec) -> String {
    format!("### {}\n\n{}", table.title, table_rows(&table.headers, &table.rows))
}

pub fn pricing_table(keyword: &str, pricing: &Pricing) -> TableSpec {
    TableSpec {
        title: format!("{keyword} Pricing"),
        headers: ["Plan", "Price", "Billing", "Key Features"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        rows: pricing
            .tiers
            .iter()
            .map(|tier| {
                let features = if tier.features.is_empty() {
                    "N/A".to_string()
                } else {
                    tier.features
                        .iter()
                        .take(MAX_FEATURES_PER_TIER)
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                vec![
                    tier.name.clone(),
                    tier.price.clone(),
                    tier.billing.clone(),
                    features,
                ]
            })
            .collect(),
    }
}

pub fn pricing_markdown(keyword: &str, pricing: &Pricing) -> String {
    let table = pricing_table(keyword, pricing);
    let mut rows = table.rows.clone();
    for row in &mut rows {
        if let Some(name) = row.first_mut() {
            *name = format!("**{name}**");
        }
    }
    format!(
        "## {keyword} Pricing\n\n*Last Updated: {}*\n\n{}\n**Free Trial:** {}\n\n**Money-Back Guarantee:** {}\n",
        pricing.last_updated,
        table_rows(&table.headers, &rows),
        pricing.free_trial,
        pricing.money_back_guarantee
    )
}

/// Advantages and disadvantages side by side; the shorter column is padded
/// with empty cells.
pub fn pros_cons_table(keyword: &str, analysis: &ToolAnalysis) -> TableSpec {
    let len = analysis.advantages.len().max(analysis.disadvantages.len());
    let cell = |p: Option<&ToolPoint>| {
        p.map(|p| format!("**{}**: {}", p.title, p.description))
            .unwrap_or_default()
    };
    TableSpec {
        title: format!("{keyword} Pros and Cons"),
        headers: vec!["Advantages".into(), "Disadvantages".into()],
        rows: (0..len)
            .map(|i| {
                vec![
                    cell(analysis.advantages.get(i)),
                    cell(analysis.disadvantages.get(i)),
                ]
            })
            .collect(),
    }
}

pub fn pros_cons_markdown(keyword: &str, analysis: &ToolAnalysis) -> String {
    let table = pros_cons_table(keyword, analysis);
    format!(
        "## {keyword} Pros and Cons\n\n{}",
        table_rows(&table.headers, &table.rows)
    )
}

// ────────────────────────────────────────────────────────────────────────────
// Splicing
// ────────────────────────────────────────────────────────────────────────────

/// The article split at H2 boundaries.
#[derive(Debug, Clone)]
pub struct ArticleParts {
    parts: Vec<String>,
}

impl ArticleParts {
    pub fn parse(markdown: &str) -> Self {
        let mut parts = vec![String::new()];
        for line in markdown.lines() {
            if line.starts_with("## ") {
                parts.push(String::new());
            }
            if let Some(current) = parts.last_mut() {
                current.push_str(line);
                current.push('\n');
            }
        }
        Self { parts }
    }

    /// Number of parts, including the part before the first H2.
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Appends `block` to part `index` (clamped).
    pub fn insert_after(&mut self, index: usize, block: &str) {
        let index = index.min(self.parts.len() - 1);
        let part = &mut self.parts[index];
        while part.ends_with("\n\n") {
            part.pop();
        }
        part.push('\n');
        part.push_str(block.trim());
        part.push_str("\n\n");
    }

    pub fn into_markdown(self) -> String {
        self.parts.concat().trim_end().to_string()
    }
}

/// Blocks produced by the table step, ready to splice.
#[derive(Debug, Clone, Default)]
pub struct TableBlocks {
    pub pricing: Option<String>,
    pub pros_cons: Option<String>,
    pub comparison: String,
    pub summary: String,
}

pub fn splice_tables(article: &str, blocks: &TableBlocks) -> String {
    let mut parts = ArticleParts::parse(article);
    let n = parts.part_count();

    match (&blocks.pricing, &blocks.pros_cons) {
        (Some(pricing), Some(pros_cons)) if n >= 4 => {
            let three_quarters = n * 3 / 4 + 2;
            parts.insert_after(n / 4, pricing);
            parts.insert_after(n / 2 + 1, pros_cons);
            parts.insert_after(three_quarters, &blocks.comparison);
            parts.insert_after(three_quarters, &blocks.summary);
        }
        (None, None) if n >= 3 => {
            parts.insert_after(n / 2, &blocks.comparison);
            parts.insert_after(n * 3 / 4 + 1, &blocks.summary);
        }
        _ => {
            let last = n - 1;
            for block in blocks.pricing.iter().chain(blocks.pros_cons.iter()) {
                parts.insert_after(last, block);
            }
            parts.insert_after(last, &blocks.comparison);
            parts.insert_after(last, &blocks.summary);
        }
    }
    parts.into_markdown()
}

pub fn append_sources(article: &str, sources: &[Citation]) -> String {
    let mut out = article.trim_end().to_string();
    for source in sources {
        out.push_str(&format!("\n\nSource: [{}]({})", source.text, source.url));
    }
    out
}

/// Hero after the introduction (needs one H2), illustration before the
/// middle part (needs three parts), supporting image before the
/// three-quarter part (needs five parts). An image whose article is too
/// short is skipped.
pub fn insert_images(
    article: &str,
    title: &str,
    hero: Option<&GeneratedImage>,
    illustration: Option<&GeneratedImage>,
    supporting: Option<&GeneratedImage>,
) -> String {
    let mut parts = ArticleParts::parse(article);

    if let Some(img) = hero {
        if parts.part_count() >= 2 {
            parts.insert_after(0, &format!("![{title}]({})", img.url));
        }
    }
    if let Some(img) = illustration {
        let n = parts.part_count();
        if n >= 3 {
            parts.insert_after(n / 2 - 1, &format!("![{title} illustration]({})", img.url));
        }
    }
    if let Some(img) = supporting {
        let n = parts.part_count();
        if n >= 5 {
            parts.insert_after(n * 3 / 4 - 1, &format!("![{title} guide]({})", img.url));
        }
    }
    parts.into_markdown()
}

// ────────────────────────────────────────────────────────────────────────────
// Title and slug
// ────────────────────────────────────────────────────────────────────────────

/// Text of the first H1, if any.
pub fn extract_title(markdown: &str) -> Option<String> {
    static_regex!(r"(?m)^#[ \t]+(.+)$")
        .captures(markdown)
        .map(|c| c[1].trim().to_string())
}

/// The article with its first H1 line removed.
pub fn strip_title(markdown: &str) -> String {
    static_regex!(r"(?m)^#[ \t]+.+$")
        .replace(markdown, "")
        .trim()
        .to_string()
}

/// Lower-case, punctuation stripped, whitespace runs to single hyphens.
pub fn generate_slug(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = static_regex!(r"[^\w\s-]").replace_all(&lowered, "");
    let hyphenated = static_regex!(r"\s+").replace_all(stripped.trim(), "-");
    static_regex!(r"-+")
        .replace_all(&hyphenated, "-")
        .trim_matches('-')
        .to_string()
}
