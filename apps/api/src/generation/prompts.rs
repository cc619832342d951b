// Prompt builders for each pipeline step.
// The opening sentence of every prompt is unique to its step; logs and test
// fakes key off it.

use crate::generation::models::{ArticleOutline, HeadingStructure, ToolAnalysis, ToolPoint};
use crate::llm_client::prompts::{BANNED_PHRASES, JSON_ONLY};
use crate::research::ResearchBundle;

pub const HEADINGS_OPENING: &str = "You are an expert SEO researcher.";
pub const KEYWORDS_OPENING: &str = "You are an SEO keyword expert.";
pub const MERGE_OPENING: &str = "Merge these semantic keywords into ALL the H2 and H3 titles naturally.";
pub const OUTLINE_OPENING: &str = "Create a COMPLETE article outline";
pub const TOOL_OPENING: &str = "You are an expert AI tool analyst.";
pub const WRITE_OPENING: &str = "Write a COMPREHENSIVE, SEO-optimized article";
pub const TABLES_OPENING: &str = "Analyze the article and create comparison and summary tables.";
pub const SOURCES_OPENING: &str = "Suggest external authoritative sources with working links.";
pub const META_OPENING: &str = "Create comprehensive SEO meta tags and slug for this article.";

const MAX_NEWS_TITLES: usize = 25;
const MAX_PAA: usize = 15;
const TABLE_CONTEXT_CHARS: usize = 3000;
const KEYWORD_NEWS_CHARS: usize = 1000;

fn numbered<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items
        .enumerate()
        .map(|(i, s)| format!("{}. {s}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

fn head_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn pretty<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

pub fn headings(keyword: &str, research: &ResearchBundle, year: i32) -> String {
    let news = &research.news;
    let serp = &research.serp;
    format!(
        r#"{HEADINGS_OPENING} Research everything about "{keyword}" and create a comprehensive heading structure with BOTH H2 and H3 titles based on the latest news.

NEWS CONTEXT (Latest Information):
{summary}

TRENDING TOPICS: {trends}

NEWS ARTICLES (use for heading inspiration):
{articles}

COMPETITOR ANALYSIS:
Top ranking titles:
{top}

Common competitor headings: {common}
Competitor topics: {topics}

PEOPLE ALSO ASK:
{paa}

Related searches: {related}

TASK: Generate 10 H2 titles, each with exactly 2 H3 titles (20 H3 total).
- Cover "{keyword}" from every angle, beginner to advanced
- Focus on what is current in {year}
- All titles unique, using words related to the keyword
- Address the People Also Ask questions

{JSON_ONLY}
{{
  "h1": "Main catchy article title with keyword",
  "headings": [
    {{"h2": "First H2 heading", "h3": ["First H3", "Second H3"]}}
  ]
}}"#,
        summary = news.summary,
        trends = news.trends.join(", "),
        articles = numbered(
            news.articles
                .iter()
                .take(MAX_NEWS_TITLES)
                .map(|a| a.title.as_str())
        ),
        top = numbered(serp.top_results.iter().take(10).map(|r| r.title.as_str())),
        common = serp.common_headings.join(", "),
        topics = serp.competitor_topics.join(", "),
        paa = numbered(serp.people_also_ask.iter().take(MAX_PAA).map(String::as_str)),
        related = serp.related_searches.join(", "),
    )
}

pub fn semantic_keywords(keyword: &str, research: &ResearchBundle) -> String {
    format!(
        r#"{KEYWORDS_OPENING} Extract the top 100 strong semantic keywords related to "{keyword}".

Find keywords that are semantically related, cover the topic from all angles, and include long-tail, LSI and question-style terms.

NEWS CONTEXT: {news}
RELATED SEARCHES: {related}
TRENDING: {trends}

{JSON_ONLY}
{{"semanticKeywords": ["keyword1", "keyword2"]}}"#,
        news = head_chars(&research.news.summary, KEYWORD_NEWS_CHARS),
        related = research.serp.related_searches.join(", "),
        trends = research.news.trends.join(", "),
    )
}

pub fn merge_keywords(headings: &HeadingStructure, keywords: &[String]) -> String {
    format!(
        r#"{MERGE_OPENING}

CURRENT HEADING STRUCTURE:
{structure}

SEMANTIC KEYWORDS TO INTEGRATE:
{keywords}

Enhance every H2 and H3 title with the most relevant keywords while keeping it readable.
Keep the exact structure: 10 H2 titles, each with exactly 2 H3 titles.

{JSON_ONLY}
{{
  "h1": "{h1}",
  "headings": [
    {{"h2": "Enhanced H2", "h3": ["Enhanced H3", "Enhanced H3"]}}
  ]
}}"#,
        structure = pretty(&headings.headings),
        keywords = keywords.join(", "),
        h1 = headings.h1.replace('"', "'"),
    )
}

pub fn outline(keyword: &str, merged: &HeadingStructure) -> String {
    format!(
        r#"{OUTLINE_OPENING} for "{keyword}".

Use the enhanced H2 and H3 headings below. Every H2 must have EXACTLY 2 H3 subsections.

ENHANCED STRUCTURE:
{structure}

{JSON_ONLY}
{{
  "h1": "Article main title",
  "introduction": "Compelling 3-line introduction",
  "sections": [
    {{
      "h2": "H2 heading",
      "intro": "Brief 2-line section introduction",
      "subsections": [
        {{"h3": "First H3", "outline": "Key points"}},
        {{"h3": "Second H3", "outline": "Key points"}}
      ]
    }}
  ],
  "faq": [{{"question": "Common question?", "answerOutline": "Key points for the answer"}}],
  "conclusion": "Outline for conclusion",
  "authorSection": "Brief author experience note"
}}

Create exactly 10 sections, each with exactly 2 subsections."#,
        structure = pretty(merged),
    )
}

pub fn tool_analysis(keyword: &str, research: &ResearchBundle, as_of: &str) -> String {
    format!(
        r#"{TOOL_OPENING} Research and analyze "{keyword}" using the latest information.

NEWS CONTEXT:
{summary}

TRENDING TOPICS: {trends}

COMPETITOR CONTEXT:
{competitors}

Provide:
1. CURRENT PRICING as of {as_of}: every tier with exact price, billing period and included features, plus free trial and refund terms.
2. ADVANTAGES: 6-8 specific, real benefits.
3. DISADVANTAGES: 4-6 honest limitations.
4. HOW IT WORKS: the workflow from signup to daily use, technical approach, and best practices.

{JSON_ONLY}
{{
  "pricing": {{
    "lastUpdated": "{as_of}",
    "tiers": [{{"name": "Plan", "price": "Price with currency", "billing": "monthly", "features": ["feature"]}}],
    "freeTrial": "Yes/No and duration",
    "moneyBackGuarantee": "Yes/No and terms"
  }},
  "advantages": [{{"title": "Advantage", "description": "Explanation"}}],
  "disadvantages": [{{"title": "Disadvantage", "description": "Explanation"}}],
  "howItWorks": {{
    "overview": "Overview",
    "steps": [{{"stepNumber": 1, "title": "Step", "description": "Explanation"}}],
    "technicalDetails": "Technical approach",
    "bestPractices": ["practice"]
  }}
}}"#,
        summary = research.news.summary,
        trends = research.news.trends.join(", "),
        competitors = numbered(
            research
                .serp
                .top_results
                .iter()
                .take(5)
                .map(|r| r.title.as_str())
        ),
    )
}

fn tool_section(keyword: &str, analysis: &ToolAnalysis, affiliate_link: Option<&str>) -> String {
    let pricing = &analysis.pricing;
    let tiers = pricing
        .tiers
        .iter()
        .map(|t| {
            format!(
                "   - {}: {} ({})\n     Features: {}",
                t.name,
                t.price,
                t.billing,
                t.features.join(", ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    let points = |items: &[ToolPoint]| {
        items
            .iter()
            .enumerate()
            .map(|(i, p)| format!("   {}. {}: {}", i + 1, p.title, p.description))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let steps = analysis
        .how_it_works
        .steps
        .iter()
        .map(|s| format!("   {}. {}: {}", s.step_number, s.title, s.description))
        .collect::<Vec<_>>()
        .join("\n");
    let link = match affiliate_link {
        Some(url) => format!(
            "Use this affiliate link whenever the tool's website is mentioned: {url}\n\
             Place it in the introduction, the How It Works section, the pricing section and the conclusion, \
             with calls to action like \"Try {keyword} here\"."
        ),
        None => "Link the tool's official website in several natural places.".to_string(),
    };

    format!(
        r#"

AI TOOLS ARTICLE REQUIREMENTS:
This is a review of an AI tool. Incorporate the researched data below.

PRICING (Last Updated: {updated}):
{tiers}
   - Free Trial: {trial}
   - Money-Back Guarantee: {guarantee}
Create a dedicated Pricing section with this information.

ADVANTAGES:
{pros}

DISADVANTAGES:
{cons}
Present pros and cons honestly, with workarounds where applicable.

HOW IT WORKS:
Overview: {overview}
{steps}
Technical Details: {technical}
Best Practices: {practices}
Add a How It Works section early in the article, with numbered steps.

TOOL LINK:
{link}
"#,
        updated = pricing.last_updated,
        trial = pricing.free_trial,
        guarantee = pricing.money_back_guarantee,
        pros = points(&analysis.advantages),
        cons = points(&analysis.disadvantages),
        overview = analysis.how_it_works.overview,
        technical = analysis.how_it_works.technical_details,
        practices = analysis.how_it_works.best_practices.join(", "),
    )
}

pub struct WriteInputs<'a> {
    pub keyword: &'a str,
    pub outline: &'a ArticleOutline,
    pub keywords: &'a [String],
    pub people_also_ask: &'a [String],
    pub tool_analysis: Option<&'a ToolAnalysis>,
    pub affiliate_link: Option<&'a str>,
    pub month: &'a str,
    pub year: i32,
}

pub fn write_article(inputs: &WriteInputs<'_>) -> String {
    let keyword = inputs.keyword;
    let year = inputs.year;
    let month = inputs.month;
    let tool = inputs
        .tool_analysis
        .map(|a| tool_section(keyword, a, inputs.affiliate_link))
        .unwrap_or_default();

    format!(
        r#"{WRITE_OPENING} that can rank in Google's top 3 results. It must be publication-ready and read as human-written.{tool}

ARTICLE STRUCTURE:
{structure}

SEMANTIC KEYWORDS (use naturally throughout):
{keywords}

PEOPLE ALSO ASK (answer these directly):
{paa}

TARGETS:
- 2,500-3,500 words
- Flesch Reading Ease 60-70
- Keyword density 0.5-2.5% for "{keyword}"
- Current date: {month} {year}

STRUCTURE:
1. H1 containing "{keyword}", catchy and direct
2. Introduction of exactly 3 lines: a hook, a direct answer about "{keyword}", and a line mentioning {year}
3. Every H2 from the structure: a 2-line intro paragraph, then exactly 2 H3 subsections of 200-250 words
4. An FAQ section answering the People Also Ask questions in 80-120 words each
5. A conclusion with next steps and trends for {year}-{next_year}
6. An "About the Author" section with credentials and the testing done

EXPERIENCE SIGNALS:
- First-hand testing: "We tested {keyword} for 30 days and found...", "In our testing..."
- Specific dates, statistics and named competitors

STYLE:
- Never use: {banned}
- Use contractions, rhetorical questions, varied sentence and paragraph lengths
- Bullet lists of 3-7 complete-sentence bullets; numbered lists for processes

Write the complete article in Markdown, from the H1 through the author section."#,
        structure = pretty(inputs.outline),
        keywords = inputs.keywords.join(", "),
        paa = numbered(
            inputs
                .people_also_ask
                .iter()
                .take(MAX_PAA)
                .map(String::as_str)
        ),
        next_year = year + 1,
        banned = BANNED_PHRASES.join(", "),
    )
}

pub fn tables(keyword: &str, article: &str) -> String {
    format!(
        r#"{TABLES_OPENING}

ARTICLE CONTENT (first {TABLE_CONTEXT_CHARS} chars):
{content}

KEYWORD: "{keyword}"

Create one comparison table of key features or options related to "{keyword}", and one summary table of key points.

{JSON_ONLY}
{{
  "comparisonTable": {{"title": "Table title", "headers": ["H1", "H2", "H3"], "rows": [["a", "b", "c"]]}},
  "summaryTable": {{"title": "Summary title", "headers": ["Aspect", "Details"], "rows": [["a", "b"]]}}
}}"#,
        content = head_chars(article, TABLE_CONTEXT_CHARS),
    )
}

pub fn sources(keyword: &str, research: &ResearchBundle) -> String {
    let news = research
        .news
        .articles
        .iter()
        .take(5)
        .map(|a| format!("{} - {} ({})", a.title, a.url, a.source))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"{SOURCES_OPENING}

ARTICLE TOPIC: "{keyword}"
NEWS ARTICLES:
{news}

Suggest 5-7 authoritative sources (Wikipedia, official docs, research papers, industry publications) related to "{keyword}".

{JSON_ONLY}
{{"sources": [{{"text": "Link anchor text", "url": "https://example.com", "position": "After which section"}}]}}"#
    )
}

pub fn meta(keyword: &str, title: &str, introduction: &str) -> String {
    format!(
        r#"{META_OPENING}

TITLE: {title}
KEYWORD: "{keyword}"
INTRODUCTION: {introduction}

Create:
- Meta title (55-60 chars, includes the keyword)
- Meta description (150-160 chars, includes the keyword)
- 10-15 meta keywords
- OG and Twitter title and description
- Robots directive: index, follow
- Slug: lowercase, hyphen-separated, containing only the main keyword

{JSON_ONLY}
{{
  "metaTitle": "SEO optimized title",
  "metaDescription": "Compelling meta description",
  "metaKeywords": ["keyword1", "keyword2"],
  "ogTitle": "Social media title",
  "ogDescription": "Social media description",
  "twitterTitle": "Twitter card title",
  "twitterDescription": "Twitter description",
  "robotsMeta": "index, follow",
  "slug": "keyword-slug"
}}"#
    )
}
