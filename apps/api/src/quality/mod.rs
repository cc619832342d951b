//! Content Quality Analyzer: scores a finished article against a fixed rubric.
//!
//! `analyze` is a pure function of (markdown, html, keyword). The report is
//! advisory; nothing in the pipeline regenerates on a low score.
//!
//! Rubric (max 100):
//! - length in 2000..=4500 words → 20, else ≥1500 → 10
//! - ≥6 H2 → 15, ≥10 H3 → 15
//! - ≥15 paragraphs → 10
//! - readability 50..=80 → 15, else 40..=90 → 8
//! - keyword density 0.5..=2.5 % → 10
//! - introduction → 5, conclusion → 5
//! - ≥3 images → 5, ≥5 links → 5
//! - AI-detection score <20 → +10, <30 → +5, otherwise −10

use std::collections::HashMap;

use serde::Serialize;

const MIN_WORDS: usize = 2000;
const MAX_WORDS: usize = 4500;
const PARTIAL_WORDS: usize = 1500;
const MIN_H2: usize = 6;
const MIN_H3: usize = 10;
const MIN_PARAGRAPHS: usize = 15;
const PARAGRAPH_MIN_CHARS: usize = 50;
const MIN_IMAGES: usize = 3;
const MIN_LINKS: usize = 5;
const AI_SCORE_WARN: u32 = 30;

const INTRO_MARKERS: &[&str] = &[
    "in this article",
    "this guide",
    "we will explore",
    "introduction",
    "overview",
    "in this post",
];

const CONCLUSION_MARKERS: &[&str] = &[
    "conclusion",
    "final thoughts",
    "in summary",
    "to sum up",
    "in conclusion",
    "wrapping up",
];

/// Phrases that read as machine-written; each hit costs 5 points.
const AI_PHRASES: &[&str] = &[
    "delve into",
    "delving",
    " realm",
    "landscape of",
    "navigating",
    "tailored",
    "seamlessly",
    "it's important to note",
    "it's worth noting",
    "worth mentioning",
    "in the ever-evolving",
    "in today's fast-paced",
    "in today's digital age",
    "unlock the",
    "harness the",
    "leverage",
    "game-changer",
    "revolutionize",
    "whether you're a beginner or",
    "whether you're new to",
    "dive deep into",
    "embark on",
];

const TRANSITION_ALLOWANCE: usize = 3;

// ────────────────────────────────────────────────────────────────────────────
// Report
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityFlags {
    pub has_introduction: bool,
    pub has_conclusion: bool,
    #[serde(rename = "hasFAQ")]
    pub has_faq: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    pub overall_score: u32,
    pub word_count: usize,
    pub heading_count: usize,
    pub paragraph_count: usize,
    pub readability_score: f64,
    pub keyword_density: f64,
    pub flags: QualityFlags,
    pub image_count: usize,
    pub link_count: usize,
    pub ai_detection_score: u32,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

struct HeadingCounts {
    h2: usize,
    h3: usize,
}

// ────────────────────────────────────────────────────────────────────────────
// Analysis
// ────────────────────────────────────────────────────────────────────────────

pub fn analyze(markdown: &str, html: &str, keyword: &str) -> QualityReport {
    let word_count = count_words(markdown);
    let headings = count_headings(markdown);
    let paragraph_count = markdown
        .split("\n\n")
        .filter(|p| p.trim().chars().count() > PARAGRAPH_MIN_CHARS)
        .count();
    let readability = readability(markdown);
    let density = keyword_density(markdown, keyword);
    let ai_score = ai_detection_score(markdown);

    let lowered = markdown.to_lowercase();
    let flags = QualityFlags {
        has_introduction: has_introduction(markdown),
        has_conclusion: has_conclusion(markdown),
        has_faq: lowered.contains("faq") || lowered.contains("frequently asked"),
    };

    let image_count = html.matches("<img").count();
    let link_count = html.matches("<a href").count();

    let mut issues = Vec::new();
    let mut recommendations = Vec::new();

    if word_count < MIN_WORDS {
        issues.push(format!("Content too short: {word_count} words (minimum {MIN_WORDS})"));
        recommendations.push("Add more detailed sections, examples, and explanations".to_string());
    }
    if word_count > MAX_WORDS {
        issues.push(format!(
            "Content too long: {word_count} words (maximum {MAX_WORDS} for readability)"
        ));
        recommendations.push(
            "Consider breaking into multiple articles or removing redundant content".to_string(),
        );
    }
    if headings.h2 < MIN_H2 {
        issues.push(format!("Too few H2 headings: {} (minimum {MIN_H2})", headings.h2));
        recommendations.push("Add more main sections to improve structure".to_string());
    }
    if headings.h3 < MIN_H3 {
        issues.push(format!("Too few H3 headings: {} (minimum {MIN_H3})", headings.h3));
        recommendations.push("Add subsections to break down complex topics".to_string());
    }
    if paragraph_count < MIN_PARAGRAPHS {
        issues.push(format!(
            "Too few paragraphs: {paragraph_count} (minimum {MIN_PARAGRAPHS})"
        ));
        recommendations.push("Break down content into more digestible paragraphs".to_string());
    }
    if !(50.0..=80.0).contains(&readability) {
        issues.push(format!(
            "Readability score out of range: {readability:.1} (target 50-80)"
        ));
        recommendations.push(if readability < 50.0 {
            "Simplify sentences and use shorter words".to_string()
        } else {
            "Add more depth and complexity to the content".to_string()
        });
    }
    if !(0.5..=2.5).contains(&density) {
        issues.push(format!(
            "Keyword density out of range: {density:.2}% (target 0.5-2.5%)"
        ));
        recommendations.push(if density < 0.5 {
            format!("Include keyword \"{keyword}\" more naturally throughout content")
        } else {
            format!("Reduce keyword \"{keyword}\" usage to avoid keyword stuffing")
        });
    }
    if !flags.has_introduction {
        issues.push("No clear introduction found".to_string());
        recommendations.push("Add a 2-3 paragraph introduction explaining the topic".to_string());
    }
    if !flags.has_conclusion {
        issues.push("No clear conclusion found".to_string());
        recommendations.push("Add a conclusion summarizing key points".to_string());
    }
    if !flags.has_faq {
        recommendations.push("Consider adding an FAQ section for better SEO".to_string());
    }
    if image_count < MIN_IMAGES {
        issues.push(format!("Too few images: {image_count} (minimum {MIN_IMAGES})"));
        recommendations.push("Add relevant images to improve engagement".to_string());
    }
    if link_count < MIN_LINKS {
        issues.push(format!("Too few links: {link_count} (minimum {MIN_LINKS})"));
        recommendations.push("Add authoritative external sources and internal links".to_string());
    }
    if ai_score > AI_SCORE_WARN {
        issues.push(format!(
            "High AI-detection score: {ai_score}/100 (AI-like patterns detected)"
        ));
        recommendations
            .push("Content contains AI-telltale phrases - needs human rewriting".to_string());
    }

    let overall_score = overall_score(
        word_count,
        &headings,
        paragraph_count,
        readability,
        density,
        &flags,
        image_count,
        link_count,
        ai_score,
    );

    QualityReport {
        overall_score,
        word_count,
        heading_count: headings.h2 + headings.h3,
        paragraph_count,
        readability_score: readability,
        keyword_density: density,
        flags,
        image_count,
        link_count,
        ai_detection_score: ai_score,
        issues,
        recommendations,
    }
}

fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

fn count_headings(markdown: &str) -> HeadingCounts {
    HeadingCounts {
        h2: static_regex!(r"(?m)^## .+$").find_iter(markdown).count(),
        h3: static_regex!(r"(?m)^### .+$").find_iter(markdown).count(),
    }
}

fn sentences(text: &str) -> impl Iterator<Item = &str> {
    static_regex!(r"[.!?]+")
        .split(text)
        .filter(|s| !s.trim().is_empty())
}

/// Flesch reading ease, clamped to 0..=100.
pub fn readability(text: &str) -> f64 {
    let sentence_count = sentences(text).count();
    let words: Vec<&str> = text.split_whitespace().collect();
    if sentence_count == 0 || words.is_empty() {
        return 0.0;
    }

    let syllables: usize = words.iter().map(|w| count_syllables(w)).sum();
    let words_per_sentence = words.len() as f64 / sentence_count as f64;
    let syllables_per_word = syllables as f64 / words.len() as f64;

    (206.835 - 1.015 * words_per_sentence - 84.6 * syllables_per_word).clamp(0.0, 100.0)
}

/// Vowel groups, minus a silent trailing "e"; short words count as one.
pub fn count_syllables(word: &str) -> usize {
    let letters: Vec<char> = word
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase())
        .collect();
    if letters.len() <= 3 {
        return 1;
    }

    let mut count = 0usize;
    let mut previous_vowel = false;
    for c in &letters {
        let vowel = "aeiouy".contains(*c);
        if vowel && !previous_vowel {
            count += 1;
        }
        previous_vowel = vowel;
    }
    if letters.last() == Some(&'e') {
        count = count.saturating_sub(1);
    }
    count.max(1)
}

/// Occurrences of the keyword phrase per hundred words.
pub fn keyword_density(text: &str, keyword: &str) -> f64 {
    let keyword = keyword.trim().to_lowercase();
    let word_count = count_words(text);
    if keyword.is_empty() || word_count == 0 {
        return 0.0;
    }
    let hits = text.to_lowercase().matches(keyword.as_str()).count();
    hits as f64 / word_count as f64 * 100.0
}

fn has_introduction(markdown: &str) -> bool {
    let opening = markdown
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(5)
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    INTRO_MARKERS.iter().any(|m| opening.contains(m))
}

fn has_conclusion(markdown: &str) -> bool {
    let lines: Vec<&str> = markdown.lines().filter(|l| !l.trim().is_empty()).collect();
    let closing = lines[lines.len().saturating_sub(10)..]
        .join(" ")
        .to_lowercase();
    CONCLUSION_MARKERS.iter().any(|m| closing.contains(m))
}

/// Heuristic 0..=100 measure of machine-sounding prose.
pub fn ai_detection_score(text: &str) -> u32 {
    let lowered = text.to_lowercase();
    let mut score = 0usize;

    for phrase in AI_PHRASES {
        score += lowered.matches(phrase).count() * 5;
    }

    let mut transitions: HashMap<&str, usize> = HashMap::new();
    for m in static_regex!(r"\b(additionally|furthermore|moreover|consequently)\b").find_iter(&lowered) {
        *transitions.entry(m.as_str()).or_insert(0) += 1;
    }
    for count in transitions.values() {
        if *count > TRANSITION_ALLOWANCE {
            score += (count - TRANSITION_ALLOWANCE) * 3;
        }
    }

    let long_sentences = sentences(text).filter(|s| s.trim().len() > 20).count();
    let contractions = static_regex!(
        r"\b(don't|can't|won't|it's|we're|that's|here's|let's|i'm|you're)\b"
    )
    .find_iter(&lowered)
    .count();
    let contraction_ratio = if long_sentences > 0 {
        contractions as f64 / long_sentences as f64
    } else {
        0.0
    };
    if contraction_ratio < 0.05 {
        score += 15;
    }

    let first_person = static_regex!(
        r"\b(we tested|in our testing|we found|we noticed|in our experience|we tried)\b"
    )
    .find_iter(&lowered)
    .count();
    if first_person < 3 {
        score += 10;
    }

    score.min(100) as u32
}

#[allow(clippy::too_many_arguments)]
fn overall_score(
    word_count: usize,
    headings: &HeadingCounts,
    paragraph_count: usize,
    readability: f64,
    density: f64,
    flags: &QualityFlags,
    image_count: usize,
    link_count: usize,
    ai_score: u32,
) -> u32 {
    let mut score: i32 = 0;

    if (MIN_WORDS..=MAX_WORDS).contains(&word_count) {
        score += 20;
    } else if word_count >= PARTIAL_WORDS {
        score += 10;
    }

    if headings.h2 >= MIN_H2 {
        score += 15;
    }
    if headings.h3 >= MIN_H3 {
        score += 15;
    }
    if paragraph_count >= MIN_PARAGRAPHS {
        score += 10;
    }

    if (50.0..=80.0).contains(&readability) {
        score += 15;
    } else if (40.0..=90.0).contains(&readability) {
        score += 8;
    }

    if (0.5..=2.5).contains(&density) {
        score += 10;
    }

    if flags.has_introduction {
        score += 5;
    }
    if flags.has_conclusion {
        score += 5;
    }
    if image_count >= MIN_IMAGES {
        score += 5;
    }
    if link_count >= MIN_LINKS {
        score += 5;
    }

    score += match ai_score {
        s if s < 20 => 10,
        s if s < 30 => 5,
        _ => -10,
    };

    score.clamp(0, 100) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_fixture_scores_five() {
        // 50 words, no headings, one paragraph, readability clamps to 100,
        // density 50%. Only the AI bracket scores: 15 (no contractions)
        // + 10 (no first-person testing) = 25 → +5.
        let markdown = "Cats nap. ".repeat(25);
        let report = analyze(&markdown, "", "cats");

        assert_eq!(report.word_count, 50);
        assert_eq!(report.heading_count, 0);
        assert_eq!(report.paragraph_count, 1);
        assert_eq!(report.readability_score, 100.0);
        assert_eq!(report.keyword_density, 50.0);
        assert_eq!(report.ai_detection_score, 25);
        assert!(!report.flags.has_faq);
        assert_eq!(report.overall_score, 5);
        assert!(report
            .issues
            .iter()
            .any(|i| i.starts_with("Content too short: 50 words")));
    }

    #[test]
    fn test_analyze_is_idempotent() {
        let markdown = "## Overview\n\nIn this article we tested the tool. It's fast.\n\n## Conclusion\n\nFinal thoughts here.";
        let html = "<p><a href=\"x\">x</a></p><img src=\"y\">";
        assert_eq!(
            analyze(markdown, html, "tool"),
            analyze(markdown, html, "tool")
        );
    }

    #[test]
    fn test_heading_counts_do_not_overlap() {
        let counts = count_headings("# T\n## A\n### a1\n### a2\n## B\n#### deep");
        assert_eq!(counts.h2, 2);
        assert_eq!(counts.h3, 2);
    }

    #[test]
    fn test_syllables() {
        assert_eq!(count_syllables("cat"), 1);
        assert_eq!(count_syllables("make"), 1);
        assert_eq!(count_syllables("reading"), 2);
        assert_eq!(count_syllables("beautiful"), 3);
        assert_eq!(count_syllables("123"), 1);
    }

    #[test]
    fn test_ai_phrases_and_transitions_raise_score() {
        let text = "Let's delve into the realm of tools. We tested it, we found it, we tried it. \
                    Moreover this. Moreover that. Moreover again. Moreover once more.";
        // delve into 5, " realm" 5, one transition over allowance 3.
        // Contractions present and three first-person markers.
        assert_eq!(ai_detection_score(text), 13);
    }

    #[test]
    fn test_intro_and_conclusion_markers() {
        let markdown = "# Title\n\nIn this article we cover basics.\n\n## Body\n\ntext\n\n## Final Thoughts\n\nbye";
        let report = analyze(markdown, "", "basics");
        assert!(report.flags.has_introduction);
        assert!(report.flags.has_conclusion);
    }

    #[test]
    fn test_empty_input() {
        let report = analyze("", "", "anything");
        assert_eq!(report.word_count, 0);
        assert_eq!(report.readability_score, 0.0);
        assert_eq!(report.keyword_density, 0.0);
    }
}
