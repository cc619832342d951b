//! Deterministic stand-ins for the optional steps, built from data the run
//! already has.

use crate::generation::models::{
    ArticleOutline, FaqOutline, HeadingStructure, HowItWorks, OutlineSection, OutlineSubsection,
    Pricing, PricingTier, ToolAnalysis, ToolPoint, WorkflowStep,
};

/// Outline built straight from the merged headings. Every section gets at
/// least one subsection.
pub fn outline_from_headings(keyword: &str, merged: &HeadingStructure) -> ArticleOutline {
    let sections = merged
        .headings
        .iter()
        .map(|heading| {
            let mut subsections: Vec<OutlineSubsection> = heading
                .h3
                .iter()
                .filter(|h3| !h3.trim().is_empty())
                .map(|h3| OutlineSubsection {
                    h3: h3.clone(),
                    outline: format!(
                        "Detailed explanation of {} including key points and practical examples.",
                        h3.to_lowercase()
                    ),
                })
                .collect();
            if subsections.is_empty() {
                subsections.push(OutlineSubsection {
                    h3: format!("Key aspects of {}", heading.h2),
                    outline: format!("Core points about {} and {keyword}.", heading.h2.to_lowercase()),
                });
            }
            OutlineSection {
                h2: heading.h2.clone(),
                intro: format!(
                    "Learn about {} and how it relates to {keyword}.",
                    heading.h2.to_lowercase()
                ),
                subsections,
            }
        })
        .collect();

    ArticleOutline {
        h1: merged.h1.clone(),
        introduction: format!(
            "Discover everything you need to know about {keyword}. This comprehensive guide covers \
             all aspects of {keyword} to help you make informed decisions. Learn about features, \
             benefits, and best practices."
        ),
        sections,
        faq: vec![
            FaqOutline {
                question: format!("What is {keyword}?"),
                answer_outline: format!("{keyword} is explained with key features and benefits."),
            },
            FaqOutline {
                question: format!("How does {keyword} work?"),
                answer_outline: format!(
                    "Explanation of how {keyword} functions and its core mechanisms."
                ),
            },
            FaqOutline {
                question: format!("What are the benefits of {keyword}?"),
                answer_outline: format!("Key advantages and benefits of using {keyword}."),
            },
        ],
        conclusion: format!(
            "{keyword} offers powerful capabilities for users. Understanding its features and \
             applications helps you maximize its potential."
        ),
        author_section: "Expert insights on AI tools and technology from industry professionals."
            .to_string(),
    }
}

/// Minimal analysis block pointing readers at the vendor for specifics.
pub fn tool_analysis(keyword: &str, as_of: &str) -> ToolAnalysis {
    let point = |title: &str, description: String| ToolPoint {
        title: title.to_string(),
        description,
    };
    let step = |n: u32, title: &str, description: &str| WorkflowStep {
        step_number: n,
        title: title.to_string(),
        description: description.to_string(),
    };

    ToolAnalysis {
        pricing: Pricing {
            last_updated: as_of.to_string(),
            tiers: vec![PricingTier {
                name: "Contact for pricing".into(),
                price: "Custom".into(),
                billing: "Contact sales".into(),
                features: Vec::new(),
            }],
            free_trial: "Check official website".into(),
            money_back_guarantee: "Check official website".into(),
        },
        advantages: vec![
            point(
                "Powerful Features",
                format!("{keyword} offers comprehensive functionality"),
            ),
            point("User-Friendly", "Easy to use interface".to_string()),
        ],
        disadvantages: vec![point(
            "Pricing",
            "May be expensive for some users".to_string(),
        )],
        how_it_works: HowItWorks {
            overview: format!(
                "{keyword} is an AI-powered tool that helps users achieve their goals"
            ),
            steps: vec![
                step(1, "Sign Up", "Create an account"),
                step(2, "Configure", "Set up your preferences"),
                step(3, "Use", "Start using the tool"),
            ],
            technical_details: "Powered by advanced AI technology".into(),
            best_practices: vec!["Start with free trial".into(), "Explore all features".into()],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::models::HeadingGroup;

    #[test]
    fn test_outline_from_ten_headings() {
        let merged = HeadingStructure {
            h1: "Ultimate Guide".into(),
            headings: (1..=10)
                .map(|i| HeadingGroup {
                    h2: format!("Section {i}"),
                    h3: if i % 2 == 0 {
                        vec![format!("Sub {i}a"), format!("Sub {i}b")]
                    } else {
                        Vec::new()
                    },
                })
                .collect(),
        };

        let outline = outline_from_headings("notion ai", &merged);
        assert_eq!(outline.h1, "Ultimate Guide");
        assert_eq!(outline.sections.len(), 10);
        assert!(outline.sections.iter().all(|s| !s.subsections.is_empty()));
        assert_eq!(outline.sections[0].subsections[0].h3, "Key aspects of Section 1");
        assert_eq!(outline.sections[1].subsections.len(), 2);
        assert_eq!(outline.faq.len(), 3);
        assert!(outline.introduction.contains("notion ai"));
    }

    #[test]
    fn test_tool_analysis_fallback() {
        let analysis = tool_analysis("Jasper", "March 2025");
        assert_eq!(analysis.pricing.last_updated, "March 2025");
        assert_eq!(analysis.pricing.tiers[0].name, "Contact for pricing");
        assert_eq!(analysis.how_it_works.steps.len(), 3);
    }
}
