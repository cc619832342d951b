//! Article images from a URL-parameterised text-to-image endpoint.
//!
//! The endpoint renders on GET, so a successful fetch of the prompt URL both
//! generates the image and gives us a stable URL to embed.

use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

const IMAGE_WIDTH: u32 = 1024;
const IMAGE_HEIGHT: u32 = 768;
const IMAGE_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("image endpoint returned status {0}")]
    Status(u16),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedImage {
    pub url: String,
}

/// Where an image goes in the article; each slot has its own prompt styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSlot {
    Hero,
    Illustration,
    Supporting,
}

impl ImageSlot {
    pub fn label(self) -> &'static str {
        match self {
            ImageSlot::Hero => "hero",
            ImageSlot::Illustration => "middle",
            ImageSlot::Supporting => "bottom",
        }
    }
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, ImageError>;
}

pub struct PollinationsClient {
    http: Client,
    base_url: String,
}

impl PollinationsClient {
    pub fn new(base_url: String) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: Client::builder().timeout(IMAGE_TIMEOUT).build()?,
            base_url,
        })
    }

    pub fn image_url(&self, prompt: &str) -> String {
        format!(
            "{}/prompt/{}?width={IMAGE_WIDTH}&height={IMAGE_HEIGHT}&nologo=true&enhance=true",
            self.base_url,
            urlencoding::encode(prompt)
        )
    }
}

#[async_trait]
impl ImageGenerator for PollinationsClient {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, ImageError> {
        let url = self.image_url(prompt);
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            warn!("Image endpoint returned {}", response.status());
            return Err(ImageError::Status(response.status().as_u16()));
        }
        // Drain the body so the render completes before we hand out the URL.
        let bytes = response.bytes().await?;
        info!("Image generated ({} bytes)", bytes.len());
        Ok(GeneratedImage { url })
    }
}

/// One of three prompt styles for `slot`, picked at random.
pub fn create_image_prompt(title: &str, slot: ImageSlot) -> String {
    let templates: [String; 3] = match slot {
        ImageSlot::Hero => [
            format!(
                "Create a professional, high-quality featured image for an article titled \"{title}\".\n\
                 Style: modern, clean, tech-focused design with vibrant colors.\n\
                 Include: abstract geometric shapes, gradient backgrounds, technology-themed elements.\n\
                 Requirements: professional, eye-catching, suitable for a tech blog header, 4K quality, HDR."
            ),
            format!(
                "Design a stunning featured image for a blog post about \"{title}\".\n\
                 Style: sleek, contemporary, minimalist with bold typography and dynamic composition.\n\
                 Elements: futuristic tech imagery, digital patterns, AI-themed visuals.\n\
                 Quality: high resolution, professional photography style, dramatic lighting."
            ),
            format!(
                "Generate a captivating hero image for an article on \"{title}\".\n\
                 Style: professional tech publication aesthetic, vibrant and modern.\n\
                 Include: innovative design elements, abstract tech visuals, clean composition.\n\
                 Requirements: magazine-quality, 4K resolution, suitable for professional blog."
            ),
        ],
        ImageSlot::Illustration => [
            format!(
                "Create a supporting illustration for an article about \"{title}\".\n\
                 Style: informative, visually engaging, complementary to content.\n\
                 Include: relevant icons, diagrams, or concept visualization.\n\
                 Requirements: clear, professional, contextual to the topic."
            ),
            format!(
                "Design an inline content image for \"{title}\".\n\
                 Style: clean, modern, informative visualization.\n\
                 Elements: schematic representations, workflow diagrams, or conceptual imagery.\n\
                 Quality: professional, blog-friendly, informative."
            ),
            format!(
                "Generate a mid-article illustration for \"{title}\".\n\
                 Style: supporting visual content, professional design.\n\
                 Include: concept visualization, process illustration, or thematic imagery.\n\
                 Requirements: complementary to article content, visually appealing."
            ),
        ],
        ImageSlot::Supporting => [
            format!(
                "Create a step-by-step guide visual for \"{title}\".\n\
                 Style: practical, instructional, easy to scan.\n\
                 Include: numbered stages, arrows, simple interface mockups.\n\
                 Requirements: clear hierarchy, professional, blog-friendly."
            ),
            format!(
                "Design a practical how-to illustration for an article about \"{title}\".\n\
                 Style: flat design, friendly, modern color palette.\n\
                 Elements: people using technology, checklists, progress indicators.\n\
                 Quality: crisp, high resolution, suitable for the end of a long article."
            ),
            format!(
                "Generate a summary infographic-style image for \"{title}\".\n\
                 Style: clean layout with icons and visual groupings.\n\
                 Include: key takeaways as visual blocks, subtle tech motifs.\n\
                 Requirements: professional, readable at blog width, no text clutter."
            ),
        ],
    };

    templates
        .choose(&mut rand::thread_rng())
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Returns a deterministic URL per prompt, or fails every call.
    pub struct FakeImages {
        pub fail_all: bool,
    }

    #[async_trait]
    impl ImageGenerator for FakeImages {
        async fn generate(&self, prompt: &str) -> Result<GeneratedImage, ImageError> {
            if self.fail_all {
                return Err(ImageError::Status(503));
            }
            Ok(GeneratedImage {
                url: format!("https://img.test/{}.png", prompt.len()),
            })
        }
    }
}
