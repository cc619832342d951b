// Shared prompt fragments.
// Each step's full prompt lives in generation::prompts; these are the pieces
// every JSON step or writing step repeats.

/// Closing instruction for every JSON-mode step, placed right before the
/// example shape.
pub const JSON_ONLY: &str = "RESPOND WITH JSON ONLY. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Phrases the writing step is told to avoid; most of them also count
/// against the article's AI-detection score.
pub const BANNED_PHRASES: &[&str] = &[
    "delve",
    "delving",
    "realm",
    "landscape",
    "navigating",
    "tailored",
    "seamlessly",
    "revolutionize",
    "game-changer",
    "unlock",
    "harness",
    "leverage",
    "embark",
    "it's important to note",
    "it's worth noting",
    "in the ever-evolving",
    "in today's fast-paced",
    "robust",
    "cutting-edge",
    "holistic",
    "paradigm shift",
];
