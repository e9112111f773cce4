/// Canonicalize learner text before it is sent to the engine.
///
/// Every run of Unicode whitespace (non-breaking, en/em, figure, punctuation, thin and
/// ideographic spaces, tabs, line breaks) becomes one ASCII space, and the result is trimmed.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
