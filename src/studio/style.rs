// Style augmenter - appends a descriptor phrase for the chosen style

use super::types::Style;

const STYLE_SUFFIXES: [(&str, &str); 4] = [
    (
        "Photorealistic",
        "ultra realistic, 8k, professional photography, sharp focus, high dynamic range",
    ),
    (
        "Artistic / Painting",
        "oil painting, brush strokes, rich texture, artstation, highly detailed",
    ),
    (
        "Cartoon / Anime",
        "anime style, clean lines, cell shading, vibrant colors",
    ),
    (
        "Concept Art",
        "concept art, matte painting, dramatic lighting, highly detailed, cinematic",
    ),
];

/// Descriptor phrase for a style label, empty for unknown labels
pub fn style_suffix(label: &str) -> &'static str {
    STYLE_SUFFIXES
        .iter()
        .find(|(known, _)| *known == label)
        .map(|(_, suffix)| *suffix)
        .unwrap_or("")
}

/// `"{prompt}, {suffix}"` for a style label.
///
/// An unknown label still gets the separator: the result is `"{prompt}, "`.
pub fn apply_style_label(prompt: &str, label: &str) -> String {
    format!("{}, {}", prompt, style_suffix(label))
}

/// `"{prompt}, {suffix}"` for a known style
pub fn apply_style(prompt: &str, style: Style) -> String {
    apply_style_label(prompt, style.label())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cartoon_fox() {
        assert_eq!(
            apply_style("a fox", Style::Cartoon),
            "a fox, anime style, clean lines, cell shading, vibrant colors"
        );
    }

    #[test]
    fn test_every_style_keeps_prompt_prefix() {
        for style in Style::ALL {
            let styled = apply_style("a quiet harbor", style);
            assert!(styled.starts_with("a quiet harbor, "));
            assert!(styled.len() > "a quiet harbor, ".len(), "{style} has no suffix");
        }
    }

    #[test]
    fn test_unknown_label_leaves_trailing_separator() {
        assert_eq!(apply_style_label("a fox", "Watercolor"), "a fox, ");
        assert_eq!(apply_style_label("a fox", ""), "a fox, ");
    }
}
