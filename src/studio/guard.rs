// Prompt guard - literal substring denylist

/// Substrings that make a prompt unacceptable, matched case-insensitively
pub const BANNED_KEYWORDS: [&str; 7] = [
    "nude", "naked", "nsfw", "gore", "bloody", "violence", "sex",
];

/// Returns false if any banned keyword occurs anywhere in the prompt.
///
/// Matching is by substring, not whole word, so benign context does not
/// rescue a prompt. The empty prompt is allowed; emptiness is checked by
/// request validation.
pub fn is_allowed(prompt: &str) -> bool {
    let lowered = prompt.to_lowercase();
    !BANNED_KEYWORDS.iter().any(|word| lowered.contains(word))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banned_word_in_benign_context() {
        assert!(!is_allowed("a nude statue in a museum"));
    }

    #[test]
    fn test_any_casing_is_rejected() {
        for word in BANNED_KEYWORDS {
            let upper = format!("A {} SCENE", word.to_uppercase());
            let mixed: String = word
                .chars()
                .enumerate()
                .map(|(i, c)| if i % 2 == 0 { c.to_ascii_uppercase() } else { c })
                .collect();
            assert!(!is_allowed(&upper), "{upper}");
            assert!(!is_allowed(&mixed), "{mixed}");
        }
    }

    #[test]
    fn test_substring_not_whole_word() {
        assert!(!is_allowed("an essex countryside"));
        assert!(!is_allowed("goregeous sunset"));
    }

    #[test]
    fn test_clean_prompts_allowed() {
        assert!(is_allowed("a futuristic city at sunset, highly detailed"));
        assert!(is_allowed("a cozy study room with warm lights"));
        assert!(is_allowed(""));
    }
}
