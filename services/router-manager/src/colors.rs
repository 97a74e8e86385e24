//! Display helpers derived from a category slug.

/// Keyword palette, matched in declaration order.
const CATEGORY_COLORS: &[(&str, &str)] = &[
    ("jailbreak", "red"),
    ("toxicity", "orange"),
    ("pii", "blue"),
    ("privacy", "blue"),
    ("safety", "green"),
    ("security", "red"),
    ("bias", "purple"),
    ("financial", "green"),
    ("legal", "blue"),
    ("sentiment", "purple"),
    ("uncategorized", "gray"),
];

pub const DEFAULT_COLOR: &str = "gray";

/// Exact keyword match first, then the first keyword contained in the slug,
/// then [`DEFAULT_COLOR`].
pub fn color_for_slug(slug: &str) -> &'static str {
    let slug = slug.to_lowercase();
    if let Some((_, color)) = CATEGORY_COLORS.iter().find(|(key, _)| *key == slug) {
        return *color;
    }
    CATEGORY_COLORS
        .iter()
        .find(|(key, _)| slug.contains(*key))
        .map(|(_, color)| *color)
        .unwrap_or(DEFAULT_COLOR)
}

/// `"prompt_injection-v2"` becomes `"Prompt Injection V2"`.
pub fn name_from_slug(slug: &str) -> String {
    slug.split(|c: char| c == '-' || c == '_' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
