//! core/names.rs
//! String transforms for names that end up on disk.

const LEADING_ARTICLES: [&str; 3] = ["A ", "An ", "The "];

/// Make a tag value safe to use as a file or directory name.
///
/// `? ! * /` become `_` and `&` becomes `n`. Nothing else is touched.
pub fn sanitize_for_filesystem(s: &str) -> String {
    s.chars()
        .map(|ch| match ch {
            '?' | '!' | '*' | '/' => '_',
            '&' => 'n',
            _ => ch,
        })
        .collect()
}

/// Drop one leading "A ", "An " or "The " (case-sensitive).
///
/// Only used for matching names against each other, never for display.
pub fn strip_leading_article(s: &str) -> &str {
    LEADING_ARTICLES
        .iter()
        .find_map(|article| s.strip_prefix(article))
        .unwrap_or(s)
}
