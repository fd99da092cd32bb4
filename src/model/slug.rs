//! Title normalization for guess comparisons.

use unicode_normalization::UnicodeNormalization;
use zhconv::{Variant, zhconv};

/// Normalize a song title so listener guesses can be compared to it.
///
/// Rules, applied in order:
/// - NFKC: full-width forms, the ideographic space and other compatibility
///   characters fold to their canonical forms
/// - ignore everything from the first `(` onwards
/// - Traditional Chinese folds to Simplified
/// - `&` becomes `and`
/// - anything that is not alphanumeric (punctuation, symbols, emoji,
///   whitespace) is dropped
/// - lowercase
pub fn slugify(title: &str) -> String {
    let normalized: String = title.nfkc().collect();
    let core = match normalized.find('(') {
        Some(cut) => &normalized[..cut],
        None => normalized.as_str(),
    };
    let core = zhconv(core, Variant::ZhHans);

    let mut out = String::with_capacity(core.len());
    for c in core.chars() {
        if c == '&' {
            out.push_str("and");
        } else if c.is_alphanumeric() {
            // Some lowercase mappings add combining marks; keep letters only.
            out.extend(c.to_lowercase().filter(|l| l.is_alphanumeric()));
        }
    }
    out
}
