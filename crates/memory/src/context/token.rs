//! Token estimation utilities.
//!
//! Uses a character-class heuristic: CJK ideographs cost ~1.5 tokens each,
//! everything else ~4 characters per token. The estimate is deliberately
//! cheap; it only has to be consistent, not exact.

/// Weight of one CJK ideograph.
const CJK_WEIGHT: f64 = 1.5;

/// Weight of any other character (1 token ≈ 4 chars).
const OTHER_WEIGHT: f64 = 0.25;

fn is_cjk(c: char) -> bool {
    ('\u{4E00}'..='\u{9FFF}').contains(&c)
}

/// Estimate the token count for a string. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    let (cjk, other) = text.chars().fold((0usize, 0usize), |(cjk, other), c| {
        if is_cjk(c) {
            (cjk + 1, other)
        } else {
            (cjk, other + 1)
        }
    });
    (cjk as f64 * CJK_WEIGHT + other as f64 * OTHER_WEIGHT).ceil() as usize
}
