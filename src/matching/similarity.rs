// src/matching/similarity.rs

/// Normalized edit-distance ratio in [0, 1]. Returns 0.0 when either side is empty.
pub fn string_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(a, b).clamp(0.0, 1.0)
}

/// Mean `string_similarity` over every unordered pair whose two values are
/// both non-empty. `None` when no such pair exists.
pub fn average_pairwise_similarity(values: &[&str]) -> Option<f64> {
    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..values.len() {
        if values[i].is_empty() {
            continue;
        }
        for j in (i + 1)..values.len() {
            if values[j].is_empty() {
                continue;
            }
            total += string_similarity(values[i], values[j]);
            pairs += 1;
        }
    }
    if pairs == 0 {
        None
    } else {
        Some(total / pairs as f64)
    }
}
