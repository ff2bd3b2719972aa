//! Text cleaning and vector normalization shared by the build and query paths.
//!
//! Cleaning prepares article text for the embedding service:
//! 1. Strip NUL bytes
//! 2. Normalize line endings to `\n`
//! 3. Truncate to `MAX_INPUT_CHARS` to stay under the model token limit
//! 4. Trim, and reject anything shorter than `MIN_INPUT_CHARS`

/// Maximum characters sent to the embedding service per text
pub const MAX_INPUT_CHARS: usize = 50_000;

/// Shorter texts carry no signal worth embedding
const MIN_INPUT_CHARS: usize = 5;

/// Added to the norm so zero vectors normalize to zero instead of NaN
pub const NORM_EPSILON: f32 = 1e-12;

/// Clean text for embedding. Returns `None` when nothing useful is left.
pub fn clean_text(text: &str) -> Option<String> {
    let text = text
        .replace('\0', "")
        .replace("\r\n", "\n")
        .replace('\r', "\n");

    let text = truncate_chars(&text, MAX_INPUT_CHARS);
    let text = text.trim();

    if text.chars().count() < MIN_INPUT_CHARS {
        return None;
    }

    Some(text.to_string())
}

/// Cut `text` to at most `max_chars` characters without splitting a UTF-8 sequence.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Compute L2 norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale `v` to unit length in place, dividing by `norm + NORM_EPSILON`.
pub fn normalize(v: &mut [f32]) {
    let norm = l2_norm(v) + NORM_EPSILON;
    for x in v.iter_mut() {
        *x /= norm;
    }
}

pub fn normalized(mut v: Vec<f32>) -> Vec<f32> {
    normalize(&mut v);
    v
}

/// Inner product of two equally sized vectors.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_strips_nul_and_line_endings() {
        let cleaned = clean_text("  hello\0 world\r\nsecond\rthird  ").unwrap();
        assert_eq!(cleaned, "hello world\nsecond\nthird");
    }

    #[test]
    fn test_clean_rejects_near_empty() {
        assert!(clean_text("").is_none());
        assert!(clean_text("   \n\t ").is_none());
        assert!(clean_text(" abcd ").is_none());
        assert!(clean_text("\0\0\0\0\0\0").is_none());
        assert_eq!(clean_text("abcde"), Some("abcde".to_string()));
    }

    #[test]
    fn test_clean_truncates_long_text() {
        let long = "é".repeat(MAX_INPUT_CHARS + 100);
        let cleaned = clean_text(&long).unwrap();
        assert_eq!(cleaned.chars().count(), MAX_INPUT_CHARS);
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
        assert_eq!(truncate_chars("hi", 0), "");
    }

    #[test]
    fn test_normalize_unit_norm() {
        for v in [
            vec![3.0, 4.0],
            vec![1e-3, -2e-3, 5e-4],
            vec![100.0, 0.0, -100.0, 7.0],
        ] {
            let n = normalized(v);
            assert!((l2_norm(&n) - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_normalize_zero_vector_stays_finite() {
        let n = normalized(vec![0.0; 8]);
        assert!(n.iter().all(|x| x.is_finite()));
        assert_eq!(l2_norm(&n), 0.0);
    }

    #[test]
    fn test_dot_of_unit_vectors_is_cosine() {
        let a = normalized(vec![1.0, 1.0]);
        let b = normalized(vec![1.0, 0.0]);
        assert!((dot(&a, &b) - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-5);
        assert!((dot(&a, &a) - 1.0).abs() < 1e-5);
    }
}
