//! Extraction of `(label, confidence)` pairs from the remote detail text.
//!
//! The remote endpoint reports detections as free text, for example
//! `Objects found: 2 (dog, 0.91) (cat, 0.55)` or `person (0.95), car: 0.87`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Detection {
    pub label: String,
    pub confidence: f64,
}

const SEPARATORS: [char; 6] = [',', ';', ':', '\n', '|', ')'];

/// Parses every detection mentioned in `text`, highest confidence first.
///
/// Recognised forms are `(label, 0.91)`, `label (0.91)` and `label: 0.91`.
/// A colon form needs a fractional score, so counts like `Objects found: 1`
/// are not mistaken for detections.
pub fn parse_detections(text: &str) -> Vec<Detection> {
    let mut detections = Vec::new();
    let mut remainder = String::with_capacity(text.len());
    let mut cursor = 0;

    for (open, close) in paren_groups(text) {
        let inner = text[open + 1..close].trim();
        let found = match inner.rsplit_once(',') {
            Some((label, score)) => detection(label, score),
            None => detection(trailing_label(&text[cursor..open]), inner),
        };
        detections.extend(found);
        remainder.push_str(&text[cursor..open]);
        remainder.push('\n');
        cursor = close + 1;
    }
    remainder.push_str(&text[cursor..]);

    for segment in remainder.split([',', ';', '\n', '|']) {
        if let Some((label, score)) = segment.rsplit_once(':') {
            if score.contains('.') {
                detections.extend(detection(trailing_label(label), score));
            }
        }
    }

    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    detections
}

fn detection(label: &str, score: &str) -> Option<Detection> {
    let label = label.trim();
    let confidence: f64 = score.trim().parse().ok()?;
    if !(0.0..=1.0).contains(&confidence) || !label.chars().any(char::is_alphabetic) {
        return None;
    }
    Some(Detection {
        label: label.to_string(),
        confidence,
    })
}

// Words directly in front of a `(score)` group or a `: score` suffix.
fn trailing_label(prefix: &str) -> &str {
    match prefix.rfind(SEPARATORS) {
        Some(idx) => &prefix[idx + 1..],
        None => prefix,
    }
}

// Byte ranges of non-nested `( ... )` groups.
fn paren_groups(text: &str) -> Vec<(usize, usize)> {
    let mut groups = Vec::new();
    let mut open = None;
    for (idx, c) in text.char_indices() {
        match c {
            '(' => open = Some(idx),
            ')' => {
                if let Some(start) = open.take() {
                    groups.push((start, idx));
                }
            }
            _ => {}
        }
    }
    groups
}
