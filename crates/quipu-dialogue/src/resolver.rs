//! Reference resolution: turning ordinal and numeric phrases ("the 3rd one",
//! "order 5", "1,2,3") into 1-based positions in a displayed list.
//!
//! Pure functions, no I/O. Matching is tiered from most to least specific;
//! the first in-range hit wins and out-of-range candidates are skipped
//! rather than aborting the scan.

const ORDINAL_WORDS: &[(&str, usize)] = &[
    ("first", 1),
    ("second", 2),
    ("third", 3),
    ("fourth", 4),
    ("fifth", 5),
    ("sixth", 6),
    ("seventh", 7),
    ("eighth", 8),
    ("ninth", 9),
    ("tenth", 10),
];

fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn ordinal_word(tok: &str) -> Option<usize> {
    ORDINAL_WORDS
        .iter()
        .find(|(w, _)| *w == tok)
        .map(|(_, n)| *n)
}

fn bare_number(tok: &str) -> Option<usize> {
    if tok.is_empty() || !tok.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    tok.parse().ok()
}

/// "1st", "2nd", "3rd", "19th" and friends.
fn suffixed_number(tok: &str) -> Option<usize> {
    for suffix in ["st", "nd", "rd", "th"] {
        if let Some(stem) = tok.strip_suffix(suffix) {
            if let Some(n) = bare_number(stem) {
                return Some(n);
            }
        }
    }
    None
}

fn is_entity_word(tok: &str) -> bool {
    matches!(
        tok,
        "order" | "orders" | "task" | "tasks" | "item" | "items"
    )
}

/// Resolve a single reference against a list of `max_position` items.
pub fn resolve_single(text: &str, max_position: usize) -> Option<usize> {
    if max_position == 0 {
        return None;
    }
    let toks = tokens(text);
    let in_range = |n: usize| (1..=max_position).contains(&n);

    // Ordinal words: "first".."tenth", "1st".."10th".
    for t in &toks {
        if let Some(n) = ordinal_word(t).or_else(|| suffixed_number(t).filter(|&n| n <= 10)) {
            if in_range(n) {
                return Some(n);
            }
        }
    }

    // "order 5", "task 2", "item 1", "number 3".
    for pair in toks.windows(2) {
        if is_entity_word(&pair[0]) || pair[0] == "number" {
            if let Some(n) = bare_number(&pair[1]).or_else(|| suffixed_number(&pair[1])) {
                if in_range(n) {
                    return Some(n);
                }
            }
        }
    }

    // "5th order", "2 task", "3rd item".
    for pair in toks.windows(2) {
        if is_entity_word(&pair[1]) {
            if let Some(n) = bare_number(&pair[0]).or_else(|| suffixed_number(&pair[0])) {
                if in_range(n) {
                    return Some(n);
                }
            }
        }
    }

    // A bare suffixed number anywhere: "the 19th".
    for t in &toks {
        if let Some(n) = suffixed_number(t) {
            if in_range(n) {
                return Some(n);
            }
        }
    }

    // The whole message is one number.
    if let Some(n) = bare_number(text.trim()) {
        return in_range(n).then_some(n);
    }

    // Last resort: any bare number in the text.
    for t in &toks {
        if let Some(n) = bare_number(t) {
            if in_range(n) {
                return Some(n);
            }
        }
    }

    None
}

/// Resolve a batch reference ("1 2 3", "1,2,3", "second and fourth") into a
/// sorted, de-duplicated list of positions. Out-of-range values are dropped.
pub fn resolve_multiple(text: &str, max_position: usize) -> Vec<usize> {
    if max_position == 0 {
        return Vec::new();
    }
    let mut out: Vec<usize> = Vec::new();
    for t in tokens(text) {
        if let Some(n) = bare_number(&t)
            .or_else(|| ordinal_word(&t))
            .or_else(|| suffixed_number(&t))
        {
            if (1..=max_position).contains(&n) && !out.contains(&n) {
                out.push(n);
            }
        }
    }
    out.sort_unstable();
    out
}
