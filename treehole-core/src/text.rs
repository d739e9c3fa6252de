//! Text helpers shared by the retrieval pipeline: containment checks over
//! mixed Chinese/English text, token estimation and truncation.

/// Case-insensitive containment. An empty needle always matches.
pub fn contains_term(text: &str, term: &str) -> bool {
    if term.is_empty() {
        return true;
    }
    text.to_lowercase().contains(&term.to_lowercase())
}

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Rough token estimate: about 1.5 CJK ideographs or 4 other chars per token.
pub fn estimate_tokens(text: &str) -> usize {
    let (cjk, other) = text.chars().fold((0usize, 0usize), |(cjk, other), c| {
        if is_cjk(c) {
            (cjk + 1, other)
        } else {
            (cjk, other + 1)
        }
    });
    (cjk as f64 / 1.5 + other as f64 / 4.0) as usize
}

/// Hard-truncates to `max_chars` characters, appending `...` when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

/// Splits a free-form list of labels on `,` `，` `、` `/` `;` `；` and
/// whitespace, dropping blanks and repeats while keeping first-seen order.
pub fn parse_labels(input: &str) -> Vec<String> {
    let separators = [',', '，', '、', '/', ';', '；'];
    dedup_labels(
        input
            .split(|c: char| c.is_whitespace() || separators.contains(&c))
            .map(str::to_string),
    )
}

/// Trims labels and removes blanks and duplicates, keeping first-seen order.
pub fn dedup_labels<I>(labels: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = std::collections::HashSet::new();
    labels
        .into_iter()
        .map(|label| label.trim().to_string())
        .filter(|label| !label.is_empty() && seen.insert(label.clone()))
        .collect()
}
