//! Excerpt selection: picks the parts of a page most related to the query
//! within a character budget.

const PARAGRAPH_SEPARATOR: &str = "\n\n";
const MIN_TERM_CHARS: usize = 3;
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "her", "was", "one",
    "our", "out", "has", "his", "how", "its", "who", "why", "what", "when", "where", "which",
    "with", "this", "that", "from", "into", "best", "about",
];

pub trait ContentSelector: Send + Sync {
    /// Returns an excerpt of `text` no longer than `max_chars` characters.
    fn select(&self, text: &str, query: &str, max_chars: usize) -> String;
}

/// Scores paragraphs by query-term hits. The opening paragraph is kept when
/// it fits because it usually carries the page summary.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordSelector;

impl ContentSelector for KeywordSelector {
    fn select(&self, text: &str, query: &str, max_chars: usize) -> String {
        if text.chars().count() <= max_chars {
            return text.to_string();
        }

        let paragraphs: Vec<&str> = text
            .split(PARAGRAPH_SEPARATOR)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        let terms = query_terms(query);

        let mut ranked: Vec<(usize, usize)> = paragraphs
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, p)| (i, score(p, &terms)))
            .filter(|(_, s)| *s > 0)
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let separator_len = PARAGRAPH_SEPARATOR.chars().count();
        let mut chosen = Vec::new();
        let mut used = 0;
        for idx in std::iter::once(0).chain(ranked.into_iter().map(|(i, _)| i)) {
            let Some(paragraph) = paragraphs.get(idx) else {
                continue;
            };
            let len = paragraph.chars().count();
            let cost = if chosen.is_empty() { len } else { len + separator_len };
            if used + cost <= max_chars {
                used += cost;
                chosen.push(idx);
            }
        }

        if chosen.is_empty() {
            return truncate_chars(text.trim(), max_chars).to_string();
        }

        chosen.sort_unstable();
        chosen
            .into_iter()
            .map(|i| paragraphs[i])
            .collect::<Vec<_>>()
            .join(PARAGRAPH_SEPARATOR)
    }
}

fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in query
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() >= MIN_TERM_CHARS && !STOPWORDS.contains(&w.as_str()))
    {
        if !terms.contains(&word) {
            terms.push(word);
        }
    }
    terms
}

fn score(paragraph: &str, terms: &[String]) -> usize {
    let lower = paragraph.to_lowercase();
    terms.iter().map(|t| lower.matches(t.as_str()).count()).sum()
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}
