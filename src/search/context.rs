use super::select::ContentSelector;
use super::sources::Source;

/// Character budget for each source's excerpt.
pub const EXCERPT_BUDGET: usize = 2000;
const BLOCK_SEPARATOR: &str = "\n\n---\n\n";

/// Builds the citation-numbered grounding text. Block `[n]` is `sources[n - 1]`,
/// so citations emitted by the model line up with the `sources` event.
pub fn build_context(sources: &[Source], query: &str, selector: &dyn ContentSelector) -> String {
    sources
        .iter()
        .enumerate()
        .map(|(i, source)| {
            let excerpt = selector.select(source.body(), query, EXCERPT_BUDGET);
            format!("[{}] {}\nURL: {}\n{}", i + 1, source.title, source.url, excerpt)
        })
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}
