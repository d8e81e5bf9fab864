pub trait TickerDetector: Send + Sync {
    /// Stock symbol of a company the query is about, if any.
    fn detect(&self, query: &str) -> Option<String>;
}

/// Company names mapped to their listing symbol. Longer names come first so
/// "american airlines" is not shadowed by a shorter entry.
const COMPANY_TICKERS: &[(&str, &str)] = &[
    ("norwegian cruise line", "NCLH"),
    ("royal caribbean", "RCL"),
    ("american airlines", "AAL"),
    ("southwest airlines", "LUV"),
    ("united airlines", "UAL"),
    ("delta air lines", "DAL"),
    ("booking holdings", "BKNG"),
    ("booking.com", "BKNG"),
    ("tripadvisor", "TRIP"),
    ("expedia", "EXPE"),
    ("airbnb", "ABNB"),
    ("marriott", "MAR"),
    ("hilton", "HLT"),
    ("hyatt", "H"),
    ("carnival", "CCL"),
    ("microsoft", "MSFT"),
    ("apple", "AAPL"),
    ("google", "GOOGL"),
    ("amazon", "AMZN"),
    ("tesla", "TSLA"),
    ("nvidia", "NVDA"),
    ("uber", "UBER"),
];

#[derive(Debug, Default, Clone, Copy)]
pub struct CompanyTickerMap;

impl TickerDetector for CompanyTickerMap {
    fn detect(&self, query: &str) -> Option<String> {
        let lower = query.to_lowercase();
        COMPANY_TICKERS
            .iter()
            .find(|(name, _)| contains_phrase(&lower, name))
            .map(|(_, symbol)| symbol.to_string())
    }
}

/// Phrase match that respects word boundaries on both sides.
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    haystack.match_indices(phrase).any(|(start, _)| {
        let end = start + phrase.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}
