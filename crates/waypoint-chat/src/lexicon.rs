//! Shared English word lists and patterns for classification and planning.

use std::sync::LazyLock;

use regex::Regex;
use waypoint_core::types::Coordinates;

/// Regex alternation of place-category nouns, singular and plural.
pub(crate) const CATEGORY_NOUNS: &str = r"restaurants?|caf(?:e|é)s?|coffee\s+shops?|bars?|pubs?|hotels?|hostels?|motels?|museums?|galler(?:y|ies)|parks?|hospitals?|clinics?|pharmac(?:y|ies)|(?:gas|petrol|fuel|charging)\s+stations?|schools?|universit(?:y|ies)|shops?|stores?|supermarkets?|malls?|banks?|atms?|parking(?:\s+(?:lots?|garages?))?|attractions?|landmarks?|baker(?:y|ies)|librar(?:y|ies)|gyms?|cinemas?|theat(?:er|re)s?|church(?:es)?|mosques?|temples?|stations?|airports?|businesses|business|venues?|places?|locations?";

pub(crate) static CATEGORY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b(?:{})\b", CATEGORY_NOUNS)).expect("Invalid category regex")
});

/// Decimal coordinate pair such as "52.3676, 4.9041".
pub(crate) static COORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(-?\d{1,2}\.\d+)\s*,\s*(-?\d{1,3}\.\d+)").expect("Invalid coordinate regex")
});

/// Words that never start a search term.
pub(crate) static STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "do", "does", "can", "could", "would",
    "i", "me", "my", "we", "you", "it", "they", "them", "what", "which", "where", "how", "any",
    "some", "all", "find", "show", "search", "look", "for", "get", "list", "many", "of", "in",
    "near", "to", "from", "at", "good", "best", "nearest", "closest", "nearby",
];

/// First valid coordinate pair in `text`.
pub(crate) fn find_coordinates(text: &str) -> Option<Coordinates> {
    COORD_RE.captures_iter(text).find_map(|caps| {
        let lat: f64 = caps.get(1)?.as_str().parse().ok()?;
        let lon: f64 = caps.get(2)?.as_str().parse().ok()?;
        let coords = Coordinates::new(lat, lon);
        coords.is_valid().then_some(coords)
    })
}

/// "A", "A and B", "A, B and C".
pub(crate) fn join_names<S: AsRef<str>>(names: &[S]) -> String {
    match names.split_last() {
        Some((last, rest)) if !rest.is_empty() => {
            let rest: Vec<&str> = rest.iter().map(AsRef::as_ref).collect();
            format!("{} and {}", rest.join(", "), last.as_ref())
        }
        Some((last, _)) => last.as_ref().to_string(),
        None => String::new(),
    }
}
