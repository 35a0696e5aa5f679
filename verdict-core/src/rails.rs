//! Rail parsing: mapping free-text model output onto the closed label
//! set.
//!
//! Selection rule, taken from the documented product behavior: after
//! normalization, the first rail *in declared order* that appears
//! anywhere in the response wins. Position within the response is
//! deliberately ignored, so `rails = ["positive", "neutral"]` selects
//! `positive` even when the response says "neutral, not positive".

/// Collapse whitespace runs to single spaces and trim; lowercase when
/// `normalize_case` is set.
fn normalize(text: &str, normalize_case: bool) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalize_case {
        collapsed.to_lowercase()
    } else {
        collapsed
    }
}

/// Select the label for a raw model response.
///
/// Returns the earliest-declared rail whose normalized form occurs as
/// a substring of the normalized response, or `None` when no rail
/// appears (a parse miss, not an error).
pub fn select_label<'a>(
    rails: &'a [String],
    response: &str,
    normalize_case: bool,
) -> Option<&'a str> {
    let haystack = normalize(response, normalize_case);
    rails
        .iter()
        .find(|rail| haystack.contains(&normalize(rail, normalize_case)))
        .map(String::as_str)
}
