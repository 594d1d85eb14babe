//! Pick the drop-down option for the configured category.

use crate::config::CategoryFallback;
use crate::driver::SelectOption;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    /// Label equals the configured category.
    Exact,
    /// One contains the other, ignoring case.
    Substring,
    /// Fixed option value keyed by a token of the category.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryMatch<'a> {
    pub tier: MatchTier,
    pub option: &'a SelectOption,
}

/// Three tiers, first hit wins: exact label, case-insensitive substring in
/// either direction, then a fallback value whose token appears in `wanted`.
/// Blank labels (placeholders) never match by substring.
pub fn match_category<'a>(
    options: &'a [SelectOption],
    wanted: &str,
    fallbacks: &[CategoryFallback],
) -> Option<CategoryMatch<'a>> {
    let wanted = wanted.trim();

    if let Some(option) = options.iter().find(|o| o.label.trim() == wanted) {
        return Some(CategoryMatch {
            tier: MatchTier::Exact,
            option,
        });
    }

    let wanted_lower = wanted.to_lowercase();
    if let Some(option) = options.iter().find(|o| {
        let label = o.label.trim().to_lowercase();
        !label.is_empty() && (label.contains(&wanted_lower) || wanted_lower.contains(&label))
    }) {
        return Some(CategoryMatch {
            tier: MatchTier::Substring,
            option,
        });
    }

    fallbacks
        .iter()
        .filter(|fb| wanted_lower.contains(&fb.token.to_lowercase()))
        .find_map(|fb| options.iter().find(|o| o.value == fb.value))
        .map(|option| CategoryMatch {
            tier: MatchTier::Fallback,
            option,
        })
}
