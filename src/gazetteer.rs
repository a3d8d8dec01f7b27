//! Canonical destination names and their morphological/translated variants.
//!
//! Serbian declines place names by case ("u Rimu", "za Rim", "iz Rima") and
//! tourism copy mixes Serbian and English names for the same place ("Rim" /
//! "Rome"). The rule-based entity extractor and the self-query parser both
//! need to collapse any of these surface forms to one canonical destination
//! string before it is used as a vector-store equality filter.

use std::collections::HashMap;
use std::sync::LazyLock;

/// `(canonical_name, variants)` pairs. Variants are matched case-insensitively
/// against a normalized (lowercased, diacritics-folded) token.
static DESTINATIONS: &[(&str, &[&str])] = &[
    ("Rim", &["rim", "rimu", "rima", "rimom", "roma", "rome"]),
    (
        "Pariz",
        &["pariz", "parizu", "pariza", "parizom", "paris"],
    ),
    (
        "London",
        &["london", "londonu", "londona", "londonom"],
    ),
    (
        "Amsterdam",
        &["amsterdam", "amsterdamu", "amsterdama", "amsterdamom"],
    ),
    (
        "Barselona",
        &[
            "barselona",
            "barseloni",
            "barselonu",
            "barselone",
            "barselonom",
            "barcelona",
        ],
    ),
    (
        "Madrid",
        &["madrid", "madridu", "madrida", "madridom"],
    ),
    (
        "Beč",
        &["beč", "beč", "beču", "beča", "bečom", "vienna", "bec", "becu", "beca", "becom"],
    ),
    (
        "Prag",
        &["prag", "pragu", "praga", "pragom", "prague"],
    ),
    (
        "Budimpešta",
        &[
            "budimpešta",
            "budimpešti",
            "budimpeštu",
            "budimpeštom",
            "budimpesta",
            "budimpesti",
            "budimpestu",
            "budimpestom",
            "budapest",
        ],
    ),
    (
        "Atina",
        &["atina", "atini", "atinu", "atinom", "athens"],
    ),
    (
        "Santorini",
        &["santorini", "santoriniju", "santorinija"],
    ),
    (
        "Krf",
        &["krf", "krfu", "krfa", "krfom", "corfu"],
    ),
    (
        "Dubrovnik",
        &["dubrovnik", "dubrovniku", "dubrovnika", "dubrovnikom"],
    ),
    (
        "Istanbul",
        &["istanbul", "istanbulu", "istanbula", "istanbulom"],
    ),
    (
        "Kairo",
        &["kairo", "kairu", "kaira", "kairom", "cairo"],
    ),
    (
        "Njujork",
        &[
            "njujork",
            "njujorku",
            "njujorka",
            "njujorkom",
            "new york",
            "newyork",
        ],
    ),
];

struct Gazetteer {
    lookup: HashMap<&'static str, &'static str>,
}

impl Gazetteer {
    fn build() -> Self {
        let mut lookup = HashMap::new();
        for (canonical, variants) in DESTINATIONS {
            lookup.insert(*canonical, *canonical);
            for variant in *variants {
                lookup.insert(variant, *canonical);
            }
        }
        Self { lookup }
    }
}

static GAZETTEER: LazyLock<Gazetteer> = LazyLock::new(Gazetteer::build);

fn normalize_token(token: &str) -> String {
    token.trim().to_lowercase()
}

/// Resolves a raw surface form to its canonical destination name, if known.
pub fn canonical_destination(raw: &str) -> Option<&'static str> {
    GAZETTEER.lookup.get(normalize_token(raw).as_str()).copied()
}

/// Scans free text for the first recognized destination mention, trying
/// progressively shorter windows so "New York" matches before "York" would.
pub fn find_destination_mention(text: &str) -> Option<&'static str> {
    let words: Vec<&str> = text.split_whitespace().collect();
    for window in [2usize, 1] {
        if window > words.len() {
            continue;
        }
        for start in 0..=(words.len() - window) {
            let candidate = words[start..start + window].join(" ");
            let cleaned: String = candidate
                .chars()
                .filter(|c| c.is_alphanumeric() || c.is_whitespace())
                .collect();
            if let Some(canonical) = canonical_destination(&cleaned) {
                return Some(canonical);
            }
        }
    }
    None
}

/// All canonical destination names known to the gazetteer.
pub fn known_destinations() -> Vec<&'static str> {
    DESTINATIONS.iter().map(|(name, _)| *name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_serbian_case_variants() {
        assert_eq!(canonical_destination("Rimu"), Some("Rim"));
        assert_eq!(canonical_destination("rima"), Some("Rim"));
        assert_eq!(canonical_destination("Rim"), Some("Rim"));
    }

    #[test]
    fn resolves_english_name_to_serbian_canonical() {
        assert_eq!(canonical_destination("Rome"), Some("Rim"));
        assert_eq!(canonical_destination("Paris"), Some("Pariz"));
        assert_eq!(canonical_destination("Vienna"), Some("Beč"));
    }

    #[test]
    fn unknown_destination_returns_none() {
        assert_eq!(canonical_destination("Narnia"), None);
    }

    #[test]
    fn finds_multi_word_destination_in_sentence() {
        assert_eq!(
            find_destination_mention("Tražim let za New York u avgustu"),
            Some("Njujork")
        );
    }

    #[test]
    fn finds_single_word_destination_in_sentence() {
        assert_eq!(
            find_destination_mention("Koliko košta hotel u Rimu"),
            Some("Rim")
        );
    }
}
