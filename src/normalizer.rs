// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Spatial Market Integration Engine - Region Identity Normalizer

//! Canonicalizes free-text region names into stable identifiers.
//!
//! `normalize(normalize(x)) == normalize(x)` for every input. The alias table
//! is closed under lookup (every canonical id maps to itself) and folding is
//! iterated to a fixed point, which together give idempotence.

use std::collections::{BTreeMap, BTreeSet};

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::types::RegionId;

/// Historical and alternate spellings, already folded, mapped to canonical ids.
const ALIASES: &[(&str, &str)] = &[
    // Abyan
    ("abian", "abyan"),
    // Aden
    ("adan", "aden"),
    ("aden_city", "aden"),
    // Amanat Al Asimah (Sana'a city)
    ("amanat_alasimah", "amanat_al_asimah"),
    ("amanat_al_aasimah", "amanat_al_asimah"),
    ("amanat_al_asimah_city", "amanat_al_asimah"),
    ("capital_city", "amanat_al_asimah"),
    ("capital_secretariat", "amanat_al_asimah"),
    ("sanaa_city", "amanat_al_asimah"),
    ("sana_a_city", "amanat_al_asimah"),
    // Amran
    ("omran", "amran"),
    ("amran_city", "amran"),
    // Al Bayda
    ("al_baydha", "al_bayda"),
    ("al_baida", "al_bayda"),
    ("albayda", "al_bayda"),
    ("al_bayda_a", "al_bayda"),
    ("bayda", "al_bayda"),
    ("baydha", "al_bayda"),
    // Ad Dali'
    ("ad_dali", "al_dhale"),
    ("ad_dale", "al_dhale"),
    ("addali", "al_dhale"),
    ("adh_dhali", "al_dhale"),
    ("al_dhalee", "al_dhale"),
    ("al_dhali", "al_dhale"),
    ("al_dali", "al_dhale"),
    ("dhale", "al_dhale"),
    ("dhala", "al_dhale"),
    // Dhamar
    ("thamar", "dhamar"),
    ("dhamar_city", "dhamar"),
    // Hadramaut
    ("hadramawt", "hadramaut"),
    ("hadhramaut", "hadramaut"),
    ("hadhramawt", "hadramaut"),
    ("hadramout", "hadramaut"),
    ("hadrmout", "hadramaut"),
    // Hajjah
    ("hajja", "hajjah"),
    ("hajah", "hajjah"),
    // Al Hudaydah
    ("hudaydah", "al_hudaydah"),
    ("hudayda", "al_hudaydah"),
    ("al_hudayda", "al_hudaydah"),
    ("alhudaydah", "al_hudaydah"),
    ("hodeidah", "al_hudaydah"),
    ("hodeida", "al_hudaydah"),
    ("al_hodeidah", "al_hudaydah"),
    ("al_hodeida", "al_hudaydah"),
    // Ibb
    ("ibb_city", "ibb"),
    // Al Jawf
    ("jawf", "al_jawf"),
    ("aljawf", "al_jawf"),
    ("al_jouf", "al_jawf"),
    ("al_jawf_governorate", "al_jawf"),
    // Lahj
    ("lahij", "lahj"),
    ("lahej", "lahj"),
    ("lahaj", "lahj"),
    // Al Mahrah
    ("mahrah", "al_mahrah"),
    ("mahra", "al_mahrah"),
    ("al_mahra", "al_mahrah"),
    ("al_maharah", "al_mahrah"),
    ("almahrah", "al_mahrah"),
    // Al Mahwit
    ("mahwit", "al_mahwit"),
    ("almahwit", "al_mahwit"),
    ("al_mahweet", "al_mahwit"),
    // Marib
    ("mareb", "marib"),
    ("maarib", "marib"),
    ("ma_rib", "marib"),
    // Raymah
    ("raimah", "raymah"),
    ("rayma", "raymah"),
    ("reymah", "raymah"),
    // Sa'dah
    ("saada", "sadah"),
    ("saadah", "sadah"),
    ("sa_dah", "sadah"),
    ("sada", "sadah"),
    ("sa_ada", "sadah"),
    // Sana'a governorate
    ("sana", "sanaa"),
    ("sana_a", "sanaa"),
    ("sanaa_governorate", "sanaa"),
    // Shabwah
    ("shabwa", "shabwah"),
    ("shebwa", "shabwah"),
    // Socotra
    ("soqatra", "socotra"),
    ("suqutra", "socotra"),
    ("socotra_archipelago", "socotra"),
    // Ta'izz
    ("taiz", "taizz"),
    ("ta_izz", "taizz"),
    ("ta_iz", "taizz"),
    ("taez", "taizz"),
    ("taizz_city", "taizz"),
];

/// Administratively separate or data-sparse regions. Dropped by the merger,
/// never merged into a neighbour.
const EXCLUDED: &[&str] = &["socotra"];

/// Administrative suffixes removed when the full name has no alias.
const ADMIN_SUFFIXES: &[&str] = &["_governorate", "_province", "_muhafazah", "_gov"];

/// Apostrophes, primes and quotation marks. Removed without a separator so
/// `Ta'izz` folds to `taizz`.
const QUOTE_CHARS: &[char] = &[
    '\'', '"', '`', '\u{00B4}', '\u{2018}', '\u{2019}', '\u{201A}', '\u{201B}', '\u{201C}',
    '\u{201D}', '\u{2032}', '\u{2033}', '\u{02BB}', '\u{02BC}', '\u{02BE}', '\u{02BF}', '\u{02C8}',
];

const MAX_FOLD_PASSES: usize = 4;

#[derive(Debug, Clone)]
pub struct RegionNormalizer {
    aliases: BTreeMap<String, RegionId>,
    excluded: BTreeSet<RegionId>,
}

impl Default for RegionNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionNormalizer {
    /// Normalizer with the built-in alias table and exclusion set.
    pub fn new() -> Self {
        let aliases = ALIASES
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let excluded = EXCLUDED.iter().map(|s| s.to_string()).collect();
        Self { aliases, excluded }
    }

    /// Extend the alias table. Keys and values are folded first, and chains
    /// (`a -> b`, `b -> c`) are collapsed so every value is a fixed point.
    pub fn with_aliases<'a>(mut self, extra: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        for (from, to) in extra {
            let (Some(from), Some(to)) = (fold_to_fixed_point(from), fold_to_fixed_point(to)) else {
                log::warn!("ignoring alias with empty side: {from:?} -> {to:?}");
                continue;
            };
            let to = strip_admin_suffixes(&to).to_string();
            if from != to {
                self.aliases.insert(from, to);
            }
        }
        self.collapse_chains();
        self
    }

    pub fn with_exclusions<'a>(mut self, extra: impl IntoIterator<Item = &'a str>) -> Self {
        let ids: Vec<RegionId> = extra.into_iter().filter_map(|e| self.normalize(e)).collect();
        self.excluded.extend(ids);
        self
    }

    /// Canonical id for `name`, or `None` when nothing alphanumeric remains.
    pub fn normalize(&self, name: &str) -> Option<RegionId> {
        let folded = fold_to_fixed_point(name)?;
        if let Some(canonical) = self.aliases.get(&folded) {
            return Some(canonical.clone());
        }
        let stripped = strip_admin_suffixes(&folded);
        if let Some(canonical) = self.aliases.get(stripped) {
            return Some(canonical.clone());
        }
        Some(stripped.to_string())
    }

    /// Whether a canonical id belongs to the exclusion set.
    pub fn is_excluded(&self, id: &str) -> bool {
        self.excluded.contains(id)
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }

    fn collapse_chains(&mut self) {
        let keys: Vec<String> = self.aliases.keys().cloned().collect();
        for key in keys {
            let Some(mut target) = self.aliases.get(&key).cloned() else {
                continue;
            };
            let mut seen = BTreeSet::from([key.clone()]);
            loop {
                seen.insert(target.clone());
                match self.aliases.get(&target) {
                    None => {
                        self.aliases.insert(key, target);
                        break;
                    }
                    // Cycle: the key becomes canonical.
                    Some(next) if seen.contains(next) => {
                        self.aliases.remove(&key);
                        break;
                    }
                    Some(next) => target = next.clone(),
                }
            }
        }
    }
}

/// Apply [`fold`] until the output stops changing. Lower-casing can emit
/// combining marks (`İ` -> `i̇`), so one pass is not always stable.
fn fold_to_fixed_point(name: &str) -> Option<String> {
    let mut current = fold(name);
    for _ in 0..MAX_FOLD_PASSES {
        let next = fold(&current);
        if next == current {
            break;
        }
        current = next;
    }
    if current.is_empty() {
        None
    } else {
        Some(current)
    }
}

/// Decompose, drop diacritics and quotes, lower-case, collapse every
/// non-alphanumeric run into one underscore, trim underscores.
fn fold(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_separator = false;
    let lowered: String = name
        .nfkd()
        .filter(|c| !is_combining_mark(*c) && !QUOTE_CHARS.contains(c))
        .flat_map(char::to_lowercase)
        .collect();
    for c in lowered.chars() {
        if is_combining_mark(c) {
            continue;
        }
        if c.is_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push('_');
            }
            pending_separator = false;
            out.push(c);
        } else {
            pending_separator = true;
        }
    }
    out
}

fn strip_admin_suffixes(id: &str) -> &str {
    let mut current = id;
    loop {
        let next = ADMIN_SUFFIXES
            .iter()
            .find_map(|suffix| current.strip_suffix(suffix))
            .filter(|rest| !rest.is_empty());
        match next {
            Some(rest) => current = rest,
            None => return current,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taizz_spellings_converge() {
        let n = RegionNormalizer::new();
        assert_eq!(n.normalize("Ta'izz Governorate").as_deref(), Some("taizz"));
        assert_eq!(n.normalize("taizz").as_deref(), Some("taizz"));
        assert_eq!(n.normalize("Ta’izz").as_deref(), Some("taizz"));
        assert_eq!(n.normalize("TAIZ").as_deref(), Some("taizz"));
    }

    #[test]
    fn diacritics_are_stripped() {
        let n = RegionNormalizer::new();
        assert_eq!(n.normalize("Dhamār").as_deref(), Some("dhamar"));
        assert_eq!(n.normalize("Ṣanʿāʾ").as_deref(), Some("sanaa"));
        assert_eq!(n.normalize("Şa'dah").as_deref(), Some("sadah"));
    }

    #[test]
    fn separators_collapse_to_single_underscore() {
        let n = RegionNormalizer::new();
        assert_eq!(n.normalize("  Al -- Hudaydah  ").as_deref(), Some("al_hudaydah"));
        assert_eq!(n.normalize("Hodeidah").as_deref(), Some("al_hudaydah"));
        assert_eq!(n.normalize("__New  Market__").as_deref(), Some("new_market"));
    }

    #[test]
    fn empty_input_is_none() {
        let n = RegionNormalizer::new();
        assert_eq!(n.normalize(""), None);
        assert_eq!(n.normalize("   "), None);
        assert_eq!(n.normalize("'-'"), None);
    }

    #[test]
    fn unknown_names_pass_through_folded() {
        let n = RegionNormalizer::new();
        assert_eq!(n.normalize("Mukalla Port").as_deref(), Some("mukalla_port"));
        assert_eq!(n.normalize("Zinjibar Governorate").as_deref(), Some("zinjibar"));
        // A bare suffix is not stripped to nothing.
        assert_eq!(n.normalize("Governorate").as_deref(), Some("governorate"));
    }

    #[test]
    fn every_canonical_id_is_a_fixed_point() {
        let n = RegionNormalizer::new();
        for (_, canonical) in ALIASES {
            assert_eq!(
                n.normalize(canonical).as_deref(),
                Some(*canonical),
                "canonical id {canonical} must normalize to itself"
            );
        }
    }

    #[test]
    fn normalize_is_idempotent() {
        let n = RegionNormalizer::new();
        let inputs = [
            "Ta'izz Governorate",
            "Amanat Al Asimah",
            "Sana'a City",
            "İstanbul",
            "ᴬden",
            "Ad Dali'",
            "hadramaut_governorate_governorate",
            "Ｍａｒｉｂ",
            "ﬁrst market",
            "Lahij Governorate",
        ];
        for input in inputs {
            let once = n.normalize(input);
            let twice = once.as_deref().and_then(|s| n.normalize(s));
            assert_eq!(once, twice, "normalize not idempotent for {input:?}");
        }
    }

    #[test]
    fn exclusion_is_checked_on_canonical_id() {
        let n = RegionNormalizer::new();
        let id = n.normalize("Suqutra").expect("test: normalizes");
        assert!(n.is_excluded(&id));
        assert!(!n.is_excluded("aden"));
    }

    #[test]
    fn extra_aliases_collapse_chains() {
        let n = RegionNormalizer::new().with_aliases([("Old Mocha", "Mokha"), ("Mokha", "Al Mukha")]);
        assert_eq!(n.normalize("old mocha").as_deref(), Some("al_mukha"));
        assert_eq!(n.normalize("al_mukha").as_deref(), Some("al_mukha"));
    }

    #[test]
    fn alias_cycle_does_not_hang() {
        let n = RegionNormalizer::new().with_aliases([("alpha", "beta"), ("beta", "alpha")]);
        let once = n.normalize("alpha");
        assert_eq!(once.clone().and_then(|s| n.normalize(&s)), once);
    }

    #[test]
    fn extra_exclusions_are_normalized() {
        let n = RegionNormalizer::new().with_exclusions(["Perim Island"]);
        assert!(n.is_excluded("perim_island"));
    }
}
