// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Feature label canonicalization.
//!
//! Source documents name the same benefit in many ways ("MR", "Augsto
//! tehnoloģiju izmeklējumi", "High-tech diagnostics", ...). Every label is
//! mapped to one canonical key from a fixed catalogue, split into the MAIN and
//! ADDON row groups. A third set holds keys that appear in feature bags but
//! are column metadata, never rows.
//!
//! Matching is done on a normalized form (NFC, trimmed, whitespace collapsed,
//! lowercased). Labels that match nothing are returned unchanged, so new
//! feature names flow through as their own rows.

use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use unicode_normalization::UnicodeNormalization;

use crate::value::{FeatureBag, FeatureValue};

/// High-tech diagnostics (MR, CT) row.
pub const HIGH_TECH_DIAGNOSTICS: &str =
    "Augsto tehnoloģiju izmeklējumi, piem., MR, CT, limits, ja ir (reižu skaits vai EUR)";
/// Homeopath row.
pub const HOMEOPATH: &str = "Homeopāts";
/// Sports physician row.
pub const SPORTS_PHYSICIAN: &str = "Sporta ārsts";

/// Main policy rows, in display order.
pub const MAIN: &[&str] = &[
    "Pakalpojuma apmaksas veids",
    "Pacientu iemaksa",
    "Maksas ģimenes ārsta mājas vizītes, limits (EUR)",
    "Maksas ārstu speciālistu konsultācijas, limits (EUR)",
    "Profilaktiskā pārbaude, pieņemot polisi (reižu skaits)",
    "ONLINE ārstu konsultācijas",
    "Laboratoriskie izmeklējumi",
    "Maksas diagnostiskie izmeklējumi, limits (EUR)",
    HIGH_TECH_DIAGNOSTICS,
    "Obligātās veselības pārbaudes, limits (EUR)",
    "Ārstnieciskās manipulācijas",
    "Medicīniskās izziņas",
    "Fizikālā terapija",
    "Procedūras",
    "Vakcinācija, limits (EUR)",
    "Maksas grūtnieču aprūpe",
    "Maksas onkoloģiskā, hematoloģiskā ārstēšana",
    "Neatliekamā palīdzība valsts un privātā (limits privātai, EUR)",
    SPORTS_PHYSICIAN,
    HOMEOPATH,
    "Psihoterapeits",
];

/// Add-on policy rows, in display order.
pub const ADDON: &[&str] = &[
    "Maksas stacionārie pakalpojumi, limits (EUR)",
    "Maksas stacionārā rehabilitācija, limits (EUR)",
    "Ambulatorā rehabilitācija",
    "Zobārstniecība ar 50% atlaidi (pamatpolise)",
    "Zobārstniecība ar 100% apmaksu (papildpolise)",
    "Medikamenti ar 50% atlaidi",
    "Sports",
    "Kritiskās saslimšanas",
    "Optika 50%, limits (EUR)",
    "Vakcinācija pret ērču encefalītu, gripu (papildpolise)",
];

/// Keys that may appear in feature bags but are column metadata, never rows.
pub const SUPPRESSED: &[&str] = &[
    "Apdrošinātājs",
    "Programmas kods",
    "Programmas nosaukums",
    "Avota fails",
    "Prēmija, EUR",
    "Apdrošinājuma summa, EUR",
    "Apmaksas veids",
];

/// Known alternative spellings, grouped by canonical key.
const ALIASES: &[(&str, &[&str])] = &[
    (
        "Pakalpojuma apmaksas veids",
        &["Apmaksas kārtība", "Pakalpojumu apmaksa", "Service payment type"],
    ),
    (
        "Pacientu iemaksa",
        &["Pacienta iemaksa", "Pacientu iemaksas", "Patient fee"],
    ),
    (
        "Maksas ģimenes ārsta mājas vizītes, limits (EUR)",
        &["Ģimenes ārsta mājas vizītes", "Mājas vizītes", "GP home visits"],
    ),
    (
        "Maksas ārstu speciālistu konsultācijas, limits (EUR)",
        &[
            "Ārstu speciālistu konsultācijas",
            "Speciālistu konsultācijas",
            "Maksas speciālisti",
            "Specialist consultations",
        ],
    ),
    (
        "Profilaktiskā pārbaude, pieņemot polisi (reižu skaits)",
        &["Profilaktiskā pārbaude", "Preventive check-up"],
    ),
    (
        "ONLINE ārstu konsultācijas",
        &["Online konsultācijas", "Attālinātās konsultācijas", "Online doctor"],
    ),
    (
        "Laboratoriskie izmeklējumi",
        &["Laboratorija", "Analīzes", "Laboratory tests"],
    ),
    (
        "Maksas diagnostiskie izmeklējumi, limits (EUR)",
        &["Diagnostiskie izmeklējumi", "Diagnostika", "Diagnostic tests"],
    ),
    (
        HIGH_TECH_DIAGNOSTICS,
        &[
            "MR",
            "CT",
            "DT",
            "MR, CT",
            "MR/CT",
            "Augsto tehnoloģiju izmeklējumi",
            "Augsto tehnoloģiju izmeklējumi (MR, CT)",
            "High-tech diagnostics",
        ],
    ),
    (
        "Obligātās veselības pārbaudes, limits (EUR)",
        &["Obligātās veselības pārbaudes", "OVP", "Mandatory health checks"],
    ),
    (
        "Ārstnieciskās manipulācijas",
        &["Manipulācijas", "Medical manipulations"],
    ),
    (
        "Medicīniskās izziņas",
        &["Izziņas", "Medical certificates"],
    ),
    (
        "Fizikālā terapija",
        &["Fizioterapija", "Physiotherapy"],
    ),
    ("Procedūras", &["Ārstnieciskās procedūras", "Procedures"]),
    (
        "Vakcinācija, limits (EUR)",
        &["Vakcinācija", "Vaccination"],
    ),
    (
        "Maksas grūtnieču aprūpe",
        &["Grūtnieču aprūpe", "Grūtniecība", "Pregnancy care"],
    ),
    (
        "Maksas onkoloģiskā, hematoloģiskā ārstēšana",
        &["Onkoloģija", "Onkoloģiskā ārstēšana", "Oncology"],
    ),
    (
        "Neatliekamā palīdzība valsts un privātā (limits privātai, EUR)",
        &["Neatliekamā palīdzība", "Emergency care"],
    ),
    (
        SPORTS_PHYSICIAN,
        &["Sporta medicīna", "Sporta ārsta konsultācijas", "Sports physician"],
    ),
    (HOMEOPATH, &["Homeopātija", "Homeopath"]),
    (
        "Psihoterapeits",
        &["Psihoterapija", "Psihologs", "Psychotherapist"],
    ),
    (
        "Maksas stacionārie pakalpojumi, limits (EUR)",
        &["Stacionārs", "Stacionārie pakalpojumi", "Inpatient care"],
    ),
    (
        "Maksas stacionārā rehabilitācija, limits (EUR)",
        &["Stacionārā rehabilitācija", "Inpatient rehabilitation"],
    ),
    (
        "Ambulatorā rehabilitācija",
        &["Rehabilitācija", "Outpatient rehabilitation"],
    ),
    (
        "Zobārstniecība ar 50% atlaidi (pamatpolise)",
        &["Zobārstniecība 50%", "Zobārstniecība", "Dental 50%"],
    ),
    (
        "Zobārstniecība ar 100% apmaksu (papildpolise)",
        &["Zobārstniecība 100%", "Dental 100%"],
    ),
    (
        "Medikamenti ar 50% atlaidi",
        &["Medikamenti", "Zāles", "Medicines"],
    ),
    ("Sports", &["Sporta aktivitātes", "Sport activities"]),
    (
        "Kritiskās saslimšanas",
        &["Kritiskās slimības", "Critical illness"],
    ),
    ("Optika 50%, limits (EUR)", &["Optika", "Optics"]),
    (
        "Vakcinācija pret ērču encefalītu, gripu (papildpolise)",
        &["Ērču encefalīts", "Vakcinācija pret gripu", "Tick-borne encephalitis"],
    ),
    ("Apdrošinātājs", &["insurer", "Insurer", "Apdrošināšanas kompānija"]),
    ("Programmas kods", &["program_code", "Program code", "Kods"]),
    ("Programmas nosaukums", &["program_name", "Program name"]),
    ("Avota fails", &["source_file", "Source file", "Fails"]),
    ("Prēmija, EUR", &["premium_eur", "Premium", "Prēmija"]),
    (
        "Apdrošinājuma summa, EUR",
        &["base_sum_eur", "Base sum", "Apdrošinājuma summa"],
    ),
    ("Apmaksas veids", &["payment_method", "Payment method"]),
];

/// Row group a canonical key is rendered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RowGroup {
    /// Main policy.
    Main,
    /// Add-on policies.
    Addon,
}

/// Normalized matching form: NFC, trimmed, single spaces, lowercase.
fn fold(label: &str) -> String {
    let nfc: String = label.nfc().collect();
    nfc.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn catalogue_keys() -> impl Iterator<Item = &'static str> {
    MAIN.iter().chain(ADDON).chain(SUPPRESSED).copied()
}

static TABLE: LazyLock<HashMap<String, &'static str>> = LazyLock::new(|| {
    let mut table = HashMap::new();
    for key in catalogue_keys() {
        table.entry(fold(key)).or_insert(key);
    }
    for (canonical, aliases) in ALIASES {
        for alias in *aliases {
            table.entry(fold(alias)).or_insert(*canonical);
        }
    }
    table
});

/// Map a raw label to its canonical key. Unknown labels pass through unchanged.
pub fn canonicalize(raw: &str) -> &str {
    match TABLE.get(&fold(raw)) {
        Some(key) => key,
        None => raw,
    }
}

/// Owned convenience form of [`canonicalize`].
pub fn canonical_key(raw: &str) -> String {
    canonicalize(raw).to_string()
}

/// Resolve a feature value by canonical key.
///
/// Tries, in order: the key itself, its canonical form, then every raw label
/// in the bag canonicalized until one matches.
pub fn lookup<'a>(features: &'a FeatureBag, key: &str) -> Option<&'a FeatureValue> {
    if let Some(v) = features.get(key) {
        return Some(v);
    }
    let canonical = canonicalize(key);
    if let Some(v) = features.get(canonical) {
        return Some(v);
    }
    features
        .iter()
        .find(|(raw, _)| canonicalize(raw) == canonical)
        .map(|(_, v)| v)
}

/// True if the key is column metadata rather than a row.
pub fn is_suppressed(key: &str) -> bool {
    SUPPRESSED.contains(&canonicalize(key))
}

/// Catalogue group of a canonical key, if it is a catalogued row.
pub fn group_of(key: &str) -> Option<RowGroup> {
    let canonical = canonicalize(key);
    if MAIN.contains(&canonical) {
        Some(RowGroup::Main)
    } else if ADDON.contains(&canonical) {
        Some(RowGroup::Addon)
    } else {
        None
    }
}

/// Row order: MAIN then ADDON, restricted to `present`, minus suppressed and
/// `hidden` keys.
pub fn visible_order(present: &BTreeSet<String>, hidden: &BTreeSet<String>) -> Vec<String> {
    MAIN.iter()
        .chain(ADDON)
        .filter(|k| present.contains(**k) && !hidden.contains(**k) && !SUPPRESSED.contains(k))
        .map(|k| (*k).to_string())
        .collect()
}

/// Present keys that are neither catalogued rows nor suppressed, sorted.
pub fn unmapped(present: &BTreeSet<String>) -> Vec<String> {
    present
        .iter()
        .filter(|k| group_of(k).is_none() && !is_suppressed(k))
        .cloned()
        .collect()
}

/// Describe catalogue integrity problems: aliases claimed by two canonical
/// keys, or canonical keys listed in more than one group. Empty when sound.
pub fn catalogue_conflicts() -> Vec<String> {
    let mut problems = Vec::new();
    let mut owner: HashMap<String, &str> = HashMap::new();
    let mut claim = |form: String, canonical: &'static str, problems: &mut Vec<String>| {
        match owner.get(&form) {
            Some(prev) if *prev != canonical => problems.push(format!(
                "{form:?} claimed by {prev:?} and {canonical:?}"
            )),
            Some(_) => {}
            None => {
                owner.insert(form, canonical);
            }
        }
    };
    let mut listed = BTreeSet::new();
    for key in catalogue_keys() {
        if !listed.insert(key) {
            problems.push(format!("{key:?} listed more than once"));
        }
        claim(fold(key), key, &mut problems);
    }
    for (canonical, aliases) in ALIASES {
        if !catalogue_keys().any(|k| k == *canonical) {
            problems.push(format!("alias group for uncatalogued key {canonical:?}"));
        }
        for alias in *aliases {
            claim(fold(alias), *canonical, &mut problems);
        }
    }
    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set(keys: &[&str]) -> BTreeSet<String> {
        keys.iter().map(|k| (*k).to_string()).collect()
    }

    #[test]
    fn catalogue_is_consistent() {
        assert_eq!(catalogue_conflicts(), Vec::<String>::new());
    }

    #[test]
    fn aliases_resolve_case_and_space_insensitively() {
        assert_eq!(canonicalize("MR"), HIGH_TECH_DIAGNOSTICS);
        assert_eq!(canonicalize("  mr "), HIGH_TECH_DIAGNOSTICS);
        assert_eq!(
            canonicalize("Augsto  tehnoloģiju izmeklējumi"),
            HIGH_TECH_DIAGNOSTICS
        );
        assert_eq!(canonicalize("homeopātija"), HOMEOPATH);
    }

    #[test]
    fn decomposed_unicode_matches_composed() {
        // "Homeopa\u{304}ts" is "Homeopāts" with a combining macron.
        assert_eq!(canonicalize("Homeopa\u{304}ts"), HOMEOPATH);
    }

    #[test]
    fn unknown_labels_pass_through() {
        assert_eq!(canonicalize("Akupunktūra"), "Akupunktūra");
        assert_eq!(canonicalize(""), "");
    }

    #[test]
    fn canonicalize_is_idempotent_over_catalogue_and_aliases() {
        let labels = catalogue_keys().chain(
            ALIASES
                .iter()
                .flat_map(|(_, aliases)| aliases.iter().copied()),
        );
        for label in labels {
            let once = canonicalize(label);
            assert_eq!(canonicalize(once), once, "label {label:?}");
        }
    }

    #[test]
    fn lookup_falls_back_through_aliases() {
        let mut bag = FeatureBag::new();
        bag.insert("MR".into(), FeatureValue::Text("v".into()));
        assert_eq!(
            lookup(&bag, HIGH_TECH_DIAGNOSTICS),
            Some(&FeatureValue::Text("v".into()))
        );

        let mut bag = FeatureBag::new();
        bag.insert(HOMEOPATH.into(), FeatureValue::Bool(true));
        assert_eq!(lookup(&bag, "Homeopātija"), Some(&FeatureValue::Bool(true)));
        assert_eq!(lookup(&bag, SPORTS_PHYSICIAN), None);
    }

    #[test]
    fn lookup_prefers_exact_key() {
        let mut bag = FeatureBag::new();
        bag.insert("MR".into(), FeatureValue::Text("old".into()));
        bag.insert(HIGH_TECH_DIAGNOSTICS.into(), FeatureValue::Text("new".into()));
        assert_eq!(
            lookup(&bag, HIGH_TECH_DIAGNOSTICS),
            Some(&FeatureValue::Text("new".into()))
        );
    }

    #[test]
    fn visible_order_is_main_then_addon_filtered() {
        let present = set(&[
            "Sports",
            HOMEOPATH,
            "Laboratoriskie izmeklējumi",
            "Apdrošinātājs",
            "Akupunktūra",
        ]);
        let hidden = set(&[HOMEOPATH]);
        assert_eq!(
            visible_order(&present, &hidden),
            vec!["Laboratoriskie izmeklējumi".to_string(), "Sports".to_string()]
        );
        assert_eq!(unmapped(&present), vec!["Akupunktūra".to_string()]);
    }

    #[test]
    fn groups() {
        assert_eq!(group_of("MR"), Some(RowGroup::Main));
        assert_eq!(group_of("Optika"), Some(RowGroup::Addon));
        assert_eq!(group_of("insurer"), None);
        assert!(is_suppressed("premium_eur"));
    }

    proptest! {
        #[test]
        fn canonicalize_is_idempotent(raw in "\\PC{0,24}") {
            let once = canonicalize(&raw);
            prop_assert_eq!(canonicalize(once), once);
        }
    }
}
