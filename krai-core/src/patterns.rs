//! Manufacturer pattern catalogues: regex-driven recognition of error codes,
//! part numbers, and model families, shared by the chunker, context
//! extraction, metadata extraction, parts extraction and series detection.

use regex::Regex;
use std::sync::LazyLock;

/// Generic (manufacturer-independent) error-code shapes recognized anywhere
/// in document text: `NNN.NN`, `E\d+`, `C-\d{4}`.
pub static ERROR_CODE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"\b\d{3}\.\d{2}\b").expect("valid regex"),
        Regex::new(r"\bE\d{2,4}\b").expect("valid regex"),
        Regex::new(r"\bC-\d{4}\b").expect("valid regex"),
    ]
});

/// First error code found in `text`, if any.
#[must_use]
pub fn first_error_code(text: &str) -> Option<String> {
    ERROR_CODE_PATTERNS
        .iter()
        .find_map(|re| re.find(text).map(|m| m.as_str().to_string()))
}

/// Every distinct error code found in `text`, in order of first appearance.
#[must_use]
pub fn all_error_codes(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    for re in ERROR_CODE_PATTERNS.iter() {
        for m in re.find_iter(text) {
            let code = m.as_str().to_string();
            if !found.contains(&code) {
                found.push(code);
            }
        }
    }
    found
}

/// Product/model shapes recognized in free text: `C4080`, `AccurioPress
/// C4080`, `bizhub 454`, `Taskalfa C2554`, …
static PRODUCT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"\bAccurioPress\s+[A-Z]?\d{3,4}[a-z]?\b").expect("valid regex"),
        Regex::new(r"\bbizhub\s+[A-Z]?\d{3,4}[a-z]?\b").expect("valid regex"),
        Regex::new(r"\bTaskalfa\s+[A-Z]?\d{3,4}[a-z]?\b").expect("valid regex"),
        Regex::new(r"\b[A-Z]\d{4}[a-z]*\b").expect("valid regex"),
    ]
});

/// Every distinct product/model mention found in `text`, in order of first
/// appearance.
#[must_use]
pub fn all_products(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    for re in PRODUCT_PATTERNS.iter() {
        for m in re.find_iter(text) {
            let product = m.as_str().to_string();
            if !found.contains(&product) {
                found.push(product);
            }
        }
    }
    found
}

/// `http(s)://` URLs referenced in document text, recognized up to the first
/// whitespace or closing punctuation a sentence would plausibly end on.
static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"')\]]+"#).expect("valid regex"));

/// Every distinct URL found in `text`, in order of first appearance, with
/// trailing sentence punctuation (`.`, `,`, `;`) stripped.
#[must_use]
pub fn all_urls(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    for m in URL_PATTERN.find_iter(text) {
        let url = m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']).to_string();
        if !found.contains(&url) {
            found.push(url);
        }
    }
    found
}

/// A manufacturer-specific part-number pattern plus the category keywords
/// used to classify parts found in context.
pub struct PartNumberPattern {
    pub manufacturer: &'static str,
    pub regex: LazyLock<Regex>,
}

macro_rules! part_pattern {
    ($manufacturer:literal, $re:literal) => {
        PartNumberPattern {
            manufacturer: $manufacturer,
            regex: LazyLock::new(|| Regex::new($re).expect("valid regex")),
        }
    };
}

/// Part-number shapes keyed by manufacturer: HP alphanumerics, Konica
/// Minolta `A####-R###-##`, Canon `FM#-####-###`, Lexmark `40X####`.
pub static PART_NUMBER_PATTERNS: [PartNumberPattern; 4] = [
    part_pattern!("HP", r"\b[A-Z]\d[A-Z]\d-\d{4}\b"),
    part_pattern!("Konica Minolta", r"\bA\d{3,4}-R\d{3}-\d{2}\b"),
    part_pattern!("Canon", r"\bFM\d-\d{4}-\d{3}\b"),
    part_pattern!("Lexmark", r"\b40X\d{4}\b"),
];

/// Part numbers recognized for `manufacturer` (case-insensitive), paired
/// with their match.
#[must_use]
pub fn part_numbers_for(manufacturer: &str, text: &str) -> Vec<String> {
    PART_NUMBER_PATTERNS
        .iter()
        .filter(|p| p.manufacturer.eq_ignore_ascii_case(manufacturer))
        .flat_map(|p| p.regex.find_iter(text).map(|m| m.as_str().to_string()))
        .collect()
}

/// A manufacturer-specific model-number-to-series rule: if `model_regex`
/// matches the product's model number, the captured group feeds
/// `series_template` (a `{n}`-holed format string) to produce the series
/// name, and `model_regex`'s source is the stored `model_pattern`.
pub struct SeriesRule {
    pub manufacturer: &'static str,
    pub model_regex: &'static str,
    pub series_template: &'static str,
}

/// Series detection rules: HP `M\d{3}` → `LaserJet M{n}00 Series`, Konica
/// Minolta `C\d{3}` → `bizhub C{n}xx Series`, Canon `C\d{4}` → `imageRUNNER
/// ADVANCE C{n}xx Series`.
pub static SERIES_RULES: &[SeriesRule] = &[
    SeriesRule {
        manufacturer: "HP",
        model_regex: r"M(\d)\d{2}",
        series_template: "LaserJet M{n}00 Series",
    },
    SeriesRule {
        manufacturer: "Konica Minolta",
        model_regex: r"C(\d)\d{2}",
        series_template: "bizhub C{n}xx Series",
    },
    SeriesRule {
        manufacturer: "Canon",
        model_regex: r"C(\d)\d{3}",
        series_template: "imageRUNNER ADVANCE C{n}xx Series",
    },
];

/// Apply the series detection rules for `manufacturer` against
/// `model_number`. Returns `(series_name, model_pattern)` on a match.
#[must_use]
pub fn detect_series(manufacturer: &str, model_number: &str) -> Option<(String, String)> {
    for rule in SERIES_RULES {
        if !rule.manufacturer.eq_ignore_ascii_case(manufacturer) {
            continue;
        }
        let re = Regex::new(rule.model_regex).expect("static series regex is valid");
        if let Some(caps) = re.captures(model_number) {
            let digit = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let series_name = rule.series_template.replace("{n}", digit);
            return Some((series_name, rule.model_regex.to_string()));
        }
    }
    None
}
