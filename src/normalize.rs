//! Counterparty name normalization.
//!
//! Bank statements write the same entity a dozen ways: with account and BIC
//! fragments glued on, ИНН/КПП runs, `//`-delimited address blocks, branch
//! qualifiers, legal-form keywords in short and long spellings, and four
//! kinds of quotes. The functions here reduce that free text to a stable
//! core name plus the detected legal form, and format person names as
//! "Фамилия И.О." for display.

use crate::legal_form::{detect_legal_form, form_surfaces, LegalForm, FORM_KEYWORDS};
use log::debug;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Stand-in for a name that could not be normalized.
pub const NAME_PLACEHOLDER: &str = "?";

/// Noise stripping repeats until the text stops changing; the cap guards
/// against a pathological rule interplay.
const MAX_NOISE_PASSES: usize = 8;

/// Result of [`normalize_and_classify`]. Total: every input produces one,
/// with the placeholder as the worst case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedName {
    /// Cleaned core name, the form label, or [`NAME_PLACEHOLDER`].
    pub core_name: String,
    pub legal_form: LegalForm,
    /// The input as received, trimmed.
    pub original: String,
}

struct NoiseRules {
    leading: Vec<Regex>,
    region_start: Regex,
    region_bank: Regex,
    trailing: Vec<Regex>,
}

fn noise_rules() -> &'static NoiseRules {
    static RULES: OnceLock<NoiseRules> = OnceLock::new();
    RULES.get_or_init(|| {
        let compile = |patterns: &[&str]| -> Vec<Regex> {
            patterns
                .iter()
                .map(|p| Regex::new(p).expect("noise regex"))
                .collect()
        };
        NoiseRules {
            leading: compile(&[
                // Account and bank-code fragments swallow the rest of the line.
                r"(?i)(?:^|\s)(?:Р/СЧ?|Л/СЧ?|К/СЧ?|БИК)\s*\d+.*",
                r"(?i)\s+\bИНН\s*\d{10}(?:\d{2})?\b",
                r"(?i)\s+\bКПП\s*\d{9}\b",
                // Belarusian and Kazakh tax IDs.
                r"(?i)\s+\b(?:УНП|БИН)\s*\d+\b",
                // Terminal IDs; deliberately case-sensitive, "Ид" occurs in words.
                r"\s+ID[/\s:]*\d+",
                r"(?s)\s*//.*?//\s*",
            ]),
            region_start: Regex::new(
                r"(?i)\s+\b(?:РОССИЯ|РФ|РЕСПУБЛИКА|КАЗАХСТАН|ЛИТВА|ЛАТВИЯ|РБ|KZ|LT|LV|DE|ГОРОД|ОБЛАСТЬ|КРАЙ|АО|ГО)\b",
            )
            .expect("region start regex"),
            region_bank: Regex::new(r"(?i)\s+В\s+\w+\s+БАНК").expect("region delimiter regex"),
            trailing: compile(&[
                // Postal codes.
                r"\b\d{6}\b",
                r"(?is)\s+В\s+.*?\s+(?:БАНК\b|ФИЛИАЛ\b|ОАО\b|ПАО\b|АО\b|УФК\b|ОТДЕЛЕНИЕ\b)",
                r"(?i)\s+Р/С\s+NULL\b",
                // A parenthesized tail is an address or branch qualifier.
                r"(?s)\s+\(.*\)$",
            ]),
        }
    })
}

fn quotes_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"["„“”«»'`<>]+"#).expect("quotes regex"))
}

fn ip_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^ИП\s+").expect("entrepreneur prefix regex"))
}

fn initials_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b([А-ЯЁ])\s*\.\s*([А-ЯЁ])\s*\.?$").expect("initials regex")
    })
}

/// Region/address runs end at `//`, at a "В <слово> БАНК" clause or at the
/// end of the string. The original rule set expressed that as a lookahead,
/// which this regex engine does not support, so the cut point is found by
/// hand after each region-token match.
fn strip_region_runs(text: &str, rules: &NoiseRules) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    while let Some(found) = rules.region_start.find_at(text, pos) {
        out.push_str(&text[pos..found.start()]);
        out.push(' ');
        let tail = &text[found.end()..];
        let slash = tail.find("//");
        let bank = rules.region_bank.find(tail).map(|m| m.start());
        let cut = match (slash, bank) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => tail.len(),
        };
        pos = found.end() + cut;
    }
    out.push_str(&text[pos..]);
    out
}

fn noise_pass(text: &str, rules: &NoiseRules) -> String {
    let mut cleaned = text.to_string();
    for rule in &rules.leading {
        cleaned = rule.replace_all(&cleaned, " ").into_owned();
    }
    cleaned = strip_region_runs(&cleaned, rules);
    for rule in &rules.trailing {
        cleaned = rule.replace_all(&cleaned, " ").into_owned();
    }
    cleaned
}

fn collapse_spaces(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keyword removal patterns per form, longest surface first so that
/// "ОБЩЕСТВО С ОГРАНИЧЕННОЙ ОТВЕТСТВЕННОСТЬЮ" goes before "ООО".
fn form_strippers(form: LegalForm) -> &'static [Regex] {
    static STRIPPERS: OnceLock<HashMap<LegalForm, Vec<Regex>>> = OnceLock::new();
    let map = STRIPPERS.get_or_init(|| {
        FORM_KEYWORDS
            .iter()
            .map(|(form, surfaces)| {
                let mut ordered: Vec<&str> = surfaces.to_vec();
                ordered.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));
                let strippers = ordered
                    .into_iter()
                    .map(|surface| {
                        let escaped = regex::escape(surface);
                        Regex::new(&format!(
                            r"(?i)(?:\b{escaped}\b\s*|\s*\b{escaped}\b|\s*\(\s*{escaped}\s*\)\s*)"
                        ))
                        .expect("keyword stripper regex")
                    })
                    .collect();
                (*form, strippers)
            })
            .collect()
    });
    map.get(&form).map(Vec::as_slice).unwrap_or(&[])
}

fn is_valid_core(core: &str) -> bool {
    core.chars().count() > 1
        && !core.chars().all(|c| c.is_numeric())
        && !core.chars().all(|c| matches!(c, '-' | '.' | ','))
}

/// Strips noise fragments and the detected form's keywords from a raw name.
///
/// Returns `None` when nothing usable remains: empty, a single character,
/// digits only, or punctuation only. Organization names come back
/// uppercased; person names keep their natural casing for display
/// formatting.
pub fn strip_noise_and_form(raw_name: &str, form: LegalForm) -> Option<String> {
    let name = raw_name.trim();
    if name.is_empty() {
        return None;
    }
    let rules = noise_rules();

    // One rule often exposes junk for another (an ИНН run hiding behind a
    // //..// block, say), so the pass repeats to a fixpoint.
    let mut cleaned = name.to_string();
    for _ in 0..MAX_NOISE_PASSES {
        let next = noise_pass(&cleaned, rules);
        if next == cleaned {
            break;
        }
        cleaned = next;
    }
    let cleaned = collapse_spaces(&cleaned);
    if cleaned.is_empty() {
        return None;
    }

    let mut stripped = cleaned;
    if !form_surfaces(form).is_empty() {
        if form == LegalForm::IndividualEntrepreneur {
            stripped = ip_prefix_re().replace(&stripped, "").into_owned();
        }
        for stripper in form_strippers(form) {
            stripped = stripper.replace_all(&stripped, " ").into_owned();
        }
    }
    let unquoted = quotes_re().replace_all(&stripped, "");
    let core = collapse_spaces(&unquoted);

    if !is_valid_core(&core) {
        debug!("name {raw_name:?} reduced to unusable core {core:?}");
        return None;
    }
    if form.is_person() {
        Some(core)
    } else {
        Some(core.to_uppercase())
    }
}

/// Normalizes a raw party name into a core name plus legal form.
///
/// Never fails: when the cleaned name dissolves into junk, a concrete form
/// label ("ООО", "ГОС") still identifies the entity kind, and the
/// placeholder covers the rest. Empty input is a nameless individual.
pub fn normalize_and_classify(raw_name: &str, inn: Option<&str>) -> NormalizedName {
    let original = raw_name.trim();
    if original.is_empty() {
        return NormalizedName {
            core_name: NAME_PLACEHOLDER.to_string(),
            legal_form: LegalForm::Individual,
            original: String::new(),
        };
    }
    let legal_form = detect_legal_form(original, inn);
    let core_name = match strip_noise_and_form(original, legal_form) {
        Some(core) => core,
        None if !legal_form.is_person() && !legal_form.is_generic() => {
            legal_form.label().to_string()
        }
        None => {
            debug!("no usable core in {original:?} (form {legal_form}), using placeholder");
            NAME_PLACEHOLDER.to_string()
        }
    };
    NormalizedName {
        core_name,
        legal_form,
        original: original.to_string(),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

fn initial_of(word: &str) -> String {
    word.chars()
        .next()
        .map(|c| c.to_uppercase().to_string())
        .unwrap_or_default()
}

fn is_upper_cyrillic(c: char) -> bool {
    matches!(c, 'А'..='Я' | 'Ё')
}

/// Formats a person name for display: "Иванов Иван Иванович" and
/// "ИВАНОВ ИВАН ИВАНОВИЧ" both come out as "Иванов И.И.", and names that
/// already carry initials are re-anchored to the surname. Non-person-shaped
/// input is returned capitalized rather than mangled.
pub fn format_display_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return NAME_PLACEHOLDER.to_string();
    }
    let without_prefix = ip_prefix_re().replace(trimmed, "");
    let unquoted = quotes_re().replace_all(&without_prefix, "");
    let name = collapse_spaces(&unquoted);

    let words: Vec<&str> = name
        .split_whitespace()
        .map(|w| w.trim_matches(|c| c == '.' || c == ','))
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        return NAME_PLACEHOLDER.to_string();
    }

    // "Фамилия И. О." already carries initials: keep them and capitalize
    // the word right before them as the surname.
    if let Some(caps) = initials_re().captures(&name) {
        if let (Some(full), Some(first), Some(second)) = (caps.get(0), caps.get(1), caps.get(2)) {
            let surname_part = name[..full.start()].trim();
            if let Some(surname) = surname_part.split_whitespace().last() {
                return format!(
                    "{} {}.{}.",
                    capitalize(surname),
                    first.as_str(),
                    second.as_str()
                );
            }
        }
    }

    let meaningful: Vec<&str> = words
        .iter()
        .copied()
        .filter(|w| w.chars().count() > 1 || w.chars().all(char::is_alphabetic))
        .collect();
    let looks_like_fio = !meaningful.is_empty()
        && meaningful
            .iter()
            .take(3)
            .all(|w| w.chars().next().is_some_and(is_upper_cyrillic));

    if meaningful.len() >= 3 && looks_like_fio {
        format!(
            "{} {}.{}.",
            capitalize(meaningful[0]),
            initial_of(meaningful[1]),
            initial_of(meaningful[2])
        )
    } else if meaningful.len() == 2 && looks_like_fio {
        format!("{} {}", capitalize(meaningful[0]), capitalize(meaningful[1]))
    } else if meaningful.len() == 1 {
        capitalize(meaningful[0])
    } else if words.len() > 1 {
        format!("{} {}", capitalize(words[0]), words[1..].join(" "))
    } else {
        capitalize(words[0])
    }
}
