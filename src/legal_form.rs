//! Legal-form (ОПФ) detection from raw counterparty names.
//!
//! Statement text encodes the organizational form as a keyword: short
//! ("ООО", "ПАО"), long ("ОБЩЕСТВО С ОГРАНИЧЕННОЙ ОТВЕТСТВЕННОСТЬЮ"), or
//! parenthesized. The catalogue below maps every known surface spelling to
//! a form tag; detection picks the longest keyword found anywhere in the
//! name, with fallbacks on the tax-ID shape and on the structure of the
//! name itself.

use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::OnceLock;

/// Organizational legal form of a transaction party.
///
/// A closed set: every party resolves to exactly one variant. `Individual`
/// covers private persons with no registered form, `LegalEntity` is the
/// generic "some organization, form unknown" bucket inferred from a 10-digit
/// ИНН, and `Other` means nothing could be determined at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegalForm {
    /// ИП, individual entrepreneur.
    IndividualEntrepreneur,
    /// ООО, limited liability company.
    Llc,
    /// АО/ПАО/ЗАО/ОАО, joint-stock company.
    JointStock,
    /// Government bodies: ИФНС, УФК, министерства and the like.
    State,
    Fund,
    AutonomousNonprofit,
    Nonprofit,
    Association,
    Cooperative,
    Partnership,
    /// Адвокатское бюро.
    LawFirm,
    /// Коллегия адвокатов.
    BarAssociation,
    Branch,
    // Foreign forms, matched by their Latin abbreviations.
    Ltd,
    ForeignLlc,
    Gmbh,
    Sia,
    As,
    Uab,
    Too,
    Corp,
    Inc,
    Plc,
    /// ФЛ, a private person with no registered form.
    Individual,
    /// ЮЛ, an organization whose concrete form is unknown.
    LegalEntity,
    /// Form could not be determined.
    Other,
}

impl LegalForm {
    /// Short tag used in reports, debug exports and log lines.
    pub fn label(&self) -> &'static str {
        match self {
            LegalForm::IndividualEntrepreneur => "ИП",
            LegalForm::Llc => "ООО",
            LegalForm::JointStock => "АО",
            LegalForm::State => "ГОС",
            LegalForm::Fund => "ФОНД",
            LegalForm::AutonomousNonprofit => "АНО",
            LegalForm::Nonprofit => "НКО",
            LegalForm::Association => "АССОЦ",
            LegalForm::Cooperative => "КООП",
            LegalForm::Partnership => "ПАРТНЕРСТВО",
            LegalForm::LawFirm => "АДВ_БЮРО",
            LegalForm::BarAssociation => "КОЛЛ_АДВ",
            LegalForm::Branch => "ФИЛИАЛ",
            LegalForm::Ltd => "LTD",
            LegalForm::ForeignLlc => "LLC",
            LegalForm::Gmbh => "GMBH",
            LegalForm::Sia => "SIA",
            LegalForm::As => "AS",
            LegalForm::Uab => "UAB",
            LegalForm::Too => "TOO",
            LegalForm::Corp => "CORP",
            LegalForm::Inc => "INC",
            LegalForm::Plc => "PLC",
            LegalForm::Individual => "ФЛ",
            LegalForm::LegalEntity => "ЮЛ",
            LegalForm::Other => "ДРУГОЕ",
        }
    }

    /// The name denotes a human: kept in natural casing and formatted as
    /// "Фамилия И.О." for display.
    pub fn is_person(&self) -> bool {
        matches!(
            self,
            LegalForm::IndividualEntrepreneur | LegalForm::Individual
        )
    }

    /// Catch-all variants whose label says nothing about the entity, so it
    /// cannot stand in for a missing name.
    pub fn is_generic(&self) -> bool {
        matches!(self, LegalForm::LegalEntity | LegalForm::Other)
    }
}

impl fmt::Display for LegalForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for LegalForm {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.label())
    }
}

/// Keyword surfaces per form, in detection order. Within a form the long
/// spellings come before the abbreviations they contain.
pub(crate) const FORM_KEYWORDS: &[(LegalForm, &[&str])] = &[
    (
        LegalForm::IndividualEntrepreneur,
        &["ИНДИВИДУАЛЬНЫЙ ПРЕДПРИНИМАТЕЛЬ", "ИП"],
    ),
    (
        LegalForm::Llc,
        &["ОБЩЕСТВО С ОГРАНИЧЕННОЙ ОТВЕТСТВЕННОСТЬЮ", "ООО"],
    ),
    (
        LegalForm::JointStock,
        &[
            "ПУБЛИЧНОЕ АКЦИОНЕРНОЕ ОБЩЕСТВО",
            "НЕПУБЛИЧНОЕ АКЦИОНЕРНОЕ ОБЩЕСТВО",
            "АКЦИОНЕРНОЕ ОБЩЕСТВО",
            "ЗАКРЫТОЕ АКЦИОНЕРНОЕ ОБЩЕСТВО",
            "ОТКРЫТОЕ АКЦИОНЕРНОЕ ОБЩЕСТВО",
            "ПАО",
            "НАО",
            "ЗАО",
            "ОАО",
            "АО",
        ],
    ),
    (
        LegalForm::State,
        &[
            "ГОСУДАРСТВЕННОЕ УЧРЕЖДЕНИЕ",
            "ФОНД СОЦИАЛЬНОГО СТРАХОВАНИЯ",
            "ИФНС",
            "УФК",
            "ГУ",
            "ФСС",
            "ФГБУ",
            "ФКУ",
            "ФАУ",
            "ФГУП",
            "МИНИСТЕРСТВО",
            "ДЕПАРТАМЕНТ",
            "АДМИНИСТРАЦИЯ",
            "КАЗНАЧЕЙСТВО",
            "РОСПОТРЕБНАДЗОР",
            "РОСМОЛОДЕЖЬ",
            "УПРАВЛЕНИЕ МВД",
            "ОТДЕЛЕНИЕ ФОНДА",
            "ТУРИСТИЧЕСКИЙ ОТДЕЛ",
            "ПОСОЛЬСТВО",
            "УГИБДД",
            "ОСП",
            "АДМИНИСТРАТОР МОСКОВСКОГО ПАРКОВОЧНОГО",
        ],
    ),
    (LegalForm::Fund, &["БЛАГОТВОРИТЕЛЬНЫЙ ФОНД", "ФОНД"]),
    (
        LegalForm::AutonomousNonprofit,
        &["АВТОНОМНАЯ НЕКОММЕРЧЕСКАЯ ОРГАНИЗАЦИЯ", "АНО"],
    ),
    (
        LegalForm::Nonprofit,
        &["НЕКОММЕРЧЕСКАЯ ОРГАНИЗАЦИЯ", "НКО"],
    ),
    (LegalForm::Association, &["АССОЦИАЦИЯ"]),
    (LegalForm::Cooperative, &["КООПЕРАТИВ", "КФХ"]),
    (LegalForm::Partnership, &["ПАРТНЕРСТВО", "НП"]),
    (LegalForm::LawFirm, &["АДВОКАТСКОЕ БЮРО"]),
    (LegalForm::BarAssociation, &["КОЛЛЕГИЯ АДВОКАТОВ"]),
    (LegalForm::Branch, &["ФИЛИАЛ", "ПРЕДСТАВИТЕЛЬСТВО"]),
    (LegalForm::Ltd, &["LIMITED", "LTD"]),
    (LegalForm::ForeignLlc, &["LLC"]),
    (LegalForm::Gmbh, &["GMBH"]),
    (LegalForm::Sia, &["SIA"]),
    (LegalForm::As, &["AS"]),
    (LegalForm::Uab, &["UAB"]),
    (LegalForm::Too, &["TOO"]),
    (LegalForm::Corp, &["CORPORATION", "CORP"]),
    (LegalForm::Inc, &["INC"]),
    (LegalForm::Plc, &["PLC"]),
];

/// Surface spellings for one form, for keyword removal after detection.
/// Forms without catalogue entries (ФЛ, ЮЛ, ДРУГОЕ) yield an empty slice.
pub(crate) fn form_surfaces(form: LegalForm) -> &'static [&'static str] {
    FORM_KEYWORDS
        .iter()
        .find(|(f, _)| *f == form)
        .map(|(_, surfaces)| *surfaces)
        .unwrap_or(&[])
}

struct FormMatcher {
    form: LegalForm,
    finders: Vec<Regex>,
}

/// Compiled finder table, built once. "ИП" is only trusted as a leading
/// token or in parentheses; every other keyword matches as a whole word or
/// parenthesized anywhere in the name.
fn finder_catalogue() -> &'static [FormMatcher] {
    static CATALOGUE: OnceLock<Vec<FormMatcher>> = OnceLock::new();
    CATALOGUE.get_or_init(|| {
        FORM_KEYWORDS
            .iter()
            .map(|(form, surfaces)| FormMatcher {
                form: *form,
                finders: surfaces
                    .iter()
                    .map(|surface| {
                        let escaped = regex::escape(surface);
                        let pattern = if *form == LegalForm::IndividualEntrepreneur {
                            format!(r"(?i)(?:^{escaped}\s+|\(\s*{escaped}\s*\))")
                        } else {
                            format!(r"(?i)(?:\b{escaped}\b|\(\s*{escaped}\s*\))")
                        };
                        Regex::new(&pattern).expect("legal form finder regex")
                    })
                    .collect(),
            })
            .collect()
    })
}

fn capitalized_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // A capitalized Cyrillic word; a lone initial counts, so that
    // "Иванов И.И." still reads as a person.
    RE.get_or_init(|| Regex::new(r"\b[А-ЯЁ][а-яё\-]*\b").expect("capitalized word regex"))
}

fn person_structure_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:[А-ЯЁа-яё\-]+\s+)+[А-ЯЁа-яё\-.]+$").expect("person structure regex")
    })
}

/// Detects the legal form of a raw party name.
///
/// Precedence: keyword match with the longest span wins; an equally long
/// "ИП" match beats any other candidate. Without a keyword, a 12-digit tax
/// ID means a person and a 10-digit one a legal entity. Without a tax ID,
/// a name shaped like "Фамилия Имя [Отчество]" is treated as a person.
/// Empty names are persons: unnamed counterparties in bank exports are
/// almost always card payments by individuals.
pub fn detect_legal_form(raw_name: &str, inn: Option<&str>) -> LegalForm {
    let upper = raw_name.trim().to_uppercase();
    if upper.is_empty() {
        return LegalForm::Individual;
    }

    let mut best: Option<LegalForm> = None;
    let mut best_span = 0;
    for matcher in finder_catalogue() {
        for finder in &matcher.finders {
            for found in finder.find_iter(&upper) {
                let span = found
                    .as_str()
                    .trim_matches(|c| c == '(' || c == ')' || c == ' ')
                    .chars()
                    .count();
                if span > best_span {
                    best_span = span;
                    best = Some(matcher.form);
                } else if span == best_span
                    && matcher.form == LegalForm::IndividualEntrepreneur
                    && best != Some(LegalForm::IndividualEntrepreneur)
                {
                    best = Some(matcher.form);
                }
            }
        }
    }
    if let Some(form) = best {
        return form;
    }

    if let Some(inn) = inn {
        match inn.trim().chars().count() {
            12 => return LegalForm::Individual,
            10 => return LegalForm::LegalEntity,
            _ => {}
        }
    }

    if looks_like_person_name(raw_name) {
        LegalForm::Individual
    } else {
        LegalForm::Other
    }
}

/// Structural person-name check: after dropping digits and quotes, the name
/// must consist purely of Cyrillic words with at least two of them
/// capitalized (initials included).
fn looks_like_person_name(raw_name: &str) -> bool {
    let cleaned: String = raw_name
        .chars()
        .filter(|c| !c.is_numeric() && !matches!(c, '"' | '„' | '“' | '”' | '«' | '»' | '\''))
        .collect();
    let cleaned = cleaned.trim();
    capitalized_word_re().find_iter(cleaned).count() >= 2
        && person_structure_re().is_match(cleaned)
}
