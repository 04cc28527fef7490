//! Detection of our own organizations from the statement files.
//!
//! Every file declares a main account; the owner of that account is one of
//! "our" organizations. Its name and tax ID are nowhere stated outright, so
//! they are reconstructed from evidence: header fields vote once, and every
//! document whose payer or receiver side sits on a known main account votes
//! for that account's owner.

use crate::legal_form::LegalForm;
use crate::normalize::{normalize_and_classify, NAME_PLACEHOLDER};
use crate::statement::ParsedFile;
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};

/// Display-name prefix for accounts whose owner never got a usable name.
pub const DEFAULT_ORG_PREFIX: &str = "Организация счета";

/// Resolved owner of one of our accounts.
#[derive(Debug, Clone)]
pub struct OrganizationIdentity {
    /// The evidence name the identity was normalized from; empty for
    /// default identities.
    pub raw_name: String,
    pub normalized_name: String,
    pub legal_form: LegalForm,
    /// Resolved tax ID, empty when nothing was observed.
    pub inn: String,
}

#[derive(Debug, Default)]
struct AccountEvidence {
    names: BTreeMap<String, usize>,
    inns: BTreeSet<String>,
    header_inn: Option<String>,
}

/// Maps every distinct main account to its resolved owner identity.
///
/// The map always holds an entry per account: when no usable name can be
/// found the identity degrades to "Организация счета <счет>" rather than
/// dropping the account, so classification never loses documents over a
/// nameless owner.
pub fn detect_organizations(files: &[ParsedFile]) -> BTreeMap<String, OrganizationIdentity> {
    let mut evidence: BTreeMap<String, AccountEvidence> = BTreeMap::new();

    // Header pass: every declared main account opens an entry; header
    // names and tax ID are weak evidence for its owner.
    for file in files {
        let entry = evidence.entry(file.main_account.clone()).or_default();
        if let Some(name) = &file.payer_name {
            *entry.names.entry(name.clone()).or_insert(0) += 1;
        }
        if let Some(name) = &file.receiver_name {
            *entry.names.entry(name.clone()).or_insert(0) += 1;
        }
        if entry.header_inn.is_none() {
            entry.header_inn = file.inn.clone();
        }
    }

    // Document pass: whenever a document side sits on one of our accounts,
    // its name and tax ID count toward that account's owner.
    for file in files {
        for doc in &file.documents {
            accumulate_side(
                &mut evidence,
                doc.payer_account.as_deref(),
                doc.payer_name.as_deref(),
                doc.payer_inn.as_deref(),
            );
            accumulate_side(
                &mut evidence,
                doc.receiver_account.as_deref(),
                doc.receiver_name.as_deref(),
                doc.receiver_inn.as_deref(),
            );
        }
    }

    let mut organizations = BTreeMap::new();
    for (account, entry) in evidence {
        let identity = resolve_owner(&account, &entry);
        info!(
            "account {account}: owner '{}' ({}), inn '{}'",
            identity.normalized_name, identity.legal_form, identity.inn
        );
        organizations.insert(account, identity);
    }
    organizations
}

fn accumulate_side(
    evidence: &mut BTreeMap<String, AccountEvidence>,
    account: Option<&str>,
    name: Option<&str>,
    inn: Option<&str>,
) {
    let Some(entry) = account.and_then(|acc| evidence.get_mut(acc)) else {
        return;
    };
    if let Some(name) = name {
        *entry.names.entry(name.to_string()).or_insert(0) += 1;
    }
    // "0" is what some banks write for "no tax ID".
    if let Some(inn) = inn {
        if inn != "0" {
            entry.inns.insert(inn.to_string());
        }
    }
}

fn resolve_owner(account: &str, evidence: &AccountEvidence) -> OrganizationIdentity {
    let inn = if evidence.inns.is_empty() {
        evidence.header_inn.clone().unwrap_or_default()
    } else {
        if evidence.inns.len() > 1 {
            debug!(
                "account {account}: several tax IDs observed {:?}, keeping the smallest",
                evidence.inns
            );
        }
        // BTreeSet iterates in ascending order.
        evidence.inns.iter().next().cloned().unwrap_or_default()
    };

    if let Some(best) = best_name(&evidence.names) {
        let normalized = normalize_and_classify(best, (!inn.is_empty()).then_some(inn.as_str()));
        if normalized.core_name != NAME_PLACEHOLDER {
            return OrganizationIdentity {
                raw_name: best.to_string(),
                normalized_name: normalized.core_name,
                legal_form: normalized.legal_form,
                inn,
            };
        }
    }

    warn!("account {account}: no usable owner name, using the default label");
    OrganizationIdentity {
        raw_name: String::new(),
        normalized_name: format!("{DEFAULT_ORG_PREFIX} {account}"),
        legal_form: LegalForm::Other,
        inn,
    }
}

/// Candidate names ordered by vote count, then by character length, with
/// remaining ties falling back to the map's alphabetical key order (the
/// sort is stable). The placeholder and default-label artifacts never win.
pub(crate) fn rank_names(names: &BTreeMap<String, usize>) -> Vec<&str> {
    let mut ranked: Vec<(&str, usize)> = names
        .iter()
        .filter(|(name, _)| {
            name.as_str() != NAME_PLACEHOLDER && !name.contains(DEFAULT_ORG_PREFIX)
        })
        .map(|(name, count)| (name.as_str(), *count))
        .collect();
    ranked.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| b.0.chars().count().cmp(&a.0.chars().count()))
    });
    ranked.into_iter().map(|(name, _)| name).collect()
}

pub(crate) fn best_name(names: &BTreeMap<String, usize>) -> Option<&str> {
    rank_names(names).first().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::Document;

    fn file(account: &str, documents: Vec<Document>) -> ParsedFile {
        ParsedFile {
            main_account: account.to_string(),
            inn: None,
            declared_encoding: None,
            payer_name: None,
            receiver_name: None,
            source_file: "test.txt".to_string(),
            documents,
        }
    }

    fn doc_with_payer(account: &str, name: &str, inn: &str) -> Document {
        Document {
            payer_account: Some(account.to_string()),
            payer_name: Some(name.to_string()),
            payer_inn: (!inn.is_empty()).then(|| inn.to_string()),
            ..Document::default()
        }
    }

    #[test]
    fn test_detects_owner_from_document_evidence() {
        let docs = vec![
            doc_with_payer("111", "ООО \"Ромашка\"", "7701234567"),
            doc_with_payer("111", "ООО \"Ромашка\"", "7701234567"),
            doc_with_payer("111", "ООО РОМАШКА ИНН 7701234567", ""),
        ];
        let orgs = detect_organizations(&[file("111", docs)]);
        let org = &orgs["111"];
        assert_eq!(org.normalized_name, "РОМАШКА");
        assert_eq!(org.legal_form, LegalForm::Llc);
        assert_eq!(org.inn, "7701234567");
        assert_eq!(org.raw_name, "ООО \"Ромашка\"");
    }

    #[test]
    fn test_one_entry_per_distinct_account() {
        let orgs = detect_organizations(&[
            file("111", vec![doc_with_payer("111", "ООО АЛЬФА", "")]),
            file("222", vec![doc_with_payer("222", "ООО БЕТА", "")]),
            file("111", Vec::new()),
        ]);
        assert_eq!(orgs.len(), 2);
        assert_eq!(orgs["111"].normalized_name, "АЛЬФА");
        assert_eq!(orgs["222"].normalized_name, "БЕТА");
    }

    #[test]
    fn test_counterparty_accounts_get_no_entry() {
        let mut doc = doc_with_payer("111", "ООО АЛЬФА", "");
        doc.receiver_account = Some("999".to_string());
        doc.receiver_name = Some("ООО ЧУЖАЯ".to_string());
        let orgs = detect_organizations(&[file("111", vec![doc])]);
        assert!(orgs.contains_key("111"));
        assert!(!orgs.contains_key("999"));
    }

    #[test]
    fn test_smallest_of_conflicting_inns_wins() {
        let docs = vec![
            doc_with_payer("111", "ООО АЛЬФА", "7709999999"),
            doc_with_payer("111", "ООО АЛЬФА", "7701111111"),
        ];
        let orgs = detect_organizations(&[file("111", docs)]);
        assert_eq!(orgs["111"].inn, "7701111111");
    }

    #[test]
    fn test_header_inn_is_a_fallback_only() {
        let mut with_header = file("111", vec![doc_with_payer("111", "ООО АЛЬФА", "")]);
        with_header.inn = Some("7705555555".to_string());
        let orgs = detect_organizations(&[with_header]);
        assert_eq!(orgs["111"].inn, "7705555555");

        let mut with_both = file("111", vec![doc_with_payer("111", "ООО АЛЬФА", "7701111111")]);
        with_both.inn = Some("7705555555".to_string());
        let orgs = detect_organizations(&[with_both]);
        assert_eq!(orgs["111"].inn, "7701111111");
    }

    #[test]
    fn test_zero_inn_is_ignored() {
        let docs = vec![doc_with_payer("111", "ООО АЛЬФА", "0")];
        let orgs = detect_organizations(&[file("111", docs)]);
        assert_eq!(orgs["111"].inn, "");
    }

    #[test]
    fn test_most_frequent_name_wins() {
        let docs = vec![
            doc_with_payer("111", "ООО АЛЬФА", ""),
            doc_with_payer("111", "ООО АЛЬФА", ""),
            doc_with_payer("111", "ООО АЛЬФА-СЕРВИС ПЛЮС", ""),
        ];
        let orgs = detect_organizations(&[file("111", docs)]);
        assert_eq!(orgs["111"].normalized_name, "АЛЬФА");
    }

    #[test]
    fn test_length_breaks_count_ties() {
        let docs = vec![
            doc_with_payer("111", "ООО АЛЬФА", ""),
            doc_with_payer("111", "ООО АЛЬФА-СЕРВИС", ""),
        ];
        let orgs = detect_organizations(&[file("111", docs)]);
        assert_eq!(orgs["111"].normalized_name, "АЛЬФА-СЕРВИС");
    }

    #[test]
    fn test_header_names_count_as_evidence() {
        let mut f = file("111", Vec::new());
        f.payer_name = Some("ЗАО ГАММА".to_string());
        let orgs = detect_organizations(&[f]);
        assert_eq!(orgs["111"].normalized_name, "ГАММА");
        assert_eq!(orgs["111"].legal_form, LegalForm::JointStock);
    }

    #[test]
    fn test_nameless_account_gets_default_identity() {
        let orgs = detect_organizations(&[file("40702810000000012345", Vec::new())]);
        let org = &orgs["40702810000000012345"];
        assert_eq!(
            org.normalized_name,
            "Организация счета 40702810000000012345"
        );
        assert_eq!(org.legal_form, LegalForm::Other);
        assert_eq!(org.raw_name, "");
    }

    #[test]
    fn test_detection_is_deterministic() {
        let docs = || {
            vec![
                doc_with_payer("111", "ООО АЛЬФА", "7709999999"),
                doc_with_payer("111", "ООО БЕТА", "7701111111"),
            ]
        };
        let first = detect_organizations(&[file("111", docs())]);
        let second = detect_organizations(&[file("111", docs())]);
        assert_eq!(first["111"].normalized_name, second["111"].normalized_name);
        assert_eq!(first["111"].inn, second["111"].inn);
    }
}
