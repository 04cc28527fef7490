//! Classification of parsed documents into directed transactions.
//!
//! A document is significant when exactly one side sits on one of our
//! accounts; the other side is the counterparty. Everything else is skipped
//! with a tallied reason and the pipeline moves on: one bad document must
//! never take down a batch of statements.

use crate::legal_form::LegalForm;
use crate::money::Money;
use crate::normalize::{format_display_name, normalize_and_classify, NAME_PLACEHOLDER};
use crate::organizations::OrganizationIdentity;
use crate::statement::Document;
use chrono::{Datelike, NaiveDate};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Payment direction relative to our organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Income,
    Expense,
}

impl Direction {
    pub fn label(&self) -> &'static str {
        match self {
            Direction::Income => "income",
            Direction::Expense => "expense",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One significant transaction between our organization and a counterparty.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedTransaction {
    pub our_org_normalized: String,
    pub our_org_raw: String,
    pub our_account: String,
    pub direction: Direction,
    /// Stable grouping key, see [`counterparty_id`].
    pub counterparty_id: String,
    pub counterparty_raw_name: String,
    pub counterparty_normalized_name: String,
    /// "Фамилия И.О." rendering, only for persons with a usable name.
    pub counterparty_display_hint: Option<String>,
    pub counterparty_legal_form: LegalForm,
    pub counterparty_inn: String,
    pub counterparty_account: String,
    pub date: NaiveDate,
    pub year: i32,
    pub amount: Money,
    pub document_number: String,
    pub purpose: String,
}

/// Documents dropped during classification, tallied by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkipCounts {
    pub not_ours: usize,
    pub internal_transfer: usize,
    pub file_account_mismatch: usize,
    pub missing_org_details: usize,
    pub no_counterparty_name: usize,
    pub invalid_data: usize,
}

impl SkipCounts {
    pub fn total(&self) -> usize {
        self.not_ours
            + self.internal_transfer
            + self.file_account_mismatch
            + self.missing_org_details
            + self.no_counterparty_name
            + self.invalid_data
    }
}

/// Raw material for the debug CSV exports, recorded only when requested.
#[derive(Debug, Default)]
pub struct DebugCollector {
    pub names: Vec<NameRecord>,
    pub transactions: Vec<DebugTransaction>,
}

/// One raw-to-normalized name observation.
#[derive(Debug, Clone)]
pub struct NameRecord {
    pub original: String,
    pub normalized: String,
    pub form: LegalForm,
    pub inn: String,
}

/// A kept transaction together with its provenance.
#[derive(Debug, Clone)]
pub struct DebugTransaction {
    /// 1-based position of the document in processing order.
    pub doc_index: usize,
    pub source_file: String,
    pub transaction: ClassifiedTransaction,
}

/// Result of a classification run.
#[derive(Debug)]
pub struct Classification {
    pub transactions: Vec<ClassifiedTransaction>,
    pub skips: SkipCounts,
}

/// Stable identity key for grouping transactions of one counterparty.
///
/// A usable tax ID (non-empty, not the literal `"0"`) keys the party as
/// `INN:<инн>` regardless of how its name was spelled. Without one the key
/// degrades to `NAME_ACC:<ИМЯ>|<счет>` built from the uppercased normalized
/// name (raw name when normalization produced the placeholder) and the
/// account, with `БЕЗ_ИМЕНИ`/`БЕЗ_СЧЕТА` standing in for missing parts.
pub fn counterparty_id(inn: &str, normalized_name: &str, raw_name: &str, account: &str) -> String {
    if !inn.is_empty() && inn != "0" {
        return format!("INN:{inn}");
    }
    let name_part = if !normalized_name.is_empty() && normalized_name != NAME_PLACEHOLDER {
        normalized_name.to_uppercase()
    } else if !raw_name.is_empty() && raw_name != NAME_PLACEHOLDER {
        raw_name.to_uppercase()
    } else {
        "БЕЗ_ИМЕНИ".to_string()
    };
    let account_part = if account.is_empty() { "БЕЗ_СЧЕТА" } else { account };
    format!("NAME_ACC:{name_part}|{account_part}")
}

/// Dates come in four spellings across banks; first format that fits wins.
fn parse_date(text: &str) -> Option<NaiveDate> {
    const FORMATS: [&str; 4] = ["%d.%m.%Y", "%d-%m-%Y", "%Y.%m.%d", "%Y-%m-%d"];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

/// Classifies all documents against the detected organization map.
///
/// Skipped documents are logged with their 1-based index and tallied in
/// [`SkipCounts`]; the run never fails on document content.
pub fn process_documents(
    documents: &[Document],
    organizations: &BTreeMap<String, OrganizationIdentity>,
    mut collector: Option<&mut DebugCollector>,
) -> Classification {
    info!("classifying {} documents...", documents.len());
    let mut transactions: Vec<ClassifiedTransaction> = Vec::new();
    let mut skips = SkipCounts::default();

    for (index, doc) in documents.iter().enumerate() {
        let doc_index = index + 1;
        let number = doc.document_number.as_deref().unwrap_or("б/н");
        let payer_account = doc.payer_account.as_deref().unwrap_or("");
        let receiver_account = doc.receiver_account.as_deref().unwrap_or("");
        let is_payer_ours = organizations.contains_key(payer_account);
        let is_receiver_ours = organizations.contains_key(receiver_account);

        if !is_payer_ours && !is_receiver_ours {
            debug!("doc {doc_index} (№{number}): skipped, neither side is ours");
            skips.not_ours += 1;
            continue;
        }
        if is_payer_ours && is_receiver_ours {
            debug!(
                "doc {doc_index} (№{number}): skipped, internal transfer \
                 {payer_account} -> {receiver_account}"
            );
            skips.internal_transfer += 1;
            continue;
        }

        let direction = if is_payer_ours && payer_account == doc.file_account {
            Some(Direction::Expense)
        } else if is_receiver_ours && receiver_account == doc.file_account {
            Some(Direction::Income)
        } else if is_payer_ours {
            debug!(
                "doc {doc_index} (№{number}): our payer account {payer_account} is not \
                 the file account {}, treating as expense",
                doc.file_account
            );
            Some(Direction::Expense)
        } else if is_receiver_ours {
            debug!(
                "doc {doc_index} (№{number}): our receiver account {receiver_account} is \
                 not the file account {}, treating as income",
                doc.file_account
            );
            Some(Direction::Income)
        } else {
            None
        };
        let Some(direction) = direction else {
            warn!(
                "doc {doc_index} (№{number}): direction unresolved against file account {}",
                doc.file_account
            );
            skips.file_account_mismatch += 1;
            continue;
        };

        let (our_account, cp_name_raw, cp_inn, cp_account) = match direction {
            Direction::Expense => (
                payer_account,
                doc.receiver_name.as_deref().unwrap_or(""),
                doc.receiver_inn.as_deref().unwrap_or(""),
                receiver_account,
            ),
            Direction::Income => (
                receiver_account,
                doc.payer_name.as_deref().unwrap_or(""),
                doc.payer_inn.as_deref().unwrap_or(""),
                payer_account,
            ),
        };

        let Some(org) = organizations.get(our_account) else {
            warn!("doc {doc_index} (№{number}): no identity for our account {our_account}");
            skips.missing_org_details += 1;
            continue;
        };

        if cp_name_raw.is_empty() || cp_name_raw == NAME_PLACEHOLDER {
            warn!(
                "doc {doc_index} (№{number}): counterparty has no name \
                 (inn '{cp_inn}', account '{cp_account}')"
            );
            skips.no_counterparty_name += 1;
            continue;
        }

        let preferred_date = match direction {
            Direction::Expense => doc.date_debited.as_deref(),
            Direction::Income => doc.date_credited.as_deref(),
        };
        let date_str = preferred_date.or(doc.date.as_deref()).unwrap_or("");
        let parsed_amount: Option<Money> = doc.amount.as_deref().and_then(|a| a.parse().ok());
        let (date, amount) = match (parse_date(date_str), parsed_amount) {
            (Some(date), Some(amount)) if amount.is_positive() => (date, amount),
            _ => {
                debug!(
                    "doc {doc_index} (№{number}): invalid date {date_str:?} or amount {:?}",
                    doc.amount
                );
                skips.invalid_data += 1;
                continue;
            }
        };

        let inn = cp_inn.trim();
        let account = cp_account.trim();
        let normalized = normalize_and_classify(cp_name_raw, (!inn.is_empty()).then_some(inn));

        if let Some(collector) = collector.as_deref_mut() {
            collector.names.push(NameRecord {
                original: normalized.original.clone(),
                normalized: normalized.core_name.clone(),
                form: normalized.legal_form,
                inn: inn.to_string(),
            });
        }

        let display_hint = (normalized.core_name != NAME_PLACEHOLDER
            && normalized.legal_form.is_person())
        .then(|| format_display_name(&normalized.core_name));

        let transaction = ClassifiedTransaction {
            our_org_normalized: org.normalized_name.clone(),
            our_org_raw: org.raw_name.clone(),
            our_account: our_account.to_string(),
            direction,
            counterparty_id: counterparty_id(inn, &normalized.core_name, &normalized.original, account),
            counterparty_raw_name: normalized.original.clone(),
            counterparty_normalized_name: normalized.core_name,
            counterparty_display_hint: display_hint,
            counterparty_legal_form: normalized.legal_form,
            counterparty_inn: inn.to_string(),
            counterparty_account: account.to_string(),
            date,
            year: date.year(),
            amount,
            document_number: doc.document_number.clone().unwrap_or_default(),
            purpose: doc.purpose.clone().unwrap_or_default(),
        };

        if let Some(collector) = collector.as_deref_mut() {
            collector.transactions.push(DebugTransaction {
                doc_index,
                source_file: doc.source_file.clone(),
                transaction: transaction.clone(),
            });
        }
        transactions.push(transaction);
    }

    info!(
        "classification done: {} transactions kept, {} of {} documents skipped",
        transactions.len(),
        skips.total(),
        documents.len()
    );
    info!(
        "skip reasons: internal {}, not ours {}, file-account mismatch {}, \
         missing identity {}, invalid data {}, nameless counterparty {}",
        skips.internal_transfer,
        skips.not_ours,
        skips.file_account_mismatch,
        skips.missing_org_details,
        skips.invalid_data,
        skips.no_counterparty_name
    );

    Classification {
        transactions,
        skips,
    }
}
