//! Debug CSV exports.
//!
//! Two semicolon-delimited files produced only in debug mode: the name
//! normalization table (what every raw spelling turned into) and the full
//! transaction dump. Both exist for eyeballing classifier decisions, not
//! for downstream tooling.

use crate::classify::DebugCollector;
use crate::error::Result;
use crate::normalize::NAME_PLACEHOLDER;
use csv::WriterBuilder;
use log::{info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

pub const NAMES_CSV_FILENAME: &str = "debug_normalized_names.csv";
pub const TRANSACTIONS_CSV_FILENAME: &str = "debug_processed_transactions.csv";

/// Writes the raw-to-normalized name table.
///
/// Observations are deduplicated by `(original, inn)`; when one pair
/// produced several normalized variants or forms they are pipe-joined.
/// Rows are sorted by form label, then case-folded original.
pub fn write_names_csv<W: Write>(collector: &DebugCollector, writer: W) -> Result<()> {
    let mut unique: BTreeMap<(String, String), (BTreeSet<String>, BTreeSet<String>)> =
        BTreeMap::new();
    for record in &collector.names {
        let entry = unique
            .entry((record.original.clone(), record.inn.clone()))
            .or_default();
        if record.normalized != NAME_PLACEHOLDER {
            entry.0.insert(record.normalized.clone());
        }
        entry.1.insert(record.form.label().to_string());
    }

    let mut rows: Vec<[String; 4]> = unique
        .into_iter()
        .map(|((original, inn), (normalized, forms))| {
            let normalized = if normalized.is_empty() {
                NAME_PLACEHOLDER.to_string()
            } else {
                normalized.into_iter().collect::<Vec<_>>().join(" | ")
            };
            let form = forms.into_iter().collect::<Vec<_>>().join(" | ");
            [original, normalized, form, inn]
        })
        .collect();
    rows.sort_by(|a, b| (&a[2], a[0].to_lowercase()).cmp(&(&b[2], b[0].to_lowercase())));

    let mut csv_writer = WriterBuilder::new().delimiter(b';').from_writer(writer);
    csv_writer.write_record(["original", "normalized", "form", "inn"])?;
    for row in &rows {
        csv_writer.write_record(row)?;
    }
    csv_writer.flush()?;

    info!("name normalization table: {} rows", rows.len());
    Ok(())
}

/// Writes the kept-transaction dump, optionally narrowed to counterparties
/// whose raw name contains `name_filter` (case-insensitive).
///
/// When the filter matches nothing the file still gets its header row, so
/// an empty result is distinguishable from a failed run.
pub fn write_transactions_csv<W: Write>(
    collector: &DebugCollector,
    name_filter: Option<&str>,
    writer: W,
) -> Result<()> {
    let filter_lower = name_filter.map(str::to_lowercase);
    let selected: Vec<_> = collector
        .transactions
        .iter()
        .filter(|record| match &filter_lower {
            Some(needle) => record
                .transaction
                .counterparty_raw_name
                .to_lowercase()
                .contains(needle),
            None => true,
        })
        .collect();

    if let Some(filter) = name_filter {
        info!(
            "transaction dump filter '{}': kept {} of {}",
            filter,
            selected.len(),
            collector.transactions.len()
        );
    }
    if selected.is_empty() {
        warn!("no transactions matched the debug dump");
    }

    let mut csv_writer = WriterBuilder::new().delimiter(b';').from_writer(writer);
    csv_writer.write_record([
        "doc_index",
        "source_file",
        "our_org_normalized",
        "our_org_raw",
        "our_account",
        "direction",
        "counterparty_id",
        "counterparty_raw_name",
        "counterparty_normalized_name",
        "counterparty_display_hint",
        "counterparty_legal_form",
        "counterparty_inn",
        "counterparty_account",
        "date",
        "year",
        "amount",
        "document_number",
        "purpose",
    ])?;
    for record in &selected {
        let tx = &record.transaction;
        csv_writer.write_record([
            record.doc_index.to_string(),
            record.source_file.clone(),
            tx.our_org_normalized.clone(),
            tx.our_org_raw.clone(),
            tx.our_account.clone(),
            tx.direction.label().to_string(),
            tx.counterparty_id.clone(),
            tx.counterparty_raw_name.clone(),
            tx.counterparty_normalized_name.clone(),
            tx.counterparty_display_hint.clone().unwrap_or_default(),
            tx.counterparty_legal_form.label().to_string(),
            tx.counterparty_inn.clone(),
            tx.counterparty_account.clone(),
            tx.date.format("%d.%m.%Y").to_string(),
            tx.year.to_string(),
            tx.amount.to_string(),
            tx.document_number.clone(),
            tx.purpose.clone(),
        ])?;
    }
    csv_writer.flush()?;

    info!("transaction dump: {} rows", selected.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ClassifiedTransaction, DebugTransaction, Direction, NameRecord};
    use crate::legal_form::LegalForm;
    use chrono::{Datelike, NaiveDate};

    fn name_record(original: &str, normalized: &str, form: LegalForm, inn: &str) -> NameRecord {
        NameRecord {
            original: original.to_string(),
            normalized: normalized.to_string(),
            form,
            inn: inn.to_string(),
        }
    }

    fn debug_tx(doc_index: usize, raw_name: &str) -> DebugTransaction {
        let date = NaiveDate::from_ymd_opt(2023, 11, 7).unwrap();
        DebugTransaction {
            doc_index,
            source_file: "statement.txt".to_string(),
            transaction: ClassifiedTransaction {
                our_org_normalized: "АЛЬФА".to_string(),
                our_org_raw: "ООО АЛЬФА".to_string(),
                our_account: "40702810000000012345".to_string(),
                direction: Direction::Expense,
                counterparty_id: "INN:7701234567".to_string(),
                counterparty_raw_name: raw_name.to_string(),
                counterparty_normalized_name: raw_name.to_uppercase(),
                counterparty_display_hint: None,
                counterparty_legal_form: LegalForm::Llc,
                counterparty_inn: "7701234567".to_string(),
                counterparty_account: "40702810999999999999".to_string(),
                date,
                year: date.year(),
                amount: "100.00".parse().unwrap(),
                document_number: "1".to_string(),
                purpose: "оплата;по договору".to_string(),
            },
        }
    }

    fn csv_string(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_names_csv_dedups_and_joins_variants() {
        let collector = DebugCollector {
            names: vec![
                name_record("ООО Ромашка", "РОМАШКА", LegalForm::Llc, "7701234567"),
                name_record("ООО Ромашка", "РОМАШКА", LegalForm::Llc, "7701234567"),
                name_record("ООО Ромашка", "РОМАШКА ПЛЮС", LegalForm::Llc, "7701234567"),
            ],
            transactions: vec![],
        };

        let mut output = Vec::new();
        write_names_csv(&collector, &mut output).unwrap();
        let text = csv_string(output);

        assert!(text.starts_with("original;normalized;form;inn\n"));
        assert!(text.contains("ООО Ромашка;РОМАШКА | РОМАШКА ПЛЮС;ООО;7701234567"));
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_names_csv_placeholder_when_nothing_usable() {
        let collector = DebugCollector {
            names: vec![name_record("-", "?", LegalForm::Other, "")],
            transactions: vec![],
        };

        let mut output = Vec::new();
        write_names_csv(&collector, &mut output).unwrap();
        let text = csv_string(output);

        assert!(text.contains("-;?;ДРУГОЕ;"));
    }

    #[test]
    fn test_names_csv_sorted_by_form_then_original() {
        let collector = DebugCollector {
            names: vec![
                name_record("ооо яблоко", "ЯБЛОКО", LegalForm::Llc, "1"),
                name_record("АО Банк", "БАНК", LegalForm::JointStock, "2"),
                name_record("ООО Арбуз", "АРБУЗ", LegalForm::Llc, "3"),
            ],
            transactions: vec![],
        };

        let mut output = Vec::new();
        write_names_csv(&collector, &mut output).unwrap();
        let text = csv_string(output);
        let lines: Vec<&str> = text.lines().collect();

        // "АО" sorts before "ООО"; within "ООО" the case-folded original wins.
        assert!(lines[1].starts_with("АО Банк"));
        assert!(lines[2].starts_with("ООО Арбуз"));
        assert!(lines[3].starts_with("ооо яблоко"));
    }

    #[test]
    fn test_transactions_csv_quotes_delimiter_in_purpose() {
        let collector = DebugCollector {
            names: vec![],
            transactions: vec![debug_tx(1, "ООО Ромашка")],
        };

        let mut output = Vec::new();
        write_transactions_csv(&collector, None, &mut output).unwrap();
        let text = csv_string(output);

        assert!(text.contains("\"оплата;по договору\""));
        assert!(text.contains("1;statement.txt;АЛЬФА"));
        assert!(text.contains(";expense;"));
        assert!(text.contains(";07.11.2023;2023;100.00;"));
    }

    #[test]
    fn test_transactions_csv_filter_is_case_insensitive() {
        let collector = DebugCollector {
            names: vec![],
            transactions: vec![debug_tx(1, "ООО Ромашка"), debug_tx(2, "ЗАО Вектор")],
        };

        let mut output = Vec::new();
        write_transactions_csv(&collector, Some("ромашка"), &mut output).unwrap();
        let text = csv_string(output);

        assert!(text.contains("ООО Ромашка"));
        assert!(!text.contains("ЗАО Вектор"));
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_transactions_csv_header_only_when_filter_matches_nothing() {
        let collector = DebugCollector {
            names: vec![],
            transactions: vec![debug_tx(1, "ООО Ромашка")],
        };

        let mut output = Vec::new();
        write_transactions_csv(&collector, Some("нет такого"), &mut output).unwrap();
        let text = csv_string(output);

        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("doc_index;source_file"));
    }
}
