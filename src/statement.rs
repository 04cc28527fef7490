//! 1CClientBankExchange statement file parsing.
//!
//! The exchange format is line-oriented `Ключ=Значение` text, encoded in
//! Windows-1251 by every bank we have seen. A file has a header section,
//! then document sections bracketed by `СекцияДокумент=`/`КонецДокумента`,
//! then `КонецФайла`. The parser validates the untyped lines into plain
//! record structs at this boundary; nothing downstream touches raw keys.

use crate::error::{AnalyzerError, Result};
use encoding_rs::WINDOWS_1251;
use log::warn;
use std::fs;
use std::path::Path;

/// One parsed statement export file.
///
/// `main_account` is the account the file is declared to belong to (the
/// first non-empty `РасчСчет` header value). Files without one are rejected
/// by the parser, so downstream code may rely on it being non-empty.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    /// The file's declared main account, non-empty.
    pub main_account: String,

    /// Header `ИНН`, used as a fallback tax ID for the main account.
    pub inn: Option<String>,

    /// Header `Кодировка` as declared by the exporting bank.
    pub declared_encoding: Option<String>,

    /// Header `Плательщик`, name evidence for organization detection.
    pub payer_name: Option<String>,

    /// Header `Получатель`, name evidence for organization detection.
    pub receiver_name: Option<String>,

    /// Display name of the source file (for logs and debug exports).
    pub source_file: String,

    /// Document sections in file order.
    pub documents: Vec<Document>,
}

/// One `СекцияДокумент` block, validated into a typed record.
///
/// Optional fields hold `None` when the key was absent or its value empty;
/// the exchange format does not distinguish the two. Date and amount fields
/// stay raw here; the classifier parses them and skips documents where
/// they turn out invalid.
#[derive(Debug, Clone, Default)]
pub struct Document {
    /// Section type (`Платежное поручение`, `Банковский ордер`, ...).
    pub document_type: String,

    /// Display name of the file this document came from.
    pub source_file: String,

    /// The owning file's main account, stamped onto every document.
    pub file_account: String,

    pub document_number: Option<String>,
    pub date: Option<String>,
    pub date_debited: Option<String>,
    pub date_credited: Option<String>,
    pub amount: Option<String>,

    pub payer_name: Option<String>,
    pub payer_account: Option<String>,
    pub payer_inn: Option<String>,

    pub receiver_name: Option<String>,
    pub receiver_account: Option<String>,
    pub receiver_inn: Option<String>,

    pub purpose: Option<String>,
}

/// Raw per-document fields accumulated while scanning a section.
#[derive(Default)]
struct DocFields {
    document_type: String,
    document_number: Option<String>,
    date: Option<String>,
    date_debited: Option<String>,
    date_credited: Option<String>,
    amount: Option<String>,
    payer_name: Option<String>,
    payer_name_alt: Option<String>,
    payer_account: Option<String>,
    payer_inn: Option<String>,
    receiver_name: Option<String>,
    receiver_name_alt: Option<String>,
    receiver_account: Option<String>,
    receiver_inn: Option<String>,
    purpose: Option<String>,
}

impl DocFields {
    fn set(&mut self, key: &str, value: Option<String>) {
        match key {
            "Номер" => self.document_number = value,
            "Дата" => self.date = value,
            "ДатаСписано" => self.date_debited = value,
            "ДатаПоступило" => self.date_credited = value,
            "Сумма" => self.amount = value,
            "Плательщик" => self.payer_name = value,
            "Плательщик1" => self.payer_name_alt = value,
            "ПлательщикСчет" => self.payer_account = value,
            "ПлательщикИНН" => self.payer_inn = value,
            "Получатель" => self.receiver_name = value,
            "Получатель1" => self.receiver_name_alt = value,
            "ПолучательСчет" => self.receiver_account = value,
            "ПолучательИНН" => self.receiver_inn = value,
            "НазначениеПлатежа" => self.purpose = value,
            _ => {}
        }
    }

    fn into_document(self) -> Document {
        Document {
            document_type: self.document_type,
            source_file: String::new(),
            file_account: String::new(),
            document_number: self.document_number,
            date: self.date,
            date_debited: self.date_debited,
            date_credited: self.date_credited,
            amount: self.amount,
            // bank exports write the party name under either `Плательщик`
            // or `Плательщик1`, with the unsuffixed key taking precedence
            payer_name: self.payer_name.or(self.payer_name_alt),
            payer_account: self.payer_account,
            payer_inn: self.payer_inn,
            receiver_name: self.receiver_name.or(self.receiver_name_alt),
            receiver_account: self.receiver_account,
            receiver_inn: self.receiver_inn,
            purpose: self.purpose,
        }
    }
}

/// Reads and parses one statement file from disk.
///
/// The bytes are decoded as Windows-1251 with replacement; a declared
/// encoding other than `Windows`/`cp1251` is logged but not treated as an
/// error, matching how the banks themselves mislabel the field.
pub fn parse_file(path: &Path) -> Result<ParsedFile> {
    let bytes = fs::read(path)?;
    let (text, _, had_errors) = WINDOWS_1251.decode(&bytes);
    if had_errors {
        warn!("{}: some bytes could not be decoded as cp1251", path.display());
    }
    parse_text(&text, path)
}

/// Parses statement text into a [`ParsedFile`].
///
/// Returns [`AnalyzerError::MissingFileAccount`] when no non-empty
/// `РасчСчет` header is present: such a file cannot be classified and is
/// counted as a parse error by the caller.
pub fn parse_text(text: &str, source: &Path) -> Result<ParsedFile> {
    let source_file = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.display().to_string());

    if !text
        .lines()
        .next()
        .map(|l| l.trim().starts_with("1CClientBankExchange"))
        .unwrap_or(false)
    {
        warn!("{source_file}: missing 1CClientBankExchange signature line");
    }

    let mut main_account: Option<String> = None;
    let mut inn: Option<String> = None;
    let mut declared_encoding: Option<String> = None;
    let mut header_payer: Option<String> = None;
    let mut header_receiver: Option<String> = None;
    let mut documents: Vec<Document> = Vec::new();
    let mut current: Option<DocFields> = None;

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("СекцияДокумент") {
            let doc_type = rest.strip_prefix('=').unwrap_or("?").trim();
            current = Some(DocFields {
                document_type: doc_type.to_string(),
                ..DocFields::default()
            });
            continue;
        }
        if line.starts_with("КонецДокумента") {
            if let Some(fields) = current.take() {
                documents.push(fields.into_document());
            }
            continue;
        }
        if line.starts_with("КонецФайла") {
            break;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        let stored = (!value.is_empty()).then(|| value.to_string());

        if let Some(fields) = current.as_mut() {
            fields.set(key, stored);
            continue;
        }

        // Header section: the first occurrence of a key wins.
        match key {
            "Кодировка" if declared_encoding.is_none() => {
                if !matches!(value.to_lowercase().as_str(), "windows" | "cp1251") {
                    warn!("{source_file}: declared encoding '{value}' differs from cp1251");
                }
                declared_encoding = stored;
            }
            "РасчСчет" if main_account.is_none() => main_account = stored,
            "ИНН" if inn.is_none() => inn = stored,
            "Плательщик" if header_payer.is_none() => header_payer = stored,
            "Получатель" if header_receiver.is_none() => header_receiver = stored,
            _ => {}
        }
    }

    let Some(main_account) = main_account else {
        return Err(AnalyzerError::MissingFileAccount {
            path: source.to_path_buf(),
        });
    };

    for doc in &mut documents {
        doc.file_account = main_account.clone();
        doc.source_file = source_file.clone();
    }

    Ok(ParsedFile {
        main_account,
        inn,
        declared_encoding,
        payer_name: header_payer,
        receiver_name: header_receiver,
        source_file,
        documents,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn parse(text: &str) -> Result<ParsedFile> {
        parse_text(text, &PathBuf::from("statement.txt"))
    }

    const SAMPLE: &str = "1CClientBankExchange\n\
ВерсияФормата=1.02\n\
Кодировка=Windows\n\
РасчСчет=40702810000000012345\n\
ИНН=7701234567\n\
СекцияДокумент=Платежное поручение\n\
Номер=101\n\
Дата=15.03.2024\n\
ДатаСписано=15.03.2024\n\
Сумма=1500,50\n\
ПлательщикСчет=40702810000000012345\n\
Плательщик=ООО РОМАШКА\n\
ПлательщикИНН=7701234567\n\
ПолучательСчет=40817810000000098765\n\
Получатель1=Иванов Иван Иванович\n\
НазначениеПлатежа=Оплата по договору 7\n\
КонецДокумента\n\
КонецФайла\n";

    #[test]
    fn test_parses_header_and_documents() {
        let file = parse(SAMPLE).unwrap();
        assert_eq!(file.main_account, "40702810000000012345");
        assert_eq!(file.inn.as_deref(), Some("7701234567"));
        assert_eq!(file.declared_encoding.as_deref(), Some("Windows"));
        assert_eq!(file.documents.len(), 1);

        let doc = &file.documents[0];
        assert_eq!(doc.document_type, "Платежное поручение");
        assert_eq!(doc.file_account, "40702810000000012345");
        assert_eq!(doc.source_file, "statement.txt");
        assert_eq!(doc.amount.as_deref(), Some("1500,50"));
        assert_eq!(doc.payer_name.as_deref(), Some("ООО РОМАШКА"));
        // `Получатель1` fills in when the unsuffixed key is absent
        assert_eq!(doc.receiver_name.as_deref(), Some("Иванов Иван Иванович"));
        assert_eq!(doc.purpose.as_deref(), Some("Оплата по договору 7"));
    }

    #[test]
    fn test_unsuffixed_party_name_wins() {
        let text = "1CClientBankExchange\n\
РасчСчет=111\n\
СекцияДокумент=Платежное поручение\n\
Плательщик1=Вторичное имя\n\
Плательщик=Основное имя\n\
КонецДокумента\n";
        let file = parse(text).unwrap();
        assert_eq!(
            file.documents[0].payer_name.as_deref(),
            Some("Основное имя")
        );
    }

    #[test]
    fn test_first_header_account_wins() {
        let text = "1CClientBankExchange\n\
РасчСчет=111\n\
РасчСчет=222\n";
        let file = parse(text).unwrap();
        assert_eq!(file.main_account, "111");
    }

    #[test]
    fn test_empty_values_become_none() {
        let text = "1CClientBankExchange\n\
РасчСчет=111\n\
СекцияДокумент=Платежное поручение\n\
Сумма=\n\
ПолучательИНН=\n\
КонецДокумента\n";
        let file = parse(text).unwrap();
        assert!(file.documents[0].amount.is_none());
        assert!(file.documents[0].receiver_inn.is_none());
    }

    #[test]
    fn test_missing_main_account_is_an_error() {
        let text = "1CClientBankExchange\nВерсияФормата=1.02\n";
        match parse(text) {
            Err(AnalyzerError::MissingFileAccount { path }) => {
                assert_eq!(path, PathBuf::from("statement.txt"));
            }
            other => panic!("expected MissingFileAccount, got {other:?}"),
        }
    }

    #[test]
    fn test_stops_at_end_of_file_marker() {
        let text = "1CClientBankExchange\n\
РасчСчет=111\n\
КонецФайла\n\
СекцияДокумент=Платежное поручение\n\
КонецДокумента\n";
        let file = parse(text).unwrap();
        assert!(file.documents.is_empty());
    }

    #[test]
    fn test_cp1251_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.txt");
        let (encoded, _, _) = WINDOWS_1251.encode(SAMPLE);
        fs::write(&path, &encoded).unwrap();

        let file = parse_file(&path).unwrap();
        assert_eq!(file.documents[0].payer_name.as_deref(), Some("ООО РОМАШКА"));
        assert_eq!(file.source_file, "export.txt");
    }
}
