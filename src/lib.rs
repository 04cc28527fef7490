//! # Выписка (1C statement analyzer)
//!
//! Turns a directory of `1CClientBankExchange` bank statements into two
//! HTML reports: counterparty payments by year and a counterparty-by-
//! organization comparison matrix.
//!
//! ## Pipeline
//!
//! - **Parse**: Windows-1251 statement files into typed documents
//! - **Detect**: which accounts belong to our own organizations
//! - **Classify**: each document into an income/expense transaction or a
//!   tallied skip, with a stable counterparty identity
//! - **Aggregate**: one pass groups transactions per counterparty for both
//!   reports
//! - **Render**: self-contained HTML, deterministic ordering throughout
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use vypiska::aggregate::{group_by_counterparty, IdentityResolver};
//! use vypiska::classify::process_documents;
//! use vypiska::organizations::detect_organizations;
//! use vypiska::report::render_annual_report;
//! use vypiska::statement::parse_file;
//!
//! let file = parse_file(Path::new("data/statement.txt")).unwrap();
//! let organizations = detect_organizations(std::slice::from_ref(&file));
//! let classification = process_documents(&file.documents, &organizations, None);
//! let groups = group_by_counterparty(&classification.transactions);
//! let mut resolver = IdentityResolver::new();
//! let html = render_annual_report(&groups, &mut resolver, &organizations).unwrap();
//! std::fs::write("reports/annual.html", html).unwrap();
//! ```

pub mod aggregate;
pub mod classify;
pub mod debug_export;
pub mod error;
pub mod legal_form;
pub mod money;
pub mod normalize;
pub mod organizations;
pub mod report;
pub mod statement;

pub use classify::{ClassifiedTransaction, Direction};
pub use error::{AnalyzerError, Result};
pub use legal_form::LegalForm;
pub use money::Money;
pub use normalize::{normalize_and_classify, NormalizedName};
pub use statement::{Document, ParsedFile};
