//! HTML report rendering.
//!
//! Both reports are single self-contained files meant to be opened straight
//! from disk. The annual report embeds its data as JSON and renders
//! client-side, so the drill-down stays interactive without a server; the
//! comparison matrix is small enough to render row by row here. The static
//! shells live in `src/templates/` and get their placeholders substituted.

use crate::aggregate::{CounterpartyGroup, IdentityResolver, Operation, ResolvedIdentity};
use crate::classify::Direction;
use crate::error::Result;
use crate::legal_form::LegalForm;
use crate::money::Money;
use crate::normalize::NAME_PLACEHOLDER;
use crate::organizations::OrganizationIdentity;
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

pub const ANNUAL_REPORT_FILENAME: &str = "counterparty_annual_payments.html";
pub const COMPARISON_REPORT_FILENAME: &str = "counterparty_organization_comparison.html";

const ANNUAL_TEMPLATE: &str = include_str!("templates/annual.html");
const COMPARISON_TEMPLATE: &str = include_str!("templates/comparison.html");

/// Raw spellings shown in a tooltip before truncation kicks in.
const MAX_RAW_NAMES_SHOWN: usize = 3;

#[derive(Debug, Serialize)]
struct AnnualEntry {
    id: String,
    name_normalized: String,
    display_name: Option<String>,
    legal_form: LegalForm,
    inn: String,
    account: String,
    accounts: String,
    raw_names: String,
    total_income: Money,
    total_expense: Money,
    years_details: Vec<YearEntry>,
}

#[derive(Debug, Serialize)]
struct YearEntry {
    year: i32,
    year_income: Money,
    year_expense: Money,
    orgs: Vec<OrgYearEntry>,
    operations: Vec<OperationEntry>,
}

#[derive(Debug, Serialize)]
struct OrgYearEntry {
    name: String,
    income: Money,
    expense: Money,
}

#[derive(Debug, Serialize)]
struct OperationEntry {
    date: NaiveDate,
    #[serde(rename = "type")]
    direction: Direction,
    amount: Money,
    purpose: String,
    doc_number: String,
    account: String,
    org: String,
}

/// Entries sort by name with placeholder identities last, ties broken by
/// tax ID; both reports share the ordering.
type ReportOrder = (bool, String, String);

fn report_order(identity: &ResolvedIdentity, group: &CounterpartyGroup) -> ReportOrder {
    (
        identity.normalized_name == NAME_PLACEHOLDER,
        identity.normalized_name.to_lowercase(),
        group.inn.clone(),
    )
}

/// Renders the annual payments report.
///
/// An empty group map still yields a complete document with an empty data
/// set; the page itself reports that there is nothing to show.
pub fn render_annual_report(
    groups: &BTreeMap<String, CounterpartyGroup>,
    resolver: &mut IdentityResolver,
    organizations: &BTreeMap<String, OrganizationIdentity>,
) -> Result<String> {
    let mut ordered: Vec<(ReportOrder, AnnualEntry)> = groups
        .values()
        .map(|group| {
            let identity = resolver.resolve(group);
            (report_order(&identity, group), annual_entry(group, &identity))
        })
        .collect();
    ordered.sort_by(|a, b| a.0.cmp(&b.0));
    let entries: Vec<AnnualEntry> = ordered.into_iter().map(|(_, entry)| entry).collect();

    // "</" must not appear inside an inline <script> block.
    let json = serde_json::to_string(&entries)?.replace("</", "<\\/");

    Ok(ANNUAL_TEMPLATE
        .replace("{{generation_time}}", &escape_html(&generation_time()))
        .replace("{{org_names}}", &escape_html(&org_names_line(organizations)))
        .replace("{{report_data_json}}", &json))
}

fn annual_entry(group: &CounterpartyGroup, identity: &ResolvedIdentity) -> AnnualEntry {
    let mut years_details = Vec::new();
    for (year, activity) in &group.years {
        if activity.totals.is_zero() {
            continue;
        }
        let orgs = activity
            .by_org
            .iter()
            .filter(|(_, totals)| !totals.is_zero())
            .map(|(name, totals)| OrgYearEntry {
                name: name.clone(),
                income: totals.income,
                expense: totals.expense,
            })
            .collect();

        // Operations regrouped by organization for the drill-down table;
        // the stable sort keeps classification order within each one.
        let mut by_org: Vec<&Operation> = activity.operations.iter().collect();
        by_org.sort_by(|a, b| a.our_org.cmp(&b.our_org));
        let operations = by_org
            .into_iter()
            .map(|op| OperationEntry {
                date: op.date,
                direction: op.direction,
                amount: op.amount,
                purpose: op.purpose.clone(),
                doc_number: op.document_number.clone(),
                account: op.our_account.clone(),
                org: op.our_org.clone(),
            })
            .collect();

        years_details.push(YearEntry {
            year: *year,
            year_income: activity.totals.income,
            year_expense: activity.totals.expense,
            orgs,
            operations,
        });
    }

    AnnualEntry {
        id: group.id.clone(),
        name_normalized: identity.normalized_name.clone(),
        display_name: identity.display_name.clone(),
        legal_form: identity.legal_form,
        inn: group.inn.clone(),
        account: group.first_account.clone(),
        accounts: join_comma(&group.accounts),
        raw_names: raw_names_summary(&group.names),
        total_income: group.totals.income,
        total_expense: group.totals.expense,
        years_details,
    }
}

/// Renders the counterparty-by-organization matrix report.
pub fn render_comparison_report(
    groups: &BTreeMap<String, CounterpartyGroup>,
    resolver: &mut IdentityResolver,
    organizations: &BTreeMap<String, OrganizationIdentity>,
) -> String {
    let org_names: Vec<String> = organizations
        .values()
        .map(|org| org.normalized_name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let headers: String = org_names
        .iter()
        .map(|name| format!("<th>{}</th>", escape_html(name)))
        .collect();

    let mut ordered: Vec<(ReportOrder, String)> = groups
        .values()
        .map(|group| {
            let identity = resolver.resolve(group);
            (
                report_order(&identity, group),
                comparison_row(group, &identity, &org_names),
            )
        })
        .collect();
    ordered.sort_by(|a, b| a.0.cmp(&b.0));

    let rows = if ordered.is_empty() {
        format!(
            "<tr><td class=\"empty\" colspan=\"{}\">Нет данных для отображения</td></tr>",
            org_names.len() + 3
        )
    } else {
        ordered.into_iter().map(|(_, row)| row).collect()
    };

    COMPARISON_TEMPLATE
        .replace("{{generation_time}}", &escape_html(&generation_time()))
        .replace("{{org_headers}}", &headers)
        .replace("{{rows}}", &rows)
}

fn comparison_row(
    group: &CounterpartyGroup,
    identity: &ResolvedIdentity,
    org_names: &[String],
) -> String {
    let shown_name = identity.display_name.as_deref().unwrap_or(NAME_PLACEHOLDER);
    let filter_key = format!(
        "{} {} {}",
        shown_name.to_lowercase(),
        identity.normalized_name.to_lowercase(),
        group.inn
    );

    let mut row = format!(
        "<tr data-filter=\"{}\"><td class=\"name\" title=\"{}\">{}</td><td>{}</td>\
         <td><span class=\"badge\">{}</span></td>",
        escape_html(&filter_key),
        escape_html(&raw_names_summary(&group.names)),
        escape_html(shown_name),
        escape_html(&group.inn),
        escape_html(identity.legal_form.label()),
    );
    for org in org_names {
        match group.interactions.get(org) {
            Some(cell) if cell.income_count > 0 || cell.expense_count > 0 => {
                let mut parts = Vec::new();
                if cell.income_count > 0 {
                    parts.push(format!(
                        "<span class=\"in\">+{} ({})</span>",
                        format_currency(cell.income),
                        cell.income_count
                    ));
                }
                if cell.expense_count > 0 {
                    parts.push(format!(
                        "<span class=\"out\">-{} ({})</span>",
                        format_currency(cell.expense),
                        cell.expense_count
                    ));
                }
                row.push_str(&format!("<td>{}</td>", parts.join("<br>")));
            }
            _ => row.push_str("<td class=\"empty\">&mdash;</td>"),
        }
    }
    row.push_str("</tr>\n");
    row
}

/// Tooltip text: all raw spellings in alphabetical order, truncated after
/// [`MAX_RAW_NAMES_SHOWN`].
fn raw_names_summary(names: &BTreeMap<String, usize>) -> String {
    let all: Vec<&str> = names.keys().map(String::as_str).collect();
    if all.len() > MAX_RAW_NAMES_SHOWN {
        format!(
            "{} | ...и еще {}",
            all[..MAX_RAW_NAMES_SHOWN].join(" | "),
            all.len() - MAX_RAW_NAMES_SHOWN
        )
    } else {
        all.join(" | ")
    }
}

fn org_names_line(organizations: &BTreeMap<String, OrganizationIdentity>) -> String {
    let names: BTreeSet<&str> = organizations
        .values()
        .map(|org| org.normalized_name.as_str())
        .collect();
    names.into_iter().collect::<Vec<_>>().join(", ")
}

fn join_comma(values: &BTreeSet<String>) -> String {
    values
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn generation_time() -> String {
    Local::now().format("%d.%m.%Y %H:%M:%S").to_string()
}

/// "1234567.80" -> "1 234 567,80" with non-breaking thousands separators,
/// the Russian currency convention.
fn format_currency(amount: Money) -> String {
    let text = amount.to_string();
    let (sign, unsigned) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.as_str()),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, "00"));
    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('\u{a0}');
        }
        grouped.push(*digit);
    }
    format!("{sign}{grouped},{frac_part}")
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::group_by_counterparty;
    use crate::classify::ClassifiedTransaction;
    use chrono::Datelike;

    fn tx(id: &str, raw_name: &str, purpose: &str, org: &str) -> ClassifiedTransaction {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        ClassifiedTransaction {
            our_org_normalized: org.to_string(),
            our_org_raw: format!("ООО {org}"),
            our_account: "40702810000000012345".to_string(),
            direction: Direction::Income,
            counterparty_id: id.to_string(),
            counterparty_raw_name: raw_name.to_string(),
            counterparty_normalized_name: raw_name.to_string(),
            counterparty_display_hint: None,
            counterparty_legal_form: LegalForm::Other,
            counterparty_inn: "7701234567".to_string(),
            counterparty_account: "333".to_string(),
            date,
            year: date.year(),
            amount: "1500.50".parse().unwrap(),
            document_number: "101".to_string(),
            purpose: purpose.to_string(),
        }
    }

    fn orgs() -> BTreeMap<String, OrganizationIdentity> {
        let mut map = BTreeMap::new();
        map.insert(
            "40702810000000012345".to_string(),
            OrganizationIdentity {
                raw_name: "ООО АЛЬФА".to_string(),
                normalized_name: "АЛЬФА".to_string(),
                legal_form: LegalForm::Llc,
                inn: "7700000000".to_string(),
            },
        );
        map
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("ООО <Ромашка> & \"Ко\""),
            "ООО &lt;Ромашка&gt; &amp; &quot;Ко&quot;"
        );
        assert_eq!(escape_html("без спецсимволов"), "без спецсимволов");
    }

    #[test]
    fn test_format_currency_grouping() {
        let fmt = |s: &str| format_currency(s.parse().unwrap());
        assert_eq!(fmt("999.00"), "999,00");
        assert_eq!(fmt("1500.50"), "1\u{a0}500,50");
        assert_eq!(fmt("1234567.89"), "1\u{a0}234\u{a0}567,89");
    }

    #[test]
    fn test_raw_names_summary_truncates() {
        let mut names = BTreeMap::new();
        for name in ["А", "Б", "В", "Г", "Д"] {
            names.insert(name.to_string(), 1);
        }
        assert_eq!(raw_names_summary(&names), "А | Б | В | ...и еще 2");

        let mut few = BTreeMap::new();
        few.insert("А".to_string(), 1);
        few.insert("Б".to_string(), 1);
        assert_eq!(raw_names_summary(&few), "А | Б");
    }

    #[test]
    fn test_annual_report_renders_entries() {
        let groups = group_by_counterparty(&[tx("INN:77", "ООО Ромашка", "оплата", "АЛЬФА")]);
        let mut resolver = IdentityResolver::new();
        let html = render_annual_report(&groups, &mut resolver, &orgs()).unwrap();

        assert!(html.contains("РОМАШКА"));
        assert!(html.contains("\"total_income\":\"1500.50\""));
        assert!(!html.contains("{{"));
    }

    #[test]
    fn test_annual_report_escapes_script_closers_in_data() {
        let groups = group_by_counterparty(&[tx(
            "INN:77",
            "ООО Ромашка",
            "оплата </script> взлом",
            "АЛЬФА",
        )]);
        let mut resolver = IdentityResolver::new();
        let html = render_annual_report(&groups, &mut resolver, &orgs()).unwrap();

        assert!(html.contains("<\\/script>"));
    }

    #[test]
    fn test_annual_report_empty_is_still_valid() {
        let groups = BTreeMap::new();
        let mut resolver = IdentityResolver::new();
        let html = render_annual_report(&groups, &mut resolver, &orgs()).unwrap();

        assert!(html.contains("REPORT_DATA = []"));
        assert!(html.contains("</html>"));
    }

    #[test]
    fn test_placeholder_entries_sort_last() {
        let named = tx("INN:77", "ООО Ромашка", "оплата", "АЛЬФА");
        let mut nameless = tx("NAME_ACC:БЕЗ_ИМЕНИ|555", "?", "оплата", "АЛЬФА");
        nameless.counterparty_inn = String::new();
        // The nameless key sorts before "INN:77" in the map, the report
        // order must still push it to the end.
        let groups = group_by_counterparty(&[nameless, named]);
        let mut resolver = IdentityResolver::new();
        let html = render_annual_report(&groups, &mut resolver, &orgs()).unwrap();

        let romashka = html.find("РОМАШКА").unwrap();
        let nameless_pos = html.find("БЕЗ_ИМЕНИ").unwrap();
        assert!(romashka < nameless_pos);
    }

    #[test]
    fn test_comparison_report_matrix() {
        let groups = group_by_counterparty(&[tx("INN:77", "ООО Ромашка", "оплата", "АЛЬФА")]);
        let mut resolver = IdentityResolver::new();
        let html = render_comparison_report(&groups, &mut resolver, &orgs());

        assert!(html.contains("<th>АЛЬФА</th>"));
        assert!(html.contains("РОМАШКА"));
        assert!(html.contains("+1\u{a0}500,50 (1)"));
        assert!(!html.contains("{{"));
    }

    #[test]
    fn test_comparison_report_empty_state() {
        let groups = BTreeMap::new();
        let mut resolver = IdentityResolver::new();
        let html = render_comparison_report(&groups, &mut resolver, &orgs());

        assert!(html.contains("Нет данных для отображения"));
    }
}
