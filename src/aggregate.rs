//! Aggregation of classified transactions into per-counterparty groups.
//!
//! One pass produces everything both reports need: running totals, per-year
//! activity with the underlying operations, and per-organization interaction
//! sums. All maps are ordered, so a rerun over the same statements yields
//! identical report content.

use crate::classify::{ClassifiedTransaction, Direction};
use crate::legal_form::LegalForm;
use crate::money::Money;
use crate::normalize::{format_display_name, normalize_and_classify, NAME_PLACEHOLDER};
use crate::organizations::rank_names;
use chrono::NaiveDate;
use log::{debug, info};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Income and expense running totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DirectionTotals {
    pub income: Money,
    pub expense: Money,
}

impl DirectionTotals {
    fn add(&mut self, direction: Direction, amount: Money) {
        match direction {
            Direction::Income => self.income += amount,
            Direction::Expense => self.expense += amount,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.income.is_zero() && self.expense.is_zero()
    }
}

/// Sums and counts of one counterparty's dealings with one organization.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct OrgInteraction {
    pub income: Money,
    pub income_count: usize,
    pub expense: Money,
    pub expense_count: usize,
}

/// A single operation as shown in the annual report drill-down.
#[derive(Debug, Clone, Serialize)]
pub struct Operation {
    pub date: NaiveDate,
    pub direction: Direction,
    pub amount: Money,
    pub purpose: String,
    pub document_number: String,
    pub our_account: String,
    pub our_org: String,
}

/// One counterparty's activity within a calendar year.
#[derive(Debug, Clone, Default)]
pub struct YearActivity {
    pub totals: DirectionTotals,
    pub by_org: BTreeMap<String, DirectionTotals>,
    /// Operations in classification order; the annual report regroups them
    /// by organization before rendering.
    pub operations: Vec<Operation>,
}

/// Everything observed about one counterparty across all statements.
#[derive(Debug, Clone)]
pub struct CounterpartyGroup {
    pub id: String,
    /// Raw spellings with occurrence counts.
    pub names: BTreeMap<String, usize>,
    pub accounts: BTreeSet<String>,
    /// First non-empty account seen, shown as the primary one.
    pub first_account: String,
    /// First non-empty tax ID seen.
    pub inn: String,
    pub totals: DirectionTotals,
    pub years: BTreeMap<i32, YearActivity>,
    pub interactions: BTreeMap<String, OrgInteraction>,
}

impl CounterpartyGroup {
    fn new(id: String) -> Self {
        CounterpartyGroup {
            id,
            names: BTreeMap::new(),
            accounts: BTreeSet::new(),
            first_account: String::new(),
            inn: String::new(),
            totals: DirectionTotals::default(),
            years: BTreeMap::new(),
            interactions: BTreeMap::new(),
        }
    }

    fn absorb(&mut self, tx: &ClassifiedTransaction) {
        *self
            .names
            .entry(tx.counterparty_raw_name.clone())
            .or_insert(0) += 1;
        if !tx.counterparty_account.is_empty() {
            self.accounts.insert(tx.counterparty_account.clone());
            if self.first_account.is_empty() {
                self.first_account = tx.counterparty_account.clone();
            }
        }
        if self.inn.is_empty() && !tx.counterparty_inn.is_empty() {
            self.inn = tx.counterparty_inn.clone();
        }
        self.totals.add(tx.direction, tx.amount);

        let year = self.years.entry(tx.year).or_default();
        year.totals.add(tx.direction, tx.amount);
        year.by_org
            .entry(tx.our_org_normalized.clone())
            .or_default()
            .add(tx.direction, tx.amount);
        year.operations.push(Operation {
            date: tx.date,
            direction: tx.direction,
            amount: tx.amount,
            purpose: tx.purpose.clone(),
            document_number: tx.document_number.clone(),
            our_account: tx.our_account.clone(),
            our_org: tx.our_org_normalized.clone(),
        });

        let interaction = self
            .interactions
            .entry(tx.our_org_normalized.clone())
            .or_default();
        match tx.direction {
            Direction::Income => {
                interaction.income += tx.amount;
                interaction.income_count += 1;
            }
            Direction::Expense => {
                interaction.expense += tx.amount;
                interaction.expense_count += 1;
            }
        }
    }
}

/// Groups transactions by counterparty identity key.
pub fn group_by_counterparty(
    transactions: &[ClassifiedTransaction],
) -> BTreeMap<String, CounterpartyGroup> {
    let mut groups: BTreeMap<String, CounterpartyGroup> = BTreeMap::new();
    for tx in transactions {
        groups
            .entry(tx.counterparty_id.clone())
            .or_insert_with(|| CounterpartyGroup::new(tx.counterparty_id.clone()))
            .absorb(tx);
    }
    info!(
        "grouped {} transactions into {} counterparties",
        transactions.len(),
        groups.len()
    );
    groups
}

/// Final name, form and display string for a counterparty group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub normalized_name: String,
    pub legal_form: LegalForm,
    /// Name to show in reports; `None` when even the raw names were unusable.
    pub display_name: Option<String>,
}

/// Memoizes identity resolution per (tax ID, raw-name-set) pair; distinct
/// counterparty keys often carry the same spellings.
#[derive(Debug, Default)]
pub struct IdentityResolver {
    cache: HashMap<(String, Vec<String>), ResolvedIdentity>,
}

impl IdentityResolver {
    pub fn new() -> Self {
        IdentityResolver::default()
    }

    pub fn resolve(&mut self, group: &CounterpartyGroup) -> ResolvedIdentity {
        let key = (
            group.inn.clone(),
            group.names.keys().cloned().collect::<Vec<_>>(),
        );
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }
        let resolved = resolve_identity(&group.inn, &group.names);
        self.cache.insert(key, resolved.clone());
        resolved
    }
}

fn resolve_identity(inn: &str, names: &BTreeMap<String, usize>) -> ResolvedIdentity {
    let inn_opt = (!inn.is_empty()).then_some(inn);
    let ranked = rank_names(names);
    let Some(best) = ranked.first().copied() else {
        return ResolvedIdentity {
            normalized_name: NAME_PLACEHOLDER.to_string(),
            legal_form: LegalForm::Other,
            display_name: None,
        };
    };

    let normalized = normalize_and_classify(best, inn_opt);
    if normalized.core_name != NAME_PLACEHOLDER {
        return finish(normalized.core_name, normalized.legal_form);
    }

    // The top spelling dissolved into junk; any other observed spelling
    // that survives normalization beats falling back to raw text.
    for candidate in ranked.iter().skip(1) {
        let retried = normalize_and_classify(candidate, inn_opt);
        if retried.core_name != NAME_PLACEHOLDER {
            debug!("identity fallback: {best:?} unusable, took {candidate:?}");
            return finish(retried.core_name, retried.legal_form);
        }
    }
    debug!("identity fallback: keeping raw spelling {best:?}");
    finish(best.to_string(), LegalForm::Other)
}

fn finish(name: String, form: LegalForm) -> ResolvedIdentity {
    let display_name = if form.is_person() {
        format_display_name(&name)
    } else {
        name.clone()
    };
    ResolvedIdentity {
        normalized_name: name,
        legal_form: form,
        display_name: Some(display_name),
    }
}
