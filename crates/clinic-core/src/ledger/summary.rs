//! Income/expense aggregation.

use crate::models::{Direction, Money, Summary, Transaction};
use crate::ClinicError;

/// Sum transactions by direction and category.
///
/// Fails with [`ClinicError::Internal`] if a total leaves the representable
/// range.
pub fn summarize_transactions(transactions: &[Transaction]) -> Result<Summary, ClinicError> {
    let mut summary = Summary::default();

    for transaction in transactions {
        let (total, by_category) = match transaction.direction {
            Direction::Income => (&mut summary.total_income, &mut summary.income_by_category),
            Direction::Expense => (&mut summary.total_expense, &mut summary.expense_by_category),
        };
        *total = total.checked_add(transaction.amount)?;
        let bucket = by_category
            .entry(transaction.category.clone())
            .or_insert(Money::ZERO);
        *bucket = bucket.checked_add(transaction.amount)?;
    }

    summary.net = summary.total_income.checked_sub(summary.total_expense)?;
    summary.transaction_count = transactions.len();
    Ok(summary)
}
