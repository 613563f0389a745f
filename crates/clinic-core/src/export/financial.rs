//! Financial report: ledger entries plus a summary block.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::{Deserialize, Serialize};

use super::escape_csv;
use crate::ledger::summarize_transactions;
use crate::models::{Direction, Money, Period, Summary, Transaction};
use crate::ClinicError;

const HEADER: &str =
    "Date,Type,Category,Subcategory,Amount,Description,Payment Method,Reference Type,Reference ID,Notes";

/// Transactions of a period with their totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialReport {
    pub period: Period,
    /// Newest first
    pub transactions: Vec<Transaction>,
    pub summary: Summary,
}

impl FinancialReport {
    pub fn new(period: Period, transactions: Vec<Transaction>) -> Result<Self, ClinicError> {
        let summary = summarize_transactions(&transactions)?;
        Ok(Self {
            period,
            transactions,
            summary,
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_csv(&self) -> String {
        let mut csv = String::new();
        csv.push_str(HEADER);
        csv.push('\n');

        for t in &self.transactions {
            let direction = match t.direction {
                Direction::Income => "Income",
                Direction::Expense => "Expense",
            };
            let _ = writeln!(
                csv,
                "{},{},{},{},{},{},{},{},{},{}",
                t.transaction_date.format("%Y-%m-%d %H:%M:%S"),
                direction,
                escape_csv(&t.category),
                escape_csv(t.subcategory.as_deref().unwrap_or("")),
                t.amount,
                escape_csv(t.description.as_deref().unwrap_or("")),
                t.payment_method.map(|m| m.as_str()).unwrap_or(""),
                t.reference.map(|r| r.kind.as_str()).unwrap_or(""),
                t.reference
                    .and_then(|r| r.id)
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
                escape_csv(t.notes.as_deref().unwrap_or("")),
            );
        }

        let s = &self.summary;
        csv.push('\n');
        csv.push_str("SUMMARY\n");
        let _ = writeln!(
            csv,
            "Report Period:,{} to {}",
            self.period.start.format("%Y-%m-%d"),
            self.period.end.format("%Y-%m-%d")
        );
        let _ = writeln!(csv, "Total Income:,{}", s.total_income);
        let _ = writeln!(csv, "Total Expenses:,{}", s.total_expense);
        let _ = writeln!(csv, "Net Profit:,{}", s.net);
        let _ = writeln!(csv, "Total Transactions:,{}", s.transaction_count);

        csv.push('\n');
        csv.push_str("INCOME BY CATEGORY\n");
        write_breakdown(&mut csv, &s.income_by_category, s.total_income);

        csv.push('\n');
        csv.push_str("EXPENSES BY CATEGORY\n");
        write_breakdown(&mut csv, &s.expense_by_category, s.total_expense);

        csv
    }
}

fn write_breakdown(csv: &mut String, by_category: &BTreeMap<String, Money>, total: Money) {
    for (category, amount) in by_category {
        let _ = writeln!(
            csv,
            "{},{},{:.1}%",
            escape_csv(category),
            amount,
            amount.percent_of(total)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::now;
    use crate::models::{DoctorId, PaymentMethod, Reference};
    use chrono::NaiveDate;

    fn entry(direction: Direction, category: &str, major: i64, day: u32) -> Transaction {
        Transaction {
            id: i64::from(day),
            doctor_id: DoctorId(1),
            direction,
            category: category.to_string(),
            subcategory: None,
            amount: Money::from_major(major),
            description: None,
            transaction_date: NaiveDate::from_ymd_opt(2024, 5, day)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
            payment_method: None,
            reference: None,
            notes: None,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn may() -> Period {
        Period::new(
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_csv_layout() {
        let mut paid = entry(Direction::Income, "Patient Payment", 100, 3);
        paid.description = Some("Payment from Doe, Jane".into());
        paid.payment_method = Some(PaymentMethod::BankTransfer);
        paid.reference = Some(Reference::visit(42));

        let report = FinancialReport::new(
            may(),
            vec![
                entry(Direction::Expense, "Rent", 30, 9),
                entry(Direction::Income, "Consultation", 50, 5),
                paid,
            ],
        )
        .unwrap();
        let csv = report.to_csv();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], HEADER);
        assert_eq!(lines[1], "2024-05-09 09:30:00,Expense,Rent,,30.00,,,,,");
        assert_eq!(
            lines[3],
            "2024-05-03 09:30:00,Income,Patient Payment,,100.00,\"Payment from Doe, Jane\",bank_transfer,visit,42,"
        );
        assert_eq!(lines[4], "");
        assert_eq!(lines[5], "SUMMARY");
        assert_eq!(lines[6], "Report Period:,2024-05-01 to 2024-05-31");
        assert!(csv.contains("Total Income:,150.00\n"));
        assert!(csv.contains("Total Expenses:,30.00\n"));
        assert!(csv.contains("Net Profit:,120.00\n"));
        assert!(csv.contains("Total Transactions:,3\n"));
        assert!(csv.contains("INCOME BY CATEGORY\nConsultation,50.00,33.3%\nPatient Payment,100.00,66.7%\n"));
        assert!(csv.contains("EXPENSES BY CATEGORY\nRent,30.00,100.0%\n"));
    }

    #[test]
    fn test_empty_report() {
        let csv = FinancialReport::new(may(), Vec::new()).unwrap().to_csv();
        assert!(csv.contains("Total Income:,0.00"));
        assert!(csv.ends_with("EXPENSES BY CATEGORY\n"));
    }

    #[test]
    fn test_json_carries_summary() {
        let report = FinancialReport::new(may(), vec![entry(Direction::Income, "Procedure", 20, 1)]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["summary"]["transaction_count"], 1);
        assert_eq!(value["transactions"].as_array().unwrap().len(), 1);
    }
}
