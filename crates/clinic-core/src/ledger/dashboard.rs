//! Landing-page overview.

use chrono::{Duration, NaiveDateTime};
use tracing::debug;

use super::Ledger;
use crate::models::{Dashboard, Direction, DoctorId, Period, YearMonth};
use crate::ClinicError;

/// Window for counting a patient as active.
pub const ACTIVE_PATIENT_DAYS: i64 = 180;
const UPCOMING_LIMIT: usize = 5;

impl<'a> Ledger<'a> {
    /// Patient counts and this month's activity as of `now`.
    pub fn dashboard(&self, doctor: DoctorId, now: NaiveDateTime) -> Result<Dashboard, ClinicError> {
        let today = Period::day(now.date());
        let month = Period::month(YearMonth::of(now.date()));
        let (month_from, month_to) = (month.start_datetime(), month.end_datetime_exclusive());

        let (total_patients, completed_patients) = self.db.count_patients(doctor)?;
        let month_income =
            self.db
                .sum_transactions(doctor, Direction::Income, None, month_from, month_to)?;
        let month_expense =
            self.db
                .sum_transactions(doctor, Direction::Expense, None, month_from, month_to)?;

        let dashboard = Dashboard {
            total_patients,
            completed_patients,
            new_patients_this_month: self.db.count_new_patients(doctor, month_from, month_to)?,
            active_patients: self
                .db
                .count_active_patients(doctor, now - Duration::days(ACTIVE_PATIENT_DAYS))?,
            visits_this_month: self.db.count_visits_between(doctor, month_from, month_to)?,
            appointments_today: self.db.count_appointments_between(
                doctor,
                today.start_datetime(),
                today.end_datetime_exclusive(),
            )?,
            appointments_this_month: self
                .db
                .count_appointments_between(doctor, month_from, month_to)?,
            month_income,
            month_expense,
            month_net: month_income - month_expense,
            outstanding_balance: self.db.outstanding_balance(doctor)?,
            upcoming_appointments: self.db.upcoming_appointments(doctor, now, UPCOMING_LIMIT)?,
        };
        debug!(doctor = %doctor, patients = total_patients, "Built dashboard");
        Ok(dashboard)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{on, setup};
    use super::*;
    use crate::db::{self, AppointmentRow};
    use crate::models::{AppointmentStatus, Money, NewPatient, NewTransaction, NewVisit, Priority};

    #[test]
    fn test_dashboard_counts() {
        let (db, doctor) = setup();
        let ledger = Ledger::new(&db);
        let now = on(2024, 5, 15);

        for (name, due) in [("Ann", 100), ("Ben", 0)] {
            let id = db.take_next_patient_local_id(doctor).unwrap();
            let mut input = NewPatient::new(name, "1");
            input.amount_due = Money::from_major(due);
            db.insert_patient(doctor, id, &input, db::now()).unwrap();
        }
        let mut visit = NewVisit::on(on(2024, 5, 2));
        visit.amount_due = Money::from_major(50);
        visit.amount_paid = Money::from_major(20);
        db.insert_visit(doctor, 1, &visit, db::now()).unwrap();
        db.refresh_first_visit(doctor, 1).unwrap();

        let row = AppointmentRow {
            scheduled_at: on(2024, 5, 15),
            appointment_type: "checkup",
            notes: None,
            duration_minutes: 30,
            priority: Priority::Medium,
            status: AppointmentStatus::Scheduled,
        };
        db.insert_appointment(doctor, 2, &row, db::now()).unwrap();

        ledger
            .record_transaction(
                doctor,
                &NewTransaction::new(Direction::Income, "Consultation", Money::from_major(80), on(2024, 5, 3)),
            )
            .unwrap();
        ledger
            .record_transaction(
                doctor,
                &NewTransaction::new(Direction::Expense, "Rent", Money::from_major(30), on(2024, 4, 30)),
            )
            .unwrap();

        let dashboard = ledger.dashboard(doctor, now).unwrap();
        assert_eq!(dashboard.total_patients, 2);
        assert_eq!(dashboard.new_patients_this_month, 1);
        assert_eq!(dashboard.active_patients, 2);
        assert_eq!(dashboard.visits_this_month, 1);
        assert_eq!(dashboard.appointments_today, 1);
        assert_eq!(dashboard.month_income, Money::from_major(80));
        assert_eq!(dashboard.month_expense, Money::ZERO);
        assert_eq!(dashboard.outstanding_balance, Money::from_major(130));
        assert_eq!(dashboard.upcoming_appointments.len(), 1);
    }
}
