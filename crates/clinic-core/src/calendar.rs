//! Appointment calendar.
//!
//! Overlapping appointments are accepted; nothing here checks for
//! conflicts. Every write recomputes the patient's `next_visit`.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use tracing::{debug, info};

use crate::db::{self, AppointmentRow, Database};
use crate::models::{
    Appointment, AppointmentStatus, AppointmentUpdate, CalendarEvent, DoctorId, EventKind,
    NewAppointment, PatientAppointments, Period, DEFAULT_DURATION_MINUTES,
};
use crate::validation;
use crate::ClinicError;

/// Longest accepted appointment, one day.
pub const MAX_DURATION_MINUTES: u32 = 24 * 60;

fn not_found(appointment_id: i64) -> ClinicError {
    ClinicError::NotFound(format!("appointment {}", appointment_id))
}

fn duration(minutes: u32) -> Result<u32, ClinicError> {
    if !(1..=MAX_DURATION_MINUTES).contains(&minutes) {
        return Err(ClinicError::validation(
            "duration_minutes",
            format!("must be between 1 and {}", MAX_DURATION_MINUTES),
        ));
    }
    Ok(minutes)
}

/// Appointment operations, always scoped to one doctor.
pub struct Calendar<'a> {
    db: &'a Database,
}

impl<'a> Calendar<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn schedule_appointment(
        &self,
        doctor: DoctorId,
        patient_local_id: i64,
        input: &NewAppointment,
    ) -> Result<Appointment, ClinicError> {
        let appointment_type = validation::required("appointment_type", &input.appointment_type)?;
        let notes = validation::optional(input.notes.as_deref());
        let row = AppointmentRow {
            scheduled_at: input.scheduled_at,
            appointment_type: &appointment_type,
            notes: notes.as_deref(),
            duration_minutes: duration(input.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES))?,
            priority: input.priority.unwrap_or_default(),
            status: AppointmentStatus::Scheduled,
        };

        let tx = self.db.begin()?;
        if !self.db.patient_exists(doctor, patient_local_id)? {
            return Err(ClinicError::NotFound(format!("patient {}", patient_local_id)));
        }
        let appointment = self.db.insert_appointment(doctor, patient_local_id, &row, db::now())?;
        self.db.refresh_next_visit(doctor, patient_local_id, db::now())?;
        tx.commit()?;

        info!(
            doctor = %doctor,
            appointment_id = appointment.id,
            patient = patient_local_id,
            at = %appointment.scheduled_at,
            "Scheduled appointment"
        );
        Ok(appointment)
    }

    /// Appointments inside the period, by time then id.
    pub fn list_appointments(&self, doctor: DoctorId, period: &Period) -> Result<Vec<Appointment>, ClinicError> {
        Ok(self.db.list_appointments_between(
            doctor,
            period.start_datetime(),
            period.end_datetime_exclusive(),
        )?)
    }

    pub fn get_appointment(&self, doctor: DoctorId, appointment_id: i64) -> Result<Appointment, ClinicError> {
        self.db
            .get_appointment(doctor, appointment_id)?
            .ok_or_else(|| not_found(appointment_id))
    }

    /// Apply the fields present in `update`; a blank note clears it.
    pub fn update_appointment(
        &self,
        doctor: DoctorId,
        appointment_id: i64,
        update: &AppointmentUpdate,
    ) -> Result<Appointment, ClinicError> {
        let tx = self.db.begin()?;
        let existing = self.get_appointment(doctor, appointment_id)?;

        let appointment_type = match &update.appointment_type {
            Some(value) => validation::required("appointment_type", value)?,
            None => existing.appointment_type.clone(),
        };
        let notes = match &update.notes {
            Some(value) => validation::optional(Some(value.as_str())),
            None => existing.notes.clone(),
        };
        let row = AppointmentRow {
            scheduled_at: update.scheduled_at.unwrap_or(existing.scheduled_at),
            appointment_type: &appointment_type,
            notes: notes.as_deref(),
            duration_minutes: duration(update.duration_minutes.unwrap_or(existing.duration_minutes))?,
            priority: update.priority.unwrap_or(existing.priority),
            status: update.status.unwrap_or(existing.status),
        };

        self.db.update_appointment_row(doctor, appointment_id, &row)?;
        self.db
            .refresh_next_visit(doctor, existing.patient_local_id, db::now())?;
        let appointment = self.get_appointment(doctor, appointment_id)?;
        tx.commit()?;

        info!(doctor = %doctor, appointment_id, status = %appointment.status, "Updated appointment");
        Ok(appointment)
    }

    pub fn delete_appointment(&self, doctor: DoctorId, appointment_id: i64) -> Result<(), ClinicError> {
        let tx = self.db.begin()?;
        let existing = self.get_appointment(doctor, appointment_id)?;
        self.db.delete_appointment_row(doctor, appointment_id)?;
        self.db
            .refresh_next_visit(doctor, existing.patient_local_id, db::now())?;
        tx.commit()?;

        info!(doctor = %doctor, appointment_id, "Deleted appointment");
        Ok(())
    }

    /// Upcoming (future, scheduled) and missed (past, scheduled or
    /// incomplete) appointments of one patient.
    pub fn patient_appointments(
        &self,
        doctor: DoctorId,
        patient_local_id: i64,
        now: NaiveDateTime,
    ) -> Result<PatientAppointments, ClinicError> {
        if !self.db.patient_exists(doctor, patient_local_id)? {
            return Err(ClinicError::NotFound(format!("patient {}", patient_local_id)));
        }

        let (upcoming, past): (Vec<_>, Vec<_>) = self
            .db
            .list_patient_appointments(doctor, patient_local_id)?
            .into_iter()
            .partition(|a| a.scheduled_at >= now);

        let upcoming = upcoming
            .into_iter()
            .filter(|a| a.status == AppointmentStatus::Scheduled)
            .collect();
        let mut missed: Vec<_> = past
            .into_iter()
            .filter(|a| {
                matches!(
                    a.status,
                    AppointmentStatus::Scheduled | AppointmentStatus::Incomplete
                )
            })
            .collect();
        missed.reverse();

        Ok(PatientAppointments { upcoming, missed })
    }

    /// Visits and scheduled appointments in the period as one feed.
    pub fn calendar_events(&self, doctor: DoctorId, period: &Period) -> Result<Vec<CalendarEvent>, ClinicError> {
        let from = period.start_datetime();
        let to = period.end_datetime_exclusive();

        let names: HashMap<i64, String> = self
            .db
            .list_patients(doctor)?
            .into_iter()
            .map(|p| (p.local_id, p.name))
            .collect();
        let name_of = |local_id: i64| {
            names
                .get(&local_id)
                .cloned()
                .unwrap_or_else(|| format!("Patient #{}", local_id))
        };

        let mut events: Vec<CalendarEvent> = self
            .db
            .list_visits_between(doctor, from, to)?
            .into_iter()
            .map(|v| CalendarEvent {
                kind: EventKind::Visit,
                id: v.id,
                patient_local_id: v.patient_local_id,
                title: format!("Visit: {}", name_of(v.patient_local_id)),
                start: v.visit_date,
                duration_minutes: None,
                detail: v.diagnosis,
            })
            .collect();

        events.extend(
            self.db
                .list_appointments_between(doctor, from, to)?
                .into_iter()
                .filter(|a| a.status == AppointmentStatus::Scheduled)
                .map(|a| CalendarEvent {
                    kind: EventKind::Appointment,
                    id: a.id,
                    patient_local_id: a.patient_local_id,
                    title: format!("{}: {}", a.appointment_type, name_of(a.patient_local_id)),
                    start: a.scheduled_at,
                    duration_minutes: Some(a.duration_minutes),
                    detail: a.notes,
                }),
        );

        events.sort_by_key(|e| (e.start, e.kind == EventKind::Appointment, e.id));
        debug!(doctor = %doctor, events = events.len(), "Built calendar feed");
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewPatient, NewVisit};
    use chrono::NaiveDate;

    fn setup() -> (Database, DoctorId, i64) {
        let db = Database::open_in_memory().unwrap();
        let doctor = db.insert_doctor("house", "h", "", None, db::now()).unwrap().id;
        let local_id = db.take_next_patient_local_id(doctor).unwrap();
        db.insert_patient(doctor, local_id, &NewPatient::new("Max", "555"), db::now())
            .unwrap();
        (db, doctor, local_id)
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    #[test]
    fn test_schedule_sets_next_visit() {
        let (db, doctor, patient) = setup();
        let calendar = Calendar::new(&db);

        let later = calendar
            .schedule_appointment(doctor, patient, &NewAppointment::new(at(2099, 5, 2, 9), "checkup"))
            .unwrap();
        let sooner = calendar
            .schedule_appointment(doctor, patient, &NewAppointment::new(at(2099, 5, 1, 9), "xray"))
            .unwrap();
        assert_eq!(later.duration_minutes, DEFAULT_DURATION_MINUTES);

        let p = db.get_patient(doctor, patient).unwrap().unwrap();
        assert_eq!(p.next_visit, Some(sooner.scheduled_at));

        calendar.delete_appointment(doctor, sooner.id).unwrap();
        let p = db.get_patient(doctor, patient).unwrap().unwrap();
        assert_eq!(p.next_visit, Some(later.scheduled_at));

        let mut update = AppointmentUpdate::default();
        update.status = Some(AppointmentStatus::Cancelled);
        calendar.update_appointment(doctor, later.id, &update).unwrap();
        let p = db.get_patient(doctor, patient).unwrap().unwrap();
        assert_eq!(p.next_visit, None);
    }

    #[test]
    fn test_overlapping_appointments_are_accepted() {
        let (db, doctor, patient) = setup();
        let calendar = Calendar::new(&db);
        let slot = at(2099, 1, 1, 10);

        calendar
            .schedule_appointment(doctor, patient, &NewAppointment::new(slot, "a"))
            .unwrap();
        calendar
            .schedule_appointment(doctor, patient, &NewAppointment::new(slot, "b"))
            .unwrap();

        let listed = calendar
            .list_appointments(doctor, &Period::day(slot.date()))
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].id < listed[1].id);
    }

    #[test]
    fn test_validation() {
        let (db, doctor, patient) = setup();
        let calendar = Calendar::new(&db);

        let err = calendar
            .schedule_appointment(doctor, patient, &NewAppointment::new(at(2099, 1, 1, 9), " "))
            .unwrap_err();
        assert!(matches!(err, ClinicError::Validation { ref field, .. } if field == "appointment_type"));

        let mut input = NewAppointment::new(at(2099, 1, 1, 9), "checkup");
        input.duration_minutes = Some(0);
        assert!(calendar.schedule_appointment(doctor, patient, &input).is_err());

        let err = calendar
            .schedule_appointment(doctor, 42, &NewAppointment::new(at(2099, 1, 1, 9), "checkup"))
            .unwrap_err();
        assert!(matches!(err, ClinicError::NotFound(_)));
    }

    #[test]
    fn test_upcoming_and_missed() {
        let (db, doctor, patient) = setup();
        let calendar = Calendar::new(&db);

        let past = calendar
            .schedule_appointment(doctor, patient, &NewAppointment::new(at(2020, 1, 1, 9), "old"))
            .unwrap();
        let done = calendar
            .schedule_appointment(doctor, patient, &NewAppointment::new(at(2020, 2, 1, 9), "done"))
            .unwrap();
        let mut update = AppointmentUpdate::default();
        update.status = Some(AppointmentStatus::Completed);
        calendar.update_appointment(doctor, done.id, &update).unwrap();
        let future = calendar
            .schedule_appointment(doctor, patient, &NewAppointment::new(at(2099, 1, 1, 9), "new"))
            .unwrap();

        let result = calendar
            .patient_appointments(doctor, patient, at(2024, 1, 1, 0))
            .unwrap();
        assert_eq!(result.upcoming.iter().map(|a| a.id).collect::<Vec<_>>(), vec![future.id]);
        assert_eq!(result.missed.iter().map(|a| a.id).collect::<Vec<_>>(), vec![past.id]);
    }

    #[test]
    fn test_calendar_events_merge_visits_and_appointments() {
        let (db, doctor, patient) = setup();
        let calendar = Calendar::new(&db);

        db.insert_visit(doctor, patient, &NewVisit::on(at(2099, 3, 1, 11)), db::now())
            .unwrap();
        calendar
            .schedule_appointment(doctor, patient, &NewAppointment::new(at(2099, 3, 1, 9), "checkup"))
            .unwrap();
        let cancelled = calendar
            .schedule_appointment(doctor, patient, &NewAppointment::new(at(2099, 3, 1, 10), "x"))
            .unwrap();
        let mut update = AppointmentUpdate::default();
        update.status = Some(AppointmentStatus::Cancelled);
        calendar.update_appointment(doctor, cancelled.id, &update).unwrap();

        let period = Period::day(NaiveDate::from_ymd_opt(2099, 3, 1).unwrap());
        let events = calendar.calendar_events(doctor, &period).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Appointment);
        assert_eq!(events[0].title, "checkup: Max");
        assert_eq!(events[1].kind, EventKind::Visit);
    }

    #[test]
    fn test_other_doctor_cannot_touch_appointment() {
        let (db, doctor, patient) = setup();
        let other = db.insert_doctor("wilson", "h", "", None, db::now()).unwrap().id;
        let calendar = Calendar::new(&db);
        let appointment = calendar
            .schedule_appointment(doctor, patient, &NewAppointment::new(at(2099, 1, 1, 9), "c"))
            .unwrap();

        assert!(matches!(
            calendar.get_appointment(other, appointment.id),
            Err(ClinicError::NotFound(_))
        ));
        assert!(matches!(
            calendar.update_appointment(other, appointment.id, &AppointmentUpdate::default()),
            Err(ClinicError::NotFound(_))
        ));
        assert!(matches!(
            calendar.delete_appointment(other, appointment.id),
            Err(ClinicError::NotFound(_))
        ));
        assert!(matches!(
            calendar.schedule_appointment(other, patient, &NewAppointment::new(at(2099, 1, 1, 9), "c")),
            Err(ClinicError::NotFound(_))
        ));
        assert!(calendar
            .calendar_events(other, &Period::day(NaiveDate::from_ymd_opt(2099, 1, 1).unwrap()))
            .unwrap()
            .is_empty());
    }
}
