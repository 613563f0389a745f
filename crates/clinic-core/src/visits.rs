//! Visit log with X-ray attachments.
//!
//! Files are written before the database transaction opens and removed
//! again if it fails, so a visit row never points at a missing file. The
//! `*_staged_*` entry points take files already written by
//! [`XrayStore::store_all`], which lets callers do the disk work before
//! taking a lock on the database. Files of deleted X-rays are removed only
//! after the deleting transaction has committed.

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::db::{self, Database};
use crate::models::{
    Direction, DoctorId, Money, NewTransaction, NewVisit, PaymentMethod, Reference, Visit,
    VisitUpdate, XrayFile, PATIENT_PAYMENT_CATEGORY, PATIENT_REFUND_CATEGORY,
};
use crate::storage::{StoredFile, Upload, XrayStore};
use crate::validation;
use crate::ClinicError;

const VISIT_PAYMENT: &str = "Visit Payment";
const VISIT_PAYMENT_UPDATE: &str = "Visit Payment Update";
const VISIT_PAYMENT_REFUND: &str = "Visit Payment Refund";

fn visit_not_found(visit_id: i64) -> ClinicError {
    ClinicError::NotFound(format!("visit {}", visit_id))
}

fn xray_not_found(xray_id: i64) -> ClinicError {
    ClinicError::NotFound(format!("x-ray {}", xray_id))
}

/// Normalized visit input; amounts checked.
pub fn clean_new_visit(input: &NewVisit) -> Result<NewVisit, ClinicError> {
    Ok(NewVisit {
        visit_date: input.visit_date,
        diagnosis: validation::optional(input.diagnosis.as_deref()),
        medications: validation::optional(input.medications.as_deref()),
        amount_due: validation::non_negative("amount_due", input.amount_due)?,
        amount_paid: validation::non_negative("amount_paid", input.amount_paid)?,
    })
}

pub fn clean_visit_update(update: &VisitUpdate) -> Result<VisitUpdate, ClinicError> {
    Ok(VisitUpdate {
        visit_date: update.visit_date,
        diagnosis: validation::optional(update.diagnosis.as_deref()),
        medications: validation::optional(update.medications.as_deref()),
        amount_due: validation::non_negative("amount_due", update.amount_due)?,
        amount_paid: validation::non_negative("amount_paid", update.amount_paid)?,
        remove_xrays: update.remove_xrays.clone(),
    })
}

/// Visit operations, always scoped to one doctor.
pub struct VisitLog<'a> {
    db: &'a Database,
    store: &'a XrayStore,
}

impl<'a> VisitLog<'a> {
    pub fn new(db: &'a Database, store: &'a XrayStore) -> Self {
        Self { db, store }
    }

    /// Record a visit for one of the doctor's patients.
    ///
    /// Attachments are validated and written first; a paid amount is
    /// booked as patient income dated on the visit.
    pub fn record_visit(
        &self,
        doctor: DoctorId,
        patient_local_id: i64,
        input: &NewVisit,
        attachments: &[Upload],
    ) -> Result<Visit, ClinicError> {
        clean_new_visit(input)?;
        if !self.db.patient_exists(doctor, patient_local_id)? {
            return Err(ClinicError::NotFound(format!("patient {}", patient_local_id)));
        }
        let stored = self.store.store_all(doctor, attachments)?;
        self.record_staged_visit(doctor, patient_local_id, input, &stored)
    }

    /// Record a visit whose attachments are already on disk. The files are
    /// discarded if the visit is not recorded.
    pub fn record_staged_visit(
        &self,
        doctor: DoctorId,
        patient_local_id: i64,
        input: &NewVisit,
        stored: &[StoredFile],
    ) -> Result<Visit, ClinicError> {
        let result = clean_new_visit(input).and_then(|input| {
            let patient = self
                .db
                .get_patient(doctor, patient_local_id)?
                .ok_or_else(|| ClinicError::NotFound(format!("patient {}", patient_local_id)))?;
            self.insert_visit_rows(doctor, patient_local_id, &patient.name, &input, stored)
        });
        if result.is_err() {
            warn!(doctor = %doctor, files = stored.len(), "Visit not recorded; discarding uploads");
            self.store.discard(stored);
        }
        let visit = result?;

        info!(
            doctor = %doctor,
            visit_id = visit.id,
            patient = patient_local_id,
            xrays = visit.xrays.len(),
            "Recorded visit"
        );
        Ok(visit)
    }

    fn insert_visit_rows(
        &self,
        doctor: DoctorId,
        patient_local_id: i64,
        patient_name: &str,
        input: &NewVisit,
        stored: &[StoredFile],
    ) -> Result<Visit, ClinicError> {
        let now = db::now();
        let tx = self.db.begin()?;

        let visit_id = self.db.insert_visit(doctor, patient_local_id, input, now)?;
        for file in stored {
            self.db.insert_xray(doctor, visit_id, file, now)?;
        }
        self.db.refresh_first_visit(doctor, patient_local_id)?;

        if input.amount_paid.is_positive() {
            let mut payment = NewTransaction::new(
                Direction::Income,
                PATIENT_PAYMENT_CATEGORY,
                input.amount_paid,
                input.visit_date,
            );
            payment.subcategory = Some(VISIT_PAYMENT.to_string());
            payment.description = Some(format!(
                "Payment from {} for visit on {}",
                patient_name,
                input.visit_date.format("%Y-%m-%d")
            ));
            payment.payment_method = Some(PaymentMethod::Cash);
            payment.reference = Some(Reference::visit(visit_id));
            payment.notes = Some(format!(
                "Visit diagnosis: {}",
                input.diagnosis.as_deref().unwrap_or("Not specified")
            ));
            self.db.insert_transaction(doctor, &payment, now)?;
        }

        let visit = self
            .db
            .get_visit(doctor, visit_id)?
            .ok_or_else(|| visit_not_found(visit_id))?;
        tx.commit()?;
        Ok(visit)
    }

    pub fn get_visit(&self, doctor: DoctorId, visit_id: i64) -> Result<Visit, ClinicError> {
        debug!(doctor = %doctor, visit_id, "Fetching visit");
        self.db
            .get_visit(doctor, visit_id)?
            .ok_or_else(|| visit_not_found(visit_id))
    }

    /// A patient's visits, newest first.
    pub fn list_visits(&self, doctor: DoctorId, patient_local_id: i64) -> Result<Vec<Visit>, ClinicError> {
        if !self.db.patient_exists(doctor, patient_local_id)? {
            return Err(ClinicError::NotFound(format!("patient {}", patient_local_id)));
        }
        Ok(self.db.list_visits(doctor, patient_local_id)?)
    }

    /// Replace a visit's fields, attach new X-rays and drop the listed
    /// ones. A change in the paid amount is booked as income or refund.
    pub fn update_visit(
        &self,
        doctor: DoctorId,
        visit_id: i64,
        update: &VisitUpdate,
        attachments: &[Upload],
    ) -> Result<Visit, ClinicError> {
        let cleaned = clean_visit_update(update)?;
        let existing = self.get_visit(doctor, visit_id)?;
        removed_xrays(&existing, &cleaned)?;
        let stored = self.store.store_all(doctor, attachments)?;
        self.update_staged_visit(doctor, visit_id, update, &stored)
    }

    /// Apply an update whose new attachments are already on disk. The files
    /// are discarded if the update fails.
    pub fn update_staged_visit(
        &self,
        doctor: DoctorId,
        visit_id: i64,
        update: &VisitUpdate,
        stored: &[StoredFile],
    ) -> Result<Visit, ClinicError> {
        let result = clean_visit_update(update).and_then(|update| {
            let existing = self.get_visit(doctor, visit_id)?;
            let removed = removed_xrays(&existing, &update)?;
            let visit = self.update_visit_rows(doctor, &existing, &update, &removed, stored)?;
            Ok((visit, removed))
        });
        if result.is_err() {
            warn!(doctor = %doctor, visit_id, files = stored.len(), "Visit not updated; discarding uploads");
            self.store.discard(stored);
        }
        let (visit, removed) = result?;

        self.store
            .remove_paths(removed.iter().map(|x| x.stored_path.as_str()));

        info!(
            doctor = %doctor,
            visit_id,
            added = stored.len(),
            removed = removed.len(),
            "Updated visit"
        );
        Ok(visit)
    }

    fn update_visit_rows(
        &self,
        doctor: DoctorId,
        existing: &Visit,
        update: &VisitUpdate,
        removed: &[XrayFile],
        stored: &[StoredFile],
    ) -> Result<Visit, ClinicError> {
        let now = db::now();
        let tx = self.db.begin()?;

        if !self.db.update_visit_row(doctor, existing.id, update, now)? {
            return Err(visit_not_found(existing.id));
        }
        for xray in removed {
            self.db.delete_xray_row(doctor, xray.id)?;
        }
        for file in stored {
            self.db.insert_xray(doctor, existing.id, file, now)?;
        }
        self.db.refresh_first_visit(doctor, existing.patient_local_id)?;

        if let Some(entry) = payment_change(existing, update.amount_paid, now) {
            self.db.insert_transaction(doctor, &entry, now)?;
        }

        let visit = self
            .db
            .get_visit(doctor, existing.id)?
            .ok_or_else(|| visit_not_found(existing.id))?;
        tx.commit()?;
        Ok(visit)
    }

    /// Delete a visit with its X-ray rows and files. Ledger entries that
    /// reference it are kept.
    pub fn delete_visit(&self, doctor: DoctorId, visit_id: i64) -> Result<(), ClinicError> {
        let tx = self.db.begin()?;
        let visit = self
            .db
            .get_visit(doctor, visit_id)?
            .ok_or_else(|| visit_not_found(visit_id))?;

        self.db.delete_xrays_for_visit(doctor, visit_id)?;
        self.db.delete_visit_row(doctor, visit_id)?;
        self.db.refresh_first_visit(doctor, visit.patient_local_id)?;
        tx.commit()?;

        self.store
            .remove_paths(visit.xrays.iter().map(|x| x.stored_path.as_str()));
        info!(doctor = %doctor, visit_id, xrays = visit.xrays.len(), "Deleted visit");
        Ok(())
    }

    /// X-ray metadata and file content.
    pub fn get_xray(&self, doctor: DoctorId, xray_id: i64) -> Result<(XrayFile, Vec<u8>), ClinicError> {
        let xray = self
            .db
            .get_xray(doctor, xray_id)?
            .ok_or_else(|| xray_not_found(xray_id))?;
        let bytes = self.store.read(&xray.stored_path)?;
        Ok((xray, bytes))
    }

    pub fn delete_xray(&self, doctor: DoctorId, xray_id: i64) -> Result<(), ClinicError> {
        let xray = self
            .db
            .get_xray(doctor, xray_id)?
            .ok_or_else(|| xray_not_found(xray_id))?;
        self.db.delete_xray_row(doctor, xray_id)?;
        self.store.remove_paths([xray.stored_path.as_str()]);
        info!(doctor = %doctor, xray_id, visit_id = xray.visit_id, "Deleted x-ray");
        Ok(())
    }
}

/// The attached X-rays named in `remove_xrays`.
fn removed_xrays(existing: &Visit, update: &VisitUpdate) -> Result<Vec<XrayFile>, ClinicError> {
    update
        .remove_xrays
        .iter()
        .map(|id| {
            existing
                .xrays
                .iter()
                .find(|x| x.id == *id)
                .cloned()
                .ok_or_else(|| {
                    ClinicError::validation(
                        "remove_xrays",
                        format!("x-ray {} is not attached to this visit", id),
                    )
                })
        })
        .collect()
}

/// Ledger entry for a change in a visit's paid amount, if any.
fn payment_change(existing: &Visit, new_paid: Money, now: NaiveDateTime) -> Option<NewTransaction> {
    let difference = new_paid - existing.amount_paid;
    if difference.is_zero() {
        return None;
    }

    let (direction, category, subcategory) = if difference.is_positive() {
        (Direction::Income, PATIENT_PAYMENT_CATEGORY, VISIT_PAYMENT_UPDATE)
    } else {
        (Direction::Expense, PATIENT_REFUND_CATEGORY, VISIT_PAYMENT_REFUND)
    };

    let mut entry = NewTransaction::new(direction, category, difference.abs(), now);
    entry.subcategory = Some(subcategory.to_string());
    entry.description = Some(format!(
        "Visit payment changed from {} to {}",
        existing.amount_paid, new_paid
    ));
    entry.payment_method = Some(PaymentMethod::Cash);
    entry.reference = Some(Reference::visit(existing.id));
    Some(entry)
}
