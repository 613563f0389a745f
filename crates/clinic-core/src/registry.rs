//! Per-doctor patient registry.

use tracing::{debug, info};

use crate::db::{self, Database};
use crate::models::{DeletedPatient, DoctorId, NewPatient, Patient, PatientBalance, PatientUpdate};
use crate::storage::XrayStore;
use crate::validation;
use crate::ClinicError;

fn not_found(local_id: i64) -> ClinicError {
    ClinicError::NotFound(format!("patient {}", local_id))
}

/// Patient operations, always scoped to one doctor.
pub struct Registry<'a> {
    db: &'a Database,
    store: &'a XrayStore,
}

impl<'a> Registry<'a> {
    pub fn new(db: &'a Database, store: &'a XrayStore) -> Self {
        Self { db, store }
    }

    /// Register a patient under the doctor's next local id.
    pub fn create_patient(&self, doctor: DoctorId, input: &NewPatient) -> Result<Patient, ClinicError> {
        let input = NewPatient {
            name: validation::required_max("name", &input.name, validation::MAX_NAME_LEN)?,
            phone: validation::required("phone", &input.phone)?,
            age: input.age,
            diagnosis: validation::optional(input.diagnosis.as_deref()),
            medicines: validation::optional(input.medicines.as_deref()),
            amount_due: validation::non_negative("amount_due", input.amount_due)?,
            amount_paid: validation::non_negative("amount_paid", input.amount_paid)?,
        };

        let tx = self.db.begin()?;
        let local_id = self.db.take_next_patient_local_id(doctor)?;
        let patient = self.db.insert_patient(doctor, local_id, &input, db::now())?;
        tx.commit()?;

        info!(doctor = %doctor, local_id, "Created patient");
        Ok(patient)
    }

    pub fn get_patient(&self, doctor: DoctorId, local_id: i64) -> Result<Patient, ClinicError> {
        debug!(doctor = %doctor, local_id, "Fetching patient");
        self.db
            .get_patient(doctor, local_id)?
            .ok_or_else(|| not_found(local_id))
    }

    pub fn list_patients(&self, doctor: DoctorId) -> Result<Vec<Patient>, ClinicError> {
        Ok(self.db.list_patients(doctor)?)
    }

    /// Search by name, phone or (numeric query) local id. A blank query
    /// lists everything.
    pub fn search_patients(&self, doctor: DoctorId, query: &str) -> Result<Vec<Patient>, ClinicError> {
        if query.trim().is_empty() {
            return self.list_patients(doctor);
        }
        Ok(self.db.search_patients(doctor, query)?)
    }

    pub fn update_patient(
        &self,
        doctor: DoctorId,
        local_id: i64,
        update: &PatientUpdate,
    ) -> Result<Patient, ClinicError> {
        let update = PatientUpdate {
            name: validation::required_max("name", &update.name, validation::MAX_NAME_LEN)?,
            phone: validation::required("phone", &update.phone)?,
            age: update.age,
            diagnosis: validation::optional(update.diagnosis.as_deref()),
            medicines: validation::optional(update.medicines.as_deref()),
            completed: update.completed,
        };

        if !self.db.update_patient(doctor, local_id, &update, db::now())? {
            return Err(not_found(local_id));
        }
        info!(doctor = %doctor, local_id, "Updated patient");
        self.get_patient(doctor, local_id)
    }

    /// Delete a patient with all of its visits, X-rays and appointments.
    ///
    /// Rows go in one transaction; files are removed after commit. Ledger
    /// transactions are kept.
    pub fn delete_patient(&self, doctor: DoctorId, local_id: i64) -> Result<DeletedPatient, ClinicError> {
        let tx = self.db.begin()?;
        if !self.db.patient_exists(doctor, local_id)? {
            return Err(not_found(local_id));
        }

        let files = self.db.list_xrays_for_patient(doctor, local_id)?;
        let xrays_removed = self.db.delete_xrays_for_patient(doctor, local_id)?;
        let visits_removed = self.db.delete_visits_for_patient(doctor, local_id)?;
        let appointments_removed = self.db.delete_appointments_for_patient(doctor, local_id)?;
        self.db.delete_patient_row(doctor, local_id)?;
        tx.commit()?;

        self.store
            .remove_paths(files.iter().map(|f| f.stored_path.as_str()));

        info!(
            doctor = %doctor,
            local_id,
            visits_removed,
            appointments_removed,
            xrays_removed,
            "Deleted patient"
        );
        Ok(DeletedPatient {
            local_id,
            visits_removed,
            appointments_removed,
            xrays_removed,
        })
    }

    /// Opening balance plus every visit.
    pub fn patient_balance(&self, doctor: DoctorId, local_id: i64) -> Result<PatientBalance, ClinicError> {
        let (due, paid) = self.db.patient_totals(doctor, local_id)?;
        Ok(PatientBalance::new(due, paid))
    }
}
