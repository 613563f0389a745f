//! End-to-end clinic scenarios through the public API.

use chrono::{NaiveDate, NaiveDateTime};
use clinic_core::db::Database;
use clinic_core::models::*;
use clinic_core::{
    Calendar, ClinicConfig, ClinicCore, ClinicError, Ledger, Registry, ReportExporter, ReportKind,
    StorageError, Upload, VisitLog, XrayStore,
};
use tempfile::TempDir;

const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];
const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 16, b'J', b'F', b'I', b'F'];

fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap()
}

fn new_doctor(username: &str) -> NewDoctor {
    NewDoctor {
        username: username.to_string(),
        password: "long enough secret".to_string(),
        full_name: format!("Dr {}", username),
        phone: None,
    }
}

fn count(db: &Database, table: &str, doctor: DoctorId) -> i64 {
    db.conn()
        .query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE doctor_id = ?1", table),
            [doctor.0],
            |row| row.get(0),
        )
        .unwrap()
}

#[test]
fn test_each_doctor_starts_at_local_id_one() {
    let dir = TempDir::new().unwrap();
    let core = ClinicCore::open_in_memory(ClinicConfig::with_upload_root(dir.path())).unwrap();
    let a = core.register(&new_doctor("alpha")).unwrap().id;
    let b = core.register(&new_doctor("beta")).unwrap().id;

    let pa = core.create_patient(a, &NewPatient::new("Ann", "1")).unwrap();
    let pb = core.create_patient(b, &NewPatient::new("Ben", "2")).unwrap();
    assert_eq!(pa.local_id, 1);
    assert_eq!(pb.local_id, 1);
    assert_eq!(core.get_patient(a, 1).unwrap().name, "Ann");
    assert_eq!(core.get_patient(b, 1).unwrap().name, "Ben");

    // Ids are not reused after deletion.
    core.delete_patient(a, 1).unwrap();
    let next = core.create_patient(a, &NewPatient::new("Cat", "3")).unwrap();
    assert_eq!(next.local_id, 2);
}

#[test]
fn test_local_ids_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clinic.db");
    let config = ClinicConfig::with_upload_root(dir.path().join("uploads"));

    let doctor = {
        let core = ClinicCore::open(&path, config.clone()).unwrap();
        let doctor = core.register(&new_doctor("alpha")).unwrap().id;
        core.create_patient(doctor, &NewPatient::new("Ann", "1")).unwrap();
        core.create_patient(doctor, &NewPatient::new("Ben", "2")).unwrap();
        core.delete_patient(doctor, 2).unwrap();
        doctor
    };

    let core = ClinicCore::open(&path, config).unwrap();
    let patient = core.create_patient(doctor, &NewPatient::new("Cat", "3")).unwrap();
    assert_eq!(patient.local_id, 3);
    assert!(core.authenticate("alpha", "long enough secret").is_ok());
}

#[test]
fn test_same_file_name_twice_yields_two_files() {
    let dir = TempDir::new().unwrap();
    let core = ClinicCore::open_in_memory(ClinicConfig::with_upload_root(dir.path())).unwrap();
    let doctor = core.register(&new_doctor("alpha")).unwrap().id;
    core.create_patient(doctor, &NewPatient::new("Ann", "1")).unwrap();

    let mut second = PNG.to_vec();
    second.push(0xAB);
    let visit = core
        .record_visit(
            doctor,
            1,
            &NewVisit::on(at(2024, 5, 2)),
            &[
                Upload::new("scan.png", PNG.to_vec()),
                Upload::new("scan.png", second.clone()),
            ],
        )
        .unwrap();

    assert_eq!(visit.xrays.len(), 2);
    assert_ne!(visit.xrays[0].stored_path, visit.xrays[1].stored_path);
    assert_eq!(visit.xrays[0].original_name, "scan.png");
    assert_eq!(visit.xrays[1].original_name, "scan.png");

    let (_, first_bytes) = core.get_xray(doctor, visit.xrays[0].id).unwrap();
    let (_, second_bytes) = core.get_xray(doctor, visit.xrays[1].id).unwrap();
    assert_eq!(first_bytes, PNG);
    assert_eq!(second_bytes, second);
}

#[test]
fn test_traversal_names_stay_in_doctor_directory() {
    let dir = TempDir::new().unwrap();
    let core = ClinicCore::open_in_memory(ClinicConfig::with_upload_root(dir.path())).unwrap();
    let doctor = core.register(&new_doctor("alpha")).unwrap().id;
    core.create_patient(doctor, &NewPatient::new("Ann", "1")).unwrap();

    let visit = core
        .record_visit(
            doctor,
            1,
            &NewVisit::on(at(2024, 5, 2)),
            &[Upload::new("../../etc/passwd.png", PNG.to_vec())],
        )
        .unwrap();

    let xray = &visit.xrays[0];
    assert_eq!(xray.original_name, "../../etc/passwd.png");
    assert!(!xray.stored_path.contains(".."));
    assert!(xray
        .stored_path
        .starts_with(&format!("doctor_{}/", doctor)));

    let on_disk = dir.path().join(&xray.stored_path);
    assert!(on_disk.is_file());
    assert!(on_disk.starts_with(dir.path().join(format!("doctor_{}", doctor))));
}

#[test]
fn test_non_image_content_is_rejected() {
    let dir = TempDir::new().unwrap();
    let core = ClinicCore::open_in_memory(ClinicConfig::with_upload_root(dir.path())).unwrap();
    let doctor = core.register(&new_doctor("alpha")).unwrap().id;
    core.create_patient(doctor, &NewPatient::new("Ann", "1")).unwrap();

    let fake = Upload::new("scan.png", b"GIF89a not really a png".to_vec());
    let result = core.record_visit(doctor, 1, &NewVisit::on(at(2024, 5, 2)), &[fake]);
    assert!(matches!(
        result,
        Err(ClinicError::Storage(StorageError::ContentMismatch(_)))
    ));

    // A JPEG named .png is a mismatch too.
    let mislabeled = Upload::new("scan.png", JPEG.to_vec());
    assert!(core
        .record_visit(doctor, 1, &NewVisit::on(at(2024, 5, 2)), &[mislabeled])
        .is_err());

    let pdf = Upload::new("report.pdf", b"%PDF-1.7".to_vec());
    assert!(matches!(
        core.record_visit(doctor, 1, &NewVisit::on(at(2024, 5, 2)), &[pdf]),
        Err(ClinicError::Storage(StorageError::UnsupportedType(_)))
    ));

    assert!(core.list_visits(doctor, 1).unwrap().is_empty());
}

#[test]
fn test_financial_csv_totals() {
    let db = Database::open_in_memory().unwrap();
    let doctor = register_direct(&db);
    let ledger = Ledger::new(&db);

    for (category, amount, day) in [("Consultation", 100, 2), ("Procedure", 200, 9), ("Consultation", 50, 20)] {
        ledger
            .record_transaction(
                doctor,
                &NewTransaction::new(Direction::Income, category, Money::from_major(amount), at(2024, 5, day)),
            )
            .unwrap();
    }
    for (category, amount, day) in [("Rent", 30, 1), ("Supplies", 70, 15)] {
        ledger
            .record_transaction(
                doctor,
                &NewTransaction::new(Direction::Expense, category, Money::from_major(amount), at(2024, 5, day)),
            )
            .unwrap();
    }
    // Outside the period.
    ledger
        .record_transaction(
            doctor,
            &NewTransaction::new(Direction::Income, "Consultation", Money::from_major(999), at(2024, 6, 1)),
        )
        .unwrap();

    let period = Period::month(YearMonth { year: 2024, month: 5 });
    let csv = ReportExporter::new(&db)
        .export_csv(doctor, ReportKind::Financial, &period)
        .unwrap();

    assert!(csv.contains("Total Income:,350.00"));
    assert!(csv.contains("Total Expenses:,100.00"));
    assert!(csv.contains("Net Profit:,250.00"));
    assert!(csv.contains("Total Transactions:,5"));
    assert!(csv.contains("Consultation,150.00,42.9%"));
    assert!(!csv.contains("999.00"));
}

#[test]
fn test_oversized_amounts_rejected_and_core_stays_usable() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("clinic.db");
    let core = ClinicCore::open(&db_path, ClinicConfig::with_upload_root(dir.path().join("uploads"))).unwrap();
    let doctor = core.register(&new_doctor("whale")).unwrap().id;

    let huge: Money = "50000000000000000.00".parse().unwrap();
    let entry = NewTransaction::new(Direction::Income, "Consultation", huge, at(2024, 5, 2));
    let err = core.record_transaction(doctor, &entry).unwrap_err();
    assert!(matches!(err, ClinicError::Validation { ref field, .. } if field == "amount"), "{:?}", err);

    // Rows written before the bound existed still aggregate.
    let raw = Database::open(&db_path).unwrap();
    raw.insert_transaction(doctor, &entry, at(2024, 5, 2)).unwrap();
    raw.insert_transaction(doctor, &entry, at(2024, 5, 3)).unwrap();
    drop(raw);

    let period = Period::month(YearMonth { year: 2024, month: 5 });
    let summary = core.summarize(doctor, &period).unwrap();
    assert_eq!(summary.total_income, huge + huge);
    assert_eq!(summary.transaction_count, 2);

    assert!(core.list_patients(doctor).unwrap().is_empty());
    assert!(core.create_patient(doctor, &NewPatient::new("Still", "1")).is_ok());
}

fn register_direct(db: &Database) -> DoctorId {
    clinic_core::Accounts::new(db, chrono::Duration::hours(1))
        .register(&new_doctor("ledger"))
        .unwrap()
        .id
}

#[test]
fn test_patient_delete_cascades_rows_and_files() {
    let dir = TempDir::new().unwrap();
    let config = ClinicConfig::with_upload_root(dir.path());
    let db = Database::open_in_memory().unwrap();
    let store = XrayStore::new(&config);
    let doctor = register_direct(&db);

    let registry = Registry::new(&db, &store);
    let visits = VisitLog::new(&db, &store);
    let calendar = Calendar::new(&db);

    let doomed = registry
        .create_patient(doctor, &NewPatient::new("Doomed", "1"))
        .unwrap();
    let kept = registry
        .create_patient(doctor, &NewPatient::new("Kept", "2"))
        .unwrap();

    let mut paid = NewVisit::on(at(2024, 5, 2));
    paid.amount_paid = Money::from_major(25);
    let v1 = visits
        .record_visit(doctor, doomed.local_id, &paid, &[Upload::new("a.png", PNG.to_vec())])
        .unwrap();
    let v2 = visits
        .record_visit(
            doctor,
            doomed.local_id,
            &NewVisit::on(at(2024, 5, 9)),
            &[Upload::new("b.jpg", JPEG.to_vec()), Upload::new("c.png", PNG.to_vec())],
        )
        .unwrap();
    calendar
        .schedule_appointment(doctor, doomed.local_id, &NewAppointment::new(at(2030, 1, 1), "Review"))
        .unwrap();
    let kept_visit = visits
        .record_visit(
            doctor,
            kept.local_id,
            &NewVisit::on(at(2024, 5, 3)),
            &[Upload::new("k.png", PNG.to_vec())],
        )
        .unwrap();

    let doomed_files: Vec<String> = v1
        .xrays
        .iter()
        .chain(v2.xrays.iter())
        .map(|x| x.stored_path.clone())
        .collect();
    for path in &doomed_files {
        assert!(store.exists(path));
    }

    let deleted = registry.delete_patient(doctor, doomed.local_id).unwrap();
    assert_eq!(deleted.visits_removed, 2);
    assert_eq!(deleted.xrays_removed, 3);
    assert_eq!(deleted.appointments_removed, 1);

    for path in &doomed_files {
        assert!(!store.exists(path));
    }
    assert!(store.exists(&kept_visit.xrays[0].stored_path));

    // Only the kept patient's rows remain.
    assert_eq!(count(&db, "patients", doctor), 1);
    assert_eq!(count(&db, "visits", doctor), 1);
    assert_eq!(count(&db, "xray_files", doctor), 1);
    assert_eq!(count(&db, "appointments", doctor), 0);
    let orphans: i64 = db
        .conn()
        .query_row(
            "SELECT COUNT(*) FROM xray_files x
             WHERE NOT EXISTS (SELECT 1 FROM visits v WHERE v.id = x.visit_id)",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(orphans, 0);

    // The ledger keeps the historical payment.
    assert_eq!(count(&db, "transactions", doctor), 1);
}

#[test]
fn test_visit_payment_flows_into_dashboard() {
    let dir = TempDir::new().unwrap();
    let core = ClinicCore::open_in_memory(ClinicConfig::with_upload_root(dir.path())).unwrap();
    let doctor = core.register(&new_doctor("alpha")).unwrap().id;
    core.create_patient(doctor, &NewPatient::new("Ann", "1")).unwrap();

    let now = clinic_core::db::now();
    let mut visit = NewVisit::on(now);
    visit.amount_due = Money::from_major(90);
    visit.amount_paid = Money::from_major(60);
    core.record_visit(doctor, 1, &visit, &[]).unwrap();

    let dashboard = core.dashboard(doctor, now).unwrap();
    assert_eq!(dashboard.total_patients, 1);
    assert_eq!(dashboard.visits_this_month, 1);
    assert_eq!(dashboard.month_income, Money::from_major(60));
    assert_eq!(dashboard.outstanding_balance, Money::from_major(30));

    let balance = core.patient_balance(doctor, 1).unwrap();
    assert_eq!(balance.unpaid, Money::from_major(30));
}
