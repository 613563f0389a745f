//! SQLite schema definition.

/// Complete database schema for the clinic.
///
/// Timestamps are `YYYY-MM-DD HH:MM:SS` text, money columns hold integer
/// cents. Foreign keys carry no `ON DELETE CASCADE`; patient
/// removal goes through the explicit cascade in the registry.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Doctor accounts and sessions
-- ============================================================================

CREATE TABLE IF NOT EXISTS doctors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,                 -- Argon2id PHC string
    full_name TEXT NOT NULL DEFAULT '',
    phone TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    next_patient_local_id INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    last_login TEXT
);

CREATE TABLE IF NOT EXISTS sessions (
    token_hash TEXT PRIMARY KEY,                 -- SHA-256 hex of the bearer token
    doctor_id INTEGER NOT NULL REFERENCES doctors(id),
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_doctor ON sessions(doctor_id);

-- ============================================================================
-- Patients (composite key: doctor-scoped local id)
-- ============================================================================

CREATE TABLE IF NOT EXISTS patients (
    doctor_id INTEGER NOT NULL REFERENCES doctors(id),
    local_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    phone TEXT NOT NULL,
    age INTEGER CHECK (age IS NULL OR age >= 0),
    diagnosis TEXT,
    medicines TEXT,
    first_visit TEXT,
    next_visit TEXT,
    completed INTEGER NOT NULL DEFAULT 0,
    amount_due INTEGER NOT NULL DEFAULT 0,
    amount_paid INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (doctor_id, local_id)
);

CREATE INDEX IF NOT EXISTS idx_patients_name ON patients(doctor_id, name);

-- ============================================================================
-- Visits and X-ray attachments
-- ============================================================================

CREATE TABLE IF NOT EXISTS visits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    doctor_id INTEGER NOT NULL,
    patient_local_id INTEGER NOT NULL,
    visit_date TEXT NOT NULL,
    diagnosis TEXT,
    medications TEXT,
    amount_due INTEGER NOT NULL DEFAULT 0,
    amount_paid INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    FOREIGN KEY (doctor_id, patient_local_id) REFERENCES patients(doctor_id, local_id)
);

CREATE INDEX IF NOT EXISTS idx_visits_patient ON visits(doctor_id, patient_local_id);
CREATE INDEX IF NOT EXISTS idx_visits_date ON visits(doctor_id, visit_date);

CREATE TABLE IF NOT EXISTS xray_files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    visit_id INTEGER NOT NULL REFERENCES visits(id),
    doctor_id INTEGER NOT NULL REFERENCES doctors(id),
    original_name TEXT NOT NULL,
    stored_path TEXT NOT NULL UNIQUE,            -- relative to the upload root
    content_type TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    sha256 TEXT NOT NULL,
    uploaded_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_xray_visit ON xray_files(visit_id);

-- ============================================================================
-- Appointments
-- ============================================================================

CREATE TABLE IF NOT EXISTS appointments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    doctor_id INTEGER NOT NULL,
    patient_local_id INTEGER NOT NULL,
    scheduled_at TEXT NOT NULL,
    appointment_type TEXT NOT NULL,
    notes TEXT,
    duration_minutes INTEGER NOT NULL DEFAULT 60
        CHECK (duration_minutes BETWEEN 1 AND 1440),
    priority TEXT NOT NULL DEFAULT 'medium'
        CHECK (priority IN ('low', 'medium', 'high', 'urgent')),
    status TEXT NOT NULL DEFAULT 'scheduled'
        CHECK (status IN ('scheduled', 'completed', 'cancelled', 'incomplete')),
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    FOREIGN KEY (doctor_id, patient_local_id) REFERENCES patients(doctor_id, local_id)
);

CREATE INDEX IF NOT EXISTS idx_appointments_time ON appointments(doctor_id, scheduled_at);
CREATE INDEX IF NOT EXISTS idx_appointments_patient ON appointments(doctor_id, patient_local_id);

-- ============================================================================
-- Financial ledger
-- ============================================================================

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    doctor_id INTEGER NOT NULL REFERENCES doctors(id),
    direction TEXT NOT NULL CHECK (direction IN ('income', 'expense')),
    category TEXT NOT NULL,
    subcategory TEXT,
    amount INTEGER NOT NULL CHECK (amount > 0),
    description TEXT,
    transaction_date TEXT NOT NULL,
    payment_method TEXT
        CHECK (payment_method IS NULL OR payment_method IN ('cash', 'card', 'bank_transfer', 'check')),
    reference_kind TEXT
        CHECK (reference_kind IS NULL OR reference_kind IN ('patient', 'visit', 'appointment', 'manual')),
    reference_id INTEGER,                        -- informational, no foreign key
    notes TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(doctor_id, transaction_date);
CREATE INDEX IF NOT EXISTS idx_transactions_category ON transactions(doctor_id, direction, category);

CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    doctor_id INTEGER NOT NULL REFERENCES doctors(id),
    name TEXT NOT NULL,
    description TEXT,
    kind TEXT NOT NULL CHECK (kind IN ('income', 'expense')),
    color TEXT NOT NULL DEFAULT '#6c757d',
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (doctor_id, kind, name)
);

CREATE TABLE IF NOT EXISTS budgets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    doctor_id INTEGER NOT NULL REFERENCES doctors(id),
    category TEXT NOT NULL,
    year INTEGER NOT NULL,
    month INTEGER NOT NULL CHECK (month BETWEEN 1 AND 12),
    monthly_limit INTEGER NOT NULL CHECK (monthly_limit >= 0),
    alert_threshold INTEGER NOT NULL DEFAULT 80 CHECK (alert_threshold BETWEEN 0 AND 100),
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- At most one active budget per category and month
CREATE UNIQUE INDEX IF NOT EXISTS idx_budgets_active
    ON budgets(doctor_id, category, year, month) WHERE is_active = 1;
"#;
