//! Doctor accounts, credential checks and sessions.
//!
//! Passwords are stored as Argon2id PHC strings. Session tokens are 32
//! random bytes, hex encoded; only their SHA-256 digest is persisted, so a
//! leaked database does not leak live sessions.
//!
//! Hashing and verification never need the database, so every flow comes
//! in phases: [`NewAccount::prepare`], [`check_login`] and
//! [`PasswordChange::prepare`] do the Argon2 work, while [`Accounts`] only
//! reads and writes rows. [`crate::ClinicCore`] runs the Argon2 phases
//! without holding its database lock.

use std::sync::OnceLock;

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::Duration;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::db::{self, Database, DoctorCredentials};
use crate::models::{Doctor, DoctorId, NewDoctor, ProfileUpdate, Session};
use crate::validation;
use crate::ClinicError;

const TOKEN_BYTES: usize = 32;

/// Same message for unknown user, wrong password and disabled account.
const INVALID_CREDENTIALS: &str = "invalid username or password";
const INVALID_SESSION: &str = "invalid or expired session";

/// Hash a password with Argon2id and a random salt.
pub fn hash_password(password: &str) -> Result<String, ClinicError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ClinicError::Internal(format!("password hashing failed: {}", e)))
}

/// Check a password against a stored PHC string. Unparseable hashes never
/// verify.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// SHA-256 hex digest of a bearer token, the form stored in `sessions`.
pub fn token_hash(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn new_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hash verified against when the username is unknown, so a miss costs
/// the same Argon2 work as a wrong password.
fn dummy_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY.get_or_init(|| hash_password("no such account").unwrap_or_default())
}

fn invalid_credentials() -> ClinicError {
    ClinicError::Authentication(INVALID_CREDENTIALS.into())
}

/// Verify a login against the credentials found for its username.
pub fn check_login(creds: Option<&DoctorCredentials>, password: &str) -> Result<DoctorId, ClinicError> {
    let Some(creds) = creds else {
        verify_password(password, dummy_hash());
        warn!("Login rejected: unknown account");
        return Err(invalid_credentials());
    };

    if !verify_password(password, &creds.password_hash) {
        warn!(doctor = %creds.doctor.id, "Login rejected: bad password");
        return Err(invalid_credentials());
    }
    if !creds.doctor.is_active {
        warn!(doctor = %creds.doctor.id, "Login rejected: account disabled");
        return Err(invalid_credentials());
    }
    Ok(creds.doctor.id)
}

/// A validated registration with its password already hashed.
#[derive(Debug, Clone)]
pub struct NewAccount {
    username: String,
    password_hash: String,
    full_name: String,
    phone: Option<String>,
}

impl NewAccount {
    pub fn prepare(input: &NewDoctor) -> Result<Self, ClinicError> {
        let username = validation::username(&input.username)?;
        validation::password("password", &input.password)?;
        let full_name = input.full_name.trim();
        if full_name.chars().count() > validation::MAX_NAME_LEN {
            return Err(ClinicError::validation("full_name", "is too long"));
        }
        Ok(Self {
            username,
            password_hash: hash_password(&input.password)?,
            full_name: full_name.to_string(),
            phone: validation::optional(input.phone.as_deref()),
        })
    }
}

/// A verified password change, ready to be written.
#[derive(Debug, Clone)]
pub struct PasswordChange {
    doctor: DoctorId,
    previous_hash: String,
    new_hash: String,
}

impl PasswordChange {
    /// Check `current` against the stored hash, then validate and hash `new`.
    pub fn prepare(doctor: DoctorId, stored_hash: String, current: &str, new: &str) -> Result<Self, ClinicError> {
        if !verify_password(current, &stored_hash) {
            warn!(doctor = %doctor, "Password change rejected: current password mismatch");
            return Err(ClinicError::validation(
                "current_password",
                "current password is incorrect",
            ));
        }
        validation::password("new_password", new)?;
        Ok(Self {
            doctor,
            previous_hash: stored_hash,
            new_hash: hash_password(new)?,
        })
    }
}

/// Account and session operations.
pub struct Accounts<'a> {
    db: &'a Database,
    session_ttl: Duration,
}

impl<'a> Accounts<'a> {
    pub fn new(db: &'a Database, session_ttl: Duration) -> Self {
        Self { db, session_ttl }
    }

    /// Create a doctor account.
    pub fn register(&self, input: &NewDoctor) -> Result<Doctor, ClinicError> {
        self.create_account(&NewAccount::prepare(input)?)
    }

    /// Insert a prepared account.
    pub fn create_account(&self, account: &NewAccount) -> Result<Doctor, ClinicError> {
        if self.db.username_exists(&account.username)? {
            return Err(ClinicError::Conflict("username already taken".into()));
        }

        let doctor = self
            .db
            .insert_doctor(
                &account.username,
                &account.password_hash,
                &account.full_name,
                account.phone.as_deref(),
                db::now(),
            )
            .map_err(|e| {
                if e.is_unique_violation() {
                    ClinicError::Conflict("username already taken".into())
                } else {
                    e.into()
                }
            })?;

        info!(doctor = %doctor.id, "Registered doctor account");
        Ok(doctor)
    }

    /// Verify credentials and open a session.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Session, ClinicError> {
        let creds = self.find_login(username)?;
        let doctor = check_login(creds.as_ref(), password)?;
        self.open_session(doctor)
    }

    /// Stored credentials for a login name, if the account exists.
    pub fn find_login(&self, username: &str) -> Result<Option<DoctorCredentials>, ClinicError> {
        Ok(self.db.find_credentials(&username.trim().to_lowercase())?)
    }

    /// Open a session for a doctor that passed [`check_login`]. An account
    /// disabled or removed since then is refused.
    pub fn open_session(&self, doctor: DoctorId) -> Result<Session, ClinicError> {
        let now = db::now();
        let token = new_token();
        let expires_at = now + self.session_ttl;

        let tx = self.db.begin()?;
        match self.db.get_doctor(doctor)? {
            Some(account) if account.is_active => {}
            _ => {
                warn!(doctor = %doctor, "Login rejected: account changed during login");
                return Err(invalid_credentials());
            }
        }
        self.db.delete_expired_sessions(now)?;
        self.db
            .insert_session(&token_hash(&token), doctor, now, expires_at)?;
        self.db.record_login(doctor, now)?;
        tx.commit()?;

        info!(doctor = %doctor, "Doctor logged in");
        Ok(Session {
            token,
            doctor_id: doctor,
            expires_at,
        })
    }

    /// Map a bearer token to its doctor. Expired sessions are removed.
    pub fn resolve_session(&self, token: &str) -> Result<DoctorId, ClinicError> {
        let hash = token_hash(token);
        match self.db.get_session(&hash)? {
            Some((doctor, expires_at)) if expires_at > db::now() => Ok(doctor),
            Some(_) => {
                self.db.delete_session(&hash)?;
                debug!("Expired session removed");
                Err(ClinicError::Authentication(INVALID_SESSION.into()))
            }
            None => Err(ClinicError::Authentication(INVALID_SESSION.into())),
        }
    }

    /// End a session. Unknown tokens are ignored.
    pub fn logout(&self, token: &str) -> Result<(), ClinicError> {
        if self.db.delete_session(&token_hash(token))? {
            debug!("Session closed");
        }
        Ok(())
    }

    pub fn get_profile(&self, doctor: DoctorId) -> Result<Doctor, ClinicError> {
        self.db
            .get_doctor(doctor)?
            .ok_or_else(|| ClinicError::NotFound("doctor".into()))
    }

    pub fn update_profile(&self, doctor: DoctorId, update: &ProfileUpdate) -> Result<Doctor, ClinicError> {
        let full_name = update.full_name.trim();
        if full_name.chars().count() > validation::MAX_NAME_LEN {
            return Err(ClinicError::validation("full_name", "is too long"));
        }
        let phone = validation::optional(update.phone.as_deref());

        if !self
            .db
            .update_doctor_profile(doctor, full_name, phone.as_deref())?
        {
            return Err(ClinicError::NotFound("doctor".into()));
        }
        info!(doctor = %doctor, "Updated profile");
        self.get_profile(doctor)
    }

    /// Change the password after verifying the current one. Every other
    /// session of the doctor is revoked; `keep_token` survives.
    pub fn change_password(
        &self,
        doctor: DoctorId,
        current: &str,
        new: &str,
        keep_token: Option<&str>,
    ) -> Result<(), ClinicError> {
        let stored = self.password_hash(doctor)?;
        let change = PasswordChange::prepare(doctor, stored, current, new)?;
        self.apply_password_change(&change, keep_token)
    }

    pub fn password_hash(&self, doctor: DoctorId) -> Result<String, ClinicError> {
        self.db
            .get_password_hash(doctor)?
            .ok_or_else(|| ClinicError::NotFound("doctor".into()))
    }

    /// Write a prepared change and revoke the doctor's other sessions.
    /// Fails with a conflict if the password changed after `change` was
    /// prepared.
    pub fn apply_password_change(&self, change: &PasswordChange, keep_token: Option<&str>) -> Result<(), ClinicError> {
        let doctor = change.doctor;
        let keep_hash = keep_token.map(token_hash);

        let tx = self.db.begin()?;
        if self.password_hash(doctor)? != change.previous_hash {
            warn!(doctor = %doctor, "Password change rejected: changed concurrently");
            return Err(ClinicError::Conflict("password was changed meanwhile".into()));
        }
        self.db.set_password_hash(doctor, &change.new_hash)?;
        let revoked = self.db.delete_other_sessions(doctor, keep_hash.as_deref())?;
        tx.commit()?;

        info!(doctor = %doctor, revoked, "Password changed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn new_doctor(username: &str, password: &str) -> NewDoctor {
        NewDoctor {
            username: username.into(),
            password: password.into(),
            full_name: "Gregory House".into(),
            phone: None,
        }
    }

    #[test]
    fn test_hash_never_contains_plaintext() {
        let hash = hash_password("secret-pass").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(!hash.contains("secret-pass"));
        assert!(verify_password("secret-pass", &hash));
        assert!(!verify_password("secret-pasS", &hash));
        assert!(!verify_password("secret-pass", "not a hash"));
    }

    #[test]
    fn test_register_and_login() {
        let db = setup();
        let accounts = Accounts::new(&db, Duration::hours(12));

        let doctor = accounts.register(&new_doctor(" House ", "secret1")).unwrap();
        assert_eq!(doctor.username, "house");

        let session = accounts.authenticate("HOUSE", "secret1").unwrap();
        assert_eq!(session.doctor_id, doctor.id);
        assert_eq!(session.token.len(), TOKEN_BYTES * 2);
        assert_eq!(accounts.resolve_session(&session.token).unwrap(), doctor.id);

        let profile = accounts.get_profile(doctor.id).unwrap();
        assert!(profile.last_login.is_some());
    }

    #[test]
    fn test_duplicate_username_conflicts() {
        let db = setup();
        let accounts = Accounts::new(&db, Duration::hours(12));
        accounts.register(&new_doctor("house", "secret1")).unwrap();
        let err = accounts.register(&new_doctor("HOUSE", "other12")).unwrap_err();
        assert!(matches!(err, ClinicError::Conflict(_)));
    }

    #[test]
    fn test_short_password_rejected() {
        let db = setup();
        let accounts = Accounts::new(&db, Duration::hours(12));
        let err = accounts.register(&new_doctor("house", "12345")).unwrap_err();
        assert!(matches!(err, ClinicError::Validation { ref field, .. } if field == "password"));
    }

    #[test]
    fn test_wrong_password_same_error_as_unknown_user() {
        let db = setup();
        let accounts = Accounts::new(&db, Duration::hours(12));
        accounts.register(&new_doctor("house", "secret1")).unwrap();

        let wrong = accounts.authenticate("house", "nope").unwrap_err();
        let unknown = accounts.authenticate("wilson", "secret1").unwrap_err();
        assert_eq!(wrong.to_string(), unknown.to_string());
        assert!(matches!(wrong, ClinicError::Authentication(_)));
    }

    #[test]
    fn test_disabled_account_cannot_login() {
        let db = setup();
        let accounts = Accounts::new(&db, Duration::hours(12));
        let doctor = accounts.register(&new_doctor("house", "secret1")).unwrap();
        db.set_doctor_active(doctor.id, false).unwrap();

        let err = accounts.authenticate("house", "secret1").unwrap_err();
        assert_eq!(err.to_string(), accounts.authenticate("x", "y").unwrap_err().to_string());
    }

    #[test]
    fn test_expired_session_rejected_and_removed() {
        let db = setup();
        let accounts = Accounts::new(&db, Duration::seconds(-1));
        accounts.register(&new_doctor("house", "secret1")).unwrap();
        let session = accounts.authenticate("house", "secret1").unwrap();

        assert!(matches!(
            accounts.resolve_session(&session.token),
            Err(ClinicError::Authentication(_))
        ));
        assert!(db.get_session(&token_hash(&session.token)).unwrap().is_none());
    }

    #[test]
    fn test_logout_is_idempotent() {
        let db = setup();
        let accounts = Accounts::new(&db, Duration::hours(1));
        accounts.register(&new_doctor("house", "secret1")).unwrap();
        let session = accounts.authenticate("house", "secret1").unwrap();

        accounts.logout(&session.token).unwrap();
        accounts.logout(&session.token).unwrap();
        assert!(accounts.resolve_session(&session.token).is_err());
    }

    #[test]
    fn test_change_password_revokes_other_sessions() {
        let db = setup();
        let accounts = Accounts::new(&db, Duration::hours(1));
        let doctor = accounts.register(&new_doctor("house", "secret1")).unwrap();
        let current = accounts.authenticate("house", "secret1").unwrap();
        let other = accounts.authenticate("house", "secret1").unwrap();

        let err = accounts
            .change_password(doctor.id, "wrong", "newsecret", Some(&current.token))
            .unwrap_err();
        assert!(matches!(err, ClinicError::Validation { .. }));

        accounts
            .change_password(doctor.id, "secret1", "newsecret", Some(&current.token))
            .unwrap();

        assert!(accounts.resolve_session(&current.token).is_ok());
        assert!(accounts.resolve_session(&other.token).is_err());
        assert!(accounts.authenticate("house", "secret1").is_err());
        assert!(accounts.authenticate("house", "newsecret").is_ok());
    }

    #[test]
    fn test_unknown_user_is_verified_against_a_real_hash() {
        assert!(dummy_hash().starts_with("$argon2id$"));
        assert!(PasswordHash::new(dummy_hash()).is_ok());
        assert!(!verify_password("no such account", "$argon2id$fake"));

        let err = check_login(None, "whatever").unwrap_err();
        assert_eq!(err.to_string(), invalid_credentials().to_string());
    }

    #[test]
    fn test_login_phases_refuse_account_disabled_midway() {
        let db = setup();
        let accounts = Accounts::new(&db, Duration::hours(1));
        let doctor = accounts.register(&new_doctor("house", "secret1")).unwrap();

        let creds = accounts.find_login(" HOUSE ").unwrap();
        assert_eq!(check_login(creds.as_ref(), "secret1").unwrap(), doctor.id);

        db.set_doctor_active(doctor.id, false).unwrap();
        let err = accounts.open_session(doctor.id).unwrap_err();
        assert!(matches!(err, ClinicError::Authentication(_)));
        assert!(matches!(accounts.open_session(DoctorId(999)), Err(ClinicError::Authentication(_))));
    }

    #[test]
    fn test_stale_password_change_conflicts() {
        let db = setup();
        let accounts = Accounts::new(&db, Duration::hours(1));
        let doctor = accounts.register(&new_doctor("house", "secret1")).unwrap();

        let stored = accounts.password_hash(doctor.id).unwrap();
        let first = PasswordChange::prepare(doctor.id, stored.clone(), "secret1", "first-new").unwrap();
        let second = PasswordChange::prepare(doctor.id, stored, "secret1", "second-new").unwrap();

        accounts.apply_password_change(&first, None).unwrap();
        let err = accounts.apply_password_change(&second, None).unwrap_err();
        assert!(matches!(err, ClinicError::Conflict(_)));
        assert!(accounts.authenticate("house", "first-new").is_ok());
        assert!(accounts.authenticate("house", "second-new").is_err());
    }

    #[test]
    fn test_prepared_account_is_hashed_before_insert() {
        let db = setup();
        let accounts = Accounts::new(&db, Duration::hours(1));

        let account = NewAccount::prepare(&new_doctor(" House ", "secret1")).unwrap();
        assert!(account.password_hash.starts_with("$argon2id$"));
        assert!(matches!(
            NewAccount::prepare(&new_doctor("house", "123")),
            Err(ClinicError::Validation { .. })
        ));

        let doctor = accounts.create_account(&account).unwrap();
        assert_eq!(doctor.username, "house");
        assert!(matches!(accounts.create_account(&account), Err(ClinicError::Conflict(_))));
        assert!(accounts.authenticate("house", "secret1").is_ok());
    }

    #[test]
    fn test_update_profile() {
        let db = setup();
        let accounts = Accounts::new(&db, Duration::hours(1));
        let doctor = accounts.register(&new_doctor("house", "secret1")).unwrap();

        let updated = accounts
            .update_profile(
                doctor.id,
                &ProfileUpdate {
                    full_name: " James Wilson ".into(),
                    phone: Some(" ".into()),
                },
            )
            .unwrap();
        assert_eq!(updated.full_name, "James Wilson");
        assert_eq!(updated.phone, None);
        assert!(matches!(
            accounts.get_profile(DoctorId(999)),
            Err(ClinicError::NotFound(_))
        ));
    }
}
