use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::clock::Timestamp;
use crate::error::{AuthError, EnrollError, StoreError};

/// Current credential file version
const CREDENTIAL_VERSION: &str = "2.0";

/// PIN length when none is configured
pub const DEFAULT_PIN_LENGTH: usize = 6;

/// Hashed parent PIN plus recovery question
///
/// Both secrets are stored as Argon2id PHC strings, which carry their own salt
/// and parameters.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct HashedCredential {
    pub version: String,
    pub pin_hash: String,
    pub recovery_question: String,
    pub recovery_answer_hash: String,
    pub updated_at: Timestamp,
}

impl HashedCredential {
    /// Hash a normalized PIN and recovery answer
    pub fn new(pin: &str, recovery_question: &str, recovery_answer: &str) -> Result<Self, EnrollError> {
        Ok(Self {
            version: CREDENTIAL_VERSION.to_string(),
            pin_hash: hash_secret(pin)?,
            recovery_question: recovery_question.trim().to_string(),
            recovery_answer_hash: hash_secret(&normalize_answer(recovery_answer))?,
            updated_at: Local::now(),
        })
    }

    /// Check a normalized PIN against the stored hash
    ///
    /// An unparseable stored hash is `Corrupt`, never a mismatch.
    pub fn verify_pin(&self, pin: &str) -> Result<bool, StoreError> {
        verify_secret(pin, &self.pin_hash)
    }

    /// Check a recovery answer (case and surrounding whitespace ignored)
    pub fn verify_recovery_answer(&self, answer: &str) -> Result<bool, StoreError> {
        verify_secret(&normalize_answer(answer), &self.recovery_answer_hash)
    }

    /// Replace the PIN, keeping the recovery question and answer
    pub fn with_pin(&self, pin: &str) -> Result<Self, EnrollError> {
        Ok(Self {
            pin_hash: hash_secret(pin)?,
            updated_at: Local::now(),
            ..self.clone()
        })
    }
}

/// Persistence for the parent credential
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<HashedCredential, StoreError>;
    fn save(&self, credential: &HashedCredential) -> Result<(), StoreError>;
}

/// Credential kept as a private JSON file
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<HashedCredential, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(StoreError::NotFound),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let credential: HashedCredential = serde_json::from_str(&content)
            .map_err(|e| StoreError::Corrupt(format!("{}: {}", self.path.display(), e)))?;

        if credential.version != CREDENTIAL_VERSION {
            return Err(StoreError::Corrupt(format!(
                "credential version mismatch (expected {}, got {})",
                CREDENTIAL_VERSION, credential.version
            )));
        }

        Ok(credential)
    }

    fn save(&self, credential: &HashedCredential) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(credential)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        crate::platform::atomic_write_private(&self.path, content.as_bytes())
            .map_err(|e| StoreError::Unavailable(format!("{:#}", e)))
    }
}

/// In-process credential store
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credential: Mutex<Option<HashedCredential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-enrolled with `pin`
    pub fn with_pin(pin: &str) -> Result<Self, EnrollError> {
        let credential = HashedCredential::new(pin, "Favourite colour?", "blue")?;
        Ok(Self {
            credential: Mutex::new(Some(credential)),
        })
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<HashedCredential, StoreError> {
        self.credential
            .lock()
            .map_err(|_| StoreError::Unavailable("credential lock poisoned".to_string()))?
            .clone()
            .ok_or(StoreError::NotFound)
    }

    fn save(&self, credential: &HashedCredential) -> Result<(), StoreError> {
        *self
            .credential
            .lock()
            .map_err(|_| StoreError::Unavailable("credential lock poisoned".to_string()))? =
            Some(credential.clone());
        Ok(())
    }
}

/// PIN strength rating used when enrolling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PinStrength {
    Invalid,
    TooWeak,
    Weak,
    Strong,
}

impl PinStrength {
    pub fn display_name(&self) -> &'static str {
        match self {
            PinStrength::Invalid => "Invalid",
            PinStrength::TooWeak => "Too Weak",
            PinStrength::Weak => "Weak",
            PinStrength::Strong => "Strong",
        }
    }
}

const COMMON_PINS: &[&str] = &[
    "123456", "654321", "111111", "000000", "121212", "112233", "123123", "696969", "101010",
    "123321", "131313",
];

/// Trim a candidate and check it is exactly `expected_len` ASCII digits
pub fn normalize_pin(candidate: &str, expected_len: usize) -> Result<String, AuthError> {
    let pin = candidate.trim();
    if pin.len() != expected_len || !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AuthError::InvalidFormat { expected_len });
    }
    Ok(pin.to_string())
}

/// Rate a PIN: sequences and repeats are too weak, well-known PINs are weak
pub fn pin_strength(pin: &str, expected_len: usize) -> PinStrength {
    let Ok(pin) = normalize_pin(pin, expected_len) else {
        return PinStrength::Invalid;
    };

    let digits: Vec<i8> = pin.bytes().map(|b| (b - b'0') as i8).collect();
    let ascending = digits.windows(2).all(|w| w[1] == w[0] + 1);
    let descending = digits.windows(2).all(|w| w[1] == w[0] - 1);
    let repeating = digits.windows(2).all(|w| w[1] == w[0]);

    if ascending || descending || repeating {
        PinStrength::TooWeak
    } else if COMMON_PINS.contains(&pin.as_str()) {
        PinStrength::Weak
    } else {
        PinStrength::Strong
    }
}

/// Validates candidate PINs against the credential store
///
/// Holds no mutable state; clones share the same store.
#[derive(Clone)]
pub struct PinAuthenticator {
    store: Arc<dyn CredentialStore>,
    pin_length: usize,
    store_timeout: Duration,
}

impl PinAuthenticator {
    pub fn new(store: Arc<dyn CredentialStore>, pin_length: usize, store_timeout: Duration) -> Self {
        Self {
            store,
            pin_length,
            store_timeout,
        }
    }

    pub fn pin_length(&self) -> usize {
        self.pin_length
    }

    /// Check a candidate PIN
    ///
    /// Malformed candidates fail with `InvalidFormat` before the store is
    /// touched. A mismatch is `Ok(false)`. Store failures, including the store
    /// not answering within the configured timeout, are `StoreUnavailable`.
    pub async fn validate(&self, candidate: &str) -> Result<bool, AuthError> {
        let pin = normalize_pin(candidate, self.pin_length)?;

        let store = self.store.clone();
        let load = tokio::task::spawn_blocking(move || store.load());

        let credential = match tokio::time::timeout(self.store_timeout, load).await {
            Err(_) => {
                warn!("Credential store timed out after {:?}", self.store_timeout);
                return Err(AuthError::StoreUnavailable(StoreError::Timeout(
                    self.store_timeout,
                )));
            }
            Ok(Err(join_err)) => {
                warn!("Credential store task failed: {}", join_err);
                return Err(AuthError::StoreUnavailable(StoreError::Unavailable(
                    join_err.to_string(),
                )));
            }
            Ok(Ok(Err(e))) => {
                warn!("Failed to load credential: {}", e);
                return Err(AuthError::StoreUnavailable(e));
            }
            Ok(Ok(Ok(credential))) => credential,
        };

        // Argon2 verification is CPU-bound
        let matched = match tokio::task::spawn_blocking(move || credential.verify_pin(&pin)).await {
            Err(join_err) => {
                warn!("PIN verification task failed: {}", join_err);
                return Err(AuthError::StoreUnavailable(StoreError::Unavailable(
                    join_err.to_string(),
                )));
            }
            Ok(Err(e)) => {
                warn!("Stored PIN hash is unusable: {}", e);
                return Err(AuthError::StoreUnavailable(e));
            }
            Ok(Ok(matched)) => matched,
        };

        debug!("PIN validation finished (matched: {})", matched);
        Ok(matched)
    }
}

/// Enrolment and recovery of the parent PIN
#[derive(Clone)]
pub struct CredentialManager {
    store: Arc<dyn CredentialStore>,
    pin_length: usize,
}

impl CredentialManager {
    pub fn new(store: Arc<dyn CredentialStore>, pin_length: usize) -> Self {
        Self { store, pin_length }
    }

    /// Whether a PIN has been enrolled
    pub fn has_pin(&self) -> bool {
        self.store.load().is_ok()
    }

    /// Enroll a new PIN with a recovery question and answer
    pub fn set_pin(
        &self,
        pin: &str,
        recovery_question: &str,
        recovery_answer: &str,
    ) -> Result<(), EnrollError> {
        let pin = self.check_new_pin(pin)?;

        if recovery_answer.trim().is_empty() {
            return Err(EnrollError::EmptyRecoveryAnswer);
        }

        self.store
            .save(&HashedCredential::new(&pin, recovery_question, recovery_answer)?)?;
        info!("Parent PIN enrolled");
        Ok(())
    }

    /// Replace the PIN after verifying the recovery answer
    pub fn reset_pin_with_answer(&self, answer: &str, new_pin: &str) -> Result<(), EnrollError> {
        let pin = self.check_new_pin(new_pin)?;
        let credential = self.store.load()?;

        if !credential.verify_recovery_answer(answer)? {
            warn!("PIN reset refused: recovery answer mismatch");
            return Err(EnrollError::RecoveryMismatch);
        }

        self.store.save(&credential.with_pin(&pin)?)?;
        info!("Parent PIN reset via recovery answer");
        Ok(())
    }

    /// The enrolled recovery question
    pub fn recovery_question(&self) -> Result<String, StoreError> {
        Ok(self.store.load()?.recovery_question)
    }

    fn check_new_pin(&self, pin: &str) -> Result<String, EnrollError> {
        let pin = normalize_pin(pin, self.pin_length).map_err(|_| EnrollError::InvalidFormat {
            expected_len: self.pin_length,
        })?;

        if pin_strength(&pin, self.pin_length) == PinStrength::TooWeak {
            return Err(EnrollError::TooWeak);
        }

        Ok(pin)
    }
}

fn normalize_answer(answer: &str) -> String {
    answer.trim().to_lowercase()
}

fn hash_secret(secret: &str) -> Result<String, EnrollError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| EnrollError::Hashing(e.to_string()))
}

fn verify_secret(secret: &str, hash: &str) -> Result<bool, StoreError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| StoreError::Corrupt(format!("unreadable credential hash: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStore {
        inner: MemoryCredentialStore,
        loads: AtomicUsize,
    }

    impl CredentialStore for CountingStore {
        fn load(&self) -> Result<HashedCredential, StoreError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.inner.load()
        }

        fn save(&self, credential: &HashedCredential) -> Result<(), StoreError> {
            self.inner.save(credential)
        }
    }

    struct SlowStore;

    impl CredentialStore for SlowStore {
        fn load(&self) -> Result<HashedCredential, StoreError> {
            std::thread::sleep(Duration::from_millis(500));
            Err(StoreError::NotFound)
        }

        fn save(&self, _credential: &HashedCredential) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn authenticator(store: Arc<dyn CredentialStore>) -> PinAuthenticator {
        PinAuthenticator::new(store, DEFAULT_PIN_LENGTH, Duration::from_secs(2))
    }

    #[test]
    fn test_hash_and_verify_pin() {
        let credential = HashedCredential::new("482913", "First pet?", "Rex").unwrap();

        assert!(credential.verify_pin("482913").unwrap());
        assert!(!credential.verify_pin("482914").unwrap());
        assert!(credential.pin_hash.starts_with("$argon2id$"));
        assert!(credential.recovery_answer_hash.starts_with("$argon2id$"));
        assert!(!credential.pin_hash.contains("482913"));
    }

    #[test]
    fn test_hash_is_different_each_time() {
        let first = HashedCredential::new("482913", "q", "a").unwrap();
        let second = HashedCredential::new("482913", "q", "a").unwrap();

        assert_ne!(first.pin_hash, second.pin_hash);
        assert!(first.verify_pin("482913").unwrap());
        assert!(second.verify_pin("482913").unwrap());
    }

    #[test]
    fn test_recovery_answer_is_normalized() {
        let credential = HashedCredential::new("482913", "First pet?", "  Rex ").unwrap();
        assert!(credential.verify_recovery_answer("rex").unwrap());
        assert!(credential.verify_recovery_answer("REX").unwrap());
        assert!(!credential.verify_recovery_answer("max").unwrap());
    }

    #[test]
    fn test_unparseable_hash_is_corrupt_not_mismatch() {
        let mut credential = HashedCredential::new("482913", "q", "a").unwrap();
        credential.pin_hash = "sha256:deadbeef".to_string();

        assert!(matches!(
            credential.verify_pin("482913"),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_validate_reports_corrupt_hash_as_unavailable() {
        let store = MemoryCredentialStore::new();
        let mut credential = HashedCredential::new("482913", "q", "a").unwrap();
        credential.pin_hash = "not a phc string".to_string();
        store.save(&credential).unwrap();

        let err = authenticator(Arc::new(store)).validate("482913").await.unwrap_err();
        assert!(matches!(err, AuthError::StoreUnavailable(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_normalize_pin() {
        assert_eq!(normalize_pin(" 482913 ", 6).unwrap(), "482913");
        assert!(matches!(
            normalize_pin("12345", 6),
            Err(AuthError::InvalidFormat { expected_len: 6 })
        ));
        assert!(normalize_pin("12a456", 6).is_err());
        assert!(normalize_pin("", 6).is_err());
        assert!(normalize_pin("１２３４５６", 6).is_err());
    }

    #[test]
    fn test_pin_strength() {
        assert_eq!(pin_strength("123456", 6), PinStrength::TooWeak);
        assert_eq!(pin_strength("987654", 6), PinStrength::TooWeak);
        assert_eq!(pin_strength("777777", 6), PinStrength::TooWeak);
        assert_eq!(pin_strength("121212", 6), PinStrength::Weak);
        assert_eq!(pin_strength("482913", 6), PinStrength::Strong);
        assert_eq!(pin_strength("4829", 6), PinStrength::Invalid);
    }

    #[tokio::test]
    async fn test_validate_accepts_and_rejects() {
        let auth = authenticator(Arc::new(MemoryCredentialStore::with_pin("482913").unwrap()));

        assert!(auth.validate("482913").await.unwrap());
        assert!(!auth.validate("000001").await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_format_never_reaches_store() {
        let store = Arc::new(CountingStore {
            inner: MemoryCredentialStore::with_pin("482913").unwrap(),
            loads: AtomicUsize::new(0),
        });
        let auth = authenticator(store.clone());

        let err = auth.validate("12345").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidFormat { expected_len: 6 }));
        assert_eq!(store.loads.load(Ordering::SeqCst), 0);

        auth.validate("482913").await.unwrap();
        assert_eq!(store.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_credential_is_store_unavailable() {
        let auth = authenticator(Arc::new(MemoryCredentialStore::new()));
        let err = auth.validate("482913").await.unwrap_err();
        assert!(matches!(err, AuthError::StoreUnavailable(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_slow_store_times_out() {
        let auth = PinAuthenticator::new(Arc::new(SlowStore), 6, Duration::from_millis(50));
        let err = auth.validate("482913").await.unwrap_err();
        assert!(matches!(err, AuthError::StoreUnavailable(StoreError::Timeout(_))));
    }

    #[test]
    fn test_file_store_round_trip() {
        let temp_dir = assert_fs::TempDir::new().unwrap();
        let store = FileCredentialStore::new(temp_dir.path().join("credential.json"));

        assert!(matches!(store.load(), Err(StoreError::NotFound)));

        let credential = HashedCredential::new("482913", "First pet?", "Rex").unwrap();
        store.save(&credential).unwrap();
        assert_eq!(store.load().unwrap(), credential);
    }

    #[test]
    fn test_file_store_reports_corruption() {
        use assert_fs::prelude::*;

        let temp_dir = assert_fs::TempDir::new().unwrap();
        let file = temp_dir.child("credential.json");
        file.write_str("{ not json").unwrap();

        let store = FileCredentialStore::new(file.path());
        assert!(matches!(store.load(), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_set_pin_rejects_weak_and_malformed() {
        let manager = CredentialManager::new(Arc::new(MemoryCredentialStore::new()), 6);

        assert!(matches!(
            manager.set_pin("123456", "q", "a"),
            Err(EnrollError::TooWeak)
        ));
        assert!(matches!(
            manager.set_pin("1234", "q", "a"),
            Err(EnrollError::InvalidFormat { expected_len: 6 })
        ));
        assert!(matches!(
            manager.set_pin("482913", "q", "   "),
            Err(EnrollError::EmptyRecoveryAnswer)
        ));
        assert!(!manager.has_pin());

        manager.set_pin("482913", "First pet?", "Rex").unwrap();
        assert!(manager.has_pin());
        assert_eq!(manager.recovery_question().unwrap(), "First pet?");
    }

    #[tokio::test]
    async fn test_reset_pin_with_answer() {
        let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
        let manager = CredentialManager::new(store.clone(), 6);
        manager.set_pin("482913", "First pet?", "Rex").unwrap();

        assert!(matches!(
            manager.reset_pin_with_answer("Max", "509172"),
            Err(EnrollError::RecoveryMismatch)
        ));

        manager.reset_pin_with_answer(" rex", "509172").unwrap();

        let auth = authenticator(store);
        assert!(auth.validate("509172").await.unwrap());
        assert!(!auth.validate("482913").await.unwrap());
    }
}
