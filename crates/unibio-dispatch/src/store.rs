//! Secure key-value storage for lockout state
//!
//! Lockout timestamps must survive process restarts. The file store is
//! encrypted at rest using ChaCha20-Poly1305 with a key derived from a
//! passphrase via Argon2id.
//!
//! # Storage Format
//!
//! - 4-byte magic `UBLK`
//! - 1-byte format version
//! - 32-byte Argon2 salt
//! - 12-byte nonce
//! - Encrypted JSON map of key to value, with the 16-byte tag appended

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{DispatchError, Result};

const MAGIC: &[u8; 4] = b"UBLK";
const FORMAT_VERSION: u8 = 1;
const SALT_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;
const HEADER_SIZE: usize = MAGIC.len() + 1 + SALT_SIZE;

/// Process-wide integer key-value store.
///
/// Implementations must be safe for concurrent use. Missing keys read as 0.
pub trait SecureStore: Send + Sync {
    fn get(&self, key: &str) -> Result<i64>;

    fn put(&self, key: &str, value: i64) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// All stored entries, sorted by key
    fn entries(&self) -> Result<Vec<(String, i64)>>;
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| DispatchError::Store("store lock poisoned".to_string()))
}

/// Volatile store, for tests and hosts without persistent storage
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, i64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecureStore for MemoryStore {
    fn get(&self, key: &str) -> Result<i64> {
        Ok(lock(&self.entries)?.get(key).copied().unwrap_or(0))
    }

    fn put(&self, key: &str, value: i64) -> Result<()> {
        lock(&self.entries)?.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        lock(&self.entries)?.remove(key);
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(String, i64)>> {
        Ok(lock(&self.entries)?
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect())
    }
}

/// Encrypted file-backed store.
///
/// The whole map is cached in memory and rewritten atomically on every
/// mutation. The map is tiny (one or two entries per module) so this keeps
/// the on-disk state consistent without a journal.
pub struct EncryptedFileStore {
    path: PathBuf,
    salt: [u8; SALT_SIZE],
    key: Zeroizing<[u8; 32]>,
    entries: Mutex<BTreeMap<String, i64>>,
}

impl EncryptedFileStore {
    /// Open the store at `path`, creating an empty one if it does not exist
    pub fn open(path: impl Into<PathBuf>, passphrase: &str) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        if !path.exists() {
            let mut salt = [0u8; SALT_SIZE];
            rand::rngs::OsRng.fill_bytes(&mut salt);
            let key = derive_key(passphrase, &salt)?;
            let store = Self {
                path,
                salt,
                key,
                entries: Mutex::new(BTreeMap::new()),
            };
            store.persist(&BTreeMap::new())?;
            debug!("Created lockout store at {:?}", store.path);
            return Ok(store);
        }

        let data = std::fs::read(&path)?;
        if data.len() < HEADER_SIZE + NONCE_SIZE || &data[..MAGIC.len()] != MAGIC {
            return Err(DispatchError::Store("Not a lockout store file".to_string()));
        }
        if data[MAGIC.len()] != FORMAT_VERSION {
            return Err(DispatchError::Store(format!(
                "Unsupported store version {}",
                data[MAGIC.len()]
            )));
        }

        let mut salt = [0u8; SALT_SIZE];
        salt.copy_from_slice(&data[MAGIC.len() + 1..HEADER_SIZE]);
        let key = derive_key(passphrase, &salt)?;

        let nonce = Nonce::from_slice(&data[HEADER_SIZE..HEADER_SIZE + NONCE_SIZE]);
        let ciphertext = &data[HEADER_SIZE + NONCE_SIZE..];

        let cipher = ChaCha20Poly1305::new_from_slice(&key[..])
            .map_err(|e| DispatchError::Crypto(format!("Invalid key: {}", e)))?;
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(nonce, ciphertext)
                .map_err(|_| DispatchError::DecryptionFailed)?,
        );

        let entries: BTreeMap<String, i64> = serde_json::from_slice(&plaintext)?;
        debug!("Opened lockout store at {:?} ({} entries)", path, entries.len());

        Ok(Self {
            path,
            salt,
            key,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, i64>) -> Result<()> {
        let plaintext = Zeroizing::new(serde_json::to_vec(entries)?);

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let cipher = ChaCha20Poly1305::new_from_slice(&self.key[..])
            .map_err(|e| DispatchError::Crypto(format!("Invalid key: {}", e)))?;
        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_slice())
            .map_err(|e| DispatchError::Crypto(format!("Encryption failed: {}", e)))?;

        let mut data = Vec::with_capacity(HEADER_SIZE + NONCE_SIZE + ciphertext.len());
        data.extend_from_slice(MAGIC);
        data.push(FORMAT_VERSION);
        data.extend_from_slice(&self.salt);
        data.extend_from_slice(&nonce_bytes);
        data.extend_from_slice(&ciphertext);

        // Write atomically
        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, &data)?;
        std::fs::rename(&temp_path, &self.path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}

impl SecureStore for EncryptedFileStore {
    fn get(&self, key: &str) -> Result<i64> {
        Ok(lock(&self.entries)?.get(key).copied().unwrap_or(0))
    }

    fn put(&self, key: &str, value: i64) -> Result<()> {
        let mut entries = lock(&self.entries)?;
        if entries.get(key) == Some(&value) {
            return Ok(());
        }
        entries.insert(key.to_string(), value);
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = lock(&self.entries)?;
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(String, i64)>> {
        Ok(lock(&self.entries)?
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect())
    }
}

/// Derive the store key from a passphrase with Argon2id
fn derive_key(passphrase: &str, salt: &[u8; SALT_SIZE]) -> Result<Zeroizing<[u8; 32]>> {
    use argon2::Argon2;

    let mut key = Zeroizing::new([0u8; 32]);
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key[..])
        .map_err(|e| DispatchError::Crypto(format!("Key derivation failed: {}", e)))?;
    Ok(key)
}
