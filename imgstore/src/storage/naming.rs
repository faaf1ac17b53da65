//! Storage name generation for uploaded files.
//!
//! A storage name is 12 bytes from the operating system CSPRNG rendered as 24 lowercase hex
//! characters, followed by the extension of the name the client sent:
//!
//! ```text
//! photo.jpeg  ->  3f9a0c61d2e84b7a95c0e1f2.jpeg
//! noext       ->  3f9a0c61d2e84b7a95c0e1f2
//! ```
//!
//! Uniqueness rests on the 96 bits of entropy alone; nothing here checks the store.

use rand::{TryRngCore, rngs::OsRng};
use thiserror::Error as ThisError;

/// Number of random bytes in every storage name.
pub const RANDOM_BYTES: usize = 12;

/// Length of the hex prefix of every storage name.
pub const RANDOM_HEX_LEN: usize = RANDOM_BYTES * 2;

#[derive(ThisError, Debug)]
pub enum EntropyError {
    /// The OS random source refused to produce bytes
    #[error("system entropy source failed: {0}")]
    Source(String),

    /// The blocking task that reads the random source was cancelled or panicked
    #[error("entropy task did not complete: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Extension of an uploaded file's original name, including the leading `.`.
///
/// Directory components are dropped first (clients occasionally send full paths), then
/// everything from the last `.` onwards is returned. Names without a `.` have no extension.
/// A leading `.` is not special: `.bashrc` yields `.bashrc`.
pub fn extension_of(original_name: &str) -> &str {
    let base = original_name.rsplit(['/', '\\']).next().unwrap_or(original_name);
    match base.rfind('.') {
        Some(idx) => &base[idx..],
        None => "",
    }
}

/// Read [`RANDOM_BYTES`] from the OS random source on the blocking pool.
pub async fn random_bytes() -> Result<[u8; RANDOM_BYTES], EntropyError> {
    tokio::task::spawn_blocking(|| {
        let mut bytes = [0u8; RANDOM_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| EntropyError::Source(e.to_string()))?;
        Ok(bytes)
    })
    .await?
}

/// Generate a fresh storage name for a file originally called `original_name`.
pub async fn generate_storage_name(original_name: &str) -> Result<String, EntropyError> {
    let bytes = random_bytes().await?;
    Ok(format!("{}{}", hex::encode(bytes), extension_of(original_name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn assert_hex_prefix(name: &str) {
        let prefix = &name[..RANDOM_HEX_LEN];
        assert!(
            prefix.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)),
            "not lowercase hex: {prefix}"
        );
    }

    #[test]
    fn test_extension_of_simple_name() {
        assert_eq!(extension_of("photo.jpeg"), ".jpeg");
        assert_eq!(extension_of("report.PDF"), ".PDF");
    }

    #[test]
    fn test_extension_of_uses_last_dot() {
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of("trailing."), ".");
    }

    #[test]
    fn test_extension_of_without_dot() {
        assert_eq!(extension_of("noext"), "");
        assert_eq!(extension_of(""), "");
    }

    #[test]
    fn test_extension_of_ignores_directories() {
        assert_eq!(extension_of("some.dir/file"), "");
        assert_eq!(extension_of("C:\\Users\\me\\cat.png"), ".png");
        assert_eq!(extension_of("../../etc/passwd"), "");
    }

    #[test]
    fn test_extension_of_dotfile() {
        // leading dots count like any other dot
        assert_eq!(extension_of(".bashrc"), ".bashrc");
        assert_eq!(extension_of(".env.local"), ".local");
        assert_eq!(extension_of(".."), ".");
        assert_eq!(extension_of("uploads/.."), ".");
    }

    #[tokio::test]
    async fn test_generate_storage_name_with_extension() {
        let name = generate_storage_name("photo.jpeg").await.unwrap();
        assert_eq!(name.len(), RANDOM_HEX_LEN + ".jpeg".len());
        assert!(name.ends_with(".jpeg"));
        assert_hex_prefix(&name);
    }

    #[tokio::test]
    async fn test_generate_storage_name_without_extension() {
        let name = generate_storage_name("noext").await.unwrap();
        assert_eq!(name.len(), RANDOM_HEX_LEN);
        assert_hex_prefix(&name);
    }

    #[tokio::test]
    async fn test_generate_storage_name_empty_original() {
        let name = generate_storage_name("").await.unwrap();
        assert_eq!(name.len(), RANDOM_HEX_LEN);
        assert_hex_prefix(&name);
    }

    #[tokio::test]
    async fn test_generated_names_are_distinct() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let name = generate_storage_name("a.png").await.unwrap();
            assert!(seen.insert(name), "storage name generated twice");
        }
        assert_eq!(seen.len(), 10_000);
    }
}
