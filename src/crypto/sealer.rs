//! Sealing archives for storage at rest
//!
//! A sealed artifact is a single JSON header line followed by
//! length-prefixed AES-256-GCM frames:
//!
//! ```text
//! {"format":"tarseal-sealed","version":1,...}\n
//! [u32 BE len][frame 0] [u32 BE len][frame 1] ... [final frame]
//! ```
//!
//! Output is always written to a temp file next to the destination and
//! renamed into place once complete, so a failed seal or unseal never leaves
//! a partial file at the destination path.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::error::{BackupError, BackupResult};
use crate::storage::{remove_if_exists, with_suffix};

use super::encryption::{FrameCipher, NoncePrefix, TAG_SIZE};
use super::key_derivation::{derive_key, KdfSettings, KeyDerivationParams};
use super::SecureString;

/// Suffix appended to an archive name once sealed
pub const SEALED_SUFFIX: &str = ".enc";

/// Format tag at the start of every sealed artifact
pub const SEAL_FORMAT: &str = "tarseal-sealed";

/// Cipher identity recorded in the header
pub const SEAL_ALGORITHM: &str = "aes-256-gcm+argon2id";

const SEAL_VERSION: u8 = 1;
const DEFAULT_CHUNK_SIZE: u32 = 64 * 1024;
const MAX_CHUNK_SIZE: u32 = 16 * 1024 * 1024;
const MAX_HEADER_LEN: u64 = 4096;

/// Header line of a sealed artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealHeader {
    /// Must be [`SEAL_FORMAT`]; kept first so it doubles as a magic prefix
    pub format: String,
    pub version: u8,
    pub algorithm: String,
    pub kdf: KeyDerivationParams,
    /// Base64 nonce prefix shared by all frames
    pub nonce_prefix: String,
    /// Plaintext bytes per frame
    pub chunk_size: u32,
}

/// Encrypts archives to their sealed form and back
#[derive(Debug, Clone)]
pub struct Sealer {
    kdf: KdfSettings,
    chunk_size: u32,
}

impl Sealer {
    /// Create a sealer that derives keys with the given Argon2 costs
    pub fn new(kdf: KdfSettings) -> Self {
        Self {
            kdf,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Override the frame size (small frames are useful in tests)
    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size.clamp(1, MAX_CHUNK_SIZE);
        self
    }

    /// Path a plaintext archive will have once sealed
    pub fn sealed_path(plaintext: &Path) -> PathBuf {
        with_suffix(plaintext, SEALED_SUFFIX)
    }

    /// Encrypt `plaintext` to `<plaintext>.enc`, then delete the plaintext.
    ///
    /// On any failure the plaintext is left untouched and no sealed file
    /// exists.
    pub fn seal(&self, plaintext: &Path, passphrase: &SecureString) -> BackupResult<PathBuf> {
        let sealed = Self::sealed_path(plaintext);

        if !plaintext.is_file() {
            return Err(BackupError::missing_plaintext(plaintext));
        }
        if passphrase.is_empty() {
            return Err(BackupError::encryption(plaintext, "passphrase is empty"));
        }
        if sealed.exists() {
            return Err(BackupError::encryption(
                plaintext,
                format!("refusing to overwrite {}", sealed.display()),
            ));
        }

        let temp = with_suffix(&sealed, ".tmp");
        if let Err(message) = self.write_sealed(plaintext, &temp, passphrase) {
            let _ = remove_if_exists(&temp);
            return Err(BackupError::encryption(plaintext, message));
        }

        if let Err(e) = fs::rename(&temp, &sealed) {
            let _ = remove_if_exists(&temp);
            return Err(BackupError::encryption(
                plaintext,
                format!("Failed to move sealed archive into place: {}", e),
            ));
        }

        // Exactly one of the two may exist at rest
        if let Err(e) = fs::remove_file(plaintext) {
            let _ = remove_if_exists(&sealed);
            return Err(BackupError::encryption(
                plaintext,
                format!("Failed to remove plaintext after sealing: {}", e),
            ));
        }

        info!(sealed = %sealed.display(), "archive sealed");
        Ok(sealed)
    }

    fn write_sealed(&self, plaintext: &Path, temp: &Path, passphrase: &SecureString) -> Result<(), String> {
        let params = KeyDerivationParams::generate(&self.kdf);
        let key = derive_key(passphrase, &params)?;
        let prefix = NoncePrefix::generate();
        let cipher = FrameCipher::new(&key, prefix)?;

        let header = SealHeader {
            format: SEAL_FORMAT.to_string(),
            version: SEAL_VERSION,
            algorithm: SEAL_ALGORITHM.to_string(),
            kdf: params,
            nonce_prefix: prefix.to_base64(),
            chunk_size: self.chunk_size,
        };

        let input = File::open(plaintext).map_err(|e| format!("Failed to open plaintext: {}", e))?;
        let mut reader = BufReader::new(input);

        let output = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(temp)
            .map_err(|e| format!("Failed to create {}: {}", temp.display(), e))?;
        let mut writer = BufWriter::new(output);

        let header_line =
            serde_json::to_string(&header).map_err(|e| format!("Failed to write header: {}", e))?;
        writer
            .write_all(header_line.as_bytes())
            .and_then(|_| writer.write_all(b"\n"))
            .map_err(|e| format!("Failed to write header: {}", e))?;

        let chunk_size = self.chunk_size as usize;
        let mut current = read_chunk(&mut reader, chunk_size)?;
        let mut index: u32 = 0;
        loop {
            // Look ahead one chunk to know whether this frame is the last
            let next = if current.len() == chunk_size {
                read_chunk(&mut reader, chunk_size)?
            } else {
                Zeroizing::new(Vec::new())
            };
            let last = next.is_empty();

            let frame = cipher.encrypt_frame(index, last, &current)?;
            writer
                .write_all(&(frame.len() as u32).to_be_bytes())
                .and_then(|_| writer.write_all(&frame))
                .map_err(|e| format!("Failed to write sealed archive: {}", e))?;

            if last {
                break;
            }
            current = next;
            index = index
                .checked_add(1)
                .ok_or_else(|| "archive too large to seal".to_string())?;
        }

        writer
            .flush()
            .map_err(|e| format!("Failed to flush sealed archive: {}", e))?;
        writer
            .get_ref()
            .sync_all()
            .map_err(|e| format!("Failed to sync sealed archive: {}", e))?;

        debug!(frames = index + 1, "sealed frames written");
        Ok(())
    }

    /// Decrypt `sealed` into `output`.
    ///
    /// `output` only appears once every frame has authenticated; on failure
    /// no partial plaintext is left behind.
    pub fn unseal(&self, sealed: &Path, passphrase: &SecureString, output: &Path) -> BackupResult<()> {
        let temp = with_suffix(output, ".tmp");

        if let Err(message) = Self::write_unsealed(sealed, &temp, passphrase) {
            if let Err(e) = remove_if_exists(&temp) {
                warn!(path = %temp.display(), error = %e, "failed to remove partial plaintext");
            }
            return Err(BackupError::decryption(sealed, message));
        }

        if let Err(e) = fs::rename(&temp, output) {
            let _ = remove_if_exists(&temp);
            return Err(BackupError::decryption(
                sealed,
                format!("Failed to move plaintext into place: {}", e),
            ));
        }

        debug!(sealed = %sealed.display(), output = %output.display(), "archive unsealed");
        Ok(())
    }

    fn write_unsealed(sealed: &Path, temp: &Path, passphrase: &SecureString) -> Result<(), String> {
        let input = File::open(sealed).map_err(|e| format!("Failed to open sealed archive: {}", e))?;
        let mut reader = BufReader::new(input);

        let header = read_header(&mut reader)?;
        let key = derive_key(passphrase, &header.kdf)?;
        let prefix = NoncePrefix::from_base64(&header.nonce_prefix)?;
        let cipher = FrameCipher::new(&key, prefix)?;
        let max_frame = header.chunk_size as usize + TAG_SIZE;

        let output = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(temp)
            .map_err(|e| format!("Failed to create {}: {}", temp.display(), e))?;
        let mut writer = BufWriter::new(output);

        let mut index: u32 = 0;
        loop {
            let mut len_bytes = [0u8; 4];
            reader.read_exact(&mut len_bytes).map_err(|e| match e.kind() {
                ErrorKind::UnexpectedEof => "sealed archive is truncated".to_string(),
                _ => format!("Failed to read sealed archive: {}", e),
            })?;
            let len = u32::from_be_bytes(len_bytes) as usize;
            if len < TAG_SIZE || len > max_frame {
                return Err(format!("corrupted frame length {} at frame {}", len, index));
            }

            let mut frame = vec![0u8; len];
            reader.read_exact(&mut frame).map_err(|e| match e.kind() {
                ErrorKind::UnexpectedEof => "sealed archive is truncated".to_string(),
                _ => format!("Failed to read sealed archive: {}", e),
            })?;

            let last = reader
                .fill_buf()
                .map_err(|e| format!("Failed to read sealed archive: {}", e))?
                .is_empty();

            let plain = Zeroizing::new(cipher.decrypt_frame(index, last, &frame)?);
            writer
                .write_all(&plain)
                .map_err(|e| format!("Failed to write plaintext: {}", e))?;

            if last {
                break;
            }
            index = index
                .checked_add(1)
                .ok_or_else(|| "too many frames".to_string())?;
        }

        writer
            .flush()
            .map_err(|e| format!("Failed to flush plaintext: {}", e))?;
        Ok(())
    }

    /// Read and validate the header of a sealed artifact
    pub fn read_header(sealed: &Path) -> BackupResult<SealHeader> {
        let file = File::open(sealed)
            .map_err(|e| BackupError::decryption(sealed, format!("Failed to open: {}", e)))?;
        read_header(&mut BufReader::new(file)).map_err(|message| BackupError::decryption(sealed, message))
    }
}

/// Whether `path` holds a sealed artifact, judged by its header
pub fn is_sealed(path: &Path) -> BackupResult<bool> {
    let file = File::open(path)
        .map_err(|e| BackupError::Io(format!("Failed to open {}: {}", path.display(), e)))?;

    let magic = format!("{{\"format\":\"{}\"", SEAL_FORMAT);
    let mut prefix = Vec::with_capacity(magic.len());
    file.take(magic.len() as u64)
        .read_to_end(&mut prefix)
        .map_err(|e| BackupError::Io(format!("Failed to read {}: {}", path.display(), e)))?;

    Ok(prefix == magic.as_bytes())
}

fn read_header<R: BufRead>(reader: &mut R) -> Result<SealHeader, String> {
    let mut line = Vec::new();
    reader
        .take(MAX_HEADER_LEN)
        .read_until(b'\n', &mut line)
        .map_err(|e| format!("Failed to read header: {}", e))?;

    if line.last() != Some(&b'\n') {
        return Err("not a sealed archive (missing header)".to_string());
    }
    line.pop();

    let header: SealHeader =
        serde_json::from_slice(&line).map_err(|e| format!("not a sealed archive: {}", e))?;

    if header.format != SEAL_FORMAT {
        return Err(format!("unknown format '{}'", header.format));
    }
    if header.version != SEAL_VERSION {
        return Err(format!("unsupported sealed format version {}", header.version));
    }
    if header.algorithm != SEAL_ALGORITHM {
        return Err(format!("unsupported algorithm '{}'", header.algorithm));
    }
    if header.chunk_size == 0 || header.chunk_size > MAX_CHUNK_SIZE {
        return Err(format!("invalid chunk size {}", header.chunk_size));
    }
    header.kdf.check_bounds()?;

    Ok(header)
}

fn read_chunk<R: Read>(reader: &mut R, chunk_size: usize) -> Result<Zeroizing<Vec<u8>>, String> {
    let mut chunk = Zeroizing::new(Vec::with_capacity(chunk_size));
    reader
        .take(chunk_size as u64)
        .read_to_end(&mut chunk)
        .map_err(|e| format!("Failed to read plaintext: {}", e))?;
    Ok(chunk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key_derivation::test_settings;
    use tempfile::TempDir;

    fn create_test_sealer() -> (Sealer, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        (Sealer::new(test_settings()).with_chunk_size(1024), temp_dir)
    }

    fn passphrase() -> SecureString {
        SecureString::new("correct horse battery staple")
    }

    fn write_plaintext(dir: &Path, len: usize) -> (PathBuf, Vec<u8>) {
        let path = dir.join("backup_full_20250101_120000.tar.gz");
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &data).unwrap();
        (path, data)
    }

    #[test]
    fn test_seal_removes_plaintext() {
        let (sealer, temp) = create_test_sealer();
        let (plain, _) = write_plaintext(temp.path(), 5000);

        let sealed = sealer.seal(&plain, &passphrase()).unwrap();

        assert!(!plain.exists());
        assert!(sealed.exists());
        assert!(sealed.to_string_lossy().ends_with(".tar.gz.enc"));
        assert!(is_sealed(&sealed).unwrap());
    }

    #[test]
    fn test_seal_unseal_round_trip() {
        let (sealer, temp) = create_test_sealer();

        // Exact multiple of the chunk size, partial chunk, and empty input
        for len in [0usize, 100, 1024, 4096, 5000] {
            let (plain, data) = write_plaintext(temp.path(), len);
            let sealed = sealer.seal(&plain, &passphrase()).unwrap();

            let out = temp.path().join("restored.tar.gz");
            sealer.unseal(&sealed, &passphrase(), &out).unwrap();
            assert_eq!(fs::read(&out).unwrap(), data, "length {}", len);

            fs::remove_file(&out).unwrap();
            fs::remove_file(&sealed).unwrap();
        }
    }

    #[test]
    fn test_failed_seal_keeps_plaintext() {
        let (sealer, temp) = create_test_sealer();
        let (plain, data) = write_plaintext(temp.path(), 100);

        // A directory squatting on the temp path makes the write fail
        let temp_path = with_suffix(&Sealer::sealed_path(&plain), ".tmp");
        fs::create_dir(&temp_path).unwrap();

        let result = sealer.seal(&plain, &passphrase());
        assert!(matches!(result, Err(BackupError::Encryption { .. })));
        assert_eq!(fs::read(&plain).unwrap(), data);
        assert!(!Sealer::sealed_path(&plain).exists());
    }

    #[test]
    fn test_seal_refuses_to_overwrite() {
        let (sealer, temp) = create_test_sealer();
        let (plain, _) = write_plaintext(temp.path(), 100);
        fs::write(Sealer::sealed_path(&plain), b"previous good backup").unwrap();

        assert!(sealer.seal(&plain, &passphrase()).is_err());
        assert!(plain.exists());
        assert_eq!(
            fs::read(Sealer::sealed_path(&plain)).unwrap(),
            b"previous good backup"
        );
    }

    #[test]
    fn test_seal_missing_plaintext() {
        let (sealer, temp) = create_test_sealer();
        let result = sealer.seal(&temp.path().join("missing.tar.gz"), &passphrase());
        assert!(matches!(
            result,
            Err(BackupError::Encryption {
                retained: false,
                ..
            })
        ));
        let err = result.unwrap_err();
        assert!(!err.to_string().contains("remains"));
        assert!(err.leftover().is_none());
    }

    #[test]
    fn test_wrong_passphrase_leaves_no_output() {
        let (sealer, temp) = create_test_sealer();
        let (plain, _) = write_plaintext(temp.path(), 3000);
        let sealed = sealer.seal(&plain, &passphrase()).unwrap();

        let out = temp.path().join("restored.tar.gz");
        let result = sealer.unseal(&sealed, &SecureString::new("wrong"), &out);

        assert!(matches!(result, Err(BackupError::Decryption { .. })));
        assert!(!out.exists());
        assert!(!with_suffix(&out, ".tmp").exists());
    }

    #[test]
    fn test_truncated_archive_detected() {
        let (sealer, temp) = create_test_sealer();
        let (plain, _) = write_plaintext(temp.path(), 4096);
        let sealed = sealer.seal(&plain, &passphrase()).unwrap();

        // Drop the final frame exactly at a frame boundary
        let bytes = fs::read(&sealed).unwrap();
        let frame_len = 4 + 1024 + TAG_SIZE;
        fs::write(&sealed, &bytes[..bytes.len() - frame_len]).unwrap();

        let out = temp.path().join("restored.tar.gz");
        assert!(sealer.unseal(&sealed, &passphrase(), &out).is_err());
        assert!(!out.exists());

        // And mid-frame
        fs::write(&sealed, &bytes[..bytes.len() - 10]).unwrap();
        assert!(sealer.unseal(&sealed, &passphrase(), &out).is_err());
        assert!(!out.exists());
    }

    #[test]
    fn test_appended_data_detected() {
        let (sealer, temp) = create_test_sealer();
        let (plain, _) = write_plaintext(temp.path(), 100);
        let sealed = sealer.seal(&plain, &passphrase()).unwrap();

        let mut bytes = fs::read(&sealed).unwrap();
        bytes.extend_from_slice(&[0, 0, 0, 20]);
        bytes.extend_from_slice(&[0u8; 20]);
        fs::write(&sealed, &bytes).unwrap();

        let out = temp.path().join("restored.tar.gz");
        assert!(sealer.unseal(&sealed, &passphrase(), &out).is_err());
        assert!(!out.exists());
    }

    #[test]
    fn test_plain_file_is_not_sealed() {
        let (sealer, temp) = create_test_sealer();
        let (plain, _) = write_plaintext(temp.path(), 100);
        assert!(!is_sealed(&plain).unwrap());

        let out = temp.path().join("out");
        let result = sealer.unseal(&plain, &passphrase(), &out);
        assert!(matches!(result, Err(BackupError::Decryption { .. })));
    }

    #[test]
    fn test_tampered_header_rejected() {
        let (sealer, temp) = create_test_sealer();
        let (plain, _) = write_plaintext(temp.path(), 3000);
        let sealed = sealer.seal(&plain, &passphrase()).unwrap();
        let bytes = fs::read(&sealed).unwrap();
        let out = temp.path().join("restored.tar.gz");

        let header_end = bytes.iter().position(|&b| b == b'\n').unwrap();
        let header = String::from_utf8(bytes[..header_end].to_vec()).unwrap();

        for (field, value) in [
            ("\"memory_cost\":256", "\"memory_cost\":4000000000"),
            ("\"time_cost\":1", "\"time_cost\":4000000000"),
            ("\"parallelism\":1", "\"parallelism\":4000000"),
            ("\"chunk_size\":1024", "\"chunk_size\":4000000000"),
        ] {
            assert!(header.contains(field), "header lacks {}", field);
            let mut tampered = header.replace(field, value).into_bytes();
            tampered.extend_from_slice(&bytes[header_end..]);
            fs::write(&sealed, &tampered).unwrap();

            let result = sealer.unseal(&sealed, &passphrase(), &out);
            assert!(
                matches!(result, Err(BackupError::Decryption { .. })),
                "{} was accepted",
                value
            );
            assert!(!out.exists());
            assert!(Sealer::read_header(&sealed).is_err());
        }
    }

    #[test]
    fn test_header_records_kdf_params() {
        let (sealer, temp) = create_test_sealer();
        let (plain, _) = write_plaintext(temp.path(), 10);
        let sealed = sealer.seal(&plain, &passphrase()).unwrap();

        let header = Sealer::read_header(&sealed).unwrap();
        assert_eq!(header.format, SEAL_FORMAT);
        assert_eq!(header.algorithm, SEAL_ALGORITHM);
        assert_eq!(header.kdf.memory_cost, test_settings().memory_cost);
        assert_eq!(header.chunk_size, 1024);
    }
}
