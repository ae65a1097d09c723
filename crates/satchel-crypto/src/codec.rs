//! Streaming encryption of file artifacts
//!
//! Plaintext is streamed through AES-256-CBC with PKCS#7 padding into
//! a fresh artifact on scratch storage. The codec never overwrites an
//! existing artifact, and any failure mid-stream removes the partial
//! output instead of leaving truncated ciphertext or plaintext behind.

use crate::keys::{derive_key, CipherKey, FileSecret, Iv, KdfParams, Salt};
use crate::{CryptoError, Result};
use aes::cipher::{generic_array::GenericArray, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Cipher block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// Streaming chunk size, kept block-aligned
const CHUNK_SIZE: usize = 64 * 1024;

/// An encrypted artifact and the material needed to open it
///
/// The secret is exclusively owned by the file record holding this
/// value; it is never logged and the Debug impl redacts it.
#[derive(Clone)]
pub struct SealedArtifact {
    /// Path of the ciphertext on scratch storage
    pub path: PathBuf,
    /// IV paired with this ciphertext
    pub iv: Iv,
    /// Per-record KDF salt
    pub salt: Salt,
    /// Per-record secret the cipher key is derived from
    pub secret: FileSecret,
}

impl std::fmt::Debug for SealedArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedArtifact")
            .field("path", &self.path)
            .field("iv", &self.iv)
            .field("salt", &self.salt)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Encrypts plaintext streams into scratch artifacts and back
pub struct CipherCodec {
    scratch_dir: PathBuf,
    kdf: KdfParams,
}

impl CipherCodec {
    /// Create a codec writing artifacts under `scratch_dir`
    pub fn new(scratch_dir: impl Into<PathBuf>, kdf: KdfParams) -> Result<Self> {
        let scratch_dir = scratch_dir.into();
        fs::create_dir_all(&scratch_dir)?;
        Ok(Self { scratch_dir, kdf })
    }

    /// The directory artifacts are written to
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Encrypt a plaintext stream into a new ciphertext artifact
    ///
    /// Generates fresh secret, salt, and IV, derives the cipher key,
    /// and streams the source through the cipher. On any failure the
    /// partial artifact is removed.
    pub fn encrypt(&self, plaintext: impl Read) -> Result<SealedArtifact> {
        let secret = FileSecret::generate();
        let salt = Salt::generate();
        let iv = Iv::generate();
        let key = derive_key(&secret, &salt, &self.kdf)?;

        let path = self.scratch_dir.join(format!("{}.enc", Uuid::new_v4()));
        if let Err(e) = encrypt_stream(&key, &iv, plaintext, &path) {
            let _ = fs::remove_file(&path);
            return Err(e);
        }

        Ok(SealedArtifact {
            path,
            iv,
            salt,
            secret,
        })
    }

    /// Decrypt a sealed artifact into a new temporary plaintext file
    ///
    /// Re-derives the key from the stored `(secret, salt)` pair and
    /// reconstructs the cipher stream with the stored IV. Truncated or
    /// corrupt ciphertext fails the whole operation; a partial output
    /// file is never left behind.
    pub fn decrypt(&self, sealed: &SealedArtifact) -> Result<PathBuf> {
        let key = derive_key(&sealed.secret, &sealed.salt, &self.kdf)?;

        let path = self.scratch_dir.join(format!("{}.dec", Uuid::new_v4()));
        if let Err(e) = decrypt_stream(&key, &sealed.iv, &sealed.path, &path) {
            let _ = fs::remove_file(&path);
            return Err(e);
        }

        Ok(path)
    }
}

fn encrypt_blocks(cipher: &mut Aes256CbcEnc, data: &mut [u8]) {
    for block in data.chunks_exact_mut(BLOCK_SIZE) {
        cipher.encrypt_block_mut(GenericArray::from_mut_slice(block));
    }
}

fn encrypt_stream(key: &CipherKey, iv: &Iv, mut plaintext: impl Read, dst: &Path) -> Result<()> {
    let mut cipher = Aes256CbcEnc::new(key.as_bytes().into(), iv.as_bytes().into());

    // create_new: a fresh artifact path must never clobber a live one
    let out = File::options().write(true).create_new(true).open(dst)?;
    let mut writer = BufWriter::new(out);

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut filled = 0usize;
    loop {
        let n = plaintext.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
        if filled == buf.len() {
            encrypt_blocks(&mut cipher, &mut buf[..filled]);
            writer.write_all(&buf[..filled])?;
            filled = 0;
        }
    }

    // PKCS#7: always append padding, a full block when already aligned
    let pad = BLOCK_SIZE - (filled % BLOCK_SIZE);
    for slot in &mut buf[filled..filled + pad] {
        *slot = pad as u8;
    }
    filled += pad;
    encrypt_blocks(&mut cipher, &mut buf[..filled]);
    writer.write_all(&buf[..filled])?;
    writer.flush()?;
    Ok(())
}

fn decrypt_stream(key: &CipherKey, iv: &Iv, src: &Path, dst: &Path) -> Result<()> {
    let mut cipher = Aes256CbcDec::new(key.as_bytes().into(), iv.as_bytes().into());

    let mut reader = BufReader::new(File::open(src)?);
    let out = File::options().write(true).create_new(true).open(dst)?;
    let mut writer = BufWriter::new(out);

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut filled = 0usize;
    // The final block carries padding, so each decrypted block is held
    // back until the next one proves it is not the last.
    let mut held: Option<[u8; BLOCK_SIZE]> = None;
    loop {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
        let complete = filled - filled % BLOCK_SIZE;
        for block in buf[..complete].chunks_exact_mut(BLOCK_SIZE) {
            cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
            let mut decrypted = [0u8; BLOCK_SIZE];
            decrypted.copy_from_slice(block);
            if let Some(prev) = held.replace(decrypted) {
                writer.write_all(&prev)?;
            }
        }
        buf.copy_within(complete..filled, 0);
        filled -= complete;
    }

    if filled != 0 {
        return Err(CryptoError::InvalidCiphertext(format!(
            "length not a multiple of the {}-byte block size",
            BLOCK_SIZE
        )));
    }
    let last = held.ok_or_else(|| CryptoError::InvalidCiphertext("empty ciphertext".into()))?;

    let pad = last[BLOCK_SIZE - 1] as usize;
    if pad == 0 || pad > BLOCK_SIZE || last[BLOCK_SIZE - pad..].iter().any(|&b| b != pad as u8) {
        return Err(CryptoError::Decryption("invalid padding".into()));
    }
    writer.write_all(&last[..BLOCK_SIZE - pad])?;
    writer.flush()?;
    Ok(())
}
