// ABOUTME: Packs and unpacks the two-entry export archive
// ABOUTME: Zip container holding the encrypted dump and its detached signature

use crate::crypto::SignedCiphertext;
use crate::error::{ExportError, Result};
use crate::utils::owner_file_stem;
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

pub const CIPHERTEXT_SUFFIX: &str = "_account_export.sql.gpg";
pub const SIGNATURE_SUFFIX: &str = "_account_export.sql.asc";
pub const ARCHIVE_SUFFIX: &str = "_account_export.zip";

/// Largest entry accepted when extracting.
pub const MAX_ENTRY_SIZE: u64 = 64 * 1024 * 1024;

/// A sealed export paired with the owner stem its file names derive from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArchive {
    pub stem: String,
    pub sealed: SignedCiphertext,
}

impl ExportArchive {
    pub fn new(stem: &str, sealed: SignedCiphertext) -> Self {
        Self {
            stem: owner_file_stem(stem),
            sealed,
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}{}", self.stem, ARCHIVE_SUFFIX)
    }

    pub fn ciphertext_name(&self) -> String {
        format!("{}{}", self.stem, CIPHERTEXT_SUFFIX)
    }

    pub fn signature_name(&self) -> String {
        format!("{}{}", self.stem, SIGNATURE_SUFFIX)
    }

    /// Name for the decrypted dump written next to the signature copy.
    pub fn dump_name(&self) -> String {
        format!("{}_account_export.sql", self.stem)
    }

    /// Serialize to zip bytes. Timestamps and permissions are fixed so
    /// identical inputs give identical archives.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in [
            (self.ciphertext_name(), &self.sealed.ciphertext),
            (self.signature_name(), &self.sealed.signature),
        ] {
            writer
                .start_file(name, entry_options())
                .map_err(write_error)?;
            writer.write_all(data)?;
        }
        Ok(writer.finish().map_err(write_error)?.into_inner())
    }

    /// Locate the `.gpg`/`.asc` pair in zip bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        extract_with_limit(bytes, MAX_ENTRY_SIZE)
    }
}

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o600)
}

fn write_error(e: zip::result::ZipError) -> ExportError {
    ExportError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
}

fn malformed(context: &str, e: impl std::fmt::Display) -> ExportError {
    ExportError::MalformedArchive(format!("{}: {}", context, e))
}

/// Owner stem recovered from a ciphertext entry name.
fn stem_from_entry(name: &str) -> String {
    let stem = name
        .strip_suffix(CIPHERTEXT_SUFFIX)
        .or_else(|| name.strip_suffix(".sql.gpg"))
        .or_else(|| name.strip_suffix(".gpg"))
        .unwrap_or(name);
    owner_file_stem(stem)
}

fn read_entry<R: Read>(entry: R, declared: u64, name: &str, limit: u64) -> Result<Vec<u8>> {
    if declared > limit {
        return Err(ExportError::MalformedArchive(format!(
            "entry {} exceeds {} bytes",
            name, limit
        )));
    }
    let mut data = Vec::with_capacity(declared as usize);
    entry
        .take(limit + 1)
        .read_to_end(&mut data)
        .map_err(|e| malformed("unreadable entry", e))?;
    if data.len() as u64 > limit {
        return Err(ExportError::MalformedArchive(format!(
            "entry {} exceeds {} bytes",
            name, limit
        )));
    }
    Ok(data)
}

fn extract_with_limit(bytes: &[u8], limit: u64) -> Result<ExportArchive> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| malformed("unreadable container", e))?;

    let mut ciphertext: Option<(String, Vec<u8>)> = None;
    let mut signature: Option<Vec<u8>> = None;

    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .map_err(|e| malformed("unreadable container", e))?;
        let path = entry.name().to_string();
        let name = path.rsplit('/').next().unwrap_or_default().to_string();

        if entry.is_dir() {
            tracing::warn!("Ignoring non-file archive entry {}", path);
            continue;
        }
        let declared = entry.size();

        if name.ends_with(".gpg") {
            if ciphertext.is_some() {
                return Err(ExportError::MalformedArchive(
                    "more than one .gpg entry".into(),
                ));
            }
            let data = read_entry(entry, declared, &name, limit)?;
            ciphertext = Some((stem_from_entry(&name), data));
        } else if name.ends_with(".asc") {
            if signature.is_some() {
                return Err(ExportError::MalformedArchive(
                    "more than one .asc entry".into(),
                ));
            }
            signature = Some(read_entry(entry, declared, &name, limit)?);
        } else {
            tracing::warn!("Ignoring unexpected archive entry {}", path);
        }
    }

    match (ciphertext, signature) {
        (Some((stem, ciphertext)), Some(signature)) => Ok(ExportArchive {
            stem,
            sealed: SignedCiphertext {
                ciphertext,
                signature,
            },
        }),
        (None, _) => Err(ExportError::MalformedArchive(
            "missing .gpg ciphertext entry".into(),
        )),
        (_, None) => Err(ExportError::MalformedArchive(
            "missing .asc signature entry".into(),
        )),
    }
}
