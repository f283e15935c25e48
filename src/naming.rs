//! Local filename resolution
//!
//! The remote namespace allows names the local filesystem does not (illegal
//! characters, reserved device names, siblings with identical names). This
//! module turns a remote item into a local name that is legal and unique
//! within its destination folder:
//!
//! 1. [`sanitize_filename`] strips illegal, control and emoji characters
//! 2. [`output_name`] picks the extension for the configured export format
//! 3. [`NameRegistry::claim`] appends `_1`, `_2`, ... until the candidate is
//!    neither claimed by another unit of this run nor present on disk
//! 4. [`create_file_exclusive`] / [`create_dir_exclusive`] create the output
//!    with fail-if-exists semantics, claiming the next name on a lost race

use crate::format::{ExportFormat, extension_for_mime};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Upper bound on exclusive-create retries for one output
const MAX_CREATE_ATTEMPTS: u32 = 1000;

/// Name used when sanitizing leaves nothing
const UNTITLED: &str = "Untitled";

/// Device names Windows refuses as file stems
const RESERVED_NAMES: [&str; 22] = [
    "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8",
    "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

fn is_illegal(c: char) -> bool {
    matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') || c.is_control()
}

fn is_emoji(c: char) -> bool {
    matches!(
        c as u32,
        0x1F300..=0x1F5FF   // symbols & pictographs
            | 0x1F600..=0x1F64F // emoticons
            | 0x1F680..=0x1F6FF // transport & map
            | 0x1F1E0..=0x1F1FF // flags
            | 0x2702..=0x27B0 // dingbats
    )
}

/// Make a remote name safe to use as a local file or directory name
///
/// Illegal characters, control characters and emoji are removed, surrounding
/// whitespace and trailing dots are trimmed, and a reserved device stem gets
/// a `_` suffix. An empty result becomes `"Untitled"`.
///
/// ```
/// use drive_mirror::naming::sanitize_filename;
///
/// assert_eq!(sanitize_filename("Q1: plan/draft?"), "Q1 plandraft");
/// assert_eq!(sanitize_filename("CON"), "CON_");
/// assert_eq!(sanitize_filename("  "), "Untitled");
/// ```
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !is_illegal(*c) && !is_emoji(*c))
        .collect();
    let trimmed = cleaned.trim().trim_end_matches('.').trim_end();

    if trimmed.is_empty() {
        return UNTITLED.to_string();
    }

    let (stem, rest) = match trimmed.find('.') {
        Some(idx) => trimmed.split_at(idx),
        None => (trimmed, ""),
    };
    if RESERVED_NAMES.contains(&stem.to_ascii_lowercase().as_str()) {
        format!("{}_{}", stem, rest)
    } else {
        trimmed.to_string()
    }
}

/// Extension (with leading dot, possibly empty) for an item exported as `format`
///
/// The format's own extension wins; [`ExportFormat::Native`] keeps the
/// original name's extension, falling back to one derived from the content
/// type.
pub fn resolve_extension(name: &str, content_type: &str, format: ExportFormat) -> String {
    let from_format = format.extension();
    if !from_format.is_empty() {
        return from_format.to_string();
    }

    if let Some(idx) = name.rfind('.')
        && idx > 0
        && idx + 1 < name.len()
    {
        return name[idx..].to_string();
    }

    extension_for_mime(content_type)
        .unwrap_or_default()
        .to_string()
}

/// Split an item's local name into `(base, extension)` ready for claiming
///
/// Directory outputs (folders, composite exports) never get an extension.
/// When the sanitized name already ends with the extension it is not doubled.
pub fn output_name(
    name: &str,
    content_type: &str,
    format: ExportFormat,
    as_directory: bool,
) -> (String, String) {
    let sanitized = sanitize_filename(name);
    if as_directory {
        return (sanitized, String::new());
    }

    let extension = resolve_extension(&sanitized, content_type, format);
    let base = match sanitized.len().checked_sub(extension.len()) {
        Some(cut)
            if cut > 0
                && !extension.is_empty()
                && sanitized.is_char_boundary(cut)
                && sanitized[cut..].eq_ignore_ascii_case(&extension) =>
        {
            sanitized[..cut].to_string()
        }
        _ => sanitized,
    };

    (base, extension)
}

/// Per-destination-folder sets of names claimed during one run
///
/// Check and insert happen under one lock, so two workers can never be handed
/// the same name for the same folder. Names compare case-insensitively so the
/// result is also unique on case-insensitive filesystems.
#[derive(Debug, Default)]
pub struct NameRegistry {
    claimed: Mutex<HashMap<PathBuf, HashSet<String>>>,
}

impl NameRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the first free name `base{ext}`, `base_1{ext}`, `base_2{ext}`, ...
    pub fn claim(&self, dir: &Path, base: &str, extension: &str) -> String {
        let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        let taken = claimed.entry(dir.to_path_buf()).or_default();

        let mut candidate = format!("{}{}", base, extension);
        let mut n = 1u32;
        while taken.contains(&candidate.to_lowercase()) || dir.join(&candidate).exists() {
            candidate = format!("{}_{}{}", base, n, extension);
            n += 1;
        }

        taken.insert(candidate.to_lowercase());
        candidate
    }

    /// Whether `name` has been claimed in `dir`
    pub fn is_claimed(&self, dir: &Path, name: &str) -> bool {
        let claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        claimed
            .get(dir)
            .is_some_and(|names| names.contains(&name.to_lowercase()))
    }
}

/// Create `dir/name` as a new file, never opening an existing one
///
/// If something else created the file since it was claimed, the next free
/// name for `(base, extension)` is claimed and tried instead. Returns the path
/// actually created.
pub async fn create_file_exclusive(
    names: &NameRegistry,
    dir: &Path,
    name: &str,
    base: &str,
    extension: &str,
) -> std::io::Result<(PathBuf, tokio::fs::File)> {
    let mut name = name.to_string();
    for _ in 0..MAX_CREATE_ATTEMPTS {
        let path = dir.join(&name);
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                tracing::debug!(path = %path.display(), "Output appeared after claim, taking next name");
                name = names.claim(dir, base, extension);
            }
            Err(e) => return Err(e),
        }
    }
    Err(exhausted(dir, base))
}

/// Create `dir/name` as a new directory, never reusing an existing one
pub async fn create_dir_exclusive(
    names: &NameRegistry,
    dir: &Path,
    name: &str,
    base: &str,
) -> std::io::Result<PathBuf> {
    let mut name = name.to_string();
    for _ in 0..MAX_CREATE_ATTEMPTS {
        let path = dir.join(&name);
        match tokio::fs::create_dir(&path).await {
            Ok(()) => return Ok(path),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                tracing::debug!(path = %path.display(), "Directory appeared after claim, taking next name");
                name = names.claim(dir, base, "");
            }
            Err(e) => return Err(e),
        }
    }
    Err(exhausted(dir, base))
}

/// Claim a name in `dir` and create the file in one step
pub async fn claim_and_create_file(
    names: &NameRegistry,
    dir: &Path,
    base: &str,
    extension: &str,
) -> std::io::Result<(PathBuf, tokio::fs::File)> {
    let name = names.claim(dir, base, extension);
    create_file_exclusive(names, dir, &name, base, extension).await
}

fn exhausted(dir: &Path, base: &str) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("no free name for '{}' in {}", base, dir.display()),
    )
}
