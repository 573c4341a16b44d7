//! Naming convention for encrypted paths
//!
//! The marker in the file name is the only metadata the tool keeps about an
//! encrypted artifact; there is nothing inside the ciphertext identifying
//! the original name. Three shapes exist:
//!
//! - files: the marker is inserted immediately before the last extension
//!   (`config.json` -> `config_cyphered.json`), or appended when there is
//!   none (`id_rsa` -> `id_rsa_cyphered`)
//! - directories: the archive suffix is appended to the directory name
//!   (`secrets` -> `secrets_cypheredd.zip`)
//! - the older generation of the directory suffix, `_cyphered.zip`, is still
//!   accepted when reversing names but is never written
//!
//! All functions are pure; `decrypted_sibling(encrypted_sibling(p))` is the
//! identity on any path whose name does not already carry the marker.

use std::path::{Path, PathBuf};

/// Marker denoting "this path is the encrypted form"
pub const CYPHER_MARKER: &str = "_cyphered";

/// Suffix appended to an encrypted directory archive
pub const DIR_SUFFIX: &str = "_cypheredd.zip";

/// Older directory-archive suffix, read but never written
pub const DIR_SUFFIX_LEGACY: &str = "_cyphered.zip";

/// Which framing an encrypted path uses, decided by its name alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptedForm {
    /// Text framing, `ivHex:cipherHex`
    File,
    /// Binary framing, `iv || ciphertext`, containing a compressed archive
    DirArchive,
}

fn final_component(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// True if the final path component carries the cyphered marker.
pub fn is_encrypted_name(path: &Path) -> bool {
    final_component(path).contains(CYPHER_MARKER)
}

/// True if the final path component is a directory-archive name, either
/// generation.
pub fn is_dir_archive_name(path: &Path) -> bool {
    let name = final_component(path);
    name.ends_with(DIR_SUFFIX) || name.ends_with(DIR_SUFFIX_LEGACY)
}

/// Classify an encrypted path by its suffix. `None` means the name carries
/// no marker at all.
pub fn classify(path: &Path) -> Option<EncryptedForm> {
    let name = final_component(path);
    if name.ends_with(DIR_SUFFIX) || name.ends_with(DIR_SUFFIX_LEGACY) {
        Some(EncryptedForm::DirArchive)
    } else if name.contains(CYPHER_MARKER) {
        Some(EncryptedForm::File)
    } else {
        None
    }
}

/// The encrypted counterpart of a plaintext path.
pub fn encrypted_sibling(path: &Path, is_directory: bool) -> PathBuf {
    let name = final_component(path);
    if name.is_empty() {
        return path.to_path_buf();
    }

    let new_name = if is_directory {
        format!("{name}{DIR_SUFFIX}")
    } else {
        match split_last_extension(&name) {
            Some((stem, ext)) => format!("{stem}{CYPHER_MARKER}.{ext}"),
            None => format!("{name}{CYPHER_MARKER}"),
        }
    };
    path.with_file_name(new_name)
}

/// The legacy-generation encrypted counterpart of a plaintext directory.
pub fn legacy_encrypted_sibling(path: &Path) -> PathBuf {
    let name = final_component(path);
    if name.is_empty() {
        return path.to_path_buf();
    }
    path.with_file_name(format!("{name}{DIR_SUFFIX_LEGACY}"))
}

/// The plaintext counterpart of an encrypted path: strips the directory
/// archive suffix (either generation), or removes the marker from a file
/// name.
pub fn decrypted_sibling(path: &Path) -> PathBuf {
    let name = final_component(path);
    if name.is_empty() {
        return path.to_path_buf();
    }

    let new_name = if let Some(stripped) = name.strip_suffix(DIR_SUFFIX) {
        stripped.to_string()
    } else if let Some(stripped) = name.strip_suffix(DIR_SUFFIX_LEGACY) {
        stripped.to_string()
    } else {
        name.replacen(CYPHER_MARKER, "", 1)
    };
    path.with_file_name(new_name)
}

/// Split `name` at its last extension, the extension being the part after
/// the final dot when that part is non-empty. A leading dot counts
/// (`.env` -> `("", "env")`), matching how the marker has always been
/// placed.
fn split_last_extension(name: &str) -> Option<(&str, &str)> {
    let idx = name.rfind('.')?;
    let ext = &name[idx + 1..];
    if ext.is_empty() {
        return None;
    }
    Some((&name[..idx], ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_detection() {
        assert!(is_encrypted_name(Path::new("/x/config_cyphered.json")));
        assert!(is_encrypted_name(Path::new("/x/secrets_cypheredd.zip")));
        assert!(is_encrypted_name(Path::new("/x/id_rsa_cyphered")));
        assert!(!is_encrypted_name(Path::new("/x/config.json")));
        // Marker in a parent directory does not mark the leaf
        assert!(!is_encrypted_name(Path::new("/x_cyphered/config.json")));
    }

    #[test]
    fn test_encrypted_sibling_files() {
        let cases = [
            ("/h/.aws/credentials", "/h/.aws/credentials_cyphered"),
            ("/h/.docker/config.json", "/h/.docker/config_cyphered.json"),
            ("/h/project/.env", "/h/project/_cyphered.env"),
            ("/h/archive.tar.gz", "/h/archive.tar_cyphered.gz"),
        ];
        for (input, expected) in cases {
            assert_eq!(
                encrypted_sibling(Path::new(input), false),
                PathBuf::from(expected)
            );
        }
    }

    #[test]
    fn test_encrypted_sibling_directory() {
        assert_eq!(
            encrypted_sibling(Path::new("/h/.ssh"), true),
            PathBuf::from("/h/.ssh_cypheredd.zip")
        );
    }

    #[test]
    fn test_decrypted_sibling_both_generations() {
        assert_eq!(
            decrypted_sibling(Path::new("/h/.ssh_cypheredd.zip")),
            PathBuf::from("/h/.ssh")
        );
        assert_eq!(
            decrypted_sibling(Path::new("/h/.ssh_cyphered.zip")),
            PathBuf::from("/h/.ssh")
        );
        assert_eq!(
            decrypted_sibling(Path::new("/h/config_cyphered.json")),
            PathBuf::from("/h/config.json")
        );
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(Path::new("/h/a_cypheredd.zip")),
            Some(EncryptedForm::DirArchive)
        );
        assert_eq!(
            classify(Path::new("/h/a_cyphered.zip")),
            Some(EncryptedForm::DirArchive)
        );
        assert_eq!(
            classify(Path::new("/h/id_rsa_cyphered")),
            Some(EncryptedForm::File)
        );
        assert_eq!(classify(Path::new("/h/id_rsa")), None);
    }

    #[test]
    fn test_bijection() {
        let files = [
            "/h/id_rsa",
            "/h/credentials",
            "/h/config.json",
            "/h/.env",
            "/h/backup.tar.gz",
            "/h/no_parent",
        ];
        for p in files {
            let p = Path::new(p);
            assert_eq!(decrypted_sibling(&encrypted_sibling(p, false)), p, "{p:?}");
        }
        let dirs = ["/h/.ssh", "/h/.aws", "/h/project dir"];
        for p in dirs {
            let p = Path::new(p);
            assert_eq!(decrypted_sibling(&encrypted_sibling(p, true)), p, "{p:?}");
        }
    }
}
