//! Point-in-time snapshots of the stack configuration
//!
//! A backup is a gzip-compressed tarball of the env file, the certificate
//! directory, and the rendered proxy configuration, stored with paths relative
//! to the working directory so a restore unpacks into the same layout.

use crate::config::EnvConfig;
use crate::error::OpsError;
use chrono::Local;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};
use tracing::{info, warn};

/// Create a timestamped snapshot under the configured backup directory.
/// Returns the path of the written archive.
pub fn create(config: &EnvConfig, env_path: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(&config.backup_dir)?;

    let archive_path = config.backup_dir.join(format!(
        "bubble-backup-{}.tar.gz",
        Local::now().format("%Y%m%d-%H%M%S")
    ));

    let entries: Vec<&Path> = vec![env_path, &config.cert_dir, &config.nginx_conf];
    create_archive(&archive_path, &entries)?;

    info!(archive = %archive_path.display(), "Backup created");
    Ok(archive_path)
}

/// Write `entries` (files or directories) into a new tar.gz at `archive_path`.
/// Entries that do not exist are skipped with a warning; an archive with no
/// entries at all is an error.
pub fn create_archive(archive_path: &Path, entries: &[&Path]) -> anyhow::Result<()> {
    let file = File::create(archive_path).map_err(|e| {
        anyhow::anyhow!("failed to create archive {}: {}", archive_path.display(), e)
    })?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);

    let mut appended = 0usize;
    for entry in entries {
        if !entry.exists() {
            warn!(path = %entry.display(), "Skipping missing backup entry");
            continue;
        }
        // Tar entries must be relative so a restore unpacks under dest
        let name = entry.strip_prefix("/").unwrap_or(entry);
        if entry.is_dir() {
            builder.append_dir_all(name, entry)?;
        } else {
            builder.append_path_with_name(entry, name)?;
        }
        appended += 1;
    }

    if appended == 0 {
        drop(builder);
        let _ = std::fs::remove_file(archive_path);
        anyhow::bail!("nothing to back up: no configured entry exists");
    }

    let encoder = builder.into_inner()?;
    encoder.finish()?;
    Ok(())
}

/// Unpack a snapshot over the working directory
pub fn restore(archive_path: &Path) -> anyhow::Result<()> {
    restore_into(archive_path, Path::new("."))
}

/// Unpack a snapshot into `dest`
pub fn restore_into(archive_path: &Path, dest: &Path) -> anyhow::Result<()> {
    if !archive_path.exists() {
        return Err(OpsError::MissingBackup(archive_path.to_path_buf()).into());
    }

    let file = File::open(archive_path)?;
    let decoder = GzDecoder::new(file);
    let mut archive = Archive::new(decoder);
    archive.unpack(dest).map_err(|e| {
        anyhow::anyhow!("failed to unpack {}: {}", archive_path.display(), e)
    })?;

    info!(archive = %archive_path.display(), "Backup restored");
    Ok(())
}

/// List existing snapshots, newest last
pub fn list(backup_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut backups = Vec::new();
    if !backup_dir.exists() {
        return Ok(backups);
    }
    for entry in std::fs::read_dir(backup_dir)? {
        let path = entry?.path();
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.starts_with("bubble-backup-") && n.ends_with(".tar.gz"))
        {
            backups.push(path);
        }
    }
    backups.sort();
    Ok(backups)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_roundtrip() {
        let src = tempfile::tempdir().unwrap();
        let env_path = src.path().join(".env");
        let conf_dir = src.path().join("conf");
        std::fs::write(&env_path, "PRIMARY_DOMAIN=example.com\n").unwrap();
        std::fs::create_dir_all(conf_dir.join("live")).unwrap();
        std::fs::write(conf_dir.join("live/cert.pem"), "cert material").unwrap();

        let archive_path = src.path().join("backup.tar.gz");
        create_archive(&archive_path, &[&env_path, &conf_dir]).unwrap();
        assert!(archive_path.exists());

        let dest = tempfile::tempdir().unwrap();
        restore_into(&archive_path, dest.path()).unwrap();

        // Entries are stored with the leading `/` stripped, so rebuild the
        // expected layout under dest
        let stripped_env = dest
            .path()
            .join(env_path.strip_prefix("/").unwrap_or(&env_path));
        let restored = std::fs::read_to_string(stripped_env).unwrap();
        assert_eq!(restored, "PRIMARY_DOMAIN=example.com\n");

        let stripped_cert = dest
            .path()
            .join(conf_dir.strip_prefix("/").unwrap_or(&conf_dir))
            .join("live/cert.pem");
        assert!(stripped_cert.exists());
    }

    #[test]
    fn test_missing_entries_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join(".env");
        std::fs::write(&present, "KEY=value\n").unwrap();
        let missing = dir.path().join("does-not-exist");

        let archive_path = dir.path().join("backup.tar.gz");
        create_archive(&archive_path, &[&present, &missing]).unwrap();
        assert!(archive_path.exists());
    }

    #[test]
    fn test_all_entries_missing_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("backup.tar.gz");
        let missing = dir.path().join("nope");

        let err = create_archive(&archive_path, &[&missing]).unwrap_err();
        assert!(err.to_string().contains("nothing to back up"));
        assert!(!archive_path.exists());
    }

    #[test]
    fn test_restore_missing_archive_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = restore_into(&dir.path().join("absent.tar.gz"), dir.path()).unwrap_err();
        assert!(err.to_string().contains("backup archive not found"));
    }

    #[test]
    fn test_list_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "bubble-backup-20240102-000000.tar.gz",
            "bubble-backup-20240101-000000.tar.gz",
            "unrelated.txt",
        ] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }

        let backups = list(dir.path()).unwrap();
        assert_eq!(backups.len(), 2);
        assert!(backups[0]
            .to_string_lossy()
            .contains("bubble-backup-20240101"));
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backups = list(&dir.path().join("backups")).unwrap();
        assert!(backups.is_empty());
    }
}
