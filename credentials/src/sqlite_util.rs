//! Secure SQLite file handling.
//!
//! Mirrors `gateway_sigstore`'s `sqlite_util::open_secure_db`, itself
//! grounded on `context/src/sqlite_util.rs`'s `open_secure_db` preamble:
//! create the parent directory, tighten it to 0o700, create the DB file at
//! 0o600, then open the connection.

use std::fs::OpenOptions;
use std::path::Path;

use rusqlite::Connection;

use crate::error::CredentialError;

pub(crate) fn open_secure_db(path: &Path) -> Result<Connection, CredentialError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
        if !parent.as_os_str().is_empty() {
            ensure_secure_dir(parent)?;
        }
    }
    ensure_secure_db_files(path)?;
    Ok(Connection::open(path)?)
}

fn ensure_secure_dir(path: &Path) -> Result<(), CredentialError> {
    std::fs::create_dir_all(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::{MetadataExt, PermissionsExt};
        let metadata = std::fs::metadata(path)?;
        let our_uid = unsafe { libc::getuid() };
        if metadata.uid() != our_uid {
            return Ok(());
        }
        let current_mode = metadata.permissions().mode() & 0o777;
        if current_mode & 0o077 != 0 {
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
        }
    }
    Ok(())
}

fn ensure_secure_db_files(path: &Path) -> Result<(), CredentialError> {
    if !path.exists() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let _file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .read(true)
                .write(true)
                .mode(0o600)
                .open(path)?;
        }
        #[cfg(not(unix))]
        {
            let _file = OpenOptions::new().create(true).truncate(false).read(true).write(true).open(path)?;
        }
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        for suffix in ["-wal", "-shm"] {
            let sidecar = sqlite_sidecar_path(path, suffix);
            if sidecar.exists() {
                let _ = std::fs::set_permissions(&sidecar, std::fs::Permissions::from_mode(0o600));
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
fn sqlite_sidecar_path(path: &Path, suffix: &str) -> std::path::PathBuf {
    let file_name = path.file_name().map(|name| name.to_string_lossy());
    match file_name {
        Some(name) => path.with_file_name(format!("{name}{suffix}")),
        None => std::path::PathBuf::from(format!("{}{suffix}", path.display())),
    }
}
