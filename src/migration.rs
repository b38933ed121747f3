use std::{
    fs,
    path::{Path, PathBuf},
};

use sqlx::{Pool, Postgres};

use crate::error::{Error, Result};

/// Returns the numbered `NNN_name.sql` files of `dir`, sorted by number.
/// Other files are skipped.
pub fn migration_files(dir: impl AsRef<Path>) -> Result<Vec<(usize, PathBuf)>> {
    let dir = dir.as_ref();
    let failed = |reason: std::io::Error| Error::Migration {
        file: dir.display().to_string(),
        reason: reason.to_string(),
    };

    let mut migration_files: Vec<(usize, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir).map_err(failed)? {
        let entry = entry.map_err(failed)?;
        let path = entry.path();

        if !path.is_file() || path.extension().map_or(true, |ext| ext != "sql") {
            continue;
        }

        let number = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.get(..3))
            .and_then(|n| n.parse::<usize>().ok());
        match number {
            Some(number) => migration_files.push((number, path)),
            None => log::warn!("skipping unnumbered migration {}", path.display()),
        }
    }

    migration_files.sort_by_key(|v| v.0);
    Ok(migration_files)
}

/// Applies every migration in order. Files must be idempotent, they run on
/// each start.
pub async fn migrate(p: &Pool<Postgres>, dir: impl AsRef<Path>) -> Result<usize> {
    let files = migration_files(dir)?;

    log::info!("starting migration ({} files)", files.len());
    for (_, path) in &files {
        let file = path.display().to_string();
        let content = fs::read_to_string(path).map_err(|e| Error::Migration {
            file: file.clone(),
            reason: e.to_string(),
        })?;
        log::info!("migrating {}", file);
        sqlx::raw_sql(&content)
            .execute(p)
            .await
            .map_err(|e| Error::Migration {
                file,
                reason: e.to_string(),
            })?;
    }
    log::info!("migration end");

    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_are_ordered_by_number() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["010_later.sql", "002_entries.sql", "001_init.sql", "notes.txt", "xyz.sql"] {
            fs::write(dir.path().join(name), "SELECT 1;").unwrap();
        }
        let names: Vec<String> = migration_files(dir.path())
            .unwrap()
            .into_iter()
            .map(|(_, p)| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["001_init.sql", "002_entries.sql", "010_later.sql"]);
    }

    #[test]
    fn shipped_migrations_are_numbered() {
        let files = migration_files(concat!(env!("CARGO_MANIFEST_DIR"), "/migrations")).unwrap();
        let numbers: Vec<usize> = files.iter().map(|(n, _)| *n).collect();
        assert_eq!(numbers, [1, 2, 3]);
    }

    #[test]
    fn missing_directory_is_an_error() {
        assert!(matches!(
            migration_files("/definitely/not/here"),
            Err(Error::Migration { .. })
        ));
    }
}
