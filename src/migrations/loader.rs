use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::split::split_statements;
use crate::error::DataApiError;
use crate::types::Statement;

/// Lock manifest written by the migration tool; present in the root, never executed.
pub const LOCK_FILE_NAME: &str = "migration_lock.toml";

/// SQL file expected inside every migration directory.
pub const MIGRATION_FILE_NAME: &str = "migration.sql";

/// One migration directory, already split into statements.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationUnit {
    /// Directory name; also the ordering key.
    pub name: String,
    pub path: PathBuf,
    /// Statements in file order.
    pub statements: Vec<Statement>,
}

/// Every migration unit under a root, in replay order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationPlan {
    units: Vec<MigrationUnit>,
}

impl MigrationPlan {
    #[must_use]
    pub fn new(mut units: Vec<MigrationUnit>) -> Self {
        units.sort_by(|a, b| a.name.cmp(&b.name));
        Self { units }
    }

    /// Units in ascending key order. Each call starts from the first unit.
    pub fn units(&self) -> impl Iterator<Item = &MigrationUnit> {
        self.units.iter()
    }

    /// `(unit_index, statement_index, statement)` in replay order.
    pub fn iter_statements(&self) -> impl Iterator<Item = (usize, usize, &Statement)> {
        self.units.iter().enumerate().flat_map(|(unit_idx, unit)| {
            unit.statements
                .iter()
                .enumerate()
                .map(move |(stmt_idx, stmt)| (unit_idx, stmt_idx, stmt))
        })
    }

    #[must_use]
    pub fn unit(&self, index: usize) -> Option<&MigrationUnit> {
        self.units.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    #[must_use]
    pub fn statement_count(&self) -> usize {
        self.units.iter().map(|u| u.statements.len()).sum()
    }
}

/// Reads migration units from a directory tree.
#[derive(Debug, Clone)]
pub struct MigrationLoader {
    root: PathBuf,
}

impl MigrationLoader {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load every unit under the root.
    ///
    /// # Errors
    /// `MigrationIo` naming the offending path when the root cannot be listed or a
    /// unit's `migration.sql` cannot be read.
    pub fn discover(&self) -> Result<MigrationPlan, DataApiError> {
        let units = self
            .unit_dirs()?
            .into_iter()
            .map(|(name, path)| Self::load_unit(name, path))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MigrationPlan::new(units))
    }

    /// Load and split one unit directory.
    ///
    /// # Errors
    /// `MigrationIo` if `migration.sql` is missing or unreadable.
    pub fn load_unit(name: String, dir: PathBuf) -> Result<MigrationUnit, DataApiError> {
        let file = dir.join(MIGRATION_FILE_NAME);
        let sql = fs::read_to_string(&file).map_err(|e| DataApiError::migration_io(&file, e))?;
        let statements = split_statements(&sql);
        debug!(unit = %name, statements = statements.len(), "loaded migration unit");
        Ok(MigrationUnit {
            name,
            path: dir,
            statements,
        })
    }

    fn unit_dirs(&self) -> Result<Vec<(String, PathBuf)>, DataApiError> {
        let entries =
            fs::read_dir(&self.root).map_err(|e| DataApiError::migration_io(&self.root, e))?;

        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DataApiError::migration_io(&self.root, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == LOCK_FILE_NAME {
                continue;
            }
            let path = entry.path();
            if !path.is_dir() {
                debug!(entry = %name, "skipping non-directory in migrations root");
                continue;
            }
            dirs.push((name, path));
        }
        dirs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(dirs)
    }
}
