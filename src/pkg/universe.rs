// Purpose: Hold package records and the single status-tagged registry shared by a resolve run.
// Inputs/Outputs: Filled from the std baseline and discovery batches; drained by the graph resolver.
// Invariants: One provider per import path; Resolved paths stay Resolved; executables are never importable.
// Gotchas: Batch merges validate every path before inserting any so aborted runs stay consistent.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;

use crate::pkg::baseline::StdBaseline;
use crate::pkg::error::{ResolveError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PackageKind {
    Executable,
    Library,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Origin {
    Source { dir: PathBuf, files: Vec<PathBuf> },
    Archive { archive: PathBuf, entry: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageRecord {
    pub import_path: String,
    pub name: String,
    pub kind: PackageKind,
    pub imports: BTreeSet<String>,
    pub origin: Origin,
}

impl PackageRecord {
    pub fn is_executable(&self) -> bool {
        self.kind == PackageKind::Executable
    }

    pub fn provenance(&self) -> Provenance {
        match &self.origin {
            Origin::Source { dir, .. } => Provenance::Source(dir.clone()),
            Origin::Archive { archive, .. } => Provenance::Archive(archive.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Provenance {
    StdLib,
    Archive(PathBuf),
    Source(PathBuf),
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::StdLib => write!(f, "the standard library"),
            Provenance::Archive(p) => write!(f, "archive {}", p.display()),
            Provenance::Source(p) => write!(f, "source {}", p.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Resolved(Provenance),
    KnownExecutable(Provenance),
    KnownUnresolved(Provenance),
}

impl Status {
    pub fn provenance(&self) -> &Provenance {
        match self {
            Status::Resolved(p) | Status::KnownExecutable(p) | Status::KnownUnresolved(p) => p,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Status::Resolved(_))
    }
}

// Private per-job output of discovery, merged into the universe in one step.
#[derive(Debug, Default)]
pub struct Discovery {
    pub module: String,
    pub packages: Vec<PackageRecord>,
    pub archive: Option<PathBuf>,
}

impl Discovery {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct Universe {
    entries: HashMap<String, Status>,
}

impl Universe {
    pub fn with_baseline(baseline: &StdBaseline) -> Self {
        let mut entries = HashMap::with_capacity(baseline.len());
        for p in baseline.iter() {
            entries.insert(p.to_string(), Status::Resolved(Provenance::StdLib));
        }
        Self { entries }
    }

    pub fn get(&self, import_path: &str) -> Option<&Status> {
        self.entries.get(import_path)
    }

    pub fn contains(&self, import_path: &str) -> bool {
        self.entries.contains_key(import_path)
    }

    pub fn is_resolved(&self, import_path: &str) -> bool {
        self.entries
            .get(import_path)
            .map(Status::is_resolved)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn known_paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn register(&mut self, import_path: &str, status: Status) -> Result<()> {
        if let Some(existing) = self.entries.get(import_path) {
            return Err(ResolveError::DuplicatePackage {
                import_path: import_path.to_string(),
                existing: existing.provenance().clone(),
                incoming: status.provenance().clone(),
            });
        }
        self.entries.insert(import_path.to_string(), status);
        Ok(())
    }

    // Precondition: `record` came from discovery and has not been registered yet.
    // Postcondition: archive records are Resolved, executables KnownExecutable, sources KnownUnresolved.
    pub fn register_record(&mut self, record: &PackageRecord) -> Result<()> {
        self.register(&record.import_path, initial_status(record))
    }

    pub fn merge(&mut self, batch: &Discovery) -> Result<()> {
        let mut seen = HashSet::with_capacity(batch.packages.len());
        for rec in &batch.packages {
            if let Some(existing) = self.entries.get(&rec.import_path) {
                return Err(ResolveError::DuplicatePackage {
                    import_path: rec.import_path.clone(),
                    existing: existing.provenance().clone(),
                    incoming: rec.provenance(),
                });
            }
            if !seen.insert(rec.import_path.as_str()) {
                return Err(ResolveError::DuplicatePackage {
                    import_path: rec.import_path.clone(),
                    existing: rec.provenance(),
                    incoming: rec.provenance(),
                });
            }
        }
        for rec in &batch.packages {
            self.entries
                .insert(rec.import_path.clone(), initial_status(rec));
        }
        Ok(())
    }

    // Only the KnownUnresolved -> Resolved transition is legal; anything else is ignored.
    pub fn mark_resolved(&mut self, import_path: &str) -> bool {
        let Some(status) = self.entries.get_mut(import_path) else {
            return false;
        };
        if let Status::KnownUnresolved(prov) = status {
            let prov = prov.clone();
            *status = Status::Resolved(prov);
            return true;
        }
        false
    }
}

fn initial_status(record: &PackageRecord) -> Status {
    let prov = record.provenance();
    match (&record.origin, record.kind) {
        (_, PackageKind::Executable) => Status::KnownExecutable(prov),
        (Origin::Archive { .. }, PackageKind::Library) => Status::Resolved(prov),
        (Origin::Source { .. }, PackageKind::Library) => Status::KnownUnresolved(prov),
    }
}

#[cfg(test)]
pub(crate) fn source_record(import_path: &str, kind: PackageKind, imports: &[&str]) -> PackageRecord {
    let name = match kind {
        PackageKind::Executable => "main".to_string(),
        PackageKind::Library => import_path
            .rsplit('/')
            .next()
            .unwrap_or(import_path)
            .to_string(),
    };
    PackageRecord {
        import_path: import_path.to_string(),
        name,
        kind,
        imports: imports.iter().map(|s| s.to_string()).collect(),
        origin: Origin::Source {
            dir: PathBuf::from("/src").join(import_path),
            files: vec![],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archive_record(import_path: &str) -> PackageRecord {
        PackageRecord {
            import_path: import_path.to_string(),
            name: String::new(),
            kind: PackageKind::Library,
            imports: BTreeSet::new(),
            origin: Origin::Archive {
                archive: PathBuf::from("/cache/m.zip"),
                entry: format!("{}.a", import_path),
            },
        }
    }

    #[test]
    fn baseline_paths_start_resolved() {
        let base = StdBaseline::from_paths(["fmt", "os"]);
        let u = Universe::with_baseline(&base);
        assert!(u.is_resolved("fmt"));
        assert_eq!(u.get("os"), Some(&Status::Resolved(Provenance::StdLib)));
        assert!(u.get("net/http").is_none());
    }

    #[test]
    fn register_rejects_second_provider() {
        let base = StdBaseline::from_paths(["fmt"]);
        let mut u = Universe::with_baseline(&base);
        let err = u
            .register_record(&source_record("fmt", PackageKind::Library, &[]))
            .unwrap_err();
        match err {
            ResolveError::DuplicatePackage {
                import_path,
                existing,
                ..
            } => {
                assert_eq!(import_path, "fmt");
                assert_eq!(existing, Provenance::StdLib);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn merge_is_all_or_nothing() {
        let mut u = Universe::default();
        u.register_record(&archive_record("example.com/lib/b"))
            .expect("register");

        let mut batch = Discovery::new("example.com/other");
        batch
            .packages
            .push(source_record("example.com/lib/a", PackageKind::Library, &[]));
        batch.packages.push(archive_record("example.com/lib/b"));
        assert!(matches!(
            u.merge(&batch),
            Err(ResolveError::DuplicatePackage { .. })
        ));
        assert!(!u.contains("example.com/lib/a"), "partial merge leaked");
        assert_eq!(u.len(), 1);
    }

    #[test]
    fn initial_status_by_origin_and_kind() {
        let mut u = Universe::default();
        let mut batch = Discovery::new("m");
        batch.packages.push(archive_record("m/a"));
        batch
            .packages
            .push(source_record("m/b", PackageKind::Library, &["m/a"]));
        batch
            .packages
            .push(source_record("m/cmd", PackageKind::Executable, &[]));
        u.merge(&batch).expect("merge");

        assert!(u.is_resolved("m/a"));
        assert!(matches!(u.get("m/b"), Some(Status::KnownUnresolved(_))));
        assert!(matches!(u.get("m/cmd"), Some(Status::KnownExecutable(_))));

        assert!(u.mark_resolved("m/b"));
        assert!(u.is_resolved("m/b"));
        assert!(!u.mark_resolved("m/cmd"), "executables never become importable");
        assert!(!u.is_resolved("m/cmd"));
    }
}
