// Purpose: Register library packages shipped as precompiled objects inside a module's platform zip.
// Inputs/Outputs: (module, version) + build context in; archive-origin package records out.
// Invariants: Archive location is `<cache>/<module>@<version>/.goyp/<OS>@<ARCH>@<toolchain>.zip`.
// Gotchas: A missing archive is not an error; any malformed entry aborts the whole resolve.

use std::collections::HashSet;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::ZipArchive;

use crate::pkg::cancel::CancelToken;
use crate::pkg::constraint::BuildContext;
use crate::pkg::error::{ResolveError, Result};
use crate::pkg::universe::{Origin, PackageKind, PackageRecord, Provenance};

pub const OBJECT_EXT: &str = ".a";
pub const METADATA_DIR: &str = ".goyp";

pub fn module_root(mod_cache: &Path, module: &str, version: &str) -> PathBuf {
    let mut p = mod_cache.to_path_buf();
    let mut segs = module.split('/').filter(|s| !s.is_empty()).peekable();
    while let Some(seg) = segs.next() {
        if segs.peek().is_none() {
            p.push(format!("{}@{}", seg, version));
        } else {
            p.push(seg);
        }
    }
    p
}

pub fn archive_file_name(ctx: &BuildContext) -> String {
    format!("{}@{}@{}.zip", ctx.os, ctx.arch, ctx.toolchain)
}

pub fn archive_path(mod_cache: &Path, module: &str, version: &str, ctx: &BuildContext) -> PathBuf {
    module_root(mod_cache, module, version)
        .join(METADATA_DIR)
        .join(archive_file_name(ctx))
}

// Maps an archive entry name to the import path it provides, or explains why it is invalid.
pub fn entry_import_path(module: &str, entry: &str) -> std::result::Result<String, String> {
    let Some(stripped) = entry.strip_suffix(OBJECT_EXT) else {
        return Err(format!("name must end in {}", OBJECT_EXT));
    };
    if stripped.is_empty() || stripped.ends_with('/') {
        return Err(format!("name must not be only the {} extension", OBJECT_EXT));
    }
    if entry.starts_with('/')
        || entry.contains('\\')
        || stripped
            .split('/')
            .any(|seg| seg.is_empty() || seg == "." || seg == "..")
    {
        return Err("unsafe path in archive entry".to_string());
    }

    if stripped == module || stripped.starts_with(&format!("{}/", module)) {
        return Ok(stripped.to_string());
    }
    let (parent, base) = match module.rsplit_once('/') {
        Some((p, b)) => (Some(p), b),
        None => (None, module),
    };
    if stripped == base || stripped.starts_with(&format!("{}/", base)) {
        return Ok(match parent {
            Some(p) => format!("{}/{}", p, stripped),
            None => stripped.to_string(),
        });
    }
    Err(format!(
        "name must be prefixed by module path '{}' or its base '{}'",
        module, base
    ))
}

#[derive(Debug, Clone)]
pub struct ArchiveScan {
    pub archive: PathBuf,
    pub packages: Vec<PackageRecord>,
}

pub struct ArchiveScanner<'a> {
    mod_cache: &'a Path,
    ctx: &'a BuildContext,
    cancel: &'a CancelToken,
}

impl<'a> ArchiveScanner<'a> {
    pub fn new(mod_cache: &'a Path, ctx: &'a BuildContext, cancel: &'a CancelToken) -> Self {
        Self {
            mod_cache,
            ctx,
            cancel,
        }
    }

    // Postcondition: `Ok(None)` when the module ships no archive for this platform/toolchain.
    pub fn scan(&self, module: &str, version: &str) -> Result<Option<ArchiveScan>> {
        self.cancel.check()?;
        let path = archive_path(self.mod_cache, module, version, self.ctx);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(module, archive = %path.display(), "no precompiled archive");
                return Ok(None);
            }
            Err(e) => return Err(ResolveError::io(&path, e)),
        };
        let mut zip = ZipArchive::new(file).map_err(|e| ResolveError::io(&path, io::Error::other(e)))?;

        let mut seen = HashSet::new();
        let mut packages = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let entry = zip
                .by_index_raw(i)
                .map_err(|e| ResolveError::io(&path, io::Error::other(e)))?
                .name()
                .to_string();
            let import_path =
                entry_import_path(module, &entry).map_err(|reason| ResolveError::InvalidArchiveEntry {
                    archive: path.clone(),
                    module: module.to_string(),
                    entry: entry.clone(),
                    reason,
                })?;
            if !seen.insert(import_path.clone()) {
                return Err(ResolveError::DuplicatePackage {
                    import_path,
                    existing: Provenance::Archive(path.clone()),
                    incoming: Provenance::Archive(path.clone()),
                });
            }
            let name = import_path
                .rsplit('/')
                .next()
                .unwrap_or(&import_path)
                .to_string();
            packages.push(PackageRecord {
                import_path,
                name,
                kind: PackageKind::Library,
                imports: Default::default(),
                origin: Origin::Archive {
                    archive: path.clone(),
                    entry,
                },
            });
        }
        info!(module, archive = %path.display(), packages = packages.len(), "using precompiled archive");
        Ok(Some(ArchiveScan {
            archive: path,
            packages,
        }))
    }
}
