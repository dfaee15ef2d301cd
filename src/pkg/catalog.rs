// Purpose: Walk a module's source tree and turn each package directory into a package record.
// Inputs/Outputs: Module root + logical prefix in; discovery-ordered records out.
// Invariants: Import path is `prefix/rel`; directories starting with '.' or '_' are never entered.
// Gotchas: Reserved (archive-provided) paths are rejected from the file listing alone, before parsing.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::pkg::cancel::CancelToken;
use crate::pkg::constraint::{BuildContext, find_build_line};
use crate::pkg::error::{ResolveError, Result};
use crate::pkg::source_scan::parse_file_header;
use crate::pkg::universe::{Origin, PackageKind, PackageRecord, Provenance};

pub struct CatalogBuilder<'a> {
    ctx: &'a BuildContext,
    cancel: &'a CancelToken,
}

fn is_skipped_dir_name(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('_')
}

fn is_candidate_file_name(name: &str) -> bool {
    name.ends_with(".go")
        && !name.ends_with("_test.go")
        && !name.starts_with('.')
        && !name.starts_with('_')
}

pub fn join_import_path(prefix: &str, rel: &Path) -> String {
    let mut out = prefix.trim_end_matches('/').to_string();
    for c in rel.components() {
        if let Component::Normal(seg) = c {
            if !out.is_empty() {
                out.push('/');
            }
            out.push_str(&seg.to_string_lossy());
        }
    }
    out
}

fn walk_error(root: &Path, err: walkdir::Error) -> ResolveError {
    let path = err
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.to_path_buf());
    let msg = err.to_string();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other(msg));
    ResolveError::io(path, source)
}

impl<'a> CatalogBuilder<'a> {
    pub fn new(ctx: &'a BuildContext, cancel: &'a CancelToken) -> Self {
        Self { ctx, cancel }
    }

    // Files that could belong to the package judging by name alone (suffix, test, platform).
    pub fn candidate_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        let rd = fs::read_dir(dir).map_err(|e| ResolveError::io(dir, e))?;
        for ent in rd {
            let ent = ent.map_err(|e| ResolveError::io(dir, e))?;
            let ft = ent.file_type().map_err(|e| ResolveError::io(ent.path(), e))?;
            if ft.is_dir() {
                continue;
            }
            let name = ent.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if is_candidate_file_name(name) && self.ctx.good_os_arch_file(name) {
                out.push(ent.path());
            }
        }
        out.sort();
        Ok(out)
    }

    // Precondition: `dir` exists.
    // Postcondition: `Ok(None)` when no eligible file survives name and build-line filtering.
    pub fn import_dir(&self, dir: &Path, import_path: &str) -> Result<Option<PackageRecord>> {
        let mut files = Vec::new();
        let mut imports = BTreeSet::new();
        let mut package: Option<(String, PathBuf)> = None;

        for f in self.candidate_files(dir)? {
            let bytes = fs::read(&f).map_err(|e| ResolveError::io(&f, e))?;
            let src = String::from_utf8(bytes)
                .map_err(|_| ResolveError::parse(&f, "invalid UTF-8 encoding"))?;
            if let Some(expr) = find_build_line(&src) {
                match self.ctx.eval_build_expr(expr) {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(msg) => return Err(ResolveError::parse(&f, msg)),
                }
            }
            let header = parse_file_header(&f, &src)?;
            // cgo is never enabled, so files importing "C" are not part of the package.
            if header.imports.iter().any(|i| i == "C") {
                continue;
            }
            match &package {
                None => package = Some((header.package.clone(), f.clone())),
                Some((name, first)) if *name != header.package => {
                    return Err(ResolveError::parse(
                        dir,
                        format!(
                            "found packages {} ({}) and {} ({})",
                            name,
                            file_name(first),
                            header.package,
                            file_name(&f)
                        ),
                    ));
                }
                Some(_) => {}
            }
            imports.extend(header.imports);
            files.push(f);
        }

        let Some((name, _)) = package else {
            return Ok(None);
        };
        let kind = if name == "main" {
            PackageKind::Executable
        } else {
            PackageKind::Library
        };
        Ok(Some(PackageRecord {
            import_path: import_path.to_string(),
            name,
            kind,
            imports,
            origin: Origin::Source {
                dir: dir.to_path_buf(),
                files,
            },
        }))
    }

    // Precondition: `reserved` holds import paths already claimed by this module's archive.
    // Postcondition: records are in walk order (sorted by file name, parents before children).
    // Side effects: reads directories and source headers under `root`.
    pub fn walk_module(
        &self,
        root: &Path,
        prefix: &str,
        reserved: &HashMap<String, Provenance>,
        skip: Option<&str>,
    ) -> Result<Vec<PackageRecord>> {
        let mut out = Vec::new();
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !e.file_type().is_dir()
                    || !e.file_name().to_str().map(is_skipped_dir_name).unwrap_or(true)
            });

        for entry in walker {
            let entry = entry.map_err(|e| walk_error(root, e))?;
            if !entry.file_type().is_dir() {
                continue;
            }
            self.cancel.check()?;

            let dir = entry.path();
            let rel = dir.strip_prefix(root).unwrap_or(Path::new(""));
            let import_path = join_import_path(prefix, rel);
            if skip == Some(import_path.as_str()) {
                continue;
            }

            if let Some(existing) = reserved.get(&import_path) {
                if self.candidate_files(dir)?.is_empty() {
                    continue;
                }
                return Err(ResolveError::DuplicatePackage {
                    import_path,
                    existing: existing.clone(),
                    incoming: Provenance::Source(dir.to_path_buf()),
                });
            }

            if let Some(rec) = self.import_dir(dir, &import_path)? {
                debug!(import_path = %rec.import_path, kind = ?rec.kind, imports = rec.imports.len(), "discovered package");
                out.push(rec);
            }
        }
        Ok(out)
    }

    // Resolves the explicitly requested executable package under `module_root`.
    pub fn import_target(
        &self,
        module_root: &Path,
        module_path: &str,
        target: &str,
    ) -> Result<PackageRecord> {
        let rel = Path::new(target);
        let safe = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !safe {
            return Err(ResolveError::InvalidTarget {
                target: target.to_string(),
                reason: "must be a relative path inside the module root".to_string(),
            });
        }
        self.cancel.check()?;
        let dir = module_root.join(rel);
        let md = fs::metadata(&dir).map_err(|e| ResolveError::io(&dir, e))?;
        if !md.is_dir() {
            return Err(ResolveError::InvalidTarget {
                target: target.to_string(),
                reason: format!("{} is not a directory", dir.display()),
            });
        }
        let import_path = join_import_path(module_path, rel);
        let rec = self
            .import_dir(&dir, &import_path)?
            .ok_or_else(|| ResolveError::NoSourceFiles { dir: dir.clone() })?;
        if !rec.is_executable() {
            return Err(ResolveError::InvalidTarget {
                target: target.to_string(),
                reason: format!("{} is not a main package (package {})", dir.display(), rec.name),
            });
        }
        Ok(rec)
    }
}

fn file_name(p: &Path) -> String {
    p.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::testutil::{temp_dir, write_file};
    use std::fs;

    fn ctx() -> BuildContext {
        BuildContext::new("linux", "amd64", "go1.22.0")
    }

    #[test]
    fn walks_packages_and_skips_hidden_dirs() {
        let root = temp_dir("catalog-walk");
        write_file(&root, "go.mod", "module example.com/m\n");
        write_file(&root, "lib.go", "package m\nimport \"fmt\"\n");
        write_file(&root, "lib_test.go", "package m\nimport \"testing\"\n");
        write_file(&root, "util/util.go", "package util\nimport \"example.com/m/util/deep\"\n");
        write_file(&root, "util/deep/d.go", "package deep\n");
        write_file(&root, "cmd/tool/main.go", "package main\nimport \"example.com/m\"\n");
        write_file(&root, "_skip/x.go", "package skip\n");
        write_file(&root, ".goyp/y.go", "package hidden\n");
        write_file(&root, "docs/readme.md", "# no go here\n");
        write_file(&root, "win/w_windows.go", "package win\n");

        let c = ctx();
        let cancel = CancelToken::new();
        let b = CatalogBuilder::new(&c, &cancel);
        let recs = b
            .walk_module(&root, "example.com/m", &HashMap::new(), None)
            .expect("walk");
        let paths: Vec<&str> = recs.iter().map(|r| r.import_path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "example.com/m",
                "example.com/m/cmd/tool",
                "example.com/m/util",
                "example.com/m/util/deep"
            ]
        );
        let root_pkg = &recs[0];
        assert_eq!(root_pkg.kind, PackageKind::Library);
        assert!(root_pkg.imports.contains("fmt"));
        assert!(!root_pkg.imports.contains("testing"), "test files must not contribute");
        assert_eq!(recs[1].kind, PackageKind::Executable);

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn build_lines_filter_files_and_mixed_packages_fail() {
        let root = temp_dir("catalog-build-line");
        write_file(&root, "a.go", "package a\n");
        write_file(&root, "gen.go", "//go:build ignore\n\npackage main\nimport \"os\"\n");
        let c = ctx();
        let cancel = CancelToken::new();
        let b = CatalogBuilder::new(&c, &cancel);
        let rec = b.import_dir(&root, "m/a").expect("import").expect("package");
        assert_eq!(rec.name, "a");
        assert!(rec.imports.is_empty());

        write_file(&root, "b.go", "package b\n");
        let err = b.import_dir(&root, "m/a").unwrap_err();
        assert!(err.to_string().contains("found packages a (a.go) and b (b.go)"));

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn invalid_utf8_source_is_a_parse_error() {
        let root = temp_dir("catalog-utf8");
        let f = root.join("a.go");
        fs::write(&f, b"package a\n// \xff\xfe bad\n").expect("write");
        let c = ctx();
        let cancel = CancelToken::new();
        let b = CatalogBuilder::new(&c, &cancel);
        match b.import_dir(&root, "m/a") {
            Err(ResolveError::Parse { path, message }) => {
                assert_eq!(path, f);
                assert!(message.contains("UTF-8"));
            }
            other => panic!("expected Parse, got {:?}", other),
        }
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn cgo_files_are_left_out() {
        let root = temp_dir("catalog-cgo");
        write_file(&root, "a.go", "package a\nimport \"strings\"\n");
        write_file(&root, "native.go", "package a\n\n// #include <stdio.h>\nimport \"C\"\nimport \"os/user\"\n");
        let c = ctx();
        let cancel = CancelToken::new();
        let b = CatalogBuilder::new(&c, &cancel);
        let rec = b.import_dir(&root, "m/a").expect("import").expect("package");
        assert_eq!(rec.imports.iter().collect::<Vec<_>>(), vec!["strings"]);
        assert_eq!(rec.origin, Origin::Source { dir: root.clone(), files: vec![root.join("a.go")] });

        fs::remove_file(root.join("a.go")).expect("remove");
        assert!(b.import_dir(&root, "m/a").expect("import").is_none());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn reserved_paths_with_sources_are_duplicates_without_parsing() {
        let root = temp_dir("catalog-reserved");
        write_file(&root, "sub/broken.go", "this is not go at all");
        let mut reserved = HashMap::new();
        reserved.insert(
            "example.com/lib/sub".to_string(),
            Provenance::Archive(PathBuf::from("/cache/x.zip")),
        );
        let c = ctx();
        let cancel = CancelToken::new();
        let b = CatalogBuilder::new(&c, &cancel);
        let err = b
            .walk_module(&root, "example.com/lib", &reserved, None)
            .unwrap_err();
        match err {
            ResolveError::DuplicatePackage { import_path, .. } => {
                assert_eq!(import_path, "example.com/lib/sub")
            }
            other => panic!("expected DuplicatePackage, got {other}"),
        }
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn target_must_be_main_with_sources() {
        let root = temp_dir("catalog-target");
        write_file(&root, "cmd/app/main.go", "package main\nimport \"example.com/m/lib\"\n");
        write_file(&root, "lib/lib.go", "package lib\n");
        fs::create_dir_all(root.join("empty")).expect("mkdir");
        let c = ctx();
        let cancel = CancelToken::new();
        let b = CatalogBuilder::new(&c, &cancel);

        let rec = b
            .import_target(&root, "example.com/m", "cmd/app")
            .expect("target");
        assert_eq!(rec.import_path, "example.com/m/cmd/app");
        assert!(rec.is_executable());

        assert!(matches!(
            b.import_target(&root, "example.com/m", "lib"),
            Err(ResolveError::InvalidTarget { .. })
        ));
        assert!(matches!(
            b.import_target(&root, "example.com/m", "empty"),
            Err(ResolveError::NoSourceFiles { .. })
        ));
        assert!(matches!(
            b.import_target(&root, "example.com/m", "../escape"),
            Err(ResolveError::InvalidTarget { .. })
        ));
        assert!(matches!(
            b.import_target(&root, "example.com/m", "missing"),
            Err(ResolveError::Io { .. })
        ));
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn cancelled_walk_stops_at_first_directory() {
        let root = temp_dir("catalog-cancel");
        write_file(&root, "a.go", "package a\n");
        let c = ctx();
        let cancel = CancelToken::new();
        cancel.cancel();
        let b = CatalogBuilder::new(&c, &cancel);
        assert!(matches!(
            b.walk_module(&root, "m", &HashMap::new(), None),
            Err(ResolveError::Cancelled)
        ));
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn import_paths_join_with_slashes() {
        assert_eq!(join_import_path("example.com/m", Path::new("")), "example.com/m");
        assert_eq!(
            join_import_path("example.com/m", Path::new("a").join("b").as_path()),
            "example.com/m/a/b"
        );
        assert_eq!(join_import_path("m", Path::new("./x")), "m/x");
    }
}
