// Purpose: Turn a Resolution into Go toolchain invocations: extract archives, compile, link, package.
// Inputs/Outputs: Resolution + platform + work dir in; linked executable or per-platform library zip out.
// Invariants: Packages compile strictly in resolution order; each one sees every earlier object in importcfg.
// Gotchas: Import paths contain '/', so object files live in nested directories under the work dir.

use anyhow::{Context, bail};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;

use crate::pkg::archive::{METADATA_DIR, OBJECT_EXT, archive_file_name};
use crate::pkg::{Origin, PackageRecord, Resolution};
use crate::toolchain::{Platform, go, std_exports};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutput {
    Executable(PathBuf),
    Library(PathBuf),
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub module_path: String,
    pub toolchain: String,
    pub work_dir: PathBuf,
    // Executable path with a target; library output directory without one.
    pub output: PathBuf,
}

pub fn object_path(root: &Path, import_path: &str) -> PathBuf {
    let mut p = root.to_path_buf();
    let (parent, base) = import_path.rsplit_once('/').unwrap_or(("", import_path));
    for seg in parent.split('/').filter(|s| !s.is_empty()) {
        p.push(seg);
    }
    p.push(format!("{}{}", base, OBJECT_EXT));
    p
}

fn in_module(module_path: &str, import_path: &str) -> bool {
    import_path == module_path
        || import_path
            .strip_prefix(module_path)
            .is_some_and(|rest| rest.starts_with('/'))
}

pub fn render_importcfg(entries: &BTreeMap<String, PathBuf>) -> String {
    let mut out = String::from("# import config\n");
    for (path, file) in entries {
        out.push_str(&format!("packagefile {}={}\n", path, file.display()));
    }
    out
}

pub fn compile_args(package: &str, importcfg: &Path, obj: &Path, files: &[PathBuf]) -> Vec<String> {
    let mut args = vec![
        "tool".to_string(),
        "compile".to_string(),
        "-p".to_string(),
        package.to_string(),
        "-importcfg".to_string(),
        importcfg.display().to_string(),
        "-pack".to_string(),
        "-o".to_string(),
        obj.display().to_string(),
    ];
    args.extend(files.iter().map(|f| f.display().to_string()));
    args
}

pub fn link_args(importcfg: &Path, output: &Path, obj: &Path) -> Vec<String> {
    vec![
        "tool".to_string(),
        "link".to_string(),
        "-importcfg".to_string(),
        importcfg.display().to_string(),
        "-o".to_string(),
        output.display().to_string(),
        obj.display().to_string(),
    ]
}

// Copies every archive-provided object to `<pkg_dir>/<import path>.a`, opening each zip once.
pub fn extract_archives(
    archived: &[PackageRecord],
    pkg_dir: &Path,
) -> anyhow::Result<BTreeMap<String, PathBuf>> {
    let mut by_archive: HashMap<&Path, Vec<(&str, &str)>> = HashMap::new();
    for rec in archived {
        if let Origin::Archive { archive, entry } = &rec.origin {
            by_archive
                .entry(archive.as_path())
                .or_default()
                .push((rec.import_path.as_str(), entry.as_str()));
        }
    }

    let mut out = BTreeMap::new();
    for (archive, entries) in by_archive {
        let file = fs::File::open(archive)
            .with_context(|| format!("open archive {}", archive.display()))?;
        let mut zip = zip::ZipArchive::new(file)
            .with_context(|| format!("read archive {}", archive.display()))?;
        for (import_path, entry) in entries {
            let mut src = zip
                .by_name(entry)
                .with_context(|| format!("entry {} in {}", entry, archive.display()))?;
            let mut bytes = Vec::new();
            src.read_to_end(&mut bytes)?;
            let dst = object_path(pkg_dir, import_path);
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&dst, bytes).with_context(|| format!("write {}", dst.display()))?;
            out.insert(import_path.to_string(), dst);
        }
    }
    debug!(count = out.len(), "extracted archive objects");
    Ok(out)
}

// Writes `<out_dir>/.goyp/<OS>@<ARCH>@<toolchain>.zip` with one `<import path>.a` entry per object.
pub fn package_library(
    objects: &BTreeMap<String, PathBuf>,
    out_dir: &Path,
    platform: &Platform,
    toolchain: &str,
) -> anyhow::Result<PathBuf> {
    let ctx = platform.context(toolchain);
    let dest = out_dir.join(METADATA_DIR).join(archive_file_name(&ctx));
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(&dest).with_context(|| format!("create {}", dest.display()))?;
    let mut zip = zip::ZipWriter::new(file);
    let opts = SimpleFileOptions::default();
    for (import_path, obj) in objects {
        let bytes = fs::read(obj).with_context(|| format!("read {}", obj.display()))?;
        zip.start_file(format!("{}{}", import_path, OBJECT_EXT), opts)?;
        zip.write_all(&bytes)?;
    }
    zip.finish()?;
    Ok(dest)
}

fn run_go(args: &[String], platform: &Platform) -> anyhow::Result<()> {
    let refs: Vec<&str> = args.iter().map(String::as_str).collect();
    go(&refs, &[("GOOS", platform.os.as_str()), ("GOARCH", platform.arch.as_str())])?;
    Ok(())
}

fn source_files(rec: &PackageRecord) -> anyhow::Result<&[PathBuf]> {
    match &rec.origin {
        Origin::Source { files, .. } if !files.is_empty() => Ok(files.as_slice()),
        Origin::Source { dir, .. } => bail!("no buildable Go source files in {}", dir.display()),
        Origin::Archive { archive, .. } => bail!(
            "package '{}' comes from archive {} and cannot be recompiled",
            rec.import_path,
            archive.display()
        ),
    }
}

// Precondition: `resolution` came from a successful resolve for `platform`.
// Side effects: writes under `opts.work_dir` and `opts.output`; runs `go tool compile/link`.
pub fn build(
    resolution: &Resolution,
    platform: &Platform,
    opts: &BuildOptions,
) -> anyhow::Result<BuildOutput> {
    let pkg_dir = opts.work_dir.join("pkg");
    let obj_dir = opts.work_dir.join("obj");
    fs::create_dir_all(&obj_dir)?;
    let importcfg = opts.work_dir.join("importcfg");

    let mut cfg = std_exports(platform)?;
    cfg.extend(extract_archives(&resolution.archived, &pkg_dir)?);

    let mut produced = BTreeMap::new();
    for rec in resolution.libraries() {
        let obj = object_path(&obj_dir, &rec.import_path);
        if let Some(parent) = obj.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&importcfg, render_importcfg(&cfg))?;
        info!(package = %rec.import_path, "compile");
        run_go(
            &compile_args(&rec.import_path, &importcfg, &obj, source_files(rec)?),
            platform,
        )?;
        cfg.insert(rec.import_path.clone(), obj.clone());
        if in_module(&opts.module_path, &rec.import_path) {
            produced.insert(rec.import_path.clone(), obj);
        }
    }

    let Some(target) = resolution.target() else {
        if produced.is_empty() {
            bail!("module '{}' has no library packages to package", opts.module_path);
        }
        let dest = package_library(&produced, &opts.output, platform, &opts.toolchain)?;
        info!(archive = %dest.display(), packages = produced.len(), "wrote library archive");
        return Ok(BuildOutput::Library(dest));
    };

    let obj = obj_dir.join("main.a");
    fs::write(&importcfg, render_importcfg(&cfg))?;
    info!(package = %target.import_path, "compile");
    run_go(&compile_args("main", &importcfg, &obj, source_files(target)?), platform)?;
    info!(output = %opts.output.display(), "link");
    run_go(&link_args(&importcfg, &opts.output, &obj), platform)?;
    Ok(BuildOutput::Executable(opts.output.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::PackageKind;
    use crate::pkg::testutil::{temp_dir, write_zip};
    use std::collections::BTreeSet;

    fn archived(import_path: &str, archive: &Path, entry: &str) -> PackageRecord {
        PackageRecord {
            import_path: import_path.to_string(),
            name: import_path.rsplit('/').next().unwrap_or("").to_string(),
            kind: PackageKind::Library,
            imports: BTreeSet::new(),
            origin: Origin::Archive {
                archive: archive.to_path_buf(),
                entry: entry.to_string(),
            },
        }
    }

    #[test]
    fn object_paths_nest_by_import_segment() {
        assert_eq!(
            object_path(Path::new("/w/obj"), "example.com/lib/sub"),
            Path::new("/w/obj").join("example.com").join("lib").join("sub.a")
        );
        assert_eq!(
            object_path(Path::new("/w/obj"), "example.com"),
            Path::new("/w/obj").join("example.com.a")
        );
    }

    #[test]
    fn module_membership_respects_segment_boundaries() {
        assert!(in_module("example.com/app", "example.com/app"));
        assert!(in_module("example.com/app", "example.com/app/util"));
        assert!(!in_module("example.com/app", "example.com/apple"));
        assert!(!in_module("example.com/app", "example.com/dep"));
    }

    #[test]
    fn importcfg_lists_every_package() {
        let mut m = BTreeMap::new();
        m.insert("fmt".to_string(), PathBuf::from("/c/fmt.a"));
        m.insert("example.com/lib".to_string(), PathBuf::from("/w/pkg/example.com/lib.a"));
        assert_eq!(
            render_importcfg(&m),
            "# import config\npackagefile example.com/lib=/w/pkg/example.com/lib.a\npackagefile fmt=/c/fmt.a\n"
        );
    }

    #[test]
    fn tool_arguments() {
        let args = compile_args(
            "example.com/lib",
            Path::new("/w/importcfg"),
            Path::new("/w/obj/lib.a"),
            &[PathBuf::from("/m/a.go"), PathBuf::from("/m/b.go")],
        );
        assert_eq!(
            args,
            vec![
                "tool", "compile", "-p", "example.com/lib", "-importcfg", "/w/importcfg", "-pack",
                "-o", "/w/obj/lib.a", "/m/a.go", "/m/b.go"
            ]
        );
        assert_eq!(
            link_args(Path::new("/w/importcfg"), Path::new("/out/app"), Path::new("/w/obj/main.a")),
            vec!["tool", "link", "-importcfg", "/w/importcfg", "-o", "/out/app", "/w/obj/main.a"]
        );
    }

    #[test]
    fn extracts_archive_entries_under_import_paths() {
        let root = temp_dir("compile-extract");
        let zip_path = root.join("cache").join("linux@amd64@go1.22.0.zip");
        write_zip(&zip_path, &["lib/sub.a", "lib/other.a"]);
        let recs = vec![
            archived("example.com/lib/sub", &zip_path, "lib/sub.a"),
            archived("example.com/lib/other", &zip_path, "lib/other.a"),
        ];
        let out = extract_archives(&recs, &root.join("pkg")).expect("extract");
        assert_eq!(out.len(), 2);
        let sub = &out["example.com/lib/sub"];
        assert_eq!(sub, &object_path(&root.join("pkg"), "example.com/lib/sub"));
        assert_eq!(fs::read(sub).expect("read"), b"!<arch>\n");

        let bad = vec![archived("example.com/lib/gone", &zip_path, "lib/gone.a")];
        assert!(extract_archives(&bad, &root.join("pkg")).is_err());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn library_zip_uses_platform_name_and_import_path_entries() {
        let root = temp_dir("compile-package");
        let obj = root.join("obj.a");
        fs::write(&obj, b"!<arch>\n").expect("write obj");
        let mut objects = BTreeMap::new();
        objects.insert("example.com/app/util".to_string(), obj);
        let platform = Platform {
            os: "linux".into(),
            arch: "arm64".into(),
        };
        let dest = package_library(&objects, &root, &platform, "go1.22.0").expect("package");
        assert_eq!(dest, root.join(".goyp").join("linux@arm64@go1.22.0.zip"));

        let mut zip = zip::ZipArchive::new(fs::File::open(&dest).expect("open")).expect("zip");
        assert_eq!(zip.len(), 1);
        assert_eq!(zip.by_index(0).expect("entry").name(), "example.com/app/util.a");
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn archive_records_cannot_be_recompiled() {
        let rec = archived("example.com/lib", Path::new("/c/x.zip"), "lib.a");
        assert!(source_files(&rec).is_err());
    }
}
