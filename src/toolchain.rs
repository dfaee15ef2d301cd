// Purpose: Read Go toolchain metadata and environment configuration for a goyp run.
// Inputs/Outputs: Runs `go env`/`go list`, reads $GOROOT/VERSION; yields env map, baseline, platforms.
// Invariants: Process environment always overrides values reported by `go env -json`.
// Gotchas: Every helper that shells out has a pure parsing twin so tests never need a Go install.

use anyhow::{Context, bail};
use directories::BaseDirs;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use tracing::debug;

use crate::pkg::{BuildContext, StdBaseline};

static GO_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^go1(\.(0|[1-9][0-9]*)){0,2}((rc|beta)[1-9][0-9]*)?$").expect("valid go version regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn context(&self, toolchain: &str) -> BuildContext {
        BuildContext::new(&self.os, &self.arch, toolchain)
    }
}

pub fn go(args: &[&str], env: &[(&str, &str)]) -> anyhow::Result<String> {
    let mut cmd = Command::new("go");
    cmd.args(args);
    for (k, v) in env {
        cmd.env(k, v);
    }
    debug!(args = ?args, "running go");
    let out = cmd.output().context("failed to execute go (is it in PATH?)")?;
    if !out.status.success() {
        bail!(
            "command 'go {}' exited with code {}: {}",
            args.join(" "),
            out.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&out.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&out.stdout).to_string())
}

#[derive(Debug, Clone, Default)]
pub struct GoEnv {
    vars: HashMap<String, String>,
}

impl GoEnv {
    pub fn load() -> anyhow::Result<Self> {
        let json = go(&["env", "-json"], &[])?;
        Self::from_json(&json, std::env::vars())
    }

    pub fn from_json<I>(json: &str, overrides: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut vars: HashMap<String, String> =
            serde_json::from_str(json).context("invalid json returned by 'go env -json'")?;
        vars.extend(overrides);
        Ok(Self { vars })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    pub fn goroot(&self) -> anyhow::Result<PathBuf> {
        let root = self.get("GOROOT").context("could not determine GOROOT")?;
        let p = PathBuf::from(root);
        if !p.is_absolute() {
            bail!("GOROOT '{}' is not an absolute path", root);
        }
        Ok(p)
    }

    pub fn mod_cache(&self) -> anyhow::Result<PathBuf> {
        let p = if let Some(c) = self.get("GOMODCACHE") {
            PathBuf::from(c)
        } else if let Some(first) = self
            .get("GOPATH")
            .and_then(|gp| std::env::split_paths(gp).next())
        {
            first.join("pkg").join("mod")
        } else {
            let dirs = BaseDirs::new().context("cannot determine home directory")?;
            dirs.home_dir().join("go").join("pkg").join("mod")
        };
        if !p.is_absolute() {
            bail!("module cache '{}' is not an absolute path", p.display());
        }
        Ok(p)
    }

    // GOYP_TARGETS wins; otherwise the single GOOS/GOARCH platform.
    pub fn platforms(&self) -> anyhow::Result<Vec<Platform>> {
        if let Some(raw) = self.get("GOYP_TARGETS") {
            return parse_targets(raw);
        }
        let os = self.get("GOOS").context("could not determine GOOS")?;
        let arch = self.get("GOARCH").context("could not determine GOARCH")?;
        Ok(vec![Platform {
            os: os.to_string(),
            arch: arch.to_string(),
        }])
    }
}

pub fn parse_targets(raw: &str) -> anyhow::Result<Vec<Platform>> {
    let mut out: Vec<Platform> = Vec::new();
    for t in raw.split(',').map(str::trim) {
        let (os, arch) = t.split_once('_').unwrap_or((t, ""));
        if os.is_empty() || arch.is_empty() {
            bail!("invalid target '{}' found in GOYP_TARGETS environment variable", t);
        }
        let p = Platform {
            os: os.to_string(),
            arch: arch.to_string(),
        };
        if !out.contains(&p) {
            out.push(p);
        }
    }
    Ok(out)
}

pub fn is_valid_go_version(v: &str) -> bool {
    GO_VERSION.is_match(v)
}

pub fn parse_version_file(text: &str, origin: &Path) -> anyhow::Result<String> {
    let v = text.lines().next().unwrap_or("").trim();
    if !is_valid_go_version(v) {
        bail!(
            "version '{}' obtained from '{}' file is not a valid version",
            v,
            origin.display()
        );
    }
    Ok(v.to_string())
}

pub fn toolchain_version(goroot: &Path) -> anyhow::Result<String> {
    let path = goroot.join("VERSION");
    let text = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    parse_version_file(&text, &path)
}

pub fn list_std() -> anyhow::Result<StdBaseline> {
    let out = go(&["list", "std"], &[])?;
    let baseline = StdBaseline::from_go_list(&out);
    if baseline.is_empty() {
        bail!("'go list std' returned no packages");
    }
    Ok(baseline)
}

// Lines of `ImportPath=ExportFile`; packages without export data are skipped.
pub fn parse_export_list(text: &str) -> BTreeMap<String, PathBuf> {
    text.lines()
        .filter_map(|l| l.trim().split_once('='))
        .filter(|(p, f)| !p.is_empty() && !f.is_empty())
        .map(|(p, f)| (p.to_string(), PathBuf::from(f)))
        .collect()
}

pub fn std_exports(platform: &Platform) -> anyhow::Result<BTreeMap<String, PathBuf>> {
    let out = go(
        &["list", "-export", "-f", "{{.ImportPath}}={{.Export}}", "std"],
        &[("GOOS", platform.os.as_str()), ("GOARCH", platform.arch.as_str())],
    )?;
    Ok(parse_export_list(&out))
}
