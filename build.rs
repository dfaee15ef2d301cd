use std::env;
use std::process::Command;

// Exposes GOYP_GIT_COMMIT to `goyp version`; an explicit env value wins over git.
fn main() {
    println!("cargo:rerun-if-env-changed=GOYP_GIT_COMMIT");
    if let Some(v) = env::var("GOYP_GIT_COMMIT")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
    {
        println!("cargo:rustc-env=GOYP_GIT_COMMIT={v}");
        return;
    }

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");
    let Some(mut commit) = git(&["rev-parse", "--short=12", "HEAD"]) else {
        return;
    };
    if git(&["status", "--porcelain", "--untracked-files=no"]).is_some() {
        commit.push_str("-dirty");
    }
    println!("cargo:rustc-env=GOYP_GIT_COMMIT={commit}");
}

// Trimmed stdout of a successful git call, None when git fails or prints nothing.
fn git(args: &[&str]) -> Option<String> {
    let out = Command::new("git").args(args).output().ok()?;
    if !out.status.success() {
        return None;
    }
    let s = String::from_utf8_lossy(&out.stdout).trim().to_string();
    if s.is_empty() { None } else { Some(s) }
}
