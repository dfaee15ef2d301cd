use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::{Level, info};

use crate::compile::{BuildOptions, BuildOutput, build};
use crate::pkg::modfile::ModFile;
use crate::pkg::{CancelToken, Resolution, ResolveRequest, Resolver, StdBaseline};
use crate::toolchain::{GoEnv, Platform, list_std, toolchain_version};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Build {
        output: Option<PathBuf>,
        target: Option<String>,
        dir: PathBuf,
    },
    List {
        target: Option<String>,
        json: bool,
        dir: PathBuf,
    },
    Version,
    Help,
}

pub fn run_cli<I>(args: I) -> i32
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter().peekable();
    if args.peek().is_none() {
        print_usage();
        return 1;
    }
    let inv = match parse_args(args) {
        Ok(inv) => inv,
        Err(msg) => {
            eprintln!("{}", msg);
            print_usage();
            return 1;
        }
    };
    init_tracing();
    match inv {
        Invocation::Help => {
            print_usage();
            0
        }
        Invocation::Version => {
            println!("{}", version_line());
            0
        }
        other => match run(other) {
            Ok(()) => 0,
            Err(err) => {
                eprintln!("goyp: {:#}", err);
                1
            }
        },
    }
}

pub fn parse_args<I>(args: I) -> Result<Invocation, String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let cmd = args.next().unwrap_or_default();
    match cmd.as_str() {
        "help" | "-h" | "--help" => return Ok(Invocation::Help),
        "version" | "--version" => return Ok(Invocation::Version),
        "build" | "list" => {}
        other => return Err(format!("unknown command: {}", other)),
    }

    let mut output = None;
    let mut target = None;
    let mut json = false;
    let mut dir = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-o" if cmd == "build" => match args.next() {
                Some(p) => output = Some(PathBuf::from(p)),
                None => return Err("expected output after -o".to_string()),
            },
            "-t" => match args.next() {
                Some(t) => target = Some(t),
                None => return Err("expected target package after -t".to_string()),
            },
            "-json" if cmd == "list" => json = true,
            a if a.starts_with('-') => return Err(format!("unknown argument: {}", a)),
            a => {
                if dir.is_some() {
                    return Err(format!("unexpected argument: {}", a));
                }
                dir = Some(PathBuf::from(a));
            }
        }
    }
    let dir = dir.unwrap_or_else(|| PathBuf::from("."));
    if cmd == "build" {
        Ok(Invocation::Build {
            output,
            target,
            dir,
        })
    } else {
        Ok(Invocation::List { target, json, dir })
    }
}

fn print_usage() {
    eprintln!("usage: goyp build [-o output] [-t target-pkg] [module-dir]");
    eprintln!("   or: goyp list [-t target-pkg] [-json] [module-dir]");
    eprintln!("   or: goyp version");
}

fn version_line() -> String {
    match option_env!("GOYP_GIT_COMMIT") {
        Some(commit) => format!("goyp {} ({})", env!("CARGO_PKG_VERSION"), commit),
        None => format!("goyp {}", env!("CARGO_PKG_VERSION")),
    }
}

fn trace_enabled() -> bool {
    std::env::var("GOYP_TRACE").ok().as_deref() == Some("1")
}

fn init_tracing() {
    let level = if trace_enabled() {
        Level::DEBUG
    } else {
        Level::WARN
    };
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .with_max_level(level)
        .try_init();
}

struct Session {
    module_root: PathBuf,
    modfile: ModFile,
    baseline: StdBaseline,
    toolchain: String,
    mod_cache: PathBuf,
    platforms: Vec<Platform>,
    cancel: CancelToken,
}

impl Session {
    fn open(dir: &Path) -> anyhow::Result<Self> {
        let module_root = dir
            .canonicalize()
            .with_context(|| format!("module directory {}", dir.display()))?;
        let modfile = ModFile::read(&module_root.join("go.mod"))?;
        let env = GoEnv::load()?;
        let toolchain = toolchain_version(&env.goroot()?)?;
        let mod_cache = env.mod_cache()?;
        let platforms = env.platforms()?;
        let baseline = list_std()?;
        info!(
            module = %modfile.module,
            toolchain = %toolchain,
            std = baseline.len(),
            platforms = platforms.len(),
            "session ready"
        );
        Ok(Self {
            module_root,
            modfile,
            baseline,
            toolchain,
            mod_cache,
            platforms,
            cancel: CancelToken::new(),
        })
    }

    fn resolve(&self, platform: &Platform, target: Option<&str>) -> anyhow::Result<Resolution> {
        let req = ResolveRequest {
            module_root: self.module_root.clone(),
            module_path: self.modfile.module.clone(),
            target: target.map(str::to_string),
            requires: self.modfile.require.clone(),
            context: platform.context(&self.toolchain),
            mod_cache: self.mod_cache.clone(),
        };
        let res = Resolver::new(&self.baseline)
            .with_cancel(self.cancel.clone())
            .resolve(&req)?;
        Ok(res)
    }
}

fn run(inv: Invocation) -> anyhow::Result<()> {
    match inv {
        Invocation::List { target, json, dir } => {
            let session = Session::open(&dir)?;
            let multi = session.platforms.len() > 1;
            for platform in &session.platforms {
                let res = session.resolve(platform, target.as_deref())?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&res)?);
                    continue;
                }
                if multi {
                    println!("# {}_{}", platform.os, platform.arch);
                }
                print!("{}", render_listing(&res));
            }
            Ok(())
        }
        Invocation::Build {
            output,
            target,
            dir,
        } => {
            let session = Session::open(&dir)?;
            let multi = session.platforms.len() > 1;
            for platform in &session.platforms {
                let res = session.resolve(platform, target.as_deref())?;
                let out = match &target {
                    Some(t) => executable_output(output.as_deref(), t, platform, multi),
                    None => output.clone().unwrap_or_else(|| session.module_root.clone()),
                };
                let work_dir = std::env::temp_dir().join(format!(
                    "goyp-{}-{}_{}",
                    std::process::id(),
                    platform.os,
                    platform.arch
                ));
                let opts = BuildOptions {
                    module_path: session.modfile.module.clone(),
                    toolchain: session.toolchain.clone(),
                    work_dir: work_dir.clone(),
                    output: out,
                };
                let built = build(&res, platform, &opts);
                let _ = std::fs::remove_dir_all(&work_dir);
                match built? {
                    BuildOutput::Executable(p) => eprintln!("built {}", p.display()),
                    BuildOutput::Library(p) => eprintln!("packaged {}", p.display()),
                }
            }
            Ok(())
        }
        Invocation::Version | Invocation::Help => Ok(()),
    }
}

pub fn render_listing(res: &Resolution) -> String {
    let mut out = String::new();
    for rec in &res.order {
        out.push_str(&rec.import_path);
        out.push('\n');
    }
    for a in &res.archives {
        out.push_str(&format!("(archive) {}\n", a.display()));
    }
    out
}

pub fn executable_output(
    output: Option<&Path>,
    target: &str,
    platform: &Platform,
    multi: bool,
) -> PathBuf {
    let mut name = match output {
        Some(p) => p.display().to_string(),
        None => Path::new(target)
            .file_name()
            .and_then(|s| s.to_str())
            .filter(|s| *s != "." && !s.is_empty())
            .unwrap_or("a.out")
            .to_string(),
    };
    if multi {
        name.push_str(&format!("_{}_{}", platform.os, platform.arch));
    }
    if platform.os == "windows" && !name.ends_with(".exe") {
        name.push_str(".exe");
    }
    PathBuf::from(name)
}
