// Purpose: Run one complete resolve: discover required modules and the main module, then order packages.
// Inputs/Outputs: ResolveRequest + std baseline in; Resolution (compile order + consulted archives) out.
// Invariants: Discovery batches merge in requirement order, then the main module; the resolver loop is single-threaded.
// Gotchas: Required modules are discovered on scoped worker threads; a worker never touches the shared universe.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::thread;
use tracing::{debug, info, warn};

use crate::pkg::archive::{ArchiveScanner, module_root};
use crate::pkg::baseline::StdBaseline;
use crate::pkg::cancel::CancelToken;
use crate::pkg::catalog::{CatalogBuilder, join_import_path};
use crate::pkg::constraint::BuildContext;
use crate::pkg::error::{ResolveError, Result};
use crate::pkg::graph::resolve_order;
use crate::pkg::modfile::Require;
use crate::pkg::universe::{Discovery, Origin, PackageRecord, Universe};

#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub module_root: PathBuf,
    pub module_path: String,
    pub target: Option<String>,
    pub requires: Vec<Require>,
    pub context: BuildContext,
    pub mod_cache: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub order: Vec<PackageRecord>,
    pub archives: BTreeSet<PathBuf>,
    // Packages satisfied by consulted archives; never part of `order`.
    pub archived: Vec<PackageRecord>,
}

impl Resolution {
    pub fn target(&self) -> Option<&PackageRecord> {
        self.order.last().filter(|r| r.is_executable())
    }

    pub fn libraries(&self) -> impl Iterator<Item = &PackageRecord> {
        self.order.iter().filter(|r| !r.is_executable())
    }
}

fn resolve_job_count(task_count: usize, requested: Option<usize>) -> usize {
    if task_count == 0 {
        return 1;
    }
    let from_env = std::env::var("GOYP_JOBS")
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|n| *n > 0);
    let default = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    requested
        .filter(|n| *n > 0)
        .or(from_env)
        .unwrap_or(default)
        .clamp(1, task_count)
}

// Runs `job` once per requirement on scoped threads, `jobs` at a time; results keep requirement order.
fn run_chunked<T, F>(requires: &[Require], jobs: usize, job: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(&Require) -> Result<T> + Sync,
{
    let job = &job;
    let mut out = Vec::with_capacity(requires.len());
    for chunk in requires.chunks(jobs.max(1)) {
        let joined: Vec<Result<T>> = thread::scope(|scope| {
            let handles: Vec<_> = chunk
                .iter()
                .map(|dep| (dep, scope.spawn(move || job(dep))))
                .collect();
            handles
                .into_iter()
                .map(|(dep, h)| {
                    h.join().unwrap_or_else(|_| {
                        Err(ResolveError::WorkerPanicked {
                            module: dep.module.clone(),
                        })
                    })
                })
                .collect()
        });
        for r in joined {
            out.push(r?);
        }
    }
    Ok(out)
}

pub struct Resolver<'a> {
    baseline: &'a StdBaseline,
    cancel: CancelToken,
    jobs: Option<usize>,
}

impl<'a> Resolver<'a> {
    pub fn new(baseline: &'a StdBaseline) -> Self {
        Self {
            baseline,
            cancel: CancelToken::new(),
            jobs: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    fn discover_required(&self, req: &ResolveRequest, dep: &Require) -> Result<Discovery> {
        let cancel = &self.cancel;
        let scanner = ArchiveScanner::new(&req.mod_cache, &req.context, cancel);
        let catalog = CatalogBuilder::new(&req.context, cancel);
        let root = module_root(&req.mod_cache, &dep.module, &dep.version);
        debug!(module = %dep.module, version = %dep.version, root = %root.display(), "discovering module");

        let mut batch = Discovery::new(&dep.module);
        let mut reserved = HashMap::new();
        if let Some(scan) = scanner.scan(&dep.module, &dep.version)? {
            for p in &scan.packages {
                reserved.insert(p.import_path.clone(), p.provenance());
            }
            if scan.packages.is_empty() {
                warn!(module = %dep.module, archive = %scan.archive.display(), "archive provides no packages");
            } else {
                batch.archive = Some(scan.archive);
            }
            batch.packages.extend(scan.packages);
        }
        let sources = catalog.walk_module(&root, &dep.module, &reserved, None)?;
        batch.packages.extend(sources);
        Ok(batch)
    }

    fn discover_all_required(&self, req: &ResolveRequest) -> Result<Vec<Discovery>> {
        let jobs = resolve_job_count(req.requires.len(), self.jobs);
        run_chunked(&req.requires, jobs, |dep| self.discover_required(req, dep))
    }

    // Precondition: `req.module_root` is the absolute root of the main module.
    // Postcondition: on error nothing is returned; the universe built here is dropped.
    // Side effects: reads the main module tree, module cache directories and archives.
    pub fn resolve(&self, req: &ResolveRequest) -> Result<Resolution> {
        self.cancel.check()?;
        let mut universe = Universe::with_baseline(self.baseline);
        let catalog = CatalogBuilder::new(&req.context, &self.cancel);

        let target = match &req.target {
            Some(t) => {
                let rec = catalog.import_target(&req.module_root, &req.module_path, t)?;
                universe.register_record(&rec)?;
                Some(rec)
            }
            None => None,
        };
        let target_path = target.as_ref().map(|t| t.import_path.clone());

        let mut archives = BTreeSet::new();
        let mut archived = Vec::new();
        let mut discovered = Vec::new();
        for batch in self.discover_all_required(req)? {
            universe.merge(&batch)?;
            if let Some(a) = batch.archive {
                archives.insert(a);
            }
            archived.extend(
                batch
                    .packages
                    .iter()
                    .filter(|p| matches!(p.origin, Origin::Archive { .. }))
                    .cloned(),
            );
            discovered.extend(batch.packages);
        }

        let mut main = Discovery::new(&req.module_path);
        main.packages = catalog.walk_module(
            &req.module_root,
            &req.module_path,
            &HashMap::new(),
            target_path.as_deref(),
        )?;
        universe.merge(&main)?;
        discovered.extend(main.packages);
        info!(
            module = %req.module_path,
            known = universe.len(),
            discovered = discovered.len(),
            archives = archives.len(),
            "discovery complete"
        );

        let order = resolve_order(&mut universe, discovered, target, &self.cancel)?;
        Ok(Resolution {
            order,
            archives,
            archived,
        })
    }
}

// Import path the main module's target directory would get, for callers that only know the relative dir.
pub fn target_import_path(module_path: &str, target: &str) -> String {
    join_import_path(module_path, Path::new(target))
}
