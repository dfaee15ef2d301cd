// Purpose: Drain the package universe into a dependency-respecting compile order.
// Inputs/Outputs: Registered discovery records (+ optional target executable) in; ordered records out.
// Invariants: Every emitted library follows all of its non-baseline imports; the target is emitted last.
// Gotchas: Each pass rebuilds the queue from the still-pending partition instead of splicing in place;
// packages resolved earlier in a pass are already visible to later entries of the same pass.

use std::collections::BTreeSet;
use strsim::jaro_winkler;
use tracing::debug;

use crate::pkg::cancel::CancelToken;
use crate::pkg::error::{ResolveError, Result};
use crate::pkg::universe::{Origin, PackageRecord, Status, Universe};

const SUGGEST_THRESHOLD: f64 = 0.84;

#[derive(Debug)]
struct QueueEntry {
    record: PackageRecord,
    remaining: BTreeSet<String>,
    is_target: bool,
}

fn unresolved_imports(universe: &Universe, record: &PackageRecord) -> BTreeSet<String> {
    record
        .imports
        .iter()
        .filter(|imp| !universe.is_resolved(imp))
        .cloned()
        .collect()
}

fn suggest_import(universe: &Universe, missing: &str) -> Option<String> {
    let mut best: Option<(&str, f64)> = None;
    for cand in universe.known_paths() {
        let score = jaro_winkler(missing, cand);
        let better = match best {
            None => true,
            Some((b, s)) => score > s || (score == s && cand < b),
        };
        if better {
            best = Some((cand, score));
        }
    }
    match best {
        Some((name, score)) if score >= SUGGEST_THRESHOLD => Some(name.to_string()),
        _ => None,
    }
}

// Precondition: every record in `discovered` and the target (if any) is already registered in `universe`.
// Postcondition: on success all discovered source libraries are Resolved and appear in the returned order.
// Side effects: mutates `universe` statuses (unresolved -> resolved) only.
pub fn resolve_order(
    universe: &mut Universe,
    discovered: Vec<PackageRecord>,
    target: Option<PackageRecord>,
    cancel: &CancelToken,
) -> Result<Vec<PackageRecord>> {
    let mut order = Vec::with_capacity(discovered.len() + 1);
    let mut queue = Vec::new();
    let mut ready_target = None;

    for record in discovered {
        if record.is_executable() || matches!(record.origin, Origin::Archive { .. }) {
            continue;
        }
        let remaining = unresolved_imports(universe, &record);
        if remaining.is_empty() {
            universe.mark_resolved(&record.import_path);
            order.push(record);
        } else {
            queue.push(QueueEntry {
                record,
                remaining,
                is_target: false,
            });
        }
    }

    if let Some(record) = target {
        let remaining = unresolved_imports(universe, &record);
        if remaining.is_empty() {
            ready_target = Some(record);
        } else {
            queue.push(QueueEntry {
                record,
                remaining,
                is_target: true,
            });
        }
    }
    debug!(
        resolved = order.len(),
        queued = queue.len(),
        "seeded resolver queue"
    );

    let mut pass = 0usize;
    while !queue.is_empty() {
        cancel.check()?;
        pass += 1;
        let mut resolved_this_pass = 0usize;
        let mut pending = Vec::with_capacity(queue.len());

        for mut entry in queue.drain(..) {
            let mut still = BTreeSet::new();
            for imp in std::mem::take(&mut entry.remaining) {
                match universe.get(&imp) {
                    None => {
                        return Err(ResolveError::MissingPackage {
                            importer: entry.record.import_path.clone(),
                            suggestion: suggest_import(universe, &imp),
                            import_path: imp,
                        });
                    }
                    Some(Status::KnownExecutable(_)) => {
                        return Err(ResolveError::IllegalExecutableImport {
                            importer: entry.record.import_path.clone(),
                            import_path: imp,
                        });
                    }
                    Some(Status::Resolved(_)) => {}
                    Some(Status::KnownUnresolved(_)) => {
                        still.insert(imp);
                    }
                }
            }

            if !still.is_empty() {
                entry.remaining = still;
                pending.push(entry);
                continue;
            }
            resolved_this_pass += 1;
            if entry.is_target {
                ready_target = Some(entry.record);
            } else {
                universe.mark_resolved(&entry.record.import_path);
                order.push(entry.record);
            }
        }

        debug!(pass, resolved = resolved_this_pass, pending = pending.len(), "resolver pass");
        if resolved_this_pass == 0 {
            let mut stuck: Vec<String> = pending
                .iter()
                .map(|e| e.record.import_path.clone())
                .collect();
            stuck.sort();
            return Err(ResolveError::CircularDependency { pending: stuck });
        }
        queue = pending;
    }

    if let Some(t) = ready_target {
        order.push(t);
    }
    Ok(order)
}
