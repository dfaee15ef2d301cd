// Purpose: Package-resolution module root: discovery, archives, registry and ordering.
// Inputs/Outputs: Re-exports the resolve entry points used by the CLI and build glue.
// Invariants: Nothing under pkg shells out or reads process-wide configuration except GOYP_JOBS.
// Gotchas: Keep toolchain/process concerns in crate::toolchain and crate::compile.

pub mod archive;
pub mod baseline;
pub mod cancel;
pub mod catalog;
pub mod constraint;
pub mod error;
pub mod graph;
pub mod modfile;
pub mod resolve;
pub mod source_scan;
pub mod universe;

#[cfg(test)]
pub(crate) mod testutil;

pub use baseline::StdBaseline;
pub use cancel::CancelToken;
pub use constraint::BuildContext;
pub use error::ResolveError;
pub use resolve::{Resolution, ResolveRequest, Resolver};
pub use universe::{Origin, PackageKind, PackageRecord};
