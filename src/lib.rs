// Purpose: Define crate-level module surface for package resolution and Go build glue.
// Inputs/Outputs: Exposes the resolver core, toolchain access and CLI dispatcher to the binary and tests.
// Invariants: `pkg` stays free of process/toolchain calls; those live in `toolchain` and `compile`.
// Gotchas: Keep module wiring consistent with src/main.rs.

pub mod cli;
pub mod compile;
pub mod pkg;
pub mod toolchain;
