// Purpose: Provide the goyp binary entry point.
// Inputs/Outputs: Reads process args and returns process exit code from CLI dispatcher.
// Invariants: Main must not bypass centralized CLI argument/diagnostic handling.

fn main() {
    let code = goyp::cli::run_cli(std::env::args().skip(1));
    std::process::exit(code);
}
