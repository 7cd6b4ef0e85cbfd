//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

#[expect(
    clippy::print_stderr,
    reason = "The binary reports fatal errors on standard error"
)]
fn main() {
    if let Err(err) = registrar_cli::run() {
        eprintln!("registrar: {err}");
        std::process::exit(1);
    }
}
