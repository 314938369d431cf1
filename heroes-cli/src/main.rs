//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

fn main() {
    if let Err(err) = heroes_cli::run() {
        eprintln!("heroes-dao: {err}");
        std::process::exit(1);
    }
}
