use clap::Parser;

fn main() {
    dockship::clock::init();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(error) = dockship::cli::Cli::parse().run() {
        use dockship::ansi::{BOLD, BOLD_RED, RESET};
        eprintln!("{BOLD_RED}error{RESET}{BOLD}:{RESET} {error}");
        std::process::exit(1);
    }
}
