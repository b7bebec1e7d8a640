use clap::Parser;
use plantree::cli::commands::Cli;
use plantree::cli::handlers;
use plantree::util::logging;

fn main() {
    logging::init_logging();
    let cli = Cli::parse();

    if let Err(e) = handlers::dispatch(cli) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
