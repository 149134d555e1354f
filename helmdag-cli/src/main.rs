// src/main.rs

use helmdag_cli::{cli, logging, run};

#[tokio::main]
async fn main() {
    let args = cli::parse();
    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("helmdag error: {err:?}");
        std::process::exit(1);
    }
    std::process::exit(run(args).await);
}
