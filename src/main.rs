use clap::Parser;
use stackvm::driver::{self, Cli};

fn main() {
    let cli = Cli::parse();
    std::process::exit(driver::run(cli));
}
