#![forbid(unsafe_code)]

use colored::*;

fn main() {
    println!("{}", "IdeaVault CLI".bright_cyan().bold());
    println!("{}", "-------------".bright_cyan());
    println!();
    println!(
        "{}",
        "This is the main entry point, but most functionality is in separate binaries.".yellow()
    );
    println!(
        "{}",
        "Use 'cargo run --bin <binary_name>' to run a specific command.".yellow()
    );
    println!();
    println!("{}", "Available binaries:".bright_green().underline());
    println!(
        "  - {}  {}",
        "ideavault-server".bright_white(),
        "run the REST API".dimmed()
    );
    println!(
        "  - {} {}",
        "ideavault-account".bright_white(),
        "generate or inspect service accounts, query the registry app".dimmed()
    );
    println!();
    println!("{}", "Example:".bright_green().underline());
    println!("{}", "  cargo run --bin ideavault-server -- --listen 127.0.0.1:3001".italic());
    println!("{}", "  cargo run --bin ideavault-account -- generate".italic());
}
