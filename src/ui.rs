// Terminal status output helpers

use colored::Colorize;

pub fn print_header(title: &str) {
    println!();
    println!("{}", format!("━━━ {title} ━━━").bright_cyan().bold());
    println!();
}

pub fn print_success(message: &str) {
    println!("{}", format!("✅ {message}").bright_green().bold());
}

pub fn print_error(message: &str) {
    eprintln!("{}", format!("❌ {message}").bright_red().bold());
}

pub fn print_warning(message: &str) {
    println!("{}", format!("⚠️  {message}").bright_yellow());
}
