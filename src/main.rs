fn main() {
    if let Err(err) = complianceguard::cli::run() {
        complianceguard::ui::eprintln_error(&err);
        std::process::exit(complianceguard::exit::exit_code(&err));
    }
}
