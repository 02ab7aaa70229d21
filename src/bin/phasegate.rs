fn main() {
    std::process::exit(phasegate::app::run_cli(std::env::args_os()));
}
