fn main() {
    std::process::exit(rlimit_wrapper::cli::run());
}
