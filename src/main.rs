fn main() {
    if let Err(e) = dozo_lib::run() {
        eprintln!("dozo: {e}");
        std::process::exit(1);
    }
}
