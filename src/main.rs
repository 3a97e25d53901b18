use cpscheme::Runtime;

fn main() {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Warn)
        .env()
        .init()
        .unwrap();

    let runtime = Runtime::new();
    if let Err(e) = runtime.repl() {
        eprintln!("ERROR: {e}");
        std::process::exit(1);
    }
}
