#[cfg(not(target_os = "linux"))]
compile_error!("pidtrace relies on /proc and only supports Linux");

mod cli;
mod config;
mod prelude;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    env_logger::builder()
        .parse_env(env_logger::Env::new().filter_or("PIDTRACE_LOG", "info"))
        .format_timestamp(None)
        .init();

    match cli::run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:?}");
            std::process::exit(1);
        }
    }
}
