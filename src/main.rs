mod cli;
use cli::parse_cli_args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging();

    let args = match parse_cli_args() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("Error: {}", err);
            println!("{}", cli::USAGE);
            return Ok(());
        }
    };

    cli::run(args)
}

fn setup_logging() {
    let log_dir = dirs::config_dir()
        .map(|d| d.join("calshare"))
        .unwrap_or_else(|| std::path::PathBuf::from("."));

    std::fs::create_dir_all(&log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(log_dir, "calshare.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false)
        .init();

    std::mem::forget(_guard);

    tracing::info!("calshare started");
}
