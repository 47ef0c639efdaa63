use nomadcoin::cli::commands::run_cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging is initialized by the CLI once the debug flag is known
    run_cli().await
}
