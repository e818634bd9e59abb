#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = examdesk_rust::run().await {
        eprintln!("examdesk-rust fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
