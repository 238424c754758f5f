#[tokio::main]
async fn main() -> anyhow::Result<()> {
    relay_server::run().await
}
