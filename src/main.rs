#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lantern::run().await
}
