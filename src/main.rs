#[tokio::main]
async fn main() -> anyhow::Result<()> {
    botwatch::start_server().await
}
