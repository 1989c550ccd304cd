#[cfg(feature = "server")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    action_lanes::server::run().await
}
