mod display;
mod host;
mod hub;
mod service;
#[cfg(feature = "waveshare")]
mod waveshare;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
