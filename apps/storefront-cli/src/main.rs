//! Storefront command-line entry point. See the library docs for the protocol.

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    storefront_cli::run().await
}
