use anyhow::Result;

mod cli;
mod collection;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    cli::execute().await
}
