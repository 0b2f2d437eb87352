//! CouponFinder CLI.
//!
//! Resolves a shopping site from a URL, asks a Gemini model for coupon codes,
//! and prints the ones that survive validation. Results are cached per site.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}