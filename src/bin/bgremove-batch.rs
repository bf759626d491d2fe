//! Batch background removal CLI
//!
//! Removes backgrounds from a set of images, composites them onto
//! replacement backgrounds and packages the results into a zip archive.

#[cfg(feature = "cli")]
use bgremove_batch::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
