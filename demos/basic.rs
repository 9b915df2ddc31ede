/// Basic example: create an archive, verify it, and extract it
///
/// Run with: cargo run --example basic
use archpack::{Archiver, Context, Engine};
use std::error::Error;
use std::fs;
use tempfile::TempDir;

fn main() -> Result<(), Box<dyn Error>> {
    println!("=== archpack Basic Example ===\n");

    let work = TempDir::new()?;
    let engine = Engine::new();
    let ctx = Context::new().with_compression_level(9)?;

    // Some input files
    let readme = work.path().join("readme.txt");
    let data = work.path().join("data.json");
    fs::write(&readme, b"This is a readme file for the basic example.")?;
    fs::write(&data, br#"{"name": "Basic Example", "version": "1.0.0"}"#)?;

    println!("1. Creating archive...");
    let archive = work.path().join("example_basic.arc");
    let summary = engine.create(&ctx, &archive, &[readme, data])?;
    println!(
        "   ✓ {} files, {} bytes on disk",
        summary.file_count, summary.archive_size
    );

    println!("\n2. Listing...");
    print!("{}", engine.list(&ctx, &archive)?);

    println!("\n3. Verifying...");
    let report = engine.verify(&ctx, &archive)?;
    println!("   ✓ {}", report);

    println!("\n4. Extracting...");
    let dest = work.path().join("out");
    let extracted = engine.extract(&ctx, &archive, &dest)?;
    println!("   ✓ {} of {} entries extracted", extracted.extracted, extracted.total);

    println!("\n✓ Example complete!");
    Ok(())
}
