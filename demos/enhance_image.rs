use restorer::config::Config;
use restorer::models::{ModelManager, WeightStatus};
use restorer::utils::{create_output_dir, derive_output_filename, validate_image_path};
use restorer::ImageEnhancer;
use std::path::PathBuf;

/// Example walking through the full enhancement sequence
///
/// Run with: `cargo run --example enhance_image -- <input> [output]`
///
/// Steps:
/// 1. Download any missing weights into ./models
/// 2. Load both runners
/// 3. Validate the input path
/// 4. Upscale, then restore faces, writing both results
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("warn"))
        .init();

    let mut args = std::env::args().skip(1);
    let input = PathBuf::from(args.next().unwrap_or_else(|| "input.jpg".to_string()));
    let output = args
        .next()
        .map_or_else(|| derive_output_filename(&input), PathBuf::from);

    println!("Image Enhancement Example");
    println!("=========================\n");

    let config = Config::default();

    println!("Checking models...");
    let mut manager = ModelManager::new(&config)?.with_progress(true);
    let report = manager.download_all().await?;
    for (name, e) in &report.failed {
        println!("✗ Could not download {name}: {e}");
    }

    let missing: Vec<String> = manager
        .verify()?
        .into_iter()
        .filter(|r| r.status != WeightStatus::Ready)
        .map(|r| r.name)
        .collect();
    if !missing.is_empty() {
        println!("Models not ready: {}", missing.join(", "));
        return Ok(());
    }
    println!("✓ Models ready\n");

    if let Err(e) = validate_image_path(&input) {
        println!("✗ {e}");
        return Ok(());
    }

    let enhancer = ImageEnhancer::from_config(&config)?;

    let upscaled_path = output.with_file_name(format!(
        "{}_upscaled.png",
        input.file_stem().map_or_else(String::new, |s| s.to_string_lossy().into_owned())
    ));
    create_output_dir(&upscaled_path)?;

    match enhancer.upscale_image(&input, &upscaled_path) {
        Ok(image) => println!(
            "✓ Upscaled to {}x{}: {}",
            image.width(),
            image.height(),
            upscaled_path.display()
        ),
        Err(e) => println!("✗ Upscaling failed: {e}"),
    }

    match enhancer.enhance_faces(&input, &output) {
        Ok(image) => println!(
            "✓ Faces restored ({}x{}): {}",
            image.width(),
            image.height(),
            output.display()
        ),
        Err(e) => println!("✗ Face restoration failed: {e}"),
    }

    Ok(())
}
