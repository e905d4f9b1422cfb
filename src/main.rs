use anyhow::Result;

fn main() -> Result<()> {
    // Initialize core
    stratus_core::init()?;

    let config = stratus_core::Config::load()?;
    let validation = config.validate();

    tracing::info!("Stratus engine started");

    println!("Stratus - multi-source weather refresh engine");
    println!(
        "Config file: {}",
        stratus_core::Config::config_file_path()?.display()
    );

    if !validation.is_valid() {
        println!("Configuration problems: {}", validation.error_summary());
    }
    for warning in &validation.warnings {
        println!("Warning: {}", warning);
    }

    Ok(())
}
