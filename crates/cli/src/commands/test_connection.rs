use tracing::error;

/// Run the `test-connection` command against the current directory
/// configuration, or against a candidate read from `file`.
pub async fn run(config_path: &str, file: Option<&str>) -> anyhow::Result<()> {
    let engine = super::open(config_path).await?;
    let candidate = file.map(super::read_directory_file).transpose()?;

    match engine.coordinator.test_connection(candidate).await {
        Ok(report) => {
            println!("Connection test: SUCCESS");
            println!("  {}", report.message);
            println!("  Elapsed: {} ms", report.elapsed_ms);
            Ok(())
        }
        Err(e) => {
            error!("Connection test failed: {e}");
            println!("Connection test: FAILED - {e}");
            Err(e.into())
        }
    }
}
