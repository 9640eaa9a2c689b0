use super::runner;
use crate::error::CliError;

/// Connect to the admin database and print the server time
pub async fn check() -> Result<(), CliError> {
    let runner = runner(None)?;
    let bootstrapper = runner.bootstrapper();

    println!("🔍 Checking connection to {}", bootstrapper.admin_config());
    let now = bootstrapper.check_connection().await?;

    println!("✅ Database connection OK");
    println!("   Server time: {}", now.to_rfc3339());
    Ok(())
}
