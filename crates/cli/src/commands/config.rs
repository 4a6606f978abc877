use dirsync_core::config::DirectoryConfig;

/// Operations of the `config` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    Show,
    Disable,
    Reload,
    Update { file: String },
}

/// Run the `config` command.
pub async fn run(config_path: &str, action: ConfigAction) -> anyhow::Result<()> {
    let engine = super::open(config_path).await?;
    let gate = engine.gate();

    match action {
        ConfigAction::Show => print_config(&gate.get_config()?)?,
        ConfigAction::Disable => {
            gate.disable().await?;
            println!("Directory synchronization disabled.");
        }
        ConfigAction::Reload => {
            gate.reload_config().await?;
            println!("Directory configuration reloaded.");
            print_config(&gate.get_config()?)?;
        }
        ConfigAction::Update { file } => {
            let candidate = super::read_directory_file(&file)?;
            let applied = gate.update_config(candidate).await?;
            println!("Directory configuration updated.");
            print_config(&applied)?;
        }
    }
    Ok(())
}

/// Print a (redacted) directory configuration as TOML.
fn print_config(config: &DirectoryConfig) -> anyhow::Result<()> {
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
