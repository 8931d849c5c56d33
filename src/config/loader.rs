use config::{Config, Environment, File, FileFormat};

use super::settings::AppSettings;

/// Layered load: built-in defaults < `config/default.toml` < `config/{environment}.toml` <
/// `APP__`-prefixed environment variables. `.env` is read first via dotenvy so secrets (API
/// keys, bot tokens) can live outside the committed TOML files.
pub fn load(environment: &str) -> anyhow::Result<AppSettings> {
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            return Err(anyhow::anyhow!("failed to load .env: {err}"));
        }
    }

    let defaults = AppSettings::default();

    let builder = Config::builder()
        .add_source(Config::try_from(&defaults)?)
        .add_source(File::new("config/default", FileFormat::Toml).required(false))
        .add_source(File::new(&format!("config/{environment}"), FileFormat::Toml).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .separator("__")
                .try_parsing(true),
        );

    let raw = builder.build()?;
    let settings: AppSettings = raw.try_deserialize()?;
    Ok(settings)
}

/// Applies CLI-level overrides after the layered file/env load, matching the precedence
/// CLI flags > everything else.
pub fn apply_cli_overrides(
    mut settings: AppSettings,
    testnet: Option<bool>,
    log_level: Option<String>,
) -> AppSettings {
    if let Some(testnet) = testnet {
        settings.exchange.use_testnet = testnet;
    }
    if let Some(log_level) = log_level {
        settings.logging.level = log_level;
    }
    settings
}
