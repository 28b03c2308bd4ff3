use std::path::PathBuf;

use clap::Parser;

fn default_home() -> PathBuf {
    std::env::var_os("ORACLED_HOME")
        .map(PathBuf::from)
        .or_else(|| dirs_home().map(|home| home.join(".oracled")))
        .unwrap_or_else(|| PathBuf::from(".oracled"))
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[derive(Debug, Clone, Parser)]
#[command(name = "oracled", version, about = "Oracle daemon")]
pub struct Cli {
    /// Directory holding config.toml and the keyring, defaulting to
    /// $ORACLED_HOME or $HOME/.oracled.
    #[arg(long, default_value_os_t = default_home())]
    pub home: PathBuf,

    /// Override the configured log level (also settable via RUST_LOG).
    #[arg(long)]
    pub log_level: Option<String>,
}
