use crate::config::Config;
use clap::Args;
use std::path::PathBuf;

// Global flags shared across every subcommand.
//
//   -c / --config   Path to a config.toml file
//   --listen        Handshake listen address override
//   --model         Analysis model override
#[derive(Debug, Clone, Args)]
pub struct CommonArgs {
    /// Path to a config.toml file (default: ~/.scenelink/config.toml)
    #[arg(
        short = 'c',
        long,
        value_name = "PATH",
        env = "SCENELINK_CONFIG",
        global = true
    )]
    pub config: Option<PathBuf>,

    /// Handshake listen address (host:port or ws://host:port)
    #[arg(long, value_name = "ADDR", env = "SCENELINK_LISTEN", global = true)]
    pub listen: Option<String>,

    /// Analysis model name
    #[arg(long, value_name = "MODEL", env = "SCENELINK_MODEL", global = true)]
    pub model: Option<String>,
}

impl CommonArgs {
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config.clone()
    }

    /// Apply command-line overrides on top of the loaded config.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(listen) = &self.listen {
            config.handshake.listen = listen.clone();
        }
        if let Some(model) = &self.model {
            config.analysis.model = model.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_only_given_values() {
        let args = CommonArgs {
            config: None,
            listen: Some("127.0.0.1:7000".into()),
            model: None,
        };
        let mut config = Config::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.handshake.listen, "127.0.0.1:7000");
        assert_eq!(config.analysis.model, "gemini-2.5-flash");
    }
}
