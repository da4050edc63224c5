//! Command line and environment configuration
//!
//! Every option can also be set through the environment (a `.env` file
//! is loaded first by the binary).

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::api::HttpLimits;
use crate::model::{ModelBundle, StepRegistry};
use crate::service::ScoringSettings;
use crate::utils::AnalysisError;

#[derive(Debug, Clone, Args)]
pub struct ModelArgs {
    /// Path to the model artifact
    #[arg(long = "model", env = "MODEL_PATH", default_value = "model/svd_lof.json")]
    pub model_path: PathBuf,

    /// Extra step names for the artifact, as `alias=RegisteredName`
    #[arg(long = "step-alias", env = "STEP_ALIASES", value_delimiter = ',')]
    pub step_aliases: Vec<String>,
}

impl ModelArgs {
    /// Default step registry plus the configured aliases
    pub fn registry(&self) -> Result<StepRegistry, AnalysisError> {
        let mut registry = StepRegistry::with_defaults();
        for entry in &self.step_aliases {
            let (alias, target) = entry.split_once('=').ok_or_else(|| {
                AnalysisError::ValidationError(format!(
                    "step alias '{}' must look like alias=RegisteredName",
                    entry
                ))
            })?;
            registry.alias(alias.trim(), target.trim())?;
        }
        Ok(registry)
    }

    pub fn load_bundle(&self) -> Result<ModelBundle, AnalysisError> {
        ModelBundle::load(&self.model_path, &self.registry()?)
    }
}

#[derive(Debug, Clone, Args)]
pub struct ScoringArgs {
    /// Identifier column echoed back by CSV scoring
    #[arg(long, env = "ID_COLUMN", default_value = "BELNR")]
    pub id_column: String,

    /// Amount columns coerced to numbers in CSV uploads
    #[arg(long, env = "AMOUNT_COLUMNS", value_delimiter = ',', default_value = "DMBTR,WRBTR")]
    pub amount_columns: Vec<String>,

    /// top_k used when a JSON request omits it
    #[arg(long, env = "DEFAULT_TOP_K", default_value_t = 10)]
    pub default_top_k: usize,
}

impl ScoringArgs {
    pub fn settings(&self) -> ScoringSettings {
        ScoringSettings {
            id_column: self.id_column.clone(),
            amount_columns: self.amount_columns.clone(),
            default_top_k: self.default_top_k,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct ServerArgs {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = 32 * 1024 * 1024)]
    pub max_upload_bytes: usize,
}

impl ServerArgs {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn limits(&self) -> HttpLimits {
        HttpLimits {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_body_bytes: self.max_upload_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        scoring: ScoringArgs,
        #[command(flatten)]
        server: ServerArgs,
    }

    #[test]
    fn test_explicit_flags() {
        let cli = TestCli::parse_from([
            "test",
            "--model",
            "/tmp/m.json",
            "--amount-columns",
            "DMBTR,WRBTR,HWBTR",
            "--port",
            "9000",
            "--default-top-k",
            "5",
        ]);

        assert_eq!(cli.model.model_path, PathBuf::from("/tmp/m.json"));
        assert_eq!(cli.scoring.amount_columns, vec!["DMBTR", "WRBTR", "HWBTR"]);
        assert_eq!(cli.scoring.settings().default_top_k, 5);
        assert_eq!(cli.server.bind_addr().port(), 9000);
        assert_eq!(cli.server.limits().request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_step_aliases() {
        let cli = TestCli::parse_from([
            "test",
            "--step-alias",
            "__main__.DropColumns=DropColumns,__main__.log_eps=log_eps",
        ]);
        let registry = cli.model.registry().unwrap();
        assert!(registry.contains("__main__.DropColumns"));
        assert!(registry.contains("__main__.log_eps"));
    }

    #[test]
    fn test_bad_step_alias() {
        let cli = TestCli::parse_from(["test", "--step-alias", "nonsense"]);
        assert!(cli.model.registry().is_err());

        let cli = TestCli::parse_from(["test", "--step-alias", "x=Missing"]);
        assert!(cli.model.registry().is_err());
    }
}
