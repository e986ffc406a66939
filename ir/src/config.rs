//! Process-wide settings.
//!
//! Explicit configuration goes through the `bon` builder; [`Config::global`] is read once
//! from the environment.

use std::sync::OnceLock;

use bon::bon;
use tessera_dtype::DType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Float dtype used for gradients of discrete (bool/int) inputs.
    pub float_x: DType,
    /// When false, operators proven in-bounds at construction still re-check indices
    /// at run time.
    pub trust_known_safe: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self { float_x: DType::Float64, trust_known_safe: true }
    }
}

#[bon]
impl Config {
    #[builder]
    pub fn new(#[builder(default = DType::Float64)] float_x: DType, #[builder(default = true)] trust_known_safe: bool) -> Self {
        Self { float_x, trust_known_safe }
    }

    /// Read configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `TESSERA_FLOATX` - `float32` or `float64` (default: `float64`)
    /// * `TESSERA_TRUST_KNOWN_SAFE` - `0` re-checks bounds of known-safe gathers (default: `1`)
    pub fn from_env() -> Self {
        let float_x = std::env::var("TESSERA_FLOATX")
            .ok()
            .and_then(|s| s.parse::<DType>().ok())
            .filter(|dtype| matches!(dtype, DType::Float32 | DType::Float64))
            .unwrap_or(DType::Float64);
        let trust_known_safe = std::env::var("TESSERA_TRUST_KNOWN_SAFE").map(|s| s != "0").unwrap_or(true);

        Self { float_x, trust_known_safe }
    }

    /// Configuration shared by the whole process, initialised from the environment on
    /// first use.
    pub fn global() -> &'static Config {
        static GLOBAL: OnceLock<Config> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            let config = Config::from_env();
            tracing::debug!(float_x = %config.float_x, trust_known_safe = config.trust_known_safe, "tessera config loaded");
            config
        })
    }
}
