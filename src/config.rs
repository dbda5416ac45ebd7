//! Configuration records shared with the training and checkpoint pipeline.
//!
//! All records are plain `serde` structs read from the same JSON the training
//! input uses. Onsite modes are parsed into a closed enum here, so an unknown
//! mode is rejected when the configuration is read and never reaches the
//! transplant logic.
use crate::error::{Result, TbError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// How onsite energies are parameterised by the onsite network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum OnsiteMode {
    /// No onsite network.
    #[default]
    None,
    /// One onsite energy per orbital shell.
    Uniform,
    /// One onsite energy per magnetic sub-orbital, $2l+1$ per shell.
    Split,
    /// Environment dependent onsite terms, one network shared by all species.
    Strain,
}

impl OnsiteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OnsiteMode::None => "none",
            OnsiteMode::Uniform => "uniform",
            OnsiteMode::Split => "split",
            OnsiteMode::Strain => "strain",
        }
    }
}

impl FromStr for OnsiteMode {
    type Err = TbError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(OnsiteMode::None),
            "uniform" => Ok(OnsiteMode::Uniform),
            "split" => Ok(OnsiteMode::Split),
            "strain" => Ok(OnsiteMode::Strain),
            _ => Err(TbError::UnknownOnsiteMode(s.to_string())),
        }
    }
}

impl TryFrom<String> for OnsiteMode {
    type Error = TbError;
    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<OnsiteMode> for String {
    fn from(m: OnsiteMode) -> String {
        m.as_str().to_string()
    }
}

impl fmt::Display for OnsiteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Widths of the Slater-Koster networks.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SkNetworkConfig {
    pub sk_hop_nhidden: usize,
    pub sk_onsite_nhidden: usize,
    /// Output width of the bond network. Only consulted when a checkpoint has
    /// no `bond_net.layer2` to read it from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sk_hop_nout: Option<usize>,
}

/// The model configuration stored next to every checkpoint.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModelConfig {
    /// Every species the model has seen, projected or not.
    pub atomtype: Vec<String>,
    /// Orbital labels of every projected species, e.g. `{"N": ["2s", "2p"]}`.
    pub proj_atom_anglr_m: IndexMap<String, Vec<String>>,
    #[serde(default)]
    pub onsitemode: OnsiteMode,
    pub sknetwork: SkNetworkConfig,
    /// Reduced bond types the bond network was sized for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skint_types: Option<Vec<String>>,
    /// Onsite output width per species.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onsite_num: Option<IndexMap<String, usize>>,
}

impl ModelConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&text).map_err(|e| TbError::FileParse {
            file: path.as_ref().display().to_string(),
            message: e.to_string(),
        })
    }
}

/// Batching options of a [`Processor`](crate::Processor).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProcessorConfig {
    #[serde(alias = "batchsize")]
    pub batch_size: usize,
    pub env_cutoff: f64,
    /// Key bond tensors by batch-local frame instead of concatenating them.
    #[serde(default)]
    pub require_dict: bool,
    /// Seed of the sampling pool, `None` draws one from the OS.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl ProcessorConfig {
    pub fn new(batch_size: usize, env_cutoff: f64) -> Self {
        ProcessorConfig {
            batch_size,
            env_cutoff,
            require_dict: false,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_require_dict(mut self, require_dict: bool) -> Self {
        self.require_dict = require_dict;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(TbError::InvalidConfiguration(
                "batch size must be positive".to_string(),
            ));
        }
        if !(self.env_cutoff.is_finite() && self.env_cutoff > 0.0) {
            return Err(TbError::InvalidConfiguration(format!(
                "environment cutoff must be positive, got {}",
                self.env_cutoff
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL_JSON: &str = r#"{
        "atomtype": ["N", "B"],
        "proj_atom_anglr_m": {"N": ["2s", "2p"], "B": ["2s", "2p"]},
        "onsitemode": "split",
        "sknetwork": {"sk_hop_nhidden": 20, "sk_onsite_nhidden": 10}
    }"#;

    #[test]
    fn test_model_config_from_json() {
        let cfg = ModelConfig::from_json_str(MODEL_JSON).unwrap();
        assert_eq!(cfg.onsitemode, OnsiteMode::Split);
        assert_eq!(cfg.sknetwork.sk_hop_nhidden, 20);
        assert_eq!(cfg.sknetwork.sk_hop_nout, None);
        assert_eq!(cfg.proj_atom_anglr_m.keys().collect::<Vec<_>>(), vec!["N", "B"]);
        assert!(cfg.skint_types.is_none());

        let back = serde_json::to_string(&cfg).unwrap();
        assert!(back.contains("\"onsitemode\":\"split\""));
        assert_eq!(ModelConfig::from_json_str(&back).unwrap(), cfg);
    }

    #[test]
    fn test_unknown_onsite_mode_rejected_at_parse() {
        let bad = MODEL_JSON.replace("split", "bogus");
        assert!(ModelConfig::from_json_str(&bad).is_err());
        assert!(matches!(
            "bogus".parse::<OnsiteMode>(),
            Err(TbError::UnknownOnsiteMode(m)) if m == "bogus"
        ));
        assert_eq!("strain".parse::<OnsiteMode>().unwrap(), OnsiteMode::Strain);
    }

    #[test]
    fn test_processor_config_validation() {
        let cfg: ProcessorConfig =
            serde_json::from_str(r#"{"batchsize": 2, "env_cutoff": 3.5}"#).unwrap();
        assert_eq!(cfg.batch_size, 2);
        assert!(!cfg.require_dict);
        assert!(cfg.validate().is_ok());
        assert!(ProcessorConfig::new(0, 3.5).validate().is_err());
        assert!(ProcessorConfig::new(1, -1.0).validate().is_err());
        assert!(ProcessorConfig::new(1, f64::NAN).validate().is_err());
    }

    #[test]
    fn test_model_config_missing_file() {
        let r = ModelConfig::from_path("/definitely/not/here.json");
        assert!(matches!(r, Err(TbError::Io(_))));
    }
}
