//! Decoder configuration loaded from TOML.
//!
//! - `DecoderConfig` is the typed record handed to `LatticeDecoder::new`
//! - `parse_settings_toml(toml_content)` reads the `[decoding]` table
//! - Default values are embedded via `include_str!("default_settings.toml")`
//!
//! `lm_scale` and `wi_penalty` resolve per lattice: the configured value,
//! else the lattice header, else 1.0 and 0.0 respectively.

use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;

pub const DEFAULT_SETTINGS_TOML: &str = include_str!("default_settings.toml");

/// Returns the embedded default settings TOML content.
pub fn default_toml() -> &'static str {
    DEFAULT_SETTINGS_TOML
}

/// The embedded defaults as a config record.
pub fn default_config() -> DecoderConfig {
    parse_settings_toml(DEFAULT_SETTINGS_TOML).expect("settings TOML must be valid")
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("TOML parse error: {0}")]
    Parse(String),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("vocabulary does not contain {0}")]
    MissingSpecialWord(&'static str),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecoderConfig {
    /// Weight of the network probability when interpolating with the
    /// lattice LM probability.
    pub nnlm_weight: f64,
    /// Scale of LM log-probabilities in the total score.
    #[serde(default)]
    pub lm_scale: Option<f64>,
    /// Added to the total log-probability once per word in the history.
    #[serde(default)]
    pub wi_penalty: Option<f64>,
    /// Constant log-probability for out-of-shortlist and OOV words.
    #[serde(default)]
    pub unk_penalty: Option<f64>,
    /// Spread the `<unk>` probability over out-of-shortlist words by unigram
    /// frequency. Silently disabled without unigram counts.
    #[serde(default)]
    pub use_shortlist: bool,
    /// Score out-of-shortlist words with the lattice LM score of the link.
    #[serde(default)]
    pub unk_from_lattice: bool,
    #[serde(default)]
    pub linear_interpolation: bool,
    #[serde(default)]
    pub max_tokens_per_node: Option<usize>,
    #[serde(default)]
    pub beam: Option<f64>,
    /// Number of trailing history words that decide recombination; `None`
    /// uses the whole history.
    #[serde(default)]
    pub recombination_order: Option<usize>,
}

impl DecoderConfig {
    /// Config with the given NNLM weight and every optional feature off.
    pub fn new(nnlm_weight: f64) -> Self {
        Self {
            nnlm_weight,
            lm_scale: None,
            wi_penalty: None,
            unk_penalty: None,
            use_shortlist: false,
            unk_from_lattice: false,
            linear_interpolation: false,
            max_tokens_per_node: None,
            beam: None,
            recombination_order: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &str, reason: &str) -> ConfigError {
            ConfigError::InvalidValue {
                field: field.to_string(),
                reason: reason.to_string(),
            }
        }

        if !(0.0..=1.0).contains(&self.nnlm_weight) {
            return Err(invalid("nnlm_weight", "must be between 0 and 1"));
        }
        for (field, value) in [
            ("lm_scale", self.lm_scale),
            ("wi_penalty", self.wi_penalty),
            ("unk_penalty", self.unk_penalty),
        ] {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(invalid(field, "must be finite"));
            }
        }
        if let Some(beam) = self.beam {
            if !beam.is_finite() || beam < 0.0 {
                return Err(invalid("beam", "must be finite and non-negative"));
            }
        }
        if self.max_tokens_per_node == Some(0) {
            return Err(invalid("max_tokens_per_node", "must be positive"));
        }
        if self.recombination_order == Some(0) {
            return Err(invalid("recombination_order", "must be positive"));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    decoding: DecoderConfig,
}

pub fn parse_settings_toml(toml_str: &str) -> Result<DecoderConfig, ConfigError> {
    let file: SettingsFile =
        toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    file.decoding.validate()?;
    Ok(file.decoding)
}

pub fn load_settings_file(path: &Path) -> Result<DecoderConfig, ConfigError> {
    parse_settings_toml(&fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_default_toml() {
        let c = parse_settings_toml(DEFAULT_SETTINGS_TOML).unwrap();
        assert_eq!(c.nnlm_weight, 1.0);
        assert_eq!(c.lm_scale, None);
        assert_eq!(c.wi_penalty, None);
        assert_eq!(c.unk_penalty, None);
        assert!(!c.use_shortlist);
        assert!(!c.unk_from_lattice);
        assert!(!c.linear_interpolation);
        assert_eq!(c.max_tokens_per_node, None);
        assert_eq!(c.beam, None);
        assert_eq!(c.recombination_order, Some(20));
        assert_eq!(default_config(), c);
    }

    #[test]
    fn parse_valid_custom_toml() {
        let toml = r#"
[decoding]
nnlm_weight = 0.5
lm_scale = 14.0
wi_penalty = -2.5
unk_penalty = -18.0
use_shortlist = true
linear_interpolation = true
max_tokens_per_node = 64
beam = 500.0
recombination_order = 3
"#;
        let c = parse_settings_toml(toml).unwrap();
        assert_eq!(c.nnlm_weight, 0.5);
        assert_eq!(c.lm_scale, Some(14.0));
        assert_eq!(c.wi_penalty, Some(-2.5));
        assert_eq!(c.unk_penalty, Some(-18.0));
        assert!(c.use_shortlist);
        assert!(c.linear_interpolation);
        assert_eq!(c.max_tokens_per_node, Some(64));
        assert_eq!(c.beam, Some(500.0));
        assert_eq!(c.recombination_order, Some(3));
    }

    #[test]
    fn missing_nnlm_weight_is_an_error() {
        let err = parse_settings_toml("[decoding]\nbeam = 10.0\n").unwrap_err();
        match err {
            ConfigError::Parse(msg) => assert!(msg.contains("nnlm_weight"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_key_is_an_error() {
        let err = parse_settings_toml("[decoding]\nnnlm_weight = 1.0\nbeem = 1.0\n");
        assert!(matches!(err, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn reject_invalid_values() {
        let cases = [
            ("nnlm_weight = 1.5", "nnlm_weight"),
            ("nnlm_weight = 1.0\nbeam = -1.0", "beam"),
            ("nnlm_weight = 1.0\nmax_tokens_per_node = 0", "max_tokens_per_node"),
            ("nnlm_weight = 1.0\nrecombination_order = 0", "recombination_order"),
            ("nnlm_weight = 1.0\nlm_scale = nan", "lm_scale"),
        ];
        for (body, field) in cases {
            let toml = format!("[decoding]\n{body}\n");
            match parse_settings_toml(&toml) {
                Err(ConfigError::InvalidValue { field: f, .. }) => assert_eq!(f, field),
                other => panic!("{body}: expected InvalidValue, got {other:?}"),
            }
        }
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decode.toml");
        fs::write(&path, "[decoding]\nnnlm_weight = 0.25\n").unwrap();
        let c = load_settings_file(&path).unwrap();
        assert_eq!(c, DecoderConfig::new(0.25));
    }
}
