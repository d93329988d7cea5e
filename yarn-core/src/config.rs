use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::curve_source::KnownCurve;
use crate::curve_store::{DEFAULT_LOOKUP_WIDTH, MAX_LOOKUP_WIDTH};
use crate::error::{FiberError, FiberResult};
use crate::params::FiberParams;

/// Host-level settings: where curves come from and the starting parameters.
///
/// Every field has a default, so a config file only lists what it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YarnConfig {
    /// Directory [`KnownCurve`] file names are resolved against.
    pub data_dir: PathBuf,
    /// Texels per row of the lookup buffer.
    pub lookup_width: u32,
    /// Curve file loaded at startup.
    pub source: KnownCurve,
    /// Seed for random fiber types. `None` draws from the thread RNG, so
    /// every rebuild gets new types.
    pub classifier_seed: Option<u64>,
    pub params: FiberParams,
}

impl Default for YarnConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            lookup_width: DEFAULT_LOOKUP_WIDTH,
            source: KnownCurve::Thread,
            classifier_seed: Some(0),
            params: FiberParams::default(),
        }
    }
}

impl YarnConfig {
    /// Parses a JSON config and clamps its parameters to their bounds.
    pub fn from_json_str(text: &str) -> FiberResult<Self> {
        let mut config: YarnConfig = serde_json::from_str(text).map_err(FiberError::Config)?;
        config.sanitize();
        Ok(config)
    }

    pub fn load(path: &Path) -> FiberResult<Self> {
        let text = fs::read_to_string(path).map_err(|source| FiberError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    fn sanitize(&mut self) {
        if self.lookup_width == 0 {
            warn!("lookup_width 0 in config, using {DEFAULT_LOOKUP_WIDTH}");
            self.lookup_width = DEFAULT_LOOKUP_WIDTH;
        } else if self.lookup_width > MAX_LOOKUP_WIDTH {
            warn!(
                requested = self.lookup_width,
                "lookup_width above the texture limit, using {MAX_LOOKUP_WIDTH}"
            );
            self.lookup_width = MAX_LOOKUP_WIDTH;
        }
        self.params.sanitize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RenderMode;

    #[test]
    fn empty_object_is_the_default() {
        assert_eq!(YarnConfig::from_json_str("{}").unwrap(), YarnConfig::default());
    }

    #[test]
    fn partial_config_overrides_only_named_fields() {
        let config = YarnConfig::from_json_str(
            r#"{
                "source": "glove",
                "classifier_seed": null,
                "params": { "fiber_count": 12, "render_mode": "line" }
            }"#,
        )
        .unwrap();
        assert_eq!(config.source, KnownCurve::Glove);
        assert_eq!(config.classifier_seed, None);
        assert_eq!(config.params.fiber_count, 12);
        assert_eq!(config.params.render_mode, RenderMode::Line);
        assert_eq!(config.params.radial_segments, 16);
        assert_eq!(config.lookup_width, DEFAULT_LOOKUP_WIDTH);
    }

    #[test]
    fn out_of_range_values_are_clamped_on_load() {
        let config =
            YarnConfig::from_json_str(r#"{ "lookup_width": 0, "params": { "radial_segments": 1 } }"#)
                .unwrap();
        assert_eq!(config.lookup_width, DEFAULT_LOOKUP_WIDTH);
        assert_eq!(config.params.radial_segments, 3);

        let config = YarnConfig::from_json_str(r#"{ "lookup_width": 2147483648 }"#).unwrap();
        assert_eq!(config.lookup_width, MAX_LOOKUP_WIDTH);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(
            YarnConfig::from_json_str("{ nope"),
            Err(FiberError::Config(_))
        ));
        assert!(matches!(
            YarnConfig::load(Path::new("/no/such/config.json")),
            Err(FiberError::ConfigIo { .. })
        ));
    }
}
