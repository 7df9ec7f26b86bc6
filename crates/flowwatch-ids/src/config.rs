//! Pipeline configuration.
//!
//! Loaded from TOML. Every section is optional; omitted sections and
//! fields take their defaults. The whitelist detector runs only when a
//! `[whitelist]` section is present, and any detector can be switched off
//! by listing its kind under `disabled`.
//!
//! ```toml
//! ordering = "reject"
//! disabled = ["entropy-profile"]
//!
//! [sketch]
//! period_secs = 15.0
//! seed = 7
//!
//! [whitelist]
//! learning_secs = 600.0
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::alarm::DetectorKind;
use crate::detector::Detector;
use crate::entropy::{EntropyConfig, EntropyProfile};
use crate::error::{IdsError, IdsResult};
use crate::flow::{FlowTTest, FlowTTestConfig};
use crate::pattern::{PatternConfig, PatternSimilarity};
use crate::rate::{EwmaCusumConfig, FlowRateDetector};
use crate::sketch::{SketchConfig, SketchDivergence};
use crate::whitelist::{Whitelist, WhitelistConfig};
use crate::window::OrderingPolicy;

/// Default bound of each per-scheduler record channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Top-level configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdsConfig {
    pub ordering: OrderingPolicy,
    /// Records buffered per scheduler in concurrent runs.
    pub channel_capacity: usize,
    /// Detector kinds not to build even if configured.
    pub disabled: Vec<DetectorKind>,
    pub sketch: Option<SketchConfig>,
    pub flow_rate: Option<EwmaCusumConfig>,
    pub flow_ttest: Option<FlowTTestConfig>,
    pub pattern: Option<PatternConfig>,
    pub entropy: Option<EntropyConfig>,
    pub whitelist: Option<WhitelistConfig>,
}

impl Default for IdsConfig {
    fn default() -> Self {
        Self {
            ordering: OrderingPolicy::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            disabled: Vec::new(),
            sketch: Some(SketchConfig::default()),
            flow_rate: Some(EwmaCusumConfig::default()),
            flow_ttest: Some(FlowTTestConfig::default()),
            pattern: Some(PatternConfig::default()),
            entropy: Some(EntropyConfig::default()),
            whitelist: None,
        }
    }
}

impl IdsConfig {
    /// Read and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> IdsResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        debug!(path = %path.display(), detectors = config.enabled_count(), "configuration loaded");
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> IdsResult<Self> {
        let config: IdsConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> IdsResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn enabled(&self, kind: DetectorKind) -> bool {
        !self.disabled.contains(&kind)
    }

    /// Number of detectors [`build_detectors`](Self::build_detectors) yields.
    pub fn enabled_count(&self) -> usize {
        [
            (self.sketch.is_some(), DetectorKind::SketchDivergence),
            (self.flow_rate.is_some(), DetectorKind::EwmaCusum),
            (self.flow_ttest.is_some(), DetectorKind::FlowTTest),
            (self.pattern.is_some(), DetectorKind::PatternSimilarity),
            (self.entropy.is_some(), DetectorKind::EntropyProfile),
            (self.whitelist.is_some(), DetectorKind::Whitelist),
        ]
        .into_iter()
        .filter(|&(configured, kind)| configured && self.enabled(kind))
        .count()
    }

    pub fn validate(&self) -> IdsResult<()> {
        if self.channel_capacity == 0 {
            return Err(IdsError::invalid("channel_capacity", "must be at least 1"));
        }
        if let Some(c) = &self.sketch {
            c.validate()?;
        }
        if let Some(c) = &self.flow_rate {
            c.validate()?;
        }
        if let Some(c) = &self.flow_ttest {
            c.validate()?;
        }
        if let Some(c) = &self.pattern {
            c.validate()?;
        }
        if let Some(c) = &self.entropy {
            c.validate()?;
        }
        if let Some(c) = &self.whitelist {
            c.validate()?;
        }

        let mut ids: Vec<&str> = Vec::new();
        for id in [
            self.sketch.as_ref().map(|c| c.id.as_str()),
            self.flow_rate.as_ref().map(|c| c.id.as_str()),
            self.flow_ttest.as_ref().map(|c| c.id.as_str()),
            self.pattern.as_ref().map(|c| c.id.as_str()),
            self.entropy.as_ref().map(|c| c.id.as_str()),
            self.whitelist.as_ref().map(|c| c.id.as_str()),
        ]
        .into_iter()
        .flatten()
        {
            if ids.contains(&id) {
                return Err(IdsError::invalid("id", format!("duplicate detector id '{}'", id)));
            }
            ids.push(id);
        }
        Ok(())
    }

    /// Instantiate every configured, enabled detector.
    pub fn build_detectors(&self) -> IdsResult<Vec<Box<dyn Detector>>> {
        let mut detectors: Vec<Box<dyn Detector>> = Vec::new();
        if let Some(c) = self.sketch.as_ref().filter(|_| self.enabled(DetectorKind::SketchDivergence)) {
            detectors.push(Box::new(SketchDivergence::new(c.clone())?));
        }
        if let Some(c) = self.flow_rate.as_ref().filter(|_| self.enabled(DetectorKind::EwmaCusum)) {
            detectors.push(Box::new(FlowRateDetector::new(c.clone())?));
        }
        if let Some(c) = self.flow_ttest.as_ref().filter(|_| self.enabled(DetectorKind::FlowTTest)) {
            detectors.push(Box::new(FlowTTest::new(c.clone())?));
        }
        if let Some(c) = self.pattern.as_ref().filter(|_| self.enabled(DetectorKind::PatternSimilarity)) {
            detectors.push(Box::new(PatternSimilarity::new(c.clone())?));
        }
        if let Some(c) = self.entropy.as_ref().filter(|_| self.enabled(DetectorKind::EntropyProfile)) {
            detectors.push(Box::new(EntropyProfile::new(c.clone())?));
        }
        if let Some(c) = self.whitelist.as_ref().filter(|_| self.enabled(DetectorKind::Whitelist)) {
            detectors.push(Box::new(Whitelist::new(c.clone())?));
        }
        for d in &detectors {
            debug!(detector = %d.id(), kind = %d.kind(), "detector built");
        }
        Ok(detectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_builds_five_detectors() {
        let config = IdsConfig::default();
        assert!(config.validate().is_ok());
        let detectors = config.build_detectors().unwrap();
        assert_eq!(detectors.len(), 5);
        assert_eq!(config.enabled_count(), 5);
        assert_eq!(detectors[0].kind(), DetectorKind::SketchDivergence);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = IdsConfig::from_toml_str(
            r#"
            ordering = "accept"
            disabled = ["entropy-profile"]

            [sketch]
            ncols = 128
            seed = 7

            [whitelist]
            learning_secs = 60.0
            "#,
        )
        .unwrap();
        assert_eq!(config.ordering, OrderingPolicy::Accept);
        let sketch = config.sketch.as_ref().unwrap();
        assert_eq!(sketch.ncols, 128);
        assert_eq!(sketch.nrows, SketchConfig::default().nrows);
        assert_eq!(sketch.seed, Some(7));
        assert!(config.flow_ttest.is_some());
        assert_eq!(config.whitelist.as_ref().unwrap().learning_secs, 60.0);

        let kinds: Vec<DetectorKind> = config
            .build_detectors()
            .unwrap()
            .iter()
            .map(|d| d.kind())
            .collect();
        assert!(!kinds.contains(&DetectorKind::EntropyProfile));
        assert!(kinds.contains(&DetectorKind::Whitelist));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = IdsConfig::from_toml_str("[sketch]\nncols = 0\n").unwrap_err();
        assert!(err.to_string().contains("sketch.ncols"));

        let err = IdsConfig::from_toml_str("channel_capacity = 0\n").unwrap_err();
        assert!(err.to_string().contains("channel_capacity"));

        let err = IdsConfig::from_toml_str("[pattern]\nid = \"sketch\"\n").unwrap_err();
        assert!(err.to_string().contains("duplicate"));

        assert!(matches!(
            IdsConfig::from_toml_str("ordering = 3"),
            Err(IdsError::Config(_))
        ));
    }

    #[test]
    fn default_renders_and_reloads() {
        let text = IdsConfig::default().to_toml_string().unwrap();
        assert!(text.contains("[sketch]"));
        assert_eq!(IdsConfig::from_toml_str(&text).unwrap(), IdsConfig::default());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[flow_ttest]\nnumber_seen = 12").unwrap();
        let config = IdsConfig::load(file.path()).unwrap();
        assert_eq!(config.flow_ttest.unwrap().number_seen, 12);

        assert!(matches!(
            IdsConfig::load("/nonexistent/flowwatch.toml"),
            Err(IdsError::Io(_))
        ));
    }
}
