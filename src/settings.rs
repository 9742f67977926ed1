use std::str::FromStr;

use anyhow::*;
use log::*;

use crate::errors::ConfigError;

/// How the HOGs of sibling genomes are fused at an ancestral level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMethod {
    /// Keep the pairs above the threshold, then merge whole connected components.
    Pair,
    /// Greedily merge the best pair of each connected component until no pair
    /// reaches the threshold anymore.
    Update,
}

impl FromStr for MergeMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pair" => std::result::Result::Ok(MergeMethod::Pair),
            "update" => std::result::Result::Ok(MergeMethod::Update),
            _ => Err(ConfigError::UnknownMergeMethod(s.to_owned())),
        }
    }
}

/// How the dynamic threshold steps from the leaves up to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// One step size for all the leaves, taken from the first one
    #[default]
    FirstLeaf,
    /// Each leaf steps along its own path
    PerLeaf,
}

impl FromStr for Interpolation {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "first-leaf" => std::result::Result::Ok(Interpolation::FirstLeaf),
            "per-leaf" => std::result::Result::Ok(Interpolation::PerLeaf),
            _ => Err(ConfigError::UnknownThresholdScheme(s.to_owned())),
        }
    }
}

/// End points of the depth-tapered merge threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DynamicThreshold {
    pub leaf_score: f64,
    pub root_score: f64,
    pub interpolation: Interpolation,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub method: MergeMethod,
    /// Merge threshold, as a percentage of the maximal number of relations
    pub parameter_1: f64,
    pub use_paralogs: bool,
    pub dynamic_threshold: Option<DynamicThreshold>,
    /// HOGs left unmerged this many times stop taking part in the graphs
    pub unmerged_threshold: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            method: MergeMethod::Pair,
            parameter_1: 50.,
            use_paralogs: false,
            dynamic_threshold: None,
            unmerged_threshold: None,
        }
    }
}

impl Settings {
    pub fn dynamic_from(
        leaf_score: Option<f64>,
        root_score: Option<f64>,
        interpolation: Interpolation,
    ) -> Result<Option<DynamicThreshold>> {
        match (leaf_score, root_score) {
            (None, None) => Ok(None),
            (Some(leaf_score), Some(root_score)) => {
                Ok(Some(DynamicThreshold { leaf_score, root_score, interpolation }))
            }
            _ => Err(ConfigError::IncompleteDynamicThreshold.into()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.parameter_1.is_finite() || self.parameter_1 < 0. {
            bail!(ConfigError::InvalidThreshold(self.parameter_1));
        }
        if let Some(d) = self.dynamic_threshold {
            for x in [d.leaf_score, d.root_score] {
                if !x.is_finite() || x < 0. {
                    bail!(ConfigError::InvalidThreshold(x));
                }
            }
            if d.root_score > d.leaf_score {
                warn!(
                    "Root score ({}) is stricter than leaf score ({})",
                    d.root_score, d.leaf_score
                );
            }
        }
        if self.unmerged_threshold == Some(0) {
            warn!("Freezing threshold set to 0: no HOG will ever be merged");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_method_parsing() {
        assert_eq!("pair".parse::<MergeMethod>().unwrap(), MergeMethod::Pair);
        assert_eq!("update".parse::<MergeMethod>().unwrap(), MergeMethod::Update);
        assert!(matches!(
            "greedy".parse::<MergeMethod>(),
            Err(ConfigError::UnknownMergeMethod(m)) if m == "greedy"
        ));
    }

    #[test]
    fn interpolation_parsing() {
        assert_eq!("first-leaf".parse::<Interpolation>().unwrap(), Interpolation::FirstLeaf);
        assert_eq!("per-leaf".parse::<Interpolation>().unwrap(), Interpolation::PerLeaf);
        assert!(matches!(
            "linear".parse::<Interpolation>(),
            Err(ConfigError::UnknownThresholdScheme(m)) if m == "linear"
        ));
    }

    #[test]
    fn dynamic_threshold_needs_both_ends() {
        let scheme = Interpolation::default();
        assert!(Settings::dynamic_from(None, None, scheme).unwrap().is_none());
        assert!(Settings::dynamic_from(Some(80.), None, scheme).is_err());
        let d = Settings::dynamic_from(Some(80.), Some(20.), Interpolation::PerLeaf)
            .unwrap()
            .unwrap();
        assert_eq!(d.leaf_score, 80.);
        assert_eq!(d.root_score, 20.);
        assert_eq!(d.interpolation, Interpolation::PerLeaf);
    }

    #[test]
    fn validation() {
        assert!(Settings::default().validate().is_ok());
        let s = Settings { parameter_1: -1., ..Default::default() };
        assert!(s.validate().is_err());
        let s = Settings { parameter_1: 101., ..Default::default() };
        assert!(s.validate().is_ok());
        let s = Settings {
            dynamic_threshold: Some(DynamicThreshold {
                leaf_score: f64::NAN,
                root_score: 0.,
                interpolation: Interpolation::FirstLeaf,
            }),
            ..Default::default()
        };
        assert!(s.validate().is_err());
    }
}
