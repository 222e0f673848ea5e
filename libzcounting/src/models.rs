use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

use super::error::ConfigError;

/// Signal shape handed to the fit engine.
///
/// The numeric codes are the ones understood by the template-fit engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SignalModel {
    /// Breit-Wigner folded with a crystal ball
    #[serde(rename = "BWxCB")]
    BwxCb,
    /// MC template folded with a gaussian
    #[default]
    #[serde(rename = "MCxGaus", alias = "MCxGauss", alias = "default")]
    McxGaus,
    /// Breit-Wigner, no folding
    #[serde(rename = "BW")]
    Bw,
    /// MC template, no folding
    #[serde(rename = "MC")]
    Mc,
    /// Breit-Wigner folded with a gaussian
    #[serde(rename = "BWxGaus")]
    BwxGaus,
    /// MC template folded with a crystal ball
    #[serde(rename = "MCxCB")]
    McxCb,
}

impl SignalModel {
    pub fn code(&self) -> u8 {
        match self {
            Self::BwxCb => 1,
            Self::McxGaus => 2,
            Self::Bw => 3,
            Self::Mc => 4,
            Self::BwxGaus => 5,
            Self::McxCb => 6,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::BwxCb => "BWxCB",
            Self::McxGaus => "MCxGaus",
            Self::Bw => "BW",
            Self::Mc => "MC",
            Self::BwxGaus => "BWxGaus",
            Self::McxCb => "MCxCB",
        }
    }
}

impl FromStr for SignalModel {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" | "MCxGaus" | "MCxGauss" => Ok(Self::McxGaus),
            "BWxCB" => Ok(Self::BwxCb),
            "BW" => Ok(Self::Bw),
            "MC" => Ok(Self::Mc),
            "BWxGaus" => Ok(Self::BwxGaus),
            "MCxCB" => Ok(Self::McxCb),
            _ => Err(ConfigError::UnknownSignalModel(s.to_string())),
        }
    }
}

impl Display for SignalModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Background shape handed to the fit engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackgroundModel {
    #[serde(rename = "Exp")]
    Exp,
    #[serde(rename = "Quad")]
    Quad,
    #[serde(rename = "QuadPlusExp")]
    QuadPlusExp,
    #[serde(rename = "Das")]
    Das,
    #[default]
    #[serde(rename = "CMSShape", alias = "default")]
    CmsShape,
}

impl BackgroundModel {
    pub fn code(&self) -> u8 {
        match self {
            Self::Exp => 1,
            Self::Quad => 2,
            Self::QuadPlusExp => 3,
            Self::Das => 4,
            Self::CmsShape => 6,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Exp => "Exp",
            Self::Quad => "Quad",
            Self::QuadPlusExp => "QuadPlusExp",
            Self::Das => "Das",
            Self::CmsShape => "CMSShape",
        }
    }
}

impl FromStr for BackgroundModel {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" | "CMSShape" => Ok(Self::CmsShape),
            "Exp" => Ok(Self::Exp),
            "Quad" => Ok(Self::Quad),
            "QuadPlusExp" => Ok(Self::QuadPlusExp),
            "Das" => Ok(Self::Das),
            _ => Err(ConfigError::UnknownBackgroundModel(s.to_string())),
        }
    }
}

impl Display for BackgroundModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_names() {
        assert_eq!(SignalModel::from_str("default").unwrap(), SignalModel::McxGaus);
        assert_eq!(
            BackgroundModel::from_str("default").unwrap(),
            BackgroundModel::CmsShape
        );
        assert_eq!(SignalModel::McxGaus.code(), 2);
        assert_eq!(BackgroundModel::CmsShape.code(), 6);
    }

    #[test]
    fn test_unknown_model_is_config_error() {
        match SignalModel::from_str("Voigt") {
            Err(ConfigError::UnknownSignalModel(name)) => assert_eq!(name, "Voigt"),
            _ => panic!(),
        }
        assert!(BackgroundModel::from_str("Cheb").is_err());
    }

    #[test]
    fn test_display_matches_parse() {
        for model in [
            SignalModel::BwxCb,
            SignalModel::McxGaus,
            SignalModel::Bw,
            SignalModel::Mc,
            SignalModel::BwxGaus,
            SignalModel::McxCb,
        ] {
            assert_eq!(SignalModel::from_str(&model.to_string()).unwrap(), model);
        }
    }

    #[test]
    fn test_yaml_names() {
        let model: BackgroundModel = serde_yaml::from_str("QuadPlusExp").unwrap();
        assert_eq!(model, BackgroundModel::QuadPlusExp);
        let model: SignalModel = serde_yaml::from_str("BWxGaus").unwrap();
        assert_eq!(model, SignalModel::BwxGaus);
        assert!(serde_yaml::from_str::<SignalModel>("Landau").is_err());
    }
}
