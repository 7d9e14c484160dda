use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::UnknownVariant;

/// Where a remote network is hosted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Location {
    Aws,
    Azure,
    GoogleCloud,
    OnPremise,
    #[default]
    Other,
}

impl Location {
    /// All locations, in API spelling.
    pub const ALL: [&'static str; 5] = ["AWS", "AZURE", "GOOGLE_CLOUD", "ON_PREMISE", "OTHER"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aws => "AWS",
            Self::Azure => "AZURE",
            Self::GoogleCloud => "GOOGLE_CLOUD",
            Self::OnPremise => "ON_PREMISE",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Location {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AWS" => Ok(Self::Aws),
            "AZURE" => Ok(Self::Azure),
            "GOOGLE_CLOUD" => Ok(Self::GoogleCloud),
            "ON_PREMISE" => Ok(Self::OnPremise),
            "OTHER" => Ok(Self::Other),
            _ => Err(UnknownVariant::new("location", s, &Self::ALL)),
        }
    }
}

/// A private network that connectors tunnel out of.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteNetwork {
    pub id: String,
    pub name: String,
    pub location: Location,
}
