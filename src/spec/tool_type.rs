use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How a Tool's main program is run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolType {
    Julia,
    Python,
    Gams,
    Executable,
}

impl std::fmt::Display for ToolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Julia => write!(f, "julia"),
            Self::Python => write!(f, "python"),
            Self::Gams => write!(f, "gams"),
            Self::Executable => write!(f, "executable"),
        }
    }
}

impl FromStr for ToolType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "julia" => Ok(Self::Julia),
            "python" => Ok(Self::Python),
            "gams" => Ok(Self::Gams),
            "executable" => Ok(Self::Executable),
            _ => anyhow::bail!(
                "invalid tool type '{}' (expected: julia, python, gams, executable)",
                s
            ),
        }
    }
}
