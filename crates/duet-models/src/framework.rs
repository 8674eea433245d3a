use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which hosted framework produced (or should consume) a piece of data.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Framework {
    /// The AI-agent orchestration framework.
    Agent,
    /// The algorithmic-trading engine.
    Trading,
    /// Produced by the integration layer itself.
    Shared,
}

impl Framework {
    pub fn as_str(self) -> &'static str {
        match self {
            Framework::Agent => "agent",
            Framework::Trading => "trading",
            Framework::Shared => "shared",
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Framework {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent" => Ok(Framework::Agent),
            "trading" => Ok(Framework::Trading),
            "shared" => Ok(Framework::Shared),
            other => Err(format!("unknown framework: {other}")),
        }
    }
}

/// Which backing store(s) a write goes to or a read is served from.
///
/// Supplied by the caller on every operation; the coordinator never infers it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    Persistent,
    Cache,
    Both,
}

impl Placement {
    pub fn as_str(self) -> &'static str {
        match self {
            Placement::Persistent => "persistent",
            Placement::Cache => "cache",
            Placement::Both => "both",
        }
    }

    pub fn uses_persistent(self) -> bool {
        matches!(self, Placement::Persistent | Placement::Both)
    }

    pub fn uses_cache(self) -> bool {
        matches!(self, Placement::Cache | Placement::Both)
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Placement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "persistent" => Ok(Placement::Persistent),
            "cache" => Ok(Placement::Cache),
            "both" => Ok(Placement::Both),
            other => Err(format!("unknown placement: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framework_parses_its_own_display() {
        for fw in [Framework::Agent, Framework::Trading, Framework::Shared] {
            assert_eq!(fw.to_string().parse::<Framework>().unwrap(), fw);
        }
        assert!("crew".parse::<Framework>().is_err());
    }

    #[test]
    fn framework_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Framework::Trading).unwrap(),
            "\"trading\""
        );
    }

    #[test]
    fn placement_partitions_stores() {
        assert!(Placement::Persistent.uses_persistent());
        assert!(!Placement::Persistent.uses_cache());
        assert!(Placement::Cache.uses_cache());
        assert!(!Placement::Cache.uses_persistent());
        assert!(Placement::Both.uses_cache() && Placement::Both.uses_persistent());
    }
}
