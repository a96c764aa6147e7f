//! Target node selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::constants::{BOTTOM_ID, SENSE_ID, TOP_ID};

/// One of the three controllers reachable on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeId {
    #[default]
    Top,
    #[serde(alias = "BOT")]
    Bottom,
    Sense,
}

impl NodeId {
    pub const ALL: [NodeId; 3] = [NodeId::Top, NodeId::Bottom, NodeId::Sense];

    /// Arbitration id the node listens on.
    pub fn arbitration_id(self) -> u32 {
        match self {
            NodeId::Top => TOP_ID,
            NodeId::Bottom => BOTTOM_ID,
            NodeId::Sense => SENSE_ID,
        }
    }

    /// Last byte of the boot-mode response sent by this node.
    pub fn success_code(self) -> u8 {
        match self {
            NodeId::Top => 3,
            NodeId::Bottom => 4,
            NodeId::Sense => 2,
        }
    }

    /// Next node in `ALL`, wrapping around.
    pub fn next(self) -> Self {
        match self {
            NodeId::Top => NodeId::Bottom,
            NodeId::Bottom => NodeId::Sense,
            NodeId::Sense => NodeId::Top,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Top => write!(f, "TOP"),
            NodeId::Bottom => write!(f, "BOTTOM"),
            NodeId::Sense => write!(f, "SENSE"),
        }
    }
}

/// Node name not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownNode(pub String);

impl fmt::Display for UnknownNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown node '{}' (expected TOP, BOTTOM or SENSE)", self.0)
    }
}

impl std::error::Error for UnknownNode {}

impl FromStr for NodeId {
    type Err = UnknownNode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TOP" => Ok(NodeId::Top),
            "BOTTOM" | "BOT" => Ok(NodeId::Bottom),
            "SENSE" => Ok(NodeId::Sense),
            _ => Err(UnknownNode(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arbitration_ids() {
        assert_eq!(NodeId::Top.arbitration_id(), 0x103);
        assert_eq!(NodeId::Bottom.arbitration_id(), 0x104);
        assert_eq!(NodeId::Sense.arbitration_id(), 0x102);
    }

    #[test]
    fn test_success_codes() {
        assert_eq!(NodeId::Top.success_code(), 3);
        assert_eq!(NodeId::Bottom.success_code(), 4);
        assert_eq!(NodeId::Sense.success_code(), 2);
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("top".parse::<NodeId>().unwrap(), NodeId::Top);
        assert_eq!("Bot".parse::<NodeId>().unwrap(), NodeId::Bottom);
        assert_eq!("BOTTOM".parse::<NodeId>().unwrap(), NodeId::Bottom);
        assert_eq!(" sense ".parse::<NodeId>().unwrap(), NodeId::Sense);
        assert!("middle".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        for node in NodeId::ALL {
            assert_eq!(node.to_string().parse::<NodeId>().unwrap(), node);
        }
    }

    #[test]
    fn test_next_cycles() {
        assert_eq!(NodeId::Top.next().next().next(), NodeId::Top);
    }
}
