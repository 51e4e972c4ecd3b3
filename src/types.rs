//! Core identifier types shared across the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One independently analyzed facet of the input topic.
///
/// Each dimension owns a disjoint slice of the analysis state: its raw
/// research collection, its curated collection, and its briefing slot.
/// Analyzer nodes never write another dimension's keys.
///
/// # Examples
///
/// ```
/// use prospector::types::Dimension;
///
/// assert_eq!(Dimension::MarketDemand.as_str(), "market_demand");
/// assert_eq!(Dimension::parse("settlement"), Some(Dimension::Settlement));
/// assert_eq!(Dimension::ALL.len(), 4);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// Can the event outcome be stated as a measurable, binary question?
    Quantifiability,
    /// Is there an authoritative oracle/settlement source for the outcome?
    Settlement,
    /// Is there observable trading or attention demand for the event?
    MarketDemand,
    /// Regulatory and compliance exposure of listing the event.
    ComplianceRisk,
}

impl Dimension {
    /// Every declared dimension, in canonical order.
    ///
    /// The briefing stage guarantees a slot for each entry here, so callers
    /// may iterate `ALL` after the briefing wave without presence checks.
    pub const ALL: [Dimension; 4] = [
        Dimension::Quantifiability,
        Dimension::Settlement,
        Dimension::MarketDemand,
        Dimension::ComplianceRisk,
    ];

    /// Stable string key for this dimension, used in node names and labels.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Quantifiability => "quantifiability",
            Dimension::Settlement => "settlement",
            Dimension::MarketDemand => "market_demand",
            Dimension::ComplianceRisk => "compliance_risk",
        }
    }

    /// Human-readable label used in briefings and the compiled report.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Dimension::Quantifiability => "Quantifiability",
            Dimension::Settlement => "Settlement",
            Dimension::MarketDemand => "Market Demand",
            Dimension::ComplianceRisk => "Compliance Risk",
        }
    }

    /// Parse a stable string key back into a dimension.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "quantifiability" => Some(Dimension::Quantifiability),
            "settlement" => Some(Dimension::Settlement),
            "market_demand" => Some(Dimension::MarketDemand),
            "compliance_risk" => Some(Dimension::ComplianceRisk),
            _ => None,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle phase of a tracked job in the [`JobStatusRegistry`](crate::registry::JobStatusRegistry).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    Pending,
    Running,
    Completed,
    Error,
}

impl JobPhase {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPhase::Pending => "pending",
            JobPhase::Running => "running",
            JobPhase::Completed => "completed",
            JobPhase::Error => "error",
        }
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
