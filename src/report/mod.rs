pub mod casb;
pub mod parser;

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;

use crate::error::RiskSyncError;

pub use parser::parse_report;

/// Per-account data extracted from one risk report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RiskReport {
    /// Account name → highest score seen for it in the report.
    pub scores: BTreeMap<String, i64>,
    /// Account name → distinct login-name aliases seen for it.
    pub aliases: BTreeMap<String, BTreeSet<String>>,
}

/// Retrieves the raw risk report. Extension point for report sources, and
/// the seam tests replace with a canned body.
#[async_trait]
pub trait ReportFetcher: Send + Sync {
    async fn fetch(&self) -> Result<String, RiskSyncError>;
}
