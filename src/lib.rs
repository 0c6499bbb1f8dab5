//! Keeps directory risk-tier group membership in line with the risk scores a
//! CASB reports for each user.

pub mod command;
pub mod config;
pub mod directory;
pub mod driver;
pub mod error;
pub mod logging;
pub mod report;
pub mod tiering;
pub mod watch;

pub use error::RiskSyncError;
