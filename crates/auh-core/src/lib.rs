mod candidate;
mod collab;
mod config;
mod error;
mod record;
mod status;

pub use candidate::{parse_upstream_report, UpstreamCandidate, STATUS_UPDATE_AVAILABLE};
pub use collab::{BuildSystem, Notifier, OutgoingMessage, ToolResult, VersionControl};
pub use config::{RunConfig, DEFAULT_COOLDOWN_DAYS, DEFAULT_MACHINES, MAX_COOLDOWN_DAYS};
pub use error::{BenignStop, ToolError, UpgradeFailure};
pub use record::{HistoryRecord, LEDGER_DATE_FORMAT};
pub use status::AttemptStatus;
