use chrono::NaiveDate;

use crate::status::AttemptStatus;

/// Date format used in the persisted ledger; sorts lexicographically.
pub const LEDGER_DATE_FORMAT: &str = "%Y-%m-%d";

/// Persisted record of the most recent upgrade attempt for one recipe.
/// The ledger holds at most one of these per recipe name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub recipe: String,
    pub target_version: String,
    pub maintainer: String,
    pub attempt_date: NaiveDate,
    pub status_text: String,
}

impl HistoryRecord {
    pub fn new(
        recipe: impl Into<String>,
        target_version: impl Into<String>,
        maintainer: impl Into<String>,
        attempt_date: NaiveDate,
        status: AttemptStatus,
    ) -> Self {
        Self {
            recipe: recipe.into(),
            target_version: target_version.into(),
            maintainer: maintainer.into(),
            attempt_date,
            status_text: status.as_text().to_string(),
        }
    }

    /// Stored status parsed back into the taxonomy, when it matches a
    /// known rendering.
    pub fn status(&self) -> Option<AttemptStatus> {
        AttemptStatus::parse(&self.status_text)
    }
}
