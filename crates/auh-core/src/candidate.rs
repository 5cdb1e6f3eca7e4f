use tracing::warn;

/// Upstream status value that marks a recipe as having a newer version.
pub const STATUS_UPDATE_AVAILABLE: &str = "UPDATE";

/// One row of the upstream version scan report, read-only input to
/// candidate selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamCandidate {
    pub recipe: String,
    pub current_version: String,
    pub next_version: String,
    pub status: String,
    pub maintainer: String,
    pub skip_reason: String,
}

impl UpstreamCandidate {
    pub fn update_available(&self) -> bool {
        self.status == STATUS_UPDATE_AVAILABLE && self.skip_reason.is_empty()
    }
}

// Column layout of the tab-separated scan report. The report carries more
// columns than the upgrade path consumes; only these six matter here.
const COLUMN_RECIPE: usize = 0;
const COLUMN_CURRENT_VERSION: usize = 1;
const COLUMN_NEXT_VERSION: usize = 2;
const COLUMN_STATUS: usize = 11;
const COLUMN_MAINTAINER: usize = 14;
const COLUMN_SKIP_REASON: usize = 15;

/// Parses the tabular upstream scan report into candidate records.
///
/// The first line is a header and is skipped. Rows with too few columns are
/// dropped with a warning instead of aborting the whole scan.
pub fn parse_upstream_report(content: &str) -> Vec<UpstreamCandidate> {
    let mut candidates = Vec::new();

    for (line_number, line) in content.lines().enumerate() {
        if line_number == 0 || line.trim().is_empty() {
            continue;
        }

        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() <= COLUMN_SKIP_REASON {
            warn!(
                line = line_number + 1,
                columns = columns.len(),
                "skipping malformed upstream report row"
            );
            continue;
        }

        candidates.push(UpstreamCandidate {
            recipe: columns[COLUMN_RECIPE].trim().to_string(),
            current_version: columns[COLUMN_CURRENT_VERSION].trim().to_string(),
            next_version: columns[COLUMN_NEXT_VERSION].trim().to_string(),
            status: columns[COLUMN_STATUS].trim().to_string(),
            maintainer: columns[COLUMN_MAINTAINER].trim().to_string(),
            skip_reason: columns[COLUMN_SKIP_REASON].trim().to_string(),
        });
    }

    candidates
}
