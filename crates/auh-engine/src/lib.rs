mod context;
mod layout;
mod outcome;
mod pipeline;
mod recipe;
mod run;
mod source;

pub use context::{parse_build_env, UpgradeContext};
pub use layout::{OutcomeBucket, RunLayout};
pub use outcome::{MaintainerTally, OutcomeAggregator, RunStatistics};
pub use pipeline::{StepFlow, StepPipeline};
pub use recipe::{classify_source, handler_for, RecipeSource, SourceKind};
pub use run::UpgradeRun;
pub use source::{CandidateSource, ExplicitList, UpstreamScan};

#[cfg(test)]
mod tests;
