//! Consumer adapter: a live, folded view of one analysis

mod analysis_watch;
mod progress;

pub use analysis_watch::AnalysisWatch;
pub use progress::AnalysisProgress;
