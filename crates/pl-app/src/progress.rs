use pl_timeseries::StepProgress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    LoadingScenario,
    CheckingCache,
    LoadingCachedResult,
    Compiling,
    RunningTimeSeries,
    SavingResults,
    Exporting,
    Completed,
}

impl RunStage {
    pub fn label(self) -> &'static str {
        match self {
            RunStage::LoadingScenario => "loading scenario",
            RunStage::CheckingCache => "checking cache",
            RunStage::LoadingCachedResult => "loading cached result",
            RunStage::Compiling => "compiling",
            RunStage::RunningTimeSeries => "running time series",
            RunStage::SavingResults => "saving results",
            RunStage::Exporting => "exporting",
            RunStage::Completed => "completed",
        }
    }
}

/// Position of the time-series driver within a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeriesProgress {
    pub time: usize,
    /// 1-based count of processed steps.
    pub step: usize,
    pub total: usize,
    pub fraction_complete: f64,
    /// Power-flow solves spent on this step.
    pub solves: usize,
    pub skipped: bool,
}

impl From<&StepProgress> for TimeSeriesProgress {
    fn from(p: &StepProgress) -> Self {
        Self {
            time: p.time,
            step: p.position + 1,
            total: p.total,
            fraction_complete: p.fraction_complete,
            solves: p.loop_report.as_ref().map_or(0, |r| r.solves),
            skipped: p.loop_report.is_none(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunProgressEvent {
    pub stage: RunStage,
    pub elapsed_wall_s: f64,
    pub message: Option<String>,
    pub timeseries: Option<TimeSeriesProgress>,
}

impl RunProgressEvent {
    pub fn stage(stage: RunStage, elapsed_wall_s: f64, message: Option<String>) -> Self {
        Self {
            stage,
            elapsed_wall_s,
            message,
            timeseries: None,
        }
    }
}
