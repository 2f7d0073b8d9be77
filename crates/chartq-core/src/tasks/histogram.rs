//! Histogram task: top values of one field as a bar chart.

use serde::Deserialize;

use super::chart::BarChart;
use super::job_types;
use super::tally::FieldTally;
use crate::domain::{Artifact, Record, TaskError};
use crate::typed::{Handler, Task};

pub const TOP_N: usize = 5;

#[derive(Debug, Clone, Deserialize)]
pub struct HistogramTask {
    /// Field whose string values are counted.
    pub param: String,
}

impl Task for HistogramTask {
    const TYPE: &'static str = job_types::HISTOGRAM;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HistogramHandler;

impl HistogramHandler {
    pub fn chart(task: &HistogramTask, dataset: &[Record]) -> BarChart {
        let tally = FieldTally::scan(&task.param, dataset);
        BarChart {
            title: format!("Histogram for {}", task.param),
            subtitle: Some(tally.to_string()),
            x_label: format!("Values for {}", task.param),
            y_label: "Occurrences".to_string(),
            bars: tally.top_n(TOP_N),
        }
    }
}

impl Handler<HistogramTask> for HistogramHandler {
    fn handle(&self, task: HistogramTask, dataset: &[Record]) -> Result<Artifact, TaskError> {
        let svg = Self::chart(&task, dataset)
            .render()
            .map_err(|e| TaskError::Failed(format!("rendering histogram: {e}")))?;
        Ok(Artifact::svg(svg))
    }
}
