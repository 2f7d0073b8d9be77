//! Line task: yearly counts of the most common categories.
//!
//! # 集計
//! 1. 各 record から年（date_field）とカテゴリ（category_field）を取り出す
//!    （どちらかが欠けている・解釈できない record は数えない）
//! 2. 全期間合計の上位 5 カテゴリを選ぶ（同数は先に現れた順）
//! 3. カテゴリごとに 1 本の線、x 軸 = 年、y 軸 = 件数

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde::Deserialize;

use super::chart::{LineChart, Series};
use super::job_types;
use super::tally::top_n_stable;
use crate::domain::{Artifact, Record, TaskError};
use crate::typed::{Handler, Task};

pub const TOP_N: usize = 5;
pub const DEFAULT_DATE_FIELD: &str = "occ_date";
pub const DEFAULT_CATEGORY_FIELD: &str = "crime_type";

fn default_date_field() -> String {
    DEFAULT_DATE_FIELD.to_string()
}

fn default_category_field() -> String {
    DEFAULT_CATEGORY_FIELD.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineTask {
    #[serde(default = "default_date_field")]
    pub date_field: String,
    #[serde(default = "default_category_field")]
    pub category_field: String,
}

impl Default for LineTask {
    fn default() -> Self {
        Self {
            date_field: default_date_field(),
            category_field: default_category_field(),
        }
    }
}

impl Task for LineTask {
    const TYPE: &'static str = job_types::LINE;
}

/// Year of a date-like string, or `None` if it does not look like one.
pub fn year_of(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.year());
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(ts.year());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.year());
    }

    let digits = raw.get(..4)?;
    let boundary = raw[4..].chars().next().is_none_or(|c| !c.is_ascii_digit());
    if digits.chars().all(|c| c.is_ascii_digit()) && boundary {
        digits.parse().ok()
    } else {
        None
    }
}

#[derive(Debug, Default)]
struct YearlyCounts {
    totals: Vec<(String, usize)>,
    index: HashMap<String, usize>,
    per_year: HashMap<(usize, i32), usize>,
}

impl YearlyCounts {
    fn scan(task: &LineTask, dataset: &[Record]) -> Self {
        let mut counts = Self::default();
        for record in dataset {
            let year = record
                .get(&task.date_field)
                .and_then(|v| v.as_str())
                .and_then(year_of);
            let category = record.get(&task.category_field).and_then(|v| v.as_str());
            if let (Some(year), Some(category)) = (year, category) {
                counts.bump(category, year);
            }
        }
        counts
    }

    fn bump(&mut self, category: &str, year: i32) {
        let slot = match self.index.get(category) {
            Some(&slot) => slot,
            None => {
                let slot = self.totals.len();
                self.index.insert(category.to_string(), slot);
                self.totals.push((category.to_string(), 0));
                slot
            }
        };
        self.totals[slot].1 += 1;
        *self.per_year.entry((slot, year)).or_default() += 1;
    }

    fn series(&self, top: usize) -> (Vec<i32>, Vec<Series>) {
        let ranked: Vec<(usize, usize)> = self
            .totals
            .iter()
            .enumerate()
            .map(|(slot, (_, total))| (slot, *total))
            .collect();
        let chosen = top_n_stable(ranked, top);

        let years: Vec<i32> = self
            .per_year
            .keys()
            .filter(|(slot, _)| chosen.iter().any(|(c, _)| c == slot))
            .map(|(_, year)| *year)
            .collect::<BTreeSet<i32>>()
            .into_iter()
            .collect();

        let series = chosen
            .iter()
            .map(|(slot, _)| Series {
                name: self.totals[*slot].0.clone(),
                points: years
                    .iter()
                    .map(|year| self.per_year.get(&(*slot, *year)).copied().unwrap_or(0))
                    .collect(),
            })
            .collect();
        (years, series)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LineHandler;

impl LineHandler {
    pub fn chart(task: &LineTask, dataset: &[Record]) -> LineChart {
        let (x_values, series) = YearlyCounts::scan(task, dataset).series(TOP_N);
        LineChart {
            title: format!("Top {TOP_N} {} per year", task.category_field),
            x_label: "Year".to_string(),
            y_label: "Count".to_string(),
            x_values,
            series,
        }
    }
}

impl Handler<LineTask> for LineHandler {
    fn handle(&self, task: LineTask, dataset: &[Record]) -> Result<Artifact, TaskError> {
        let svg = Self::chart(&task, dataset)
            .render()
            .map_err(|e| TaskError::Failed(format!("rendering line chart: {e}")))?;
        Ok(Artifact::svg(svg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::records_from_json;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("2023-01-01T00:00:00.000", Some(2023))]
    #[case("2021-06-30", Some(2021))]
    #[case("2019-03-04T10:00:00Z", Some(2019))]
    #[case("2020-05-01T12:00:00+02:00", Some(2020))]
    #[case("2018/07/09", Some(2018))]
    #[case("1999", Some(1999))]
    #[case("20230101", None)]
    #[case("yesterday", None)]
    #[case("", None)]
    fn year_parsing(#[case] raw: &str, #[case] expected: Option<i32>) {
        assert_eq!(year_of(raw), expected);
    }

    #[test]
    fn params_default_to_crime_fields() {
        let task: LineTask = serde_json::from_value(json!({})).unwrap();
        assert_eq!(task.date_field, "occ_date");
        assert_eq!(task.category_field, "crime_type");
    }

    #[test]
    fn yearly_series_for_top_categories() {
        let data = records_from_json(json!([
            {"occ_date": "2021-01-01", "crime_type": "Theft"},
            {"occ_date": "2022-01-01", "crime_type": "Theft"},
            {"occ_date": "2022-03-01", "crime_type": "Theft"},
            {"occ_date": "2022-05-01", "crime_type": "Arson"},
            {"occ_date": "2023-05-01", "crime_type": "Fraud"},
            {"occ_date": "2023-06-01", "crime_type": "Fraud"},
            {"crime_type": "Theft"},
            {"occ_date": "garbage", "crime_type": "Arson"},
            {"occ_date": "2020-01-01", "crime_type": 5},
        ]))
        .unwrap();

        let chart = LineHandler::chart(&LineTask::default(), &data);
        assert_eq!(chart.x_values, vec![2021, 2022, 2023]);
        assert_eq!(
            chart.series,
            vec![
                Series {
                    name: "Theft".into(),
                    points: vec![1, 2, 0]
                },
                Series {
                    name: "Fraud".into(),
                    points: vec![0, 0, 2]
                },
                Series {
                    name: "Arson".into(),
                    points: vec![0, 1, 0]
                },
            ]
        );
    }

    #[test]
    fn only_five_categories_are_drawn() {
        let rows: Vec<_> = ["A", "B", "C", "D", "E", "F", "A"]
            .iter()
            .map(|c| json!({"occ_date": "2022-01-01", "crime_type": c}))
            .collect();
        let data = records_from_json(json!(rows)).unwrap();

        let chart = LineHandler::chart(&LineTask::default(), &data);
        let names: Vec<&str> = chart.series.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C", "D", "E"]);
    }

    #[test]
    fn custom_fields_are_respected() {
        let data = records_from_json(json!([
            {"when": "2020-02-02", "kind": "x"},
            {"occ_date": "2020-02-02", "crime_type": "y"},
        ]))
        .unwrap();
        let task = LineTask {
            date_field: "when".into(),
            category_field: "kind".into(),
        };

        let chart = LineHandler::chart(&task, &data);
        assert_eq!(chart.series.len(), 1);
        assert_eq!(chart.series[0].name, "x");
    }
}
