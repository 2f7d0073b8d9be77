//! Value counting over dataset records.

use std::collections::HashMap;
use std::fmt;

use crate::domain::Record;

/// How many records carried a field at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    Absent,
    Everywhere,
    Partial { total: usize, present: usize },
}

impl Coverage {
    fn new(total: usize, present: usize) -> Self {
        if present == 0 {
            Self::Absent
        } else if present == total {
            Self::Everywhere
        } else {
            Self::Partial { total, present }
        }
    }

    pub fn describe(&self, field: &str) -> String {
        match self {
            Self::Absent => "This field isn't present in the data".to_string(),
            Self::Everywhere => "This field was present in all datapoints".to_string(),
            Self::Partial { total, present } => {
                format!("Out of a total of {total} datapoints, {present} contained the {field} field")
            }
        }
    }
}

/// Counts of each distinct string value of one field, in first-seen order.
///
/// A record counts toward coverage whenever it has the key, but only string
/// values are tallied; anything else is skipped rather than rejected.
#[derive(Debug, Clone)]
pub struct FieldTally {
    field: String,
    total: usize,
    present: usize,
    counts: Vec<(String, usize)>,
    index: HashMap<String, usize>,
}

impl FieldTally {
    pub fn scan(field: &str, records: &[Record]) -> Self {
        let mut tally = Self {
            field: field.to_string(),
            total: records.len(),
            present: 0,
            counts: Vec::new(),
            index: HashMap::new(),
        };
        for record in records {
            let Some(value) = record.get(field) else {
                continue;
            };
            tally.present += 1;
            if let Some(value) = value.as_str() {
                tally.bump(value);
            }
        }
        tally
    }

    fn bump(&mut self, value: &str) {
        match self.index.get(value) {
            Some(&slot) => self.counts[slot].1 += 1,
            None => {
                self.index.insert(value.to_string(), self.counts.len());
                self.counts.push((value.to_string(), 1));
            }
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn counts(&self) -> &[(String, usize)] {
        &self.counts
    }

    pub fn coverage(&self) -> Coverage {
        Coverage::new(self.total, self.present)
    }

    /// The `n` most frequent values, descending; ties keep first-seen order.
    pub fn top_n(&self, n: usize) -> Vec<(String, usize)> {
        top_n_stable(self.counts.clone(), n)
    }
}

/// Stable descending sort by count, truncated to `n`.
pub(crate) fn top_n_stable<K>(mut counts: Vec<(K, usize)>, n: usize) -> Vec<(K, usize)> {
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.truncate(n);
    counts
}

impl fmt::Display for FieldTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.coverage().describe(&self.field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::{Value, json};

    fn records(value: Value) -> Vec<Record> {
        crate::domain::records_from_json(value).unwrap()
    }

    #[test]
    fn counts_only_string_values() {
        let data = records(json!([
            {"k": "x"},
            {"k": 3},
            {"k": {"nested": "x"}},
            {"k": "x"},
            {"other": "x"},
            {"k": null},
        ]));
        let tally = FieldTally::scan("k", &data);

        assert_eq!(tally.counts(), &[("x".to_string(), 2)]);
        assert_eq!(
            tally.coverage(),
            Coverage::Partial {
                total: 6,
                present: 5
            }
        );
    }

    #[test]
    fn first_seen_order_is_kept() {
        let data = records(json!([{"k": "b"}, {"k": "a"}, {"k": "b"}, {"k": "c"}]));
        let tally = FieldTally::scan("k", &data);
        let keys: Vec<&str> = tally.counts().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn top_n_breaks_ties_by_first_seen() {
        let data = records(json!([
            {"v": "value1"}, {"v": "value2"}, {"v": "value1"}, {"v": "value3"},
            {"v": "value2"}, {"v": "value1"}, {"v": "value4"}, {"v": "value5"},
            {"v": "value6"},
        ]));
        let top = FieldTally::scan("v", &data).top_n(5);
        assert_eq!(
            top,
            vec![
                ("value1".to_string(), 3),
                ("value2".to_string(), 2),
                ("value3".to_string(), 1),
                ("value4".to_string(), 1),
                ("value5".to_string(), 1),
            ]
        );
    }

    #[rstest]
    #[case::absent(json!([{"a": "1"}]), "This field isn't present in the data")]
    #[case::empty(json!([]), "This field isn't present in the data")]
    #[case::everywhere(json!([{"f": "1"}, {"f": 2}]), "This field was present in all datapoints")]
    #[case::partial(
        json!([{"f": "1"}, {"g": "2"}, {"f": "3"}]),
        "Out of a total of 3 datapoints, 2 contained the f field"
    )]
    fn coverage_messages(#[case] data: Value, #[case] expected: &str) {
        let tally = FieldTally::scan("f", &records(data));
        assert_eq!(tally.to_string(), expected);
    }
}
