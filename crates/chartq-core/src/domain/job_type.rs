//! JobType - task body を選ぶ文字列
//!
//! 空文字（空白のみを含む）は受け付けません。値は前後の空白を除いて保持します。

use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobType(String);

impl JobType {
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyJobType);
        }
        if trimmed.len() == value.len() {
            Ok(Self(value))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for JobType {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<JobType> for String {
    fn from(job_type: JobType) -> Self {
        job_type.0
    }
}

impl AsRef<str> for JobType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::empty("")]
    #[case::spaces("   ")]
    #[case::tab("\t")]
    fn rejects_blank(#[case] raw: &str) {
        assert_eq!(JobType::new(raw), Err(ValidationError::EmptyJobType));
    }

    #[test]
    fn trims_surrounding_whitespace() {
        assert_eq!(JobType::new(" histogram ").unwrap().as_str(), "histogram");
    }

    #[test]
    fn deserialize_validates() {
        assert!(serde_json::from_str::<JobType>("\"\"").is_err());
        let t: JobType = serde_json::from_str("\"line\"").unwrap();
        assert_eq!(t.as_str(), "line");
    }
}
