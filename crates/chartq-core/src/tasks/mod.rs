//! Built-in task bodies.
//!
//! どちらも「params + dataset → SVG artifact」の純粋な計算です。

pub mod chart;
pub mod histogram;
pub mod line;
pub mod tally;

pub use self::histogram::{HistogramHandler, HistogramTask};
pub use self::line::{LineHandler, LineTask};
pub use self::tally::{Coverage, FieldTally};

use crate::typed::{RegistryError, TaskRegistry};

/// Job type strings accepted by the built-in tasks.
pub mod job_types {
    pub const HISTOGRAM: &str = "histogram";
    pub const LINE: &str = "line";

    pub const ALL: [&str; 2] = [HISTOGRAM, LINE];
}

pub fn register_builtin_tasks(registry: &mut TaskRegistry) -> Result<(), RegistryError> {
    registry.register::<HistogramTask, _>(HistogramHandler)?;
    registry.register::<LineTask, _>(LineHandler)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_cover_all_job_types() {
        let mut registry = TaskRegistry::new();
        register_builtin_tasks(&mut registry).unwrap();

        assert_eq!(registry.registered_types(), vec!["histogram", "line"]);
        for job_type in job_types::ALL {
            assert!(registry.contains(job_type));
        }
    }
}
