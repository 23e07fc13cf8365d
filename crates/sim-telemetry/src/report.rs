//! End-of-run counters reporting.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::TelemetryError;

/// Accumulates labeled counter sections into one JSON report.
///
/// Each subsystem serializes its own counters; the builder only arranges
/// them under stable labels so runs can be diffed.
#[derive(Debug, Default)]
pub struct ReportBuilder {
    sections: Map<String, Value>,
}

impl ReportBuilder {
    pub fn new() -> Self {
        ReportBuilder::default()
    }

    pub fn section(
        &mut self,
        label: impl Into<String>,
        value: &impl Serialize,
    ) -> Result<&mut Self, TelemetryError> {
        let value =
            serde_json::to_value(value).map_err(|err| TelemetryError::Config(err.to_string()))?;
        self.sections.insert(label.into(), value);
        Ok(self)
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(&Value::Object(self.sections.clone()))
            .expect("report serialization cannot fail")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Counters {
        n_etg: u64,
    }

    #[test]
    fn test_sections_appear_under_their_labels() {
        let mut report = ReportBuilder::new();
        report.section("n1.link", &Counters { n_etg: 7 }).unwrap();
        let text = report.to_json_pretty();
        assert!(text.contains("\"n1.link\""));
        assert!(text.contains("\"n_etg\": 7"));
    }
}
