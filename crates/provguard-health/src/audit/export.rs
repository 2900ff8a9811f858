//! Audit history export as JSON or CSV.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use provguard_core::types::AuditEntry;
use provguard_core::{Error, Result};

const CSV_HEADER: &str =
    "id,timestamp,kind,source,strategy,provider,success,latencyMs,reason,candidates,activeConditions";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            _ => Err(Error::UnknownFormat(s.to_string())),
        }
    }
}

/// Render `entries` in `format`. JSON is a pretty-printed array in camelCase;
/// CSV has one header row and one row per entry.
pub fn export_entries(entries: &[Arc<AuditEntry>], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => {
            let plain: Vec<&AuditEntry> = entries.iter().map(Arc::as_ref).collect();
            Ok(serde_json::to_string_pretty(&plain)?)
        }
        ExportFormat::Csv => Ok(to_csv(entries)),
    }
}

fn to_csv(entries: &[Arc<AuditEntry>]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');

    for e in entries {
        let candidates = e
            .provider_candidates
            .iter()
            .map(|c| {
                if c.excluded {
                    format!("{}(excluded)", c.id)
                } else {
                    c.id.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(";");
        let conditions = e
            .active_conditions
            .iter()
            .filter(|c| c.is_active)
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let row = [
            e.id.to_string(),
            e.timestamp.to_rfc3339(),
            e.kind.as_str().to_string(),
            e.source.as_str().to_string(),
            e.strategy_name.clone(),
            e.selected_provider.clone(),
            e.success.to_string(),
            e.latency_ms.to_string(),
            e.fallback_reason.clone(),
            candidates,
            conditions,
        ];
        let row: Vec<String> = row.iter().map(|field| csv_field(field)).collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

/// Quote a field when it contains a separator, quote, or line break.
fn csv_field(value: &str) -> String {
    if value.contains(|c: char| matches!(c, ',' | '"' | '\n' | '\r')) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use provguard_core::types::{ActiveCondition, EntryKind, ProviderCandidate};
    use provguard_core::Topic;

    fn sample() -> Vec<Arc<AuditEntry>> {
        let mut excluded = ProviderCandidate::new("openai");
        excluded.excluded = true;
        vec![Arc::new(
            AuditEntry::new("anthropic", Topic::ProviderFailure, EntryKind::ProviderChange, Utc::now())
                .with_strategy("adaptive")
                .with_reason("Provider anthropic failed: rate limited, retry \"later\"")
                .with_outcome(false, 250.0)
                .with_candidates(vec![excluded, ProviderCandidate::new("anthropic")])
                .with_conditions(vec![
                    ActiveCondition {
                        name: "failureRateAbove(25)".into(),
                        is_active: true,
                    },
                    ActiveCondition {
                        name: "avgLatencyAbove(500)".into(),
                        is_active: false,
                    },
                ]),
        )]
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!(matches!("xml".parse::<ExportFormat>(), Err(Error::UnknownFormat(_))));
    }

    #[test]
    fn test_json_export_is_camel_case_array() {
        let json = export_entries(&sample(), ExportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let first = &value.as_array().unwrap()[0];
        assert_eq!(first["selectedProvider"], "anthropic");
        assert_eq!(first["strategyName"], "adaptive");
        assert_eq!(first["success"], false);
    }

    #[test]
    fn test_csv_export_quotes_and_joins() {
        let csv = export_entries(&sample(), ExportFormat::Csv).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), CSV_HEADER);

        let row = lines.next().unwrap();
        assert!(row.contains(",provider:failure,adaptive,anthropic,false,250,"));
        assert!(row.contains("\"Provider anthropic failed: rate limited, retry \"\"later\"\"\""));
        assert!(row.ends_with(",openai(excluded);anthropic,failureRateAbove(25)"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_empty_export() {
        assert_eq!(export_entries(&[], ExportFormat::Json).unwrap(), "[]");
        assert_eq!(export_entries(&[], ExportFormat::Csv).unwrap(), format!("{CSV_HEADER}\n"));
    }
}
