//! Session export as a downloadable JSON document.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Snapshot of a whole session wrapped with export metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    /// Identifier of the exported session.
    pub session_id: String,
    /// Export time, RFC 3339.
    pub date: String,
    /// The full session document as stored.
    pub retrospective: Value,
}

impl ExportDocument {
    /// Wrap a session snapshot, stamping the current time.
    pub fn new(session_id: String, retrospective: Value) -> Self {
        let date = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "invalid-timestamp".into());
        Self {
            session_id,
            date,
            retrospective,
        }
    }

    /// File name offered for the download:
    /// `retrospective-{sessionId}-{YYYY-MM-DD}.json`.
    pub fn suggested_filename(&self) -> String {
        let day = self.date.get(..10).unwrap_or("unknown-date");
        format!("retrospective-{}-{day}.json", self.session_id)
    }

    /// Write the export into `dir` under [`Self::suggested_filename`],
    /// returning the file path.
    pub fn write_to_dir(&self, dir: &Path) -> io::Result<PathBuf> {
        let path = dir.join(self.suggested_filename());
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn filename_embeds_session_and_day() {
        let export = ExportDocument::new("retro-abc1234".into(), json!({}));
        let name = export.suggested_filename();
        assert!(name.starts_with("retrospective-retro-abc1234-"));
        assert!(name.ends_with(".json"));
        let day = &name["retrospective-retro-abc1234-".len()..name.len() - ".json".len()];
        assert_eq!(day.len(), 10, "YYYY-MM-DD expected, got {day}");
    }

    #[test]
    fn serialized_export_keeps_the_wire_field_names() {
        let export = ExportDocument::new(
            "retro-abc1234".into(),
            json!({"owner": "participant-1"}),
        );
        let value = serde_json::to_value(&export).unwrap();
        assert_eq!(value["sessionId"], "retro-abc1234");
        assert!(value["date"].is_string());
        assert_eq!(value["retrospective"]["owner"], "participant-1");
    }

    #[test]
    fn write_to_dir_produces_the_file() {
        let export = ExportDocument::new("retro-abc1234".into(), json!({"positive": {}}));
        let dir = std::env::temp_dir();
        let path = export.write_to_dir(&dir).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("\"retro-abc1234\""));
        let _ = std::fs::remove_file(path);
    }
}
