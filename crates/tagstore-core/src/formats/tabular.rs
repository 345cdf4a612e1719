//! # CSV Projections
//!
//! Row-oriented renderings of the canonical collection. Every CSV here is
//! regenerated wholesale from its source rows and always carries a header,
//! even when there are no rows.

use crate::primitives::{EXPORT_COLUMNS, FAILURE_COLUMNS, OFFENSIVE_COLUMNS};
use crate::{FailureRow, OffensiveLogEntry, TagError, TagRecord};
use chrono::SecondsFormat;

fn csv_error(e: impl std::fmt::Display) -> TagError {
    TagError::SerializationError(format!("CSV: {}", e))
}

fn new_writer(header: &[&str]) -> Result<csv::Writer<Vec<u8>>, TagError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(header).map_err(csv_error)?;
    Ok(writer)
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String, TagError> {
    let bytes = writer.into_inner().map_err(|e| csv_error(e.error()))?;
    String::from_utf8(bytes).map_err(csv_error)
}

/// Render the export CSV: one row per record, `tags` as compact JSON.
pub fn records_to_csv(records: &[TagRecord]) -> Result<String, TagError> {
    let mut writer = new_writer(&EXPORT_COLUMNS)?;
    for record in records {
        let tags = record.tags.to_json_string()?;
        let timestamp = record.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true);
        let flagged = record.flagged.to_string();
        let rejected = record.rejected.to_string();
        writer
            .write_record([
                record.image_id.as_str(),
                record.text.as_str(),
                record.image_url.as_str(),
                tags.as_str(),
                record.tagger.as_str(),
                record.uid.as_deref().unwrap_or_default(),
                record.display_name.as_deref().unwrap_or_default(),
                timestamp.as_str(),
                flagged.as_str(),
                rejected.as_str(),
            ])
            .map_err(csv_error)?;
    }
    finish(writer)
}

/// Render the failures CSV.
pub fn failures_to_csv(rows: &[FailureRow]) -> Result<String, TagError> {
    let mut writer = new_writer(&FAILURE_COLUMNS)?;
    for row in rows {
        writer.serialize(row).map_err(csv_error)?;
    }
    finish(writer)
}

/// Render offensive-log entries, with or without the header line.
pub fn offensive_to_csv(entries: &[OffensiveLogEntry], with_header: bool) -> Result<String, TagError> {
    let mut writer = if with_header {
        new_writer(&OFFENSIVE_COLUMNS)?
    } else {
        csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new())
    };
    for entry in entries {
        writer.serialize(entry).map_err(csv_error)?;
    }
    finish(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FlagKind, TagSet};

    #[test]
    fn empty_failures_still_have_header() {
        let csv = failures_to_csv(&[]).expect("render");
        assert_eq!(csv, "image_id,text,rejected,flagged,tagger,tags\n");
    }

    #[test]
    fn failure_row_quotes_json_tags() {
        let record = TagRecord::new("img1", TagSet::new().with_quality("Low"))
            .with_tagger("ada@example.com")
            .with_flag(FlagKind::Flagged);
        let row = FailureRow::from_record(&record).expect("project");
        let csv = failures_to_csv(&[row]).expect("render");

        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("image_id,text,rejected,flagged,tagger,tags"));
        assert_eq!(
            lines.next(),
            Some(r#"img1,,false,true,ada@example.com,"{""quality"":""Low""}""#)
        );
    }

    #[test]
    fn export_csv_reads_back_with_csv_reader() {
        let mut record = TagRecord::new("img,2", TagSet::new());
        record.text = "line one\nline two".to_string();
        let csv = records_to_csv(&[record]).expect("render");

        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        let headers = reader.headers().expect("headers").clone();
        assert_eq!(headers.len(), EXPORT_COLUMNS.len());

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.expect("row")).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][0], "img,2");
        assert_eq!(&rows[0][1], "line one\nline two");
    }

    #[test]
    fn offensive_rows_without_header() {
        let entry = OffensiveLogEntry {
            timestamp: "t".into(),
            image_id: "i".into(),
            image_url: "u".into(),
            text: "x".into(),
            flagged_by: "f".into(),
        };
        assert_eq!(offensive_to_csv(&[entry.clone()], false).expect("rows"), "t,i,u,x,f\n");
        assert_eq!(
            offensive_to_csv(&[entry], true).expect("rows"),
            "timestamp,image_id,image_url,text,flagged_by\nt,i,u,x,f\n"
        );
    }
}
