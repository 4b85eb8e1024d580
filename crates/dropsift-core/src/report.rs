/// Exports: the queue as CSV, a run as a JSON summary.
use crate::analysis::FolderAnalysis;
use crate::dedup::DedupReport;
use crate::error::ReportError;
use crate::model::FileStatus;
use crate::render::{QueueItem, UploadQueue};
use crate::stall::StallDiagnostic;
use crate::walker::WalkSummary;
use crate::worker::WorkerStats;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::io;
use std::path::Path;

const CSV_HEADER: [&str; 8] = [
    "index", "path", "name", "type", "size", "modified", "status", "sha256",
];

/// Write `items` as CSV, one row per queue entry.
pub fn write_queue_csv<W: io::Write>(items: &[QueueItem], writer: W) -> Result<(), ReportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(CSV_HEADER)?;
    for item in items {
        let modified = DateTime::from_timestamp_millis(item.last_modified_ms)
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        let index = item.original_index.to_string();
        let size = item.size.to_string();
        wtr.write_record([
            index.as_str(),
            item.path.as_str(),
            item.file_name.as_str(),
            item.file_type.as_str(),
            size.as_str(),
            modified.as_str(),
            item.status.label(),
            item.hash.as_deref().unwrap_or(""),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn export_queue_csv(items: &[QueueItem], path: &Path) -> Result<(), ReportError> {
    let file = std::fs::File::create(path)?;
    write_queue_csv(items, io::BufWriter::new(file))
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueCounts {
    pub ready: usize,
    pub duplicate: usize,
    pub ready_bytes: u64,
    pub duplicate_bytes: u64,
}

impl QueueCounts {
    pub fn of(queue: &UploadQueue) -> Self {
        Self {
            ready: queue.ready_count(),
            duplicate: queue.duplicate_count(),
            ready_bytes: queue.total_bytes(FileStatus::Ready),
            duplicate_bytes: queue.total_bytes(FileStatus::Duplicate),
        }
    }
}

/// Everything one scan did, for `--json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Local>,
    pub root: String,
    pub strategy: &'static str,
    pub walk: WalkSummary,
    pub stalls: Vec<StallDiagnostic>,
    pub analysis: FolderAnalysis,
    pub dedup: DedupReport,
    pub queue: QueueCounts,
    pub worker: Option<WorkerStats>,
}

impl RunSummary {
    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderConfig;
    use crate::dedup::{self, ProcessingPath, RunContext};
    use crate::hash::Sha256Hasher;
    use crate::model::FileReference;
    use crate::render::QueueRenderer;
    use std::time::Duration;

    fn classified_queue() -> (UploadQueue, DedupReport) {
        let files = vec![
            FileReference::in_memory(0, "sel/a.txt", &b"same"[..], 1_700_000_000_000),
            FileReference::in_memory(1, "sel/b.txt", &b"same"[..], 1_600_000_000_000),
        ];
        let pool = dedup::hashing_pool(1, "report-test").unwrap();
        let mut ctx = RunContext::new(1);
        let out = dedup::deduplicate(
            files,
            &Sha256Hasher::default(),
            &pool,
            &mut ctx,
            ProcessingPath::MainThread,
            Duration::ZERO,
            &|_| {},
        );
        let mut queue = UploadQueue::new();
        QueueRenderer::new(RenderConfig::default()).materialize(&out.ready, &out.duplicate, &mut queue);
        (queue, out.report)
    }

    #[test]
    fn csv_has_header_and_one_row_per_item() {
        let (queue, _) = classified_queue();
        let mut buf = Vec::new();
        write_queue_csv(queue.items(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "index,path,name,type,size,modified,status,sha256");
        assert!(lines[1].starts_with("1,sel/b.txt,b.txt,text/plain,4,"));
        assert!(lines[1].contains(",ready,"));
        assert!(lines[2].contains(",duplicate,"));
    }

    #[test]
    fn summary_serializes_to_json() {
        let (queue, report) = classified_queue();
        let summary = RunSummary {
            generated_at: Local::now(),
            root: "sel".into(),
            strategy: "main-thread",
            walk: crate::walker::WalkOutcome::default().summary(),
            stalls: Vec::new(),
            analysis: FolderAnalysis::default(),
            dedup: report,
            queue: QueueCounts::of(&queue),
            worker: None,
        };
        let json: serde_json::Value = serde_json::from_str(&summary.to_json().unwrap()).unwrap();
        assert_eq!(json["queue"]["ready"], 1);
        assert_eq!(json["queue"]["duplicate"], 1);
        assert_eq!(json["dedup"]["path"], "main_thread");
        assert_eq!(json["dedup"]["duplicate_groups"], 1);
    }
}
