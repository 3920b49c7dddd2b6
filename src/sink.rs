//! Session sink collaborator (spec §6): accepts batches of [`Session`]
//! rows and a final [`OptScoreReport`], with transactional (all-or-nothing
//! per batch) semantics.
//!
//! [`NdjsonSessionSink`] is a reference/test-only adapter — writing
//! sessions and the report as newline-delimited JSON to any `Write` —
//! grounded in the teacher's `sync::file::atomic_write`/`write_jsonl`
//! idiom: a batch is staged as a `Vec<String>` in memory and only
//! `write_all`'d once every line serializes cleanly, so a batch either
//! lands in full or not at all.

use crate::error::Result;
use crate::model::report::OptScoreReport;
use crate::model::Session;
use std::io::Write;

/// Accepts finished sessions and the final report. Implementations must
/// not partially write a batch: either every session in the batch is
/// durably written, or none are (spec §6 "transactional batch write").
pub trait SessionSink {
    /// Write a batch of sessions atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch cannot be serialized or written.
    fn write_sessions(&mut self, sessions: &[Session]) -> Result<()>;

    /// Write the final report.
    ///
    /// # Errors
    ///
    /// Returns an error if the report cannot be serialized or written.
    fn write_report(&mut self, report: &OptScoreReport) -> Result<()>;
}

/// Writes sessions and the final report as NDJSON to any `Write`. Each
/// `write_sessions` call stages every line before issuing a single
/// `write_all`, so a serialization failure partway through never leaves a
/// truncated batch on the wire.
pub struct NdjsonSessionSink<W: Write> {
    writer: W,
}

impl<W: Write> NdjsonSessionSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> SessionSink for NdjsonSessionSink<W> {
    fn write_sessions(&mut self, sessions: &[Session]) -> Result<()> {
        let mut batch = String::new();
        for session in sessions {
            let line = serde_json::to_string(session)?;
            batch.push_str(&line);
            batch.push('\n');
        }
        self.writer.write_all(batch.as_bytes())?;
        Ok(())
    }

    fn write_report(&mut self, report: &OptScoreReport) -> Result<()> {
        let line = serde_json::to_string(report)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

/// An in-memory sink that collects written sessions and the report, for
/// tests and for callers that want the engine's output back as values.
#[derive(Default)]
pub struct InMemorySessionSink {
    pub sessions: Vec<Session>,
    pub report: Option<OptScoreReport>,
}

impl SessionSink for InMemorySessionSink {
    fn write_sessions(&mut self, sessions: &[Session]) -> Result<()> {
        self.sessions.extend_from_slice(sessions);
        Ok(())
    }

    fn write_report(&mut self, report: &OptScoreReport) -> Result<()> {
        self.report = Some(report.clone());
        Ok(())
    }
}

/// Write every session in `report.candidates`' winning window plus the
/// report itself to `path`, one JSON value per line (sessions first, then
/// the report as the final line).
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_ndjson_file(path: &std::path::Path, sessions: &[Session], report: &OptScoreReport) -> Result<()> {
    let file = std::fs::File::create(path)?;
    let mut sink = NdjsonSessionSink::new(file);
    sink.write_sessions(sessions)?;
    sink.write_report(report)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::session::{RefinementOrigin, SessionFlags};
    use crate::model::Provider;
    use chrono::Utc;

    fn sample_session(id: &str) -> Session {
        let now = Utc::now();
        Session {
            session_id: id.to_string(),
            provider: Provider::new("OpenAI"),
            start_ts: now,
            end_ts: now,
            request_ids: vec![1, 2],
            window_used: 100,
            refinement_origin: Some(RefinementOrigin::Initial),
            mibcs: Some(0.9),
            flags: SessionFlags::default(),
        }
    }

    #[test]
    fn writes_one_json_line_per_session() {
        let mut buf = Vec::new();
        {
            let mut sink = NdjsonSessionSink::new(&mut buf);
            sink.write_sessions(&[sample_session("a"), sample_session("b")]).unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn in_memory_sink_collects_sessions() {
        let mut sink = InMemorySessionSink::default();
        sink.write_sessions(&[sample_session("a")]).unwrap();
        assert_eq!(sink.sessions.len(), 1);
        assert!(sink.report.is_none());
    }

    #[test]
    fn in_memory_sink_collects_report() {
        let mut sink = InMemorySessionSink::default();
        let report = OptScoreReport::no_recommendation(vec![]);
        sink.write_report(&report).unwrap();
        assert!(sink.report.is_some());
    }

    #[test]
    fn write_ndjson_file_round_trips_through_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.ndjson");
        let sessions = [sample_session("a"), sample_session("b")];
        let report = OptScoreReport::no_recommendation(vec![]);

        write_ndjson_file(&path, &sessions, &report).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3, "two sessions plus the final report line");

        let last: OptScoreReport = serde_json::from_str(lines[2]).unwrap();
        assert!(last.recommended_window_ms.is_none());
    }
}
