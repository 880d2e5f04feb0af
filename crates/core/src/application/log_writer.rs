// Incremental job log writer
//
// Forwards log entries a job has not yet emitted to the user-facing sink and
// advances `offset` so a job seen twice never repeats a line.

use crate::domain::Job;
use crate::port::LogSink;
use chrono::SecondsFormat;
use std::sync::Arc;

#[derive(Clone)]
pub struct JobLogWriter {
    sink: Arc<dyn LogSink>,
}

impl JobLogWriter {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    /// Emit `logs[offset..]` of the job and its children; returns lines written
    pub fn write(&self, job: &mut Job) -> usize {
        let mut written = 0;
        for child in job.children.iter_mut() {
            written += self.write(child);
        }

        let start = job.offset.min(job.logs().len());
        for entry in &job.logs()[start..] {
            self.sink.append_line(&format!(
                "{} [row {}] {}",
                entry.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
                job.index,
                entry.message
            ));
            written += 1;
        }
        job.offset = job.logs().len();
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::log_sink::mocks::MemoryLogSink;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_only_new_entries_are_written() {
        let sink = Arc::new(MemoryLogSink::new());
        let writer = JobLogWriter::new(sink.clone());
        let at = Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap();

        let mut job = Job::generic(7, Vec::new());
        job.log(at, "first");
        assert_eq!(writer.write(&mut job), 1);

        job.log(at, "second");
        assert_eq!(writer.write(&mut job), 1);
        assert_eq!(writer.write(&mut job), 0);

        assert_eq!(
            sink.lines(),
            vec![
                "2024-02-03T04:05:06Z [row 7] first".to_string(),
                "2024-02-03T04:05:06Z [row 7] second".to_string(),
            ]
        );
        assert_eq!(job.offset, 2);
    }

    #[test]
    fn test_children_logs_are_included() {
        let sink = Arc::new(MemoryLogSink::new());
        let writer = JobLogWriter::new(sink.clone());
        let mut child = Job::generic(3, Vec::new());
        child.log(Utc::now(), "child step");
        let mut parent = Job::generic(0, vec![child]);

        assert_eq!(writer.write(&mut parent), 1);
        assert!(sink.lines()[0].ends_with("[row 3] child step"));
    }
}
