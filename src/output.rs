//! Output sink: renders accepted entries and writes them downstream.
//!
//! Stdout is reserved for entries; everything diagnostic goes to the log.

use std::io::{self, Write};

use tokio::sync::mpsc::UnboundedReceiver;

use crate::watcher::Entry;

/// Serialization mode for accepted lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// `[tag] [working-path] message`, tag segment omitted when empty.
    #[default]
    Raw,
    /// One JSON object per line with stable keys.
    Json,
}

/// Drains the shared entry queue and writes one line per accepted entry.
///
/// Generic over the destination so tests can capture output in a buffer;
/// production uses stdout.
#[derive(Debug)]
pub struct OutputWriter<W> {
    tag: String,
    format: OutputFormat,
    writer: W,
}

impl OutputWriter<io::Stdout> {
    #[must_use]
    pub fn stdout(tag: impl Into<String>, format: OutputFormat) -> Self {
        Self::new(tag, format, io::stdout())
    }
}

impl<W: Write> OutputWriter<W> {
    pub fn new(tag: impl Into<String>, format: OutputFormat, writer: W) -> Self {
        Self {
            tag: tag.into(),
            format,
            writer,
        }
    }

    /// Renders a single entry according to the configured mode, injecting
    /// the operator tag.
    fn render(&self, mut entry: Entry) -> Result<String, serde_json::Error> {
        entry.tag.clone_from(&self.tag);
        match self.format {
            OutputFormat::Raw => Ok(if entry.tag.is_empty() {
                format!("[{}] {}", entry.source.display(), entry.msg)
            } else {
                format!("[{}] [{}] {}", entry.tag, entry.source.display(), entry.msg)
            }),
            OutputFormat::Json => serde_json::to_string(&entry),
        }
    }

    /// Consumes entries until the queue closes (every producer gone),
    /// then hands the destination back for inspection.
    pub async fn run(mut self, mut entries: UnboundedReceiver<Entry>) -> W {
        while let Some(entry) = entries.recv().await {
            match self.render(entry) {
                Ok(line) => {
                    let write = writeln!(self.writer, "{line}").and_then(|()| self.writer.flush());
                    if let Err(e) = write {
                        tracing::error!(error = %e, "output sink failed, stopping writer");
                        break;
                    }
                }
                Err(e) => tracing::error!(error = %e, "failed to serialize entry"),
            }
        }
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tokio::sync::mpsc;

    fn entry(source: &str, msg: &str) -> Entry {
        Entry::new(PathBuf::from(source), "box", msg)
    }

    #[test]
    fn raw_without_tag() {
        let writer = OutputWriter::new("", OutputFormat::Raw, Vec::new());
        let line = writer.render(entry("file1.log", "hello")).unwrap();
        assert_eq!(line, "[file1.log] hello");
    }

    #[test]
    fn raw_with_tag() {
        let writer = OutputWriter::new("X", OutputFormat::Raw, Vec::new());
        let line = writer.render(entry("file1.log", "hello")).unwrap();
        assert_eq!(line, "[X] [file1.log] hello");
    }

    #[test]
    fn raw_uses_the_working_path() {
        let writer = OutputWriter::new("", OutputFormat::Raw, Vec::new());
        let line = writer.render(entry("sub/file5.log", "content")).unwrap();
        assert_eq!(line, "[sub/file5.log] content");
    }

    #[test]
    fn json_injects_tag_and_keeps_stable_keys() {
        let writer = OutputWriter::new("aTag", OutputFormat::Json, Vec::new());
        let line = writer.render(entry("sub/file1.log", "hello")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(json["tag"], "aTag");
        assert_eq!(json["file"], "file1.log");
        assert_eq!(json["dirs"], serde_json::json!(["sub"]));
        assert_eq!(json["msg"], "hello");
        assert!(json.get("source").is_none());
    }

    #[tokio::test]
    async fn run_writes_until_the_queue_closes() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(entry("file1.log", "one")).unwrap();
        tx.send(entry("file1.log", "two")).unwrap();
        drop(tx);

        let writer = OutputWriter::new("", OutputFormat::Raw, Vec::new());
        let buffer = writer.run(rx).await;
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "[file1.log] one\n[file1.log] two\n"
        );
    }
}
