//! Line-oriented stream over a temporary buffer file.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use super::AccessMode;
use crate::diagnostic::{ErrorRecord, ProviderError};
use crate::engine::Engine;
use crate::handler::{Node, Value};
use crate::host::CallContext;

/// Error id written when reading the buffer fails mid-stream.
const READER_IO_ERROR: &str = "GetContentReaderIOError";

/// An open content stream for one leaf.
///
/// Must be finished with [`close`](Self::close): closing a write stream is
/// what persists its content. Dropping a stream releases the buffer without
/// persisting anything.
pub struct ContentStream {
    mode: AccessMode,
    node: Node,
    logical_path: String,
    engine: Engine,
    buffer: Option<NamedTempFile>,
    reader: Option<BufReader<File>>,
    writer: Option<BufWriter<File>>,
}

impl ContentStream {
    /// Create the buffer and attach the handle for `mode`.
    ///
    /// Read streams start with `initial` rendered one line per value.
    pub(crate) fn create(
        engine: Engine,
        node: Node,
        logical_path: String,
        mode: AccessMode,
        initial: &[Value],
    ) -> Result<Self, ProviderError> {
        let buffer = tempfile::Builder::new()
            .prefix(engine.config().buffer_prefix.as_str())
            .tempfile()?;
        log::debug!(
            "opened {} buffer {} for '{logical_path}'",
            mode,
            buffer.path().display()
        );

        let mut stream = Self {
            mode,
            node,
            logical_path,
            engine,
            buffer: None,
            reader: None,
            writer: None,
        };

        match mode {
            AccessMode::Read => {
                let mut fill = BufWriter::new(buffer.reopen()?);
                write_lines(&mut fill, initial)?;
                fill.flush()?;
                stream.reader = Some(BufReader::new(buffer.reopen()?));
            }
            AccessMode::Write => {
                stream.writer = Some(BufWriter::new(buffer.reopen()?));
            }
        }
        stream.buffer = Some(buffer);

        Ok(stream)
    }

    /// The direction this stream was opened for.
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// The leaf this stream belongs to.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Logical path handed to `SetContent` on close.
    pub fn logical_path(&self) -> &str {
        &self.logical_path
    }

    /// Location of the transient buffer while the stream is open.
    pub fn buffer_path(&self) -> Option<&Path> {
        self.buffer.as_ref().map(NamedTempFile::path)
    }

    /// Read up to `count` lines; `count <= 0` reads to the end.
    ///
    /// Reading stops early when the caller's stop signal is raised. A failing
    /// read is written to the host as a `GetContentReaderIOError` record and
    /// the lines read so far are returned.
    pub fn read(&mut self, count: i64, ctx: &CallContext<'_>) -> Result<Vec<String>, ProviderError> {
        let Some(reader) = self.reader.as_mut() else {
            return Err(ProviderError::WrongMode(AccessMode::Read));
        };

        let limit = usize::try_from(count).ok().filter(|n| *n > 0);
        let mut lines = Vec::new();
        while limit.is_none_or(|limit| lines.len() < limit) {
            if ctx.stopping() {
                break;
            }

            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {
                    let trimmed = line.trim_end_matches(['\n', '\r']).len();
                    line.truncate(trimmed);
                    lines.push(line);
                }
                Err(err) => {
                    let record = ErrorRecord::from_io(READER_IO_ERROR, &err, self.logical_path.as_str());
                    ctx.host().write_error(&record);
                    break;
                }
            }
        }

        Ok(lines)
    }

    /// Append values as lines and hand them back.
    ///
    /// Arrays are flattened one level, nulls are skipped and strings are
    /// written without quotes; other values use their JSON form.
    pub fn write(&mut self, values: Vec<Value>) -> Result<Vec<Value>, ProviderError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(ProviderError::WrongMode(AccessMode::Write));
        };
        write_lines(writer, &values)?;
        Ok(values)
    }

    /// Move the cursor of the open handle.
    pub fn seek(&mut self, position: SeekFrom) -> Result<u64, ProviderError> {
        let offset = match (self.reader.as_mut(), self.writer.as_mut()) {
            (Some(reader), _) => reader.seek(position)?,
            (None, Some(writer)) => writer.seek(position)?,
            (None, None) => return Err(ProviderError::WrongMode(self.mode)),
        };
        Ok(offset)
    }

    /// Flush and release the handles, persist write streams, delete the
    /// buffer.
    ///
    /// Write streams call `SetContent` exactly once with the buffer path and
    /// the logical path. The buffer is deleted whether or not that succeeds;
    /// the first failure (flush, then persist, then release) is returned.
    pub fn close(mut self, ctx: &CallContext<'_>) -> Result<(), ProviderError> {
        let flushed = match self.writer.take() {
            Some(writer) => writer.into_inner().map(drop).map_err(|err| err.into_error()),
            None => Ok(()),
        };
        self.reader = None;

        let persisted = match (&self.buffer, self.mode, &flushed) {
            (Some(buffer), AccessMode::Write, Ok(())) => {
                self.engine
                    .persist(&self.node, buffer.path(), &self.logical_path, ctx)
            }
            _ => Ok(()),
        };

        let released = match self.buffer.take() {
            Some(buffer) => buffer.close(),
            None => Ok(()),
        };
        if let Err(err) = &released {
            log::warn!("failed to remove buffer for '{}': {err}", self.logical_path);
        }

        flushed?;
        persisted?;
        released?;
        Ok(())
    }
}

impl Drop for ContentStream {
    fn drop(&mut self) {
        if self.buffer.is_some() {
            log::debug!(
                "{} stream for '{}' dropped without close, content discarded",
                self.mode,
                self.logical_path
            );
        }
    }
}

impl std::fmt::Debug for ContentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentStream")
            .field("mode", &self.mode)
            .field("node", &self.node.name())
            .field("logical_path", &self.logical_path)
            .field("buffer", &self.buffer_path())
            .finish()
    }
}

fn write_lines(out: &mut impl Write, values: &[Value]) -> io::Result<()> {
    for value in values {
        match value {
            Value::Array(items) => {
                for item in items {
                    write_line(out, item)?;
                }
            }
            other => write_line(out, other)?,
        }
    }
    Ok(())
}

fn write_line(out: &mut impl Write, value: &Value) -> io::Result<()> {
    match value {
        Value::Null => Ok(()),
        Value::String(text) => writeln!(out, "{text}"),
        other => writeln!(out, "{other}"),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::host::{RecordingHost, StopSignal};
    use crate::test_support::{engine_with_interval, NotesLeaf, ScriptedDir, SlowSink};
    use crate::tree::{NodeId, Tree};
    use serde_json::json;

    fn notes_tree(notes: &Arc<NotesLeaf>) -> (Tree, NodeId) {
        let root = Arc::new(ScriptedDir::new(Vec::new()));
        let mut tree = Tree::new(Node::directory("root", root)).unwrap();
        let ids = tree.replace_children(tree.root(), vec![Node::leaf("notes", notes.clone())]);
        (tree, ids[0])
    }

    #[test]
    fn test_read_all_lines() {
        let engine = engine_with_interval(500);
        let host = RecordingHost::new();
        let ctx = CallContext::new(&host);
        let notes = Arc::new(NotesLeaf::new(["one", "two", "three"]));
        let (tree, id) = notes_tree(&notes);

        let mut stream = engine.open_content(&tree, id, AccessMode::Read, &ctx).unwrap();
        assert_eq!(stream.logical_path(), "/notes");
        assert_eq!(stream.read(0, &ctx).unwrap(), vec!["one", "two", "three"]);
        assert!(stream.read(0, &ctx).unwrap().is_empty());
        stream.close(&ctx).unwrap();
        assert_eq!(notes.persist_calls(), 0, "read streams never persist");
    }

    #[test]
    fn test_read_in_chunks_and_seek() {
        let engine = engine_with_interval(500);
        let host = RecordingHost::new();
        let ctx = CallContext::new(&host);
        let notes = Arc::new(NotesLeaf::new(["one", "two", "three"]));
        let (tree, id) = notes_tree(&notes);

        let mut stream = engine.open_content(&tree, id, AccessMode::Read, &ctx).unwrap();
        assert_eq!(stream.read(2, &ctx).unwrap(), vec!["one", "two"]);
        assert_eq!(stream.read(-1, &ctx).unwrap(), vec!["three"]);
        assert_eq!(stream.seek(SeekFrom::Start(0)).unwrap(), 0);
        assert_eq!(stream.read(1, &ctx).unwrap(), vec!["one"]);
        stream.close(&ctx).unwrap();
    }

    #[test]
    fn test_write_persists_once_and_releases_buffer() {
        let engine = engine_with_interval(500);
        let host = RecordingHost::new();
        let ctx = CallContext::new(&host);
        let notes = Arc::new(NotesLeaf::new(Vec::<&str>::new()));
        let (tree, id) = notes_tree(&notes);

        let mut stream = engine.open_content(&tree, id, AccessMode::Write, &ctx).unwrap();
        let buffer = stream.buffer_path().unwrap().to_path_buf();
        assert!(buffer
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("vtree-")));
        let written = stream.write(vec![json!("a"), json!("b")]).unwrap();
        assert_eq!(written, vec![json!("a"), json!("b")]);
        stream.close(&ctx).unwrap();

        assert_eq!(notes.persist_calls(), 1);
        assert_eq!(notes.persisted(), vec![("a\nb\n".to_string(), "/notes".to_string())]);
        assert!(!buffer.exists());
    }

    #[test]
    fn test_write_flattens_and_skips_nulls() {
        let engine = engine_with_interval(500);
        let host = RecordingHost::new();
        let ctx = CallContext::new(&host);
        let notes = Arc::new(NotesLeaf::new(Vec::<&str>::new()));
        let (tree, id) = notes_tree(&notes);

        let mut stream = engine.open_content(&tree, id, AccessMode::Write, &ctx).unwrap();
        stream
            .write(vec![json!(["x", 1]), Value::Null, json!({ "k": true })])
            .unwrap();
        stream.close(&ctx).unwrap();

        assert_eq!(notes.persisted()[0].0, "x\n1\n{\"k\":true}\n");
    }

    #[test]
    fn test_persist_failure_still_releases_buffer() {
        let engine = engine_with_interval(500);
        let host = RecordingHost::new();
        let ctx = CallContext::new(&host);
        let notes = Arc::new(NotesLeaf::new(Vec::<&str>::new()).failing_persist());
        let (tree, id) = notes_tree(&notes);

        let mut stream = engine.open_content(&tree, id, AccessMode::Write, &ctx).unwrap();
        let buffer = stream.buffer_path().unwrap().to_path_buf();
        stream.write(vec![json!("lost")]).unwrap();

        let err = stream.close(&ctx).unwrap_err();
        assert!(matches!(err, ProviderError::Handler { .. }));
        assert_eq!(notes.persist_calls(), 1);
        assert!(!buffer.exists());
        assert_eq!(host.reported().len(), 1);
    }

    #[test]
    fn test_set_content_not_supported() {
        struct ReadOnly;
        impl crate::handler::Handler for ReadOnly {}

        let engine = engine_with_interval(500);
        let host = RecordingHost::new();
        let ctx = CallContext::new(&host);
        let root = Arc::new(ScriptedDir::new(Vec::new()));
        let mut tree = Tree::new(Node::directory("root", root)).unwrap();
        let ids = tree.replace_children(tree.root(), vec![Node::leaf("fixed", Arc::new(ReadOnly))]);

        let stream = engine
            .open_content(&tree, ids[0], AccessMode::Write, &ctx)
            .unwrap();
        let err = stream.close(&ctx).unwrap_err();
        let ids: Vec<_> = err.records().unwrap().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["SetContent.NotSupported"]);
    }

    #[test]
    fn test_wrong_mode() {
        let engine = engine_with_interval(500);
        let host = RecordingHost::new();
        let ctx = CallContext::new(&host);
        let notes = Arc::new(NotesLeaf::new(["one"]));
        let (tree, id) = notes_tree(&notes);

        let mut reader = engine.open_content(&tree, id, AccessMode::Read, &ctx).unwrap();
        assert!(matches!(
            reader.write(vec![json!("x")]),
            Err(ProviderError::WrongMode(AccessMode::Write))
        ));
        reader.close(&ctx).unwrap();

        let mut writer = engine.open_content(&tree, id, AccessMode::Write, &ctx).unwrap();
        assert!(matches!(
            writer.read(0, &ctx),
            Err(ProviderError::WrongMode(AccessMode::Read))
        ));
        writer.close(&ctx).unwrap();
    }

    #[test]
    fn test_dropped_stream_removes_buffer_without_persist() {
        let engine = engine_with_interval(500);
        let host = RecordingHost::new();
        let ctx = CallContext::new(&host);
        let notes = Arc::new(NotesLeaf::new(Vec::<&str>::new()));
        let (tree, id) = notes_tree(&notes);

        let mut stream = engine.open_content(&tree, id, AccessMode::Write, &ctx).unwrap();
        let buffer = stream.buffer_path().unwrap().to_path_buf();
        stream.write(vec![json!("draft")]).unwrap();
        drop(stream);

        assert!(fs::metadata(&buffer).is_err());
        assert_eq!(notes.persist_calls(), 0);
    }

    #[test]
    fn test_invalid_line_is_written_as_reader_error() {
        let engine = engine_with_interval(500);
        let host = RecordingHost::new();
        let ctx = CallContext::new(&host);
        let notes = Arc::new(NotesLeaf::new(["replaced"]));
        let (tree, id) = notes_tree(&notes);

        let mut stream = engine.open_content(&tree, id, AccessMode::Read, &ctx).unwrap();
        fs::write(stream.buffer_path().unwrap(), b"ok\n\xff\xfe\nlater\n").unwrap();

        assert_eq!(stream.read(0, &ctx).unwrap(), vec!["ok"]);
        let written = host.written_errors();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].id, READER_IO_ERROR);
        assert_eq!(written[0].kind, crate::diagnostic::ErrorKind::Validation);
        assert_eq!(written[0].target, "/notes");
        assert!(host.reported().is_empty());
        stream.close(&ctx).unwrap();
    }

    #[test]
    fn test_stop_ends_read_early() {
        let engine = engine_with_interval(500);
        let host = RecordingHost::new();
        let stop = StopSignal::new();
        let ctx = CallContext::new(&host).with_stop_signal(stop.clone());
        let notes = Arc::new(NotesLeaf::new(["one", "two", "three"]));
        let (tree, id) = notes_tree(&notes);

        let mut stream = engine.open_content(&tree, id, AccessMode::Read, &ctx).unwrap();
        assert_eq!(stream.read(1, &ctx).unwrap(), vec!["one"]);
        stop.raise();
        assert!(stream.read(0, &ctx).unwrap().is_empty());
        assert!(host.written_errors().is_empty());
        stream.close(&ctx).unwrap();
    }

    #[test]
    fn test_close_waits_for_stopped_persist() {
        let engine = engine_with_interval(20);
        let host = RecordingHost::new();
        let stop = StopSignal::new();
        let ctx = CallContext::new(&host).with_stop_signal(stop.clone());
        let sink = Arc::new(SlowSink::new(Duration::from_millis(300)));
        let root = Arc::new(ScriptedDir::new(Vec::new()));
        let mut tree = Tree::new(Node::directory("root", root)).unwrap();
        let ids = tree.replace_children(tree.root(), vec![Node::leaf("sink", sink.clone())]);

        let mut stream = engine
            .open_content(&tree, ids[0], AccessMode::Write, &ctx)
            .unwrap();
        let buffer = stream.buffer_path().unwrap().to_path_buf();
        stream.write(vec![json!("payload")]).unwrap();

        let closed = thread::scope(|scope| {
            scope.spawn(|| {
                thread::sleep(Duration::from_millis(80));
                stop.raise();
            });
            stream.close(&ctx)
        });
        closed.unwrap();
        assert_eq!(sink.buffer_seen(), Some(true), "buffer removed under the handler");
        assert!(!buffer.exists());
    }
}
