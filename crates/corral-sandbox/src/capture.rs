//! In-memory capture of script output.
//!
//! The interpreter's `print` sink is pointed at an [`OutputSink`] for the
//! duration of one execution. The host's real stdout is never redirected, so
//! host output after (or during) an execution can never be captured by
//! mistake. Tearing down the capture detaches every sink, which means output
//! arriving late from an abandoned worker is dropped instead of leaking into
//! a later result.

use std::sync::Arc;

use parking_lot::Mutex;

/// Captured output of one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapturedOutput {
    /// The script never wrote to its output channel.
    Empty,
    /// The script wrote at least once.
    Text {
        /// Everything written, in order.
        text: String,
        /// Whether output was cut off at the configured limit.
        truncated: bool,
    },
}

impl CapturedOutput {
    /// True if nothing was written.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// The captured text, or `None` when nothing was written.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Empty => None,
            Self::Text { text, .. } => Some(text),
        }
    }

    /// Consume into the captured text (empty string for [`CapturedOutput::Empty`]).
    pub fn into_text(self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text { text, .. } => text,
        }
    }
}

#[derive(Debug)]
struct Buffer {
    text: String,
    writes: usize,
    limit: usize,
    truncated: bool,
    detached: bool,
}

impl Buffer {
    /// Append `chunk`, plus a newline when `newline` is set, within `limit`.
    fn push(&mut self, chunk: &str, newline: bool) {
        if self.detached {
            return;
        }
        self.writes += 1;
        if self.truncated {
            return;
        }

        let room = self.limit.saturating_sub(self.text.len());
        if chunk.len() + usize::from(newline) <= room {
            self.text.push_str(chunk);
            if newline {
                self.text.push('\n');
            }
            return;
        }

        let mut cut = room.min(chunk.len());
        while cut > 0 && !chunk.is_char_boundary(cut) {
            cut -= 1;
        }
        self.text.push_str(&chunk[..cut]);
        self.truncated = true;
    }
}

/// Write end handed to the interpreter.
///
/// Clones share the same buffer. Once the owning [`OutputCapture`] is
/// finished or dropped, writes become no-ops.
#[derive(Debug, Clone)]
pub struct OutputSink {
    buffer: Arc<Mutex<Buffer>>,
}

impl OutputSink {
    /// Record one `print` call: the text followed by a newline.
    pub fn write_line(&self, text: &str) {
        self.buffer.lock().push(text, true);
    }

    /// Record raw text without a trailing newline.
    pub fn write(&self, text: &str) {
        self.buffer.lock().push(text, false);
    }
}

/// Scoped output capture for one execution.
#[derive(Debug)]
pub struct OutputCapture {
    buffer: Arc<Mutex<Buffer>>,
}

impl OutputCapture {
    /// Start a capture that keeps at most `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Buffer {
                text: String::new(),
                writes: 0,
                limit,
                truncated: false,
                detached: false,
            })),
        }
    }

    /// A write end for the interpreter.
    pub fn sink(&self) -> OutputSink {
        OutputSink {
            buffer: Arc::clone(&self.buffer),
        }
    }

    /// Detach all sinks and return what was captured.
    pub fn finish(self) -> CapturedOutput {
        let mut buffer = self.buffer.lock();
        buffer.detached = true;

        if buffer.writes == 0 {
            return CapturedOutput::Empty;
        }

        let mut text = std::mem::take(&mut buffer.text);
        if buffer.truncated {
            if !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&format!("[output truncated after {} bytes]", buffer.limit));
        }

        CapturedOutput::Text {
            text,
            truncated: buffer.truncated,
        }
    }

    /// Run `f` with a fresh capture and return its value with the output.
    ///
    /// The capture is torn down even if `f` unwinds.
    pub fn with_capture<T>(limit: usize, f: impl FnOnce(&OutputSink) -> T) -> (T, CapturedOutput) {
        let capture = Self::new(limit);
        let sink = capture.sink();
        let value = f(&sink);
        (value, capture.finish())
    }
}

impl Drop for OutputCapture {
    fn drop(&mut self) {
        let mut buffer = self.buffer.lock();
        buffer.detached = true;
        buffer.text.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_writes_is_empty() {
        let ((), output) = OutputCapture::with_capture(1024, |_| {});
        assert_eq!(output, CapturedOutput::Empty);
        assert!(output.is_empty());
        assert_eq!(output.text(), None);
    }

    #[test]
    fn test_printing_empty_string_is_not_empty() {
        let ((), output) = OutputCapture::with_capture(1024, |sink| sink.write_line(""));
        assert!(!output.is_empty());
        assert_eq!(output.text(), Some("\n"));
    }

    #[test]
    fn test_lines_kept_in_order() {
        let ((), output) = OutputCapture::with_capture(1024, |sink| {
            sink.write_line("first");
            sink.write("second");
            sink.write_line(" line");
        });
        assert_eq!(output.into_text(), "first\nsecond line\n");
    }

    #[test]
    fn test_truncation_at_limit() {
        let ((), output) = OutputCapture::with_capture(8, |sink| {
            sink.write_line("0123456789");
            sink.write_line("more");
        });
        match output {
            CapturedOutput::Text { text, truncated } => {
                assert!(truncated);
                assert!(text.starts_with("01234567\n"));
                assert!(text.contains("[output truncated after 8 bytes]"));
            }
            CapturedOutput::Empty => panic!("expected text"),
        }
    }

    #[test]
    fn test_newline_counts_against_limit() {
        let ((), exact) = OutputCapture::with_capture(6, |sink| sink.write_line("hello"));
        assert_eq!(
            exact,
            CapturedOutput::Text {
                text: "hello\n".to_string(),
                truncated: false,
            }
        );

        let capture = OutputCapture::new(5);
        capture.sink().write_line("hello");
        assert_eq!(capture.buffer.lock().text, "hello");
        match capture.finish() {
            CapturedOutput::Text { text, truncated } => {
                assert!(truncated);
                assert_eq!(text, "hello\n[output truncated after 5 bytes]");
            }
            CapturedOutput::Empty => panic!("expected text"),
        }
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let ((), output) = OutputCapture::with_capture(3, |sink| sink.write("aé€"));
        let text = output.into_text();
        assert!(text.starts_with("aé\n"));
    }

    #[test]
    fn test_writes_after_finish_are_dropped() {
        let capture = OutputCapture::new(1024);
        let sink = capture.sink();
        sink.write_line("kept");
        let output = capture.finish();
        sink.write_line("late");
        assert_eq!(output.into_text(), "kept\n");
    }

    #[test]
    fn test_drop_detaches_sink() {
        let capture = OutputCapture::new(1024);
        let sink = capture.sink();
        drop(capture);
        sink.write_line("ignored");
        assert!(sink.buffer.lock().text.is_empty());
    }

    #[test]
    fn test_capture_released_on_unwind() {
        let capture = OutputCapture::new(1024);
        let sink = capture.sink();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _capture = capture;
            panic!("boom");
        }));
        assert!(result.is_err());
        sink.write_line("after unwind");
        assert!(sink.buffer.lock().detached);
    }
}
