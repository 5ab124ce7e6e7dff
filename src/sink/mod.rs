mod vt;

pub use vt::VtSink;

/// A streaming destination for session output.
///
/// In the host application this is a terminal emulator widget; the engine
/// only needs append/clear plus enough introspection to reason about
/// truncation. The sink is single-writer: only the output projector touches
/// it, and only while its binding is current.
pub trait Sink: Send {
    /// Append text at the end of the buffer.
    fn append(&mut self, text: &str);

    /// Drop all buffered content.
    fn clear(&mut self);

    /// Bytes appended since the last clear.
    fn buffer_len(&self) -> usize;

    /// Whether the viewport is at the bottom of the buffer. The engine never
    /// calls this; it exists so the host can decide whether to auto-scroll
    /// after an append.
    fn scrolled_to_bottom(&self) -> bool {
        true
    }
}

/// Lets a host hand the engine a sink while keeping a handle for rendering:
/// the engine writes through the mutex, the host reads through its clone of
/// the `Arc`.
impl<S: Sink> Sink for std::sync::Arc<std::sync::Mutex<S>> {
    fn append(&mut self, text: &str) {
        if let Ok(mut sink) = self.lock() {
            sink.append(text);
        }
    }

    fn clear(&mut self) {
        if let Ok(mut sink) = self.lock() {
            sink.clear();
        }
    }

    fn buffer_len(&self) -> usize {
        self.lock().map(|sink| sink.buffer_len()).unwrap_or(0)
    }

    fn scrolled_to_bottom(&self) -> bool {
        self.lock()
            .map(|sink| sink.scrolled_to_bottom())
            .unwrap_or(true)
    }
}
