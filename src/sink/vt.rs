use super::Sink;

/// Terminal-emulator sink backed by a vt100 parser.
///
/// Appended text is fed through the parser so escape sequences in agent
/// output render the same way they would in the host's terminal widget.
pub struct VtSink {
    parser: vt100::Parser,
    rows: u16,
    cols: u16,
    scrollback: usize,
    fed_bytes: usize,
}

impl VtSink {
    pub fn new(rows: u16, cols: u16, scrollback: usize) -> Self {
        Self {
            parser: vt100::Parser::new(rows, cols, scrollback),
            rows,
            cols,
            scrollback,
            fed_bytes: 0,
        }
    }

    /// Visible screen contents, trailing blank lines trimmed.
    pub fn screen_text(&self) -> String {
        let contents = self.parser.screen().contents();
        contents.trim_end_matches('\n').to_string()
    }

    pub fn screen(&self) -> &vt100::Screen {
        self.parser.screen()
    }

    pub fn scroll_lines(&mut self, lines: usize) {
        let current = self.parser.screen().scrollback();
        self.parser.set_scrollback(current + lines);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.parser.set_scrollback(0);
    }
}

impl Sink for VtSink {
    fn append(&mut self, text: &str) {
        self.fed_bytes += text.len();
        // Bare LF only moves the cursor down; agent output is plain text, so
        // normalize to CRLF before feeding the parser.
        let normalized = text.replace('\n', "\r\n");
        self.parser.process(normalized.as_bytes());
    }

    fn clear(&mut self) {
        self.parser = vt100::Parser::new(self.rows, self.cols, self.scrollback);
        self.fed_bytes = 0;
    }

    fn buffer_len(&self) -> usize {
        self.fed_bytes
    }

    fn scrolled_to_bottom(&self) -> bool {
        self.parser.screen().scrollback() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_renders_lines() {
        let mut sink = VtSink::new(10, 40, 100);
        sink.append("hello\nworld");
        assert_eq!(sink.screen_text(), "hello\nworld");
        assert_eq!(sink.buffer_len(), 11);
    }

    #[test]
    fn clear_resets_screen_and_counter() {
        let mut sink = VtSink::new(10, 40, 100);
        sink.append("hello");
        sink.clear();
        assert_eq!(sink.screen_text(), "");
        assert_eq!(sink.buffer_len(), 0);
    }

    #[test]
    fn starts_at_bottom() {
        let sink = VtSink::new(10, 40, 100);
        assert!(sink.scrolled_to_bottom());
    }

    #[test]
    fn scrolling_up_leaves_bottom() {
        let mut sink = VtSink::new(3, 20, 100);
        for i in 0..20 {
            sink.append(&format!("line {}\n", i));
        }
        sink.scroll_lines(5);
        assert!(!sink.scrolled_to_bottom());
        sink.scroll_to_bottom();
        assert!(sink.scrolled_to_bottom());
    }
}
