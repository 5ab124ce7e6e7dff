use super::cursor::Cursor;
use crate::sink::Sink;
use tracing::{debug, warn};

/// What a projection pass did to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// Output and cursor already agree.
    NoChange,
    /// First content for this binding: clear then write everything.
    Initial(usize),
    /// Appended the unprocessed tail.
    Appended(usize),
    /// Upstream output became empty; sink cleared, cursor reset.
    Cleared,
    /// Upstream output shrank below the cursor; sink cleared, cursor reset.
    /// The next pass replays from the start.
    Truncated,
}

/// Diff the full output snapshot against the cursor and issue the minimal
/// sink mutation.
///
/// Each output byte reaches the sink exactly once per binding, in order,
/// except across truncation resets, which replay from scratch. The caller is
/// responsible for only invoking this while the binding is current; stale
/// fetch results must be discarded before they get here.
pub fn project(full: &str, cursor: &mut Cursor, sink: &mut dyn Sink) -> Projection {
    let processed = cursor.processed;

    if full.is_empty() && processed > 0 {
        debug!(
            session = %cursor.session_id,
            processed, "output cleared upstream, resetting sink"
        );
        sink.clear();
        cursor.reset();
        return Projection::Cleared;
    }

    if processed == 0 && !full.is_empty() {
        sink.clear();
        sink.append(full);
        cursor.advance_to(full.len());
        return Projection::Initial(full.len());
    }

    if full.len() > processed {
        match full.get(processed..) {
            Some(tail) => {
                sink.append(tail);
                cursor.advance_to(full.len());
                Projection::Appended(tail.len())
            }
            None => {
                // Cursor no longer lands on a char boundary: the stream was
                // rewritten upstream, not appended to. Same recovery as a
                // shrink.
                warn!(
                    session = %cursor.session_id,
                    processed,
                    full_len = full.len(),
                    "output rewritten at cursor offset, replaying from start"
                );
                sink.clear();
                cursor.reset();
                Projection::Truncated
            }
        }
    } else if full.len() < processed {
        warn!(
            session = %cursor.session_id,
            processed,
            full_len = full.len(),
            sink_len = sink.buffer_len(),
            "output shrank below cursor, replaying from start"
        );
        sink.clear();
        cursor.reset();
        Projection::Truncated
    } else {
        Projection::NoChange
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// Records every mutation so tests can assert the exact call sequence.
    #[derive(Default)]
    struct RecordingSink {
        pub ops: Vec<String>,
        pub buffer: String,
    }

    impl Sink for RecordingSink {
        fn append(&mut self, text: &str) {
            self.ops.push(format!("append:{}", text));
            self.buffer.push_str(text);
        }

        fn clear(&mut self) {
            self.ops.push("clear".to_string());
            self.buffer.clear();
        }

        fn buffer_len(&self) -> usize {
            self.buffer.len()
        }
    }

    fn cursor() -> Cursor {
        Cursor::new(Uuid::new_v4())
    }

    #[test]
    fn first_population_clears_then_writes_everything() {
        let mut cursor = cursor();
        let mut sink = RecordingSink::default();

        let result = project("ab", &mut cursor, &mut sink);

        assert_eq!(result, Projection::Initial(2));
        assert_eq!(sink.ops, vec!["clear", "append:ab"]);
        assert_eq!(cursor.processed, 2);
    }

    #[test]
    fn growth_appends_only_the_tail() {
        let mut cursor = cursor();
        let mut sink = RecordingSink::default();

        project("ab", &mut cursor, &mut sink);
        let result = project("abc", &mut cursor, &mut sink);

        assert_eq!(result, Projection::Appended(1));
        assert_eq!(sink.ops, vec!["clear", "append:ab", "append:c"]);
        assert_eq!(cursor.processed, 3);
        assert_eq!(sink.buffer, "abc");
    }

    #[test]
    fn unchanged_output_is_a_no_op() {
        let mut cursor = cursor();
        let mut sink = RecordingSink::default();

        project("ab", &mut cursor, &mut sink);
        let ops_before = sink.ops.len();
        let result = project("ab", &mut cursor, &mut sink);

        assert_eq!(result, Projection::NoChange);
        assert_eq!(sink.ops.len(), ops_before);
    }

    #[test]
    fn empty_output_with_progress_clears() {
        let mut cursor = cursor();
        let mut sink = RecordingSink::default();
        let full: String = "x".repeat(500);

        project(&full, &mut cursor, &mut sink);
        assert_eq!(cursor.processed, 500);

        let result = project("", &mut cursor, &mut sink);

        assert_eq!(result, Projection::Cleared);
        assert_eq!(cursor.processed, 0);
        assert_eq!(sink.buffer, "");
    }

    #[test]
    fn empty_output_without_progress_is_a_no_op() {
        let mut cursor = cursor();
        let mut sink = RecordingSink::default();

        let result = project("", &mut cursor, &mut sink);

        assert_eq!(result, Projection::NoChange);
        assert!(sink.ops.is_empty());
    }

    #[test]
    fn shrink_resets_and_replays_from_scratch() {
        let mut cursor = cursor();
        let mut sink = RecordingSink::default();

        project("hello world", &mut cursor, &mut sink);
        let result = project("hello", &mut cursor, &mut sink);

        assert_eq!(result, Projection::Truncated);
        assert_eq!(cursor.processed, 0);

        // Next pass starts over like a fresh session.
        let result = project("hello", &mut cursor, &mut sink);
        assert_eq!(result, Projection::Initial(5));
        assert_eq!(sink.buffer, "hello");
    }

    #[test]
    fn rewrite_breaking_utf8_boundary_is_treated_as_truncation() {
        let mut cursor = cursor();
        let mut sink = RecordingSink::default();

        project("ab", &mut cursor, &mut sink);
        assert_eq!(cursor.processed, 2);

        // Three bytes, but offset 2 falls inside the trailing 'é'.
        let result = project("aé", &mut cursor, &mut sink);

        assert_eq!(result, Projection::Truncated);
        assert_eq!(cursor.processed, 0);
    }

    #[test]
    fn bytes_reach_sink_exactly_once_in_order() {
        let mut cursor = cursor();
        let mut sink = RecordingSink::default();
        let snapshots = ["a", "ab", "ab", "abcd", "abcdef"];

        for full in snapshots {
            project(full, &mut cursor, &mut sink);
        }

        let appended: String = sink
            .ops
            .iter()
            .filter_map(|op| op.strip_prefix("append:"))
            .collect();
        assert_eq!(appended, "abcdef");
    }
}
