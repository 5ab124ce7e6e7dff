use uuid::Uuid;

/// Tracks how much of a session's output has already been projected into the
/// sink.
///
/// `processed` only moves forward while a binding is live; it drops back to
/// zero when the engine rebinds to a different session or when the upstream
/// output shrinks (truncation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub session_id: Uuid,
    pub processed: usize,
}

impl Cursor {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            processed: 0,
        }
    }

    pub fn advance_to(&mut self, len: usize) {
        debug_assert!(len >= self.processed, "cursor moved backwards");
        self.processed = len;
    }

    pub fn reset(&mut self) {
        self.processed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_and_resets() {
        let mut cursor = Cursor::new(Uuid::new_v4());
        assert_eq!(cursor.processed, 0);
        cursor.advance_to(5);
        cursor.advance_to(12);
        assert_eq!(cursor.processed, 12);
        cursor.reset();
        assert_eq!(cursor.processed, 0);
    }
}
