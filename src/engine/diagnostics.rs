/// Append-only text accumulator for compiler and runtime diagnostics.
///
/// Cleared at the start of every call; the facade snapshots it afterwards.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticBuffer {
    text: String,
}

impl DiagnosticBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    /// Append one diagnostic. Each entry ends up on its own line.
    pub fn append(&mut self, entry: &str) {
        self.text.push_str(entry);
        if !entry.ends_with('\n') {
            self.text.push('\n');
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Accumulated text with surrounding whitespace removed.
    pub fn snapshot(&self) -> String {
        self.text.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_emission_order_and_trims() {
        let mut buf = DiagnosticBuffer::new();
        buf.append("first");
        buf.append("second\n");
        assert_eq!(buf.snapshot(), "first\nsecond");
    }

    #[test]
    fn clear_empties() {
        let mut buf = DiagnosticBuffer::new();
        buf.append("x");
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.snapshot(), "");
    }
}
