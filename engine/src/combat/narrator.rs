/// Collects the human-readable log of one trial. When disabled, lines are never formatted.
#[derive(Debug, Clone, Default)]
pub struct Narrator {
    enabled: bool,
    lines: Vec<String>,
}

impl Narrator {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            lines: Vec::new(),
        }
    }

    pub fn say(&mut self, line: impl FnOnce() -> String) {
        if self.enabled {
            self.lines.push(line());
        }
    }

    /// Record an already formatted line.
    pub fn push(&mut self, line: String) {
        if self.enabled {
            self.lines.push(line);
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}
