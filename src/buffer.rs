/// A mutable, ordered sequence of text lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineBuffer {
    lines: Vec<String>,
    newline: &'static str,
}

impl LineBuffer {
    /// Split `text` into lines, keeping each line's terminator.
    pub fn parse(text: &str) -> Self {
        let lines: Vec<String> = text.split_inclusive('\n').map(String::from).collect();
        let newline = match lines.first() {
            Some(first) if first.ends_with("\r\n") => "\r\n",
            _ => "\n",
        };
        Self { lines, newline }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Line terminator used for inserted lines (taken from the first line).
    pub fn newline(&self) -> &'static str {
        self.newline
    }

    /// Content of line `idx` without its terminator.
    pub fn line(&self, idx: usize) -> Option<&str> {
        self.lines.get(idx).map(|l| strip_terminator(l))
    }

    /// Iterate over `(index, content)` pairs, terminators stripped.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.lines
            .iter()
            .enumerate()
            .map(|(i, l)| (i, strip_terminator(l)))
    }

    /// Insert `new_lines` so that the first of them ends up at `idx`.
    ///
    /// `idx == len()` appends. Each inserted line gets the buffer's
    /// terminator. Returns the number of lines inserted.
    ///
    /// # Panics
    ///
    /// Panics if `idx > len()`.
    pub fn insert_before<I, S>(&mut self, idx: usize, new_lines: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        assert!(idx <= self.lines.len(), "insert index {idx} out of range");
        if idx == self.lines.len()
            && let Some(last) = self.lines.last_mut()
            && !last.ends_with('\n')
        {
            last.push_str(self.newline);
        }
        let newline = self.newline;
        let inserted: Vec<String> = new_lines
            .into_iter()
            .map(|l| format!("{}{newline}", l.as_ref()))
            .collect();
        let count = inserted.len();
        self.lines.splice(idx..idx, inserted);
        count
    }

    /// Replace the content of line `idx`, keeping its terminator.
    /// Returns the previous content, or `None` if `idx` is out of range.
    pub fn replace_at(&mut self, idx: usize, content: &str) -> Option<String> {
        let line = self.lines.get_mut(idx)?;
        let terminator = &line[strip_terminator(line).len()..];
        let replaced = format!("{content}{terminator}");
        let old = std::mem::replace(line, replaced);
        Some(strip_terminator(&old).to_string())
    }

    /// First index in `start..len()` whose content satisfies `pred`.
    pub fn find_from(&self, start: usize, pred: impl Fn(&str) -> bool) -> Option<usize> {
        self.scan_bounded(start, self.lines.len(), pred)
    }

    /// First index in `start..end` whose content satisfies `pred`.
    /// `end` is clamped to `len()`.
    pub fn scan_bounded(
        &self,
        start: usize,
        end: usize,
        pred: impl Fn(&str) -> bool,
    ) -> Option<usize> {
        let end = end.min(self.lines.len());
        (start..end).find(|&i| pred(strip_terminator(&self.lines[i])))
    }

    /// Render the buffer back to text.
    pub fn to_text(&self) -> String {
        self.lines.concat()
    }
}

fn strip_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}
