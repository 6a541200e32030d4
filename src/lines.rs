/// Reassembles lines that straddle read boundaries.
///
/// Bytes after the last newline of a chunk are held back until a later chunk
/// completes them, or until [`LineAssembler::finish`] is called.
#[derive(Debug)]
pub struct LineAssembler {
    partial: Vec<u8>,
    max_partial: usize,
}

impl LineAssembler {
    /// `max_partial` bounds the held-back bytes; a longer run without a
    /// newline is emitted as a line of its own.
    pub fn new(max_partial: usize) -> Self {
        Self {
            partial: Vec::new(),
            max_partial: max_partial.max(1),
        }
    }

    /// Feeds one chunk, calling `emit` once per completed line (without the
    /// trailing `\n`).
    pub fn push(&mut self, chunk: &[u8], mut emit: impl FnMut(&[u8])) {
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let (line, tail) = rest.split_at(pos);
            if self.partial.is_empty() {
                emit(line);
            } else {
                self.partial.extend_from_slice(line);
                emit(&self.partial);
                self.partial.clear();
            }
            rest = &tail[1..];
        }

        self.partial.extend_from_slice(rest);
        if self.partial.len() >= self.max_partial {
            emit(&self.partial);
            self.partial.clear();
        }
    }

    /// Emits whatever is still held back.
    pub fn finish(&mut self, mut emit: impl FnMut(&[u8])) {
        if !self.partial.is_empty() {
            emit(&self.partial);
            self.partial.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(assembler: &mut LineAssembler, chunks: &[&str]) -> Vec<String> {
        let mut out = Vec::new();
        for chunk in chunks {
            assembler.push(chunk.as_bytes(), |line| {
                out.push(String::from_utf8_lossy(line).into_owned())
            });
        }
        out
    }

    #[test]
    fn splits_complete_lines() {
        let mut assembler = LineAssembler::new(1024);
        let lines = collect(&mut assembler, &["a\nb\nc\n"]);
        assert_eq!(lines, vec!["a", "b", "c"]);
    }

    #[test]
    fn joins_line_split_across_chunks() {
        let mut assembler = LineAssembler::new(1024);
        let lines = collect(&mut assembler, &["first li", "ne\nsec", "ond\n"]);
        assert_eq!(lines, vec!["first line", "second"]);
    }

    #[test]
    fn keeps_empty_lines() {
        let mut assembler = LineAssembler::new(1024);
        let lines = collect(&mut assembler, &["a\n\nb\n"]);
        assert_eq!(lines, vec!["a", "", "b"]);
    }

    #[test]
    fn finish_flushes_trailing_partial() {
        let mut assembler = LineAssembler::new(1024);
        let mut lines = collect(&mut assembler, &["a\nb"]);
        assembler.finish(|line| lines.push(String::from_utf8_lossy(line).into_owned()));
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[test]
    fn overlong_partial_is_emitted() {
        let mut assembler = LineAssembler::new(4);
        let lines = collect(&mut assembler, &["abcdef", "gh\n"]);
        assert_eq!(lines, vec!["abcdef", "gh"]);
    }
}
