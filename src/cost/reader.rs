use crate::cost::entry::{normalize, RawRecord, UsageEntry};
use crate::cost::pricing::PricingTable;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// A line that was complete but did not decode as a JSON object.
#[derive(Debug, thiserror::Error)]
#[error("line {line}: {source}")]
pub struct ParseError {
    pub line: usize,
    #[source]
    pub source: serde_json::Error,
}

#[derive(Debug)]
pub enum LineOutcome {
    Entry(UsageEntry),
    /// Decoded fine but carries no usage.
    Skipped,
    Malformed(ParseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Reading,
    Eof,
    Done,
}

/// Forward-only JSONL scanner that reads in fixed-size chunks.
///
/// Bytes after the last newline are carried into the next chunk, so a record
/// split across a chunk boundary is decoded whole. Whatever is left at EOF is
/// decoded once as a final line. Malformed lines come out as
/// [`LineOutcome::Malformed`] and scanning continues; an I/O error is yielded
/// once and ends the scan.
pub struct JsonlReader<'p, R> {
    reader: R,
    pricing: &'p PricingTable,
    chunk: Vec<u8>,
    pending: Vec<u8>,
    consumed: usize,
    scanned: usize,
    line_number: usize,
    state: ReadState,
}

impl<'p> JsonlReader<'p, File> {
    pub fn open(path: &Path, pricing: &'p PricingTable, chunk_size: usize) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(file, pricing, chunk_size))
    }
}

impl<'p, R: Read> JsonlReader<'p, R> {
    pub fn new(reader: R, pricing: &'p PricingTable, chunk_size: usize) -> Self {
        Self {
            reader,
            pricing,
            chunk: vec![0; chunk_size.max(1)],
            pending: Vec::new(),
            consumed: 0,
            scanned: 0,
            line_number: 0,
            state: ReadState::Reading,
        }
    }

    /// Byte range of the next newline-terminated line in `pending`, if any.
    fn next_complete_line(&mut self) -> Option<(usize, usize)> {
        let search_from = self.scanned.max(self.consumed);
        match self.pending[search_from..].iter().position(|&b| b == b'\n') {
            Some(offset) => {
                let start = self.consumed;
                let end = search_from + offset;
                self.consumed = end + 1;
                self.scanned = self.consumed;
                Some((start, end))
            }
            None => {
                self.scanned = self.pending.len();
                None
            }
        }
    }

    fn compact(&mut self) {
        if self.consumed > 0 {
            self.pending.drain(..self.consumed);
            self.scanned -= self.consumed;
            self.consumed = 0;
        }
    }

    fn decode(&mut self, start: usize, end: usize) -> Option<LineOutcome> {
        self.line_number += 1;

        let mut line = &self.pending[start..end];
        if let Some(stripped) = line.strip_suffix(b"\r") {
            line = stripped;
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            return None;
        }

        // Decoding through `Value` lets a repeated key keep its last value.
        let decoded = serde_json::from_slice::<serde_json::Value>(line)
            .and_then(serde_json::from_value::<RawRecord>);
        let outcome = match decoded {
            Ok(record) => match normalize(record, self.pricing) {
                Some(entry) => LineOutcome::Entry(entry),
                None => LineOutcome::Skipped,
            },
            Err(source) => LineOutcome::Malformed(ParseError {
                line: self.line_number,
                source,
            }),
        };
        Some(outcome)
    }
}

impl<R: Read> Iterator for JsonlReader<'_, R> {
    type Item = io::Result<LineOutcome>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state {
                ReadState::Done => return None,
                ReadState::Eof => {
                    self.state = ReadState::Done;
                    let (start, end) = (self.consumed, self.pending.len());
                    self.consumed = end;
                    return self.decode(start, end).map(Ok);
                }
                ReadState::Reading => {}
            }

            if let Some((start, end)) = self.next_complete_line() {
                match self.decode(start, end) {
                    Some(outcome) => return Some(Ok(outcome)),
                    None => continue,
                }
            }

            self.compact();
            match self.reader.read(&mut self.chunk) {
                Ok(0) => self.state = ReadState::Eof,
                Ok(n) => self.pending.extend_from_slice(&self.chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.state = ReadState::Done;
                    self.pending.clear();
                    self.consumed = 0;
                    self.scanned = 0;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    fn message_line(model: &str, input: u64, session: &str) -> String {
        json!({
            "type": "message",
            "timestamp": "2026-01-18T12:00:00Z",
            "message": {"model": model, "sessionId": session, "usage": {"input": input, "output": 10}}
        })
        .to_string()
    }

    fn sample_log() -> String {
        let mut log = String::new();
        log.push_str(&message_line("claude-3-5-haiku", 100, "a"));
        log.push('\n');
        log.push_str("{\"type\":\"session\",\"id\":\"x\"}\n");
        log.push_str("not json at all\n");
        log.push('\n');
        log.push_str(&message_line("claude-3-opus", 2_000, "b"));
        log.push_str("\r\n");
        log.push_str(&message_line("claude-3-5-sonnet-ünïcode", 3_000, "c"));
        log.push('\n');
        log.push_str("{\"type\":\"message\",\"message\":{\"usage\":{\"inp");
        log
    }

    fn summarize(outcomes: &[LineOutcome]) -> Vec<String> {
        outcomes
            .iter()
            .map(|outcome| match outcome {
                LineOutcome::Entry(e) => format!("entry:{}:{}:{}", e.model, e.tokens.input_tokens, e.session_id),
                LineOutcome::Skipped => "skipped".to_string(),
                LineOutcome::Malformed(err) => format!("malformed:{}", err.line),
            })
            .collect()
    }

    fn read_all(data: &[u8], chunk_size: usize) -> Vec<LineOutcome> {
        let pricing = PricingTable::new();
        JsonlReader::new(Cursor::new(data.to_vec()), &pricing, chunk_size)
            .collect::<io::Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_reads_entries_and_recovers_from_bad_lines() {
        let outcomes = read_all(sample_log().as_bytes(), DEFAULT_CHUNK_SIZE);

        assert_eq!(
            summarize(&outcomes),
            vec![
                "entry:claude-3-5-haiku:100:a",
                "skipped",
                "malformed:3",
                "entry:claude-3-opus:2000:b",
                "entry:claude-3-5-sonnet-ünïcode:3000:c",
                "malformed:7",
            ]
        );
    }

    #[test]
    fn test_output_independent_of_chunk_size() {
        let log = sample_log();
        let expected = summarize(&read_all(log.as_bytes(), DEFAULT_CHUNK_SIZE));

        for chunk_size in [1, 2, 3, 7, 16, 50, 64, 101, 256, 1024, log.len(), log.len() + 1] {
            let outcomes = read_all(log.as_bytes(), chunk_size);
            assert_eq!(summarize(&outcomes), expected, "chunk size {}", chunk_size);
        }
    }

    #[test]
    fn test_final_line_without_newline_is_parsed() {
        let log = format!("{}\n{}", message_line("a", 1, "s"), message_line("b", 2, "s"));
        let outcomes = read_all(log.as_bytes(), 8);
        assert_eq!(summarize(&outcomes), vec!["entry:a:1:s", "entry:b:2:s"]);
    }

    #[test]
    fn test_truncated_final_line_is_dropped() {
        let full = message_line("claude-3-haiku", 5, "s");
        let log = format!("{}\n{}", full, &full[..full.len() / 2]);
        let outcomes = read_all(log.as_bytes(), 16);

        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0], LineOutcome::Entry(_)));
        assert!(matches!(outcomes[1], LineOutcome::Malformed(ParseError { line: 2, .. })));
    }

    #[test]
    fn test_repeated_key_keeps_last_value() {
        let line = concat!(
            r#"{"type":"message","id":"a","id":"b","timestamp":"2026-01-18T12:00:00Z","#,
            r#""message":{"model":"claude-3-opus","model":"claude-3-5-haiku","usage":{"input":7,"input":9}}}"#,
        );
        let outcomes = read_all(line.as_bytes(), 16);

        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            LineOutcome::Entry(entry) => {
                assert_eq!(entry.message_id, "b");
                assert_eq!(entry.model, "claude-3-5-haiku");
                assert_eq!(entry.tokens.input_tokens, 9);
            }
            other => panic!("expected an entry, got {:?}", other),
        }
    }

    #[test]
    fn test_non_object_lines_are_malformed() {
        let outcomes = read_all(b"[1, 2]\n42\n\"text\"\n", 8);
        assert_eq!(summarize(&outcomes), vec!["malformed:1", "malformed:2", "malformed:3"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(read_all(b"", 4).is_empty());
        assert!(read_all(b"\n\n  \n", 4).is_empty());
    }

    struct FailingReader {
        data: Cursor<Vec<u8>>,
        fail_after: usize,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.data.position() as usize >= self.fail_after {
                return Err(io::Error::new(io::ErrorKind::Other, "disk went away"));
            }
            self.data.read(buf)
        }
    }

    #[test]
    fn test_io_error_ends_scan() {
        let first = message_line("a", 1, "s");
        let log = format!("{}\n{}\n", first, message_line("b", 2, "s"));
        let pricing = PricingTable::new();
        let reader = FailingReader {
            data: Cursor::new(log.into_bytes()),
            fail_after: first.len() + 1,
        };

        let results: Vec<_> = JsonlReader::new(reader, &pricing, 4).collect();
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Ok(LineOutcome::Entry(_))));
        assert!(results[1].is_err());
    }

    #[test]
    fn test_open_missing_file() {
        let pricing = PricingTable::new();
        let dir = tempfile::tempdir().expect("temp dir");
        assert!(JsonlReader::open(&dir.path().join("missing.jsonl"), &pricing, 64).is_err());
    }
}
