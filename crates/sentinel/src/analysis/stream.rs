//! Incremental event-stream parser.
//!
//! The analysis response body arrives in arbitrary byte chunks. Events are
//! blocks of `field: value` lines terminated by a blank line. The parser
//! keeps undecoded bytes between calls, so a chunk boundary may fall
//! anywhere: inside a line, between the two newlines of a terminator, or in
//! the middle of a multi-byte UTF-8 character.

/// Event name used when a block has no `event:` line.
pub const DEFAULT_EVENT: &str = "message";

/// One complete event block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the `event:` line
    pub event: String,
    /// `data:` lines joined with `\n`
    pub data: String,
}

/// Byte-incremental event splitter.
#[derive(Debug, Default)]
pub struct EventStreamParser {
    buffer: Vec<u8>,
    /// Bytes already searched for a terminator
    scanned: usize,
}

impl EventStreamParser {
    /// Empty parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every event it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        // A terminator may straddle the previous chunk, so back up by its length.
        while let Some((end, terminator)) =
            find_blank_line(&self.buffer, self.scanned.saturating_sub(MAX_TERMINATOR))
        {
            let block: Vec<u8> = self.buffer.drain(..end + terminator).collect();
            self.scanned = 0;
            if let Some(frame) = parse_block(&block[..end]) {
                frames.push(frame);
            }
        }
        self.scanned = self.buffer.len();
        frames
    }

    /// Flush a trailing event the body ended without terminating.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        parse_block(&rest)
    }

    /// Bytes held back waiting for a terminator.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Longest terminator, `\n\r\n`.
const MAX_TERMINATOR: usize = 3;

/// Locate the first blank line at or after `from`. Returns the block length
/// (up to and including the last line's `\n` minus one) and the terminator
/// length.
fn find_blank_line(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i < buf.len() {
        if buf[i] == b'\n' {
            match (buf.get(i + 1), buf.get(i + 2)) {
                (Some(b'\n'), _) => return Some((i, 2)),
                (Some(b'\r'), Some(b'\n')) => return Some((i, 3)),
                _ => {}
            }
        }
        i += 1;
    }
    None
}

fn parse_block(block: &[u8]) -> Option<SseFrame> {
    let text = String::from_utf8_lossy(block);
    let mut event = None;
    let mut data: Option<String> = None;

    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value.to_string()),
            "data" => match data.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => data = Some(value.to_string()),
            },
            _ => {}
        }
    }

    if event.is_none() && data.is_none() {
        return None;
    }
    Some(SseFrame {
        event: event.unwrap_or_else(|| DEFAULT_EVENT.to_string()),
        data: data.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const STREAM: &str = concat!(
        "event: thinking\n",
        "data: {\"content\":\"Mémoire saturée → OOM\"}\n",
        "\n",
        ": keep-alive\n",
        "\n",
        "event: content\r\n",
        "data: {\"content\":\"{\\\"toolName\\\"\"}\r\n",
        "\r\n",
        "data: {\"orphan\":true}\n",
        "\n",
        "event: done\n",
        "data: {\"proposal\":{\"toolName\":\"restart_pod\",\"args\":{\"pod\":\"x\"},\"reason\":\"y\"}}\n",
        "\n",
    );

    fn parse_whole(input: &[u8]) -> Vec<SseFrame> {
        let mut parser = EventStreamParser::new();
        let mut frames = parser.feed(input);
        frames.extend(parser.finish());
        frames
    }

    fn parse_chunked(input: &[u8], cuts: &[usize]) -> Vec<SseFrame> {
        let mut parser = EventStreamParser::new();
        let mut frames = Vec::new();
        let mut start = 0;
        for &cut in cuts {
            frames.extend(parser.feed(&input[start..cut]));
            start = cut;
        }
        frames.extend(parser.feed(&input[start..]));
        frames.extend(parser.finish());
        frames
    }

    #[test]
    fn test_parses_events() {
        let frames = parse_whole(STREAM.as_bytes());
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0].event, "thinking");
        assert_eq!(frames[0].data, "{\"content\":\"Mémoire saturée → OOM\"}");
        assert_eq!(frames[1].event, "content");
        assert_eq!(frames[2].event, DEFAULT_EVENT);
        assert_eq!(frames[3].event, "done");
    }

    #[test]
    fn test_every_single_split_point_matches_whole() {
        let bytes = STREAM.as_bytes();
        let whole = parse_whole(bytes);
        for cut in 0..=bytes.len() {
            assert_eq!(parse_chunked(bytes, &[cut]), whole, "split at byte {cut}");
        }
    }

    #[test]
    fn test_random_chunkings_match_whole() {
        let bytes = STREAM.as_bytes();
        let whole = parse_whole(bytes);
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..500 {
            let mut cuts: Vec<usize> = (0..rng.gen_range(1..12))
                .map(|_| rng.gen_range(0..=bytes.len()))
                .collect();
            cuts.sort_unstable();
            assert_eq!(parse_chunked(bytes, &cuts), whole, "cuts {cuts:?}");
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let bytes = STREAM.as_bytes();
        let cuts: Vec<usize> = (1..bytes.len()).collect();
        assert_eq!(parse_chunked(bytes, &cuts), parse_whole(bytes));
    }

    #[test]
    fn test_incomplete_event_is_retained() {
        let mut parser = EventStreamParser::new();
        assert!(parser.feed(b"event: content\ndata: {\"content\":\"pa").is_empty());
        assert!(parser.pending() > 0);
        let frames = parser.feed(b"rtial\"}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "{\"content\":\"partial\"}");
        assert_eq!(parser.pending(), 0);
    }

    #[test]
    fn test_finish_flushes_unterminated_event() {
        let mut parser = EventStreamParser::new();
        assert!(parser.feed(b"event: error\ndata: {\"content\":\"bye\"}").is_empty());
        let frame = parser.finish().unwrap();
        assert_eq!(frame.event, "error");
        assert!(parser.finish().is_none());
    }

    #[test]
    fn test_long_event_in_small_chunks_resumes_scan() {
        let payload = "x".repeat(64 * 1024);
        let input = format!("event: content\r\ndata: {payload}\r\n\r\nevent: done\ndata: {{}}\n\n");
        let bytes = input.as_bytes();

        let mut parser = EventStreamParser::new();
        let mut frames = Vec::new();
        for chunk in bytes.chunks(7) {
            frames.extend(parser.feed(chunk));
            assert!(parser.scanned <= parser.buffer.len());
        }
        assert!(parser.finish().is_none());

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event, "content");
        assert_eq!(frames[0].data, payload);
        assert_eq!(frames[1].event, "done");
    }

    #[test]
    fn test_multiple_data_lines_join() {
        let frames = parse_whole(b"data: one\ndata: two\n\n");
        assert_eq!(frames[0].data, "one\ntwo");
    }

    #[test]
    fn test_comment_only_block_is_dropped() {
        assert!(parse_whole(b": ping\n\n\n\n").is_empty());
    }
}
