use serde::Deserialize;

/// One record of the chat endpoint's line-delimited JSON stream.
/// Lines without a `response` field (or with extra fields) are still valid
/// records; anything unparseable is skipped.
#[derive(Deserialize, Debug)]
pub struct StreamRecord {
    #[serde(default)]
    pub response: Option<String>,
}

/// Incremental decoder for line-delimited JSON bodies.
///
/// The server emits one JSON object per newline-terminated line, but chunk
/// boundaries can fall anywhere, so the unterminated tail of each chunk is
/// carried over to the next `push` instead of being dropped. `finish` flushes
/// a trailing record that arrived without a final newline.
pub struct LineDecoder {
    remainder: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self {
            remainder: Vec::new(),
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamRecord> {
        self.remainder.extend_from_slice(chunk);

        let mut records = Vec::new();
        while let Some(pos) = self.remainder.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.remainder.drain(..=pos).collect();
            if let Some(record) = parse_line(&line[..line.len() - 1]) {
                records.push(record);
            }
        }
        records
    }

    /// Consume whatever is left once the transport closes. The stream has no
    /// end-of-stream sentinel, so a final unterminated line is still a record.
    pub fn finish(&mut self) -> Vec<StreamRecord> {
        let tail = std::mem::take(&mut self.remainder);
        parse_line(&tail).into_iter().collect()
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_line(bytes: &[u8]) -> Option<StreamRecord> {
    let text = std::str::from_utf8(bytes).ok()?;
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    // Malformed lines are skipped, not fatal: the stream keeps going.
    serde_json::from_str(text).ok()
}
