use bytes::Bytes;

/// One server-sent event: optional `event:` name plus joined `data:` lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental SSE decoder. Feed raw body chunks, collect complete frames.
/// Comment lines and unknown fields are skipped per the SSE spec; a frame
/// is closed by an empty line.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &Bytes) -> Vec<SseFrame> {
        match std::str::from_utf8(chunk) {
            Ok(text) => self.feed_str(text),
            Err(_) => Vec::new(),
        }
    }

    pub fn feed_str(&mut self, chunk: &str) -> Vec<SseFrame> {
        self.buffer.push_str(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.find('\n') {
            let mut line = self.buffer[..pos].to_string();
            self.buffer.drain(..=pos);
            if line.ends_with('\r') {
                line.pop();
            }
            if line.is_empty() {
                self.close_frame(&mut frames);
            } else {
                self.accept_line(&line);
            }
        }

        frames
    }

    /// Flush any partial frame at EOF.
    pub fn finish(&mut self) -> Vec<SseFrame> {
        if !self.buffer.is_empty() {
            let mut line = std::mem::take(&mut self.buffer);
            if line.ends_with('\r') {
                line.pop();
            }
            self.accept_line(&line);
        }
        let mut frames = Vec::new();
        self.close_frame(&mut frames);
        frames
    }

    fn accept_line(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => {
                self.event = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
    }

    fn close_frame(&mut self, frames: &mut Vec<SseFrame>) {
        if self.event.is_none() && self.data.is_empty() {
            return;
        }
        frames.push(SseFrame {
            event: self.event.take(),
            data: self.data.join("\n"),
        });
        self.data.clear();
    }
}
