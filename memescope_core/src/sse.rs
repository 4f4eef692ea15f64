// Incremental text/event-stream decoder used by the native watch mode.

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

/// Accepts arbitrary byte chunks and yields complete events.
/// Chunks may split lines or multi-byte characters anywhere.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
            id: self.id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_named_events_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: init\ndata: {\"tok").is_empty());
        let events = decoder.push(b"ens\":[]}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "init");
        assert_eq!(events[0].data, "{\"tokens\":[]}");
    }

    #[test]
    fn ignores_comments_and_handles_crlf() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keep-alive\r\n\r\nevent:update\r\ndata:a\r\ndata:b\r\n\r\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: "update".to_string(),
                data: "a\nb".to_string(),
                id: None,
            }]
        );
    }

    #[test]
    fn unnamed_events_default_to_message() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"id: 7\ndata: x\n\n");
        assert_eq!(events[0].event, "message");
        assert_eq!(events[0].id.as_deref(), Some("7"));
    }

    #[test]
    fn multibyte_characters_survive_chunk_boundaries() {
        let mut decoder = SseDecoder::new();
        let bytes = "data: é\n\n".as_bytes();
        let (head, tail) = bytes.split_at(7);
        assert!(decoder.push(head).is_empty());
        assert_eq!(decoder.push(tail)[0].data, "é");
    }
}
