//! Line assembly for inbound device output
//!
//! The controller speaks in newline-terminated lines, but a read returns
//! whatever happened to be buffered. [`LineAssembler`] stitches reads back
//! into lines and decodes each one as UTF-8 on its own, so one corrupt line
//! does not poison its neighbours.

use tinyg_link_core::DecodeError;

/// Splits a byte stream into decoded lines
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: Vec<u8>,
}

impl LineAssembler {
    /// Create an empty assembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed newly read bytes, returning every line they complete
    ///
    /// Empty lines are dropped. An unterminated tail is held for the next call
    /// unless it already is a complete JSON object.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<String, DecodeError>> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let fragment: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(line) = decode(&fragment[..fragment.len() - 1]) {
                lines.push(line);
            }
        }

        if self.tail_is_complete_object() {
            let fragment = std::mem::take(&mut self.pending);
            if let Some(line) = decode(&fragment) {
                lines.push(line);
            }
        }

        lines
    }

    /// Take the unterminated tail, if any
    pub fn take_partial(&mut self) -> Option<Result<String, DecodeError>> {
        let fragment = std::mem::take(&mut self.pending);
        decode(&fragment)
    }

    /// Bytes held back waiting for a newline
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn tail_is_complete_object(&self) -> bool {
        let tail = trim_ascii(&self.pending);
        tail.first() == Some(&b'{')
            && tail.last() == Some(&b'}')
            && serde_json::from_slice::<serde_json::Value>(tail).is_ok()
    }
}

fn decode(fragment: &[u8]) -> Option<Result<String, DecodeError>> {
    let fragment = trim_ascii(fragment);
    if fragment.is_empty() {
        return None;
    }
    Some(
        std::str::from_utf8(fragment)
            .map(str::to_string)
            .map_err(|e| DecodeError::InvalidUtf8 {
                len: fragment.len(),
                reason: e.to_string(),
            }),
    )
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |pos| pos + 1);
    &bytes[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_split_across_reads() {
        let mut assembler = LineAssembler::new();
        assert!(assembler.push(b"{\"r\":{\"xvm\"").is_empty());
        assert_eq!(assembler.pending_len(), 11);

        let lines = assembler.push(b":500},\"f\":[1,0,0,1]}\r\n{\"sr\"");
        assert_eq!(lines.len(), 1);
        assert_eq!(
            lines[0].as_deref().unwrap(),
            r#"{"r":{"xvm":500},"f":[1,0,0,1]}"#
        );
        assert_eq!(assembler.take_partial().unwrap().unwrap(), r#"{"sr""#);
        assert!(assembler.take_partial().is_none());
    }

    #[test]
    fn test_invalid_fragment_does_not_hide_next_line() {
        let mut assembler = LineAssembler::new();
        let lines = assembler.push(b"\xff\xfe\x80garbage\n{\"r\":{},\"f\":[1,0,8,1]}\n");
        assert_eq!(lines.len(), 2);
        assert!(matches!(lines[0], Err(DecodeError::InvalidUtf8 { len: 10, .. })));
        assert_eq!(lines[1].as_deref().unwrap(), r#"{"r":{},"f":[1,0,8,1]}"#);
    }

    #[test]
    fn test_complete_object_without_newline_is_released() {
        let mut assembler = LineAssembler::new();
        let lines = assembler.push(br#"{"er":{"fb":440.20,"st":204,"msg":"Limit"}}"#);
        assert_eq!(lines.len(), 1);
        assert_eq!(assembler.pending_len(), 0);
    }

    #[test]
    fn test_blank_lines_dropped() {
        let mut assembler = LineAssembler::new();
        let lines = assembler.push(b"\r\n\n  \ntinyg [mm] ok>\n");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].as_deref().unwrap(), "tinyg [mm] ok>");
    }
}
