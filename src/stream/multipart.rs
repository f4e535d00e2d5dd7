//! Multipart body segment parsing.
//!
//! A segment is everything between two boundary markers of a
//! `multipart/x-mixed-replace` body:
//!
//! ```text
//! Content-Type: image/jpeg\r\n
//! Content-Length: 5120\r\n
//! \r\n
//! <5120 bytes of JPEG>\r\n
//! ```
//!
//! Parsing is deliberately lenient. A segment without a header terminator
//! still produces a block, it just never passes [`MultipartBlock::is_valid`].

use bytes::Bytes;

/// Header line terminator.
const CRLF: &[u8] = b"\r\n";

const CONTENT_TYPE: &str = "Content-Type";
const CONTENT_LENGTH: &str = "Content-Length";

/// One parsed multipart segment: headers plus payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartBlock {
    content_type: String,
    declared_length: usize,
    payload: Bytes,
}

impl MultipartBlock {
    /// Parse a boundary-delimited segment (markers already stripped).
    pub fn parse(data: &[u8]) -> Self {
        let mut block = MultipartBlock::default();
        let mut offset = 0;
        let mut body_start = None;

        while let Some(eol) = find_crlf(&data[offset..]) {
            let line = &data[offset..offset + eol];
            offset += eol + CRLF.len();

            if line.is_empty() {
                body_start = Some(offset);
                break;
            }

            block.apply_header(line);
        }

        let start = match body_start {
            Some(start) => start,
            None => {
                // Unterminated header block: nothing counts as a header.
                block.content_type.clear();
                block.declared_length = 0;
                0
            }
        };

        let end = data.len().saturating_sub(CRLF.len()).max(start);
        block.payload = Bytes::copy_from_slice(&data[start..end]);
        block
    }

    fn apply_header(&mut self, line: &[u8]) {
        let Ok(line) = std::str::from_utf8(line) else {
            return;
        };
        let Some((name, value)) = line.split_once(':') else {
            return;
        };
        let value = value.trim();

        match name {
            CONTENT_TYPE => self.content_type = value.to_string(),
            CONTENT_LENGTH => self.declared_length = value.parse().unwrap_or(0),
            _ => {}
        }
    }

    /// Value of the `Content-Type` header, empty when absent.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Value of the `Content-Length` header, 0 when absent or unparseable.
    pub fn declared_length(&self) -> usize {
        self.declared_length
    }

    /// The payload bytes.
    pub fn bytes(&self) -> &Bytes {
        &self.payload
    }

    /// `true` when the block carries a typed, non-empty payload whose size
    /// matches its declared length.
    pub fn is_valid(&self) -> bool {
        !self.content_type.is_empty()
            && !self.payload.is_empty()
            && self.declared_length > 0
            && self.payload.len() == self.declared_length
    }
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(CRLF.len()).position(|w| w == CRLF)
}
