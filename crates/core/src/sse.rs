use std::{mem, str};

/// A type for splitting a chunked byte stream into text lines.
///
/// Chunk boundaries are arbitrary. A line that is not terminated yet is
/// kept in the buffer until the rest of it arrives, and so are the bytes
/// of a UTF-8 character cut in half.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: String,
    // Start of the unread part of `buf`.
    pos: usize,
    // Leading bytes of an incomplete UTF-8 sequence at the end of the
    // last chunk.
    partial_char: Vec<u8>,
}

impl LineDecoder {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a chunk and appends it to the buffer.
    pub fn push(&mut self, chunk: &[u8]) {
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        if self.partial_char.is_empty() {
            self.decode(chunk);
        } else {
            let mut bytes = mem::take(&mut self.partial_char);
            bytes.extend_from_slice(chunk);
            self.decode(&bytes);
        }
    }

    fn decode(&mut self, mut input: &[u8]) {
        loop {
            let err = match str::from_utf8(input) {
                Ok(s) => {
                    self.buf.push_str(s);
                    return;
                }
                Err(err) => err,
            };

            let (valid, rest) = input.split_at(err.valid_up_to());
            self.buf.push_str(&String::from_utf8_lossy(valid));
            match err.error_len() {
                Some(len) => {
                    // Invalid bytes, they will never become a character.
                    self.buf.push(char::REPLACEMENT_CHARACTER);
                    input = &rest[len..];
                }
                None => {
                    // The sequence is cut by the chunk boundary.
                    self.partial_char.extend_from_slice(rest);
                    return;
                }
            }
        }
    }

    /// Takes the next complete line out of the buffer, without its line
    /// terminator (`\n` or `\r\n`).
    pub fn next_line(&mut self) -> Option<String> {
        let rest = &self.buf[self.pos..];
        let eol_idx = rest.find('\n')?;
        let line = &rest[..eol_idx];
        let line = line.strip_suffix('\r').unwrap_or(line).to_owned();
        self.pos += eol_idx + 1;
        Some(line)
    }

    /// Takes whatever is left in the buffer once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if !self.partial_char.is_empty() {
            self.partial_char.clear();
            self.buf.push(char::REPLACEMENT_CHARACTER);
        }
        let mut rest = mem::take(&mut self.buf).split_off(self.pos);
        self.pos = 0;
        if rest.ends_with('\r') {
            rest.pop();
        }
        if rest.is_empty() { None } else { Some(rest) }
    }
}
