//! Byte cursor over assembly source.
// Inspired by `rustc_lexer`'s cursor, trimmed down to what the assembler
// grammar needs: single-byte peeking and trivia skipping.

/// Peekable byte cursor. The grammar is pure ASCII, so positions are byte
/// offsets and double as diagnostic span offsets.
pub struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(src: &'a str) -> Cursor<'a> {
        Cursor { src, pos: 0 }
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.src.len()
    }

    /// Current byte, or 0 at end of input.
    pub fn peek(&self) -> u8 {
        self.src.as_bytes().get(self.pos).copied().unwrap_or(0)
    }

    /// Consume and return one byte. No-op at end of input.
    pub fn bump(&mut self) -> u8 {
        let byte = self.peek();
        if !self.is_eof() {
            self.pos += 1;
        }
        byte
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.src[self.pos..].starts_with(prefix)
    }

    /// Consume `prefix` if the input starts with it.
    pub fn eat(&mut self, prefix: &str) -> bool {
        if self.starts_with(prefix) {
            self.pos += prefix.len();
            true
        } else {
            false
        }
    }

    /// Skip whitespace and `#` line comments.
    pub fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                b' ' | b'\t' | b'\r' | b'\n' | 0x0b => {
                    self.bump();
                }
                b'#' => {
                    while !self.is_eof() && self.peek() != b'\n' {
                        self.bump();
                    }
                }
                _ => return,
            }
        }
    }
}
