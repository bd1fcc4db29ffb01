//! Splitting raw training text into tokens.

use std::io::{self, BufReader, Read};
use std::iter;

use crate::MAX_STRING;

/// The vocabulary word that stands for a line break.
pub const END_OF_LINE: &str = "</s>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(String),
    /// A word longer than `MAX_STRING - 1` bytes. Holds the kept prefix; the
    /// rest of the word up to the next delimiter was skipped.
    Truncated(String),
    EndOfLine,
}

impl Token {
    /// The vocabulary key for this token.
    pub fn as_str(&self) -> &str {
        match self {
            Token::Word(w) | Token::Truncated(w) => w,
            Token::EndOfLine => END_OF_LINE,
        }
    }
}

/// Cut `bytes` to at most `limit` bytes without splitting a UTF-8 sequence.
fn truncate_on_char_boundary(mut bytes: Vec<u8>, limit: usize) -> String {
    bytes.truncate(limit);
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(err) => {
            let valid = err.utf8_error().valid_up_to();
            let mut bytes = err.into_bytes();
            if is_cut_sequence(&bytes[valid..]) {
                bytes.truncate(valid);
            }
            String::from_utf8_lossy(&bytes).into_owned()
        }
    }
}

/// True if `tail` looks like the start of a multi-byte sequence that was cut
/// short, as opposed to garbage in the middle of the word.
fn is_cut_sequence(tail: &[u8]) -> bool {
    !tail.is_empty() && tail.len() < 4 && std::str::from_utf8(tail).is_err() && tail[0] >= 0xC0
}

/// Read tokens, assuming space + tab + EOL to be word boundaries. `\r` is
/// ignored. Each newline yields [`Token::EndOfLine`].
pub fn read_tokens<R: Read>(reader: R) -> impl Iterator<Item = io::Result<Token>> {
    let mut bytes = BufReader::new(reader).bytes().peekable();
    iter::from_fn(move || -> Option<io::Result<Token>> {
        let mut word = Vec::<u8>::new();
        let mut truncated = false;
        loop {
            let peeked = match bytes.peek() {
                None => None,
                Some(Ok(ch)) => Some(Ok(*ch)),
                Some(Err(_)) => Some(Err(())),
            };
            let ch = match peeked {
                None if word.is_empty() => return None,
                None => break,
                Some(Err(())) => {
                    return match bytes.next() {
                        Some(Err(err)) => Some(Err(err)),
                        _ => None,
                    };
                }
                Some(Ok(ch)) => ch,
            };
            if ch == b'\r' {
                bytes.next();
                continue;
            }
            if ch == b' ' || ch == b'\t' || ch == b'\n' {
                if !word.is_empty() {
                    break;
                }
                bytes.next();
                if ch == b'\n' {
                    return Some(Ok(Token::EndOfLine));
                }
                continue;
            }
            bytes.next();
            if word.len() < MAX_STRING - 1 {
                word.push(ch);
            } else {
                truncated = true; // Truncate too long words
            }
        }
        if truncated {
            Some(Ok(Token::Truncated(truncate_on_char_boundary(
                word,
                MAX_STRING - 1,
            ))))
        } else {
            Some(Ok(Token::Word(String::from_utf8_lossy(&word).into_owned())))
        }
    })
}
