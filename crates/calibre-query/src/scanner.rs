//! Tokenizer for the search language.
//!
//! ```text
//! [!]field:"=term" and [!]field:~term or free text
//! ```
//!
//! The scanner never fails. Unterminated quotes run to the end of the input
//! and anything else becomes a bare term; deciding what is meaningful is the
//! parser's job.

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
   /// Leading `!`
   Not,
   /// `name:` with the colon stripped, lower-cased
   Field(String),
   /// Quoted or bare term, unescaped
   Term(String),
   /// Bare `and`, any case
   And,
   /// Bare `or`, any case
   Or,
}

fn is_field_byte(b: u8) -> bool {
   b.is_ascii_alphanumeric() || b == b'_' || b == b'#'
}

/// Index of the colon ending a `name:` prefix that starts at `i`, if any.
fn field_end(bytes: &[u8], len: usize, i: usize) -> Option<usize> {
   let mut j = i;
   while j < len && is_field_byte(bytes[j]) {
      j += 1;
   }
   (j > i && j < len && bytes[j] == b':').then_some(j)
}

/// Read a double-quoted term starting at the opening quote at `i`.
///
/// Backslash escapes the next character. Returns the unescaped term and the
/// index just past the closing quote (or the end of input when unterminated).
fn read_quoted(input: &str, i: usize) -> (String, usize) {
   let mut term = String::new();
   let mut chars = input[i + 1..].char_indices();

   while let Some((offset, c)) = chars.next() {
      match c {
         '"' => return (term, i + 1 + offset + 1),
         '\\' => {
            if let Some((_, escaped)) = chars.next() {
               term.push(escaped);
            }
         }
         _ => term.push(c),
      }
   }

   (term, input.len())
}

/// Read a bare word starting at `i`, up to whitespace or a quote.
fn read_bare(bytes: &[u8], len: usize, i: usize) -> usize {
   let mut j = i;
   while j < len && !bytes[j].is_ascii_whitespace() && bytes[j] != b'"' {
      j += 1;
   }
   j
}

/// Split a search string into tokens.
pub(crate) fn tokenize(input: &str) -> Vec<Token> {
   let bytes = input.as_bytes();
   let len = bytes.len();
   let mut tokens = Vec::new();
   let mut i = 0;

   while i < len {
      match bytes[i] {
         b if b.is_ascii_whitespace() => i += 1,
         b'!' => {
            tokens.push(Token::Not);
            i += 1;
         }
         b'"' => {
            let (term, next) = read_quoted(input, i);
            tokens.push(Token::Term(term));
            i = next;
         }
         _ => {
            if let Some(colon) = field_end(bytes, len, i) {
               tokens.push(Token::Field(input[i..colon].to_lowercase()));
               i = colon + 1;
               continue;
            }

            let end = read_bare(bytes, len, i);
            let word = &input[i..end];
            tokens.push(if word.eq_ignore_ascii_case("and") {
               Token::And
            } else if word.eq_ignore_ascii_case("or") {
               Token::Or
            } else {
               Token::Term(word.to_string())
            });
            i = end;
         }
      }
   }

   tokens
}
