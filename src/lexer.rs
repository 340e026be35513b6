//! Line-preserving tokenizer for contract source.
//!
//! Splits source text into tokens carrying their 1-based source line.
//! Whitespace separates tokens but never terminates a logical line; the
//! parser detects line boundaries from the recorded line numbers.
//!
//! Comment handling:
//! - a token starting with `;` or `REM` drops the remainder of its line
//! - `//` line comments and `/* */` block comments read as whitespace
//!
//! Punctuation is emitted one character per token, so `<=` reaches the
//! expression layer as `<` `=`. [`canonicalize`] re-joins the split
//! operator spellings before expression parsing.

use crate::errors::DvmError;

/// A source token and the line it starts on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    /// 1-based source line.
    pub line: u32,
}

/// Two-token operator spellings re-joined before expression parsing.
///
/// `< >` is the only pair that maps to a different operator.
const JOINED_OPERATORS: [(&str, &str); 9] = [
    ("< =", "<="),
    ("> =", ">="),
    ("= =", "=="),
    ("! =", "!="),
    ("& &", "&&"),
    ("| |", "||"),
    ("< <", "<<"),
    ("> >", ">>"),
    ("< >", "!="),
];

/// Re-joins operator spellings split by the tokenizer.
///
/// Single pass, first match in table order wins at each position. Applied
/// to the whole expression string, string literal contents included.
pub fn canonicalize(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut i = 0;
    while i < code.len() {
        let rest = &code[i..];
        if let Some((pattern, joined)) = JOINED_OPERATORS.iter().find(|(p, _)| rest.starts_with(p))
        {
            out.push_str(joined);
            i += pattern.len();
        } else {
            let c = rest.chars().next().unwrap();
            out.push(c);
            i += c.len_utf8();
        }
    }
    out
}

/// Checks whether a function or variable name is valid: it must start with
/// a letter.
pub fn is_valid_name(name: &str) -> bool {
    name.chars().next().map_or(false, |c| c.is_alphabetic())
}

/// Parses a `Uint64` literal, accepting decimal and `0x`-prefixed hex.
///
/// Rejects anything else, including values that overflow 64 bits.
pub fn parse_u64_literal(text: &str) -> Result<u64, DvmError> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(digits) => u64::from_str_radix(digits, 16),
        None => text.parse::<u64>(),
    };
    parsed.map_err(|_| DvmError::InvalidIntegerLiteral {
        literal: text.to_string(),
    })
}

struct Scanner {
    chars: Vec<char>,
    pos: usize,
    line: u32,
}

impl Scanner {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    /// Advances to just before the next newline.
    fn skip_to_line_end(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.pos += 1;
        }
    }
}

/// Splits source into tokens with their 1-based source lines.
pub fn tokenize(source: &str) -> Result<Vec<Token>, DvmError> {
    let mut s = Scanner {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
    };
    let mut tokens = Vec::new();

    while let Some(c) = s.peek() {
        if c.is_whitespace() {
            s.bump();
            continue;
        }
        let line = s.line;
        match c {
            ';' => s.skip_to_line_end(),
            '/' if s.peek_at(1) == Some('/') => s.skip_to_line_end(),
            '/' if s.peek_at(1) == Some('*') => {
                s.bump();
                s.bump();
                loop {
                    match s.bump() {
                        None => {
                            return Err(DvmError::Parse {
                                line,
                                message: "unterminated block comment".to_string(),
                            });
                        }
                        Some('*') if s.peek() == Some('/') => {
                            s.bump();
                            break;
                        }
                        Some(_) => {}
                    }
                }
            }
            '"' | '\'' => {
                let text = scan_quoted(&mut s, c, false, line)?;
                tokens.push(Token { text, line });
            }
            '`' => {
                let text = scan_quoted(&mut s, '`', true, line)?;
                tokens.push(Token { text, line });
            }
            _ if c.is_alphabetic() || c == '_' => {
                let text = scan_ident(&mut s);
                if text.starts_with("REM") {
                    s.skip_to_line_end();
                } else {
                    tokens.push(Token { text, line });
                }
            }
            _ if c.is_ascii_digit() => {
                let text = scan_number(&mut s);
                tokens.push(Token { text, line });
            }
            _ => {
                s.bump();
                tokens.push(Token {
                    text: c.to_string(),
                    line,
                });
            }
        }
    }

    Ok(tokens)
}

/// Scans a quoted literal, keeping the quotes in the token text.
///
/// Raw (backtick) literals may span lines and carry no escapes; ordinary
/// literals end at the closing quote and keep escape sequences verbatim.
fn scan_quoted(s: &mut Scanner, quote: char, raw: bool, line: u32) -> Result<String, DvmError> {
    let mut text = String::new();
    text.push(s.bump().unwrap());
    loop {
        match s.bump() {
            None => {
                return Err(DvmError::Parse {
                    line,
                    message: "unterminated string literal (missing closing quote)".to_string(),
                });
            }
            Some(c) if c == quote => {
                text.push(c);
                return Ok(text);
            }
            Some('\n') if !raw => {
                return Err(DvmError::Parse {
                    line,
                    message: "newline in string literal".to_string(),
                });
            }
            Some('\\') if !raw => {
                text.push('\\');
                match s.bump() {
                    None => {
                        return Err(DvmError::Parse {
                            line,
                            message: "unterminated string literal (missing closing quote)"
                                .to_string(),
                        });
                    }
                    Some(e) => text.push(e),
                }
            }
            Some(c) => text.push(c),
        }
    }
}

fn scan_ident(s: &mut Scanner) -> String {
    let mut text = String::new();
    while let Some(c) = s.peek() {
        if c.is_alphanumeric() || c == '_' {
            text.push(c);
            s.bump();
        } else {
            break;
        }
    }
    text
}

/// Scans an integer or floating literal. Floats are tokenized here and
/// rejected by the expression grammar.
fn scan_number(s: &mut Scanner) -> String {
    let mut text = String::new();

    if s.peek() == Some('0') && matches!(s.peek_at(1), Some('x') | Some('X')) {
        text.push(s.bump().unwrap());
        text.push(s.bump().unwrap());
        while matches!(s.peek(), Some(c) if c.is_ascii_hexdigit()) {
            text.push(s.bump().unwrap());
        }
        return text;
    }

    while matches!(s.peek(), Some(c) if c.is_ascii_digit()) {
        text.push(s.bump().unwrap());
    }
    if s.peek() == Some('.') && matches!(s.peek_at(1), Some(c) if c.is_ascii_digit()) {
        text.push(s.bump().unwrap());
        while matches!(s.peek(), Some(c) if c.is_ascii_digit()) {
            text.push(s.bump().unwrap());
        }
    }
    if matches!(s.peek(), Some('e') | Some('E')) {
        let exponent_digits = match s.peek_at(1) {
            Some('+') | Some('-') => matches!(s.peek_at(2), Some(c) if c.is_ascii_digit()),
            Some(c) => c.is_ascii_digit(),
            None => false,
        };
        if exponent_digits {
            text.push(s.bump().unwrap());
            if matches!(s.peek(), Some('+') | Some('-')) {
                text.push(s.bump().unwrap());
            }
            while matches!(s.peek(), Some(c) if c.is_ascii_digit()) {
                text.push(s.bump().unwrap());
            }
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(source: &str) -> Vec<String> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.text)
            .collect()
    }

    // ==================== Tokens ====================

    #[test]
    fn tokens_carry_line_numbers() {
        let tokens = tokenize("LET x = 1\nRETURN x").unwrap();
        let lines: Vec<u32> = tokens.iter().map(|t| t.line).collect();
        assert_eq!(lines, vec![1, 1, 1, 1, 2, 2]);
    }

    #[test]
    fn punctuation_splits_per_character() {
        assert_eq!(texts("a<=b"), vec!["a", "<", "=", "b"]);
        assert_eq!(texts("x!=y"), vec!["x", "!", "=", "y"]);
        assert_eq!(texts("f(a,b)"), vec!["f", "(", "a", ",", "b", ")"]);
    }

    #[test]
    fn string_token_keeps_quotes_and_spaces() {
        assert_eq!(texts(r#"LET s = "hi there""#), vec![
            "LET",
            "s",
            "=",
            "\"hi there\"",
        ]);
    }

    #[test]
    fn string_escape_kept_verbatim() {
        assert_eq!(texts(r#""a\"b""#), vec![r#""a\"b""#]);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = tokenize("LET s = \"oops").unwrap_err();
        assert!(matches!(err, DvmError::Parse { line: 1, .. }));
        let err = tokenize("LET s = \"oops\nRETURN s").unwrap_err();
        assert!(matches!(err, DvmError::Parse { line: 1, .. }));
    }

    #[test]
    fn raw_string_spans_lines() {
        let tokens = tokenize("`a\nb` x").unwrap();
        assert_eq!(tokens[0].text, "`a\nb`");
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[1].line, 2);
    }

    #[test]
    fn number_forms() {
        assert_eq!(texts("10 0xFF 3.25 1e9"), vec!["10", "0xFF", "3.25", "1e9"]);
    }

    // ==================== Comments ====================

    #[test]
    fn semicolon_drops_rest_of_line() {
        assert_eq!(texts("LET x = 1 ; trailing words\nRETURN x"), vec![
            "LET", "x", "=", "1", "RETURN", "x",
        ]);
    }

    #[test]
    fn rem_prefix_drops_rest_of_line() {
        assert_eq!(texts("REM whole line comment\nRETURN 1"), vec![
            "RETURN", "1",
        ]);
        // the prefix alone triggers the comment
        assert_eq!(texts("REMARK ignored\nRETURN 1"), vec!["RETURN", "1"]);
    }

    #[test]
    fn slash_comments_read_as_whitespace() {
        assert_eq!(texts("LET x = 1 // note\nRETURN x"), vec![
            "LET", "x", "=", "1", "RETURN", "x",
        ]);
        assert_eq!(texts("LET /* gap */ x = 1"), vec!["LET", "x", "=", "1"]);
    }

    #[test]
    fn block_comment_spans_lines() {
        let tokens = tokenize("a /* one\ntwo */ b").unwrap();
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[1].text, "b");
        assert_eq!(tokens[1].line, 2);
    }

    #[test]
    fn unterminated_block_comment_is_an_error() {
        assert!(tokenize("a /* never closed").is_err());
    }

    // ==================== Canonicalization ====================

    #[test]
    fn canonicalize_rejoins_split_operators() {
        assert_eq!(canonicalize("a < = b"), "a <= b");
        assert_eq!(canonicalize("a > = b"), "a >= b");
        assert_eq!(canonicalize("a = = b"), "a == b");
        assert_eq!(canonicalize("a ! = b"), "a != b");
        assert_eq!(canonicalize("a & & b"), "a && b");
        assert_eq!(canonicalize("a | | b"), "a || b");
        assert_eq!(canonicalize("a < < b"), "a << b");
        assert_eq!(canonicalize("a > > b"), "a >> b");
    }

    #[test]
    fn canonicalize_maps_angle_pair_to_not_equal() {
        assert_eq!(canonicalize("a < > b"), "a != b");
    }

    #[test]
    fn canonicalize_leaves_plain_text_alone() {
        assert_eq!(canonicalize("a + b * ( c )"), "a + b * ( c )");
    }

    // ==================== Helpers ====================

    #[test]
    fn valid_names_start_with_a_letter() {
        assert!(is_valid_name("owner"));
        assert!(is_valid_name("X1"));
        assert!(!is_valid_name("1x"));
        assert!(!is_valid_name("_x"));
        assert!(!is_valid_name(""));
    }

    #[test]
    fn u64_literal_bases() {
        assert_eq!(parse_u64_literal("42").unwrap(), 42);
        assert_eq!(parse_u64_literal("0x2a").unwrap(), 42);
        assert_eq!(parse_u64_literal("0X2A").unwrap(), 42);
        assert_eq!(
            parse_u64_literal("18446744073709551615").unwrap(),
            u64::MAX
        );
    }

    #[test]
    fn u64_literal_rejects_overflow_and_junk() {
        assert!(parse_u64_literal("18446744073709551616").is_err());
        assert!(parse_u64_literal("-1").is_err());
        assert!(parse_u64_literal("ten").is_err());
        assert!(parse_u64_literal("").is_err());
    }
}
