//! SQL lexer following SQLite's tokenization rules.
//!
//! Comments are kept as tokens (with their body text) rather than dropped,
//! so the guard can both ignore them structurally and still inspect what
//! they contain. Nothing here ever fails: unterminated comments and quotes
//! run to the end of input, the way SQLite treats an open block comment.

/// Kind of a lexical token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Unquoted identifier or keyword.
    Word,
    /// Identifier in `"…"`, `` `…` `` or `[…]`.
    QuotedIdent,
    /// String literal in `'…'`.
    String,
    Number,
    /// Any single punctuation or operator character.
    Punct(char),
    /// `-- …` or `/* … */`; text holds the body only.
    Comment,
}

/// A lexical token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Token text with delimiters and escapes removed.
    pub text: String,
    /// True when no whitespace separates this token from the previous one.
    pub glued: bool,
}

impl Token {
    pub fn is_comment(&self) -> bool {
        self.kind == TokenKind::Comment
    }

    pub fn is_punct(&self, c: char) -> bool {
        self.kind == TokenKind::Punct(c)
    }

    /// True for an unquoted word equal to `keyword`, ignoring case.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    /// True for tokens that can name a relation.
    pub fn is_identifier(&self) -> bool {
        matches!(self.kind, TokenKind::Word | TokenKind::QuotedIdent)
    }
}

/// Splits `sql` into tokens.
pub fn tokenize(sql: &str) -> Vec<Token> {
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    let mut glued = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            glued = false;
            i += 1;
            continue;
        }

        let (kind, text, next) = match c {
            '-' if chars.get(i + 1) == Some(&'-') => {
                let end = chars[i..]
                    .iter()
                    .position(|&ch| ch == '\n')
                    .map_or(chars.len(), |p| i + p);
                (TokenKind::Comment, collect(&chars[i + 2..end]), end)
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                let body_start = i + 2;
                let close = chars[body_start..]
                    .windows(2)
                    .position(|w| w == ['*', '/'])
                    .map(|p| body_start + p);
                match close {
                    Some(end) => (TokenKind::Comment, collect(&chars[body_start..end]), end + 2),
                    None => (
                        TokenKind::Comment,
                        collect(&chars[body_start..]),
                        chars.len(),
                    ),
                }
            }
            '\'' => {
                let (text, next) = read_quoted(&chars, i, '\'');
                (TokenKind::String, text, next)
            }
            '"' | '`' => {
                let (text, next) = read_quoted(&chars, i, c);
                (TokenKind::QuotedIdent, text, next)
            }
            '[' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == ']')
                    .map(|p| i + 1 + p);
                match end {
                    Some(end) => (TokenKind::QuotedIdent, collect(&chars[i + 1..end]), end + 1),
                    None => (TokenKind::QuotedIdent, collect(&chars[i + 1..]), chars.len()),
                }
            }
            c if c.is_ascii_digit() => {
                let end = scan(&chars, i, |ch| ch.is_ascii_alphanumeric() || ch == '.' || ch == '_');
                (TokenKind::Number, collect(&chars[i..end]), end)
            }
            c if is_word_start(c) => {
                let end = scan(&chars, i, is_word_part);
                (TokenKind::Word, collect(&chars[i..end]), end)
            }
            other => (TokenKind::Punct(other), other.to_string(), i + 1),
        };

        tokens.push(Token { kind, text, glued });
        glued = true;
        i = next;
    }

    tokens
}

fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_word_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn collect(chars: &[char]) -> String {
    chars.iter().collect()
}

/// Returns the index just past the run of chars matching `pred` from `start`.
fn scan(chars: &[char], start: usize, pred: impl Fn(char) -> bool) -> usize {
    chars[start..]
        .iter()
        .position(|&ch| !pred(ch))
        .map_or(chars.len(), |p| start + p)
}

/// Reads a quoted run starting at `start`, where a doubled quote is an escape.
fn read_quoted(chars: &[char], start: usize, quote: char) -> (String, usize) {
    let mut text = String::new();
    let mut j = start + 1;
    while j < chars.len() {
        if chars[j] == quote {
            if chars.get(j + 1) == Some(&quote) {
                text.push(quote);
                j += 2;
                continue;
            }
            return (text, j + 1);
        }
        text.push(chars[j]);
        j += 1;
    }
    (text, chars.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<TokenKind> {
        tokenize(sql).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_select() {
        let tokens = tokenize("SELECT value FROM daily_metric;");
        let texts: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["SELECT", "value", "FROM", "daily_metric", ";"]);
        assert!(tokens[0].is_keyword("select"));
        assert!(tokens[4].is_punct(';'));
    }

    #[test]
    fn test_line_comment_runs_to_newline() {
        let tokens = tokenize("SELECT 1 -- drop it\nFROM t");
        assert_eq!(tokens[2].kind, TokenKind::Comment);
        assert_eq!(tokens[2].text, " drop it");
        assert!(tokens[3].is_keyword("FROM"));
    }

    #[test]
    fn test_block_comment_and_unterminated() {
        let tokens = tokenize("SELECT /* a */ 1 /* open");
        assert_eq!(
            kinds("SELECT /* a */ 1 /* open"),
            vec![
                TokenKind::Word,
                TokenKind::Comment,
                TokenKind::Number,
                TokenKind::Comment
            ]
        );
        assert_eq!(tokens[1].text, " a ");
        assert_eq!(tokens[3].text, " open");
    }

    #[test]
    fn test_string_with_escaped_quote_hides_semicolon() {
        let tokens = tokenize("SELECT 'it''s; fine' AS x");
        assert_eq!(tokens[1].kind, TokenKind::String);
        assert_eq!(tokens[1].text, "it's; fine");
        assert!(!tokens.iter().any(|t| t.is_punct(';')));
    }

    #[test]
    fn test_quoted_identifiers() {
        let tokens = tokenize(r#"SELECT "a""b", `c`, [d e] FROM x"#);
        let idents: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::QuotedIdent)
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(idents, vec!["a\"b", "c", "d e"]);
    }

    #[test]
    fn test_glued_tracking() {
        let tokens = tokenize("DR/**/OP x");
        assert!(!tokens[0].glued);
        assert!(tokens[1].glued);
        assert!(tokens[2].glued);
        assert!(!tokens[3].glued);
    }

    #[test]
    fn test_comment_markers_inside_strings_are_not_comments() {
        let tokens = tokenize("SELECT '--not', '/*nope*/'");
        assert!(!tokens.iter().any(Token::is_comment));
    }

    #[test]
    fn test_empty_input() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   \n\t").is_empty());
    }
}
