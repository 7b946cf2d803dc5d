//! User query syntax for lexical search.
//!
//! Accepted syntax: bare terms (adjacent terms are ANDed), `AND`, `OR`,
//! `NOT` (binary, uppercase only), quoted phrases, a trailing `*` for prefix
//! matching, and parentheses. Precedence is `NOT` > `AND` > `OR`.
//!
//! The query is parsed into a small tree and rendered back as FTS5 syntax
//! with every term quoted, so user input can never reach FTS5 operators or
//! column filters directly.

use crate::errors::{KnowledgeError, KnowledgeResult};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Term { text: String, prefix: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Term { text: String, prefix: bool },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>, Box<Expr>),
}

/// Compile a user query into an FTS5 `MATCH` expression.
///
/// Returns `Ok(None)` when the query holds nothing searchable.
pub fn compile_query(input: &str) -> KnowledgeResult<Option<String>> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Ok(None);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(malformed(format!("unexpected {}", describe(token))));
    }
    Ok(Some(expr.render()))
}

fn malformed(message: impl Into<String>) -> KnowledgeError {
    KnowledgeError::MalformedQuery(message.into())
}

fn searchable(text: &str) -> bool {
    text.chars().any(char::is_alphanumeric)
}

fn tokenize(input: &str) -> KnowledgeResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '"' {
                        closed = true;
                        break;
                    }
                    text.push(c);
                }
                if !closed {
                    return Err(malformed(format!("unterminated quote at offset {start}")));
                }
                let mut prefix = false;
                while chars.next_if(|&(_, c)| c == '*').is_some() {
                    prefix = true;
                }
                if searchable(&text) {
                    tokens.push(Token::Term { text, prefix });
                }
            }
            _ => {
                let mut word = String::new();
                while let Some((_, c)) =
                    chars.next_if(|&(_, c)| !c.is_whitespace() && !matches!(c, '(' | ')' | '"'))
                {
                    word.push(c);
                }
                match word.as_str() {
                    "AND" => tokens.push(Token::And),
                    "OR" => tokens.push(Token::Or),
                    "NOT" => tokens.push(Token::Not),
                    _ => {
                        let prefix = word.ends_with('*');
                        let text = word.trim_end_matches('*').to_string();
                        if searchable(&text) {
                            tokens.push(Token::Term { text, prefix });
                        }
                    }
                }
            }
        }
    }

    Ok(tokens)
}

fn describe(token: &Token) -> String {
    match token {
        Token::LParen => "'('".to_string(),
        Token::RParen => "')'".to_string(),
        Token::And => "AND".to_string(),
        Token::Or => "OR".to_string(),
        Token::Not => "NOT".to_string(),
        Token::Term { text, .. } => format!("term '{text}'"),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse_or(&mut self) -> KnowledgeResult<Expr> {
        let mut parts = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.advance();
            parts.push(self.parse_and()?);
        }
        Ok(if parts.len() == 1 { parts.remove(0) } else { Expr::Or(parts) })
    }

    fn parse_and(&mut self) -> KnowledgeResult<Expr> {
        let mut parts = vec![self.parse_not()?];
        loop {
            match self.peek() {
                Some(Token::And) => {
                    self.advance();
                    parts.push(self.parse_not()?);
                }
                Some(Token::Term { .. }) | Some(Token::LParen) => {
                    parts.push(self.parse_not()?);
                }
                _ => break,
            }
        }
        Ok(if parts.len() == 1 { parts.remove(0) } else { Expr::And(parts) })
    }

    fn parse_not(&mut self) -> KnowledgeResult<Expr> {
        let mut expr = self.parse_primary()?;
        while self.peek() == Some(&Token::Not) {
            self.advance();
            let rhs = self.parse_primary()?;
            expr = Expr::Not(Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> KnowledgeResult<Expr> {
        match self.advance() {
            Some(Token::Term { text, prefix }) => Ok(Expr::Term { text, prefix }),
            Some(Token::LParen) => {
                if self.peek() == Some(&Token::RParen) {
                    return Err(malformed("empty parentheses"));
                }
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(malformed("missing closing parenthesis")),
                }
            }
            Some(token) => Err(malformed(format!("expected a term, found {}", describe(&token)))),
            None => Err(malformed("query ends where a term was expected")),
        }
    }
}

impl Expr {
    fn render(&self) -> String {
        match self {
            Self::Term { text, prefix } => {
                let quoted = format!("\"{}\"", text.replace('"', "\"\""));
                if *prefix { format!("{quoted}*") } else { quoted }
            }
            Self::And(parts) => join(parts, " AND "),
            Self::Or(parts) => join(parts, " OR "),
            Self::Not(lhs, rhs) => format!("{} NOT {}", lhs.grouped(), rhs.grouped()),
        }
    }

    fn grouped(&self) -> String {
        match self {
            Self::Term { .. } => self.render(),
            _ => format!("({})", self.render()),
        }
    }
}

fn join(parts: &[Expr], separator: &str) -> String {
    parts
        .iter()
        .map(Expr::grouped)
        .collect::<Vec<_>>()
        .join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(input: &str) -> String {
        compile_query(input).unwrap().unwrap_or_default()
    }

    #[test]
    fn bare_terms_are_anded_and_quoted() {
        assert_eq!(compile("rust async"), r#""rust" AND "async""#);
    }

    #[test]
    fn operators_phrases_and_prefixes() {
        assert_eq!(
            compile(r#""hybrid search" OR vect* NOT draft"#),
            r#""hybrid search" OR ("vect"* NOT "draft")"#
        );
        assert_eq!(compile("(a OR b) c"), r#"("a" OR "b") AND "c""#);
    }

    #[test]
    fn lowercase_keywords_are_terms() {
        assert_eq!(compile("cats and dogs"), r#""cats" AND "and" AND "dogs""#);
    }

    #[test]
    fn fts_syntax_is_neutralised() {
        assert_eq!(compile("title:secret"), r#""title:secret""#);
        assert_eq!(compile("NEAR(a b)"), r#""NEAR" AND ("a" AND "b")"#);
    }

    #[test]
    fn empty_and_symbol_only_queries_compile_to_nothing() {
        assert_eq!(compile_query("").unwrap(), None);
        assert_eq!(compile_query("   * - !!").unwrap(), None);
    }

    #[test]
    fn malformed_queries_are_rejected() {
        for input in ["\"open", "a AND", "NOT a", "(a", "a)", "()", "a OR OR b"] {
            let err = compile_query(input).unwrap_err();
            assert!(
                matches!(err, KnowledgeError::MalformedQuery(_)),
                "{input} should be malformed"
            );
        }
    }
}
