//! Placeholder substitution for message, command and query templates.
//!
//! Templates may contain `%vkid%`, `%nickname%` and `%nickname_lower%`. Text templates get the
//! values spliced in, while query templates get a bind parameter in their place so user input
//! never ends up in the SQL text.

use crate::Error;

/// The SQL dialect decides how bind parameters are spelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `?` parameters (MySQL, MariaDB, SQLite).
    QuestionMark,
    /// `$1`, `$2`, … parameters (PostgreSQL).
    Numbered,
}

/// A value bound to a query parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// An integer, used for user ids.
    Int(i64),
    /// A string, used for nicknames.
    Text(String),
}

/// A query template with its placeholders replaced by bind parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundQuery {
    /// The SQL text, ready to be prepared.
    pub sql: String,
    /// The values to bind, in order of appearance.
    pub params: Vec<Param>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    UserId,
    Nickname,
    NicknameLower,
}

impl Token {
    const ALL: [Self; 3] = [Self::UserId, Self::Nickname, Self::NicknameLower];

    const fn as_str(self) -> &'static str {
        match self {
            Self::UserId => "%vkid%",
            Self::Nickname => "%nickname%",
            Self::NicknameLower => "%nickname_lower%",
        }
    }
}

/// Finds the first placeholder token in `s`, returning its byte offset.
fn find_token(s: &str) -> Option<(usize, Token)> {
    Token::ALL
        .iter()
        .filter_map(|token| s.find(token.as_str()).map(|idx| (idx, *token)))
        .min_by_key(|(idx, _)| *idx)
}

/// A piece of a query template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    /// SQL text, including string literals without placeholders.
    Sql(&'a str),
    /// A placeholder outside any literal, or one that is the whole literal (`'%nickname%'`).
    Token(Token),
    /// A string literal with a placeholder somewhere among other text.
    Literal(&'a str),
}

/// Splits a query template into SQL text, placeholders and literals that embed placeholders.
///
/// Literals are delimited by `'` or `"`. A doubled quote inside a literal simply closes and
/// reopens it, which keeps the split correct for `'it''s'`.
fn segments(template: &str) -> Vec<Segment<'_>> {
    let mut segments = vec![];
    let mut rest = template;

    while !rest.is_empty() {
        let quote = rest.find(['\'', '"']);
        let token = find_token(rest);

        match (quote, token) {
            (Some(start), token) if token.is_none_or(|(idx, _)| start < idx) => {
                segments.push(Segment::Sql(&rest[..start]));

                let mark = &rest[start..=start];
                let Some(len) = rest[start + 1..].find(mark) else {
                    // Unterminated, the database will reject it anyway.
                    let literal = &rest[start..];
                    segments.push(if find_token(literal).is_some() {
                        Segment::Literal(literal)
                    } else {
                        Segment::Sql(literal)
                    });
                    break;
                };

                let end = start + 1 + len + 1;
                let literal = &rest[start..end];
                let body = &literal[1..literal.len() - 1];

                if let Some(token) = Token::ALL.into_iter().find(|t| t.as_str() == body) {
                    segments.push(Segment::Token(token));
                } else if find_token(body).is_some() {
                    segments.push(Segment::Literal(literal));
                } else {
                    segments.push(Segment::Sql(literal));
                }

                rest = &rest[end..];
            }
            (_, Some((idx, token))) => {
                segments.push(Segment::Sql(&rest[..idx]));
                segments.push(Segment::Token(token));
                rest = &rest[idx + token.as_str().len()..];
            }
            _ => {
                segments.push(Segment::Sql(rest));
                break;
            }
        }
    }

    segments
}

/// Checks that every placeholder in the query `template` can be bound as a parameter.
///
/// # Errors
///
/// Returns [`Error::PlaceholderInLiteral`] if a placeholder sits inside a string literal next
/// to other text, like `'claimed by %vkid%'`.
pub fn check_query(template: &str) -> Result<(), Error> {
    let literal = segments(template).into_iter().find_map(|segment| match segment {
        Segment::Literal(literal) => Some(literal),
        Segment::Sql(_) | Segment::Token(_) => None,
    });

    match literal {
        Some(literal) => Err(Error::PlaceholderInLiteral(literal.to_string())),
        None => Ok(()),
    }
}

/// The values available to templates while handling a single command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholders {
    user_id: i64,
    nickname: String,
}

impl Placeholders {
    /// Creates the placeholder values for `user_id` claiming `nickname`.
    #[must_use]
    pub fn new(user_id: i64, nickname: impl Into<String>) -> Self {
        Self {
            user_id,
            nickname: nickname.into(),
        }
    }

    /// The VK id of the user that sent the command.
    #[must_use]
    pub const fn user_id(&self) -> i64 {
        self.user_id
    }

    /// The nickname as it was captured from the command.
    #[must_use]
    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    fn param(&self, token: Token) -> Param {
        match token {
            Token::UserId => Param::Int(self.user_id),
            Token::Nickname => Param::Text(self.nickname.clone()),
            Token::NicknameLower => Param::Text(self.nickname.to_lowercase()),
        }
    }

    /// Returns `template` with every placeholder replaced by its value.
    #[must_use]
    pub fn render(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len() + self.nickname.len());
        let mut rest = template;

        while let Some((idx, token)) = find_token(rest) {
            out.push_str(&rest[..idx]);

            match self.param(token) {
                Param::Int(value) => out.push_str(&value.to_string()),
                Param::Text(value) => out.push_str(&value),
            }

            rest = &rest[idx + token.as_str().len()..];
        }

        out.push_str(rest);
        out
    }

    /// Turns a query template into SQL with bind parameters for the given `dialect`.
    ///
    /// A placeholder that makes up a whole quoted literal (`'%nickname%'`) is bound as a single
    /// value and loses the quotes, so templates written for plain substitution keep working.
    /// Placeholders inside longer literals are left untouched; [`check_query`] rejects those.
    #[must_use]
    pub fn bind(&self, template: &str, dialect: Dialect) -> BoundQuery {
        let mut sql = String::with_capacity(template.len());
        let mut params = Vec::new();

        for segment in segments(template) {
            match segment {
                Segment::Sql(text) | Segment::Literal(text) => sql.push_str(text),
                Segment::Token(token) => {
                    params.push(self.param(token));

                    match dialect {
                        Dialect::QuestionMark => sql.push('?'),
                        Dialect::Numbered => {
                            sql.push('$');
                            sql.push_str(&params.len().to_string());
                        }
                    }
                }
            }
        }

        BoundQuery { sql, params }
    }
}
