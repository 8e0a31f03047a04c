//! The guardrail rule pipeline.
//!
//! Rules run in a fixed order and the first violation wins:
//!
//! 1. the statement must start with SELECT or WITH and be a pure query
//! 2. exactly one statement (a trailing `;` is fine, but nothing after it)
//! 3. every referenced relation is on the allow-list, except names bound by
//!    a CTE in an enclosing query
//! 4. no deny-listed keyword anywhere, including inside comments and
//!    words split by an empty comment such as `DR/**/OP`
//!
//! Lexical checks always run. The sqlparser pass adds structural checks when
//! the text parses and is skipped otherwise.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::db::SchemaDescriptor;

use super::lexer::{tokenize, Token, TokenKind};
use super::parser::{analyze, Structure};
use super::{AcceptedQuery, RejectReason, Verdict};

/// Keywords that are refused wherever they appear.
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT",
    "UPDATE",
    "DELETE",
    "MERGE",
    "UPSERT",
    "CREATE",
    "DROP",
    "ALTER",
    "TRUNCATE",
    "RENAME",
    "ATTACH",
    "DETACH",
    "COPY",
    "PRAGMA",
    "VACUUM",
    "REINDEX",
    "ANALYZE",
    "GRANT",
    "REVOKE",
    "LOAD_EXTENSION",
    "READFILE",
    "WRITEFILE",
];

/// Words that end a FROM list at the same nesting depth.
const CLAUSE_KEYWORDS: &[&str] = &[
    "WHERE", "GROUP", "HAVING", "ORDER", "LIMIT", "WINDOW", "UNION", "INTERSECT", "EXCEPT",
    "VALUES", "RETURNING",
];

/// Words that start a subquery rather than name a table.
const QUERY_STARTERS: &[&str] = &["SELECT", "WITH", "VALUES"];

/// Validates candidate SQL against a fixed allow-list of relations.
#[derive(Debug, Clone)]
pub struct SqlGuard {
    schema: SchemaDescriptor,
}

impl Default for SqlGuard {
    fn default() -> Self {
        Self::new(SchemaDescriptor::curated())
    }
}

impl SqlGuard {
    /// Creates a guard that allows exactly the tables in `schema`.
    pub fn new(schema: &SchemaDescriptor) -> Self {
        Self {
            schema: schema.clone(),
        }
    }

    /// Applies every rule to `sql`. Pure: the same input always yields the
    /// same verdict.
    pub fn validate(&self, sql: &str) -> Verdict {
        match self.check(sql) {
            Ok(()) => {
                debug!(sql = %sql, "Query accepted by guard");
                Verdict::Accepted(AcceptedQuery::new(sql))
            }
            Err((reason, detail)) => {
                warn!(reason = reason.code(), detail = %detail, sql = %sql, "Query rejected by guard");
                Verdict::Rejected(reason)
            }
        }
    }

    fn check(&self, sql: &str) -> Result<(), (RejectReason, String)> {
        let tokens = tokenize(sql);
        let code: Vec<&Token> = tokens.iter().filter(|t| !t.is_comment()).collect();
        let structure = analyze(sql);

        check_select_only(&code, structure.as_ref())?;
        check_single_statement(&tokens, structure.as_ref())?;
        self.check_relations(&code, structure.as_ref())?;
        check_forbidden_keywords(&tokens)?;
        Ok(())
    }

    fn check_relations(
        &self,
        code: &[&Token],
        structure: Option<&Structure>,
    ) -> Result<(), (RejectReason, String)> {
        let mut relations = lexical_relations(code);
        if let Some(s) = structure {
            relations.extend(s.relations.iter().cloned());
        }

        match relations.into_iter().find(|r| !self.schema.is_allowed(r)) {
            Some(table) => Err((RejectReason::TableNotAllowed, table)),
            None => Ok(()),
        }
    }
}

/// Validates with the curated schema's allow-list.
pub fn validate_sql(sql: &str) -> Verdict {
    SqlGuard::default().validate(sql)
}

fn check_select_only(
    code: &[&Token],
    structure: Option<&Structure>,
) -> Result<(), (RejectReason, String)> {
    let first = code.first();
    if !first.is_some_and(|t| t.is_keyword("SELECT") || t.is_keyword("WITH")) {
        let found = first.map_or_else(|| "empty statement".to_string(), |t| t.text.clone());
        return Err((RejectReason::NotSelectOnly, found));
    }
    if let Some(s) = structure {
        if !s.first_is_query {
            return Err((
                RejectReason::NotSelectOnly,
                "statement modifies data".to_string(),
            ));
        }
    }
    Ok(())
}

fn check_single_statement(
    tokens: &[Token],
    structure: Option<&Structure>,
) -> Result<(), (RejectReason, String)> {
    // Only whitespace may follow the separator: no comment, no second `;`.
    if let Some(pos) = tokens.iter().position(|t| t.is_punct(';')) {
        if let Some(next) = tokens.get(pos + 1) {
            return Err((
                RejectReason::MultipleStatements,
                format!("content after ';': {}", next.text),
            ));
        }
    }
    if let Some(s) = structure {
        if s.statement_count > 1 {
            return Err((
                RejectReason::MultipleStatements,
                format!("{} statements", s.statement_count),
            ));
        }
    }
    Ok(())
}

fn check_forbidden_keywords(tokens: &[Token]) -> Result<(), (RejectReason, String)> {
    let hit = |word: &str| {
        FORBIDDEN_KEYWORDS
            .iter()
            .any(|k| k.eq_ignore_ascii_case(word))
    };

    // Words joined across glued comments: `DR/**/OP` reads as DROP to some
    // engines and tools.
    let mut fused: Option<String> = None;
    let mut across_comment = false;

    for token in tokens {
        match token.kind {
            TokenKind::Word => {
                if hit(&token.text) {
                    return Err((RejectReason::ForbiddenKeyword, token.text.to_uppercase()));
                }
                let joined = match fused.take() {
                    Some(prev) if token.glued && across_comment => {
                        let joined = prev + &token.text;
                        if hit(&joined) {
                            return Err((RejectReason::ForbiddenKeyword, joined.to_uppercase()));
                        }
                        joined
                    }
                    _ => token.text.clone(),
                };
                fused = Some(joined);
                across_comment = false;
            }
            TokenKind::Comment => {
                if let Some(word) = token
                    .text
                    .split(|c: char| !(c.is_alphanumeric() || c == '_'))
                    .find(|w| hit(w))
                {
                    return Err((
                        RejectReason::ForbiddenKeyword,
                        format!("{} (in comment)", word.to_uppercase()),
                    ));
                }
                if token.glued && fused.is_some() {
                    across_comment = true;
                } else {
                    fused = None;
                }
            }
            _ => {
                fused = None;
                across_comment = false;
            }
        }
    }
    Ok(())
}

/// Where a paren scope stands relative to its FROM list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum FromState {
    #[default]
    Outside,
    /// Reading table names, joins and comma-separated items.
    Items,
    /// Inside an ON or USING constraint. A comma or JOIN resumes the items.
    Constraint,
}

/// One paren scope of the lexical relation scan.
#[derive(Debug, Default)]
struct Scope {
    selected: bool,
    from: FromState,
    /// CTE names bound by a WITH at this depth.
    ctes: HashSet<String>,
    in_with: bool,
    expect_cte_name: bool,
}

/// Relations named after FROM, JOIN, or a comma inside a FROM list, minus
/// references to a CTE bound in an enclosing scope.
///
/// FROM only counts in a scope that contains a SELECT, which skips forms
/// like `EXTRACT(YEAR FROM date)` and `IS DISTINCT FROM`. A paren directly
/// inside a FROM list (`FROM (t)`, `JOIN ((t))`) continues that list.
fn lexical_relations(code: &[&Token]) -> Vec<String> {
    let mut relations = Vec::new();
    let mut scopes = vec![Scope::default()];

    for (i, token) in code.iter().enumerate() {
        if token.is_punct('(') {
            let mut scope = Scope::default();
            let continues_list = i > 0
                && scopes.last().is_some_and(|s| s.from == FromState::Items)
                && opens_item(code[i - 1]);
            if continues_list {
                scope.selected = true;
                scope.from = FromState::Items;
                relations.extend(relation_at(code, i + 1, &scopes));
            }
            scopes.push(scope);
            continue;
        }
        if token.is_punct(')') {
            if scopes.len() > 1 {
                scopes.pop();
            }
            continue;
        }
        let Some(scope) = scopes.last_mut() else {
            break;
        };

        if scope.in_with {
            if token.is_punct(',') {
                scope.expect_cte_name = true;
                continue;
            }
            if scope.expect_cte_name && token.is_identifier() && !token.is_keyword("RECURSIVE") {
                scope.ctes.insert(token.text.to_lowercase());
                scope.expect_cte_name = false;
                continue;
            }
            if !token.is_keyword("SELECT") {
                continue;
            }
            scope.in_with = false;
        }

        if token.is_keyword("WITH") {
            scope.in_with = true;
            scope.expect_cte_name = true;
        } else if token.is_keyword("SELECT") {
            scope.selected = true;
            scope.from = FromState::Outside;
        } else if token.is_keyword("FROM") {
            let after_distinct = i > 0 && code[i - 1].is_keyword("DISTINCT");
            if scope.selected && !after_distinct {
                scope.from = FromState::Items;
                relations.extend(relation_at(code, i + 1, &scopes));
            }
        } else if token.is_keyword("JOIN") {
            scope.from = FromState::Items;
            relations.extend(relation_at(code, i + 1, &scopes));
        } else if token.is_punct(',') {
            if scope.from != FromState::Outside {
                scope.from = FromState::Items;
                relations.extend(relation_at(code, i + 1, &scopes));
            }
        } else if token.is_keyword("ON") || token.is_keyword("USING") {
            if scope.from != FromState::Outside {
                scope.from = FromState::Constraint;
            }
        } else if CLAUSE_KEYWORDS.iter().any(|k| token.is_keyword(k)) {
            scope.from = FromState::Outside;
        }
    }
    relations
}

/// True when a `(` after `prev` opens a table-list item.
fn opens_item(prev: &Token) -> bool {
    prev.is_keyword("FROM") || prev.is_keyword("JOIN") || prev.is_punct(',') || prev.is_punct('(')
}

/// Reads a possibly qualified relation name starting at `idx`, keeping the
/// last segment. Subqueries yield nothing here, and so does an unqualified
/// name bound by a CTE in one of `scopes`.
fn relation_at(code: &[&Token], idx: usize, scopes: &[Scope]) -> Option<String> {
    let first = code
        .get(idx)
        .filter(|t| t.is_identifier() && !QUERY_STARTERS.iter().any(|k| t.is_keyword(k)))?;
    let mut name = first.text.clone();
    let mut qualified = false;
    let mut i = idx + 1;
    while code.get(i).is_some_and(|t| t.is_punct('.')) {
        match code.get(i + 1).filter(|t| t.is_identifier()) {
            Some(segment) => name = segment.text.clone(),
            None => break,
        }
        qualified = true;
        i += 2;
    }

    let name = name.to_lowercase();
    let bound = !qualified && scopes.iter().any(|s| s.ctes.contains(&name));
    (!bound).then_some(name)
}
