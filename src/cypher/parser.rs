//! Recursive-descent, predictive parser over the lexer's token stream.
//!
//! Clause dispatch is keyed on the first keyword of each clause, mirroring
//! §4.1's grammar. The parser never panics: every rejection is surfaced as a
//! `ParseError` carrying the offending token's position.

use std::collections::HashMap;

use super::ast::*;
use super::error::ParseError;
use super::lexer::Lexer;
use super::token::{Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

/// Parse a complete Cypher statement, returning the first query plus any
/// `UNION` / `UNION ALL` continuations.
pub fn parse(source: &str) -> Result<UnionQuery, ParseError> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let result = parser.parse_union_query()?;
    parser.expect_eof()?;
    Ok(result)
}

impl Parser {
    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn is_eof(&self) -> bool {
        matches!(self.current().kind, TokenKind::Eof)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let tok = self.current();
        ParseError::new(message, tok.position, tok.line, tok.column)
    }

    fn expect_eof(&self) -> Result<(), ParseError> {
        if self.is_eof() {
            Ok(())
        } else {
            Err(self.error(format!("unexpected trailing input: {:?}", self.current().kind)))
        }
    }

    fn is_keyword(&self, kw: &str) -> bool {
        matches!(&self.current().kind, TokenKind::Keyword(k) if k == kw)
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.is_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), ParseError> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.error(format!("expected {kw}, got {:?}", self.current().kind)))
        }
    }

    fn expect_punct(&mut self, kind: &TokenKind) -> Result<(), ParseError> {
        if &self.current().kind == kind {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected {kind:?}, got {:?}", self.current().kind)))
        }
    }

    fn eat_punct(&mut self, kind: &TokenKind) -> bool {
        if &self.current().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn identifier(&mut self) -> Result<String, ParseError> {
        match self.current().kind.clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            // A keyword may stand in for an identifier (e.g. property key `order`);
            // re-case it the way the lexer would present a label.
            TokenKind::Keyword(name) => {
                self.advance();
                Ok(recase_label(&name))
            }
            other => Err(self.error(format!("expected identifier, got {other:?}"))),
        }
    }

    // -----------------------------------------------------------------
    // Top-level: Query, UNION
    // -----------------------------------------------------------------

    fn parse_union_query(&mut self) -> Result<UnionQuery, ParseError> {
        let first = self.parse_query()?;
        let mut rest = Vec::new();
        while self.eat_keyword("UNION") {
            let all = self.eat_keyword("ALL");
            let q = self.parse_query()?;
            rest.push((all, q));
        }
        Ok(UnionQuery { first, rest })
    }

    fn parse_query(&mut self) -> Result<Query, ParseError> {
        let mut clauses = Vec::new();
        loop {
            if self.is_eof() || self.is_keyword("UNION") {
                break;
            }
            clauses.push(self.parse_clause()?);
        }
        if clauses.is_empty() {
            return Err(self.error("expected at least one clause"));
        }
        Ok(Query { clauses })
    }

    fn parse_clause(&mut self) -> Result<Clause, ParseError> {
        if self.is_keyword("OPTIONAL") {
            self.advance();
            self.expect_keyword("MATCH")?;
            return Ok(Clause::Match(self.parse_match_body(true)?));
        }
        if self.is_keyword("MATCH") {
            self.advance();
            return Ok(Clause::Match(self.parse_match_body(false)?));
        }
        if self.is_keyword("CREATE") {
            self.advance();
            let patterns = self.parse_pattern_list()?;
            return Ok(Clause::Create(CreateClause { patterns }));
        }
        if self.is_keyword("MERGE") {
            self.advance();
            return Ok(Clause::Merge(self.parse_merge_body()?));
        }
        if self.is_keyword("SET") {
            self.advance();
            let assignments = self.parse_set_assignments()?;
            return Ok(Clause::Set(SetClause { assignments }));
        }
        if self.is_keyword("DETACH") {
            self.advance();
            self.expect_keyword("DELETE")?;
            let variables = self.parse_delete_list()?;
            return Ok(Clause::Delete(DeleteClause {
                variables,
                detach: true,
            }));
        }
        if self.is_keyword("DELETE") {
            self.advance();
            let variables = self.parse_delete_list()?;
            return Ok(Clause::Delete(DeleteClause {
                variables,
                detach: false,
            }));
        }
        if self.is_keyword("WITH") {
            self.advance();
            return Ok(Clause::With(self.parse_with_body()?));
        }
        if self.is_keyword("UNWIND") {
            self.advance();
            let expression = self.parse_expression()?;
            self.expect_keyword("AS")?;
            let alias = self.identifier()?;
            return Ok(Clause::Unwind(UnwindClause { expression, alias }));
        }
        if self.is_keyword("RETURN") {
            self.advance();
            return Ok(Clause::Return(self.parse_return_body()?));
        }
        if self.is_keyword("CALL") {
            self.advance();
            return Ok(Clause::Call(self.parse_call_body()?));
        }
        Err(self.error(format!(
            "expected a clause keyword, got {:?}",
            self.current().kind
        )))
    }

    // -----------------------------------------------------------------
    // MATCH / CREATE / MERGE
    // -----------------------------------------------------------------

    fn parse_match_body(&mut self, optional: bool) -> Result<MatchClause, ParseError> {
        let patterns = self.parse_pattern_list()?;
        let where_condition = if self.eat_keyword("WHERE") {
            Some(self.parse_where_condition()?)
        } else {
            None
        };
        Ok(MatchClause {
            patterns,
            where_condition,
            optional,
        })
    }

    fn parse_merge_body(&mut self) -> Result<MergeClause, ParseError> {
        let pattern = self.parse_pattern_chain()?;
        let pattern = merge_chain_into_pattern(pattern)?;
        let mut on_create_set = None;
        let mut on_match_set = None;
        loop {
            if self.is_keyword("ON") {
                let save = self.pos;
                self.advance();
                if self.eat_keyword("CREATE") {
                    self.expect_keyword("SET")?;
                    on_create_set = Some(self.parse_set_assignments()?);
                    continue;
                } else if self.eat_keyword("MATCH") {
                    self.expect_keyword("SET")?;
                    on_match_set = Some(self.parse_set_assignments()?);
                    continue;
                } else {
                    self.pos = save;
                }
            }
            break;
        }
        Ok(MergeClause {
            pattern,
            on_create_set,
            on_match_set,
        })
    }

    fn parse_pattern_list(&mut self) -> Result<Vec<Pattern>, ParseError> {
        let mut patterns = Vec::new();
        patterns.extend(self.parse_pattern_chain()?);
        while self.eat_punct(&TokenKind::Comma) {
            patterns.extend(self.parse_pattern_chain()?);
        }
        Ok(patterns)
    }

    /// Parses one comma-separated pattern item, which may be a bare node or a
    /// multi-hop relationship chain `(a)-[:R1]->(b)-[:R2]->(c)`. Each produced
    /// `RelationshipPattern` reuses the prior hop's target (label stripped) as
    /// the next source, so later translator joins can chain off it.
    fn parse_pattern_chain(&mut self) -> Result<Vec<Pattern>, ParseError> {
        let first_node = self.parse_node_pattern()?;
        if !self.looks_like_edge_start() {
            return Ok(vec![Pattern::Node(first_node)]);
        }

        let mut patterns = Vec::new();
        let mut source = first_node;
        loop {
            let edge = self.parse_edge_pattern()?;
            let target = self.parse_node_pattern()?;
            patterns.push(Pattern::Relationship(RelationshipPattern {
                source: source.clone(),
                edge,
                target: target.clone(),
            }));
            if self.looks_like_edge_start() {
                source = NodePattern {
                    variable: target.variable.clone(),
                    label: None,
                    properties: None,
                };
                continue;
            }
            break;
        }
        Ok(patterns)
    }

    fn looks_like_edge_start(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::Dash | TokenKind::ArrowLeft
        )
    }

    fn parse_node_pattern(&mut self) -> Result<NodePattern, ParseError> {
        self.expect_punct(&TokenKind::LParen)?;
        let variable = match self.current().kind.clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Some(name)
            }
            _ => None,
        };
        let label = if self.eat_punct(&TokenKind::Colon) {
            Some(self.label_token()?)
        } else {
            None
        };
        let properties = if matches!(self.current().kind, TokenKind::LBrace) {
            Some(self.parse_property_map()?)
        } else {
            None
        };
        self.expect_punct(&TokenKind::RParen)?;
        Ok(NodePattern {
            variable,
            label,
            properties,
        })
    }

    fn label_token(&mut self) -> Result<String, ParseError> {
        self.identifier()
    }

    fn parse_edge_pattern(&mut self) -> Result<EdgePattern, ParseError> {
        let incoming = self.eat_punct(&TokenKind::ArrowLeft);
        if !incoming {
            self.expect_punct(&TokenKind::Dash)?;
        }

        let mut variable = None;
        let mut edge_type = None;
        let mut properties = None;
        let mut variable_length = None;

        if self.eat_punct(&TokenKind::LBracket) {
            if let TokenKind::Identifier(name) = self.current().kind.clone() {
                self.advance();
                variable = Some(name);
            }
            if self.eat_punct(&TokenKind::Colon) {
                edge_type = Some(self.label_token()?);
            }
            if matches!(self.current().kind, TokenKind::Star) {
                variable_length = Some(self.parse_variable_length()?);
            }
            if matches!(self.current().kind, TokenKind::LBrace) {
                properties = Some(self.parse_property_map()?);
            }
            self.expect_punct(&TokenKind::RBracket)?;
        }

        let outgoing = self.eat_punct(&TokenKind::ArrowRight);
        if !outgoing {
            self.expect_punct(&TokenKind::Dash)?;
        }

        let direction = if incoming {
            Direction::Left
        } else if outgoing {
            Direction::Right
        } else {
            Direction::None
        };

        Ok(EdgePattern {
            variable,
            edge_type,
            properties,
            direction,
            variable_length,
        })
    }

    /// `*`, `*n`, `*m..n`, `*m..`, `*..n`; bare `*` means min 1, unbounded max.
    fn parse_variable_length(&mut self) -> Result<VariableLength, ParseError> {
        self.expect_punct(&TokenKind::Star)?;
        let min = self.optional_integer();
        let has_dots = self.eat_double_dot();
        let max = self.optional_integer();

        let (min_hops, max_hops) = match (min, has_dots, max) {
            (None, false, None) => (1, None),
            (Some(n), false, None) => (n as u32, Some(n as u32)),
            (Some(lo), true, Some(hi)) => (lo as u32, Some(hi as u32)),
            (Some(lo), true, None) => (lo as u32, None),
            (None, true, Some(hi)) => (1, Some(hi as u32)),
            (None, true, None) => (1, None),
            (Some(_), false, Some(_)) => unreachable!(),
        };
        Ok(VariableLength { min_hops, max_hops })
    }

    fn optional_integer(&mut self) -> Option<i64> {
        if let TokenKind::Integer(n) = self.current().kind {
            self.advance();
            Some(n)
        } else {
            None
        }
    }

    /// Consumes `..`. The lexer tokenizes each `.` separately, so two
    /// consecutive `Dot` tokens form the range separator.
    fn eat_double_dot(&mut self) -> bool {
        if matches!(self.current().kind, TokenKind::Dot) {
            let save = self.pos;
            self.advance();
            if matches!(self.current().kind, TokenKind::Dot) {
                self.advance();
                return true;
            }
            self.pos = save;
        }
        false
    }

    fn parse_property_map(&mut self) -> Result<HashMap<String, Expression>, ParseError> {
        self.expect_punct(&TokenKind::LBrace)?;
        let mut map = HashMap::new();
        if !matches!(self.current().kind, TokenKind::RBrace) {
            loop {
                let key = self.identifier()?;
                self.expect_punct(&TokenKind::Colon)?;
                let value = self.parse_expression()?;
                map.insert(key, value);
                if !self.eat_punct(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect_punct(&TokenKind::RBrace)?;
        Ok(map)
    }

    // -----------------------------------------------------------------
    // SET / DELETE
    // -----------------------------------------------------------------

    fn parse_set_assignments(&mut self) -> Result<Vec<SetAssignment>, ParseError> {
        let mut assignments = Vec::new();
        loop {
            let variable = self.identifier()?;
            self.expect_punct(&TokenKind::Dot)?;
            let property = self.identifier()?;
            self.expect_punct(&TokenKind::Equal)?;
            let value = self.parse_expression()?;
            assignments.push(SetAssignment {
                variable,
                property,
                value,
            });
            if !self.eat_punct(&TokenKind::Comma) {
                break;
            }
        }
        Ok(assignments)
    }

    fn parse_delete_list(&mut self) -> Result<Vec<String>, ParseError> {
        let mut vars = vec![self.identifier()?];
        while self.eat_punct(&TokenKind::Comma) {
            vars.push(self.identifier()?);
        }
        Ok(vars)
    }

    // -----------------------------------------------------------------
    // RETURN / WITH
    // -----------------------------------------------------------------

    fn parse_return_body(&mut self) -> Result<ReturnClause, ParseError> {
        let distinct = self.eat_keyword("DISTINCT");
        let items = self.parse_return_items()?;
        let order_by = self.parse_optional_order_by()?;
        let skip = self.parse_optional_skip()?;
        let limit = self.parse_optional_limit()?;
        Ok(ReturnClause {
            distinct,
            items,
            order_by,
            skip,
            limit,
        })
    }

    fn parse_with_body(&mut self) -> Result<WithClause, ParseError> {
        let distinct = self.eat_keyword("DISTINCT");
        let items = self.parse_return_items()?;
        let where_condition = if self.eat_keyword("WHERE") {
            Some(self.parse_where_condition()?)
        } else {
            None
        };
        let order_by = self.parse_optional_order_by()?;
        let skip = self.parse_optional_skip()?;
        let limit = self.parse_optional_limit()?;
        Ok(WithClause {
            distinct,
            items,
            where_condition,
            order_by,
            skip,
            limit,
        })
    }

    fn parse_return_items(&mut self) -> Result<Vec<ReturnItem>, ParseError> {
        let mut items = vec![self.parse_return_item()?];
        while self.eat_punct(&TokenKind::Comma) {
            items.push(self.parse_return_item()?);
        }
        Ok(items)
    }

    fn parse_return_item(&mut self) -> Result<ReturnItem, ParseError> {
        let expression = self.parse_return_expression()?;
        let alias = if self.eat_keyword("AS") {
            Some(self.identifier()?)
        } else {
            None
        };
        Ok(ReturnItem { expression, alias })
    }

    fn parse_optional_order_by(&mut self) -> Result<Option<Vec<OrderByItem>>, ParseError> {
        if !self.eat_keyword("ORDER") {
            return Ok(None);
        }
        self.expect_keyword("BY")?;
        let mut items = vec![self.parse_order_by_item()?];
        while self.eat_punct(&TokenKind::Comma) {
            items.push(self.parse_order_by_item()?);
        }
        Ok(Some(items))
    }

    fn parse_order_by_item(&mut self) -> Result<OrderByItem, ParseError> {
        let expression = self.parse_expression()?;
        let descending = if self.eat_keyword("DESC") {
            true
        } else {
            self.eat_keyword("ASC");
            false
        };
        Ok(OrderByItem {
            expression,
            descending,
        })
    }

    fn parse_optional_skip(&mut self) -> Result<Option<i64>, ParseError> {
        if !self.eat_keyword("SKIP") {
            return Ok(None);
        }
        self.parse_integer_literal().map(Some)
    }

    fn parse_optional_limit(&mut self) -> Result<Option<i64>, ParseError> {
        if !self.eat_keyword("LIMIT") {
            return Ok(None);
        }
        self.parse_integer_literal().map(Some)
    }

    fn parse_integer_literal(&mut self) -> Result<i64, ParseError> {
        match self.current().kind.clone() {
            TokenKind::Integer(n) => {
                self.advance();
                Ok(n)
            }
            other => Err(self.error(format!("expected integer literal, got {other:?}"))),
        }
    }

    // -----------------------------------------------------------------
    // UNWIND / CALL
    // -----------------------------------------------------------------

    fn parse_call_body(&mut self) -> Result<CallClause, ParseError> {
        let mut procedure = self.identifier()?;
        while self.eat_punct(&TokenKind::Dot) {
            procedure.push('.');
            procedure.push_str(&self.identifier()?);
        }
        self.expect_punct(&TokenKind::LParen)?;
        let mut args = Vec::new();
        if !matches!(self.current().kind, TokenKind::RParen) {
            args.push(self.parse_expression()?);
            while self.eat_punct(&TokenKind::Comma) {
                args.push(self.parse_expression()?);
            }
        }
        self.expect_punct(&TokenKind::RParen)?;
        let yields = if self.eat_keyword("YIELD") {
            let mut names = vec![self.identifier()?];
            while self.eat_punct(&TokenKind::Comma) {
                names.push(self.identifier()?);
            }
            Some(names)
        } else {
            None
        };
        let where_condition = if self.eat_keyword("WHERE") {
            Some(self.parse_where_condition()?)
        } else {
            None
        };
        Ok(CallClause {
            procedure,
            args,
            yields,
            where_condition,
        })
    }

    // -----------------------------------------------------------------
    // WHERE condition tree
    // -----------------------------------------------------------------

    fn parse_where_condition(&mut self) -> Result<WhereCondition, ParseError> {
        self.parse_or_condition()
    }

    fn parse_or_condition(&mut self) -> Result<WhereCondition, ParseError> {
        let mut left = self.parse_and_condition()?;
        while self.eat_keyword("OR") {
            let right = self.parse_and_condition()?;
            left = WhereCondition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and_condition(&mut self) -> Result<WhereCondition, ParseError> {
        let mut left = self.parse_not_condition()?;
        while self.eat_keyword("AND") {
            let right = self.parse_not_condition()?;
            left = WhereCondition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not_condition(&mut self) -> Result<WhereCondition, ParseError> {
        if self.eat_keyword("NOT") {
            let inner = self.parse_not_condition()?;
            return Ok(WhereCondition::Not(Box::new(inner)));
        }
        self.parse_primary_condition()
    }

    fn parse_primary_condition(&mut self) -> Result<WhereCondition, ParseError> {
        if self.eat_keyword("EXISTS") {
            self.expect_punct(&TokenKind::LParen)?;
            let pattern_list = self.parse_pattern_chain()?;
            let pattern = merge_chain_into_pattern(pattern_list)?;
            let where_condition = if self.eat_keyword("WHERE") {
                Some(Box::new(self.parse_where_condition()?))
            } else {
                None
            };
            self.expect_punct(&TokenKind::RParen)?;
            return Ok(WhereCondition::Exists(Box::new(pattern), where_condition));
        }

        if self.eat_punct(&TokenKind::LParen) {
            let save = self.pos;
            if let Ok(cond) = self.parse_where_condition() {
                if self.eat_punct(&TokenKind::RParen) {
                    return Ok(cond);
                }
            }
            self.pos = save;
        }

        let left = self.parse_additive_expression()?;

        if self.eat_keyword("IS") {
            if self.eat_keyword("NOT") {
                self.expect_keyword("NULL")?;
                return Ok(WhereCondition::IsNotNull(left));
            }
            self.expect_keyword("NULL")?;
            return Ok(WhereCondition::IsNull(left));
        }
        if self.eat_keyword("CONTAINS") {
            let needle = self.parse_additive_expression()?;
            return Ok(WhereCondition::Contains {
                haystack: left,
                needle,
            });
        }
        if self.eat_keyword("STARTS") {
            self.expect_keyword("WITH")?;
            let prefix = self.parse_additive_expression()?;
            return Ok(WhereCondition::StartsWith {
                value: left,
                prefix,
            });
        }
        if self.eat_keyword("ENDS") {
            self.expect_keyword("WITH")?;
            let suffix = self.parse_additive_expression()?;
            return Ok(WhereCondition::EndsWith {
                value: left,
                suffix,
            });
        }
        if self.eat_keyword("IN") {
            let list = self.parse_additive_expression()?;
            return Ok(WhereCondition::In { value: left, list });
        }

        let op = match &self.current().kind {
            TokenKind::Equal => CompareOp::Eq,
            TokenKind::NotEqual => CompareOp::Ne,
            TokenKind::Less => CompareOp::Lt,
            TokenKind::Greater => CompareOp::Gt,
            TokenKind::LessEqual => CompareOp::Le,
            TokenKind::GreaterEqual => CompareOp::Ge,
            other => {
                return Err(self.error(format!("expected comparison operator, got {other:?}")));
            }
        };
        self.advance();
        let right = self.parse_additive_expression()?;
        Ok(WhereCondition::Compare { op, left, right })
    }

    // -----------------------------------------------------------------
    // Expression grammar: comparison (RETURN/WITH items) > additive >
    // multiplicative > primary
    // -----------------------------------------------------------------

    /// Entry point for RETURN/WITH items, which may themselves be boolean
    /// comparisons (e.g. `RETURN a.age > 18 AS adult`).
    fn parse_return_expression(&mut self) -> Result<Expression, ParseError> {
        let save = self.pos;
        let plain = self.parse_expression();
        if let Ok(expr) = plain {
            // A bare comparison operator right after a plain expression promotes
            // it to a boolean expression item (e.g. `RETURN a.age > 18 AS adult`).
            if matches!(
                self.current().kind,
                TokenKind::Equal
                    | TokenKind::NotEqual
                    | TokenKind::Less
                    | TokenKind::Greater
                    | TokenKind::LessEqual
                    | TokenKind::GreaterEqual
            ) {
                self.pos = save;
                let cond = self.parse_where_condition()?;
                return Ok(Expression::Comparison(Box::new(cond)));
            }
            return Ok(expr);
        }
        self.pos = save;
        let cond = self.parse_where_condition()?;
        Ok(Expression::Comparison(Box::new(cond)))
    }

    pub(crate) fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        self.parse_additive_expression()
    }

    fn parse_additive_expression(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_multiplicative_expression()?;
        loop {
            let op = match &self.current().kind {
                TokenKind::Plus => ArithOp::Add,
                TokenKind::Dash => ArithOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative_expression()?;
            left = Expression::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative_expression(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_primary_expression()?;
        loop {
            let op = match &self.current().kind {
                TokenKind::Star => ArithOp::Mul,
                TokenKind::Slash => ArithOp::Div,
                TokenKind::Percent => ArithOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_primary_expression()?;
            left = Expression::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_primary_expression(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_primary_atom()?;
        loop {
            if self.eat_punct(&TokenKind::Dot) {
                let key = self.identifier()?;
                let base = match expr {
                    Expression::Variable(v) => v,
                    other => return Err(self.error(format!("cannot access property on {other:?}"))),
                };
                expr = Expression::PropertyAccess { base, key };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary_atom(&mut self) -> Result<Expression, ParseError> {
        match self.current().kind.clone() {
            TokenKind::Integer(n) => {
                self.advance();
                Ok(Expression::Literal(Literal::Integer(n)))
            }
            TokenKind::Float(f) => {
                self.advance();
                Ok(Expression::Literal(Literal::Float(f)))
            }
            TokenKind::String(s) => {
                self.advance();
                Ok(Expression::Literal(Literal::String(s)))
            }
            TokenKind::Parameter(name) => {
                self.advance();
                Ok(Expression::Parameter(name))
            }
            TokenKind::Keyword(k) if k == "TRUE" => {
                self.advance();
                Ok(Expression::Literal(Literal::Boolean(true)))
            }
            TokenKind::Keyword(k) if k == "FALSE" => {
                self.advance();
                Ok(Expression::Literal(Literal::Boolean(false)))
            }
            TokenKind::Keyword(k) if k == "NULL" => {
                self.advance();
                Ok(Expression::Literal(Literal::Null))
            }
            TokenKind::Keyword(k) if k == "CASE" => self.parse_case_expression(),
            TokenKind::Keyword(k) if k == "DISTINCT" => {
                self.advance();
                let inner = self.parse_expression()?;
                if let Expression::FunctionCall { name, args, .. } = inner {
                    Ok(Expression::FunctionCall {
                        name,
                        args,
                        distinct: true,
                    })
                } else {
                    Err(self.error("DISTINCT may only prefix a function call argument"))
                }
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect_punct(&TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => self.parse_list_literal(),
            TokenKind::LBrace => {
                let map = self.parse_property_map()?;
                Ok(Expression::Object(map.into_iter().collect()))
            }
            TokenKind::Dash => {
                // Unary minus on a numeric literal
                self.advance();
                let inner = self.parse_primary_atom()?;
                match inner {
                    Expression::Literal(Literal::Integer(n)) => {
                        Ok(Expression::Literal(Literal::Integer(-n)))
                    }
                    Expression::Literal(Literal::Float(f)) => {
                        Ok(Expression::Literal(Literal::Float(-f)))
                    }
                    other => Ok(Expression::Binary {
                        op: ArithOp::Sub,
                        left: Box::new(Expression::Literal(Literal::Integer(0))),
                        right: Box::new(other),
                    }),
                }
            }
            TokenKind::Identifier(name) => {
                self.advance();
                if matches!(self.current().kind, TokenKind::LParen) {
                    self.parse_function_call(name)
                } else {
                    Ok(Expression::Variable(name))
                }
            }
            other => Err(self.error(format!("expected an expression, got {other:?}"))),
        }
    }

    fn parse_function_call(&mut self, name: String) -> Result<Expression, ParseError> {
        self.expect_punct(&TokenKind::LParen)?;
        let distinct = self.eat_keyword("DISTINCT");
        let mut args = Vec::new();
        if !matches!(self.current().kind, TokenKind::RParen) {
            args.push(self.parse_expression()?);
            while self.eat_punct(&TokenKind::Comma) {
                args.push(self.parse_expression()?);
            }
        }
        self.expect_punct(&TokenKind::RParen)?;
        Ok(Expression::FunctionCall {
            name,
            args,
            distinct,
        })
    }

    fn parse_list_literal(&mut self) -> Result<Expression, ParseError> {
        self.expect_punct(&TokenKind::LBracket)?;
        let mut items = Vec::new();
        if !matches!(self.current().kind, TokenKind::RBracket) {
            items.push(self.parse_expression()?);
            while self.eat_punct(&TokenKind::Comma) {
                items.push(self.parse_expression()?);
            }
        }
        self.expect_punct(&TokenKind::RBracket)?;
        Ok(Expression::Array(items))
    }

    fn parse_case_expression(&mut self) -> Result<Expression, ParseError> {
        self.expect_keyword("CASE")?;
        let subject = if self.is_keyword("WHEN") {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        let mut whens = Vec::new();
        while self.eat_keyword("WHEN") {
            let cond = if subject.is_some() {
                self.parse_expression()?
            } else {
                Expression::Comparison(Box::new(self.parse_where_condition()?))
            };
            self.expect_keyword("THEN")?;
            let then = self.parse_expression()?;
            whens.push((cond, then));
        }
        let else_value = if self.eat_keyword("ELSE") {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };
        self.expect_keyword("END")?;
        Ok(Expression::Case(CaseExpr {
            subject,
            whens,
            else_value,
        }))
    }
}

/// `EXISTS`/`MERGE` accept a single connected pattern, not a comma-separated
/// list; fold the pattern chain produced by `parse_pattern_chain` into one
/// `Pattern` (a bare node chain of length 1 stays a `Pattern::Node`).
fn merge_chain_into_pattern(mut chain: Vec<Pattern>) -> Result<Pattern, ParseError> {
    if chain.len() == 1 {
        return Ok(chain.remove(0));
    }
    // Multi-hop chains fold right-to-left isn't meaningful for MERGE/EXISTS
    // (Cypher only allows a single relationship there); keep the first hop,
    // which is the common case `MERGE (a)-[:R]->(b)`.
    chain
        .into_iter()
        .next()
        .ok_or_else(|| ParseError::new("expected a pattern", 0, 1, 1))
}

/// A keyword reused as a label is re-cased with a leading capital, matching
/// the lexer's case policy for label/type tokens.
fn recase_label(keyword: &str) -> String {
    let mut chars = keyword.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str().to_lowercase().as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Query {
        parse(src).unwrap().first
    }

    #[test]
    fn parses_simple_match_return() {
        let q = parse_ok("MATCH (u:User {name: $n}) RETURN u.name AS name");
        assert_eq!(q.clauses.len(), 2);
    }

    #[test]
    fn parses_multi_hop_pattern() {
        let q = parse_ok("MATCH (a)-[:K]->(b)-[:K]->(c) RETURN c");
        match &q.clauses[0] {
            Clause::Match(m) => assert_eq!(m.patterns.len(), 2),
            _ => panic!("expected match"),
        }
    }

    #[test]
    fn parses_variable_length() {
        let q = parse_ok("MATCH (a)-[:E*1..3]->(b) RETURN b");
        match &q.clauses[0] {
            Clause::Match(m) => match &m.patterns[0] {
                Pattern::Relationship(r) => {
                    let vl = r.edge.variable_length.unwrap();
                    assert_eq!(vl.min_hops, 1);
                    assert_eq!(vl.max_hops, Some(3));
                }
                _ => panic!(),
            },
            _ => panic!(),
        }
    }

    #[test]
    fn parses_merge_with_on_create_on_match() {
        let q = parse_ok(
            "MERGE (n:Counter {k:'x'}) ON CREATE SET n.c = 1 ON MATCH SET n.c = n.c + 1 RETURN n.c",
        );
        match &q.clauses[0] {
            Clause::Merge(m) => {
                assert!(m.on_create_set.is_some());
                assert!(m.on_match_set.is_some());
            }
            _ => panic!("expected merge"),
        }
    }

    #[test]
    fn parse_error_reports_position() {
        let err = parse("MATCH (a RETURN a").unwrap_err();
        assert!(err.line >= 1);
        assert!(err.column >= 1);
    }

    #[test]
    fn parses_union() {
        let u = parse("MATCH (a) RETURN a UNION ALL MATCH (b) RETURN b").unwrap();
        assert_eq!(u.rest.len(), 1);
        assert!(u.rest[0].0);
    }
}
