use crate::ast::*;
use crate::error::{ParseError, ParseResult};
use crate::tokenizer::{tokenize, unescape, Token};
use chrono::{NaiveDate, NaiveDateTime};

/// Recursive-descent parser for formulas
pub struct Parser<'src> {
    tokens: Vec<(Token<'src>, std::ops::Range<usize>)>,
    pos: usize,
    source_len: usize,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> ParseResult<Self> {
        Ok(Self {
            tokens: tokenize(source)?,
            pos: 0,
            source_len: source.len(),
        })
    }

    /// Parse a complete formula; trailing tokens are an error
    pub fn parse_formula(&mut self) -> ParseResult<Expr> {
        if self.is_at_end() {
            return Err(ParseError::unexpected_eof(self.source_len));
        }

        let expr = self.parse_expression()?;

        if !self.is_at_end() {
            return Err(ParseError::unexpected_token(
                self.peek_span().start,
                "end of formula",
                Self::format_token(self.peek()),
            ));
        }
        Ok(expr)
    }

    fn parse_expression(&mut self) -> ParseResult<Expr> {
        self.parse_equality_expression()
    }

    /// Parse equality expression (= == !=)
    fn parse_equality_expression(&mut self) -> ParseResult<Expr> {
        let start = self.peek_span().start;
        let mut left = self.parse_comparison_expression()?;

        while let Some(op) = self.match_equality_op() {
            let right = self.parse_comparison_expression()?;
            left = Expr::Binary {
                left: Box::new(left),
                operator: op,
                right: Box::new(right),
                span: Span::new(start, self.last_end()),
            };
        }

        Ok(left)
    }

    /// Parse comparison expression (< > <= >=)
    fn parse_comparison_expression(&mut self) -> ParseResult<Expr> {
        let start = self.peek_span().start;
        let mut left = self.parse_additive_expression()?;

        while let Some(op) = self.match_comparison_op() {
            let right = self.parse_additive_expression()?;
            left = Expr::Binary {
                left: Box::new(left),
                operator: op,
                right: Box::new(right),
                span: Span::new(start, self.last_end()),
            };
        }

        Ok(left)
    }

    /// Parse additive expression (+ -)
    fn parse_additive_expression(&mut self) -> ParseResult<Expr> {
        let start = self.peek_span().start;
        let mut left = self.parse_multiplicative_expression()?;

        while let Some(op) = self.match_additive_op() {
            let right = self.parse_multiplicative_expression()?;
            left = Expr::Binary {
                left: Box::new(left),
                operator: op,
                right: Box::new(right),
                span: Span::new(start, self.last_end()),
            };
        }

        Ok(left)
    }

    /// Parse multiplicative expression (* /)
    fn parse_multiplicative_expression(&mut self) -> ParseResult<Expr> {
        let start = self.peek_span().start;
        let mut left = self.parse_unary_expression()?;

        while let Some(op) = self.match_multiplicative_op() {
            let right = self.parse_unary_expression()?;
            left = Expr::Binary {
                left: Box::new(left),
                operator: op,
                right: Box::new(right),
                span: Span::new(start, self.last_end()),
            };
        }

        Ok(left)
    }

    fn parse_unary_expression(&mut self) -> ParseResult<Expr> {
        let start = self.peek_span().start;
        if self.match_token(Token::Minus) {
            let operand = self.parse_unary_expression()?;
            return Ok(Expr::Unary {
                operator: UnaryOp::Negate,
                operand: Box::new(operand),
                span: Span::new(start, self.last_end()),
            });
        }
        self.parse_primary_expression()
    }

    /// Parse primary expression (literals, function calls, parentheses)
    fn parse_primary_expression(&mut self) -> ParseResult<Expr> {
        let span = self.peek_span();
        let literal_span = Span::new(span.start, span.end);

        match self.peek() {
            Some((Token::Number(n), _)) => {
                let value = n
                    .parse::<f64>()
                    .map_err(|_| ParseError::invalid_syntax(span.start, format!("invalid number {}", n)))?;
                self.advance();
                Ok(Expr::Number {
                    value,
                    span: literal_span,
                })
            }
            Some((Token::String(s), _)) => {
                let value = unescape(s);
                self.advance();
                Ok(Expr::String {
                    value,
                    span: literal_span,
                })
            }
            Some((Token::Date(d), _)) => {
                let value = parse_date_literal(d)
                    .ok_or_else(|| ParseError::invalid_syntax(span.start, format!("invalid date {}", d)))?;
                self.advance();
                Ok(Expr::Date {
                    value,
                    span: literal_span,
                })
            }
            Some((Token::True, _)) => {
                self.advance();
                Ok(Expr::Boolean {
                    value: true,
                    span: literal_span,
                })
            }
            Some((Token::False, _)) => {
                self.advance();
                Ok(Expr::Boolean {
                    value: false,
                    span: literal_span,
                })
            }
            Some((Token::Ident(i), _)) => {
                let name = i.to_string();
                self.advance();
                self.parse_function_call(name, span.start)
            }
            Some((Token::LParen, _)) => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            None => Err(ParseError::unexpected_eof(self.source_len)),
            Some(_) => Err(ParseError::unexpected_token(
                span.start,
                "expression",
                Self::format_token(self.peek()),
            )),
        }
    }

    /// Parse function call: functionName(arg1, arg2, ...)
    fn parse_function_call(&mut self, function: String, start: usize) -> ParseResult<Expr> {
        self.expect(Token::LParen)?;

        let mut arguments = Vec::new();
        while !self.check(Token::RParen) && !self.is_at_end() {
            arguments.push(self.parse_expression()?);

            if !self.match_token(Token::Comma) {
                break;
            }
        }

        self.expect(Token::RParen)?;
        let span = Span::new(start, self.last_end());

        if function == "prop" {
            return match arguments.as_slice() {
                [Expr::String { value, .. }] => Ok(Expr::Prop {
                    name: value.clone(),
                    span,
                }),
                _ => Err(ParseError::invalid_syntax(
                    start,
                    "prop() takes a single quoted property name",
                )),
            };
        }

        Ok(Expr::Call {
            function,
            arguments,
            span,
        })
    }

    fn match_equality_op(&mut self) -> Option<BinaryOp> {
        if self.match_token(Token::Equals) || self.match_token(Token::EqualsEquals) {
            Some(BinaryOp::Equals)
        } else if self.match_token(Token::NotEquals) {
            Some(BinaryOp::NotEquals)
        } else {
            None
        }
    }

    fn match_comparison_op(&mut self) -> Option<BinaryOp> {
        if self.match_token(Token::LessThanEquals) {
            Some(BinaryOp::LessThanOrEqual)
        } else if self.match_token(Token::GreaterThanEquals) {
            Some(BinaryOp::GreaterThanOrEqual)
        } else if self.match_token(Token::LessThan) {
            Some(BinaryOp::LessThan)
        } else if self.match_token(Token::GreaterThan) {
            Some(BinaryOp::GreaterThan)
        } else {
            None
        }
    }

    fn match_additive_op(&mut self) -> Option<BinaryOp> {
        if self.match_token(Token::Plus) {
            Some(BinaryOp::Add)
        } else if self.match_token(Token::Minus) {
            Some(BinaryOp::Subtract)
        } else {
            None
        }
    }

    fn match_multiplicative_op(&mut self) -> Option<BinaryOp> {
        if self.match_token(Token::Star) {
            Some(BinaryOp::Multiply)
        } else if self.match_token(Token::Slash) {
            Some(BinaryOp::Divide)
        } else {
            None
        }
    }

    // Helper methods

    fn peek(&self) -> Option<&(Token<'src>, std::ops::Range<usize>)> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&(Token<'src>, std::ops::Range<usize>)> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn check(&self, token: Token) -> bool {
        if let Some((t, _)) = self.peek() {
            std::mem::discriminant(t) == std::mem::discriminant(&token)
        } else {
            false
        }
    }

    fn match_token(&mut self, token: Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> ParseResult<()> {
        if self.check(token.clone()) {
            self.advance();
            Ok(())
        } else if self.is_at_end() {
            Err(ParseError::unexpected_eof(self.source_len))
        } else {
            Err(ParseError::unexpected_token(
                self.peek_span().start,
                token.to_string(),
                Self::format_token(self.peek()),
            ))
        }
    }

    /// End of the token we just consumed
    fn last_end(&self) -> usize {
        self.tokens
            .get(self.pos.saturating_sub(1))
            .map(|(_, span)| span.end)
            .unwrap_or(0)
    }

    /// Get the span of the next token (the one we're about to consume)
    fn peek_span(&self) -> std::ops::Range<usize> {
        self.tokens
            .get(self.pos)
            .map(|(_, span)| span.clone())
            .unwrap_or(self.source_len..self.source_len)
    }

    fn format_token(token: Option<&(Token, std::ops::Range<usize>)>) -> String {
        match token {
            None => "end of formula".to_string(),
            Some((token, _)) => token.to_string(),
        }
    }
}

/// Parse `2024-01-15`, `2024-01-15T10:30` or `2024-01-15T10:30:00`
pub fn parse_date_literal(text: &str) -> Option<NaiveDateTime> {
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M"))
        .ok()
}

pub fn parse(source: &str) -> ParseResult<Expr> {
    Parser::new(source)?.parse_formula()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_calls() {
        let expr = parse(r#"if(prop("Done"), "yes", concat("no", "!"))"#).unwrap();
        match expr {
            Expr::Call { function, arguments, .. } => {
                assert_eq!(function, "if");
                assert_eq!(arguments.len(), 3);
                assert!(matches!(&arguments[0], Expr::Prop { name, .. } if name == "Done"));
                assert!(matches!(&arguments[2], Expr::Call { function, .. } if function == "concat"));
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        // 1 + 2 * 3 parses as 1 + (2 * 3)
        let expr = parse("1 + 2 * 3").unwrap();
        match expr {
            Expr::Binary { operator, right, .. } => {
                assert_eq!(operator, BinaryOp::Add);
                assert!(matches!(*right, Expr::Binary { operator: BinaryOp::Multiply, .. }));
            }
            other => panic!("expected binary, got {:?}", other),
        }
    }

    #[test]
    fn test_single_equals_is_equality() {
        let expr = parse(r#"prop("Status") = "Done""#).unwrap();
        assert!(matches!(expr, Expr::Binary { operator: BinaryOp::Equals, .. }));
    }

    #[test]
    fn test_unary_minus() {
        let expr = parse("-prop(\"Score\")").unwrap();
        assert!(matches!(expr, Expr::Unary { operator: UnaryOp::Negate, .. }));
    }

    #[test]
    fn test_prop_requires_string_name() {
        assert!(matches!(parse("prop(1)"), Err(ParseError::InvalidSyntax { .. })));
        assert!(matches!(parse("prop()"), Err(ParseError::InvalidSyntax { .. })));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(parse(""), Err(ParseError::UnexpectedEof { .. })));
        assert!(matches!(parse("add(1, 2"), Err(ParseError::UnexpectedEof { .. })));
        assert!(matches!(parse("1 2"), Err(ParseError::UnexpectedToken { pos: 2, .. })));
        assert!(matches!(parse("add(,)"), Err(ParseError::UnexpectedToken { .. })));
    }

    #[test]
    fn test_date_literal() {
        let expr = parse("2024-01-15T10:30").unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert!(matches!(expr, Expr::Date { value, .. } if value == expected));
    }

    #[test]
    fn test_spans_cover_source() {
        let source = "add(1, 2)";
        let expr = parse(source).unwrap();
        assert_eq!(expr.span(), Span::new(0, source.len()));
    }
}
