use std::fmt;

use chumsky::{input::ValueInput, prelude::*};
use shared::error::ExecError;

use super::lexer::{lexer, Span, Spanned, Token};

/// Bound on both bracket nesting and tree depth. The evaluator recurses over
/// the tree, so this also bounds evaluation stack use.
pub(crate) const MAX_DEPTH: usize = 64;

const TOO_DEEP: &str = "expression nested too deeply";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Negate,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    StrictEq,
    StrictNe,
    LooseEq,
    LooseNe,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Undefined,
    Array(Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Call {
        callee: String,
        args: Vec<Expr>,
    },
    New {
        constructor: String,
        args: Vec<Expr>,
    },
    Identifier(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Stmt {
    Expr(Expr),
    Throw(Expr),
}

pub(crate) fn parse(source: &str) -> Result<Vec<Stmt>, ExecError> {
    let tokens = lexer().parse(source).into_result().map_err(first_error)?;
    check_nesting(&tokens)?;

    let end = source.len();
    let statements = program()
        .parse(
            tokens
                .as_slice()
                .map((end..end).into(), |(token, span)| (token, span)),
        )
        .into_result()
        .map_err(first_error)?;

    statements
        .into_iter()
        .map(|(stmt, depth, span)| {
            if depth > MAX_DEPTH {
                Err(ExecError::parse(span.start, TOO_DEEP))
            } else {
                Ok(stmt)
            }
        })
        .collect()
}

fn first_error<T: fmt::Display>(errors: Vec<Rich<'_, T, Span>>) -> ExecError {
    match errors.into_iter().next() {
        Some(err) => ExecError::parse(err.span().start, err.reason().to_string()),
        None => ExecError::parse(0, "invalid script"),
    }
}

/// Rejects bracket nesting past [`MAX_DEPTH`] before the recursive parser
/// sees it.
fn check_nesting(tokens: &[Spanned<Token>]) -> Result<(), ExecError> {
    let mut open = 0usize;
    for (token, span) in tokens {
        match token {
            Token::Punct("(" | "[") => {
                open += 1;
                if open > MAX_DEPTH {
                    return Err(ExecError::parse(span.start, TOO_DEEP));
                }
            }
            Token::Punct(")" | "]") => open = open.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

/// An expression with its tree depth. A tree that would grow past
/// [`MAX_DEPTH`] collapses into a marker node so it is never built.
#[derive(Debug, Clone)]
struct Node {
    expr: Expr,
    depth: usize,
}

impl Node {
    fn leaf(expr: Expr) -> Self {
        Self { expr, depth: 1 }
    }

    fn nested(depth: usize, build: impl FnOnce() -> Expr) -> Self {
        if depth > MAX_DEPTH {
            Self {
                expr: Expr::Undefined,
                depth: MAX_DEPTH + 1,
            }
        } else {
            Self {
                expr: build(),
                depth,
            }
        }
    }

    fn wrap(self, build: impl FnOnce(Box<Expr>) -> Expr) -> Self {
        let expr = self.expr;
        Self::nested(self.depth + 1, || build(Box::new(expr)))
    }

    fn join(self, right: Node, build: impl FnOnce(Box<Expr>, Box<Expr>) -> Expr) -> Self {
        let depth = self.depth.max(right.depth) + 1;
        let (left, right) = (self.expr, right.expr);
        Self::nested(depth, || build(Box::new(left), Box::new(right)))
    }

    fn branch(children: Vec<Node>, build: impl FnOnce(Vec<Expr>) -> Expr) -> Self {
        let depth = children.iter().map(|child| child.depth).max().unwrap_or(0) + 1;
        Self::nested(depth, || build(children.into_iter().map(|child| child.expr).collect()))
    }
}

type ParseError<'tokens> = extra::Err<Rich<'tokens, Token, Span>>;

fn punct<'tokens, I>(p: &'static str) -> impl Parser<'tokens, I, Token, ParseError<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    just(Token::Punct(p))
}

fn keyword<'tokens, I>(word: &'static str) -> impl Parser<'tokens, I, Token, ParseError<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    just(Token::Ident(word.to_string()))
}

fn is_reserved(name: &str) -> bool {
    matches!(
        name,
        "true" | "false" | "null" | "undefined" | "new" | "throw"
    )
}

/// Statements separated by `;`, each paired with its tree depth and span.
fn program<'tokens, I>() -> impl Parser<'tokens, I, Vec<(Stmt, usize, Span)>, ParseError<'tokens>>
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    let statement = keyword("throw")
        .or_not()
        .then(expression())
        .map_with(|(thrown, node), e| {
            let stmt = match thrown {
                Some(_) => Stmt::Throw(node.expr),
                None => Stmt::Expr(node.expr),
            };
            (stmt, node.depth, e.span())
        });

    statement
        .separated_by(punct(";").repeated().at_least(1))
        .allow_leading()
        .allow_trailing()
        .collect::<Vec<_>>()
        .then_ignore(end())
}

fn expression<'tokens, I>() -> impl Parser<'tokens, I, Node, ParseError<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    recursive(|expr| {
        let name = select! { Token::Ident(name) if !is_reserved(&name) => name };
        let args = expr
            .clone()
            .separated_by(punct(","))
            .collect::<Vec<Node>>()
            .delimited_by(punct("("), punct(")"));

        let literal = select! {
            Token::Number(n) => Expr::Number(n),
            Token::Str(s) => Expr::Str(s),
            Token::Ident(word) if word == "true" => Expr::Bool(true),
            Token::Ident(word) if word == "false" => Expr::Bool(false),
            Token::Ident(word) if word == "null" => Expr::Null,
            Token::Ident(word) if word == "undefined" => Expr::Undefined,
        }
        .map(Node::leaf);

        let array = expr
            .clone()
            .separated_by(punct(","))
            .collect::<Vec<Node>>()
            .delimited_by(punct("["), punct("]"))
            .map(|items| Node::branch(items, Expr::Array));

        let construct = keyword("new")
            .ignore_then(name.clone())
            .then(args.clone())
            .map(|(constructor, args)| {
                Node::branch(args, |args| Expr::New { constructor, args })
            });

        let call_or_name = name.then(args.or_not()).map(|(callee, args)| match args {
            Some(args) => Node::branch(args, |args| Expr::Call { callee, args }),
            None => Node::leaf(Expr::Identifier(callee)),
        });

        let group = expr.delimited_by(punct("("), punct(")"));

        let atom = choice((literal, array, construct, call_or_name, group));

        let unary = choice((
            punct("-").to(UnaryOp::Negate),
            punct("+").to(UnaryOp::Plus),
            punct("!").to(UnaryOp::Not),
        ))
        .repeated()
        .foldr(atom, |op, operand: Node| {
            operand.wrap(|inner| Expr::Unary(op, inner))
        })
        .boxed();

        let product = unary.clone().foldl(
            choice((
                punct("*").to(BinaryOp::Mul),
                punct("/").to(BinaryOp::Div),
                punct("%").to(BinaryOp::Rem),
            ))
            .then(unary)
            .repeated(),
            binary,
        );

        let sum = product.clone().foldl(
            choice((
                punct("+").to(BinaryOp::Add),
                punct("-").to(BinaryOp::Sub),
            ))
            .then(product)
            .repeated(),
            binary,
        );

        let comparison = sum.clone().foldl(
            choice((
                punct("<=").to(BinaryOp::Le),
                punct(">=").to(BinaryOp::Ge),
                punct("<").to(BinaryOp::Lt),
                punct(">").to(BinaryOp::Gt),
            ))
            .then(sum)
            .repeated(),
            binary,
        )
        .boxed();

        let equality = comparison.clone().foldl(
            choice((
                punct("===").to(BinaryOp::StrictEq),
                punct("!==").to(BinaryOp::StrictNe),
                punct("==").to(BinaryOp::LooseEq),
                punct("!=").to(BinaryOp::LooseNe),
            ))
            .then(comparison)
            .repeated(),
            binary,
        );

        let and = equality
            .clone()
            .foldl(punct("&&").ignore_then(equality).repeated(), |left, right| {
                left.join(right, Expr::And)
            });

        and.clone()
            .foldl(punct("||").ignore_then(and).repeated(), |left, right| {
                left.join(right, Expr::Or)
            })
    })
}

fn binary(left: Node, (op, right): (BinaryOp, Node)) -> Node {
    left.join(right, |l, r| Expr::Binary(op, l, r))
}
