use std::fmt;

use chumsky::prelude::*;

pub(crate) type Span = SimpleSpan;
pub(crate) type Spanned<T> = (T, Span);

type LexError<'src> = extra::Err<Rich<'src, char, Span>>;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Punct(&'static str),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::Str(_) => f.write_str("string"),
            Token::Ident(name) => f.write_str(name),
            Token::Punct(p) => f.write_str(p),
        }
    }
}

pub(crate) fn lexer<'src>() -> impl Parser<'src, &'src str, Vec<Spanned<Token>>, LexError<'src>> {
    let exponent = one_of("eE")
        .then(one_of("+-").or_not())
        .then(text::digits(10));
    let number = choice((
        text::digits(10)
            .then(just('.').then(text::digits(10).or_not()).or_not())
            .ignored(),
        just('.').then(text::digits(10)).ignored(),
    ))
    .then(exponent.or_not())
    .to_slice()
    .try_map(|raw: &str, span| {
        raw.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| Rich::custom(span, "invalid number literal"))
    });

    let strings = choice((string('"'), string('\''), string('`'))).map(Token::Str);

    let ident = any()
        .filter(|c: &char| is_ident_start(*c))
        .then(any().filter(|c: &char| is_ident_continue(*c)).repeated())
        .to_slice()
        .map(|name: &str| Token::Ident(name.to_string()));

    // Longest first so `===` wins over `==`.
    let compound = choice((
        just("===").to("==="),
        just("!==").to("!=="),
        just("==").to("=="),
        just("!=").to("!="),
        just("<=").to("<="),
        just(">=").to(">="),
        just("&&").to("&&"),
        just("||").to("||"),
    ));
    let single = choice((
        just("<").to("<"),
        just(">").to(">"),
        just("+").to("+"),
        just("-").to("-"),
        just("*").to("*"),
        just("/").to("/"),
        just("%").to("%"),
        just("!").to("!"),
        just("(").to("("),
        just(")").to(")"),
        just("[").to("["),
        just("]").to("]"),
        just(",").to(","),
        just(";").to(";"),
    ));
    let punct = compound.or(single).map(Token::Punct);

    let comment = just("//")
        .then(any().and_is(just('\n').not()).repeated())
        .padded();

    choice((number, strings, ident, punct))
        .map_with(|token, e| (token, e.span()))
        .padded_by(comment.repeated())
        .padded()
        .repeated()
        .collect()
        .then_ignore(end())
}

fn string<'src>(quote: char) -> impl Parser<'src, &'src str, String, LexError<'src>> + Clone {
    let unicode = just('u').ignore_then(
        any()
            .filter(|c: &char| c.is_ascii_hexdigit())
            .repeated()
            .exactly(4)
            .to_slice()
            .try_map(|hex: &str, span| {
                u32::from_str_radix(hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| Rich::custom(span, "invalid unicode escape"))
            }),
    );
    let escape = just('\\').ignore_then(choice((
        just('n').to('\n'),
        just('t').to('\t'),
        just('r').to('\r'),
        just('0').to('\0'),
        unicode,
        any().filter(|c: &char| *c != 'u'),
    )));
    // Only template strings may span lines.
    let plain = any().filter(move |c: &char| {
        *c != quote && *c != '\\' && (quote == '`' || *c != '\n')
    });

    just(quote)
        .ignore_then(choice((escape, plain)).repeated().collect::<String>())
        .then_ignore(just(quote))
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}
