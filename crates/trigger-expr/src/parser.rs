use winnow::combinator::{alt, cut_err, opt, separated};
use winnow::error::{StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::literal;

use crate::ast::{BinOp, Expr, FieldRef};
use crate::parse_utils::{ident, kw, number_literal, quoted_string, ws_skip};
use crate::ExprError;

/// Parse a complete expression, requiring the whole input to be consumed.
pub fn parse(input: &str) -> Result<Expr, ExprError> {
    let mut cursor = input;
    let expr = or_expr
        .parse_next(&mut cursor)
        .map_err(|e| ExprError::UnsupportedSyntax(e.to_string()))?;
    ws_skip
        .parse_next(&mut cursor)
        .map_err(|e| ExprError::UnsupportedSyntax(e.to_string()))?;
    if !cursor.is_empty() {
        return Err(ExprError::UnsupportedSyntax(format!(
            "unexpected trailing input: {cursor:?}"
        )));
    }
    Ok(expr)
}

// ---------------------------------------------------------------------------
// Precedence levels (lowest to highest): or, and, cmp, add, mul, unary, atom
// ---------------------------------------------------------------------------

fn or_expr(input: &mut &str) -> ModalResult<Expr> {
    let mut left = and_expr.parse_next(input)?;
    loop {
        ws_skip.parse_next(input)?;
        if opt(kw("or")).parse_next(input)?.is_some() {
            ws_skip.parse_next(input)?;
            let right = cut_err(and_expr).parse_next(input)?;
            left = Expr::BinOp {
                op: BinOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        } else {
            break;
        }
    }
    Ok(left)
}

fn and_expr(input: &mut &str) -> ModalResult<Expr> {
    let mut left = cmp_expr.parse_next(input)?;
    loop {
        ws_skip.parse_next(input)?;
        if opt(kw("and")).parse_next(input)?.is_some() {
            ws_skip.parse_next(input)?;
            let right = cut_err(cmp_expr).parse_next(input)?;
            left = Expr::BinOp {
                op: BinOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        } else {
            break;
        }
    }
    Ok(left)
}

fn cmp_expr(input: &mut &str) -> ModalResult<Expr> {
    let left = add_expr.parse_next(input)?;
    ws_skip.parse_next(input)?;

    if opt((kw("not"), ws_skip, kw("in")))
        .parse_next(input)?
        .is_some()
    {
        ws_skip.parse_next(input)?;
        let list = cut_err(list_value).parse_next(input)?;
        return Ok(Expr::InList {
            expr: Box::new(left),
            list: Box::new(list),
            negated: true,
        });
    }

    if opt(kw("in")).parse_next(input)?.is_some() {
        ws_skip.parse_next(input)?;
        let list = cut_err(list_value).parse_next(input)?;
        return Ok(Expr::InList {
            expr: Box::new(left),
            list: Box::new(list),
            negated: false,
        });
    }

    if let Some(op) = opt(cmp_op).parse_next(input)? {
        ws_skip.parse_next(input)?;
        let right = cut_err(add_expr).parse_next(input)?;
        return Ok(Expr::BinOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        });
    }

    Ok(left)
}

/// The right-hand side of `in`/`not in`: a bracketed list literal or a
/// field reference holding a list value.
fn list_value(input: &mut &str) -> ModalResult<Expr> {
    alt((list_lit, field_ref)).parse_next(input)
}

fn cmp_op(input: &mut &str) -> ModalResult<BinOp> {
    alt((
        literal("==").value(BinOp::Eq),
        literal("!=").value(BinOp::Ne),
        literal("<=").value(BinOp::Le),
        literal(">=").value(BinOp::Ge),
        literal("<").value(BinOp::Lt),
        literal(">").value(BinOp::Gt),
    ))
    .parse_next(input)
}

fn add_expr(input: &mut &str) -> ModalResult<Expr> {
    let mut left = mul_expr.parse_next(input)?;
    loop {
        ws_skip.parse_next(input)?;
        let op = opt(alt((
            literal("+").value(BinOp::Add),
            literal("-").value(BinOp::Sub),
        )))
        .parse_next(input)?;
        if let Some(op) = op {
            ws_skip.parse_next(input)?;
            let right = cut_err(mul_expr).parse_next(input)?;
            left = Expr::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        } else {
            break;
        }
    }
    Ok(left)
}

fn mul_expr(input: &mut &str) -> ModalResult<Expr> {
    let mut left = unary_expr.parse_next(input)?;
    loop {
        ws_skip.parse_next(input)?;
        let op = opt(alt((
            literal("*").value(BinOp::Mul),
            literal("/").value(BinOp::Div),
            literal("%").value(BinOp::Mod),
        )))
        .parse_next(input)?;
        if let Some(op) = op {
            ws_skip.parse_next(input)?;
            let right = cut_err(unary_expr).parse_next(input)?;
            left = Expr::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        } else {
            break;
        }
    }
    Ok(left)
}

fn unary_expr(input: &mut &str) -> ModalResult<Expr> {
    if opt(kw("not")).parse_next(input)?.is_some() {
        ws_skip.parse_next(input)?;
        let inner = unary_expr.parse_next(input)?;
        return Ok(Expr::Not(Box::new(inner)));
    }
    if opt(literal("-")).parse_next(input)?.is_some() {
        ws_skip.parse_next(input)?;
        let inner = primary.parse_next(input)?;
        return Ok(Expr::Neg(Box::new(inner)));
    }
    primary.parse_next(input)
}

fn primary(input: &mut &str) -> ModalResult<Expr> {
    alt((
        number_literal.map(Expr::Number),
        quoted_string.map(Expr::StringLit),
        kw("true").map(|_| Expr::Bool(true)),
        kw("false").map(|_| Expr::Bool(false)),
        list_lit,
        paren_expr,
        field_ref,
    ))
    .context(StrContext::Expected(StrContextValue::Description(
        "expression",
    )))
    .parse_next(input)
}

fn list_lit(input: &mut &str) -> ModalResult<Expr> {
    literal("[").parse_next(input)?;
    ws_skip.parse_next(input)?;
    if opt(literal("]")).parse_next(input)?.is_some() {
        return Ok(Expr::ListLit(vec![]));
    }
    let items: Vec<Expr> =
        separated(1.., (ws_skip, or_expr).map(|(_, e)| e), literal(",")).parse_next(input)?;
    ws_skip.parse_next(input)?;
    cut_err(literal("]")).parse_next(input)?;
    Ok(Expr::ListLit(items))
}

fn paren_expr(input: &mut &str) -> ModalResult<Expr> {
    literal("(").parse_next(input)?;
    ws_skip.parse_next(input)?;
    let inner = cut_err(or_expr).parse_next(input)?;
    ws_skip.parse_next(input)?;
    cut_err(literal(")")).parse_next(input)?;
    Ok(inner)
}

/// Parse an ident-based primary: either a bare field name or bracket
/// notation. There are no function calls or qualified names — the
/// restricted language has no namespace to qualify into.
fn field_ref(input: &mut &str) -> ModalResult<Expr> {
    let first = ident.parse_next(input)?;
    ws_skip.parse_next(input)?;

    if opt(literal("[")).parse_next(input)?.is_some() {
        ws_skip.parse_next(input)?;
        let key = cut_err(quoted_string).parse_next(input)?;
        ws_skip.parse_next(input)?;
        cut_err(literal("]")).parse_next(input)?;
        return Ok(Expr::Field(FieldRef::Bracketed(first.to_string(), key)));
    }

    Ok(Expr::Field(FieldRef::Simple(first.to_string())))
}
