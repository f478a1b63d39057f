//! Evaluates `Expr` trees against a namespaced row (spec §3, §6
//! "operator plugin interface").
//!
//! Built-in operator names mirror the teacher's `BinaryOp`/`UnaryOp`
//! enums (`crates/query/src/ast/expr.rs`) but are looked up by name
//! rather than matched on a closed enum, since `Func.factory` lets a
//! `defineOperator` plugin register new names at runtime (spec §6).

use rq_core::{Row, Value};

pub fn eval(expr: &rq_ir::Expr, row: &Row) -> Value {
    match expr {
        rq_ir::Expr::Ref(r) => row.get_path(&r.as_slice()).cloned().unwrap_or(Value::Null),
        rq_ir::Expr::Val(v) => v.clone(),
        rq_ir::Expr::Func(f) => {
            let args: Vec<Value> = f.args.iter().map(|a| eval(a, row)).collect();
            if let Some(factory) = &f.factory {
                return factory(&args);
            }
            eval_builtin(&f.name, &args)
        }
        // Aggregates are evaluated by the groupBy operator over a whole
        // group, not row-by-row; a bare aggregate reference outside
        // groupBy evaluates to null.
        rq_ir::Expr::Aggregate(_) => Value::Null,
        // Resolved separately by the compiler's includes-extraction pass.
        rq_ir::Expr::Includes(_) => Value::Null,
    }
}

pub fn eval_bool(expr: &rq_ir::Expr, row: &Row) -> bool {
    eval(expr, row).is_truthy()
}

fn eval_builtin(name: &str, args: &[Value]) -> Value {
    match name {
        "eq" => Value::Bool(args.first() == args.get(1)),
        "ne" => Value::Bool(args.first() != args.get(1)),
        "gt" => cmp(args, |o| o == std::cmp::Ordering::Greater),
        "gte" => cmp(args, |o| o != std::cmp::Ordering::Less),
        "lt" => cmp(args, |o| o == std::cmp::Ordering::Less),
        "lte" => cmp(args, |o| o != std::cmp::Ordering::Greater),
        "and" => Value::Bool(args.iter().all(|v| v.is_truthy())),
        "or" => Value::Bool(args.iter().any(|v| v.is_truthy())),
        "not" => Value::Bool(!args.first().map(Value::is_truthy).unwrap_or(false)),
        "isNull" => Value::Bool(args.first().map(|v| v.is_null()).unwrap_or(true)),
        "isUndefined" => Value::Bool(args.first().map(|v| v.is_null()).unwrap_or(true)),
        "like" => match (args.first(), args.get(1)) {
            (Some(Value::String(s)), Some(Value::String(p))) => Value::Bool(rq_core::pattern_match::like(s, p)),
            _ => Value::Bool(false),
        },
        "ilike" => match (args.first(), args.get(1)) {
            (Some(Value::String(s)), Some(Value::String(p))) => Value::Bool(rq_core::pattern_match::ilike(s, p)),
            _ => Value::Bool(false),
        },
        "in" => match args.first() {
            Some(needle) => Value::Bool(args[1..].contains(needle)),
            None => Value::Bool(false),
        },
        "add" => numeric2(args, |a, b| a + b),
        "sub" => numeric2(args, |a, b| a - b),
        "mul" => numeric2(args, |a, b| a * b),
        "div" => numeric2(args, |a, b| a / b),
        _ => Value::Null,
    }
}

fn cmp(args: &[Value], predicate: impl Fn(std::cmp::Ordering) -> bool) -> Value {
    match (args.first(), args.get(1)) {
        (Some(a), Some(b)) => Value::Bool(predicate(a.cmp(b))),
        _ => Value::Bool(false),
    }
}

fn numeric2(args: &[Value], f: impl Fn(f64, f64) -> f64) -> Value {
    match (args.first().and_then(Value::as_f64), args.get(1).and_then(Value::as_f64)) {
        (Some(a), Some(b)) => Value::Float(f(a, b)),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rq_ir::Expr;

    #[test]
    fn ref_evaluates_to_null_on_missing_path() {
        let row = Row::new();
        assert_eq!(eval(&Expr::ref_path(["u", "name"]), &row), Value::Null);
    }

    #[test]
    fn eq_compares_evaluated_args() {
        let mut row = Row::new();
        row.set("age", Value::Int(30));
        let expr = Expr::func("eq", vec![Expr::ref_path(["age"]), Expr::val(30i64)]);
        assert_eq!(eval(&expr, &row), Value::Bool(true));
    }
}
