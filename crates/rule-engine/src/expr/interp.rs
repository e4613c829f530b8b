//! Tree-walking interpreter.
//!
//! The only binding is `event`, a read-only view of a [`FlatRecord`]. There
//! is no way to reach the host: no assignment, no imports, no attribute
//! access beyond a fixed set of string and record methods.

use std::borrow::Cow;
use std::cmp::Ordering;

use serde_json::Value as Json;

use super::ast::{CmpOp, Expr, Literal};
use crate::error::EvalError;
use crate::flatten::FlatRecord;

/// Name under which the record is exposed to rules.
pub const EVENT_BINDING: &str = "event";

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Val<'a> {
    None,
    Bool(bool),
    Num(f64),
    Str(Cow<'a, str>),
    List(Vec<Val<'a>>),
    Event,
}

impl<'a> Val<'a> {
    fn from_json(value: &'a Json) -> Self {
        match value {
            Json::Null => Self::None,
            Json::Bool(b) => Self::Bool(*b),
            Json::Number(n) => Self::Num(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Self::Str(Cow::Borrowed(s)),
            // flattened records hold scalars only
            Json::Array(_) | Json::Object(_) => Self::None,
        }
    }

    fn from_literal(literal: &'a Literal) -> Self {
        match literal {
            Literal::None => Self::None,
            Literal::Bool(b) => Self::Bool(*b),
            Literal::Num(n) => Self::Num(*n),
            Literal::Str(s) => Self::Str(Cow::Borrowed(s)),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Num(n) if n.fract() == 0.0 => "int",
            Self::Num(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Event => "event",
        }
    }

    pub(crate) fn truthy(&self, flat: &FlatRecord) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Num(n) => *n != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Event => !flat.is_empty(),
        }
    }
}

pub(crate) fn eval<'a>(expr: &'a Expr, flat: &'a FlatRecord) -> Result<Val<'a>, EvalError> {
    match expr {
        Expr::Literal(literal) => Ok(Val::from_literal(literal)),
        Expr::Name(name) if name == EVENT_BINDING => Ok(Val::Event),
        Expr::Name(name) => Err(EvalError::UndefinedName { name: name.clone() }),
        Expr::List(items) => items
            .iter()
            .map(|item| eval(item, flat))
            .collect::<Result<_, _>>()
            .map(Val::List),
        Expr::Index { target, key } => {
            let target = eval(target, flat)?;
            let key = eval(key, flat)?;
            index(target, key, flat)
        }
        Expr::Attr { target, name } => {
            let target = eval(target, flat)?;
            Err(type_error(format!(
                "attribute '{name}' of '{}' can only be called",
                target.type_name()
            )))
        }
        Expr::Call {
            target,
            method,
            args,
        } => {
            let target = eval(target, flat)?;
            let args = args
                .iter()
                .map(|arg| eval(arg, flat))
                .collect::<Result<Vec<_>, _>>()?;
            call(target, method, args, flat)
        }
        Expr::Not(operand) => Ok(Val::Bool(!eval(operand, flat)?.truthy(flat))),
        Expr::And(operands) => {
            let mut last = Val::Bool(true);
            for operand in operands {
                last = eval(operand, flat)?;
                if !last.truthy(flat) {
                    break;
                }
            }
            Ok(last)
        }
        Expr::Or(operands) => {
            let mut last = Val::Bool(false);
            for operand in operands {
                last = eval(operand, flat)?;
                if last.truthy(flat) {
                    break;
                }
            }
            Ok(last)
        }
        Expr::Compare { left, rest } => {
            let mut lhs = eval(left, flat)?;
            for (op, right) in rest {
                let rhs = eval(right, flat)?;
                if !compare(*op, &lhs, &rhs, flat)? {
                    return Ok(Val::Bool(false));
                }
                lhs = rhs;
            }
            Ok(Val::Bool(true))
        }
    }
}

fn type_error(reason: String) -> EvalError {
    EvalError::Type { reason }
}

fn index<'a>(
    target: Val<'a>,
    key: Val<'a>,
    flat: &'a FlatRecord,
) -> Result<Val<'a>, EvalError> {
    match (target, key) {
        (Val::Event, Val::Str(path)) => flat.index(&path).map(Val::from_json),
        (Val::Event, other) => Err(EvalError::KeyNotFound {
            key: render(&other),
        }),
        (Val::List(items), Val::Num(n)) => {
            let i = position(n, items.len())?;
            Ok(items.into_iter().nth(i).unwrap_or(Val::None))
        }
        (Val::Str(s), Val::Num(n)) => {
            let chars: Vec<char> = s.chars().collect();
            let i = position(n, chars.len())?;
            Ok(Val::Str(Cow::Owned(chars[i].to_string())))
        }
        (target @ (Val::List(_) | Val::Str(_)), key) => Err(type_error(format!(
            "{} indices must be integers, not {}",
            target.type_name(),
            key.type_name()
        ))),
        (target, _) => Err(type_error(format!(
            "'{}' object is not subscriptable",
            target.type_name()
        ))),
    }
}

/// Resolves a possibly negative index against `len`.
fn position(n: f64, len: usize) -> Result<usize, EvalError> {
    if n.fract() != 0.0 {
        return Err(type_error(format!("index {n} is not an integer")));
    }
    let len_f = len as f64;
    let resolved = if n < 0.0 { len_f + n } else { n };
    if resolved < 0.0 || resolved >= len_f {
        return Err(type_error(format!("index {n} out of range")));
    }
    Ok(resolved as usize)
}

fn call<'a>(
    target: Val<'a>,
    method: &str,
    args: Vec<Val<'a>>,
    flat: &'a FlatRecord,
) -> Result<Val<'a>, EvalError> {
    match (&target, method) {
        (Val::Event, "get") => {
            let (key, default) = match <[Val<'a>; 2]>::try_from(args) {
                Ok([key, default]) => (key, default),
                Err(args) if args.len() == 1 => {
                    let mut args = args;
                    (args.remove(0), Val::None)
                }
                Err(args) => {
                    return Err(arity("get", "1 or 2", args.len()));
                }
            };
            match key {
                Val::Str(path) => Ok(flat.get(&path).map_or(default, Val::from_json)),
                // non-string keys are never present in a flat record
                _ => Ok(default),
            }
        }
        (Val::Str(s), "startswith") => affix(s, args, "startswith", |s, p| s.starts_with(p)),
        (Val::Str(s), "endswith") => affix(s, args, "endswith", |s, p| s.ends_with(p)),
        (Val::Str(s), "lower") => {
            no_args("lower", &args)?;
            Ok(Val::Str(Cow::Owned(s.to_lowercase())))
        }
        (Val::Str(s), "upper") => {
            no_args("upper", &args)?;
            Ok(Val::Str(Cow::Owned(s.to_uppercase())))
        }
        (Val::Str(s), "strip") => {
            no_args("strip", &args)?;
            Ok(Val::Str(Cow::Owned(s.trim().to_owned())))
        }
        _ => Err(type_error(format!(
            "'{}' object has no method '{method}'",
            target.type_name()
        ))),
    }
}

fn arity(method: &str, expected: &str, got: usize) -> EvalError {
    type_error(format!("{method}() takes {expected} argument(s), {got} given"))
}

fn no_args(method: &str, args: &[Val<'_>]) -> Result<(), EvalError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(arity(method, "no", args.len()))
    }
}

/// `startswith` / `endswith`: one string, or a list/tuple of strings.
fn affix<'a>(
    s: &str,
    args: Vec<Val<'a>>,
    method: &str,
    test: impl Fn(&str, &str) -> bool,
) -> Result<Val<'a>, EvalError> {
    let [arg] = <[Val<'a>; 1]>::try_from(args).map_err(|args| arity(method, "1", args.len()))?;
    match arg {
        Val::Str(prefix) => Ok(Val::Bool(test(s, &*prefix))),
        Val::List(options) => {
            let mut matched = false;
            for option in &options {
                match option {
                    Val::Str(prefix) => matched |= test(s, &**prefix),
                    other => {
                        return Err(type_error(format!(
                            "tuple for {method} must only contain str, not {}",
                            other.type_name()
                        )));
                    }
                }
            }
            Ok(Val::Bool(matched))
        }
        other => Err(type_error(format!(
            "{method} first arg must be str or a tuple of str, not {}",
            other.type_name()
        ))),
    }
}

fn compare(
    op: CmpOp,
    lhs: &Val<'_>,
    rhs: &Val<'_>,
    flat: &FlatRecord,
) -> Result<bool, EvalError> {
    match op {
        CmpOp::Eq => Ok(equal(lhs, rhs)),
        CmpOp::Ne => Ok(!equal(lhs, rhs)),
        CmpOp::Is => Ok(identical(lhs, rhs)),
        CmpOp::IsNot => Ok(!identical(lhs, rhs)),
        CmpOp::In => contains(rhs, lhs, flat),
        CmpOp::NotIn => contains(rhs, lhs, flat).map(|found| !found),
        CmpOp::Lt => order(lhs, rhs, "<").map(Ordering::is_lt),
        CmpOp::Le => order(lhs, rhs, "<=").map(Ordering::is_le),
        CmpOp::Gt => order(lhs, rhs, ">").map(Ordering::is_gt),
        CmpOp::Ge => order(lhs, rhs, ">=").map(Ordering::is_ge),
    }
}

/// Values of different kinds are never equal.
fn equal(a: &Val<'_>, b: &Val<'_>) -> bool {
    match (a, b) {
        (Val::None, Val::None) | (Val::Event, Val::Event) => true,
        (Val::Bool(x), Val::Bool(y)) => x == y,
        (Val::Num(x), Val::Num(y)) => x == y,
        (Val::Str(x), Val::Str(y)) => x == y,
        (Val::List(x), Val::List(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| equal(l, r))
        }
        _ => false,
    }
}

/// `is` has no object identity to compare, so it is strict equality.
fn identical(a: &Val<'_>, b: &Val<'_>) -> bool {
    equal(a, b)
}

fn contains(
    container: &Val<'_>,
    item: &Val<'_>,
    flat: &FlatRecord,
) -> Result<bool, EvalError> {
    match (container, item) {
        (Val::Event, Val::Str(path)) => Ok(flat.contains(path)),
        (Val::Event, _) => Ok(false),
        (Val::Str(haystack), Val::Str(needle)) => Ok(haystack.contains(&**needle)),
        (Val::Str(_), other) => Err(type_error(format!(
            "'in <string>' requires string as left operand, not {}",
            other.type_name()
        ))),
        (Val::List(items), item) => Ok(items.iter().any(|candidate| equal(candidate, item))),
        (other, _) => Err(type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

fn order(a: &Val<'_>, b: &Val<'_>, symbol: &str) -> Result<Ordering, EvalError> {
    let ordering = match (a, b) {
        (Val::Num(x), Val::Num(y)) => x.partial_cmp(y),
        (Val::Str(x), Val::Str(y)) => Some(x.cmp(y)),
        _ => None,
    };
    ordering.ok_or_else(|| {
        type_error(format!(
            "'{symbol}' not supported between instances of '{}' and '{}'",
            a.type_name(),
            b.type_name()
        ))
    })
}

fn render(value: &Val<'_>) -> String {
    match value {
        Val::None => "None".to_owned(),
        Val::Bool(true) => "True".to_owned(),
        Val::Bool(false) => "False".to_owned(),
        Val::Num(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
        Val::Num(n) => n.to_string(),
        Val::Str(s) => s.to_string(),
        Val::List(items) => {
            let inner: Vec<String> = items.iter().map(render).collect();
            format!("[{}]", inner.join(", "))
        }
        Val::Event => EVENT_BINDING.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::expr::parser::parse;
    use crate::flatten::flatten;

    fn run(src: &str, record: serde_json::Value) -> Result<Val<'static>, EvalError> {
        let expr = parse(src).unwrap();
        let flat = flatten(&record);
        eval(&expr, &flat).map(own)
    }

    fn own(val: Val<'_>) -> Val<'static> {
        match val {
            Val::None => Val::None,
            Val::Bool(b) => Val::Bool(b),
            Val::Num(n) => Val::Num(n),
            Val::Str(s) => Val::Str(Cow::Owned(s.into_owned())),
            Val::List(items) => Val::List(items.into_iter().map(own).collect()),
            Val::Event => Val::Event,
        }
    }

    fn str_val(s: &str) -> Val<'static> {
        Val::Str(Cow::Owned(s.to_owned()))
    }

    #[test]
    fn index_reads_flattened_paths() {
        let out = run(
            r#"event["userIdentity.type"]"#,
            json!({"userIdentity": {"type": "Root"}}),
        );
        assert_eq!(out.unwrap(), str_val("Root"));
    }

    #[test]
    fn index_on_missing_key_fails() {
        let err = run(r#"event["errorCode"]"#, json!({})).unwrap_err();
        assert_eq!(
            err,
            EvalError::KeyNotFound {
                key: "errorCode".to_owned()
            }
        );
    }

    #[test]
    fn get_never_fails() {
        assert_eq!(run(r#"event.get("missing")"#, json!({})).unwrap(), Val::None);
        assert_eq!(
            run(r#"event.get("missing", "dflt")"#, json!({})).unwrap(),
            str_val("dflt")
        );
        assert_eq!(run("event.get(5)", json!({"5": 1})).unwrap(), Val::None);
    }

    #[test]
    fn get_returns_stored_null() {
        let out = run(r#"event.get("errorCode", "x")"#, json!({"errorCode": null}));
        assert_eq!(out.unwrap(), Val::None);
    }

    #[test]
    fn or_yields_operand_values() {
        let out = run(r#"event.get("errorCode") or """#, json!({}));
        assert_eq!(out.unwrap(), str_val(""));
        let out = run(r#"event.get("a") and 1"#, json!({"a": 0}));
        assert_eq!(out.unwrap(), Val::Num(0.0));
    }

    #[test]
    fn and_short_circuits_before_failing_index() {
        let out = run(r#""errorCode" in event and event["errorCode"] == "X""#, json!({}));
        assert_eq!(out.unwrap(), Val::Bool(false));
    }

    #[test]
    fn unknown_name_is_reported_lazily() {
        assert_eq!(run("False and undefined_name", json!({})).unwrap(), Val::Bool(false));
        let err = run("undefined_name == 1", json!({})).unwrap_err();
        assert_eq!(
            err,
            EvalError::UndefinedName {
                name: "undefined_name".to_owned()
            }
        );
    }

    #[test]
    fn startswith_accepts_tuples() {
        let record = json!({"eventName": "DescribeInstances"});
        let src = r#"event["eventName"].startswith(("Get", "Describe"))"#;
        assert_eq!(run(src, record.clone()).unwrap(), Val::Bool(true));
        let src = r#"event["eventName"].endswith("Instances")"#;
        assert_eq!(run(src, record.clone()).unwrap(), Val::Bool(true));
        let err = run(r#"event["eventName"].startswith(("Get", 1))"#, record).unwrap_err();
        assert!(matches!(err, EvalError::Type { .. }));
    }

    #[test]
    fn string_case_helpers() {
        let record = json!({"s": "  MiXed "});
        assert_eq!(run(r#"event["s"].strip().lower()"#, record).unwrap(), str_val("mixed"));
    }

    #[test]
    fn unknown_method_is_type_error() {
        let err = run(r#"event["a"].split(",")"#, json!({"a": "x"})).unwrap_err();
        assert!(err.to_string().contains("no method 'split'"));
        let err = run(r#"event.keys"#, json!({})).unwrap_err();
        assert!(matches!(err, EvalError::Type { .. }));
    }

    #[test]
    fn cross_type_equality_is_false() {
        assert_eq!(run(r#"1 == "1""#, json!({})).unwrap(), Val::Bool(false));
        assert_eq!(run("True == 1", json!({})).unwrap(), Val::Bool(false));
        assert_eq!(run("None != 0", json!({})).unwrap(), Val::Bool(true));
    }

    #[test]
    fn ordering_mixed_types_is_type_error() {
        let err = run(r#"1 < "a""#, json!({})).unwrap_err();
        assert!(err.to_string().contains("'<' not supported"));
    }

    #[test]
    fn chained_comparisons() {
        assert_eq!(run("1 < 2 < 3", json!({})).unwrap(), Val::Bool(true));
        assert_eq!(run("1 < 3 < 2", json!({})).unwrap(), Val::Bool(false));
    }

    #[test]
    fn membership_forms() {
        let record = json!({"arn": "arn:aws:sts::1:assumed-role/AWSReservedSSO_x/y"});
        let src = r#""assumed-role/AWSReservedSSO" in event.get("arn")"#;
        assert_eq!(run(src, record).unwrap(), Val::Bool(true));
        assert_eq!(
            run(r#""b" not in ["a", "c"]"#, json!({})).unwrap(),
            Val::Bool(true)
        );
        let err = run(r#""x" in None"#, json!({})).unwrap_err();
        assert!(err.to_string().contains("not iterable"));
        let err = run(r#"1 in "abc""#, json!({})).unwrap_err();
        assert!(matches!(err, EvalError::Type { .. }));
    }

    #[test]
    fn is_compares_strictly() {
        assert_eq!(run(r#"event.get("x") is None"#, json!({})).unwrap(), Val::Bool(true));
        assert_eq!(run("0 is not None", json!({})).unwrap(), Val::Bool(true));
    }

    #[test]
    fn list_and_string_indexing() {
        assert_eq!(run(r#"["a", "b"][-1]"#, json!({})).unwrap(), str_val("b"));
        assert_eq!(run(r#""abc"[0]"#, json!({})).unwrap(), str_val("a"));
        let err = run(r#"["a"][3]"#, json!({})).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn event_truthiness_follows_content() {
        assert_eq!(run("not event", json!({})).unwrap(), Val::Bool(true));
        assert_eq!(run("not event", json!({"a": 1})).unwrap(), Val::Bool(false));
    }

    #[test]
    fn containers_never_surface_as_values() {
        let nested = json!({"b": 1});
        assert_eq!(Val::from_json(&nested), Val::None);
        let list = json!([1, 2]);
        assert_eq!(Val::from_json(&list), Val::None);
        assert_eq!(run(r#"event.get("a")"#, json!({"a": {}})).unwrap(), Val::None);
    }
}
