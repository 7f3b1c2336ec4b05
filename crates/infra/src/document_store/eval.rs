//! Evaluation of filters and aggregation pipelines over in-memory documents.
//!
//! Supports the subset of the aggregation framework the relay relies on.
//! Anything outside that subset is refused with `UnsupportedOperator`; in
//! particular nothing here ever executes caller-supplied code.

use std::cmp::Ordering;

use serde_json::{Number, Value};

use super::{Document, DocumentStoreError};

type EvalResult<T> = Result<T, DocumentStoreError>;

fn malformed(msg: impl Into<String>) -> DocumentStoreError {
    DocumentStoreError::Malformed(msg.into())
}

/// Run `pipeline` stage by stage over `docs`.
pub fn run_pipeline(mut docs: Vec<Document>, pipeline: &[Document]) -> EvalResult<Vec<Document>> {
    for stage in pipeline {
        let (name, spec) = single_entry(stage)?;
        docs = match name {
            "$match" => {
                let filter = as_object(spec, name)?;
                let mut kept = Vec::with_capacity(docs.len());
                for doc in docs {
                    if matches(&doc, filter)? {
                        kept.push(doc);
                    }
                }
                kept
            }
            "$sort" => sort(docs, as_object(spec, name)?)?,
            "$skip" => {
                let n = as_count(spec, name)?;
                docs.into_iter().skip(n).collect()
            }
            "$limit" => {
                let n = as_count(spec, name)?;
                if n == 0 {
                    return Err(malformed("$limit must be positive"));
                }
                docs.truncate(n);
                docs
            }
            "$group" => group(docs, as_object(spec, name)?)?,
            other => return Err(DocumentStoreError::UnsupportedOperator(other.to_string())),
        };
    }
    Ok(docs)
}

fn single_entry(stage: &Document) -> EvalResult<(&str, &Value)> {
    let mut entries = stage.iter();
    match (entries.next(), entries.next()) {
        (Some((name, spec)), None) => Ok((name.as_str(), spec)),
        _ => Err(malformed("pipeline stage must hold exactly one operator")),
    }
}

fn as_object<'a>(value: &'a Value, stage: &str) -> EvalResult<&'a Document> {
    value
        .as_object()
        .ok_or_else(|| malformed(format!("{stage} expects a document")))
}

fn as_count(value: &Value, stage: &str) -> EvalResult<usize> {
    value
        .as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| malformed(format!("{stage} expects a non-negative integer")))
}

/// Resolve a dotted path (`payload.order.id`, `items.0`).
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

// ───── $match ─────

pub fn matches(doc: &Document, filter: &Document) -> EvalResult<bool> {
    // Every clause is evaluated so an unsupported operator is reported even
    // when an earlier clause already failed.
    let mut all = true;
    for (key, cond) in filter {
        let ok = match key.as_str() {
            "$and" => {
                let mut ok = true;
                for clause in clauses(cond, key)? {
                    ok &= matches(doc, clause)?;
                }
                ok
            }
            "$or" => {
                let mut ok = false;
                for clause in clauses(cond, key)? {
                    ok |= matches(doc, clause)?;
                }
                ok
            }
            "$nor" => {
                let mut ok = true;
                for clause in clauses(cond, key)? {
                    ok &= !matches(doc, clause)?;
                }
                ok
            }
            op if op.starts_with('$') => return Err(DocumentStoreError::UnsupportedOperator(op.to_string())),
            path => field_matches(lookup(doc, path), cond)?,
        };
        all &= ok;
    }
    Ok(all)
}

fn clauses<'a>(cond: &'a Value, op: &str) -> EvalResult<Vec<&'a Document>> {
    let items = cond
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| malformed(format!("{op} expects a non-empty array")))?;
    items
        .iter()
        .map(|item| item.as_object().ok_or_else(|| malformed(format!("{op} entries must be documents"))))
        .collect()
}

fn is_operator_doc(cond: &Value) -> bool {
    matches!(cond, Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')))
}

fn field_matches(value: Option<&Value>, cond: &Value) -> EvalResult<bool> {
    let Some(ops) = cond.as_object().filter(|_| is_operator_doc(cond)) else {
        return Ok(equals_or_contains(value, cond));
    };

    let mut all = true;
    for (op, arg) in ops {
        let ok = match op.as_str() {
            "$eq" => equals_or_contains(value, arg),
            "$ne" => !equals_or_contains(value, arg),
            "$gt" => compares(value, arg, |o| o == Ordering::Greater),
            "$gte" => compares(value, arg, |o| o != Ordering::Less),
            "$lt" => compares(value, arg, |o| o == Ordering::Less),
            "$lte" => compares(value, arg, |o| o != Ordering::Greater),
            "$in" => in_list(value, arg, op)?,
            "$nin" => !in_list(value, arg, op)?,
            "$exists" => {
                let want = arg
                    .as_bool()
                    .ok_or_else(|| malformed("$exists expects a boolean"))?;
                value.is_some() == want
            }
            "$not" => {
                if !is_operator_doc(arg) {
                    return Err(malformed("$not expects an operator document"));
                }
                !field_matches(value, arg)?
            }
            other => return Err(DocumentStoreError::UnsupportedOperator(other.to_string())),
        };
        all &= ok;
    }
    Ok(all)
}

fn in_list(value: Option<&Value>, arg: &Value, op: &str) -> EvalResult<bool> {
    let items = arg
        .as_array()
        .ok_or_else(|| malformed(format!("{op} expects an array")))?;
    Ok(items.iter().any(|item| equals_or_contains(value, item)))
}

/// Equality with array-field semantics: an array field matches when any
/// element equals the operand. A missing field equals `null`.
fn equals_or_contains(value: Option<&Value>, operand: &Value) -> bool {
    match value {
        None => operand.is_null(),
        Some(v) => {
            values_equal(v, operand)
                || matches!(v, Value::Array(items) if items.iter().any(|e| values_equal(e, operand)))
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compares(value: Option<&Value>, operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let Some(v) = value else { return false };
    let test = |candidate: &Value| comparable(candidate, operand).is_some_and(&accept);
    match v {
        Value::Array(items) => items.iter().any(test),
        other => test(other),
    }
}

/// Ordering between values of the same kind; `None` across kinds.
fn comparable(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

// ───── $sort ─────

fn sort(mut docs: Vec<Document>, spec: &Document) -> EvalResult<Vec<Document>> {
    if spec.is_empty() {
        return Err(malformed("$sort expects at least one key"));
    }
    let mut keys = Vec::with_capacity(spec.len());
    for (path, direction) in spec {
        if path.starts_with('$') {
            return Err(DocumentStoreError::UnsupportedOperator(path.clone()));
        }
        let descending = match direction.as_i64() {
            Some(1) => false,
            Some(-1) => true,
            _ => return Err(malformed(format!("sort direction for '{path}' must be 1 or -1"))),
        };
        keys.push((path.as_str(), descending));
    }

    docs.sort_by(|a, b| {
        for (path, descending) in &keys {
            let ord = total_order(lookup(a, path), lookup(b, path));
            let ord = if *descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    Ok(docs)
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

fn total_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => comparable(x, y).unwrap_or_else(|| type_rank(a).cmp(&type_rank(b))),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

// ───── $group ─────

#[derive(Debug, Clone, Copy)]
enum Accumulator {
    Push,
    AddToSet,
    Sum,
    First,
    Last,
}

impl Accumulator {
    fn parse(op: &str) -> EvalResult<Self> {
        match op {
            "$push" => Ok(Self::Push),
            "$addToSet" => Ok(Self::AddToSet),
            "$sum" => Ok(Self::Sum),
            "$first" => Ok(Self::First),
            "$last" => Ok(Self::Last),
            other => Err(DocumentStoreError::UnsupportedOperator(other.to_string())),
        }
    }

    fn initial(&self) -> Value {
        match self {
            Self::Push | Self::AddToSet => Value::Array(Vec::new()),
            Self::Sum => Value::from(0),
            Self::First | Self::Last => Value::Null,
        }
    }

    fn fold(&self, state: &mut Value, seen: bool, input: Option<Value>) {
        match (self, state) {
            (Self::Push, Value::Array(items)) => items.extend(input),
            (Self::AddToSet, Value::Array(items)) => {
                if let Some(v) = input {
                    if !items.iter().any(|e| values_equal(e, &v)) {
                        items.push(v);
                    }
                }
            }
            (Self::Sum, total) => {
                if let Some(n) = input.as_ref().and_then(Value::as_f64) {
                    *total = number(total.as_f64().unwrap_or(0.0) + n);
                }
            }
            (Self::First, slot) => {
                if !seen {
                    *slot = input.unwrap_or(Value::Null);
                }
            }
            (Self::Last, slot) => *slot = input.unwrap_or(Value::Null),
            _ => {}
        }
    }
}

fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// `$$ROOT`, `$path` or a literal. Missing paths yield `None`.
fn eval_expr(doc: &Document, expr: &Value) -> Option<Value> {
    match expr {
        Value::String(s) if s == "$$ROOT" => Some(Value::Object(doc.clone())),
        Value::String(s) if s.starts_with('$') => lookup(doc, &s[1..]).cloned(),
        literal => Some(literal.clone()),
    }
}

fn group(docs: Vec<Document>, spec: &Document) -> EvalResult<Vec<Document>> {
    let key_expr = spec.get("_id").ok_or_else(|| malformed("$group requires an _id"))?;

    let mut fields = Vec::new();
    for (name, acc) in spec.iter().filter(|(k, _)| k.as_str() != "_id") {
        let acc = as_object(acc, "$group accumulator")?;
        let (op, expr) = single_entry(acc)?;
        fields.push((name.clone(), Accumulator::parse(op)?, expr));
    }

    // Groups keep first-seen order; the counter tells `$first` whether it has fired.
    let mut groups: Vec<(Value, Vec<Value>, usize)> = Vec::new();
    for doc in &docs {
        let key = eval_expr(doc, key_expr).unwrap_or(Value::Null);
        let index = match groups.iter().position(|(k, _, _)| values_equal(k, &key)) {
            Some(i) => i,
            None => {
                groups.push((key, fields.iter().map(|(_, acc, _)| acc.initial()).collect(), 0));
                groups.len() - 1
            }
        };
        let (_, states, count) = &mut groups[index];
        for ((_, acc, expr), state) in fields.iter().zip(states.iter_mut()) {
            acc.fold(state, *count > 0, eval_expr(doc, expr));
        }
        *count += 1;
    }

    Ok(groups
        .into_iter()
        .map(|(key, states, _)| {
            let mut out = Document::new();
            out.insert("_id".into(), key);
            for ((name, _, _), state) in fields.iter().zip(states) {
                out.insert(name.clone(), state);
            }
            out
        })
        .collect())
}
