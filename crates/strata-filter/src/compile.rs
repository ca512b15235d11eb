//! Filter-to-SQL compilation
//!
//! Compiles a condition tree into a parameterized WHERE clause. The
//! compiler is schema-independent and never executes SQL; values from the
//! filter document only ever land in the parameter array, and field names
//! are checked against the identifier rule before any SQL text is built.
//!
//! Operator catalog:
//!
//! | Group      | Operators |
//! |------------|-----------|
//! | comparison | `$eq` `$ne` `$neq` `$gt` `$gte` `$lt` `$lte` |
//! | pattern    | `$like` `$nlike` `$ilike` `$nilike` `$regex` `$nregex` |
//! | membership | `$in` `$nin` |
//! | array      | `$any` `$all` `$nany` `$nall` `$size` |
//! | range      | `$between` |
//! | existence  | `$exists` `$null` |
//! | search     | `$find` `$text` |
//! | logical    | `$and` `$or` `$not` `$nand` `$nor` |

use crate::types::{CompiledFilter, Filter, FilterOptions};
use serde_json::Value;
use strata_core::error::{Error, Result};
use strata_core::types::ensure_identifier;

/// Compile a filter document into a parameterized WHERE clause plus
/// ORDER BY, LIMIT, and OFFSET.
///
/// Unless opted out through `options`, the soft-delete predicates
/// `"trashed_at" IS NULL` and `"deleted_at" IS NULL` are prepended; they
/// consume no parameter slots.
pub fn compile(filter: &Filter, options: &FilterOptions) -> Result<CompiledFilter> {
    let mut ctx = Compiler::new(options.starting_param_index);

    let user_clause = match &filter.r#where {
        Some(cond) => Some(ctx.condition(cond)?),
        None => None,
    };

    let mut parts: Vec<String> = Vec::new();
    if !options.include_trashed {
        parts.push(r#""trashed_at" IS NULL"#.to_string());
    }
    if !options.include_deleted {
        parts.push(r#""deleted_at" IS NULL"#.to_string());
    }
    if let Some(clause) = user_clause {
        if !clause.is_empty() {
            parts.push(format!("({clause})"));
        }
    }

    let order_by = match &filter.order {
        Some(order) => Some(compile_order(order)?),
        None => None,
    };

    let limit = validate_bound(filter.limit, "limit")?;
    let offset = validate_bound(filter.offset, "offset")?;

    Ok(CompiledFilter {
        where_clause: parts.join(" AND "),
        params: ctx.params,
        order_by,
        limit,
        offset,
    })
}

fn validate_bound(value: Option<i64>, what: &str) -> Result<Option<i64>> {
    match value {
        Some(n) if n < 0 => Err(Error::bad_request(
            "FILTER_INVALID_BOUND",
            format!("{what} must be non-negative, got {n}"),
        )),
        other => Ok(other),
    }
}

struct Compiler {
    params: Vec<Value>,
    starting_index: usize,
}

impl Compiler {
    fn new(starting_index: usize) -> Self {
        Self {
            params: Vec::new(),
            starting_index,
        }
    }

    /// Push a parameter and return its placeholder
    fn bind(&mut self, value: Value) -> String {
        self.params.push(value);
        format!("${}", self.starting_index + self.params.len())
    }

    /// Compile a condition: a field mapping or a logical operator
    fn condition(&mut self, cond: &Value) -> Result<String> {
        let map = cond.as_object().ok_or_else(|| {
            Error::bad_request(
                "FILTER_INVALID_CONDITION",
                format!("condition must be an object, got {cond}"),
            )
        })?;

        let mut clauses = Vec::with_capacity(map.len());
        for (key, value) in map {
            let clause = match key.as_str() {
                "$and" => self.logical(value, "AND", false)?,
                "$or" => self.logical(value, "OR", false)?,
                "$nand" => self.logical(value, "AND", true)?,
                "$nor" => self.logical(value, "OR", true)?,
                "$not" => {
                    // A bare condition is normalized to a one-element list
                    let inner = match value {
                        Value::Array(_) => self.logical(value, "AND", true)?,
                        _ => format!("NOT ({})", self.condition(value)?),
                    };
                    inner
                }
                field if field.starts_with('$') => {
                    return Err(unsupported_operator(field));
                }
                field => {
                    ensure_identifier(field, "filter field")?;
                    self.field(field, value)?
                }
            };
            clauses.push(clause);
        }

        Ok(clauses.join(" AND "))
    }

    /// `$and`/`$or`/`$nand`/`$nor` over a list of conditions
    fn logical(&mut self, value: &Value, joiner: &str, negate: bool) -> Result<String> {
        let items = value.as_array().ok_or_else(|| {
            Error::bad_request(
                "FILTER_LOGICAL_REQUIRES_ARRAY",
                format!("logical operators take an array of conditions, got {value}"),
            )
        })?;
        if items.is_empty() {
            return Err(Error::bad_request(
                "FILTER_LOGICAL_REQUIRES_ARRAY",
                "logical operators require at least one condition",
            ));
        }

        let branches = items
            .iter()
            .map(|item| Ok(format!("({})", self.condition(item)?)))
            .collect::<Result<Vec<_>>>()?;

        let joined = branches.join(&format!(" {joiner} "));
        Ok(if negate {
            format!("NOT ({joined})")
        } else {
            joined
        })
    }

    /// A field condition: scalar equality, bare-array membership, or an
    /// operator object
    fn field(&mut self, field: &str, value: &Value) -> Result<String> {
        match value {
            Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => {
                let mut clauses = Vec::with_capacity(ops.len());
                for (op, arg) in ops {
                    clauses.push(self.operator(field, op, arg)?);
                }
                Ok(clauses.join(" AND "))
            }
            Value::Null => Ok(format!(r#""{field}" IS NULL"#)),
            Value::Array(_) => self.operator(field, "$in", value),
            _ => Ok(format!(r#""{field}" = {}"#, self.bind(value.clone()))),
        }
    }

    fn operator(&mut self, field: &str, op: &str, arg: &Value) -> Result<String> {
        let quoted = format!(r#""{field}""#);
        match op {
            "$eq" => Ok(match arg {
                Value::Null => format!("{quoted} IS NULL"),
                _ => format!("{quoted} = {}", self.bind(arg.clone())),
            }),
            "$ne" | "$neq" => Ok(match arg {
                Value::Null => format!("{quoted} IS NOT NULL"),
                _ => format!("{quoted} != {}", self.bind(arg.clone())),
            }),
            "$gt" => Ok(format!("{quoted} > {}", self.bind(arg.clone()))),
            "$gte" => Ok(format!("{quoted} >= {}", self.bind(arg.clone()))),
            "$lt" => Ok(format!("{quoted} < {}", self.bind(arg.clone()))),
            "$lte" => Ok(format!("{quoted} <= {}", self.bind(arg.clone()))),

            "$like" => Ok(format!("{quoted} LIKE {}", self.bind_text(op, arg)?)),
            "$nlike" => Ok(format!("{quoted} NOT LIKE {}", self.bind_text(op, arg)?)),
            "$ilike" => Ok(format!("{quoted} ILIKE {}", self.bind_text(op, arg)?)),
            "$nilike" => Ok(format!("{quoted} NOT ILIKE {}", self.bind_text(op, arg)?)),
            "$regex" => Ok(format!("{quoted} ~ {}", self.bind_text(op, arg)?)),
            "$nregex" => Ok(format!("{quoted} !~ {}", self.bind_text(op, arg)?)),

            "$in" => self.membership(&quoted, op, arg, false),
            "$nin" => self.membership(&quoted, op, arg, true),

            "$any" => Ok(format!("{quoted} && {}", self.bind_array(op, arg)?)),
            "$all" => Ok(format!("{quoted} @> {}", self.bind_array(op, arg)?)),
            "$nany" => Ok(format!("NOT ({quoted} && {})", self.bind_array(op, arg)?)),
            "$nall" => Ok(format!("NOT ({quoted} @> {})", self.bind_array(op, arg)?)),
            "$size" => self.size(field, arg),

            "$between" => self.between(&quoted, arg),

            "$exists" => match arg {
                Value::Bool(true) => Ok(format!("{quoted} IS NOT NULL")),
                Value::Bool(false) => Ok(format!("{quoted} IS NULL")),
                _ => Err(Error::bad_request(
                    "FILTER_EXISTS_REQUIRES_BOOLEAN",
                    format!("$exists takes a boolean, got {arg}"),
                )),
            },
            "$null" => match arg {
                Value::Bool(true) => Ok(format!("{quoted} IS NULL")),
                Value::Bool(false) => Ok(format!("{quoted} IS NOT NULL")),
                _ => Err(Error::bad_request(
                    "FILTER_NULL_REQUIRES_BOOLEAN",
                    format!("$null takes a boolean, got {arg}"),
                )),
            },

            // Minimum viable search mapping; callers may swap in a
            // tokenizer-backed implementation without changing this contract
            "$find" | "$text" => {
                let needle = arg.as_str().ok_or_else(|| {
                    Error::bad_request(
                        "FILTER_SEARCH_REQUIRES_STRING",
                        format!("{op} takes a string, got {arg}"),
                    )
                })?;
                let param = self.bind(Value::String(format!("%{needle}%")));
                Ok(format!("{quoted}::text ILIKE {param}"))
            }

            other => Err(unsupported_operator(other)),
        }
    }

    fn bind_text(&mut self, op: &str, arg: &Value) -> Result<String> {
        match arg {
            Value::String(_) => Ok(self.bind(arg.clone())),
            _ => Err(Error::bad_request(
                "FILTER_PATTERN_REQUIRES_STRING",
                format!("{op} takes a string pattern, got {arg}"),
            )),
        }
    }

    fn bind_array(&mut self, op: &str, arg: &Value) -> Result<String> {
        match arg {
            Value::Array(_) => Ok(self.bind(arg.clone())),
            _ => Err(Error::bad_request(
                "FILTER_ARRAY_REQUIRES_ARRAY",
                format!("{op} takes an array, got {arg}"),
            )),
        }
    }

    /// `$in` / `$nin` with the empty-list constants
    fn membership(&mut self, quoted: &str, op: &str, arg: &Value, negate: bool) -> Result<String> {
        let items = arg.as_array().ok_or_else(|| {
            Error::bad_request(
                "FILTER_IN_REQUIRES_ARRAY",
                format!("{op} takes an array, got {arg}"),
            )
        })?;

        if items.is_empty() {
            // Empty $in matches nothing; empty $nin excludes nothing
            return Ok(if negate { "1 = 1" } else { "1 = 0" }.to_string());
        }

        let placeholders = items
            .iter()
            .map(|item| self.bind(item.clone()))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(if negate {
            format!("{quoted} NOT IN ({placeholders})")
        } else {
            format!("{quoted} IN ({placeholders})")
        })
    }

    /// `$size`: a number, or a single numeric operator object
    fn size(&mut self, field: &str, arg: &Value) -> Result<String> {
        let lhs = format!(r#"array_length("{field}", 1)"#);
        match arg {
            Value::Number(_) => Ok(format!("{lhs} = {}", self.bind(arg.clone()))),
            Value::Object(ops) if ops.len() == 1 => {
                let (op, n) = ops.iter().next().expect("len checked");
                if !n.is_number() {
                    return Err(Error::bad_request(
                        "FILTER_SIZE_REQUIRES_NUMBER",
                        format!("$size comparison takes a number, got {n}"),
                    ));
                }
                let sql_op = match op.as_str() {
                    "$eq" => "=",
                    "$ne" | "$neq" => "!=",
                    "$gt" => ">",
                    "$gte" => ">=",
                    "$lt" => "<",
                    "$lte" => "<=",
                    other => return Err(unsupported_operator(other)),
                };
                Ok(format!("{lhs} {sql_op} {}", self.bind(n.clone())))
            }
            _ => Err(Error::bad_request(
                "FILTER_SIZE_REQUIRES_NUMBER",
                format!("$size takes a number or a single numeric operator, got {arg}"),
            )),
        }
    }

    /// `$between`: a two-element array with non-null bounds
    fn between(&mut self, quoted: &str, arg: &Value) -> Result<String> {
        let items = match arg.as_array() {
            Some(items) if items.len() == 2 => items,
            _ => {
                return Err(Error::bad_request(
                    "FILTER_BETWEEN_REQUIRES_ARRAY",
                    format!("$between takes a [min, max] array, got {arg}"),
                ))
            }
        };
        if items.iter().any(Value::is_null) {
            return Err(Error::bad_request(
                "FILTER_BETWEEN_REQUIRES_ARRAY",
                "$between bounds must be non-null",
            ));
        }
        let min = self.bind(items[0].clone());
        let max = self.bind(items[1].clone());
        Ok(format!("{quoted} BETWEEN {min} AND {max}"))
    }
}

fn unsupported_operator(op: &str) -> Error {
    Error::unprocessable(
        "FILTER_UNSUPPORTED_OPERATOR",
        format!("unsupported operator: {op}"),
    )
}

/// Compile the `order` value into an ORDER BY body.
/// Accepts `"field"`, `"field asc"`, `"field desc"`, and
/// `[{field: dir}, …]`; the default direction is ascending.
pub fn compile_order(order: &Value) -> Result<String> {
    let mut terms: Vec<String> = Vec::new();

    match order {
        Value::String(s) => terms.push(order_term_from_str(s)?),
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::String(s) => terms.push(order_term_from_str(s)?),
                    Value::Object(map) => {
                        for (field, dir) in map {
                            ensure_identifier(field, "order field")?;
                            let dir = dir.as_str().ok_or_else(|| invalid_order(dir))?;
                            terms.push(format!(r#""{field}" {}"#, direction(dir)?));
                        }
                    }
                    other => return Err(invalid_order(other)),
                }
            }
        }
        other => return Err(invalid_order(other)),
    }

    if terms.is_empty() {
        return Err(Error::bad_request(
            "FILTER_INVALID_ORDER",
            "order produced no terms",
        ));
    }
    Ok(terms.join(", "))
}

fn order_term_from_str(s: &str) -> Result<String> {
    let mut parts = s.split_whitespace();
    let field = parts
        .next()
        .ok_or_else(|| Error::bad_request("FILTER_INVALID_ORDER", "empty order term"))?;
    ensure_identifier(field, "order field")?;
    let dir = match parts.next() {
        Some(dir) => direction(dir)?,
        None => "ASC",
    };
    if parts.next().is_some() {
        return Err(Error::bad_request(
            "FILTER_INVALID_ORDER",
            format!("malformed order term: {s:?}"),
        ));
    }
    Ok(format!(r#""{field}" {dir}"#))
}

fn direction(dir: &str) -> Result<&'static str> {
    match dir.to_ascii_lowercase().as_str() {
        "asc" => Ok("ASC"),
        "desc" => Ok("DESC"),
        other => Err(Error::bad_request(
            "FILTER_INVALID_ORDER",
            format!("unknown order direction: {other:?}"),
        )),
    }
}

fn invalid_order(value: &Value) -> Error {
    Error::bad_request(
        "FILTER_INVALID_ORDER",
        format!("malformed order entry: {value}"),
    )
}
