//! Predicate compiler
//!
//! Turns `Criteria` plus a `Mode` into SQL WHERE fragments with named bind
//! parameters. Pure: identifiers are quoted through the caller-supplied
//! function and nothing is executed here.
//!
//! ## Output contract
//!
//! - Fragments are joined with AND by the adapter.
//! - Bind names are unique within one compiled predicate. The base name is
//!   the field name (`age`, `age_from`/`age_to`, `id0`, `id1`, ...); a clash
//!   gets a numeric suffix (`age_2`).
//! - Same input, same output: fragment text and binding order follow the
//!   criteria's iteration order.
//! - An empty membership list makes the criteria unsatisfiable and yields
//!   [`Compiled::Unsatisfiable`]; callers return zero rows without querying.
//!   An empty criteria set yields a predicate with no fragments (no WHERE).

use crate::criteria::{Combinator, Comparison, Condition, Criteria, Entry, Mode};
use crate::errors::{ExError, ExErrorKind, Result};
use crate::value::Value;
use serde::Serialize;

/// Ordered bind-parameter name → value map
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Bindings(Vec<(String, Value)>);

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `value` under `base` or the first free `base_N`; returns the name
    /// actually used (without the leading colon).
    pub fn bind(&mut self, base: &str, value: Value) -> String {
        let mut name = base.to_string();
        let mut suffix = 2;
        while self.contains(&name) {
            name = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        self.0.push((name.clone(), value));
        name
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// SQL fragments plus their bindings
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompiledPredicate {
    fragments: Vec<String>,
    bindings: Bindings,
}

impl CompiledPredicate {
    pub fn new(fragments: Vec<String>, bindings: Bindings) -> Self {
        Self {
            fragments,
            bindings,
        }
    }

    /// Single `column = :name` condition, used for primary-key lookups
    pub fn equals(quoted_column: &str, name: &str, value: Value) -> Self {
        let mut bindings = Bindings::new();
        let name = bindings.bind(name, value);
        Self::new(vec![format!("{} = :{}", quoted_column, name)], bindings)
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    /// No fragments: the statement needs no WHERE clause
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Fragments joined the way adapters join them
    pub fn where_clause(&self) -> String {
        self.fragments.join(" AND ")
    }
}

/// Compiler output
#[derive(Debug, Clone, PartialEq)]
pub enum Compiled {
    Where(CompiledPredicate),
    /// No row can match (an empty membership list on a required path)
    Unsatisfiable,
}

impl Compiled {
    pub fn predicate(&self) -> Option<&CompiledPredicate> {
        match self {
            Compiled::Where(p) => Some(p),
            Compiled::Unsatisfiable => None,
        }
    }

    pub fn is_unsatisfiable(&self) -> bool {
        matches!(self, Compiled::Unsatisfiable)
    }
}

/// Compile `criteria` under `mode`, quoting identifiers with `quote`.
///
/// ## Errors
///
/// `ExErrorKind::InvalidCriteria` when a condition does not fit the level's
/// mode (a scalar under `Between`, a membership list that is not a pair
/// under `Between`, an empty field name).
pub fn compile<Q>(criteria: &Criteria, mode: Mode, quote: Q) -> Result<Compiled>
where
    Q: Fn(&str) -> String,
{
    let mut compiler = Compiler {
        quote: &quote,
        bindings: Bindings::new(),
    };

    let Some(conditions) = compiler.level(criteria, mode)? else {
        tracing::debug!("criteria unsatisfiable, skipping query");
        return Ok(Compiled::Unsatisfiable);
    };

    let fragments = match mode.combinator {
        Combinator::Or if conditions.len() > 1 => vec![conditions.join(" OR ")],
        _ => conditions,
    };

    tracing::debug!(
        fragments = fragments.len(),
        bindings = compiler.bindings.len(),
        "compiled predicate"
    );

    Ok(Compiled::Where(CompiledPredicate::new(
        fragments,
        compiler.bindings,
    )))
}

struct Compiler<'q> {
    quote: &'q dyn Fn(&str) -> String,
    bindings: Bindings,
}

impl Compiler<'_> {
    /// Conditions of one level, to be joined by `mode.combinator`.
    /// `None` when the level cannot match any row.
    fn level(&mut self, criteria: &Criteria, mode: Mode) -> Result<Option<Vec<String>>> {
        let mut conditions = Vec::new();
        let mut dropped = false;

        for entry in criteria.entries() {
            let compiled = match entry {
                Entry::Group {
                    criteria: sub,
                    mode: sub_mode,
                } => self
                    .level(sub, *sub_mode)?
                    .map(|sub_conditions| nest(sub_conditions, *sub_mode, mode)),
                Entry::Field { name, condition } => self.field(name, condition, mode)?,
            };

            match compiled {
                Some(parts) => conditions.extend(parts),
                None if mode.combinator == Combinator::And => return Ok(None),
                // An unsatisfiable OR member just contributes nothing
                None => dropped = true,
            }
        }

        if dropped && conditions.is_empty() {
            return Ok(None);
        }
        Ok(Some(conditions))
    }

    fn field(
        &mut self,
        name: &str,
        condition: &Condition,
        mode: Mode,
    ) -> Result<Option<Vec<String>>> {
        if name.is_empty() {
            return Err(invalid_criteria(name, "field name must not be empty"));
        }
        let column = (self.quote)(name);
        let base = param_base(name);

        match (condition, mode.comparison) {
            (Condition::Range(low, high), _) => {
                Ok(Some(self.range(&column, &base, low, high, mode.combinator)))
            }
            (Condition::In(values), Comparison::Between) => match values.as_slice() {
                [low, high] => Ok(Some(self.range(&column, &base, low, high, mode.combinator))),
                _ => Err(invalid_criteria(
                    name,
                    "a Between level needs a two-element range",
                )),
            },
            (Condition::In(values), _) => {
                if values.is_empty() {
                    return Ok(None);
                }
                let names: Vec<String> = values
                    .iter()
                    .enumerate()
                    .map(|(i, v)| {
                        let param = self.bindings.bind(&format!("{}{}", base, i), v.clone());
                        format!(":{}", param)
                    })
                    .collect();
                Ok(Some(vec![format!("{} IN ({})", column, names.join(", "))]))
            }
            (Condition::Value(_), Comparison::Between) => Err(invalid_criteria(
                name,
                "scalar value under a Between level; use a range",
            )),
            (Condition::Value(Value::Null), Comparison::Exact) => {
                Ok(Some(vec![format!("{} IS NULL", column)]))
            }
            (Condition::Value(Value::Null), Comparison::Not) => {
                Ok(Some(vec![format!("{} IS NOT NULL", column)]))
            }
            (Condition::Value(value), comparison) => {
                let (operator, bound) = operator_for(comparison, value);
                let param = self.bindings.bind(&base, bound);
                Ok(Some(vec![format!("{} {} :{}", column, operator, param)]))
            }
        }
    }

    fn range(
        &mut self,
        column: &str,
        base: &str,
        low: &Value,
        high: &Value,
        combinator: Combinator,
    ) -> Vec<String> {
        let from = self.bindings.bind(&format!("{}_from", base), low.clone());
        let to = self.bindings.bind(&format!("{}_to", base), high.clone());
        let lower = format!("{} >= :{}", column, from);
        let upper = format!("{} <= :{}", column, to);
        match combinator {
            Combinator::And => vec![lower, upper],
            Combinator::Or => vec![format!("({} AND {})", lower, upper)],
        }
    }
}

/// Render a compiled sub-group as conditions of its parent level
fn nest(conditions: Vec<String>, sub_mode: Mode, parent: Mode) -> Vec<String> {
    if sub_mode.combinator == parent.combinator || conditions.len() <= 1 {
        return conditions;
    }
    let separator = format!(" {} ", sub_mode.combinator.keyword());
    vec![format!("({})", conditions.join(&separator))]
}

fn operator_for(comparison: Comparison, value: &Value) -> (&'static str, Value) {
    match comparison {
        Comparison::Exact => ("=", value.clone()),
        Comparison::Like => ("LIKE", Value::Text(format!("%{}%", value))),
        Comparison::Starts => ("LIKE", Value::Text(format!("{}%", value))),
        Comparison::NoCase => ("LIKE", value.clone()),
        Comparison::Bit => ("&", value.clone()),
        Comparison::Greater => (">", value.clone()),
        Comparison::Less => ("<", value.clone()),
        Comparison::Not => ("!=", value.clone()),
        // Between never reaches here; `field` routes it to `range`
        Comparison::Between => ("=", value.clone()),
    }
}

/// Parameter base name: field name with anything outside `[A-Za-z0-9_]`
/// replaced, so dotted or quoted names still produce valid placeholders
fn param_base(field: &str) -> String {
    field
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

fn invalid_criteria(field: &str, reason: &str) -> ExError {
    ExError::new(ExErrorKind::InvalidCriteria)
        .with_op("compile_predicate")
        .with_field(field)
        .with_message(reason.to_string())
}
