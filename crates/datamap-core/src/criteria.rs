//! Search criteria and operator modes
//!
//! A `Criteria` is an ordered list of entries. Each entry is either a field
//! condition or a nested group compiled under its own `Mode`. The comparison
//! family and the combinator are separate enums, so a compiled level can
//! never carry two families at once.

use crate::errors::{ExError, ExErrorKind, Result};
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Legacy bitmask values, accepted by [`Mode::from_bits`]
pub mod bits {
    pub const EXACT: u32 = 1;
    pub const LIKE: u32 = 2;
    pub const STARTS: u32 = 4;
    pub const NOCASE: u32 = 8;
    pub const BIT: u32 = 16;
    pub const GREATER: u32 = 32;
    pub const LESS: u32 = 64;
    pub const AND: u32 = 128;
    pub const OR: u32 = 256;
    pub const NOT: u32 = 512;
    pub const BETWEEN: u32 = 1024;
}

/// Comparison family applied to every scalar condition of one level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Exact,
    /// Substring match: `LIKE %v%`
    Like,
    /// Prefix match: `LIKE v%`
    Starts,
    /// `LIKE v`; case folding is left to the store's collation
    NoCase,
    /// Bitwise test: `field & v`
    Bit,
    Greater,
    Less,
    Not,
    /// Every field of the level must be a range
    Between,
}

impl Comparison {
    const ALL: [(u32, Comparison); 9] = [
        (bits::EXACT, Comparison::Exact),
        (bits::LIKE, Comparison::Like),
        (bits::STARTS, Comparison::Starts),
        (bits::NOCASE, Comparison::NoCase),
        (bits::BIT, Comparison::Bit),
        (bits::GREATER, Comparison::Greater),
        (bits::LESS, Comparison::Less),
        (bits::NOT, Comparison::Not),
        (bits::BETWEEN, Comparison::Between),
    ];

    pub fn bit(&self) -> u32 {
        Self::ALL
            .iter()
            .find(|(_, c)| c == self)
            .map_or(0, |(bit, _)| *bit)
    }
}

/// How the conditions of one level are joined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combinator {
    #[default]
    And,
    Or,
}

impl Combinator {
    pub fn keyword(&self) -> &'static str {
        match self {
            Combinator::And => "AND",
            Combinator::Or => "OR",
        }
    }
}

/// Comparison family plus combinator for one compiled level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mode {
    pub comparison: Comparison,
    pub combinator: Combinator,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::new(Comparison::Exact, Combinator::And)
    }
}

impl Mode {
    pub const fn new(comparison: Comparison, combinator: Combinator) -> Self {
        Self {
            comparison,
            combinator,
        }
    }

    pub const fn and(comparison: Comparison) -> Self {
        Self::new(comparison, Combinator::And)
    }

    pub const fn or(comparison: Comparison) -> Self {
        Self::new(comparison, Combinator::Or)
    }

    /// Decode a legacy bitmask.
    ///
    /// Exactly one comparison bit is required. AND is assumed when no
    /// combinator bit is set; setting both AND and OR, or any unknown bit,
    /// is rejected.
    pub fn from_bits(mask: u32) -> Result<Self> {
        let known = Comparison::ALL
            .iter()
            .fold(bits::AND | bits::OR, |acc, (bit, _)| acc | bit);
        if mask & !known != 0 {
            return Err(invalid_mode(mask, "unknown bits set"));
        }

        let mut families = Comparison::ALL.iter().filter(|(bit, _)| mask & bit != 0);
        let comparison = match (families.next(), families.next()) {
            (Some((_, c)), None) => *c,
            (None, _) => return Err(invalid_mode(mask, "no comparison family selected")),
            (Some(_), Some(_)) => {
                return Err(invalid_mode(mask, "comparison families are mutually exclusive"))
            }
        };

        let combinator = match (mask & bits::AND != 0, mask & bits::OR != 0) {
            (true, true) => return Err(invalid_mode(mask, "both AND and OR selected")),
            (_, true) => Combinator::Or,
            _ => Combinator::And,
        };

        Ok(Mode::new(comparison, combinator))
    }

    pub fn bits(&self) -> u32 {
        let combinator = match self.combinator {
            Combinator::And => bits::AND,
            Combinator::Or => bits::OR,
        };
        self.comparison.bit() | combinator
    }
}

fn invalid_mode(mask: u32, reason: &str) -> ExError {
    ExError::new(ExErrorKind::InvalidMode)
        .with_op("mode_from_bits")
        .with_message(format!("invalid operator mode {:#x}: {}", mask, reason))
}

/// Right-hand side of a field condition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Condition {
    /// Compared with the level's comparison family
    Value(Value),
    /// Inclusive range; rendered as `>= low AND <= high` under any comparison
    Range(Value, Value),
    /// Membership list; empty means nothing can match
    In(Vec<Value>),
}

/// One criteria entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Entry {
    Field { name: String, condition: Condition },
    Group { criteria: Criteria, mode: Mode },
}

/// Ordered search criteria
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Criteria {
    entries: Vec<Entry>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scalar condition, compared per the level's mode
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.push(Entry::Field {
            name: name.into(),
            condition: Condition::Value(value.into()),
        });
        self
    }

    /// Inclusive range condition for `Between` levels
    pub fn between(
        mut self,
        name: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.entries.push(Entry::Field {
            name: name.into(),
            condition: Condition::Range(low.into(), high.into()),
        });
        self
    }

    /// Membership condition: `name IN (...)`
    pub fn one_of<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.entries.push(Entry::Field {
            name: name.into(),
            condition: Condition::In(values.into_iter().map(Into::into).collect()),
        });
        self
    }

    /// Nested group compiled under its own mode
    pub fn group(mut self, criteria: Criteria, mode: Mode) -> Self {
        self.entries.push(Entry::Group { criteria, mode });
        self
    }

    pub fn push(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Criteria {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Criteria::new(), |acc, (k, v)| acc.field(k, v))
    }
}

/// Options for `find_by_field`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FindOptions {
    /// Raw ORDER BY expression; trusted caller input, not parameterized
    pub order: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Options for `delete_by_field`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    pub limit: Option<u64>,
}
