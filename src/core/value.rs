use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use crate::core::{ListError, Result};

/// Scalar property value read from the identity store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
}

impl Value {
    /// Strict comparison used by filter conditions; mismatched types are an error
    pub fn compare(&self, other: &Value) -> Result<Ordering> {
        match (self, other) {
            // ========================================
            // NULL handling: NULL is "greater" than all values (NULL LAST)
            // ========================================
            (Value::Null, Value::Null) => Ok(Ordering::Equal),
            (Value::Null, _) => Ok(Ordering::Greater),
            (_, Value::Null) => Ok(Ordering::Less),

            (Value::Integer(a), Value::Integer(b)) => Ok(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => Ok(compare_floats(*a, *b)),
            (Value::Integer(a), Value::Float(b)) => Ok(compare_int_float(*a, *b)),
            (Value::Float(a), Value::Integer(b)) => Ok(compare_int_float(*b, *a).reverse()),
            (Value::Text(a), Value::Text(b)) => Ok(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Ok(a.cmp(b)),

            _ => Err(ListError::TypeMismatch(format!(
                "Cannot compare incompatible types: {} and {}",
                self.type_name(),
                other.type_name()
            ))),
        }
    }

    /// Total order over non-null values, used by sorting.
    ///
    /// Values of different types order by type rank so that a mixed column
    /// still sorts deterministically instead of failing mid-sort.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match self.compare(other) {
            Ok(ordering) => ordering,
            Err(_) => self.type_rank().cmp(&other.type_rank()),
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Self::Boolean(_) => 0,
            Self::Integer(_) | Self::Float(_) => 1,
            Self::Text(_) => 2,
            Self::Null => 3,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Integer(_) => "INTEGER",
            Self::Float(_) => "FLOAT",
            Self::Text(_) => "TEXT",
            Self::Boolean(_) => "BOOLEAN",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// IEEE order with the two zeros equal; NaNs fall back to `total_cmp`
fn compare_floats(a: f64, b: f64) -> Ordering {
    if a == b { Ordering::Equal } else { a.total_cmp(&b) }
}

/// Exact comparison of an integer against a float, without rounding the
/// integer through `f64`
fn compare_int_float(i: i64, f: f64) -> Ordering {
    // 2^63, the first float above every i64
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if f.is_nan() {
        return if f.is_sign_negative() { Ordering::Greater } else { Ordering::Less };
    }
    if f >= LIMIT {
        return Ordering::Less;
    }
    if f < -LIMIT {
        return Ordering::Greater;
    }
    let whole = f.trunc();
    match i.cmp(&(whole as i64)) {
        Ordering::Equal => compare_floats(whole, f),
        ordering => ordering,
    }
}

/// The integer an integral float equals, if one does
fn integral(f: f64) -> Option<i64> {
    (f.fract() == 0.0 && compare_int_float(f as i64, f) == Ordering::Equal).then_some(f as i64)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Integer(_) | Self::Float(_), Self::Integer(_) | Self::Float(_)) => {
                self.compare(other) == Ok(Ordering::Equal)
            }
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Null => 0u8.hash(state),
            Self::Integer(i) => {
                1u8.hash(state);
                i.hash(state);
            }
            Self::Float(f) => match integral(*f) {
                Some(i) => {
                    1u8.hash(state);
                    i.hash(state);
                }
                None => {
                    2u8.hash(state);
                    f.to_bits().hash(state);
                }
            },
            Self::Text(s) => {
                3u8.hash(state);
                s.hash(state);
            }
            Self::Boolean(b) => {
                4u8.hash(state);
                b.hash(state);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(fl) => write!(f, "{}", fl),
            Self::Text(s) => write!(f, "{}", s),
            Self::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_equality() {
        assert_eq!(Value::Integer(42), Value::Integer(42));
        assert_eq!(Value::Integer(2), Value::Float(2.0));
        assert_ne!(Value::Text("a".into()), Value::Integer(1));
    }

    #[test]
    fn test_strict_compare_rejects_mixed_types() {
        assert!(Value::Text("a".into()).compare(&Value::Integer(1)).is_err());
        assert_eq!(
            Value::Null.compare(&Value::Integer(0)).unwrap(),
            Ordering::Greater
        );
    }

    #[test]
    fn test_mixed_numbers_compare_exactly_beyond_f64_precision() {
        let big = 1_i64 << 53;
        let float = Value::Float(big as f64);

        assert_eq!(Value::Integer(big), float);
        assert_ne!(float, Value::Integer(big + 1));
        assert_eq!(float.total_cmp(&Value::Integer(big + 1)), Ordering::Less);
        assert_eq!(Value::Integer(big + 1).total_cmp(&float), Ordering::Greater);
        assert_eq!(Value::Integer(2).total_cmp(&Value::Float(2.5)), Ordering::Less);
        assert_eq!(Value::Integer(-3).total_cmp(&Value::Float(-2.5)), Ordering::Less);
        assert_eq!(Value::Integer(i64::MAX).total_cmp(&Value::Float(1e300)), Ordering::Less);
        assert_eq!(Value::Integer(0).total_cmp(&Value::Float(f64::NAN)), Ordering::Less);
    }

    #[test]
    fn test_equal_numbers_hash_alike() {
        use std::collections::HashSet;

        let set: HashSet<Value> = [Value::Integer(2), Value::Float(2.0), Value::Float(-0.0), Value::Integer(0)]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_total_cmp_orders_mixed_types_by_rank() {
        assert_eq!(
            Value::Integer(99).total_cmp(&Value::Text("a".into())),
            Ordering::Less
        );
        assert_eq!(
            Value::Text("b".into()).total_cmp(&Value::Text("a".into())),
            Ordering::Greater
        );
    }
}
