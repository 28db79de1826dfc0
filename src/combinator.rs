//! Parameter constraints and their expansion into concrete assignments.
//!
//! A [`Constraints`] set maps parameter names to one or many candidate values.
//! Expanding it produces the cross product of all candidates: every possible
//! way of picking exactly one value per name.

use indexmap::IndexMap;
use serde_json::Value;

use crate::param::render;

/// A single, fully resolved choice of value per constrained parameter.
pub type Assignment = IndexMap<String, String>;

/// Candidate values for one parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Exactly one allowed value.
    Scalar(Value),
    /// Any of the listed values.
    Many(Vec<Value>),
    /// No candidates at all. This is *not* "don't care": an unset entry
    /// expands to nothing, so to leave a parameter unconstrained omit it.
    Unset,
}

impl Constraint {
    /// Normalized candidate list, already in serialized form.
    pub fn candidates(&self) -> Vec<String> {
        match self {
            Constraint::Scalar(value) => vec![render(value)],
            Constraint::Many(values) => values.iter().map(render).collect(),
            Constraint::Unset => Vec::new(),
        }
    }
}

macro_rules! impl_scalar {
    ($($T:ty),*) => {
        $(
            impl From<$T> for Constraint {
                fn from(value: $T) -> Self {
                    Constraint::Scalar(Value::from(value))
                }
            }
        )*
    };
}

impl_scalar!(&str, String, bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl From<Value> for Constraint {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Constraint::Unset,
            Value::Array(values) => Constraint::Many(values),
            other => Constraint::Scalar(other),
        }
    }
}

impl<T: Into<Value>> From<Vec<T>> for Constraint {
    fn from(values: Vec<T>) -> Self {
        Constraint::Many(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Constraint {
    fn from(values: [T; N]) -> Self {
        Constraint::Many(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Constraint>> From<Option<T>> for Constraint {
    fn from(value: Option<T>) -> Self {
        value.map_or(Constraint::Unset, Into::into)
    }
}

/// Ordered set of parameter constraints.
///
/// # Example
///
/// ```rust
/// use taskpath::Constraints;
///
/// let constraints = Constraints::new()
///     .with("exp", 1003)
///     .with("run", [1, 2, 3]);
///
/// assert_eq!(constraints.expand().len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraints(IndexMap<String, Constraint>);

impl Constraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, constraint: impl Into<Constraint>) -> Self {
        self.insert(name, constraint);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, constraint: impl Into<Constraint>) {
        self.0.insert(name.into(), constraint.into());
    }

    pub fn get(&self, name: &str) -> Option<&Constraint> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Constraint)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every entry as a list of serialized candidates.
    pub fn normalized(&self) -> IndexMap<String, Vec<String>> {
        self.0
            .iter()
            .map(|(name, constraint)| (name.clone(), constraint.candidates()))
            .collect()
    }

    /// Lazily expands the cross product of all candidates.
    pub fn expand(&self) -> Expansion {
        Expansion::new(self.normalized())
    }
}

impl<K, V> FromIterator<(K, V)> for Constraints
where
    K: Into<String>,
    V: Into<Constraint>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut constraints = Self::new();
        for (name, constraint) in iter {
            constraints.insert(name, constraint);
        }
        constraints
    }
}

/// Expands constraints into every concrete assignment.
///
/// Key order follows the input and the last key varies fastest. An empty
/// constraint set, or any entry without candidates, expands to nothing.
pub fn expand(constraints: &Constraints) -> Expansion {
    constraints.expand()
}

/// Iterator over the cross product, see [`expand`].
#[derive(Debug, Clone)]
pub struct Expansion {
    names: Vec<String>,
    candidates: Vec<Vec<String>>,
    cursor: Vec<usize>,
    remaining: usize,
}

impl Expansion {
    fn new(normalized: IndexMap<String, Vec<String>>) -> Self {
        let (names, candidates): (Vec<_>, Vec<_>) = normalized.into_iter().unzip();

        let remaining = match candidates.is_empty() {
            true => 0,
            false => candidates
                .iter()
                .map(Vec::len)
                .fold(1usize, usize::saturating_mul),
        };

        Self {
            cursor: vec![0; names.len()],
            names,
            candidates,
            remaining,
        }
    }

    fn advance(&mut self) {
        for i in (0..self.cursor.len()).rev() {
            self.cursor[i] += 1;
            if self.cursor[i] < self.candidates[i].len() {
                return;
            }
            self.cursor[i] = 0;
        }
    }
}

impl Iterator for Expansion {
    type Item = Assignment;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let assignment = self
            .names
            .iter()
            .zip(&self.candidates)
            .zip(&self.cursor)
            .map(|((name, values), &i)| (name.clone(), values[i].clone()))
            .collect();

        self.advance();
        self.remaining -= 1;

        Some(assignment)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Expansion {}
