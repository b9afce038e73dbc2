//! Fact tuple enumeration.
//!
//! A rule declaring facts `a, b, c` fires once per combination of one
//! instance per fact. [`TupleEnumerator`] walks those combinations lazily in
//! odometer order: the first declared fact is the fastest-varying digit and
//! the last declared fact the slowest. Only the odometer itself is held in
//! memory, never the full product.

use crate::error::ValidationError;
use crate::value::Value;

/// One assignment of an instance to each bound fact identifier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tuple<'a> {
    bindings: Vec<(&'a str, &'a Value)>,
}

impl<'a> Tuple<'a> {
    /// Creates an empty tuple.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Binds a fact identifier, returning the tuple.
    #[must_use]
    pub fn bind(mut self, id: &'a str, value: &'a Value) -> Self {
        self.bindings.push((id, value));
        self
    }

    /// Returns the instance bound to `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&'a Value> {
        self.bindings.iter().find(|(k, _)| *k == id).map(|(_, v)| *v)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.bindings.iter().any(|(k, _)| *k == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Iterates bindings in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Value)> + '_ {
        self.bindings.iter().copied()
    }
}

/// Candidate instances for each declared fact, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct FactCandidates<'a> {
    entries: Vec<(&'a str, Vec<&'a Value>)>,
}

impl<'a> FactCandidates<'a> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends the candidates for the next declared fact.
    pub fn push(&mut self, id: &'a str, candidates: Vec<&'a Value>) {
        self.entries.push((id, candidates));
    }

    /// Appends the candidates for the next declared fact, returning self.
    #[must_use]
    pub fn with(mut self, id: &'a str, candidates: &'a [Value]) -> Self {
        self.push(id, candidates.iter().collect());
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of tuples these candidates produce, or `None` on overflow.
    #[must_use]
    pub fn combinations(&self) -> Option<usize> {
        if self.entries.is_empty() {
            return Some(0);
        }
        self.entries
            .iter()
            .try_fold(1usize, |acc, (_, c)| acc.checked_mul(c.len()))
    }
}

/// Lazy, forward-only iterator over every tuple of a [`FactCandidates`].
#[derive(Debug)]
pub struct TupleEnumerator<'a> {
    candidates: FactCandidates<'a>,
    odometer: Vec<usize>,
    exhausted: bool,
}

impl<'a> TupleEnumerator<'a> {
    /// Creates an enumerator.
    ///
    /// # Errors
    /// Returns `EmptyCandidates` if any fact has no candidate instances. Zero
    /// declared facts is not an error; such an enumerator yields nothing.
    pub fn new(candidates: FactCandidates<'a>) -> Result<Self, ValidationError> {
        if let Some((id, _)) = candidates.entries.iter().find(|(_, c)| c.is_empty()) {
            return Err(ValidationError::EmptyCandidates {
                fact: (*id).to_string(),
            });
        }
        let exhausted = candidates.entries.is_empty();
        Ok(Self {
            odometer: vec![0; candidates.entries.len()],
            candidates,
            exhausted,
        })
    }

    fn current(&self) -> Tuple<'a> {
        let bindings = self
            .candidates
            .entries
            .iter()
            .zip(&self.odometer)
            .map(|((id, values), &i)| (*id, values[i]))
            .collect();
        Tuple { bindings }
    }

    fn advance(&mut self) {
        for (digit, (_, values)) in self.odometer.iter_mut().zip(&self.candidates.entries) {
            *digit += 1;
            if *digit < values.len() {
                return;
            }
            *digit = 0;
        }
        self.exhausted = true;
    }
}

impl<'a> Iterator for TupleEnumerator<'a> {
    type Item = Tuple<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        let tuple = self.current();
        self.advance();
        Some(tuple)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<Value> {
        values.iter().map(|v| Value::from(*v)).collect()
    }

    fn render(tuple: &Tuple<'_>) -> String {
        tuple.iter().filter_map(|(_, v)| v.as_str()).collect()
    }

    #[test]
    fn odometer_order_first_declared_varies_fastest() {
        let a = names(&["A1", "A2", "A3"]);
        let b = names(&["B1", "B2"]);
        let c = names(&["C1"]);
        let d = names(&["D1", "D2"]);
        let candidates = FactCandidates::new()
            .with("a", &a)
            .with("b", &b)
            .with("c", &c)
            .with("d", &d);
        assert_eq!(candidates.combinations(), Some(12));

        let produced: Vec<String> = TupleEnumerator::new(candidates).unwrap().map(|t| render(&t)).collect();
        assert_eq!(
            produced,
            vec![
                "A1B1C1D1", "A2B1C1D1", "A3B1C1D1", "A1B2C1D1", "A2B2C1D1", "A3B2C1D1",
                "A1B1C1D2", "A2B1C1D2", "A3B1C1D2", "A1B2C1D2", "A2B2C1D2", "A3B2C1D2",
            ]
        );
    }

    #[test]
    fn empty_candidate_list_is_an_error() {
        let a = names(&["A1"]);
        let empty: Vec<Value> = Vec::new();
        let candidates = FactCandidates::new().with("a", &a).with("b", &empty);
        let err = TupleEnumerator::new(candidates).unwrap_err();
        assert_eq!(err, ValidationError::EmptyCandidates { fact: "b".to_string() });
    }

    #[test]
    fn zero_identifiers_yield_nothing() {
        let mut it = TupleEnumerator::new(FactCandidates::new()).unwrap();
        assert!(it.next().is_none());
    }

    #[test]
    fn single_identifier_and_exhaustion() {
        let a = names(&["x", "y"]);
        let mut it = TupleEnumerator::new(FactCandidates::new().with("a", &a)).unwrap();
        assert_eq!(it.next().and_then(|t| t.get("a").cloned()), Some(Value::from("x")));
        assert_eq!(it.next().and_then(|t| t.get("a").cloned()), Some(Value::from("y")));
        assert!(it.next().is_none());
        assert!(it.next().is_none());
    }

    #[test]
    fn tuple_lookup() {
        let v = Value::Int(1);
        let tuple = Tuple::new().bind("a", &v);
        assert!(tuple.contains("a"));
        assert!(!tuple.contains("b"));
        assert_eq!(tuple.get("a"), Some(&v));
        assert_eq!(tuple.len(), 1);
    }
}
