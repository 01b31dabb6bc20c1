//! Instance types: Universe, TupleSet, Bounds, and Instance
//!
//! A universe is an ordered set of named atoms. Tuples are stored as flat
//! row-major indices into `universe.size() ^ arity`; a tuple set optionally
//! attaches a weight to each index, which is how both quantitative bounds
//! and solved weighted instances are represented.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use crate::ast::Relation;
use crate::error::{KodkodError, Result, TranslationError};
use crate::num::Number;

/// An ordered set of uniquely named atoms.
#[derive(Clone)]
pub struct Universe {
    inner: Rc<UniverseInner>,
}

struct UniverseInner {
    atoms: Vec<String>,
    indices: FxHashMap<String, usize>,
}

impl Universe {
    /// Creates a universe from atom names.
    ///
    /// # Errors
    /// Fails if the slice is empty or contains duplicates.
    pub fn new(atoms: &[&str]) -> Result<Self> {
        if atoms.is_empty() {
            return Err(TranslationError::InvalidBounds(
                "cannot create an empty universe".to_string(),
            )
            .into());
        }
        let mut indices = FxHashMap::default();
        for (i, &atom) in atoms.iter().enumerate() {
            if indices.insert(atom.to_string(), i).is_some() {
                return Err(TranslationError::InvalidBounds(format!(
                    "atom {} appears multiple times",
                    atom
                ))
                .into());
            }
        }
        Ok(Self {
            inner: Rc::new(UniverseInner {
                atoms: atoms.iter().map(|s| s.to_string()).collect(),
                indices,
            }),
        })
    }

    /// Number of atoms.
    pub fn size(&self) -> usize {
        self.inner.atoms.len()
    }

    /// The atom at the given index.
    pub fn atom(&self, index: usize) -> &str {
        &self.inner.atoms[index]
    }

    /// All atoms, in order.
    pub fn atoms(&self) -> &[String] {
        &self.inner.atoms
    }

    /// The index of the given atom, if present.
    pub fn index_of(&self, atom: &str) -> Option<usize> {
        self.inner.indices.get(atom).copied()
    }
}

impl PartialEq for Universe {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Universe {}

impl fmt::Debug for Universe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Universe({:?})", self.inner.atoms)
    }
}

/// A set of same-arity tuples over one universe, optionally weighted.
///
/// Tuples without an explicit weight carry weight 1; a tuple set where every
/// weight is 1 describes a boolean relation.
#[derive(Clone, Debug)]
pub struct TupleSet {
    universe: Universe,
    arity: usize,
    indices: BTreeSet<usize>,
    weights: BTreeMap<usize, Number>,
}

impl TupleSet {
    /// An empty tuple set of the given arity.
    pub fn empty(universe: Universe, arity: usize) -> Self {
        assert!(arity >= 1, "arity must be at least 1");
        Self {
            universe,
            arity,
            indices: BTreeSet::new(),
            weights: BTreeMap::new(),
        }
    }

    /// A tuple set from named tuples, each with weight 1.
    pub fn of(universe: Universe, tuples: &[&[&str]]) -> Result<Self> {
        assert!(!tuples.is_empty(), "use TupleSet::empty for an empty set");
        let mut set = Self::empty(universe, tuples[0].len());
        for &tuple in tuples {
            set.add(tuple)?;
        }
        Ok(set)
    }

    /// A tuple set from named tuples with explicit weights.
    pub fn of_weighted(universe: Universe, tuples: &[(&[&str], f64)]) -> Result<Self> {
        assert!(!tuples.is_empty(), "use TupleSet::empty for an empty set");
        let mut set = Self::empty(universe, tuples[0].0.len());
        for &(tuple, weight) in tuples {
            let index = set.index_of_tuple(tuple)?;
            set.add_weighted_index(index, Number::Real(weight));
        }
        Ok(set)
    }

    /// Every tuple of the given arity, each with weight 1.
    pub fn all(universe: Universe, arity: usize) -> Self {
        let mut set = Self::empty(universe, arity);
        for index in 0..set.capacity() {
            set.indices.insert(index);
        }
        set
    }

    fn index_of_tuple(&self, atoms: &[&str]) -> Result<usize> {
        if atoms.len() != self.arity {
            return Err(TranslationError::InvalidBounds(format!(
                "expected a tuple of arity {}, got {:?}",
                self.arity, atoms
            ))
            .into());
        }
        let mut index = 0;
        for &atom in atoms {
            let atom_index = self.universe.index_of(atom).ok_or_else(|| {
                KodkodError::from(TranslationError::InvalidBounds(format!(
                    "atom {} is not in the universe",
                    atom
                )))
            })?;
            index = index * self.universe.size() + atom_index;
        }
        Ok(index)
    }

    /// Adds a named tuple with weight 1.
    pub fn add(&mut self, atoms: &[&str]) -> Result<()> {
        let index = self.index_of_tuple(atoms)?;
        self.indices.insert(index);
        Ok(())
    }

    /// Adds a named tuple with the given weight.
    pub fn add_weighted(&mut self, atoms: &[&str], weight: Number) -> Result<()> {
        let index = self.index_of_tuple(atoms)?;
        self.add_weighted_index(index, weight);
        Ok(())
    }

    /// Adds a flat tuple index with weight 1.
    pub fn add_index(&mut self, index: usize) {
        assert!(index < self.capacity(), "tuple index out of capacity");
        self.indices.insert(index);
    }

    /// Adds a flat tuple index with the given weight.
    pub fn add_weighted_index(&mut self, index: usize, weight: Number) {
        assert!(index < self.capacity(), "tuple index out of capacity");
        self.indices.insert(index);
        if weight.is_one() {
            self.weights.remove(&index);
        } else {
            self.weights.insert(index, weight);
        }
    }

    /// The arity of the stored tuples.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// The universe the tuples range over.
    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    /// `universe.size() ^ arity`
    pub fn capacity(&self) -> usize {
        self.universe.size().pow(self.arity as u32)
    }

    /// Number of stored tuples.
    pub fn size(&self) -> usize {
        self.indices.len()
    }

    /// True if no tuples are stored.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// True if the given flat index is stored.
    pub fn contains_index(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }

    /// True if every tuple of `other` is stored here.
    pub fn contains_all(&self, other: &TupleSet) -> bool {
        other.indices.is_subset(&self.indices)
    }

    /// The stored flat indices, ascending.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }

    /// The stored flat indices as a vector.
    pub fn index_vec(&self) -> Vec<usize> {
        self.indices.iter().copied().collect()
    }

    /// The weight of the tuple at `index`: the stored weight, 1 for a
    /// stored tuple without one, `None` for an absent tuple.
    pub fn weight(&self, index: usize) -> Option<Number> {
        if !self.indices.contains(&index) {
            return None;
        }
        Some(self.weights.get(&index).copied().unwrap_or(Number::Int(1)))
    }

    /// True if every stored tuple carries weight 1.
    pub fn is_unweighted(&self) -> bool {
        self.weights.is_empty()
    }

    /// Decodes a flat index into its atom names.
    pub fn atoms_of(&self, mut index: usize) -> Vec<&str> {
        let mut names = vec![""; self.arity];
        for i in (0..self.arity).rev() {
            names[i] = self.universe.atom(index % self.universe.size());
            index /= self.universe.size();
        }
        names
    }
}

/// Lower and upper bounds for each relation of a problem.
#[derive(Clone, Debug)]
pub struct Bounds {
    universe: Universe,
    lowers: IndexMap<Relation, TupleSet>,
    uppers: IndexMap<Relation, TupleSet>,
}

impl Bounds {
    /// Creates empty bounds over the given universe.
    pub fn new(universe: Universe) -> Self {
        Self {
            universe,
            lowers: IndexMap::new(),
            uppers: IndexMap::new(),
        }
    }

    /// The universe of discourse.
    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    /// Bounds `relation` between `lower` (must-be-in) and `upper`
    /// (may-be-in).
    ///
    /// # Errors
    /// Fails when arities disagree, the tuple sets range over a different
    /// universe, or the lower bound is not included in the upper bound.
    pub fn bound(&mut self, relation: &Relation, lower: TupleSet, upper: TupleSet) -> Result<()> {
        if lower.arity() != relation.arity() || upper.arity() != relation.arity() {
            return Err(TranslationError::InvalidBounds(format!(
                "bound arity does not match relation {}",
                relation
            ))
            .into());
        }
        if *lower.universe() != self.universe || *upper.universe() != self.universe {
            return Err(TranslationError::InvalidBounds(format!(
                "bounds for {} range over a different universe",
                relation
            ))
            .into());
        }
        if !upper.contains_all(&lower) {
            return Err(TranslationError::InvalidBounds(format!(
                "lower bound of {} is not included in its upper bound",
                relation
            ))
            .into());
        }
        self.lowers.insert(relation.clone(), lower);
        self.uppers.insert(relation.clone(), upper);
        Ok(())
    }

    /// Bounds `relation` exactly to the given tuples.
    pub fn bound_exactly(&mut self, relation: &Relation, tuples: TupleSet) -> Result<()> {
        self.bound(relation, tuples.clone(), tuples)
    }

    /// The bounded relations, in insertion order. The order drives the
    /// deterministic allocation of primary variables.
    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.lowers.keys()
    }

    /// The lower bound of `relation`, if bounded.
    pub fn lower_bound(&self, relation: &Relation) -> Option<&TupleSet> {
        self.lowers.get(relation)
    }

    /// The upper bound of `relation`, if bounded.
    pub fn upper_bound(&self, relation: &Relation) -> Option<&TupleSet> {
        self.uppers.get(relation)
    }

    /// True if every relation is bound exactly.
    pub fn all_exact(&self) -> bool {
        self.lowers.iter().all(|(r, lower)| {
            self.uppers
                .get(r)
                .map(|upper| lower.size() == upper.size())
                .unwrap_or(false)
        })
    }
}

/// A weighted relational instance: the model lifted back from the solver.
#[derive(Clone, Debug)]
pub struct Instance {
    universe: Universe,
    tuples: IndexMap<Relation, TupleSet>,
}

impl Instance {
    /// Creates an empty instance over the given universe.
    pub fn new(universe: Universe) -> Self {
        Self {
            universe,
            tuples: IndexMap::new(),
        }
    }

    /// The universe of discourse.
    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    /// Maps `relation` to the given tuples.
    ///
    /// # Errors
    /// Fails when the arity disagrees or the tuples range over a different
    /// universe.
    pub fn add(&mut self, relation: &Relation, tuples: TupleSet) -> Result<()> {
        if tuples.arity() != relation.arity() {
            return Err(TranslationError::InvalidBounds(format!(
                "tuple arity does not match relation {}",
                relation
            ))
            .into());
        }
        if *tuples.universe() != self.universe {
            return Err(TranslationError::InvalidBounds(format!(
                "tuples for {} range over a different universe",
                relation
            ))
            .into());
        }
        self.tuples.insert(relation.clone(), tuples);
        Ok(())
    }

    /// The relations this instance interprets.
    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.tuples.keys()
    }

    /// The tuples of `relation`, if interpreted.
    pub fn tuples(&self, relation: &Relation) -> Option<&TupleSet> {
        self.tuples.get(relation)
    }

    /// All relation-to-tuples pairs.
    pub fn relation_tuples(&self) -> &IndexMap<Relation, TupleSet> {
        &self.tuples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn universe_rejects_duplicates() {
        assert!(Universe::new(&["A", "B", "A"]).is_err());
        assert!(Universe::new(&[]).is_err());
        let u = Universe::new(&["A", "B"]).unwrap();
        assert_eq!(u.size(), 2);
        assert_eq!(u.index_of("B"), Some(1));
        assert_eq!(u.index_of("C"), None);
    }

    #[test]
    fn tuple_indices_are_row_major() {
        let u = Universe::new(&["A", "B", "C"]).unwrap();
        let ts = TupleSet::of(u, &[&["B", "C"]]).unwrap();
        // B = 1, C = 2, index = 1 * 3 + 2
        assert!(ts.contains_index(5));
        assert_eq!(ts.atoms_of(5), vec!["B", "C"]);
    }

    #[test]
    fn weights_default_to_one() {
        let u = Universe::new(&["A", "B"]).unwrap();
        let mut ts = TupleSet::empty(u, 1);
        ts.add(&["A"]).unwrap();
        ts.add_weighted(&["B"], Number::Real(0.5)).unwrap();

        assert_eq!(ts.weight(0), Some(Number::Int(1)));
        assert_eq!(ts.weight(1), Some(Number::Real(0.5)));
        assert!(!ts.is_unweighted());
    }

    #[test]
    fn bounds_validate_inclusion() {
        let u = Universe::new(&["A", "B"]).unwrap();
        let r = Relation::unary("R");

        let lower = TupleSet::of(u.clone(), &[&["A"]]).unwrap();
        let upper = TupleSet::of(u.clone(), &[&["B"]]).unwrap();

        let mut bounds = Bounds::new(u.clone());
        assert!(bounds.bound(&r, lower.clone(), upper).is_err());

        let upper = TupleSet::of(u.clone(), &[&["A"], &["B"]]).unwrap();
        assert!(bounds.bound(&r, lower, upper).is_ok());
        assert!(!bounds.all_exact());
    }

    #[test]
    fn exact_bounds_are_detected() {
        let u = Universe::new(&["A"]).unwrap();
        let r = Relation::unary("R");
        let ts = TupleSet::of(u.clone(), &[&["A"]]).unwrap();

        let mut bounds = Bounds::new(u);
        bounds.bound_exactly(&r, ts).unwrap();
        assert!(bounds.all_exact());
    }

    #[test]
    fn instance_checks_arity() {
        let u = Universe::new(&["A"]).unwrap();
        let r = Relation::binary("R");
        let unary = TupleSet::of(u.clone(), &[&["A"]]).unwrap();

        let mut instance = Instance::new(u);
        assert!(instance.add(&r, unary).is_err());
    }
}
