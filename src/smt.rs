//! SMT-LIB emission and solving
//!
//! The circuit produced by the translator is serialized once into an
//! SMT-LIB v2.6 specification ([`emitter`]); the [`solver`] module drives
//! one of the supported external solver processes over it, incrementally
//! where the solver allows, and parses models back into label-indexed
//! value tables.

pub mod emitter;
pub mod solver;

pub use emitter::emit;
pub use solver::SmtSolver;

use rustc_hash::FxHashMap;

/// The verdict of one satisfiability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtResult {
    /// The problem is satisfiable and a model was produced.
    Sat,
    /// The problem is unsatisfiable.
    Unsat,
    /// The solver could not decide the problem.
    Unknown,
}

impl SmtResult {
    /// Parses a solver's verdict line.
    pub fn from_line(line: &str) -> SmtResult {
        match line.trim() {
            "sat" => SmtResult::Sat,
            "unsat" => SmtResult::Unsat,
            _ => SmtResult::Unknown,
        }
    }

    /// True for [`SmtResult::Sat`].
    pub fn is_sat(self) -> bool {
        self == SmtResult::Sat
    }

    /// True for [`SmtResult::Unsat`].
    pub fn is_unsat(self) -> bool {
        self == SmtResult::Unsat
    }

    /// True for [`SmtResult::Unknown`].
    pub fn is_unknown(self) -> bool {
        self == SmtResult::Unknown
    }
}

/// An SMT-LIB specification plus the bookkeeping needed to read models
/// back: the logic, the option-free assertion stack, and the function
/// symbol tables keyed by scalar label.
#[derive(Debug, Clone)]
pub struct SmtSpecification {
    logic: &'static str,
    assertions: String,
    num_function_symbols: FxHashMap<i32, String>,
    bool_function_symbols: FxHashMap<i32, String>,
    num_variables: usize,
    num_assertions: usize,
    trivial_verdict: Option<bool>,
}

impl SmtSpecification {
    pub(crate) fn new(
        logic: &'static str,
        assertions: String,
        num_function_symbols: FxHashMap<i32, String>,
        bool_function_symbols: FxHashMap<i32, String>,
        num_variables: usize,
        num_assertions: usize,
    ) -> Self {
        Self {
            logic,
            assertions,
            num_function_symbols,
            bool_function_symbols,
            num_variables,
            num_assertions,
            trivial_verdict: None,
        }
    }

    /// A specification for a trivially decided problem; it is never sent
    /// to a solver.
    pub fn trivial(verdict: bool) -> Self {
        Self {
            logic: "QF_UFLIA",
            assertions: String::new(),
            num_function_symbols: FxHashMap::default(),
            bool_function_symbols: FxHashMap::default(),
            num_variables: 0,
            num_assertions: 0,
            trivial_verdict: Some(verdict),
        }
    }

    /// The logic declared for this problem.
    pub fn logic(&self) -> &'static str {
        self.logic
    }

    /// The assertion stack, without any solving options.
    pub fn assertions(&self) -> &str {
        &self.assertions
    }

    /// Numeric function symbols by primary-variable label.
    pub fn num_function_symbols(&self) -> &FxHashMap<i32, String> {
        &self.num_function_symbols
    }

    /// Boolean function symbols by primary-variable label.
    pub fn bool_function_symbols(&self) -> &FxHashMap<i32, String> {
        &self.bool_function_symbols
    }

    /// Number of declared function symbols.
    pub fn num_variables(&self) -> usize {
        self.num_variables
    }

    /// Number of assertions on the stack.
    pub fn num_assertions(&self) -> usize {
        self.num_assertions
    }

    /// The trivial verdict, when the problem never reaches a solver.
    pub fn trivial_verdict(&self) -> Option<bool> {
        self.trivial_verdict
    }

    /// True when there is nothing for a solver to decide.
    pub fn is_trivial(&self) -> bool {
        self.trivial_verdict.is_some() || self.num_variables == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_lines() {
        assert!(SmtResult::from_line("sat").is_sat());
        assert!(SmtResult::from_line("unsat\n").is_unsat());
        assert!(SmtResult::from_line("unknown").is_unknown());
        assert!(SmtResult::from_line("garbage").is_unknown());
    }

    #[test]
    fn trivial_specifications() {
        let spec = SmtSpecification::trivial(true);
        assert!(spec.is_trivial());
        assert_eq!(spec.trivial_verdict(), Some(true));
        assert_eq!(spec.num_variables(), 0);
    }
}
