//! # kodkod-num
//!
//! A model finder for first-order relational logic extended to a
//! quantitative (fuzzy / integer-weighted) setting.
//!
//! Given a relational formula and finite bounds on its relation symbols, the
//! solver decides satisfiability and, when satisfiable, produces a concrete
//! weighted instance. Formulas are lowered through a numeric circuit
//! intermediate representation — relations become sparse matrices of scalar
//! values drawn from a configurable semiring — and the resulting circuit is
//! serialized to SMT-LIB v2.6 and dispatched to an external SMT solver
//! (Z3, MathSAT, CVC4, or Yices). The solver's model is then lifted back to
//! a weighted relational instance.
//!
//! ## Example
//!
//! ```rust,ignore
//! use kodkod_num::ast::{Expression, Relation};
//! use kodkod_num::config::Options;
//! use kodkod_num::instance::{Bounds, TupleSet, Universe};
//! use kodkod_num::solver::Solver;
//!
//! let universe = Universe::new(&["A", "B", "C"])?;
//! let person = Relation::quantitative_unary("Person");
//!
//! let mut bounds = Bounds::new(universe.clone());
//! bounds.bound(
//!     &person,
//!     TupleSet::empty(universe.clone(), 1),
//!     TupleSet::of(universe.clone(), &[&["A"], &["B"], &["C"]])?,
//! )?;
//!
//! let formula = Expression::from(person).some();
//!
//! let solver = Solver::new(Options::default());
//! let solution = solver.solve(&formula, &bounds)?;
//! assert!(solution.is_sat());
//! ```

#![warn(missing_docs)]

/// Abstract syntax tree types (Expression, Formula, Decl)
pub mod ast;

/// Solving options: target solver, domain, t-norm, limits
pub mod config;

/// Universe, weighted tuple sets, bounds, and instances
pub mod instance;

/// Scalar circuit IR, semiring factory, and the sparse numeric matrix
pub mod num;

/// AST-to-matrix translation, environments, and the translation cache
pub mod translator;

/// AST rewrites applied ahead of translation
pub mod simplify;

/// SMT-LIB emission, solver process driver, and model parsing
pub mod smt;

/// Translation records, statistics, evaluation, and the last-solve handle
pub mod engine;

/// Main solver API and solution enumeration
pub mod solver;

/// Utility collections backing the matrix layer
pub mod util;

/// Error types
pub mod error {
    //! The error taxonomy: translation faults, solver failures,
    //! cancellations, and lift faults.

    use thiserror::Error;

    /// Faults raised while lowering a problem to the circuit representation.
    ///
    /// Translation faults are final: no partial results are retained.
    #[derive(Error, Debug)]
    pub enum TranslationError {
        /// A variable or relation has no binding in scope
        #[error("unbound leaf: {0}")]
        UnboundLeaf(String),

        /// A declaration's multiplicity is not ONE; skolemization is not performed
        #[error("higher-order declaration: {0}")]
        HigherOrder(String),

        /// Constant arithmetic fault, e.g. division or modulo by zero
        #[error("arithmetic fault: {0}")]
        Arithmetic(String),

        /// Values of incompatible domains were mixed in one problem
        #[error("domain mismatch: {0}")]
        DomainMismatch(String),

        /// The universe times arity exceeds implementation limits
        #[error("capacity exceeded: {0}")]
        CapacityExceeded(String),

        /// Lower bound not included in upper bound, arity mismatch, etc.
        #[error("invalid bounds: {0}")]
        InvalidBounds(String),
    }

    /// Failures of the external SMT solver process.
    #[derive(Error, Debug)]
    pub enum SolverError {
        /// The solver binary could not be located or started
        #[error("solver unreachable: {0}")]
        Unreachable(String),

        /// The solver produced output the driver could not parse
        #[error("solver protocol error: {0}")]
        Protocol(String),

        /// The solver exited before producing a verdict
        #[error("solver exited unexpectedly: {0}")]
        UnexpectedExit(String),
    }

    /// Cancellation of an in-flight solve.
    ///
    /// Cancellations leave no observable mutable state beyond the killed
    /// solver subprocess; the translation itself stays intact.
    #[derive(Error, Debug)]
    pub enum CancellationError {
        /// The configured deadline elapsed and the subprocess was killed
        #[error("solving timed out")]
        Timeout,

        /// The solve was aborted by the caller
        #[error("solving aborted")]
        Aborted,
    }

    /// Faults raised while lifting an SMT model back to a weighted instance.
    #[derive(Error, Debug)]
    pub enum LiftError {
        /// A relation declared boolean carries a weight other than 1
        #[error("boolean relation {0} carries non-unit weights")]
        BooleanWithWeights(String),

        /// The model contains no value for a required primary variable
        #[error("no value for primary variable {0}")]
        MissingVariable(i32),
    }

    /// Any error surfaced by this crate.
    #[derive(Error, Debug)]
    pub enum KodkodError {
        /// See [`TranslationError`]
        #[error(transparent)]
        Translation(#[from] TranslationError),

        /// See [`SolverError`]
        #[error(transparent)]
        Solver(#[from] SolverError),

        /// See [`CancellationError`]
        #[error(transparent)]
        Cancellation(#[from] CancellationError),

        /// See [`LiftError`]
        #[error(transparent)]
        Lift(#[from] LiftError),
    }

    /// Result type for kodkod-num operations
    pub type Result<T> = std::result::Result<T, KodkodError>;
}

pub use error::{KodkodError, Result};
