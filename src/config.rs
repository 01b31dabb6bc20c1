//! Solving options for quantitative problems
//!
//! An [`Options`] value fixes the target SMT solver, the quantitative
//! domain, the t-norm used for fuzzy connectives, and the resource limits
//! considered during one solve.

use std::path::PathBuf;
use std::time::Duration;

/// The scalar domain a problem is interpreted over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuantitativeType {
    /// Integer-weighted relations
    Integer,
    /// Fuzzy relations with weights in `[0, 1]`
    Fuzzy,
}

/// Supported t-norm / t-conorm pairs for the fuzzy domain.
///
/// The t-norm interprets conjunction-like operations (intersection, the
/// inner operation of the matrix product); its dual t-conorm interprets the
/// disjunction-like ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tnorm {
    /// `min` / `max`
    Godelian,
    /// `max(0, a + b - 1)` / `min(a + b, 1)`
    Lukasiewicz,
    /// `a * b` / `a + b - a * b`
    Product,
    /// Drastic t-norm and its dual
    Drastic,
    /// Einstein product / Einstein sum
    Einstein,
    /// `min` with bounded addition as the t-conorm
    AddMin,
    /// `a * b` with `max` as the t-conorm
    MaxProduct,
}

/// The SMT solvers this crate can drive.
///
/// All four run as external processes speaking SMT-LIB v2.6; they differ in
/// command-line flags, incremental-mode support, and model output quirks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SolverKind {
    /// Z3 (incremental via `-in`)
    Z3,
    /// MathSAT (re-fed the full problem per solve)
    MathSat,
    /// CVC4 (`--lang smtlib2.6`)
    Cvc4,
    /// Yices (`--incremental --smt2-model-format`)
    Yices,
}

impl SolverKind {
    /// The display name of the solver.
    pub fn name(self) -> &'static str {
        match self {
            SolverKind::Z3 => "Z3",
            SolverKind::MathSat => "MathSAT",
            SolverKind::Cvc4 => "CVC4",
            SolverKind::Yices => "Yices",
        }
    }

    /// The environment variable consulted for the binary path.
    pub fn env_var(self) -> &'static str {
        match self {
            SolverKind::Z3 => "Z3_DIR",
            SolverKind::MathSat => "MathSAT_DIR",
            SolverKind::Cvc4 => "CVC4_DIR",
            SolverKind::Yices => "Yices_DIR",
        }
    }

    /// The binary name tried in the working directory as a last resort.
    pub fn default_binary(self) -> &'static str {
        match self {
            SolverKind::Z3 => "./z3",
            SolverKind::MathSat => "./mathsat",
            SolverKind::Cvc4 => "./cvc4",
            SolverKind::Yices => "./yices",
        }
    }

    /// True if the solver keeps an open session accepting further
    /// `(assert …)` / `(check-sat)` rounds on stdin.
    pub fn supports_incremental(self) -> bool {
        !matches!(self, SolverKind::MathSat)
    }
}

/// Options for one quantitative solve.
#[derive(Debug, Clone)]
pub struct Options {
    /// Which external solver to drive
    pub solver: SolverKind,
    /// Domain of the scalar values
    pub domain: QuantitativeType,
    /// T-norm used in the fuzzy domain; ignored for integer problems
    pub tnorm: Tnorm,
    /// Explicit solver binary; falls back to `<SOLVER>_DIR`, then `./<solver>`
    pub binary_path: Option<PathBuf>,
    /// Upper bound on integer weights; `0 <= v <= max_weight` when set
    pub max_weight: Option<i64>,
    /// Drive the solver incrementally when it supports it
    pub incremental: bool,
    /// Deadline for a single `solve` call; the subprocess is killed on expiry
    pub timeout: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            solver: SolverKind::Z3,
            domain: QuantitativeType::Integer,
            tnorm: Tnorm::Godelian,
            binary_path: None,
            max_weight: None,
            incremental: true,
            timeout: None,
        }
    }
}

impl Options {
    /// Options for a fuzzy analysis under the given t-norm.
    pub fn fuzzy(tnorm: Tnorm) -> Self {
        Self {
            domain: QuantitativeType::Fuzzy,
            tnorm,
            ..Self::default()
        }
    }

    /// Options for an integer-weighted analysis.
    pub fn integer() -> Self {
        Self::default()
    }

    /// True if the driver should hold the solver session open between solves.
    pub fn incremental(&self) -> bool {
        self.incremental && self.solver.supports_incremental()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incremental_respects_solver_support() {
        let mut options = Options::default();
        options.solver = SolverKind::MathSat;
        options.incremental = true;
        assert!(!options.incremental());

        options.solver = SolverKind::Z3;
        assert!(options.incremental());
    }

    #[test]
    fn binary_fallbacks() {
        assert_eq!(SolverKind::Z3.env_var(), "Z3_DIR");
        assert_eq!(SolverKind::Yices.default_binary(), "./yices");
        assert_eq!(SolverKind::Cvc4.name(), "CVC4");
    }
}
