//! External SMT solver processes
//!
//! One driver covers the four supported solvers; they differ only in
//! command-line flags, script prelude, and incremental support. In
//! incremental mode the driver holds the child process and its pipes open,
//! issuing `(check-sat)` / `(get-model)` rounds over stdin; otherwise the
//! full script is rewritten to a temporary file per solve. A deadline, when
//! configured, arms a watchdog thread that kills the subprocess; the
//! translation itself survives the cancellation.

use regex::Regex;
use rustc_hash::FxHashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::JoinHandle;
use std::time::Duration;

use super::{SmtResult, SmtSpecification};
use crate::config::{Options, SolverKind};
use crate::error::{CancellationError, KodkodError, Result, SolverError};
use crate::num::Number;

fn define_fun_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\(define-fun (?P<id>\S+) \(\) (?P<type>Bool|Int|Real) (?P<value>.*?)\)")
            .expect("valid regex")
    })
}

fn fraction_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\(/ (?P<num>-?[0-9]+(\.[0-9]+)?) (?P<denom>-?[0-9]+(\.[0-9]+)?)\)")
            .expect("valid regex")
    })
}

fn broken_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(define-fun.*").expect("valid regex"))
}

struct Session {
    child: Arc<Mutex<Child>>,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

struct Watchdog {
    cancel: Sender<()>,
    fired: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Watchdog {
    fn arm(child: &Arc<Mutex<Child>>, timeout: Duration) -> Watchdog {
        let (cancel, rx) = mpsc::channel();
        let fired = Arc::new(AtomicBool::new(false));
        let fired_inner = fired.clone();
        let child = child.clone();
        let handle = std::thread::spawn(move || {
            if rx.recv_timeout(timeout).is_err() {
                fired_inner.store(true, Ordering::SeqCst);
                if let Ok(mut child) = child.lock() {
                    let _ = child.kill();
                }
            }
        });
        Watchdog {
            cancel,
            fired,
            handle,
        }
    }

    /// Stops the watchdog; returns true when the deadline fired.
    fn disarm(self) -> bool {
        let _ = self.cancel.send(());
        let _ = self.handle.join();
        self.fired.load(Ordering::SeqCst)
    }
}

/// The parsed value tables of one model.
#[derive(Default)]
struct Model {
    numeric: FxHashMap<i32, Number>,
    fractions: FxHashMap<i32, String>,
    boolean: FxHashMap<i32, bool>,
}

/// A driver over one external SMT solver and one specification.
///
/// At most one solver instance should be active at a time; the underlying
/// process is shared state of the driver, not of the translation.
pub struct SmtSolver {
    kind: SolverKind,
    spec: SmtSpecification,
    binary: Option<PathBuf>,
    incremental: bool,
    timeout: Option<Duration>,
    ignore: String,
    session: Option<Session>,
    solved: bool,
    result: Option<SmtResult>,
    model: Model,
}

impl SmtSolver {
    /// Creates a driver for the given specification and options.
    pub fn new(spec: SmtSpecification, options: &Options) -> Self {
        Self {
            kind: options.solver,
            spec,
            binary: options.binary_path.clone(),
            incremental: options.incremental(),
            timeout: options.timeout,
            ignore: String::new(),
            session: None,
            solved: false,
            result: None,
            model: Model::default(),
        }
    }

    /// A driver over a trivially decided problem; `solve` answers without
    /// touching any solver binary.
    pub fn trivial(verdict: bool, options: &Options) -> Self {
        let mut solver = Self::new(SmtSpecification::trivial(verdict), options);
        solver.solved = true;
        solver.result = Some(if verdict {
            SmtResult::Sat
        } else {
            SmtResult::Unsat
        });
        solver
    }

    /// The specification this driver solves.
    pub fn spec(&self) -> &SmtSpecification {
        &self.spec
    }

    /// Number of declared function symbols.
    pub fn num_variables(&self) -> usize {
        self.spec.num_variables()
    }

    /// Number of assertions on the stack.
    pub fn num_assertions(&self) -> usize {
        self.spec.num_assertions()
    }

    /// The verdict of the most recent `solve`, if any.
    pub fn result(&self) -> Option<SmtResult> {
        self.result
    }

    /// The resolved solver binary: explicit option, then the
    /// `<SOLVER>_DIR` environment variable, then `./<solver>`.
    fn resolve_binary(&self) -> PathBuf {
        if let Some(path) = &self.binary {
            return path.clone();
        }
        if let Ok(path) = std::env::var(self.kind.env_var()) {
            return PathBuf::from(path);
        }
        PathBuf::from(self.kind.default_binary())
    }

    fn command_args(&self) -> Vec<&'static str> {
        match (self.kind, self.incremental) {
            (SolverKind::Z3, true) => vec!["-in"],
            (SolverKind::Z3, false) => vec![],
            (SolverKind::MathSat, _) => vec![],
            (SolverKind::Cvc4, true) => vec!["--lang", "smtlib2.6", "--incremental"],
            (SolverKind::Cvc4, false) => vec!["--lang", "smtlib2.6"],
            (SolverKind::Yices, true) => vec!["--incremental", "--smt2-model-format"],
            (SolverKind::Yices, false) => vec!["--smt2-model-format"],
        }
    }

    fn prelude(&self) -> String {
        let logic = self.spec.logic();
        match self.kind {
            SolverKind::Z3 => format!(
                "(set-logic {})\n(set-option :produce-models true)\n\
                 (set-option :pp.decimal true)\n(set-option :pp.decimal_precision 16)\n",
                logic
            ),
            SolverKind::MathSat | SolverKind::Cvc4 => format!(
                "(set-logic {})\n(set-option :produce-models true)\n",
                logic
            ),
            SolverKind::Yices => format!(
                "(set-option :produce-models true)\n(set-logic {})\n",
                logic
            ),
        }
    }

    fn script(&self) -> String {
        let mut script = self.prelude();
        script.push_str(self.spec.assertions());
        script.push_str(&self.ignore);
        if !self.incremental {
            script.push_str("(check-sat)\n(get-model)\n(echo \"finished\")\n");
        }
        script
    }

    /// Checks satisfiability; on sat, the model tables are refreshed.
    pub fn solve(&mut self) -> Result<bool> {
        if let Some(verdict) = self.spec.trivial_verdict() {
            self.solved = true;
            self.result = Some(if verdict {
                SmtResult::Sat
            } else {
                SmtResult::Unsat
            });
            return Ok(verdict);
        }

        let result = if self.incremental {
            self.solve_incremental()?
        } else {
            self.solve_one_shot()?
        };
        self.solved = true;
        self.result = Some(result);
        tracing::debug!(solver = self.kind.name(), ?result, "solver verdict");
        Ok(result.is_sat())
    }

    fn spawn(&self, args: &[&str], file: Option<&std::path::Path>) -> Result<Child> {
        let binary = self.resolve_binary();
        let mut command = Command::new(&binary);
        command.args(args);
        if let Some(file) = file {
            // one-shot: keep stderr for diagnostics on protocol failures
            command.arg(file);
            command.stdin(Stdio::null()).stderr(Stdio::piped());
        } else {
            // a held-open session must not block on an undrained stderr
            command.stdin(Stdio::piped()).stderr(Stdio::null());
        }
        command.stdout(Stdio::piped());
        command.spawn().map_err(|e| {
            KodkodError::from(SolverError::Unreachable(format!(
                "{} is not at the expected location {}: {}",
                self.kind.name(),
                binary.display(),
                e
            )))
        })
    }

    fn start_session(&mut self) -> Result<()> {
        let args = self.command_args();
        let mut child = self.spawn(&args, None)?;
        let stdin = child.stdin.take().ok_or_else(|| {
            KodkodError::from(SolverError::Protocol("no stdin pipe".to_string()))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            KodkodError::from(SolverError::Protocol("no stdout pipe".to_string()))
        })?;
        let mut session = Session {
            child: Arc::new(Mutex::new(child)),
            stdin,
            stdout: BufReader::new(stdout),
        };
        session
            .stdin
            .write_all(self.script().as_bytes())
            .and_then(|_| session.stdin.flush())
            .map_err(|e| {
                KodkodError::from(SolverError::UnexpectedExit(format!(
                    "could not feed the solver: {}",
                    e
                )))
            })?;
        self.session = Some(session);
        Ok(())
    }

    fn solve_incremental(&mut self) -> Result<SmtResult> {
        if self.session.is_none() {
            self.start_session()?;
        }
        let timeout = self.timeout;
        let session = self.session.as_mut().ok_or_else(|| {
            KodkodError::from(SolverError::Protocol("no solver session".to_string()))
        })?;

        let watchdog = timeout.map(|t| Watchdog::arm(&session.child, t));

        let outcome = (|| -> Result<(SmtResult, Option<Model>)> {
            session
                .stdin
                .write_all(b"(check-sat)\n")
                .and_then(|_| session.stdin.flush())
                .map_err(|e| {
                    KodkodError::from(SolverError::UnexpectedExit(e.to_string()))
                })?;

            let mut line = String::new();
            let read = session.stdout.read_line(&mut line).map_err(|e| {
                KodkodError::from(SolverError::UnexpectedExit(e.to_string()))
            })?;
            if read == 0 {
                return Err(SolverError::UnexpectedExit(
                    "solver closed its output".to_string(),
                )
                .into());
            }
            let result = SmtResult::from_line(&line);

            if result.is_sat() {
                session
                    .stdin
                    .write_all(b"(get-model)\n(echo \"finished\")\n")
                    .and_then(|_| session.stdin.flush())
                    .map_err(|e| {
                        KodkodError::from(SolverError::UnexpectedExit(e.to_string()))
                    })?;

                let mut lines = Vec::new();
                loop {
                    let mut model_line = String::new();
                    let read = session.stdout.read_line(&mut model_line).map_err(|e| {
                        KodkodError::from(SolverError::UnexpectedExit(e.to_string()))
                    })?;
                    if read == 0 {
                        return Err(SolverError::Protocol(
                            "model output ended early".to_string(),
                        )
                        .into());
                    }
                    let done = model_line.contains("finished");
                    lines.push(model_line);
                    if done {
                        break;
                    }
                }
                let model = parse_model(lines.iter().map(String::as_str));
                Ok((result, Some(model)))
            } else {
                Ok((result, None))
            }
        })();

        let timed_out = watchdog.map(Watchdog::disarm).unwrap_or(false);
        if timed_out {
            self.free();
            return Err(CancellationError::Timeout.into());
        }
        match outcome {
            Ok((result, model)) => {
                if let Some(model) = model {
                    self.model = model;
                }
                Ok(result)
            }
            Err(e) => {
                self.free();
                Err(e)
            }
        }
    }

    fn solve_one_shot(&mut self) -> Result<SmtResult> {
        let mut file = tempfile::NamedTempFile::new().map_err(|e| {
            KodkodError::from(SolverError::Unreachable(format!(
                "could not create a problem file: {}",
                e
            )))
        })?;
        file.write_all(self.script().as_bytes()).map_err(|e| {
            KodkodError::from(SolverError::Unreachable(format!(
                "could not write the problem file: {}",
                e
            )))
        })?;

        let args = self.command_args();
        let mut child = self.spawn(&args, Some(file.path()))?;
        let stdout = child.stdout.take().ok_or_else(|| {
            KodkodError::from(SolverError::Protocol("no stdout pipe".to_string()))
        })?;
        let stderr = child.stderr.take();
        let child = Arc::new(Mutex::new(child));

        let watchdog = self.timeout.map(|t| Watchdog::arm(&child, t));

        let mut output = String::new();
        let read = BufReader::new(stdout).read_to_string(&mut output);
        if let Ok(mut child) = child.lock() {
            let _ = child.wait();
        }
        let timed_out = watchdog.map(Watchdog::disarm).unwrap_or(false);
        if timed_out {
            return Err(CancellationError::Timeout.into());
        }
        read.map_err(|e| KodkodError::from(SolverError::UnexpectedExit(e.to_string())))?;

        let mut lines = output.lines();
        let verdict = loop {
            match lines.next() {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => break line,
                None => {
                    let diagnostics = stderr
                        .map(|mut s| {
                            let mut text = String::new();
                            let _ = s.read_to_string(&mut text);
                            text
                        })
                        .unwrap_or_default();
                    return Err(SolverError::Protocol(format!(
                        "solver produced no verdict: {}",
                        diagnostics.trim()
                    ))
                    .into());
                }
            }
        };
        let result = SmtResult::from_line(verdict);
        if result.is_sat() {
            self.model = parse_model(lines);
        }
        Ok(result)
    }

    /// True if the most recent model assigns the given label.
    pub fn contains(&self, label: i32) -> bool {
        self.model.numeric.contains_key(&label) || self.model.boolean.contains_key(&label)
    }

    /// The numeric value of the given label; booleans read as 0/1.
    pub fn value(&self, label: i32) -> Option<Number> {
        if let Some(n) = self.model.numeric.get(&label) {
            return Some(*n);
        }
        self.model
            .boolean
            .get(&label)
            .map(|&b| Number::Int(if b { 1 } else { 0 }))
    }

    /// The boolean value of the given label; numerics read as `!= 0`.
    pub fn bool_value(&self, label: i32) -> Option<bool> {
        if let Some(b) = self.model.boolean.get(&label) {
            return Some(*b);
        }
        self.model.numeric.get(&label).map(|n| !n.is_zero())
    }

    /// The exact textual form of a numeric assignment, reusing the
    /// solver's fraction syntax when it printed one.
    fn assignment_repr(&self, label: i32) -> Option<String> {
        if let Some(fraction) = self.model.fractions.get(&label) {
            return Some(fraction.clone());
        }
        self.value(label).map(|n| smt_number(n))
    }

    /// The `(label, value)` pairs of the most recent model, for the
    /// per-solve record.
    pub fn assignments(&self) -> Vec<(i32, String)> {
        let mut labels: Vec<i32> = self
            .model
            .numeric
            .keys()
            .chain(self.model.boolean.keys())
            .copied()
            .collect();
        labels.sort_unstable();
        labels.dedup();
        labels
            .into_iter()
            .filter_map(|l| self.assignment_repr(l).map(|r| (l, r)))
            .collect()
    }

    /// Blocks the current assignment of the given primary variables: the
    /// next `solve` must differ on at least one of them.
    pub fn elim_solution(&mut self, labels: impl IntoIterator<Item = i32>) -> Result<()> {
        if !self.solved {
            return Err(SolverError::Protocol(
                "there is no previous solution to eliminate".to_string(),
            )
            .into());
        }
        let assignments: Vec<String> = labels
            .into_iter()
            .filter_map(|label| {
                let symbol = self.spec.num_function_symbols().get(&label)?;
                let value = self.assignment_repr(label)?;
                Some(format!("(= {} {})", symbol, value))
            })
            .collect();
        if assignments.is_empty() {
            return Ok(());
        }
        let blocking = format!("(assert (not (and {})))\n", assignments.join(" "));
        self.ignore.push_str(&blocking);

        if self.incremental {
            if let Some(session) = self.session.as_mut() {
                session
                    .stdin
                    .write_all(blocking.as_bytes())
                    .and_then(|_| session.stdin.flush())
                    .map_err(|e| {
                        KodkodError::from(SolverError::UnexpectedExit(e.to_string()))
                    })?;
            }
        }
        Ok(())
    }

    /// Kills the solver subprocess and releases its pipes.
    pub fn free(&mut self) {
        if let Some(session) = self.session.take() {
            if let Ok(mut child) = session.child.lock() {
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }
}

impl Drop for SmtSolver {
    fn drop(&mut self) {
        self.free();
    }
}

/// The SMT-LIB rendering of a number: negatives in prefix form, reals as
/// plain decimals.
fn smt_number(n: Number) -> String {
    match n {
        Number::Int(i) if i < 0 => format!("(- {})", -i),
        Number::Int(i) => i.to_string(),
        Number::Real(r) if r < 0.0 => format!("(- {})", decimal(-r)),
        Number::Real(r) => decimal(r),
    }
}

fn decimal(value: f64) -> String {
    let mut s = format!("{:.16}", value);
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.push('0');
    }
    s
}

/// Parses `(define-fun id () T v)` lines into label-keyed value tables.
/// Definitions broken across lines are rejoined before matching.
fn parse_model<'a>(lines: impl Iterator<Item = &'a str>) -> Model {
    let mut model = Model::default();
    let mut broken = false;
    let mut fs = String::new();

    for raw in lines {
        let line = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        let candidate = if broken {
            format!("{} {}", fs, line)
        } else {
            line.clone()
        };

        if let Some(captures) = define_fun_re().captures(&candidate) {
            let id: String = captures["id"]
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '-')
                .collect();
            if let Ok(label) = id.parse::<i32>() {
                let value = &captures["value"];
                match &captures["type"] {
                    "Int" => {
                        let digits: String = value
                            .chars()
                            .filter(|c| c.is_ascii_digit() || *c == '-')
                            .collect();
                        if let Ok(v) = digits.parse::<i64>() {
                            model.numeric.insert(label, Number::Int(v));
                        }
                    }
                    "Real" => {
                        if value.contains('/') {
                            let closed = format!("{})", value);
                            if let Some(frac) = fraction_re().captures(&closed) {
                                let num: f64 = frac["num"].parse().unwrap_or(0.0);
                                let denom: f64 = frac["denom"].parse().unwrap_or(1.0);
                                model.numeric.insert(label, Number::Real(num / denom));
                                model
                                    .fractions
                                    .insert(label, frac.get(0).map(|m| m.as_str().to_string()).unwrap_or(closed.clone()));
                            }
                        } else {
                            let digits: String = value
                                .chars()
                                .filter(|c| c.is_ascii_digit() || *c == '-' || *c == '.')
                                .collect();
                            if let Ok(v) = digits.parse::<f64>() {
                                model.numeric.insert(label, Number::Real(v));
                            }
                        }
                    }
                    _ => {
                        model.boolean.insert(label, value.trim() == "true");
                    }
                }
            }
            broken = false;
            fs.clear();
        } else if broken_re().is_match(&candidate) {
            broken = true;
            fs = candidate;
            // a definition never spans more than five tokens; longer
            // accumulations mean we latched onto something else
            if fs.split_whitespace().count() > 6 {
                broken = false;
                fs.clear();
            }
        } else {
            broken = false;
            fs.clear();
        }

        if raw.contains("finished") {
            break;
        }
    }
    model
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tnorm;

    #[test]
    fn parses_single_line_definitions() {
        let output = vec![
            "(model",
            "(define-fun v1 () Int 3)",
            "(define-fun v2 () Real 0.5)",
            "(define-fun b3 () Bool true)",
            ")",
            "finished",
        ];
        let model = parse_model(output.into_iter());
        assert_eq!(model.numeric.get(&1), Some(&Number::Int(3)));
        assert_eq!(model.numeric.get(&2), Some(&Number::Real(0.5)));
        assert_eq!(model.boolean.get(&3), Some(&true));
    }

    #[test]
    fn parses_definitions_broken_across_lines() {
        let output = vec![
            "(model",
            "(define-fun v4 ()",
            "Real 0.25)",
            ")",
            "finished",
        ];
        let model = parse_model(output.into_iter());
        assert_eq!(model.numeric.get(&4), Some(&Number::Real(0.25)));
    }

    #[test]
    fn parses_fractions_and_keeps_their_syntax() {
        let output = vec!["(define-fun v7 () Real (/ 1 4))", "finished"];
        let model = parse_model(output.into_iter());
        assert_eq!(model.numeric.get(&7), Some(&Number::Real(0.25)));
        assert_eq!(model.fractions.get(&7).map(String::as_str), Some("(/ 1 4)"));
    }

    #[test]
    fn parses_negative_values() {
        let output = vec!["(define-fun v9 () Int (- 5))", "finished"];
        let model = parse_model(output.into_iter());
        assert_eq!(model.numeric.get(&9), Some(&Number::Int(-5)));
    }

    #[test]
    fn trivial_solver_answers_without_a_binary() {
        let mut solver = SmtSolver::trivial(true, &Options::integer());
        assert!(solver.solve().unwrap());
        assert_eq!(solver.result(), Some(SmtResult::Sat));

        let mut unsat = SmtSolver::trivial(false, &Options::fuzzy(Tnorm::Godelian));
        assert!(!unsat.solve().unwrap());
        assert_eq!(unsat.result(), Some(SmtResult::Unsat));
    }

    #[test]
    fn missing_binary_is_unreachable() {
        let mut options = Options::integer();
        options.binary_path = Some(PathBuf::from("/nonexistent/z3-binary"));
        options.incremental = false;

        let spec = SmtSpecification::new(
            "QF_UFLIA",
            "(declare-fun v1 () Int)\n(assert (> v1 0))\n".to_string(),
            FxHashMap::default(),
            FxHashMap::default(),
            1,
            1,
        );
        let mut solver = SmtSolver::new(spec, &options);
        match solver.solve() {
            Err(KodkodError::Solver(SolverError::Unreachable(_))) => {}
            other => panic!("expected Unreachable, got {:?}", other),
        }
    }

    #[test]
    fn blocking_reuses_fraction_syntax() {
        let mut spec_symbols = FxHashMap::default();
        spec_symbols.insert(7, "v7".to_string());
        let spec = SmtSpecification::new(
            "QF_UFLRA",
            String::new(),
            spec_symbols,
            FxHashMap::default(),
            1,
            0,
        );
        let mut options = Options::fuzzy(Tnorm::Godelian);
        options.incremental = false;

        let mut solver = SmtSolver::new(spec, &options);
        solver.solved = true;
        solver.model = parse_model(
            vec!["(define-fun v7 () Real (/ 1 4))", "finished"].into_iter(),
        );

        solver.elim_solution(vec![7]).unwrap();
        assert!(solver.ignore.contains("(assert (not (and (= v7 (/ 1 4)))))"));
    }

    #[test]
    fn command_lines_per_solver() {
        let mut options = Options::integer();
        options.solver = SolverKind::Yices;
        let solver = SmtSolver::new(SmtSpecification::trivial(true), &options);
        assert_eq!(
            solver.command_args(),
            vec!["--incremental", "--smt2-model-format"]
        );

        options.solver = SolverKind::MathSat;
        let solver = SmtSolver::new(SmtSpecification::trivial(true), &options);
        assert!(solver.command_args().is_empty());
        // MathSAT never runs incrementally
        assert!(!solver.incremental);
    }

    #[test]
    fn prelude_orders_options_per_solver() {
        let mut options = Options::integer();
        options.solver = SolverKind::Yices;
        let solver = SmtSolver::new(SmtSpecification::trivial(true), &options);
        assert!(solver.prelude().starts_with("(set-option :produce-models true)"));

        options.solver = SolverKind::Z3;
        let solver = SmtSolver::new(SmtSpecification::trivial(true), &options);
        let prelude = solver.prelude();
        assert!(prelude.starts_with("(set-logic"));
        assert!(prelude.contains(":pp.decimal true"));
        assert!(prelude.contains(":pp.decimal_precision 16"));
    }
}
