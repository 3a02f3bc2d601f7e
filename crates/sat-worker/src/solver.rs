//! Invokes the SAT solver binary and interprets its exit code / stdout.
//!
//! The solver takes the RPN formula on stdin and reports its decision via
//! exit code: 10 = SAT, 20 = UNSAT, 30 = parse error. Anything else is
//! treated as an unexpected return code, not a parse error.

use sat_core::Assignment;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::Instant;

pub const EXIT_SAT: i32 = 10;
pub const EXIT_UNSAT: i32 = 20;
pub const EXIT_PARSE_ERROR: i32 = 30;

pub struct SolverOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub runtime_s: f64,
}

pub enum SolverRunError {
    /// The solver did not exit within `timeout`.
    Timeout,
    /// The solver binary could not be spawned (typically not found).
    BinaryNotFound(std::io::Error),
    /// Any other I/O failure talking to the child process.
    Io(std::io::Error),
}

/// Runs `solver_path` on `formula`, feeding it on stdin and capturing
/// stdout/stderr, bounded by `timeout`.
pub async fn run_solver(
    solver_path: &str,
    formula: &str,
    timeout: Duration,
) -> Result<SolverOutput, SolverRunError> {
    let start = Instant::now();

    let mut child = Command::new(solver_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SolverRunError::BinaryNotFound(e)
            } else {
                SolverRunError::Io(e)
            }
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        let formula = formula.to_string();
        // Write off the await path so a solver that never reads stdin can't
        // deadlock a full pipe against our own timeout.
        tokio::spawn(async move {
            let _ = stdin.write_all(formula.as_bytes()).await;
            let _ = stdin.shutdown().await;
        });
    }

    let output = tokio::time::timeout(timeout, child.wait_with_output()).await;

    let runtime_s = start.elapsed().as_secs_f64();

    match output {
        Ok(Ok(out)) => Ok(SolverOutput {
            exit_code: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            runtime_s,
        }),
        Ok(Err(e)) => Err(SolverRunError::Io(e)),
        Err(_elapsed) => Err(SolverRunError::Timeout),
    }
}

/// Parses solver stdout into `(decision, assignment)`. `UNSAT` has no
/// assignment; anything else is treated as SAT with `var -> TRUE|FALSE`
/// lines building the assignment map.
pub fn parse_solver_output(stdout: &str) -> (&'static str, Option<Assignment>) {
    let stdout = stdout.trim();
    if stdout.starts_with("UNSAT") {
        return ("UNSAT", None);
    }

    let mut assignment = Assignment::new();
    for line in stdout.lines() {
        let line = line.trim();
        if let Some((var, val)) = line.split_once("->") {
            assignment.insert(var.trim().to_string(), val.trim() == "TRUE");
        }
    }
    ("SAT", Some(assignment))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unsat() {
        let (decision, assignment) = parse_solver_output("UNSAT\n");
        assert_eq!(decision, "UNSAT");
        assert!(assignment.is_none());
    }

    #[test]
    fn parses_sat_assignment() {
        let (decision, assignment) = parse_solver_output("P -> TRUE\nQ -> FALSE\n");
        assert_eq!(decision, "SAT");
        let assignment = assignment.unwrap();
        assert_eq!(assignment.get("P"), Some(&true));
        assert_eq!(assignment.get("Q"), Some(&false));
    }

    #[test]
    fn sat_with_no_assignment_lines_yields_empty_map() {
        let (decision, assignment) = parse_solver_output("SAT\n");
        assert_eq!(decision, "SAT");
        assert_eq!(assignment.unwrap().len(), 0);
    }
}
