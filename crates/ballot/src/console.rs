//! # Console
//!
//! The interactive program loop, as a phase machine:
//!
//! ```text
//!          ┌──────────── Idle ◀───────────────┐
//!          │   │    │        │                │
//!          │   │    │        └─▶ Report ──────┤
//!          │   │    └─▶ Manual ───────────────┤
//!          │   └─▶ Configure ─▶ Run ──────────┘
//!          └─▶ Exit
//! ```
//!
//! Generic over input and output so tests can script a whole session.
//! End of input, shutdown and menu item 5 all lead to `Exit`.

use std::io::{self, BufRead, Write};

use ballot_core::{VoteOutcome, VoterId, MAX_CANDIDATES};
use tracing::{debug, error};

use crate::config::{Backend, RunConfig, RunRequest};
use crate::coordinator::{Coordinator, ManualSession};
use crate::runner::{RunError, RunResult};

/// Where the program loop is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Main menu.
    Idle,
    /// Asking for the parameters of a simulated run.
    Configure(Backend),
    /// Executing a validated run.
    Run(RunConfig),
    /// Interactive voting.
    Manual,
    /// Writing the performance report.
    Report,
    /// Terminal.
    Exit,
}

/// Interactive front end over a [`Coordinator`].
pub struct Console<'a, R, W> {
    coordinator: &'a Coordinator,
    input: R,
    output: W,
    phase: Phase,
}

impl<'a, R: BufRead, W: Write> Console<'a, R, W> {
    /// Console starting at the main menu.
    pub const fn new(coordinator: &'a Coordinator, input: R, output: W) -> Self {
        Self {
            coordinator,
            input,
            output,
            phase: Phase::Idle,
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Gives back the output sink.
    pub fn into_output(self) -> W {
        self.output
    }

    /// Runs until `Exit`.
    ///
    /// # Errors
    ///
    /// Fatal run errors and console IO failures.
    pub fn run(&mut self) -> RunResult<()> {
        while self.phase != Phase::Exit {
            if self.coordinator.is_shut_down() {
                self.phase = Phase::Exit;
                break;
            }
            let phase = std::mem::replace(&mut self.phase, Phase::Exit);
            debug!(?phase, "console phase");
            self.phase = self.step(phase)?;
        }
        Ok(())
    }

    fn step(&mut self, phase: Phase) -> RunResult<Phase> {
        Ok(match phase {
            Phase::Idle => self.main_menu()?,
            Phase::Configure(backend) => match self.configure(backend)? {
                Some(run) => Phase::Run(run),
                None => Phase::Exit,
            },
            Phase::Run(run) => {
                self.execute(run)?;
                Phase::Idle
            }
            Phase::Manual => self.manual()?,
            Phase::Report => {
                self.report()?;
                Phase::Idle
            }
            Phase::Exit => Phase::Exit,
        })
    }

    fn say(&mut self, text: impl std::fmt::Display) -> io::Result<()> {
        writeln!(self.output, "{text}")
    }

    /// Prints `text` and reads one trimmed line. `None` at end of input.
    fn prompt(&mut self, text: &str) -> io::Result<Option<String>> {
        write!(self.output, "{text}")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    /// Reads a number, asking again on garbage.
    fn prompt_number(&mut self, text: &str) -> io::Result<Option<i64>> {
        loop {
            let Some(line) = self.prompt(text)? else {
                return Ok(None);
            };
            match line.parse() {
                Ok(n) => return Ok(Some(n)),
                Err(_) => self.say("Invalid input. Please enter a number.")?,
            }
        }
    }

    fn main_menu(&mut self) -> RunResult<Phase> {
        self.say("\n=== Synchronized Voting System ===")?;
        self.say("1. Manual voting mode")?;
        self.say("2. Thread simulation mode")?;
        self.say("3. Process simulation mode")?;
        self.say("4. Performance comparison")?;
        self.say("5. Exit")?;

        let Some(choice) = self.prompt_number("Select mode: ")? else {
            return Ok(Phase::Exit);
        };
        Ok(match choice {
            1 => Phase::Manual,
            2 => Phase::Configure(Backend::Thread),
            3 => Phase::Configure(Backend::Process),
            4 => Phase::Report,
            5 => Phase::Exit,
            _ => {
                self.say("Invalid choice. Please try again.")?;
                Phase::Idle
            }
        })
    }

    /// Asks for the candidate list. Returns the count as typed and the names,
    /// which are left empty when the count is out of range. `None` at end of
    /// input.
    fn ask_candidates(&mut self) -> io::Result<Option<(i64, Vec<String>)>> {
        let Some(count) =
            self.prompt_number(&format!("Enter number of candidates (1-{MAX_CANDIDATES}): "))?
        else {
            return Ok(None);
        };
        let Some(len) = usize::try_from(count)
            .ok()
            .filter(|n| (1..=MAX_CANDIDATES).contains(n))
        else {
            // Out-of-range counts fall back to the defaults during sanitizing.
            return Ok(Some((count, Vec::new())));
        };

        let mut names = Vec::with_capacity(len);
        for i in 0..len {
            let Some(name) = self.prompt(&format!("Enter name for candidate {i}: "))? else {
                return Ok(None);
            };
            names.push(name);
        }
        Ok(Some((count, names)))
    }

    fn configure(&mut self, backend: Backend) -> RunResult<Option<RunConfig>> {
        self.say(format!("\n=== {backend} Simulation Setup ==="))?;
        let mut request = RunRequest::new(backend);

        let Some((count, candidates)) = self.ask_candidates()? else {
            return Ok(None);
        };
        request.candidates = candidates;
        request.candidate_count = Some(count);
        let Some(writers) = self.prompt_number("Enter number of voters: ")? else {
            return Ok(None);
        };
        request.writers = writers;
        let Some(readers) = self.prompt_number("Enter number of observers: ")? else {
            return Ok(None);
        };
        request.readers = readers;

        let run = request.sanitize();
        for adjustment in &run.adjustments {
            self.say(adjustment)?;
        }
        Ok(Some(run))
    }

    fn execute(&mut self, run: RunConfig) -> RunResult<()> {
        self.say(format!(
            "\nStarting {} mode with {} voters and {} observers...",
            run.backend, run.writers, run.readers
        ))?;
        match self.coordinator.run(run) {
            Ok(report) => self.say(format!("\n{report}"))?,
            Err(err) if err.is_fatal() => return Err(err),
            Err(RunError::Shutdown) => {}
            Err(err) => {
                error!(%err, "run failed");
                self.say(format!("Run failed: {err}"))?;
            }
        }
        Ok(())
    }

    fn report(&mut self) -> RunResult<()> {
        match self.coordinator.report() {
            Ok((summary, path)) => {
                self.say(format!("\n{summary}"))?;
                self.say(format!("Performance report saved to: {}", path.display()))?;
            }
            Err(err) => self.say(format!("Could not write performance report: {err}"))?,
        }
        Ok(())
    }

    fn manual(&mut self) -> RunResult<Phase> {
        self.say("\n=== Manual Voting Setup ===")?;
        let Some((count, candidates)) = self.ask_candidates()? else {
            return Ok(Phase::Exit);
        };
        let mut request = RunRequest::new(Backend::Thread);
        request.candidates = candidates;
        request.candidate_count = Some(count);
        let run = request.sanitize();
        for adjustment in &run.adjustments {
            self.say(adjustment)?;
        }

        let session = match self.coordinator.manual(&run.candidates) {
            Ok(session) => session,
            Err(RunError::Shutdown) => return Ok(Phase::Exit),
            Err(err) => return Err(err),
        };
        let next = self.manual_loop(&session)?;
        let tally = session.finish()?;
        self.say(format!("\nFinal results:\n{tally}"))?;
        Ok(next)
    }

    fn manual_loop(&mut self, session: &ManualSession<'_>) -> RunResult<Phase> {
        loop {
            self.say("\n=== Manual Voting ===")?;
            self.say("1. Cast Vote")?;
            self.say("2. View Results")?;
            self.say("3. Exit")?;
            let Some(choice) = self.prompt_number("Select option: ")? else {
                return Ok(Phase::Exit);
            };
            match choice {
                1 => {
                    if !self.manual_vote(session)? {
                        return Ok(Phase::Exit);
                    }
                }
                2 => {
                    let tally = session.view()?;
                    self.say(tally)?;
                }
                3 => return Ok(Phase::Idle),
                _ => self.say("Invalid choice. Please try again.")?,
            }
        }
    }

    /// One vote. Returns false at end of input.
    fn manual_vote(&mut self, session: &ManualSession<'_>) -> RunResult<bool> {
        let Some(voter) = self.prompt_number("Enter voter ID: ")? else {
            return Ok(false);
        };
        let Ok(voter) = VoterId::try_from(voter) else {
            self.say(format!("Invalid voter ID: {voter}."))?;
            return Ok(true);
        };

        for (i, name) in session.candidates().iter().enumerate() {
            self.say(format!("{i}. {name}"))?;
        }
        let Some(candidate) = self.prompt_number("Enter candidate ID: ")? else {
            return Ok(false);
        };
        let last = session.candidates().len() - 1;
        let Ok(candidate) = usize::try_from(candidate) else {
            self.say(format!(
                "Invalid candidate ID: {candidate}. Valid range is 0-{last}."
            ))?;
            return Ok(true);
        };

        match session.cast(voter, candidate)? {
            VoteOutcome::Recorded => self.say(format!(
                "Vote recorded: voter {voter} voted for {}.",
                session.candidates()[candidate]
            ))?,
            VoteOutcome::DuplicateVote => self.say(format!("Voter {voter} has already voted!"))?,
            VoteOutcome::InvalidCandidate => self.say(format!(
                "Invalid candidate ID: {candidate}. Valid range is 0-{last}."
            ))?,
            VoteOutcome::RegistryFull => {
                self.say("Voter registry is full. Vote not recorded.")?;
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BallotConfig, ThinkRange};
    use std::io::Cursor;

    fn coordinator(dir: &std::path::Path) -> Coordinator {
        Coordinator::new(BallotConfig {
            data_dir: dir.to_path_buf(),
            writer_think_ms: ThinkRange::fixed(0),
            reader_think_ms: ThinkRange::fixed(0),
            observation_cycles: 1,
            ..BallotConfig::default()
        })
        .unwrap()
    }

    fn script(coordinator: &Coordinator, input: &str) -> String {
        let mut console = Console::new(coordinator, Cursor::new(input.to_string()), Vec::new());
        console.run().unwrap();
        assert_eq!(console.phase(), &Phase::Exit);
        String::from_utf8(console.into_output()).unwrap()
    }

    #[test]
    fn test_exit_and_end_of_input() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path());
        assert!(script(&coordinator, "5\n").contains("5. Exit"));
        assert!(script(&coordinator, "").contains("Select mode: "));
        assert!(script(&coordinator, "9\nabc\n5\n").contains("Invalid choice"));
    }

    #[test]
    fn test_manual_session_script() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path());
        let out = script(
            &coordinator,
            "1\n2\nAlice\nBob\n1\n7\n1\n1\n7\n0\n1\n8\n4\n2\n3\n5\n",
        );

        assert!(out.contains("Vote recorded: voter 7 voted for Bob."));
        assert!(out.contains("Voter 7 has already voted!"));
        assert!(out.contains("Invalid candidate ID: 4. Valid range is 0-1."));
        assert!(out.contains("• Bob: 1 votes (100.0%)"));
        assert!(out.contains("Final results:"));
    }

    #[test]
    fn test_thread_run_script() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path());
        let out = script(&coordinator, "2\n2\nAlice\nBob\n6\n0\n5\n");

        assert!(out.contains("0 observers is out of range"));
        assert!(out.contains("Starting Thread mode with 6 voters and 3 observers"));
        assert!(out.contains("Total votes: 6"));
    }

    #[test]
    fn test_negative_candidate_count_is_echoed() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path());
        let out = script(&coordinator, "2\n-4\n6\n2\n5\n");

        assert!(out.contains("-4 candidates is out of range"));
        assert!(!out.contains("0 candidates is out of range"));
        assert!(out.contains("Starting Thread mode with 6 voters and 2 observers"));
    }

    #[test]
    fn test_report_script() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path());
        let out = script(&coordinator, "4\n5\n");
        assert!(out.contains("No valid performance data found."));
        assert!(out.contains("Performance report saved to:"));
    }
}
