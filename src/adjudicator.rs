// 🧑‍⚖️ Interactive Adjudicator - settle what the vote could not
//
// Order of resolution for one item:
//   1. labels already settled (NOT with a missing target counts as settled)
//   2. history hit on the normalized text
//   3. ask a human, one axis at a time
// The settled pair is written back to history under its write policy.

use crate::error::{ConsensusError, Result};
use crate::history::AnnotationHistory;
use crate::labels::{Axis, LabelPair, NOT};
use crate::record_store::{Annotation, Item};
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use tracing::debug;

/// Typing this (first character, any case) saves and exits
pub const STOP_CODE: char = 's';

// ============================================================================
// PROMPT
// ============================================================================

/// Line-oriented human interaction
pub trait Prompt {
    /// Print one line of context for the annotator
    fn show(&mut self, line: &str) -> io::Result<()>;

    /// Ask a question; `None` means the input stream ended
    fn ask(&mut self, question: &str) -> io::Result<Option<String>>;
}

/// stdin/stdout prompt
pub struct ConsolePrompt<R: BufRead, W: Write> {
    input: R,
    output: W,
}

impl ConsolePrompt<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        ConsolePrompt {
            input: io::stdin().lock(),
            output: io::stdout(),
        }
    }
}

impl<R: BufRead, W: Write> ConsolePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        ConsolePrompt { input, output }
    }
}

impl<R: BufRead, W: Write> Prompt for ConsolePrompt<R, W> {
    fn show(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.output, "{}", line)
    }

    fn ask(&mut self, question: &str) -> io::Result<Option<String>> {
        write!(self.output, "{} ? ", question)?;
        self.output.flush()?;
        let mut answer = String::new();
        if self.input.read_line(&mut answer)? == 0 {
            return Ok(None);
        }
        Ok(Some(answer.trim_end_matches(['\r', '\n']).to_string()))
    }
}

/// Canned answers, for tests and batch replays
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: VecDeque<String>,
    fail_when_exhausted: bool,
    pub transcript: Vec<String>,
}

impl ScriptedPrompt {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedPrompt {
            answers: answers.into_iter().map(Into::into).collect(),
            fail_when_exhausted: false,
            transcript: Vec::new(),
        }
    }

    /// Raise an I/O error instead of reporting end of input once answers run out
    pub fn then_fail(mut self) -> Self {
        self.fail_when_exhausted = true;
        self
    }

    pub fn remaining(&self) -> usize {
        self.answers.len()
    }
}

impl Prompt for ScriptedPrompt {
    fn show(&mut self, line: &str) -> io::Result<()> {
        self.transcript.push(line.to_string());
        Ok(())
    }

    fn ask(&mut self, question: &str) -> io::Result<Option<String>> {
        self.transcript.push(format!("{} ?", question));
        match self.answers.pop_front() {
            Some(answer) => Ok(Some(answer)),
            None if self.fail_when_exhausted => {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted input failed"))
            }
            None => Ok(None),
        }
    }
}

// ============================================================================
// DECISIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionOrigin {
    /// Labels were already settled on the item
    Existing,
    /// Copied from a near-duplicate
    History,
    /// Typed by the annotator
    Human,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Resolved { pair: LabelPair, origin: DecisionOrigin },
    /// The annotator asked to save and exit
    StopRequested,
}

enum Answer {
    Label(&'static str),
    Stop,
}

// ============================================================================
// ADJUDICATOR
// ============================================================================

pub struct InteractiveAdjudicator<P: Prompt> {
    prompt: P,
}

impl<P: Prompt> InteractiveAdjudicator<P> {
    pub fn new(prompt: P) -> Self {
        InteractiveAdjudicator { prompt }
    }

    pub fn into_prompt(self) -> P {
        self.prompt
    }

    /// Resolve one item. `position` is (1-based index, total) for display.
    ///
    /// Prompt failures are reported as `ItemFault`; the item is left as is.
    pub fn adjudicate(
        &mut self,
        item: &Item,
        votes: &[Annotation],
        history: &mut AnnotationHistory,
        position: (usize, usize),
    ) -> Result<Decision> {
        let fault = |e: io::Error| ConsensusError::ItemFault {
            item_id: item.id.clone(),
            message: e.to_string(),
        };

        if let Some(pair) = LabelPair::settled(&item.explicitness, &item.target) {
            if item.explicitness == NOT && item.target != pair.target {
                self.prompt
                    .show("! Target skipped because explicitness was NOT")
                    .map_err(fault)?;
            }
            history.record(&item.text, pair.clone());
            return Ok(Decision::Resolved {
                pair,
                origin: DecisionOrigin::Existing,
            });
        }

        if let Some(pair) = history.lookup(&item.text).cloned() {
            debug!(item_id = %item.id, %pair, "label copied from history");
            self.prompt
                .show(&format!("!! Seen before with {}", pair))
                .map_err(fault)?;
            history.record(&item.text, pair.clone());
            return Ok(Decision::Resolved {
                pair,
                origin: DecisionOrigin::History,
            });
        }

        self.show_context(item, votes, position).map_err(fault)?;

        let explicitness = match self.ask_axis(Axis::Explicitness).map_err(fault)? {
            Answer::Label(label) => label,
            Answer::Stop => return Ok(Decision::StopRequested),
        };
        let target = if explicitness == NOT {
            ""
        } else {
            match self.ask_axis(Axis::Target).map_err(fault)? {
                Answer::Label(label) => label,
                Answer::Stop => return Ok(Decision::StopRequested),
            }
        };

        let pair = LabelPair::new(explicitness, target);
        history.record(&item.text, pair.clone());
        Ok(Decision::Resolved {
            pair,
            origin: DecisionOrigin::Human,
        })
    }

    fn show_context(&mut self, item: &Item, votes: &[Annotation], position: (usize, usize)) -> io::Result<()> {
        self.prompt.show(&format!("{}/{}", position.0, position.1))?;
        self.prompt.show(&item.text)?;
        self.prompt.show(&format!("explicitness: {}", item.explicitness))?;
        self.prompt.show(&format!("target: {}", item.target))?;
        for vote in votes {
            self.prompt.show(&format!(
                "  {}: {} / {}",
                vote.source_identity, vote.explicitness, vote.target
            ))?;
        }
        Ok(())
    }

    /// Keep asking until a valid code or the stop code arrives.
    /// End of input counts as stop.
    fn ask_axis(&mut self, axis: Axis) -> io::Result<Answer> {
        let question = format!("{} | [S]AVE & EXIT", axis.prompt());
        loop {
            let Some(input) = self.prompt.ask(&question)? else {
                return Ok(Answer::Stop);
            };
            let first = input.chars().next().map(|c| c.to_ascii_lowercase());
            if first == Some(STOP_CODE) {
                return Ok(Answer::Stop);
            }
            match axis.decode(&input) {
                Some(label) => return Ok(Answer::Label(label)),
                None => self.prompt.show(&format!("unrecognized code {:?}", input))?,
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
