use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader, IsTerminal, Write};
use std::ops::RangeInclusive;

use anyhow::{Context, Result};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("input closed before a response was read")]
    InputClosed,
}

/// True when `error` (or anything it wraps) is an end-of-input signal that
/// should stop the whole run.
pub fn is_input_closed(error: &anyhow::Error) -> bool {
    error
        .chain()
        .any(|cause| cause.downcast_ref::<ConsoleError>().is_some())
}

/// Line-oriented user interaction.
pub trait Console {
    fn say(&mut self, line: &str);

    /// Show `prompt` and read one line, trimmed. End of input is
    /// `ConsoleError::InputClosed`.
    fn ask(&mut self, prompt: &str) -> Result<String>;
}

/// Console on the process terminal. When stdin is piped (titles fed to
/// `add`), prompts are read from the controlling terminal instead.
pub struct StdConsole {
    input: Box<dyn BufRead>,
}

impl StdConsole {
    pub fn new() -> Self {
        let input: Box<dyn BufRead> = if io::stdin().is_terminal() {
            Box::new(BufReader::new(io::stdin()))
        } else {
            match File::open("/dev/tty") {
                Ok(tty) => Box::new(BufReader::new(tty)),
                Err(_) => Box::new(BufReader::new(io::stdin())),
            }
        };
        Self { input }
    }
}

impl Default for StdConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl Console for StdConsole {
    fn say(&mut self, line: &str) {
        println!("{line}");
    }

    fn ask(&mut self, prompt: &str) -> Result<String> {
        print!("{prompt}");
        io::stdout().flush().context("failed to flush stdout")?;
        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .context("failed to read user input")?;
        if read == 0 {
            return Err(ConsoleError::InputClosed.into());
        }
        Ok(line.trim().to_string())
    }
}

/// Console fed from a fixed list of responses; records everything shown.
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    responses: VecDeque<String>,
    pub transcript: Vec<String>,
}

impl ScriptedConsole {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: responses.into_iter().map(Into::into).collect(),
            transcript: Vec::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.responses.len()
    }

    pub fn prompts(&self) -> usize {
        self.transcript
            .iter()
            .filter(|line| line.starts_with("? "))
            .count()
    }

    pub fn printed(&self, needle: &str) -> bool {
        self.transcript.iter().any(|line| line.contains(needle))
    }
}

impl Console for ScriptedConsole {
    fn say(&mut self, line: &str) {
        self.transcript.push(line.to_string());
    }

    fn ask(&mut self, prompt: &str) -> Result<String> {
        self.transcript.push(format!("? {prompt}"));
        match self.responses.pop_front() {
            Some(response) => Ok(response.trim().to_string()),
            None => Err(ConsoleError::InputClosed.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Reply {
    Accept(usize),
    Reprompt(String),
}

fn validate_choice(raw: &str, range: &RangeInclusive<usize>) -> Reply {
    match raw.parse::<usize>() {
        Ok(choice) if range.contains(&choice) => Reply::Accept(choice),
        Ok(_) => Reply::Reprompt(format!(
            "Please enter a number between {} and {}",
            range.start(),
            range.end()
        )),
        Err(_) => Reply::Reprompt("Please enter a valid number".to_string()),
    }
}

/// Ask until the reply is a number inside `range`. Invalid replies re-prompt;
/// only end of input ends the loop without a choice.
pub fn choose_number(
    console: &mut dyn Console,
    prompt: &str,
    range: RangeInclusive<usize>,
) -> Result<usize> {
    loop {
        let raw = console.ask(prompt)?;
        match validate_choice(&raw, &range) {
            Reply::Accept(choice) => return Ok(choice),
            Reply::Reprompt(message) => console.say(&message),
        }
    }
}

/// Yes/no question; anything other than `y` is a no.
pub fn confirm(console: &mut dyn Console, prompt: &str) -> Result<bool> {
    let answer = console.ask(prompt)?;
    Ok(answer.eq_ignore_ascii_case("y"))
}

#[cfg(test)]
mod tests {
    use super::{
        ConsoleError, Reply, ScriptedConsole, choose_number, confirm, is_input_closed,
        validate_choice,
    };

    #[test]
    fn validation_accepts_only_in_range_numbers() {
        assert_eq!(validate_choice("2", &(0..=3)), Reply::Accept(2));
        assert_eq!(validate_choice("0", &(0..=3)), Reply::Accept(0));
        assert_eq!(
            validate_choice("4", &(0..=3)),
            Reply::Reprompt("Please enter a number between 0 and 3".to_string())
        );
        assert_eq!(
            validate_choice("two", &(0..=3)),
            Reply::Reprompt("Please enter a valid number".to_string())
        );
        assert_eq!(
            validate_choice("-1", &(0..=3)),
            Reply::Reprompt("Please enter a valid number".to_string())
        );
    }

    #[test]
    fn choose_number_reprompts_until_valid() {
        let mut console = ScriptedConsole::new(["abc", "9", " 2 "]);
        let choice = choose_number(&mut console, "Pick: ", 0..=3).expect("choice");
        assert_eq!(choice, 2);
        assert_eq!(console.prompts(), 3);
        assert!(console.printed("Please enter a valid number"));
        assert!(console.printed("Please enter a number between 0 and 3"));
    }

    #[test]
    fn closed_input_is_a_typed_error() {
        let mut console = ScriptedConsole::new(Vec::<String>::new());
        let error = choose_number(&mut console, "Pick: ", 0..=1).expect_err("closed");
        assert!(is_input_closed(&error));
        assert_eq!(
            error.downcast_ref::<ConsoleError>(),
            Some(&ConsoleError::InputClosed)
        );

        let wrapped = error.context("while resolving Dune");
        assert!(is_input_closed(&wrapped));
    }

    #[test]
    fn confirm_only_accepts_y() {
        let mut console = ScriptedConsole::new(["Y", "yes", "n"]);
        assert!(confirm(&mut console, "Overwrite? (y/n): ").expect("first"));
        assert!(!confirm(&mut console, "Overwrite? (y/n): ").expect("second"));
        assert!(!confirm(&mut console, "Overwrite? (y/n): ").expect("third"));
    }
}
