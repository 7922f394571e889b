//! Line-based operator prompts.
//!
//! Every question accepts the quit token; end of input counts as quitting.

use anyhow::Result;
use std::io::{self, BufRead, Write};

pub const QUIT_TOKEN: &str = "q";

pub trait Prompt {
    /// Prints `question` without a newline and reads one line of input.
    /// Returns `None` once input is exhausted.
    fn ask(&mut self, question: &str) -> io::Result<Option<String>>;

    fn say(&mut self, message: &str) -> io::Result<()>;
}

pub struct LinePrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LinePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    #[cfg(test)]
    pub(crate) fn output(&self) -> &W {
        &self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

impl LinePrompt<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Prompt for LinePrompt<R, W> {
    fn ask(&mut self, question: &str) -> io::Result<Option<String>> {
        write!(self.output, "{}", question)?;
        self.output.flush()?;
        let mut line = Vec::new();
        if self.input.read_until(b'\n', &mut line)? == 0 {
            writeln!(self.output)?;
            return Ok(None);
        }
        // Undecodable bytes become U+FFFD and fail whatever validation follows.
        let line = String::from_utf8_lossy(&line);
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn say(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.output, "{}", message)
    }
}

pub fn is_quit(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case(QUIT_TOKEN)
}

/// `(Y/n)` question where only `y`, `yes` or an empty answer mean yes.
/// Used before anything irreversible and before starting another round.
pub fn confirm<P: Prompt + ?Sized>(prompt: &mut P, question: &str) -> Result<bool> {
    let Some(answer) = prompt.ask(question)? else {
        return Ok(false);
    };
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "" | "y" | "yes"
    ))
}

/// `(Y/n)` question where anything but `n`, `no` or the quit token means yes.
pub fn unless_declined<P: Prompt + ?Sized>(prompt: &mut P, question: &str) -> Result<bool> {
    let Some(answer) = prompt.ask(question)? else {
        return Ok(false);
    };
    Ok(!matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "n" | "no" | QUIT_TOKEN
    ))
}

pub fn pause<P: Prompt + ?Sized>(prompt: &mut P, message: &str) -> Result<()> {
    prompt.ask(message)?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn scripted(input: &str) -> LinePrompt<io::Cursor<Vec<u8>>, Vec<u8>> {
    LinePrompt::new(io::Cursor::new(input.as_bytes().to_vec()), Vec::new())
}
