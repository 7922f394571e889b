use crate::prompt::{is_quit, unless_declined, Prompt};
use anyhow::Result;
use driveprep_core::Candidate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Selected(Candidate),
    /// Nothing to act on yet; scan again.
    Rescan,
    Quit,
}

pub trait SelectionPolicy {
    fn select(&mut self, candidates: &[Candidate]) -> Result<Selection>;
}

/// Numbered menu, re-prompting until a valid index or the quit token.
pub struct InteractiveSelection<'a, P: Prompt + ?Sized> {
    prompt: &'a mut P,
}

impl<'a, P: Prompt + ?Sized> InteractiveSelection<'a, P> {
    pub fn new(prompt: &'a mut P) -> Self {
        Self { prompt }
    }
}

impl<P: Prompt + ?Sized> SelectionPolicy for InteractiveSelection<'_, P> {
    fn select(&mut self, candidates: &[Candidate]) -> Result<Selection> {
        if candidates.is_empty() {
            self.prompt.say("\nNo removable drives found.")?;
            return Ok(if unless_declined(&mut *self.prompt, "\nScan again? (Y/n): ")? {
                Selection::Rescan
            } else {
                Selection::Quit
            });
        }

        self.prompt.say("\nAvailable drives:")?;
        for (idx, candidate) in candidates.iter().enumerate() {
            self.prompt.say(&format!("{}. {}", idx + 1, candidate))?;
        }

        loop {
            let Some(choice) = self
                .prompt
                .ask("\nSelect drive number (or 'q' to quit): ")?
            else {
                return Ok(Selection::Quit);
            };
            if is_quit(&choice) {
                return Ok(Selection::Quit);
            }
            match choice.trim().parse::<usize>() {
                Ok(number) if (1..=candidates.len()).contains(&number) => {
                    return Ok(Selection::Selected(candidates[number - 1].clone()));
                }
                Ok(_) => self.prompt.say("Invalid selection. Please try again.")?,
                Err(_) => self.prompt.say("Please enter a number or 'q' to quit.")?,
            }
        }
    }
}

/// Picks the volume carrying the exact target name; used by unattended runs.
#[derive(Debug, Clone)]
pub struct TargetNameSelection {
    target: String,
}

impl TargetNameSelection {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl SelectionPolicy for TargetNameSelection {
    fn select(&mut self, candidates: &[Candidate]) -> Result<Selection> {
        Ok(candidates
            .iter()
            .find(|candidate| candidate.volume_name == self.target)
            .cloned()
            .map(Selection::Selected)
            .unwrap_or(Selection::Rescan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::scripted;

    fn three() -> Vec<Candidate> {
        vec![
            Candidate::new("/dev/disk4", "A"),
            Candidate::new("/dev/disk5", "B"),
            Candidate::new("/dev/disk6", "C"),
        ]
    }

    #[test]
    fn picks_second_on_two() {
        let mut prompt = scripted("2\n");
        let selection = InteractiveSelection::new(&mut prompt).select(&three()).unwrap();
        assert_eq!(selection, Selection::Selected(Candidate::new("/dev/disk5", "B")));
    }

    #[test]
    fn out_of_range_and_garbage_reprompt() {
        let mut prompt = scripted("0\n4\nabc\n3\n");
        let selection = InteractiveSelection::new(&mut prompt).select(&three()).unwrap();
        assert_eq!(selection, Selection::Selected(Candidate::new("/dev/disk6", "C")));

        let output = String::from_utf8(prompt.into_output()).unwrap();
        assert_eq!(output.matches("Invalid selection").count(), 2);
        assert_eq!(output.matches("Please enter a number").count(), 1);
        assert!(output.contains("2. /dev/disk5 - B"));
    }

    #[test]
    fn quit_token_returns_nothing() {
        let mut prompt = scripted("q\n");
        let selection = InteractiveSelection::new(&mut prompt).select(&three()).unwrap();
        assert_eq!(selection, Selection::Quit);
    }

    #[test]
    fn end_of_input_quits() {
        let mut prompt = scripted("abc\n");
        let selection = InteractiveSelection::new(&mut prompt).select(&three()).unwrap();
        assert_eq!(selection, Selection::Quit);
    }

    #[test]
    fn empty_scan_offers_rescan_by_default() {
        let mut prompt = scripted("\n");
        let selection = InteractiveSelection::new(&mut prompt).select(&[]).unwrap();
        assert_eq!(selection, Selection::Rescan);

        let mut prompt = scripted("n\n");
        let selection = InteractiveSelection::new(&mut prompt).select(&[]).unwrap();
        assert_eq!(selection, Selection::Quit);
    }

    #[test]
    fn target_name_must_match_exactly() {
        let mut policy = TargetNameSelection::new("NO NAME");
        assert_eq!(policy.select(&three()).unwrap(), Selection::Rescan);

        let mut candidates = three();
        candidates.push(Candidate::new("/dev/disk7", "NO NAME"));
        assert_eq!(
            policy.select(&candidates).unwrap(),
            Selection::Selected(Candidate::new("/dev/disk7", "NO NAME"))
        );
    }
}
