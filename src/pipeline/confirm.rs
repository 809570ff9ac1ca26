//! Operator confirmation before destructive steps.

use dialoguer::Confirm;
use tracing::warn;

/// Yes/no gate in front of every mutation of the store.
///
/// Anything other than an explicit yes counts as no.
pub trait Confirmation {
    fn confirm(&mut self, prompt: &str) -> bool;
}

impl<F> Confirmation for F
where
    F: FnMut(&str) -> bool,
{
    fn confirm(&mut self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Interactive prompt on the controlling terminal, defaulting to no
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConfirmation;

impl Confirmation for TerminalConfirmation {
    fn confirm(&mut self, prompt: &str) -> bool {
        match Confirm::new().with_prompt(prompt).default(false).interact() {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Confirmation prompt unavailable ({}), treating as no", e);
                false
            }
        }
    }
}
