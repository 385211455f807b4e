//! Terminal confirmation for `recover`
//!
//! Restarting the display manager ends every graphical application, so a
//! plain "y" is not enough: the operator types RESTART.

use console::Term;
use d3guard_common::recovery::Consent;
use std::io::IsTerminal;

pub const CONFIRM_WORD: &str = "RESTART";

pub struct TerminalConsent {
    term: Term,
}

impl TerminalConsent {
    pub fn new() -> Self {
        Self {
            term: Term::stderr(),
        }
    }
}

impl Default for TerminalConsent {
    fn default() -> Self {
        Self::new()
    }
}

/// Accept only the exact confirmation word
pub fn is_confirmation(answer: &str) -> bool {
    answer.trim() == CONFIRM_WORD
}

impl Consent for TerminalConsent {
    fn is_interactive(&self) -> bool {
        std::io::stdin().is_terminal() && self.term.is_term()
    }

    fn confirm(&self, service: &str) -> bool {
        let prompt = format!(
            "Restarting {} closes every graphical application and unsaved work is lost.\n\
             Type {} to continue: ",
            service, CONFIRM_WORD
        );
        if self.term.write_str(&prompt).is_err() {
            return false;
        }
        match self.term.read_line() {
            Ok(answer) => is_confirmation(&answer),
            Err(_) => false,
        }
    }
}
