//! Interactive questions (menu choice, kernel confirmation).

use std::io::{self, BufRead, Write};

use crate::error::{Error, Result};

/// Source of answers to interactive questions.
pub trait Prompt {
    /// Show `question` and return the answer without the trailing newline.
    fn ask(&mut self, question: &str) -> Result<String>;

    /// Show informational text (the menu).
    fn show(&mut self, text: &str);
}

/// Asks on stdout, reads stdin.
#[derive(Debug, Default)]
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn ask(&mut self, question: &str) -> Result<String> {
        print!("{}", question);
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        println!();
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn show(&mut self, text: &str) {
        print!("{}", text);
    }
}

/// Ask whether to use the running kernel, or for another release name.
pub fn confirm_kernel(prompt: &mut dyn Prompt, running: &str) -> Result<String> {
    let question = format!("Do you want to use the current kernel: {} [Y/n]: ", running);
    match prompt.ask(&question)?.trim() {
        "" | "y" | "Y" => Ok(running.to_string()),
        "n" | "N" => {
            let kernel = prompt.ask("Please enter the kernel name: ")?;
            let kernel = kernel.trim();
            if kernel.is_empty() {
                return Err(Error::InvalidKernelChoice("no kernel entered".to_string()));
            }
            Ok(kernel.to_string())
        }
        other => Err(Error::InvalidKernelChoice(format!("unexpected answer '{}'", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted(VecDeque<&'static str>);

    impl Prompt for Scripted {
        fn ask(&mut self, _question: &str) -> Result<String> {
            Ok(self.0.pop_front().unwrap_or_default().to_string())
        }

        fn show(&mut self, _text: &str) {}
    }

    #[test]
    fn test_accept_running_kernel() {
        let mut prompt = Scripted(VecDeque::from([""]));
        assert_eq!(confirm_kernel(&mut prompt, "6.1.0").unwrap(), "6.1.0");
    }

    #[test]
    fn test_other_kernel() {
        let mut prompt = Scripted(VecDeque::from(["n", "5.15.0-zfs"]));
        assert_eq!(confirm_kernel(&mut prompt, "6.1.0").unwrap(), "5.15.0-zfs");
    }

    #[test]
    fn test_empty_kernel_name() {
        let mut prompt = Scripted(VecDeque::from(["N", ""]));
        assert!(matches!(
            confirm_kernel(&mut prompt, "6.1.0"),
            Err(Error::InvalidKernelChoice(_))
        ));
    }

    #[test]
    fn test_bad_answer() {
        let mut prompt = Scripted(VecDeque::from(["maybe"]));
        assert!(confirm_kernel(&mut prompt, "6.1.0").is_err());
    }
}
