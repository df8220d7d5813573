//! Interactive shell screen handling
//!
//! Device CLIs are driven through a PTY shell, so command output arrives as a
//! terminal stream: the echoed command, the output (interrupted by pager
//! prompts on devices that page), and finally the next prompt. [`ShellScreen`]
//! holds the compiled patterns used to make sense of that stream.

use regex::Regex;

/// Default prompt shape: `R1#`, `veos-b1>`, `admin@vmx1>`, `ubnt@edge:~$`
pub const DEFAULT_PROMPT_PATTERN: &str = r"^[\w.@:~/()\[\]+-]+\s?[>#$%]\s*$";

/// Pager prompts answered with a space while output is collected
pub const DEFAULT_PAGER_PATTERNS: [&str; 4] = [
    r"(?i)-+\s*more\s*-+",
    r"(?i)---\(more( \d+%)?\)---",
    r"(?i)<--- more --->",
    r"(?im)^lines \d+-\d+\s*$",
];

/// Compiled prompt and pager patterns
#[derive(Debug, Clone)]
pub struct ShellScreen {
    prompt: Regex,
    pagers: Vec<Regex>,
    escapes: Regex,
}

impl ShellScreen {
    pub fn new(prompt: &str, pagers: &[String]) -> Result<Self, regex::Error> {
        Ok(Self {
            prompt: Regex::new(prompt)?,
            pagers: pagers
                .iter()
                .map(|p| Regex::new(p))
                .collect::<Result<_, _>>()?,
            // CSI sequences plus the lone ESC-letter forms some CLIs emit
            escapes: Regex::new(r"\x1b(?:\[[0-9;?]*[ -/]*[@-~]|[=>@-Z\\-_])")?,
        })
    }

    /// Terminal stream to plain text: escapes, carriage returns and
    /// backspaces removed
    pub fn clean(&self, raw: &str) -> String {
        let text = self.escapes.replace_all(raw, "");
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '\r' => {}
                '\x08' => {
                    out.pop();
                }
                _ => out.push(c),
            }
        }
        out
    }

    /// The prompt, if the screen currently ends with one
    pub fn trailing_prompt(&self, screen: &str) -> Option<String> {
        let line = last_line(screen).trim();
        self.prompt.is_match(line).then(|| line.to_string())
    }

    /// Whether the screen currently ends with `prompt`
    pub fn ends_with_prompt(&self, screen: &str, prompt: &str) -> bool {
        last_line(screen).trim() == prompt
    }

    /// Whether the screen is waiting at a pager prompt
    pub fn at_pager(&self, screen: &str) -> bool {
        let line = last_line(screen).trim();
        !line.is_empty() && self.pagers.iter().any(|re| re.is_match(line))
    }

    /// Output of `command` from a screen ending at the prompt
    ///
    /// Drops the echoed command line, pager residue and the trailing prompt.
    pub fn command_output(&self, screen: &str, command: &str) -> String {
        let mut text = screen.to_string();
        for re in &self.pagers {
            text = re.replace_all(&text, "").into_owned();
        }

        let mut lines: Vec<&str> = text.lines().collect();
        if lines
            .first()
            .is_some_and(|l| l.trim_end().ends_with(command.trim()))
        {
            lines.remove(0);
        }
        if lines.last().is_some_and(|l| self.prompt.is_match(l.trim())) {
            lines.pop();
        }

        let mut output = lines
            .into_iter()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n");
        output.push('\n');
        output
    }
}

impl Default for ShellScreen {
    fn default() -> Self {
        let pagers: Vec<String> = DEFAULT_PAGER_PATTERNS.iter().map(|p| p.to_string()).collect();
        // The default patterns are constants
        Self::new(DEFAULT_PROMPT_PATTERN, &pagers).expect("default shell patterns are valid")
    }
}

fn last_line(screen: &str) -> &str {
    screen.rsplit('\n').next().unwrap_or(screen)
}
