// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Interactive REPL (Read-Eval-Print Loop) for Garnet.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use garnet_core::builtins::exception::format_report;
use garnet_core::{Engine, Error};
use owo_colors::OwoColorize;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Config, Editor, Helper};
use tracing::{debug, warn};

const HISTORY_FILE: &str = "history";
const MAX_HISTORY_SIZE: usize = 1000;

const KEYWORDS: &[&str] = &[
    "alias",
    "and",
    "begin",
    "break",
    "case",
    "class",
    "def",
    "defined?",
    "do",
    "else",
    "elsif",
    "end",
    "ensure",
    "for",
    "if",
    "in",
    "module",
    "next",
    "not",
    "or",
    "redo",
    "rescue",
    "retry",
    "return",
    "then",
    "undef",
    "unless",
    "until",
    "when",
    "while",
    "yield",
];

const LITERALS: &[&str] = &["true", "false", "nil", "self", "super", "__method__"];

const BUILTINS: &[&str] = &[
    "Array",
    "BasicObject",
    "Class",
    "Comparable",
    "Enumerable",
    "Exception",
    "Hash",
    "Integer",
    "Kernel",
    "Module",
    "Object",
    "Proc",
    "StandardError",
    "String",
    "Symbol",
    "attr_accessor",
    "attr_reader",
    "attr_writer",
    "block_given?",
    "extend",
    "include",
    "lambda",
    "print",
    "private",
    "proc",
    "protected",
    "public",
    "puts",
    "raise",
    "require",
    "require_relative",
];

/// Keywords that open a block closed by `end`.
const BLOCK_OPENERS: &[&str] = &["def", "class", "module", "begin", "case", "do"];

/// Openers that are also statement modifiers (`x if y`).
const MODIFIER_OPENERS: &[&str] = &["if", "unless", "while", "until"];

/// REPL commands that can be executed with a dot prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplCommand {
    Help,
    Exit,
    Clear,
    Version,
    Load,
}

impl ReplCommand {
    /// Parse a REPL command from input string
    pub fn parse(input: &str) -> Option<(Self, Option<&str>)> {
        let rest = input.trim().strip_prefix('.')?;
        let mut parts = rest.splitn(2, char::is_whitespace);
        let cmd = parts.next()?.to_lowercase();
        let arg = parts.next().map(str::trim).filter(|arg| !arg.is_empty());

        match cmd.as_str() {
            "help" | "h" | "?" => Some((ReplCommand::Help, arg)),
            "exit" | "quit" | "q" => Some((ReplCommand::Exit, arg)),
            "clear" | "cls" => Some((ReplCommand::Clear, arg)),
            "version" | "v" => Some((ReplCommand::Version, arg)),
            "load" | "l" => Some((ReplCommand::Load, arg)),
            _ => None,
        }
    }

    pub fn all_commands() -> &'static [(&'static str, &'static str)] {
        &[
            (".help", "Show this help message"),
            (".exit", "Exit the REPL"),
            (".clear", "Clear the screen"),
            (".version", "Show version information"),
            (".load <file>", "Load and execute a Ruby file"),
        ]
    }
}

/// Completion, hints, highlighting and multi-line validation.
struct GarnetHelper {
    words: Vec<&'static str>,
}

impl GarnetHelper {
    fn new() -> Self {
        let mut words: Vec<&'static str> = KEYWORDS
            .iter()
            .chain(LITERALS)
            .chain(BUILTINS)
            .copied()
            .collect();
        words.extend([".help", ".exit", ".clear", ".version", ".load"]);
        words.sort_unstable();
        words.dedup();
        Self { words }
    }

    fn word_start(line: &str, pos: usize) -> usize {
        line[..pos]
            .rfind(|c: char| !is_word_char(c) && c != '.')
            .map(|i| i + 1)
            .unwrap_or(0)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '?' || c == '!'
}

impl Completer for GarnetHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = Self::word_start(line, pos);
        let word = &line[start..pos];
        if word.is_empty() {
            return Ok((pos, vec![]));
        }

        let matches = self
            .words
            .iter()
            .filter(|candidate| candidate.starts_with(word))
            .map(|candidate| Pair {
                display: candidate.to_string(),
                replacement: candidate[word.len()..].to_string(),
            })
            .collect();

        Ok((pos, matches))
    }
}

impl Hinter for GarnetHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<Self::Hint> {
        if pos < line.len() {
            return None;
        }

        let word = &line[Self::word_start(line, pos)..];
        if word.len() < 2 {
            return None;
        }

        self.words
            .iter()
            .find(|candidate| candidate.starts_with(word) && candidate.len() > word.len())
            .map(|candidate| (&candidate[word.len()..]).dimmed().to_string())
    }
}

impl Highlighter for GarnetHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        let mut result = String::with_capacity(line.len() * 2);
        let mut current_word = String::new();
        let mut in_string: Option<char> = None;

        for c in line.chars() {
            if let Some(quote) = in_string {
                result.push_str(&c.green().to_string());
                if c == quote {
                    in_string = None;
                }
                continue;
            }
            if is_word_char(c) || c == '@' || c == '$' {
                current_word.push(c);
                continue;
            }
            if !current_word.is_empty() {
                result.push_str(&highlight_word(&current_word));
                current_word.clear();
            }
            let colored = match c {
                '"' | '\'' => {
                    in_string = Some(c);
                    c.green().to_string()
                }
                '(' | ')' | '[' | ']' | '{' | '}' | '|' => c.yellow().to_string(),
                '+' | '-' | '*' | '/' | '%' | '=' | '<' | '>' | '!' | '&' | '^' => {
                    c.cyan().to_string()
                }
                ':' => c.magenta().to_string(),
                _ => c.to_string(),
            };
            result.push_str(&colored);
        }

        if !current_word.is_empty() {
            result.push_str(&highlight_word(&current_word));
        }

        Cow::Owned(result)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn highlight_word(word: &str) -> String {
    if KEYWORDS.contains(&word) {
        word.magenta().bold().to_string()
    } else if LITERALS.contains(&word) {
        word.blue().to_string()
    } else if word.starts_with('@') || word.starts_with('$') {
        word.bright_blue().to_string()
    } else if word.starts_with(|c: char| c.is_ascii_uppercase()) || BUILTINS.contains(&word) {
        word.cyan().to_string()
    } else if word.chars().all(|c| c.is_ascii_digit() || c == '_') {
        word.yellow().to_string()
    } else {
        word.to_string()
    }
}

impl Validator for GarnetHelper {
    fn validate(&self, ctx: &mut ValidationContext<'_>) -> rustyline::Result<ValidationResult> {
        let input = ctx.input();
        if ReplCommand::parse(input).is_some() {
            return Ok(ValidationResult::Valid(None));
        }
        if needs_more_input(input) {
            return Ok(ValidationResult::Incomplete);
        }
        Ok(ValidationResult::Valid(None))
    }
}

impl Helper for GarnetHelper {}

/// Whether `input` leaves a block, bracket or string open, or ends on a
/// token that must be followed by more code.
fn needs_more_input(input: &str) -> bool {
    let scan = Scan::of(input);
    if scan.open_blocks > 0 || scan.brackets > 0 || scan.in_string {
        return true;
    }
    let trimmed = scan.code.trim_end();
    trimmed.ends_with('\\')
        || trimmed.ends_with(',')
        || trimmed.ends_with('.')
        || trimmed.ends_with("&&")
        || trimmed.ends_with("||")
        || trimmed.ends_with(['+', '-', '*', '/', '=', '|'])
}

/// Nesting left open by a chunk of Ruby, ignoring strings and comments.
#[derive(Debug, Default)]
struct Scan {
    open_blocks: i32,
    brackets: i32,
    in_string: bool,
    /// The input with strings blanked and comments removed
    code: String,
}

impl Scan {
    fn of(input: &str) -> Self {
        let mut scan = Scan::default();
        let mut quote: Option<char> = None;
        let mut escaped = false;
        let mut in_comment = false;

        for c in input.chars() {
            if in_comment {
                if c == '\n' {
                    in_comment = false;
                    scan.code.push(c);
                }
                continue;
            }
            if let Some(q) = quote {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                    scan.code.push(c);
                }
                continue;
            }
            match c {
                '"' | '\'' => {
                    quote = Some(c);
                    scan.code.push(c);
                }
                '#' => in_comment = true,
                '(' | '[' | '{' => {
                    scan.brackets += 1;
                    scan.code.push(c);
                }
                ')' | ']' | '}' => {
                    scan.brackets -= 1;
                    scan.code.push(c);
                }
                _ => scan.code.push(c),
            }
        }
        scan.in_string = quote.is_some();
        scan.open_blocks = count_blocks(&scan.code);
        scan
    }
}

/// `end`s still owed by `code`, which must already be free of strings and
/// comments.
fn count_blocks(code: &str) -> i32 {
    let mut depth = 0;
    let mut statement_start = true;
    let mut after_dot = false;
    let mut word = String::new();
    let mut chars = code.chars().peekable();

    while let Some(c) = chars.next() {
        if is_word_char(c) || (c == ':' && word.is_empty() && chars.peek().is_some_and(|n| n.is_alphabetic())) {
            word.push(c);
            if chars.peek().is_some_and(|&n| is_word_char(n)) {
                continue;
            }
            let symbol = word.starts_with(':');
            if !symbol && !after_dot {
                match word.as_str() {
                    "end" => depth -= 1,
                    w if BLOCK_OPENERS.contains(&w) => depth += 1,
                    w if MODIFIER_OPENERS.contains(&w) && statement_start => depth += 1,
                    _ => {}
                }
            }
            statement_start = matches!(
                word.as_str(),
                "then" | "else" | "do" | "begin" | "return" | "and" | "or" | "not"
            );
            after_dot = false;
            word.clear();
            continue;
        }
        match c {
            ' ' | '\t' => {}
            '.' => {
                after_dot = true;
                statement_start = false;
            }
            '\n' | ';' | '=' | '(' | '[' | '{' | ',' | '|' | '&' => {
                after_dot = false;
                statement_start = true;
            }
            _ => {
                after_dot = false;
                statement_start = false;
            }
        }
    }
    depth
}

/// The interactive REPL for Garnet
pub struct Repl {
    engine: Engine,
    editor: Editor<GarnetHelper, DefaultHistory>,
    history_path: Option<PathBuf>,
}

impl Repl {
    /// Create a REPL that evaluates in `engine`.
    pub fn new(engine: Engine) -> rustyline::Result<Self> {
        let config = Config::builder()
            .history_ignore_dups(true)?
            .history_ignore_space(true)
            .max_history_size(MAX_HISTORY_SIZE)?
            .auto_add_history(true)
            .build();

        let mut editor = Editor::with_config(config)?;
        editor.set_helper(Some(GarnetHelper::new()));

        let history_path = dirs::data_dir().map(|dir| dir.join("garnet").join(HISTORY_FILE));
        if let Some(path) = &history_path {
            if let Some(parent) = path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    warn!(path = %parent.display(), error = %e, "cannot create history directory");
                }
            }
            if editor.load_history(path).is_err() {
                debug!(path = %path.display(), "no history loaded");
            }
        }

        Ok(Self {
            engine,
            editor,
            history_path,
        })
    }

    /// Run the REPL main loop
    pub fn run(&mut self) -> rustyline::Result<()> {
        self.print_banner();

        loop {
            let prompt = format!("{} ", "garnet>".bright_red().bold());

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    if let Some((cmd, arg)) = ReplCommand::parse(trimmed) {
                        match self.execute_command(cmd, arg) {
                            CommandResult::Continue => continue,
                            CommandResult::Exit => break,
                        }
                    }

                    self.eval_and_print(&line);
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C".dimmed());
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "^D".dimmed());
                    break;
                }
                Err(err) => {
                    eprintln!("{}: {:?}", "Error".red().bold(), err);
                    break;
                }
            }
        }

        if let Some(path) = &self.history_path {
            if let Err(e) = self.editor.save_history(path) {
                warn!(path = %path.display(), error = %e, "cannot save history");
            }
        }

        println!();
        Ok(())
    }

    fn print_banner(&self) {
        println!();
        println!(
            "  {} {} {}",
            "Garnet".bright_red().bold(),
            "v".dimmed(),
            env!("CARGO_PKG_VERSION").bright_yellow()
        );
        println!("  {}", "A Ruby interpreter written in Rust".dimmed());
        println!();
        println!(
            "  {} {} {}",
            "Type".dimmed(),
            ".help".cyan(),
            "for available commands".dimmed()
        );
        println!();
    }

    fn execute_command(&mut self, cmd: ReplCommand, arg: Option<&str>) -> CommandResult {
        match cmd {
            ReplCommand::Help => self.print_help(),
            ReplCommand::Exit => return CommandResult::Exit,
            ReplCommand::Clear => print!("\x1B[2J\x1B[H"),
            ReplCommand::Version => {
                println!(
                    "{} {}",
                    "garnet".bright_red().bold(),
                    env!("CARGO_PKG_VERSION").yellow()
                );
            }
            ReplCommand::Load => match arg {
                Some(path) => {
                    let result = self.engine.eval_file(Path::new(path));
                    self.show(result);
                }
                None => eprintln!(
                    "{}: {} {}",
                    "Error".red().bold(),
                    ".load".cyan(),
                    "requires a file path".dimmed()
                ),
            },
        }
        CommandResult::Continue
    }

    fn print_help(&self) {
        println!();
        println!("{}", "REPL Commands:".white().bold());
        println!();
        for (cmd, desc) in ReplCommand::all_commands() {
            println!("  {:16} {}", cmd.cyan(), desc.dimmed());
        }
        println!();
        println!("{}", "Keyboard Shortcuts:".white().bold());
        println!();
        println!("  {:16} {}", "Ctrl+C".yellow(), "Cancel current input".dimmed());
        println!("  {:16} {}", "Ctrl+D".yellow(), "Exit REPL".dimmed());
        println!("  {:16} {}", "Tab".yellow(), "Autocomplete".dimmed());
        println!("  {:16} {}", "↑/↓".yellow(), "Navigate history".dimmed());
        println!();
    }

    fn eval_and_print(&mut self, input: &str) {
        let result = self.engine.eval(input);
        self.show(result);
    }

    /// Prints program output, then `=> inspect` or the error.
    fn show(&mut self, result: Result<garnet_core::Value, Error>) {
        let flushed = self.engine.flush();
        match result.and_then(|value| flushed.map(|_| value)) {
            Ok(value) => {
                let shown = self.engine.inspect(&value);
                println!("{} {}", "=>".dimmed(), shown.bright_white());
            }
            Err(e) => print_error(&e),
        }
    }
}

/// Result of executing a REPL command
enum CommandResult {
    Continue,
    Exit,
}

fn print_error(error: &Error) {
    match error {
        Error::Raised {
            exception,
            backtrace,
        } => {
            let origin = &backtrace[..backtrace.len().min(1)];
            let report = format_report(&exception.class_name, &exception.message, origin);
            eprintln!("{}", report.red());
        }
        Error::Syntax { .. } => eprintln!("{}: {}", "SyntaxError".red().bold(), error),
        Error::Io(_) => eprintln!("{}: {}", "Error".red().bold(), error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repl_command_parse() {
        assert!(matches!(ReplCommand::parse(".help"), Some((ReplCommand::Help, None))));
        assert!(matches!(ReplCommand::parse(".q"), Some((ReplCommand::Exit, None))));
        assert!(matches!(
            ReplCommand::parse(".load lib/shapes.rb"),
            Some((ReplCommand::Load, Some("lib/shapes.rb")))
        ));
        assert!(ReplCommand::parse("puts 1").is_none());
        assert!(ReplCommand::parse(".bogus").is_none());
    }

    #[test]
    fn test_open_blocks_need_more_input() {
        assert!(needs_more_input("def greet(name)"));
        assert!(needs_more_input("class Foo\n  def bar\n    1\n  end"));
        assert!(needs_more_input("[1, 2].each do |x|"));
        assert!(needs_more_input("if ready"));
        assert!(!needs_more_input("def greet(name)\n  \"hi\"\nend"));
        assert!(!needs_more_input("class Foo; end"));
    }

    #[test]
    fn test_modifiers_do_not_open_blocks() {
        assert!(!needs_more_input("puts 1 if ready"));
        assert!(!needs_more_input("x += 1 while x < 10"));
        assert!(needs_more_input("x = if ready"));
    }

    #[test]
    fn test_method_names_and_symbols_are_not_keywords() {
        assert!(!needs_more_input("obj.class"));
        assert!(!needs_more_input("[:end, :def]"));
        assert!(!needs_more_input("puts \"def in a string\""));
        assert!(!needs_more_input("x = 1 # class comment"));
    }

    #[test]
    fn test_brackets_and_continuations() {
        assert!(needs_more_input("foo(1,"));
        assert!(needs_more_input("{ a: 1"));
        assert!(needs_more_input("total = 1 +"));
        assert!(!needs_more_input("[1, [2, 3]]"));
        assert!(!needs_more_input("'unbalanced ( in string'"));
    }

    #[test]
    fn test_completion_words() {
        let helper = GarnetHelper::new();
        assert!(helper.words.contains(&"attr_accessor"));
        assert!(helper.words.contains(&".load"));
        assert_eq!(GarnetHelper::word_start("foo = Enum", 10), 6);
    }
}
