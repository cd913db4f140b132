//! `require` and `require_relative`.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::debug;

use super::Interpreter;
use crate::Error;
use crate::parser::Parser;
use crate::runtime::context::Runtime;
use crate::runtime::error::{Control, EvalResult, Exception};
use crate::runtime::value::Value;

impl Interpreter {
    /// Loads a feature once. Returns `true` when the file was evaluated and
    /// `false` when it had already been loaded.
    pub(super) fn require(&mut self, feature: &str, relative: bool) -> EvalResult {
        let path = self
            .resolve_feature(feature, relative)
            .ok_or_else(|| Exception::load_error(feature))?;
        let path = fs::canonicalize(&path).unwrap_or(path);
        let key = path.display().to_string();

        let loaded = match self.root.get("$LOADED_FEATURES") {
            Some(Value::Array(loaded)) => loaded,
            _ => {
                let loaded = Rc::new(RefCell::new(Vec::new()));
                self.root.set_global("$LOADED_FEATURES", Value::Array(loaded.clone()));
                loaded
            }
        };
        if loaded.borrow().iter().any(|entry| entry.as_text().as_deref() == Some(key.as_str())) {
            return Ok(Value::Bool(false));
        }
        loaded.borrow_mut().push(Value::string(key.as_str()));
        debug!(feature, path = %key, "loading feature");

        let source = fs::read_to_string(&path).map_err(|_| Exception::load_error(feature))?;
        let program = Parser::new(&source).parse_program().map_err(|error| match error {
            Error::Syntax { message, line } => Exception::syntax(format!("{}:{}: {}", key, line, message)),
            other => Exception::syntax(other.to_string()),
        })?;

        let file: Rc<str> = Rc::from(key.as_str());
        let previous = std::mem::replace(&mut self.file, file.clone());
        let pushed = self.stack.push(Rc::from("<top (required)>"), file, 1);
        let id = self.next_id();
        let scope = self.root.guard(None).with_return_tag(id);
        let result = match pushed {
            Ok(()) => {
                self.breaks.push(0);
                let result = self.evaluate(&program, &scope);
                self.breaks.pop();
                let result = match result {
                    Err(Control::Raise(mut exception)) if exception.backtrace.is_empty() => {
                        exception.backtrace = self.stack.backtrace();
                        Err(Control::Raise(exception))
                    }
                    other => other,
                };
                self.stack.pop();
                result
            }
            Err(exception) => Err(exception.into()),
        };
        self.file = previous;

        match result {
            Ok(_) => Ok(Value::Bool(true)),
            Err(Control::Return { tag, .. }) if tag == id => Ok(Value::Bool(true)),
            Err(control) => Err(control),
        }
    }

    fn resolve_feature(&self, feature: &str, relative: bool) -> Option<PathBuf> {
        let bases: Vec<PathBuf> = if relative {
            vec![self.current_dir()]
        } else if Path::new(feature).is_absolute() || feature.starts_with("./") || feature.starts_with("../") {
            vec![PathBuf::new()]
        } else {
            self.load_path()
        };
        bases.iter().find_map(|base| {
            let exact = base.join(feature);
            let with_extension = base.join(format!("{}.rb", feature));
            [with_extension, exact].into_iter().find(|candidate| candidate.is_file())
        })
    }

    // Directory of the file being executed; the working directory for
    // `-e` and the REPL
    fn current_dir(&self) -> PathBuf {
        let file = Path::new(&*self.file);
        match file.parent() {
            Some(parent) if file.is_file() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn load_path(&self) -> Vec<PathBuf> {
        match self.root.get("$LOAD_PATH") {
            Some(Value::Array(paths)) => paths
                .borrow()
                .iter()
                .filter_map(Value::as_text)
                .map(PathBuf::from)
                .collect(),
            _ => Vec::new(),
        }
    }
}
