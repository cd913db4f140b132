//! Call-stack tracking for backtraces and the recursion limit.

use std::rc::Rc;

use super::error::Exception;

/// One active call.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Method name, or `<main>`
    pub label: Rc<str>,
    /// Source file being executed
    pub file: Rc<str>,
    /// Line currently executing in this frame
    pub line: u32,
}

/// The stack of active calls, innermost last.
#[derive(Debug)]
pub struct CallStack {
    frames: Vec<Frame>,
    max_depth: usize,
}

impl CallStack {
    /// A stack holding only the `<main>` frame of `file`.
    pub fn new(file: &str, max_depth: usize) -> Self {
        Self {
            frames: vec![Frame {
                label: Rc::from("<main>"),
                file: Rc::from(file),
                line: 0,
            }],
            max_depth,
        }
    }

    /// Enters a call. Fails with `SystemStackError` past the depth limit.
    pub fn push(&mut self, label: Rc<str>, file: Rc<str>, line: u32) -> Result<(), Exception> {
        if self.frames.len() >= self.max_depth {
            return Err(Exception::stack_overflow());
        }
        self.frames.push(Frame { label, file, line });
        Ok(())
    }

    /// Leaves a call. The `<main>` frame is never popped.
    pub fn pop(&mut self) -> Option<Frame> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    /// Records the line now executing in the innermost frame.
    pub fn set_line(&mut self, line: u32) {
        if let Some(frame) = self.frames.last_mut() {
            frame.line = line;
        }
    }

    /// The innermost frame.
    pub fn current(&self) -> &Frame {
        // `new` installs `<main>` and `pop` never removes it
        &self.frames[self.frames.len() - 1]
    }

    /// Replaces the file of the innermost frame, returning the old one.
    pub fn swap_file(&mut self, file: Rc<str>) -> Rc<str> {
        let frame = self.frames.len() - 1;
        std::mem::replace(&mut self.frames[frame].file, file)
    }

    /// Number of active frames, including `<main>`.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Drops every frame above `depth`; used to unwind after an error.
    pub fn truncate(&mut self, depth: usize) {
        self.frames.truncate(depth.max(1));
    }

    /// `file:line:in 'label'` lines, innermost first.
    pub fn backtrace(&self) -> Vec<String> {
        self.frames
            .iter()
            .rev()
            .map(|frame| format!("{}:{}:in '{}'", frame.file, frame.line, frame.label))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backtrace_order() {
        let mut stack = CallStack::new("main.rb", 100);
        stack.set_line(3);
        stack.push(Rc::from("outer"), Rc::from("main.rb"), 7).unwrap();
        stack.push(Rc::from("inner"), Rc::from("lib.rb"), 2).unwrap();
        assert_eq!(
            stack.backtrace(),
            vec!["lib.rb:2:in 'inner'", "main.rb:7:in 'outer'", "main.rb:3:in '<main>'"]
        );
        stack.pop();
        assert_eq!(stack.current().label.as_ref(), "outer");
    }

    #[test]
    fn test_main_frame_survives() {
        let mut stack = CallStack::new("-", 10);
        assert!(stack.pop().is_none());
        stack.truncate(0);
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn test_depth_limit() {
        let mut stack = CallStack::new("-", 3);
        stack.push(Rc::from("a"), Rc::from("-"), 1).unwrap();
        stack.push(Rc::from("b"), Rc::from("-"), 1).unwrap();
        let err = stack.push(Rc::from("c"), Rc::from("-"), 1).unwrap_err();
        assert_eq!(err.message, "stack level too deep");
        assert_eq!(stack.depth(), 3);
    }
}
