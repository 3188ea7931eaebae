use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("no input files")]
    NoInput,

    #[error("assembly failed with {count} error(s)")]
    Failed {
        count: usize,
        diagnostics: Vec<Diagnostic>,
    },
}

/// A single reported problem, tagged with the source position
/// ("file:line", extended by "->" arrows through macro expansions)
/// that was current when it was logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub point: String,
    pub message: String,
}

/// The shared diagnostic sink. Errors are data: every pass keeps running
/// past them so one assembly reports as many problems as it can, and the
/// pass driver consults `count()` to decide whether to keep going.
pub struct ErrorLog {
    diagnostics: Vec<Diagnostic>,
    point: String,
    print_warnings: bool,
}

impl ErrorLog {
    pub fn new(print_warnings: bool) -> Self {
        Self {
            diagnostics: Vec::new(),
            point: "<Top Level>".to_string(),
            print_warnings,
        }
    }

    /// Sets the source position attached to subsequent diagnostics.
    pub fn set_point(&mut self, point: &str) {
        if self.point != point {
            self.point.clear();
            self.point.push_str(point);
        }
    }

    pub fn point(&self) -> &str {
        &self.point
    }

    /// Reports an error at the current position and bumps the count.
    pub fn log(&mut self, message: impl Into<String>) {
        let diagnostic = Diagnostic {
            point: self.point.clone(),
            message: message.into(),
        };
        eprintln!("{}: {}", diagnostic.point, diagnostic.message);
        self.diagnostics.push(diagnostic);
    }

    /// Prints a warning. Warnings do not bump the error count.
    pub fn warn(&mut self, message: impl AsRef<str>) {
        if self.print_warnings {
            eprintln!("{}: WARNING: {}", self.point, message.as_ref());
        }
    }

    pub fn count(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn report(&self) -> String {
        match self.count() {
            0 => "No errors".to_string(),
            1 => "1 error".to_string(),
            n => format!("{} errors", n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_and_report() {
        let mut log = ErrorLog::new(true);
        assert_eq!(log.count(), 0);
        assert_eq!(log.report(), "No errors");

        log.set_point("test.oph:3");
        log.log("something went wrong");
        assert_eq!(log.count(), 1);
        assert_eq!(log.report(), "1 error");
        assert_eq!(log.diagnostics()[0].point, "test.oph:3");

        log.log("something else went wrong");
        assert_eq!(log.report(), "2 errors");
    }

    #[test]
    fn test_warnings_do_not_count() {
        let mut log = ErrorLog::new(false);
        log.warn("suspicious but legal");
        assert_eq!(log.count(), 0);
    }
}
