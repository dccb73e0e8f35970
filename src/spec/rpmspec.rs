use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::builtin::read_spec;
use super::{MacroContext, ParsedSpec, SpecEvaluator, SpecParseError};
use crate::process::{CommandRunner, Invocation};

/// Evaluates specs with `rpmspec -P`, so conditionals, `%()` and distribution macros
/// behave exactly as they would under rpmbuild on this host.
pub struct RpmspecEvaluator {
    runner: Arc<dyn CommandRunner>,
    program: String,
}

impl RpmspecEvaluator {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            program: "rpmspec".to_string(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn invocation(&self, spec_path: &Path, macros: &MacroContext) -> Invocation {
        let mut invocation = Invocation::new(&self.program);
        for (name, value) in macros.iter() {
            invocation = invocation.arg("--define").arg(format!("{} {}", name, value));
        }
        invocation.arg("-P").arg(spec_path.display().to_string())
    }
}

impl SpecEvaluator for RpmspecEvaluator {
    fn parse_spec(
        &self,
        spec_path: &Path,
        macros: &MacroContext,
    ) -> Result<ParsedSpec, SpecParseError> {
        let invocation = self.invocation(spec_path, macros);
        let output = self
            .runner
            .run(&invocation)
            .map_err(|e| SpecParseError::new(spec_path, e.to_string()))?;

        if !output.success() {
            let stderr = output.stderr.trim();
            let message = if stderr.is_empty() {
                format!("{} exited with status {:?}", self.program, output.status)
            } else {
                stderr.to_string()
            };
            return Err(SpecParseError::new(spec_path, message));
        }

        debug!(spec = %spec_path.display(), "rpmspec expanded spec");
        read_spec(&output.stdout, macros).map_err(|e| SpecParseError::new(spec_path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{CommandOutput, ProcessError};
    use crate::spec::SourceReference;
    use std::sync::Mutex;

    struct ScriptedRunner {
        output: CommandOutput,
        seen: Mutex<Vec<Invocation>>,
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ProcessError> {
            self.seen.lock().unwrap().push(invocation.clone());
            Ok(self.output.clone())
        }
    }

    fn runner(status: i32, stdout: &str, stderr: &str) -> Arc<ScriptedRunner> {
        Arc::new(ScriptedRunner {
            output: CommandOutput {
                status: Some(status),
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            },
            seen: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn test_passes_macros_as_defines() {
        let runner = runner(
            0,
            "Name: hello\nVersion: 1.0\nRelease: 1.fc40\nSource0: hello-1.0.tar.gz\n%description\n",
            "",
        );
        let evaluator = RpmspecEvaluator::new(runner.clone());
        let macros = MacroContext::new().with_source_dir(Path::new("/pkg"));

        let parsed = evaluator
            .parse_spec(Path::new("/pkg/hello.spec"), &macros)
            .unwrap();
        assert_eq!(parsed.release, "1.fc40");
        assert_eq!(parsed.sources, vec![SourceReference::source("hello-1.0.tar.gz", 0)]);

        let seen = runner.seen.lock().unwrap();
        assert_eq!(
            seen[0].args,
            vec!["--define", "_sourcedir /pkg", "-P", "/pkg/hello.spec"]
        );
        assert_eq!(seen[0].program, "rpmspec");
    }

    #[test]
    fn test_failure_surfaces_stderr() {
        let runner = runner(1, "", "error: line 3: Unknown tag: bogus\n");
        let evaluator = RpmspecEvaluator::new(runner);

        let err = evaluator
            .parse_spec(Path::new("/pkg/hello.spec"), &MacroContext::new())
            .unwrap_err();
        assert_eq!(err.message, "error: line 3: Unknown tag: bogus");
    }

    #[test]
    fn test_failure_without_stderr() {
        let runner = runner(2, "", "");
        let evaluator = RpmspecEvaluator::new(runner).with_program("/usr/bin/rpmspec");

        let err = evaluator
            .parse_spec(Path::new("/pkg/hello.spec"), &MacroContext::new())
            .unwrap_err();
        assert!(err.message.contains("/usr/bin/rpmspec"));
    }
}
