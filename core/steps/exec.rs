use super::{StepContext, StepError};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::*;

/// Spawns a process and waits for it to exit successfully.
///
/// The process runs in the rule's scratch directory unless another working directory inside the
/// output area is given. Its stdout is discarded, and its stderr is kept to report failures.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecStep {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_dir: Option<PathBuf>,
}

impl ExecStep {
    pub fn new<P: Into<String>>(program: P) -> Self {
        Self {
            program: program.into(),
            args: vec![],
            env: BTreeMap::new(),
            working_dir: None,
        }
    }

    pub fn arg<A: Into<String>>(mut self, arg: A) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn working_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn description(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    #[tracing::instrument(name = "ExecStep::run", skip(self, ctx), fields(program = %self.program))]
    pub async fn run(&self, ctx: &StepContext) -> Result<(), StepError> {
        let working_dir = self
            .working_dir
            .clone()
            .unwrap_or_else(|| ctx.working_dir().to_path_buf());
        ctx.check_writable(&working_dir)?;
        tokio::fs::create_dir_all(&working_dir)
            .await
            .map_err(StepError::io(&working_dir))?;

        let output = Command::new(&self.program)
            .args(&self.args)
            .envs(&self.env)
            .current_dir(&working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| StepError::CouldNotSpawn {
                program: self.program.clone(),
                err,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            debug!("{} failed with {}: {}", self.program, output.status, stderr);
            return Err(StepError::ProcessFailed {
                program: self.program.clone(),
                status: output.status,
                stderr,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BuildTarget, OutputPaths};

    fn ctx(root: &std::path::Path) -> (StepContext, PathBuf) {
        let target: BuildTarget = "//a:b".parse().unwrap();
        let paths = OutputPaths::new(root.join("out")).rule_paths(&target);
        let gen_dir = paths.gen_dir().to_path_buf();
        (StepContext::new(target, root, &paths), gen_dir)
    }

    #[tokio::test]
    async fn runs_processes_with_arguments_and_env() {
        let root = assert_fs::TempDir::new().unwrap();
        let (ctx, gen_dir) = ctx(root.path());
        std::fs::create_dir_all(&gen_dir).unwrap();
        let out = gen_dir.join("out.txt");

        ExecStep::new("/bin/sh")
            .arg("-c")
            .arg(format!("printf \"$GREETING\" > {}", out.display()))
            .env("GREETING", "hello")
            .run(&ctx)
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(out).unwrap(), "hello");
    }

    #[tokio::test]
    async fn processes_start_in_the_scratch_dir() {
        let root = assert_fs::TempDir::new().unwrap();
        let (ctx, _) = ctx(root.path());

        ExecStep::new("/bin/sh")
            .arg("-c")
            .arg("touch here")
            .run(&ctx)
            .await
            .unwrap();

        assert!(ctx.working_dir().join("here").exists());
    }

    #[tokio::test]
    async fn failing_processes_report_their_stderr() {
        let root = assert_fs::TempDir::new().unwrap();
        let (ctx, _) = ctx(root.path());

        let err = ExecStep::new("/bin/sh")
            .arg("-c")
            .arg("echo 'syntax error' >&2; exit 3")
            .run(&ctx)
            .await
            .unwrap_err();

        assert_matches!(
            err,
            StepError::ProcessFailed { status, stderr, .. }
                if status.code() == Some(3) && stderr.contains("syntax error")
        );
    }

    #[tokio::test]
    async fn missing_programs_can_not_be_spawned() {
        let root = assert_fs::TempDir::new().unwrap();
        let (ctx, _) = ctx(root.path());

        let err = ExecStep::new("/definitely/not/a/program")
            .run(&ctx)
            .await
            .unwrap_err();

        assert_matches!(err, StepError::CouldNotSpawn { .. });
    }

    #[tokio::test]
    async fn working_dirs_outside_the_output_area_are_refused() {
        let root = assert_fs::TempDir::new().unwrap();
        let (ctx, _) = ctx(root.path());

        let err = ExecStep::new("/bin/true")
            .working_dir(root.path())
            .run(&ctx)
            .await
            .unwrap_err();

        assert_matches!(err, StepError::EscapesOutputArea { .. });
    }

    #[test]
    fn descriptions_show_the_command_line() {
        let step = ExecStep::new("idlc").arg("Foo.idl").arg("-o").arg("out");
        assert_eq!(step.description(), "idlc Foo.idl -o out");
    }
}
