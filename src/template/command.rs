//! Subcommand execution
//!
//! `$( argv… )` regions are resolved innermost-first: each command's stdout
//! (with a single trailing newline stripped) replaces its region text in
//! every enclosing region before that region itself runs. A non-zero exit
//! fails the enclosing test case with stderr attached.

use std::process::{Command, Stdio};

use crate::common::{Error, Result};
use crate::value::Value;

use super::tokens::{promote_quotes, split_tokens, TokenStack};

pub const CMD_PREFIX: &str = "$(";
pub const CMD_SUFFIX: &str = ")";
const CMD_DELIMITER: &str = " ";

/// Captured output of one external process run.
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit: i32,
}

/// Run `argv[0]` with the remaining arguments, capturing output.
pub fn run_command(argv: &[String]) -> Result<CommandOutput> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| Error::Command("empty command".to_string()))?;

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| Error::Command(format!("failed to spawn '{}': {}", program, e)))?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit: output.status.code().unwrap_or(-1),
    })
}

/// Run a command and return its raw stdout bytes. Used for payloads that
/// are produced by an external generator rather than written inline.
pub fn run_command_bytes(program: &str, args: &[String]) -> Result<Vec<u8>> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| Error::Command(format!("failed to spawn '{}': {}", program, e)))?;

    if !output.status.success() {
        return Err(Error::Command(format!(
            "'{}' exited with status {}: {}",
            program,
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(output.stdout)
}

pub fn is_cmd(input: &str) -> bool {
    input.starts_with(CMD_PREFIX) && input.ends_with(CMD_SUFFIX)
}

/// Strip the `$(`/`)` wrapper, split into argv honoring quotes and escapes,
/// promote quoted tokens, and run.
fn execute_command_str(input: &str) -> Result<String> {
    let inner: String = {
        let chars: Vec<char> = input.chars().collect();
        chars[CMD_PREFIX.chars().count()..chars.len() - CMD_SUFFIX.chars().count()]
            .iter()
            .collect()
    };
    let argv = promote_quotes(split_tokens(&inner, CMD_DELIMITER));
    if argv.is_empty() {
        return Ok(String::new());
    }

    let output = run_command(&argv)?;
    if output.exit != 0 {
        return Err(Error::Command(format!(
            "'{}' exited with status {}: {}",
            argv.join(" "),
            output.exit,
            output.stderr.trim_end()
        )));
    }

    let mut stdout = output.stdout;
    if stdout.ends_with('\n') {
        stdout.truncate(stdout.len() - 1);
    }
    Ok(stdout)
}

/// Execute every `$(…)` region in `input`, innermost first, substituting
/// results into enclosing regions and into the surrounding text.
pub fn execute_commands(input: &str) -> Result<String> {
    let stack = TokenStack::parse(input, CMD_PREFIX, CMD_SUFFIX);
    if stack.frames.is_empty() {
        return Ok(input.to_string());
    }

    let mut output = input.to_string();
    let mut frames: Vec<(String, String)> = stack
        .frames
        .iter()
        .map(|f| (f.text.clone(), f.text.clone()))
        .collect();

    for i in 0..frames.len() {
        let (token, resolved) = frames[i].clone();
        let mut command_output = String::new();
        // only run text that still looks like a command; results of inner
        // commands must not be re-executed
        if is_cmd(&resolved) {
            command_output = execute_command_str(&resolved)?;
        }

        if stack.frames[i].nest == 0 {
            output = output.replace(&token, &command_output);
        }
        for frame in frames.iter_mut().skip(i + 1) {
            if frame.1.contains(&token) {
                frame.1 = frame.1.replace(&token, &command_output);
            }
        }
    }

    Ok(output)
}

/// Walk a value tree and execute command regions in every string scalar.
pub fn recursive_execute(input: Value) -> Result<Value> {
    match input {
        Value::Map(map) => {
            let mut out = indexmap::IndexMap::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k, recursive_execute(v)?);
            }
            Ok(Value::Map(out))
        }
        Value::Seq(seq) => {
            let mut out = Vec::with_capacity(seq.len());
            for item in seq {
                out.push(recursive_execute(item)?);
            }
            Ok(Value::Seq(out))
        }
        Value::Str(s) => Ok(Value::Str(execute_commands(&s)?)),
        other => Ok(other),
    }
}
