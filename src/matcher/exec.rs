//! External-program matcher
//!
//! Hands the matched value to an external program and judges the field by
//! the program's exit code. The matched value is visible to the command's
//! arguments through its `storeAs` name before the program runs.

use indexmap::IndexMap;

use crate::common::Result;
use crate::store::DataStore;
use crate::template::command::{execute_commands, run_command};
use crate::value::Value;

use super::{
    bad_var_err, check_existence, malformed_err, Existence, FieldProps, MatchOutcome,
    KEY_ARGS, KEY_BIN, KEY_CMD, KEY_RETURNS, TYPE_ARRAY, TYPE_INT, TYPE_STR,
};

#[derive(Debug, Clone)]
pub struct ExecMatcher {
    /// One-liner command; resolved through the full template pipeline.
    pub cmd: Option<String>,
    /// Split form: program path plus arguments, each argument resolved
    /// individually.
    pub bin: Option<String>,
    pub args: Vec<String>,
    /// Expected exit code; absent means the exit code is not checked for
    /// the split form and must be zero for the one-liner form.
    pub return_code: Option<i32>,
    pub props: FieldProps,
}

impl ExecMatcher {
    pub fn parse(parent: &Value, node: &IndexMap<String, Value>) -> Result<ExecMatcher> {
        let mut return_code = None;
        if let Some(v) = node.get(KEY_RETURNS) {
            match v {
                Value::Int(i) => return_code = Some(*i as i32),
                _ => return Err(malformed_err(KEY_RETURNS, TYPE_INT, parent)),
            }
        }

        let mut cmd = None;
        let mut bin = None;
        let mut args = Vec::new();
        if let Some(v) = node.get(KEY_CMD) {
            match v {
                Value::Str(s) => cmd = Some(s.clone()),
                _ => return Err(malformed_err(KEY_CMD, TYPE_STR, parent)),
            }
        } else {
            if let Some(v) = node.get(KEY_BIN) {
                match v {
                    Value::Str(s) => bin = Some(s.clone()),
                    _ => return Err(malformed_err(KEY_BIN, TYPE_STR, parent)),
                }
            }
            if let Some(v) = node.get(KEY_ARGS) {
                let Value::Seq(seq) = v else {
                    return Err(malformed_err(KEY_ARGS, TYPE_ARRAY, parent));
                };
                for item in seq {
                    match item {
                        Value::Str(s) => args.push(s.clone()),
                        _ => return Err(malformed_err(KEY_ARGS, TYPE_STR, parent)),
                    }
                }
            }
        }

        if cmd.is_none() && bin.is_none() {
            return Err(malformed_err(KEY_CMD, TYPE_STR, parent));
        }

        Ok(ExecMatcher {
            cmd,
            bin,
            args,
            return_code,
            props: FieldProps::parse(parent, node)?,
        })
    }

    pub fn evaluate(&self, value: &Value, store: &DataStore) -> Result<MatchOutcome> {
        match check_existence(value, self.props.exists, self.props.nullable) {
            Existence::Fail(msg) => return Ok(MatchOutcome::fail(msg)),
            Existence::PassAndSkip => return Ok(MatchOutcome::pass("")),
            Existence::Evaluate => {}
        }

        // expose the matched value to the command's own arguments; the
        // durable capture still waits for the case to pass
        let mut overlay = store.clone();
        if let Some(name) = &self.props.store_as {
            overlay
                .put(name, value.clone())
                .map_err(|_| bad_var_err(name))?;
        }

        let outcome = if let Some(cmd) = &self.cmd {
            let resolved = overlay
                .expand_variable(cmd)
                .map_err(|_| bad_var_err(cmd))?
                .to_text_or(cmd);
            match execute_commands(&resolved) {
                Ok(output) => {
                    let trimmed = output.trim();
                    if trimmed.is_empty() {
                        MatchOutcome::pass("[status 0]")
                    } else {
                        MatchOutcome::pass(trimmed)
                    }
                }
                Err(e) => MatchOutcome::fail(format!("[{}]", e)),
            }
        } else {
            self.run_split_form(&overlay)?
        };

        Ok(outcome.with_capture(&self.props, value))
    }

    fn run_split_form(&self, store: &DataStore) -> Result<MatchOutcome> {
        let bin = self.bin.as_deref().unwrap_or_default();
        let resolved_bin = store
            .expand_variable(bin)
            .map_err(|_| bad_var_err(bin))?
            .to_text_or(bin);

        let mut argv = vec![resolved_bin];
        for arg in &self.args {
            let resolved = store
                .recursive_resolve(Value::Str(arg.clone()))
                .map_err(|_| bad_var_err(arg))?;
            match resolved {
                Value::Str(s) => argv.push(s),
                other => argv.push(serde_json::to_string(&other.to_json())?),
            }
        }

        match run_command(&argv) {
            Ok(output) => {
                let status = self
                    .return_code
                    .map_or(true, |expected| expected == output.exit);
                let mut message = format!("{}{}", output.stdout, output.stderr);
                if !status {
                    message = format!(
                        "[exit status {}]\n {}",
                        output.exit,
                        message.trim_end()
                    );
                }
                Ok(if status {
                    MatchOutcome::pass(message.trim_end())
                } else {
                    MatchOutcome::fail(message)
                })
            }
            Err(e) => Ok(MatchOutcome::fail(format!("[{}]", e))),
        }
    }
}
