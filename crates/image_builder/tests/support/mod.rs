#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use image_builder::{CommandOutput, CommandRunner, ImageBuildError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

/// Replays scripted outputs in order; unscripted calls succeed with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    pub calls: Mutex<Vec<RecordedCommand>>,
    pub outputs: Mutex<VecDeque<CommandOutput>>,
}

impl ScriptedRunner {
    pub fn new(outputs: impl IntoIterator<Item = CommandOutput>) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            outputs: Mutex::new(outputs.into_iter().collect()),
        })
    }

    pub fn calls(&self) -> Vec<RecordedCommand> {
        lock_unpoisoned(&self.calls).clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&str>,
    ) -> Result<CommandOutput, ImageBuildError> {
        lock_unpoisoned(&self.calls).push(RecordedCommand {
            program: program.to_owned(),
            args: args.to_vec(),
            stdin: stdin.map(str::to_owned),
        });
        Ok(lock_unpoisoned(&self.outputs)
            .pop_front()
            .unwrap_or_else(|| ok("")))
    }
}

pub fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        code: Some(0),
        stdout: stdout.to_owned(),
        stderr: String::new(),
    }
}

pub fn failed(stderr: &str) -> CommandOutput {
    CommandOutput {
        code: Some(1),
        stdout: String::new(),
        stderr: stderr.to_owned(),
    }
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
