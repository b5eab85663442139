#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use orchestrate::config::model::DEFAULT_READY_TIMEOUT;
use orchestrate::config::{ConfigFile, RunSettings, TaskSpec};
use orchestrate::errors::Result;
use orchestrate::types::TaskKind;

/// Builder for resolved `TaskSpec`s, skipping the TOML layer.
pub struct TaskSpecBuilder {
    spec: TaskSpec,
}

impl TaskSpecBuilder {
    pub fn new(name: &str, kind: TaskKind, cmd: &str) -> Self {
        Self {
            spec: TaskSpec {
                name: name.to_string(),
                kind,
                command: cmd.to_string(),
                workdir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
                depends_on: vec![],
                ready_cmd: None,
                ready_timeout: DEFAULT_READY_TIMEOUT,
                max_lines: 2000,
            },
        }
    }

    pub fn oneshot(name: &str, cmd: &str) -> Self {
        Self::new(name, TaskKind::Oneshot, cmd)
    }

    pub fn service(name: &str, cmd: &str) -> Self {
        Self::new(name, TaskKind::Service, cmd)
    }

    pub fn daemon(name: &str, cmd: &str) -> Self {
        Self::new(name, TaskKind::Daemon, cmd)
    }

    pub fn depends_on(mut self, dep: &str) -> Self {
        self.spec.depends_on.push(dep.to_string());
        self
    }

    pub fn ready_cmd(mut self, cmd: &str) -> Self {
        self.spec.ready_cmd = Some(cmd.to_string());
        self
    }

    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.spec.ready_timeout = timeout;
        self
    }

    pub fn workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spec.workdir = dir.into();
        self
    }

    pub fn max_lines(mut self, n: usize) -> Self {
        self.spec.max_lines = n;
        self
    }

    pub fn build(self) -> TaskSpec {
        self.spec
    }
}

/// Builder for a validated `ConfigFile`.
pub struct ConfigBuilder {
    settings: RunSettings,
    specs: Vec<TaskSpec>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            settings: RunSettings::default(),
            specs: vec![],
        }
    }

    pub fn task(mut self, spec: TaskSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn probe_interval(mut self, interval: Duration) -> Self {
        self.settings.probe_interval = interval;
        self
    }

    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.settings.grace_period = grace;
        self
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::from_specs(self.settings, self.specs)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build().expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
