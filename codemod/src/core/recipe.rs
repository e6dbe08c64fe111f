//! Command-planning strategies for each kind of migration stage.
//!
//! A recipe supplies three independent pure functions of its bindings: the
//! primary command template, the tool package to install, and whether the
//! legacy version-manager shim applies.

use crate::core::plan::{Bindings, CommandTemplate, ToolVersion};

const ANGULAR_CLI_PACKAGE: &str = "@angular/cli@${version}";
const ANGULAR_CORE_PACKAGE: &str = "@angular/core@${version}";

/// Default major version from which tools run without the legacy shim.
pub const DEFAULT_LEGACY_THRESHOLD: u32 = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipe {
    /// `ng update` with a prefix-installed Angular CLI.
    NgUpdate { version: ToolVersion },
    /// `npx @angular/cli update`, fetching the CLI on demand.
    AngularCli { version: ToolVersion },
    /// Arbitrary command template and tool package.
    Custom {
        version: ToolVersion,
        command: CommandTemplate,
        package: String,
    },
}

impl Recipe {
    /// Short identifier used in config files and stage directory names.
    pub fn slug(&self) -> &'static str {
        match self {
            Recipe::NgUpdate { .. } => "ng-update",
            Recipe::AngularCli { .. } => "angular-cli",
            Recipe::Custom { .. } => "custom",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Recipe::NgUpdate { .. } => "Upgrade Angular versions",
            Recipe::AngularCli { .. } => "Apply Angular CLI",
            Recipe::Custom { .. } => "Run custom codemod",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Recipe::NgUpdate { .. } => {
                "Run `ng update` to upgrade Angular CLI and Angular Core to the specified version."
            }
            Recipe::AngularCli { .. } => {
                "Run `npx @angular/cli update` for Angular CLI and Angular Core."
            }
            Recipe::Custom { .. } => "Run a user-supplied command against the project.",
        }
    }

    pub fn version(&self) -> &ToolVersion {
        match self {
            Recipe::NgUpdate { version }
            | Recipe::AngularCli { version }
            | Recipe::Custom { version, .. } => version,
        }
    }

    /// Primary command with the version marker already resolved.
    ///
    /// The remaining markers are resolved per stage by the orchestrator.
    pub fn primary_command(&self) -> CommandTemplate {
        let tokens: Vec<String> = match self {
            Recipe::NgUpdate { .. } => vec![
                "ng".into(),
                "update".into(),
                ANGULAR_CLI_PACKAGE.into(),
                ANGULAR_CORE_PACKAGE.into(),
            ],
            Recipe::AngularCli { .. } => vec![
                "npx".into(),
                ANGULAR_CLI_PACKAGE.into(),
                "update".into(),
                ANGULAR_CLI_PACKAGE.into(),
                ANGULAR_CORE_PACKAGE.into(),
            ],
            Recipe::Custom { command, .. } => command.tokens().to_vec(),
        };
        let bindings = Bindings::version_only(self.version());
        CommandTemplate::new(CommandTemplate::new(tokens).plan(&bindings))
    }

    /// Package reference installed into the isolated module cache.
    pub fn tool_package(&self) -> String {
        let bindings = Bindings::version_only(self.version());
        match self {
            Recipe::NgUpdate { .. } | Recipe::AngularCli { .. } => {
                bindings.substitute(ANGULAR_CLI_PACKAGE)
            }
            Recipe::Custom { package, .. } => bindings.substitute(package),
        }
    }

    pub fn use_legacy_shim(&self, threshold: u32) -> bool {
        self.version().below(threshold)
    }
}
