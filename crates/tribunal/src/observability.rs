//! # Observability
//!
//! Tracing setup for hosts embedding a tribunal session.
//!
//! Events are emitted under one target per component (`tribunal::selector`,
//! `tribunal::orchestrator`, ...). A host that wants to watch speaker
//! selection closely while keeping the rest quiet raises just that component:
//!
//! ```rust,no_run
//! use tracing::Level;
//! use tribunal::observability::{self, Component, ObservabilityConfig};
//!
//! observability::init(
//!     ObservabilityConfig::default().with_component(Component::Selector, Level::DEBUG),
//! )
//! .expect("subscriber installed once");
//! ```

use strum_macros::{Display, EnumIter};
use tracing::Level;
use tracing_subscriber::{EnvFilter, filter::Directive, fmt, prelude::*};

const ROOT_TARGET: &str = "tribunal";

/// A component of the crate with its own tracing target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Component {
    Catalog,
    Orchestrator,
    Persona,
    Prompts,
    Selector,
    Session,
    Turn,
}

impl Component {
    /// The `tracing` target events of this component are emitted under.
    pub fn target(self) -> String {
        format!("{ROOT_TARGET}::{self}")
    }
}

#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Level for every `tribunal` target without an override.
    pub level: Level,
    /// Per-component overrides, applied after `level`.
    pub components: Vec<(Component, Level)>,
    pub target: LogTarget,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            components: Vec::new(),
            target: LogTarget::default(),
        }
    }
}

impl ObservabilityConfig {
    /// Overrides the level of one component. A later override of the same
    /// component replaces the earlier one.
    pub fn with_component(mut self, component: Component, level: Level) -> Self {
        self.components.retain(|(c, _)| *c != component);
        self.components.push((component, level));
        self
    }

    /// `EnvFilter` directives for this configuration, root first.
    pub fn filter_directives(&self) -> Vec<String> {
        let level_name = |level: &Level| level.as_str().to_ascii_lowercase();
        std::iter::once(format!("{ROOT_TARGET}={}", level_name(&self.level)))
            .chain(self.components.iter().map(|(component, level)| {
                format!("{}={}", component.target(), level_name(level))
            }))
            .collect()
    }
}

/// Where formatted events are written.
#[derive(Debug, Clone, Default)]
pub enum LogTarget {
    #[default]
    Console,
    /// Plain text, no ANSI colors. The file is truncated on init.
    File(String),
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` directives are honored for targets outside the crate.
///
/// # Errors
///
/// Returns an error if a directive fails to parse, the log file cannot be
/// created, or a global subscriber has already been installed.
pub fn init(config: ObservabilityConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut filter = EnvFilter::from_default_env();
    for directive in config.filter_directives() {
        filter = filter.add_directive(directive.parse::<Directive>()?);
    }

    let subscriber = tracing_subscriber::registry().with(filter);
    match &config.target {
        LogTarget::Console => {
            subscriber
                .with(fmt::layer().with_writer(std::io::stdout))
                .try_init()?;
        }
        LogTarget::File(path) => {
            let file = std::fs::File::create(path)?;
            subscriber
                .with(
                    fmt::layer()
                        .with_ansi(false)
                        .with_writer(std::sync::Mutex::new(file)),
                )
                .try_init()?;
        }
    }

    tracing::debug!(
        target: "tribunal::observability",
        directives = ?config.filter_directives(),
        "tracing initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_default_config_logs_info_to_console() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(matches!(config.target, LogTarget::Console));
        assert_eq!(config.filter_directives(), vec!["tribunal=info"]);
    }

    #[test]
    fn test_component_overrides_follow_the_root_directive() {
        let config = ObservabilityConfig::default()
            .with_component(Component::Selector, Level::TRACE)
            .with_component(Component::Session, Level::WARN)
            .with_component(Component::Selector, Level::DEBUG);

        assert_eq!(
            config.filter_directives(),
            vec!["tribunal=info", "tribunal::session=warn", "tribunal::selector=debug"]
        );
        for directive in config.filter_directives() {
            assert!(directive.parse::<Directive>().is_ok(), "{directive}");
        }
    }

    #[test]
    fn test_component_targets_are_module_paths() {
        let targets: Vec<String> = Component::iter().map(Component::target).collect();
        assert!(targets.contains(&"tribunal::orchestrator".to_string()));
        assert!(targets.iter().all(|t| t.starts_with("tribunal::")));
    }

    #[test]
    fn test_unwritable_log_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("tribunal.log");

        let result = init(ObservabilityConfig {
            level: Level::DEBUG,
            target: LogTarget::File(path.to_string_lossy().into_owned()),
            ..ObservabilityConfig::default()
        });

        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_file_target_creates_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tribunal.log");

        init(
            ObservabilityConfig {
                target: LogTarget::File(path.to_string_lossy().into_owned()),
                ..ObservabilityConfig::default()
            }
            .with_component(Component::Orchestrator, Level::DEBUG),
        )
        .unwrap();
        tracing::info!(target: "tribunal::orchestrator", "subscriber installed");

        assert!(path.exists());
        assert!(init(ObservabilityConfig::default()).is_err(), "global subscriber is set once");
    }
}
