/// Structured logging for the marker engine
///
/// Provides context-rich logging tagged with the engine component and,
/// where relevant, the site name. Supports console output and an optional
/// append-only log file.

use crate::model::FetchError;
use chrono::Utc;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::str::FromStr;
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Catalog,
    Measurements,
    Renderer,
    Isolation,
    System,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Catalog => write!(f, "CATALOG"),
            Component::Measurements => write!(f, "MEAS"),
            Component::Renderer => write!(f, "RENDER"),
            Component::Isolation => write!(f, "ISOLATE"),
            Component::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - e.g. the server refuses a query with no sites selected
    Expected,
    /// Unexpected failure - indicates backend degradation or an API change
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Global logger instance
static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

pub struct Logger {
    /// Minimum log level to display
    min_level: LogLevel,
    /// Optional file path for logging
    log_file: Option<String>,
    /// Whether to include timestamps in console output
    console_timestamps: bool,
}

impl Logger {
    pub fn init(min_level: LogLevel, log_file: Option<String>, console_timestamps: bool) {
        let logger = Logger {
            min_level,
            log_file,
            console_timestamps,
        };

        // A poisoned lock only means a previous writer panicked mid-log.
        let mut slot = LOGGER.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(logger);
    }

    fn log(&self, level: LogLevel, component: Component, site: Option<&str>, message: &str) {
        if level < self.min_level {
            return;
        }

        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let site_part = site.map(|s| format!(" [{}]", s)).unwrap_or_default();
        let log_entry = format!("{} {} {}{}: {}", timestamp, level, component, site_part, message);

        if self.console_timestamps {
            match level {
                LogLevel::Error | LogLevel::Warning => eprintln!("{}", log_entry),
                LogLevel::Info | LogLevel::Debug => println!("{}", log_entry),
            }
        } else {
            match level {
                LogLevel::Error => eprintln!("   ✗ {}{}: {}", component, site_part, message),
                LogLevel::Warning => eprintln!("   ⚠ {}{}: {}", component, site_part, message),
                LogLevel::Info => println!("   {}", message),
                LogLevel::Debug => println!("   [DEBUG] {}", message),
            }
        }

        if let Some(ref path) = self.log_file {
            if let Err(e) = Self::append_to_file(path, &log_entry) {
                eprintln!("Failed to write to log file {}: {}", path, e);
            }
        }
    }

    fn append_to_file(path: &str, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

fn emit(level: LogLevel, component: Component, site: Option<&str>, message: &str) {
    let guard = LOGGER.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(logger) = guard.as_ref() {
        logger.log(level, component, site, message);
    }
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Initialize the global logger. Until this runs, every log call is a no-op.
pub fn init_logger(min_level: LogLevel, log_file: Option<&str>, console_timestamps: bool) {
    Logger::init(min_level, log_file.map(String::from), console_timestamps);
}

pub fn info(component: Component, site: Option<&str>, message: &str) {
    emit(LogLevel::Info, component, site, message);
}

pub fn warn(component: Component, site: Option<&str>, message: &str) {
    emit(LogLevel::Warning, component, site, message);
}

pub fn error(component: Component, site: Option<&str>, message: &str) {
    emit(LogLevel::Error, component, site, message);
}

pub fn debug(component: Component, site: Option<&str>, message: &str) {
    emit(LogLevel::Debug, component, site, message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a fetch failure.
pub fn classify_fetch_failure(err: &FetchError) -> FailureType {
    match err {
        // The measurements endpoint answers 400 for an empty selection.
        FetchError::Rejected(_) => FailureType::Expected,
        FetchError::Http(code) if (400..500).contains(code) => FailureType::Unknown,
        FetchError::Http(_) => FailureType::Unexpected,
        // Parse errors suggest API changes or bugs
        FetchError::Parse(_) => FailureType::Unexpected,
        FetchError::Transport(_) => FailureType::Unexpected,
    }
}

/// Log a fetch failure with automatic classification
pub fn log_fetch_failure(component: Component, operation: &str, err: &FetchError) {
    let failure_type = classify_fetch_failure(err);
    let message = format!("{} failed [{}]: {}", operation, failure_type, err);

    match failure_type {
        FailureType::Expected => debug(component, None, &message),
        FailureType::Unexpected => error(component, None, &message),
        FailureType::Unknown => warn(component, None, &message),
    }
}

// ---------------------------------------------------------------------------
// Render Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of a marker rebuild
pub fn log_render_summary(groups: usize, rendered: usize, skipped: usize) {
    let total = rendered + skipped;
    let message = format!(
        "Rebuild complete: {}/{} records rendered in {} site groups, {} skipped",
        rendered, total, groups, skipped
    );

    if skipped == 0 {
        info(Component::Renderer, None, &message);
    } else if rendered == 0 {
        error(Component::Renderer, None, &message);
    } else {
        warn(Component::Renderer, None, &message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Error);
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("warn".parse::<LogLevel>(), Ok(LogLevel::Warning));
        assert_eq!(" DEBUG ".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_failure_classification() {
        let rejected = FetchError::Rejected("No sites selected".into());
        assert_eq!(classify_fetch_failure(&rejected), FailureType::Expected);

        assert_eq!(classify_fetch_failure(&FetchError::Http(500)), FailureType::Unexpected);
        assert_eq!(classify_fetch_failure(&FetchError::Http(404)), FailureType::Unknown);
        assert_eq!(
            classify_fetch_failure(&FetchError::Parse("expected array".into())),
            FailureType::Unexpected
        );
    }
}
