use colored::Colorize;

/// Every failure mode the core can produce, named after the error kinds in
/// the original tool's `exc.py` rather than any particular driver's
/// exception hierarchy.
#[derive(Debug)]
pub enum ErrorType {
    /// Config file or an `{include: ...}` target could not be read.
    ConfigFileLoader { path: String, reason: String },
    /// An `{include: ...}` target could not be located in the include paths.
    Include { filename: String, searched: Vec<String> },
    /// A loaded YAML document's root was not a sequence.
    DataError { path: String },
    /// Structural or semantic violation in the extraction model config.
    InvalidConfig { message: String },
    UnknownTable { table: String },
    UnknownColumn { table: String, column: String },
    /// Disabling a NOT NULL outgoing FK, not-null-columns on a non-FK
    /// column, or a NOT NULL self-referencing FK in the schema.
    RelationIntegrity { message: String },
    /// The NOT NULL FK graph has an unbreakable cycle.
    CyclicDependency { tables: Vec<String> },
    DatabaseUrl { message: String },
    Driver { message: String },
}

#[derive(Debug)]
pub struct Error {
    pub error_type: ErrorType,
}

impl Error {
    pub fn new(error_type: ErrorType) -> Self {
        Error { error_type }
    }

    pub fn title(&self) -> &'static str {
        match &self.error_type {
            ErrorType::ConfigFileLoader { .. } => "Config File Error",
            ErrorType::Include { .. } => "Include Error",
            ErrorType::DataError { .. } => "Invalid Config Shape",
            ErrorType::InvalidConfig { .. } => "Invalid Config",
            ErrorType::UnknownTable { .. } => "Unknown Table",
            ErrorType::UnknownColumn { .. } => "Unknown Column",
            ErrorType::RelationIntegrity { .. } => "Relation Integrity Error",
            ErrorType::CyclicDependency { .. } => "Cyclic Dependency",
            ErrorType::DatabaseUrl { .. } => "Database URL Error",
            ErrorType::Driver { .. } => "Driver Error",
        }
    }

    pub fn body(&self) -> String {
        match &self.error_type {
            ErrorType::ConfigFileLoader { path, reason } => format!(
                "I couldn't read the config file at {}:\n\n    {}",
                path, reason
            ),
            ErrorType::Include { filename, searched } => format!(
                "I couldn't find \"{}\" in any of these include paths:\n\n{}",
                filename,
                searched.iter().map(|p| format!("    {}\n", p)).collect::<String>()
            ),
            ErrorType::DataError { path } => {
                format!("The root of \"{}\" must be a sequence.", path)
            }
            ErrorType::InvalidConfig { message } => message.clone(),
            ErrorType::UnknownTable { table } => {
                format!("I don't recognize the \"{}\" table, is that a typo?", table)
            }
            ErrorType::UnknownColumn { table, column } => format!(
                "\"{}\" doesn't have a \"{}\" column, is that a typo?",
                table, column
            ),
            ErrorType::RelationIntegrity { message } => message.clone(),
            ErrorType::CyclicDependency { tables } => format!(
                "A cyclic NOT NULL dependency exists amongst: {}",
                tables.join(", ")
            ),
            ErrorType::DatabaseUrl { message } => message.clone(),
            ErrorType::Driver { message } => message.clone(),
        }
    }

    pub fn format(&self, in_color: bool) -> String {
        let title = self.title();
        let body = self.body();
        if in_color {
            let separator = "-".repeat(50usize.saturating_sub(title.len()));
            format!("{} {}\n\n{}\n", title.cyan(), separator.cyan(), body)
        } else {
            format_custom_error(title, &body)
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.format(false))
    }
}

impl std::error::Error for Error {}

pub fn format_custom_error(title: &str, body: &str) -> String {
    format!("{}\n{}\n\n{}", title, "-".repeat(title.len()), body)
}

#[cfg(feature = "database")]
pub fn format_libsql_error(e: &libsql::Error) -> String {
    match e {
        libsql::Error::SqliteFailure(code, msg) => {
            format!("sqlite error {}: {}", code, msg)
        }
        libsql::Error::ConnectionFailed(msg) => format!("connection failed: {}", msg),
        other => format!("{:?}", other),
    }
}

#[cfg(feature = "database")]
impl From<libsql::Error> for Error {
    fn from(e: libsql::Error) -> Self {
        Error::new(ErrorType::Driver {
            message: format_libsql_error(&e),
        })
    }
}
