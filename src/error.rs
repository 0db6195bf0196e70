use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for runconf operations
#[derive(Error, Debug)]
pub enum RunconfError {
    /// IO error when reading inputs or writing run configurations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The run configuration template does not exist
    #[error("Template not found: {path}")]
    TemplateNotFound { path: PathBuf },

    /// An environment file does not exist
    #[error("Environment file not found: {path}")]
    EnvironmentNotFound { path: PathBuf },

    /// An environment file is not valid YAML
    #[error("Malformed environment file {path}: {source}")]
    MalformedEnvironment {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// An environment file parsed, but its top level is not a key/value mapping
    #[error("Environment file {path} must contain a flat key/value mapping")]
    EnvironmentNotMapping { path: PathBuf },

    /// The template (or a generated document) is not well-formed XML
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// XML text without a root element
    #[error("XML document has no root element")]
    EmptyDocument,

    /// A second top-level element follows the root
    #[error("XML document has more than one root element: <{extra}> follows <{root}>")]
    MultipleRoots { root: String, extra: String },

    /// Malformed attribute inside an XML element
    #[error("XML attribute error: {0}")]
    XmlAttribute(#[from] quick_xml::events::attributes::AttrError),

    /// The application path lacks a `src/(main|test)/java/<package>/` segment
    #[error("Cannot derive a package name from {path}")]
    PackageUnresolved { path: PathBuf },

    /// The Gradle project name has no segment between its prefix and suffix
    #[error("Cannot derive an application name from {gradle_project_name} ({path})")]
    AppNameUnresolved {
        path: PathBuf,
        gradle_project_name: String,
    },

    /// A node the run configuration needs is absent from the template
    #[error("Template is missing required node: {node}")]
    MissingNode { node: String },

    /// Two (application, environment) pairs map to the same output file
    #[error("Run identifier {run_id} is already produced by {existing}")]
    DuplicateRunIdentifier { run_id: String, existing: PathBuf },

    /// Port range text could not be parsed or is empty
    #[error("Invalid port range '{range}': expected START-END with START <= END")]
    InvalidPortRange { range: String },

    /// Invalid glob pattern
    #[error("Glob error: {0}")]
    Glob(#[from] globset::Error),

    /// `WalkDir` error when listing environment files
    #[error("Directory traversal error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Error from the gitignore-aware application walker
    #[error("Directory traversal error: {0}")]
    Ignore(#[from] ignore::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A background generation task panicked or was cancelled
    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, RunconfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RunconfError::TemplateNotFound {
            path: PathBuf::from("tools/run/template.xml"),
        };
        assert_eq!(format!("{err}"), "Template not found: tools/run/template.xml");

        let err = RunconfError::PackageUnresolved {
            path: PathBuf::from("svc/Main.java"),
        };
        assert_eq!(format!("{err}"), "Cannot derive a package name from svc/Main.java");

        let err = RunconfError::MissingNode {
            node: "module".to_string(),
        };
        assert_eq!(format!("{err}"), "Template is missing required node: module");

        let err = RunconfError::InvalidPortRange {
            range: "30000-10000".to_string(),
        };
        assert!(format!("{err}").contains("30000-10000"));

        let err = RunconfError::AppNameUnresolved {
            path: PathBuf::from("src/main/java/a/App.java"),
            gradle_project_name: "parent..main".to_string(),
        };
        assert!(format!("{err}").contains("parent..main"));
    }

    #[test]
    fn test_error_from_xml() {
        let mut reader = quick_xml::Reader::from_str("<a></b>");
        let xml_err = loop {
            match reader.read_event() {
                Ok(quick_xml::events::Event::Eof) => panic!("mismatched tags should fail"),
                Ok(_) => {}
                Err(e) => break e,
            }
        };
        let err: RunconfError = xml_err.into();
        assert!(matches!(err, RunconfError::Xml(_)));
        assert!(err.to_string().starts_with("XML error:"));
    }

    #[test]
    fn test_error_from_glob() {
        let glob_err = globset::Glob::new("**/[").unwrap_err();
        let err: RunconfError = glob_err.into();
        assert!(matches!(err, RunconfError::Glob(_)));
    }

    #[tokio::test]
    async fn test_error_from_cancelled_task() {
        let handle = tokio::spawn(std::future::pending::<()>());
        handle.abort();
        let join_err = handle.await.unwrap_err();

        let err: RunconfError = join_err.into();
        assert!(matches!(err, RunconfError::Join(ref e) if e.is_cancelled()));
        assert!(err.to_string().starts_with("Task failed:"));
    }

    #[test]
    fn test_multiple_roots_display() {
        let err = RunconfError::MultipleRoots {
            root: "a".to_string(),
            extra: "b".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "XML document has more than one root element: <b> follows <a>"
        );
    }
}
