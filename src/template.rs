use crate::discovery::read_template_file;
use crate::document::{Document, Element};
use crate::environment::EnvEntry;
use crate::error::{Result, RunconfError};
use crate::naming::AppIdentity;
use std::path::{Path, PathBuf};

/// Option holding the Spring Boot startup class
pub const MAIN_CLASS_OPTION: &str = "SPRING_BOOT_MAIN_CLASS";
/// Element wrapping the injected environment variables
pub const ENVS_ELEMENT: &str = "envs";
/// Element for a single environment variable
pub const ENV_ELEMENT: &str = "env";
/// Suffix of generated run configuration files
pub const RUN_FILE_SUFFIX: &str = ".run.xml";

/// The parsed run configuration template
#[derive(Debug, Clone)]
pub struct RunTemplate {
    document: Document,
}

impl RunTemplate {
    #[must_use]
    pub fn new(document: Document) -> Self {
        Self { document }
    }

    /// Loads and parses the template file
    ///
    /// # Errors
    ///
    /// - `RunconfError::TemplateNotFound` if the file doesn't exist.
    /// - `RunconfError::Xml` if the template is not well-formed.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = read_template_file(path)?;
        Self::parse(&contents)
    }

    /// # Errors
    ///
    /// Returns `RunconfError::Xml` if the template is not well-formed.
    pub fn parse(xml: &str) -> Result<Self> {
        Document::parse(xml).map(Self::new)
    }

    #[must_use]
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Builds the run configuration for one application in one environment.
    ///
    /// The template itself is never modified.
    ///
    /// # Errors
    ///
    /// Returns `RunconfError::MissingNode` if the template lacks the
    /// configuration element, the startup-class option or the module element.
    pub fn instantiate(
        &self,
        identity: &AppIdentity,
        entries: &[EnvEntry],
        run_id: &str,
    ) -> Result<Document> {
        let mut document = self.document.clone();

        let configuration = document
            .root
            .first_element_mut()
            .ok_or_else(|| missing("configuration"))?;
        configuration.set_attribute("name", run_id);

        configuration.prepend_child(envs_element(entries));

        configuration
            .find_child_mut(|e| e.name == "option" && e.attribute("name") == Some(MAIN_CLASS_OPTION))
            .ok_or_else(|| missing(&format!("option[name={MAIN_CLASS_OPTION}]")))?
            .set_attribute("value", identity.main_class());

        configuration
            .find_child_mut(|e| e.name == "module")
            .ok_or_else(|| missing("module"))?
            .set_attribute("name", identity.gradle_project_name.as_str());

        Ok(document)
    }
}

fn missing(node: &str) -> RunconfError {
    RunconfError::MissingNode {
        node: node.to_string(),
    }
}

/// `<envs>` element with one `<env name=".." value=".."/>` per entry
#[must_use]
pub fn envs_element(entries: &[EnvEntry]) -> Element {
    let mut envs = Element::new(ENVS_ELEMENT);
    for entry in entries {
        envs.push_child(
            Element::new(ENV_ELEMENT)
                .with_attribute("name", entry.key.as_str())
                .with_attribute("value", entry.value.to_string()),
        );
    }
    envs
}

/// File name of the run configuration for `run_id`
#[must_use]
pub fn output_file_name(run_id: &str) -> String {
    format!("{run_id}{RUN_FILE_SUFFIX}")
}

/// Serializes `document` into `output_dir/<run_id>.run.xml`.
///
/// The directory is created when absent. The document is written to a
/// temporary sibling first and renamed into place.
///
/// # Errors
///
/// Returns `RunconfError::Io` on filesystem failures or `RunconfError::Xml`
/// if serialization fails.
pub async fn write_document(output_dir: &Path, run_id: &str, document: &Document) -> Result<PathBuf> {
    let xml = document.to_xml_string()?;

    tokio::fs::create_dir_all(output_dir).await?;
    let target = output_dir.join(output_file_name(run_id));
    let staging = output_dir.join(format!(".{}.tmp", output_file_name(run_id)));

    tokio::fs::write(&staging, xml).await?;
    if let Err(e) = tokio::fs::rename(&staging, &target).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(e.into());
    }

    Ok(target)
}
