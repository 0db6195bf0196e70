use crate::discovery::{DiscoveryOptions, find_applications, find_environments, resolve_against};
use crate::environment::Environment;
use crate::error::{Result, RunconfError};
use crate::naming::{AppIdentity, run_identifier};
use crate::resolver::{PortRange, ValueResolver};
use crate::template::{RunTemplate, output_file_name, write_document};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Default location of the run configuration template
pub const DEFAULT_TEMPLATE_PATH: &str = "tools/run/template.xml";
/// Default directory holding environment files
pub const DEFAULT_ENVS_DIR: &str = "tools/run/envs";
/// Default directory receiving generated run configurations
pub const DEFAULT_OUTPUT_DIR: &str = ".run";

/// Configuration for a generation run
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Project root; relative paths below are resolved against it
    pub base_dir: PathBuf,
    pub template_path: PathBuf,
    pub envs_dir: PathBuf,
    pub output_dir: PathBuf,
    pub discovery: DiscoveryOptions,
    /// Ports searched for `HOOK_PORT`
    pub port_range: PortRange,
    /// Address used for `HOOK_IP` instead of the detected one
    pub ip_override: Option<Ipv4Addr>,
    /// Resolve and render everything but write nothing
    pub dry_run: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            template_path: PathBuf::from(DEFAULT_TEMPLATE_PATH),
            envs_dir: PathBuf::from(DEFAULT_ENVS_DIR),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            discovery: DiscoveryOptions::default(),
            port_range: PortRange::default(),
            ip_override: None,
            dry_run: false,
        }
    }
}

impl GeneratorConfig {
    /// Default layout rooted at `base_dir`
    #[must_use]
    pub fn for_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn template_file(&self) -> PathBuf {
        resolve_against(&self.base_dir, &self.template_path)
    }

    #[must_use]
    pub fn envs_path(&self) -> PathBuf {
        resolve_against(&self.base_dir, &self.envs_dir)
    }

    #[must_use]
    pub fn output_path(&self) -> PathBuf {
        resolve_against(&self.base_dir, &self.output_dir)
    }
}

/// An input that was left out of the run, with the reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub path: PathBuf,
    pub reason: String,
}

/// One (application, environment) pair scheduled for generation
#[derive(Debug, Clone)]
pub struct PlannedRun {
    pub run_id: String,
    pub application: Arc<AppIdentity>,
    pub environment: Arc<Environment>,
    pub output_file: PathBuf,
}

/// Everything a run would produce, before any placeholder is resolved
#[derive(Debug, Default)]
pub struct Plan {
    pub runs: Vec<PlannedRun>,
    pub skipped_applications: Vec<Skipped>,
    pub skipped_environments: Vec<Skipped>,
    /// Pairs dropped because an earlier pair already claimed their run identifier
    pub duplicates: Vec<Skipped>,
}

/// What happened to one planned pair
#[derive(Debug)]
pub enum PairStatus {
    Written(PathBuf),
    /// Rendered successfully during a dry run
    Rendered,
    Failed(RunconfError),
}

#[derive(Debug)]
pub struct PairOutcome {
    pub run_id: String,
    pub status: PairStatus,
}

/// Result of a generation run
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<PairOutcome>,
    pub skipped_applications: Vec<Skipped>,
    pub skipped_environments: Vec<Skipped>,
    pub duplicates: Vec<Skipped>,
    /// Ports handed out for `HOOK_PORT`, ascending
    pub ports: Vec<u16>,
}

impl RunReport {
    /// Paths of every file written
    pub fn written(&self) -> impl Iterator<Item = &Path> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            PairStatus::Written(path) => Some(path.as_path()),
            _ => None,
        })
    }

    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| !matches!(o.status, PairStatus::Failed(_)))
            .count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Discovers applications and environments and pairs them up.
///
/// Unusable applications and environments are recorded as skipped; only
/// configuration errors (such as an invalid glob) abort planning.
///
/// # Errors
///
/// - `RunconfError::Glob` if the application pattern is invalid.
/// - `RunconfError::Ignore` or `RunconfError::WalkDir` if discovery fails.
/// - `RunconfError::Join` if an environment loading task panicked.
pub async fn plan(config: &GeneratorConfig) -> Result<Plan> {
    let mut plan = Plan::default();

    let mut discovery = config.discovery.clone();
    discovery.skip_dirs.push(config.output_path());
    let application_files = find_applications(&config.base_dir, &discovery)?;
    info!("Found {} application(s)", application_files.len());

    let mut applications = Vec::new();
    for path in application_files {
        match AppIdentity::from_path(&path, &config.base_dir) {
            Ok(identity) => {
                debug!(
                    "{} -> {} ({})",
                    path.display(),
                    identity.main_class(),
                    identity.gradle_project_name
                );
                applications.push(Arc::new(identity));
            }
            Err(e) => {
                error!("Skipping application: {e}");
                plan.skipped_applications.push(Skipped {
                    path,
                    reason: e.to_string(),
                });
            }
        }
    }

    let environment_files = find_environments(&config.envs_path());
    info!("Found {} environment(s)", environment_files.len());

    let mut loads = JoinSet::new();
    for (index, path) in environment_files.into_iter().enumerate() {
        loads.spawn(async move {
            let loaded = Environment::load(&path).await;
            (index, path, loaded)
        });
    }
    let mut loaded = Vec::new();
    while let Some(joined) = loads.join_next().await {
        loaded.push(joined?);
    }
    loaded.sort_by_key(|(index, _, _)| *index);

    let mut environments = Vec::new();
    for (_, path, result) in loaded {
        match result {
            Ok(environment) => environments.push(Arc::new(environment)),
            Err(e) => {
                error!("Skipping environment: {e}");
                plan.skipped_environments.push(Skipped {
                    path,
                    reason: e.to_string(),
                });
            }
        }
    }

    let output_dir = config.output_path();
    let mut claimed: HashMap<String, PathBuf> = HashMap::new();
    for application in &applications {
        for environment in &environments {
            let run_id = run_identifier(&application.app_name, &environment.name);
            if let Some(existing) = claimed.get(&run_id) {
                let e = RunconfError::DuplicateRunIdentifier {
                    run_id: run_id.clone(),
                    existing: existing.clone(),
                };
                warn!(
                    "Skipping {} with {}: {e}",
                    application.source_path.display(),
                    environment.path.display()
                );
                plan.duplicates.push(Skipped {
                    path: application.source_path.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
            claimed.insert(run_id.clone(), application.source_path.clone());

            plan.runs.push(PlannedRun {
                output_file: output_dir.join(output_file_name(&run_id)),
                run_id,
                application: Arc::clone(application),
                environment: Arc::clone(environment),
            });
        }
    }

    Ok(plan)
}

/// Generates one run configuration per (application, environment) pair.
///
/// Pairs run concurrently; a failing pair is reported and never stops the others.
///
/// # Errors
///
/// - `RunconfError::TemplateNotFound` or `RunconfError::Xml` if the template is unusable.
/// - Any error from [`plan`].
pub async fn generate(config: &GeneratorConfig) -> Result<RunReport> {
    let template = Arc::new(RunTemplate::load(&config.template_file())?);
    let plan = plan(config).await?;

    let resolver = Arc::new(ValueResolver::new(config.port_range, config.ip_override));
    let output_dir = Arc::new(config.output_path());

    let mut handles = Vec::with_capacity(plan.runs.len());
    for run in plan.runs {
        let run_id = run.run_id.clone();
        let template = Arc::clone(&template);
        let resolver = Arc::clone(&resolver);
        let output_dir = Arc::clone(&output_dir);
        let dry_run = config.dry_run;
        let handle = tokio::spawn(async move {
            generate_pair(&template, &resolver, &run, &output_dir, dry_run).await
        });
        handles.push((run_id, handle));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for (run_id, handle) in handles {
        let status = match handle.await.map_err(RunconfError::from).and_then(|r| r) {
            Ok(Some(path)) => {
                info!("Wrote {}", path.display());
                PairStatus::Written(path)
            }
            Ok(None) => {
                info!("Rendered {run_id} (dry run)");
                PairStatus::Rendered
            }
            Err(e) => {
                error!("Skipping {run_id}: {e}");
                PairStatus::Failed(e)
            }
        };
        outcomes.push(PairOutcome { run_id, status });
    }

    Ok(RunReport {
        outcomes,
        skipped_applications: plan.skipped_applications,
        skipped_environments: plan.skipped_environments,
        duplicates: plan.duplicates,
        ports: resolver.registry().issued().await,
    })
}

async fn generate_pair(
    template: &RunTemplate,
    resolver: &Arc<ValueResolver>,
    run: &PlannedRun,
    output_dir: &Path,
    dry_run: bool,
) -> Result<Option<PathBuf>> {
    let entries = run.environment.resolve(resolver).await?;
    let document = template.instantiate(&run.application, &entries, &run.run_id)?;

    if dry_run {
        document.to_xml_string()?;
        return Ok(None);
    }

    write_document(output_dir, &run.run_id, &document).await.map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<component name="ProjectRunConfigurationManager">
  <configuration default="false" name="Template" type="SpringBootApplicationConfigurationType">
    <option name="SPRING_BOOT_MAIN_CLASS" value="" />
    <module name="" />
  </configuration>
</component>
"#;

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn project() -> (TempDir, GeneratorConfig) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, DEFAULT_TEMPLATE_PATH, TEMPLATE);
        write(root, "tools/run/envs/dev.yml", "PORT: HOOK_PORT\nHOST: HOOK_IP\n");
        write(root, "tools/run/envs/prod.yml", "MODE: live\n");
        write(
            root,
            "proj/serviceA/src/main/java/com/acme/serviceA/ServiceAApplication.java",
            "class ServiceAApplication {}",
        );

        let mut config = GeneratorConfig::for_base_dir(root);
        config.port_range = PortRange::new(24_000, 24_500).unwrap();
        config.ip_override = Some(Ipv4Addr::new(192, 168, 0, 9));
        (temp_dir, config)
    }

    #[tokio::test]
    async fn test_plan_pairs_applications_with_environments() {
        let (_temp_dir, config) = project();
        let plan = plan(&config).await.unwrap();

        let run_ids: Vec<&str> = plan.runs.iter().map(|r| r.run_id.as_str()).collect();
        assert_eq!(run_ids, vec!["ServiceADev", "ServiceAProd"]);
        assert_eq!(
            plan.runs[0].output_file,
            config.output_path().join("ServiceADev.run.xml")
        );
        assert!(plan.skipped_applications.is_empty());
    }

    #[tokio::test]
    async fn test_plan_skips_bad_inputs() {
        let (temp_dir, config) = project();
        let root = temp_dir.path();
        write(root, "scripts/ToolApplication.java", "");
        write(root, "tools/run/envs/broken.yml", "A: [\n");

        let plan = plan(&config).await.unwrap();
        assert_eq!(plan.skipped_applications.len(), 1);
        assert_eq!(plan.skipped_environments.len(), 1);
        assert_eq!(plan.runs.len(), 2);
    }

    #[tokio::test]
    async fn test_plan_drops_duplicate_run_identifiers() {
        let (temp_dir, config) = project();
        write(
            temp_dir.path(),
            "other/serviceA/src/main/java/org/x/ServiceAApplication.java",
            "",
        );

        let plan = plan(&config).await.unwrap();
        assert_eq!(plan.runs.len(), 2);
        assert_eq!(plan.duplicates.len(), 2);
    }

    #[tokio::test]
    async fn test_generate_writes_one_file_per_pair() {
        let (_temp_dir, config) = project();
        let report = generate(&config).await.unwrap();

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 0);
        assert_eq!(report.written().count(), 2);
        assert_eq!(report.ports.len(), 1);

        let dev = fs::read_to_string(config.output_path().join("ServiceADev.run.xml")).unwrap();
        assert!(dev.contains(r#"name="ServiceADev""#));
        assert!(dev.contains(r#"<env name="HOST" value="192.168.0.9"/>"#));
        assert!(dev.contains(&format!(r#"<env name="PORT" value="{}"/>"#, report.ports[0])));
        assert!(!dev.contains("HOOK_"));
    }

    #[tokio::test]
    async fn test_generate_dry_run_writes_nothing() {
        let (_temp_dir, mut config) = project();
        config.dry_run = true;

        let report = generate(&config).await.unwrap();
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.written().count(), 0);
        assert!(!config.output_path().exists());
    }

    #[tokio::test]
    async fn test_generate_missing_template_is_fatal() {
        let (_temp_dir, mut config) = project();
        config.template_path = PathBuf::from("nowhere.xml");

        let result = generate(&config).await;
        assert!(matches!(result, Err(RunconfError::TemplateNotFound { .. })));
        assert!(!config.output_path().exists());
    }
}
