use crate::error::{Result, RunconfError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Prefix every Gradle project path carries in the IDE's module naming
pub const GRADLE_ROOT_PREFIX: &str = "parent";
/// Source set suffix of the module that owns `src/main`
pub const GRADLE_SOURCE_SET_SUFFIX: &str = "main";

static PACKAGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|/)src/(?:main|test)/java/(.+)/[^/]+$").expect("package pattern is valid")
});

/// Identifiers derived from one application entry-point file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    /// Path of the entry-point file as discovered
    pub source_path: PathBuf,
    /// Dotted Java package, e.g. `com.acme.service_a`
    pub package_name: String,
    /// IDE module name, e.g. `parent.proj.serviceA.main`
    pub gradle_project_name: String,
    /// Last segment of the Gradle project path, e.g. `serviceA`
    pub app_name: String,
    /// Entry-point file name without extension
    pub class_name: String,
}

impl AppIdentity {
    /// Derives all identifiers for `path`, interpreted relative to `base_dir`.
    ///
    /// # Errors
    ///
    /// - `RunconfError::PackageUnresolved` if the path has no `src/(main|test)/java/<package>/` segment.
    /// - `RunconfError::AppNameUnresolved` if the module path is empty.
    pub fn from_path(path: &Path, base_dir: &Path) -> Result<Self> {
        let normalized = normalize_path(path, base_dir);

        let package_name =
            extract_package_name(&normalized).ok_or_else(|| RunconfError::PackageUnresolved {
                path: path.to_path_buf(),
            })?;
        let gradle_project_name = extract_gradle_project_name(&normalized);
        let app_name = extract_app_name(&gradle_project_name).ok_or_else(|| {
            RunconfError::AppNameUnresolved {
                path: path.to_path_buf(),
                gradle_project_name: gradle_project_name.clone(),
            }
        })?;

        let class_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            source_path: path.to_path_buf(),
            package_name,
            gradle_project_name,
            app_name,
            class_name,
        })
    }

    /// Fully qualified startup class, `<package>.<ClassName>`
    #[must_use]
    pub fn main_class(&self) -> String {
        format!("{}.{}", self.package_name, self.class_name)
    }
}

/// Converts `path` to a `/`-separated string relative to `base_dir`.
///
/// Paths outside `base_dir` are kept whole, minus any leading separator.
#[must_use]
pub fn normalize_path(path: &Path, base_dir: &Path) -> String {
    let path_str = path.to_string_lossy().replace('\\', "/");
    let base_str = base_dir.to_string_lossy().replace('\\', "/");
    let base_str = base_str.trim_end_matches('/');

    let relative = if base_str.is_empty() || base_str == "." {
        path_str.as_str()
    } else {
        path_str
            .strip_prefix(base_str)
            .filter(|rest| rest.is_empty() || rest.starts_with('/'))
            .unwrap_or(&path_str)
    };

    relative.trim_start_matches("./").trim_start_matches('/').to_string()
}

/// Dotted package of a Java source file, or `None` outside the Maven/Gradle layout.
///
/// Classes in the default package (directly under `java/`) yield `None`.
#[must_use]
pub fn extract_package_name(normalized: &str) -> Option<String> {
    PACKAGE_PATTERN
        .captures(normalized)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().replace('/', "."))
}

/// IDE module name for the Gradle project owning `normalized`.
#[must_use]
pub fn extract_gradle_project_name(normalized: &str) -> String {
    let project_path = if normalized.starts_with("src/") {
        ""
    } else {
        normalized
            .find("/src/")
            .map_or(normalized, |idx| &normalized[..idx])
    };

    format!(
        "{GRADLE_ROOT_PREFIX}.{}.{GRADLE_SOURCE_SET_SUFFIX}",
        project_path.replace('/', ".")
    )
}

/// Last path segment of a Gradle project name, prefix and suffix removed.
#[must_use]
pub fn extract_app_name(gradle_project_name: &str) -> Option<String> {
    let inner = gradle_project_name
        .strip_prefix(GRADLE_ROOT_PREFIX)
        .and_then(|s| s.strip_prefix('.'))
        .unwrap_or(gradle_project_name);
    let inner = inner
        .strip_suffix(GRADLE_SOURCE_SET_SUFFIX)
        .and_then(|s| s.strip_suffix('.'))
        .unwrap_or(inner);

    inner
        .rsplit('.')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Environment display name: file stem with its first letter upper-cased.
#[must_use]
pub fn environment_name(env_path: &Path) -> String {
    let stem = env_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    upper_first(stem)
}

/// Name shared by a generated configuration and its output file.
///
/// Words of `{app_name}{env_name}` are start-cased and joined, so
/// `serviceA` + `Dev` becomes `ServiceADev`.
#[must_use]
pub fn run_identifier(app_name: &str, env_name: &str) -> String {
    split_words(&format!("{app_name}{env_name}"))
        .iter()
        .map(|word| upper_first(word))
        .collect()
}

fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

// Splits on separators, lower-to-upper case boundaries and letter/digit
// boundaries, so digit runs form words of their own.
fn split_words(s: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev: Option<char> = None;

    for c in s.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev = None;
            continue;
        }
        let boundary = prev.is_some_and(|p| {
            (p.is_lowercase() && c.is_uppercase()) || (p.is_numeric() != c.is_numeric())
        });
        if boundary && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev = Some(c);
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_from_scenario_path() {
        let base = Path::new("/work");
        let path = Path::new(
            "/work/proj/serviceA/src/main/java/com/acme/serviceA/ServiceAApplication.java",
        );
        let identity = AppIdentity::from_path(path, base).unwrap();

        assert_eq!(identity.package_name, "com.acme.serviceA");
        assert_eq!(identity.gradle_project_name, "parent.proj.serviceA.main");
        assert_eq!(identity.app_name, "serviceA");
        assert_eq!(identity.class_name, "ServiceAApplication");
        assert_eq!(identity.main_class(), "com.acme.serviceA.ServiceAApplication");
    }

    #[test]
    fn test_identity_from_test_source_set() {
        let identity = AppIdentity::from_path(
            Path::new("tools/mock/src/test/java/org/mock/MockApplication.java"),
            Path::new("."),
        )
        .unwrap();
        assert_eq!(identity.package_name, "org.mock");
        assert_eq!(identity.gradle_project_name, "parent.tools.mock.main");
        assert_eq!(identity.app_name, "mock");
    }

    #[test]
    fn test_identity_without_java_layout() {
        let result = AppIdentity::from_path(
            Path::new("/work/scripts/DemoApplication.java"),
            Path::new("/work"),
        );
        assert!(matches!(result, Err(RunconfError::PackageUnresolved { .. })));
    }

    #[test]
    fn test_identity_at_project_root() {
        let result = AppIdentity::from_path(
            Path::new("/work/src/main/java/com/acme/RootApplication.java"),
            Path::new("/work"),
        );
        assert!(matches!(
            result,
            Err(RunconfError::AppNameUnresolved { ref gradle_project_name, .. })
                if gradle_project_name == "parent..main"
        ));
    }

    #[test]
    fn test_normalize_windows_separators() {
        let normalized = normalize_path(
            Path::new(r"C:\work\svc\src\main\java\a\b\App.java"),
            Path::new(r"C:\work"),
        );
        assert_eq!(normalized, "svc/src/main/java/a/b/App.java");
    }

    #[test]
    fn test_normalize_keeps_paths_outside_base() {
        assert_eq!(
            normalize_path(Path::new("/other/svc/App.java"), Path::new("/work")),
            "other/svc/App.java"
        );
        // A sibling directory sharing the prefix is not "inside" the base
        assert_eq!(
            normalize_path(Path::new("/work2/svc/App.java"), Path::new("/work")),
            "work2/svc/App.java"
        );
    }

    #[test]
    fn test_extract_package_name() {
        assert_eq!(
            extract_package_name("a/src/main/java/com/x/y/App.java").as_deref(),
            Some("com.x.y")
        );
        assert_eq!(
            extract_package_name("src/main/java/com/App.java").as_deref(),
            Some("com")
        );
        assert_eq!(extract_package_name("a/src/main/java/App.java"), None);
        assert_eq!(extract_package_name("a/src/main/kotlin/com/App.kt"), None);
    }

    #[test]
    fn test_extract_gradle_project_name_uses_first_src() {
        assert_eq!(
            extract_gradle_project_name("a/b/src/main/java/src/App.java"),
            "parent.a.b.main"
        );
    }

    #[test]
    fn test_extract_app_name() {
        assert_eq!(
            extract_app_name("parent.proj.serviceA.main").as_deref(),
            Some("serviceA")
        );
        // Only the exact prefix and suffix are removed
        assert_eq!(
            extract_app_name("parent.proj.mainframe.main").as_deref(),
            Some("mainframe")
        );
        assert_eq!(extract_app_name("parent..main"), None);
    }

    #[test]
    fn test_environment_name() {
        assert_eq!(environment_name(Path::new("tools/run/envs/dev.yml")), "Dev");
        assert_eq!(environment_name(Path::new("prod.yaml")), "Prod");
    }

    #[test]
    fn test_run_identifier() {
        assert_eq!(run_identifier("serviceA", "Dev"), "ServiceADev");
        assert_eq!(run_identifier("user-api", "Prod"), "UserApiProd");
        assert_eq!(run_identifier("gateway", "Dev-local"), "GatewayDevLocal");
        assert_eq!(run_identifier("order_service", "Test"), "OrderServiceTest");
        assert_eq!(run_identifier("v2api", "Dev"), "V2ApiDev");
        assert_eq!(run_identifier("billing", "Qa2"), "BillingQa2");
    }
}
