//! # runconf
//!
//! Generates IntelliJ run configurations (`.run/*.run.xml`) for every Spring
//! Boot application of a multi-module Gradle project, once per environment.
//!
//! ## Features
//!
//! - Discovers `*Application.java` entry points and `tools/run/envs/*.yml` environments
//! - Derives the Java package and the IDE module name from each entry point's path
//! - Injects environment variables into a shared XML template
//! - Resolves `HOOK_IP` to the machine's LAN address and `HOOK_PORT` to a free
//!   TCP port, never handing out the same port twice in a run
//!
//! ## Usage
//!
//! ### As a Library
//!
//! ```no_run
//! use runconf::{GeneratorConfig, generate};
//!
//! # async fn run() -> runconf::Result<()> {
//! let config = GeneratorConfig::for_base_dir("/path/to/project");
//! let report = generate(&config).await?;
//! for path in report.written() {
//!     println!("{}", path.display());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### As a CLI Tool
//!
//! ```bash
//! # Generate from the current project
//! runconf
//!
//! # Publish a fixed address for HOOK_IP
//! runconf --ip 192.168.0.20
//!
//! # Show what would be generated
//! runconf --list
//! ```

pub mod discovery;
pub mod document;
pub mod environment;
pub mod error;
pub mod generator;
pub mod naming;
pub mod resolver;
pub mod template;

// Re-export main types and functions for convenience
pub use document::{Document, Element, Node};
pub use environment::{EnvEntry, Environment, load_environment};
pub use error::{Result, RunconfError};
pub use generator::{GeneratorConfig, PairStatus, Plan, RunReport, generate, plan};
pub use naming::{AppIdentity, run_identifier};
pub use resolver::{EnvValue, PortRange, PortRegistry, ValueResolver};
pub use template::RunTemplate;
