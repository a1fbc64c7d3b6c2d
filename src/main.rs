//! CLI for the definition registry: resolve closures, print fingerprints,
//! produce reconciliation manifests, and watch source roots.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use defreg::context::{ClientState, Context};
use defreg::descriptor::{DefKind, Descriptor};
use defreg::error::Error;
use defreg::registry::Registry;
use defreg::store::FileStore;
use defreg::{RegistryConfig, VisibilityFilter, diagnostics};

#[derive(Parser)]
#[command(name = "defreg", about = "Component definition registry with dependency fingerprints")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project root containing .defreg.toml.
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Produce a reconciliation manifest for a root descriptor
    Manifest {
        /// Qualified root descriptor, e.g. markup://ui:app
        descriptor: String,
        /// Kind tag of the root, e.g. APPLICATION
        #[arg(long, default_value = "COMPONENT")]
        kind: String,
        /// JSON file with the client's declared state
        #[arg(long)]
        known: Option<PathBuf>,
        /// Restrict the manifest to the configured public namespaces
        #[arg(long)]
        public: bool,
    },
    /// List configured namespaces and their definition counts
    Namespaces,
    /// Resolve a root descriptor's closure and fingerprint
    Resolve {
        /// Qualified root descriptor, e.g. markup://ui:app
        descriptor: String,
        /// Kind tag of the root, e.g. APPLICATION
        #[arg(long, default_value = "COMPONENT")]
        kind: String,
    },
    /// Watch source roots and re-resolve on changes
    Watch {
        /// Qualified root descriptor, e.g. markup://ui:app
        descriptor: String,
        /// Kind tag of the root, e.g. APPLICATION
        #[arg(long, default_value = "COMPONENT")]
        kind: String,
    },
}

fn main() -> ExitCode {
    setup_tracing();
    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Manifest { ref descriptor, ref kind, ref known, public } => {
            cmd_manifest(&cli.root, descriptor, kind, known.as_deref(), public)
        },
        Commands::Namespaces => cmd_namespaces(&cli.root),
        Commands::Resolve { ref descriptor, ref kind } => {
            cmd_resolve(&cli.root, descriptor, kind)
        },
        Commands::Watch { ref descriptor, ref kind } => cmd_watch(&cli.root, descriptor, kind),
    };

    return match outcome {
        Err(error) => {
            diagnostics::print_error(&error);
            ExitCode::FAILURE
        },
        Ok(code) => code,
    };
}

/// Load config and build the registry over the project's file store.
///
/// # Errors
///
/// Returns config loading and registry build errors.
fn build_registry(project_root: &std::path::Path) -> Result<(Registry, RegistryConfig), Error> {
    let config = RegistryConfig::load(project_root)?;
    let store = FileStore::from_config(&config, project_root);
    let registry = Registry::builder().with_store(Box::new(store)).build()?;
    return Ok((registry, config));
}

/// Reconcile against a client-state file and print the manifest as JSON.
///
/// # Errors
///
/// Returns errors from config loading, state parsing, or reconciliation.
fn cmd_manifest(
    project_root: &std::path::Path,
    descriptor: &str,
    kind: &str,
    known: Option<&std::path::Path>,
    public: bool,
) -> Result<ExitCode, Error> {
    let (registry, config) = build_registry(project_root)?;
    let root = parse_root(descriptor, kind)?;
    let filter = if public { config.visibility() } else { VisibilityFilter::All };

    let state = match known {
        None => ClientState::default(),
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
    };

    let mut context = Context::with_client_state(root, &state)?;
    let manifest = context.reconcile(&registry, &filter)?;
    println!("{}", serde_json::to_string_pretty(&manifest)?);

    return Ok(ExitCode::SUCCESS);
}

/// List configured namespaces with their on-disk definition counts.
///
/// # Errors
///
/// Returns errors from config loading or registry building.
fn cmd_namespaces(project_root: &std::path::Path) -> Result<ExitCode, Error> {
    let config = RegistryConfig::load(project_root)?;
    let store = FileStore::from_config(&config, project_root);

    if config.namespaces.is_empty() {
        println!("No namespaces configured.");
        return Ok(ExitCode::SUCCESS);
    }

    for (name, dir) in &config.namespaces {
        let count = store.scan_namespace(name).len();
        println!("{name} -> {} ({count} definitions)", dir.display());
    }

    return Ok(ExitCode::SUCCESS);
}

/// Print a root's closure members and fingerprint.
///
/// # Errors
///
/// Returns errors from config loading, parsing, or closure resolution.
fn cmd_resolve(
    project_root: &std::path::Path,
    descriptor: &str,
    kind: &str,
) -> Result<ExitCode, Error> {
    let (registry, _config) = build_registry(project_root)?;
    let root = parse_root(descriptor, kind)?;

    let closure = registry.closure(&root)?;
    for definition in &closure.members {
        let token = &definition.token.0;
        let short = token.get(..12).unwrap_or(token);
        println!("{}  {short}", definition.descriptor.canonical());
    }

    let fingerprint = registry.fingerprint(&root, &VisibilityFilter::All)?;
    println!("fingerprint: {fingerprint}");

    return Ok(ExitCode::SUCCESS);
}

/// Watch namespace directories and re-resolve the root on change.
///
/// # Errors
///
/// Returns errors from config loading, parsing, or watcher setup.
fn cmd_watch(
    project_root: &std::path::Path,
    descriptor: &str,
    kind: &str,
) -> Result<ExitCode, Error> {
    let (registry, config) = build_registry(project_root)?;
    let root = parse_root(descriptor, kind)?;

    defreg::watch::run(&registry, &config, project_root, &root, &VisibilityFilter::All)?;
    return Ok(ExitCode::SUCCESS);
}

/// Parse the CLI's descriptor + kind-tag pair.
///
/// # Errors
///
/// Returns `Error::MalformedIdentifier` for a bad qualified name or an
/// unknown kind tag.
fn parse_root(descriptor: &str, kind: &str) -> Result<Descriptor, Error> {
    let Some(kind) = DefKind::from_tag(&kind.to_uppercase()) else {
        return Err(Error::MalformedIdentifier {
            input: kind.to_string(),
            reason: "unknown kind tag",
        });
    };
    return Descriptor::parse(descriptor, kind);
}

/// Install the fmt subscriber unless a host already set a dispatcher.
fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}
