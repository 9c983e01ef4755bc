//! `dscc` command line: infer, patch and run notebook tests

use anyhow::{bail, Context};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use dscc_harness::{
    BoundaryKind, ExecutionBoundary, HarnessConfig, HarnessExecutor, ProcessBoundary,
    ProcessTarget,
};
use dscc_notebook::{discover_notebooks, NotebookStore};
use dscc_patch::{NotebookPatcher, NotebookSource};
use dscc_synth::{PersistOutcome, TerminalResponder, TestSpecSynthesizer};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Environment switch for empty mock stubs
const FALLBACK_ENV: &str = "DSCC_FALLBACK_EMPTY";

fn paths_arg() -> Arg {
    Arg::new("paths")
        .required(true)
        .num_args(1..)
        .value_parser(value_parser!(PathBuf))
        .help("Notebook files or directories to scan")
}

fn cli() -> Command {
    Command::new("dscc")
        .version(dscc_harness::VERSION)
        .about("Infer, patch and run notebook detection tests")
        .subcommand_required(true)
        .arg(
            Arg::new("app-root")
                .long("app-root")
                .global(true)
                .default_value(".")
                .value_parser(value_parser!(PathBuf))
                .help("Directory holding dscc.toml and sample files"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("infer")
                .about("Infer test cases and write them into the notebooks")
                .arg(paths_arg())
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .action(ArgAction::SetTrue)
                        .help("Print the metadata instead of writing it"),
                )
                .arg(
                    Arg::new("overwrite")
                        .long("overwrite")
                        .action(ArgAction::SetTrue)
                        .help("Replace existing cases with the same name"),
                )
                .arg(
                    Arg::new("noninteractive")
                        .long("noninteractive")
                        .action(ArgAction::SetTrue)
                        .help("Accept every proposal without prompting"),
                )
                .arg(
                    Arg::new("no-sample")
                        .long("no-sample")
                        .action(ArgAction::SetTrue)
                        .help("Do not fetch or stub sample files"),
                ),
        )
        .subcommand(
            Command::new("patch")
                .about("Write standalone modules for notebooks")
                .arg(paths_arg())
                .arg(
                    Arg::new("out")
                        .long("out")
                        .default_value("build/dscc")
                        .value_parser(value_parser!(PathBuf))
                        .help("Output directory, relative to the app root"),
                )
                .arg(
                    Arg::new("workers")
                        .long("workers")
                        .value_parser(value_parser!(usize))
                        .help("Notebooks patched concurrently"),
                ),
        )
        .subcommand(
            Command::new("run")
                .about("Run the test cases of notebooks")
                .arg(paths_arg())
                .arg(
                    Arg::new("workers")
                        .long("workers")
                        .value_parser(value_parser!(usize))
                        .help("Cases run concurrently"),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .value_parser(value_parser!(u64))
                        .help("Run deadline in seconds"),
                )
                .arg(
                    Arg::new("boundary")
                        .long("boundary")
                        .value_parser(["local", "container"])
                        .help("Where cases execute"),
                )
                .arg(
                    Arg::new("install-requirements")
                        .long("install-requirements")
                        .action(ArgAction::SetTrue)
                        .help("Install collected requirements before running"),
                )
                .arg(
                    Arg::new("fallback-empty")
                        .long("fallback-empty")
                        .action(ArgAction::SetTrue)
                        .help("Use zero-row stubs for missing samples"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the report as JSON"),
                ),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn fallback_from_env() -> bool {
    std::env::var(FALLBACK_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

/// Expand directories into the notebooks they contain
fn expand_paths(args: &ArgMatches) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for path in args.get_many::<PathBuf>("paths").into_iter().flatten() {
        if path.is_dir() {
            paths.extend(discover_notebooks(path));
        } else {
            paths.push(path.clone());
        }
    }
    paths
}

async fn infer(config: HarnessConfig, args: &ArgMatches) -> anyhow::Result<bool> {
    let s = config.synthesis;
    let options = s
        .clone()
        .with_dry_run(s.dry_run || args.get_flag("dry-run"))
        .with_overwrite(s.overwrite || args.get_flag("overwrite"))
        .with_noninteractive(s.noninteractive || args.get_flag("noninteractive"))
        .with_no_sample(s.no_sample || args.get_flag("no-sample"))
        .with_fallback_empty(s.fallback_empty || config.mock.fallback_empty || fallback_from_env());
    let synthesizer = TestSpecSynthesizer::new(options)
        .with_analyzer(dscc_analysis::StaticAnalyzer::new(config.analysis));
    let store = NotebookStore::default();
    let mut responder = TerminalResponder::new(BufReader::new(std::io::stdin()), std::io::stdout());

    let mut ok = true;
    for path in expand_paths(args) {
        let outcome = match synthesizer.infer_notebook(&store, &path, &mut responder).await {
            Ok(outcome) => outcome,
            Err(err) => {
                eprintln!("{}: {err}", path.display());
                ok = false;
                continue;
            }
        };

        println!("{}", path.display());
        for warning in &outcome.warnings {
            println!("  warning: {warning}");
        }
        for ambiguity in &outcome.synthesis.ambiguities {
            println!(
                "  {}.{}: chose {} ({:?}) from {} candidates",
                ambiguity.function,
                ambiguity.parameter,
                ambiguity.chosen,
                ambiguity.resolution,
                ambiguity.candidates.len()
            );
        }
        for sample in &outcome.synthesis.samples {
            println!("  sample {} -> {}: {:?}", sample.table, sample.path, sample.status);
        }
        println!(
            "  added {:?}, replaced {:?}, skipped {:?}",
            outcome.merge.added, outcome.merge.replaced, outcome.merge.skipped
        );
        match outcome.persisted {
            PersistOutcome::DryRun { yaml } => println!("{yaml}"),
            PersistOutcome::Written { uuid, .. } => println!("  written (uuid {uuid})"),
        }
    }
    Ok(ok)
}

async fn patch(config: &HarnessConfig, app_root: &Path, args: &ArgMatches) -> anyhow::Result<bool> {
    let out = args
        .get_one::<PathBuf>("out")
        .map_or_else(|| app_root.join("build/dscc"), |out| app_root.join(out));
    let workers = args
        .get_one::<usize>("workers")
        .copied()
        .unwrap_or(config.run.workers);
    let patcher =
        NotebookPatcher::new(Arc::new(NotebookStore::default())).with_config(config.patch.clone());

    let mut ok = true;
    for (path, result) in patcher.patch_all(expand_paths(args), workers).await {
        match result {
            Ok(module) => {
                let written = module
                    .write_to(&out)
                    .await
                    .with_context(|| format!("writing module for {}", path.display()))?;
                println!("{} -> {}", path.display(), written.display());
            }
            Err(err) => {
                eprintln!("{}: {err}", path.display());
                ok = false;
            }
        }
    }
    Ok(ok)
}

fn boundary(config: &HarnessConfig, app_root: &Path) -> anyhow::Result<Arc<dyn ExecutionBoundary>> {
    let run = &config.run;
    let target = match run.boundary {
        BoundaryKind::Local => ProcessTarget::Local {
            interpreter: run.interpreter.clone(),
        },
        BoundaryKind::Container => ProcessTarget::Container {
            runtime: run.runtime.clone(),
            container: run.container.clone(),
            interpreter: run.interpreter.clone(),
        },
        BoundaryKind::InProcess => {
            bail!("the in-process boundary needs registered implementations and is library-only")
        }
    };
    Ok(Arc::new(
        ProcessBoundary::new(target, app_root.join(".dscc"))
            .with_install_requirements(run.install_requirements),
    ))
}

async fn run(mut config: HarnessConfig, app_root: &Path, args: &ArgMatches) -> anyhow::Result<bool> {
    if let Some(workers) = args.get_one::<usize>("workers") {
        config.run = config.run.with_workers(*workers);
    }
    if let Some(secs) = args.get_one::<u64>("timeout") {
        config.run = config.run.with_timeout(Some(Duration::from_secs(*secs)));
    }
    match args.get_one::<String>("boundary").map(String::as_str) {
        Some("local") => config.run = config.run.with_boundary(BoundaryKind::Local),
        Some("container") => config.run = config.run.with_boundary(BoundaryKind::Container),
        _ => {}
    }
    config.run.install_requirements |= args.get_flag("install-requirements");
    config.mock.fallback_empty |= args.get_flag("fallback-empty") || fallback_from_env();

    let boundary = boundary(&config, app_root)?;
    let source: Arc<dyn NotebookSource> = Arc::new(NotebookStore::default());
    let executor = HarnessExecutor::new(&config, source, boundary);
    let report = executor.run(&expand_paths(args)).await;

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for result in &report.results {
            println!("{result}");
        }
        for error in &report.notebook_errors {
            println!("SKIPPED {}: {}", error.notebook.display(), error.message);
        }
        if let Some(reason) = &report.aborted {
            println!("ABORTED: {reason}");
        }
        println!("{}", report.summary());
    }
    Ok(report.is_success())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    let app_root = matches
        .get_one::<PathBuf>("app-root")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));
    let config = HarnessConfig::load(&app_root)
        .await
        .with_context(|| format!("loading configuration from {}", app_root.display()))?;

    let ok = match matches.subcommand() {
        Some(("infer", args)) => infer(config, args).await?,
        Some(("patch", args)) => patch(&config, &app_root, args).await?,
        Some(("run", args)) => run(config, &app_root, args).await?,
        _ => bail!("unknown command"),
    };
    std::process::exit(if ok { 0 } else { 1 });
}
