//! `infraguard-chaos` operator CLI
//!
//! ```bash
//! infraguard-chaos memory-leak            # inject
//! infraguard-chaos cleanup memory-leak    # revert one scenario
//! infraguard-chaos cleanup                # reset the namespace
//! infraguard-chaos --simulate list        # no cluster needed
//! ```
//!
//! Exit codes: 0 success or no-op, 1 controller error, 2 configuration error.

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use infraguard_chaos::catalog::{names, BASELINE_MEMORY_LIMIT, BASELINE_REPLICAS};
use infraguard_chaos::logging::init_tracing;
use infraguard_chaos::{
    BaselineValue, ChaosConfig, ChaosError, CleanupResult, ConfigError, ControllerContext,
    DeploymentState, DetectionClient, FaultController, InMemoryCluster, IncidentTracker,
    InjectionResult, KubectlClient, OrchestrationClient, ResourceName, ScenarioDefinition,
};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const EXIT_CONTROLLER_ERROR: i32 = 1;
const EXIT_CONFIG_ERROR: i32 = 2;

fn cli() -> Command {
    let mut cli = Command::new("infraguard-chaos")
        .version(infraguard_chaos::VERSION)
        .about("Inject and recover InfraGuard demo incidents")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("namespace")
                .long("namespace")
                .short('n')
                .global(true)
                .help("Target namespace (overrides the configuration)"),
        )
        .arg(
            Arg::new("simulate")
                .long("simulate")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Run against an in-memory cluster instead of kubectl"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines on stderr"),
        )
        .subcommand(
            Command::new("inject")
                .about("Inject a scenario")
                .arg(Arg::new("scenario").required(true).help("Scenario name")),
        )
        .subcommand(
            Command::new("cleanup")
                .about("Revert one scenario, or reset the whole namespace")
                .arg(Arg::new("scenario").help("Scenario name; omit to clean up everything")),
        )
        .subcommand(Command::new("list").about("List scenarios and active incidents"))
        .subcommand(
            Command::new("status")
                .about("Show incidents reported by the detection endpoint")
                .arg(
                    Arg::new("watch")
                        .long("watch")
                        .short('w')
                        .action(ArgAction::SetTrue)
                        .help("Poll until interrupted"),
                ),
        );

    for name in names::ALL {
        cli = cli.subcommand(Command::new(name).about("Shortcut for `inject` with this scenario"));
    }
    cli
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    let code = match run(&matches).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            if e.downcast_ref::<ConfigError>().is_some() {
                EXIT_CONFIG_ERROR
            } else {
                EXIT_CONTROLLER_ERROR
            }
        }
    };
    std::process::exit(code);
}

async fn run(matches: &ArgMatches) -> anyhow::Result<i32> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => ChaosConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => ChaosConfig::default(),
    };
    if let Some(namespace) = matches.get_one::<String>("namespace") {
        config.namespace.clone_from(namespace);
        config.validate()?;
    }

    let simulate = matches.get_flag("simulate");
    let client: Arc<dyn OrchestrationClient> = if simulate {
        Arc::new(simulated_cluster(&config)?)
    } else {
        Arc::new(
            KubectlClient::new(&config.kubectl, config.api_timeout())
                .with_context(config.kube_context.clone())
                .with_container_index(config.target_container),
        )
    };

    // A simulated cluster starts at baseline, so earlier snapshots do not apply
    let state_file = config.state_file.as_ref().filter(|_| !simulate);
    let tracker = match state_file {
        Some(path) => IncidentTracker::load(path)
            .with_context(|| format!("loading tracker snapshot {}", path.display()))?,
        None => IncidentTracker::new(),
    };

    let ctx = ControllerContext::new(config.catalog()?, client).with_tracker(Arc::new(tracker));
    let controller = FaultController::from_context(ctx, config.lock_timeout());
    let namespace = config.namespace.as_str();
    info!(namespace, simulate, "controller ready");

    let code = match matches.subcommand() {
        Some(("inject", args)) => {
            let scenario = args
                .get_one::<String>("scenario")
                .context("missing scenario")?;
            inject(&controller, scenario, namespace).await
        }
        Some(("cleanup", args)) => match args.get_one::<String>("scenario") {
            Some(scenario) => cleanup_one(&controller, scenario, namespace).await,
            None => cleanup_all(&controller, namespace).await,
        },
        Some(("list", _)) => {
            list(&controller, namespace);
            0
        }
        Some(("status", args)) => {
            status(&controller, &config, args.get_flag("watch")).await;
            0
        }
        Some((scenario, _)) => inject(&controller, scenario, namespace).await,
        None => 0,
    };

    if let Some(path) = state_file {
        controller
            .tracker()
            .save(path)
            .with_context(|| format!("saving tracker snapshot {}", path.display()))?;
        debug!(path = %path.display(), "tracker snapshot saved");
    }

    Ok(code)
}

/// In-memory cluster holding every deployment the catalog mutates, at baseline
fn simulated_cluster(config: &ChaosConfig) -> anyhow::Result<InMemoryCluster> {
    let cluster = InMemoryCluster::new();
    let namespace = config.namespace.as_str();

    cluster.add_deployment(
        namespace,
        &config.target_deployment,
        DeploymentState::new(BASELINE_REPLICAS)
            .with_limit(ResourceName::Memory, BASELINE_MEMORY_LIMIT.parse()?),
    );

    let catalog = config.catalog()?;
    for baseline in catalog
        .mutation_scenarios()
        .filter_map(ScenarioDefinition::baseline)
    {
        match baseline {
            BaselineValue::Replicas {
                deployment,
                replicas,
            } => {
                let mut state = cluster
                    .deployment(namespace, &deployment)
                    .unwrap_or_else(|| DeploymentState::new(replicas));
                state.replicas = replicas;
                cluster.add_deployment(namespace, &deployment, state);
            }
            BaselineValue::Limit {
                deployment,
                resource,
                value,
            } => {
                let state = cluster
                    .deployment(namespace, &deployment)
                    .unwrap_or_else(|| DeploymentState::new(1))
                    .with_limit(resource, value);
                cluster.add_deployment(namespace, &deployment, state);
            }
        }
    }

    Ok(cluster)
}

fn report_error(err: &ChaosError) -> i32 {
    eprintln!("error [{}]: {err}", err.kind());
    if err.is_retryable() {
        eprintln!("  (retryable)");
    }
    EXIT_CONTROLLER_ERROR
}

async fn inject(controller: &FaultController, scenario: &str, namespace: &str) -> i32 {
    match controller.inject(scenario, namespace).await {
        Ok(InjectionResult::Applied { handle, .. }) => {
            match handle {
                Some(handle) => println!("Injected {scenario} into {namespace} ({handle})"),
                None => println!("Injected {scenario} into {namespace}"),
            }
            0
        }
        Ok(InjectionResult::AlreadyActive { record, adopted }) => {
            if adopted {
                println!("{scenario} was already running in {namespace}; now tracked");
            } else {
                println!(
                    "{scenario} already active in {namespace} since {}",
                    record.applied_at.to_rfc3339()
                );
            }
            0
        }
        Err(e) => report_error(&e),
    }
}

async fn cleanup_one(controller: &FaultController, scenario: &str, namespace: &str) -> i32 {
    match controller.cleanup_one(scenario, namespace).await {
        Ok(CleanupResult::Recovered {
            artifacts_deleted,
            baseline,
            ..
        }) => {
            println!("Recovered {scenario} in {namespace}");
            if artifacts_deleted > 0 {
                println!("  deleted {artifacts_deleted} artifact(s)");
            }
            if let Some(baseline) = baseline {
                println!("  restored {baseline}");
            }
            0
        }
        Ok(CleanupResult::NotActive) => {
            println!("{scenario} is not active in {namespace}");
            0
        }
        Err(e) => report_error(&e),
    }
}

async fn cleanup_all(controller: &FaultController, namespace: &str) -> i32 {
    match controller.cleanup_all(namespace).await {
        Ok(report) => {
            println!("Reset {namespace} to baseline");
            for record in &report.records_cleared {
                println!("  cleared {}", record.scenario_name);
            }
            println!("  deleted {} artifact(s)", report.artifacts_deleted);
            for baseline in &report.baselines_restored {
                println!("  restored {baseline}");
            }
            0
        }
        Err(e) => report_error(&e),
    }
}

fn list(controller: &FaultController, namespace: &str) {
    let active = controller.active_incidents(namespace);

    println!("Scenarios:");
    for scenario in controller.catalog().iter() {
        let marker = if active.iter().any(|r| r.scenario_name == scenario.name) {
            "*"
        } else {
            " "
        };
        println!(
            " {marker} {:<16} {:<22} {}",
            scenario.name,
            scenario.target_kind().to_string(),
            scenario.description
        );
    }

    println!();
    if active.is_empty() {
        println!("No active incidents in {namespace}");
    } else {
        println!("Active incidents in {namespace}:");
        for record in active {
            println!("  {} since {}", record.scenario_name, record.applied_at.to_rfc3339());
        }
    }
}

async fn status(controller: &FaultController, config: &ChaosConfig, watch: bool) {
    let detection = DetectionClient::new(&config.detection_url, config.detection_timeout());
    let namespace = config.namespace.as_str();

    if !watch {
        print_status(controller, &detection, namespace).await;
        return;
    }

    let interrupted = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
        }
    };
    poll_until(interrupted, config.poll_interval(), || {
        print_status(controller, &detection, namespace)
    })
    .await;
}

/// Run `tick` every `period` until `shutdown` completes
///
/// `shutdown` is polled for the whole loop and checked first, so a signal
/// that arrives while `tick` runs ends the loop before the next tick.
async fn poll_until<S, F, Fut>(shutdown: S, period: Duration, mut tick: F)
where
    S: Future<Output = ()>,
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut interval = tokio::time::interval(period);
    loop {
        tokio::select! {
            biased;
            () = &mut shutdown => break,
            _ = interval.tick() => tick().await,
        }
    }
}

async fn print_status(controller: &FaultController, detection: &DetectionClient, namespace: &str) {
    let report = detection.fetch().await;
    let tracked = controller.active_incidents(namespace);

    println!(
        "[{}] {} tracked, {} detected{}",
        chrono::Utc::now().format("%H:%M:%S"),
        tracked.len(),
        report.incidents.len(),
        if report.any_critical() { " (critical)" } else { "" }
    );
    for incident in &report.incidents {
        println!("  {incident}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn shutdown_during_tick_ends_the_loop() {
        let (tx, rx) = oneshot::channel::<()>();
        let mut tx = Some(tx);
        let ticks = AtomicUsize::new(0);

        let shutdown = async {
            rx.await.ok();
        };
        let run = poll_until(shutdown, Duration::from_millis(5), || {
            ticks.fetch_add(1, Ordering::SeqCst);
            // Signal arrives while the tick is still busy
            let tx = tx.take();
            async move {
                if let Some(tx) = tx {
                    tx.send(()).ok();
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        });

        tokio::time::timeout(Duration::from_secs(1), run).await.unwrap();
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn scenario_shortcuts_parse() {
        for name in names::ALL {
            let matches = cli().try_get_matches_from(["infraguard-chaos", name]).unwrap();
            assert_eq!(matches.subcommand_name(), Some(name));
        }
    }
}
