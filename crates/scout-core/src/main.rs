//! `scout` command line: replay recorded explorations and validate specifications

use anyhow::{bail, Context};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use indexmap::IndexMap;
use scout_core::{
    ChannelObserver, ExecutionMode, Explorer, ExplorerConfig, GraphKind, ProgressEvent,
    ReplayCollaborators, Session, Transcript,
};
use scout_graph::{validate_specification, GraphSpecification, NodeId, NodeState, ProcessingGraph};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const GRAPHS: [GraphKind; 2] = [GraphKind::Information, GraphKind::Exploration];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Command::new("scout")
        .version(scout_core::VERSION)
        .about("Goal exploration engine")
        .subcommand_required(true)
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("replay")
                .about("Explore a goal using recorded collaborator responses")
                .arg(
                    Arg::new("transcript")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Transcript JSON file"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Explorer configuration (TOML)"),
                )
                .arg(
                    Arg::new("mode")
                        .long("mode")
                        .value_parser(["batch", "suspend"])
                        .help("Execution mode, overrides the configuration"),
                )
                .arg(
                    Arg::new("max-depth")
                        .long("max-depth")
                        .value_parser(value_parser!(usize))
                        .help("Generation rounds per graph"),
                )
                .arg(
                    Arg::new("input-timeout")
                        .long("input-timeout")
                        .value_parser(value_parser!(u64))
                        .help("Seconds to wait for input in suspend mode"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the final session as JSON"),
                ),
        )
        .subcommand(
            Command::new("validate")
                .about("Validate a graph specification")
                .arg(
                    Arg::new("spec")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Graph specification JSON file"),
                ),
        );

    let matches = cli.get_matches();
    init_tracing(matches.get_flag("log-json"));

    match matches.subcommand() {
        Some(("replay", args)) => replay(args).await,
        Some(("validate", args)) => validate(args),
        _ => Ok(()),
    }
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

fn load_config(args: &ArgMatches) -> anyhow::Result<ExplorerConfig> {
    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => ExplorerConfig::load(path)?,
        None => ExplorerConfig::default(),
    };
    if let Some(depth) = args.get_one::<usize>("max-depth") {
        config = config.with_max_depth(*depth);
    }
    let timeout = args.get_one::<u64>("input-timeout").copied();
    match args.get_one::<String>("mode").map(String::as_str) {
        Some("batch") => config = config.with_mode(ExecutionMode::Batch),
        Some("suspend") => {
            config = config.with_mode(ExecutionMode::Suspend {
                input_timeout_secs: timeout,
            });
        }
        _ => {
            if let (ExecutionMode::Suspend { .. }, Some(secs)) = (config.mode, timeout) {
                config = config.with_mode(ExecutionMode::Suspend {
                    input_timeout_secs: Some(secs),
                });
            }
        }
    }
    config.validate()?;
    Ok(config)
}

async fn replay(args: &ArgMatches) -> anyhow::Result<()> {
    let Some(path) = args.get_one::<PathBuf>("transcript") else {
        bail!("missing transcript path");
    };
    let transcript = Transcript::load(path)
        .with_context(|| format!("loading transcript {}", path.display()))?;
    let config = load_config(args)?;
    let suspend = config.mode.waits_for_input();
    if let ExecutionMode::Suspend {
        input_timeout_secs: None,
    } = config.mode
    {
        let missing = transcript.missing_inputs();
        if !missing.is_empty() {
            bail!(
                "suspend mode without --input-timeout needs a recorded input for every ask-user node; missing: {}",
                missing.iter().map(NodeId::as_str).collect::<Vec<_>>().join(", ")
            );
        }
    }

    let goal = transcript.goal.clone();
    let context = transcript.context.clone();
    let inputs = Arc::new(transcript.user_inputs.clone());
    let collaborators = ReplayCollaborators::new(transcript).into_collaborators();

    let (observer, mut events) = ChannelObserver::new();
    let explorer = Explorer::new(config, collaborators).with_observer(Arc::new(observer));
    let session = explorer.open_session(goal, context);

    // Plays the transport: logs events and, in suspend mode, answers the user
    let listener = {
        let session = session.clone();
        let inputs = Arc::clone(&inputs);
        tokio::spawn(async move {
            while let Some((id, event)) = events.recv().await {
                tracing::debug!(
                    "session {}: {}",
                    id,
                    serde_json::to_string(&event).unwrap_or_default()
                );
                if let ProgressEvent::StateChanged {
                    node,
                    to: NodeState::Blocked,
                    ..
                } = &event
                {
                    if suspend {
                        answer(&session, &inputs, node);
                    }
                }
            }
        })
    };

    explorer.explore(&session).await?;

    if !suspend {
        // Batch: answer whatever is waiting, then re-drive both graphs
        loop {
            let awaiting: Vec<NodeId> = session.with_state(|s| {
                GRAPHS
                    .iter()
                    .flat_map(|&g| s.graph(g).awaiting_input())
                    .collect()
            });
            let answered = awaiting
                .iter()
                .filter(|node| answer(&session, &inputs, node))
                .count();
            if answered == 0 {
                break;
            }
            for graph in GRAPHS {
                explorer.resume(&session, graph).await?;
            }
        }
    }

    if let Some(closed) = explorer.close_session(&session.id()) {
        tracing::debug!("Closed session {}", closed.id());
    }

    let snapshot = session.snapshot();
    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!("Goal: {}", snapshot.goal);
        print_graph("Information needs", &snapshot.information);
        print_graph("Solution exploration", &snapshot.exploration);
        println!();
        println!("Facts:");
        println!("{}", snapshot.facts);
    }

    listener.abort();
    Ok(())
}

fn answer(session: &Session, inputs: &IndexMap<NodeId, String>, node: &NodeId) -> bool {
    let Some(value) = inputs.get(node) else {
        tracing::warn!("No recorded input for node {}", node);
        return false;
    };
    match session.provide_input(node, value.clone()) {
        Ok(_) => true,
        Err(e) => {
            tracing::debug!("Input for {} not applied: {}", node, e);
            false
        }
    }
}

fn print_graph(title: &str, graph: &ProcessingGraph) {
    println!();
    println!("{title}:");
    for node in graph.nodes() {
        let source = node
            .value_source()
            .map_or_else(String::new, |s| format!(" ({s})"));
        println!(
            "  {} [{}] {}: {}{}",
            node.id,
            node.state(),
            node.question,
            node.value().unwrap_or("-"),
            source
        );
        if let Some(failure) = &node.failure {
            println!("      failed: {failure}");
        }
    }
}

fn validate(args: &ArgMatches) -> anyhow::Result<()> {
    let Some(path) = args.get_one::<PathBuf>("spec") else {
        bail!("missing specification path");
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let spec: GraphSpecification = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", path.display()))?;
    validate_specification(&spec).with_context(|| format!("{} is invalid", path.display()))?;
    println!("{}: {} node(s), valid", path.display(), spec.len());
    Ok(())
}
