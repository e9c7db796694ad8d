use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde_json::Value;

use geoflow_config::{load_config, GeoflowConfig, LayerSource};
use geoflow_planners::StaticPlanner;
use geoflow_runtime::{OrchestrationRequest, OrchestrationResponse, RuntimeApp};

const DEFAULT_CONFIG: &str = "config/geoflow.yaml";

#[derive(Debug, Parser)]
#[command(name = "geoflow", about = "Plan and run geometry operations from plain-language queries")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Plan a query with the configured planner and execute it
    Run(RunArgs),
    /// Execute a saved action list without a language model
    Exec(ExecArgs),
    /// Print the operation catalog
    Operations(OperationsArgs),
}

#[derive(Debug, Args, Clone)]
struct LayerArgs {
    /// GeoJSON file loaded after the configured layers (repeatable)
    #[arg(long = "layer", value_name = "PATH")]
    layers: Vec<PathBuf>,
    /// CRS for `--layer` files that do not declare one
    #[arg(long, value_name = "CRS")]
    layer_crs: Option<String>,
}

#[derive(Debug, Args, Clone)]
struct RunArgs {
    #[arg(long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,
    #[command(flatten)]
    layers: LayerArgs,
    /// JSON object handed to the planner alongside the query
    #[arg(long, value_name = "JSON")]
    context: Option<String>,
    #[arg(long)]
    verbose: bool,
    #[arg(long)]
    compact: bool,
    #[arg(value_name = "QUERY", required = true)]
    query: Vec<String>,
}

#[derive(Debug, Args, Clone)]
struct ExecArgs {
    #[arg(long)]
    config: Option<PathBuf>,
    /// Plan document: `{"message", "actions"}` or a bare action array
    #[arg(long, value_name = "PATH")]
    actions: PathBuf,
    #[command(flatten)]
    layers: LayerArgs,
    #[arg(long, default_value = "replay saved plan")]
    query: String,
    #[arg(long)]
    verbose: bool,
    #[arg(long)]
    compact: bool,
}

#[derive(Debug, Args, Clone)]
struct OperationsArgs {
    #[arg(long)]
    compact: bool,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Run(args) => {
                ensure_log_filter(args.verbose);
                let compact = args.compact;
                let response = run_query(args).await?;
                finish(&response, compact)
            }
            Command::Exec(args) => {
                ensure_log_filter(args.verbose);
                let compact = args.compact;
                let response = exec_plan(args).await?;
                finish(&response, compact)
            }
            Command::Operations(args) => {
                let catalog = geoflow_ops::builtin_registry().catalog();
                print_json(&serde_json::to_value(catalog)?, args.compact)
            }
        }
    }
}

async fn run_query(args: RunArgs) -> anyhow::Result<OrchestrationResponse> {
    let mut config = load_config(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;
    append_layers(&mut config, &args.layers);
    let context = parse_context(args.context.as_deref())?;

    let app = RuntimeApp::from_config(config)?;
    let request = OrchestrationRequest::new(args.query.join(" ")).with_context(context);
    Ok(app.orchestrator.handle(&request).await)
}

async fn exec_plan(args: ExecArgs) -> anyhow::Result<OrchestrationResponse> {
    let mut config = match &args.config {
        Some(path) => load_config(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => GeoflowConfig::default(),
    };
    append_layers(&mut config, &args.layers);

    let planner = StaticPlanner::from_file(&args.actions)
        .with_context(|| format!("failed to load plan {}", args.actions.display()))?;
    tracing::info!(
        plan = %args.actions.display(),
        actions = planner.output().actions.len(),
        "replaying saved plan"
    );

    let app = RuntimeApp::with_planner(config, Arc::new(planner))?;
    Ok(app
        .orchestrator
        .handle(&OrchestrationRequest::new(args.query))
        .await)
}

fn append_layers(config: &mut GeoflowConfig, args: &LayerArgs) {
    config
        .layers
        .extend(args.layers.iter().map(|path| LayerSource {
            path: path.clone(),
            crs: args.layer_crs.clone(),
        }));
}

fn parse_context(raw: Option<&str>) -> anyhow::Result<Value> {
    let Some(raw) = raw else {
        return Ok(Value::Null);
    };
    let value: Value = serde_json::from_str(raw).context("--context must be valid JSON")?;
    if !value.is_object() {
        anyhow::bail!("--context must be a JSON object");
    }
    Ok(value)
}

fn finish(response: &OrchestrationResponse, compact: bool) -> anyhow::Result<()> {
    print_json(&serde_json::to_value(response)?, compact)?;
    if !response.is_success() {
        anyhow::bail!("{}", response.message);
    }
    Ok(())
}

fn print_json(value: &Value, compact: bool) -> anyhow::Result<()> {
    let text = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{}", text);
    Ok(())
}

fn ensure_log_filter(verbose: bool) {
    if env::var("RUST_LOG").is_ok() {
        return;
    }
    if verbose {
        env::set_var("RUST_LOG", "debug");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_run_args_collect_layers_and_query() {
        let cli = Cli::try_parse_from([
            "geoflow",
            "run",
            "--layer",
            "wells.geojson",
            "--layer",
            "parcels.geojson",
            "--layer-crs",
            "EPSG:3857",
            "buffer",
            "the",
            "wells",
        ])
        .expect("parse");

        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG));
        assert_eq!(args.query.join(" "), "buffer the wells");

        let mut config = GeoflowConfig::default();
        append_layers(&mut config, &args.layers);
        assert_eq!(config.layers.len(), 2);
        assert_eq!(config.layers[1].path, PathBuf::from("parcels.geojson"));
        assert_eq!(config.layers[1].crs.as_deref(), Some("EPSG:3857"));
    }

    #[test]
    fn test_run_requires_a_query() {
        assert!(Cli::try_parse_from(["geoflow", "run"]).is_err());
    }

    #[test]
    fn test_context_must_be_an_object() {
        assert_eq!(parse_context(None).unwrap(), Value::Null);
        assert!(parse_context(Some(r#"{"zoom": 3}"#)).unwrap().is_object());
        assert!(parse_context(Some("[1, 2]")).is_err());
        assert!(parse_context(Some("{oops")).is_err());
    }

    #[test]
    fn test_exec_replays_plan_over_layer_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layer = dir.path().join("wells.geojson");
        fs::write(
            &layer,
            r#"{"type":"FeatureCollection","features":[{"type":"Feature","geometry":{"type":"Point","coordinates":[10.0,20.0]},"properties":{}}]}"#,
        )
        .expect("write layer");
        let plan = dir.path().join("plan.json");
        fs::write(
            &plan,
            r#"{"message":"Buffered.","actions":[
                {"action":"buffer_layer","params":{"layer_name":"Layer 1","distance":25}},
                {"action":"calculate_area","params":{"layer_name":"Result_1"}}
            ]}"#,
        )
        .expect("write plan");

        let args = ExecArgs {
            config: None,
            actions: plan,
            layers: LayerArgs {
                layers: vec![layer],
                layer_crs: Some("EPSG:3857".to_string()),
            },
            query: "replay".to_string(),
            verbose: false,
            compact: true,
        };
        let response = tokio_test::block_on(exec_plan(args)).expect("exec");

        assert!(response.is_success());
        assert_eq!(response.message, "Buffered.");
        assert_eq!(response.actions, vec!["buffer_layer", "calculate_area"]);
        assert_eq!(response.intermediate_layers, vec!["Layer 2"]);
        assert_eq!(response.results.len(), 2);
    }
}
