//! `adaas` command line: run analyses against the compute service and build
//! chart specs locally.
//!
//! Every subcommand produces a JSON document; `main` prints it to stdout.

use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde_json::{Value as JsonValue, json};

use adaas_charts::{ChartBuilder, ChartDescriptor, ChartSpec, parse_descriptors, recommend};
use adaas_core::{Dataset, JobId};
use adaas_jobs::{
    AnalysisKind, AnalysisOrchestrator, AnalysisRequest, CancelToken, ClientConfig, ComputeService,
    HttpComputeClient, Job, ResultMaterializer, Transition,
};

pub fn command() -> Command {
    Command::new("adaas")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Client for the ADaaS analytics compute service")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("run")
                .about("Submit an analysis, wait for it and print its result")
                .arg(
                    Arg::new("kind")
                        .required(true)
                        .help("Analysis kind: survival, glm, timeseries or ml_survival"),
                )
                .arg(
                    Arg::new("dataset")
                        .long("dataset")
                        .short('d')
                        .required(true)
                        .help("Dataset id known to the service"),
                )
                .arg(
                    Arg::new("params")
                        .long("params")
                        .short('p')
                        .help("Analysis options as a JSON object, or @file"),
                )
                .arg(
                    Arg::new("no-charts")
                        .long("no-charts")
                        .action(ArgAction::SetTrue)
                        .help("Skip building default charts for the result"),
                ),
        )
        .subcommand(
            Command::new("status")
                .about("Query the status of a submitted job")
                .arg(Arg::new("job_id").required(true).help("Job id returned on submission")),
        )
        .subcommand(
            Command::new("fetch")
                .about("Fetch and validate the result of a finished job")
                .arg(Arg::new("job_id").required(true).help("Job id returned on submission"))
                .arg(
                    Arg::new("kind")
                        .long("kind")
                        .short('k')
                        .required(true)
                        .help("Analysis kind the job was submitted as"),
                ),
        )
        .subcommand(
            Command::new("chart")
                .about("Build chart specs from rows and descriptors")
                .arg(
                    Arg::new("descriptor")
                        .long("descriptor")
                        .required(true)
                        .help("A descriptor object or an array of them, as JSON or @file"),
                )
                .arg(
                    Arg::new("rows")
                        .long("rows")
                        .required(true)
                        .help("Rows file ('-' for stdin): a JSON array or {columns, rows}"),
                ),
        )
        .subcommand(
            Command::new("recommend")
                .about("Suggest up to three charts for a rows file")
                .arg(Arg::new("rows").required(true).help("Rows file ('-' for stdin)")),
        )
}

/// Run the selected subcommand and return its JSON output.
pub async fn execute(matches: &ArgMatches) -> Result<JsonValue> {
    match matches.subcommand() {
        Some(("run", args)) => run_analysis(args).await,
        Some(("status", args)) => job_status(args).await,
        Some(("fetch", args)) => fetch_result(args).await,
        Some(("chart", args)) => {
            let descriptors = descriptors_from(&read_json(arg(args, "descriptor")?)?)?;
            let dataset = read_dataset(arg(args, "rows")?)?;
            let builder = ChartBuilder::new(ClientConfig::from_env()?.chart_limits);
            let specs = build_charts(&builder, &descriptors, &dataset);
            if specs.is_empty() {
                bail!("none of the {} descriptor(s) produced a chart", descriptors.len());
            }
            Ok(serde_json::to_value(specs)?)
        }
        Some(("recommend", args)) => {
            let dataset = read_dataset(arg(args, "rows")?)?;
            Ok(serde_json::to_value(recommend(&dataset))?)
        }
        Some((other, _)) => bail!("unknown subcommand '{other}'"),
        None => bail!("no subcommand given"),
    }
}

async fn run_analysis(args: &ArgMatches) -> Result<JsonValue> {
    let kind: AnalysisKind = arg(args, "kind")?.parse()?;
    let params = match args.get_one::<String>("params") {
        Some(raw) => read_json(raw).context("reading --params")?,
        None => JsonValue::Null,
    };
    let request = AnalysisRequest::from_parts(kind, arg(args, "dataset")?, params)?;

    let orchestrator = AnalysisOrchestrator::from_config(ClientConfig::from_env()?)?.with_observer(Arc::new(log_transition));

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; cancelling analysis");
            on_interrupt.cancel();
        }
    });

    let done = orchestrator.run(request, &cancel).await?;
    let charts = if args.get_flag("no-charts") {
        Vec::new()
    } else {
        done.charts(orchestrator.chart_builder())
    };
    Ok(json!({ "job": done.job, "result": done.payload, "charts": charts }))
}

async fn job_status(args: &ArgMatches) -> Result<JsonValue> {
    let job_id = JobId::new(arg(args, "job_id")?)?;
    let client = HttpComputeClient::new(ClientConfig::from_env()?)?;
    let report = client.status(&job_id).await?;
    Ok(json!({ "job_id": job_id, "status": report.status, "error": report.error }))
}

async fn fetch_result(args: &ArgMatches) -> Result<JsonValue> {
    let job_id = JobId::new(arg(args, "job_id")?)?;
    let kind: AnalysisKind = arg(args, "kind")?.parse()?;
    let config = ClientConfig::from_env()?;
    let builder = ChartBuilder::new(config.chart_limits);
    let materializer = ResultMaterializer::new(Arc::new(HttpComputeClient::new(config)?));

    let payload = materializer.fetch(&job_id, kind).await?;
    let charts = payload.default_charts(&builder);
    Ok(json!({ "job_id": job_id, "result": payload, "charts": charts }))
}

fn log_transition(job: &Job, transition: &Transition) {
    tracing::info!(
        job_id = %job.id,
        attempt = transition.attempt,
        from = %transition.from,
        to = %transition.to,
        status = ?job.status,
        "job transition"
    );
}

fn arg<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a str> {
    args.get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing argument '{name}'"))
}

fn read_source(source: &str) -> Result<String> {
    if source == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).context("reading stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(source).with_context(|| format!("reading {source}"))
}

/// Inline JSON, or the contents of a file when prefixed with `@`.
fn read_json(raw: &str) -> Result<JsonValue> {
    let text = match raw.strip_prefix('@') {
        Some(path) => read_source(path)?,
        None => raw.to_string(),
    };
    serde_json::from_str(&text).context("invalid JSON")
}

fn read_dataset(source: &str) -> Result<Dataset> {
    let text = read_source(source)?;
    serde_json::from_str(&text).with_context(|| format!("{source} is not a row set"))
}

/// A single descriptor must be valid; in an array, bad entries are skipped.
fn descriptors_from(value: &JsonValue) -> Result<Vec<ChartDescriptor>> {
    match value {
        JsonValue::Array(_) => Ok(parse_descriptors(value)),
        JsonValue::Object(_) => Ok(vec![
            serde_json::from_value(value.clone()).context("invalid chart descriptor")?,
        ]),
        other => bail!("expected a chart descriptor object or array, got {other}"),
    }
}

fn build_charts(builder: &ChartBuilder, descriptors: &[ChartDescriptor], dataset: &Dataset) -> Vec<ChartSpec> {
    descriptors
        .iter()
        .filter_map(|d| {
            let spec = builder.build(d, &dataset.rows);
            if spec.is_none() {
                tracing::warn!(chart = %d.title(), "no chart built for descriptor");
            }
            spec
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaas_charts::{ChartKind, SeriesData};

    fn claims() -> Dataset {
        serde_json::from_value(json!([
            {"region": "A", "amount": 10},
            {"region": "B", "amount": 20},
            {"region": "A", "amount": 30},
            {"region": "C", "amount": 40},
            {"region": "B", "amount": 50},
            {"region": "A", "amount": null}
        ]))
        .unwrap()
    }

    #[test]
    fn command_definition_is_consistent() {
        command().debug_assert();
    }

    #[test]
    fn parses_run_arguments() {
        let matches = command()
            .try_get_matches_from([
                "adaas",
                "run",
                "timeseries",
                "--dataset",
                "claims",
                "--params",
                r#"{"forecastPeriods": 12}"#,
            ])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "run");
        assert_eq!(arg(args, "kind").unwrap(), "timeseries");
        assert_eq!(arg(args, "dataset").unwrap(), "claims");
        assert!(!args.get_flag("no-charts"));
        assert_eq!(read_json(arg(args, "params").unwrap()).unwrap()["forecastPeriods"], 12);
    }

    #[test]
    fn run_requires_a_dataset() {
        assert!(command().try_get_matches_from(["adaas", "run", "glm"]).is_err());
    }

    #[test]
    fn single_descriptor_builds_one_chart() {
        let descriptors = descriptors_from(&json!({"type": "boxplot", "fields": ["amount"]})).unwrap();
        let specs = build_charts(&ChartBuilder::default(), &descriptors, &claims());
        assert_eq!(specs.len(), 1);
        let SeriesData::Summary { summary } = &specs[0].series[0].data else {
            panic!("expected a summary series");
        };
        assert_eq!(summary.min, 10.0);
        assert_eq!(summary.max, 50.0);
    }

    #[test]
    fn unusable_descriptors_are_skipped() {
        let descriptors = descriptors_from(&json!([
            {"type": "bar", "fields": ["region"]},
            {"type": "radar", "fields": ["region"]},
            {"type": "scatter", "fields": ["amount"]}
        ]))
        .unwrap();
        assert_eq!(descriptors.len(), 2);

        let specs = build_charts(&ChartBuilder::default(), &descriptors, &claims());
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].kind, ChartKind::Bar);
    }

    #[test]
    fn descriptor_must_be_object_or_array() {
        assert!(descriptors_from(&json!("bar")).is_err());
        assert!(descriptors_from(&json!({"type": "radar", "fields": []})).is_err());
    }
}
