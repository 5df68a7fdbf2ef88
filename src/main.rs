use anyhow::{Context, Result};
use hypermatch::io::{MatchSummary, candidates_to_geojson, read_cases};
use hypermatch::{Confusion, DEFAULT_METRIC, JsonFileStore, StoreConfig, select_best};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_target(false)
        .format_timestamp(None)
        .target(env_logger::Target::Stderr)
        .init();

    let dataset = std::env::args()
        .nth(1)
        .context("Usage: hypermatch <dataset.json> [metric]")?;
    let metric = std::env::args()
        .nth(2)
        .unwrap_or_else(|| DEFAULT_METRIC.to_string());

    let store_config = StoreConfig::from_env();
    info!("Reading hypermodel configs from {:?}", store_config.config_dir);
    let store = JsonFileStore::from_config(&store_config);

    let hypermodel = select_best(&store, &metric)?;
    info!(
        "Using {} hypermodel with stages {:?}",
        hypermodel.kind(),
        hypermodel.pipeline().stage_names()
    );

    let cases = read_cases(&dataset)?;
    info!("Loaded {} cases from {}", cases.len(), dataset);

    let template = "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({eta}) - Matching routes";
    let pb = ProgressBar::new(cases.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(template)?
            .progress_chars("##-"),
    );

    let mut total = Confusion::default();
    for (i, case) in cases.iter().enumerate() {
        let label = case.label(i);
        let candidates = case.candidates.len();
        let (matched, route) = hypermodel.matches(case.candidates.clone(), case.route.clone());
        let confusion = Confusion::compare(&matched, &case.bound);
        if confusion.false_negatives > 0 {
            warn!(
                "{} missed {} confirmed segments",
                label, confusion.false_negatives
            );
        }
        total += confusion;

        let summary = MatchSummary {
            case: label,
            candidates,
            matched: matched.ids().into_iter().map(|id| id.0).collect(),
        };
        debug!("{}", serde_json::to_string(&summary)?);
        debug!("Matched GeoJSON: {}", candidates_to_geojson(&matched, &route));
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!(
        "{} cases: precision {:.3}, recall {:.3}, f1 {:.3}",
        cases.len(),
        total.precision(),
        total.recall(),
        total.f1()
    );
    Ok(())
}
