use chargemap::clients::acs::CensusApiClient;
use chargemap::clients::stations::{StationApiClient, StationQuery};
use chargemap::config::AppConfig;
use chargemap::join::AttributeJoiner;
use chargemap::types::Crs;
use chargemap::{aggregate, classify, output, points, regions, stats};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch stations and tracts, join them, and export classified regions
    Run {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Read point records from a CSV snapshot instead of the live API
        #[arg(long, value_name = "FILE")]
        points_csv: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Run { config, points_csv } => {
            println!("Running pipeline with config: {:?}", config);
            run(config, points_csv.as_deref()).await?;
        }
    }

    Ok(())
}

async fn run(config_path: &Path, points_csv: Option<&Path>) -> anyhow::Result<()> {
    let config = AppConfig::load_from_file(config_path)?;
    let crs = Crs::new(&config.fetch.crs);

    // 1. Pull raw records from the external collaborators
    let raw_points = match points_csv {
        Some(path) => {
            println!("Reading point snapshot from {:?}", path);
            points::read_points_csv(path)?
        }
        None => {
            let client =
                StationApiClient::new(&config.api.station_key, config.api.station_base_url.clone())?;
            client
                .fetch(&StationQuery {
                    state: config.fetch.state_abbr.clone(),
                    fuel_type: config.fetch.fuel_type.clone(),
                    status: config.fetch.status.clone(),
                    access: config.fetch.access.clone(),
                })
                .await?
        }
    };
    println!("Fetched {} raw point records", raw_points.len());

    let census = CensusApiClient::new(
        config.api.census_key.clone(),
        config.api.census_data_url.clone(),
        config.api.census_geometry_url.clone(),
    )?;
    let raw_polygons = census
        .fetch(&config.fetch.state, &config.fetch.county, &config.fetch.variables)
        .await?;
    println!("Fetched {} raw polygon records", raw_polygons.len());

    // 2. Load and validate
    let point_features = points::load_points(&raw_points, &config.fetch.filters, &crs)?;
    let region_features = regions::load_regions(raw_polygons, &config.fetch.derived, &crs)?;

    // 3. Spatial join
    let counts = aggregate::aggregate(&point_features, &region_features)?;
    let joiner = AttributeJoiner::new(
        &config.join.required_attribute,
        &config.fetch.derived,
        &config.fetch.variables,
    )?;
    let joined = joiner.join(region_features, &counts);
    println!("Joined {} regions", joined.len());

    // 4. Summary statistics
    for summary in stats::summarize_by_presence(&joined, &config.join.required_attribute) {
        println!("{}", summary);
    }

    // 5. Classify and export
    let classified = classify::classify(
        joined,
        &config.classify.x_field,
        &config.classify.y_field,
        config.classify.k,
    )?;
    output::write_geojson(
        &config.output.geojson,
        &classified,
        &config.classify.x_field,
        &config.classify.y_field,
    )?;
    println!(
        "Wrote {} classified regions to {:?}",
        classified.len(),
        config.output.geojson
    );

    Ok(())
}
