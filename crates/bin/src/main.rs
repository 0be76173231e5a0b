//! xqdata CLI binary.
//!
//! Manages a local attribute store and queries factor data from any backend.
//! Tables are written to stdout as CSV; logs go to stderr and follow
//! `RUST_LOG` (default `warn`).

mod integration;

use clap::{Args, Parser, Subcommand};
use integration::output::write_csv;
use integration::parse::parse_filter;
use integration::store_path::resolve_store_path;
use polars::prelude::DataFrame;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;
use xqdata::{
    AttributeCatalog, ClientConfig, ColumnType, Credentials, DataApi, DataError, FactorRequest,
    Fetched, Filter, Frequency, MockDataApi, NewAttribute, NewObject, StoreDataApi, TimeRange,
};

#[derive(Parser)]
#[command(name = "xqdata")]
#[command(about = "xqdata: factor data store and query tool", long_about = None)]
#[command(version)]
struct Cli {
    /// Store database file (`:memory:` for a throwaway store)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// JSON client configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend for `factor` and `info` (mock or store)
    #[arg(long, global = true)]
    backend: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the catalog database and table
    Init,

    /// List catalog rows
    Catalog {
        /// Only rows of this entity type
        #[arg(long = "type")]
        entity_type: Option<String>,
    },

    /// Register an attribute in the catalog
    AddAttribute {
        /// Entity type, e.g. `stock`
        entity_type: String,

        /// Attribute name
        attribute: String,

        /// Value dtype
        #[arg(long, default_value = "DOUBLE")]
        dtype: String,

        /// Human-readable name
        #[arg(long)]
        name: Option<String>,

        /// Data frequency
        #[arg(long, default_value = "D")]
        frequency: String,

        /// Entity key dtype
        #[arg(long, default_value = "SYMBOL")]
        code_dtype: String,

        /// Secondary key dtype, makes the attribute dual-key
        #[arg(long)]
        obj_dtype: Option<String>,
    },

    /// Provision storage tables for an entity type
    AddObject {
        /// Entity type
        name: String,

        /// Frequencies, comma separated
        #[arg(long, value_delimiter = ',', default_value = "D")]
        frequencies: Vec<String>,

        /// Value dtypes, comma separated
        #[arg(long, value_delimiter = ',', default_value = "DOUBLE")]
        dtypes: Vec<String>,

        /// Entity key dtype
        #[arg(long, default_value = "SYMBOL")]
        code_dtype: String,

        /// Secondary key dtype for dual-key tables
        #[arg(long)]
        obj_dtype: Option<String>,
    },

    /// Query factors
    Factor {
        #[command(flatten)]
        query: QueryArgs,

        /// Long layout (`attribute`, `value` columns) instead of a panel
        #[arg(long)]
        long: bool,

        /// Dual-key factors indexed by `datetime, code, object`
        #[arg(long)]
        dual: bool,
    },

    /// Query reference data
    Info {
        /// Info type, e.g. `stock`
        info_type: String,

        /// Row filter: `field=value`, `field=a,b`, `field>value` or `field<value`
        #[arg(long = "filter")]
        filters: Vec<String>,
    },

    /// Generate factors with the mock backend and write them into the store
    SyncMock {
        /// Entity type to write under
        entity_type: String,

        #[command(flatten)]
        query: QueryArgs,

        /// Register missing attributes as `DOUBLE` before writing
        #[arg(long)]
        register: bool,

        /// Override the mock seed
        #[arg(long)]
        seed: Option<u64>,
    },
}

/// Factor selection shared by `factor` and `sync-mock`.
#[derive(Args)]
struct QueryArgs {
    /// Factors, comma separated
    #[arg(required = true, value_delimiter = ',')]
    factors: Vec<String>,

    /// Entity codes, comma separated
    #[arg(long, value_delimiter = ',')]
    codes: Vec<String>,

    /// Start time, `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`
    #[arg(long)]
    start: Option<String>,

    /// End time
    #[arg(long)]
    end: Option<String>,

    /// Data frequency (D, B, W, ME, min, tick)
    #[arg(long, default_value = "D")]
    frequency: String,

    /// Secondary keys of dual-key factors, comma separated
    #[arg(long, value_delimiter = ',')]
    objects: Option<Vec<String>>,
}

impl QueryArgs {
    fn request(&self) -> Result<FactorRequest, DataError> {
        let frequency: Frequency = self.frequency.parse()?;
        let range = TimeRange::parse(self.start.as_deref(), self.end.as_deref())?;
        let request = FactorRequest::new(self.factors.iter().cloned(), self.codes.iter().cloned())
            .with_range(range)
            .with_frequency(frequency);
        Ok(match &self.objects {
            Some(objects) => request.with_objects(objects.iter().cloned()),
            None => request,
        })
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default().with_backend("store"),
    };
    if let Some(backend) = &cli.backend {
        config = config.with_backend(backend);
    }
    let db = cli.db.as_deref();

    match cli.command {
        Commands::Init => {
            let store = open_store(db, &config)?;
            store.init_db()?;
            println!("initialized {}", store_label(&store));
        }
        Commands::Catalog { entity_type } => {
            let store = open_store(db, &config)?;
            let catalog = store.catalog()?;
            let rows: Vec<_> = catalog
                .rows()
                .iter()
                .filter(|r| entity_type.as_deref().is_none_or(|t| r.entity_type == t))
                .cloned()
                .collect();
            print_table(&AttributeCatalog::to_frame(&rows)?)?;
        }
        Commands::AddAttribute {
            entity_type,
            attribute,
            dtype,
            name,
            frequency,
            code_dtype,
            obj_dtype,
        } => {
            let mut new = NewAttribute::new(entity_type, attribute, dtype.parse::<ColumnType>()?)
                .with_frequency(frequency.parse()?)
                .with_code_dtype(code_dtype.parse()?);
            if let Some(name) = name {
                new = new.with_name(name);
            }
            if let Some(obj_dtype) = obj_dtype {
                new = new.with_obj_dtype(obj_dtype.parse()?);
            }
            let store = open_store(db, &config)?;
            let descriptor = store.add_attribute(&new)?;
            println!("{} -> {}", descriptor.attribute, descriptor.location());
        }
        Commands::AddObject {
            name,
            frequencies,
            dtypes,
            code_dtype,
            obj_dtype,
        } => {
            let object = NewObject {
                name,
                frequencies: frequencies
                    .iter()
                    .map(|f| f.parse::<Frequency>())
                    .collect::<Result<_, _>>()?,
                code_dtype: code_dtype.parse()?,
                dtypes: dtypes
                    .iter()
                    .map(|d| d.parse::<ColumnType>())
                    .collect::<Result<_, _>>()?,
                obj_dtype: obj_dtype
                    .as_deref()
                    .map(str::parse::<ColumnType>)
                    .transpose()?,
            };
            let store = open_store(db, &config)?;
            for location in store.add_object(&object)? {
                println!("{location}");
            }
        }
        Commands::Factor { query, long, dual } => {
            let request = query.request()?.with_panel(!long);
            let api = open_backend(db, &config)?;
            let fetched = if dual || request.objects.is_some() {
                api.get_dualkey_factor(&request)?
            } else {
                api.get_factor(&request)?
            };
            print_fetched(fetched)?;
        }
        Commands::Info { info_type, filters } => {
            let filters = filters
                .iter()
                .map(|raw| parse_filter(raw))
                .collect::<Result<Vec<Filter>, _>>()?;
            let api = open_backend(db, &config)?;
            print_fetched(api.get_info(&info_type, &filters)?)?;
        }
        Commands::SyncMock {
            entity_type,
            query,
            register,
            seed,
        } => {
            let request = query.request()?;
            let store = open_store(db, &config)?;
            if register {
                register_missing(&store, &entity_type, &request)?;
            }

            let mut mock_config = config.mock.clone();
            if let Some(seed) = seed {
                mock_config.seed = seed;
            }
            let mock = MockDataApi::new(mock_config);
            let synced = store.sync_data(&mock, &entity_type, &request)?;
            if synced.data {
                println!("synced {} into {}", request.factors.join(","), store_label(&store));
            } else {
                println!("nothing to sync");
            }
            report(&synced.diagnostics);
        }
    }

    Ok(())
}

/// Connect to the store selected by `--db`, the config file or the default path.
fn open_store(db: Option<&Path>, config: &ClientConfig) -> Result<StoreDataApi, DataError> {
    let mut store_config = config.store.clone();
    store_config.path = Some(resolve_store_path(db, &config.store)?);
    let mut store = StoreDataApi::new(store_config);
    store.auth(&Credentials::new())?;
    Ok(store)
}

/// Connect to the configured query backend.
fn open_backend(db: Option<&Path>, config: &ClientConfig) -> Result<Box<dyn DataApi>, DataError> {
    if config.backend == "store" {
        return Ok(Box::new(open_store(db, config)?));
    }
    let mut api = config.clone().build();
    api.auth(&Credentials::new())?;
    Ok(api)
}

/// Register every requested factor the catalog does not know yet.
fn register_missing(
    store: &StoreDataApi,
    entity_type: &str,
    request: &FactorRequest,
) -> Result<(), DataError> {
    let catalog = store.catalog()?;
    for factor in &request.factors {
        if !catalog.lookup(entity_type, request.frequency, factor).is_empty() {
            continue;
        }
        let mut new = NewAttribute::new(entity_type, factor.as_str(), ColumnType::Double)
            .with_frequency(request.frequency);
        if request.objects.is_some() {
            new = new.with_obj_dtype(ColumnType::Symbol);
        }
        store.add_attribute(&new)?;
    }
    Ok(())
}

fn store_label(store: &StoreDataApi) -> String {
    store
        .config()
        .path
        .as_ref()
        .map_or_else(|| ":memory:".to_string(), |p| p.display().to_string())
}

fn print_table(df: &DataFrame) -> Result<(), Box<dyn std::error::Error>> {
    write_csv(df, std::io::stdout().lock())
}

fn print_fetched(fetched: Fetched<DataFrame>) -> Result<(), Box<dyn std::error::Error>> {
    print_table(&fetched.data)?;
    report(&fetched.diagnostics);
    Ok(())
}

fn report(diagnostics: &[xqdata::Diagnostic]) {
    if !diagnostics.is_empty() {
        tracing::info!(count = diagnostics.len(), "request completed with diagnostics");
    }
}
