use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use autopa::config;
use autopa::db::{open_database, CaseStore, SqliteCaseStore};
use autopa::documents::{DocumentPolicySource, PdfiumRenderer};
use autopa::llm::{AzureOpenAiClient, LlmClient, ModelFamily};
use autopa::pipeline::{CaseRequest, PaProcessingPipeline, ServiceContext};
use autopa::search::AzureSearchClient;
use autopa::settings::{PipelineSettings, ServiceSettings};
use autopa::storage::LocalArtifactStore;

#[derive(Parser)]
#[command(name = "autopa")]
#[command(version, about = "Prior-authorization case processing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one case from its uploaded documents
    Process {
        /// PDF or image files making up the case
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Case id (generated when omitted)
        #[arg(long)]
        case_id: Option<String>,
        /// Try the reasoning model first for the determination
        #[arg(long)]
        use_reasoning_model: bool,
        /// YAML pipeline settings
        #[arg(long)]
        settings: Option<PathBuf>,
    },
    /// Print a stored case bundle
    Show {
        case_id: String,
    },
    /// List stored cases
    List,
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn open_case_store() -> CliResult<SqliteCaseStore> {
    let conn = open_database(&config::case_database_path())?;
    Ok(SqliteCaseStore::new(conn))
}

fn build_context(settings: PipelineSettings) -> CliResult<ServiceContext> {
    let services = ServiceSettings::from_env()?;

    let llm: Arc<dyn LlmClient> = Arc::new(AzureOpenAiClient::new(services.chat, ModelFamily::Chat)?);
    let reasoning_llm = match services.reasoning {
        Some(deployment) => Some(
            Arc::new(AzureOpenAiClient::new(deployment, ModelFamily::Reasoning)?) as Arc<dyn LlmClient>,
        ),
        None => None,
    };
    let renderer = Arc::new(PdfiumRenderer::new()?);

    Ok(ServiceContext {
        llm,
        reasoning_llm,
        search: Arc::new(AzureSearchClient::new(services.search)?),
        policies: Arc::new(DocumentPolicySource::new(renderer.clone())?),
        renderer,
        artifacts: Arc::new(LocalArtifactStore::new(config::artifacts_dir())),
        cases: Arc::new(open_case_store()?),
        settings: Arc::new(settings),
    })
}

async fn process(
    files: Vec<PathBuf>,
    case_id: Option<String>,
    use_reasoning_model: bool,
    settings_path: Option<PathBuf>,
) -> CliResult<bool> {
    let settings = match settings_path {
        Some(path) => PipelineSettings::from_yaml_file(&path)?,
        None => PipelineSettings::default(),
    };
    let pipeline = PaProcessingPipeline::new(build_context(settings)?);

    let mut request = CaseRequest::new(files).with_reasoning_model(use_reasoning_model);
    if let Some(id) = case_id {
        request = request.with_case_id(id);
    }

    let report = pipeline.run(request).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report.is_success())
}

fn show(case_id: &str) -> CliResult<bool> {
    match open_case_store()?.get(case_id)? {
        Some(bundle) => {
            println!("{}", serde_json::to_string_pretty(&bundle)?);
            Ok(true)
        }
        None => {
            eprintln!("No case found with id {case_id}");
            Ok(false)
        }
    }
}

fn list() -> CliResult<bool> {
    let cases = open_case_store()?.list()?;
    if cases.is_empty() {
        println!("No cases found.");
    }
    for case in cases {
        let stage = case.failed_stage.map(|s| s.as_str()).unwrap_or("-");
        println!(
            "{}  {:<9}  {:<13}  {}",
            case.case_id,
            case.status.as_str(),
            stage,
            case.updated_at.to_rfc3339()
        );
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    autopa::init_tracing();
    let cli = Cli::parse();

    tracing::debug!("{} v{}", config::APP_NAME, config::APP_VERSION);

    let result = match cli.command {
        Commands::Process {
            files,
            case_id,
            use_reasoning_model,
            settings,
        } => process(files, case_id, use_reasoning_model, settings).await,
        Commands::Show { case_id } => show(&case_id),
        Commands::List => list(),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "autopa failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
