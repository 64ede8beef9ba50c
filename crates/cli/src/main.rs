use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use regulacao_core::{
    build_repository, Actor, CoreConfig, IdentityProvider, NewRequest, PatientData,
    RepositoryBackend, Request, RequestFilter, RequestId, RequestLifecycleService, Role,
    StaticIdentity, Status, SystemClock, TransitionDetails, TypeSpecificData,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "regulacao")]
#[command(about = "Referral regulation CLI, operating on the file repository")]
struct Cli {
    /// Acting user id
    #[arg(long, global = true, default_value = "cli")]
    actor_id: String,
    /// Acting user display name (defaults to the id)
    #[arg(long, global = true)]
    actor_name: Option<String>,
    /// `ubs`, `regulador` or `admin`
    #[arg(long, global = true, default_value = "admin")]
    role: String,
    /// Unit name, required for `ubs`
    #[arg(long, global = true)]
    unit: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List requests visible to the actor
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long = "type")]
        request_type: Option<String>,
        /// Origin unit substring
        #[arg(long = "origin")]
        origin_unit: Option<String>,
        /// Patient name substring
        #[arg(long)]
        patient: Option<String>,
        /// Only requests assigned to (or owned by) the actor
        #[arg(long)]
        mine: bool,
    },
    /// Print one request as JSON
    Show {
        id: String,
    },
    /// Print the audit trail of a request
    History {
        id: String,
    },
    /// Create a request
    Create {
        /// Catalog id, e.g. `ressonancia`
        #[arg(long = "type")]
        request_type: String,
        /// Patient name
        #[arg(long)]
        name: String,
        /// Date of birth (YYYY-MM-DD)
        #[arg(long)]
        birth_date: String,
        #[arg(long, default_value = "")]
        health_card: String,
        /// Defaults to `--unit`
        #[arg(long)]
        origin_unit: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        /// Type-specific fields as a JSON object
        #[arg(long)]
        data: Option<String>,
        /// Keep as `rascunho` instead of sending
        #[arg(long)]
        draft: bool,
    },
    /// Move a request to another status
    Transition {
        id: String,
        /// Target status, e.g. `em_analise`
        target: String,
        #[arg(long)]
        justification: Option<String>,
        #[arg(long)]
        reason: Option<String>,
        #[arg(long)]
        observations: Option<String>,
    },
    /// Counts per status, type and category
    Summary,
    /// List the request types
    Catalog,
}

impl Cli {
    fn identity(&self) -> anyhow::Result<StaticIdentity> {
        let role: Role = self.role.parse()?;
        let name = self.actor_name.as_deref().unwrap_or(&self.actor_id);
        let actor = Actor::new(&self.actor_id, name, role, self.unit.as_deref())?;
        Ok(StaticIdentity::new(actor))
    }
}

/// The CLI always works on disk; an in-memory store would vanish with the process.
fn file_config() -> anyhow::Result<CoreConfig> {
    let env = CoreConfig::from_env()?;
    Ok(CoreConfig::new(
        RepositoryBackend::File,
        env.data_dir().to_path_buf(),
        env.repository_timeout(),
        env.lock_timeout(),
        env.default_page_size(),
    )?
    .with_date_offset(env.date_offset()))
}

fn parse_type_data(raw: Option<&str>) -> anyhow::Result<TypeSpecificData> {
    match raw {
        None => Ok(TypeSpecificData::new()),
        Some(raw) => serde_json::from_str(raw).context("--data must be a JSON object"),
    }
}

fn print_line(request: &Request) {
    println!(
        "{}  {:<11} {:<8} {:<14} {}  ({})",
        request.id,
        request.status,
        request.priority,
        request.request_type,
        request.patient_data.name,
        request.origin_unit()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("regulacao_core=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command.as_ref() else {
        println!("Use 'regulacao --help' for commands");
        return Ok(());
    };

    let actor = cli.identity()?.current_actor()?;
    let cfg = file_config()?;
    let service = RequestLifecycleService::new(build_repository(&cfg), Arc::new(SystemClock), &cfg);

    match command {
        Commands::List {
            status,
            request_type,
            origin_unit,
            patient,
            mine,
        } => {
            let filter = RequestFilter {
                status: status.as_deref().map(str::parse).transpose()?,
                request_type: request_type.as_deref().map(str::parse).transpose()?,
                unit_substring: origin_unit.clone(),
                patient_substring: patient.clone(),
                only_mine: *mine,
                ..RequestFilter::default()
            };
            let requests = service.query(&filter, &actor).await?;
            if requests.is_empty() {
                println!("No requests found.");
            }
            for request in &requests {
                print_line(request);
            }
        }
        Commands::Show { id } => {
            let request = service.get(RequestId::parse(id)?, &actor).await?;
            println!("{}", serde_json::to_string_pretty(&request)?);
        }
        Commands::History { id } => {
            for event in service.history(RequestId::parse(id)?, &actor).await? {
                let who = event.actor.as_ref().map(|a| a.name.as_str()).unwrap_or("-");
                println!("{}  {}  {}", event.timestamp.to_rfc3339(), who, event.message);
            }
        }
        Commands::Create {
            request_type,
            name,
            birth_date,
            health_card,
            origin_unit,
            priority,
            data,
            draft,
        } => {
            let birth_date = NaiveDate::parse_from_str(birth_date, "%Y-%m-%d")
                .context("--birth-date must be YYYY-MM-DD")?;
            let patient_data = PatientData {
                name: name.clone(),
                birth_date,
                health_card: health_card.clone(),
                cpf: None,
                address: String::new(),
                phone: String::new(),
                origin_unit: origin_unit.clone().unwrap_or_default(),
                origin_unit_code: None,
            };
            let new = NewRequest {
                request_type: request_type.parse()?,
                patient_data,
                type_specific_data: parse_type_data(data.as_deref())?,
                priority: priority.as_deref().map(str::parse).transpose()?,
                as_draft: *draft,
            };
            let created = service.create(new, &actor).await?;
            println!("Created request {} ({})", created.id, created.status);
        }
        Commands::Transition {
            id,
            target,
            justification,
            reason,
            observations,
        } => {
            let target: Status = target.parse()?;
            let details = TransitionDetails {
                justification: justification.clone(),
                reason: reason.clone(),
                observations: observations.clone(),
            };
            let updated = service
                .change_status(RequestId::parse(id)?, target, &actor, details)
                .await?;
            println!("Request {} is now {}", updated.id, updated.status);
        }
        Commands::Summary => {
            let summary = service.summary(&RequestFilter::default(), &actor).await?;
            println!("Total: {}", summary.total);
            for (status, count) in &summary.by_status {
                println!("  {status:<11} {count}");
            }
            for (request_type, count) in &summary.by_type {
                println!("  {request_type:<14} {count}");
            }
            for (category, count) in &summary.by_category {
                println!("  {category:<11} {count}");
            }
            println!("Average review time: {} days", summary.average_review_days);
        }
        Commands::Catalog => {
            for entry in service.catalog() {
                println!("{:<14} {:<12} {}", entry.id, entry.category.as_str(), entry.name);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn transition_flags_parse() {
        let cli = Cli::try_parse_from([
            "regulacao",
            "--role",
            "regulador",
            "--actor-id",
            "r-1",
            "transition",
            "0f8fad5bd9cb469fa16570867728950e",
            "negado",
            "--justification",
            "fora do protocolo",
        ])
        .unwrap();
        let identity = cli.identity().unwrap().current_actor().unwrap();
        assert_eq!(identity.role, Role::Reviewer);
        assert!(matches!(
            cli.command,
            Some(Commands::Transition { ref target, ref justification, .. })
                if target == "negado" && justification.as_deref() == Some("fora do protocolo")
        ));
    }

    #[test]
    fn unit_role_needs_unit_flag() {
        let cli = Cli::try_parse_from(["regulacao", "--role", "ubs", "summary"]).unwrap();
        assert!(cli.identity().is_err());
    }

    #[test]
    fn type_data_must_be_an_object() {
        assert!(parse_type_data(None).unwrap().is_empty());
        assert_eq!(
            parse_type_data(Some(r#"{"regiao": "joelho"}"#)).unwrap()["regiao"],
            "joelho"
        );
        assert!(parse_type_data(Some("[1, 2]")).is_err());
    }
}
