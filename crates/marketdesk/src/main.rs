use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use marketdesk::client::{
    guarded, parse_variable_list, AgentSelection, AnalysisDraft, AnalysisState, Notice,
    NoticeLevel, TemplateService,
};
use marketdesk::models::{AgentType, Market, TemplateUpdate};
use marketdesk::Desk;
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "marketdesk", about = "Multi-agent market analysis client")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/marketdesk.toml")]
    config: PathBuf,

    /// Use the in-memory orchestrator instead of the HTTP service
    #[arg(long)]
    offline: bool,

    /// Pretty-print the output JSON
    #[arg(long)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage prompt templates
    Templates {
        #[command(subcommand)]
        command: TemplateCommand,
    },
    /// Manage template sets
    Sets {
        #[command(subcommand)]
        command: SetCommand,
    },
    /// Show the resolved agent order for a selection
    Selection(SelectionArgs),
    /// Submit an analysis
    Analyze(AnalyzeArgs),
    /// List past analyses
    History,
    /// Fetch the current result of a task
    Result { task_id: String },
}

#[derive(Subcommand, Debug)]
enum TemplateCommand {
    List {
        /// Only templates for this agent type
        #[arg(long)]
        agent: Option<AgentType>,
    },
    Show {
        id: String,
    },
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        agent: AgentType,
        #[arg(long)]
        content: String,
        /// Comma-separated variable names
        #[arg(long, default_value = "")]
        variables: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        content: Option<String>,
        /// Comma-separated variable names
        #[arg(long)]
        variables: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum SetCommand {
    List,
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// `agent_type=template_id`, repeatable
        #[arg(long = "template", value_parser = parse_assignment)]
        templates: Vec<(AgentType, String)>,
        /// Use the default template for every agent type not given explicitly
        #[arg(long)]
        fill_defaults: bool,
    },
    Apply {
        id: String,
    },
}

#[derive(Args, Debug)]
struct SelectionArgs {
    /// Optional analyst to include (news_analyst, social_analyst); repeatable
    #[arg(long = "with", value_name = "AGENT")]
    with: Vec<AgentType>,

    /// Enable the bull/bear research debate
    #[arg(long)]
    research: bool,

    /// Enable the risk debate
    #[arg(long)]
    risk: bool,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    ticker: String,

    /// china, hk or us
    #[arg(long, default_value = "china")]
    market: Market,

    /// Trade date (YYYY-MM-DD)
    #[arg(long)]
    date: Option<NaiveDate>,

    #[arg(long)]
    template_set: Option<String>,

    /// Free-text question for the agents
    #[arg(long)]
    query: Option<String>,

    #[command(flatten)]
    selection: SelectionArgs,

    /// Poll until the analysis finishes
    #[arg(long)]
    wait: bool,
}

fn parse_assignment(raw: &str) -> Result<(AgentType, String), String> {
    let (agent, id) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected agent_type=template_id, got {raw:?}"))?;
    let agent: AgentType = agent.parse().map_err(|e| format!("{e}"))?;
    let id = id.trim();
    if id.is_empty() {
        return Err(format!("missing template id for {agent}"));
    }
    Ok((agent, id.to_string()))
}

struct Output {
    pretty: bool,
}

impl Output {
    fn print<T: Serialize>(&self, value: &T) -> Result<()> {
        let output = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        println!("{output}");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<Notice>() {
                Some(notice) => eprintln!("{notice}"),
                None => eprintln!("Error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = marketdesk::load_config(&cli.config)?;
    let desk = Desk::from_config(config, cli.offline)?;
    let out = Output { pretty: cli.pretty };

    match cli.command {
        Command::Templates { command } => run_templates(&desk, command, &out).await,
        Command::Sets { command } => run_sets(&desk, command, &out).await,
        Command::Selection(args) => {
            let selection = build_selection(&desk, &args)?;
            out.print(&json!({
                "agents": selection.agents(),
                "count": selection.len(),
            }))
        }
        Command::Analyze(args) => run_analyze(&desk, args, &out).await,
        Command::History => {
            let session = desk.session();
            let history = guarded("history", session.history()).await?;
            out.print(&history)
        }
        Command::Result { task_id } => {
            let session = desk.session();
            let result = guarded("result", session.result(&task_id)).await?;
            out.print(&result)
        }
    }
}

async fn run_templates(desk: &Desk, command: TemplateCommand, out: &Output) -> Result<()> {
    let service = desk.templates();
    match command {
        TemplateCommand::List { agent } => {
            let templates = guarded("list templates", service.list_templates(agent)).await?;
            out.print(&templates)
        }
        TemplateCommand::Show { id } => {
            let template = guarded("show template", service.get_template(&id)).await?;
            let report = TemplateService::variable_report(&template);
            out.print(&json!({
                "template": template,
                "undeclared_variables": report.undeclared,
                "unused_variables": report.unused,
            }))
        }
        TemplateCommand::Create {
            name,
            agent,
            content,
            variables,
            description,
        } => {
            let created = guarded(
                "create template",
                service.create_template(&name, agent, &content, &variables, &description),
            )
            .await?;
            out.print(&created)
        }
        TemplateCommand::Update {
            id,
            name,
            content,
            variables,
            description,
        } => {
            let update = TemplateUpdate {
                name,
                content,
                variables: variables.as_deref().map(parse_variable_list),
                description,
            };
            let updated = guarded("update template", service.update_template(&id, &update)).await?;
            out.print(&updated)
        }
        TemplateCommand::Delete { id } => {
            guarded("delete template", service.delete_template(&id)).await?;
            out.print(&json!({ "deleted": id }))
        }
    }
}

async fn run_sets(desk: &Desk, command: SetCommand, out: &Output) -> Result<()> {
    let service = desk.templates();
    match command {
        SetCommand::List => {
            let sets = guarded("list template sets", service.list_template_sets()).await?;
            out.print(&sets)
        }
        SetCommand::Create {
            name,
            description,
            templates,
            fill_defaults,
        } => {
            let mut ids: BTreeMap<AgentType, String> = templates.into_iter().collect();
            if fill_defaults {
                let all = guarded("list templates", service.list_templates(None)).await?;
                for template in all.into_iter().filter(|t| t.is_default) {
                    ids.entry(template.agent_type).or_insert(template.id);
                }
            }
            let created = guarded(
                "create template set",
                service.create_template_set(&name, &description, ids),
            )
            .await?;
            out.print(&created)
        }
        SetCommand::Apply { id } => {
            let applied = guarded("apply template set", service.apply_template_set(&id)).await?;
            out.print(&applied)
        }
    }
}

fn build_selection(desk: &Desk, args: &SelectionArgs) -> Result<AgentSelection> {
    let mut selection = desk.default_selection().map_err(Notice::from)?;
    for agent in &args.with {
        if !selection.optional().contains(agent) {
            selection.toggle_optional(*agent).map_err(Notice::from)?;
        }
    }
    if args.research {
        selection.set_research_pair(true);
    }
    if args.risk {
        selection.set_risk_pair(true);
    }
    Ok(selection)
}

async fn run_analyze(desk: &Desk, args: AnalyzeArgs, out: &Output) -> Result<()> {
    let selection = build_selection(desk, &args.selection)?;
    let mut draft = AnalysisDraft::new(args.ticker, args.market, selection);
    draft.trade_date = args.date;
    draft.template_set_id = args.template_set;
    draft.query = args.query;

    let session = desk.session();
    let task_id = guarded("submit analysis", session.submit(&draft)).await?;

    if !args.wait {
        return out.print(&json!({ "task_id": task_id, "state": session.state().name() }));
    }

    let mut states = session.subscribe();
    let reporter = tokio::spawn(async move {
        let mut last = None;
        while states.changed().await.is_ok() {
            let progress = match &*states.borrow_and_update() {
                AnalysisState::Running { progress, .. } => *progress,
                _ => continue,
            };
            if last != Some(progress) {
                eprintln!("progress: {progress}%");
                last = Some(progress);
            }
        }
    });

    let outcome = tokio::select! {
        followed = guarded("follow analysis", session.follow()) => followed,
        _ = tokio::signal::ctrl_c() => {
            session.abandon().await;
            Ok(None)
        }
    };
    reporter.abort();

    match outcome? {
        Some(result) if result.is_failed() => {
            out.print(&result)?;
            Err(Notice {
                level: NoticeLevel::Error,
                title: "Analysis failed".to_string(),
                message: result
                    .error
                    .unwrap_or_else(|| format!("task {task_id} failed")),
            }
            .into())
        }
        Some(result) => out.print(&result),
        None => {
            eprintln!(
                "{}",
                Notice::info(
                    "Stopped following",
                    format!("task {task_id} keeps running on the orchestrator")
                )
            );
            out.print(&json!({ "task_id": task_id, "state": session.state().name() }))
        }
    }
}
