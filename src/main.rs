use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use warden_agents::{AgentClient, WaitOutcome};
use warden_core::{AgentGateway, OutputFormat, RepoSlug, Verdict, WardenConfig};
use warden_orchestrator::{AgentOutcome, Orchestrator, TickReport};
use warden_review::{GitHubClient, LlmClient, ReviewPipeline, ShellCheckRunner};
use warden_state::{Chain, ChainStore};

const CONFIG_FILE: &str = ".warden.toml";

#[derive(Parser)]
#[command(
    name = "warden",
    version,
    about = "Review-and-merge orchestrator for autonomous coding agents",
    long_about = "Warden watches your coding agents, reviews every branch they finish, and either\n\
                   opens a pull request or sends the agent back with feedback.\n\n\
                   Examples:\n  \
                     warden init                               Create a .warden.toml config file\n  \
                     warden run                                Start the review loop\n  \
                     warden run --once                         Review finished agents once and exit\n  \
                     warden review --repo acme/app --head feat/x  Review a single branch\n  \
                     warden chains                             Show recorded review chains\n  \
                     warden mcp                                Start the MCP server on stdio"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .warden.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable summaries (default)\n  \
                         json      Machine-readable JSON with camelCase keys\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Command {
    /// Run the orchestrator loop
    #[command(long_about = "Run the orchestrator loop.\n\n\
        Polls the agent API, reviews every finished agent exactly once, and opens a\n\
        pull request or sends feedback. State is kept in orchestrator.state_dir.\n\
        Ctrl-C finishes the current tick, flushes state, and exits.\n\n\
        Examples:\n  warden run\n  warden run --once --format json")]
    Run {
        /// Run a single tick and exit
        #[arg(long)]
        once: bool,
    },
    /// Review one branch without touching agents or state
    #[command(long_about = "Review one branch without touching agents or state.\n\n\
        Runs the automated checks (unless safe_mode is on), compares the branch with\n\
        its base, and asks the AI reviewer for a verdict.\n\n\
        Examples:\n  warden review --repo acme/app --head feat/login\n  warden review --repo https://github.com/acme/app --head fix/x --base develop")]
    Review {
        /// Repository as owner/repo or a GitHub URL
        #[arg(long)]
        repo: String,
        /// Branch to review
        #[arg(long)]
        head: String,
        /// Base branch (default: main)
        #[arg(long, default_value = "main")]
        base: String,
    },
    /// Show recorded review chains
    Chains,
    /// List coding agents
    Agents {
        /// Maximum agents to list (default: 20)
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Wait for an agent to finish
    #[command(long_about = "Wait for an agent to finish.\n\n\
        Polls the agent until it reaches FINISHED or ERROR. Exits with code 1 if\n\
        the timeout passes first.")]
    Wait {
        /// Agent id
        agent_id: String,
        /// Give up after this many seconds (default: 600)
        #[arg(long, default_value = "600")]
        timeout_secs: u64,
        /// Seconds between polls (default: 10)
        #[arg(long, default_value = "10")]
        interval_secs: u64,
    },
    /// Start the MCP server on stdio
    Mcp,
    /// Create a default .warden.toml configuration file
    #[command(long_about = "Create a default .warden.toml configuration file.\n\n\
        Generates a commented-out template with all available options.\n\
        Fails if .warden.toml already exists.")]
    Init,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

const DEFAULT_CONFIG: &str = r#"# Warden Configuration
# Secrets may be left unset here and provided through CURSOR_API_KEY,
# GITHUB_TOKEN (or GH_TOKEN), and XAI_API_KEY.

[orchestrator]
# poll_interval_ms = 15000
# max_review_iterations = 3
# page_size = 50
# max_pages = 20
# state_dir = "logs"
# auto_merge_on_approval = false
# issue_on_empty_diff = false

[review]
# safe_mode = true          # never clone or execute agent code
# checks_enabled = true     # publish a check run per review
# comments_enabled = true   # comment the verdict on the pull request

[checks]
# marker_file = "package.json"
# build = ["npm install", "npm run build"]
# test = ["npm test"]
# lint = ["npm run lint"]
# step_timeout_secs = 600

[llm]
# model = "grok-4"
# base_url = "https://api.x.ai"
# timeout_secs = 20

[agents]
# base_url = "https://api.cursor.com/v0"
# model = "grok-code-fast-1"
# target_branch = "agent/work"
# webhook_url = "https://example.com/hooks/agents"
# timeout_secs = 15

[github]
# base_url = "https://github.example.com/api/v3"
"#;

fn print_welcome(use_color: bool) {
    let version = env!("CARGO_PKG_VERSION");

    if use_color {
        println!("\x1b[1mwarden\x1b[0m v{version}: reviews what your coding agents ship\n");

        println!("Quick start:");
        println!("  \x1b[36mwarden init\x1b[0m        Create a .warden.toml config file");
        println!("  \x1b[36mwarden run\x1b[0m         Start the review loop\n");

        println!("All commands:");
        println!("  \x1b[32mrun\x1b[0m      Poll agents and review finished branches");
        println!("  \x1b[32mreview\x1b[0m   Review a single branch");
        println!("  \x1b[32mchains\x1b[0m   Show recorded review chains");
        println!("  \x1b[32magents\x1b[0m   List coding agents");
        println!("  \x1b[32mwait\x1b[0m     Wait for an agent to finish");
        println!("  \x1b[32mmcp\x1b[0m      Start MCP server for IDE integration");
        println!("  \x1b[32minit\x1b[0m     Create default configuration\n");
    } else {
        println!("warden v{version}: reviews what your coding agents ship\n");

        println!("Quick start:");
        println!("  warden init        Create a .warden.toml config file");
        println!("  warden run         Start the review loop\n");

        println!("All commands:");
        println!("  run      Poll agents and review finished branches");
        println!("  review   Review a single branch");
        println!("  chains   Show recorded review chains");
        println!("  agents   List coding agents");
        println!("  wait     Wait for an agent to finish");
        println!("  mcp      Start MCP server for IDE integration");
        println!("  init     Create default configuration\n");
    }

    println!("Run 'warden <command> --help' for details.");
}

fn load_config(path: Option<&Path>) -> Result<WardenConfig> {
    let config = match path {
        Some(path) => WardenConfig::from_file(path)?,
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                WardenConfig::from_file(default_path)?
            } else {
                WardenConfig::default()
            }
        }
    };
    let config = config.with_env_secrets();
    config.validate()?;
    Ok(config)
}

/// Install the global subscriber. Logs go to stderr so stdout stays clean for
/// command output and MCP stdio; `log_dir` adds a daily-rolling file.
fn init_tracing(verbose: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).into_diagnostic()?;
            let appender = tracing_appender::rolling::daily(dir, "warden.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(guard)
}

fn build_pipeline(config: &WardenConfig, repo: Arc<GitHubClient>) -> Result<ReviewPipeline> {
    let reviewer = LlmClient::new(&config.llm)?;
    let checks = ShellCheckRunner::new(config.checks.clone());
    Ok(ReviewPipeline::new(
        repo,
        Arc::new(reviewer),
        Arc::new(checks),
        config.review.safe_mode,
    ))
}

fn spinner(message: &'static str) -> Option<indicatif::ProgressBar> {
    if !std::io::stderr().is_terminal() {
        return None;
    }
    let pb = indicatif::ProgressBar::new_spinner();
    if let Ok(style) = indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    Some(pb)
}

fn mark(passed: bool) -> &'static str {
    if passed {
        "✅ Passed"
    } else {
        "❌ Failed"
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

fn print_verdict(verdict: &Verdict, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(verdict)?,
        OutputFormat::Markdown => {
            let heading = if verdict.approved {
                "✅ Approved"
            } else {
                "⚠️ Changes requested"
            };
            println!("## {heading}\n");
            println!("| Check | Result |\n|---|---|");
            println!("| Build | {} |", mark(verdict.checks.build));
            println!("| Tests | {} |", mark(verdict.checks.tests));
            println!("| Linting | {} |\n", mark(verdict.checks.lint));
            println!("**Severity:** {}  ", verdict.severity);
            println!("**Files changed:** {}\n", verdict.files_changed);
            println!("### Feedback\n\n{}", verdict.feedback);
        }
        OutputFormat::Text => {
            let heading = if verdict.approved {
                "approved"
            } else {
                "changes requested"
            };
            println!("Verdict: {heading} (severity: {})", verdict.severity);
            println!("Files changed: {}", verdict.files_changed);
            println!("Build: {}", mark(verdict.checks.build));
            println!("Tests: {}", mark(verdict.checks.tests));
            println!("Linting: {}", mark(verdict.checks.lint));
            if !verdict.feedback.is_empty() {
                println!("\n{}", verdict.feedback);
            }
        }
    }
    Ok(())
}

fn describe_outcome(outcome: &AgentOutcome) -> String {
    match outcome {
        AgentOutcome::Accepted {
            pr_url,
            forced,
            merged,
        } => {
            let how = if *forced { "accepted at revision limit" } else { "approved" };
            let merged = if *merged { ", merged" } else { "" };
            format!("{how}{merged}: {pr_url}")
        }
        AgentOutcome::FollowedUp => "feedback sent".to_string(),
        AgentOutcome::Relaunched { new_agent_id } => format!("relaunched as {new_agent_id}"),
        AgentOutcome::IssueOpened { issue_url } => format!("no changes, opened {issue_url}"),
    }
}

fn print_tick(report: &TickReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(report)?,
        OutputFormat::Markdown => {
            println!("## Tick\n");
            println!(
                "{} agents listed, {} already processed, {} running\n",
                report.listed, report.already_processed, report.running
            );
            for (id, outcome) in &report.outcomes {
                println!("- `{id}`: {}", describe_outcome(outcome));
            }
            for (id, error) in &report.failures {
                println!("- `{id}`: ❌ {error}");
            }
        }
        OutputFormat::Text => {
            println!(
                "{} agents listed, {} already processed, {} running",
                report.listed, report.already_processed, report.running
            );
            for (id, outcome) in &report.outcomes {
                println!("  {id}  {}", describe_outcome(outcome));
            }
            for (id, error) in &report.failures {
                println!("  {id}  failed: {error}");
            }
        }
    }
    Ok(())
}

fn print_chains(chains: &[Chain], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(&chains)?,
        OutputFormat::Markdown => {
            for chain in chains {
                println!("### {}\n", chain.original_id);
                if let Some(url) = &chain.final_pr_url {
                    println!("Pull request: {url}\n");
                }
                println!("| # | Agent | Branch | Status |\n|---|---|---|---|");
                for (i, it) in chain.iterations.iter().enumerate() {
                    println!("| {} | `{}` | `{}` | {} |", i + 1, it.agent_id, it.branch, it.status);
                }
                println!();
            }
        }
        OutputFormat::Text => {
            if chains.is_empty() {
                println!("No review chains recorded.");
            }
            for chain in chains {
                let pr = chain.final_pr_url.as_deref().unwrap_or("no pull request");
                println!(
                    "{} -> {} ({} iterations, {pr})",
                    chain.original_id,
                    chain.current_id,
                    chain.iteration_count()
                );
                for it in &chain.iterations {
                    println!("  {:<16} {:<40} {}", it.agent_id, it.branch, it.status);
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();

    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };

    let command = match cli.command {
        None => {
            print_welcome(use_color);
            return Ok(());
        }
        Some(Command::Init) => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!("{CONFIG_FILE} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
            return Ok(());
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "warden", &mut std::io::stdout());
            return Ok(());
        }
        Some(command) => command,
    };

    let config = load_config(cli.config.as_deref())?;
    let log_dir = matches!(command, Command::Run { .. }).then(|| config.orchestrator.state_dir.clone());
    let _guard = init_tracing(cli.verbose, log_dir.as_deref())?;

    match command {
        Command::Run { once } => {
            let agents = Arc::new(AgentClient::new(&config.agents)?);
            let repo = Arc::new(GitHubClient::new(&config.github)?);
            let pipeline = build_pipeline(&config, repo.clone())?;
            let mut orchestrator = Orchestrator::open(agents, repo, pipeline, &config)?;

            if once {
                let report = orchestrator.tick().await?;
                orchestrator.chains().flush()?;
                orchestrator.processed().flush()?;
                print_tick(&report, cli.format)?;
            } else {
                let (tx, rx) = tokio::sync::oneshot::channel::<()>();
                tokio::spawn(async move {
                    match tokio::signal::ctrl_c().await {
                        Ok(()) => {
                            tracing::info!("interrupt received, finishing current tick");
                            let _ = tx.send(());
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "cannot listen for Ctrl-C");
                            std::future::pending::<()>().await;
                        }
                    }
                });
                orchestrator
                    .run(async {
                        let _ = rx.await;
                    })
                    .await?;
            }
        }
        Command::Review { repo, head, base } => {
            let slug: RepoSlug = repo.parse()?;
            let github = Arc::new(GitHubClient::new(&config.github)?);
            let pipeline = build_pipeline(&config, github)?;

            let pb = spinner("Reviewing branch...");
            let verdict = pipeline.review(&slug, &head, &base).await.inspect_err(|_| {
                if let Some(pb) = &pb {
                    pb.finish_with_message("Failed");
                }
            })?;
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }

            print_verdict(&verdict, cli.format)?;
        }
        Command::Chains => {
            let store = ChainStore::open(config.orchestrator.chains_path())?;
            print_chains(&store.get_all_chains(), cli.format)?;
        }
        Command::Agents { limit } => {
            let client = AgentClient::new(&config.agents)?;
            let page = client.list_agents(limit.max(1), None).await?;
            match cli.format {
                OutputFormat::Json => print_json(&page)?,
                OutputFormat::Markdown => {
                    println!("| Agent | Status | Branch | Repository |\n|---|---|---|---|");
                    for agent in &page.agents {
                        println!(
                            "| `{}` | {} | `{}` | {} |",
                            agent.id,
                            agent.status,
                            agent.branch(),
                            agent.source.repository
                        );
                    }
                }
                OutputFormat::Text => {
                    for agent in &page.agents {
                        println!(
                            "{:<16} {:<9} {:<40} {}",
                            agent.id,
                            agent.status,
                            agent.branch(),
                            agent.source.repository
                        );
                    }
                    if page.agents.is_empty() {
                        println!("No agents.");
                    }
                }
            }
        }
        Command::Wait {
            agent_id,
            timeout_secs,
            interval_secs,
        } => {
            let client = AgentClient::new(&config.agents)?;
            let pb = spinner("Waiting for agent...");
            let outcome = warden_agents::wait_for_finish(
                &client,
                &agent_id,
                Duration::from_secs(timeout_secs),
                Duration::from_secs(interval_secs.max(1)),
            )
            .await;
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }

            match cli.format {
                OutputFormat::Json => print_json(&outcome)?,
                OutputFormat::Text | OutputFormat::Markdown => match &outcome {
                    WaitOutcome::Finished { agent } => {
                        println!("{} finished with status {} on {}", agent.id, agent.status, agent.branch());
                    }
                    WaitOutcome::TimedOut { last } => {
                        let status = last
                            .as_ref()
                            .map_or_else(|| "unknown".to_string(), |a| a.status.to_string());
                        println!("{agent_id} still {status} after {timeout_secs}s");
                    }
                },
            }
            if matches!(outcome, WaitOutcome::TimedOut { .. }) {
                std::process::exit(1);
            }
        }
        Command::Mcp => {
            warden_mcp::server::run_server(&config).await?;
        }
        Command::Init | Command::Completions { .. } => {}
    }

    Ok(())
}
