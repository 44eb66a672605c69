mod approve;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use trellis_agent::workflows::{chatbot, WorkflowDeps};
use trellis_agent::{
    CheckpointStore, Conversations, MemoryCheckpointStore, SqliteCheckpointStore, TurnReply,
};
use trellis_core::config::{AppConfig, CheckpointBackend};
use trellis_core::event::EventBus;
use trellis_core::types::{ConversationId, GraphEvent};
use trellis_tools::ToolRegistry;

use approve::ApprovalMode;

#[derive(Parser)]
#[command(name = "trellis", version, about = "Supervisor-routed assistant over a step graph")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "trellis.toml")]
    config: PathBuf,

    /// Conversation to continue (a new one is started if omitted)
    #[arg(long)]
    conversation: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive REPL mode
    Repl,
    /// Run a single prompt and exit
    Run {
        /// Accept pending query executions instead of rejecting them
        #[arg(long)]
        approve: bool,
        /// The prompt to send
        #[arg(trailing_var_arg = true)]
        prompt: Vec<String>,
    },
    /// Show current configuration
    Config,
    /// Discard a conversation's checkpoint
    Forget {
        /// Conversation ID
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("trellis=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    if let Some(Commands::Config) = &cli.command {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let store = open_store(&config)?;
    let event_bus = Arc::new(EventBus::default());

    if let Some(Commands::Forget { id }) = &cli.command {
        let id = ConversationId::from_str(id);
        if store.delete(&id).await? {
            println!("Forgot conversation {}", id);
        } else {
            println!("No checkpoint for conversation {}", id);
        }
        return Ok(());
    }

    let tools = Arc::new(ToolRegistry::with_domain_tools(&config.services)?);
    let deps = WorkflowDeps::from_config(&config, tools)?;
    let graph = Arc::new(chatbot::build(&deps)?);
    info!(
        graph = %graph.name(),
        model = %config.model.model_id,
        coder = %config.coder().model_id,
        checkpoint = ?config.checkpoint.backend,
        "Assistant ready"
    );

    let convs = Conversations::new(graph, store).with_events(event_bus.clone());
    let printer = tokio::spawn(print_events(event_bus.subscribe()));
    let conversation = cli.conversation.as_deref().map(ConversationId::from_str);

    match cli.command {
        Some(Commands::Run { approve, prompt }) => {
            let text = if prompt.is_empty() {
                io::stdin()
                    .lock()
                    .lines()
                    .map_while(|l| l.ok())
                    .collect::<Vec<_>>()
                    .join("\n")
            } else {
                prompt.join(" ")
            };
            let mode = if approve {
                ApprovalMode::AcceptAll
            } else {
                ApprovalMode::RejectAll
            };
            let (id, answer) = turn(&convs, conversation, &text, mode).await?;
            info!(conversation_id = %id, "Turn finished");
            println!("{}", answer);
        }
        Some(Commands::Config) | Some(Commands::Forget { .. }) => {}
        Some(Commands::Repl) | None => {
            run_repl(&convs, conversation).await?;
        }
    }

    printer.abort();
    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }
    let home_config = AppConfig::default_path();
    if home_config.exists() {
        info!(path = %home_config.display(), "Loading config from home directory");
        return Ok(AppConfig::load(&home_config)?);
    }
    info!("No config file found; using environment variables");
    Ok(AppConfig::from_env())
}

fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn CheckpointStore>> {
    Ok(match config.checkpoint.backend {
        CheckpointBackend::Memory => Arc::new(MemoryCheckpointStore::new()),
        CheckpointBackend::Sqlite => {
            let path = config.checkpoint.resolved_path();
            info!(path = %path.display(), "Opening checkpoint database");
            Arc::new(SqliteCheckpointStore::open(&path)?)
        }
    })
}

/// Token cancelled by Ctrl-C while a turn runs.
fn interruptible() -> (CancellationToken, tokio::task::JoinHandle<()>) {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };
    (cancel, watcher)
}

/// One user turn, settling every approval it raises.
async fn turn(
    convs: &Conversations,
    conversation: Option<ConversationId>,
    text: &str,
    mode: ApprovalMode,
) -> anyhow::Result<(ConversationId, String)> {
    let (cancel, watcher) = interruptible();
    let reply = convs.submit(conversation, text, cancel).await;
    watcher.abort();
    settle(convs, reply?, mode).await
}

async fn settle(
    convs: &Conversations,
    mut reply: TurnReply,
    mode: ApprovalMode,
) -> anyhow::Result<(ConversationId, String)> {
    loop {
        let (id, request) = match reply {
            TurnReply::Final {
                conversation_id,
                text,
            } => return Ok((conversation_id, text)),
            TurnReply::ApprovalRequired {
                conversation_id,
                request,
            } => (conversation_id, request),
        };

        let responses = mode.answer(&request).await?;
        let (cancel, watcher) = interruptible();
        let resumed = convs.resume(&id, responses, cancel).await;
        watcher.abort();

        reply = match resumed {
            Ok(next) => next,
            Err(e) if e.is_interrupt_violation() => {
                eprintln!("[approval rejected: {}]", e);
                TurnReply::ApprovalRequired {
                    conversation_id: id,
                    request,
                }
            }
            Err(e) => return Err(e.into()),
        };
    }
}

async fn run_repl(
    convs: &Conversations,
    mut conversation: Option<ConversationId>,
) -> anyhow::Result<()> {
    println!("Trellis v{}", env!("CARGO_PKG_VERSION"));
    println!("Type exit or quit to leave, /new for a new conversation.\n");

    // A conversation left waiting for approval is settled before new input.
    if let Some(id) = &conversation {
        if let Some(request) = convs.pending(id).await? {
            let reply = TurnReply::ApprovalRequired {
                conversation_id: id.clone(),
                request,
            };
            let (_, text) = settle(convs, reply, ApprovalMode::Interactive).await?;
            println!("{}\n", text);
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("You: ");
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim_end();
        if input.trim().is_empty() {
            continue;
        }

        match input.to_lowercase().as_str() {
            "exit" | "quit" => {
                println!("Chatbot을 종료합니다.");
                break;
            }
            "/new" => {
                conversation = None;
                println!("새로운 대화를 시작합니다.");
                println!("{}", "-".repeat(50));
                continue;
            }
            _ => {}
        }

        if conversation.is_none() {
            let id = convs.new_conversation().await?;
            println!("New conversation started. Conversation ID: {}", id);
            conversation = Some(id);
        }
        println!("{}", "-".repeat(50));

        match turn(convs, conversation.clone(), input, ApprovalMode::Interactive).await {
            Ok((id, text)) => {
                println!("\n{}", text);
                conversation = Some(id);
            }
            Err(e) => {
                error!(error = %e, "Turn failed");
                eprintln!("오류가 발생했습니다: {}", e);
            }
        }
        println!("{}", "-".repeat(50));
    }

    Ok(())
}

async fn print_events(mut rx: tokio::sync::broadcast::Receiver<GraphEvent>) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        };
        match event {
            GraphEvent::StepStarted { graph, step } => {
                eprintln!("[{}/{}]", graph, step);
            }
            GraphEvent::Reasoning { step, text } => {
                eprintln!("[thinking: {}] {}", step, truncate(&text, 400));
            }
            GraphEvent::Message { step, text } => {
                eprintln!("[{}] {}", step, truncate(&text, 400));
            }
            GraphEvent::ToolStart { name, args, .. } => {
                eprintln!("[tool: {}] {}", name, args);
            }
            GraphEvent::ToolEnd { name, result, .. } => {
                if result.is_error {
                    eprintln!("[{}: ERROR] {}", name, truncate(&result.content, 200));
                } else {
                    eprintln!("[{}: ok] {}", name, truncate(&result.content, 200));
                }
            }
            GraphEvent::ApprovalRequested { step, calls } => {
                eprintln!("[approval needed: {} call(s) at {}]", calls.len(), step);
            }
            GraphEvent::RunComplete { steps, .. } => {
                eprintln!("[done: {} steps]", steps);
            }
            GraphEvent::RunSuspended { step, .. } => {
                eprintln!("[waiting for approval at {}]", step);
            }
            GraphEvent::RunFailed { error } => {
                eprintln!("[error: {}]", error);
            }
            GraphEvent::StepFinished { .. } => {}
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
