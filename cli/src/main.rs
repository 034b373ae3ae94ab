mod display;
mod logging;

use analyst::{
    AnalystApi, CachedWarehouse, Client, CortexClient, SqlApiWarehouse, StatementContext, Warehouse,
};
use analyst_core::{
    resolve_user_id, AnalystEngine, AnalystSession, AuditSink, CompleteSummarizer, EndpointSummarizer,
    EngineCommand, EngineEvent, NoopAuditSink, RenderItem, RenderedMessage, SqlPipeline, SqliteAuditSink,
    Summarizer, WarehouseAuditSink,
};
use anyhow::Context;
use clap::Parser;
use config::{load_env_file, AuditBackend, PathManager, Settings, SummarizerKind};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Chat with your warehouse data through Cortex Analyst", long_about = None)]
struct Args {
    /// Account base URL, e.g. https://myorg-myaccount.snowflakecomputing.com
    #[arg(long, env = "SNOWFLAKE_ACCOUNT_URL")]
    account_url: Option<String>,

    /// Bearer token for the REST APIs
    #[arg(long, env = "SNOWFLAKE_TOKEN", hide_env_values = true)]
    token: String,

    /// Token type header, e.g. KEYPAIR_JWT or PROGRAMMATIC_ACCESS_TOKEN
    #[arg(long, env = "SNOWFLAKE_TOKEN_TYPE")]
    token_type: Option<String>,

    /// Semantic model stage path; repeat to offer several (overrides settings.toml)
    #[arg(long = "semantic-model")]
    semantic_models: Vec<String>,

    /// User id stamped on audit records
    #[arg(long)]
    user: Option<String>,

    /// Verbose logging to the log file
    #[arg(long, short)]
    tracing: bool,
}

/// Wire the remote clients, warehouse, summarizer and audit sink into a session
async fn build_session(args: &Args, settings: &Settings) -> anyhow::Result<AnalystSession> {
    let account_url = args
        .account_url
        .clone()
        .or_else(|| settings.account_url.clone())
        .context("no account URL: pass --account-url, set SNOWFLAKE_ACCOUNT_URL or account_url in settings.toml")?;
    let client = Client::with_token(&account_url, &args.token, args.token_type.as_deref())?;

    let context = StatementContext {
        warehouse: settings.warehouse.clone(),
        database: settings.database.clone(),
        schema: settings.schema.clone(),
        role: settings.role.clone(),
    };
    let sql_api = SqlApiWarehouse::new(
        client.clone(),
        context,
        Duration::from_secs(settings.statement_timeout_secs),
    );
    let uncached: Arc<dyn Warehouse> = Arc::new(sql_api.clone());
    let cached: Arc<dyn Warehouse> = Arc::new(CachedWarehouse::new(sql_api));
    let api: Arc<dyn AnalystApi> = Arc::new(CortexClient::new(client));

    let summarizer: Arc<dyn Summarizer> = match settings.summarizer {
        SummarizerKind::Complete => Arc::new(CompleteSummarizer::new(
            cached.clone(),
            settings.completion_model.clone(),
        )),
        SummarizerKind::Endpoint => Arc::new(EndpointSummarizer::new(api.clone())),
    };

    let audit: Arc<dyn AuditSink> = match settings.audit {
        AuditBackend::Warehouse => Arc::new(WarehouseAuditSink::new(
            uncached.clone(),
            settings.audit_tables.query_log.clone(),
            settings.audit_tables.feedback.clone(),
        )),
        AuditBackend::Sqlite => {
            PathManager::ensure_dirs_exist()?;
            let path = PathManager::audit_db_path().context("could not determine audit database path")?;
            Arc::new(SqliteAuditSink::open(path)?)
        }
        AuditBackend::None => Arc::new(NoopAuditSink),
    };

    let models = if args.semantic_models.is_empty() {
        settings.semantic_models.clone()
    } else {
        args.semantic_models.clone()
    };

    let configured_user = args.user.as_deref().or(settings.user_id.as_deref());
    let user_id = resolve_user_id(configured_user, uncached.as_ref()).await;
    tracing::info!(user = %user_id, "resolved user");

    let pipeline = SqlPipeline::new(cached, summarizer);
    let mut session = AnalystSession::new(api, pipeline, audit, models)?;
    session.set_user_id(user_id);
    Ok(session)
}

/// Print engine events until the current command finishes
async fn drain_until_idle(engine: &mut AnalystEngine, suggestions: &mut Vec<(usize, usize)>) {
    while let Some(event) = engine.next_event().await {
        match event {
            EngineEvent::Rendered(messages) => {
                for message in &messages {
                    display::print_message(message);
                }
                collect_suggestions(&messages, suggestions);
            }
            EngineEvent::Notification(notification) => display::print_notification(&notification),
            EngineEvent::Warning(warning) => display::print_warning(&warning),
            EngineEvent::Feedback { request_id, outcome } => {
                display::print_feedback_outcome(&request_id, &outcome)
            }
            EngineEvent::Error(message) => eprintln!("Error: {}", message),
            EngineEvent::ModelChanged(path) => {
                suggestions.clear();
                println!("Switched to {} (conversation reset)", Settings::model_label(&path));
                println!();
            }
            EngineEvent::HistoryCleared => {
                suggestions.clear();
                println!("Conversation history cleared.");
                println!();
            }
            EngineEvent::Idle => break,
        }
    }
}

/// Remember the suggestions of the latest message that offers any, as
/// `(message_index, option)` pairs in display order
fn collect_suggestions(messages: &[RenderedMessage], suggestions: &mut Vec<(usize, usize)>) {
    for message in messages {
        let offered: Vec<(usize, usize)> = message
            .items
            .iter()
            .filter_map(|item| match item {
                RenderItem::Suggestions {
                    message_index,
                    first_option,
                    options,
                } => Some((*message_index, *first_option, options.len())),
                _ => None,
            })
            .flat_map(|(message_index, first, len)| (first..first + len).map(move |i| (message_index, i)))
            .collect();
        if !offered.is_empty() {
            *suggestions = offered;
        }
    }
}

// Slash command parsing and handling
mod commands {
    pub enum Command {
        Quit,
        Help,
        Clear,
        Models,
        Model(usize),
        Suggest(usize),
        Feedback {
            request_id: String,
            positive: bool,
            message: String,
        },
        History,
    }

    fn index_arg(parts: &[&str], usage: &str) -> Result<usize, String> {
        parts
            .get(1)
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|n| *n >= 1)
            .map(|n| n - 1)
            .ok_or_else(|| usage.to_string())
    }

    impl Command {
        pub fn parse(input: &str) -> Result<Self, String> {
            let Some(rest) = input.strip_prefix('/') else {
                return Err("Not a command".to_string());
            };

            let parts: Vec<&str> = rest.split_whitespace().collect();
            if parts.is_empty() {
                return Err("Empty command".to_string());
            }

            match parts[0] {
                "quit" | "exit" => Ok(Command::Quit),
                "help" => Ok(Command::Help),
                "clear" => Ok(Command::Clear),
                "models" => Ok(Command::Models),
                "history" => Ok(Command::History),
                "model" => index_arg(&parts, "Usage: /model <n>  (see /models)").map(Command::Model),
                "suggest" => index_arg(&parts, "Usage: /suggest <n>").map(Command::Suggest),
                "feedback" => {
                    let usage = "Usage: /feedback <request-id> <up|down> [message]";
                    if parts.len() < 3 {
                        return Err(usage.to_string());
                    }
                    let positive = match parts[2] {
                        "up" | "+" | "👍" => true,
                        "down" | "-" | "👎" => false,
                        _ => return Err(usage.to_string()),
                    };
                    Ok(Command::Feedback {
                        request_id: parts[1].to_string(),
                        positive,
                        message: parts[3..].join(" "),
                    })
                }
                _ => Err(format!("Unknown command: /{}. Type /help for available commands.", parts[0])),
            }
        }
    }

    pub fn print_help() {
        println!("Available commands:");
        println!("  /quit, /exit                         - Exit the chat");
        println!("  /clear                               - Clear conversation history");
        println!("  /models                              - List semantic models");
        println!("  /model <n>                           - Switch semantic model (resets the conversation)");
        println!("  /suggest <n>                         - Ask the n-th suggested question");
        println!("  /feedback <request-id> <up|down> [m] - Rate the SQL of a response");
        println!("  /history                             - Show the conversation so far");
        println!("  /help                                - Show this help message");
        println!("  Ctrl+D                               - Exit the chat");
    }

}

fn print_status_bar(model_path: &str, user_id: &str) {
    let terminal_width: usize = 80;
    let status = format!(" {} • {} ", Settings::model_label(model_path), user_id);
    let padding = terminal_width.saturating_sub(status.chars().count());
    let left_pad = padding / 2;
    let right_pad = padding - left_pad;

    println!("┌{}┐", "─".repeat(terminal_width - 2));
    println!("│{}{}{}│", " ".repeat(left_pad), status, " ".repeat(right_pad));
    println!("└{}┘", "─".repeat(terminal_width - 2));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env_file();
    let args = Args::parse();
    logging::init_logging(args.tracing);

    let settings = Settings::load();
    let session = build_session(&args, &settings).await?;
    let models: Vec<String> = session.models().to_vec();

    let mut engine = AnalystEngine::new(session);
    let mut suggestions: Vec<(usize, usize)> = Vec::new();

    println!();
    println!("Type /help for commands, Ctrl+D or /quit to exit.");
    println!();

    engine.send(EngineCommand::Start);
    drain_until_idle(&mut engine, &mut suggestions).await;

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        {
            let session = engine.get_session();
            let sess = session.lock().await;
            print_status_bar(sess.semantic_model(), sess.state().user_id());
        }
        print!("> ");
        io::stdout().flush()?;

        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                eprintln!("Error reading input: {}", e);
                break;
            }
            None => {
                println!();
                println!("Goodbye!");
                break;
            }
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if !input.starts_with('/') {
            engine.ask(input);
            drain_until_idle(&mut engine, &mut suggestions).await;
            continue;
        }

        let command = match commands::Command::parse(input) {
            Ok(command) => command,
            Err(err) => {
                println!("{}", err);
                println!();
                continue;
            }
        };

        match command {
            commands::Command::Quit => {
                println!("Goodbye!");
                break;
            }
            commands::Command::Help => {
                commands::print_help();
                println!();
            }
            commands::Command::Clear => {
                engine.clear_history();
                drain_until_idle(&mut engine, &mut suggestions).await;
            }
            commands::Command::Models => {
                let session = engine.get_session();
                let current = session.lock().await.semantic_model().to_string();
                for (i, model) in models.iter().enumerate() {
                    let marker = if *model == current { "*" } else { " " };
                    println!("{} {}. {}  ({})", marker, i + 1, Settings::model_label(model), model);
                }
                println!();
            }
            commands::Command::Model(n) => match models.get(n) {
                Some(path) => {
                    engine.send(EngineCommand::SelectModel(path.clone()));
                    drain_until_idle(&mut engine, &mut suggestions).await;
                }
                None => println!("No model {}. See /models.", n + 1),
            },
            commands::Command::Suggest(n) => match suggestions.get(n).copied() {
                Some((message_index, option)) => {
                    engine.send(EngineCommand::ChooseSuggestion {
                        message_index,
                        option,
                    });
                    drain_until_idle(&mut engine, &mut suggestions).await;
                }
                None => println!("No suggestion {}.", n + 1),
            },
            commands::Command::Feedback {
                request_id,
                positive,
                message,
            } => {
                engine.send(EngineCommand::SubmitFeedback {
                    request_id,
                    positive,
                    message,
                });
                drain_until_idle(&mut engine, &mut suggestions).await;
            }
            commands::Command::History => {
                let session = engine.get_session();
                let sess = session.lock().await;
                for message in sess.state().messages() {
                    let who = match message.role {
                        analyst::Role::User => "You",
                        analyst::Role::Analyst => "Analyst",
                    };
                    let text = message.get_text();
                    let kinds: Vec<&str> = message
                        .content
                        .iter()
                        .map(|b| b.kind())
                        .filter(|k| *k != "text")
                        .collect();
                    if kinds.is_empty() {
                        println!("{}: {}", who, text);
                    } else {
                        println!("{}: {} [{}]", who, text, kinds.join(", "));
                    }
                }
                println!();
            }
        }
    }

    let session = engine.get_session();
    let count = session.lock().await.state().len();
    tracing::info!(messages = count, "session ended");
    Ok(())
}
