//! `ctxweave chat`: interactive or single-message chat mode.

use anyhow::Context as _;
use ctxweave_config::ContextConfig;
use ctxweave_core::session::SessionRegistry;
use ctxweave_core::state::ConversationState;
use ctxweave_engine::ContextApp;
use ctxweave_engine::context::{render_context_block, render_procedure_guide};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::debug;

/// Messages shown by `/context`.
const RECENT_MESSAGES: usize = 5;

/// One line of interactive input.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Empty,
    Exit,
    ShowContext,
    Next,
    Prev,
    Step(usize),
    Invalid(String),
    Message(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let lower = line.to_ascii_lowercase();
    if matches!(lower.as_str(), "exit" | "quit" | "/exit" | "/quit" | ":q") {
        return Input::Exit;
    }

    let mut parts = lower.split_whitespace();
    match parts.next() {
        Some("/context") => Input::ShowContext,
        Some("/next") => Input::Next,
        Some("/prev") => Input::Prev,
        // Steps are one-based at the prompt.
        Some("/step") => match parts.next().map(str::parse::<usize>) {
            Some(Ok(n)) if n > 0 => Input::Step(n - 1),
            _ => Input::Invalid("usage: /step <n> (n starts at 1)".into()),
        },
        _ => Input::Message(line.to_string()),
    }
}

/// Build the app from a loaded config: provider, built-in actions, checkpointer.
async fn build_app(config: &ContextConfig) -> anyhow::Result<ContextApp> {
    let provider = ctxweave_providers::build_from_config(&config.llm)
        .context("Failed to configure the generation backend")?;
    let checkpointer = ctxweave_engine::build_checkpointer(&config.checkpoint);
    Ok(ContextApp::from_config(
        config,
        Arc::new(provider),
        ctxweave_actions::default_registry(),
        checkpointer,
    )
    .await)
}

pub async fn run(config_path: &Path, user: &str, message: Option<String>) -> anyhow::Result<()> {
    let config = ContextConfig::load_with_env(config_path)?;

    if !config.has_api_key() && config.llm.provider != "ollama" {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    CTXWEAVE_API_KEY    (generic)");
        eprintln!("    DASHSCOPE_API_KEY   (for DashScope)");
        eprintln!("    OPENAI_API_KEY      (for OpenAI direct)");
        eprintln!();
        eprintln!("  Or add `api_key` under [llm] in {}", config_path.display());
        eprintln!();
        anyhow::bail!("No API key found. See above for setup instructions.");
    }

    let app = build_app(&config).await?;
    let mut sessions = SessionRegistry::new();
    let thread = sessions.thread_for(user);
    debug!(user, thread_id = %thread, "Starting chat");
    app.seed(&thread).await?;

    if let Some(msg) = message {
        eprint!("  Thinking...");
        let reply = app.send_user_message(&thread, &msg).await;
        eprint!("\r              \r");
        println!("{}", reply?.content);
        return Ok(());
    }

    println!();
    println!("  ctxweave: interactive mode");
    println!();
    println!("  Provider:  {}", config.llm.provider);
    println!("  Model:     {}", config.llm.model);
    println!("  Thread:    {thread}");
    println!("  Sticky:    {} item(s)", app.knowledge().sticky().len());
    println!("  Indexed:   {} chunk(s)", app.knowledge().indexed_count().await);
    for failure in app.ingest_failures() {
        println!("  Skipped:   {} ({})", failure.path, failure.error);
    }
    println!();
    println!("  Commands:  /context  /next  /prev  /step <n>  exit");
    println!();

    let mut lines = BufReader::new(io::stdin()).lines();
    prompt()?;

    while let Some(line) = lines.next_line().await? {
        match parse_input(&line) {
            Input::Empty => {}
            Input::Exit => break,
            Input::Invalid(usage) => eprintln!("  {usage}"),
            Input::ShowContext => match app.get_state(&thread).await {
                Ok(Some(state)) => print_context(&state, app.knowledge().sticky()),
                Ok(None) => println!("  (no state yet)"),
                Err(e) => eprintln!("  [Error] {e}"),
            },
            Input::Next => report_step(app.advance_procedure(&thread).await),
            Input::Prev => report_step(app.rewind_procedure(&thread).await),
            Input::Step(n) => report_step(app.set_procedure_step(&thread, n).await.map(|_| n)),
            Input::Message(text) => {
                eprint!("  ...");
                let result = app.send_user_message(&thread, &text).await;
                eprint!("\r     \r");
                match result {
                    Ok(reply) => {
                        println!();
                        for line in reply.content.lines() {
                            println!("  Agent > {line}");
                        }
                        println!();
                    }
                    Err(e) => {
                        eprintln!("  [Error] {e}");
                        println!();
                    }
                }
            }
        }
        prompt()?;
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

fn report_step(result: ctxweave_core::Result<usize>) {
    match result {
        Ok(step) => println!("  Procedure step: {}", step + 1),
        Err(e) => eprintln!("  [Error] {e}"),
    }
}

fn print_context(state: &ConversationState, sticky: &[String]) {
    println!();
    println!("  System:    {}", state.system.as_deref().unwrap_or("(none)"));
    println!("  Priority:  {}", state.context_priority.join(", "));
    match render_procedure_guide(state) {
        Some(guide) => println!("  {guide}"),
        None => println!("  Procedure: inactive"),
    }
    println!();
    match render_context_block(state) {
        Some(block) => {
            for line in block.lines() {
                println!("  {line}");
            }
        }
        None => println!("  Context: (empty)"),
    }
    println!();
    println!("  Merged context ({} item(s)):", state.context.len());
    for (i, item) in state.context.iter().enumerate() {
        println!("    {}. {}", i + 1, item.replace('\n', " | "));
    }
    println!("  Sticky docs ({}):", sticky.len());
    for item in sticky {
        println!("    - {item}");
    }

    let skip = state.messages.len().saturating_sub(RECENT_MESSAGES);
    println!("  Last messages ({} total):", state.messages.len());
    for message in &state.messages[skip..] {
        println!("    [{}] {}", message.role.as_str(), message.content);
    }
    println!();
}
